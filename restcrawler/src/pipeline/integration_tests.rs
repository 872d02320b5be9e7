//! End-to-end tests for multi-stage pipelines.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::call::BoxedCall;
    use crate::dispatcher::{DispatchState, Dispatcher, DispatcherConfig};
    use crate::errors::CrawlerError;
    use crate::pipeline::Pipeline;
    use crate::testing::{AuthenticatedCall, CountingExecutor, RecordingCall};

    #[tokio::test]
    async fn test_two_stage_pipeline_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200))
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/detail"))
            .respond_with(ResponseTemplate::new(200))
            .expect(12)
            .mount(&server)
            .await;

        let searched = Arc::new(AtomicUsize::new(0));
        let detailed = Arc::new(AtomicUsize::new(0));
        let search_url = format!("{}/search", server.uri());
        let detail_url = format!("{}/detail", server.uri());
        let seeds: Vec<BoxedCall> = (0..4)
            .map(|_| {
                Box::new(
                    RecordingCall::new(search_url.clone(), Arc::clone(&searched))
                        .with_fan_out(3, Arc::clone(&detailed))
                        .with_child_url(detail_url.clone()),
                ) as BoxedCall
            })
            .collect();

        let pipeline = Pipeline::new("crawl");
        let (search_tx, search_rx) = pipeline.queue();
        let (detail_tx, detail_rx) = pipeline.queue();

        let search = Dispatcher::new(
            "search",
            search_rx,
            DispatcherConfig::new().with_output(detail_tx),
        )
        .unwrap();
        let detail = Dispatcher::new(
            "detail",
            detail_rx,
            DispatcherConfig::new().with_workers(4),
        )
        .unwrap();

        pipeline.seed(search_tx, seeds);
        let search_status = pipeline.stage(search);
        let detail_status = pipeline.stage(detail);

        let report = pipeline.wait().await.unwrap();

        assert_eq!(search_status.state(), DispatchState::Closed);
        assert_eq!(detail_status.state(), DispatchState::Closed);
        assert_eq!(report.name, "crawl");
        assert_eq!(report.seeded, 4);
        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stage("search").unwrap().emitted, 12);
        assert_eq!(report.stage("detail").unwrap().received, 12);
        assert_eq!(report.succeeded(), 16);
        assert_eq!(report.failed(), 0);
        assert_eq!(searched.load(Ordering::SeqCst), 4);
        assert_eq!(detailed.load(Ordering::SeqCst), 12);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_stage_group_waits_for_every_stage() {
        let executor = Arc::new(CountingExecutor::new(Duration::from_millis(5)));
        let handled = Arc::new(AtomicUsize::new(0));
        let children = Arc::new(AtomicUsize::new(0));

        let pipeline = Pipeline::new("local").with_queue_capacity(8);
        let (first_tx, first_rx) = pipeline.queue();
        let (second_tx, second_rx) = pipeline.queue();
        let (third_tx, third_rx) = pipeline.queue();

        let seeds: Vec<BoxedCall> = (0..3)
            .map(|_| {
                Box::new(
                    RecordingCall::new("http://localhost/a", Arc::clone(&handled))
                        .with_fan_out(2, Arc::clone(&children)),
                ) as BoxedCall
            })
            .collect();
        pipeline.seed(first_tx, seeds);

        for (name, input, output) in [
            ("first", first_rx, Some(second_tx)),
            ("second", second_rx, Some(third_tx)),
            ("third", third_rx, None),
        ] {
            let mut config = DispatcherConfig::new().with_shared_executor(executor.clone());
            if let Some(output) = output {
                config = config.with_output(output);
            }
            pipeline.stage(Dispatcher::new(name, input, config).unwrap());
        }

        let report = pipeline.wait().await.unwrap();

        // Children do not fan out, so the third stage only sees the close.
        assert_eq!(executor.total(), 9);
        assert_eq!(report.seeded, 3);
        assert_eq!(report.stage("first").unwrap().emitted, 6);
        assert_eq!(report.stage("second").unwrap().received, 6);
        assert_eq!(report.stage("second").unwrap().emitted, 0);
        assert_eq!(report.stage("third").unwrap().received, 0);
        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert_eq!(children.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_fatal_stage_error_reaches_orchestrator() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let handled = Arc::new(AtomicUsize::new(0));
        let url = format!("{}/private", server.uri());
        let seeds: Vec<BoxedCall> = (0..6)
            .map(|_| {
                Box::new(AuthenticatedCall::new(url.clone(), Arc::clone(&handled))) as BoxedCall
            })
            .collect();

        let pipeline = Pipeline::new("auth");
        let (tx, rx) = pipeline.queue();
        pipeline.seed(tx, seeds);
        let stage = Dispatcher::new("search", rx, DispatcherConfig::new()).unwrap();
        let status = pipeline.stage(stage);

        let err = pipeline.wait().await.unwrap_err();

        assert!(err.is_fatal());
        assert!(err.to_string().contains("search"));
        assert_eq!(status.state(), DispatchState::Closed);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upstream_survives_halted_downstream() {
        let ok = CountingExecutor::new(Duration::from_millis(1));
        let unauthorized = Arc::new(CountingExecutor::with_status(
            StatusCode::UNAUTHORIZED,
            Duration::from_millis(1),
        ));
        let handled = Arc::new(AtomicUsize::new(0));
        let children = Arc::new(AtomicUsize::new(0));

        let pipeline = Pipeline::new("halted");
        let (first_tx, first_rx) = pipeline.queue();
        let (second_tx, second_rx) = pipeline.queue();

        let seeds: Vec<BoxedCall> = (0..4)
            .map(|_| {
                Box::new(
                    RecordingCall::new("http://localhost/list", Arc::clone(&handled))
                        .with_fan_out(5, Arc::clone(&children)),
                ) as BoxedCall
            })
            .collect();
        pipeline.seed(first_tx, seeds);

        // Every downstream call is rejected, halting that stage after one
        // call while upstream is still emitting.
        let upstream = Dispatcher::new(
            "list",
            first_rx,
            DispatcherConfig::new()
                .with_output(second_tx.clone())
                .with_executor(ok),
        )
        .unwrap();
        let downstream = Dispatcher::new(
            "auth",
            second_rx,
            DispatcherConfig::new()
                .with_workers(1)
                .with_shared_executor(unauthorized.clone()),
        )
        .unwrap();
        pipeline.stage(upstream);
        pipeline.stage(downstream);

        let err = tokio::time::timeout(Duration::from_secs(10), pipeline.wait())
            .await
            .expect("pipeline deadlocked")
            .unwrap_err();

        assert!(matches!(err, CrawlerError::Fatal { ref stage, .. } if stage == "auth"));
        assert!(second_tx.is_closed());
        assert_eq!(unauthorized.total(), 1);
        assert_eq!(handled.load(Ordering::SeqCst), 4);
        assert_eq!(children.load(Ordering::SeqCst), 0);
    }
}
