//! Crawls Spotify track search results, then fetches every track found.
//!
//! The search stage requests `--pages` pages of 50 tracks and emits one
//! detail call per track into the detail stage.

mod calls;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use restcrawler::call::BoxedCall;
use restcrawler::dispatcher::{Dispatcher, DispatcherConfig, DEFAULT_WORKERS};
use restcrawler::observability::{init_tracing, LogFormat};
use restcrawler::pipeline::{Pipeline, PipelineReport};
use tracing::info;

use calls::{SearchTracksCall, SpotifyApi};

#[derive(Parser)]
#[command(name = "restcrawler-spotify")]
#[command(about = "Search Spotify tracks and fetch the details of every result")]
#[command(version)]
struct Cli {
    /// OAuth access token
    #[arg(long, env = "SPOTIFY_TOKEN", hide_env_values = true)]
    token: String,

    /// Number of search pages to request
    #[arg(long, default_value_t = 10)]
    pages: usize,

    /// Concurrent search requests
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    search_workers: usize,

    /// Concurrent track detail requests
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    detail_workers: usize,

    /// API base URL
    #[arg(long, default_value = "https://api.spotify.com")]
    api_base: String,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

async fn crawl(cli: &Cli) -> restcrawler::Result<PipelineReport> {
    let api = Arc::new(SpotifyApi::new(cli.api_base.as_str(), cli.token.as_str()));

    let pipeline = Pipeline::new("spotify");
    let (search_tx, search_rx) = pipeline.queue();
    let (detail_tx, detail_rx) = pipeline.queue();

    let searches: Vec<BoxedCall> = (0..cli.pages)
        .map(|page| Box::new(SearchTracksCall::new(Arc::clone(&api), page)) as BoxedCall)
        .collect();

    let search = Dispatcher::new(
        "search",
        search_rx,
        DispatcherConfig::new()
            .with_workers(cli.search_workers)
            .with_output(detail_tx),
    )?;
    let detail = Dispatcher::new(
        "detail",
        detail_rx,
        DispatcherConfig::new().with_workers(cli.detail_workers),
    )?;

    info!(pages = cli.pages, "tracks search calls");
    pipeline.seed(search_tx, searches);
    pipeline.stage(search);
    info!("tracks detail calls on track ids returned by search");
    pipeline.stage(detail);

    pipeline.wait().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    let report = crawl(&cli).await.context("spotify crawl failed")?;
    for stage in &report.stages {
        info!(
            stage = %stage.stage,
            received = stage.received,
            succeeded = stage.succeeded,
            failed = stage.failed(),
            elapsed_ms = stage.elapsed().num_milliseconds(),
            "stage summary"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cli(server: &MockServer, pages: usize) -> Cli {
        let pages = pages.to_string();
        let api_base = server.uri();
        Cli::parse_from([
            "restcrawler-spotify",
            "--token",
            "test-token",
            "--pages",
            pages.as_str(),
            "--detail-workers",
            "4",
            "--api-base",
            api_base.as_str(),
        ])
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["restcrawler-spotify", "--token", "t"]);
        assert_eq!(cli.pages, 10);
        assert_eq!(cli.search_workers, 2);
        assert_eq!(cli.detail_workers, 2);
        assert_eq!(cli.api_base, "https://api.spotify.com");
        assert!(!cli.json_logs);
    }

    #[tokio::test]
    async fn test_crawl_fetches_every_track() {
        let server = MockServer::start().await;
        for page in 0..3 {
            let offset = (page * 50).to_string();
            let items: Vec<_> = (0..4)
                .map(|i| json!({"uri": format!("spotify:track:p{page}t{i}")}))
                .collect();
            Mock::given(method("GET"))
                .and(path("/v1/search"))
                .and(query_param("offset", offset.as_str()))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({"tracks": {"items": items}})),
                )
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path_regex(r"^/v1/tracks/p\dt\d$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uri": "spotify:track:any",
                "name": "Any Track"
            })))
            .expect(12)
            .mount(&server)
            .await;

        let report = crawl(&cli(&server, 3)).await.unwrap();

        let search = report.stage("search").unwrap();
        let detail = report.stage("detail").unwrap();
        assert_eq!(report.seeded, 3);
        assert_eq!(search.succeeded, 3);
        assert_eq!(search.emitted, 12);
        assert_eq!(detail.succeeded, 12);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_crawl_stops_on_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = crawl(&cli(&server, 5)).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
