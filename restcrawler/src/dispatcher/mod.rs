//! Bounded worker-pool dispatcher.
//!
//! A [`Dispatcher`] drains one input queue of calls with a fixed pool of
//! workers. Each worker runs a call's full request/response cycle; failures
//! are isolated to the call that caused them. Once the input queue is closed
//! and every worker has finished, the dispatcher closes its output queue,
//! which is how a downstream stage learns that no more calls will arrive.

mod config;
mod report;
mod status;


pub use config::{DispatcherConfig, FatalPolicy, DEFAULT_WORKERS};
pub use report::DispatchReport;
pub use status::{DispatchState, StageStatus};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::call::{BoxedCall, Call, CallReceiver, CallSender, OutputSink};
use crate::errors::{CallError, CrawlerError, Result};
use crate::executor::{BackoffExecutor, HttpExecutor};
use report::StageCounters;

/// Drains an input queue of calls with a bounded pool of workers.
///
/// `run` consumes the dispatcher, so a dispatcher can only ever process its
/// input queue once.
pub struct Dispatcher {
    name: String,
    input: CallReceiver,
    output: Option<CallSender>,
    workers: usize,
    executor: Arc<dyn HttpExecutor>,
    fatal_policy: FatalPolicy,
    max_errors: Option<usize>,
    status: StageStatus,
}

impl Dispatcher {
    /// Creates a dispatcher reading from `input`.
    ///
    /// Fails if the worker count is zero or the default executor cannot be
    /// built.
    pub fn new(
        name: impl Into<String>,
        input: CallReceiver,
        config: DispatcherConfig,
    ) -> Result<Self> {
        let name = name.into();
        if config.workers == 0 {
            return Err(CrawlerError::configuration(format!(
                "stage '{name}': worker count must be positive"
            )));
        }
        let executor = match config.executor {
            Some(executor) => executor,
            None => Arc::new(BackoffExecutor::with_defaults()?),
        };

        Ok(Self {
            name,
            input,
            output: config.output,
            workers: config.workers,
            executor,
            fatal_policy: config.fatal_policy,
            max_errors: config.max_errors,
            status: StageStatus::new(),
        })
    }

    /// The stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker count.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Returns true if handlers' calls are forwarded to an output queue.
    #[must_use]
    pub const fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// A handle observing this dispatcher's lifecycle.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.status.clone()
    }

    /// Processes the input queue to exhaustion, then closes the output queue.
    ///
    /// Returns the run report, or the first fatal condition or exhausted
    /// error budget observed during the run. The output queue is closed in
    /// every case.
    pub async fn run(self) -> Result<DispatchReport> {
        let span = info_span!("stage", stage = %self.name, workers = self.workers);
        self.run_pool().instrument(span).await
    }

    async fn run_pool(self) -> Result<DispatchReport> {
        let started_at = Utc::now();
        let Self {
            name,
            input,
            output,
            workers,
            executor,
            fatal_policy,
            max_errors,
            status,
        } = self;

        status.advance(DispatchState::Running);
        info!("stage started");

        let pool = Arc::new(WorkerPool {
            name,
            input: tokio::sync::Mutex::new(input),
            executor,
            sink: OutputSink::from(output.clone()),
            counters: StageCounters::default(),
            fatal_policy,
            max_errors,
            halted: AtomicBool::new(false),
            halt_reason: parking_lot::Mutex::new(None),
            status: status.clone(),
        });

        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let pool = Arc::clone(&pool);
            tasks.spawn(async move { pool.work(worker).await }.in_current_span());
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "worker task terminated abnormally");
                pool.halt(
                    CrawlerError::StagePanic {
                        stage: pool.name.clone(),
                        message: err.to_string(),
                    },
                    false,
                );
            }
        }

        status.advance(DispatchState::Draining);
        // Downstream must not observe the end of the stream before this
        // stage reports Closed.
        let closing = output.as_ref().map(CallSender::close_deferred).transpose();
        status.advance(DispatchState::Closed);
        let closing = closing.map(drop);

        let report = pool.counters.report(&pool.name, pool.sink.emitted(), started_at);
        info!(
            received = report.received,
            succeeded = report.succeeded,
            failed = report.failed(),
            discarded = report.discarded,
            emitted = report.emitted,
            "processed all jobs for stage"
        );

        if let Err(err) = closing {
            error!(error = %err, "output queue was closed by another party");
            return Err(err.into());
        }
        if let Some(reason) = pool.halt_reason.lock().take() {
            return Err(reason);
        }
        Ok(report)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("output", &self.output)
            .field("state", &self.status.state())
            .finish()
    }
}

enum UnitFailure {
    Build(CallError),
    Transport(CrawlerError),
    Handler(CallError),
    Panic(String),
}

struct WorkerPool {
    name: String,
    input: tokio::sync::Mutex<CallReceiver>,
    executor: Arc<dyn HttpExecutor>,
    sink: OutputSink,
    counters: StageCounters,
    fatal_policy: FatalPolicy,
    max_errors: Option<usize>,
    halted: AtomicBool,
    halt_reason: parking_lot::Mutex<Option<CrawlerError>>,
    status: StageStatus,
}

impl WorkerPool {
    async fn work(&self, worker: usize) {
        loop {
            let next = self.input.lock().await.recv().await;
            let Some(call) = next else {
                if self.status.advance(DispatchState::Draining) {
                    debug!(worker, "input exhausted, draining in-flight calls");
                }
                break;
            };

            StageCounters::bump(&self.counters.received);
            // A panic in the call's Debug output or drop must not end the worker.
            let unit = AssertUnwindSafe(self.run_unit(call))
                .catch_unwind()
                .instrument(info_span!("call", worker))
                .await;
            if let Err(payload) = unit {
                error!(
                    worker,
                    panic = %panic_message(payload.as_ref()),
                    "call panicked after it was accounted for"
                );
            }
        }
    }

    async fn run_unit(&self, call: BoxedCall) {
        if self.halted.load(Ordering::SeqCst) {
            StageCounters::bump(&self.counters.discarded);
            debug!(call = ?call, "stage halted, discarding call");
            return;
        }

        let outcome = AssertUnwindSafe(self.process(call.as_ref()))
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(())) => {
                StageCounters::bump(&self.counters.succeeded);
                return;
            }
            Ok(Err(failure)) => failure,
            Err(payload) => UnitFailure::Panic(panic_message(payload.as_ref())),
        };
        self.settle(&failure);
        log_failure(call.as_ref(), &failure);
    }

    async fn process(&self, call: &dyn Call) -> Result<(), UnitFailure> {
        let request = call.build_request().map_err(UnitFailure::Build)?;
        let response = self
            .executor
            .execute(&request)
            .await
            .map_err(UnitFailure::Transport)?;
        debug!(status = response.status().as_u16(), url = %request.url(), "received response");
        call.handle_response(response, &self.sink)
            .await
            .map_err(UnitFailure::Handler)
    }

    /// Counts a failed call and applies the fatal policy and error budget.
    fn settle(&self, failure: &UnitFailure) {
        let counter = match failure {
            UnitFailure::Build(_) => &self.counters.build_failed,
            UnitFailure::Transport(_) => &self.counters.transport_failed,
            UnitFailure::Handler(_) | UnitFailure::Panic(_) => &self.counters.handler_failed,
        };
        StageCounters::bump(counter);

        if let UnitFailure::Handler(err) = failure {
            if err.is_fatal() {
                self.halt(
                    CrawlerError::Fatal {
                        stage: self.name.clone(),
                        message: err.to_string(),
                    },
                    self.fatal_policy == FatalPolicy::StopStage,
                );
            }
        }

        if let Some(budget) = self.max_errors {
            let failures = self.counters.failed();
            if failures > budget {
                self.halt(
                    CrawlerError::ErrorBudgetExceeded {
                        stage: self.name.clone(),
                        budget,
                        failures,
                    },
                    true,
                );
            }
        }
    }

    /// Records the first halt reason; `stop` also ends dispatching.
    fn halt(&self, reason: CrawlerError, stop: bool) {
        {
            let mut slot = self.halt_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        if stop && !self.halted.swap(true, Ordering::SeqCst) {
            warn!("stage halted, remaining input will be discarded");
        }
    }
}

fn log_failure(call: &dyn Call, failure: &UnitFailure) {
    match failure {
        UnitFailure::Build(err) => {
            error!(call = ?call, error = %err, "error when creating http request");
        }
        UnitFailure::Transport(err) => warn!(call = ?call, error = %err, "http request failed"),
        UnitFailure::Handler(err) if err.is_fatal() => {
            error!(call = ?call, error = %err, "call reported a fatal condition");
        }
        UnitFailure::Handler(err) => warn!(call = ?call, error = %err, "response handler failed"),
        UnitFailure::Panic(message) => {
            error!(call = ?call, panic = %message, "response handler panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
