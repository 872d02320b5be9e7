//! Multi-stage pipeline orchestration.
//!
//! A [`Pipeline`] owns the tasks of one crawl: seed producers that fill the
//! first queue, and one task per [`Dispatcher`] stage. Stages are chained by
//! handing one stage's output queue to the next stage as its input, so the
//! end of the stream travels down the pipeline as each stage closes.
//! [`Pipeline::wait`] is the barrier the orchestrator blocks on.

mod group;
mod report;

mod integration_tests;

pub use group::StageGroup;
pub use report::PipelineReport;

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::call::{BoxedCall, CallReceiver, CallSender};
use crate::dispatcher::{DispatchReport, Dispatcher, StageStatus};
use crate::errors::{CrawlerError, Result};
use crate::queue::{self, DEFAULT_QUEUE_CAPACITY};

/// Orchestrates seed producers and chained dispatcher stages.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    run_id: Uuid,
    queue_capacity: usize,
    started_at: DateTime<Utc>,
    span: Span,
    seeders: StageGroup<usize>,
    stages: StageGroup<DispatchReport>,
}

impl Pipeline {
    /// Creates an empty pipeline with a fresh run id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let run_id = Uuid::now_v7();
        let span = info_span!("pipeline", pipeline = %name, run_id = %run_id);
        Self {
            name,
            run_id,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            started_at: Utc::now(),
            span,
            seeders: StageGroup::new(),
            stages: StageGroup::new(),
        }
    }

    /// Sets the capacity of queues created by [`queue`](Self::queue).
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The run identifier attached to every log line of this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Creates a queue of calls with the pipeline's capacity.
    #[must_use]
    pub fn queue(&self) -> (CallSender, CallReceiver) {
        queue::queue(self.queue_capacity)
    }

    /// Spawns a producer that sends `calls` into `sender`, then closes it.
    pub fn seed<I>(&self, sender: CallSender, calls: I)
    where
        I: IntoIterator<Item = BoxedCall> + Send + 'static,
        I::IntoIter: Send,
    {
        let seeder = format!("seed-{}", self.seeders.len());
        let producer = async move {
            queue::seed(sender, calls)
                .await
                .map_err(CrawlerError::from)
        };
        let _entered = self.span.enter();
        self.seeders.spawn(seeder, producer);
    }

    /// Spawns `dispatcher` as a stage and returns its status handle.
    pub fn stage(&self, dispatcher: Dispatcher) -> StageStatus {
        let status = dispatcher.status();
        let name = dispatcher.name().to_string();
        let _entered = self.span.enter();
        info!(stage = %name, workers = dispatcher.workers(), "adding stage");
        self.stages.spawn(name, dispatcher.run());
        status
    }

    /// Waits for every producer and stage to finish.
    ///
    /// Returns the run report, or the first error reported by a stage. A
    /// producer error is returned only when every stage succeeded. Every
    /// stage has closed its output by the time this returns.
    pub async fn wait(self) -> Result<PipelineReport> {
        let span = self.span.clone();
        self.join().instrument(span).await
    }

    async fn join(self) -> Result<PipelineReport> {
        let mut seed_error = None;
        let mut seeded = 0;
        for (task, outcome) in self.seeders.wait().await {
            match outcome {
                Ok(sent) => seeded += sent,
                Err(err) => {
                    error!(task = %task, error = %err, "seed producer failed");
                    seed_error.get_or_insert(err);
                }
            }
        }

        let mut stage_error = None;
        let mut stages = Vec::new();
        for (stage, outcome) in self.stages.wait().await {
            match outcome {
                Ok(report) => stages.push(report),
                Err(err) => {
                    error!(stage = %stage, error = %err, "stage failed");
                    stage_error.get_or_insert(err);
                }
            }
        }

        info!(seeded, stages = stages.len(), "all calls are completed");
        if let Some(err) = stage_error.or(seed_error) {
            return Err(err);
        }
        Ok(PipelineReport {
            name: self.name,
            run_id: self.run_id,
            stages,
            seeded,
            started_at: self.started_at,
            finished_at: Utc::now(),
        })
    }
}
