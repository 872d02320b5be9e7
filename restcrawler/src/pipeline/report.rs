//! Pipeline run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatcher::DispatchReport;

/// Summary of a completed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Pipeline name.
    pub name: String,
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// Per-stage reports, in the order stages were added.
    pub stages: Vec<DispatchReport>,
    /// Calls sent into the pipeline by seed producers.
    pub seeded: usize,
    /// When the pipeline was created.
    pub started_at: DateTime<Utc>,
    /// When the last stage closed.
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    /// The report of the named stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&DispatchReport> {
        self.stages.iter().find(|report| report.stage == name)
    }

    /// Calls that completed successfully across all stages.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.stages.iter().map(|report| report.succeeded).sum()
    }

    /// Calls that failed across all stages.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.stages.iter().map(DispatchReport::failed).sum()
    }
}
