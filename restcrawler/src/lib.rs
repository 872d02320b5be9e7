//! # Restcrawler
//!
//! A pluggable pipeline for crawling HTTP APIs.
//!
//! Work is expressed as [`Call`](call::Call)s: each call knows how to build
//! its request and how to handle the response, and may emit follow-up calls
//! for the next stage. Restcrawler provides:
//!
//! - **Bounded queues** with an explicit closing contract
//! - **Dispatchers** draining a queue with a fixed pool of workers
//! - **Backoff retries** honoring `Retry-After`, applied transparently to every call
//! - **Pipelines** chaining stages and waiting for all of them to close
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restcrawler::prelude::*;
//!
//! let pipeline = Pipeline::new("crawl");
//! let (search_tx, search_rx) = pipeline.queue();
//! let (detail_tx, detail_rx) = pipeline.queue();
//!
//! pipeline.seed(search_tx, search_calls);
//! pipeline.stage(Dispatcher::new(
//!     "search",
//!     search_rx,
//!     DispatcherConfig::new().with_output(detail_tx),
//! )?);
//! pipeline.stage(Dispatcher::new("detail", detail_rx, DispatcherConfig::new())?);
//!
//! let report = pipeline.wait().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod call;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod testing;

pub use errors::{CallError, CrawlerError, QueueError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::call::{
        BoxedCall, Call, CallReceiver, CallRequest, CallResponse, CallSender, OutputSink,
    };
    pub use crate::dispatcher::{
        DispatchReport, DispatchState, Dispatcher, DispatcherConfig, FatalPolicy, StageStatus,
    };
    pub use crate::errors::{CallError, CrawlerError, QueueError};
    pub use crate::executor::{
        BackoffExecutor, BackoffPolicy, BackoffStrategy, ExecutorConfig, HttpExecutor,
        ReqwestExecutor,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{Pipeline, PipelineReport};
    pub use crate::queue::{queue, seed, QueueReceiver, QueueSender};
}
