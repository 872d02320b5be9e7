//! Testing utilities for restcrawler pipelines.
//!
//! This module provides:
//! - Calls with recording, failing and panicking behavior
//! - An in-process executor that tracks request concurrency

mod mocks;

pub use mocks::{
    AuthenticatedCall, CountingExecutor, MisbehavingCall, PanickingCall, RecordingCall,
    UnbuildableCall,
};
