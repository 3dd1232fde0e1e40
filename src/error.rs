// src/error.rs
//! Unified error type for the ECG vitals system
//!
//! Component errors (source, configuration, sink) convert into [`VitalsError`]
//! so that the pipeline and the binary propagate a single type with `?`.

use crate::config::ConfigError;
use crate::hal::SourceError;
use crate::sink::SinkError;
use std::time::Duration;
use thiserror::Error;

/// Top-level error for pipeline runs
#[derive(Debug, Error)]
pub enum VitalsError {
    /// Device-side failure on the frame source or packet sink
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Persistence or feedback failure
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// No second-0 boundary was observed in time
    #[error("Timed out after {waited:?} waiting for a minute boundary")]
    SyncTimeout { waited: Duration },

    /// Internal pipeline fault such as a panicked or disconnected worker
    #[error("Pipeline error in {component}: {reason}")]
    Pipeline { component: String, reason: String },
}

impl VitalsError {
    pub fn pipeline(component: impl Into<String>, reason: impl Into<String>) -> Self {
        VitalsError::Pipeline {
            component: component.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for pipeline operations
pub type VitalsResult<T> = Result<T, VitalsError>;
