// src/sink/mod.rs
//! Result persistence and device feedback

pub mod csv_store;
pub mod feedback;

pub use csv_store::{read_results, CsvResultStore, ResultRow};
pub use feedback::{format_packets, SerialFeedback};

use crate::acquisition::Window;
use crate::hal::SourceError;
use crate::processing::ResultRecord;
use std::path::PathBuf;
use thiserror::Error;

/// Persistence and feedback failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("device write failed: {0}")]
    Device(#[from] SourceError),

    #[error("malformed stored value in column {column}: {value:?}")]
    Format { column: &'static str, value: String },
}

/// Storage for raw windows and derived results
pub trait ResultSink: Send {
    /// Write a closed window's samples; returns the file written
    fn persist_window(&mut self, window: &Window) -> Result<PathBuf, SinkError>;

    /// Write an interrupted window for audit; it is never evaluated
    fn persist_partial(&mut self, window: &Window) -> Result<PathBuf, SinkError>;

    /// Append one record to the cumulative results table
    fn persist_result(&mut self, record: &ResultRecord) -> Result<(), SinkError>;
}

/// Reports metrics back to the originating device
pub trait DeviceFeedback: Send {
    fn send_metrics(&mut self, record: &ResultRecord) -> Result<(), SinkError>;
}
