//! Common utilities shared across the acquisition pipeline
//!
//! - Wall-clock access behind an injectable [`Clock`]
//! - Timestamp formatting for file names and CSV rows
//! - Cooperative cancellation

pub mod cancel;
pub mod time;

pub use cancel::CancellationToken;
pub use time::{
    file_safe_timestamp, format_timestamp, parse_timestamp, truncate_to_second, Clock,
    ManualClock, SystemClock, TIMESTAMP_FORMAT,
};
