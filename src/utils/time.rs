// src/utils/time.rs
//! Wall-clock access and timestamp formatting

use chrono::{Local, NaiveDateTime, Timelike};
use parking_lot::Mutex;
use std::time::Duration;

/// Timestamp layout used in raw CSV files and window identifiers
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y_%H:%M:%S";

/// Clock trait for dependency injection and testing
///
/// Every component that needs "now" or has to wait goes through a clock, so
/// tests can drive a whole acquisition run on synthetic time.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time
    fn now(&self) -> NaiveDateTime;

    /// Suspend the caller for `duration`
    fn sleep(&self, duration: Duration);

    /// Current time truncated to whole seconds
    fn now_seconds(&self) -> NaiveDateTime {
        truncate_to_second(self.now())
    }
}

/// System clock backed by the local timezone
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually driven clock for deterministic runs
///
/// `sleep` advances the clock instead of blocking.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn advance_by(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        let mut current = self.current.lock();
        *current += step;
    }

    pub fn set_time(&self, time: NaiveDateTime) {
        *self.current.lock() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.current.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance_by(duration);
    }
}

/// Drop the sub-second part of a timestamp
pub fn truncate_to_second(time: NaiveDateTime) -> NaiveDateTime {
    time.with_nanosecond(0).unwrap_or(time)
}

/// Format as `DD-MM-YYYY_HH:MM:SS`
pub fn format_timestamp(time: &NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a `DD-MM-YYYY_HH:MM:SS` timestamp
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
}

/// Timestamp with colons replaced, safe to embed in file names
pub fn file_safe_timestamp(time: &NaiveDateTime) -> String {
    format_timestamp(time).replace(':', "_")
}
