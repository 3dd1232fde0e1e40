// src/acquisition/time_sync.rs
//! Alignment of acquisition start to a wall-clock minute boundary

use crate::hal::{FrameSource, SourceError};
use crate::utils::time::{truncate_to_second, Clock};
use crate::utils::CancellationToken;
use chrono::{NaiveDateTime, Timelike};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Point in time at which a window may open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPoint {
    /// Aligned time, truncated to the second
    pub at: NaiveDateTime,
    /// Minute of the hour at alignment
    pub minute: u32,
    /// Frames read and thrown away while waiting
    pub frames_discarded: u64,
}

/// Reasons alignment did not complete
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cancelled while waiting for alignment")]
    Cancelled,

    #[error("no minute boundary within {waited:?}")]
    Timeout { waited: Duration },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Waits for the clock's second to reach 0, draining the source meanwhile
pub struct TimeSynchronizer {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl TimeSynchronizer {
    pub fn new(clock: Arc<dyn Clock>, poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            clock,
            poll_interval,
            timeout,
        }
    }

    /// Block until second 0 of some minute
    ///
    /// Frames that arrive before the boundary belong to no window and are
    /// discarded. When the source is idle the caller sleeps for the poll
    /// interval instead of spinning.
    pub fn wait_for_alignment(
        &self,
        source: &mut dyn FrameSource,
        cancel: &CancellationToken,
    ) -> Result<SyncPoint, SyncError> {
        let started = self.clock.now();
        let mut frames_discarded = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let now = self.clock.now();
            if now.second() == 0 {
                debug!(frames_discarded, minute = now.minute(), "aligned to minute boundary");
                return Ok(SyncPoint {
                    at: truncate_to_second(now),
                    minute: now.minute(),
                    frames_discarded,
                });
            }

            if let Some(limit) = self.timeout {
                let waited = (now - started).to_std().unwrap_or_default();
                if waited >= limit {
                    return Err(SyncError::Timeout { waited });
                }
            }

            match source.data_available() {
                Ok(true) => match source.read_frame() {
                    Ok(_) => frames_discarded += 1,
                    Err(e) if e.is_transient() => {}
                    Err(e) => return Err(e.into()),
                },
                Ok(false) => self.clock.sleep(self.poll_interval),
                Err(e) if e.is_transient() => self.clock.sleep(self.poll_interval),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;
    use chrono::NaiveDate;
    use std::collections::VecDeque;

    /// Source that yields scripted availability answers, then stays idle
    struct ScriptedSource {
        script: VecDeque<Result<bool, SourceError>>,
        reads: usize,
    }

    impl ScriptedSource {
        fn idle() -> Self {
            Self {
                script: VecDeque::new(),
                reads: 0,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn data_available(&mut self) -> Result<bool, SourceError> {
            self.script.pop_front().unwrap_or(Ok(false))
        }

        fn read_frame(&mut self) -> Result<Vec<u8>, SourceError> {
            self.reads += 1;
            Ok(b"1\r\n".to_vec())
        }
    }

    fn clock_at(h: u32, m: u32, s: u32) -> Arc<ManualClock> {
        let t = NaiveDate::from_ymd_opt(2021, 4, 4)
            .unwrap()
            .and_hms_milli_opt(h, m, s, 400)
            .unwrap();
        Arc::new(ManualClock::new(t))
    }

    #[test]
    fn test_idle_source_aligns_by_sleeping() {
        let clock = clock_at(8, 49, 57);
        let sync = TimeSynchronizer::new(clock.clone(), Duration::from_millis(5), None);
        let mut source = ScriptedSource::idle();

        let point = sync
            .wait_for_alignment(&mut source, &CancellationToken::new())
            .unwrap();

        assert_eq!(point.minute, 50);
        assert_eq!(point.at.second(), 0);
        assert_eq!(point.at.nanosecond(), 0);
        assert_eq!(point.frames_discarded, 0);
    }

    #[test]
    fn test_frames_before_boundary_are_discarded() {
        let clock = clock_at(8, 49, 59);
        let sync = TimeSynchronizer::new(clock.clone(), Duration::from_millis(100), None);
        let mut source = ScriptedSource::idle();
        source.script.extend([Ok(true), Ok(true), Ok(false)]);

        let point = sync
            .wait_for_alignment(&mut source, &CancellationToken::new())
            .unwrap();

        assert_eq!(point.frames_discarded, 2);
        assert_eq!(source.reads, 2);
    }

    #[test]
    fn test_already_aligned_returns_immediately() {
        let clock = clock_at(8, 50, 0);
        let sync = TimeSynchronizer::new(clock, Duration::from_millis(5), None);
        let point = sync
            .wait_for_alignment(&mut ScriptedSource::idle(), &CancellationToken::new())
            .unwrap();
        assert_eq!(point.minute, 50);
    }

    #[test]
    fn test_cancellation() {
        let clock = clock_at(8, 49, 30);
        let sync = TimeSynchronizer::new(clock, Duration::from_millis(5), None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sync.wait_for_alignment(&mut ScriptedSource::idle(), &cancel);
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[test]
    fn test_timeout() {
        let clock = clock_at(8, 49, 1);
        let sync = TimeSynchronizer::new(
            clock,
            Duration::from_millis(100),
            Some(Duration::from_secs(10)),
        );

        let result =
            sync.wait_for_alignment(&mut ScriptedSource::idle(), &CancellationToken::new());
        match result {
            Err(SyncError::Timeout { waited }) => assert!(waited >= Duration::from_secs(10)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_fatal_source_error() {
        let clock = clock_at(8, 49, 30);
        let sync = TimeSynchronizer::new(clock, Duration::from_millis(5), None);
        let mut source = ScriptedSource::idle();
        source
            .script
            .push_back(Err(SourceError::Disconnected("gone".to_string())));

        let result = sync.wait_for_alignment(&mut source, &CancellationToken::new());
        assert!(matches!(result, Err(SyncError::Source(SourceError::Disconnected(_)))));
    }

    #[test]
    fn test_transient_error_keeps_waiting() {
        let clock = clock_at(8, 49, 59);
        let sync = TimeSynchronizer::new(clock, Duration::from_millis(50), None);
        let mut source = ScriptedSource::idle();
        source
            .script
            .push_back(Err(SourceError::Timeout(Duration::from_millis(100))));

        assert!(sync
            .wait_for_alignment(&mut source, &CancellationToken::new())
            .is_ok());
    }
}
