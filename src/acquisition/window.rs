// src/acquisition/window.rs
//! Time-bounded sample windows

use crate::acquisition::frame_parser::{FrameParser, FrameTally, MalformedFrame};
use crate::config::constants::acquisition::MINUTES_PER_HOUR;
use crate::hal::Sample;
use crate::utils::time::{format_timestamp, truncate_to_second};
use chrono::NaiveDateTime;
use std::time::Duration;

/// Closed acquisition window
///
/// Produced only by [`WindowAccumulator::close`]; its samples cannot be
/// appended to afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    start: NaiveDateTime,
    closed_at: NaiveDateTime,
    samples: Vec<Sample>,
    tally: FrameTally,
}

impl Window {
    /// Identifier: the closing timestamp as `DD-MM-YYYY_HH:MM:SS`
    pub fn id(&self) -> String {
        format_timestamp(&self.closed_at)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn closed_at(&self) -> NaiveDateTime {
        self.closed_at
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn values(&self) -> Vec<i32> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }

    pub fn frames_offered(&self) -> u64 {
        self.tally.offered
    }

    pub fn frames_lost(&self) -> u64 {
        self.tally.lost
    }

    pub fn tally(&self) -> FrameTally {
        self.tally
    }

    /// Wall-clock span between opening and closing
    pub fn span(&self) -> Duration {
        (self.closed_at - self.start).to_std().unwrap_or_default()
    }
}

/// Open window collecting frames until its duration has elapsed
#[derive(Debug)]
pub struct WindowAccumulator {
    start: NaiveDateTime,
    duration: chrono::Duration,
    samples: Vec<Sample>,
    tally: FrameTally,
}

impl WindowAccumulator {
    /// Open a window starting at `start` (normally a sync point)
    pub fn open(start: NaiveDateTime, duration: Duration, expected_samples: usize) -> Self {
        Self {
            start,
            duration: chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX),
            samples: Vec::with_capacity(expected_samples),
            tally: FrameTally::default(),
        }
    }

    /// Parse a frame and append it, or count it as lost
    pub fn offer(&mut self, frame: &[u8], timestamp: NaiveDateTime) -> Result<(), MalformedFrame> {
        match FrameParser::parse(frame, timestamp) {
            Ok(sample) => {
                self.samples.push(sample);
                self.tally.record_accepted();
                Ok(())
            }
            Err(e) => {
                self.tally.record_lost();
                Err(e)
            }
        }
    }

    /// True once the full-timestamp delta reaches the window duration
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now - self.start >= self.duration
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn tally(&self) -> FrameTally {
        self.tally
    }

    /// Whole minutes elapsed since opening, by minute-of-hour
    pub fn elapsed_minutes(&self, now: NaiveDateTime) -> u32 {
        use chrono::Timelike;
        elapsed_minutes(self.start.minute(), now.minute())
    }

    /// Consume the accumulator into a closed window
    pub fn close(self, now: NaiveDateTime) -> Window {
        Window {
            start: self.start,
            closed_at: truncate_to_second(now),
            samples: self.samples,
            tally: self.tally,
        }
    }
}

/// Minutes from `start_minute` to `now_minute`, wrapping at the hour
pub fn elapsed_minutes(start_minute: u32, now_minute: u32) -> u32 {
    (now_minute + MINUTES_PER_HOUR - start_minute % MINUTES_PER_HOUR) % MINUTES_PER_HOUR
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, 4)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_elapsed_minutes_wraps_hour() {
        assert_eq!(elapsed_minutes(58, 3), 5);
        assert_eq!(elapsed_minutes(10, 15), 5);
        assert_eq!(elapsed_minutes(0, 59), 59);
        assert_eq!(elapsed_minutes(30, 30), 0);
    }

    #[test]
    fn test_window_across_hour_closes_after_duration() {
        let mut acc = WindowAccumulator::open(at(8, 58, 0), Duration::from_secs(300), 0);
        acc.offer(b"1\r\n", at(8, 58, 1)).unwrap();

        assert!(!acc.is_due(at(8, 59, 59)));
        assert!(!acc.is_due(at(9, 2, 59)));
        assert!(acc.is_due(at(9, 3, 0)));
        assert_eq!(acc.elapsed_minutes(at(9, 3, 0)), 5);

        let window = acc.close(at(9, 3, 0));
        assert_eq!(window.id(), "04-04-2021_09:03:00");
        assert_eq!(window.span(), Duration::from_secs(300));
    }

    #[test]
    fn test_window_across_midnight() {
        let start = at(23, 58, 0);
        let acc = WindowAccumulator::open(start, Duration::from_secs(300), 0);
        let after = start + chrono::Duration::minutes(5);
        assert!(acc.is_due(after));
        assert!(!acc.is_due(after - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_offer_counts_losses() {
        let mut acc = WindowAccumulator::open(at(8, 0, 0), Duration::from_secs(60), 16);
        acc.offer(b"10\r\n", at(8, 0, 1)).unwrap();
        assert!(acc.offer(b"xx\r\n", at(8, 0, 1)).is_err());
        acc.offer(b"12\r\n", at(8, 0, 2)).unwrap();

        let window = acc.close(at(8, 1, 0));
        assert_eq!(window.values(), vec![10, 12]);
        assert_eq!(window.timestamps(), vec![at(8, 0, 1), at(8, 0, 2)]);
        assert_eq!(window.frames_offered(), 3);
        assert_eq!(window.frames_lost(), 1);
        assert_eq!(window.len(), window.timestamps().len());
    }

    #[test]
    fn test_close_truncates_to_second() {
        let acc = WindowAccumulator::open(at(8, 0, 0), Duration::from_secs(60), 0);
        let now = at(8, 1, 0) + chrono::Duration::milliseconds(730);
        let window = acc.close(now);
        assert_eq!(window.closed_at(), at(8, 1, 0));
        assert!(window.is_empty());
    }
}
