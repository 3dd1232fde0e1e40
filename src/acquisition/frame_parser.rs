// src/acquisition/frame_parser.rs
//! Raw frame decoding with loss accounting

use crate::hal::Sample;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Why a frame could not be turned into a sample
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedFrame {
    #[error("frame holds no payload")]
    Empty,

    #[error("frame is not valid UTF-8")]
    NotUtf8,

    #[error("frame payload {0:?} is not a signed integer")]
    NotInteger(String),
}

/// Stateless decoder for the `"<int>\r\n"` line protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameParser;

impl FrameParser {
    /// Decode one frame into a sample stamped with `timestamp`
    pub fn parse(frame: &[u8], timestamp: NaiveDateTime) -> Result<Sample, MalformedFrame> {
        let payload = trim_frame(frame);
        if payload.is_empty() {
            return Err(MalformedFrame::Empty);
        }

        let text = std::str::from_utf8(payload).map_err(|_| MalformedFrame::NotUtf8)?;
        let value = text
            .parse::<i32>()
            .map_err(|_| MalformedFrame::NotInteger(text.to_string()))?;

        Ok(Sample { value, timestamp })
    }
}

/// Strip line terminators, NULs and other control or blank bytes at both ends
fn trim_frame(frame: &[u8]) -> &[u8] {
    let is_noise = |b: &u8| b.is_ascii_whitespace() || b.is_ascii_control();
    let start = frame.iter().position(|b| !is_noise(b)).unwrap_or(frame.len());
    let end = frame.iter().rposition(|b| !is_noise(b)).map_or(start, |i| i + 1);
    &frame[start..end]
}

/// Monotonic frame counters for one window
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameTally {
    pub offered: u64,
    pub accepted: u64,
    pub lost: u64,
}

impl FrameTally {
    pub fn record_accepted(&mut self) {
        self.offered += 1;
        self.accepted += 1;
    }

    pub fn record_lost(&mut self) {
        self.offered += 1;
        self.lost += 1;
    }

    /// Fraction of offered frames that were lost
    pub fn loss_ratio(&self) -> f64 {
        if self.offered == 0 {
            0.0
        } else {
            self.lost as f64 / self.offered as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, 4)
            .unwrap()
            .and_hms_opt(8, 50, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_valid_frames() {
        assert_eq!(FrameParser::parse(b"512\r\n", ts()).unwrap().value, 512);
        assert_eq!(FrameParser::parse(b"-17\n", ts()).unwrap().value, -17);
        assert_eq!(FrameParser::parse(b"\0 42 \r\n\0", ts()).unwrap().value, 42);
        assert_eq!(FrameParser::parse(b"7", ts()).unwrap().timestamp, ts());
    }

    #[test]
    fn test_parse_malformed_frames() {
        assert_eq!(FrameParser::parse(b"\r\n", ts()), Err(MalformedFrame::Empty));
        assert_eq!(FrameParser::parse(b"", ts()), Err(MalformedFrame::Empty));
        assert_eq!(FrameParser::parse(b"\xff\xfe\r\n", ts()), Err(MalformedFrame::NotUtf8));
        assert_eq!(
            FrameParser::parse(b"5a1\r\n", ts()),
            Err(MalformedFrame::NotInteger("5a1".to_string()))
        );
        assert!(matches!(
            FrameParser::parse(b"99999999999\r\n", ts()),
            Err(MalformedFrame::NotInteger(_))
        ));
    }

    #[test]
    fn test_tally_loss_ratio() {
        let mut tally = FrameTally::default();
        assert_eq!(tally.loss_ratio(), 0.0);
        tally.record_accepted();
        tally.record_lost();
        assert_eq!(tally.loss_ratio(), 0.5);
    }

    proptest! {
        #[test]
        fn accepted_plus_lost_equals_offered(
            frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 0..200)
        ) {
            let mut tally = FrameTally::default();
            for frame in &frames {
                match FrameParser::parse(frame, ts()) {
                    Ok(_) => tally.record_accepted(),
                    Err(_) => tally.record_lost(),
                }
            }
            prop_assert_eq!(tally.accepted + tally.lost, tally.offered);
            prop_assert_eq!(tally.offered, frames.len() as u64);
        }

        #[test]
        fn integer_lines_always_parse(value in any::<i32>()) {
            let frame = format!("{value}\r\n");
            prop_assert_eq!(FrameParser::parse(frame.as_bytes(), ts()).unwrap().value, value);
        }
    }
}
