// src/sink/feedback.rs
//! Metric packets sent back over the device link

use crate::config::constants::{feedback::PACKET_TERMINATOR, metrics::FATIGUE_SENTINEL};
use crate::hal::PacketSink;
use crate::processing::{Metric, ResultRecord};
use crate::sink::{DeviceFeedback, SinkError};
use crate::utils::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The four feedback packets for a record, in transmission order
///
/// Numbers are truncated toward zero; unavailable metrics report 0 or the
/// fatigue sentinel.
pub fn format_packets(record: &ResultRecord) -> [String; 4] {
    let hr = record.heart_rate.value().copied().unwrap_or(0.0);
    let (sbp, dbp) = record
        .blood_pressure
        .value()
        .map_or((0.0, 0.0), |bp| (bp.systolic, bp.diastolic));
    let status = match &record.fatigue {
        Metric::Value(f) => f.status.as_str(),
        Metric::Unavailable(_) => FATIGUE_SENTINEL,
    };

    [
        format!("HR:{}{PACKET_TERMINATOR}", hr.trunc() as i64),
        format!("SBP:{}{PACKET_TERMINATOR}", sbp.trunc() as i64),
        format!("DBP:{}{PACKET_TERMINATOR}", dbp.trunc() as i64),
        format!("FAT:{status}{PACKET_TERMINATOR}"),
    ]
}

/// Writes paced metric packets to the device's write half
pub struct SerialFeedback<P: PacketSink> {
    sink: P,
    clock: Arc<dyn Clock>,
    pacing: Duration,
}

impl<P: PacketSink> SerialFeedback<P> {
    pub fn new(sink: P, clock: Arc<dyn Clock>, pacing: Duration) -> Self {
        Self {
            sink,
            clock,
            pacing,
        }
    }

    pub fn into_inner(self) -> P {
        self.sink
    }
}

impl<P: PacketSink> DeviceFeedback for SerialFeedback<P> {
    fn send_metrics(&mut self, record: &ResultRecord) -> Result<(), SinkError> {
        for packet in format_packets(record) {
            self.sink.write_packet(packet.as_bytes())?;
            debug!(packet = packet.trim_end(), "feedback sent");
            self.clock.sleep(self.pacing);
        }
        Ok(())
    }
}
