// src/hal/traits.rs
//! Core HAL traits for ECG device abstraction

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures of the byte-stream transport
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("device disconnected: {0}")]
    Disconnected(String),

    #[error("no complete frame within {0:?}")]
    Timeout(Duration),

    #[error("transport configuration rejected: {0}")]
    Configuration(String),

    #[error("transport I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl SourceError {
    /// Transient errors are retried by the caller; everything else ends acquisition
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Timeout(_))
    }
}

/// Read half of the device link: a pollable stream of raw frames
pub trait FrameSource: Send {
    /// True when at least one byte (or a buffered frame) can be read without waiting
    fn data_available(&mut self) -> Result<bool, SourceError>;

    /// Read one raw frame, terminator included
    fn read_frame(&mut self) -> Result<Vec<u8>, SourceError>;
}

/// Write half of the device link used for metric feedback
pub trait PacketSink: Send {
    fn write_packet(&mut self, packet: &[u8]) -> Result<(), SourceError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn data_available(&mut self) -> Result<bool, SourceError> {
        (**self).data_available()
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, SourceError> {
        (**self).read_frame()
    }
}

impl<T: PacketSink + ?Sized> PacketSink for Box<T> {
    fn write_packet(&mut self, packet: &[u8]) -> Result<(), SourceError> {
        (**self).write_packet(packet)
    }
}
