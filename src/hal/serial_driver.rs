// src/hal/serial_driver.rs
//! Serial ECG device driver
//!
//! The device streams one ASCII integer per line (`"512\r\n"`) and accepts
//! short text packets back. Opening the port yields two halves: a
//! [`SerialFrameSource`] for the acquisition thread and a
//! [`SerialPacketSink`] for the feedback stage.

use crate::config::constants::serial::*;
use crate::hal::{DeviceInfo, DeviceType, FrameSource, PacketSink, SourceError};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub timeout_ms: u32,
    pub read_chunk_size: usize,
    pub max_frame_length: usize,
    pub connection_retry_attempts: u32,
}

/// Serial parity settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Serial flow control settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT_NAME.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            connection_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl SerialConfig {
    /// Range checks for every field
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.port_name.is_empty() {
            return Err(SourceError::Configuration(
                "Port name cannot be empty".to_string(),
            ));
        }

        if self.baud_rate == 0 || self.baud_rate > MAX_BAUD_RATE {
            return Err(SourceError::Configuration(format!(
                "Invalid baud rate: {}",
                self.baud_rate
            )));
        }

        if !(5..=8).contains(&self.data_bits) {
            return Err(SourceError::Configuration(format!(
                "Invalid data bits: {}",
                self.data_bits
            )));
        }

        if !(1..=2).contains(&self.stop_bits) {
            return Err(SourceError::Configuration(format!(
                "Invalid stop bits: {}",
                self.stop_bits
            )));
        }

        if self.timeout_ms == 0 || self.timeout_ms > MAX_READ_TIMEOUT_MS {
            return Err(SourceError::Configuration(format!(
                "Invalid timeout: {} ms",
                self.timeout_ms
            )));
        }

        if self.read_chunk_size == 0 || self.read_chunk_size > MAX_READ_CHUNK_SIZE {
            return Err(SourceError::Configuration(format!(
                "Invalid read chunk size: {}",
                self.read_chunk_size
            )));
        }

        if self.max_frame_length < MIN_FRAME_LENGTH {
            return Err(SourceError::Configuration(format!(
                "Invalid max frame length: {}",
                self.max_frame_length
            )));
        }

        if self.connection_retry_attempts == 0 {
            return Err(SourceError::Configuration(
                "At least one connection attempt is required".to_string(),
            ));
        }

        Ok(())
    }

    fn data_bits(&self) -> serialport::DataBits {
        match self.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> serialport::StopBits {
        match self.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        }
    }

    fn parity(&self) -> serialport::Parity {
        match self.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }

    fn flow_control(&self) -> serialport::FlowControl {
        match self.flow_control {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

impl From<serialport::Error> for SourceError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => SourceError::Disconnected(err.to_string()),
            serialport::ErrorKind::InvalidInput => SourceError::Configuration(err.to_string()),
            serialport::ErrorKind::Io(kind) => {
                SourceError::Io(io::Error::new(kind, err.description))
            }
            serialport::ErrorKind::Unknown => SourceError::Io(io::Error::other(err.description)),
        }
    }
}

/// Splits an incoming byte stream into newline-terminated frames
///
/// A run of bytes longer than `max_frame_length` without a terminator is
/// emitted as one frame so the parser counts it as a loss instead of the
/// buffer growing without bound.
#[derive(Debug)]
pub struct FrameAssembler {
    pending: Vec<u8>,
    max_frame_length: usize,
}

impl FrameAssembler {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            pending: Vec::with_capacity(max_frame_length),
            max_frame_length,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            return Some(self.pending.drain(..=pos).collect());
        }

        if self.pending.len() > self.max_frame_length {
            return Some(self.pending.drain(..self.max_frame_length).collect());
        }

        None
    }

    pub fn has_frame(&self) -> bool {
        self.pending.contains(&b'\n') || self.pending.len() > self.max_frame_length
    }
}

/// Open serial link, before it is split into halves
pub struct SerialDevice;

impl SerialDevice {
    /// Open the port with retries, returning independent read and write halves
    pub fn open(
        config: &SerialConfig,
    ) -> Result<(SerialFrameSource, SerialPacketSink), SourceError> {
        config.validate()?;

        let port = Self::open_with_retry(config)?;
        let writer = port.try_clone()?;
        info!(port = %config.port_name, baud = config.baud_rate, "serial port opened");

        let source = SerialFrameSource {
            port,
            assembler: FrameAssembler::new(config.max_frame_length),
            chunk: vec![0u8; config.read_chunk_size],
            timeout: Duration::from_millis(u64::from(config.timeout_ms)),
            info: DeviceInfo {
                device_type: DeviceType::Serial,
                name: config.port_name.clone(),
            },
        };

        Ok((source, SerialPacketSink { port: writer }))
    }

    fn open_with_retry(config: &SerialConfig) -> Result<Box<dyn SerialPort>, SourceError> {
        let mut last_error = None;

        for attempt in 1..=config.connection_retry_attempts {
            let result = serialport::new(&config.port_name, config.baud_rate)
                .data_bits(config.data_bits())
                .stop_bits(config.stop_bits())
                .parity(config.parity())
                .flow_control(config.flow_control())
                .timeout(Duration::from_millis(u64::from(config.timeout_ms)))
                .open();

            match result {
                Ok(port) => return Ok(port),
                Err(e) => {
                    warn!(
                        attempt,
                        port = %config.port_name,
                        error = %e,
                        "failed to open serial port"
                    );
                    last_error = Some(e);
                    if attempt < config.connection_retry_attempts {
                        let backoff = RETRY_BASE_DELAY_MS * u64::from(attempt);
                        std::thread::sleep(Duration::from_millis(backoff));
                    }
                }
            }
        }

        Err(last_error.map(SourceError::from).unwrap_or_else(|| {
            SourceError::Disconnected(format!(
                "Failed to open {} after {} attempts",
                config.port_name, config.connection_retry_attempts
            ))
        }))
    }
}

/// Read half of an open serial port
pub struct SerialFrameSource {
    port: Box<dyn SerialPort>,
    assembler: FrameAssembler,
    chunk: Vec<u8>,
    timeout: Duration,
    info: DeviceInfo,
}

impl SerialFrameSource {
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn fill(&mut self) -> Result<(), SourceError> {
        match self.port.read(&mut self.chunk) {
            Ok(0) => Err(SourceError::Timeout(self.timeout)),
            Ok(n) => {
                self.assembler.extend(&self.chunk[..n]);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                Err(SourceError::Timeout(self.timeout))
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                Err(SourceError::Disconnected(e.to_string()))
            }
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}

impl FrameSource for SerialFrameSource {
    fn data_available(&mut self) -> Result<bool, SourceError> {
        if self.assembler.has_frame() {
            return Ok(true);
        }
        Ok(self.port.bytes_to_read()? > 0)
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, SourceError> {
        loop {
            if let Some(frame) = self.assembler.next_frame() {
                return Ok(frame);
            }
            self.fill()?;
        }
    }
}

/// Write half of an open serial port
pub struct SerialPacketSink {
    port: Box<dyn SerialPort>,
}

impl PacketSink for SerialPacketSink {
    fn write_packet(&mut self, packet: &[u8]) -> Result<(), SourceError> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        debug!(bytes = packet.len(), "feedback packet written");
        Ok(())
    }
}
