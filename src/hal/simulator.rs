//! Synthetic ECG device
//!
//! Produces the same line protocol as the serial device (`"<int>\r\n"`),
//! one frame per sample period, advancing a [`ManualClock`] as frames are
//! read. This lets a full acquisition window of several minutes run in a
//! fraction of a second and makes every run reproducible from its seed.

use crate::config::constants::{signal, simulation};
use crate::hal::{DeviceInfo, DeviceType, FrameSource, PacketSink, SourceError};
use crate::utils::time::ManualClock;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

/// Shape of the generated signal
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// Pure sinusoid at the heart-rate frequency
    Sinusoid,
    /// Narrow R spike plus a broad T wave per beat
    EcgLike,
}

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub sampling_rate_hz: u32,
    pub heart_rate_bpm: f64,
    pub baseline: i32,
    pub amplitude: f64,
    pub noise_level: f64,
    pub waveform: Waveform,
    /// Probability that a frame is replaced by garbage bytes
    pub malformed_probability: f64,
    /// Report a disconnect after this many frames
    pub frame_limit: Option<u64>,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: signal::DEFAULT_SAMPLING_RATE_HZ,
            heart_rate_bpm: simulation::DEFAULT_HEART_RATE_BPM,
            baseline: simulation::DEFAULT_BASELINE,
            amplitude: simulation::DEFAULT_AMPLITUDE,
            noise_level: simulation::DEFAULT_NOISE_LEVEL,
            waveform: Waveform::EcgLike,
            malformed_probability: 0.0,
            frame_limit: None,
            seed: simulation::DEFAULT_SEED,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.sampling_rate_hz == 0 {
            return Err(SourceError::Configuration(
                "Simulator sampling rate must be greater than 0".to_string(),
            ));
        }
        if !(simulation::MIN_HEART_RATE_BPM..=simulation::MAX_HEART_RATE_BPM)
            .contains(&self.heart_rate_bpm)
        {
            return Err(SourceError::Configuration(format!(
                "Simulator heart rate out of range: {}",
                self.heart_rate_bpm
            )));
        }
        if !(0.0..=1.0).contains(&self.malformed_probability) {
            return Err(SourceError::Configuration(
                "Malformed frame probability must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.noise_level < 0.0 {
            return Err(SourceError::Configuration(
                "Simulator noise level cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Clean sinusoid at `heart_rate_bpm`, no noise, no losses
    pub fn sinusoid(sampling_rate_hz: u32, heart_rate_bpm: f64) -> Self {
        Self {
            sampling_rate_hz,
            heart_rate_bpm,
            noise_level: 0.0,
            waveform: Waveform::Sinusoid,
            ..Default::default()
        }
    }

    /// Stream in which every frame is garbage
    pub fn all_malformed(sampling_rate_hz: u32) -> Self {
        Self {
            sampling_rate_hz,
            malformed_probability: 1.0,
            ..Default::default()
        }
    }
}

/// Deterministic synthetic ECG source
pub struct SimulatedEcgSource {
    config: SimulatorConfig,
    clock: Arc<ManualClock>,
    rng: StdRng,
    frames_emitted: u64,
    frame_period: Duration,
}

impl SimulatedEcgSource {
    pub fn new(config: SimulatorConfig, clock: Arc<ManualClock>) -> Result<Self, SourceError> {
        config.validate()?;
        let frame_period = Duration::from_nanos(1_000_000_000 / u64::from(config.sampling_rate_hz));
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            clock,
            rng,
            frames_emitted: 0,
            frame_period,
        })
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            device_type: DeviceType::Simulator,
            name: format!("ECG simulator ({:?})", self.config.waveform),
        }
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    fn exhausted(&self) -> bool {
        self.config
            .frame_limit
            .is_some_and(|limit| self.frames_emitted >= limit)
    }

    /// Amplitude of sample `n`
    fn sample_value(&mut self, n: u64) -> i32 {
        let fs = f64::from(self.config.sampling_rate_hz);
        let beat_hz = self.config.heart_rate_bpm / 60.0;
        let t = n as f64 / fs;

        let shape = match self.config.waveform {
            Waveform::Sinusoid => (2.0 * PI * beat_hz * t).sin(),
            Waveform::EcgLike => {
                let phase = (t * beat_hz).fract();
                let r_wave = gaussian(phase, 0.25, 0.012);
                let t_wave = 0.25 * gaussian(phase, 0.55, 0.05);
                r_wave + t_wave
            }
        };

        let noise = if self.config.noise_level > 0.0 {
            self.rng.gen_range(-1.0..=1.0) * self.config.noise_level * self.config.amplitude
        } else {
            0.0
        };

        (f64::from(self.config.baseline) + self.config.amplitude * shape + noise).round() as i32
    }

    fn garbage_frame(&mut self) -> Vec<u8> {
        match self.rng.gen_range(0..3) {
            0 => b"\xff\xfe\r\n".to_vec(),
            1 => b"5a1\r\n".to_vec(),
            _ => b"\r\n".to_vec(),
        }
    }
}

fn gaussian(x: f64, mu: f64, sigma: f64) -> f64 {
    (-((x - mu).powi(2)) / (2.0 * sigma * sigma)).exp()
}

impl FrameSource for SimulatedEcgSource {
    fn data_available(&mut self) -> Result<bool, SourceError> {
        if self.exhausted() {
            return Err(SourceError::Disconnected(
                "simulated device reached its frame limit".to_string(),
            ));
        }
        Ok(true)
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, SourceError> {
        if self.exhausted() {
            return Err(SourceError::Disconnected(
                "simulated device reached its frame limit".to_string(),
            ));
        }

        let n = self.frames_emitted;
        self.frames_emitted += 1;
        self.clock.advance_by(self.frame_period);

        let malformed = self.config.malformed_probability > 0.0
            && self.rng.gen_bool(self.config.malformed_probability);
        if malformed {
            return Ok(self.garbage_frame());
        }

        let value = self.sample_value(n);
        Ok(format!("{value}\r\n").into_bytes())
    }
}

/// Packet sink that records everything written to it
#[derive(Debug, Clone, Default)]
pub struct RecordingPacketSink {
    packets: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingPacketSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the packets written so far
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.packets.lock().clone()
    }

    pub fn packets_as_text(&self) -> Vec<String> {
        self.packets()
            .iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect()
    }
}

impl PacketSink for RecordingPacketSink {
    fn write_packet(&mut self, packet: &[u8]) -> Result<(), SourceError> {
        self.packets.lock().push(packet.to_vec());
        Ok(())
    }
}
