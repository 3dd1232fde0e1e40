//! ECG-Vitals: wall-clock aligned ECG acquisition and vitals derivation
//!
//! This library reads an integer ECG stream from a serial device, cuts it
//! into minute-aligned windows and derives vitals from each window:
//!
//! - Hardware abstraction over serial and simulated frame sources
//! - Minute-boundary synchronization and tolerant frame parsing with loss accounting
//! - AMPD and local-maxima peak detection
//! - Heart rate plus fault-isolated fatigue, blood pressure and AFIB estimators
//! - CSV persistence and paced feedback packets to the device
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ecg_vitals::config::VitalsConfig;
//! use ecg_vitals::hal::simulator::{RecordingPacketSink, SimulatedEcgSource, SimulatorConfig};
//! use ecg_vitals::utils::{CancellationToken, ManualClock, SystemClock, Clock};
//! use ecg_vitals::VitalsPipeline;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(VitalsConfig::default());
//!     let clock = Arc::new(ManualClock::new(SystemClock.now()));
//!     let source = SimulatedEcgSource::new(SimulatorConfig::default(), clock.clone())?;
//!
//!     let pipeline = VitalsPipeline::new(config, clock);
//!     let summary = pipeline.run(source, RecordingPacketSink::new(), &CancellationToken::new())?;
//!     println!("{} windows processed", summary.windows_processed);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod pipeline;
pub mod processing;
pub mod sink;
pub mod utils;

// Re-export commonly used types for convenience
pub use acquisition::{Acquirer, Window};
pub use config::{ConfigLoader, VitalsConfig};
pub use error::{VitalsError, VitalsResult};
pub use hal::{FrameSource, PacketSink, Sample, SourceError};
pub use pipeline::{RunSummary, StopReason, VitalsPipeline, WindowProcessor};
pub use processing::{Metric, MetricsEvaluator, ResultRecord};
pub use utils::{CancellationToken, Clock};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Wall-clock aligned ECG acquisition and vitals derivation".to_string(),
        features: vec![
            "Serial and simulated ECG sources".to_string(),
            "Minute-aligned windowing with loss accounting".to_string(),
            "AMPD and local-maxima peak detection".to_string(),
            "Fault-isolated metric estimators".to_string(),
            "CSV persistence and device feedback".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
