// src/config/constants.rs
//! System-wide configuration constants

/// Signal and sampling constants
pub mod signal {
    pub const DEFAULT_SAMPLING_RATE_HZ: u32 = 100;
    pub const MIN_SAMPLING_RATE_HZ: u32 = 10;
    pub const MAX_SAMPLING_RATE_HZ: u32 = 10_000;
}

/// Window acquisition constants
pub mod acquisition {
    pub const DEFAULT_WINDOW_MINUTES: u32 = 5;
    pub const MIN_WINDOW_MINUTES: u32 = 1;
    pub const MAX_WINDOW_MINUTES: u32 = 59;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5;
    pub const MAX_POLL_INTERVAL_MS: u64 = 1_000;
    pub const MINUTES_PER_HOUR: u32 = 60;
}

/// Serial transport constants
pub mod serial {
    pub const DEFAULT_PORT_NAME: &str = "/dev/ttyUSB0";
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
    pub const MAX_BAUD_RATE: u32 = 4_000_000;
    pub const DEFAULT_READ_TIMEOUT_MS: u32 = 100;
    pub const MAX_READ_TIMEOUT_MS: u32 = 60_000;
    pub const DEFAULT_READ_CHUNK_SIZE: usize = 256;
    pub const MAX_READ_CHUNK_SIZE: usize = 65_536;
    pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64;
    pub const MIN_FRAME_LENGTH: usize = 8;
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 100;
}

/// Peak detection and metric defaults
pub mod metrics {
    pub const DEFAULT_SMOOTHING_SECS: f64 = 0.03;
    pub const DEFAULT_AMPD_SEGMENT_SECS: f64 = 10.0;
    pub const DEFAULT_MIN_PEAK_DISTANCE_SECS: f64 = 0.25;
    pub const DEFAULT_THRESHOLD_STD: f64 = 0.5;
    /// Local-maxima peaks must also reach this share of the 99th-percentile amplitude
    pub const DEFAULT_RELATIVE_HEIGHT: f64 = 0.5;

    pub const DEFAULT_FATIGUE_MIN_BEATS: usize = 30;
    pub const DEFAULT_RMSSD_FATIGUED_MS: f64 = 20.0;
    pub const DEFAULT_RMSSD_RESTED_MS: f64 = 50.0;

    pub const DEFAULT_SBP_INTERCEPT: f64 = 95.0;
    pub const DEFAULT_SBP_SLOPE: f64 = 0.35;
    pub const DEFAULT_DBP_INTERCEPT: f64 = 60.0;
    pub const DEFAULT_DBP_SLOPE: f64 = 0.2;
    pub const MAX_PLAUSIBLE_SBP: f64 = 260.0;
    pub const MIN_PLAUSIBLE_DBP: f64 = 30.0;

    pub const DEFAULT_AFIB_MIN_BEATS: usize = 30;
    pub const DEFAULT_IRREGULARITY_THRESHOLD: f64 = 0.15;

    /// Status written for a fatigue result that could not be computed
    pub const FATIGUE_SENTINEL: &str = "NONE";
    /// Heart-rate column value for an unavailable heart rate
    pub const HEART_RATE_SENTINEL: &str = "NONE";
}

/// Persistence constants
pub mod output {
    pub const DEFAULT_DIRECTORY: &str = "recordings";
    pub const DEFAULT_SUBJECT_ID: &str = "subject";
    pub const RAW_FILE_INFIX: &str = "_ecg_data_";
    pub const PARTIAL_FILE_SUFFIX: &str = "_partial";
    pub const RESULTS_FILE_PREFIX: &str = "DATAFRAME_RESULTS_";
}

/// Device feedback constants
pub mod feedback {
    pub const DEFAULT_PACING_MS: u64 = 1_000;
    pub const MAX_PACING_MS: u64 = 10_000;
    pub const PACKET_TERMINATOR: &str = "\r\n";
}

/// Producer/consumer pipeline constants
pub mod pipeline {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
    pub const MAX_QUEUE_CAPACITY: usize = 64;
}

/// Simulation defaults
pub mod simulation {
    pub const DEFAULT_HEART_RATE_BPM: f64 = 72.0;
    pub const MIN_HEART_RATE_BPM: f64 = 20.0;
    pub const MAX_HEART_RATE_BPM: f64 = 250.0;
    pub const DEFAULT_BASELINE: i32 = 512;
    pub const DEFAULT_AMPLITUDE: f64 = 300.0;
    pub const DEFAULT_NOISE_LEVEL: f64 = 0.02;
    pub const DEFAULT_SEED: u64 = 0x5EED_EC6;
}

/// Configuration file discovery
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "vitals.toml";
    pub const LOCAL_CONFIG_FILE: &str = "config/vitals.toml";
    pub const ENV_PREFIX: &str = "VITALS_";
}
