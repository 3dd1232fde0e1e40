//! ecg-vitals command-line entry point
//!
//! Loads the configuration, opens the serial device (or the simulator) and
//! runs the acquisition pipeline until Ctrl-C or a device failure.

use clap::Parser;
use ecg_vitals::config::{ConfigError, ConfigLoader, VitalsConfig};
use ecg_vitals::hal::serial_driver::SerialDevice;
use ecg_vitals::hal::simulator::{RecordingPacketSink, SimulatedEcgSource, SimulatorConfig};
use ecg_vitals::hal::SourceError;
use ecg_vitals::utils::{CancellationToken, Clock, ManualClock, SystemClock};
use ecg_vitals::{RunSummary, StopReason, VitalsError, VitalsPipeline, VitalsResult};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "ecg-vitals",
    version,
    about = "Minute-aligned ECG acquisition and vitals derivation"
)]
struct Cli {
    /// Configuration file (TOML); defaults to vitals.toml discovery
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the ECG device
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Window length in minutes
    #[arg(short, long)]
    window_minutes: Option<u32>,

    /// Directory for raw windows and the results table
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Subject identifier used in raw window file names
    #[arg(long)]
    subject: Option<String>,

    /// Store raw windows only, skip evaluation and feedback
    #[arg(long)]
    record_only: bool,

    /// Run against the built-in ECG simulator instead of a serial device
    #[arg(long)]
    simulate: bool,

    /// Simulated minutes of signal before the simulator disconnects
    #[arg(long, default_value_t = 10)]
    simulate_minutes: u64,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut VitalsConfig) {
        if let Some(port) = &self.port {
            config.serial.port_name = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(minutes) = self.window_minutes {
            config.acquisition.window_minutes = minutes;
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(subject) = &self.subject {
            config.output.subject_id = subject.clone();
        }
        if self.record_only {
            config.pipeline.record_only = true;
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ecg_vitals=info,vitals_main=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();
}

fn load_config(cli: &Cli) -> Result<VitalsConfig, ConfigError> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_file(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    cli.apply_overrides(&mut config);
    config
        .validate_consistency()
        .map_err(ConfigError::ValidationError)?;
    Ok(config)
}

fn run_simulated(
    config: Arc<VitalsConfig>,
    minutes: u64,
    cancel: &CancellationToken,
) -> VitalsResult<RunSummary> {
    let sampling_rate_hz = config.metrics.sampling_rate_hz;
    let simulator = SimulatorConfig {
        sampling_rate_hz,
        frame_limit: Some(minutes * 60 * u64::from(sampling_rate_hz)),
        ..Default::default()
    };

    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let feedback_clock = Arc::new(ManualClock::new(SystemClock.now()));
    let source = SimulatedEcgSource::new(simulator, clock.clone())?;
    info!(device = %source.device_info().name, minutes, "starting simulated acquisition");

    let packets = RecordingPacketSink::new();
    let summary = VitalsPipeline::new(config, clock)
        .with_feedback_clock(feedback_clock)
        .run(source, packets.clone(), cancel)?;

    for packet in packets.packets_as_text() {
        info!(packet = packet.trim_end(), "simulated device received");
    }
    Ok(summary)
}

fn run_serial(config: Arc<VitalsConfig>, cancel: &CancellationToken) -> VitalsResult<RunSummary> {
    let (source, sink) = SerialDevice::open(&config.serial)?;
    info!(device = %source.device_info().name, "starting acquisition");

    VitalsPipeline::new(config, Arc::new(SystemClock)).run(source, sink, cancel)
}

fn report(summary: &RunSummary) {
    println!("Windows processed : {}", summary.windows_processed);
    println!("Samples collected : {}", summary.samples_collected);
    println!(
        "Frames lost       : {} of {}",
        summary.frames_lost, summary.frames_offered
    );
    for record in &summary.records {
        let hr = record
            .heart_rate
            .value()
            .map_or_else(|| "NONE".to_string(), |hr| format!("{hr:.2}"));
        println!("  {} -> HR {}", record.filename, hr);
    }
    if let Some(path) = &summary.results_path {
        println!("Results table     : {}", path.display());
    }
    if let Some(path) = &summary.partial_window {
        println!("Partial window    : {}", path.display());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!(summary = ?config.get_summary(), "{}", ecg_vitals::version_info().name);

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                watcher.cancel();
            }
            Err(e) => warn!(error = %e, "failed to install Ctrl-C handler"),
        }
    });

    let config = Arc::new(config);
    let simulate = cli.simulate;
    let minutes = cli.simulate_minutes;
    let summary = tokio::task::spawn_blocking(move || {
        if simulate {
            run_simulated(config, minutes, &cancel)
        } else {
            run_serial(config, &cancel)
        }
    })
    .await
    .map_err(|e| VitalsError::pipeline("main", e.to_string()))??;

    report(&summary);

    // The simulator ends its stream by disconnecting
    if simulate && matches!(summary.stop, StopReason::SourceFailure(SourceError::Disconnected(_))) {
        info!("simulated stream finished");
        return Ok(());
    }

    summary.into_outcome().map_err(Into::into)
}
