// src/acquisition/acquirer.rs
//! Synchronize-then-accumulate loop producing closed windows

use crate::acquisition::time_sync::{SyncError, TimeSynchronizer};
use crate::acquisition::window::{Window, WindowAccumulator};
use crate::config::{AcquisitionConfig, VitalsConfig};
use crate::hal::{FrameSource, SourceError};
use crate::utils::time::Clock;
use crate::utils::CancellationToken;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why [`Acquirer::next_window`] did not produce a window
#[derive(Debug)]
pub enum Interruption {
    /// Cancellation observed; the open window is dropped unless
    /// partial windows are kept, in which case it is returned closed
    Cancelled {
        discarded_samples: usize,
        partial: Option<Window>,
    },
    /// No minute boundary within the configured timeout
    SyncTimeout { waited: Duration },
    /// Fatal transport failure, with whatever was collected so far
    SourceFailure {
        error: SourceError,
        partial: Option<Window>,
    },
}

/// Drives a frame source through synchronization and window accumulation
pub struct Acquirer {
    clock: Arc<dyn Clock>,
    synchronizer: TimeSynchronizer,
    window_duration: Duration,
    poll_interval: Duration,
    expected_samples: usize,
    keep_partial_on_cancel: bool,
    windows_closed: u64,
}

impl Acquirer {
    pub fn new(config: &VitalsConfig, clock: Arc<dyn Clock>) -> Self {
        let acquisition: &AcquisitionConfig = &config.acquisition;
        let expected_samples = acquisition.window_duration().as_secs() as usize
            * config.metrics.sampling_rate_hz as usize;

        Self {
            synchronizer: TimeSynchronizer::new(
                clock.clone(),
                acquisition.poll_interval(),
                acquisition.sync_timeout(),
            ),
            clock,
            window_duration: acquisition.window_duration(),
            poll_interval: acquisition.poll_interval(),
            expected_samples,
            keep_partial_on_cancel: config.pipeline.record_only,
            windows_closed: 0,
        }
    }

    pub fn windows_closed(&self) -> u64 {
        self.windows_closed
    }

    /// Align to the next minute boundary and collect one full window
    pub fn next_window(
        &mut self,
        source: &mut dyn FrameSource,
        cancel: &CancellationToken,
    ) -> Result<Window, Interruption> {
        let sync = self
            .synchronizer
            .wait_for_alignment(source, cancel)
            .map_err(|e| match e {
                SyncError::Cancelled => Interruption::Cancelled {
                    discarded_samples: 0,
                    partial: None,
                },
                SyncError::Timeout { waited } => Interruption::SyncTimeout { waited },
                SyncError::Source(error) => Interruption::SourceFailure {
                    error,
                    partial: None,
                },
            })?;

        info!(
            start = %sync.at,
            frames_discarded = sync.frames_discarded,
            "window opened"
        );

        let mut acc = WindowAccumulator::open(sync.at, self.window_duration, self.expected_samples);

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(acc));
            }

            match source.data_available() {
                Ok(true) => match source.read_frame() {
                    Ok(frame) => {
                        let timestamp = self.clock.now_seconds();
                        if let Err(reason) = acc.offer(&frame, timestamp) {
                            debug!(%reason, frames_lost = acc.tally().lost, "malformed frame");
                        }
                    }
                    Err(e) if e.is_transient() => {}
                    Err(error) => return Err(self.fail(acc, error)),
                },
                Ok(false) => self.clock.sleep(self.poll_interval),
                Err(e) if e.is_transient() => self.clock.sleep(self.poll_interval),
                Err(error) => return Err(self.fail(acc, error)),
            }

            let now = self.clock.now();
            if acc.is_due(now) {
                let minutes = acc.elapsed_minutes(now);
                let window = acc.close(now);
                self.windows_closed += 1;

                if window.frames_lost() > 0 {
                    warn!(
                        window = %window.id(),
                        frames_lost = window.frames_lost(),
                        frames_offered = window.frames_offered(),
                        loss_ratio = window.tally().loss_ratio(),
                        "window closed with lost frames"
                    );
                }
                info!(
                    window = %window.id(),
                    minutes,
                    samples = window.len(),
                    frames_lost = window.frames_lost(),
                    "window closed"
                );
                return Ok(window);
            }
        }
    }

    fn cancelled(&self, acc: WindowAccumulator) -> Interruption {
        if self.keep_partial_on_cancel && acc.tally().offered > 0 {
            let partial = acc.close(self.clock.now());
            info!(samples = partial.len(), "cancelled with window open, keeping partial window");
            return Interruption::Cancelled {
                discarded_samples: 0,
                partial: Some(partial),
            };
        }
        Interruption::Cancelled {
            discarded_samples: acc.len(),
            partial: None,
        }
    }

    fn fail(&self, acc: WindowAccumulator, error: SourceError) -> Interruption {
        warn!(%error, samples = acc.len(), "source failed with window open");
        let partial = acc.close(self.clock.now());
        Interruption::SourceFailure {
            error,
            partial: Some(partial),
        }
    }
}
