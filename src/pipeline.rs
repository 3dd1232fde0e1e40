// src/pipeline.rs
//! Producer/consumer orchestration of acquisition and evaluation
//!
//! The producer thread owns the frame source and runs the synchronizer and
//! window accumulator. Closed windows travel over a bounded channel to a
//! single consumer that preprocesses, detects peaks, evaluates metrics,
//! persists and reports. Records are therefore emitted in window closing
//! order and the results table has exactly one writer.

use crate::acquisition::{Acquirer, Interruption, Window};
use crate::config::VitalsConfig;
use crate::error::{VitalsError, VitalsResult};
use crate::hal::{FrameSource, PacketSink, SourceError};
use crate::processing::{
    peaks, BaselinePreprocessor, MetricsEvaluator, PeakExtractor, PeakSet, Preprocessor,
    ResultRecord,
};
use crate::sink::{CsvResultStore, DeviceFeedback, ResultSink, SerialFeedback};
use crate::utils::time::Clock;
use crate::utils::CancellationToken;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Work item handed from producer to consumer
#[derive(Debug)]
enum Job {
    Window(Window),
    /// Window cut short by a source failure, or by cancellation while
    /// recording only; stored but never evaluated
    Partial(Window),
}

/// Why the producer stopped
#[derive(Debug)]
pub enum StopReason {
    Cancelled,
    SyncTimeout { waited: Duration },
    SourceFailure(SourceError),
}

/// Outcome of a pipeline run
#[derive(Debug)]
pub struct RunSummary {
    pub windows_processed: u64,
    pub samples_collected: u64,
    pub frames_offered: u64,
    pub frames_lost: u64,
    pub records: Vec<ResultRecord>,
    pub window_files: Vec<PathBuf>,
    pub partial_window: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
    pub stop: StopReason,
}

impl RunSummary {
    /// Map the stop reason to an error for anything other than cancellation
    pub fn into_outcome(self) -> VitalsResult<()> {
        match self.stop {
            StopReason::Cancelled => Ok(()),
            StopReason::SyncTimeout { waited } => Err(VitalsError::SyncTimeout { waited }),
            StopReason::SourceFailure(e) => Err(VitalsError::Source(e)),
        }
    }
}

/// Consumer-side processing of one closed window
pub struct WindowProcessor {
    sampling_rate_hz: u32,
    record_only: bool,
    preprocessor: Box<dyn Preprocessor>,
    extractor: Box<dyn PeakExtractor>,
    evaluator: MetricsEvaluator,
}

impl WindowProcessor {
    pub fn new(config: &VitalsConfig) -> Self {
        Self {
            sampling_rate_hz: config.metrics.sampling_rate_hz,
            record_only: config.pipeline.record_only,
            preprocessor: Box::new(BaselinePreprocessor::from_config(&config.metrics)),
            extractor: peaks::from_config(&config.metrics),
            evaluator: MetricsEvaluator::new(config.metrics.clone()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: MetricsEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Box<dyn Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn PeakExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Persist the raw window and, unless recording only, evaluate and store its metrics
    pub fn process(
        &self,
        window: &Window,
        sink: &mut dyn ResultSink,
    ) -> VitalsResult<(PathBuf, Option<ResultRecord>)> {
        let path = sink.persist_window(window)?;
        if self.record_only {
            return Ok((path, None));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| window.id());

        let signal = self.preprocessor.clean(&window.values(), self.sampling_rate_hz);
        let peaks = self
            .extractor
            .extract(&signal, self.sampling_rate_hz)
            .unwrap_or_else(|e| {
                warn!(window = %window.id(), error = %e, "peak extractor returned invalid peaks");
                PeakSet::empty()
            });

        let record = self.evaluator.evaluate(filename, &peaks, &signal);
        sink.persist_result(&record)?;

        info!(
            window = %window.id(),
            peaks = peaks.len(),
            heart_rate = ?record.heart_rate.value(),
            unavailable = ?record.unavailable_metrics(),
            "window evaluated"
        );
        Ok((path, Some(record)))
    }
}

/// Full acquisition and derivation pipeline
pub struct VitalsPipeline {
    config: Arc<VitalsConfig>,
    clock: Arc<dyn Clock>,
    /// Clock used for feedback pacing; defaults to the acquisition clock
    feedback_clock: Arc<dyn Clock>,
    processor: WindowProcessor,
}

impl VitalsPipeline {
    pub fn new(config: Arc<VitalsConfig>, clock: Arc<dyn Clock>) -> Self {
        let processor = WindowProcessor::new(&config);
        Self {
            config,
            feedback_clock: clock.clone(),
            clock,
            processor,
        }
    }

    pub fn with_feedback_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.feedback_clock = clock;
        self
    }

    pub fn with_processor(mut self, processor: WindowProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Run with CSV persistence in `output.directory` and paced device feedback
    pub fn run<S, P>(
        &self,
        source: S,
        packet_sink: P,
        cancel: &CancellationToken,
    ) -> VitalsResult<RunSummary>
    where
        S: FrameSource,
        P: PacketSink + 'static,
    {
        let experiment_start = self.clock.now_seconds();
        let store = CsvResultStore::new(
            &self.config.output.directory,
            &self.config.output.subject_id,
            experiment_start,
        )?;
        let results_path = store.results_path().to_path_buf();

        let feedback: Option<Box<dyn DeviceFeedback>> = if self.config.feedback.enabled {
            Some(Box::new(SerialFeedback::new(
                packet_sink,
                self.feedback_clock.clone(),
                self.config.feedback.pacing(),
            )))
        } else {
            None
        };

        info!(
            experiment_start = %experiment_start,
            results = %results_path.display(),
            "experiment started"
        );

        let mut summary = self.run_with(source, Box::new(store), feedback, cancel)?;
        if !self.config.pipeline.record_only {
            summary.results_path = Some(results_path);
        }
        Ok(summary)
    }

    /// Run against arbitrary sinks
    pub fn run_with<S: FrameSource>(
        &self,
        mut source: S,
        mut sink: Box<dyn ResultSink>,
        mut feedback: Option<Box<dyn DeviceFeedback>>,
        cancel: &CancellationToken,
    ) -> VitalsResult<RunSummary> {
        let (tx, rx) = bounded::<Job>(self.config.pipeline.queue_capacity);

        let (stop, consumed) = thread::scope(|scope| {
            let producer = thread::Builder::new()
                .name("vitals-acquisition".to_string())
                .spawn_scoped(scope, || self.produce(&mut source, tx, cancel))
                .map_err(|e| VitalsError::pipeline("producer", e.to_string()))?;

            let consumer = thread::Builder::new()
                .name("vitals-evaluation".to_string())
                .spawn_scoped(scope, || {
                    let feedback = feedback
                        .as_mut()
                        .map(|f| f.as_mut() as &mut dyn DeviceFeedback);
                    self.consume(rx, sink.as_mut(), feedback, cancel)
                })
                .map_err(|e| VitalsError::pipeline("consumer", e.to_string()))?;

            let consumed = consumer
                .join()
                .map_err(|_| VitalsError::pipeline("consumer", "worker panicked"))?;
            let stop = producer
                .join()
                .map_err(|_| VitalsError::pipeline("producer", "worker panicked"))?;
            Ok::<_, VitalsError>((stop, consumed))
        })?;

        let mut summary = consumed?;
        summary.stop = stop;

        info!(
            windows = summary.windows_processed,
            samples = summary.samples_collected,
            frames_lost = summary.frames_lost,
            stop = ?summary.stop,
            "run finished"
        );
        Ok(summary)
    }

    fn produce(
        &self,
        source: &mut dyn FrameSource,
        tx: Sender<Job>,
        cancel: &CancellationToken,
    ) -> StopReason {
        let mut acquirer = Acquirer::new(&self.config, self.clock.clone());

        loop {
            match acquirer.next_window(source, cancel) {
                Ok(window) => {
                    if tx.send(Job::Window(window)).is_err() {
                        // Consumer stopped on an error; it reports the cause
                        return StopReason::Cancelled;
                    }
                }
                Err(Interruption::Cancelled {
                    discarded_samples,
                    partial,
                }) => {
                    match partial {
                        Some(window) => {
                            info!(
                                samples = window.len(),
                                "acquisition cancelled, open window kept"
                            );
                            let _ = tx.send(Job::Partial(window));
                        }
                        None => {
                            info!(discarded_samples, "acquisition cancelled, open window discarded")
                        }
                    }
                    return StopReason::Cancelled;
                }
                Err(Interruption::SyncTimeout { waited }) => {
                    error!(?waited, "no minute boundary observed");
                    return StopReason::SyncTimeout { waited };
                }
                Err(Interruption::SourceFailure { error, partial }) => {
                    error!(%error, "frame source failed");
                    if let Some(window) = partial {
                        let _ = tx.send(Job::Partial(window));
                    }
                    return StopReason::SourceFailure(error);
                }
            }
        }
    }

    fn consume(
        &self,
        rx: Receiver<Job>,
        sink: &mut dyn ResultSink,
        mut feedback: Option<&mut dyn DeviceFeedback>,
        cancel: &CancellationToken,
    ) -> VitalsResult<RunSummary> {
        let mut summary = RunSummary {
            windows_processed: 0,
            samples_collected: 0,
            frames_offered: 0,
            frames_lost: 0,
            records: Vec::new(),
            window_files: Vec::new(),
            partial_window: None,
            results_path: None,
            stop: StopReason::Cancelled,
        };

        // Drains queued windows after the producer hangs up
        for job in rx.iter() {
            match job {
                Job::Window(window) => {
                    summary.windows_processed += 1;
                    summary.samples_collected += window.len() as u64;
                    summary.frames_offered += window.frames_offered();
                    summary.frames_lost += window.frames_lost();

                    let (path, record) = match self.processor.process(&window, sink) {
                        Ok(processed) => processed,
                        Err(e) => {
                            error!(window = %window.id(), error = %e, "persisting window failed");
                            cancel.cancel();
                            return Err(e);
                        }
                    };
                    summary.window_files.push(path);

                    if let (Some(record), Some(feedback)) = (&record, feedback.as_mut()) {
                        if let Err(e) = feedback.send_metrics(record) {
                            warn!(window = %window.id(), error = %e, "device feedback failed");
                        }
                    }
                    summary.records.extend(record);
                }
                Job::Partial(window) => {
                    summary.frames_offered += window.frames_offered();
                    summary.frames_lost += window.frames_lost();
                    match sink.persist_partial(&window) {
                        Ok(path) => summary.partial_window = Some(path),
                        Err(e) => warn!(error = %e, "partial window could not be stored"),
                    }
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::simulator::{RecordingPacketSink, SimulatedEcgSource, SimulatorConfig};
    use crate::sink::SinkError;
    use crate::utils::time::ManualClock;
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    /// In-memory sink that can be told to fail
    #[derive(Default, Clone)]
    struct MemorySink {
        windows: Arc<Mutex<Vec<String>>>,
        partials: Arc<Mutex<Vec<usize>>>,
        records: Arc<Mutex<Vec<ResultRecord>>>,
        fail_results: bool,
    }

    impl ResultSink for MemorySink {
        fn persist_window(&mut self, window: &Window) -> Result<PathBuf, SinkError> {
            self.windows.lock().push(window.id());
            Ok(PathBuf::from(format!("{}.csv", window.id())))
        }

        fn persist_partial(&mut self, window: &Window) -> Result<PathBuf, SinkError> {
            self.partials.lock().push(window.len());
            Ok(PathBuf::from("partial.csv"))
        }

        fn persist_result(&mut self, record: &ResultRecord) -> Result<(), SinkError> {
            if self.fail_results {
                return Err(SinkError::Io(std::io::Error::other("disk full")));
            }
            self.records.lock().push(record.clone());
            Ok(())
        }
    }

    fn setup(window_minutes: u32, frame_limit: u64) -> (VitalsPipeline, SimulatedEcgSource) {
        let start = NaiveDate::from_ymd_opt(2021, 4, 4)
            .unwrap()
            .and_hms_opt(8, 49, 59)
            .unwrap();
        let clock = Arc::new(ManualClock::new(start));

        let mut config = VitalsConfig::default();
        config.acquisition.window_minutes = window_minutes;
        let config = Arc::new(config);

        let sim = SimulatorConfig {
            frame_limit: Some(frame_limit),
            ..SimulatorConfig::sinusoid(100, 60.0)
        };
        let source = SimulatedEcgSource::new(sim, clock.clone()).unwrap();
        (VitalsPipeline::new(config, clock), source)
    }

    #[test]
    fn test_windows_processed_in_order_until_source_fails() {
        // 1 s alignment, two full 1-minute windows, 30 s of a third
        let (pipeline, source) = setup(1, 100 + 2 * 6000 + 3000);
        let sink = MemorySink::default();
        let recorder = RecordingPacketSink::new();
        let feedback: Box<dyn DeviceFeedback> = Box::new(SerialFeedback::new(
            recorder.clone(),
            Arc::new(ManualClock::new(chrono::NaiveDateTime::default())),
            Duration::ZERO,
        ));

        let summary = pipeline
            .run_with(source, Box::new(sink.clone()), Some(feedback), &CancellationToken::new())
            .unwrap();

        assert_eq!(summary.windows_processed, 2);
        assert_eq!(
            *sink.windows.lock(),
            vec!["04-04-2021_08:51:00".to_string(), "04-04-2021_08:52:00".to_string()]
        );
        assert_eq!(*sink.partials.lock(), vec![3000]);
        assert_eq!(summary.records.len(), 2);
        assert!(matches!(summary.stop, StopReason::SourceFailure(_)));
        assert_eq!(recorder.packets().len(), 8);
        for record in &summary.records {
            let hr = record.heart_rate.value().copied().unwrap();
            assert!((hr - 60.0).abs() < 0.5, "hr = {hr}");
        }
    }

    #[test]
    fn test_sink_failure_stops_run() {
        let (pipeline, source) = setup(1, 1_000_000);
        let sink = MemorySink {
            fail_results: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let result = pipeline.run_with(source, Box::new(sink), None, &cancel);
        assert!(matches!(result, Err(VitalsError::Sink(_))));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_cancelled_before_start() {
        let (pipeline, source) = setup(1, 1_000_000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = pipeline
            .run_with(source, Box::new(MemorySink::default()), None, &cancel)
            .unwrap();
        assert_eq!(summary.windows_processed, 0);
        assert!(matches!(summary.stop, StopReason::Cancelled));
        assert!(summary.into_outcome().is_ok());
    }
}
