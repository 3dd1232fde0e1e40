use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ecg_vitals::config::MetricsConfig;
use ecg_vitals::processing::{
    AmpdExtractor, BaselinePreprocessor, LocalMaximaExtractor, MetricsEvaluator, PeakExtractor,
    PeakSet, Preprocessor,
};
use std::f64::consts::PI;

const SAMPLING_RATE_HZ: u32 = 100;
const WINDOW_MINUTES: &[usize] = &[1, 5, 10];

/// R spike plus T wave at 72 bpm with a slow baseline wander
fn ecg_like(len: usize) -> Vec<i32> {
    let fs = f64::from(SAMPLING_RATE_HZ);
    let beat_hz = 72.0 / 60.0;
    (0..len)
        .map(|n| {
            let t = n as f64 / fs;
            let phase = (t * beat_hz).fract();
            let r = (-((phase - 0.25).powi(2)) / (2.0 * 0.012f64.powi(2))).exp();
            let tw = 0.25 * (-((phase - 0.55).powi(2)) / (2.0 * 0.05f64.powi(2))).exp();
            let wander = 40.0 * (2.0 * PI * 0.2 * t).sin();
            (512.0 + 300.0 * (r + tw) + wander).round() as i32
        })
        .collect()
}

fn benchmark_extractors(c: &mut Criterion) {
    let mut group = c.benchmark_group("peak_extraction");
    let preprocessor = BaselinePreprocessor::new(0.03);
    let ampd = AmpdExtractor::new(10.0, 0.25);
    let local = LocalMaximaExtractor::new(0.5, 0.25);

    for &minutes in WINDOW_MINUTES {
        let len = minutes * 60 * SAMPLING_RATE_HZ as usize;
        let signal = preprocessor.clean(&ecg_like(len), SAMPLING_RATE_HZ);
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("ampd", minutes), &signal, |b, signal| {
            b.iter(|| ampd.extract(black_box(signal), SAMPLING_RATE_HZ))
        });
        group.bench_with_input(
            BenchmarkId::new("local_maxima", minutes),
            &signal,
            |b, signal| b.iter(|| local.extract(black_box(signal), SAMPLING_RATE_HZ)),
        );
    }

    group.finish();
}

fn benchmark_window_evaluation(c: &mut Criterion) {
    let raw = ecg_like(5 * 60 * SAMPLING_RATE_HZ as usize);
    let preprocessor = BaselinePreprocessor::new(0.03);
    let extractor = AmpdExtractor::new(10.0, 0.25);
    let evaluator = MetricsEvaluator::new(MetricsConfig::default());

    c.bench_function("evaluate_5min_window", |b| {
        b.iter(|| {
            let signal = preprocessor.clean(black_box(&raw), SAMPLING_RATE_HZ);
            let peaks = extractor
                .extract(&signal, SAMPLING_RATE_HZ)
                .unwrap_or_else(|_| PeakSet::empty());
            evaluator.evaluate("bench.csv", &peaks, &signal)
        })
    });
}

criterion_group!(benches, benchmark_extractors, benchmark_window_evaluation);
criterion_main!(benches);
