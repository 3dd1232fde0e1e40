// src/processing/preprocess.rs
//! Raw-sample cleanup ahead of peak detection

use crate::config::MetricsConfig;

/// Converts raw window samples into a floating-point signal for peak detection
pub trait Preprocessor: Send + Sync {
    fn clean(&self, samples: &[i32], sampling_rate_hz: u32) -> Vec<f64>;
}

/// Mean removal followed by a centred moving average
#[derive(Debug, Clone)]
pub struct BaselinePreprocessor {
    smoothing_secs: f64,
}

impl BaselinePreprocessor {
    pub fn new(smoothing_secs: f64) -> Self {
        Self { smoothing_secs }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(config.smoothing_secs)
    }

    /// Odd moving-average width in samples; 1 disables smoothing
    fn kernel_width(&self, sampling_rate_hz: u32) -> usize {
        let width = (self.smoothing_secs * f64::from(sampling_rate_hz)).round() as usize;
        if width <= 1 {
            1
        } else {
            width | 1
        }
    }
}

impl Preprocessor for BaselinePreprocessor {
    fn clean(&self, samples: &[i32], sampling_rate_hz: u32) -> Vec<f64> {
        if samples.is_empty() {
            return Vec::new();
        }

        let mean = samples.iter().map(|&v| f64::from(v)).sum::<f64>() / samples.len() as f64;
        let centred: Vec<f64> = samples.iter().map(|&v| f64::from(v) - mean).collect();

        moving_average(&centred, self.kernel_width(sampling_rate_hz))
    }
}

/// Centred moving average; the kernel shrinks at the edges
fn moving_average(signal: &[f64], width: usize) -> Vec<f64> {
    if width <= 1 || signal.len() < 2 {
        return signal.to_vec();
    }

    let half = width / 2;
    let mut prefix = Vec::with_capacity(signal.len() + 1);
    prefix.push(0.0);
    for &x in signal {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + x);
    }

    (0..signal.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(signal.len());
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}
