// src/processing/mod.rs
//! Window processing: cleanup, peak detection and metric derivation

pub mod estimators;
pub mod metrics;
pub mod peaks;
pub mod preprocess;

pub use estimators::*;
pub use metrics::*;
pub use peaks::{AmpdExtractor, LocalMaximaExtractor, PeakExtractor, PeakSet, PeakSetError};
pub use preprocess::{BaselinePreprocessor, Preprocessor};
