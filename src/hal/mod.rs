// src/hal/mod.rs
//! Hardware Abstraction Layer for ECG devices

pub mod traits;
pub mod types;
pub mod simulator;
pub mod serial_driver;

pub use traits::*;
pub use types::*;
