// src/hal/types.rs
//! Core types for ECG device abstraction

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Single ECG sample: amplitude plus its capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub value: i32,
    pub timestamp: NaiveDateTime,
}

/// Device connection types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Serial,
    Simulator,
}

/// Identification of the device a run is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub name: String,
}
