// src/acquisition/mod.rs
//! Signal acquisition: minute alignment, frame parsing and windowing

pub mod acquirer;
pub mod frame_parser;
pub mod time_sync;
pub mod window;

pub use acquirer::{Acquirer, Interruption};
pub use frame_parser::{FrameParser, FrameTally, MalformedFrame};
pub use time_sync::{SyncError, SyncPoint, TimeSynchronizer};
pub use window::{elapsed_minutes, Window, WindowAccumulator};
