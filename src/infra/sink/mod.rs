//! Delivery sink adapters.

pub mod log;
pub mod recording;

pub use log::LogSink;
pub use recording::{RecordedDelivery, RecordingSink};
