//! Shared utilities.

pub mod clock;
pub mod jsonl;
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
