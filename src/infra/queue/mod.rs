//! Work queue backends.

pub mod file;
pub mod memory;

pub use file::{FileWorkQueue, JsonlJournal};
pub use memory::{DelayQueue, InMemoryWorkQueue, JournalOp, NullJournal, QueueJournal};
