//! Infrastructure adapters for queues, stores, counters, and delivery.

pub mod counter;
pub mod queue;
pub mod sink;
pub mod store;

pub use counter::InMemoryCounterStore;
pub use queue::{DelayQueue, FileWorkQueue, InMemoryWorkQueue, JournalOp, QueueJournal};
pub use sink::{LogSink, RecordingSink};
pub use store::{FileMessageStore, InMemoryMessageStore};
