//! Rate counter store backends.

pub mod memory;

pub use memory::InMemoryCounterStore;
