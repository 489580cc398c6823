//! Message store backends.

pub mod file;
pub mod memory;
mod records;

pub use file::FileMessageStore;
pub use memory::InMemoryMessageStore;
