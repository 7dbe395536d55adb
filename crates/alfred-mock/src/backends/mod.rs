//! Key-value store backends.

mod inmemory;

pub use inmemory::InMemoryStore;
