//! Remote store adapters

mod http;
mod memory;

pub use http::{HttpRemoteStore, DEFAULT_POLL_INTERVAL};
pub use memory::MemoryRemoteStore;
