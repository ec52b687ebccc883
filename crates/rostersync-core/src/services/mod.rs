//! Client-facing services built on the core layers

mod session;

pub use session::{HttpRepository, MemoryRepository, SyncSession};
