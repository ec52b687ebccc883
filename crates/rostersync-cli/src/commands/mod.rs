pub mod common;
pub mod migrate;
pub mod status;
pub mod sync;
pub mod watch;
