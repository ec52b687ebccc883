//! Offline-first synchronization between the local and remote stores

mod clock;
mod guard;
mod merge;
mod ports;
mod repository;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{EditGuard, DEFAULT_EDIT_WINDOW};
pub use merge::{merge_snapshots, reconcile, reconcile_with, Reconciliation, RecordOrder};
pub use ports::{
    LocalObservation, LocalStore, RemoteEvent, RemotePublisher, RemoteStore, RemoteSubscription,
    SyncBatch,
};
pub use repository::{
    CombinedRepository, MergedFeed, MirrorHandle, SyncReport, WriteOutcome, Written,
};
pub use scheduler::{sync_all, SyncScheduler, Syncable};
