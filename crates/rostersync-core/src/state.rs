//! Shared state types observed by callers.

use std::fmt;

/// Progress of the background sync loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No sync pass has run yet
    Offline,
    Syncing,
    Synced,
    /// The last pass had at least one failing repository
    Error,
}

/// Health of the remote half of a merged feed.
///
/// Local data keeps flowing in every state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedStatus {
    /// Waiting for the first remote snapshot
    Connecting,
    Live,
    /// The subscription ended; the last remote snapshot is kept
    RemoteClosed,
    /// Permanent remote failure; only local data is served
    RemoteFailed(String),
}

impl FeedStatus {
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Whether the remote side has stopped for good
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::RemoteClosed | Self::RemoteFailed(_))
    }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Live => f.write_str("live"),
            Self::RemoteClosed => f.write_str("remote closed"),
            Self::RemoteFailed(reason) => write!(f, "remote failed: {reason}"),
        }
    }
}
