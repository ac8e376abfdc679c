//! Sync engine error types.

use picsync_metadata::MetadataError;
use thiserror::Error;

/// Failure moving bytes to or from a remote service.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The service answered with a non-success status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    /// A body stream broke off mid-transfer.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Sync engine errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cache error: {0}")]
    Cache(#[from] MetadataError),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{count} {kind}s are named '{name}'")]
    AmbiguousName {
        kind: &'static str,
        name: String,
        count: usize,
    },

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// The empty-source guard tripped on a pair configured to treat that as fatal.
    #[error("refusing to reconcile: {0}")]
    ReconciliationGuard(String),

    /// The remote service returned something we could not interpret.
    #[error("unexpected API response: {0}")]
    Api(String),

    #[error("invalid run mode: {0}")]
    InvalidRunMode(String),

    #[error("{failed} of {total} album pairs failed")]
    PairsFailed { failed: usize, total: usize },
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
