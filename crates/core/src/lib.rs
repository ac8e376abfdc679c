//! Core domain types and shared logic for picsync.
//!
//! This crate defines the data model used across all other crates:
//! - Content hashes (SHA-256 plus a legacy MD5) and the streaming dual hasher
//! - Source and destination items and the upload/delete work list
//! - Reconciliation of two inventories by digest
//! - Application configuration

pub mod config;
pub mod error;
pub mod hash;
pub mod item;
pub mod reconcile;

pub use config::{AppConfig, CachePolicy};
pub use error::{Error, Result};
pub use hash::{ContentHash, Digest, DualHasher, HashKind, WeakHash};
pub use item::{DestinationId, DestinationItem, SourceItem, WorkList};
pub use reconcile::{ReconcileWarning, Reconciliation, diff};

/// Prefix of the presentation published for each destination album.
pub const PRESENTATION_PREFIX: &str = "ss_";

/// Name of the presentation that mirrors `album`.
pub fn presentation_name(album: &str) -> String {
    format!("{PRESENTATION_PREFIX}{album}")
}
