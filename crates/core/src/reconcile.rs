//! Set reconciliation of source and destination inventories by digest.
//!
//! Matching uses digest equality only. Filenames, capture dates and album
//! positions never participate, so the work list is the symmetric difference
//! of the two digest sets.

use crate::hash::{Digest, HashKind};
use crate::item::{DestinationId, DestinationItem, SourceItem, WorkList};
use std::collections::HashMap;

/// Non-fatal conditions noticed while diffing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileWarning {
    /// Two destination items share a digest; `duplicate` is left alone.
    DuplicateDestination {
        digest: Digest,
        kept: DestinationId,
        duplicate: DestinationId,
    },
    /// Two source items share a digest; only the first is considered.
    DuplicateSource {
        digest: Digest,
        kept: String,
        duplicate: String,
    },
    /// The source inventory was empty, so nothing was planned.
    EmptySource { destination_items: usize },
}

/// Result of [`diff`].
#[derive(Clone, Debug, Default)]
pub struct Reconciliation {
    pub work: WorkList,
    pub warnings: Vec<ReconcileWarning>,
}

impl Reconciliation {
    /// Whether the empty-source guard refused to plan deletions.
    pub fn guard_tripped(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ReconcileWarning::EmptySource { .. }))
    }

    pub fn duplicate_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| !matches!(w, ReconcileWarning::EmptySource { .. }))
            .count()
    }
}

/// Compute the work list turning `dest` into a copy of `source`.
///
/// `kind` is the digest kind the destination exposes; source items are
/// projected onto it. `to_upload` keeps source order, `to_delete` keeps
/// destination order.
pub fn diff(source: &[SourceItem], dest: &[DestinationItem], kind: HashKind) -> Reconciliation {
    let mut warnings = Vec::new();

    if source.is_empty() {
        // Refuse to plan a wipe of the destination from an empty source.
        tracing::warn!(
            destination_items = dest.len(),
            "source inventory is empty, refusing to compute deletions"
        );
        warnings.push(ReconcileWarning::EmptySource {
            destination_items: dest.len(),
        });
        return Reconciliation {
            work: WorkList::default(),
            warnings,
        };
    }

    // digest -> index of the first destination item carrying it
    let mut dest_by_digest: HashMap<Digest, usize> = HashMap::with_capacity(dest.len());
    for (idx, item) in dest.iter().enumerate() {
        if let Some(&kept) = dest_by_digest.get(&item.digest) {
            tracing::warn!(
                digest = %item.digest,
                kept = %dest[kept].filename,
                duplicate = %item.filename,
                "duplicate destination items share a digest"
            );
            warnings.push(ReconcileWarning::DuplicateDestination {
                digest: item.digest,
                kept: dest[kept].destination_id,
                duplicate: item.destination_id,
            });
            continue;
        }
        dest_by_digest.insert(item.digest, idx);
    }

    let mut seen_source: HashMap<Digest, usize> = HashMap::with_capacity(source.len());
    let mut to_upload = Vec::new();
    for (idx, item) in source.iter().enumerate() {
        let digest = item.digest(kind);
        if let Some(&kept) = seen_source.get(&digest) {
            tracing::warn!(
                digest = %digest,
                kept = %source[kept].filename,
                duplicate = %item.filename,
                "duplicate source items share a digest"
            );
            warnings.push(ReconcileWarning::DuplicateSource {
                digest,
                kept: source[kept].remote_id.clone(),
                duplicate: item.remote_id.clone(),
            });
            continue;
        }
        seen_source.insert(digest, idx);

        if dest_by_digest.remove(&digest).is_none() {
            to_upload.push(item.clone());
        }
    }

    let mut remaining: Vec<usize> = dest_by_digest.into_values().collect();
    remaining.sort_unstable();
    let to_delete = remaining
        .into_iter()
        .map(|idx| dest[idx].clone())
        .collect();

    Reconciliation {
        work: WorkList {
            to_upload,
            to_delete,
        },
        warnings,
    }
}
