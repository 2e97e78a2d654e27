//! Per-file upload bookkeeping.
//!
//! Every selected file gets an `UploadId` at selection time. Results are
//! matched back by that id, never by completion order, and a result for an id
//! that is no longer tracked is dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::registration::Identity;
use super::values::FileHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(pub u64);

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upload-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UploadStatus {
    /// Selected but not handed to storage yet (no identity, or waiting for dispatch).
    Queued,
    InFlight,
    Succeeded { location: String },
    Failed { reason: String },
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Succeeded { .. } | UploadStatus::Failed { .. })
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            UploadStatus::Succeeded { location } => Some(location),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    pub field: String,
    pub status: UploadStatus,
}

/// Everything the blob store needs for one file.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub id: UploadId,
    pub field: String,
    pub file: FileHandle,
    pub identity: Identity,
}

/// Whether a completion changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadApplied {
    Applied,
    /// The file was removed, the session closed, or the entry was not in flight.
    Discarded,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct UploadTracker {
    next_id: u64,
    entries: BTreeMap<UploadId, UploadEntry>,
}

impl UploadTracker {
    pub(crate) fn allocate(&mut self, field: &str) -> UploadId {
        self.next_id += 1;
        let id = UploadId(self.next_id);
        self.entries.insert(
            id,
            UploadEntry {
                field: field.to_string(),
                status: UploadStatus::Queued,
            },
        );
        id
    }

    pub(crate) fn get(&self, id: UploadId) -> Option<&UploadEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (UploadId, &UploadEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    pub(crate) fn remove(&mut self, id: UploadId) -> Option<UploadEntry> {
        self.entries.remove(&id)
    }

    /// Move a queued entry in flight. Returns false for any other state.
    pub(crate) fn mark_in_flight(&mut self, id: UploadId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.status == UploadStatus::Queued => {
                entry.status = UploadStatus::InFlight;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn complete(&mut self, id: UploadId, status: UploadStatus) -> UploadApplied {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.status == UploadStatus::InFlight => {
                entry.status = status;
                UploadApplied::Applied
            }
            _ => UploadApplied::Discarded,
        }
    }

    fn ids_where(&self, field: Option<&str>, pred: impl Fn(&UploadStatus) -> bool) -> Vec<UploadId> {
        self.entries
            .iter()
            .filter(|(_, e)| field.is_none_or(|f| e.field == f) && pred(&e.status))
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn queued(&self, field: Option<&str>) -> Vec<UploadId> {
        self.ids_where(field, |s| *s == UploadStatus::Queued)
    }

    pub(crate) fn in_flight(&self, field: Option<&str>) -> Vec<UploadId> {
        self.ids_where(field, |s| *s == UploadStatus::InFlight)
    }

    pub(crate) fn failed(&self, field: Option<&str>) -> Vec<UploadId> {
        self.ids_where(field, |s| matches!(s, UploadStatus::Failed { .. }))
    }

    /// Put failed entries back in the queue so they can be dispatched again.
    pub(crate) fn requeue(&mut self, ids: &[UploadId]) {
        for id in ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.status = UploadStatus::Queued;
            }
        }
    }
}
