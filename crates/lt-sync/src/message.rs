//! Sync wire message.

use chrono::{DateTime, Utc};
use lt_core::{DocumentId, Fingerprint};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// What one peer tells the others.
///
/// A message carries either fingerprints to reconcile against, a selected
/// time to reveal, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// Document the message originates from.
    pub sender: DocumentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_syncs: Vec<Fingerprint>,
}

impl SyncMessage {
    /// A fingerprint broadcast with no selected time.
    pub const fn fingerprints(sender: DocumentId, time_syncs: Vec<Fingerprint>) -> Self {
        Self {
            sender,
            selected_time: None,
            time_syncs,
        }
    }

    /// A selected-time announcement with no fingerprints.
    pub const fn selected(sender: DocumentId, time: DateTime<Utc>) -> Self {
        Self {
            sender,
            selected_time: Some(time),
            time_syncs: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(SyncError::Decode)
    }
}
