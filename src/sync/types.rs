use serde::{Deserialize, Serialize};

use super::error::RemoteError;
use crate::clipboard::item::{ClipboardEntry, EntryKind, Provenance};
use crate::identity::Identity;

// ── Auth types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

// ── History types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSetRequest {
    pub entries: Vec<RemoteRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<String>,
}

/// A history record as the remote store hands it out. Every field is optional on
/// the wire; `into_entry` is the validation boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub captured_at: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub migrated_from: Option<String>,
    #[serde(default)]
    pub migrated_at: Option<i64>,
}

impl RemoteRecord {
    pub fn into_entry(self) -> Result<ClipboardEntry, RemoteError> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RemoteError::InvalidRecord("missing id".to_string()))?;
        let content = self
            .content
            .ok_or_else(|| RemoteError::InvalidRecord(format!("{}: missing content", id)))?;
        let captured_at = self
            .captured_at
            .or(self.created_at)
            .ok_or_else(|| RemoteError::InvalidRecord(format!("{}: missing timestamps", id)))?;
        let kind = match self.kind.as_deref() {
            None => EntryKind::Text,
            Some(k) => k
                .parse()
                .map_err(|e: String| RemoteError::InvalidRecord(format!("{}: {}", id, e)))?,
        };
        let provenance = match (self.migrated_from, self.migrated_at) {
            (Some(migrated_from), Some(migrated_at)) => Some(Provenance {
                migrated_from,
                migrated_at,
            }),
            _ => None,
        };

        Ok(ClipboardEntry {
            id,
            content,
            kind,
            captured_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_favorite: self.is_favorite.unwrap_or(false),
            owner_id: self.user_id,
            provenance,
        })
    }
}

impl From<&ClipboardEntry> for RemoteRecord {
    fn from(entry: &ClipboardEntry) -> Self {
        Self {
            id: Some(entry.id.clone()),
            content: Some(entry.content.clone()),
            kind: Some(entry.kind.as_str().to_string()),
            captured_at: Some(entry.captured_at),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            is_favorite: Some(entry.is_favorite),
            user_id: entry.owner_id.clone(),
            migrated_from: entry.provenance.as_ref().map(|p| p.migrated_from.clone()),
            migrated_at: entry.provenance.as_ref().map(|p| p.migrated_at),
        }
    }
}

/// Decode a snapshot, dropping records that fail validation.
pub fn decode_records(records: Vec<RemoteRecord>) -> Vec<ClipboardEntry> {
    records
        .into_iter()
        .filter_map(|record| match record.into_entry() {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping remote record: {}", e);
                None
            }
        })
        .collect()
}

// ── Status types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    #[default]
    Syncing,
    Offline,
    Error,
}

/// How a mutation settled when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOutcome {
    Applied,
    /// Held for the remote store until connectivity returns.
    Queued,
    /// Already in flight for this id; nothing was issued.
    Skipped,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineState {
    pub view: Vec<ClipboardEntry>,
    pub sync_status: SyncStatus,
    pub last_error: Option<String>,
    pub identity: Option<Identity>,
}

// ── WebSocket messages ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "snapshot")]
    Snapshot { items: Vec<RemoteRecord> },
    #[serde(rename = "error")]
    Error { message: String },
}
