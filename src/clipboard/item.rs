use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Payload kind of a captured entry. Only `Text` is produced by the capture loop today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    Text,
    Image,
    File,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Text => "text",
            EntryKind::Image => "image",
            EntryKind::File => "file",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "text/plain" => Ok(EntryKind::Text),
            "image" => Ok(EntryKind::Image),
            "file" => Ok(EntryKind::File),
            other => Err(format!("unknown entry kind: {}", other)),
        }
    }
}

/// Where a migrated entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub migrated_from: String,
    pub migrated_at: i64,
}

/// A single captured clipboard snapshot.
///
/// `captured_at` is the client clock at capture time. `created_at` is the
/// authoritative timestamp; remote-backed entries get it from the store's clock
/// and it stays `None` until assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardEntry {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub kind: EntryKind,
    pub captured_at: i64,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub is_favorite: bool,
    /// Identity the entry is filed under; `None` for local, unsynced entries.
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

impl ClipboardEntry {
    /// New local text capture with a client-generated id.
    pub fn captured(content: impl Into<String>, captured_at: i64) -> Self {
        Self {
            id: new_local_id(),
            content: content.into(),
            kind: EntryKind::Text,
            captured_at,
            created_at: None,
            updated_at: None,
            is_favorite: false,
            owner_id: None,
            provenance: None,
        }
    }

    /// Ordering timestamp: authoritative creation time, falling back to capture time.
    pub fn sort_key(&self) -> i64 {
        self.created_at.unwrap_or(self.captured_at)
    }

    pub fn content_hash(&self) -> String {
        hash_content(&self.content)
    }

    /// A content edit also refreshes the capture time, like the local store does.
    pub fn apply_patch(&mut self, patch: &EntryPatch, now: i64) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
            self.captured_at = now;
        }
        if let Some(favorite) = patch.is_favorite {
            self.is_favorite = favorite;
        }
        self.updated_at = Some(now);
    }
}

/// An entry as sent to the remote store for insertion: everything but the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub content: String,
    #[serde(default)]
    pub kind: EntryKind,
    pub captured_at: i64,
    #[serde(default)]
    pub is_favorite: bool,
}

impl From<&ClipboardEntry> for NewEntry {
    fn from(entry: &ClipboardEntry) -> Self {
        Self {
            content: entry.content.clone(),
            kind: entry.kind,
            captured_at: entry.captured_at,
            is_favorite: entry.is_favorite,
        }
    }
}

/// Partial change to an entry. Kind is never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl EntryPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            is_favorite: None,
        }
    }

    pub fn favorite(value: bool) -> Self {
        Self {
            content: None,
            is_favorite: Some(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.is_favorite.is_none()
    }
}

/// Client-side ids are time-ordered: a millisecond timestamp followed by random bits.
pub fn new_local_id() -> String {
    Uuid::now_v7().to_string()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Newest first. The sort is stable, so equal timestamps keep their relative order.
pub fn sort_newest_first(entries: &mut [ClipboardEntry]) {
    entries.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
}
