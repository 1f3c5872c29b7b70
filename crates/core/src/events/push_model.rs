//! Typed push notification payloads.

use serde::{Deserialize, Serialize};

use crate::cache::CacheRecord;

/// Push notification kinds, one per remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushKind {
    Insert,
    Update,
    Delete,
}

/// Identity of a deleted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub id: String,
    pub owner_id: String,
}

impl RecordKey {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// A remote-origin change, delivered out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum PushEvent<R> {
    Insert(R),
    Update(R),
    Delete(RecordKey),
}

impl<R: CacheRecord> PushEvent<R> {
    pub fn delete(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self::Delete(RecordKey::new(id, owner_id))
    }

    pub fn kind(&self) -> PushKind {
        match self {
            Self::Insert(_) => PushKind::Insert,
            Self::Update(_) => PushKind::Update,
            Self::Delete(_) => PushKind::Delete,
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            Self::Insert(record) | Self::Update(record) => record.id(),
            Self::Delete(key) => &key.id,
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            Self::Insert(record) | Self::Update(record) => record.owner_id(),
            Self::Delete(key) => &key.owner_id,
        }
    }
}
