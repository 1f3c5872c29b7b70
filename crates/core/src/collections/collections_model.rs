use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheRecord;
use crate::errors::Error;
use crate::knowledge::KnowledgeRecord;

pub const ACTION_COLLECTION_CREATE: &str = "collection:create";
pub const ACTION_COLLECTION_ADD_RECORDS: &str = "collection:add_records";
pub const ACTION_COLLECTION_REMOVE_RECORD: &str = "collection:remove_record";

/// A user-defined group of knowledge records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeCollection {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRecord for KnowledgeCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewKnowledgeCollection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewKnowledgeCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Trimmed copy; a blank description is dropped. Fails on a blank name.
    pub fn normalized(&self) -> Result<Self, Error> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("collection name cannot be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|description| !description.is_empty())
                .map(str::to_string),
        })
    }
}

/// Membership of one knowledge record in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMember {
    /// `{collection_id}:{record_id}`; see [`CollectionMember::member_id`].
    pub id: String,
    pub owner_id: String,
    pub collection_id: String,
    pub record_id: String,
    /// The member's record, when the service embeds it.
    #[serde(default)]
    pub record: Option<KnowledgeRecord>,
    pub added_at: DateTime<Utc>,
}

impl CollectionMember {
    pub fn member_id(collection_id: &str, record_id: &str) -> String {
        format!("{}:{}", collection_id, record_id)
    }
}

impl CacheRecord for CollectionMember {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.added_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddRecordFailure {
    pub record_id: String,
    pub error: Error,
}

/// Per-record result of a bulk add.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddRecordsReport {
    pub added: Vec<CollectionMember>,
    /// Records that were already in the collection; not an error.
    pub already_members: Vec<String>,
    pub failed: Vec<AddRecordFailure>,
}

impl AddRecordsReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::at;

    #[test]
    fn new_collection_is_trimmed_and_requires_a_name() {
        let normalized = NewKnowledgeCollection::new("  Stoicism ")
            .with_description("   ")
            .normalized()
            .expect("valid collection");
        assert_eq!(normalized.name, "Stoicism");
        assert_eq!(normalized.description, None);

        assert!(matches!(
            NewKnowledgeCollection::new(" ").normalized(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn collection_serializes_camel_case_without_empty_description() {
        let collection = KnowledgeCollection {
            id: "c1".to_string(),
            owner_id: "u1".to_string(),
            name: "Reading".to_string(),
            description: None,
            created_at: at(0),
            updated_at: at(0),
        };
        let value = serde_json::to_value(&collection).expect("serialize");
        assert_eq!(value["ownerId"], "u1");
        assert!(value.get("description").is_none());
    }
}
