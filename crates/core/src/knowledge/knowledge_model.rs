use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheRecord;

/// A question/answer record in the owner's knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeRecord {
    pub id: String,
    pub owner_id: String,
    pub question: String,
    pub answer: String,
    /// Origin of the record, e.g. `journal`, `manual`, `web-scrape`.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_starred: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeRecord {
    pub fn has_source(&self, source: &str) -> bool {
        self.source.as_deref() == Some(source)
    }
}

impl CacheRecord for KnowledgeRecord {
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

/// Input for creating a knowledge record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewKnowledgeRecord {
    pub question: String,
    pub answer: String,
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_starred: bool,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeRecordUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
}

impl KnowledgeRecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.question.is_none()
            && self.answer.is_none()
            && self.tags.is_none()
            && self.is_starred.is_none()
    }

    /// The record as it would look after the server applies this update.
    pub fn apply_to(&self, record: &KnowledgeRecord) -> KnowledgeRecord {
        let mut updated = record.clone();
        if let Some(question) = &self.question {
            updated.question = question.clone();
        }
        if let Some(answer) = &self.answer {
            updated.answer = answer.clone();
        }
        if let Some(tags) = &self.tags {
            updated.tags = tags.clone();
        }
        if let Some(is_starred) = self.is_starred {
            updated.is_starred = is_starred;
        }
        updated.updated_at = Utc::now();
        updated
    }
}

/// Trim tags and drop blank ones, keeping first occurrences in order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !normalized.iter().any(|existing| existing == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> KnowledgeRecord {
        let at = Utc.with_ymd_and_hms(2025, 6, 29, 16, 47, 40).unwrap();
        KnowledgeRecord {
            id: "k1".to_string(),
            owner_id: "u1".to_string(),
            question: "Journal Entry".to_string(),
            answer: "first thoughts".to_string(),
            source: Some("journal".to_string()),
            tags: vec!["daily".to_string()],
            is_starred: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn update_applies_only_present_fields() {
        let original = record();
        let update = KnowledgeRecordUpdate {
            is_starred: Some(true),
            ..Default::default()
        };

        let updated = update.apply_to(&original);
        assert!(updated.is_starred);
        assert_eq!(updated.answer, original.answer);
        assert_eq!(updated.tags, original.tags);
        assert_eq!(updated.created_at, original.created_at);
    }

    #[test]
    fn update_serializes_without_absent_fields() {
        let update = KnowledgeRecordUpdate {
            answer: Some("revised".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "answer": "revised" }));
        assert!(KnowledgeRecordUpdate::default().is_empty());
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let json = r#"{
            "id": "k2",
            "ownerId": "u1",
            "question": "q",
            "answer": "a",
            "createdAt": "2025-06-29T16:47:40Z",
            "updatedAt": "2025-06-29T16:47:40Z"
        }"#;
        let parsed: KnowledgeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.source, None);
        assert!(parsed.tags.is_empty());
        assert!(!parsed.is_starred);
    }

    #[test]
    fn normalize_tags_trims_and_drops_blanks() {
        let tags = normalize_tags([" rust ", "", "  ", "sync", "rust"]);
        assert_eq!(tags, vec!["rust".to_string(), "sync".to_string()]);
    }
}
