use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use log::debug;
use serde_json::{json, Value};

use super::journal_model::*;
use crate::audit::{ActionAuditSink, ActionRecord, NoOpActionAuditSink};
use crate::cache::{FetchOutcome, ListCache, ListCacheConfig, RecordSource, SortOrder};
use crate::errors::{Error, Result};
use crate::events::{PushBus, PushEvent};
use crate::knowledge::{
    normalize_tags, KnowledgeRecord, KnowledgeRecordUpdate, KnowledgeServiceTrait,
    NewKnowledgeRecord,
};

struct JournalSource {
    knowledge: Arc<dyn KnowledgeServiceTrait>,
}

#[async_trait]
impl RecordSource<KnowledgeRecord> for JournalSource {
    async fn fetch_all(&self, owner_id: &str) -> Result<Vec<KnowledgeRecord>> {
        self.knowledge.list_records(owner_id).await
    }
}

/// Journal page state: the owner's journal entries, newest first.
pub struct JournalService {
    knowledge: Arc<dyn KnowledgeServiceTrait>,
    cache: ListCache<KnowledgeRecord>,
    audit_sink: Arc<dyn ActionAuditSink>,
}

impl JournalService {
    pub fn new(
        knowledge: Arc<dyn KnowledgeServiceTrait>,
        bus: Arc<dyn PushBus<KnowledgeRecord>>,
    ) -> Self {
        let config = ListCacheConfig::new("journal")
            .with_sort_order(SortOrder::NewestFirst)
            .with_filter(|record: &KnowledgeRecord| record.has_source(JOURNAL_SOURCE));
        let source = Arc::new(JournalSource {
            knowledge: Arc::clone(&knowledge),
        });
        Self {
            cache: ListCache::new(source, bus, config),
            knowledge,
            audit_sink: Arc::new(NoOpActionAuditSink),
        }
    }

    /// Sets the sink receiving an [`ActionRecord`] per successful mutation.
    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn ActionAuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn cache(&self) -> &ListCache<KnowledgeRecord> {
        &self.cache
    }

    pub async fn open(&self, owner_id: Option<&str>) -> Result<FetchOutcome> {
        self.cache.bind(owner_id).await
    }

    pub fn close(&self) {
        self.cache.unbind();
    }

    pub async fn refresh(&self) -> Result<FetchOutcome> {
        self.cache.fetch_all().await
    }

    pub fn entries(&self) -> Vec<KnowledgeRecord> {
        self.cache.items()
    }

    pub fn entry(&self, id: &str) -> Option<KnowledgeRecord> {
        self.cache.get(id)
    }

    /// Save a new entry. The created record is echoed into the list without
    /// waiting for its push.
    pub async fn create_entry(&self, entry: NewJournalEntry) -> Result<KnowledgeRecord> {
        let owner_id = self.owner_id()?;
        let content = entry.content.trim();
        if content.is_empty() {
            return Err(Error::invalid_input("journal entry content cannot be empty"));
        }

        let request = NewKnowledgeRecord {
            question: format!(
                "Journal Entry {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            answer: content.to_string(),
            source: Some(JOURNAL_SOURCE.to_string()),
            tags: normalize_tags(&entry.tags),
            is_starred: entry.is_starred,
        };
        let record = self.knowledge.create_record(&owner_id, request).await?;
        if !self.cache.on_push(PushEvent::Insert(record.clone())) {
            debug!("[journal] created entry {} not shown in current view", record.id);
        }

        self.audit(
            ACTION_JOURNAL_CREATE,
            &owner_id,
            json!({ "entryId": record.id, "contentPreview": content_preview(&record.answer) }),
        );
        Ok(record)
    }

    pub async fn update_entry(
        &self,
        id: &str,
        update: JournalEntryUpdate,
    ) -> Result<KnowledgeRecord> {
        let answer = match update.content {
            Some(content) => {
                let content = content.trim();
                if content.is_empty() {
                    return Err(Error::invalid_input("journal entry content cannot be empty"));
                }
                Some(content.to_string())
            }
            None => None,
        };
        let update = KnowledgeRecordUpdate {
            question: None,
            answer,
            tags: update.tags.map(normalize_tags),
            is_starred: update.is_starred,
        };
        if update.is_empty() {
            return Err(Error::invalid_input("journal entry update has no changes"));
        }

        let (owner_id, record) = self.apply_update(id, update).await?;
        self.audit(
            ACTION_JOURNAL_UPDATE,
            &owner_id,
            json!({ "entryId": record.id, "contentPreview": content_preview(&record.answer) }),
        );
        Ok(record)
    }

    pub async fn delete_entry(&self, id: &str) -> Result<()> {
        let owner_id = self.owner_id()?;
        self.require_entry(id)?;

        let knowledge = Arc::clone(&self.knowledge);
        self.cache
            .apply_and_reconcile(id, |_| None, async {
                knowledge.delete_record(&owner_id, id).await.map(|_| None)
            })
            .await?;

        self.audit(ACTION_JOURNAL_DELETE, &owner_id, json!({ "entryId": id }));
        Ok(())
    }

    /// Flip the starred flag, showing the new state immediately.
    pub async fn toggle_star(&self, id: &str) -> Result<KnowledgeRecord> {
        let current = self.require_entry(id)?;
        let update = KnowledgeRecordUpdate {
            is_starred: Some(!current.is_starred),
            ..Default::default()
        };

        let (owner_id, record) = self.apply_update(id, update).await?;
        self.audit(
            ACTION_JOURNAL_TOGGLE_STAR,
            &owner_id,
            json!({ "entryId": record.id, "isStarred": record.is_starred }),
        );
        Ok(record)
    }

    async fn apply_update(
        &self,
        id: &str,
        update: KnowledgeRecordUpdate,
    ) -> Result<(String, KnowledgeRecord)> {
        let owner_id = self.owner_id()?;
        self.require_entry(id)?;

        let knowledge = Arc::clone(&self.knowledge);
        let request = update.clone();
        let confirmed = self
            .cache
            .apply_and_reconcile(
                id,
                |current| current.map(|record| update.apply_to(record)),
                async {
                    knowledge
                        .update_record(&owner_id, id, request)
                        .await
                        .map(Some)
                },
            )
            .await?;
        let record =
            confirmed.ok_or_else(|| Error::unknown(format!("update of {} returned no record", id)))?;
        Ok((owner_id, record))
    }

    fn owner_id(&self) -> Result<String> {
        self.cache.owner_id().ok_or(Error::NotAuthenticated)
    }

    fn require_entry(&self, id: &str) -> Result<KnowledgeRecord> {
        self.cache
            .get(id)
            .ok_or_else(|| Error::invalid_input(format!("journal entry {} not found", id)))
    }

    fn audit(&self, kind: &str, owner_id: &str, details: Value) {
        self.audit_sink
            .record(ActionRecord::new(kind, owner_id, details));
    }
}
