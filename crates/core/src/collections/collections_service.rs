use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use serde_json::{json, Value};

use super::collections_model::*;
use super::collections_traits::CollectionServiceTrait;
use crate::audit::{ActionAuditSink, ActionRecord, NoOpActionAuditSink};
use crate::cache::{
    FetchOutcome, ListCache, ListCacheConfig, MutationOutcome, RecordSource, SortOrder,
};
use crate::errors::{Error, Result};
use crate::events::{PushBus, PushEvent};
use crate::knowledge::{KnowledgeRecord, KnowledgeServiceTrait};

struct MemberSource {
    collections: Arc<dyn CollectionServiceTrait>,
    collection_id: String,
}

#[async_trait]
impl RecordSource<CollectionMember> for MemberSource {
    async fn fetch_all(&self, owner_id: &str) -> Result<Vec<CollectionMember>> {
        self.collections
            .list_members(owner_id, &self.collection_id)
            .await
    }
}

/// Collection detail page state: the members of one collection in the order
/// they were added.
pub struct CollectionService {
    collection_id: String,
    collections: Arc<dyn CollectionServiceTrait>,
    knowledge: Arc<dyn KnowledgeServiceTrait>,
    cache: ListCache<CollectionMember>,
    audit_sink: Arc<dyn ActionAuditSink>,
}

impl CollectionService {
    pub fn new(
        collection_id: impl Into<String>,
        collections: Arc<dyn CollectionServiceTrait>,
        knowledge: Arc<dyn KnowledgeServiceTrait>,
        bus: Arc<dyn PushBus<CollectionMember>>,
    ) -> Self {
        let collection_id = collection_id.into();
        let filter_id = collection_id.clone();
        let config = ListCacheConfig::new(format!("collection:{}", collection_id))
            .with_sort_order(SortOrder::Insertion)
            .with_filter(move |member: &CollectionMember| member.collection_id == filter_id);
        let source = Arc::new(MemberSource {
            collections: Arc::clone(&collections),
            collection_id: collection_id.clone(),
        });
        Self {
            cache: ListCache::new(source, bus, config),
            collection_id,
            collections,
            knowledge,
            audit_sink: Arc::new(NoOpActionAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn ActionAuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn cache(&self) -> &ListCache<CollectionMember> {
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

    pub fn members(&self) -> Vec<CollectionMember> {
        self.cache.items()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.cache
            .get(&CollectionMember::member_id(&self.collection_id, record_id))
            .is_some()
    }

    /// Add one record. Concurrent adds of the same record share a single
    /// service call.
    pub async fn add_record(&self, record_id: &str) -> Result<MutationOutcome<CollectionMember>> {
        let owner_id = self.owner_id()?;
        let (outcome, started) = self.submit_add(&owner_id, record_id).await;
        let outcome = outcome?;
        if let (MutationOutcome::Applied(member), true) = (&outcome, started) {
            self.audit_added(&owner_id, &[member.record_id.as_str()], 0, 0);
        }
        Ok(outcome)
    }

    /// Add several records concurrently. Blank and repeated ids are skipped;
    /// individual failures are reported rather than failing the batch.
    pub async fn add_records<I, S>(&self, record_ids: I) -> Result<AddRecordsReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let owner_id = self.owner_id()?;
        let mut unique: Vec<String> = Vec::new();
        for record_id in record_ids {
            let record_id = record_id.as_ref().trim();
            if !record_id.is_empty() && !unique.iter().any(|id| id == record_id) {
                unique.push(record_id.to_string());
            }
        }

        let owner = owner_id.as_str();
        let results = join_all(unique.into_iter().map(|record_id| async move {
            let (result, started) = self.submit_add(owner, &record_id).await;
            (record_id, result, started)
        }))
        .await;

        // Adds joined from another caller's submission are audited there.
        let mut audited: Vec<String> = Vec::new();
        let mut report = AddRecordsReport::default();
        for (record_id, result, started) in results {
            match result {
                Ok(MutationOutcome::Applied(member)) => {
                    if started {
                        audited.push(member.record_id.clone());
                    }
                    report.added.push(member);
                }
                Ok(MutationOutcome::AlreadyPresent) => report.already_members.push(record_id),
                Ok(MutationOutcome::Removed) => {
                    warn!(
                        "[{}] add of {} reported a removal",
                        self.cache.name(),
                        record_id
                    );
                    report.failed.push(AddRecordFailure {
                        record_id,
                        error: Error::unknown("add reported a removal"),
                    });
                }
                Err(error) => {
                    warn!(
                        "[{}] failed to add {}: {}",
                        self.cache.name(),
                        record_id,
                        error
                    );
                    report.failed.push(AddRecordFailure { record_id, error });
                }
            }
        }

        if !audited.is_empty() {
            let added: Vec<&str> = audited.iter().map(String::as_str).collect();
            self.audit_added(
                &owner_id,
                &added,
                report.already_members.len(),
                report.failed.len(),
            );
        }
        Ok(report)
    }

    /// Remove a record from the collection, hiding it immediately.
    pub async fn remove_record(&self, record_id: &str) -> Result<()> {
        let owner_id = self.owner_id()?;
        let member_id = CollectionMember::member_id(&self.collection_id, record_id);
        if self.cache.get(&member_id).is_none() {
            return Err(Error::invalid_input(format!(
                "record {} is not in collection {}",
                record_id, self.collection_id
            )));
        }

        let collections = Arc::clone(&self.collections);
        self.cache
            .apply_and_reconcile(&member_id, |_| None, async {
                collections
                    .remove_record(&owner_id, &self.collection_id, record_id)
                    .await
                    .map(|_| None)
            })
            .await?;

        self.audit(
            ACTION_COLLECTION_REMOVE_RECORD,
            &owner_id,
            json!({ "collectionId": self.collection_id, "recordId": record_id }),
        );
        Ok(())
    }

    /// The owner's knowledge records that are not yet members.
    pub async fn available_records(&self) -> Result<Vec<KnowledgeRecord>> {
        let owner_id = self.owner_id()?;
        let records = self.knowledge.list_records(&owner_id).await?;
        let members: HashSet<String> = self
            .cache
            .items()
            .into_iter()
            .map(|member| member.record_id)
            .collect();
        Ok(records
            .into_iter()
            .filter(|record| !members.contains(&record.id))
            .collect())
    }

    /// The flag is `true` when this call issued the service request rather
    /// than joining one in flight.
    async fn submit_add(
        &self,
        owner_id: &str,
        record_id: &str,
    ) -> (Result<MutationOutcome<CollectionMember>>, bool) {
        let key = format!("add:{}:{}", self.collection_id, record_id);
        let collections = Arc::clone(&self.collections);
        let owner = owner_id.to_string();
        let collection_id = self.collection_id.clone();
        let record = record_id.to_string();

        let (outcome, started) = self
            .cache
            .submit_keyed_with_origin(&key, move || async move {
                collections.add_record(&owner, &collection_id, &record).await
            })
            .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => return (Err(err), started),
        };

        match &outcome {
            MutationOutcome::Applied(member) => {
                self.cache.on_push(PushEvent::Insert(member.clone()));
            }
            MutationOutcome::AlreadyPresent => {
                debug!("[{}] {} already a member", self.cache.name(), record_id);
            }
            MutationOutcome::Removed => {}
        }
        (Ok(outcome), started)
    }

    fn owner_id(&self) -> Result<String> {
        self.cache.owner_id().ok_or(Error::NotAuthenticated)
    }

    fn audit_added(&self, owner_id: &str, record_ids: &[&str], already: usize, failed: usize) {
        self.audit(
            ACTION_COLLECTION_ADD_RECORDS,
            owner_id,
            json!({
                "collectionId": self.collection_id,
                "recordIds": record_ids,
                "alreadyMembers": already,
                "failed": failed,
            }),
        );
    }

    fn audit(&self, kind: &str, owner_id: &str, details: Value) {
        self.audit_sink
            .record(ActionRecord::new(kind, owner_id, details));
    }
}
