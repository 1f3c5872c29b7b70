//! In-memory fakes of the external services, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::cache::MutationOutcome;
use crate::collections::{
    CollectionMember, CollectionServiceTrait, KnowledgeCollection, NewKnowledgeCollection,
};
use crate::errors::{Error, Result};
use crate::knowledge::{
    KnowledgeRecord, KnowledgeRecordUpdate, KnowledgeServiceTrait, NewKnowledgeRecord,
};

pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 29, 12, 0, 0).unwrap() + Duration::minutes(minute)
}

pub fn knowledge(id: &str, owner_id: &str, source: &str, minute: i64) -> KnowledgeRecord {
    KnowledgeRecord {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        question: format!("Question {}", id),
        answer: format!("Answer {}", id),
        source: Some(source.to_string()),
        tags: Vec::new(),
        is_starred: false,
        created_at: at(minute),
        updated_at: at(minute),
    }
}

/// Knowledge service over a map, with one-shot failure injection and an
/// optional gate that holds the next mutation until released.
#[derive(Default)]
pub struct FakeKnowledgeService {
    records: Mutex<Vec<KnowledgeRecord>>,
    fail_next: Mutex<Option<Error>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    next_id: AtomicUsize,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeKnowledgeService {
    pub fn with_records(records: Vec<KnowledgeRecord>) -> Self {
        let service = Self::default();
        *service.records.lock() = records;
        service
    }

    pub fn fail_next(&self, error: Error) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    pub fn stored(&self, id: &str) -> Option<KnowledgeRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    async fn enter(&self, method: &'static str) -> Result<()> {
        *self.calls.lock().entry(method).or_default() += 1;
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match self.fail_next.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KnowledgeServiceTrait for FakeKnowledgeService {
    async fn list_records(&self, owner_id: &str) -> Result<Vec<KnowledgeRecord>> {
        self.enter("list_records").await?;
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create_record(
        &self,
        owner_id: &str,
        record: NewKnowledgeRecord,
    ) -> Result<KnowledgeRecord> {
        self.enter("create_record").await?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = KnowledgeRecord {
            id: format!("created-{}", n),
            owner_id: owner_id.to_string(),
            question: record.question,
            answer: record.answer,
            source: record.source,
            tags: record.tags,
            is_starred: record.is_starred,
            created_at: at(1_000 + n as i64),
            updated_at: at(1_000 + n as i64),
        };
        self.records.lock().push(created.clone());
        Ok(created)
    }

    async fn update_record(
        &self,
        owner_id: &str,
        record_id: &str,
        update: KnowledgeRecordUpdate,
    ) -> Result<KnowledgeRecord> {
        self.enter("update_record").await?;
        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == record_id && r.owner_id == owner_id)
            .ok_or_else(|| Error::conflict(format!("record {} not found", record_id)))?;
        *record = update.apply_to(record);
        Ok(record.clone())
    }

    async fn delete_record(&self, owner_id: &str, record_id: &str) -> Result<()> {
        self.enter("delete_record").await?;
        self.records
            .lock()
            .retain(|r| !(r.id == record_id && r.owner_id == owner_id));
        Ok(())
    }
}

/// Collection service over in-memory lists. `failures` is keyed by record id
/// for membership calls and by collection name for creation.
#[derive(Default)]
pub struct FakeCollections {
    pub collections: Mutex<Vec<KnowledgeCollection>>,
    pub members: Mutex<Vec<CollectionMember>>,
    pub failures: Mutex<HashMap<String, Error>>,
    pub gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub add_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

#[async_trait]
impl CollectionServiceTrait for FakeCollections {
    async fn list_collections(&self, owner_id: &str) -> Result<Vec<KnowledgeCollection>> {
        Ok(self
            .collections
            .lock()
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create_collection(
        &self,
        owner_id: &str,
        collection: NewKnowledgeCollection,
    ) -> Result<KnowledgeCollection> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().remove(&collection.name) {
            return Err(error);
        }
        let created = KnowledgeCollection {
            id: format!("collection-{}", n),
            owner_id: owner_id.to_string(),
            name: collection.name,
            description: collection.description,
            created_at: at(2_000 + n as i64),
            updated_at: at(2_000 + n as i64),
        };
        self.collections.lock().push(created.clone());
        Ok(created)
    }

    async fn list_members(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<Vec<CollectionMember>> {
        Ok(self
            .members
            .lock()
            .iter()
            .filter(|m| m.owner_id == owner_id && m.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn add_record(
        &self,
        owner_id: &str,
        collection_id: &str,
        record_id: &str,
    ) -> Result<MutationOutcome<CollectionMember>> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = self.failures.lock().remove(record_id) {
            return Err(error);
        }
        let mut members = self.members.lock();
        let id = CollectionMember::member_id(collection_id, record_id);
        if members.iter().any(|m| m.id == id) {
            return Ok(MutationOutcome::AlreadyPresent);
        }
        let added = CollectionMember {
            id,
            owner_id: owner_id.to_string(),
            collection_id: collection_id.to_string(),
            record_id: record_id.to_string(),
            record: None,
            added_at: at(100 + members.len() as i64),
        };
        members.push(added.clone());
        Ok(MutationOutcome::Applied(added))
    }

    async fn remove_record(
        &self,
        _owner_id: &str,
        collection_id: &str,
        record_id: &str,
    ) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().remove(record_id) {
            return Err(error);
        }
        let id = CollectionMember::member_id(collection_id, record_id);
        self.members.lock().retain(|m| m.id != id);
        Ok(())
    }
}
