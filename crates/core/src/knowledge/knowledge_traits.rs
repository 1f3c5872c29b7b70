use async_trait::async_trait;

use super::knowledge_model::{KnowledgeRecord, KnowledgeRecordUpdate, NewKnowledgeRecord};
use crate::errors::Result;

/// Call/response contract of the knowledge (memory) service.
#[async_trait]
pub trait KnowledgeServiceTrait: Send + Sync {
    async fn list_records(&self, owner_id: &str) -> Result<Vec<KnowledgeRecord>>;

    async fn create_record(
        &self,
        owner_id: &str,
        record: NewKnowledgeRecord,
    ) -> Result<KnowledgeRecord>;

    async fn update_record(
        &self,
        owner_id: &str,
        record_id: &str,
        update: KnowledgeRecordUpdate,
    ) -> Result<KnowledgeRecord>;

    async fn delete_record(&self, owner_id: &str, record_id: &str) -> Result<()>;
}
