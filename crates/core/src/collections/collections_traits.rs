use async_trait::async_trait;

use super::collections_model::{CollectionMember, KnowledgeCollection, NewKnowledgeCollection};
use crate::cache::MutationOutcome;
use crate::errors::Result;

/// Call/response contract of the collection service.
#[async_trait]
pub trait CollectionServiceTrait: Send + Sync {
    async fn list_collections(&self, owner_id: &str) -> Result<Vec<KnowledgeCollection>>;

    async fn create_collection(
        &self,
        owner_id: &str,
        collection: NewKnowledgeCollection,
    ) -> Result<KnowledgeCollection>;

    async fn list_members(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<Vec<CollectionMember>>;

    /// Returns [`MutationOutcome::AlreadyPresent`] when the record is already
    /// a member.
    async fn add_record(
        &self,
        owner_id: &str,
        collection_id: &str,
        record_id: &str,
    ) -> Result<MutationOutcome<CollectionMember>>;

    async fn remove_record(
        &self,
        owner_id: &str,
        collection_id: &str,
        record_id: &str,
    ) -> Result<()>;
}
