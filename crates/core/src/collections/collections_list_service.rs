use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::json;

use super::collections_model::*;
use super::collections_traits::CollectionServiceTrait;
use crate::audit::{ActionAuditSink, ActionRecord, NoOpActionAuditSink};
use crate::cache::{FetchOutcome, ListCache, ListCacheConfig, RecordSource, SortOrder};
use crate::errors::{Error, Result};
use crate::events::{PushBus, PushEvent};

struct CollectionListSource {
    collections: Arc<dyn CollectionServiceTrait>,
}

#[async_trait]
impl RecordSource<KnowledgeCollection> for CollectionListSource {
    async fn fetch_all(&self, owner_id: &str) -> Result<Vec<KnowledgeCollection>> {
        self.collections.list_collections(owner_id).await
    }
}

/// Collections page state: the owner's knowledge collections, newest first.
pub struct KnowledgeCollectionsService {
    collections: Arc<dyn CollectionServiceTrait>,
    cache: ListCache<KnowledgeCollection>,
    audit_sink: Arc<dyn ActionAuditSink>,
}

impl KnowledgeCollectionsService {
    pub fn new(
        collections: Arc<dyn CollectionServiceTrait>,
        bus: Arc<dyn PushBus<KnowledgeCollection>>,
    ) -> Self {
        let config = ListCacheConfig::new("collections").with_sort_order(SortOrder::NewestFirst);
        let source = Arc::new(CollectionListSource {
            collections: Arc::clone(&collections),
        });
        Self {
            cache: ListCache::new(source, bus, config),
            collections,
            audit_sink: Arc::new(NoOpActionAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn ActionAuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn cache(&self) -> &ListCache<KnowledgeCollection> {
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

    pub fn collections(&self) -> Vec<KnowledgeCollection> {
        self.cache.items()
    }

    pub fn collection(&self, id: &str) -> Option<KnowledgeCollection> {
        self.cache.get(id)
    }

    /// Create a collection. The name must not be blank; the created
    /// collection is echoed into the list without waiting for its push.
    pub async fn create_collection(
        &self,
        collection: NewKnowledgeCollection,
    ) -> Result<KnowledgeCollection> {
        let owner_id = self.cache.owner_id().ok_or(Error::NotAuthenticated)?;
        let request = collection.normalized()?;

        let created = self
            .collections
            .create_collection(&owner_id, request)
            .await?;
        if !self.cache.on_push(PushEvent::Insert(created.clone())) {
            debug!("[collections] created collection {} not shown", created.id);
        }

        self.audit_sink.record(ActionRecord::new(
            ACTION_COLLECTION_CREATE,
            &owner_id,
            json!({ "collectionId": created.id, "name": created.name }),
        ));
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ChannelActionAuditSink;
    use crate::events::InMemoryPushBus;
    use crate::test_support::{at, FakeCollections};
    use std::sync::atomic::Ordering;

    fn collection(id: &str, owner_id: &str, minute: i64) -> KnowledgeCollection {
        KnowledgeCollection {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            name: format!("Collection {}", id),
            description: None,
            created_at: at(minute),
            updated_at: at(minute),
        }
    }

    struct Fixture {
        service: KnowledgeCollectionsService,
        collections: Arc<FakeCollections>,
        bus: Arc<InMemoryPushBus<KnowledgeCollection>>,
        audit: tokio::sync::mpsc::UnboundedReceiver<ActionRecord>,
    }

    async fn open_collections(existing: Vec<KnowledgeCollection>) -> Fixture {
        let collections = Arc::new(FakeCollections::default());
        *collections.collections.lock() = existing;
        let bus = Arc::new(InMemoryPushBus::<KnowledgeCollection>::new());
        let (sink, audit) = ChannelActionAuditSink::channel();
        let service = KnowledgeCollectionsService::new(collections.clone(), bus.clone())
            .with_audit_sink(Arc::new(sink));
        service.open(Some("u1")).await.expect("open collections");
        Fixture {
            service,
            collections,
            bus,
            audit,
        }
    }

    fn ids(service: &KnowledgeCollectionsService) -> Vec<String> {
        service.collections().into_iter().map(|c| c.id).collect()
    }

    #[tokio::test]
    async fn lists_owner_collections_newest_first() {
        let fx = open_collections(vec![
            collection("old", "u1", 1),
            collection("foreign", "u2", 5),
            collection("new", "u1", 3),
        ])
        .await;
        assert_eq!(ids(&fx.service), vec!["new", "old"]);
    }

    #[tokio::test]
    async fn create_echoes_collection_and_audits() {
        let mut fx = open_collections(vec![collection("old", "u1", 1)]).await;

        let created = fx
            .service
            .create_collection(
                NewKnowledgeCollection::new(" Stoic Notes ").with_description("Daily reading"),
            )
            .await
            .expect("create");
        assert_eq!(created.name, "Stoic Notes");
        assert_eq!(created.description.as_deref(), Some("Daily reading"));
        assert_eq!(ids(&fx.service), vec![created.id.clone(), "old".to_string()]);

        let action = fx.audit.try_recv().expect("audit");
        assert_eq!(action.kind, ACTION_COLLECTION_CREATE);
        assert_eq!(action.details["collectionId"], created.id.as_str());

        // The service's own push for the creation does not duplicate it.
        fx.bus.publish(PushEvent::Insert(created));
        assert_eq!(fx.service.collections().len(), 2);
    }

    #[tokio::test]
    async fn blank_name_is_rejected_before_the_service() {
        let mut fx = open_collections(Vec::new()).await;
        let result = fx
            .service
            .create_collection(NewKnowledgeCollection::new("   "))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(fx.collections.create_calls.load(Ordering::SeqCst), 0);
        assert!(fx.audit.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_create_leaves_list_unchanged() {
        let mut fx = open_collections(vec![collection("old", "u1", 1)]).await;
        fx.collections
            .failures
            .lock()
            .insert("Drafts".to_string(), Error::service_unavailable("offline"));

        let result = fx
            .service
            .create_collection(NewKnowledgeCollection::new("Drafts"))
            .await;
        assert_eq!(result, Err(Error::service_unavailable("offline")));
        assert_eq!(ids(&fx.service), vec!["old"]);
        assert!(fx.audit.try_recv().is_err());
    }

    #[tokio::test]
    async fn pushes_insert_update_and_delete_collections() {
        let fx = open_collections(vec![collection("a", "u1", 1)]).await;

        fx.bus.publish(PushEvent::Insert(collection("b", "u1", 2)));
        fx.bus.publish(PushEvent::Insert(collection("x", "u2", 9)));
        assert_eq!(ids(&fx.service), vec!["b", "a"]);

        let mut renamed = collection("a", "u1", 1);
        renamed.name = "Renamed".to_string();
        fx.bus.publish(PushEvent::Update(renamed));
        assert_eq!(
            fx.service.collection("a").map(|c| c.name),
            Some("Renamed".to_string())
        );

        fx.bus.publish(PushEvent::delete("b", "u1"));
        assert_eq!(ids(&fx.service), vec!["a"]);
    }

    #[tokio::test]
    async fn create_requires_an_open_page() {
        let fx = open_collections(Vec::new()).await;
        fx.service.close();
        let result = fx
            .service
            .create_collection(NewKnowledgeCollection::new("Drafts"))
            .await;
        assert_eq!(result, Err(Error::NotAuthenticated));
    }
}
