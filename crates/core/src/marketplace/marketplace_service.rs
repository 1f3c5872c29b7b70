use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::{json, Value};

use super::marketplace_model::*;
use super::marketplace_traits::{MarketplaceServiceTrait, SyllabusGeneratorTrait};
use crate::audit::{ActionAuditSink, ActionRecord, NoOpActionAuditSink};
use crate::cache::{
    FetchOutcome, ListCache, ListCacheConfig, MutationOutcome, RecordSource, SortOrder,
};
use crate::errors::{Error, Result};
use crate::events::{PushBus, PushEvent};

struct ListingSource {
    marketplace: Arc<dyn MarketplaceServiceTrait>,
}

#[async_trait]
impl RecordSource<CourseListing> for ListingSource {
    async fn fetch_all(&self, owner_id: &str) -> Result<Vec<CourseListing>> {
        self.marketplace.list_listings(owner_id).await
    }
}

/// Marketplace page state: the owner's published courses, newest first.
pub struct MarketplaceService {
    marketplace: Arc<dyn MarketplaceServiceTrait>,
    generator: Arc<dyn SyllabusGeneratorTrait>,
    cache: ListCache<CourseListing>,
    audit_sink: Arc<dyn ActionAuditSink>,
}

impl MarketplaceService {
    pub fn new(
        marketplace: Arc<dyn MarketplaceServiceTrait>,
        generator: Arc<dyn SyllabusGeneratorTrait>,
        bus: Arc<dyn PushBus<CourseListing>>,
    ) -> Self {
        let config = ListCacheConfig::new("marketplace").with_sort_order(SortOrder::NewestFirst);
        let source = Arc::new(ListingSource {
            marketplace: Arc::clone(&marketplace),
        });
        Self {
            cache: ListCache::new(source, bus, config),
            marketplace,
            generator,
            audit_sink: Arc::new(NoOpActionAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn ActionAuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn cache(&self) -> &ListCache<CourseListing> {
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

    pub fn listings(&self) -> Vec<CourseListing> {
        self.cache.items()
    }

    /// Generate and validate a syllabus without publishing it.
    pub async fn preview_syllabus(&self, collection_id: &str) -> Result<Syllabus> {
        let owner_id = self.owner_id()?;
        let syllabus = self
            .generator
            .generate_from_knowledge(&owner_id, collection_id)
            .await?;
        syllabus.validate()?;
        Ok(syllabus)
    }

    /// Generate a syllabus for the collection and publish it as a course.
    ///
    /// A second request for the same collection while one is in flight
    /// shares its result instead of publishing twice.
    pub async fn publish_course(
        &self,
        request: PublishCourseRequest,
    ) -> Result<MutationOutcome<CourseListing>> {
        let owner_id = self.owner_id()?;
        let collection_id = request.collection_id.trim().to_string();
        if collection_id.is_empty() {
            return Err(Error::invalid_input("collection id is required"));
        }
        let author_name = request.author_name.trim().to_string();
        if author_name.is_empty() {
            return Err(Error::invalid_input("author name is required"));
        }

        let key = format!("publish:{}", collection_id);
        let marketplace = Arc::clone(&self.marketplace);
        let generator = Arc::clone(&self.generator);
        let owner = owner_id.clone();
        let target = collection_id.clone();
        let price_cents = request.price_cents;

        let (outcome, started) = self
            .cache
            .submit_keyed_with_origin(&key, move || async move {
                let syllabus = generator.generate_from_knowledge(&owner, &target).await?;
                syllabus.validate()?;
                marketplace
                    .publish_listing(
                        &owner,
                        NewCourseListing {
                            collection_id: target,
                            author_name,
                            price_cents,
                            syllabus,
                        },
                    )
                    .await
            })
            .await;
        let outcome = outcome?;

        // A caller that joined an in-flight publish shares its result but
        // leaves the logging and audit to the caller that started it.
        if let (MutationOutcome::Applied(listing), true) = (&outcome, started) {
            self.cache.on_push(PushEvent::Insert(listing.clone()));
            info!(
                "[marketplace] published {} from collection {}",
                listing.id, collection_id
            );
            self.audit(
                ACTION_MARKETPLACE_PUBLISH,
                &owner_id,
                json!({
                    "listingId": listing.id,
                    "collectionId": collection_id,
                    "title": listing.syllabus.title,
                    "priceCents": listing.price_cents,
                }),
            );
        }
        Ok(outcome)
    }

    /// Withdraw a listing, hiding it immediately.
    pub async fn unpublish(&self, listing_id: &str) -> Result<()> {
        let owner_id = self.owner_id()?;
        if self.cache.get(listing_id).is_none() {
            return Err(Error::invalid_input(format!(
                "listing {} not found",
                listing_id
            )));
        }

        let marketplace = Arc::clone(&self.marketplace);
        self.cache
            .apply_and_reconcile(listing_id, |_| None, async {
                marketplace
                    .unpublish_listing(&owner_id, listing_id)
                    .await
                    .map(|_| None)
            })
            .await?;

        self.audit(
            ACTION_MARKETPLACE_UNPUBLISH,
            &owner_id,
            json!({ "listingId": listing_id }),
        );
        Ok(())
    }

    fn owner_id(&self) -> Result<String> {
        self.cache.owner_id().ok_or(Error::NotAuthenticated)
    }

    fn audit(&self, kind: &str, owner_id: &str, details: Value) {
        self.audit_sink
            .record(ActionRecord::new(kind, owner_id, details));
    }
}
