use async_trait::async_trait;

use super::marketplace_model::{CourseListing, NewCourseListing, Syllabus};
use crate::cache::MutationOutcome;
use crate::errors::Result;

/// Builds a course outline from a knowledge collection.
#[async_trait]
pub trait SyllabusGeneratorTrait: Send + Sync {
    async fn generate_from_knowledge(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<Syllabus>;
}

/// Call/response contract of the course marketplace.
#[async_trait]
pub trait MarketplaceServiceTrait: Send + Sync {
    async fn list_listings(&self, owner_id: &str) -> Result<Vec<CourseListing>>;

    /// Returns [`MutationOutcome::AlreadyPresent`] when the collection is
    /// already published.
    async fn publish_listing(
        &self,
        owner_id: &str,
        listing: NewCourseListing,
    ) -> Result<MutationOutcome<CourseListing>>;

    async fn unpublish_listing(&self, owner_id: &str, listing_id: &str) -> Result<()>;
}
