use async_trait::async_trait;

use super::insights_model::{Insight, InsightStatus};
use crate::errors::Result;

/// Call/response contract of the insight (evolution) service.
#[async_trait]
pub trait InsightServiceTrait: Send + Sync {
    async fn list_insights(&self, owner_id: &str) -> Result<Vec<Insight>>;

    async fn update_status(
        &self,
        owner_id: &str,
        insight_id: &str,
        status: InsightStatus,
    ) -> Result<Insight>;
}
