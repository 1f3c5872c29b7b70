use async_trait::async_trait;

use super::cache_model::CacheRecord;
use crate::errors::Result;

/// Fetch-all contract for the remote collection behind a cache.
#[async_trait]
pub trait RecordSource<R: CacheRecord>: Send + Sync {
    /// Complete current collection for `owner_id`.
    async fn fetch_all(&self, owner_id: &str) -> Result<Vec<R>>;
}
