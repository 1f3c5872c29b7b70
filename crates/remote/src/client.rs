//! REST client for the Memoria API.
//!
//! Every endpoint is scoped to an owner: `/api/v1/owners/{ownerId}/...`.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use memoria_core::cache::MutationOutcome;
use memoria_core::collections::{
    CollectionMember, CollectionServiceTrait, KnowledgeCollection, NewKnowledgeCollection,
};
use memoria_core::insights::{Insight, InsightServiceTrait, InsightStatus};
use memoria_core::knowledge::{
    KnowledgeRecord, KnowledgeRecordUpdate, KnowledgeServiceTrait, NewKnowledgeRecord,
};
use memoria_core::marketplace::{
    CourseListing, MarketplaceServiceTrait, NewCourseListing, Syllabus, SyllabusGeneratorTrait,
};
use memoria_core::Result as CoreResult;

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::types::*;

const MAX_LOG_BODY_CHARS: usize = 512;

/// Client for the Memoria API.
#[derive(Debug, Clone)]
pub struct MemoriaClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl MemoriaClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    /// Client configured from `MEMORIA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&RemoteConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn log_response(status: StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// `{base}/api/v1/owners/{owner_id}/{segments...}`, each segment
    /// percent-encoded.
    fn owner_url(&self, owner_id: &str, segments: &[&str]) -> Result<String> {
        let mut url = format!("{}/api/v1/owners", self.base_url);
        for segment in std::iter::once(&owner_id).chain(segments) {
            if segment.trim().is_empty() {
                return Err(RemoteError::invalid_request("empty path segment"));
            }
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        Ok(url)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| RemoteError::auth("missing access token"))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| RemoteError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    fn api_error(status: StatusCode, body: &str) -> RemoteError {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            return RemoteError::api(
                status.as_u16(),
                format!("{}: {}", error.code, error.message),
            );
        }
        RemoteError::api(status.as_u16(), format!("Request failed: {}", body))
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            RemoteError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// For endpoints whose success body carries nothing of interest.
    async fn parse_empty_response(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Knowledge
    // ─────────────────────────────────────────────────────────────────────────

    /// GET /api/v1/owners/{ownerId}/knowledge
    pub async fn get_knowledge_records(&self, owner_id: &str) -> Result<Vec<KnowledgeRecord>> {
        let url = self.owner_url(owner_id, &["knowledge"])?;
        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        let list: ListResponse<KnowledgeRecord> = Self::parse_response(response).await?;
        Ok(list.items)
    }

    /// POST /api/v1/owners/{ownerId}/knowledge
    pub async fn post_knowledge_record(
        &self,
        owner_id: &str,
        record: &NewKnowledgeRecord,
    ) -> Result<KnowledgeRecord> {
        let url = self.owner_url(owner_id, &["knowledge"])?;
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(record)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// PATCH /api/v1/owners/{ownerId}/knowledge/{recordId}
    pub async fn patch_knowledge_record(
        &self,
        owner_id: &str,
        record_id: &str,
        update: &KnowledgeRecordUpdate,
    ) -> Result<KnowledgeRecord> {
        let url = self.owner_url(owner_id, &["knowledge", record_id])?;
        let response = self
            .client
            .patch(&url)
            .headers(self.headers()?)
            .json(update)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// DELETE /api/v1/owners/{ownerId}/knowledge/{recordId}
    pub async fn delete_knowledge_record(&self, owner_id: &str, record_id: &str) -> Result<()> {
        let url = self.owner_url(owner_id, &["knowledge", record_id])?;
        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::parse_empty_response(response).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Collections
    // ─────────────────────────────────────────────────────────────────────────

    /// GET /api/v1/owners/{ownerId}/collections
    pub async fn get_collections(&self, owner_id: &str) -> Result<Vec<KnowledgeCollection>> {
        let url = self.owner_url(owner_id, &["collections"])?;
        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        let list: ListResponse<KnowledgeCollection> = Self::parse_response(response).await?;
        Ok(list.items)
    }

    /// POST /api/v1/owners/{ownerId}/collections
    pub async fn post_collection(
        &self,
        owner_id: &str,
        collection: &NewKnowledgeCollection,
    ) -> Result<KnowledgeCollection> {
        let url = self.owner_url(owner_id, &["collections"])?;
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(collection)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// GET /api/v1/owners/{ownerId}/collections/{collectionId}/members
    pub async fn get_collection_members(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<Vec<CollectionMember>> {
        let url = self.owner_url(owner_id, &["collections", collection_id, "members"])?;
        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        let list: ListResponse<CollectionMember> = Self::parse_response(response).await?;
        Ok(list.items)
    }

    /// POST /api/v1/owners/{ownerId}/collections/{collectionId}/members
    ///
    /// Responds `{"status":"already_present"}` when the record is already a
    /// member.
    pub async fn post_collection_member(
        &self,
        owner_id: &str,
        collection_id: &str,
        record_id: &str,
    ) -> Result<MutationOutcome<CollectionMember>> {
        let url = self.owner_url(owner_id, &["collections", collection_id, "members"])?;
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&AddMemberRequest {
                record_id: record_id.to_string(),
            })
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// DELETE /api/v1/owners/{ownerId}/collections/{collectionId}/members/{recordId}
    pub async fn delete_collection_member(
        &self,
        owner_id: &str,
        collection_id: &str,
        record_id: &str,
    ) -> Result<()> {
        let url = self.owner_url(
            owner_id,
            &["collections", collection_id, "members", record_id],
        )?;
        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::parse_empty_response(response).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Insights
    // ─────────────────────────────────────────────────────────────────────────

    /// GET /api/v1/owners/{ownerId}/insights
    pub async fn get_insights(&self, owner_id: &str) -> Result<Vec<Insight>> {
        let url = self.owner_url(owner_id, &["insights"])?;
        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        let list: ListResponse<Insight> = Self::parse_response(response).await?;
        Ok(list.items)
    }

    /// PATCH /api/v1/owners/{ownerId}/insights/{insightId}
    pub async fn patch_insight_status(
        &self,
        owner_id: &str,
        insight_id: &str,
        status: InsightStatus,
    ) -> Result<Insight> {
        let url = self.owner_url(owner_id, &["insights", insight_id])?;
        let response = self
            .client
            .patch(&url)
            .headers(self.headers()?)
            .json(&UpdateInsightStatusRequest { status })
            .send()
            .await?;
        Self::parse_response(response).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Marketplace
    // ─────────────────────────────────────────────────────────────────────────

    /// GET /api/v1/owners/{ownerId}/courses
    pub async fn get_courses(&self, owner_id: &str) -> Result<Vec<CourseListing>> {
        let url = self.owner_url(owner_id, &["courses"])?;
        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        let list: ListResponse<CourseListing> = Self::parse_response(response).await?;
        Ok(list.items)
    }

    /// POST /api/v1/owners/{ownerId}/courses
    pub async fn post_course(
        &self,
        owner_id: &str,
        listing: &NewCourseListing,
    ) -> Result<MutationOutcome<CourseListing>> {
        let url = self.owner_url(owner_id, &["courses"])?;
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(listing)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// DELETE /api/v1/owners/{ownerId}/courses/{listingId}
    pub async fn delete_course(&self, owner_id: &str, listing_id: &str) -> Result<()> {
        let url = self.owner_url(owner_id, &["courses", listing_id])?;
        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::parse_empty_response(response).await
    }

    /// POST /api/v1/owners/{ownerId}/collections/{collectionId}/syllabus
    pub async fn post_syllabus_generation(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<Syllabus> {
        let url = self.owner_url(owner_id, &["collections", collection_id, "syllabus"])?;
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl KnowledgeServiceTrait for MemoriaClient {
    async fn list_records(&self, owner_id: &str) -> CoreResult<Vec<KnowledgeRecord>> {
        Ok(self.get_knowledge_records(owner_id).await?)
    }

    async fn create_record(
        &self,
        owner_id: &str,
        record: NewKnowledgeRecord,
    ) -> CoreResult<KnowledgeRecord> {
        Ok(self.post_knowledge_record(owner_id, &record).await?)
    }

    async fn update_record(
        &self,
        owner_id: &str,
        record_id: &str,
        update: KnowledgeRecordUpdate,
    ) -> CoreResult<KnowledgeRecord> {
        Ok(self
            .patch_knowledge_record(owner_id, record_id, &update)
            .await?)
    }

    async fn delete_record(&self, owner_id: &str, record_id: &str) -> CoreResult<()> {
        Ok(self.delete_knowledge_record(owner_id, record_id).await?)
    }
}

#[async_trait]
impl CollectionServiceTrait for MemoriaClient {
    async fn list_collections(&self, owner_id: &str) -> CoreResult<Vec<KnowledgeCollection>> {
        Ok(self.get_collections(owner_id).await?)
    }

    async fn create_collection(
        &self,
        owner_id: &str,
        collection: NewKnowledgeCollection,
    ) -> CoreResult<KnowledgeCollection> {
        Ok(self.post_collection(owner_id, &collection).await?)
    }

    async fn list_members(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> CoreResult<Vec<CollectionMember>> {
        Ok(self.get_collection_members(owner_id, collection_id).await?)
    }

    async fn add_record(
        &self,
        owner_id: &str,
        collection_id: &str,
        record_id: &str,
    ) -> CoreResult<MutationOutcome<CollectionMember>> {
        Ok(self
            .post_collection_member(owner_id, collection_id, record_id)
            .await?)
    }

    async fn remove_record(
        &self,
        owner_id: &str,
        collection_id: &str,
        record_id: &str,
    ) -> CoreResult<()> {
        Ok(self
            .delete_collection_member(owner_id, collection_id, record_id)
            .await?)
    }
}

#[async_trait]
impl InsightServiceTrait for MemoriaClient {
    async fn list_insights(&self, owner_id: &str) -> CoreResult<Vec<Insight>> {
        Ok(self.get_insights(owner_id).await?)
    }

    async fn update_status(
        &self,
        owner_id: &str,
        insight_id: &str,
        status: InsightStatus,
    ) -> CoreResult<Insight> {
        Ok(self
            .patch_insight_status(owner_id, insight_id, status)
            .await?)
    }
}

#[async_trait]
impl MarketplaceServiceTrait for MemoriaClient {
    async fn list_listings(&self, owner_id: &str) -> CoreResult<Vec<CourseListing>> {
        Ok(self.get_courses(owner_id).await?)
    }

    async fn publish_listing(
        &self,
        owner_id: &str,
        listing: NewCourseListing,
    ) -> CoreResult<MutationOutcome<CourseListing>> {
        Ok(self.post_course(owner_id, &listing).await?)
    }

    async fn unpublish_listing(&self, owner_id: &str, listing_id: &str) -> CoreResult<()> {
        Ok(self.delete_course(owner_id, listing_id).await?)
    }
}

#[async_trait]
impl SyllabusGeneratorTrait for MemoriaClient {
    async fn generate_from_knowledge(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> CoreResult<Syllabus> {
        Ok(self
            .post_syllabus_generation(owner_id, collection_id)
            .await?)
    }
}
