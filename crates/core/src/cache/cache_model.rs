//! Record contract, ordering policy and reconciliation outcomes for list caches.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A remote-owned record that can be held by a [`ListCache`](super::ListCache).
///
/// Records are replaced whole (last writer wins); the cache never merges
/// individual fields.
pub trait CacheRecord: Clone + Send + Sync + 'static {
    /// Stable identifier, unique within the owning collection.
    fn id(&self) -> &str;

    /// Account the record belongs to.
    fn owner_id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;
}

pub type RecordComparator<R> = Arc<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

pub type RecordFilter<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// Ordering policy applied after every structural mutation.
pub enum SortOrder<R> {
    /// Descending by `created_at`.
    NewestFirst,
    /// Ascending by `created_at`.
    OldestFirst,
    /// Descending by `updated_at`.
    RecentlyUpdated,
    /// Order in which records entered the cache (fetch order, then arrival).
    Insertion,
    Custom(RecordComparator<R>),
}

impl<R: CacheRecord> SortOrder<R> {
    /// Compare two records, or `None` when the order is positional.
    pub fn compare(&self, a: &R, b: &R) -> Option<Ordering> {
        match self {
            Self::NewestFirst => Some(b.created_at().cmp(&a.created_at())),
            Self::OldestFirst => Some(a.created_at().cmp(&b.created_at())),
            Self::RecentlyUpdated => Some(b.updated_at().cmp(&a.updated_at())),
            Self::Insertion => None,
            Self::Custom(comparator) => Some(comparator(a, b)),
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, Self::Insertion)
    }
}

impl<R> Clone for SortOrder<R> {
    fn clone(&self) -> Self {
        match self {
            Self::NewestFirst => Self::NewestFirst,
            Self::OldestFirst => Self::OldestFirst,
            Self::RecentlyUpdated => Self::RecentlyUpdated,
            Self::Insertion => Self::Insertion,
            Self::Custom(comparator) => Self::Custom(Arc::clone(comparator)),
        }
    }
}

impl<R> fmt::Debug for SortOrder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewestFirst => f.write_str("NewestFirst"),
            Self::OldestFirst => f.write_str("OldestFirst"),
            Self::RecentlyUpdated => f.write_str("RecentlyUpdated"),
            Self::Insertion => f.write_str("Insertion"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Per-instance cache configuration.
pub struct ListCacheConfig<R> {
    /// Label used in log lines (e.g. "journal").
    pub name: String,
    pub sort_order: SortOrder<R>,
    /// Records rejected by the filter are never held, even when the
    /// service returns or pushes them.
    pub filter: Option<RecordFilter<R>>,
}

impl<R: CacheRecord> ListCacheConfig<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort_order: SortOrder::NewestFirst,
            filter: None,
        }
    }

    pub fn with_sort_order(mut self, sort_order: SortOrder<R>) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Whether a record belongs in this view.
    pub fn admits(&self, record: &R) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(record))
    }
}

impl<R> fmt::Debug for ListCacheConfig<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListCacheConfig")
            .field("name", &self.name)
            .field("sort_order", &self.sort_order)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Token returned by `apply_optimistic`, later passed to `confirm` or
/// `rollback`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptimisticHandle {
    pub(crate) id: String,
    pub(crate) seq: u64,
    pub(crate) epoch: u64,
}

impl OptimisticHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Result of a full fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum FetchOutcome {
    /// The response replaced the held items.
    Applied { count: usize },
    /// A newer bind/unbind/fetch started before the response arrived; it was
    /// discarded.
    Stale,
}

/// Result of `confirm` / `rollback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied,
    /// A newer optimistic edit on the same record owns the pending marker.
    Superseded,
    /// Nothing to reconcile: the record is gone locally, the marker was
    /// already cleared, or the handle predates the current binding.
    Dropped,
}

/// Outcome of a mutation call against a remote collaborator.
///
/// `AlreadyPresent` is a distinct success ("already a member"), never
/// inferred from an empty response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "record")]
pub enum MutationOutcome<R> {
    Applied(R),
    AlreadyPresent,
    Removed,
}

impl<R> MutationOutcome<R> {
    pub fn record(&self) -> Option<&R> {
        match self {
            Self::Applied(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<R> {
        match self {
            Self::Applied(record) => Some(record),
            _ => None,
        }
    }
}
