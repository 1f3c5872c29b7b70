//! Memoria core: a reactive list cache that reconciles optimistic local
//! edits with a remote service and its push notifications, plus the page
//! view-models built on it.

pub mod audit;
pub mod cache;
pub mod collections;
pub mod errors;
pub mod events;
pub mod insights;
pub mod journal;
pub mod knowledge;
pub mod marketplace;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, Result};
