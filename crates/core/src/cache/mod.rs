//! Reactive list cache and its record/service contracts.

mod cache_model;
mod cache_traits;
mod list_cache;

pub use cache_model::*;
pub use cache_traits::*;
pub use list_cache::*;
