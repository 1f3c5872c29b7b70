//! Insight review: pending suggestions the user can act on or dismiss.

mod insights_model;
mod insights_service;
mod insights_traits;

pub use insights_model::*;
pub use insights_service::*;
pub use insights_traits::*;
