//! Course marketplace: syllabus generation and publishing.

mod marketplace_model;
mod marketplace_service;
mod marketplace_traits;

pub use marketplace_model::*;
pub use marketplace_service::*;
pub use marketplace_traits::*;
