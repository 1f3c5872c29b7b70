//! Journal view: optimistic create/edit/star/delete over journal records.

mod journal_model;
mod journal_service;

pub use journal_model::*;
pub use journal_service::*;
