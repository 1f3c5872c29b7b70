//! Action audit trail for user-initiated mutations.

mod audit_model;
mod audit_sink;

pub use audit_model::*;
pub use audit_sink::*;
