//! Push notification models and the publish/subscribe contract.

mod push_bus;
mod push_model;

pub use push_bus::*;
pub use push_model::*;
