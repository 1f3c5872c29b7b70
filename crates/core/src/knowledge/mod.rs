//! Knowledge records shared by the journal and collection views.

mod knowledge_model;
mod knowledge_traits;

pub use knowledge_model::*;
pub use knowledge_traits::*;
