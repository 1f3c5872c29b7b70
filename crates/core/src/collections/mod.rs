//! Knowledge collections: the owner's collection list, and the detail view's
//! membership list with de-duplicated bulk add.

mod collections_list_service;
mod collections_model;
mod collections_service;
mod collections_traits;

pub use collections_list_service::*;
pub use collections_model::*;
pub use collections_service::*;
pub use collections_traits::*;
