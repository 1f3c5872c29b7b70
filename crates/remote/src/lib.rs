//! HTTP client for the Memoria API, implementing the service contracts the
//! core view-models depend on.

mod client;
mod config;
mod error;
mod types;

pub use client::MemoriaClient;
pub use config::{RemoteConfig, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{RemoteError, Result};
pub use types::*;
