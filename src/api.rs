//! Backend access: the de-duplicating, retrying JSON client and the typed
//! dashboard endpoints built on it.

pub mod client;
pub mod endpoints;

pub use client::{ApiClient, RequestPolicy};
pub use endpoints::DashboardApi;
