//! Shared utilities

pub mod http_client;
pub mod url;

pub use http_client::UpstreamClients;
