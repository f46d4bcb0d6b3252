//! Authentication and admission-control middleware for a storage bridge API.

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod security;
pub mod store;

pub use config::schema::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::GatewayServer;
