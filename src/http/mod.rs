//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower layers, request ID)
//!     → security middleware (route-gated)
//!     → handler
//!     → error_handler.rs (any GatewayError → status + JSON body)
//!     → Send to client
//! ```

pub mod error_handler;
pub mod server;

pub use error_handler::{error_response, resolve_status, ErrorBody};
pub use server::{AppState, GatewayServer, Stores};
