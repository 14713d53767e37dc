//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → clusters.rs (management) | proxy::* (forwarding)
//!     → response.rs (hop-by-hop stripping, streaming)
//!     → Send to client
//! ```

pub mod clusters;
pub mod request;
pub mod response;
pub mod server;

pub use clusters::ClientConfig;
pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer};
