//! Network layer.

pub mod tls;

pub use tls::load_tls_config;
