//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! /externalproxy request:
//!     → target header parsed into a URL
//!     → allow_list.rs (reject before any outbound connection)
//!     → proxy::external forwards
//! ```
//!
//! # Design Decisions
//! - Fail closed: an unparseable target is rejected, never forwarded
//! - No trust in client input

pub mod allow_list;

pub use allow_list::AllowList;
