//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → store → initial kubeconfig load + watcher → listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server drains, watcher tasks exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last: the first request already sees file clusters
//! - A broken kubeconfig watcher is logged, not fatal

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
