//! Cluster registry subsystem.
//!
//! # Data Flow
//! ```text
//! kubeconfig watcher ──reconcile(file, contexts)──┐
//!                                                 ▼
//! POST/DELETE /cluster → manager.rs ──put/remove──▶ store.rs (ArcSwap snapshot)
//!                                                 │
//!                        proxy handlers ◀──get────┘
//! ```
//!
//! # Design Decisions
//! - Contexts are immutable once built; changes replace whole entries
//! - Dynamically-added entries take precedence over kubeconfig entries of the
//!   same name and survive file reloads

pub mod context;
pub mod manager;
pub mod store;

pub use context::{ClusterContext, ClusterSummary, ContextError, Credential, Origin};
pub use manager::{ClusterManager, ClusterRequest, ClusterRequestBody};
pub use store::{ContextStore, ReconcileSummary};
