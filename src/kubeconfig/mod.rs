//! Kubeconfig ingestion subsystem.
//!
//! # Data Flow
//! ```text
//! kubeconfig paths ("a:b:c", platform separator)
//!     → watcher.rs (notify on parent dirs, debounce per path)
//!     → parse.rs (YAML → Vec<ClusterContext>, origin = File(path))
//!     → Reconcile message over mpsc
//!     → reconciler task → ContextStore::reconcile (atomic swap)
//!
//! POST /cluster with an encoded kubeconfig:
//!     → parse.rs (origin = Dynamic) → ContextStore::put_all
//! ```
//!
//! # Design Decisions
//! - A malformed file never replaces what was loaded from it before
//! - A missing file is an empty file: its contexts are removed
//! - The reconciler task is the only writer that removes file-origin entries

pub mod parse;
pub mod watcher;

pub use parse::{decode_base64, parse_kubeconfig, split_paths, KubeconfigError};
pub use watcher::{KubeconfigWatcher, WatchError, WatcherHandle};
