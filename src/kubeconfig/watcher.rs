//! Kubeconfig file watcher with debounced reconciliation.
//!
//! # Responsibilities
//! - Load every configured kubeconfig once at startup
//! - Watch each file's parent directory, so files that do not exist yet are
//!   picked up when they appear
//! - Restart a per-path quiescence timer on every event and re-parse only
//!   once the file has settled
//! - Hand parsed results to the reconciler task over a channel

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::cluster::context::{ClusterContext, Origin};
use crate::cluster::store::ContextStore;
use crate::kubeconfig::parse::{parse_kubeconfig, split_paths};
use crate::observability::metrics;

/// Errors that prevent the watcher from starting.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to initialize file watcher: {0}")]
    Notify(#[from] notify::Error),
}

/// Parsed state of one kubeconfig file, sent to the reconciler.
#[derive(Debug)]
pub struct Reconcile {
    pub source: PathBuf,
    pub contexts: Vec<ClusterContext>,
}

/// One configured kubeconfig path.
#[derive(Debug)]
struct WatchTarget {
    /// Absolute path as configured; used as the context origin.
    path: PathBuf,
    dir: PathBuf,
    /// `canonical(dir)/file_name` once the directory is being watched.
    event_path: Option<PathBuf>,
}

/// Watches a set of kubeconfig files and keeps a `ContextStore` in sync.
pub struct KubeconfigWatcher {
    targets: Vec<WatchTarget>,
    debounce: Duration,
    rescan_interval: Duration,
}

/// Handle to the running watcher tasks.
pub struct WatcherHandle {
    watch_task: JoinHandle<()>,
    reconcile_task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Wait for both tasks to finish (after shutdown).
    pub async fn join(self) {
        let _ = self.watch_task.await;
        let _ = self.reconcile_task.await;
    }
}

impl KubeconfigWatcher {
    pub fn new(paths: Vec<PathBuf>, debounce: Duration, rescan_interval: Duration) -> Self {
        let mut targets: Vec<WatchTarget> = Vec::new();
        for path in paths.into_iter().map(absolute) {
            if targets.iter().any(|t| t.path == path) {
                continue;
            }
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
            targets.push(WatchTarget {
                path,
                dir,
                event_path: None,
            });
        }

        Self {
            targets,
            debounce,
            rescan_interval,
        }
    }

    /// Build from a separator-delimited path list (`a:b` / `a;b`).
    pub fn from_path_list(paths: &str, debounce: Duration, rescan_interval: Duration) -> Self {
        Self::new(split_paths(paths), debounce, rescan_interval)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.targets.iter().map(|t| t.path.as_path())
    }

    /// Load every file once, then start watching in the background.
    ///
    /// Returns after the initial load has been applied to `store`.
    pub async fn start(
        mut self,
        store: ContextStore,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<WatcherHandle, WatchError> {
        for target in &self.targets {
            if let Some(contexts) = load(&target.path).await {
                apply(
                    &store,
                    Reconcile {
                        source: target.path.clone(),
                        contexts,
                    },
                );
            }
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_access() {
                        return;
                    }
                    for path in event.paths {
                        let _ = event_tx.send(path);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Kubeconfig watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for dir in self.unwatched_dirs() {
            self.try_watch(&mut watcher, &dir);
        }

        let (reconcile_tx, reconcile_rx) = mpsc::channel::<Reconcile>(16);
        let reconcile_task = tokio::spawn(run_reconciler(store, reconcile_rx));
        let watch_task = tokio::spawn(self.run(watcher, event_rx, reconcile_tx, shutdown));

        Ok(WatcherHandle {
            watch_task,
            reconcile_task,
        })
    }

    async fn run(
        mut self,
        mut watcher: RecommendedWatcher,
        mut events: mpsc::UnboundedReceiver<PathBuf>,
        reconcile_tx: mpsc::Sender<Reconcile>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(
            paths = ?self.targets.iter().map(|t| &t.path).collect::<Vec<_>>(),
            debounce_ms = self.debounce.as_millis() as u64,
            "Kubeconfig watcher started"
        );

        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
        let mut rescan = time::interval(self.rescan_interval);
        rescan.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            let next_deadline = pending.values().min().copied();
            let settled = async move {
                match next_deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                Some(event_path) = events.recv() => {
                    if let Some(path) = self.lookup(&event_path) {
                        tracing::trace!(path = ?path, "Kubeconfig change detected");
                        pending.insert(path, Instant::now() + self.debounce);
                    }
                }
                _ = settled => {
                    let now = Instant::now();
                    let due: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, deadline)| **deadline <= now)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in due {
                        pending.remove(&path);
                        if let Some(contexts) = load(&path).await {
                            if reconcile_tx.send(Reconcile { source: path, contexts }).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                _ = rescan.tick() => {
                    for dir in self.unwatched_dirs() {
                        if self.try_watch(&mut watcher, &dir) {
                            for target in self.targets.iter().filter(|t| t.dir == dir) {
                                pending.insert(target.path.clone(), Instant::now() + self.debounce);
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Kubeconfig watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn unwatched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .targets
            .iter()
            .filter(|t| t.event_path.is_none())
            .map(|t| t.dir.clone())
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }

    /// Start watching `dir`; returns true if it is now watched.
    fn try_watch(&mut self, watcher: &mut RecommendedWatcher, dir: &Path) -> bool {
        let canonical = match dir.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::warn!(dir = ?dir, error = %e, "Kubeconfig directory unavailable, will retry");
                return false;
            }
        };

        if let Err(e) = watcher.watch(&canonical, RecursiveMode::NonRecursive) {
            tracing::warn!(dir = ?canonical, error = %e, "Failed to watch kubeconfig directory, will retry");
            return false;
        }

        for target in self.targets.iter_mut().filter(|t| t.dir == dir) {
            if let Some(name) = target.path.file_name() {
                target.event_path = Some(canonical.join(name));
            }
        }
        tracing::debug!(dir = ?canonical, "Watching kubeconfig directory");
        true
    }

    fn lookup(&self, event_path: &Path) -> Option<PathBuf> {
        self.targets
            .iter()
            .find(|t| t.event_path.as_deref() == Some(event_path) || t.path == event_path)
            .map(|t| t.path.clone())
    }
}

async fn run_reconciler(store: ContextStore, mut rx: mpsc::Receiver<Reconcile>) {
    while let Some(message) = rx.recv().await {
        apply(&store, message);
    }
    tracing::debug!("Kubeconfig reconciler stopped");
}

fn apply(store: &ContextStore, message: Reconcile) {
    let summary = store.reconcile(&message.source, message.contexts);

    for name in &summary.skipped {
        tracing::debug!(
            path = ?message.source,
            cluster = %name,
            "Dynamically added cluster shadows kubeconfig context"
        );
    }

    if !summary.is_noop() {
        tracing::info!(
            path = ?message.source,
            added = ?summary.added,
            updated = ?summary.updated,
            removed = ?summary.removed,
            "Reconciled kubeconfig"
        );
    }
    metrics::record_reconciliation("applied");
}

/// Read and parse one file.
///
/// `None` means "keep what was loaded before": the file could not be read
/// for a reason other than absence, or it failed to parse.
async fn load(path: &Path) -> Option<Vec<ClusterContext>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match parse_kubeconfig(&bytes, &Origin::File(path.to_path_buf())) {
            Ok(contexts) => Some(contexts),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to parse kubeconfig, keeping previously loaded contexts");
                metrics::record_reconciliation("parse_error");
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = ?path, "Kubeconfig not present");
            Some(Vec::new())
        }
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Failed to read kubeconfig, will retry on next change");
            metrics::record_reconciliation("io_error");
            None
        }
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_become_absolute_and_deduplicate() {
        let watcher = KubeconfigWatcher::new(
            vec![PathBuf::from("config"), PathBuf::from("config"), PathBuf::from("/etc/kube/config")],
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        let paths: Vec<_> = watcher.paths().collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.is_absolute()));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let contexts = load(&dir.path().join("absent")).await;
        assert_eq!(contexts.map(|c| c.len()), Some(0));
    }

    #[tokio::test]
    async fn test_load_malformed_file_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "clusters: [oops").unwrap();
        assert!(load(&path).await.is_none());
    }
}
