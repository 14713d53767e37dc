//! Concurrency-safe registry of cluster contexts.
//!
//! # Design Decisions
//! - Readers load an immutable snapshot (`ArcSwap`), so proxy lookups never
//!   wait behind a writer
//! - Writers are serialized by a mutex, build the next map off to the side,
//!   and publish it with one pointer swap: a batch is either fully visible
//!   or not visible at all
//! - No I/O happens here

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::cluster::context::{ClusterContext, Origin};
use crate::observability::metrics;

type ContextMap = HashMap<String, Arc<ClusterContext>>;

/// Shared, cheaply cloneable handle to the registry.
#[derive(Clone, Default)]
pub struct ContextStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    contexts: ArcSwap<ContextMap>,
    write_lock: Mutex<()>,
    /// Bumped after every published write.
    generation: AtomicU64,
}

/// What a file reconciliation changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Names held by a dynamically-added entry, left untouched.
    pub skipped: Vec<String>,
    pub unchanged: usize,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or override by name.
    pub fn put(&self, context: ClusterContext) {
        self.update(|map| {
            insert(map, context);
        });
    }

    /// Insert or override several contexts in one atomic step.
    pub fn put_all(&self, contexts: Vec<ClusterContext>) {
        if contexts.is_empty() {
            return;
        }
        self.update(|map| {
            for context in contexts {
                insert(map, context);
            }
        });
    }

    /// Counter that changes whenever a write is published.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClusterContext>> {
        self.inner.contexts.load().get(name).cloned()
    }

    /// Snapshot of every context, sorted by name.
    pub fn list(&self) -> Vec<Arc<ClusterContext>> {
        let snapshot = self.inner.contexts.load_full();
        let mut contexts: Vec<_> = snapshot.values().cloned().collect();
        contexts.sort_by(|a, b| a.name().cmp(b.name()));
        contexts
    }

    pub fn len(&self) -> usize {
        self.inner.contexts.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ClusterContext>> {
        if !self.inner.contexts.load().contains_key(name) {
            return None;
        }
        self.update(|map| map.remove(name))
    }

    /// Remove `name` only if it was added dynamically.
    pub fn remove_dynamic(&self, name: &str) -> Option<Arc<ClusterContext>> {
        self.update(|map| {
            let dynamic = map.get(name).is_some_and(|c| c.origin().is_dynamic());
            if dynamic {
                map.remove(name)
            } else {
                None
            }
        })
    }

    /// Make the entries attributed to `source` match `contexts`.
    ///
    /// File-origin entries from `source` that are absent from `contexts` are
    /// removed. Dynamically-added entries always win a name collision and are
    /// never touched here.
    pub fn reconcile(&self, source: &Path, contexts: Vec<ClusterContext>) -> ReconcileSummary {
        let incoming: HashSet<String> = contexts.iter().map(|c| c.name().to_string()).collect();

        self.update(|map| {
            let mut summary = ReconcileSummary::default();

            map.retain(|name, existing| {
                let stale = matches!(existing.origin(), Origin::File(path) if path == source)
                    && !incoming.contains(name);
                if stale {
                    summary.removed.push(name.clone());
                }
                !stale
            });

            for context in contexts {
                let name = context.name().to_string();
                match map.get(&name) {
                    Some(existing) if existing.origin().is_dynamic() => summary.skipped.push(name),
                    Some(existing) if **existing == context => summary.unchanged += 1,
                    Some(_) => {
                        map.insert(name.clone(), Arc::new(context));
                        summary.updated.push(name);
                    }
                    None => {
                        map.insert(name.clone(), Arc::new(context));
                        summary.added.push(name);
                    }
                }
            }

            summary.removed.sort();
            summary
        })
    }

    /// Serialize writers, mutate a private copy, publish atomically.
    fn update<R>(&self, f: impl FnOnce(&mut ContextMap) -> R) -> R {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut next = ContextMap::clone(&self.inner.contexts.load());
        let result = f(&mut next);
        record_counts(&next);
        self.inner.contexts.store(Arc::new(next));
        self.inner.generation.fetch_add(1, Ordering::Release);
        result
    }
}

/// Re-putting an identical context keeps the existing `Arc`.
fn insert(map: &mut ContextMap, context: ClusterContext) {
    if map.get(context.name()).is_some_and(|existing| **existing == context) {
        return;
    }
    map.insert(context.name().to_string(), Arc::new(context));
}

fn record_counts(map: &ContextMap) {
    let dynamic = map.values().filter(|c| c.origin().is_dynamic()).count();
    metrics::record_clusters("dynamic_cluster", dynamic);
    metrics::record_clusters("kubeconfig", map.len() - dynamic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dynamic(name: &str, server: &str) -> ClusterContext {
        ClusterContext::new(name, server, Origin::Dynamic).unwrap()
    }

    fn from_file(name: &str, path: &str) -> ClusterContext {
        ClusterContext::new(name, "https://file.example.com", Origin::File(PathBuf::from(path))).unwrap()
    }

    #[test]
    fn test_put_overrides_by_name() {
        let store = ContextStore::new();
        store.put(dynamic("a", "https://one.example.com"));
        store.put(dynamic("b", "https://two.example.com"));
        assert_eq!(store.len(), 2);

        store.put(dynamic("a", "https://three.example.com"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().server().host_str(), Some("three.example.com"));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let store = ContextStore::new();
        store.put(dynamic("prod", "https://one.example.com"));
        store.put(dynamic("Prod", "https://two.example.com"));
        assert_eq!(store.len(), 2);
        assert!(store.get("PROD").is_none());
    }

    #[test]
    fn test_identical_put_is_noop() {
        let store = ContextStore::new();
        store.put(dynamic("a", "https://one.example.com"));
        let before = store.get("a").unwrap();

        store.put(dynamic("a", "https://one.example.com"));
        let after = store.get("a").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_remove() {
        let store = ContextStore::new();
        store.put(dynamic("a", "https://one.example.com"));
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_dynamic_ignores_file_entries() {
        let store = ContextStore::new();
        store.put(from_file("a", "/kube/config"));
        assert!(store.remove_dynamic("a").is_none());
        assert!(store.get("a").is_some());
    }

    #[test]
    fn test_list_is_sorted_snapshot() {
        let store = ContextStore::new();
        store.put_all(vec![
            dynamic("c", "https://c.example.com"),
            dynamic("a", "https://a.example.com"),
            dynamic("b", "https://b.example.com"),
        ]);
        let snapshot = store.list();
        store.put(dynamic("d", "https://d.example.com"));

        let names: Vec<_> = snapshot.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_reconcile_removes_only_entries_from_same_file() {
        let store = ContextStore::new();
        let one = Path::new("/kube/one");
        store.reconcile(one, vec![from_file("a", "/kube/one"), from_file("b", "/kube/one")]);
        store.reconcile(Path::new("/kube/two"), vec![from_file("c", "/kube/two")]);
        store.put(dynamic("d", "https://d.example.com"));

        let summary = store.reconcile(one, vec![from_file("a", "/kube/one")]);
        assert_eq!(summary.removed, ["b"]);
        assert_eq!(summary.unchanged, 1);

        let summary = store.reconcile(one, Vec::new());
        assert_eq!(summary.removed, ["a"]);

        let names: Vec<_> = store.list().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["c", "d"]);
    }

    #[test]
    fn test_dynamic_entries_win_over_files() {
        let store = ContextStore::new();
        store.put(dynamic("shared", "https://dynamic.example.com"));

        let summary = store.reconcile(Path::new("/kube/config"), vec![from_file("shared", "/kube/config")]);
        assert_eq!(summary.skipped, ["shared"]);
        assert!(summary.is_noop());
        assert!(store.get("shared").unwrap().origin().is_dynamic());

        // Dynamic add over a file entry overrides it.
        store.reconcile(Path::new("/kube/config"), vec![from_file("other", "/kube/config")]);
        store.put(dynamic("other", "https://dynamic.example.com"));
        assert!(store.get("other").unwrap().origin().is_dynamic());

        // And the file's next pass does not evict it.
        let summary = store.reconcile(Path::new("/kube/config"), Vec::new());
        assert!(summary.removed.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let store = ContextStore::new();
        let mut handles = Vec::new();

        for writer in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    store.put(dynamic(&format!("w{}-{}", writer, i), "https://example.com"));
                }
            }));
        }
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    for ctx in store.list() {
                        assert!(!ctx.name().is_empty());
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 200);
    }
}
