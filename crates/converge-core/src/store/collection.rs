// ── Keyed state collection ──
//
// Concurrent map of serialized records with a version counter that
// subscribers can watch for changes.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

pub(crate) struct StateCollection<T: Send + Sync + 'static> {
    /// Keys are `"{kind}:{id}"`.
    by_key: DashMap<String, Arc<T>>,

    /// Bumped on every mutation.
    version: watch::Sender<u64>,
}

impl<T: Send + Sync + 'static> StateCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            by_key: DashMap::new(),
            version,
        }
    }

    pub(crate) fn key(kind: &str, id: &str) -> String {
        format!("{kind}:{id}")
    }

    /// Insert or replace. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, value: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(value)).is_none();
        self.bump_version();
        is_new
    }

    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.bump_version();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Keys under `kind`, without the prefix.
    pub(crate) fn ids(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{kind}:");
        let mut ids: Vec<String> = self
            .by_key
            .iter()
            .filter_map(|r| r.key().strip_prefix(&prefix).map(str::to_owned))
            .collect();
        ids.sort();
        ids
    }

    pub(crate) fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump_version(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_keys() {
        let col: StateCollection<String> = StateCollection::new();
        assert!(col.upsert("cluster:c-1".into(), "a".into()));
        assert!(!col.upsert("cluster:c-1".into(), "b".into()));
        assert_eq!(*col.get("cluster:c-1").unwrap(), "b");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn remove_bumps_version_only_when_present() {
        let col: StateCollection<String> = StateCollection::new();
        let rx = col.subscribe_version();
        col.upsert("k".into(), "v".into());
        assert_eq!(*rx.borrow(), 1);

        assert!(col.remove("missing").is_none());
        assert_eq!(*rx.borrow(), 1);

        assert_eq!(*col.remove("k").unwrap(), "v");
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn ids_are_scoped_by_kind() {
        let col: StateCollection<u8> = StateCollection::new();
        col.upsert(StateCollection::<u8>::key("node_pool", "c-1/a"), 1);
        col.upsert(StateCollection::<u8>::key("node_pool", "c-1/b"), 2);
        col.upsert(StateCollection::<u8>::key("cluster", "c-1"), 3);
        assert_eq!(col.ids("node_pool"), vec!["c-1/a", "c-1/b"]);
    }
}
