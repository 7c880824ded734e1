use super::CollectionKey;
use crate::common::{atomic, Atomic};
use crate::store::{CollectionHandle, DocumentStore};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// Process-wide cache of collection handles.
///
/// Maps a [CollectionKey] to the [CollectionHandle] the document store gave
/// out for it. Entries are created on first use and never evicted. All
/// clones of a registry share the same cache.
#[derive(Clone)]
pub struct CollectionRegistry {
    inner: Arc<CollectionRegistryInner>,
}

impl CollectionRegistry {
    pub fn new(store: DocumentStore) -> Self {
        CollectionRegistry {
            inner: Arc::new(CollectionRegistryInner::new(store)),
        }
    }
}

impl Deref for CollectionRegistry {
    type Target = Arc<CollectionRegistryInner>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct CollectionRegistryInner {
    store: DocumentStore,
    handle_map: Atomic<HashMap<CollectionKey, CollectionHandle>>,
}

impl CollectionRegistryInner {
    fn new(store: DocumentStore) -> Self {
        Self {
            store,
            handle_map: atomic(HashMap::new()),
        }
    }

    /// Returns the handle for `key`, creating and caching it on first use.
    ///
    /// Equal keys always yield the same handle instance, also when several
    /// threads race on the first access. An empty database name means the
    /// store's default database.
    ///
    /// # Panics
    ///
    /// Panics when the collection name is empty.
    pub fn resolve(&self, key: &CollectionKey) -> CollectionHandle {
        assert!(
            !key.collection().is_empty(),
            "collection name must not be empty"
        );
        let key = key.or_default_database(&self.store.default_database());

        let cached = self.handle_map.read().get(&key).cloned();
        if let Some(handle) = cached {
            return handle;
        }

        // re-check under the write lock, another thread may have won
        let mut handle_map = self.handle_map.write();
        handle_map
            .entry(key)
            .or_insert_with_key(|key| {
                log::debug!("Opening collection handle for {}", key);
                self.store.collection(key.database(), key.collection())
            })
            .clone()
    }

    /// Whether a handle for `key` is already cached.
    pub fn contains(&self, key: &CollectionKey) -> bool {
        let key = key.or_default_database(&self.store.default_database());
        self.handle_map.read().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.handle_map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handle_map.read().is_empty()
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryDocumentStore;
    use std::thread;

    fn registry() -> (CollectionRegistry, InMemoryDocumentStore) {
        let store = InMemoryDocumentStore::new();
        (CollectionRegistry::new(DocumentStore::new(store.clone())), store)
    }

    #[test]
    fn resolve_is_idempotent() {
        let (registry, store) = registry();
        let key = CollectionKey::new("test", "user");
        let first = registry.resolve(&key);
        let second = registry.resolve(&CollectionKey::new("test", "user"));
        assert!(first.ptr_eq(&second));
        assert_eq!(registry.len(), 1);
        assert_eq!(store.collection_requests(), 1);
    }

    #[test]
    fn different_keys_get_different_handles() {
        let (registry, _) = registry();
        let a = registry.resolve(&CollectionKey::new("test", "user"));
        let b = registry.resolve(&CollectionKey::new("test", "api_log"));
        let c = registry.resolve(&CollectionKey::new("admin", "user"));
        assert!(!a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn empty_database_uses_default() {
        let (registry, _) = registry();
        let implicit = registry.resolve(&CollectionKey::new("", "user"));
        let explicit = registry.resolve(&CollectionKey::new("test", "user"));
        assert!(implicit.ptr_eq(&explicit));
        assert!(registry.contains(&CollectionKey::new("", "user")));
        assert_eq!(implicit.database(), "test");
    }

    #[test]
    #[should_panic(expected = "collection name must not be empty")]
    fn empty_collection_name_panics() {
        let (registry, _) = registry();
        registry.resolve(&CollectionKey::new("test", ""));
    }

    #[test]
    fn concurrent_first_access_creates_one_handle() {
        let (registry, store) = registry();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.resolve(&CollectionKey::new("test", "user")))
            })
            .collect();
        let resolved: Vec<CollectionHandle> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(resolved.iter().all(|h| h.ptr_eq(&resolved[0])));
        assert_eq!(store.collection_requests(), 1);
        assert_eq!(registry.len(), 1);
    }
}
