use super::InMemoryCollection;
use crate::common::{CallContext, DEFAULT_DATABASE};
use crate::errors::{DataError, DataResult, ErrorKind};
use crate::store::{CollectionHandle, DocumentStoreProvider};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-local document store.
///
/// Collections are created on first request and live as long as the store.
/// Reachability can be switched off with [InMemoryDocumentStore::set_available]
/// to exercise connection failures: `ping` and every collection call then
/// fail with `ErrorKind::ConnectionError`.
///
/// ```rust
/// use docbase::common::CallContext;
/// use docbase::store::memory::InMemoryDocumentStore;
/// use docbase::store::DocumentStoreProvider;
///
/// let store = InMemoryDocumentStore::new();
/// assert!(store.ping(&CallContext::background()).is_ok());
/// store.set_available(false);
/// assert!(store.ping(&CallContext::background()).is_err());
/// ```
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<InMemoryDocumentStoreInner>,
}

struct InMemoryDocumentStoreInner {
    default_database: String,
    collections: DashMap<(String, String), CollectionHandle>,
    available: Arc<AtomicBool>,
    collection_requests: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_default_database(DEFAULT_DATABASE)
    }

    pub fn with_default_database(database: &str) -> Self {
        InMemoryDocumentStore {
            inner: Arc::new(InMemoryDocumentStoreInner {
                default_database: database.to_string(),
                collections: DashMap::new(),
                available: Arc::new(AtomicBool::new(true)),
                collection_requests: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }

    /// How many times a collection handle was requested from this store.
    pub fn collection_requests(&self) -> usize {
        self.inner.collection_requests.load(Ordering::Acquire)
    }

    /// Names of the collections created in `database`, sorted.
    pub fn collection_names(&self, database: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .collections
            .iter()
            .filter(|entry| entry.key().0 == database)
            .map(|entry| entry.key().1.clone())
            .collect();
        names.sort();
        names
    }

    /// Drops every collection of `database`. Handles already handed out
    /// keep their documents but are no longer reachable from the store.
    pub fn drop_database(&self, database: &str) {
        self.inner.collections.retain(|(db, _), _| db != database);
        log::debug!("Dropped in-memory database {}", database);
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStoreProvider for InMemoryDocumentStore {
    fn ping(&self, ctx: &CallContext) -> DataResult<()> {
        ctx.check()?;
        if !self.is_available() {
            log::error!("In-memory document store is unavailable");
            return Err(DataError::new(
                "In-memory document store is unavailable",
                ErrorKind::ConnectionError,
            ));
        }
        Ok(())
    }

    fn collection(&self, database: &str, collection: &str) -> CollectionHandle {
        self.inner.collection_requests.fetch_add(1, Ordering::AcqRel);
        self.inner
            .collections
            .entry((database.to_string(), collection.to_string()))
            .or_insert_with(|| {
                log::debug!("Creating in-memory collection {}.{}", database, collection);
                CollectionHandle::new(InMemoryCollection::with_availability(
                    database,
                    collection,
                    self.inner.available.clone(),
                ))
            })
            .clone()
    }

    fn default_database(&self) -> String {
        self.inner.default_database.clone()
    }
}
