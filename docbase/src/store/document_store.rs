use crate::common::CallContext;
use crate::errors::DataResult;
use crate::store::CollectionHandle;
use std::ops::Deref;
use std::sync::Arc;

/// Connection-level contract of a document store.
///
/// A provider owns the connection pool. It is shared by every collection
/// handle it hands out, so implementations must be `Send + Sync`.
///
/// # Implementations
/// - `InMemoryDocumentStore`: process-local storage for tests and embedding
pub trait DocumentStoreProvider: Send + Sync {
    /// Verifies the store is reachable.
    ///
    /// Called once while the data context opens; a failure there aborts
    /// startup with `ErrorKind::ConnectionError`.
    fn ping(&self, ctx: &CallContext) -> DataResult<()>;

    /// Returns a handle to `collection` in `database`.
    ///
    /// Obtaining a handle does not talk to the server; the collection is
    /// created lazily on first write.
    fn collection(&self, database: &str, collection: &str) -> CollectionHandle;

    /// Database used when a caller does not name one.
    fn default_database(&self) -> String;
}

/// Shared handle to a [DocumentStoreProvider].
///
/// Cloning is cheap; every clone refers to the same connection pool.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<dyn DocumentStoreProvider>,
}

impl DocumentStore {
    pub fn new<T: DocumentStoreProvider + 'static>(inner: T) -> Self {
        DocumentStore { inner: Arc::new(inner) }
    }
}

impl Deref for DocumentStore {
    type Target = Arc<dyn DocumentStoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
