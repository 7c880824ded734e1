use crate::collection::{
    DeleteResult, Document, FindOptions, IndexModel, IndexSpecification, InsertManyResult,
    InsertOneResult, UpdateResult,
};
use crate::common::CallContext;
use crate::errors::DataResult;
use crate::pipeline::Pipeline;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Operations a document store performs on one collection.
///
/// Filters are documents passed through untouched; an empty filter matches
/// every document. Update documents use operator form, `{"$set": {...}}`.
/// Every call receives the caller's [CallContext] and must fail with
/// `Timeout` or `Cancelled` instead of starting work the caller no longer
/// wants.
pub trait CollectionProvider: Send + Sync {
    /// Database this collection lives in.
    fn database(&self) -> String;

    /// Collection name.
    fn name(&self) -> String;

    fn find(
        &self,
        ctx: &CallContext,
        filter: &Document,
        options: &FindOptions,
    ) -> DataResult<Vec<Document>>;

    /// First document in `options` order, `None` when nothing matches.
    fn find_one(
        &self,
        ctx: &CallContext,
        filter: &Document,
        options: &FindOptions,
    ) -> DataResult<Option<Document>>;

    /// Inserts a document. A missing `_id` is generated by the store.
    fn insert_one(&self, ctx: &CallContext, document: Document) -> DataResult<InsertOneResult>;

    /// Inserts documents in order, stopping at the first failure.
    fn insert_many(
        &self,
        ctx: &CallContext,
        documents: Vec<Document>,
    ) -> DataResult<InsertManyResult>;

    fn update_one(
        &self,
        ctx: &CallContext,
        filter: &Document,
        update: &Document,
    ) -> DataResult<UpdateResult>;

    fn update_many(
        &self,
        ctx: &CallContext,
        filter: &Document,
        update: &Document,
    ) -> DataResult<UpdateResult>;

    fn delete_one(&self, ctx: &CallContext, filter: &Document) -> DataResult<DeleteResult>;

    fn delete_many(&self, ctx: &CallContext, filter: &Document) -> DataResult<DeleteResult>;

    /// Runs an aggregation pipeline. Stages the store cannot execute fail
    /// with `ErrorKind::ExecutionError`.
    fn aggregate(&self, ctx: &CallContext, pipeline: &Pipeline) -> DataResult<Vec<Document>>;

    fn count_documents(&self, ctx: &CallContext, filter: &Document) -> DataResult<u64>;

    /// Creates an index and returns its name.
    fn create_index(&self, ctx: &CallContext, model: &IndexModel) -> DataResult<String>;

    fn list_indexes(&self, ctx: &CallContext) -> DataResult<Vec<IndexSpecification>>;

    fn drop_index(&self, ctx: &CallContext, name: &str) -> DataResult<()>;
}

/// Shared handle to one collection of a document store.
///
/// Clones point at the same underlying collection; [CollectionHandle::ptr_eq]
/// tells whether two handles are the same instance, which is how the
/// registry's one-handle-per-key guarantee is observed.
#[derive(Clone)]
pub struct CollectionHandle {
    inner: Arc<dyn CollectionProvider>,
}

impl CollectionHandle {
    pub fn new<T: CollectionProvider + 'static>(inner: T) -> Self {
        CollectionHandle { inner: Arc::new(inner) }
    }

    pub fn ptr_eq(&self, other: &CollectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deref for CollectionHandle {
    type Target = Arc<dyn CollectionProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Debug for CollectionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("database", &self.inner.database())
            .field("name", &self.inner.name())
            .finish()
    }
}
