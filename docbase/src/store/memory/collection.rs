use super::aggregate::run_pipeline;
use super::query::{
    apply_update, execution_error, index_key, matches, project, sort_documents, validate_update,
};
use crate::collection::{
    DeleteResult, Document, FindOptions, IndexModel, IndexSpecification, InsertManyResult,
    InsertOneResult, UpdateResult,
};
use crate::common::{
    atomic, Atomic, CallContext, ReadExecutor, SortSpec, Value, WriteExecutor, DOC_ID,
    ID_INDEX_NAME,
};
use crate::errors::{DataError, DataResult, ErrorKind};
use crate::pipeline::Pipeline;
use crate::store::CollectionProvider;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// One collection of an [InMemoryDocumentStore](super::InMemoryDocumentStore).
///
/// Documents are kept in insertion order. Every collection has the unique
/// `_id_` index; further indexes are only used to enforce uniqueness.
#[derive(Clone)]
pub struct InMemoryCollection {
    inner: Arc<InMemoryCollectionInner>,
}

struct InMemoryCollectionInner {
    database: String,
    name: String,
    available: Arc<AtomicBool>,
    state: Atomic<CollectionState>,
}

struct CollectionState {
    documents: Vec<Document>,
    indexes: IndexMap<String, IndexSpecification>,
}

impl InMemoryCollection {
    /// Creates a standalone collection that is always reachable.
    pub fn new(database: &str, name: &str) -> Self {
        Self::with_availability(database, name, Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn with_availability(database: &str, name: &str, available: Arc<AtomicBool>) -> Self {
        let mut indexes = IndexMap::new();
        indexes.insert(
            ID_INDEX_NAME.to_string(),
            IndexSpecification {
                name: ID_INDEX_NAME.to_string(),
                keys: SortSpec::new().asc(DOC_ID),
                unique: true,
            },
        );
        InMemoryCollection {
            inner: Arc::new(InMemoryCollectionInner {
                database: database.to_string(),
                name: name.to_string(),
                available,
                state: atomic(CollectionState {
                    documents: Vec::new(),
                    indexes,
                }),
            }),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.inner.state.read_with(|state| state.documents.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InMemoryCollectionInner {
    fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    fn ensure_ready(&self, ctx: &CallContext) -> DataResult<()> {
        ctx.check()?;
        if !self.available.load(Ordering::Acquire) {
            log::error!("Document store is unreachable while accessing {}", self.namespace());
            return Err(DataError::new(
                &format!("Document store is unreachable while accessing {}", self.namespace()),
                ErrorKind::ConnectionError,
            ));
        }
        Ok(())
    }

    fn matching_positions(
        &self,
        state: &CollectionState,
        filter: &Document,
        first_only: bool,
    ) -> DataResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in state.documents.iter().enumerate() {
            if matches(document, filter)? {
                positions.push(position);
                if first_only {
                    break;
                }
            }
        }
        Ok(positions)
    }

    fn update(
        &self,
        ctx: &CallContext,
        filter: &Document,
        update: &Document,
        first_only: bool,
    ) -> DataResult<UpdateResult> {
        self.ensure_ready(ctx)?;
        validate_update(update)?;
        self.state.write_with(|state| {
            let positions = self.matching_positions(state, filter, first_only)?;
            let mut result = UpdateResult::default();
            for position in positions {
                result.matched_count += 1;
                let current = &state.documents[position];
                let updated = apply_update(current, update)?;
                if updated == *current {
                    continue;
                }
                state.check_unique(&self.namespace(), &updated, Some(position))?;
                state.documents[position] = updated;
                result.modified_count += 1;
            }
            Ok(result)
        })
    }

    fn delete(&self, ctx: &CallContext, filter: &Document, first_only: bool) -> DataResult<DeleteResult> {
        self.ensure_ready(ctx)?;
        self.state.write_with(|state| {
            let positions = self.matching_positions(state, filter, first_only)?;
            for position in positions.iter().rev() {
                state.documents.remove(*position);
            }
            Ok(DeleteResult {
                deleted_count: positions.len() as u64,
            })
        })
    }
}

impl CollectionState {
    /// Fails with `DuplicateKey` when `candidate` collides with another
    /// document on any unique index. `skip` names the position of the
    /// document being replaced.
    fn check_unique(&self, namespace: &str, candidate: &Document, skip: Option<usize>) -> DataResult<()> {
        for index in self.indexes.values().filter(|index| index.unique) {
            let key = index_key(candidate, &index.keys);
            let collides = self
                .documents
                .iter()
                .enumerate()
                .any(|(position, existing)| Some(position) != skip && index_key(existing, &index.keys) == key);
            if collides {
                log::error!(
                    "Duplicate key error collection: {} index: {} dup key: {:?}",
                    namespace,
                    index.name,
                    key
                );
                return Err(DataError::new(
                    &format!(
                        "Duplicate key error collection: {} index: {} dup key: {:?}",
                        namespace, index.name, key
                    ),
                    ErrorKind::DuplicateKey,
                ));
            }
        }
        Ok(())
    }

    fn insert(&mut self, namespace: &str, document: Document) -> DataResult<Value> {
        let id = document
            .id()
            .cloned()
            .unwrap_or_else(|| Value::from(Uuid::new_v4().to_string()));

        // _id always leads the stored document
        let mut stored = Document::new();
        stored.put(DOC_ID, id.clone());
        for (key, value) in document {
            if key != DOC_ID {
                stored.put(key, value);
            }
        }

        self.check_unique(namespace, &stored, None)?;
        self.documents.push(stored);
        Ok(id)
    }
}

impl CollectionProvider for InMemoryCollection {
    fn database(&self) -> String {
        self.inner.database.clone()
    }

    fn name(&self) -> String {
        self.inner.name.clone()
    }

    fn find(
        &self,
        ctx: &CallContext,
        filter: &Document,
        options: &FindOptions,
    ) -> DataResult<Vec<Document>> {
        self.inner.ensure_ready(ctx)?;
        let mut found = self.inner.state.read_with(|state| {
            let mut found = Vec::new();
            for document in &state.documents {
                if matches(document, filter)? {
                    found.push(document.clone());
                }
            }
            Ok::<_, DataError>(found)
        })?;

        if let Some(sort) = &options.sort {
            sort_documents(&mut found, sort);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let page = found.into_iter().skip(skip).take(limit);

        Ok(match &options.projection {
            Some(fields) => page.map(|document| project(&document, fields)).collect(),
            None => page.collect(),
        })
    }

    fn find_one(
        &self,
        ctx: &CallContext,
        filter: &Document,
        options: &FindOptions,
    ) -> DataResult<Option<Document>> {
        let options = options.clone().limit(1);
        Ok(self.find(ctx, filter, &options)?.into_iter().next())
    }

    fn insert_one(&self, ctx: &CallContext, document: Document) -> DataResult<InsertOneResult> {
        self.inner.ensure_ready(ctx)?;
        let namespace = self.inner.namespace();
        let inserted_id = self
            .inner
            .state
            .write_with(|state| state.insert(&namespace, document))?;
        log::debug!("Inserted document {} into {}", inserted_id, namespace);
        Ok(InsertOneResult { inserted_id })
    }

    fn insert_many(
        &self,
        ctx: &CallContext,
        documents: Vec<Document>,
    ) -> DataResult<InsertManyResult> {
        self.inner.ensure_ready(ctx)?;
        let namespace = self.inner.namespace();
        let inserted_ids = self.inner.state.write_with(|state| {
            let mut ids = Vec::with_capacity(documents.len());
            for document in documents {
                ids.push(state.insert(&namespace, document)?);
            }
            Ok::<_, DataError>(ids)
        })?;
        log::debug!("Inserted {} documents into {}", inserted_ids.len(), namespace);
        Ok(InsertManyResult { inserted_ids })
    }

    fn update_one(
        &self,
        ctx: &CallContext,
        filter: &Document,
        update: &Document,
    ) -> DataResult<UpdateResult> {
        self.inner.update(ctx, filter, update, true)
    }

    fn update_many(
        &self,
        ctx: &CallContext,
        filter: &Document,
        update: &Document,
    ) -> DataResult<UpdateResult> {
        self.inner.update(ctx, filter, update, false)
    }

    fn delete_one(&self, ctx: &CallContext, filter: &Document) -> DataResult<DeleteResult> {
        self.inner.delete(ctx, filter, true)
    }

    fn delete_many(&self, ctx: &CallContext, filter: &Document) -> DataResult<DeleteResult> {
        self.inner.delete(ctx, filter, false)
    }

    fn aggregate(&self, ctx: &CallContext, pipeline: &Pipeline) -> DataResult<Vec<Document>> {
        self.inner.ensure_ready(ctx)?;
        let documents = self.inner.state.read_with(|state| state.documents.clone());
        run_pipeline(ctx, documents, pipeline)
    }

    fn count_documents(&self, ctx: &CallContext, filter: &Document) -> DataResult<u64> {
        self.inner.ensure_ready(ctx)?;
        self.inner.state.read_with(|state| {
            let mut count = 0;
            for document in &state.documents {
                if matches(document, filter)? {
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    fn create_index(&self, ctx: &CallContext, model: &IndexModel) -> DataResult<String> {
        self.inner.ensure_ready(ctx)?;
        if model.keys.is_empty() {
            log::error!("Index keys must not be empty");
            return Err(DataError::new(
                "Index keys must not be empty",
                ErrorKind::InvalidOperation,
            ));
        }

        let name = model.resolved_name();
        let namespace = self.inner.namespace();
        self.inner.state.write_with(|state| {
            if let Some(existing) = state.indexes.get(&name) {
                if existing.keys == model.keys && existing.unique == model.unique {
                    return Ok(());
                }
                return Err(execution_error(&format!(
                    "An index named {} already exists on {} with different options",
                    name, namespace
                )));
            }

            if model.unique {
                let mut seen = BTreeSet::new();
                for document in &state.documents {
                    let key = index_key(document, &model.keys);
                    if !seen.insert(key.clone()) {
                        log::error!(
                            "Cannot build unique index {} on {}, dup key: {:?}",
                            name,
                            namespace,
                            key
                        );
                        return Err(DataError::new(
                            &format!(
                                "Cannot build unique index {} on {}, dup key: {:?}",
                                name, namespace, key
                            ),
                            ErrorKind::DuplicateKey,
                        ));
                    }
                }
            }

            state.indexes.insert(
                name.clone(),
                IndexSpecification {
                    name: name.clone(),
                    keys: model.keys.clone(),
                    unique: model.unique,
                },
            );
            log::info!("Created index {} on {}", name, namespace);
            Ok(())
        })?;
        Ok(name)
    }

    fn list_indexes(&self, ctx: &CallContext) -> DataResult<Vec<IndexSpecification>> {
        self.inner.ensure_ready(ctx)?;
        Ok(self
            .inner
            .state
            .read_with(|state| state.indexes.values().cloned().collect()))
    }

    fn drop_index(&self, ctx: &CallContext, name: &str) -> DataResult<()> {
        self.inner.ensure_ready(ctx)?;
        if name == ID_INDEX_NAME {
            return Err(execution_error("Cannot drop the _id index"));
        }
        let namespace = self.inner.namespace();
        self.inner.state.write_with(|state| {
            if state.indexes.shift_remove(name).is_none() {
                log::error!("Index {} not found on {}", name, namespace);
                return Err(DataError::new(
                    &format!("Index {} not found on {}", name, namespace),
                    ErrorKind::NotFound,
                ));
            }
            log::info!("Dropped index {} on {}", name, namespace);
            Ok(())
        })
    }
}
