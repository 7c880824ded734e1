use crate::allocator::IdAllocator;
use crate::collection::{CollectionAccessor, DeleteResult, Document, UpdateResult};
use crate::common::{CallContext, SortSpec, Value, DOC_ID, SOFT_DELETE_FIELD};
use crate::errors::{DataError, DataResult, ErrorKind};
use crate::repository::Entity;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Typed operations for one entity type.
///
/// A model composes a [CollectionAccessor] bound to the entity's collection
/// with the shared [IdAllocator]. Reads go straight to the accessor;
/// `create` allocates an identifier first when the entity uses
/// auto-increment ids.
///
/// Models are cheap to clone and are usually obtained from a data context:
///
/// ```rust,ignore
/// let users = context.model::<User>();
/// let id = users.create(&ctx, &mut user)?;
/// let stored = users.get(&ctx, id)?;
/// ```
pub struct EntityModel<T: Entity> {
    accessor: CollectionAccessor,
    allocator: IdAllocator,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for EntityModel<T> {
    fn clone(&self) -> Self {
        EntityModel {
            accessor: self.accessor.clone(),
            allocator: self.allocator.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> EntityModel<T> {
    pub fn new(accessor: CollectionAccessor, allocator: IdAllocator) -> Self {
        EntityModel {
            accessor,
            allocator,
            _entity: PhantomData,
        }
    }

    /// The underlying accessor, for operations the model does not wrap.
    pub fn accessor(&self) -> &CollectionAccessor {
        &self.accessor
    }

    pub fn get<V: Into<Value>>(&self, ctx: &CallContext, id: V) -> DataResult<T> {
        self.accessor.get_by_field(ctx, DOC_ID, id)
    }

    pub fn get_by_field<V: Into<Value>>(
        &self,
        ctx: &CallContext,
        field: &str,
        value: V,
    ) -> DataResult<T> {
        self.accessor.get_by_field(ctx, field, value)
    }

    pub fn get_one_by_map(
        &self,
        ctx: &CallContext,
        filter: &Document,
        sort: Option<&SortSpec>,
    ) -> DataResult<T> {
        self.accessor.get_one_by_map(ctx, filter, sort)
    }

    pub fn get_all_by_map(
        &self,
        ctx: &CallContext,
        filter: &Document,
        sort: Option<&SortSpec>,
    ) -> DataResult<Vec<T>> {
        self.accessor.get_all_by_map(ctx, filter, sort)
    }

    pub fn list(
        &self,
        ctx: &CallContext,
        filter: &Document,
        page: u64,
        size: u64,
        sort: Option<&SortSpec>,
    ) -> DataResult<Vec<T>> {
        self.accessor.list(ctx, filter, page, size, sort)
    }

    pub fn count(&self, ctx: &CallContext, filter: &Document) -> DataResult<u64> {
        self.accessor.count(ctx, filter)
    }

    /// Stores a new entity and returns its `_id`.
    ///
    /// Auto-increment entities get the next allocated identifier written
    /// into `item` before the insert. Every entity is stamped with the
    /// current unix time through [Entity::touch_created]. Other entities
    /// keep their own id or receive one from the store.
    pub fn create(&self, ctx: &CallContext, item: &mut T) -> DataResult<Value> {
        if T::auto_increment() {
            let allocated = self.allocator.next_id(ctx, T::collection_name())?;
            if allocated.is_degraded() {
                log::warn!(
                    "Creating {} with id {} allocated in degraded mode",
                    T::collection_name(),
                    allocated
                );
            }
            item.set_id(allocated.value);
        }
        item.touch_created(chrono::Utc::now().timestamp());

        let result = self.accessor.create(ctx, &*item)?;
        Ok(result.inserted_id)
    }

    /// Merges `fields` into the stored entity.
    pub fn update<V: Into<Value>>(
        &self,
        ctx: &CallContext,
        id: V,
        fields: &Document,
    ) -> DataResult<UpdateResult> {
        self.accessor.update(ctx, id, fields)
    }

    /// Overwrites the stored entity with `item`. Destructive: fields holding
    /// default values replace stored values.
    pub fn save(&self, ctx: &CallContext, item: &T) -> DataResult<UpdateResult> {
        let id = item.id();
        if id.is_null() {
            log::error!("Cannot save a {} without an id", T::collection_name());
            return Err(DataError::new(
                &format!("Cannot save a {} without an id", T::collection_name()),
                ErrorKind::InvalidOperation,
            ));
        }
        self.accessor.save(ctx, id, item)
    }

    /// Soft delete: flags the entity with `is_deleted = 1` and keeps it.
    pub fn delete<V: Into<Value>>(&self, ctx: &CallContext, id: V) -> DataResult<UpdateResult> {
        let mut fields = Document::new();
        fields.put(SOFT_DELETE_FIELD, 1);
        self.accessor.update(ctx, id, &fields)
    }

    /// Physically removes the entity.
    pub fn force_delete<V: Into<Value>>(&self, ctx: &CallContext, id: V) -> DataResult<DeleteResult> {
        self.accessor.force_delete(ctx, id)
    }

    pub fn aggregate<R: DeserializeOwned>(&self, ctx: &CallContext, text: &str) -> DataResult<Vec<R>> {
        self.accessor.aggregate(ctx, text)
    }

    /// Creates every index declared by [Entity::indexes] and returns their
    /// names. Existing indexes are left alone.
    pub fn ensure_indexes(&self, ctx: &CallContext) -> DataResult<Vec<String>> {
        let indexes = T::indexes();
        log::info!(
            "Ensuring {} indexes on {}",
            indexes.len(),
            self.accessor.key()
        );
        indexes
            .iter()
            .map(|index| self.accessor.create_index(ctx, &index.keys, index.unique))
            .collect()
    }
}
