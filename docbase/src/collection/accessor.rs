use super::{
    CollectionKey, CollectionRegistry, DeleteResult, Document, FindOptions, IndexModel,
    IndexSpecification, InsertManyResult, InsertOneResult, UpdateResult,
};
use crate::common::{
    from_document, from_documents, to_document, CallContext, SortSpec, Value, DOC_ID,
    SET_OPERATOR,
};
use crate::errors::{DataError, DataResult, ErrorKind};
use crate::pipeline::{parse_pipeline, Pipeline};
use crate::store::CollectionHandle;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, OnceLock};

/// Typed CRUD, query and aggregation operations on one collection.
///
/// An accessor names its collection with a [CollectionKey] and resolves
/// the handle through the shared [CollectionRegistry] the first time it is
/// needed; the handle is then kept for the accessor's lifetime. Clones
/// share that memoized handle.
///
/// Filters are plain [Document]s passed straight to the store; an empty
/// filter matches every document. Every operation checks the caller's
/// [CallContext] before touching the store.
#[derive(Clone)]
pub struct CollectionAccessor {
    key: CollectionKey,
    registry: CollectionRegistry,
    handle: Arc<OnceLock<CollectionHandle>>,
}

impl CollectionAccessor {
    pub fn new(registry: CollectionRegistry, key: CollectionKey) -> Self {
        CollectionAccessor {
            key,
            registry,
            handle: Arc::new(OnceLock::new()),
        }
    }

    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    /// The collection handle, resolved on first call.
    pub fn handle(&self) -> &CollectionHandle {
        self.handle.get_or_init(|| self.registry.resolve(&self.key))
    }

    /// Number of documents matching `filter`.
    pub fn count(&self, ctx: &CallContext, filter: &Document) -> DataResult<u64> {
        ctx.check()?;
        self.handle().count_documents(ctx, filter)
    }

    /// First document whose `field` equals `value`.
    ///
    /// Fails with [ErrorKind::NotFound] when nothing matches and with
    /// [ErrorKind::DecodeError] when the stored shape does not fit `T`.
    pub fn get_by_field<T, V>(&self, ctx: &CallContext, field: &str, value: V) -> DataResult<T>
    where
        T: DeserializeOwned,
        V: Into<Value>,
    {
        let mut filter = Document::new();
        filter.put(field, value);
        self.get_one_by_map(ctx, &filter, None)
    }

    /// First document matching `filter`, in `sort` order when given.
    pub fn get_one_by_map<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        filter: &Document,
        sort: Option<&SortSpec>,
    ) -> DataResult<T> {
        ctx.check()?;
        let options = FindOptions::new().sort_opt(sort);
        match self.handle().find_one(ctx, filter, &options)? {
            Some(document) => from_document(&document),
            None => {
                log::debug!("No document in {} matches {}", self.key, filter);
                Err(DataError::new(
                    &format!("No document in {} matches {}", self.key, filter),
                    ErrorKind::NotFound,
                ))
            }
        }
    }

    /// Every document matching `filter`. An empty result is not an error.
    pub fn get_all_by_map<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        filter: &Document,
        sort: Option<&SortSpec>,
    ) -> DataResult<Vec<T>> {
        let options = FindOptions::new().sort_opt(sort);
        self.find_as(ctx, filter, &options)
    }

    /// Like [CollectionAccessor::get_all_by_map] but only loads `_id` and
    /// the named fields. An empty `fields` loads whole documents.
    pub fn get_all_with_fields<T, S>(
        &self,
        ctx: &CallContext,
        filter: &Document,
        sort: Option<&SortSpec>,
        fields: &[S],
    ) -> DataResult<Vec<T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        let options = FindOptions::new().sort_opt(sort).projection(fields);
        self.find_as(ctx, filter, &options)
    }

    /// One page of matching documents.
    ///
    /// Pages are 1-based: page 0 and page 1 both start at the first
    /// document and page `n` skips `(n - 1) * size`. A `size` of zero
    /// returns an empty page without querying the store.
    pub fn list<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        filter: &Document,
        page: u64,
        size: u64,
        sort: Option<&SortSpec>,
    ) -> DataResult<Vec<T>> {
        let empty: [&str; 0] = [];
        self.list_with_fields(ctx, filter, page, size, sort, &empty)
    }

    /// [CollectionAccessor::list] restricted to `_id` and the named fields.
    pub fn list_with_fields<T, S>(
        &self,
        ctx: &CallContext,
        filter: &Document,
        page: u64,
        size: u64,
        sort: Option<&SortSpec>,
        fields: &[S],
    ) -> DataResult<Vec<T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        if size == 0 {
            return Ok(Vec::new());
        }
        let options = FindOptions::new()
            .sort_opt(sort)
            .skip(page_offset(page, size))
            .limit(size)
            .projection(fields);
        self.find_as(ctx, filter, &options)
    }

    /// Inserts `item` as-is. A unique index violation surfaces as
    /// [ErrorKind::DuplicateKey].
    pub fn create<T: Serialize + ?Sized>(
        &self,
        ctx: &CallContext,
        item: &T,
    ) -> DataResult<InsertOneResult> {
        let document = to_document(item)?;
        ctx.check()?;
        self.handle().insert_one(ctx, document)
    }

    /// Inserts `items` in order. Nothing is sent for an empty slice.
    pub fn insert_many<T: Serialize>(
        &self,
        ctx: &CallContext,
        items: &[T],
    ) -> DataResult<InsertManyResult> {
        if items.is_empty() {
            return Ok(InsertManyResult::default());
        }
        let documents = items.iter().map(to_document).collect::<DataResult<Vec<_>>>()?;
        ctx.check()?;
        self.handle().insert_many(ctx, documents)
    }

    /// Merges `fields` into the document with the given `_id`; fields not
    /// named are left alone.
    pub fn update<V: Into<Value>>(
        &self,
        ctx: &CallContext,
        id: V,
        fields: &Document,
    ) -> DataResult<UpdateResult> {
        ctx.check()?;
        self.handle()
            .update_one(ctx, &id_filter(id), &set_update(fields.clone()))
    }

    /// Merges `fields` into every document matching `filter`.
    pub fn update_by_map(
        &self,
        ctx: &CallContext,
        filter: &Document,
        fields: &Document,
    ) -> DataResult<UpdateResult> {
        ctx.check()?;
        self.handle()
            .update_many(ctx, filter, &set_update(fields.clone()))
    }

    /// Overwrites the stored document with every field of `entity` except
    /// `_id`.
    ///
    /// Unlike [CollectionAccessor::update] this is destructive: zero and
    /// default values in `entity` replace whatever was stored.
    pub fn save<T, V>(&self, ctx: &CallContext, id: V, entity: &T) -> DataResult<UpdateResult>
    where
        T: Serialize + ?Sized,
        V: Into<Value>,
    {
        let mut fields = to_document(entity)?;
        fields.remove(DOC_ID);
        ctx.check()?;
        self.handle()
            .update_one(ctx, &id_filter(id), &set_update(fields))
    }

    /// Physically removes the document with the given `_id`.
    pub fn force_delete<V: Into<Value>>(&self, ctx: &CallContext, id: V) -> DataResult<DeleteResult> {
        ctx.check()?;
        self.handle().delete_one(ctx, &id_filter(id))
    }

    /// Physically removes every document matching `filter`.
    pub fn force_delete_by_map(
        &self,
        ctx: &CallContext,
        filter: &Document,
    ) -> DataResult<DeleteResult> {
        ctx.check()?;
        self.handle().delete_many(ctx, filter)
    }

    /// Parses `text` as a pipeline, runs it and decodes every result.
    ///
    /// Malformed text fails with [ErrorKind::ParseError] before the store
    /// is contacted; a stage the store rejects fails with
    /// [ErrorKind::ExecutionError].
    pub fn aggregate<T: DeserializeOwned>(&self, ctx: &CallContext, text: &str) -> DataResult<Vec<T>> {
        let pipeline = parse_pipeline(text)?;
        self.aggregate_pipeline(ctx, &pipeline)
    }

    pub fn aggregate_pipeline<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        pipeline: &Pipeline,
    ) -> DataResult<Vec<T>> {
        ctx.check()?;
        let documents = self.handle().aggregate(ctx, pipeline)?;
        from_documents(&documents)
    }

    /// Creates an index over `keys` and returns its derived name, e.g.
    /// `uid_-1_created_1`.
    ///
    /// Empty `keys` return `""` without contacting the store. When an index
    /// with the derived name already exists nothing is created.
    pub fn create_index(&self, ctx: &CallContext, keys: &SortSpec, unique: bool) -> DataResult<String> {
        if keys.is_empty() {
            return Ok(String::new());
        }
        let name = keys.index_name();
        if self.list_indexes(ctx)?.iter().any(|index| index.name == name) {
            log::debug!("Index {} already exists on {}", name, self.key);
            return Ok(name);
        }
        let model = IndexModel::new(keys.clone(), unique).named(&name);
        self.handle().create_index(ctx, &model)
    }

    pub fn drop_index(&self, ctx: &CallContext, name: &str) -> DataResult<()> {
        ctx.check()?;
        self.handle().drop_index(ctx, name)
    }

    pub fn list_indexes(&self, ctx: &CallContext) -> DataResult<Vec<IndexSpecification>> {
        ctx.check()?;
        self.handle().list_indexes(ctx)
    }

    /// Highest integer `_id` in the collection, 0 when the collection is
    /// empty or its highest `_id` is not an integer.
    pub fn last_id(&self, ctx: &CallContext) -> DataResult<i64> {
        ctx.check()?;
        let options = FindOptions::new()
            .sort(SortSpec::new().desc(DOC_ID))
            .projection(&[DOC_ID]);
        let last = self.handle().find_one(ctx, &Document::new(), &options)?;
        Ok(last
            .as_ref()
            .and_then(|document| document.id())
            .and_then(|id| id.as_i64())
            .unwrap_or(0))
    }

    fn find_as<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        filter: &Document,
        options: &FindOptions,
    ) -> DataResult<Vec<T>> {
        ctx.check()?;
        let documents = self.handle().find(ctx, filter, options)?;
        from_documents(&documents)
    }
}

fn page_offset(page: u64, size: u64) -> u64 {
    if page <= 1 {
        0
    } else {
        (page - 1).saturating_mul(size)
    }
}

fn id_filter<V: Into<Value>>(id: V) -> Document {
    let mut filter = Document::new();
    filter.put(DOC_ID, id);
    filter
}

fn set_update(fields: Document) -> Document {
    let mut update = Document::new();
    update.put(SET_OPERATOR, fields);
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::store::memory::InMemoryDocumentStore;
    use crate::store::DocumentStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct User {
        #[serde(rename = "_id")]
        id: i64,
        #[serde(default)]
        name: String,
        #[serde(default)]
        phone: String,
        #[serde(default)]
        age: i32,
    }

    fn user(id: i64, name: &str, age: i32) -> User {
        User {
            id,
            name: name.to_string(),
            phone: format!("555-{}", id),
            age,
        }
    }

    fn set_up() -> (CollectionAccessor, InMemoryDocumentStore) {
        let store = InMemoryDocumentStore::new();
        let registry = CollectionRegistry::new(DocumentStore::new(store.clone()));
        (CollectionAccessor::new(registry, CollectionKey::new("test", "user")), store)
    }

    fn ctx() -> CallContext {
        CallContext::background()
    }

    #[test]
    fn handle_is_resolved_once_and_shared_by_clones() {
        let (accessor, store) = set_up();
        let clone = accessor.clone();
        assert!(accessor.handle().ptr_eq(clone.handle()));
        accessor.count(&ctx(), &doc! {}).unwrap();
        clone.count(&ctx(), &doc! {}).unwrap();
        assert_eq!(store.collection_requests(), 1);
    }

    #[test]
    fn get_by_field_found_and_not_found() {
        let (accessor, _) = set_up();
        accessor.create(&ctx(), &user(1, "ann", 30)).unwrap();
        let found: User = accessor.get_by_field(&ctx(), "phone", "555-1").unwrap();
        assert_eq!(found, user(1, "ann", 30));
        let err = accessor.get_by_field::<User, _>(&ctx(), "phone", "nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn shape_mismatch_is_decode_error() {
        let (accessor, _) = set_up();
        accessor.create(&ctx(), &doc! { "_id": "text-id", name: "x" }).unwrap();
        let err = accessor.get_by_field::<User, _>(&ctx(), "name", "x").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DecodeError);
    }

    #[test]
    fn get_one_by_map_honors_sort() {
        let (accessor, _) = set_up();
        for id in 1..=3 {
            accessor.create(&ctx(), &user(id, "same", id as i32)).unwrap();
        }
        let sort = SortSpec::new().desc("age");
        let oldest: User = accessor
            .get_one_by_map(&ctx(), &doc! { name: "same" }, Some(&sort))
            .unwrap();
        assert_eq!(oldest.id, 3);
    }

    #[test]
    fn get_all_with_fields_projects() {
        let (accessor, _) = set_up();
        accessor.create(&ctx(), &user(1, "ann", 30)).unwrap();
        let users: Vec<User> = accessor
            .get_all_with_fields(&ctx(), &doc! {}, None, &["name"])
            .unwrap();
        assert_eq!(users, vec![User { id: 1, name: "ann".into(), ..User::default() }]);
    }

    #[test]
    fn list_pages_are_one_based() {
        let (accessor, _) = set_up();
        let users: Vec<User> = (1..=25).map(|id| user(id, "u", 0)).collect();
        accessor.insert_many(&ctx(), &users).unwrap();
        let sort = SortSpec::new().asc("_id");

        let page0: Vec<User> = accessor.list(&ctx(), &doc! {}, 0, 10, Some(&sort)).unwrap();
        let page1: Vec<User> = accessor.list(&ctx(), &doc! {}, 1, 10, Some(&sort)).unwrap();
        assert_eq!(page0, page1);
        assert_eq!(page1.first().map(|u| u.id), Some(1));

        let page3: Vec<User> = accessor.list(&ctx(), &doc! {}, 3, 10, Some(&sort)).unwrap();
        assert_eq!(page3.iter().map(|u| u.id).collect::<Vec<_>>(), (21..=25).collect::<Vec<_>>());

        let page9: Vec<User> = accessor.list(&ctx(), &doc! {}, 9, 10, Some(&sort)).unwrap();
        assert!(page9.is_empty());
    }

    #[test]
    fn zero_page_size_never_reaches_the_store() {
        let (accessor, store) = set_up();
        store.set_available(false);
        let page: Vec<User> = accessor.list(&ctx(), &doc! {}, 1, 0, None).unwrap();
        assert!(page.is_empty());
        assert!(accessor.list::<User>(&ctx(), &doc! {}, 1, 1, None).is_err());
    }

    #[test]
    fn update_merges_but_save_overwrites() {
        let (accessor, _) = set_up();
        accessor.create(&ctx(), &user(1, "ann", 30)).unwrap();

        accessor.update(&ctx(), 1, &doc! { name: "anna" }).unwrap();
        let merged: User = accessor.get_by_field(&ctx(), DOC_ID, 1).unwrap();
        assert_eq!(merged.age, 30);
        assert_eq!(merged.name, "anna");

        let replacement = User { id: 99, name: "bo".into(), ..User::default() };
        let result = accessor.save(&ctx(), 1, &replacement).unwrap();
        assert_eq!(result.matched_count, 1);
        let saved: User = accessor.get_by_field(&ctx(), DOC_ID, 1).unwrap();
        assert_eq!(saved, User { id: 1, name: "bo".into(), ..User::default() });
    }

    #[test]
    fn update_by_map_touches_every_match() {
        let (accessor, _) = set_up();
        accessor
            .insert_many(&ctx(), &[user(1, "a", 1), user(2, "a", 2), user(3, "b", 3)])
            .unwrap();
        let result = accessor
            .update_by_map(&ctx(), &doc! { name: "a" }, &doc! { age: 10 })
            .unwrap();
        assert_eq!(result.modified_count, 2);
        assert_eq!(accessor.count(&ctx(), &doc! { age: 10 }).unwrap(), 2);
    }

    #[test]
    fn duplicate_create_is_duplicate_key() {
        let (accessor, _) = set_up();
        accessor.create(&ctx(), &user(1, "a", 1)).unwrap();
        assert!(accessor.create(&ctx(), &user(1, "b", 1)).unwrap_err().is_duplicate_key());
    }

    #[test]
    fn empty_insert_many_is_a_no_op() {
        let (accessor, store) = set_up();
        store.set_available(false);
        let empty: Vec<User> = Vec::new();
        assert!(accessor.insert_many(&ctx(), &empty).unwrap().inserted_ids.is_empty());
    }

    #[test]
    fn force_delete_by_id_and_map() {
        let (accessor, _) = set_up();
        accessor
            .insert_many(&ctx(), &[user(1, "a", 1), user(2, "a", 2), user(3, "b", 3)])
            .unwrap();
        assert_eq!(accessor.force_delete(&ctx(), 1).unwrap().deleted_count, 1);
        assert_eq!(accessor.force_delete_by_map(&ctx(), &doc! { name: "a" }).unwrap().deleted_count, 1);
        assert_eq!(accessor.count(&ctx(), &doc! {}).unwrap(), 1);
    }

    #[test]
    fn aggregate_distinguishes_parse_and_execution_errors() {
        let (accessor, _) = set_up();
        accessor
            .insert_many(&ctx(), &[user(1, "a", 1), user(2, "a", 2), user(3, "b", 3)])
            .unwrap();

        #[derive(Debug, Deserialize, PartialEq)]
        struct Total {
            #[serde(rename = "_id")]
            name: String,
            total: i64,
        }
        let totals: Vec<Total> = accessor
            .aggregate(&ctx(), r#"[{"$group": {"_id": "$name", "total": {"$sum": "$age"}}}, {"$sort": {"_id": 1}}]"#)
            .unwrap();
        assert_eq!(
            totals,
            vec![Total { name: "a".into(), total: 3 }, Total { name: "b".into(), total: 3 }]
        );

        let err = accessor.aggregate::<Document>(&ctx(), r#"[{"$match": {}}"#).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ParseError);
        let err = accessor.aggregate::<Document>(&ctx(), r#"{"$out": "x"}"#).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ExecutionError);
    }

    #[test]
    fn create_index_is_idempotent() {
        let (accessor, _) = set_up();
        let keys = SortSpec::new().desc("uid").asc("created");
        assert_eq!(accessor.create_index(&ctx(), &keys, false).unwrap(), "uid_-1_created_1");
        assert_eq!(accessor.create_index(&ctx(), &keys, false).unwrap(), "uid_-1_created_1");
        assert_eq!(accessor.list_indexes(&ctx()).unwrap().len(), 2);
        accessor.drop_index(&ctx(), "uid_-1_created_1").unwrap();
        assert_eq!(accessor.list_indexes(&ctx()).unwrap().len(), 1);
    }

    #[test]
    fn empty_index_keys_skip_the_store() {
        let (accessor, store) = set_up();
        store.set_available(false);
        assert_eq!(accessor.create_index(&ctx(), &SortSpec::new(), true).unwrap(), "");
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let (accessor, _) = set_up();
        accessor.create_index(&ctx(), &SortSpec::new().asc("phone"), true).unwrap();
        accessor.create(&ctx(), &user(1, "a", 1)).unwrap();
        let mut clash = user(2, "b", 1);
        clash.phone = "555-1".into();
        assert!(accessor.create(&ctx(), &clash).unwrap_err().is_duplicate_key());
    }

    #[test]
    fn last_id_reads_highest_integer_id() {
        let (accessor, _) = set_up();
        assert_eq!(accessor.last_id(&ctx()).unwrap(), 0);
        accessor
            .insert_many(&ctx(), &[user(3, "a", 1), user(12, "a", 2), user(7, "b", 3)])
            .unwrap();
        assert_eq!(accessor.last_id(&ctx()).unwrap(), 12);
    }

    #[test]
    fn cancelled_context_stops_before_the_store() {
        let (accessor, _) = set_up();
        let ctx = CallContext::background();
        ctx.cancel();
        let err = accessor.count(&ctx, &doc! {}).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Cancelled);
    }

    #[test]
    fn page_offset_math() {
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(2, 10), 10);
        assert_eq!(page_offset(u64::MAX, u64::MAX), u64::MAX);
    }
}
