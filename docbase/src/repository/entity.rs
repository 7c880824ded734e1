use crate::common::{SortSpec, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record type stored in one collection.
///
/// Implementors describe where they live and how their identifier is
/// reached; the encoding itself is plain serde. Entities with
/// [Entity::auto_increment] (the default) store a dense integer `_id`
/// handed out by the id allocator, so their collection has to be tracked
/// by the data context.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize, Default)]
/// struct ApiLog {
///     #[serde(rename = "_id")]
///     id: i64,
///     uid: i64,
///     created: i64,
/// }
///
/// impl Entity for ApiLog {
///     fn collection_name() -> &'static str { "api_log" }
///     fn id(&self) -> Value { Value::from(self.id) }
///     fn set_id(&mut self, id: i64) { self.id = id; }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn collection_name() -> &'static str;

    /// Database holding the collection; `None` means the default database.
    fn database_name() -> Option<&'static str> {
        None
    }

    /// Whether `create` allocates the `_id` through the id allocator.
    fn auto_increment() -> bool {
        true
    }

    /// Indexes created by `EntityModel::ensure_indexes`.
    fn indexes() -> Vec<EntityIndex> {
        Vec::new()
    }

    /// Current `_id`, `Value::Null` when none is assigned.
    fn id(&self) -> Value;

    fn set_id(&mut self, id: i64);

    /// Called with the current unix time right before the entity is
    /// created.
    fn touch_created(&mut self, _timestamp: i64) {}
}

/// An index declared by an [Entity].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityIndex {
    pub keys: SortSpec,
    pub unique: bool,
}

impl EntityIndex {
    pub fn new(keys: SortSpec, unique: bool) -> Self {
        EntityIndex { keys, unique }
    }

    pub fn unique(keys: SortSpec) -> Self {
        EntityIndex::new(keys, true)
    }
}
