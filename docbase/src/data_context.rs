use crate::allocator::IdAllocator;
use crate::collection::{CollectionAccessor, CollectionKey, CollectionRegistry};
use crate::common::CallContext;
use crate::config::DataConfig;
use crate::errors::{DataError, DataResult, ErrorKind};
use crate::repository::{Entity, EntityModel};
use crate::store::memory::{InMemoryCounterStore, InMemoryDocumentStore};
use crate::store::{CounterStore, CounterStoreProvider, DocumentStore, DocumentStoreProvider};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

const MEMORY_SCHEME: &str = "memory://";

/// The process-wide entry point: one document store connection, one
/// counter store connection, the collection registry and the id
/// allocator.
///
/// A data context is opened once at startup through
/// [DataContext::builder] and then shared by cloning; clones refer to the
/// same connections and caches.
///
/// ```rust
/// use docbase::data_context::DataContext;
/// use docbase::doc;
///
/// let context = DataContext::builder().open().unwrap();
/// let ctx = context.call_context();
/// let events = context.collection("event");
/// events.create(&ctx, &doc! { kind: "login" }).unwrap();
/// assert_eq!(events.count(&ctx, &doc! {}).unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct DataContext {
    inner: Arc<DataContextInner>,
}

impl DataContext {
    pub fn builder() -> DataContextBuilder {
        DataContextBuilder::new()
    }

    fn open(builder: DataContextBuilder) -> DataResult<DataContext> {
        let inner = DataContextInner::initialize(builder)?;
        Ok(DataContext {
            inner: Arc::new(inner),
        })
    }
}

impl Deref for DataContext {
    type Target = DataContextInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct DataContextInner {
    config: DataConfig,
    document_store: DocumentStore,
    counter_store: CounterStore,
    registry: CollectionRegistry,
    allocator: IdAllocator,
}

impl DataContextInner {
    fn initialize(builder: DataContextBuilder) -> DataResult<Self> {
        let DataContextBuilder {
            error,
            config,
            document_store,
            counter_store,
            tracked,
        } = builder;

        if let Some(err) = error {
            return Err(err);
        }
        config.initialize()?;

        let document_store = match document_store {
            Some(store) => store,
            None => auto_document_store(&config)?,
        };
        let counter_store = match counter_store {
            Some(store) => store,
            None => auto_counter_store(&config)?,
        };

        let connect_ctx = CallContext::with_timeout(config.document_store().connect_timeout);
        if let Err(err) = document_store.ping(&connect_ctx) {
            log::error!("Failed to connect to the document store: {}", err);
            return Err(DataError::new_with_cause(
                "Failed to connect to the document store",
                ErrorKind::ConnectionError,
                err,
            ));
        }
        log::info!("Connected to document store {}", config.document_store().uri);

        if let Err(err) = counter_store.ping(&connect_ctx) {
            log::error!("Failed to connect to the counter store: {}", err);
            return Err(DataError::new_with_cause(
                "Failed to connect to the counter store",
                ErrorKind::ConnectionError,
                err,
            ));
        }
        log::info!("Connected to counter store {}", config.counter_store().address);

        let registry = CollectionRegistry::new(document_store.clone());
        let allocator = IdAllocator::new(counter_store.clone(), &config.id_key_prefix());

        let bootstrap_ctx = CallContext::with_timeout(config.default_timeout());
        let accessors: Vec<CollectionAccessor> = tracked
            .iter()
            .map(|key| CollectionAccessor::new(registry.clone(), key.clone()))
            .collect();
        let seeds = allocator.bootstrap_all(&bootstrap_ctx, &accessors);

        log::info!(
            "Data context ready, {} collections tracked by the id allocator",
            seeds.len()
        );
        Ok(DataContextInner {
            config,
            document_store,
            counter_store,
            registry,
            allocator,
        })
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    pub fn document_store(&self) -> &DocumentStore {
        &self.document_store
    }

    pub fn counter_store(&self) -> &CounterStore {
        &self.counter_store
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    /// A fresh call context expiring after the configured default timeout.
    pub fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.config.default_timeout())
    }

    pub fn accessor(&self, key: CollectionKey) -> CollectionAccessor {
        CollectionAccessor::new(self.registry.clone(), key)
    }

    /// Accessor for `name` in the default database.
    pub fn collection(&self, name: &str) -> CollectionAccessor {
        self.accessor(CollectionKey::new("", name))
    }

    /// Model for `T` in the database the entity declares.
    pub fn model<T: Entity>(&self) -> EntityModel<T> {
        self.model_in(T::database_name().unwrap_or(""))
    }

    /// Model for `T` in `database`. Identifiers are still allocated from
    /// the counter of the entity's collection name.
    pub fn model_in<T: Entity>(&self, database: &str) -> EntityModel<T> {
        let key = CollectionKey::new(database, T::collection_name());
        EntityModel::new(self.accessor(key), self.allocator.clone())
    }
}

/// Collects stores, configuration and tracked collections for
/// [DataContext::builder].
///
/// The first configuration error is kept and returned by
/// [DataContextBuilder::open]; later calls are ignored once an error is
/// captured.
///
/// Without explicit stores, a `memory://` document store uri gets
/// in-memory implementations for both stores. Any other uri requires the
/// providers to be supplied.
pub struct DataContextBuilder {
    error: Option<DataError>,
    config: DataConfig,
    document_store: Option<DocumentStore>,
    counter_store: Option<CounterStore>,
    tracked: Vec<CollectionKey>,
}

impl Default for DataContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DataContextBuilder {
    pub fn new() -> Self {
        DataContextBuilder {
            error: None,
            config: DataConfig::new(),
            document_store: None,
            counter_store: None,
            tracked: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: DataConfig) -> Self {
        if self.error.is_none() {
            if config.is_initialized() {
                log::error!("Configuration is already in use by another data context");
                self.error = Some(DataError::new(
                    "Configuration is already in use by another data context",
                    ErrorKind::InvalidOperation,
                ));
            } else {
                self.config = config;
            }
        }
        self
    }

    pub fn default_database(mut self, database: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_default_database(database) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn id_key_prefix(mut self, prefix: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_id_key_prefix(prefix) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_default_timeout(timeout) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn document_store<T: DocumentStoreProvider + 'static>(mut self, store: T) -> Self {
        self.document_store = Some(DocumentStore::new(store));
        self
    }

    pub fn counter_store<T: CounterStoreProvider + 'static>(mut self, store: T) -> Self {
        self.counter_store = Some(CounterStore::new(store));
        self
    }

    /// Tracks the collection of `T` for id allocation when it uses
    /// auto-increment ids. Other entities are ignored.
    pub fn track<T: Entity>(self) -> Self {
        if !T::auto_increment() {
            log::debug!(
                "Entity {} does not use auto-increment ids, not tracking it",
                T::collection_name()
            );
            return self;
        }
        let key = CollectionKey::new(T::database_name().unwrap_or(""), T::collection_name());
        self.track_collection(key)
    }

    /// Tracks `key` for id allocation. Tracking the same key twice has no
    /// further effect.
    pub fn track_collection(mut self, key: CollectionKey) -> Self {
        if self.error.is_none() {
            if key.collection().is_empty() {
                log::error!("Cannot track a collection with an empty name");
                self.error = Some(DataError::new(
                    "Cannot track a collection with an empty name",
                    ErrorKind::InvalidOperation,
                ));
            } else if !self.tracked.contains(&key) {
                self.tracked.push(key);
            }
        }
        self
    }

    /// Validates the configuration, connects both stores and bootstraps the
    /// id allocator for every tracked collection.
    ///
    /// Fails with `ConfigError` for invalid settings and `ConnectionError`
    /// when either store cannot be reached.
    pub fn open(self) -> DataResult<DataContext> {
        DataContext::open(self)
    }
}

fn auto_document_store(config: &DataConfig) -> DataResult<DocumentStore> {
    let settings = config.document_store();
    if settings.uri.starts_with(MEMORY_SCHEME) {
        log::debug!("No document store given, using an in-memory store");
        return Ok(DocumentStore::new(InMemoryDocumentStore::with_default_database(
            &settings.default_database,
        )));
    }
    log::error!("No document store provider given for {}", settings.uri);
    Err(DataError::new(
        &format!("No document store provider given for {}", settings.uri),
        ErrorKind::ConfigError,
    ))
}

fn auto_counter_store(config: &DataConfig) -> DataResult<CounterStore> {
    if config.document_store().uri.starts_with(MEMORY_SCHEME) {
        log::debug!("No counter store given, using an in-memory counter store");
        return Ok(CounterStore::new(InMemoryCounterStore::new()));
    }
    let address = config.counter_store().address;
    log::error!("No counter store provider given for {}", address);
    Err(DataError::new(
        &format!("No counter store provider given for {}", address),
        ErrorKind::ConfigError,
    ))
}
