use crate::common::{
    atomic, Atomic, ReadExecutor, WriteExecutor, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_COUNTER_ADDRESS, DEFAULT_DATABASE, DEFAULT_ID_KEY_PREFIX, DEFAULT_MAX_POOL_SIZE,
};
use crate::errors::{DataError, DataResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Connection settings of the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentStoreConfig {
    pub uri: String,
    pub default_database: String,
    pub max_pool_size: u32,
    pub connect_timeout: Duration,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        DocumentStoreConfig {
            uri: "memory://".to_string(),
            default_database: DEFAULT_DATABASE.to_string(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Connection settings of the counter store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterStoreConfig {
    pub address: String,
    pub password: Option<String>,
    pub db_index: u32,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self::local()
    }
}

impl CounterStoreConfig {
    /// A counter store on the local host, default port, no password.
    pub fn local() -> Self {
        CounterStoreConfig {
            address: DEFAULT_COUNTER_ADDRESS.to_string(),
            password: None,
            db_index: 0,
        }
    }
}

/// Plain, serializable settings behind a [DataConfig].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub document_store: DocumentStoreConfig,
    pub counter_store: CounterStoreConfig,
    /// Prefix of every allocator counter key.
    pub id_key_prefix: String,
    /// Timeout applied to the calls the data context makes on its own
    /// behalf, such as pings and allocator bootstrap.
    pub default_timeout: Duration,
}

impl Default for DataSettings {
    fn default() -> Self {
        DataSettings {
            document_store: DocumentStoreConfig::default(),
            counter_store: CounterStoreConfig::local(),
            id_key_prefix: DEFAULT_ID_KEY_PREFIX.to_string(),
            default_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl DataSettings {
    /// Checks the settings for values no store could work with.
    pub fn validate(&self) -> DataResult<()> {
        if self.document_store.uri.trim().is_empty() {
            return Err(config_error("Document store uri cannot be empty"));
        }
        if self.document_store.default_database.trim().is_empty() {
            return Err(config_error("Default database name cannot be empty"));
        }
        if self.document_store.max_pool_size == 0 {
            return Err(config_error("Maximum pool size must be at least 1"));
        }
        if self.document_store.connect_timeout.is_zero() {
            return Err(config_error("Connect timeout must be greater than zero"));
        }
        if self.counter_store.address.trim().is_empty() {
            return Err(config_error("Counter store address cannot be empty"));
        }
        if self.id_key_prefix.is_empty() {
            return Err(config_error("Id key prefix cannot be empty"));
        }
        if self.default_timeout.is_zero() {
            return Err(config_error("Default timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> DataError {
    log::error!("{}", message);
    DataError::new(message, ErrorKind::ConfigError)
}

/// Configuration of a data context.
///
/// Clones share the same settings. Settings can be changed until the
/// context opens; afterwards they are frozen and every setter fails with
/// [ErrorKind::InvalidOperation].
///
/// ```rust
/// use docbase::config::DataConfig;
///
/// let config = DataConfig::new();
/// config.set_default_database("app").unwrap();
/// assert_eq!(config.default_database(), "app");
/// ```
#[derive(Clone)]
pub struct DataConfig {
    inner: Arc<DataConfigInner>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DataConfig {
    pub fn new() -> Self {
        Self::from_settings(DataSettings::default())
    }

    pub fn from_settings(settings: DataSettings) -> Self {
        DataConfig {
            inner: Arc::new(DataConfigInner::new(settings)),
        }
    }

    /// Reads settings from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> DataResult<Self> {
        let settings: DataSettings = serde_json::from_str(text).map_err(|err| {
            log::error!("Invalid configuration: {}", err);
            DataError::new(&format!("Invalid configuration: {}", err), ErrorKind::ConfigError)
        })?;
        Ok(Self::from_settings(settings))
    }

    /// A copy of the current settings.
    pub fn settings(&self) -> DataSettings {
        self.inner.settings.read_with(|it| it.clone())
    }

    pub fn document_store(&self) -> DocumentStoreConfig {
        self.inner.settings.read_with(|it| it.document_store.clone())
    }

    pub fn counter_store(&self) -> CounterStoreConfig {
        self.inner.settings.read_with(|it| it.counter_store.clone())
    }

    pub fn default_database(&self) -> String {
        self.inner
            .settings
            .read_with(|it| it.document_store.default_database.clone())
    }

    pub fn id_key_prefix(&self) -> String {
        self.inner.settings.read_with(|it| it.id_key_prefix.clone())
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.settings.read_with(|it| it.default_timeout)
    }

    pub fn set_document_store(&self, document_store: DocumentStoreConfig) -> DataResult<()> {
        self.inner.update(|it| it.document_store = document_store)
    }

    pub fn set_counter_store(&self, counter_store: CounterStoreConfig) -> DataResult<()> {
        self.inner.update(|it| it.counter_store = counter_store)
    }

    pub fn set_default_database(&self, database: &str) -> DataResult<()> {
        self.inner
            .update(|it| it.document_store.default_database = database.to_string())
    }

    pub fn set_id_key_prefix(&self, prefix: &str) -> DataResult<()> {
        self.inner.update(|it| it.id_key_prefix = prefix.to_string())
    }

    pub fn set_default_timeout(&self, timeout: Duration) -> DataResult<()> {
        self.inner.update(|it| it.default_timeout = timeout)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Validates the settings and freezes them.
    pub(crate) fn initialize(&self) -> DataResult<()> {
        self.inner.settings.read_with(|it| it.validate())?;
        self.inner.initialized.store(true, Ordering::Release);
        Ok(())
    }
}

struct DataConfigInner {
    initialized: AtomicBool,
    settings: Atomic<DataSettings>,
}

impl DataConfigInner {
    fn new(settings: DataSettings) -> Self {
        DataConfigInner {
            initialized: AtomicBool::new(false),
            settings: atomic(settings),
        }
    }

    fn update(&self, f: impl FnOnce(&mut DataSettings)) -> DataResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            log::error!("Configuration cannot be changed after initialization");
            return Err(DataError::new(
                "Configuration cannot be changed after initialization",
                ErrorKind::InvalidOperation,
            ));
        }
        self.settings.write_with(f);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = DataSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.id_key_prefix, "auto_id:");
        assert_eq!(settings.document_store.default_database, "test");
        assert_eq!(settings.counter_store.address, "127.0.0.1:6379");
    }

    #[test]
    fn clones_share_settings() {
        let config = DataConfig::new();
        let clone = config.clone();
        config.set_id_key_prefix("seq:").unwrap();
        assert_eq!(clone.id_key_prefix(), "seq:");
    }

    #[test]
    fn settings_freeze_after_initialization() {
        let config = DataConfig::new();
        config.initialize().unwrap();
        assert!(config.is_initialized());
        let err = config.set_default_database("other").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        assert_eq!(config.default_database(), "test");
    }

    #[test]
    fn invalid_settings_fail_initialization() {
        let config = DataConfig::new();
        config.set_default_timeout(Duration::ZERO).unwrap();
        let err = config.initialize().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ConfigError);
        assert!(!config.is_initialized());

        let mut settings = DataSettings::default();
        settings.document_store.max_pool_size = 0;
        assert!(settings.validate().is_err());
        let mut settings = DataSettings::default();
        settings.document_store.uri = " ".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn json_settings_fill_missing_fields() {
        let config = DataConfig::from_json(
            r#"{"document_store": {"default_database": "app", "max_pool_size": 50},
                "id_key_prefix": "seq:"}"#,
        )
        .unwrap();
        assert_eq!(config.default_database(), "app");
        assert_eq!(config.document_store().max_pool_size, 50);
        assert_eq!(config.document_store().uri, "memory://");
        assert_eq!(config.id_key_prefix(), "seq:");
        assert_eq!(config.counter_store(), CounterStoreConfig::local());
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = DataConfig::from_json("{").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConfigError);
    }
}
