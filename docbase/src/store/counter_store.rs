use crate::common::CallContext;
use crate::errors::DataResult;
use std::ops::Deref;
use std::sync::Arc;

/// An external key/value store with atomic integer increment.
///
/// Used only by the identifier allocator. All failures should carry
/// `ErrorKind::CounterUnavailable` (or `Timeout`/`Cancelled` from the call
/// context); the allocator treats every error the same way.
pub trait CounterStoreProvider: Send + Sync {
    /// Verifies the counter store is reachable.
    fn ping(&self, ctx: &CallContext) -> DataResult<()>;

    /// Overwrites `key` with `value`.
    fn set(&self, ctx: &CallContext, key: &str, value: i64) -> DataResult<()>;

    /// Current value of `key`, `None` when it was never set.
    fn get(&self, ctx: &CallContext, key: &str) -> DataResult<Option<i64>>;

    /// Atomically adds one to `key` and returns the new value. A missing key
    /// counts as zero.
    fn increment(&self, ctx: &CallContext, key: &str) -> DataResult<i64>;
}

/// Shared handle to a [CounterStoreProvider].
#[derive(Clone)]
pub struct CounterStore {
    inner: Arc<dyn CounterStoreProvider>,
}

impl CounterStore {
    pub fn new<T: CounterStoreProvider + 'static>(inner: T) -> Self {
        CounterStore { inner: Arc::new(inner) }
    }
}

impl Deref for CounterStore {
    type Target = Arc<dyn CounterStoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
