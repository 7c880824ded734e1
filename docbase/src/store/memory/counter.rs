use crate::common::CallContext;
use crate::errors::{DataError, DataResult, ErrorKind};
use crate::store::CounterStoreProvider;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-local counter store with atomic increments.
///
/// [InMemoryCounterStore::set_available] simulates an outage: while
/// unavailable every call fails with `ErrorKind::CounterUnavailable` and
/// stored values are left untouched.
#[derive(Clone)]
pub struct InMemoryCounterStore {
    inner: Arc<InMemoryCounterStoreInner>,
}

struct InMemoryCounterStoreInner {
    values: DashMap<String, i64>,
    available: AtomicBool,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        InMemoryCounterStore {
            inner: Arc::new(InMemoryCounterStoreInner {
                values: DashMap::new(),
                available: AtomicBool::new(true),
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }

    fn ensure_ready(&self, ctx: &CallContext) -> DataResult<()> {
        ctx.check()?;
        if !self.is_available() {
            log::error!("Counter store is unavailable");
            return Err(DataError::new(
                "Counter store is unavailable",
                ErrorKind::CounterUnavailable,
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStoreProvider for InMemoryCounterStore {
    fn ping(&self, ctx: &CallContext) -> DataResult<()> {
        self.ensure_ready(ctx)
    }

    fn set(&self, ctx: &CallContext, key: &str, value: i64) -> DataResult<()> {
        self.ensure_ready(ctx)?;
        self.inner.values.insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, ctx: &CallContext, key: &str) -> DataResult<Option<i64>> {
        self.ensure_ready(ctx)?;
        Ok(self.inner.values.get(key).map(|value| *value))
    }

    fn increment(&self, ctx: &CallContext, key: &str) -> DataResult<i64> {
        self.ensure_ready(ctx)?;
        let mut entry = self.inner.values.entry(key.to_string()).or_insert(0);
        let next = entry.checked_add(1).ok_or_else(|| {
            log::error!("Counter {} overflowed", key);
            DataError::new(
                &format!("Counter {} overflowed", key),
                ErrorKind::CounterUnavailable,
            )
        })?;
        *entry = next;
        Ok(next)
    }
}
