//! Dense auto-increment identifiers shared by many processes.
//!
//! Each tracked collection has a counter in the counter store, keyed by the
//! configured prefix plus the collection name (`auto_id:user`). The counter
//! always holds the last identifier handed out: bootstrap seeds it with the
//! collection's highest stored `_id` and every allocation increments it
//! before returning. An empty collection therefore starts at 1, a populated
//! one at its maximum plus one.
//!
//! # Degraded mode
//!
//! When the counter store cannot be reached the allocator does not fail.
//! It hands out the next value after the highest identifier this process
//! has seen, marks it [IdSource::LocalFallback] and counts it in
//! [IdAllocator::degraded_allocations]. Fallback values are not coordinated
//! between processes: two processes allocating during the same outage can
//! produce the same identifier, and once the counter is back it may return
//! values that fallback already used. The latter is logged at `warn`.

use crate::collection::CollectionAccessor;
use crate::common::CallContext;
use crate::errors::{DataError, DataResult, ErrorKind};
use crate::store::CounterStore;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Where an allocated identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// Atomically incremented by the shared counter store
    Counter,
    /// Derived from this process's cached state while the counter store
    /// was unavailable
    LocalFallback,
}

/// An identifier together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedId {
    pub value: i64,
    pub source: IdSource,
}

impl AllocatedId {
    pub fn is_degraded(&self) -> bool {
        self.source == IdSource::LocalFallback
    }
}

impl Display for AllocatedId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Per-collection allocator state, rebuilt by every bootstrap.
#[derive(Debug)]
pub struct AllocatorState {
    counter_key: String,
    // highest identifier this process has seen, from any source
    cached_last: AtomicI64,
    // highest identifier known to be taken without going through the
    // counter: the bootstrap seed and every fallback allocation
    local_high: AtomicI64,
}

impl AllocatorState {
    fn new(counter_key: String, seed: i64) -> Self {
        AllocatorState {
            counter_key,
            cached_last: AtomicI64::new(seed),
            local_high: AtomicI64::new(seed),
        }
    }

    pub fn counter_key(&self) -> &str {
        &self.counter_key
    }

    pub fn cached_last(&self) -> i64 {
        self.cached_last.load(Ordering::Acquire)
    }
}

/// Hands out strictly increasing identifiers for tracked collections.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct IdAllocator {
    inner: Arc<IdAllocatorInner>,
}

struct IdAllocatorInner {
    counter: CounterStore,
    key_prefix: String,
    states: DashMap<String, Arc<AllocatorState>>,
    degraded_allocations: AtomicU64,
}

impl IdAllocator {
    pub fn new(counter: CounterStore, key_prefix: &str) -> Self {
        IdAllocator {
            inner: Arc::new(IdAllocatorInner {
                counter,
                key_prefix: key_prefix.to_string(),
                states: DashMap::new(),
                degraded_allocations: AtomicU64::new(0),
            }),
        }
    }

    /// Counter store key for `collection`.
    pub fn counter_key(&self, collection: &str) -> String {
        format!("{}{}", self.inner.key_prefix, collection)
    }

    /// Seeds the counter of the accessor's collection with its highest
    /// stored `_id` and starts tracking the collection. Returns the seed.
    ///
    /// This is the only operation that resets a counter and is meant to run
    /// once per collection at startup. A failed read seeds from 0; a failed
    /// counter write leaves the collection tracked but starting out in
    /// degraded mode. Both are logged.
    ///
    /// When the same collection name lives in several databases, use
    /// [IdAllocator::bootstrap_all] so the shared counter starts above every
    /// one of them.
    pub fn bootstrap(&self, ctx: &CallContext, accessor: &CollectionAccessor) -> i64 {
        self.seed(ctx, accessor.key().collection(), &[accessor])
    }

    /// Bootstraps every accessor's collection. Accessors are grouped by
    /// collection name and each shared counter is seeded once, with the
    /// highest `_id` found across the group. Returns the seed per
    /// collection.
    pub fn bootstrap_all(
        &self,
        ctx: &CallContext,
        accessors: &[CollectionAccessor],
    ) -> BTreeMap<String, i64> {
        let mut groups: BTreeMap<&str, Vec<&CollectionAccessor>> = BTreeMap::new();
        for accessor in accessors {
            groups
                .entry(accessor.key().collection())
                .or_default()
                .push(accessor);
        }
        groups
            .into_iter()
            .map(|(collection, group)| (collection.to_string(), self.seed(ctx, collection, &group)))
            .collect()
    }

    fn seed(&self, ctx: &CallContext, collection: &str, group: &[&CollectionAccessor]) -> i64 {
        let seed = group
            .iter()
            .map(|accessor| match accessor.last_id(ctx) {
                Ok(last) => last,
                Err(err) => {
                    log::warn!(
                        "Failed to read the highest id of {}, ignoring it while seeding: {}",
                        accessor.key(),
                        err
                    );
                    0
                }
            })
            .max()
            .unwrap_or(0);

        let counter_key = self.counter_key(collection);
        if let Err(err) = self.inner.counter.set(ctx, &counter_key, seed) {
            log::warn!(
                "Failed to seed counter {} with {}, allocations for {} start degraded: {}",
                counter_key,
                seed,
                collection,
                err
            );
        }

        self.inner.states.insert(
            collection.to_string(),
            Arc::new(AllocatorState::new(counter_key, seed)),
        );
        log::info!("Id allocator for {} bootstrapped at {}", collection, seed);
        seed
    }

    /// Allocates the next identifier for `collection`.
    ///
    /// Fails with [ErrorKind::InvalidOperation] for a collection that was
    /// never bootstrapped, and with `Cancelled`/`Timeout` when the context
    /// is done before or during the counter call. Other counter failures
    /// never fail the call; see the module docs for the degraded mode.
    pub fn next_id(&self, ctx: &CallContext, collection: &str) -> DataResult<AllocatedId> {
        let state = self.state(collection)?;
        ctx.check()?;

        match self.inner.counter.increment(ctx, state.counter_key()) {
            Ok(value) => {
                state.cached_last.fetch_max(value, Ordering::AcqRel);
                let local_high = state.local_high.load(Ordering::Acquire);
                if value <= local_high {
                    log::warn!(
                        "Counter {} returned {} which is not above {} already taken locally; \
                         identifiers for {} may collide",
                        state.counter_key(),
                        value,
                        local_high,
                        collection
                    );
                }
                Ok(AllocatedId {
                    value,
                    source: IdSource::Counter,
                })
            }
            Err(err) if matches!(err.kind(), ErrorKind::Timeout | ErrorKind::Cancelled) => {
                log::error!(
                    "Counter call for {} ended by the caller's context: {}",
                    collection,
                    err
                );
                Err(err)
            }
            Err(err) => {
                let value = state.cached_last.fetch_add(1, Ordering::AcqRel) + 1;
                state.local_high.fetch_max(value, Ordering::AcqRel);
                self.inner.degraded_allocations.fetch_add(1, Ordering::AcqRel);
                log::warn!(
                    "Counter store unavailable for {}, allocated {} from local state: {}",
                    collection,
                    value,
                    err
                );
                Ok(AllocatedId {
                    value,
                    source: IdSource::LocalFallback,
                })
            }
        }
    }

    /// Total number of identifiers handed out in degraded mode.
    pub fn degraded_allocations(&self) -> u64 {
        self.inner.degraded_allocations.load(Ordering::Acquire)
    }

    pub fn is_tracked(&self, collection: &str) -> bool {
        self.inner.states.contains_key(collection)
    }

    /// Highest identifier this process has seen for `collection`.
    pub fn cached_last(&self, collection: &str) -> Option<i64> {
        self.inner
            .states
            .get(collection)
            .map(|state| state.cached_last())
    }

    /// Names of all tracked collections, sorted.
    pub fn tracked_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .states
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    fn state(&self, collection: &str) -> DataResult<Arc<AllocatorState>> {
        match self.inner.states.get(collection) {
            Some(state) => Ok(state.value().clone()),
            None => {
                log::error!("Collection {} is not tracked by the id allocator", collection);
                Err(DataError::new(
                    &format!("Collection {} is not tracked by the id allocator", collection),
                    ErrorKind::InvalidOperation,
                ))
            }
        }
    }
}
