use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::model::RowId;
use crate::observability::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
use crate::store::{Row, StoreError, TableStore};
use crate::tables::BOOKINGS_TABLE;

struct CacheEntry<V> {
    value: V,
    loaded_at: Instant,
}

/// Read-through cache keyed by name, each lookup carrying its own freshness window.
///
/// Every invalidation bumps the key's generation. A load only fills the
/// cache if the generation it started under is still current, so a read
/// that overlaps a write cannot put the pre-write rows back.
pub struct ReadCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    generations: DashMap<String, u64>,
}

impl<V: Clone> Default for ReadCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ReadCache<V> {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), generations: DashMap::new() }
    }

    /// Return the cached value if it is younger than `ttl`, otherwise run
    /// `load`, remember its result and return it. Failed loads are not cached.
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, ttl: Duration, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(entry) = self.entries.get(key)
            && entry.loaded_at.elapsed() < ttl
        {
            metrics::counter!(CACHE_HITS_TOTAL, "table" => key.to_string()).increment(1);
            return Ok(entry.value.clone());
        }

        metrics::counter!(CACHE_MISSES_TOTAL, "table" => key.to_string()).increment(1);
        let generation = self.generation(key);
        let value = load().await?;
        self.put_if_current(key, value.clone(), generation);
        Ok(value)
    }

    /// Take before loading, hand to [`ReadCache::put_if_current`] after.
    pub fn generation(&self, key: &str) -> u64 {
        *self.generations.entry(key.to_string()).or_insert(0)
    }

    /// Store `value` unless `key` was invalidated since `generation` was taken.
    pub fn put_if_current(&self, key: &str, value: V, generation: u64) -> bool {
        // Held across the insert so an invalidate lands either before (and
        // we skip) or after (and removes what we stored).
        let current = self.generations.entry(key.to_string()).or_insert(0);
        if *current != generation {
            debug!("discarding load of {key} overtaken by a write");
            return false;
        }
        self.put(key, value);
        true
    }

    pub fn put(&self, key: &str, value: V) {
        self.entries.insert(
            key.to_string(),
            CacheEntry { value, loaded_at: Instant::now() },
        );
    }

    pub fn invalidate(&self, key: &str) {
        *self.generations.entry(key.to_string()).or_insert(0) += 1;
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        for mut generation in self.generations.iter_mut() {
            *generation += 1;
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Freshness windows per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub config_ttl: Duration,
    pub bookings_ttl: Duration,
}

impl CachePolicy {
    pub fn ttl_for(&self, table: &str) -> Duration {
        if table == BOOKINGS_TABLE {
            self.bookings_ttl
        } else {
            self.config_ttl
        }
    }
}

/// A [`TableStore`] behind a [`ReadCache`]. Every write drops the cached
/// copy of the table it touched.
pub struct CachedStore {
    inner: Arc<dyn TableStore>,
    cache: ReadCache<Arc<Vec<Row>>>,
    policy: CachePolicy,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn TableStore>, policy: CachePolicy) -> Self {
        Self { inner, cache: ReadCache::new(), policy }
    }

    pub async fn read(&self, table: &str) -> Result<Arc<Vec<Row>>, StoreError> {
        let ttl = self.policy.ttl_for(table);
        self.cache
            .get_or_load(table, ttl, move || async move {
                self.inner.read_table(table).await.map(Arc::new)
            })
            .await
    }

    /// Bypass the cache, then refresh it with what was read.
    pub async fn read_fresh(&self, table: &str) -> Result<Arc<Vec<Row>>, StoreError> {
        let generation = self.cache.generation(table);
        let rows = Arc::new(self.inner.read_table(table).await?);
        self.cache.put_if_current(table, rows.clone(), generation);
        Ok(rows)
    }

    pub async fn create_table(&self, table: &str, columns: &[&str]) -> Result<(), StoreError> {
        let result = self.inner.create_table(table, columns).await;
        self.cache.invalidate(table);
        result
    }

    pub async fn append_row(&self, table: &str, values: Vec<String>) -> Result<(), StoreError> {
        let result = self.inner.append_row(table, values).await;
        self.cache.invalidate(table);
        result
    }

    pub async fn delete_rows(&self, table: &str, row_ids: &BTreeSet<RowId>) -> Result<(), StoreError> {
        let result = self.inner.delete_rows(table, row_ids).await;
        self.cache.invalidate(table);
        result
    }

    pub async fn replace_table(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        let result = self.inner.replace_table(table, rows).await;
        self.cache.invalidate(table);
        result
    }

    /// Forget everything (the manual "reload" button).
    pub fn invalidate_all(&self) {
        debug!("dropping {} cached tables", self.cache.len());
        self.cache.clear();
    }
}
