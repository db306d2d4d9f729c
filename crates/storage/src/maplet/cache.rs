//! Read-through caching over another [`Maplet`].

use std::hash::Hash;

use dashmap::DashMap;
use fxhash::FxBuildHasher;

use crate::{
    error::Result,
    maplet::Maplet,
    multi_maplet::{Lifecycle, Storable},
};

/// A [`Maplet`] that keeps the values it has read in memory, absent ones
/// included.
///
/// Writes evict the touched key once the backing store returns, whether
/// the write succeeded or not.
pub struct CachingMaplet<K, V, S> {
    inner: S,
    cache: DashMap<K, Option<V>, FxBuildHasher>,
}

impl<K: Eq + Hash, V, S: std::fmt::Debug> std::fmt::Debug
    for CachingMaplet<K, V, S>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingMaplet")
            .field("inner", &self.inner)
            .field("cached", &self.cache.len())
            .finish()
    }
}

struct Evict<'a, K: Eq + Hash, V> {
    cache: &'a DashMap<K, Option<V>, FxBuildHasher>,
    key: &'a K,
}

impl<K: Eq + Hash, V> Drop for Evict<'_, K, V> {
    fn drop(&mut self) { self.cache.remove(self.key); }
}

impl<K: Storable, V: Storable, S: Maplet<K, V>> CachingMaplet<K, V, S> {
    /// Wraps `inner` with an empty cache split into `shard_amount` shards.
    ///
    /// # Panics
    ///
    /// If `shard_amount` is not a power of two greater than one.
    pub fn new(inner: S, shard_amount: usize) -> Self {
        Self {
            inner,
            cache: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                FxBuildHasher::default(),
                shard_amount,
            ),
        }
    }

    /// Returns the backing store.
    pub const fn inner(&self) -> &S { &self.inner }

    /// Returns `true` if the value of `key` is currently held in memory.
    pub fn is_cached(&self, key: &K) -> bool { self.cache.contains_key(key) }

    fn evict<'a>(&'a self, key: &'a K) -> Evict<'a, K, V> {
        Evict { cache: &self.cache, key }
    }
}

impl<K: Storable, V: Storable, S: Maplet<K, V>> Lifecycle
    for CachingMaplet<K, V, S>
{
    fn flush(&self) -> Result<()> { self.inner.flush() }

    fn close(&self) -> Result<()> {
        self.cache.clear();
        self.inner.close()
    }
}

impl<K: Storable, V: Storable, S: Maplet<K, V>> Maplet<K, V>
    for CachingMaplet<K, V, S>
{
    fn contains_key(&self, key: &K) -> Result<bool> {
        if let Some(value) = self.cache.get(key) {
            return Ok(value.is_some());
        }

        self.inner.contains_key(key)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        if let Some(value) = self.cache.get(key) {
            return Ok(value.clone());
        }

        let value = self.inner.get(key)?;
        self.cache.insert(key.clone(), value.clone());

        Ok(value)
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        let _evict = self.evict(key);
        self.inner.put(key, value)
    }

    fn remove(&self, key: &K) -> Result<()> {
        let _evict = self.evict(key);
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<K>> { self.inner.keys() }
}
