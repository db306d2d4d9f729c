//! Read-through caching over another [`MultiMaplet`].

use std::hash::Hash;

use dashmap::DashMap;
use fxhash::FxBuildHasher;

use crate::{
    error::Result,
    multi_maplet::{Lifecycle, MultiMaplet, Storable, ValueSet},
};

/// A [`MultiMaplet`] that keeps the sets it has read in memory.
///
/// Every write evicts the touched key once the backing store returns, whether
/// the write succeeded or not, so the next read always goes to the backing
/// store. A read racing a write to the same key may briefly cache the old
/// set; callers writing one key from several threads synchronize externally,
/// as they already must for the append-log backend.
pub struct CachingMultiMaplet<K, V, S> {
    inner: S,
    cache: DashMap<K, ValueSet<V>, FxBuildHasher>,
}

impl<K: Eq + Hash, V, S: std::fmt::Debug> std::fmt::Debug
    for CachingMultiMaplet<K, V, S>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingMultiMaplet")
            .field("inner", &self.inner)
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// Removes a key from the cache when dropped.
struct Evict<'a, K: Eq + Hash, V> {
    cache: &'a DashMap<K, ValueSet<V>, FxBuildHasher>,
    key: &'a K,
}

impl<K: Eq + Hash, V> Drop for Evict<'_, K, V> {
    fn drop(&mut self) { self.cache.remove(self.key); }
}

impl<K: Storable, V: Storable, S: MultiMaplet<K, V>>
    CachingMultiMaplet<K, V, S>
{
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

    /// Returns `true` if the set of `key` is currently held in memory.
    pub fn is_cached(&self, key: &K) -> bool { self.cache.contains_key(key) }

    /// Drops every cached set.
    pub fn clear(&self) { self.cache.clear(); }

    fn evict<'a>(&'a self, key: &'a K) -> Evict<'a, K, V> {
        Evict { cache: &self.cache, key }
    }
}

impl<K: Storable, V: Storable, S: MultiMaplet<K, V>> Lifecycle
    for CachingMultiMaplet<K, V, S>
{
    fn flush(&self) -> Result<()> { self.inner.flush() }

    fn close(&self) -> Result<()> {
        self.cache.clear();
        self.inner.close()
    }
}

impl<K: Storable, V: Storable, S: MultiMaplet<K, V>> MultiMaplet<K, V>
    for CachingMultiMaplet<K, V, S>
{
    fn contains_key(&self, key: &K) -> Result<bool> {
        if let Some(set) = self.cache.get(key) {
            return Ok(!set.is_empty());
        }

        self.inner.contains_key(key)
    }

    fn get(&self, key: &K) -> Result<ValueSet<V>> {
        if let Some(set) = self.cache.get(key) {
            return Ok(set.clone());
        }

        let set = self.inner.get(key)?;
        self.cache.insert(key.clone(), set.clone());

        Ok(set)
    }

    fn put(&self, key: &K, values: &ValueSet<V>) -> Result<()> {
        let _evict = self.evict(key);
        self.inner.put(key, values)
    }

    fn remove(&self, key: &K) -> Result<()> {
        let _evict = self.evict(key);
        self.inner.remove(key)
    }

    fn append_values(&self, key: &K, values: &[V]) -> Result<()> {
        let _evict = self.evict(key);
        self.inner.append_values(key, values)
    }

    fn remove_values(&self, key: &K, values: &[V]) -> Result<()> {
        let _evict = self.evict(key);
        self.inner.remove_values(key, values)
    }

    fn keys(&self) -> Result<Vec<K>> { self.inner.keys() }
}
