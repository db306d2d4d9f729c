//! In-memory implementation of [`MultiMaplet`].

use std::hash::Hash;

use dashmap::{DashMap, mapref::entry::Entry};
use fxhash::FxBuildHasher;

use crate::{
    config::default_shard_amount,
    error::Result,
    multi_maplet::{Lifecycle, MultiMaplet, Storable, ValueSet},
};

/// An in-memory [`MultiMaplet`] backed by a concurrent [`DashMap`].
///
/// Nothing is persisted; [`flush`](Lifecycle::flush) and
/// [`close`](Lifecycle::close) do nothing. Used for per-build delta graphs
/// that are thrown away at the end of a session.
pub struct VolatileMultiMaplet<K, V> {
    map: DashMap<K, ValueSet<V>, FxBuildHasher>,
}

impl<K: Eq + Hash, V> std::fmt::Debug for VolatileMultiMaplet<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileMultiMaplet")
            .field("keys", &self.map.len())
            .finish_non_exhaustive()
    }
}

impl<K: Storable, V: Storable> VolatileMultiMaplet<K, V> {
    /// Creates an empty map using the default shard amount.
    #[must_use]
    pub fn new() -> Self { Self::with_shard_amount(default_shard_amount()) }

    /// Creates an empty map with `shard_amount` shards.
    ///
    /// # Panics
    ///
    /// If `shard_amount` is not a power of two greater than one.
    #[must_use]
    pub fn with_shard_amount(shard_amount: usize) -> Self {
        Self {
            map: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                FxBuildHasher::default(),
                shard_amount,
            ),
        }
    }
}

impl<K: Storable, V: Storable> Default for VolatileMultiMaplet<K, V> {
    fn default() -> Self { Self::new() }
}

impl<K: Storable, V: Storable> Lifecycle for VolatileMultiMaplet<K, V> {
    fn flush(&self) -> Result<()> { Ok(()) }

    fn close(&self) -> Result<()> { Ok(()) }
}

impl<K: Storable, V: Storable> MultiMaplet<K, V> for VolatileMultiMaplet<K, V> {
    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.map.contains_key(key))
    }

    fn get(&self, key: &K) -> Result<ValueSet<V>> {
        Ok(self.map.get(key).map(|set| set.clone()).unwrap_or_default())
    }

    fn put(&self, key: &K, values: &ValueSet<V>) -> Result<()> {
        if values.is_empty() {
            self.map.remove(key);
        } else {
            self.map.insert(key.clone(), values.clone());
        }

        Ok(())
    }

    fn remove(&self, key: &K) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    fn append_values(&self, key: &K, values: &[V]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        self.map.entry(key.clone()).or_default().extend(values.iter().cloned());

        Ok(())
    }

    fn remove_values(&self, key: &K, values: &[V]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        if let Entry::Occupied(mut entry) = self.map.entry(key.clone()) {
            let set = entry.get_mut();
            for value in values {
                set.remove(value);
            }

            if set.is_empty() {
                entry.remove();
            }
        }

        Ok(())
    }

    fn keys(&self) -> Result<Vec<K>> {
        Ok(self.map.iter().map(|entry| entry.key().clone()).collect())
    }
}
