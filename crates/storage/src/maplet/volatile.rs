//! In-memory implementation of [`Maplet`].

use std::hash::Hash;

use dashmap::DashMap;
use fxhash::FxBuildHasher;

use crate::{
    config::default_shard_amount,
    error::Result,
    maplet::Maplet,
    multi_maplet::{Lifecycle, Storable},
};

/// An in-memory [`Maplet`] backed by a concurrent [`DashMap`].
pub struct VolatileMaplet<K, V> {
    map: DashMap<K, V, FxBuildHasher>,
}

impl<K: Eq + Hash, V> std::fmt::Debug for VolatileMaplet<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileMaplet")
            .field("len", &self.map.len())
            .finish_non_exhaustive()
    }
}

impl<K: Storable, V: Storable> VolatileMaplet<K, V> {
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

impl<K: Storable, V: Storable> Default for VolatileMaplet<K, V> {
    fn default() -> Self { Self::new() }
}

impl<K: Storable, V: Storable> Lifecycle for VolatileMaplet<K, V> {
    fn flush(&self) -> Result<()> { Ok(()) }

    fn close(&self) -> Result<()> { Ok(()) }
}

impl<K: Storable, V: Storable> Maplet<K, V> for VolatileMaplet<K, V> {
    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.map.contains_key(key))
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.map.get(key).map(|value| value.clone()))
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        self.map.insert(key.clone(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<K>> {
        Ok(self.map.iter().map(|entry| entry.key().clone()).collect())
    }
}
