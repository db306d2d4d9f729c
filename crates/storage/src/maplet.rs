//! Single-valued stores mapping a key to at most one value.
//!
//! The counterpart of [`MultiMaplet`](crate::MultiMaplet) for data with one
//! value per key, such as a file's last-seen fingerprint:
//!
//! - [`persistent::PersistentMaplet`]: one encoded value per key on disk.
//! - [`volatile::VolatileMaplet`]: an in-memory map.
//! - [`cache::CachingMaplet`]: a read-through cache over either, evicting a
//!   key on every write to it.

use crate::{error::Result, multi_maplet::Lifecycle};

pub mod cache;
pub mod persistent;
pub mod volatile;

/// A store mapping each key to at most one value.
///
/// Failures follow [`MultiMaplet`](crate::MultiMaplet): decode, engine and
/// closed errors are reported, removing an absent key is not an error.
pub trait Maplet<K, V>: Lifecycle {
    /// Returns `true` if `key` holds a value.
    fn contains_key(&self, key: &K) -> Result<bool>;

    /// Returns the value of `key`, if any.
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &K, value: &V) -> Result<()>;

    /// Deletes `key`. Removing an absent key does nothing.
    fn remove(&self, key: &K) -> Result<()>;

    /// Returns a snapshot of every key holding a value.
    fn keys(&self) -> Result<Vec<K>>;
}

#[cfg(test)]
mod test;
