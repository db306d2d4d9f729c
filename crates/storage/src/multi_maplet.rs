//! Multi-valued stores mapping a key to a set of values.
//!
//! [`MultiMaplet`] is the contract every backend implements:
//!
//! - [`append_log::AppendLogMultiMaplet`]: per-key history of add/remove
//!   records on disk, replayed on read.
//! - [`versioned_kv::VersionedKvMultiMaplet`]: one encoded set per key on
//!   disk, changed through an atomic decide-then-compute update.
//! - [`volatile::VolatileMultiMaplet`]: an in-memory map for data that never
//!   outlives the process.
//! - [`cache::CachingMultiMaplet`]: a read-through cache over any of the
//!   above, evicting a key on every write to it.
//!
//! Across all of them an empty set and an absent key are the same thing:
//! reads of an absent key return an empty set, and a write leaving a key
//! with no values deletes the key.

use std::hash::Hash;

use depstore_serialize::{Decode, Encode};
use fxhash::FxHashSet;

use crate::error::Result;

pub mod append_log;
pub mod cache;
pub mod versioned_kv;
pub mod volatile;

/// The set of values stored under one key.
pub type ValueSet<V> = FxHashSet<V>;

/// Requirements on keys and values held by a store.
///
/// Blanket-implemented for every qualifying type.
pub trait Storable:
    Encode + Decode + Hash + Eq + Clone + Send + Sync + 'static
{
}

impl<T: Encode + Decode + Hash + Eq + Clone + Send + Sync + 'static> Storable
    for T
{
}

/// Durability operations common to every store.
pub trait Lifecycle: Send + Sync {
    /// Forces every buffered write to durable storage.
    ///
    /// # Errors
    ///
    /// Returns the engine or I/O failure, or [`Error::Closed`] after
    /// [`close`](Self::close).
    ///
    /// [`Error::Closed`]: crate::Error::Closed
    fn flush(&self) -> Result<()>;

    /// Flushes and releases the store. Any later operation fails with
    /// [`Error::Closed`](crate::Error::Closed); closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the failure of the final flush.
    fn close(&self) -> Result<()>;
}

/// A store mapping each key to a set of values.
///
/// # Errors
///
/// Every operation returns [`Error::Decode`](crate::Error::Decode) for
/// malformed stored bytes, the engine or I/O failure of the backend, or
/// [`Error::Closed`](crate::Error::Closed) after close. Operating on an
/// absent key and appending or removing nothing are not errors.
pub trait MultiMaplet<K, V>: Lifecycle {
    /// Returns `true` if `key` currently holds at least one value.
    fn contains_key(&self, key: &K) -> Result<bool>;

    /// Returns the values of `key`, empty if the key is absent.
    fn get(&self, key: &K) -> Result<ValueSet<V>>;

    /// Replaces the values of `key`. An empty set removes the key.
    fn put(&self, key: &K, values: &ValueSet<V>) -> Result<()>;

    /// Deletes `key`. Removing an absent key does nothing.
    fn remove(&self, key: &K) -> Result<()>;

    /// Adds `values` to the set of `key`.
    ///
    /// An empty slice returns immediately without touching storage.
    fn append_values(&self, key: &K, values: &[V]) -> Result<()>;

    /// Removes `values` from the set of `key`, skipping values that are not
    /// present. The key is deleted once its set becomes empty.
    fn remove_values(&self, key: &K, values: &[V]) -> Result<()>;

    /// Returns a snapshot of every key holding at least one value.
    fn keys(&self) -> Result<Vec<K>>;

    /// Adds a single value to the set of `key`.
    fn append_value(&self, key: &K, value: &V) -> Result<()> {
        self.append_values(key, std::slice::from_ref(value))
    }

    /// Removes a single value from the set of `key`.
    fn remove_value(&self, key: &K, value: &V) -> Result<()> {
        self.remove_values(key, std::slice::from_ref(value))
    }
}
