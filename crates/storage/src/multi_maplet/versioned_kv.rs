//! Versioned key-value implementation of [`MultiMaplet`].
//!
//! Each key holds one encoded set in a transactional fjall partition. Value
//! mutations go through [`update_atomically`], which reads the current set,
//! asks a decision function what to do with it and, on
//! [`Decision::Replace`], stores the set produced by a compute function. The
//! whole step runs inside the engine's read-modify-write primitive, so
//! concurrent mutations of one key never lose each other's updates.
//!
//! Sets are snapshots: the compute function receives the current snapshot
//! and returns a new one, it never changes a stored set in place. The snapshot
//! handed over is decoded fresh from the engine and owned by the compute
//! function, so growing it extends that copy without cloning it again. The
//! engine stores each snapshot as one encoded value, so the stored bytes are
//! rewritten whole on every mutation; no structure is shared on disk.
//!
//! [`update_atomically`]: VersionedKvMultiMaplet::update_atomically

use std::{
    cell::RefCell,
    marker::PhantomData,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use depstore_serialize::Plugin;
use fjall::{
    PartitionCreateOptions, PersistMode, Slice, TxKeyspace, TxPartitionHandle,
};

use crate::{
    encoding::{
        check_format, decode, decode_key_prefix, encode, flush_interned,
        key_prefix,
    },
    error::{Error, Result},
    multi_maplet::{Lifecycle, MultiMaplet, Storable, ValueSet},
    path_lock::PathGuard,
};

const FORMAT: &str = "versioned-kv/1";
const SET: &str = "value set";

/// The outcome of a decision function passed to
/// [`VersionedKvMultiMaplet::update_atomically`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Store the set produced by the compute function. An empty set deletes
    /// the key.
    Replace,

    /// Delete the key.
    Delete,

    /// Leave the key as it is.
    Abort,
}

/// A [`MultiMaplet`] storing one set per key in a transactional fjall
/// partition.
pub struct VersionedKvMultiMaplet<K, V> {
    sets: TxPartitionHandle,
    keyspace: TxKeyspace,
    plugin: Arc<Plugin>,
    closed: AtomicBool,
    guard: PathGuard,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> std::fmt::Debug for VersionedKvMultiMaplet<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedKvMultiMaplet")
            .field("path", &self.guard.path())
            .finish_non_exhaustive()
    }
}

impl<K: Storable, V: Storable> VersionedKvMultiMaplet<K, V> {
    /// Opens or creates the store in the directory `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpen`] if `path` is open elsewhere in the process.
    /// - [`Error::FormatMismatch`] if `path` holds another store format.
    /// - [`Error::Engine`] for failures of the underlying engine.
    #[tracing::instrument(skip(path, plugin), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, plugin: Arc<Plugin>) -> Result<Self> {
        let path = path.as_ref();
        let guard = PathGuard::acquire(path)?;

        let keyspace = fjall::Config::new(path).open_transactional()?;
        let meta = keyspace
            .open_partition("meta", PartitionCreateOptions::default())?;
        check_format(&meta, path, FORMAT)?;

        let sets = keyspace
            .open_partition("sets", PartitionCreateOptions::default())?;

        tracing::debug!("versioned-kv store opened");

        Ok(Self {
            guard,
            keyspace,
            sets,
            plugin,
            closed: AtomicBool::new(false),
            _marker: PhantomData,
        })
    }

    /// Atomically updates the set of `key`.
    ///
    /// `decide` sees the current snapshot (`None` if the key is absent) and
    /// picks a [`Decision`]. On [`Decision::Replace`], `compute` takes the
    /// current snapshot and returns the new one. The engine may call both
    /// functions more than once, so they must not have side effects.
    ///
    /// Returns the snapshot stored after the update.
    ///
    /// # Errors
    ///
    /// Fails on codec or engine failures, or after close. On error the key is
    /// left unchanged.
    pub fn update_atomically(
        &self,
        key: &K,
        decide: impl Fn(Option<&ValueSet<V>>) -> Decision,
        compute: impl Fn(Option<ValueSet<V>>) -> ValueSet<V>,
    ) -> Result<Option<Arc<ValueSet<V>>>> {
        self.ensure_open()?;

        let stored_key = key_prefix(key, &self.plugin)?;
        let failure: RefCell<Option<Error>> = RefCell::new(None);
        let outcome: RefCell<Option<Arc<ValueSet<V>>>> = RefCell::new(None);

        self.sets.fetch_update(stored_key, |previous: Option<&Slice>| {
            failure.replace(None);

            let current = match previous
                .map(|bytes| decode::<ValueSet<V>>(bytes, &self.plugin, SET))
                .transpose()
            {
                Ok(current) => current,
                Err(err) => {
                    failure.replace(Some(err));
                    return previous.cloned();
                }
            };

            let next = match decide(current.as_ref()) {
                Decision::Abort => {
                    outcome.replace(current.map(Arc::new));
                    return previous.cloned();
                }

                Decision::Delete => ValueSet::default(),
                Decision::Replace => compute(current),
            };

            if next.is_empty() {
                outcome.replace(None);
                return None;
            }

            match encode(&next, &self.plugin, SET) {
                Ok(bytes) => {
                    outcome.replace(Some(Arc::new(next)));
                    Some(Slice::from(bytes))
                }

                Err(err) => {
                    failure.replace(Some(err));
                    previous.cloned()
                }
            }
        })?;

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }

        Ok(outcome.into_inner())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed(self.guard.path().display().to_string()));
        }

        Ok(())
    }
}

impl<K: Storable, V: Storable> Lifecycle for VersionedKvMultiMaplet<K, V> {
    fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        flush_interned(&self.plugin)?;
        self.keyspace.persist(PersistMode::SyncAll)?;

        tracing::debug!(
            path = %self.guard.path().display(),
            "versioned-kv store flushed"
        );

        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        flush_interned(&self.plugin)?;
        self.keyspace.persist(PersistMode::SyncAll)?;

        tracing::debug!(
            path = %self.guard.path().display(),
            "versioned-kv store closed"
        );

        Ok(())
    }
}

impl<K: Storable, V: Storable> MultiMaplet<K, V>
    for VersionedKvMultiMaplet<K, V>
{
    fn contains_key(&self, key: &K) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.sets.contains_key(key_prefix(key, &self.plugin)?)?)
    }

    fn get(&self, key: &K) -> Result<ValueSet<V>> {
        self.ensure_open()?;

        match self.sets.get(key_prefix(key, &self.plugin)?)? {
            Some(bytes) => decode(&bytes, &self.plugin, SET),
            None => Ok(ValueSet::default()),
        }
    }

    fn put(&self, key: &K, values: &ValueSet<V>) -> Result<()> {
        self.ensure_open()?;

        let stored_key = key_prefix(key, &self.plugin)?;
        if values.is_empty() {
            self.sets.remove(stored_key)?;
        } else {
            let bytes = encode(values, &self.plugin, SET)?;
            self.sets.insert(stored_key, bytes)?;
        }

        Ok(())
    }

    fn remove(&self, key: &K) -> Result<()> {
        self.ensure_open()?;
        self.sets.remove(key_prefix(key, &self.plugin)?)?;
        Ok(())
    }

    fn append_values(&self, key: &K, values: &[V]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        self.update_atomically(
            key,
            |current| match current {
                Some(set) if values.iter().all(|value| set.contains(value)) => {
                    Decision::Abort
                }
                _ => Decision::Replace,
            },
            |current| {
                let mut next = current.unwrap_or_default();
                next.extend(values.iter().cloned());
                next
            },
        )?;

        Ok(())
    }

    fn remove_values(&self, key: &K, values: &[V]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        self.update_atomically(
            key,
            |current| match current {
                Some(set) if values.iter().any(|value| set.contains(value)) => {
                    Decision::Replace
                }
                _ => Decision::Abort,
            },
            |current| {
                let mut next = current.unwrap_or_default();
                for value in values {
                    next.remove(value);
                }
                next
            },
        )?;

        Ok(())
    }

    fn keys(&self) -> Result<Vec<K>> {
        self.ensure_open()?;

        let snapshot = self.keyspace.read_tx();
        let mut keys = Vec::new();
        for item in snapshot.iter(&self.sets) {
            let (stored_key, _) = item?;
            keys.push(decode_key_prefix(&stored_key, &self.plugin)?);
        }

        Ok(keys)
    }
}
