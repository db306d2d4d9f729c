//! On-disk implementation of [`Maplet`].

use std::{
    marker::PhantomData,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use depstore_serialize::Plugin;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};

use crate::{
    encoding::{
        check_format, decode, decode_key_prefix, encode, flush_interned,
        key_prefix,
    },
    error::{Error, Result},
    maplet::Maplet,
    multi_maplet::{Lifecycle, Storable},
    path_lock::PathGuard,
};

const FORMAT: &str = "maplet/1";

/// A [`Maplet`] storing one encoded value per key in a fjall partition.
pub struct PersistentMaplet<K, V> {
    values: PartitionHandle,
    keyspace: Keyspace,
    plugin: Arc<Plugin>,
    closed: AtomicBool,
    guard: PathGuard,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> std::fmt::Debug for PersistentMaplet<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentMaplet")
            .field("path", &self.guard.path())
            .finish_non_exhaustive()
    }
}

impl<K: Storable, V: Storable> PersistentMaplet<K, V> {
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

        let keyspace = fjall::Config::new(path).open()?;
        let meta = keyspace
            .open_partition("meta", PartitionCreateOptions::default())?;
        check_format(&meta, path, FORMAT)?;

        let values = keyspace
            .open_partition("values", PartitionCreateOptions::default())?;

        tracing::debug!("maplet opened");

        Ok(Self {
            values,
            keyspace,
            plugin,
            closed: AtomicBool::new(false),
            guard,
            _marker: PhantomData,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed(self.guard.path().display().to_string()));
        }

        Ok(())
    }
}

impl<K: Storable, V: Storable> Lifecycle for PersistentMaplet<K, V> {
    fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        flush_interned(&self.plugin)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        flush_interned(&self.plugin)?;
        self.keyspace.persist(PersistMode::SyncAll)?;

        tracing::debug!(path = %self.guard.path().display(), "maplet closed");

        Ok(())
    }
}

impl<K: Storable, V: Storable> Maplet<K, V> for PersistentMaplet<K, V> {
    fn contains_key(&self, key: &K) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.values.contains_key(key_prefix(key, &self.plugin)?)?)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.ensure_open()?;

        self.values
            .get(key_prefix(key, &self.plugin)?)?
            .map(|bytes| decode(&bytes, &self.plugin, "value"))
            .transpose()
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        self.ensure_open()?;

        let stored_key = key_prefix(key, &self.plugin)?;
        let bytes = encode(value, &self.plugin, "value")?;
        self.values.insert(stored_key, bytes)?;

        Ok(())
    }

    fn remove(&self, key: &K) -> Result<()> {
        self.ensure_open()?;
        self.values.remove(key_prefix(key, &self.plugin)?)?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<K>> {
        self.ensure_open()?;

        let mut keys = Vec::new();
        for item in self.values.iter() {
            let (stored_key, _) = item?;
            keys.push(decode_key_prefix(&stored_key, &self.plugin)?);
        }

        Ok(keys)
    }
}
