//! Opens named stores under one root directory and shuts them down together.
//!
//! Every store opened by a [`StoreFactory`] shares the factory's interning
//! log through its [`Plugin`], so values wrapped in
//! [`Enumerated`](crate::Enumerated) get ids that are valid in every store.
//!
//! ```text
//! <root>/
//!   enumerator.log        the shared interning log
//!   <store name>/         one directory per persistent store
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use depstore_serialize::Plugin;
use parking_lot::Mutex;

use crate::{
    config::{Backend, StoreConfig},
    enumerator::{Enumerator, SharedEnumerator},
    error::{Error, Result},
    maplet::{
        Maplet, cache::CachingMaplet, persistent::PersistentMaplet,
        volatile::VolatileMaplet,
    },
    multi_maplet::{
        Lifecycle, MultiMaplet, Storable, append_log::AppendLogMultiMaplet,
        cache::CachingMultiMaplet, versioned_kv::VersionedKvMultiMaplet,
        volatile::VolatileMultiMaplet,
    },
};

/// Creates stores rooted at one directory and owns their shutdown.
///
/// # Example
///
/// ```
/// use depstore_storage::{Backend, MultiMaplet, StoreConfig, StoreFactory};
///
/// let dir = tempfile::tempdir().unwrap();
/// let factory = StoreFactory::open(dir.path(), StoreConfig::default())?;
///
/// let usages = factory.open_multi_maplet::<String, u32>(
///     "usages",
///     Backend::AppendLog,
/// )?;
/// usages.append_values(&"mod/Foo".to_owned(), &[1, 2])?;
///
/// factory.close()?;
/// # Ok::<(), depstore_storage::Error>(())
/// ```
pub struct StoreFactory {
    root: PathBuf,
    config: StoreConfig,
    enumerator: SharedEnumerator,
    plugin: Arc<Plugin>,
    opened: Mutex<Vec<(String, Arc<dyn Lifecycle>)>>,
}

impl std::fmt::Debug for StoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let opened = self
            .opened
            .lock()
            .iter()
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();

        f.debug_struct("StoreFactory")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("opened", &opened)
            .finish_non_exhaustive()
    }
}

impl StoreFactory {
    /// Opens a factory at `root`, creating the directory and the interning
    /// log if needed.
    ///
    /// # Errors
    ///
    /// Fails if the root cannot be created or the interning log cannot be
    /// opened.
    pub fn open(root: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Self::open_with_plugin(root, config, Plugin::new())
    }

    /// Like [`open`](Self::open), handing `plugin` to every store codec.
    ///
    /// The factory adds its [`SharedEnumerator`] to `plugin`, replacing any
    /// enumerator already in it.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    #[tracing::instrument(skip(root, config, plugin), fields(root = %root.as_ref().display()))]
    pub fn open_with_plugin(
        root: impl AsRef<Path>,
        config: StoreConfig,
        mut plugin: Plugin,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let enumerator = SharedEnumerator::new(Enumerator::open(
            root.join(&config.enumerator_file_name),
            config.enumerator_write_buffer,
        )?);
        plugin.insert(enumerator.clone());

        tracing::info!(
            interned = enumerator.len(),
            cache = config.cache,
            "store factory opened"
        );

        Ok(Self {
            root,
            config,
            enumerator,
            plugin: Arc::new(plugin),
            opened: Mutex::new(Vec::new()),
        })
    }

    /// The root directory.
    pub fn root(&self) -> &Path { &self.root }

    /// The configuration every store is opened with.
    pub const fn config(&self) -> &StoreConfig { &self.config }

    /// The interning log shared by every store.
    pub const fn enumerator(&self) -> &SharedEnumerator { &self.enumerator }

    /// The plugin handed to every store codec.
    pub const fn plugin(&self) -> &Arc<Plugin> { &self.plugin }

    /// Opens the multi-valued store `name` on `backend`.
    ///
    /// Persistent backends live in `<root>/<name>`. The store is wrapped in
    /// the caching layer when [`StoreConfig::cache`] is set, and is closed by
    /// [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or the backend fails to
    /// open, for example with [`Error::AlreadyOpen`] when `name` is already
    /// open.
    pub fn open_multi_maplet<K: Storable, V: Storable>(
        &self,
        name: &str,
        backend: Backend,
    ) -> Result<Arc<dyn MultiMaplet<K, V>>> {
        match backend {
            Backend::AppendLog => {
                let store = AppendLogMultiMaplet::<K, V>::open(
                    self.store_dir(name)?,
                    self.plugin.clone(),
                    self.config.compaction_threshold,
                )?;
                Ok(self.finish_multi_maplet(name, store))
            }

            Backend::VersionedKv => {
                let store = VersionedKvMultiMaplet::<K, V>::open(
                    self.store_dir(name)?,
                    self.plugin.clone(),
                )?;
                Ok(self.finish_multi_maplet(name, store))
            }

            Backend::Volatile => {
                let store = VolatileMultiMaplet::<K, V>::with_shard_amount(
                    self.config.shard_amount,
                );
                Ok(self.finish_multi_maplet(name, store))
            }
        }
    }

    /// Opens the single-valued store `name` on `backend`.
    ///
    /// Both persistent backends open the same on-disk maplet, which holds
    /// one value per key either way.
    ///
    /// # Errors
    ///
    /// See [`open_multi_maplet`](Self::open_multi_maplet).
    pub fn open_maplet<K: Storable, V: Storable>(
        &self,
        name: &str,
        backend: Backend,
    ) -> Result<Arc<dyn Maplet<K, V>>> {
        match backend {
            Backend::AppendLog | Backend::VersionedKv => {
                let store = PersistentMaplet::<K, V>::open(
                    self.store_dir(name)?,
                    self.plugin.clone(),
                )?;
                Ok(self.finish_maplet(name, store))
            }

            Backend::Volatile => {
                let store = VolatileMaplet::<K, V>::with_shard_amount(
                    self.config.shard_amount,
                );
                Ok(self.finish_maplet(name, store))
            }
        }
    }

    /// Flushes the interning log, then every opened store.
    ///
    /// The log goes first so that no durable store record refers to an id
    /// the log could lose.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub fn flush(&self) -> Result<()> {
        self.enumerator.flush()?;

        let opened = self.opened.lock().clone();
        for (_, store) in &opened {
            store.flush()?;
        }

        Ok(())
    }

    /// Closes every opened store and then the interning log.
    ///
    /// The log is flushed before any store closes. Every resource gets a
    /// close attempt even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// [`Error::Close`] holding every individual failure.
    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    pub fn close(self) -> Result<()> {
        let opened = std::mem::take(&mut *self.opened.lock());
        let mut failures = Vec::new();

        if let Err(error) = self.enumerator.flush() {
            tracing::warn!(%error, "failed to flush the interning log");
            failures.push(error);
        }

        for (name, store) in &opened {
            if let Err(error) = store.close() {
                tracing::warn!(store = %name, %error, "failed to close store");
                failures.push(error);
            }
        }

        if let Err(error) = self.enumerator.close() {
            tracing::warn!(%error, "failed to close the interning log");
            failures.push(error);
        }

        tracing::info!(
            stores = opened.len(),
            failures = failures.len(),
            "store factory closed"
        );

        if failures.is_empty() { Ok(()) } else { Err(Error::Close(failures)) }
    }

    fn store_dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    fn register<T: Lifecycle + 'static>(&self, name: &str, store: T) -> Arc<T> {
        let store = Arc::new(store);
        let handle: Arc<dyn Lifecycle> = store.clone();
        self.opened.lock().push((name.to_owned(), handle));

        tracing::debug!(store = name, "store registered");

        store
    }

    fn finish_multi_maplet<K, V, S>(
        &self,
        name: &str,
        store: S,
    ) -> Arc<dyn MultiMaplet<K, V>>
    where
        K: Storable,
        V: Storable,
        S: MultiMaplet<K, V> + 'static,
    {
        if self.config.cache {
            return self.register(
                name,
                CachingMultiMaplet::<K, V, S>::new(
                    store,
                    self.config.shard_amount,
                ),
            );
        }

        self.register(name, store)
    }

    fn finish_maplet<K, V, S>(
        &self,
        name: &str,
        store: S,
    ) -> Arc<dyn Maplet<K, V>>
    where
        K: Storable,
        V: Storable,
        S: Maplet<K, V> + 'static,
    {
        if self.config.cache {
            return self.register(
                name,
                CachingMaplet::<K, V, S>::new(store, self.config.shard_amount),
            );
        }

        self.register(name, store)
    }
}

#[cfg(test)]
mod test;
