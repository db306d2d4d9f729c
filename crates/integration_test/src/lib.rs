//! Shared fixtures for the dependency-graph store integration tests.
//!
//! The types here model the data an incremental compiler keeps between
//! builds: module paths interned through the shared log, and usage edges
//! between modules.

#![allow(missing_docs)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::missing_errors_doc)]

use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
};

use depstore_serialize::{Decode, Decoder, Encode, Encoder, Plugin};
use depstore_storage::{
    Enumerated, Lifecycle, MultiMaplet, Result, StoreConfig, StoreFactory,
    ValueSet,
};
use tempfile::TempDir;

// ============================================================================
// Graph Types
// ============================================================================

/// A module path such as `mod/Foo`, stored as its interning-log id.
pub type ModulePath = Enumerated<String>;

pub fn module(path: &str) -> ModulePath { Enumerated(path.to_owned()) }

/// How one module uses another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UsageKind {
    Import,
    Call,
    Inherit,
}

/// An edge of the usage graph: `user` uses the key module as `kind`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Usage {
    pub user: ModulePath,
    pub kind: UsageKind,
}

impl Usage {
    pub fn new(user: &str, kind: UsageKind) -> Self {
        Self { user: module(user), kind }
    }
}

impl Encode for Usage {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        self.user.encode(encoder, plugin)?;
        encoder.emit_u8(match self.kind {
            UsageKind::Import => 0,
            UsageKind::Call => 1,
            UsageKind::Inherit => 2,
        })
    }
}

impl Decode for Usage {
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        let user = ModulePath::decode(decoder, plugin)?;
        let kind = match decoder.read_u8()? {
            0 => UsageKind::Import,
            1 => UsageKind::Call,
            2 => UsageKind::Inherit,
            tag => {
                return Err(depstore_serialize::decode::invalid_data(format!(
                    "unknown usage kind tag {tag}"
                )));
            }
        };

        Ok(Self { user, kind })
    }
}

pub fn usages(edges: &[(&str, UsageKind)]) -> ValueSet<Usage> {
    edges.iter().map(|(user, kind)| Usage::new(user, *kind)).collect()
}

// ============================================================================
// Counting Store
// ============================================================================

/// Wraps a store and counts the writes that reach it.
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    pub inner: S,
    pub appends: AtomicUsize,
    pub puts: AtomicUsize,
    pub removes: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            appends: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    /// `(appends, puts, removes)` seen so far.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.appends.load(Ordering::Relaxed),
            self.puts.load(Ordering::Relaxed),
            self.removes.load(Ordering::Relaxed),
        )
    }
}

impl<S: Lifecycle> Lifecycle for CountingStore<S> {
    fn flush(&self) -> Result<()> { self.inner.flush() }

    fn close(&self) -> Result<()> { self.inner.close() }
}

impl<K, V, S: MultiMaplet<K, V>> MultiMaplet<K, V> for CountingStore<S> {
    fn contains_key(&self, key: &K) -> Result<bool> {
        self.inner.contains_key(key)
    }

    fn get(&self, key: &K) -> Result<ValueSet<V>> { self.inner.get(key) }

    fn put(&self, key: &K, values: &ValueSet<V>) -> Result<()> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.inner.put(key, values)
    }

    fn remove(&self, key: &K) -> Result<()> {
        self.removes.fetch_add(1, Ordering::Relaxed);
        self.inner.remove(key)
    }

    fn append_values(&self, key: &K, values: &[V]) -> Result<()> {
        self.appends.fetch_add(1, Ordering::Relaxed);
        self.inner.append_values(key, values)
    }

    fn remove_values(&self, key: &K, values: &[V]) -> Result<()> {
        self.inner.remove_values(key, values)
    }

    fn keys(&self) -> Result<Vec<K>> { self.inner.keys() }
}

// ============================================================================
// Factory Helpers
// ============================================================================

pub fn create_test_factory(tempdir: &TempDir) -> StoreFactory {
    create_test_factory_with(tempdir, StoreConfig::default())
}

pub fn create_test_factory_with(
    tempdir: &TempDir,
    config: StoreConfig,
) -> StoreFactory {
    StoreFactory::open(tempdir.path(), config)
        .expect("failed to open the store factory")
}
