//! Shared context handed to every encode and decode call.
//!
//! Codecs that need a service beyond the raw byte stream look it up here by
//! type. The store factory, for example, registers the shared interning log so
//! that values wrapped for interning can be written as small integer ids.
//!
//! ```
//! use depstore_serialize::Plugin;
//!
//! struct PathPrefix(String);
//!
//! let plugin = Plugin::new().with(PathPrefix("/src".to_owned()));
//!
//! assert_eq!(plugin.get::<PathPrefix>().map(|p| p.0.as_str()), Some("/src"));
//! ```

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

/// A type-keyed container of codec context.
///
/// At most one value per type is stored. The container is immutable once it
/// is shared between stores, which is why only construction-time mutation is
/// offered.
#[derive(Default)]
pub struct Plugin {
    plugins: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Plugin {
    /// Creates an empty plugin container.
    #[must_use]
    pub fn new() -> Self { Self { plugins: HashMap::new() } }

    /// Inserts `value`, returning the value of the same type it replaced.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.plugins
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|boxed| boxed.downcast().ok().map(|b| *b))
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Returns the stored value of type `T`, if any.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.plugins
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Returns `true` if a value of type `T` is stored.
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.plugins.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize { self.plugins.len() }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.plugins.is_empty() }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("count", &self.plugins.len())
            .finish_non_exhaustive()
    }
}
