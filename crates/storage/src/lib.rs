//! Persistent multi-valued key stores for incremental build graphs.
//!
//! An incremental build records relations such as "module → modules that
//! use it" and keeps them across runs. This crate stores those relations as
//! keys mapping to *sets* of values, and makes the common incremental case,
//! a set that only grows, cheap to write.
//!
//! - **Stores** ([`multi_maplet`], [`maplet`]): one contract, several
//!   backends. The append-log backend keeps a per-key history of add/remove
//!   records, the versioned-kv backend keeps one encoded set per key behind
//!   an atomic read-modify-write, and the volatile backend never touches
//!   disk. A read-through cache can wrap any of them.
//!
//! - **Diff update** ([`update`]): replaces a key's set with the cheapest
//!   write, appending when the new set only adds values.
//!
//! - **Interning log** ([`enumerator`]): assigns dense `u32` ids to byte
//!   strings such as file paths, so keys and values can store ids instead.
//!   [`Enumerated`] applies it transparently inside codecs.
//!
//! - **Store factory** ([`StoreFactory`]): opens named stores under one
//!   root directory, sharing one interning log, and closes them together.
//!
//! # Core Concepts
//!
//! ## Empty Is Absent
//!
//! No store distinguishes an empty set from an absent key. Reading an
//! absent key yields an empty set, and any write leaving a key with no
//! values deletes it.
//!
//! ## Durability
//!
//! Writes reach the engine immediately but are only guaranteed durable
//! after [`Lifecycle::flush`] or [`Lifecycle::close`]. A crash may lose
//! recent writes; at worst the next build recomputes them.
//!
//! # Example
//!
//! ```
//! use depstore_storage::{
//!     Backend, Enumerated, MultiMaplet, SetDiff, StoreConfig, StoreFactory,
//!     UpdateOutcome, ValueSet, update,
//! };
//!
//! let dir = tempfile::tempdir().unwrap();
//! let factory = StoreFactory::open(dir.path(), StoreConfig::default())?;
//!
//! let usages = factory.open_multi_maplet::<Enumerated<String>, u32>(
//!     "usages",
//!     Backend::AppendLog,
//! )?;
//!
//! let key = Enumerated("mod/Foo".to_owned());
//! usages.append_values(&key, &[1, 2])?;
//!
//! let next: ValueSet<u32> = [1, 2, 3].into_iter().collect();
//! let outcome = update(&*usages, &key, &next, SetDiff::compute)?;
//!
//! assert_eq!(outcome, UpdateOutcome::Appended(1));
//! assert_eq!(usages.get(&key)?, next);
//!
//! factory.close()?;
//! # Ok::<(), depstore_storage::Error>(())
//! ```

pub mod config;
pub mod diff_update;
pub mod enumerator;
pub mod error;
pub mod maplet;
pub mod multi_maplet;
pub mod store_factory;

pub(crate) mod encoding;
pub(crate) mod path_lock;

pub use config::{Backend, StoreConfig};
pub use diff_update::{SetDiff, UpdateOutcome, update};
pub use enumerator::{Enumerated, Enumerator, SharedEnumerator};
pub use error::{Error, Result};
pub use maplet::Maplet;
pub use multi_maplet::{Lifecycle, MultiMaplet, Storable, ValueSet};
pub use store_factory::StoreFactory;
