//! Store factory configuration.

use std::sync::OnceLock;

use bon::Builder;

/// Configuration options applied by the
/// [`StoreFactory`](crate::StoreFactory) to every store it opens.
///
/// # Example
///
/// ```
/// use depstore_storage::StoreConfig;
///
/// let config = StoreConfig::builder()
///     .cache(false)
///     .compaction_threshold(8)
///     .build();
///
/// assert!(!config.cache);
/// assert_eq!(config.enumerator_file_name, "enumerator.log");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Builder)]
pub struct StoreConfig {
    /// Wraps every opened store in the read-through caching layer.
    #[builder(default = true)]
    pub cache: bool,

    /// Append-log keys holding more records than this are compacted when
    /// the store is opened. `0` disables compaction on open.
    #[builder(default = 32)]
    pub compaction_threshold: usize,

    /// Size in bytes of the interning log's append buffer. Reaching it
    /// writes the buffer out to the file.
    #[builder(default = 64 * 1024)]
    pub enumerator_write_buffer: usize,

    /// File name of the interning log under the factory root.
    #[builder(default = String::from("enumerator.log"), into)]
    pub enumerator_file_name: String,

    /// The number of shards used by in-memory maps and caches.
    #[builder(default = default_shard_amount())]
    pub shard_amount: usize,
}

impl Default for StoreConfig {
    fn default() -> Self { Self::builder().build() }
}

/// Selects the engine backing a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Backend {
    /// Per-key history of add/remove records, replayed on read.
    #[default]
    AppendLog,

    /// One encoded set per key, updated through atomic read-modify-write.
    VersionedKv,

    /// In-memory only; never persisted.
    Volatile,
}

/// A shard count scaled to the available parallelism.
///
/// Always a power of two, as required by [`dashmap`].
pub fn default_shard_amount() -> usize {
    static SHARD_AMOUNT: OnceLock<usize> = OnceLock::new();
    *SHARD_AMOUNT.get_or_init(|| {
        (std::thread::available_parallelism().map_or(1, usize::from) * 4)
            .next_power_of_two()
    })
}
