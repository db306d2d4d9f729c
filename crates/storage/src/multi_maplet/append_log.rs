//! Append-log implementation of [`MultiMaplet`].
//!
//! Every write to a key adds one record to the key's history instead of
//! rewriting its set. A record is a signed count followed by that many
//! values: a positive count adds the values, a negative count removes them.
//! Reads replay the history in write order.
//!
//! Records are separate entries in a fjall partition, keyed by the
//! length-prefixed key followed by a big-endian sequence number:
//!
//! ```text
//! key:   [u64 LE key length][encoded key][u64 BE sequence]
//! value: [i32 count][value] * |count|
//! ```
//!
//! All records of a key therefore sit next to each other in write order, and
//! an append is a single blind insert. A [`put`](MultiMaplet::put) replaces
//! the whole history with one record in an atomic batch.
//!
//! History only shrinks through `put`, deletion, or [`compact`]. Keys whose
//! history exceeds the configured threshold are compacted when the store is
//! opened.
//!
//! [`compact`]: AppendLogMultiMaplet::compact

use std::{
    marker::PhantomData,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use depstore_serialize::{Decoder, Encoder, Plugin, PostcardDecoder};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};

use crate::{
    encoding::{
        check_format, decode_key_prefix, encode_into, flush_interned,
        key_prefix, split_key_prefix,
    },
    error::{Error, Result},
    multi_maplet::{Lifecycle, MultiMaplet, Storable, ValueSet},
    path_lock::PathGuard,
};

const FORMAT: &str = "append-log/1";
const SEQUENCE_LEN: usize = std::mem::size_of::<u64>();

/// A [`MultiMaplet`] storing per-key add/remove history in fjall.
///
/// Concurrent writers to the *same* key must synchronize externally;
/// independent keys need no coordination.
pub struct AppendLogMultiMaplet<K, V> {
    records: PartitionHandle,
    keyspace: Keyspace,
    plugin: Arc<Plugin>,
    next_sequence: AtomicU64,
    closed: AtomicBool,
    guard: PathGuard,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> std::fmt::Debug for AppendLogMultiMaplet<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendLogMultiMaplet")
            .field("path", &self.guard.path())
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}

/// The history of one key, read back from the partition.
struct History {
    entry_keys: Vec<fjall::Slice>,
    records: Vec<fjall::Slice>,
}

impl<K: Storable, V: Storable> AppendLogMultiMaplet<K, V> {
    /// Opens or creates the store in the directory `path`.
    ///
    /// Keys holding more than `compaction_threshold` records are compacted
    /// before this returns; `0` disables that.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpen`] if `path` is open elsewhere in the process.
    /// - [`Error::FormatMismatch`] if `path` holds another store format.
    /// - [`Error::Engine`] for failures of the underlying engine.
    #[tracing::instrument(skip(path, plugin), fields(path = %path.as_ref().display()))]
    pub fn open(
        path: impl AsRef<Path>,
        plugin: Arc<Plugin>,
        compaction_threshold: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let guard = PathGuard::acquire(path)?;

        let keyspace = fjall::Config::new(path).open()?;
        let meta = keyspace
            .open_partition("meta", PartitionCreateOptions::default())?;
        check_format(&meta, path, FORMAT)?;

        let records = keyspace
            .open_partition("records", PartitionCreateOptions::default())?;

        let store = Self {
            guard,
            keyspace,
            records,
            plugin,
            next_sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            _marker: PhantomData,
        };

        let (max_sequence, crowded) = store.scan(compaction_threshold)?;
        store
            .next_sequence
            .store(max_sequence.map_or(0, |s| s + 1), Ordering::Relaxed);

        if !crowded.is_empty() {
            for prefix in &crowded {
                store.compact_prefix(prefix)?;
            }

            tracing::debug!(keys = crowded.len(), "compacted on open");
        }

        tracing::debug!("append-log store opened");

        Ok(store)
    }

    /// Rewrites every key holding more than one record as a single record.
    ///
    /// Returns the number of keys rewritten.
    ///
    /// # Errors
    ///
    /// Fails on decode or engine failures, or after close.
    #[tracing::instrument(skip(self), fields(path = %self.guard.path().display()))]
    pub fn compact(&self) -> Result<usize> {
        self.ensure_open()?;

        let (_, crowded) = self.scan(1)?;
        for prefix in &crowded {
            self.compact_prefix(prefix)?;
        }

        tracing::debug!(keys = crowded.len(), "compacted");

        Ok(crowded.len())
    }

    /// Returns the number of history records currently stored for `key`.
    ///
    /// # Errors
    ///
    /// Fails on encode or engine failures, or after close.
    pub fn record_count(&self, key: &K) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.history(&key_prefix(key, &self.plugin)?)?.records.len())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed(self.guard.path().display().to_string()));
        }

        Ok(())
    }

    /// Walks every entry once, returning the highest sequence number and the
    /// key prefixes holding more than `threshold` records.
    fn scan(&self, threshold: usize) -> Result<(Option<u64>, Vec<Vec<u8>>)> {
        let mut max_sequence = None;
        let mut crowded = Vec::new();
        let mut current: Option<(Vec<u8>, usize)> = None;

        for item in self.records.iter() {
            let (entry_key, _) = item?;
            let (prefix, suffix) = split_key_prefix(&entry_key)?;
            let sequence = decode_sequence(suffix)?;

            max_sequence = max_sequence.max(Some(sequence));

            if let Some((current_prefix, count)) = &mut current {
                if current_prefix.as_slice() == prefix {
                    *count += 1;
                    continue;
                }
            }

            if let Some((done, count)) = current.replace((prefix.to_vec(), 1)) {
                if threshold > 0 && count > threshold {
                    crowded.push(done);
                }
            }
        }

        if let Some((done, count)) = current {
            if threshold > 0 && count > threshold {
                crowded.push(done);
            }
        }

        Ok((max_sequence, crowded))
    }

    fn compact_prefix(&self, prefix: &[u8]) -> Result<()> {
        let history = self.history(prefix)?;
        let values = self.replay(&history.records)?;

        let mut batch = self.keyspace.batch();
        for entry_key in history.entry_keys {
            batch.remove(&self.records, entry_key);
        }

        if !values.is_empty() {
            let record = self.encode_record(true, values.iter())?;
            batch.insert(&self.records, self.entry_key(prefix), record);
        }

        batch.commit()?;

        Ok(())
    }

    fn history(&self, prefix: &[u8]) -> Result<History> {
        let mut history = History { entry_keys: Vec::new(), records: Vec::new() };

        for item in self.records.prefix(prefix) {
            let (entry_key, record) = item?;
            history.entry_keys.push(entry_key);
            history.records.push(record);
        }

        Ok(history)
    }

    fn replay(&self, records: &[fjall::Slice]) -> Result<ValueSet<V>> {
        let mut values = ValueSet::default();

        for record in records {
            self.decode_record(record, |add, value| {
                if add {
                    values.insert(value);
                } else {
                    values.remove(&value);
                }
            })?;
        }

        Ok(values)
    }

    fn decode_record(
        &self,
        record: &[u8],
        mut apply: impl FnMut(bool, V),
    ) -> Result<()> {
        let malformed = |source| Error::Decode { what: "history record", source };

        let mut decoder = PostcardDecoder::new(record);
        let count = decoder.read_i32().map_err(malformed)?;

        for _ in 0..count.unsigned_abs() {
            let value = decoder.decode::<V>(&self.plugin).map_err(malformed)?;
            apply(count > 0, value);
        }

        if !decoder.is_exhausted() {
            return Err(malformed(depstore_serialize::decode::invalid_data(
                "trailing bytes after history record",
            )));
        }

        Ok(())
    }

    fn encode_record<'v>(
        &self,
        add: bool,
        values: impl ExactSizeIterator<Item = &'v V>,
    ) -> Result<Vec<u8>> {
        let count = i32::try_from(values.len()).map_err(|_| Error::Encode {
            what: "history record",
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "too many values in one record",
            ),
        })?;

        let mut buffer = Vec::new();
        depstore_serialize::PostcardEncoder::new(&mut buffer)
            .emit_i32(if add { count } else { -count })
            .map_err(|source| Error::Encode { what: "history record", source })?;

        for value in values {
            encode_into(value, &self.plugin, &mut buffer, "value")?;
        }

        Ok(buffer)
    }

    fn entry_key(&self, prefix: &[u8]) -> Vec<u8> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);

        let mut entry_key = Vec::with_capacity(prefix.len() + SEQUENCE_LEN);
        entry_key.extend_from_slice(prefix);
        entry_key.extend_from_slice(&sequence.to_be_bytes());
        entry_key
    }

    fn delete_history(&self, prefix: &[u8]) -> Result<()> {
        let history = self.history(prefix)?;
        if history.entry_keys.is_empty() {
            return Ok(());
        }

        let mut batch = self.keyspace.batch();
        for entry_key in history.entry_keys {
            batch.remove(&self.records, entry_key);
        }
        batch.commit()?;

        Ok(())
    }
}

fn decode_sequence(suffix: &[u8]) -> Result<u64> {
    let bytes: [u8; SEQUENCE_LEN] = suffix.try_into().map_err(|_| Error::Decode {
        what: "record sequence",
        source: depstore_serialize::decode::invalid_data(format!(
            "expected {SEQUENCE_LEN} sequence bytes, found {}",
            suffix.len()
        )),
    })?;

    Ok(u64::from_be_bytes(bytes))
}

impl<K: Storable, V: Storable> Lifecycle for AppendLogMultiMaplet<K, V> {
    fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        flush_interned(&self.plugin)?;
        self.keyspace.persist(PersistMode::SyncAll)?;

        tracing::debug!(
            path = %self.guard.path().display(),
            "append-log store flushed"
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
            "append-log store closed"
        );

        Ok(())
    }
}

impl<K: Storable, V: Storable> MultiMaplet<K, V>
    for AppendLogMultiMaplet<K, V>
{
    fn contains_key(&self, key: &K) -> Result<bool> {
        self.ensure_open()?;

        let prefix = key_prefix(key, &self.plugin)?;
        match self.records.prefix(prefix).next() {
            Some(item) => item.map(|_| true).map_err(Error::from),
            None => Ok(false),
        }
    }

    fn get(&self, key: &K) -> Result<ValueSet<V>> {
        self.ensure_open()?;

        let history = self.history(&key_prefix(key, &self.plugin)?)?;
        self.replay(&history.records)
    }

    fn put(&self, key: &K, values: &ValueSet<V>) -> Result<()> {
        self.ensure_open()?;

        let prefix = key_prefix(key, &self.plugin)?;
        if values.is_empty() {
            return self.delete_history(&prefix);
        }

        let record = self.encode_record(true, values.iter())?;
        let history = self.history(&prefix)?;

        let mut batch = self.keyspace.batch();
        for entry_key in history.entry_keys {
            batch.remove(&self.records, entry_key);
        }
        batch.insert(&self.records, self.entry_key(&prefix), record);
        batch.commit()?;

        Ok(())
    }

    fn remove(&self, key: &K) -> Result<()> {
        self.ensure_open()?;
        self.delete_history(&key_prefix(key, &self.plugin)?)
    }

    fn append_values(&self, key: &K, values: &[V]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        self.ensure_open()?;

        let prefix = key_prefix(key, &self.plugin)?;
        let record = self.encode_record(true, values.iter())?;
        self.records.insert(self.entry_key(&prefix), record)?;

        Ok(())
    }

    fn remove_values(&self, key: &K, values: &[V]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        self.ensure_open()?;

        let prefix = key_prefix(key, &self.plugin)?;
        let history = self.history(&prefix)?;
        let mut current = self.replay(&history.records)?;

        let mut present = Vec::new();
        for value in values {
            if current.remove(value) {
                present.push(value);
            }
        }

        if present.is_empty() {
            return Ok(());
        }

        let mut batch = self.keyspace.batch();

        if current.is_empty() {
            for entry_key in history.entry_keys {
                batch.remove(&self.records, entry_key);
            }
        } else {
            let record = self.encode_record(false, present.into_iter())?;
            batch.insert(&self.records, self.entry_key(&prefix), record);
        }

        batch.commit()?;

        Ok(())
    }

    fn keys(&self) -> Result<Vec<K>> {
        self.ensure_open()?;

        let mut keys = Vec::new();
        let mut last_prefix: Option<Vec<u8>> = None;

        for item in self.records.iter() {
            let (entry_key, _) = item?;
            let (prefix, _) = split_key_prefix(&entry_key)?;

            if last_prefix.as_deref() == Some(prefix) {
                continue;
            }

            keys.push(decode_key_prefix(prefix, &self.plugin)?);
            last_prefix = Some(prefix.to_vec());
        }

        Ok(keys)
    }
}
