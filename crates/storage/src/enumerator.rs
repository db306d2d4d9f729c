//! The object interning log.
//!
//! An [`Enumerator`] turns byte strings into small, stable integer ids. Every
//! distinct value is appended once to a log file; its id is its ordinal
//! position in that file and stays valid for the lifetime of the file.
//!
//! # File layout
//!
//! ```text
//! [magic "DSEN"][u32 LE format version]
//! ([u32 LE length][bytes])*
//! ```
//!
//! There is no index file. On open the whole log is scanned once and the
//! in-memory [`HashIndex`](index::HashIndex) is rebuilt. A trailing record
//! cut short by a crash is truncated away with a warning.
//!
//! # Encoding through the plugin
//!
//! Wrapping a value in [`Enumerated`] makes its codec write only the id. The
//! [`SharedEnumerator`] must be present in the [`Plugin`] passed to the
//! codec; the [`StoreFactory`](crate::StoreFactory) arranges that.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufReader, Read, Seek, SeekFrom, Write},
    ops::Deref,
    path::Path,
    sync::Arc,
};

use depstore_serialize::{
    Decode, Decoder, Encode, Encoder, Plugin, decode::invalid_data,
};
use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    path_lock::PathGuard,
};

mod index;

use index::HashIndex;

const MAGIC: &[u8; 4] = b"DSEN";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: u64 = 8;
const RECORD_HEADER_LEN: u64 = 4;

/// The hash function used to bucket values in the index.
pub type ValueHasher = fn(&[u8]) -> u32;

fn default_hasher(bytes: &[u8]) -> u32 { fxhash::hash32(bytes) }

/// An append-only log of unique byte strings with stable integer ids.
///
/// Every operation is serialized under one lock, so two concurrent
/// [`enumerate`](Self::enumerate) calls for the same unseen value always
/// agree on a single id.
pub struct Enumerator {
    hasher: ValueHasher,
    inner: Mutex<Inner>,

    // Dropped last, once the file is closed.
    guard: PathGuard,
}

struct Inner {
    file: File,

    /// Records appended but not yet written to `file`.
    pending: Vec<u8>,

    /// Length of the file contents already written.
    written: u64,

    /// File offset of each record, indexed by id.
    offsets: Vec<u64>,

    index: HashIndex,
    write_buffer: usize,
    closed: bool,
}

impl std::fmt::Debug for Enumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enumerator")
            .field("path", &self.guard.path())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Enumerator {
    /// Opens or creates the log at `path`.
    ///
    /// `write_buffer` is the number of appended bytes kept in memory before
    /// they are written to the file.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpen`] if the log is open elsewhere in the process.
    /// - [`Error::FormatMismatch`] / [`Error::Corrupted`] for a bad header.
    /// - [`Error::Io`] for file failures.
    pub fn open(path: impl AsRef<Path>, write_buffer: usize) -> Result<Self> {
        Self::open_with_hasher(path, write_buffer, default_hasher)
    }

    /// Like [`open`](Self::open) but buckets values with `hasher`.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    #[tracing::instrument(skip(path, hasher), fields(path = %path.as_ref().display()))]
    pub fn open_with_hasher(
        path: impl AsRef<Path>,
        write_buffer: usize,
        hasher: ValueHasher,
    ) -> Result<Self> {
        let path = path.as_ref();
        let guard = PathGuard::acquire(path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let file_len = file.metadata()?.len();

        if file_len == 0 {
            let mut header = [0u8; HEADER_LEN as usize];
            header[..4].copy_from_slice(MAGIC);
            header[4..].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
            file.write_all(&header)?;
            file.sync_data()?;
        } else {
            check_header(&mut file, path, file_len)?;
        }

        let file_len = file_len.max(HEADER_LEN);
        let (offsets, index, valid_len) = scan(&mut file, file_len, hasher)?;

        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = file_len - valid_len,
                "truncating torn record at the end of the interning log"
            );
            file.set_len(valid_len)?;
            file.sync_data()?;
        }

        tracing::debug!(values = offsets.len(), "interning log opened");

        Ok(Self {
            guard,
            hasher,
            inner: Mutex::new(Inner {
                file,
                pending: Vec::new(),
                written: valid_len,
                offsets,
                index,
                write_buffer,
                closed: false,
            }),
        })
    }

    /// The path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path { self.guard.path() }

    /// Returns the id of `value`, appending it to the log if it is new.
    ///
    /// # Errors
    ///
    /// Fails if the log is closed, full, or a file operation fails.
    pub fn enumerate(&self, value: &[u8]) -> Result<u32> {
        let hash = HashIndex::normalize((self.hasher)(value));
        let mut inner = self.inner.lock();
        inner.ensure_open(self.path())?;

        for id in inner.index.candidates(hash) {
            if inner.read_record(id)? == value {
                return Ok(id);
            }
        }

        inner.append(value, hash, self.path())
    }

    /// UTF-8 convenience for [`enumerate`](Self::enumerate).
    ///
    /// # Errors
    ///
    /// See [`enumerate`](Self::enumerate).
    pub fn enumerate_str(&self, value: &str) -> Result<u32> {
        self.enumerate(value.as_bytes())
    }

    /// Returns the bytes stored under `id`, or `None` for an unknown id.
    ///
    /// # Errors
    ///
    /// Fails if the log is closed or reading the file fails.
    pub fn value_of(&self, id: u32) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        inner.ensure_open(self.path())?;

        if id as usize >= inner.offsets.len() {
            return Ok(None);
        }

        Ok(Some(inner.read_record(id)?))
    }

    /// Returns the string stored under `id`, or `None` for an unknown id.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] if the stored bytes are not UTF-8, otherwise as
    /// [`value_of`](Self::value_of).
    pub fn string_of(&self, id: u32) -> Result<Option<String>> {
        self.value_of(id)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|err| Error::Decode {
                    what: "interned string",
                    source: invalid_data(err.to_string()),
                })
            })
            .transpose()
    }

    /// The number of interned values.
    #[must_use]
    pub fn len(&self) -> usize { self.inner.lock().offsets.len() }

    /// Returns `true` once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.inner.lock().closed }

    /// Returns `true` if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Calls `f` with every id and value, in id order.
    ///
    /// The log stays locked for the whole traversal, so `f` must not call
    /// back into this enumerator.
    ///
    /// # Errors
    ///
    /// Fails if the log is closed or reading the file fails.
    pub fn for_each_value(&self, mut f: impl FnMut(u32, &[u8])) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open(self.path())?;

        for id in 0..inner.offsets.len() {
            #[allow(clippy::cast_possible_truncation)]
            let id = id as u32;
            let value = inner.read_record(id)?;
            f(id, &value);
        }

        Ok(())
    }

    /// Writes buffered records out and syncs the file.
    ///
    /// # Errors
    ///
    /// Fails if the log is closed or a file operation fails.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open(self.path())?;
        inner.write_out()?;
        inner.file.sync_data()?;
        Ok(())
    }

    /// Flushes and closes the log. Later calls fail with [`Error::Closed`].
    ///
    /// Closing an already closed log does nothing.
    ///
    /// # Errors
    ///
    /// Fails if the final flush fails.
    #[tracing::instrument(skip(self), fields(path = %self.path().display()))]
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Ok(());
        }

        inner.closed = true;
        inner.write_out()?;
        inner.file.sync_all()?;

        tracing::debug!(values = inner.offsets.len(), "interning log closed");

        Ok(())
    }
}

impl Drop for Enumerator {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();

        if inner.closed {
            return;
        }

        let written = inner.write_out().and_then(|()| inner.file.sync_data());

        if let Err(err) = written {
            tracing::warn!(
                path = %self.guard.path().display(),
                error = %err,
                "failed to write out the interning log on drop"
            );
        }
    }
}

impl Inner {
    fn ensure_open(&self, path: &Path) -> Result<()> {
        if self.closed {
            return Err(Error::Closed(path.display().to_string()));
        }

        Ok(())
    }

    fn append(&mut self, value: &[u8], hash: u32, path: &Path) -> Result<u32> {
        let full = || Error::Corrupted {
            path: path.to_path_buf(),
            reason: "interning log id space exhausted".to_owned(),
        };

        let id = u32::try_from(self.offsets.len()).map_err(|_| full())?;
        let len = u32::try_from(value.len()).map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "interned value larger than 4 GiB",
            ))
        })?;

        self.offsets.push(self.written + self.pending.len() as u64);
        self.pending.extend_from_slice(&len.to_le_bytes());
        self.pending.extend_from_slice(value);
        self.index.insert(hash, id);

        if self.pending.len() >= self.write_buffer {
            self.write_out()?;
        }

        Ok(id)
    }

    fn write_out(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        write_records(&mut self.file, &self.pending, self.written)?;
        self.written += self.pending.len() as u64;
        self.pending.clear();

        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_record(&mut self, id: u32) -> io::Result<Vec<u8>> {
        let offset = self.offsets[id as usize];

        if offset >= self.written {
            let start = (offset - self.written) as usize;
            let body = start + RECORD_HEADER_LEN as usize;
            let len = read_len(&self.pending[start..body]);

            return Ok(self.pending[body..body + len as usize].to_vec());
        }

        let mut header = [0u8; RECORD_HEADER_LEN as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut header)?;

        let mut value = vec![0u8; read_len(&header) as usize];
        self.file.read_exact(&mut value)?;

        Ok(value)
    }
}

/// A log file that can be cut back to a known length.
trait LogFile: Write {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> { self.set_len(len) }
}

/// Appends `records` to `file`, whose contents end at `written`.
///
/// A failed write is cut back to `written`, so a retry never leaves a
/// partial copy of the records in front of the full one.
fn write_records(
    file: &mut impl LogFile,
    records: &[u8],
    written: u64,
) -> io::Result<()> {
    if let Err(err) = file.write_all(records) {
        file.truncate(written)?;
        return Err(err);
    }

    Ok(())
}

fn read_len(header: &[u8]) -> u32 {
    let mut bytes = [0u8; RECORD_HEADER_LEN as usize];
    bytes.copy_from_slice(&header[..RECORD_HEADER_LEN as usize]);
    u32::from_le_bytes(bytes)
}

fn check_header(file: &mut File, path: &Path, file_len: u64) -> Result<()> {
    let corrupted = |reason: &str| Error::Corrupted {
        path: path.to_path_buf(),
        reason: reason.to_owned(),
    };

    if file_len < HEADER_LEN {
        return Err(corrupted("interning log header is truncated"));
    }

    let mut header = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;

    if &header[..4] != MAGIC {
        return Err(corrupted("not an interning log"));
    }

    let version = read_len(&header[4..]);
    if version != FORMAT_VERSION {
        return Err(Error::FormatMismatch {
            path: path.to_path_buf(),
            expected: format!("interning-log/{FORMAT_VERSION}"),
            found: format!("interning-log/{version}"),
        });
    }

    Ok(())
}

/// Reads every complete record after the header.
///
/// Returns the record offsets, the rebuilt index and the length of the valid
/// prefix of the file.
fn scan(
    file: &mut File,
    file_len: u64,
    hasher: ValueHasher,
) -> Result<(Vec<u64>, HashIndex, u64)> {
    file.seek(SeekFrom::Start(HEADER_LEN))?;

    let mut reader = BufReader::new(&*file);
    let mut offsets = Vec::new();
    let mut index = HashIndex::new();
    let mut position = HEADER_LEN;
    let mut value = Vec::new();

    loop {
        let mut header = [0u8; RECORD_HEADER_LEN as usize];
        if !read_full(&mut reader, &mut header)? {
            break;
        }

        let len = u64::from(read_len(&header));
        if position + RECORD_HEADER_LEN + len > file_len {
            break;
        }

        #[allow(clippy::cast_possible_truncation)]
        value.resize(len as usize, 0);
        if !read_full(&mut reader, &mut value)? {
            break;
        }

        #[allow(clippy::cast_possible_truncation)]
        let id = offsets.len() as u32;
        index.insert(HashIndex::normalize(hasher(&value)), id);
        offsets.push(position);

        position += RECORD_HEADER_LEN + value.len() as u64;
    }

    Ok((offsets, index, position))
}

/// Fills `buf` completely, returning `false` if input ends first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err),
    }
}

/// A cheaply clonable handle to an [`Enumerator`], suitable for storing in
/// a [`Plugin`].
#[derive(Debug, Clone)]
pub struct SharedEnumerator(Arc<Enumerator>);

impl SharedEnumerator {
    /// Wraps `enumerator` for sharing.
    #[must_use]
    pub fn new(enumerator: Enumerator) -> Self { Self(Arc::new(enumerator)) }
}

impl Deref for SharedEnumerator {
    type Target = Enumerator;

    fn deref(&self) -> &Self::Target { &self.0 }
}

/// A value encoded as its interning-log id.
///
/// Encoding looks up the [`SharedEnumerator`] in the [`Plugin`], interns the
/// encoded bytes of the inner value and writes only the id. Decoding reverses
/// that. A missing plugin entry or an unknown id is a codec error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Enumerated<T>(pub T);

fn shared_enumerator(plugin: &Plugin) -> io::Result<&SharedEnumerator> {
    plugin.get::<SharedEnumerator>().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "`SharedEnumerator` plugin missing for `Enumerated<T>`",
        )
    })
}

impl<T: Encode> Encode for Enumerated<T> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        let enumerator = shared_enumerator(plugin)?;
        let bytes = depstore_serialize::encode(&self.0, plugin)?;
        let id = enumerator.enumerate(&bytes).map_err(io::Error::other)?;

        encoder.emit_u32(id)
    }
}

impl<T: Decode> Decode for Enumerated<T> {
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        let id = decoder.read_u32()?;
        let enumerator = shared_enumerator(plugin)?;

        let bytes = enumerator
            .value_of(id)
            .map_err(io::Error::other)?
            .ok_or_else(|| invalid_data(format!("unknown interned id {id}")))?;

        depstore_serialize::decode(&bytes, plugin).map(Self)
    }
}

#[cfg(test)]
mod test;
