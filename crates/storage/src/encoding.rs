//! Byte layouts shared by the on-disk stores.
//!
//! Keys stored in the engine are length-prefixed:
//!
//! ```text
//! [u64 LE encoded key length][encoded key]
//! ```
//!
//! The prefix makes every key layout prefix-free, so a prefix scan for one
//! key never yields entries of another key even when callers append a
//! suffix, as the append-log does with its record sequence number. It also
//! keeps stored keys non-empty for codecs that encode to zero bytes.

use std::path::Path;

use depstore_serialize::{
    Decode, Encode, Encoder, Plugin, PostcardEncoder, decode::invalid_data,
};

use crate::{
    enumerator::SharedEnumerator,
    error::{Error, Result},
};

const LENGTH_PREFIX: usize = std::mem::size_of::<u64>();

/// The meta-partition key holding the format tag.
const FORMAT_KEY: &[u8] = b"format";

/// Encodes `value` onto the end of `buffer`.
pub(crate) fn encode_into<T: Encode + ?Sized>(
    value: &T,
    plugin: &Plugin,
    buffer: &mut Vec<u8>,
    what: &'static str,
) -> Result<()> {
    PostcardEncoder::new(&mut *buffer)
        .encode(value, plugin)
        .map_err(|source| Error::Encode { what, source })
}

/// Encodes `value` into a fresh buffer.
pub(crate) fn encode<T: Encode + ?Sized>(
    value: &T,
    plugin: &Plugin,
    what: &'static str,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_into(value, plugin, &mut buffer, what)?;
    Ok(buffer)
}

/// Decodes a value spanning `bytes` exactly.
pub(crate) fn decode<T: Decode>(
    bytes: &[u8],
    plugin: &Plugin,
    what: &'static str,
) -> Result<T> {
    depstore_serialize::decode(bytes, plugin)
        .map_err(|source| Error::Decode { what, source })
}

/// Encodes `key` in the length-prefixed layout.
pub(crate) fn key_prefix<K: Encode + ?Sized>(
    key: &K,
    plugin: &Plugin,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0; LENGTH_PREFIX];
    encode_into(key, plugin, &mut buffer, "key")?;

    let len = (buffer.len() - LENGTH_PREFIX) as u64;
    buffer[..LENGTH_PREFIX].copy_from_slice(&len.to_le_bytes());

    Ok(buffer)
}

/// Splits a stored key into its length-prefixed part and the suffix that
/// follows it.
pub(crate) fn split_key_prefix(stored: &[u8]) -> Result<(&[u8], &[u8])> {
    let malformed = || Error::Decode {
        what: "key",
        source: invalid_data("stored key shorter than its length prefix"),
    };

    let header: [u8; LENGTH_PREFIX] = stored
        .get(..LENGTH_PREFIX)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(malformed)?;

    let end = usize::try_from(u64::from_le_bytes(header))
        .ok()
        .and_then(|len| len.checked_add(LENGTH_PREFIX))
        .filter(|&end| end <= stored.len())
        .ok_or_else(malformed)?;

    Ok(stored.split_at(end))
}

/// Decodes the key out of a length-prefixed stored key.
pub(crate) fn decode_key_prefix<K: Decode>(
    prefix: &[u8],
    plugin: &Plugin,
) -> Result<K> {
    decode(&prefix[LENGTH_PREFIX.min(prefix.len())..], plugin, "key")
}

/// Writes out the interning log in `plugin`, if there is an open one.
///
/// Persistent stores call this before syncing their own records, which may
/// hold ids the log has only buffered so far.
pub(crate) fn flush_interned(plugin: &Plugin) -> Result<()> {
    match plugin.get::<SharedEnumerator>() {
        Some(enumerator) if !enumerator.is_closed() => enumerator.flush(),
        _ => Ok(()),
    }
}

/// A partition able to hold the store's format tag.
pub(crate) trait MetaPartition {
    fn read_tag(&self) -> fjall::Result<Option<fjall::Slice>>;

    fn write_tag(&self, tag: &[u8]) -> fjall::Result<()>;
}

impl MetaPartition for fjall::PartitionHandle {
    fn read_tag(&self) -> fjall::Result<Option<fjall::Slice>> {
        self.get(FORMAT_KEY)
    }

    fn write_tag(&self, tag: &[u8]) -> fjall::Result<()> {
        self.insert(FORMAT_KEY, tag)
    }
}

impl MetaPartition for fjall::TxPartitionHandle {
    fn read_tag(&self) -> fjall::Result<Option<fjall::Slice>> {
        self.get(FORMAT_KEY)
    }

    fn write_tag(&self, tag: &[u8]) -> fjall::Result<()> {
        self.insert(FORMAT_KEY, tag)
    }
}

/// Checks the format tag in `meta`, writing `expected` into a fresh store.
pub(crate) fn check_format(
    meta: &impl MetaPartition,
    path: &Path,
    expected: &str,
) -> Result<()> {
    match meta.read_tag()? {
        None => {
            meta.write_tag(expected.as_bytes())?;
            Ok(())
        }

        Some(found) if &*found == expected.as_bytes() => Ok(()),

        Some(found) => Err(Error::FormatMismatch {
            path: path.to_path_buf(),
            expected: expected.to_owned(),
            found: String::from_utf8_lossy(&found).into_owned(),
        }),
    }
}
