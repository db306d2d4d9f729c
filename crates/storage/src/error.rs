//! Error types shared by every store in this crate.

use std::{io, path::PathBuf};

/// An error raised by a store, the interning log or the store factory.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stored bytes could not be decoded into the expected type.
    #[error("failed to decode {what}")]
    Decode {
        /// What was being decoded.
        what: &'static str,

        /// The codec failure.
        #[source]
        source: io::Error,
    },

    /// A value could not be encoded.
    #[error("failed to encode {what}")]
    Encode {
        /// What was being encoded.
        what: &'static str,

        /// The codec failure.
        #[source]
        source: io::Error,
    },

    /// An I/O failure on a file owned by this crate.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A failure reported by the on-disk key-value engine.
    #[error(transparent)]
    Engine(#[from] fjall::Error),

    /// The on-disk format tag does not match what the opener expects.
    #[error(
        "format mismatch at {}: expected `{expected}`, found `{found}`",
        .path.display()
    )]
    FormatMismatch {
        /// The store or log location.
        path: PathBuf,

        /// The tag this build writes.
        expected: String,

        /// The tag found on disk.
        found: String,
    },

    /// On-disk data is structurally broken.
    #[error("corrupted data at {}: {reason}", .path.display())]
    Corrupted {
        /// The store or log location.
        path: PathBuf,

        /// What is wrong.
        reason: String,
    },

    /// The backing path is already held by another open instance in this
    /// process.
    #[error("{} is already open", .0.display())]
    AlreadyOpen(PathBuf),

    /// The store was used after [`close`](crate::Lifecycle::close).
    #[error("store `{0}` is closed")]
    Closed(String),

    /// One or more resources failed to close.
    #[error("{} resource(s) failed to close", .0.len())]
    Close(Vec<Error>),
}

/// A specialized result type for store operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
