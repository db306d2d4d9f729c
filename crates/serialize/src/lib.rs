//! Binary codec contracts for the dependency-graph store.
//!
//! Every key and value that reaches a storage backend passes through the
//! traits defined here. The storage layer never inspects the bytes it stores,
//! it only relies on two properties of a codec:
//!
//! - **Determinism**: the same logical value always encodes to the same bytes.
//!   Replaying append-log history and comparing interned values after a hash
//!   collision both depend on it.
//! - **Strictness**: malformed or truncated input is reported as an error and
//!   never decoded into a partial value.
//!
//! # Overview
//!
//! - [`Encoder`] / [`Decoder`]: low-level traits emitting and reading
//!   primitives.
//! - [`Encode`] / [`Decode`]: high-level traits implemented by value types.
//! - [`Plugin`]: a type-keyed context passed to every encode and decode call.
//!   The storage layer uses it to hand the shared interning log to value
//!   codecs.
//! - [`PostcardEncoder`] / [`PostcardDecoder`]: the varint wire format used
//!   on disk.
//!
//! # Example
//!
//! ```
//! use depstore_serialize::{Decode, Decoder, Encode, Encoder, Plugin};
//!
//! #[derive(Debug, PartialEq)]
//! struct Edge {
//!     from: u32,
//!     to: u32,
//! }
//!
//! impl Encode for Edge {
//!     fn encode<E: Encoder + ?Sized>(
//!         &self,
//!         encoder: &mut E,
//!         plugin: &Plugin,
//!     ) -> std::io::Result<()> {
//!         self.from.encode(encoder, plugin)?;
//!         self.to.encode(encoder, plugin)
//!     }
//! }
//!
//! impl Decode for Edge {
//!     fn decode<D: Decoder + ?Sized>(
//!         decoder: &mut D,
//!         plugin: &Plugin,
//!     ) -> std::io::Result<Self> {
//!         Ok(Self {
//!             from: u32::decode(decoder, plugin)?,
//!             to: u32::decode(decoder, plugin)?,
//!         })
//!     }
//! }
//!
//! let plugin = Plugin::new();
//! let bytes = depstore_serialize::encode(&Edge { from: 1, to: 2 }, &plugin)
//!     .unwrap();
//! let edge: Edge = depstore_serialize::decode(&bytes, &plugin).unwrap();
//!
//! assert_eq!(edge, Edge { from: 1, to: 2 });
//! ```

pub mod decode;
pub mod encode;
pub mod plugin;
pub mod postcard;

pub use decode::{Decode, Decoder};
pub use encode::{Encode, Encoder};
pub use plugin::Plugin;
pub use postcard::{PostcardDecoder, PostcardEncoder, decode, encode};
