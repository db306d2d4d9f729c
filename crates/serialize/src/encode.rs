//! Encoding traits and implementations.
//!
//! [`Encoder`] is the sink a wire format implements. [`Encode`] is what value
//! types implement to describe themselves in terms of encoder primitives.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    hash::BuildHasher,
    io,
    sync::Arc,
};

use crate::plugin::Plugin;

/// A sink for primitive values in some binary format.
///
/// Only the fixed-size integer methods and [`emit_raw_bytes`] are required.
/// Everything else has a default built on top of them that a format may
/// override.
///
/// [`emit_raw_bytes`]: Encoder::emit_raw_bytes
pub trait Encoder {
    /// Emits a single unsigned byte.
    fn emit_u8(&mut self, v: u8) -> io::Result<()>;

    /// Emits a 16-bit unsigned integer.
    fn emit_u16(&mut self, v: u16) -> io::Result<()>;

    /// Emits a 32-bit unsigned integer.
    fn emit_u32(&mut self, v: u32) -> io::Result<()>;

    /// Emits a 64-bit unsigned integer.
    fn emit_u64(&mut self, v: u64) -> io::Result<()>;

    /// Emits a 128-bit unsigned integer.
    fn emit_u128(&mut self, v: u128) -> io::Result<()>;

    /// Emits a 16-bit signed integer.
    fn emit_i16(&mut self, v: i16) -> io::Result<()>;

    /// Emits a 32-bit signed integer.
    fn emit_i32(&mut self, v: i32) -> io::Result<()>;

    /// Emits a 64-bit signed integer.
    fn emit_i64(&mut self, v: i64) -> io::Result<()>;

    /// Emits a 128-bit signed integer.
    fn emit_i128(&mut self, v: i128) -> io::Result<()>;

    /// Emits bytes verbatim, without any length information.
    fn emit_raw_bytes(&mut self, s: &[u8]) -> io::Result<()>;

    /// Emits a single signed byte.
    #[allow(clippy::cast_sign_loss)]
    fn emit_i8(&mut self, v: i8) -> io::Result<()> { self.emit_u8(v as u8) }

    /// Emits a platform-sized unsigned integer as 64 bits.
    fn emit_usize(&mut self, v: usize) -> io::Result<()> {
        self.emit_u64(v as u64)
    }

    /// Emits a platform-sized signed integer as 64 bits.
    fn emit_isize(&mut self, v: isize) -> io::Result<()> {
        self.emit_i64(v as i64)
    }

    /// Emits `true` as `1` and `false` as `0`.
    fn emit_bool(&mut self, v: bool) -> io::Result<()> {
        self.emit_u8(u8::from(v))
    }

    /// Emits a character as its Unicode scalar value.
    fn emit_char(&mut self, v: char) -> io::Result<()> {
        self.emit_u32(u32::from(v))
    }

    /// Emits the IEEE 754 bits of a 32-bit float.
    fn emit_f32(&mut self, v: f32) -> io::Result<()> {
        self.emit_u32(v.to_bits())
    }

    /// Emits the IEEE 754 bits of a 64-bit float.
    fn emit_f64(&mut self, v: f64) -> io::Result<()> {
        self.emit_u64(v.to_bits())
    }

    /// Emits a length-prefixed UTF-8 string.
    fn emit_str(&mut self, v: &str) -> io::Result<()> {
        self.emit_bytes(v.as_bytes())
    }

    /// Emits a length-prefixed byte slice.
    fn emit_bytes(&mut self, v: &[u8]) -> io::Result<()> {
        self.emit_usize(v.len())?;
        self.emit_raw_bytes(v)
    }

    /// Encodes a whole value with this encoder.
    fn encode<T: Encode + ?Sized>(
        &mut self,
        value: &T,
        plugin: &Plugin,
    ) -> io::Result<()> {
        value.encode(self, plugin)
    }
}

/// A type that can describe itself to an [`Encoder`].
///
/// Implementations used as store keys or values must be deterministic: equal
/// values must produce identical bytes.
pub trait Encode {
    /// Encodes `self` into `encoder`.
    ///
    /// # Errors
    ///
    /// Returns whatever error the encoder or a [`Plugin`]-provided service
    /// reports.
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()>;
}

macro_rules! impl_encode_primitive {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode<E: Encoder + ?Sized>(
                    &self,
                    encoder: &mut E,
                    _: &Plugin,
                ) -> io::Result<()> {
                    encoder.$method(*self)
                }
            }
        )*
    };
}

impl_encode_primitive!(
    u8 => emit_u8,
    u16 => emit_u16,
    u32 => emit_u32,
    u64 => emit_u64,
    u128 => emit_u128,
    usize => emit_usize,
    i8 => emit_i8,
    i16 => emit_i16,
    i32 => emit_i32,
    i64 => emit_i64,
    i128 => emit_i128,
    isize => emit_isize,
    bool => emit_bool,
    char => emit_char,
    f32 => emit_f32,
    f64 => emit_f64,
);

impl Encode for () {
    fn encode<E: Encoder + ?Sized>(&self, _: &mut E, _: &Plugin) -> io::Result<()> {
        Ok(())
    }
}

impl Encode for str {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        _: &Plugin,
    ) -> io::Result<()> {
        encoder.emit_str(self)
    }
}

impl Encode for String {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        _: &Plugin,
    ) -> io::Result<()> {
        encoder.emit_str(self)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        (**self).encode(encoder, plugin)
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        (**self).encode(encoder, plugin)
    }
}

impl<T: Encode + ?Sized> Encode for Arc<T> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        (**self).encode(encoder, plugin)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        match self {
            None => encoder.emit_u8(0),
            Some(value) => {
                encoder.emit_u8(1)?;
                value.encode(encoder, plugin)
            }
        }
    }
}

/// Encodes a length prefix followed by every item of `iter`.
fn encode_seq<'a, T: Encode + 'a, E: Encoder + ?Sized>(
    len: usize,
    iter: impl IntoIterator<Item = &'a T>,
    encoder: &mut E,
    plugin: &Plugin,
) -> io::Result<()> {
    encoder.emit_usize(len)?;
    for item in iter {
        item.encode(encoder, plugin)?;
    }
    Ok(())
}

/// Like [`encode_seq`], but orders the items by their encoded bytes so the
/// output does not depend on the iteration order of `iter`.
fn encode_unordered<'a, T: Encode + 'a, E: Encoder + ?Sized>(
    len: usize,
    iter: impl IntoIterator<Item = &'a T>,
    encoder: &mut E,
    plugin: &Plugin,
) -> io::Result<()> {
    let mut items = iter
        .into_iter()
        .map(|item| Ok((crate::postcard::encode(item, plugin)?, item)))
        .collect::<io::Result<Vec<_>>>()?;
    items.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    encode_seq(len, items.into_iter().map(|(_, item)| item), encoder, plugin)
}

impl<T: Encode> Encode for [T] {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        encode_seq(self.len(), self, encoder, plugin)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        encode_seq(self.len(), self, encoder, plugin)
    }
}

impl<T: Encode, S: BuildHasher> Encode for HashSet<T, S> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        encode_unordered(self.len(), self, encoder, plugin)
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        encode_seq(self.len(), self, encoder, plugin)
    }
}

impl<K: Encode, V: Encode, S: BuildHasher> Encode for HashMap<K, V, S> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        // Entries are ordered by key bytes, like sets.
        let mut entries = self
            .iter()
            .map(|entry| Ok((crate::postcard::encode(entry.0, plugin)?, entry)))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        encoder.emit_usize(self.len())?;
        for (_, (key, value)) in entries {
            key.encode(encoder, plugin)?;
            value.encode(encoder, plugin)?;
        }
        Ok(())
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<E: Encoder + ?Sized>(
        &self,
        encoder: &mut E,
        plugin: &Plugin,
    ) -> io::Result<()> {
        encoder.emit_usize(self.len())?;
        for (key, value) in self {
            key.encode(encoder, plugin)?;
            value.encode(encoder, plugin)?;
        }
        Ok(())
    }
}

macro_rules! impl_encode_tuple {
    ($($name:ident),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode<E_: Encoder + ?Sized>(
                &self,
                encoder: &mut E_,
                plugin: &Plugin,
            ) -> io::Result<()> {
                let ($($name,)+) = self;
                $($name.encode(encoder, plugin)?;)+
                Ok(())
            }
        }
    };
}

impl_encode_tuple!(A);
impl_encode_tuple!(A, B);
impl_encode_tuple!(A, B, C);
impl_encode_tuple!(A, B, C, D);
