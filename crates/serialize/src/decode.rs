//! Decoding traits and implementations.
//!
//! [`Decoder`] is the source a wire format implements. [`Decode`] is what
//! value types implement to rebuild themselves from decoder primitives.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    hash::{BuildHasher, Hash},
    io,
    sync::Arc,
};

use crate::plugin::Plugin;

/// Upper bound on how many elements a decoder pre-allocates for a sequence.
///
/// Length prefixes come from untrusted bytes; a corrupted prefix must fail
/// with an end-of-input error rather than an allocation failure.
const MAX_PREALLOCATION: usize = 4096;

/// Builds the error returned for structurally invalid input.
pub fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// A source of primitive values in some binary format.
pub trait Decoder {
    /// Reads a single unsigned byte.
    fn read_u8(&mut self) -> io::Result<u8>;

    /// Reads a 16-bit unsigned integer.
    fn read_u16(&mut self) -> io::Result<u16>;

    /// Reads a 32-bit unsigned integer.
    fn read_u32(&mut self) -> io::Result<u32>;

    /// Reads a 64-bit unsigned integer.
    fn read_u64(&mut self) -> io::Result<u64>;

    /// Reads a 128-bit unsigned integer.
    fn read_u128(&mut self) -> io::Result<u128>;

    /// Reads a 16-bit signed integer.
    fn read_i16(&mut self) -> io::Result<i16>;

    /// Reads a 32-bit signed integer.
    fn read_i32(&mut self) -> io::Result<i32>;

    /// Reads a 64-bit signed integer.
    fn read_i64(&mut self) -> io::Result<i64>;

    /// Reads a 128-bit signed integer.
    fn read_i128(&mut self) -> io::Result<i128>;

    /// Reads exactly `len` bytes.
    ///
    /// Implementations must not trust `len` for allocation: a length larger
    /// than the remaining input is an [`io::ErrorKind::UnexpectedEof`].
    fn read_raw_bytes(&mut self, len: usize) -> io::Result<Vec<u8>>;

    /// Reads a single signed byte.
    #[allow(clippy::cast_possible_wrap)]
    fn read_i8(&mut self) -> io::Result<i8> { Ok(self.read_u8()? as i8) }

    /// Reads a platform-sized unsigned integer stored as 64 bits.
    fn read_usize(&mut self) -> io::Result<usize> {
        let value = self.read_u64()?;
        usize::try_from(value)
            .map_err(|_| invalid_data("usize out of range for this platform"))
    }

    /// Reads a platform-sized signed integer stored as 64 bits.
    fn read_isize(&mut self) -> io::Result<isize> {
        let value = self.read_i64()?;
        isize::try_from(value)
            .map_err(|_| invalid_data("isize out of range for this platform"))
    }

    /// Reads a boolean. Any byte other than `0` or `1` is invalid.
    fn read_bool(&mut self) -> io::Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(invalid_data(format!("invalid bool byte {other}"))),
        }
    }

    /// Reads a character from its Unicode scalar value.
    fn read_char(&mut self) -> io::Result<char> {
        let code = self.read_u32()?;
        char::from_u32(code).ok_or_else(|| {
            invalid_data(format!("invalid Unicode scalar value: {code}"))
        })
    }

    /// Reads a 32-bit float from its IEEE 754 bits.
    fn read_f32(&mut self) -> io::Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads a 64-bit float from its IEEE 754 bits.
    fn read_f64(&mut self) -> io::Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Reads a length-prefixed byte vector.
    fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_usize()?;
        self.read_raw_bytes(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    fn read_str(&mut self) -> io::Result<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|err| invalid_data(format!("invalid UTF-8: {err}")))
    }

    /// Decodes a whole value with this decoder.
    fn decode<T: Decode>(&mut self, plugin: &Plugin) -> io::Result<T> {
        T::decode(self, plugin)
    }
}

/// A type that can rebuild itself from a [`Decoder`].
pub trait Decode: Sized {
    /// Decodes a value of this type from `decoder`.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] for structurally invalid input
    /// and [`io::ErrorKind::UnexpectedEof`] for truncated input.
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self>;
}

macro_rules! impl_decode_primitive {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl Decode for $ty {
                fn decode<D: Decoder + ?Sized>(
                    decoder: &mut D,
                    _: &Plugin,
                ) -> io::Result<Self> {
                    decoder.$method()
                }
            }
        )*
    };
}

impl_decode_primitive!(
    u8 => read_u8,
    u16 => read_u16,
    u32 => read_u32,
    u64 => read_u64,
    u128 => read_u128,
    usize => read_usize,
    i8 => read_i8,
    i16 => read_i16,
    i32 => read_i32,
    i64 => read_i64,
    i128 => read_i128,
    isize => read_isize,
    bool => read_bool,
    char => read_char,
    f32 => read_f32,
    f64 => read_f64,
    String => read_str,
);

impl Decode for () {
    fn decode<D: Decoder + ?Sized>(_: &mut D, _: &Plugin) -> io::Result<Self> {
        Ok(())
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        T::decode(decoder, plugin).map(Box::new)
    }
}

impl<T: Decode> Decode for Arc<T> {
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        T::decode(decoder, plugin).map(Arc::new)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        match decoder.read_u8()? {
            0 => Ok(None),
            1 => T::decode(decoder, plugin).map(Some),
            tag => Err(invalid_data(format!("invalid Option tag {tag}"))),
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        let len = decoder.read_usize()?;
        let mut vec = Self::with_capacity(len.min(MAX_PREALLOCATION));
        for _ in 0..len {
            vec.push(T::decode(decoder, plugin)?);
        }
        Ok(vec)
    }
}

impl<T: Decode + Eq + Hash, S: BuildHasher + Default> Decode
    for HashSet<T, S>
{
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        let len = decoder.read_usize()?;
        let mut set = Self::with_capacity_and_hasher(
            len.min(MAX_PREALLOCATION),
            S::default(),
        );
        for _ in 0..len {
            set.insert(T::decode(decoder, plugin)?);
        }
        Ok(set)
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        let len = decoder.read_usize()?;
        (0..len).map(|_| T::decode(decoder, plugin)).collect()
    }
}

impl<K: Decode + Eq + Hash, V: Decode, S: BuildHasher + Default> Decode
    for HashMap<K, V, S>
{
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        let len = decoder.read_usize()?;
        let mut map = Self::with_capacity_and_hasher(
            len.min(MAX_PREALLOCATION),
            S::default(),
        );
        for _ in 0..len {
            let key = K::decode(decoder, plugin)?;
            let value = V::decode(decoder, plugin)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode<D: Decoder + ?Sized>(
        decoder: &mut D,
        plugin: &Plugin,
    ) -> io::Result<Self> {
        let len = decoder.read_usize()?;
        (0..len)
            .map(|_| {
                Ok((K::decode(decoder, plugin)?, V::decode(decoder, plugin)?))
            })
            .collect()
    }
}

macro_rules! impl_decode_tuple {
    ($($name:ident),+) => {
        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode<D_: Decoder + ?Sized>(
                decoder: &mut D_,
                plugin: &Plugin,
            ) -> io::Result<Self> {
                Ok(($($name::decode(decoder, plugin)?,)+))
            }
        }
    };
}

impl_decode_tuple!(A);
impl_decode_tuple!(A, B);
impl_decode_tuple!(A, B, C);
impl_decode_tuple!(A, B, C, D);
