//! Postcard-style varint wire format.
//!
//! - Unsigned integers wider than a byte use LEB128: seven data bits per byte,
//!   the high bit marks continuation.
//! - Signed integers are zigzag-mapped first so that small negative numbers
//!   stay short.
//! - `u8`, `i8` and `bool` take one byte; floats are fixed little-endian.
//! - Strings and byte slices carry a varint length prefix.

use std::io::{self, Read, Write};

use crate::{Decode, Decoder, Encode, Encoder, Plugin, decode::invalid_data};

macro_rules! varint_codec {
    ($($encode:ident, $read:ident, $ty:ty, $max:expr;)*) => {
        $(
            /// Writes `value` as LEB128 into `buf`, returning the used length.
            #[inline]
            #[allow(clippy::cast_possible_truncation)]
            fn $encode(mut value: $ty, buf: &mut [u8; $max]) -> usize {
                let mut i = 0;
                while value >= 0x80 {
                    buf[i] = (value as u8) | 0x80;
                    value >>= 7;
                    i += 1;
                }
                buf[i] = value as u8;
                i + 1
            }

            impl<R: Read> PostcardDecoder<R> {
                fn $read(&mut self) -> io::Result<$ty> {
                    let mut result: $ty = 0;
                    let mut shift = 0u32;

                    loop {
                        let byte = self.read_byte()?;

                        if shift >= <$ty>::BITS {
                            return Err(invalid_data(concat!(
                                "varint too long for ",
                                stringify!($ty)
                            )));
                        }

                        result |= <$ty>::from(byte & 0x7F) << shift;

                        if byte & 0x80 == 0 {
                            return Ok(result);
                        }

                        shift += 7;
                    }
                }
            }
        )*
    };
}

varint_codec! {
    encode_varint_u16, read_varint_u16, u16, 3;
    encode_varint_u32, read_varint_u32, u32, 5;
    encode_varint_u64, read_varint_u64, u64, 10;
    encode_varint_u128, read_varint_u128, u128, 19;
}

macro_rules! zigzag {
    ($($encode:ident, $decode:ident, $signed:ty, $unsigned:ty;)*) => {
        $(
            #[inline]
            #[allow(clippy::cast_sign_loss)]
            const fn $encode(value: $signed) -> $unsigned {
                ((value << 1) ^ (value >> (<$signed>::BITS - 1))) as $unsigned
            }

            #[inline]
            #[allow(clippy::cast_possible_wrap)]
            const fn $decode(value: $unsigned) -> $signed {
                ((value >> 1) as $signed) ^ (-((value & 1) as $signed))
            }
        )*
    };
}

zigzag! {
    zigzag_encode_i16, zigzag_decode_i16, i16, u16;
    zigzag_encode_i32, zigzag_decode_i32, i32, u32;
    zigzag_encode_i64, zigzag_decode_i64, i64, u64;
    zigzag_encode_i128, zigzag_decode_i128, i128, u128;
}

/// An encoder writing the postcard format into any [`Write`].
///
/// `&mut Vec<u8>` is the usual target: it lets several values be appended
/// into one reusable buffer.
#[derive(Debug)]
pub struct PostcardEncoder<W> {
    writer: W,
}

impl<W> PostcardEncoder<W> {
    /// Creates an encoder writing into `writer`.
    #[must_use]
    pub const fn new(writer: W) -> Self { Self { writer } }

    /// Consumes the encoder, returning the writer.
    #[must_use]
    pub fn into_inner(self) -> W { self.writer }
}

impl<W: Write> Encoder for PostcardEncoder<W> {
    fn emit_u8(&mut self, v: u8) -> io::Result<()> {
        self.writer.write_all(&[v])
    }

    fn emit_u16(&mut self, v: u16) -> io::Result<()> {
        let mut buf = [0u8; 3];
        let len = encode_varint_u16(v, &mut buf);
        self.writer.write_all(&buf[..len])
    }

    fn emit_u32(&mut self, v: u32) -> io::Result<()> {
        let mut buf = [0u8; 5];
        let len = encode_varint_u32(v, &mut buf);
        self.writer.write_all(&buf[..len])
    }

    fn emit_u64(&mut self, v: u64) -> io::Result<()> {
        let mut buf = [0u8; 10];
        let len = encode_varint_u64(v, &mut buf);
        self.writer.write_all(&buf[..len])
    }

    fn emit_u128(&mut self, v: u128) -> io::Result<()> {
        let mut buf = [0u8; 19];
        let len = encode_varint_u128(v, &mut buf);
        self.writer.write_all(&buf[..len])
    }

    fn emit_i16(&mut self, v: i16) -> io::Result<()> {
        self.emit_u16(zigzag_encode_i16(v))
    }

    fn emit_i32(&mut self, v: i32) -> io::Result<()> {
        self.emit_u32(zigzag_encode_i32(v))
    }

    fn emit_i64(&mut self, v: i64) -> io::Result<()> {
        self.emit_u64(zigzag_encode_i64(v))
    }

    fn emit_i128(&mut self, v: i128) -> io::Result<()> {
        self.emit_u128(zigzag_encode_i128(v))
    }

    fn emit_raw_bytes(&mut self, s: &[u8]) -> io::Result<()> {
        self.writer.write_all(s)
    }

    fn emit_f32(&mut self, v: f32) -> io::Result<()> {
        self.writer.write_all(&v.to_le_bytes())
    }

    fn emit_f64(&mut self, v: f64) -> io::Result<()> {
        self.writer.write_all(&v.to_le_bytes())
    }
}

/// A decoder reading the postcard format from any [`Read`].
#[derive(Debug)]
pub struct PostcardDecoder<R> {
    reader: R,
}

impl<R> PostcardDecoder<R> {
    /// Creates a decoder reading from `reader`.
    #[must_use]
    pub const fn new(reader: R) -> Self { Self { reader } }

    /// Returns a reference to the reader.
    #[must_use]
    pub const fn get_ref(&self) -> &R { &self.reader }

    /// Consumes the decoder, returning the reader.
    #[must_use]
    pub fn into_inner(self) -> R { self.reader }
}

impl PostcardDecoder<&[u8]> {
    /// Returns `true` once every input byte has been consumed.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool { self.reader.is_empty() }
}

impl<R: Read> PostcardDecoder<R> {
    fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read> Decoder for PostcardDecoder<R> {
    fn read_u8(&mut self) -> io::Result<u8> { self.read_byte() }

    fn read_u16(&mut self) -> io::Result<u16> { self.read_varint_u16() }

    fn read_u32(&mut self) -> io::Result<u32> { self.read_varint_u32() }

    fn read_u64(&mut self) -> io::Result<u64> { self.read_varint_u64() }

    fn read_u128(&mut self) -> io::Result<u128> { self.read_varint_u128() }

    fn read_i16(&mut self) -> io::Result<i16> {
        Ok(zigzag_decode_i16(self.read_varint_u16()?))
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        Ok(zigzag_decode_i32(self.read_varint_u32()?))
    }

    fn read_i64(&mut self) -> io::Result<i64> {
        Ok(zigzag_decode_i64(self.read_varint_u64()?))
    }

    fn read_i128(&mut self) -> io::Result<i128> {
        Ok(zigzag_decode_i128(self.read_varint_u128()?))
    }

    fn read_raw_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;

        if read < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes, found {read}"),
            ));
        }

        Ok(buf)
    }

    fn read_f32(&mut self) -> io::Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    fn read_f64(&mut self) -> io::Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }
}

/// Encodes `value` into a fresh byte vector.
///
/// # Errors
///
/// Propagates any error reported by the value's [`Encode`] implementation.
pub fn encode<T: Encode + ?Sized>(
    value: &T,
    plugin: &Plugin,
) -> io::Result<Vec<u8>> {
    let mut encoder = PostcardEncoder::new(Vec::new());
    value.encode(&mut encoder, plugin)?;
    Ok(encoder.into_inner())
}

/// Decodes a value that must span `bytes` exactly.
///
/// # Errors
///
/// Fails on malformed or truncated input, and with
/// [`io::ErrorKind::InvalidData`] if bytes remain after the value.
pub fn decode<T: Decode>(bytes: &[u8], plugin: &Plugin) -> io::Result<T> {
    let mut decoder = PostcardDecoder::new(bytes);
    let value = T::decode(&mut decoder, plugin)?;

    if !decoder.is_exhausted() {
        return Err(invalid_data(format!(
            "{} trailing bytes after decoded value",
            decoder.get_ref().len()
        )));
    }

    Ok(value)
}

#[cfg(test)]
mod test;
