//! libolm-compatible binary pickle codec.
//!
//! Every persisted entity is a concatenation of fixed-width fields:
//!
//! - `u32`: 4 bytes, big-endian
//! - `u8`: 1 byte
//! - `bool`: 1 byte, `0x00` is false and anything else is true
//! - byte arrays: raw, no length prefix (lengths are implied by the layout)
//!
//! Encoding is two-phase. [`Pickle::pickle_len`] predicts the exact size from
//! the value alone, then [`Pickle::pickle`] writes into a buffer of that size.
//! [`encode`] ties the two together and treats a disagreement between them as
//! a bug in the `Pickle` implementation, not as bad input.

use crate::errors::{ProtocolError, Result};

/// Encoded size of a `u32` field.
pub const U32_LEN: usize = 4;

/// Encoded size of a `u8` field.
pub const U8_LEN: usize = 1;

/// Encoded size of a `bool` field.
pub const BOOL_LEN: usize = 1;

/// A value with a deterministic libolm binary layout.
pub trait Pickle {
    /// Exact number of bytes [`Self::pickle`] writes.
    fn pickle_len(&self) -> usize;

    /// Write the encoding at the writer's current position.
    fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()>;
}

/// A value that can be read back from its libolm binary layout.
pub trait Unpickle: Sized {
    /// Read one value, advancing the reader past it.
    fn unpickle(reader: &mut PickleReader<'_>) -> Result<Self>;
}

/// Encode a value into a freshly allocated buffer of its predicted length.
///
/// # Panics
///
/// Panics if the value writes a different number of bytes than its
/// `pickle_len` predicted. The size is a pure function of the value, so a
/// mismatch means the implementation itself is broken.
pub fn encode<T: Pickle + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let predicted = value.pickle_len();
    let mut buffer = vec![0u8; predicted];

    let mut writer = PickleWriter::new(&mut buffer);
    value.pickle(&mut writer)?;
    let written = writer.written();

    assert_eq!(written, predicted, "invariant: pickle wrote {written} bytes, predicted {predicted}");

    Ok(buffer)
}

/// Cursor writing fixed-width fields into a caller-provided buffer.
#[derive(Debug)]
pub struct PickleWriter<'a> {
    target: &'a mut [u8],
    pos: usize,
}

impl<'a> PickleWriter<'a> {
    /// Start writing at the beginning of `target`.
    pub fn new(target: &'a mut [u8]) -> Self {
        Self { target, pos: 0 }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.pos
    }

    /// Fail with `ValueTooShort` unless `needed` more bytes fit.
    pub fn reserve(&self, needed: usize) -> Result<()> {
        let available = self.target.len() - self.pos;
        if needed > available {
            return Err(ProtocolError::ValueTooShort { needed, available });
        }
        Ok(())
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.target[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Write a big-endian `u32`.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    /// Write a boolean as `0x01` / `0x00`.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }
}

/// Cursor reading fixed-width fields from an input slice.
#[derive(Debug, Clone)]
pub struct PickleReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> PickleReader<'a> {
    /// Start reading at the beginning of `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    /// Borrow the next `len` bytes.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if len > available {
            return Err(ProtocolError::BufferTooShort { needed: len, available });
        }
        let slice = &self.input[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a fixed-size byte array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_slice(N)?);
        Ok(array)
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array::<U32_LEN>().map(u32::from_be_bytes)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_array::<U8_LEN>().map(|[byte]| byte)
    }

    /// Read a boolean; any non-zero byte is true.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|byte| byte != 0)
    }
}

impl Pickle for u32 {
    fn pickle_len(&self) -> usize {
        U32_LEN
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
        writer.write_u32(*self)
    }
}

impl Unpickle for u32 {
    fn unpickle(reader: &mut PickleReader<'_>) -> Result<Self> {
        reader.read_u32()
    }
}

impl Pickle for bool {
    fn pickle_len(&self) -> usize {
        BOOL_LEN
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
        writer.write_bool(*self)
    }
}

impl Unpickle for bool {
    fn unpickle(reader: &mut PickleReader<'_>) -> Result<Self> {
        reader.read_bool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        counter: u32,
        flag: bool,
    }

    impl Pickle for Pair {
        fn pickle_len(&self) -> usize {
            self.counter.pickle_len() + self.flag.pickle_len()
        }

        fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
            self.counter.pickle(writer)?;
            self.flag.pickle(writer)
        }
    }

    struct Liar;

    impl Pickle for Liar {
        fn pickle_len(&self) -> usize {
            8
        }

        fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
            writer.write_u32(1)
        }
    }

    #[test]
    fn u32_is_big_endian() {
        let bytes = encode(&0x0102_0304u32).unwrap();
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn encode_composite_layout() {
        let bytes = encode(&Pair { counter: 7, flag: true }).unwrap();
        assert_eq!(hex::encode(bytes), "0000000701");
    }

    #[test]
    #[should_panic(expected = "invariant")]
    fn length_mismatch_is_fatal() {
        let _ = encode(&Liar);
    }

    #[test]
    fn writer_rejects_short_target() {
        let mut target = [0u8; 3];
        let mut writer = PickleWriter::new(&mut target);
        let result = writer.write_u32(1);
        assert_eq!(result, Err(ProtocolError::ValueTooShort { needed: 4, available: 3 }));
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn reader_rejects_short_input() {
        let mut reader = PickleReader::new(&[0x00, 0x01]);
        assert_eq!(
            reader.read_u32(),
            Err(ProtocolError::BufferTooShort { needed: 4, available: 2 })
        );
    }

    #[test]
    fn reader_tracks_position() {
        let input = [0x00, 0x00, 0x00, 0x2A, 0x02, 0xAA, 0xBB];
        let mut reader = PickleReader::new(&input);

        assert_eq!(reader.read_u32().unwrap(), 42);
        assert!(reader.read_bool().unwrap(), "non-zero bytes decode as true");
        assert_eq!(reader.read_array::<2>().unwrap(), [0xAA, 0xBB]);
        assert_eq!(reader.position(), 7);
        assert_eq!(reader.remaining(), 0);
    }
}
