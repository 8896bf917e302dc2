//! Low-level byte I/O for the wire format.
//!
//! [`ByteWriter`] appends little-endian scalars to an in-memory buffer. The body of a graph
//! has to be buffered anyway, because the header is only known once the whole graph has been
//! walked. [`ByteReader`] is the bounds-checked cursor used on the read side. Every read that
//! runs past the end reports [`GraphCodecError::UnexpectedEndOfStream`].

use uuid::Uuid;

use crate::error::{GraphCodecError, Result};
use crate::format::MAX_VARINT_BYTES;
use crate::value::{DateTime, Decimal};

/// Growable little-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

macro_rules! impl_fixed_writes {
    ($($name:ident: $t:ty),* $(,)?) => {
        $(
            #[doc = concat!("Appends a little-endian `", stringify!($t), "`.")]
            pub fn $name(&mut self, value: $t) {
                self.buf.extend_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    impl_fixed_writes!(
        write_u8: u8,
        write_i8: i8,
        write_u16: u16,
        write_i16: i16,
        write_u32: u32,
        write_i32: i32,
        write_u64: u64,
        write_i64: i64,
        write_f32: f32,
        write_f64: f64,
    );

    /// Appends a boolean as a single `0`/`1` byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Appends a char as its 4-byte Unicode scalar value.
    pub fn write_char(&mut self, value: char) {
        self.write_u32(u32::from(value));
    }

    /// Appends a 7-bit variable-length integer.
    ///
    /// Low groups come first; every byte except the last carries the `0x80` continuation bit.
    pub fn write_varint(&mut self, mut value: u32) {
        while value > 0x7F {
            self.buf.push(((value & 0x7F) | 0x80) as u8);
            value >>= 7;
        }
        self.buf.push((value & 0x7F) as u8);
    }

    /// Appends a string as a varint byte length followed by its UTF-8 bytes.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| {
            GraphCodecError::UnsupportedType(format!(
                "string of {} bytes exceeds the encodable length",
                value.len()
            ))
        })?;
        self.write_varint(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Appends a GUID in its 16-byte mixed-endian layout.
    pub fn write_guid(&mut self, value: &Uuid) {
        self.buf.extend_from_slice(&value.to_bytes_le());
    }

    /// Appends a decimal as four little-endian words: `lo, mid, hi, flags`.
    pub fn write_decimal(&mut self, value: &Decimal) {
        for word in value.to_words() {
            self.write_u32(word);
        }
    }

    /// Appends a timestamp as its signed 64-bit tick count.
    pub fn write_datetime(&mut self, value: &DateTime) {
        self.write_i64(value.ticks());
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer, returning its buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! impl_fixed_reads {
    ($($name:ident: $t:ty),* $(,)?) => {
        $(
            #[doc = concat!("Reads a little-endian `", stringify!($t), "`.")]
            pub fn $name(&mut self) -> Result<$t> {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(self.take(std::mem::size_of::<$t>())?);
                Ok(<$t>::from_le_bytes(raw))
            }
        )*
    };
}

impl<'a> ByteReader<'a> {
    /// Creates a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Consumes exactly `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(GraphCodecError::UnexpectedEndOfStream {
                needed: len,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    impl_fixed_reads!(
        read_u8: u8,
        read_i8: i8,
        read_u16: u16,
        read_i16: i16,
        read_u32: u32,
        read_i32: i32,
        read_u64: u64,
        read_i64: i64,
        read_f32: f32,
        read_f64: f64,
    );

    /// Reads a boolean byte. Anything other than `0` or `1` is corrupt.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(GraphCodecError::CorruptGraph(format!(
                "invalid boolean byte {other:#04x}"
            ))),
        }
    }

    /// Reads a 4-byte Unicode scalar value.
    pub fn read_char(&mut self) -> Result<char> {
        let raw = self.read_u32()?;
        char::from_u32(raw).ok_or_else(|| {
            GraphCodecError::CorruptGraph(format!("invalid unicode scalar value {raw:#x}"))
        })
    }

    /// Reads a 7-bit variable-length integer of at most five groups.
    pub fn read_varint(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        for group in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            let bits = u32::from(byte & 0x7F);
            let shift = group * 7;
            if shift == 28 && bits > 0x0F {
                return Err(GraphCodecError::CorruptGraph(
                    "varint overflows 32 bits".into(),
                ));
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(GraphCodecError::CorruptGraph(format!(
            "varint longer than {MAX_VARINT_BYTES} bytes"
        )))
    }

    /// Reads a varint length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| GraphCodecError::CorruptGraph(format!("string is not UTF-8: {e}")))
    }

    /// Reads a 16-byte mixed-endian GUID.
    pub fn read_guid(&mut self) -> Result<Uuid> {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(self.take(16)?);
        Ok(Uuid::from_bytes_le(raw))
    }

    /// Reads a 16-byte decimal, validating its scale and reserved bits.
    pub fn read_decimal(&mut self) -> Result<Decimal> {
        let lo = self.read_u32()?;
        let mid = self.read_u32()?;
        let hi = self.read_u32()?;
        let flags = self.read_u32()?;
        Decimal::from_words([lo, mid, hi, flags])
    }

    /// Reads a timestamp tick count.
    pub fn read_datetime(&mut self) -> Result<DateTime> {
        Ok(DateTime::from_ticks(self.read_i64()?))
    }

    /// Reads a signed 32-bit length or count and rejects negative values.
    pub fn read_len(&mut self, what: &str) -> Result<usize> {
        let raw = self.read_i32()?;
        usize::try_from(raw)
            .map_err(|_| GraphCodecError::CorruptGraph(format!("negative {what} {raw}")))
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
