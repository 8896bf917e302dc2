//! Defines the physical binary layout of a serialized graph.
//!
//! # Layout
//! A stream is a header followed by a body:
//!
//! ```text
//! Header: otherBaseId:u8, objectCount:i32, customTypeCount:u16,
//!         customTypeCount × { hasCompactId:bool, compactId:u32 | name:string }
//! Body:   sequence of { tag:varint, payload }
//! ```
//!
//! The header is produced last: the type table and the object count are only known once the
//! whole graph has been walked, so the writer buffers the body and prepends the header when it
//! finishes.

use std::fmt;

use crate::error::{GraphCodecError, Result};
use crate::io::{ByteReader, ByteWriter};

/// First numeric id available for custom types. Stored as the first header byte so that a
/// reader built with a different tag numbering rejects the stream.
pub const OTHER_BASE: u8 = TypeTag::Other as u8;

/// Size of the fixed part of the header: otherBaseId(1) + objectCount(4) + customTypeCount(2).
pub const HEADER_FIXED_SIZE: usize = 7;

/// Upper bound on the encoded length of a 32-bit varint.
pub const MAX_VARINT_BYTES: usize = 5;

/// Fixed type tags. Custom types are numbered from [`TypeTag::Other`] upwards.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Absent value.
    Null = 0,
    /// `bool`.
    Bool = 1,
    /// `u8`.
    Byte = 2,
    /// `i8`.
    SByte = 3,
    /// `char`.
    Char = 4,
    /// `i16`.
    Int16 = 5,
    /// `u16`.
    UInt16 = 6,
    /// `i32`.
    Int32 = 7,
    /// `u32`.
    UInt32 = 8,
    /// `i64`.
    Int64 = 9,
    /// `u64`.
    UInt64 = 10,
    /// `f32`.
    Single = 11,
    /// `f64`.
    Double = 12,
    /// [`Decimal`](crate::value::Decimal).
    Decimal = 13,
    /// [`DateTime`](crate::value::DateTime).
    DateTime = 14,
    /// `uuid::Uuid`.
    Guid = 15,
    /// `String`.
    String = 16,
    /// Array of individually tagged elements.
    Array = 17,
    /// A type reference.
    Type = 18,
    /// Back-reference to an already encoded object.
    Existing = 19,
    /// Base offset of custom type ids.
    Other = 20,
}

impl TypeTag {
    const ALL: [TypeTag; 20] = [
        Self::Null,
        Self::Bool,
        Self::Byte,
        Self::SByte,
        Self::Char,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Single,
        Self::Double,
        Self::Decimal,
        Self::DateTime,
        Self::Guid,
        Self::String,
        Self::Array,
        Self::Type,
        Self::Existing,
    ];

    /// The numeric id written to the stream.
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Maps a fixed id back to its tag. Returns `None` for custom ids.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Human-readable tag name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool => "Bool",
            Self::Byte => "Byte",
            Self::SByte => "SByte",
            Self::Char => "Char",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Single => "Single",
            Self::Double => "Double",
            Self::Decimal => "Decimal",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::String => "String",
            Self::Array => "Array",
            Self::Type => "Type",
            Self::Existing => "Existing",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded body tag: either a fixed tag or the n-th custom type of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// One of the fixed tags below [`TypeTag::Other`].
    Fixed(TypeTag),
    /// `Other + n`.
    Custom(u32),
}

impl Tag {
    /// Splits a raw tag id into fixed or custom.
    pub fn from_id(id: u32) -> Self {
        match TypeTag::from_id(id) {
            Some(tag) => Self::Fixed(tag),
            None => Self::Custom(id - u32::from(OTHER_BASE)),
        }
    }

    /// The raw id written to the stream.
    pub fn id(self) -> u32 {
        match self {
            Self::Fixed(tag) => tag.id(),
            Self::Custom(n) => u32::from(OTHER_BASE) + n,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(tag) => write!(f, "{tag}"),
            Self::Custom(n) => write!(f, "Other+{n}"),
        }
    }
}

/// One entry of the header's custom type table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeEntry {
    /// Type identified by its registered compact id.
    Compact(u32),
    /// Type identified by its qualified name.
    Named(String),
}

impl TypeEntry {
    fn write_to(&self, out: &mut ByteWriter) -> Result<()> {
        match self {
            Self::Compact(id) => {
                out.write_bool(true);
                out.write_u32(*id);
            }
            Self::Named(name) => {
                out.write_bool(false);
                out.write_str(name)?;
            }
        }
        Ok(())
    }

    fn read_from(input: &mut ByteReader<'_>) -> Result<Self> {
        if input.read_bool()? {
            Ok(Self::Compact(input.read_u32()?))
        } else {
            Ok(Self::Named(input.read_string()?))
        }
    }
}

impl fmt::Display for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact(id) => write!(f, "compact id {id}"),
            Self::Named(name) => write!(f, "`{name}`"),
        }
    }
}

/// The stream header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Base id of custom types. Always [`OTHER_BASE`] for streams written by this crate.
    pub other_base: u8,
    /// Number of distinct reference-type objects in the body.
    pub object_count: i32,
    /// Custom type table in first-use order.
    pub types: Vec<TypeEntry>,
}

impl Header {
    /// Creates a header for the current tag numbering.
    pub fn new(object_count: i32, types: Vec<TypeEntry>) -> Self {
        Self {
            other_base: OTHER_BASE,
            object_count,
            types,
        }
    }

    /// Serializes the header.
    pub fn write_to(&self, out: &mut ByteWriter) -> Result<()> {
        let type_count = u16::try_from(self.types.len()).map_err(|_| {
            GraphCodecError::UnsupportedType(format!(
                "{} custom types exceed the header's type table capacity of {}",
                self.types.len(),
                u16::MAX
            ))
        })?;
        out.write_u8(self.other_base);
        out.write_i32(self.object_count);
        out.write_u16(type_count);
        for entry in &self.types {
            entry.write_to(out)?;
        }
        Ok(())
    }

    /// Parses and validates a header.
    pub fn read_from(input: &mut ByteReader<'_>) -> Result<Self> {
        let other_base = input.read_u8()?;
        if other_base != OTHER_BASE {
            return Err(GraphCodecError::CorruptGraph(format!(
                "custom type base {other_base} does not match {OTHER_BASE}"
            )));
        }
        let object_count = input.read_i32()?;
        if object_count < 0 {
            return Err(GraphCodecError::CorruptGraph(format!(
                "negative object count {object_count}"
            )));
        }
        let type_count = input.read_u16()?;
        let mut types = Vec::with_capacity(usize::from(type_count).min(input.remaining()));
        for _ in 0..type_count {
            types.push(TypeEntry::read_from(input)?);
        }
        tracing::trace!(object_count, type_count, "parsed graph header");
        Ok(Self {
            other_base,
            object_count,
            types,
        })
    }

    /// Encoded size of this header in bytes.
    pub fn encoded_len(&self) -> usize {
        let entries: usize = self
            .types
            .iter()
            .map(|entry| match entry {
                TypeEntry::Compact(_) => 1 + 4,
                TypeEntry::Named(name) => 1 + varint_len(name.len() as u32) + name.len(),
            })
            .sum();
        HEADER_FIXED_SIZE + entries
    }
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_len(mut value: u32) -> usize {
    let mut len = 1;
    while value > 0x7F {
        value >>= 7;
        len += 1;
    }
    len
}
