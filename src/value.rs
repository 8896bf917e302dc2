//! The dynamic value model.
//!
//! [`Value`] is what the generic tagged entry point reads and writes: one variant per fixed
//! [`TypeTag`], plus [`Value::Object`] for references into an
//! [`ObjectGraph`](crate::graph::ObjectGraph). Typed struct fields go through
//! [`Field`](crate::field::Field) instead and never materialize a `Value`.

use std::fmt;

use uuid::Uuid;

use crate::error::{GraphCodecError, Result};
use crate::format::TypeTag;
use crate::graph::ObjectId;
use crate::reflect::TypeHandle;

/// A tagged value as it appears in the stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// `bool`.
    Bool(bool),
    /// `u8`.
    Byte(u8),
    /// `i8`.
    SByte(i8),
    /// `char`.
    Char(char),
    /// `i16`.
    Int16(i16),
    /// `u16`.
    UInt16(u16),
    /// `i32`.
    Int32(i32),
    /// `u32`.
    UInt32(u32),
    /// `i64`.
    Int64(i64),
    /// `u64`.
    UInt64(u64),
    /// `f32`.
    Single(f32),
    /// `f64`.
    Double(f64),
    /// 96-bit scaled decimal.
    Decimal(Decimal),
    /// Tick-based timestamp.
    DateTime(DateTime),
    /// GUID.
    Guid(Uuid),
    /// UTF-8 string.
    String(String),
    /// Array of individually tagged values.
    Array(Array),
    /// A type reference.
    Type(TypeRef),
    /// Reference to a custom object in the arena.
    Object(ObjectId),
}

impl Value {
    /// The fixed tag this value is written with, or `None` for object references, whose tag is
    /// the object's custom type id (or `Existing`).
    pub fn fixed_tag(&self) -> Option<TypeTag> {
        Some(match self {
            Self::Null => TypeTag::Null,
            Self::Bool(_) => TypeTag::Bool,
            Self::Byte(_) => TypeTag::Byte,
            Self::SByte(_) => TypeTag::SByte,
            Self::Char(_) => TypeTag::Char,
            Self::Int16(_) => TypeTag::Int16,
            Self::UInt16(_) => TypeTag::UInt16,
            Self::Int32(_) => TypeTag::Int32,
            Self::UInt32(_) => TypeTag::UInt32,
            Self::Int64(_) => TypeTag::Int64,
            Self::UInt64(_) => TypeTag::UInt64,
            Self::Single(_) => TypeTag::Single,
            Self::Double(_) => TypeTag::Double,
            Self::Decimal(_) => TypeTag::Decimal,
            Self::DateTime(_) => TypeTag::DateTime,
            Self::Guid(_) => TypeTag::Guid,
            Self::String(_) => TypeTag::String,
            Self::Array(_) => TypeTag::Array,
            Self::Type(_) => TypeTag::Type,
            Self::Object(_) => return None,
        })
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The referenced object, if this is an object reference.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The array payload, if this is an array.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    /// The payload widened to `i64`, for any signed or unsigned integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(i64::from(v)),
            Self::SByte(v) => Some(i64::from(v)),
            Self::Int16(v) => Some(i64::from(v)),
            Self::UInt16(v) => Some(i64::from(v)),
            Self::Int32(v) => Some(i64::from(v)),
            Self::UInt32(v) => Some(i64::from(v)),
            Self::Int64(v) => Some(v),
            Self::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }
}

macro_rules! impl_value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_value_from!(
    bool => Bool,
    u8 => Byte,
    i8 => SByte,
    char => Char,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Single,
    f64 => Double,
    Decimal => Decimal,
    DateTime => DateTime,
    Uuid => Guid,
    String => String,
    Array => Array,
    TypeRef => Type,
    ObjectId => Object,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// An array value: a declared element type and individually tagged items.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// Element type written after the length.
    pub element: TypeRef,
    /// The items. Their tags need not match `element` exactly (`Null` items, subtypes).
    pub items: Vec<Value>,
}

impl Array {
    /// Creates an array with the given element type.
    pub fn new(element: TypeRef, items: Vec<Value>) -> Self {
        Self { element, items }
    }

    /// Creates an array of strings.
    pub fn of_strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            TypeRef::Fixed(TypeTag::String),
            items.into_iter().map(|s| Value::String(s.into())).collect(),
        )
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the array has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A reference to a type, as carried by `Type` values and array element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// Untyped (`object`); written as id 0.
    Any,
    /// A fixed value tag. `Null`, `Existing` and `Other` are not valid here.
    Fixed(TypeTag),
    /// A custom type.
    Custom(TypeHandle),
}

impl TypeRef {
    /// Reference to a custom type.
    pub fn of<T: crate::reflect::Reflect>() -> Self {
        Self::Custom(TypeHandle::of::<T>())
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Fixed(tag) => write!(f, "{tag}"),
            Self::Custom(handle) => f.write_str(handle.name()),
        }
    }
}

/// 96-bit scaled decimal: `(-1)^sign × magnitude / 10^scale`, scale in `0..=28`.
///
/// Stored in the same four-word layout it is written with, so round trips are bit-exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    lo: u32,
    mid: u32,
    hi: u32,
    flags: u32,
}

impl Decimal {
    /// Largest supported scale.
    pub const MAX_SCALE: u32 = 28;

    const SCALE_SHIFT: u32 = 16;
    const SCALE_MASK: u32 = 0x00FF_0000;
    const SIGN_MASK: u32 = 0x8000_0000;
    const MAX_MAGNITUDE: u128 = (1u128 << 96) - 1;

    /// Builds a decimal from a signed mantissa and a scale.
    ///
    /// Returns `None` if the magnitude does not fit in 96 bits or the scale exceeds 28.
    pub fn new(mantissa: i128, scale: u32) -> Option<Self> {
        let magnitude = mantissa.unsigned_abs();
        if magnitude > Self::MAX_MAGNITUDE || scale > Self::MAX_SCALE {
            return None;
        }
        let mut flags = scale << Self::SCALE_SHIFT;
        if mantissa < 0 {
            flags |= Self::SIGN_MASK;
        }
        Some(Self {
            lo: magnitude as u32,
            mid: (magnitude >> 32) as u32,
            hi: (magnitude >> 64) as u32,
            flags,
        })
    }

    /// Rebuilds a decimal from its wire words, rejecting reserved bits and oversized scales.
    pub fn from_words(words: [u32; 4]) -> Result<Self> {
        let [lo, mid, hi, flags] = words;
        let scale = (flags & Self::SCALE_MASK) >> Self::SCALE_SHIFT;
        if flags & !(Self::SCALE_MASK | Self::SIGN_MASK) != 0 || scale > Self::MAX_SCALE {
            return Err(GraphCodecError::CorruptGraph(format!(
                "invalid decimal flags {flags:#010x}"
            )));
        }
        Ok(Self { lo, mid, hi, flags })
    }

    /// The wire words `lo, mid, hi, flags`.
    pub fn to_words(self) -> [u32; 4] {
        [self.lo, self.mid, self.hi, self.flags]
    }

    /// Signed mantissa.
    pub fn mantissa(self) -> i128 {
        let magnitude = (u128::from(self.hi) << 64) | (u128::from(self.mid) << 32) | u128::from(self.lo);
        // 96-bit magnitudes always fit in i128.
        let magnitude = magnitude as i128;
        if self.is_sign_negative() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Number of fractional digits.
    pub fn scale(self) -> u32 {
        (self.flags & Self::SCALE_MASK) >> Self::SCALE_SHIFT
    }

    /// Returns true if the sign bit is set (including negative zero).
    pub fn is_sign_negative(self) -> bool {
        self.flags & Self::SIGN_MASK != 0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        let magnitude = u128::from(value.unsigned_abs());
        Self {
            lo: magnitude as u32,
            mid: (magnitude >> 32) as u32,
            hi: 0,
            flags: if value < 0 { Self::SIGN_MASK } else { 0 },
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa().unsigned_abs().to_string();
        let scale = self.scale() as usize;
        let sign = if self.is_sign_negative() { "-" } else { "" };
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

/// Timestamp as a signed count of 100-nanosecond ticks since 0001-01-01T00:00:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DateTime {
    ticks: i64,
}

impl DateTime {
    /// Ticks per second.
    pub const TICKS_PER_SECOND: i64 = 10_000_000;

    /// Seconds between 0001-01-01 and the Unix epoch.
    const UNIX_EPOCH_SECONDS: i64 = 62_135_596_800;

    /// Wraps a raw tick count.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    /// The raw tick count.
    pub const fn ticks(self) -> i64 {
        self.ticks
    }

    /// Converts a chrono UTC timestamp, truncating to tick precision.
    ///
    /// Returns `None` if the instant lies outside the representable tick range.
    pub fn from_utc(value: chrono::DateTime<chrono::Utc>) -> Option<Self> {
        let seconds = value.timestamp().checked_add(Self::UNIX_EPOCH_SECONDS)?;
        let sub_ticks = i64::from(value.timestamp_subsec_nanos() / 100);
        let ticks = seconds
            .checked_mul(Self::TICKS_PER_SECOND)?
            .checked_add(sub_ticks)?;
        Some(Self { ticks })
    }

    /// Converts to a chrono UTC timestamp.
    pub fn to_utc(self) -> Option<chrono::DateTime<chrono::Utc>> {
        use chrono::TimeZone;

        let seconds = self.ticks.div_euclid(Self::TICKS_PER_SECOND) - Self::UNIX_EPOCH_SECONDS;
        let nanos = (self.ticks.rem_euclid(Self::TICKS_PER_SECOND) * 100) as u32;
        chrono::Utc.timestamp_opt(seconds, nanos).single()
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_utc() {
            Some(utc) => write!(f, "{}", utc.to_rfc3339()),
            None => write!(f, "{} ticks", self.ticks),
        }
    }
}
