//! Typed field coders.
//!
//! [`Field`] is how derived accessors read and write struct fields. Every field is written
//! through the same tagged entry point as a root value, so a field of a custom reference type
//! recurses into the graph codec and may produce an `Existing` back-reference.
//!
//! Reading is strict: a tag that does not match the field's type is a corrupt graph. Only
//! `Option<T>` accepts `Null`.

use uuid::Uuid;

use crate::error::{GraphCodecError, Result};
use crate::format::{Tag, TypeTag};
use crate::graph::ObjectId;
use crate::reader::GraphReader;
use crate::value::{DateTime, Decimal, TypeRef, Value};
use crate::writer::GraphWriter;

/// A type that can appear as a field of a persistent struct.
pub trait Field: Sized {
    /// Type written as the element type when this is an array element.
    fn type_ref() -> TypeRef;

    /// Writes the tag and payload.
    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()>;

    /// Reads the payload after `tag` has been consumed.
    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self>;

    /// Reads a tag, then the payload.
    fn read_field(reader: &mut GraphReader<'_>) -> Result<Self> {
        let tag = reader.read_tag()?;
        Self::read_tagged(tag, reader)
    }
}

macro_rules! impl_scalar_field {
    ($($t:ty => $tag:ident, $write:ident, $read:ident;)*) => {
        $(
            impl Field for $t {
                fn type_ref() -> TypeRef {
                    TypeRef::Fixed(TypeTag::$tag)
                }

                fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
                    writer.write_tag(Tag::Fixed(TypeTag::$tag));
                    writer.bytes().$write(*self);
                    Ok(())
                }

                fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
                    reader.expect_fixed(tag, TypeTag::$tag)?;
                    reader.bytes().$read()
                }
            }
        )*
    };
}

impl_scalar_field! {
    bool => Bool, write_bool, read_bool;
    u8 => Byte, write_u8, read_u8;
    i8 => SByte, write_i8, read_i8;
    char => Char, write_char, read_char;
    i16 => Int16, write_i16, read_i16;
    u16 => UInt16, write_u16, read_u16;
    i32 => Int32, write_i32, read_i32;
    u32 => UInt32, write_u32, read_u32;
    i64 => Int64, write_i64, read_i64;
    u64 => UInt64, write_u64, read_u64;
    f32 => Single, write_f32, read_f32;
    f64 => Double, write_f64, read_f64;
}

impl Field for Decimal {
    fn type_ref() -> TypeRef {
        TypeRef::Fixed(TypeTag::Decimal)
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        writer.write_tag(Tag::Fixed(TypeTag::Decimal));
        writer.bytes().write_decimal(self);
        Ok(())
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        reader.expect_fixed(tag, TypeTag::Decimal)?;
        reader.bytes().read_decimal()
    }
}

impl Field for DateTime {
    fn type_ref() -> TypeRef {
        TypeRef::Fixed(TypeTag::DateTime)
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        writer.write_tag(Tag::Fixed(TypeTag::DateTime));
        writer.bytes().write_datetime(self);
        Ok(())
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        reader.expect_fixed(tag, TypeTag::DateTime)?;
        reader.bytes().read_datetime()
    }
}

impl Field for Uuid {
    fn type_ref() -> TypeRef {
        TypeRef::Fixed(TypeTag::Guid)
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        writer.write_tag(Tag::Fixed(TypeTag::Guid));
        writer.bytes().write_guid(self);
        Ok(())
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        reader.expect_fixed(tag, TypeTag::Guid)?;
        reader.bytes().read_guid()
    }
}

impl Field for String {
    fn type_ref() -> TypeRef {
        TypeRef::Fixed(TypeTag::String)
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        writer.write_tag(Tag::Fixed(TypeTag::String));
        writer.bytes().write_str(self)
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        reader.expect_fixed(tag, TypeTag::String)?;
        reader.bytes().read_string()
    }
}

impl Field for TypeRef {
    fn type_ref() -> TypeRef {
        TypeRef::Fixed(TypeTag::Type)
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        writer.write_type(self)
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        reader.expect_fixed(tag, TypeTag::Type)?;
        reader.read_type_ref()
    }
}

/// A non-optional reference to an object in the graph.
impl Field for ObjectId {
    fn type_ref() -> TypeRef {
        TypeRef::Any
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        writer.write_object(*self)
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        reader.read_object_tagged(tag)?.ok_or_else(|| {
            GraphCodecError::CorruptGraph("null in a non-optional object reference".into())
        })
    }
}

/// Untyped field; accepts any tag.
impl Field for Value {
    fn type_ref() -> TypeRef {
        TypeRef::Any
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        writer.write(self)
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        reader.read_value_tagged(tag)
    }
}

impl<T: Field> Field for Option<T> {
    fn type_ref() -> TypeRef {
        T::type_ref()
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        match self {
            Some(value) => value.write_field(writer),
            None => {
                writer.write_tag(Tag::Fixed(TypeTag::Null));
                Ok(())
            }
        }
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        match tag {
            Tag::Fixed(TypeTag::Null) => Ok(None),
            _ => T::read_tagged(tag, reader).map(Some),
        }
    }
}

impl<T: Field> Field for Vec<T> {
    fn type_ref() -> TypeRef {
        TypeRef::Fixed(TypeTag::Array)
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        writer.write_array(self)
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        reader.read_array_tagged(tag)
    }
}

impl<T: Field> Field for Box<T> {
    fn type_ref() -> TypeRef {
        T::type_ref()
    }

    fn write_field(&self, writer: &mut GraphWriter<'_>) -> Result<()> {
        T::write_field(self, writer)
    }

    fn read_tagged(tag: Tag, reader: &mut GraphReader<'_>) -> Result<Self> {
        T::read_tagged(tag, reader).map(Box::new)
    }
}
