//! The encoding half of the graph codec.

use std::collections::HashMap;
use std::io::Write;

use crate::config::FormatterOptions;
use crate::error::{GraphCodecError, Result};
use crate::field::Field;
use crate::format::{Header, Tag, TypeTag};
use crate::graph::{ObjectGraph, ObjectId};
use crate::io::ByteWriter;
use crate::reflect::{Kind, Reflect, StateBag, TypeHandle};
use crate::registry::{TypeCatalog, TypeTable};
use crate::value::{Array, TypeRef, Value};

/// Walks an [`ObjectGraph`] from a root value and produces one stream.
///
/// A writer owns the per-call type table and object table. Both start empty, so two writers
/// never share `Other + n` ids or object indices. The body is buffered until [`finish`]
/// prepends the header.
///
/// [`finish`]: GraphWriter::finish
#[derive(Debug)]
pub struct GraphWriter<'g> {
    graph: &'g ObjectGraph,
    catalog: &'g TypeCatalog,
    options: &'g FormatterOptions,
    types: TypeTable,
    objects: HashMap<ObjectId, i32>,
    body: ByteWriter,
    depth: usize,
}

impl<'g> GraphWriter<'g> {
    /// Creates a writer over `graph`.
    pub fn new(
        graph: &'g ObjectGraph,
        catalog: &'g TypeCatalog,
        options: &'g FormatterOptions,
    ) -> Self {
        Self {
            graph,
            catalog,
            options,
            types: TypeTable::new(),
            objects: HashMap::new(),
            body: ByteWriter::with_capacity(options.initial_capacity),
            depth: 0,
        }
    }

    /// Writes a tagged value. This is the single dispatch point of the encoder.
    pub fn write(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => {
                self.write_tag(Tag::Fixed(TypeTag::Null));
                Ok(())
            }
            Value::Bool(v) => v.write_field(self),
            Value::Byte(v) => v.write_field(self),
            Value::SByte(v) => v.write_field(self),
            Value::Char(v) => v.write_field(self),
            Value::Int16(v) => v.write_field(self),
            Value::UInt16(v) => v.write_field(self),
            Value::Int32(v) => v.write_field(self),
            Value::UInt32(v) => v.write_field(self),
            Value::Int64(v) => v.write_field(self),
            Value::UInt64(v) => v.write_field(self),
            Value::Single(v) => v.write_field(self),
            Value::Double(v) => v.write_field(self),
            Value::Decimal(v) => v.write_field(self),
            Value::DateTime(v) => v.write_field(self),
            Value::Guid(v) => v.write_field(self),
            Value::String(v) => v.write_field(self),
            Value::Array(array) => self.write_array_value(array),
            Value::Type(type_ref) => self.write_type(type_ref),
            Value::Object(id) => self.write_object(*id),
        }
    }

    /// Writes a type tag.
    pub fn write_tag(&mut self, tag: Tag) {
        self.body.write_varint(tag.id());
    }

    /// Writes a reference to an object of the graph.
    ///
    /// The first time an object is met it is entered into the object table, then its type tag
    /// and fields follow. Every later occurrence is an `Existing` back-reference, which is what
    /// makes cycles terminate.
    pub fn write_object(&mut self, id: ObjectId) -> Result<()> {
        if let Some(&index) = self.objects.get(&id) {
            self.write_tag(Tag::Fixed(TypeTag::Existing));
            self.body.write_i32(index);
            return Ok(());
        }

        let graph = self.graph;
        let object = graph.get_dyn(id).ok_or_else(|| {
            GraphCodecError::CorruptGraph(format!("object {id} is not in the graph"))
        })?;
        let (type_id, thunk) =
            self.types
                .get_or_assign(object.type_handle(), self.catalog, self.options.use_compact_ids)?;
        if thunk.kind() == Kind::Value {
            return Err(GraphCodecError::UnsupportedType(format!(
                "`{}` is a value type and cannot be referenced by identity",
                thunk.name()
            )));
        }

        let index = i32::try_from(self.objects.len()).map_err(|_| {
            GraphCodecError::UnsupportedType("graph exceeds i32::MAX objects".into())
        })?;
        self.objects.insert(id, index);
        self.write_tag(Tag::Custom(type_id));

        self.enter()?;
        thunk.encode(object.as_any(), self)?;
        self.leave();
        Ok(())
    }

    /// Writes a value-kind struct inline with its custom tag. It never enters the object table.
    pub fn write_inline<T: Reflect>(&mut self, value: &T) -> Result<()> {
        let (type_id, thunk) = self.types.get_or_assign(
            TypeHandle::of::<T>(),
            self.catalog,
            self.options.use_compact_ids,
        )?;
        if thunk.kind() != Kind::Value {
            return Err(GraphCodecError::Internal(format!(
                "`{}` is a reference type written inline",
                thunk.name()
            )));
        }
        self.write_tag(Tag::Custom(type_id));

        self.enter()?;
        thunk.encode(value, self)?;
        self.leave();
        Ok(())
    }

    /// Writes a typed array.
    pub fn write_array<T: Field>(&mut self, items: &[T]) -> Result<()> {
        self.write_array_header(items.len(), &T::type_ref())?;
        self.enter()?;
        for item in items {
            item.write_field(self)?;
        }
        self.leave();
        Ok(())
    }

    fn write_array_value(&mut self, array: &Array) -> Result<()> {
        self.write_array_header(array.items.len(), &array.element)?;
        self.enter()?;
        for item in &array.items {
            self.write(item)?;
        }
        self.leave();
        Ok(())
    }

    fn write_array_header(&mut self, len: usize, element: &TypeRef) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| {
            GraphCodecError::UnsupportedType(format!("array of {len} items is too long"))
        })?;
        let element = self.type_id_of(element)?;
        self.write_tag(Tag::Fixed(TypeTag::Array));
        self.body.write_i32(len);
        self.body.write_varint(element);
        Ok(())
    }

    /// Writes a `Type` value.
    pub fn write_type(&mut self, type_ref: &TypeRef) -> Result<()> {
        let id = self.type_id_of(type_ref)?;
        self.write_tag(Tag::Fixed(TypeTag::Type));
        self.body.write_varint(id);
        Ok(())
    }

    /// Wire id of a type reference, assigning a custom id on first use.
    fn type_id_of(&mut self, type_ref: &TypeRef) -> Result<u32> {
        match type_ref {
            TypeRef::Any => Ok(0),
            TypeRef::Fixed(TypeTag::Null | TypeTag::Existing | TypeTag::Other) => {
                Err(GraphCodecError::UnsupportedType(format!(
                    "`{type_ref}` cannot be used as a type reference"
                )))
            }
            TypeRef::Fixed(tag) => Ok(tag.id()),
            TypeRef::Custom(handle) => {
                let (n, _) =
                    self.types
                        .get_or_assign(*handle, self.catalog, self.options.use_compact_ids)?;
                Ok(Tag::Custom(n).id())
            }
        }
    }

    /// Writes the members of a self-describing object.
    pub fn write_state_bag(&mut self, bag: &StateBag) -> Result<()> {
        let count = i32::try_from(bag.len()).map_err(|_| {
            GraphCodecError::UnsupportedType("state bag has too many members".into())
        })?;
        self.body.write_i32(count);
        for (name, value) in bag.iter() {
            self.body.write_str(name)?;
            self.write(value)?;
        }
        Ok(())
    }

    /// Raw access to the body, for payloads that follow a tag.
    pub fn bytes(&mut self) -> &mut ByteWriter {
        &mut self.body
    }

    /// Number of objects entered into the object table so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of custom types assigned so far.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Prepends the header and returns the complete stream.
    pub fn finish(self) -> Result<Vec<u8>> {
        let (header, body) = self.into_parts()?;
        let mut out = ByteWriter::with_capacity(header.encoded_len() + body.len());
        header.write_to(&mut out)?;
        out.write_bytes(body.as_slice());
        Ok(out.into_inner())
    }

    /// Writes the header and body to `sink`, returning the number of bytes written.
    pub fn finish_into<W: Write>(self, mut sink: W) -> Result<usize> {
        let (header, body) = self.into_parts()?;
        let mut head = ByteWriter::with_capacity(header.encoded_len());
        header.write_to(&mut head)?;
        sink.write_all(head.as_slice())?;
        sink.write_all(body.as_slice())?;
        sink.flush()?;
        Ok(head.len() + body.len())
    }

    fn into_parts(self) -> Result<(Header, ByteWriter)> {
        let object_count = i32::try_from(self.objects.len()).map_err(|_| {
            GraphCodecError::UnsupportedType("graph exceeds i32::MAX objects".into())
        })?;
        let header = Header::new(object_count, self.types.into_entries());
        tracing::debug!(
            objects = object_count,
            types = header.types.len(),
            body_bytes = self.body.len(),
            "serialized graph"
        );
        Ok((header, self.body))
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(GraphCodecError::DepthLimit(self.options.max_depth));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }
}
