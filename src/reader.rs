//! The decoding half of the graph codec.
//!
//! A [`GraphReader`] parses the header as soon as it is created, rebuilds the type table from
//! it and pre-sizes the object arena from the declared object count. Custom reference objects
//! get their arena slot reserved *before* their fields are decoded, so a field that points back
//! at an object still under construction resolves to that slot. Nothing is substituted on
//! failure: any malformed input aborts the call and no partial graph escapes.

use std::any::TypeId;

use crate::config::FormatterOptions;
use crate::error::{GraphCodecError, Result};
use crate::field::Field;
use crate::format::{Header, Tag, TypeTag};
use crate::graph::{ObjectGraph, ObjectId};
use crate::io::ByteReader;
use crate::reflect::{CallbackFn, Kind, Reflect, StateBag};
use crate::registry::{TypeCatalog, TypeTable};
use crate::value::{Array, TypeRef, Value};

/// Rebuilds an [`ObjectGraph`] from one stream.
#[derive(Debug)]
pub struct GraphReader<'a> {
    input: ByteReader<'a>,
    catalog: &'a TypeCatalog,
    options: &'a FormatterOptions,
    types: TypeTable,
    graph: ObjectGraph,
    declared_objects: usize,
    callbacks: Vec<(ObjectId, CallbackFn)>,
    depth: usize,
}

impl<'a> GraphReader<'a> {
    /// Parses the header of `bytes` and prepares to read the body.
    pub fn new(
        bytes: &'a [u8],
        catalog: &'a TypeCatalog,
        options: &'a FormatterOptions,
    ) -> Result<Self> {
        let mut input = ByteReader::new(bytes);
        let header = Header::read_from(&mut input)?;
        let types = TypeTable::from_header(&header.types, catalog)?;
        let declared_objects = usize::try_from(header.object_count).map_err(|_| {
            GraphCodecError::CorruptGraph(format!(
                "negative object count {}",
                header.object_count
            ))
        })?;
        // Every object costs at least one byte, which bounds what a lying header can allocate.
        let graph = ObjectGraph::with_capacity(declared_objects.min(input.remaining()));

        Ok(Self {
            input,
            catalog,
            options,
            types,
            graph,
            declared_objects,
            callbacks: Vec::new(),
            depth: 0,
        })
    }

    /// Reads one tagged value. This is the single dispatch point of the decoder.
    pub fn read(&mut self) -> Result<Value> {
        let tag = self.read_tag()?;
        self.read_value_tagged(tag)
    }

    /// Reads a type tag.
    pub fn read_tag(&mut self) -> Result<Tag> {
        Ok(Tag::from_id(self.input.read_varint()?))
    }

    /// Reads the payload of a value whose tag has already been consumed.
    pub fn read_value_tagged(&mut self, tag: Tag) -> Result<Value> {
        let value = match tag {
            Tag::Fixed(TypeTag::Null) => Value::Null,
            Tag::Fixed(TypeTag::Bool) => Value::Bool(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Byte) => Value::Byte(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::SByte) => Value::SByte(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Char) => Value::Char(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Int16) => Value::Int16(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::UInt16) => Value::UInt16(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Int32) => Value::Int32(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::UInt32) => Value::UInt32(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Int64) => Value::Int64(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::UInt64) => Value::UInt64(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Single) => Value::Single(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Double) => Value::Double(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Decimal) => Value::Decimal(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::DateTime) => Value::DateTime(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Guid) => Value::Guid(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::String) => Value::String(Field::read_tagged(tag, self)?),
            Tag::Fixed(TypeTag::Array) => Value::Array(self.read_array_value()?),
            Tag::Fixed(TypeTag::Type) => Value::Type(self.read_type_ref()?),
            Tag::Fixed(TypeTag::Existing) | Tag::Custom(_) => {
                match self.read_object_tagged(tag)? {
                    Some(id) => Value::Object(id),
                    None => Value::Null,
                }
            }
            Tag::Fixed(TypeTag::Other) => {
                return Err(GraphCodecError::CorruptGraph(format!(
                    "tag {tag} is not a value tag"
                )))
            }
        };
        Ok(value)
    }

    /// Reads an object reference whose tag has already been consumed.
    ///
    /// Returns `None` for `Null`. A fresh custom tag decodes a new object into the next slot;
    /// `Existing` returns a slot that has already been reserved.
    pub fn read_object_tagged(&mut self, tag: Tag) -> Result<Option<ObjectId>> {
        match tag {
            Tag::Fixed(TypeTag::Null) => Ok(None),
            Tag::Fixed(TypeTag::Existing) => {
                let index = self.input.read_i32()?;
                let reserved = self.graph.len();
                match u32::try_from(index) {
                    Ok(index) if (index as usize) < reserved => Ok(Some(ObjectId::new(index))),
                    _ => Err(GraphCodecError::CorruptGraph(format!(
                        "back-reference to object {index}, but only {reserved} objects precede it"
                    ))),
                }
            }
            Tag::Custom(n) => {
                let (_, thunk) = self.types.resolve(n)?;
                if thunk.kind() == Kind::Value {
                    return Err(GraphCodecError::CorruptGraph(format!(
                        "value type `{}` found where an object reference was expected",
                        thunk.name()
                    )));
                }
                if self.graph.len() >= self.declared_objects {
                    return Err(GraphCodecError::CorruptGraph(format!(
                        "body holds more than the {} objects the header declares",
                        self.declared_objects
                    )));
                }

                let id = self.graph.reserve();
                if let Some(callback) = thunk.callback() {
                    self.callbacks.push((id, callback));
                }
                self.enter()?;
                let object = thunk.decode(self)?;
                self.leave();
                self.graph.fill(id, object)?;
                Ok(Some(id))
            }
            other => Err(GraphCodecError::CorruptGraph(format!(
                "expected an object reference, found {other}"
            ))),
        }
    }

    /// Reads an inline value-kind struct whose tag has already been consumed.
    pub fn read_inline_tagged<T: Reflect>(&mut self, tag: Tag) -> Result<T> {
        let Tag::Custom(n) = tag else {
            return Err(GraphCodecError::CorruptGraph(format!(
                "expected inline `{}`, found {tag}",
                T::NAME
            )));
        };
        let (handle, thunk) = self.types.resolve(n)?;
        if handle.type_id() != TypeId::of::<T>() {
            return Err(GraphCodecError::CorruptGraph(format!(
                "expected inline `{}`, found `{}`",
                T::NAME,
                handle.name()
            )));
        }

        self.enter()?;
        let object = thunk.decode(self)?;
        self.leave();
        object
            .into_any()
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                GraphCodecError::Internal(format!("thunk of `{}` built another type", T::NAME))
            })
    }

    /// Reads a typed array whose tag has already been consumed.
    pub fn read_array_tagged<T: Field>(&mut self, tag: Tag) -> Result<Vec<T>> {
        self.expect_fixed(tag, TypeTag::Array)?;
        let (len, _) = self.read_array_header()?;
        let mut items = Vec::with_capacity(len.min(self.input.remaining()));
        self.enter()?;
        for _ in 0..len {
            items.push(T::read_field(self)?);
        }
        self.leave();
        Ok(items)
    }

    fn read_array_value(&mut self) -> Result<Array> {
        let (len, element) = self.read_array_header()?;
        let mut items = Vec::with_capacity(len.min(self.input.remaining()));
        self.enter()?;
        for _ in 0..len {
            items.push(self.read()?);
        }
        self.leave();
        Ok(Array::new(element, items))
    }

    fn read_array_header(&mut self) -> Result<(usize, TypeRef)> {
        let len = self.input.read_len("array length")?;
        let element = self.read_type_ref()?;
        Ok((len, element))
    }

    /// Reads the payload of a `Type` value (or an array element type).
    pub fn read_type_ref(&mut self) -> Result<TypeRef> {
        let id = self.input.read_varint()?;
        if id == 0 {
            return Ok(TypeRef::Any);
        }
        match Tag::from_id(id) {
            Tag::Fixed(TypeTag::Existing | TypeTag::Other) => Err(GraphCodecError::CorruptGraph(
                format!("type id {id} does not name a type"),
            )),
            Tag::Fixed(tag) => Ok(TypeRef::Fixed(tag)),
            Tag::Custom(n) => Ok(TypeRef::Custom(self.types.resolve(n)?.0)),
        }
    }

    /// Reads the members of a self-describing object.
    pub fn read_state_bag(&mut self) -> Result<StateBag> {
        let count = self.input.read_len("state member count")?;
        let mut bag = StateBag::new();
        for _ in 0..count {
            let name = self.input.read_string()?;
            let value = self.read()?;
            bag.add(name, value);
        }
        Ok(bag)
    }

    /// Fails unless `tag` is exactly `expected`.
    pub fn expect_fixed(&self, tag: Tag, expected: TypeTag) -> Result<()> {
        if tag == Tag::Fixed(expected) {
            Ok(())
        } else {
            Err(GraphCodecError::CorruptGraph(format!(
                "expected {expected}, found {tag}"
            )))
        }
    }

    /// Raw access to the input, for payloads that follow a tag.
    pub fn bytes(&mut self) -> &mut ByteReader<'a> {
        &mut self.input
    }

    /// The catalog types are resolved against.
    pub fn catalog(&self) -> &TypeCatalog {
        self.catalog
    }

    /// Verifies the stream was consumed exactly, then runs deserialization callbacks.
    pub fn finish(mut self) -> Result<ObjectGraph> {
        if self.graph.len() != self.declared_objects {
            return Err(GraphCodecError::CorruptGraph(format!(
                "header declares {} objects, body holds {}",
                self.declared_objects,
                self.graph.len()
            )));
        }
        if let Some(id) = self.graph.first_vacant() {
            return Err(GraphCodecError::Internal(format!("slot {id} was never filled")));
        }
        if !self.options.allow_trailing_bytes && !self.input.is_empty() {
            return Err(GraphCodecError::CorruptGraph(format!(
                "{} trailing bytes after the body",
                self.input.remaining()
            )));
        }

        if self.options.run_callbacks {
            for (id, callback) in std::mem::take(&mut self.callbacks) {
                let mut object = self.graph.take(id).ok_or_else(|| {
                    GraphCodecError::Internal(format!("callback target {id} is missing"))
                })?;
                let outcome = callback(object.as_any_mut(), id, &self.graph);
                self.graph.fill(id, object)?;
                outcome?;
            }
        }

        tracing::debug!(
            objects = self.graph.len(),
            types = self.types.len(),
            bytes = self.input.position(),
            "deserialized graph"
        );
        Ok(self.graph)
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
