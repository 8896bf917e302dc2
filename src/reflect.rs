//! Compile-time type descriptions consumed by the marshal compiler.
//!
//! `#[derive(Persistent)]` (or `#[derive(Reflect)]` for types that must not be persisted on
//! their own) implements [`Reflect`] for a struct. Its [`Shape`] lists the declared fields
//! with one accessor pair per field, the optional base, the construction strategy, the
//! per-object event hooks and the optional deserialization callback. The [`compiler`](crate::compiler) turns a shape into a
//! cached thunk once per type. Shapes are never consulted on the hot path.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{GraphCodecError, Result};
use crate::graph::{ObjectGraph, ObjectId};
use crate::reader::GraphReader;
use crate::value::Value;
use crate::writer::GraphWriter;

/// A type with a compile-time generated shape.
///
/// Implemented by the derive macros. Manual implementations must keep [`Reflect::NAME`]
/// unique and stable, since it is what the header stores when no compact id is registered.
pub trait Reflect: Any + Send + Sync {
    /// Qualified type name written into headers.
    const NAME: &'static str;

    /// Compact id declared with `#[persist(id = N)]`.
    const COMPACT_ID: Option<u32> = None;

    /// Describes the type's fields and strategies.
    fn shape() -> Shape
    where
        Self: Sized;
}

/// Object-safe view of a [`Reflect`] type, as stored in an [`ObjectGraph`].
pub trait Object: Any + Send + Sync {
    /// Upcasts to `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast to `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Converts the box into `Box<dyn Any>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Runtime handle of the concrete type.
    fn type_handle(&self) -> TypeHandle;

    /// Qualified name of the concrete type.
    fn type_name(&self) -> &'static str;
}

impl<T: Reflect> Object for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_handle(&self) -> TypeHandle {
        TypeHandle::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        T::NAME
    }
}

/// Cheap, copyable runtime identity of a [`Reflect`] type.
#[derive(Clone, Copy)]
pub struct TypeHandle {
    id: TypeId,
    name: &'static str,
    declared_id: Option<u32>,
    shape: fn() -> Shape,
}

impl TypeHandle {
    /// Handle of `T`.
    pub fn of<T: Reflect>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::NAME,
            declared_id: T::COMPACT_ID,
            shape: T::shape,
        }
    }

    /// Rust type identity.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Qualified name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Compact id declared by attribute, if any.
    pub fn declared_id(&self) -> Option<u32> {
        self.declared_id
    }

    /// Builds the shape. Only the compiler needs this, once per type.
    pub fn shape(&self) -> Shape {
        (self.shape)()
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeHandle {}

impl Hash for TypeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle({})", self.name)
    }
}

/// How instances of a custom type are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Lives in the arena, tracked by identity, back-referenced with `Existing`.
    Reference,
    /// Encoded inline by value every time it appears; never enters the object table.
    Value,
}

/// Writes one field of the object behind `&dyn Any`.
pub type WriteFieldFn = fn(&dyn Any, &mut GraphWriter<'_>) -> Result<()>;
/// Reads one field into the object behind `&mut dyn Any`.
pub type ReadFieldFn = fn(&mut dyn Any, &mut GraphReader<'_>) -> Result<()>;
/// Parameterless constructor.
pub type ConstructFn = fn() -> Box<dyn Object>;
/// Projects an object onto its embedded base.
pub type UpcastFn = fn(&dyn Any) -> Option<&dyn Any>;
/// Mutable projection onto the embedded base.
pub type UpcastMutFn = fn(&mut dyn Any) -> Option<&mut dyn Any>;
/// Exports an object's state into a bag.
pub type ExportStateFn = fn(&dyn Any, &mut StateBag) -> Result<()>;
/// Builds an object from a bag (the state constructor).
pub type ImportStateFn = fn(StateBag) -> Result<Box<dyn Object>>;
/// Deserialization-completed callback, given the object's own id.
pub type CallbackFn = fn(&mut dyn Any, ObjectId, &ObjectGraph) -> Result<()>;
/// Per-object event fired around an object's field writes.
pub type SerializeEventFn = fn(&dyn Any) -> Result<()>;
/// Per-object event fired around an object's field reads.
pub type DeserializeEventFn = fn(&mut dyn Any) -> Result<()>;

/// Reflected description of one type.
#[derive(Debug, Clone)]
pub struct Shape {
    /// Qualified name.
    pub name: &'static str,
    /// Whether the type opted into persistence (`Persistent` rather than `Reflect`).
    pub persistent: bool,
    /// Reference or value semantics.
    pub kind: Kind,
    /// Declared fields in declaration order, transient ones included.
    pub fields: Vec<FieldShape>,
    /// Embedded base, whose fields follow this type's own.
    pub base: Option<BaseShape>,
    /// Parameterless constructor, if the type has one.
    pub construct: Option<ConstructFn>,
    /// Self-describing state hooks, if the type exports its own state.
    pub state: Option<StateHooks>,
    /// Hooks fired around this object's own fields.
    pub events: EventHooks,
    /// Callback run after a whole graph has been decoded.
    pub callback: Option<CallbackFn>,
}

/// Per-object serialization events, declared with `#[persist(on_serializing = "method")]`
/// and friends.
///
/// Unlike [`DeserializationCallback`], these fire while the object itself is being encoded or
/// decoded. `on_serialized` runs after every object reachable from the fields has been
/// written. `on_deserialized` runs once the fields are populated, while referenced objects
/// may still be under construction.
#[derive(Clone, Copy, Default)]
pub struct EventHooks {
    /// Before the fields are written.
    pub serializing: Option<SerializeEventFn>,
    /// After the fields are written.
    pub serialized: Option<SerializeEventFn>,
    /// After construction, before the fields are read.
    pub deserializing: Option<DeserializeEventFn>,
    /// After the fields are read.
    pub deserialized: Option<DeserializeEventFn>,
}

impl EventHooks {
    /// Returns true if no hook is set.
    pub fn is_empty(&self) -> bool {
        self.serializing.is_none()
            && self.serialized.is_none()
            && self.deserializing.is_none()
            && self.deserialized.is_none()
    }
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHooks")
            .field("serializing", &self.serializing.is_some())
            .field("serialized", &self.serialized.is_some())
            .field("deserializing", &self.deserializing.is_some())
            .field("deserialized", &self.deserialized.is_some())
            .finish()
    }
}

/// One declared field.
#[derive(Clone)]
pub struct FieldShape {
    /// Field name (`"0"`, `"1"`, ... for tuple structs).
    pub name: &'static str,
    /// Accessors, absent for transient fields.
    pub access: Option<(WriteFieldFn, ReadFieldFn)>,
}

impl FieldShape {
    /// A field that is written and read.
    pub fn persisted(name: &'static str, write: WriteFieldFn, read: ReadFieldFn) -> Self {
        Self {
            name,
            access: Some((write, read)),
        }
    }

    /// A field excluded from the stream. It keeps its constructed default after decoding.
    pub fn transient(name: &'static str) -> Self {
        Self { name, access: None }
    }

    /// Returns true if the field is skipped.
    pub fn is_transient(&self) -> bool {
        self.access.is_none()
    }
}

impl fmt::Debug for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldShape")
            .field("name", &self.name)
            .field("transient", &self.is_transient())
            .finish()
    }
}

/// Link from a type to the base embedded in it.
#[derive(Clone, Copy)]
pub struct BaseShape {
    /// The base's shape.
    pub shape: fn() -> Shape,
    /// Projection onto the base.
    pub upcast: UpcastFn,
    /// Mutable projection onto the base.
    pub upcast_mut: UpcastMutFn,
}

impl fmt::Debug for BaseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BaseShape({})", (self.shape)().name)
    }
}

/// Export/import pair of a self-describing type.
#[derive(Clone, Copy)]
pub struct StateHooks {
    /// Writes the object's members into a bag.
    pub export: ExportStateFn,
    /// Builds an object from a bag.
    pub import: ImportStateFn,
}

impl fmt::Debug for StateHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StateHooks")
    }
}

/// A type that exports and imports its own state as an ordered `(name, value)` bag.
///
/// Used with `#[persist(state)]`. The codec bypasses field-by-field compilation and writes
/// the bag's members in insertion order.
pub trait StateObject: Sized {
    /// Appends this object's members to `bag`.
    fn export_state(&self, bag: &mut StateBag) -> Result<()>;

    /// Reconstructs an object from the members previously exported.
    fn from_state(bag: StateBag) -> Result<Self>;
}

/// Hook run once a whole graph has been decoded.
///
/// Used with `#[persist(callback)]`. Callbacks run in the order objects were first
/// encountered in the stream, after every reference has been wired. While the callback runs,
/// the object itself is taken out of `graph`: references equal to `id` point at `self`, and
/// looking `id` up in `graph` returns `None`.
pub trait DeserializationCallback {
    /// Called after deserialization completes.
    fn on_deserialized(&mut self, id: ObjectId, graph: &ObjectGraph) -> Result<()>;
}

/// Ordered `(name, value)` members of a self-describing object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateBag {
    members: Vec<(String, Value)>,
}

impl StateBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a member.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.members.push((name.into(), value.into()));
    }

    /// First member named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, value)| value)
    }

    /// First member named `name`, or a corrupt-graph error naming it.
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| {
            GraphCodecError::CorruptGraph(format!("state member `{name}` is missing"))
        })
    }

    /// Removes and returns the first member named `name`.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        let index = self.members.iter().position(|(member, _)| member == name)?;
        Some(self.members.remove(index).1)
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the bag has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
