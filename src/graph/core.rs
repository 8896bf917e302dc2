use std::any::Any;
use std::fmt;

use super::id::ObjectId;
use crate::error::{GraphCodecError, Result};
use crate::reflect::Object;

/// Arena of persistent objects.
///
/// The writer walks an `ObjectGraph` starting from a root value; the reader produces a fresh
/// one whose ids equal the stream's object table indices. Slots are only empty while a reader
/// is mid-construction or a deserialization callback has temporarily taken its object out.
#[derive(Default)]
pub struct ObjectGraph {
    slots: Vec<Option<Box<dyn Object>>>,
}

impl ObjectGraph {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty arena with room for `capacity` objects.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Moves an object into the arena and returns its id.
    pub fn insert<T: Object>(&mut self, object: T) -> ObjectId {
        self.insert_boxed(Box::new(object))
    }

    /// Moves a boxed object into the arena and returns its id.
    pub fn insert_boxed(&mut self, object: Box<dyn Object>) -> ObjectId {
        let id = self.next_id();
        self.slots.push(Some(object));
        id
    }

    /// Typed shared access. Returns `None` if the slot is empty or holds another type.
    pub fn get<T: Any>(&self, id: ObjectId) -> Option<&T> {
        self.get_dyn(id)?.as_any().downcast_ref::<T>()
    }

    /// Typed mutable access. Returns `None` if the slot is empty or holds another type.
    pub fn get_mut<T: Any>(&mut self, id: ObjectId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index())?
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Untyped access to a slot.
    pub fn get_dyn(&self, id: ObjectId) -> Option<&dyn Object> {
        self.slots.get(id.index())?.as_deref()
    }

    /// Returns true if `id` names an occupied slot.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get_dyn(id).is_some()
    }

    /// Number of slots, including reserved ones.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the arena has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over occupied slots in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &dyn Object)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_deref()
                .map(|object| (ObjectId::new(index as u32), object))
        })
    }

    /// Ids of every occupied slot holding a `T`.
    pub fn ids_of<T: Any>(&self) -> Vec<ObjectId> {
        self.iter()
            .filter(|(_, object)| object.as_any().is::<T>())
            .map(|(id, _)| id)
            .collect()
    }

    /// Reserves an empty slot and returns its id.
    ///
    /// The reader calls this before decoding an object's fields, so a field pointing back at
    /// the object under construction resolves to this id.
    pub(crate) fn reserve(&mut self) -> ObjectId {
        let id = self.next_id();
        self.slots.push(None);
        id
    }

    /// Fills a previously reserved slot.
    pub(crate) fn fill(&mut self, id: ObjectId, object: Box<dyn Object>) -> Result<()> {
        let slot = self.slots.get_mut(id.index()).ok_or_else(|| {
            GraphCodecError::Internal(format!("slot {id} was never reserved"))
        })?;
        if slot.is_some() {
            return Err(GraphCodecError::Internal(format!(
                "slot {id} filled twice"
            )));
        }
        *slot = Some(object);
        Ok(())
    }

    /// Temporarily removes an object from its slot.
    pub(crate) fn take(&mut self, id: ObjectId) -> Option<Box<dyn Object>> {
        self.slots.get_mut(id.index())?.take()
    }

    /// Returns the first reserved slot that was never filled, if any.
    pub(crate) fn first_vacant(&self) -> Option<ObjectId> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|index| ObjectId::new(index as u32))
    }

    fn next_id(&self) -> ObjectId {
        // The wire format addresses objects with an i32 index.
        ObjectId::new(u32::try_from(self.slots.len()).unwrap_or(u32::MAX))
    }
}

impl fmt::Debug for ObjectGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().enumerate().map(|(index, slot)| {
                (
                    index,
                    slot.as_deref().map_or("<reserved>", |object| object.type_name()),
                )
            }))
            .finish()
    }
}
