// src/rt.rs

//! Runtime utilities for generated code (Macros).
//! Do not use directly.

use std::any::Any;

use crate::error::{GraphCodecError, Result};
use crate::graph::{ObjectGraph, ObjectId};
use crate::reflect::{DeserializationCallback, Object, Reflect, StateBag, StateObject};

/// Downcasts the receiver of a generated accessor.
pub fn downcast<T: Reflect>(object: &dyn Any) -> Result<&T> {
    object
        .downcast_ref::<T>()
        .ok_or_else(|| mismatch::<T>())
}

/// Mutable counterpart of [`downcast`].
pub fn downcast_mut<T: Reflect>(object: &mut dyn Any) -> Result<&mut T> {
    object
        .downcast_mut::<T>()
        .ok_or_else(|| mismatch::<T>())
}

/// Parameterless constructor backed by `Default`.
pub fn construct<T: Reflect + Default>() -> Box<dyn Object> {
    Box::new(T::default())
}

/// Bag export for `#[persist(state)]` types.
pub fn export_state<T: Reflect + StateObject>(object: &dyn Any, bag: &mut StateBag) -> Result<()> {
    downcast::<T>(object)?.export_state(bag)
}

/// Bag import for `#[persist(state)]` types.
pub fn import_state<T: Reflect + StateObject>(bag: StateBag) -> Result<Box<dyn Object>> {
    Ok(Box::new(T::from_state(bag)?))
}

/// Callback trampoline for `#[persist(callback)]` types.
pub fn on_deserialized<T: Reflect + DeserializationCallback>(
    object: &mut dyn Any,
    id: ObjectId,
    graph: &ObjectGraph,
) -> Result<()> {
    downcast_mut::<T>(object)?.on_deserialized(id, graph)
}

fn mismatch<T: Reflect>() -> GraphCodecError {
    GraphCodecError::Internal(format!("accessor of `{}` applied to another type", T::NAME))
}
