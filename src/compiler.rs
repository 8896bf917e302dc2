//! Builds and caches one marshalling thunk per concrete type.
//!
//! A [`Thunk`] is computed from a type's [`Shape`] the first time the type is written or read
//! and reused for the lifetime of the owning [`TypeCatalog`](crate::registry::TypeCatalog).
//! Compiling flattens the base chain into a single ordered plan: the type's own non-transient
//! fields first, then its base's, then the base's base. Each step carries the projections
//! needed to reach the embedded base, so encoding is a flat loop with no shape lookups.
//! The type's own event hooks bracket that loop.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{GraphCodecError, Result};
use crate::reader::GraphReader;
use crate::reflect::{
    CallbackFn, ConstructFn, EventHooks, Kind, Object, ReadFieldFn, Shape, StateBag, StateHooks,
    TypeHandle, UpcastFn, UpcastMutFn, WriteFieldFn,
};
use crate::writer::GraphWriter;

/// Thread-safe get-or-create cache of compiled thunks.
#[derive(Debug, Default)]
pub struct MarshalCompiler {
    cache: Mutex<HashMap<TypeId, Arc<Thunk>>>,
    compilations: AtomicUsize,
}

impl MarshalCompiler {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the thunk of `handle`, compiling it on first use.
    ///
    /// Compilation runs under the cache lock, so concurrent first uses compile once. A failed
    /// compilation is not cached and leaves other types untouched.
    pub fn thunk(&self, handle: &TypeHandle) -> Result<Arc<Thunk>> {
        let mut cache = self.cache.lock();
        if let Some(thunk) = cache.get(&handle.type_id()) {
            return Ok(Arc::clone(thunk));
        }
        let thunk = Arc::new(Self::compile(handle)?);
        self.compilations.fetch_add(1, Ordering::Relaxed);
        cache.insert(handle.type_id(), Arc::clone(&thunk));
        Ok(thunk)
    }

    /// Number of cached thunks.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Number of successful compilations since creation.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Compiles a thunk without caching it.
    pub fn compile(handle: &TypeHandle) -> Result<Thunk> {
        let shape = handle.shape();
        if !shape.persistent {
            return Err(GraphCodecError::NotSerializable(format!(
                "`{}` is not marked persistent",
                shape.name
            )));
        }

        let strategy = match shape.state {
            Some(hooks) => Strategy::SelfDescribing(hooks),
            None => {
                if shape.construct.is_none() {
                    return Err(GraphCodecError::UnsupportedType(format!(
                        "`{}` has neither a parameterless constructor nor a state constructor",
                        shape.name
                    )));
                }
                Strategy::Structural(Self::plan(&shape)?)
            }
        };

        let thunk = Thunk {
            name: shape.name,
            kind: shape.kind,
            strategy,
            construct: shape.construct,
            events: shape.events,
            callback: shape.callback,
        };
        tracing::debug!(
            type_name = thunk.name,
            kind = ?thunk.kind,
            fields = thunk.fields().len(),
            self_describing = thunk.is_self_describing(),
            events = !thunk.events.is_empty(),
            "compiled marshal thunk"
        );
        Ok(thunk)
    }

    fn plan(shape: &Shape) -> Result<Vec<FieldPlan>> {
        let mut steps = Vec::new();
        let mut path: Vec<Projection> = Vec::new();
        let mut level = shape.clone();
        loop {
            for field in &level.fields {
                if let Some((write, read)) = field.access {
                    steps.push(FieldPlan {
                        owner: level.name,
                        name: field.name,
                        path: path.clone(),
                        write,
                        read,
                    });
                }
            }
            let Some(base) = level.base else {
                break;
            };
            let base_shape = (base.shape)();
            if !base_shape.persistent {
                return Err(GraphCodecError::NotSerializable(format!(
                    "`{}` derives from `{}`, which is not marked persistent",
                    shape.name, base_shape.name
                )));
            }
            path.push(Projection {
                upcast: base.upcast,
                upcast_mut: base.upcast_mut,
            });
            level = base_shape;
        }
        Ok(steps)
    }
}

/// Cached encode/decode plan of one concrete type.
#[derive(Debug)]
pub struct Thunk {
    name: &'static str,
    kind: Kind,
    strategy: Strategy,
    construct: Option<ConstructFn>,
    events: EventHooks,
    callback: Option<CallbackFn>,
}

#[derive(Debug)]
enum Strategy {
    Structural(Vec<FieldPlan>),
    SelfDescribing(StateHooks),
}

#[derive(Debug, Clone, Copy)]
struct Projection {
    upcast: UpcastFn,
    upcast_mut: UpcastMutFn,
}

#[derive(Debug)]
struct FieldPlan {
    owner: &'static str,
    name: &'static str,
    path: Vec<Projection>,
    write: WriteFieldFn,
    read: ReadFieldFn,
}

impl FieldPlan {
    fn target<'o>(&self, object: &'o dyn Any) -> Result<&'o dyn Any> {
        let mut current = object;
        for step in &self.path {
            current = (step.upcast)(current).ok_or_else(|| self.broken_projection())?;
        }
        Ok(current)
    }

    fn target_mut<'o>(&self, object: &'o mut dyn Any) -> Result<&'o mut dyn Any> {
        let mut current = object;
        for step in &self.path {
            current = (step.upcast_mut)(current).ok_or_else(|| self.broken_projection())?;
        }
        Ok(current)
    }

    fn broken_projection(&self) -> GraphCodecError {
        GraphCodecError::Internal(format!(
            "base projection to `{}` failed for field `{}`",
            self.owner, self.name
        ))
    }
}

impl Thunk {
    /// Qualified name of the compiled type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Reference or value semantics.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Returns true if the type exports its own state bag.
    pub fn is_self_describing(&self) -> bool {
        matches!(self.strategy, Strategy::SelfDescribing(_))
    }

    /// Encoded fields in wire order as `(declaring type, field name)`.
    ///
    /// Empty for self-describing types.
    pub fn fields(&self) -> Vec<(&'static str, &'static str)> {
        match &self.strategy {
            Strategy::Structural(steps) => steps.iter().map(|s| (s.owner, s.name)).collect(),
            Strategy::SelfDescribing(_) => Vec::new(),
        }
    }

    pub(crate) fn callback(&self) -> Option<CallbackFn> {
        self.callback
    }

    /// Writes the payload of `object`. The caller has already written the type tag.
    pub fn encode(&self, object: &dyn Any, writer: &mut GraphWriter<'_>) -> Result<()> {
        match &self.strategy {
            Strategy::Structural(steps) => {
                if let Some(hook) = self.events.serializing {
                    hook(object)?;
                }
                for step in steps {
                    (step.write)(step.target(object)?, writer)?;
                }
                if let Some(hook) = self.events.serialized {
                    hook(object)?;
                }
                Ok(())
            }
            Strategy::SelfDescribing(hooks) => {
                let mut bag = StateBag::new();
                (hooks.export)(object, &mut bag)?;
                writer.write_state_bag(&bag)
            }
        }
    }

    /// Reads a payload and builds a fresh instance.
    pub(crate) fn decode(&self, reader: &mut GraphReader<'_>) -> Result<Box<dyn Object>> {
        match &self.strategy {
            Strategy::Structural(steps) => {
                let construct = self.construct.ok_or_else(|| {
                    GraphCodecError::Internal(format!("`{}` lost its constructor", self.name))
                })?;
                let mut object = construct();
                if let Some(hook) = self.events.deserializing {
                    hook(object.as_any_mut())?;
                }
                for step in steps {
                    (step.read)(step.target_mut(object.as_any_mut())?, reader)?;
                }
                if let Some(hook) = self.events.deserialized {
                    hook(object.as_any_mut())?;
                }
                Ok(object)
            }
            Strategy::SelfDescribing(hooks) => {
                let bag = reader.read_state_bag()?;
                (hooks.import)(bag)
            }
        }
    }
}
