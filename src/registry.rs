//! Type registration and per-call type tables.
//!
//! [`TypeCatalog`] is the long-lived service: it knows which Rust types may appear in a stream,
//! under which qualified name and optional compact id, and owns the thunk cache. A
//! [`TypeTable`] lives for exactly one serialize or deserialize call and maps the stream's
//! `Other + n` ids to types in first-use order.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::compiler::{MarshalCompiler, Thunk};
use crate::error::{GraphCodecError, Result};
use crate::format::TypeEntry;
use crate::reflect::{Reflect, TypeHandle};

static GLOBAL: Lazy<Arc<TypeCatalog>> = Lazy::new(|| Arc::new(TypeCatalog::new()));

#[derive(Debug, Default)]
struct CatalogState {
    /// Registered types and their compact ids.
    by_type: HashMap<TypeId, Option<u32>>,
    by_name: HashMap<&'static str, TypeHandle>,
    by_compact: HashMap<u32, TypeHandle>,
}

/// Registered types, their compact ids and the compiled thunk cache.
///
/// Share one catalog between formatters with an `Arc`. Writers can encode any persistent type,
/// registered or not; readers can only resolve header entries of registered types.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    state: RwLock<CatalogState>,
    compiler: MarshalCompiler,
}

impl TypeCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide catalog used by [`BinaryFormatter::default`](crate::BinaryFormatter).
    pub fn global() -> Arc<TypeCatalog> {
        Arc::clone(&GLOBAL)
    }

    /// Registers `T` with the compact id declared by `#[persist(id = N)]`, if any.
    pub fn register<T: Reflect>(&self) -> Result<&Self> {
        self.register_handle(TypeHandle::of::<T>(), T::COMPACT_ID)?;
        Ok(self)
    }

    /// Registers `T` with an explicitly supplied compact id.
    pub fn register_with_id<T: Reflect>(&self, compact_id: u32) -> Result<&Self> {
        self.register_handle(TypeHandle::of::<T>(), Some(compact_id))?;
        Ok(self)
    }

    /// Registers a type by handle.
    ///
    /// Re-registering a type with the same compact id is a no-op. Registering it with a
    /// different id, or reusing a name or compact id that belongs to another type, fails.
    pub fn register_handle(&self, handle: TypeHandle, compact_id: Option<u32>) -> Result<()> {
        let mut state = self.state.write();

        if let Some(&existing) = state.by_type.get(&handle.type_id()) {
            if existing == compact_id {
                return Ok(());
            }
            return Err(GraphCodecError::Registration(format!(
                "`{}` is already registered with compact id {:?}, not {:?}",
                handle.name(),
                existing,
                compact_id
            )));
        }
        if state.by_name.contains_key(handle.name()) {
            return Err(GraphCodecError::Registration(format!(
                "name `{}` is already taken by another type",
                handle.name()
            )));
        }
        if let Some(id) = compact_id {
            if let Some(other) = state.by_compact.get(&id) {
                return Err(GraphCodecError::Registration(format!(
                    "compact id {id} is already assigned to `{}`",
                    other.name()
                )));
            }
            state.by_compact.insert(id, handle);
        }

        state.by_name.insert(handle.name(), handle);
        state.by_type.insert(handle.type_id(), compact_id);
        tracing::debug!(type_name = handle.name(), ?compact_id, "registered type");
        Ok(())
    }

    /// Returns true if `T` has been registered.
    pub fn is_registered<T: Reflect>(&self) -> bool {
        self.state.read().by_type.contains_key(&TypeId::of::<T>())
    }

    /// Compact id a writer should use for `handle`: the registered one, else the declared one.
    pub fn compact_id_of(&self, handle: &TypeHandle) -> Option<u32> {
        match self.state.read().by_type.get(&handle.type_id()) {
            Some(&compact_id) => compact_id,
            None => handle.declared_id(),
        }
    }

    /// Looks a registered type up by qualified name.
    pub fn resolve_name(&self, name: &str) -> Option<TypeHandle> {
        self.state.read().by_name.get(name).copied()
    }

    /// Looks a registered type up by compact id.
    pub fn resolve_compact(&self, compact_id: u32) -> Option<TypeHandle> {
        self.state.read().by_compact.get(&compact_id).copied()
    }

    /// Returns the compiled thunk of `handle`, building it on first use.
    pub fn thunk(&self, handle: &TypeHandle) -> Result<Arc<Thunk>> {
        self.compiler.thunk(handle)
    }

    /// The thunk cache.
    pub fn compiler(&self) -> &MarshalCompiler {
        &self.compiler
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.state.read().by_type.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-call mapping between `Other + n` ids and types.
#[derive(Debug, Default)]
pub struct TypeTable {
    slots: Vec<(TypeHandle, Arc<Thunk>)>,
    entries: Vec<TypeEntry>,
    ids: HashMap<TypeId, u32>,
}

impl TypeTable {
    /// Creates an empty table for writing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the custom id of `handle`, assigning the next one on first use.
    ///
    /// The thunk is obtained before an id is assigned, so a type that cannot be marshalled
    /// never appears in the header.
    pub fn get_or_assign(
        &mut self,
        handle: TypeHandle,
        catalog: &TypeCatalog,
        use_compact_ids: bool,
    ) -> Result<(u32, Arc<Thunk>)> {
        if let Some(&id) = self.ids.get(&handle.type_id()) {
            let (_, thunk) = &self.slots[id as usize];
            return Ok((id, Arc::clone(thunk)));
        }

        let thunk = catalog.thunk(&handle)?;
        let id = u32::try_from(self.slots.len()).map_err(|_| {
            GraphCodecError::UnsupportedType("too many custom types in one graph".into())
        })?;
        let entry = match catalog.compact_id_of(&handle).filter(|_| use_compact_ids) {
            Some(compact) => TypeEntry::Compact(compact),
            None => TypeEntry::Named(handle.name().to_owned()),
        };
        self.entries.push(entry);
        self.slots.push((handle, Arc::clone(&thunk)));
        self.ids.insert(handle.type_id(), id);
        Ok((id, thunk))
    }

    /// Rebuilds the table from a header, resolving every entry through `catalog`.
    pub fn from_header(entries: &[TypeEntry], catalog: &TypeCatalog) -> Result<Self> {
        let mut table = Self::new();
        for (id, entry) in entries.iter().enumerate() {
            let handle = match entry {
                TypeEntry::Compact(compact) => catalog.resolve_compact(*compact),
                TypeEntry::Named(name) => catalog.resolve_name(name),
            }
            .ok_or_else(|| {
                GraphCodecError::UnresolvableType(format!("{entry} is not registered"))
            })?;
            let thunk = catalog.thunk(&handle)?;
            table.entries.push(entry.clone());
            table.slots.push((handle, thunk));
            table.ids.insert(handle.type_id(), id as u32);
        }
        Ok(table)
    }

    /// Resolves `Other + n` while reading.
    pub fn resolve(&self, n: u32) -> Result<(TypeHandle, Arc<Thunk>)> {
        self.slots
            .get(n as usize)
            .map(|(handle, thunk)| (*handle, Arc::clone(thunk)))
            .ok_or_else(|| {
                GraphCodecError::CorruptGraph(format!(
                    "custom type id Other+{n} is outside the header's {} entries",
                    self.slots.len()
                ))
            })
    }

    /// Header entries in id order.
    pub fn entries(&self) -> &[TypeEntry] {
        &self.entries
    }

    /// Consumes the table, returning its header entries.
    pub fn into_entries(self) -> Vec<TypeEntry> {
        self.entries
    }

    /// Number of assigned ids.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no id has been assigned.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
