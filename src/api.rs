//! The formatter facade.
//!
//! Every entry point owns exactly one [`GraphWriter`] or [`GraphReader`] lifecycle, so per-call
//! state (type table, object table) never leaks between calls. The [`TypeCatalog`] and its
//! thunk cache are shared.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::FormatterOptions;
use crate::error::Result;
use crate::graph::{ObjectGraph, ObjectId};
use crate::inspector::{HeaderReport, Inspector};
use crate::reader::GraphReader;
use crate::registry::TypeCatalog;
use crate::value::Value;
use crate::writer::GraphWriter;

/// A decoded graph and the root value it was serialized from.
#[derive(Debug)]
pub struct Snapshot {
    /// Every decoded object, indexed by its position in the stream's object table.
    pub graph: ObjectGraph,
    /// The root value.
    pub root: Value,
}

impl Snapshot {
    /// The root object, if the root is an object reference.
    pub fn root_object(&self) -> Option<ObjectId> {
        self.root.as_object()
    }

    /// Typed access to the root object.
    pub fn root_as<T: std::any::Any>(&self) -> Option<&T> {
        self.graph.get(self.root_object()?)
    }
}

/// Serializes and deserializes object graphs.
#[derive(Debug, Clone)]
pub struct BinaryFormatter {
    catalog: Arc<TypeCatalog>,
    options: FormatterOptions,
}

impl Default for BinaryFormatter {
    /// A formatter over the global catalog with default options.
    fn default() -> Self {
        Self::new(TypeCatalog::global())
    }
}

impl BinaryFormatter {
    /// Creates a formatter over `catalog` with default options.
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self::with_options(catalog, FormatterOptions::default())
    }

    /// Creates a formatter with explicit options.
    pub fn with_options(catalog: Arc<TypeCatalog>, options: FormatterOptions) -> Self {
        Self { catalog, options }
    }

    /// Starts a [`FormatterBuilder`].
    pub fn builder() -> FormatterBuilder {
        FormatterBuilder::default()
    }

    /// The shared catalog.
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// The options every call uses.
    pub fn options(&self) -> &FormatterOptions {
        &self.options
    }

    /// Serializes the graph reachable from `root` into a new buffer.
    ///
    /// # Errors
    /// Fails if a reachable type cannot be marshalled, if `root` references an id absent from
    /// `graph`, or if nesting exceeds the configured depth.
    pub fn serialize(&self, graph: &ObjectGraph, root: &Value) -> Result<Vec<u8>> {
        let mut writer = GraphWriter::new(graph, &self.catalog, &self.options);
        writer.write(root)?;
        writer.finish()
    }

    /// Serializes into `sink`, returning the number of bytes written.
    pub fn serialize_into<W: Write>(
        &self,
        graph: &ObjectGraph,
        root: &Value,
        sink: W,
    ) -> Result<usize> {
        let mut writer = GraphWriter::new(graph, &self.catalog, &self.options);
        writer.write(root)?;
        writer.finish_into(sink)
    }

    /// Deserializes a complete stream.
    ///
    /// # Errors
    /// Fails on truncated or malformed input, on header entries the catalog cannot resolve,
    /// and on errors returned by deserialization callbacks.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Snapshot> {
        let mut reader = GraphReader::new(bytes, &self.catalog, &self.options)?;
        let root = reader.read()?;
        let graph = reader.finish()?;
        Ok(Snapshot { graph, root })
    }

    /// Reads `source` to the end and deserializes it.
    pub fn deserialize_from<R: Read>(&self, mut source: R) -> Result<Snapshot> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        self.deserialize(&bytes)
    }

    /// Serializes to a file, replacing it if it exists.
    pub fn save<P: AsRef<Path>>(&self, path: P, graph: &ObjectGraph, root: &Value) -> Result<()> {
        let file = File::create(path)?;
        self.serialize_into(graph, root, BufWriter::new(file))?;
        Ok(())
    }

    /// Deserializes a file written by [`save`](Self::save).
    #[cfg(feature = "mmap")]
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Snapshot> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return self.deserialize(&[]);
        }
        // Safety: the mapping is read-only and dropped before returning. Concurrent external
        // writes to the file are not supported.
        #[allow(unsafe_code)]
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        self.deserialize(&mmap)
    }

    /// Deserializes a file written by [`save`](Self::save).
    #[cfg(not(feature = "mmap"))]
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Snapshot> {
        let bytes = std::fs::read(path)?;
        self.deserialize(&bytes)
    }

    /// Reports the header and type table of `bytes` without decoding the body.
    pub fn inspect(&self, bytes: &[u8]) -> Result<HeaderReport> {
        Inspector::inspect_with(bytes, &self.catalog)
    }
}

/// Fluent construction of a [`BinaryFormatter`].
#[derive(Debug, Default)]
pub struct FormatterBuilder {
    catalog: Option<Arc<TypeCatalog>>,
    options: FormatterOptions,
}

impl FormatterBuilder {
    /// Uses `catalog` instead of the global one.
    pub fn catalog(mut self, catalog: Arc<TypeCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: FormatterOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the nesting limit.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.options.max_depth = max_depth;
        self
    }

    /// Sets the writer's initial buffer capacity.
    pub fn initial_capacity(mut self, bytes: usize) -> Self {
        self.options.initial_capacity = bytes;
        self
    }

    /// Enables or disables deserialization callbacks.
    pub fn run_callbacks(mut self, enabled: bool) -> Self {
        self.options.run_callbacks = enabled;
        self
    }

    /// Enables or disables compact ids in headers.
    pub fn use_compact_ids(mut self, enabled: bool) -> Self {
        self.options.use_compact_ids = enabled;
        self
    }

    /// Accepts or rejects bytes after the end of the body.
    pub fn allow_trailing_bytes(mut self, allowed: bool) -> Self {
        self.options.allow_trailing_bytes = allowed;
        self
    }

    /// Builds the formatter.
    pub fn build(self) -> BinaryFormatter {
        BinaryFormatter::with_options(
            self.catalog.unwrap_or_else(TypeCatalog::global),
            self.options,
        )
    }
}
