//! # graphcodec
//!
//! A binary object-graph codec: it serializes an arbitrary, possibly cyclic, graph of typed
//! objects into a compact byte stream and reconstructs an equivalent graph from it.
//!
//! ## Overview
//!
//! The codec solves three coupled problems at once:
//!
//! *   **A compact wire format.** Values are prefixed by a 7-bit variable-length type tag.
//!     Custom types get the ids `Other + n` in first-use order, and the header maps those ids
//!     to qualified type names or registered compact ids.
//! *   **Reference identity.** Every custom reference object is written once. Later occurrences
//!     are `Existing` back-references into an object table, so shared nodes stay shared and
//!     cycles terminate.
//! *   **Amortized reflection.** `#[derive(Persistent)]` generates field accessors at compile
//!     time. The first use of a type at runtime compiles them into a flat marshalling plan that
//!     is cached and reused by every later call.
//!
//! ## Architecture
//!
//! ### The Object Arena
//!
//! Objects live in an [`ObjectGraph`] and refer to each other through [`ObjectId`] fields.
//! Identity is id equality. A decoded graph uses the stream's object table indices as ids.
//!
//! ### Stream Layout
//!
//! ```text
//! Header: otherBaseId:u8, objectCount:i32, customTypeCount:u16,
//!         customTypeCount × { hasCompactId:bool, compactId:u32 | name:string }
//! Body:   sequence of { tag:varint, payload }
//! ```
//!
//! See [`format`] for the tag numbering and [`io`] for the scalar encodings.
//!
//! ### Components
//!
//! * [`TypeCatalog`]: registered types, compact ids and the thunk cache. Share one per process.
//! * [`compiler::MarshalCompiler`]: builds one [`compiler::Thunk`] per type.
//! * [`GraphWriter`] / [`GraphReader`]: one call's type table, object table and byte cursor.
//! * [`BinaryFormatter`]: owns one writer or reader lifecycle per call.
//!
//! ## Usage
//!
//! ```rust
//! use graphcodec::{BinaryFormatter, ObjectGraph, ObjectId, Persistent, TypeCatalog, Value};
//! use std::sync::Arc;
//!
//! #[derive(Persistent, Default)]
//! #[persist(name = "demo.Node")]
//! struct Node {
//!     label: String,
//!     next: Option<ObjectId>,
//! }
//!
//! # fn main() -> graphcodec::Result<()> {
//! let catalog = Arc::new(TypeCatalog::new());
//! catalog.register::<Node>()?;
//!
//! let mut graph = ObjectGraph::new();
//! let a = graph.insert(Node { label: "a".into(), next: None });
//! let b = graph.insert(Node { label: "b".into(), next: Some(a) });
//! if let Some(node) = graph.get_mut::<Node>(a) {
//!     node.next = Some(b);
//! }
//!
//! let formatter = BinaryFormatter::new(catalog);
//! let bytes = formatter.serialize(&graph, &Value::Object(a))?;
//! let snapshot = formatter.deserialize(&bytes)?;
//!
//! let root = snapshot.root_object().expect("root is an object");
//! let second = snapshot.graph.get::<Node>(root).and_then(|n| n.next).expect("linked");
//! let back = snapshot.graph.get::<Node>(second).and_then(|n| n.next);
//! assert_eq!(back, Some(root));
//! # Ok(())
//! # }
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` block memory-maps a file in
//!   [`BinaryFormatter::load`] (feature `mmap`).
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a [`GraphCodecError`] variant, and a
//!   failed call never returns a partial graph.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// Lets derived code name `graphcodec::` from inside this crate too.
extern crate self as graphcodec;

// --- PUBLIC API MODULES ---
pub mod api;
pub mod config;
pub mod error;
pub mod field;
pub mod format;
pub mod inspector;
pub mod reader;
pub mod reflect;
pub mod registry;
pub mod value;
pub mod writer;

// --- INTERNAL IMPLEMENTATION MODULES ---
pub mod compiler;
pub mod graph;
pub mod io;

// --- MACRO SUPPORT MODULES ---

/// Runtime utilities used by the derived code.
#[doc(hidden)]
pub mod rt;

// --- RE-EXPORTS ---

pub use api::{BinaryFormatter, FormatterBuilder, Snapshot};
pub use config::FormatterOptions;
pub use error::{GraphCodecError, Result};
pub use field::Field;
pub use graph::{ObjectGraph, ObjectId};
pub use inspector::{HeaderReport, Inspector};
pub use reader::GraphReader;
pub use reflect::{DeserializationCallback, Object, Reflect, StateBag, StateObject};
pub use registry::TypeCatalog;
pub use value::{Array, DateTime, Decimal, TypeRef, Value};
pub use writer::GraphWriter;

// Re-export the derive macros so they are accessible as `graphcodec::Persistent`.
pub use graphcodec_derive::{Persistent, Reflect};
