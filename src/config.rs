//! Formatter configuration.

use serde::{Deserialize, Serialize};

/// Default nesting limit for objects, arrays and inline values.
///
/// Sized for the 2 MiB stacks of spawned threads. Linked structures longer than this need a
/// larger [`FormatterOptions::max_depth`] and a thread with a correspondingly larger stack.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default initial capacity of the body buffer, in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Options shared by every call of a [`BinaryFormatter`](crate::BinaryFormatter).
///
/// Missing keys take their default when deserialized, so a host config file only needs to
/// list what it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterOptions {
    /// Nesting deeper than this fails with a depth-limit error.
    ///
    /// Every object reached through a field of the previous one adds a level, so an acyclic
    /// chain of `n` linked objects needs `max_depth >= n`. Encoding and decoding recurse once
    /// per level: raise the limit together with the stack size of the calling thread.
    pub max_depth: usize,
    /// Initial capacity of the writer's body buffer.
    pub initial_capacity: usize,
    /// Run deserialization callbacks once a graph has been decoded.
    pub run_callbacks: bool,
    /// Write compact ids into the header when a type has one.
    pub use_compact_ids: bool,
    /// Accept input with bytes after the end of the body.
    pub allow_trailing_bytes: bool,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            initial_capacity: DEFAULT_BUFFER_CAPACITY,
            run_callbacks: true,
            use_compact_ids: true,
            allow_trailing_bytes: false,
        }
    }
}
