//! Centralized error handling for graphcodec.
//!
//! Every fallible operation in the crate returns [`Result`], and the library never panics on
//! malformed input: a truncated or tampered stream surfaces as a [`GraphCodecError`] and the
//! whole call is aborted. No partially decoded graph is ever handed back.
//!
//! ## Error Categories
//!
//! - **Type model errors**, raised the first time a type is used in a call:
//!   [`GraphCodecError::UnsupportedType`] and [`GraphCodecError::NotSerializable`].
//!   They are fatal for the current call only. The shared thunk cache is left untouched, so
//!   other types keep working.
//! - **Stream errors**, raised while decoding: [`GraphCodecError::UnresolvableType`],
//!   [`GraphCodecError::CorruptGraph`] and [`GraphCodecError::UnexpectedEndOfStream`].
//! - **Ambient errors**: I/O, conflicting registrations, the recursion guard and internal
//!   invariant violations.
//!
//! ## Usage
//!
//! ```rust
//! use graphcodec::{BinaryFormatter, GraphCodecError};
//!
//! let formatter = BinaryFormatter::default();
//! match formatter.deserialize(&[20, 0, 0]) {
//!     Err(GraphCodecError::UnexpectedEndOfStream { needed, remaining }) => {
//!         assert!(needed > remaining);
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use std::sync::Arc;

/// A specialized `Result` type for graphcodec operations.
pub type Result<T> = std::result::Result<T, GraphCodecError>;

/// The master error enum covering all failure domains of the codec.
///
/// The type is `Clone` so a failure can be stored or fanned out to several observers.
/// I/O errors are wrapped in `Arc` for that reason.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphCodecError {
    /// Low-level I/O failure while reading or writing a stream or file.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The type has no usable construction strategy: neither a parameterless constructor
    /// nor a state constructor. Also raised when a value-kind type is referenced by identity.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// The type, or one of its bases, did not opt into being persisted.
    #[error("type cannot be serialized: {0}")]
    NotSerializable(String),

    /// The header names a type that is not registered in the catalog.
    #[error("unresolvable type: {0}")]
    UnresolvableType(String),

    /// Malformed tag or back-reference sequence, invalid scalar payload or header mismatch.
    #[error("corrupt graph: {0}")]
    CorruptGraph(String),

    /// The stream is shorter than its contents declare.
    #[error("unexpected end of stream: needed {needed} byte(s), {remaining} remaining")]
    UnexpectedEndOfStream {
        /// Bytes the decoder tried to consume.
        needed: usize,
        /// Bytes that were actually left.
        remaining: usize,
    },

    /// A type registration conflicts with an existing one (name or compact id).
    #[error("registration conflict: {0}")]
    Registration(String),

    /// The graph nests deeper than the configured maximum.
    #[error("graph nesting exceeds the configured maximum depth of {0}")]
    DepthLimit(usize),

    /// Logic error inside the codec. Should not occur; please report it as a bug.
    #[error("internal logic error: {0}")]
    Internal(String),
}

impl GraphCodecError {
    /// Returns true for errors caused by the byte stream itself rather than by the type model
    /// or the environment.
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            Self::UnresolvableType(_) | Self::CorruptGraph(_) | Self::UnexpectedEndOfStream { .. }
        )
    }
}

impl From<io::Error> for GraphCodecError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
