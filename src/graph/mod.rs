//! The object arena.
//!
//! Every encodable reference-type instance lives in an [`ObjectGraph`] and is referenced by
//! [`ObjectId`]. Identity-based deduplication and cycle detection reduce to id equality.

/// Defines the `ObjectGraph` arena.
pub mod core;
/// Defines the `ObjectId` type.
pub mod id;

pub use core::ObjectGraph;
pub use id::ObjectId;
