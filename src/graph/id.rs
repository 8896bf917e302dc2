use std::fmt;

/// A strong type identifying an object slot in an [`ObjectGraph`](super::ObjectGraph).
///
/// Object identity is index equality: two fields holding the same `ObjectId` refer to the
/// same instance, and the writer encodes that instance once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32); // u32 matches the wire format's i32 back-reference range.

impl ObjectId {
    /// Creates a new ObjectId.
    /// Restricted to the graph module so ids only come from an arena.
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the slot index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
