// src/inspector.rs

//! Tools for inspecting the header of a serialized graph.
//! Useful for debugging compact id assignment and type table growth.

use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::format::{Header, Tag, TypeEntry};
use crate::io::ByteReader;
use crate::registry::TypeCatalog;

/// A structural report of a serialized graph.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderReport {
    /// Custom type base stored in the first byte.
    pub other_base: u8,
    /// Declared number of reference objects.
    pub object_count: i32,
    /// The custom type table in `Other + n` order.
    pub types: Vec<TypeEntryInfo>,
    /// Header size in bytes.
    pub header_size: usize,
    /// Body size in bytes.
    pub body_size: usize,
    /// Tag of the root value, if the body is not empty.
    pub root_tag: Option<String>,
}

/// One row of the custom type table.
#[derive(Debug, Clone, Serialize)]
pub struct TypeEntryInfo {
    /// Tag id the body uses for this type.
    pub tag: u32,
    /// Compact id, if the entry uses one.
    pub compact_id: Option<u32>,
    /// Qualified name: stored in the entry, or resolved through the catalog.
    pub name: Option<String>,
    /// Whether the catalog can resolve the entry.
    pub resolved: bool,
}

/// The graph inspector tool.
#[derive(Debug)]
pub struct Inspector;

impl Inspector {
    /// Parses the header of `bytes` without resolving any type.
    pub fn inspect(bytes: &[u8]) -> Result<HeaderReport> {
        Self::analyze(bytes, None)
    }

    /// Parses the header and resolves its entries through `catalog`.
    pub fn inspect_with(bytes: &[u8], catalog: &TypeCatalog) -> Result<HeaderReport> {
        Self::analyze(bytes, Some(catalog))
    }

    fn analyze(bytes: &[u8], catalog: Option<&TypeCatalog>) -> Result<HeaderReport> {
        let mut input = ByteReader::new(bytes);
        let header = Header::read_from(&mut input)?;
        let header_size = input.position();
        let body_size = input.remaining();
        let root_tag = if input.is_empty() {
            None
        } else {
            Some(Tag::from_id(input.read_varint()?).to_string())
        };

        let types = header
            .types
            .iter()
            .enumerate()
            .map(|(n, entry)| Self::describe(n as u32, entry, catalog))
            .collect();

        Ok(HeaderReport {
            other_base: header.other_base,
            object_count: header.object_count,
            types,
            header_size,
            body_size,
            root_tag,
        })
    }

    fn describe(n: u32, entry: &TypeEntry, catalog: Option<&TypeCatalog>) -> TypeEntryInfo {
        let tag = Tag::Custom(n).id();
        match entry {
            TypeEntry::Compact(id) => {
                let handle = catalog.and_then(|c| c.resolve_compact(*id));
                TypeEntryInfo {
                    tag,
                    compact_id: Some(*id),
                    name: handle.map(|h| h.name().to_owned()),
                    resolved: handle.is_some(),
                }
            }
            TypeEntry::Named(name) => TypeEntryInfo {
                tag,
                compact_id: None,
                name: Some(name.clone()),
                resolved: catalog.is_some_and(|c| c.resolve_name(name).is_some()),
            },
        }
    }
}

impl fmt::Display for HeaderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "graph: {} objects, {} custom types, header {} B, body {} B",
            self.object_count,
            self.types.len(),
            self.header_size,
            self.body_size
        )?;
        if let Some(root) = &self.root_tag {
            writeln!(f, "root: {root}")?;
        }
        for entry in &self.types {
            let name = entry.name.as_deref().unwrap_or("?");
            match entry.compact_id {
                Some(id) => write!(f, "  [{}] #{id} {name}", entry.tag)?,
                None => write!(f, "  [{}] {name}", entry.tag)?,
            }
            if !entry.resolved {
                f.write_str(" (unresolved)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
