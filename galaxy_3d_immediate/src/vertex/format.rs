/// Vertex format descriptor
///
/// Attributes are packed in declaration order, each aligned to 4 bytes; the
/// stride is the packed size rounded up to 4.

use rustc_hash::FxHashMap;
use crate::engine_fatal;

const SOURCE: &str = "galaxy3d::VertexFormat";

/// Maximum number of attributes in one format
pub const MAX_VERTEX_ATTRIBUTES: usize = 16;

/// Alignment of every attribute offset and of the stride
pub const ATTRIBUTE_ALIGNMENT: u32 = 4;

/// Number of `ComponentType` variants (size of the conversion table)
pub const COMPONENT_TYPE_COUNT: usize = 7;

/// Scalar type of one attribute component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl ComponentType {
    /// Every variant, in table order
    pub const ALL: [ComponentType; COMPONENT_TYPE_COUNT] = [
        ComponentType::I8,
        ComponentType::U8,
        ComponentType::I16,
        ComponentType::U16,
        ComponentType::I32,
        ComponentType::U32,
        ComponentType::F32,
    ];

    /// Size of one component in bytes
    pub fn size(&self) -> u32 {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::I32 | ComponentType::U32 | ComponentType::F32 => 4,
        }
    }

    /// Row/column of this type in the conversion table
    pub fn index(&self) -> usize {
        match self {
            ComponentType::I8 => 0,
            ComponentType::U8 => 1,
            ComponentType::I16 => 2,
            ComponentType::U16 => 3,
            ComponentType::I32 => 4,
            ComponentType::U32 => 5,
            ComponentType::F32 => 6,
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, ComponentType::F32)
    }
}

/// How the shader sees an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMode {
    /// Float data read as float
    Float,
    /// Integer data read as integer
    Int,
    /// Integer data read as float without normalization (SSCALED/USCALED)
    IntToFloat,
    /// Integer data normalized to [0, 1] or [-1, 1] (UNORM/SNORM)
    IntToFloatUnit,
}

/// One attribute of a vertex format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: String,
    pub comp_type: ComponentType,
    /// 1 to 4 components
    pub comp_count: u32,
    pub fetch_mode: FetchMode,
    /// Byte offset inside a vertex
    pub offset: u32,
}

impl VertexAttribute {
    /// Size in bytes of the attribute data (without padding)
    pub fn size(&self) -> u32 {
        self.comp_type.size() * self.comp_count
    }
}

/// Ordered attribute layout of one vertex
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexFormat {
    attributes: Vec<VertexAttribute>,
    stride: u32,
    lookup: FxHashMap<String, usize>,
}

fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

impl VertexFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute and return its index
    ///
    /// Invalid declarations (bad component count, fetch mode not matching
    /// the component type, duplicate names, too many attributes) are
    /// programming errors.
    pub fn add_attribute(
        &mut self,
        name: &str,
        comp_type: ComponentType,
        comp_count: u32,
        fetch_mode: FetchMode,
    ) -> usize {
        if !(1..=4).contains(&comp_count) {
            engine_fatal!(SOURCE, "Attribute '{}' has {} components (expected 1-4)", name, comp_count);
        }
        let fetch_ok = match fetch_mode {
            FetchMode::Float => comp_type == ComponentType::F32,
            FetchMode::Int | FetchMode::IntToFloat | FetchMode::IntToFloatUnit => comp_type.is_integer(),
        };
        if !fetch_ok {
            engine_fatal!(SOURCE, "Attribute '{}': {:?} cannot be fetched as {:?}",
                name, comp_type, fetch_mode);
        }
        if self.lookup.contains_key(name) {
            engine_fatal!(SOURCE, "Duplicate attribute '{}'", name);
        }
        if self.attributes.len() == MAX_VERTEX_ATTRIBUTES {
            engine_fatal!(SOURCE, "Too many attributes (max {})", MAX_VERTEX_ATTRIBUTES);
        }

        let offset = align_up(self.packed_end(), ATTRIBUTE_ALIGNMENT);
        let attribute = VertexAttribute {
            name: name.to_string(),
            comp_type,
            comp_count,
            fetch_mode,
            offset,
        };
        self.stride = align_up(offset + attribute.size(), ATTRIBUTE_ALIGNMENT);

        let index = self.attributes.len();
        self.lookup.insert(attribute.name.clone(), index);
        self.attributes.push(attribute);
        index
    }

    /// Builder-style `add_attribute`
    pub fn with_attribute(
        mut self,
        name: &str,
        comp_type: ComponentType,
        comp_count: u32,
        fetch_mode: FetchMode,
    ) -> Self {
        self.add_attribute(name, comp_type, comp_count, fetch_mode);
        self
    }

    /// Remove every attribute
    pub fn clear(&mut self) {
        self.attributes.clear();
        self.lookup.clear();
        self.stride = 0;
    }

    /// Bytes per vertex
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Bytes needed for `vertex_count` vertices
    pub fn size_for(&self, vertex_count: u32) -> u64 {
        self.stride as u64 * vertex_count as u64
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, index: usize) -> Option<&VertexAttribute> {
        self.attributes.get(index)
    }

    /// Index of the attribute called `name`
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn packed_end(&self) -> u32 {
        self.attributes.last().map_or(0, |attr| attr.offset + attr.size())
    }
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
