/// Vertex module - attribute layouts and device layout conversion

pub mod format;
pub mod component_conversion;
pub mod converter;

pub use format::*;
pub use converter::*;
