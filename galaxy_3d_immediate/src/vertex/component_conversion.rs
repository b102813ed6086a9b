/// Component conversion dispatch table
///
/// Every (source, destination) pair of `ComponentType` maps to one plain
/// function. The table is a fixed-size array indexed by `ComponentType::index`,
/// so a new component type does not compile until its row and column exist.

use bytemuck::Pod;
use crate::vertex::{ComponentType, COMPONENT_TYPE_COUNT};

/// Convert one component from `src` bytes into `dst` bytes
///
/// `normalized` selects unit normalization (UNORM/SNORM semantics) instead of
/// a plain numeric cast.
pub type ComponentFn = fn(src: &[u8], dst: &mut [u8], normalized: bool);

/// Scalar usable as a vertex component
trait Component: Pod {
    fn to_f64(self) -> f64;
    /// Saturating cast
    fn from_f64(value: f64) -> Self;
    /// Value mapped to [0, 1] (unsigned) or [-1, 1] (signed)
    fn to_unit(self) -> f64;
    fn from_unit(value: f64) -> Self;
}

macro_rules! unsigned_component {
    ($t:ty) => {
        impl Component for $t {
            fn to_f64(self) -> f64 { self as f64 }
            fn from_f64(value: f64) -> Self { value as $t }
            fn to_unit(self) -> f64 { self as f64 / <$t>::MAX as f64 }
            fn from_unit(value: f64) -> Self {
                (value.clamp(0.0, 1.0) * <$t>::MAX as f64).round() as $t
            }
        }
    };
}

macro_rules! signed_component {
    ($t:ty) => {
        impl Component for $t {
            fn to_f64(self) -> f64 { self as f64 }
            fn from_f64(value: f64) -> Self { value as $t }
            fn to_unit(self) -> f64 { (self as f64 / <$t>::MAX as f64).max(-1.0) }
            fn from_unit(value: f64) -> Self {
                (value.clamp(-1.0, 1.0) * <$t>::MAX as f64).round() as $t
            }
        }
    };
}

unsigned_component!(u8);
unsigned_component!(u16);
unsigned_component!(u32);
signed_component!(i8);
signed_component!(i16);
signed_component!(i32);

impl Component for f32 {
    fn to_f64(self) -> f64 { self as f64 }
    fn from_f64(value: f64) -> Self { value as f32 }
    fn to_unit(self) -> f64 { self as f64 }
    fn from_unit(value: f64) -> Self { value as f32 }
}

fn convert<S: Component, D: Component>(src: &[u8], dst: &mut [u8], normalized: bool) {
    let value: S = bytemuck::pod_read_unaligned(&src[..std::mem::size_of::<S>()]);
    let out = if normalized {
        D::from_unit(value.to_unit())
    } else {
        D::from_f64(value.to_f64())
    };
    dst[..std::mem::size_of::<D>()].copy_from_slice(bytemuck::bytes_of(&out));
}

// Row order and column order follow ComponentType::index
macro_rules! row {
    ($s:ty) => {
        [
            convert::<$s, i8>,
            convert::<$s, u8>,
            convert::<$s, i16>,
            convert::<$s, u16>,
            convert::<$s, i32>,
            convert::<$s, u32>,
            convert::<$s, f32>,
        ]
    };
}

static CONVERSIONS: [[ComponentFn; COMPONENT_TYPE_COUNT]; COMPONENT_TYPE_COUNT] = [
    row!(i8),
    row!(u8),
    row!(i16),
    row!(u16),
    row!(i32),
    row!(u32),
    row!(f32),
];

/// Conversion function for a (source, destination) pair
pub fn lookup(src: ComponentType, dst: ComponentType) -> ComponentFn {
    CONVERSIONS[src.index()][dst.index()]
}

#[cfg(test)]
#[path = "component_conversion_tests.rs"]
mod tests;
