/// Device vertex-fetch limitations

use bitflags::bitflags;

bitflags! {
    /// Vertex layouts the device cannot fetch natively
    ///
    /// Read when a session initializes its vertex format; every set flag
    /// forces the converter to rewrite the affected attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceWorkarounds: u32 {
        /// 3-component 8-bit formats (R8G8B8_*) are unsupported: pad to 4 components
        const R8G8B8_VERTEX_FORMAT = 1 << 0;
        /// 3-component 16-bit formats (R16G16B16_*) are unsupported: pad to 4 components
        const R16G16B16_VERTEX_FORMAT = 1 << 1;
        /// Normalized 8-bit formats (R8*_UNORM / _SNORM) are unsupported: expand to 32-bit float
        const UNORM8_VERTEX_FORMAT = 1 << 2;
    }
}
