/// VertexFormatConverter - rewrites application vertex layouts the device cannot fetch
///
/// `init()` derives the device layout from the application layout and the
/// device workarounds. When the two differ, `convert()` / `convert_in_place()`
/// transcode whole vertices using the component conversion table.
///
/// Device attributes are never smaller than their source attributes, so the
/// device stride is always >= the application stride.

use std::sync::Arc;
use crate::device::DeviceWorkarounds;
use crate::engine_debug;
use crate::engine_fatal;
use crate::vertex::component_conversion::{lookup, ComponentFn};
use crate::vertex::{ComponentType, FetchMode, VertexAttribute, VertexFormat};

const SOURCE: &str = "galaxy3d::VertexConverter";

/// Per-attribute transcoding step
#[derive(Clone, Copy)]
struct AttributePlan {
    src_offset: usize,
    dst_offset: usize,
    src_size: usize,
    dst_size: usize,
    src_count: usize,
    dst_count: usize,
    normalized: bool,
    convert: ComponentFn,
}

/// Device-side type, component count and fetch mode for `attr`
fn device_attribute(attr: &VertexAttribute, workarounds: DeviceWorkarounds) -> (ComponentType, u32, FetchMode) {
    use ComponentType::*;

    match (attr.comp_type, attr.fetch_mode) {
        // No 32-bit scaled/normalized vertex formats exist
        (I32 | U32, FetchMode::IntToFloat | FetchMode::IntToFloatUnit) => {
            (F32, attr.comp_count, FetchMode::Float)
        }
        (I8 | U8, FetchMode::IntToFloatUnit)
            if workarounds.contains(DeviceWorkarounds::UNORM8_VERTEX_FORMAT) =>
        {
            (F32, attr.comp_count, FetchMode::Float)
        }
        (I8 | U8, fetch)
            if attr.comp_count == 3 && workarounds.contains(DeviceWorkarounds::R8G8B8_VERTEX_FORMAT) =>
        {
            (attr.comp_type, 4, fetch)
        }
        (I16 | U16, fetch)
            if attr.comp_count == 3 && workarounds.contains(DeviceWorkarounds::R16G16B16_VERTEX_FORMAT) =>
        {
            (attr.comp_type, 4, fetch)
        }
        (comp_type, fetch) => (comp_type, attr.comp_count, fetch),
    }
}

/// Vertex layout converter
///
/// Configuration persists across sessions while the application format and
/// workarounds stay the same; `reset()` only drops per-session scratch data.
pub struct VertexFormatConverter {
    source: VertexFormat,
    workarounds: DeviceWorkarounds,
    device: Arc<VertexFormat>,
    plans: Vec<AttributePlan>,
    needs_conversion: bool,
    initialized: bool,
    scratch: Vec<u8>,
}

impl Default for VertexFormatConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl VertexFormatConverter {
    pub fn new() -> Self {
        Self {
            source: VertexFormat::new(),
            workarounds: DeviceWorkarounds::empty(),
            device: Arc::new(VertexFormat::new()),
            plans: Vec::new(),
            needs_conversion: false,
            initialized: false,
            scratch: Vec::new(),
        }
    }

    /// Derive the device layout for `format` on a device with `workarounds`
    pub fn init(&mut self, format: &VertexFormat, workarounds: DeviceWorkarounds) {
        if self.initialized && self.workarounds == workarounds && self.source == *format {
            return;
        }

        let mut device = VertexFormat::new();
        for attr in format.attributes() {
            let (comp_type, comp_count, fetch_mode) = device_attribute(attr, workarounds);
            device.add_attribute(&attr.name, comp_type, comp_count, fetch_mode);
        }

        self.plans = format
            .attributes()
            .iter()
            .zip(device.attributes())
            .map(|(src, dst)| AttributePlan {
                src_offset: src.offset as usize,
                dst_offset: dst.offset as usize,
                src_size: src.comp_type.size() as usize,
                dst_size: dst.comp_type.size() as usize,
                src_count: src.comp_count as usize,
                dst_count: dst.comp_count as usize,
                normalized: src.fetch_mode == FetchMode::IntToFloatUnit
                    && dst.fetch_mode == FetchMode::Float,
                convert: lookup(src.comp_type, dst.comp_type),
            })
            .collect();

        self.needs_conversion = device != *format;
        if self.needs_conversion {
            engine_debug!(SOURCE, "Vertex layout needs conversion: stride {} -> {}",
                format.stride(), device.stride());
        }
        debug_assert!(device.stride() >= format.stride());

        self.source = format.clone();
        self.workarounds = workarounds;
        self.device = Arc::new(device);
        self.initialized = true;
    }

    pub fn needs_conversion(&self) -> bool {
        self.needs_conversion
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Application layout the converter was initialized with
    pub fn source_format(&self) -> &VertexFormat {
        &self.source
    }

    /// Layout of the data after conversion (equal to the source when no
    /// conversion is needed)
    pub fn device_format(&self) -> &Arc<VertexFormat> {
        &self.device
    }

    /// Transcode `vertex_count` vertices from `src` into `dst`
    pub fn convert(&mut self, src: &[u8], dst: &mut [u8], vertex_count: usize) {
        let (src_stride, dst_stride) = self.strides_checked("convert()");
        if src.len() < src_stride * vertex_count || dst.len() < dst_stride * vertex_count {
            engine_fatal!(SOURCE, "convert(): buffers too small for {} vertices", vertex_count);
        }

        for i in 0..vertex_count {
            let src_vertex = &src[i * src_stride..(i + 1) * src_stride];
            let dst_vertex = &mut dst[i * dst_stride..(i + 1) * dst_stride];
            Self::convert_vertex(&self.plans, src_vertex, dst_vertex);
        }
    }

    /// Transcode `vertex_count` vertices stored at the start of `data`
    ///
    /// Each vertex is copied out whole before its destination bytes are
    /// written. Vertices are processed front to back when the device stride
    /// is not larger than the source stride, back to front otherwise, so no
    /// unread source vertex is ever overwritten.
    pub fn convert_in_place(&mut self, data: &mut [u8], vertex_count: usize) {
        let (src_stride, dst_stride) = self.strides_checked("convert_in_place()");
        if data.len() < src_stride.max(dst_stride) * vertex_count {
            engine_fatal!(SOURCE, "convert_in_place(): region too small for {} vertices", vertex_count);
        }

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(src_stride, 0);

        let mut step = |i: usize| {
            scratch.copy_from_slice(&data[i * src_stride..(i + 1) * src_stride]);
            Self::convert_vertex(&self.plans, &scratch, &mut data[i * dst_stride..(i + 1) * dst_stride]);
        };
        if dst_stride <= src_stride {
            (0..vertex_count).for_each(&mut step);
        } else {
            (0..vertex_count).rev().for_each(&mut step);
        }

        self.scratch = scratch;
    }

    /// Drop per-session transient state
    pub fn reset(&mut self) {
        self.scratch.clear();
    }

    fn strides_checked(&self, op: &str) -> (usize, usize) {
        if !self.initialized {
            engine_fatal!(SOURCE, "{} before init()", op);
        }
        (self.source.stride() as usize, self.device.stride() as usize)
    }

    fn convert_vertex(plans: &[AttributePlan], src: &[u8], dst: &mut [u8]) {
        // Padding and added components read as zero
        dst.fill(0);
        for plan in plans {
            for c in 0..plan.src_count.min(plan.dst_count) {
                let s = plan.src_offset + c * plan.src_size;
                let d = plan.dst_offset + c * plan.dst_size;
                (plan.convert)(&src[s..s + plan.src_size], &mut dst[d..d + plan.dst_size], plan.normalized);
            }
        }
    }
}

#[cfg(test)]
#[path = "converter_tests.rs"]
mod tests;
