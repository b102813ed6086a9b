/// Conversions between immediate-mode descriptions and Vulkan enums

use ash::vk;
use galaxy_3d_immediate::galaxy3d::{Result, Error};
use galaxy_3d_immediate::galaxy3d::device::{BufferUsage, MemoryLocation, PrimitiveTopology, ShaderStages};
use galaxy_3d_immediate::galaxy3d::vertex::{ComponentType, FetchMode, VertexFormat};
use galaxy_3d_immediate::engine_error;

/// Vulkan format fetching `comp_count` components of `comp_type` with `fetch_mode`
///
/// Returns `None` for layouts Vulkan has no vertex format for (32-bit
/// integers read as float, `F32` read as integer). Those only reach the
/// device after `VertexFormatConverter` has rewritten them.
pub fn attribute_format_to_vk(
    comp_type: ComponentType,
    comp_count: u32,
    fetch_mode: FetchMode,
) -> Option<vk::Format> {
    let formats: [vk::Format; 4] = match (comp_type, fetch_mode) {
        (ComponentType::F32, FetchMode::Float) => [
            vk::Format::R32_SFLOAT,
            vk::Format::R32G32_SFLOAT,
            vk::Format::R32G32B32_SFLOAT,
            vk::Format::R32G32B32A32_SFLOAT,
        ],
        (ComponentType::I32, FetchMode::Int) => [
            vk::Format::R32_SINT,
            vk::Format::R32G32_SINT,
            vk::Format::R32G32B32_SINT,
            vk::Format::R32G32B32A32_SINT,
        ],
        (ComponentType::U32, FetchMode::Int) => [
            vk::Format::R32_UINT,
            vk::Format::R32G32_UINT,
            vk::Format::R32G32B32_UINT,
            vk::Format::R32G32B32A32_UINT,
        ],
        (ComponentType::I16, FetchMode::Int) => [
            vk::Format::R16_SINT,
            vk::Format::R16G16_SINT,
            vk::Format::R16G16B16_SINT,
            vk::Format::R16G16B16A16_SINT,
        ],
        (ComponentType::U16, FetchMode::Int) => [
            vk::Format::R16_UINT,
            vk::Format::R16G16_UINT,
            vk::Format::R16G16B16_UINT,
            vk::Format::R16G16B16A16_UINT,
        ],
        (ComponentType::I16, FetchMode::IntToFloat) => [
            vk::Format::R16_SSCALED,
            vk::Format::R16G16_SSCALED,
            vk::Format::R16G16B16_SSCALED,
            vk::Format::R16G16B16A16_SSCALED,
        ],
        (ComponentType::U16, FetchMode::IntToFloat) => [
            vk::Format::R16_USCALED,
            vk::Format::R16G16_USCALED,
            vk::Format::R16G16B16_USCALED,
            vk::Format::R16G16B16A16_USCALED,
        ],
        (ComponentType::I16, FetchMode::IntToFloatUnit) => [
            vk::Format::R16_SNORM,
            vk::Format::R16G16_SNORM,
            vk::Format::R16G16B16_SNORM,
            vk::Format::R16G16B16A16_SNORM,
        ],
        (ComponentType::U16, FetchMode::IntToFloatUnit) => [
            vk::Format::R16_UNORM,
            vk::Format::R16G16_UNORM,
            vk::Format::R16G16B16_UNORM,
            vk::Format::R16G16B16A16_UNORM,
        ],
        (ComponentType::I8, FetchMode::Int) => [
            vk::Format::R8_SINT,
            vk::Format::R8G8_SINT,
            vk::Format::R8G8B8_SINT,
            vk::Format::R8G8B8A8_SINT,
        ],
        (ComponentType::U8, FetchMode::Int) => [
            vk::Format::R8_UINT,
            vk::Format::R8G8_UINT,
            vk::Format::R8G8B8_UINT,
            vk::Format::R8G8B8A8_UINT,
        ],
        (ComponentType::I8, FetchMode::IntToFloat) => [
            vk::Format::R8_SSCALED,
            vk::Format::R8G8_SSCALED,
            vk::Format::R8G8B8_SSCALED,
            vk::Format::R8G8B8A8_SSCALED,
        ],
        (ComponentType::U8, FetchMode::IntToFloat) => [
            vk::Format::R8_USCALED,
            vk::Format::R8G8_USCALED,
            vk::Format::R8G8B8_USCALED,
            vk::Format::R8G8B8A8_USCALED,
        ],
        (ComponentType::I8, FetchMode::IntToFloatUnit) => [
            vk::Format::R8_SNORM,
            vk::Format::R8G8_SNORM,
            vk::Format::R8G8B8_SNORM,
            vk::Format::R8G8B8A8_SNORM,
        ],
        (ComponentType::U8, FetchMode::IntToFloatUnit) => [
            vk::Format::R8_UNORM,
            vk::Format::R8G8_UNORM,
            vk::Format::R8G8B8_UNORM,
            vk::Format::R8G8B8A8_UNORM,
        ],
        _ => return None,
    };

    match comp_count {
        1..=4 => Some(formats[comp_count as usize - 1]),
        _ => None,
    }
}

/// Vertex input state for a pipeline fetching `format` from `binding`
///
/// Attribute `i` of the format is read from shader location `i`. Pass the
/// converter's device format, not the application layout.
///
/// # Errors
///
/// `Error::InvalidResource` if an attribute has no Vulkan vertex format.
pub fn vertex_input_description(
    format: &VertexFormat,
    binding: u32,
) -> Result<(vk::VertexInputBindingDescription, Vec<vk::VertexInputAttributeDescription>)> {
    let binding_desc = vk::VertexInputBindingDescription::default()
        .binding(binding)
        .stride(format.stride())
        .input_rate(vk::VertexInputRate::VERTEX);

    let mut attributes = Vec::with_capacity(format.len());
    for (location, attr) in format.attributes().iter().enumerate() {
        let vk_format = attribute_format_to_vk(attr.comp_type, attr.comp_count, attr.fetch_mode)
            .ok_or_else(|| {
                engine_error!("galaxy3d::vulkan", "Attribute '{}' ({:?} x{}, {:?}) has no Vulkan vertex format",
                    attr.name, attr.comp_type, attr.comp_count, attr.fetch_mode);
                Error::InvalidResource(format!("No Vulkan vertex format for attribute '{}'", attr.name))
            })?;
        attributes.push(
            vk::VertexInputAttributeDescription::default()
                .location(location as u32)
                .binding(binding)
                .format(vk_format)
                .offset(attr.offset),
        );
    }

    Ok((binding_desc, attributes))
}

/// Convert PrimitiveTopology to Vulkan topology
pub fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

pub fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
    }
}

pub fn memory_location_to_vk(location: MemoryLocation) -> gpu_allocator::MemoryLocation {
    match location {
        MemoryLocation::HostVisible => gpu_allocator::MemoryLocation::CpuToGpu,
        MemoryLocation::DeviceLocal => gpu_allocator::MemoryLocation::GpuOnly,
    }
}

pub fn shader_stages_to_vk(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    flags
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
