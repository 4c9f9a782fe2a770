//! The mesh pipeline: dynamic rendering, depth test, four descriptor sets.

use ash::vk;
use tracing::{debug, info};

use super::device::Device;
use crate::desc::{CullMode, PipelineDesc, ShaderCode};
use crate::error::{RhiError, RhiResult};
use crate::vertex::Vertex;

const ENTRY_POINT: &std::ffi::CStr = c"main";

fn cull_mode_flags(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::Front => vk::CullModeFlags::FRONT,
    }
}

pub fn create_pipeline_layout(
    device: &Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> RhiResult<vk::PipelineLayout> {
    let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
    let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
    debug!("Pipeline layout created with {} set(s)", set_layouts.len());
    Ok(layout)
}

fn create_shader_module(device: &Device, code: &ShaderCode) -> RhiResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code.words());
    unsafe { device.handle().create_shader_module(&create_info, None) }
        .map_err(|e| RhiError::Shader(format!("shader module creation failed: {}", e)))
}

/// Build the mesh pipeline for the given attachment formats.
///
/// Shader modules only live for the duration of this call.
pub fn create_mesh_pipeline(
    device: &Device,
    layout: vk::PipelineLayout,
    desc: &PipelineDesc,
) -> RhiResult<vk::Pipeline> {
    let vertex = create_shader_module(device, &desc.vertex)?;
    let fragment = match create_shader_module(device, &desc.fragment) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.handle().destroy_shader_module(vertex, None) };
            return Err(e);
        }
    };

    let result = build(device, layout, desc, vertex, fragment);

    unsafe {
        device.handle().destroy_shader_module(vertex, None);
        device.handle().destroy_shader_module(fragment, None);
    }
    result
}

fn build(
    device: &Device,
    layout: vk::PipelineLayout,
    desc: &PipelineDesc,
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
) -> RhiResult<vk::Pipeline> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex)
            .name(ENTRY_POINT),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment)
            .name(ENTRY_POINT),
    ];

    let vertex_bindings = [Vertex::binding_description()];
    let vertex_attributes = Vertex::attribute_descriptions();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    // Viewport and scissor are dynamic.
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(cull_mode_flags(desc.cull_mode))
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS);

    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)];
    let color_blend_state =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [desc.color_format.to_vk()];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(desc.depth_format.to_vk());

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    let pipelines = unsafe {
        device
            .handle()
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| RhiError::Pipeline(format!("graphics pipeline creation failed: {}", e)))?;

    info!(
        "Mesh pipeline created ({:?} color, {:?} depth)",
        desc.color_format, desc.depth_format
    );
    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(cull_mode_flags(CullMode::None), vk::CullModeFlags::NONE);
        assert_eq!(cull_mode_flags(CullMode::Back), vk::CullModeFlags::BACK);
        assert_eq!(cull_mode_flags(CullMode::Front), vk::CullModeFlags::FRONT);
    }
}
