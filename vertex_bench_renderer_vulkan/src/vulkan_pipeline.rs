/// Pipeline - graphics pipeline drawing the benchmark grid
///
/// Vertex input comes from the grid vertex layout, descriptor-set layouts from the merged
/// reflection of both shader stages. Rendering is dynamic, so the pipeline only needs the
/// color attachment format.

use vertex_bench::vbench::{Error, Result};
use vertex_bench::vbench::device::{ShaderReflection, ShaderStage};
use vertex_bench::vbench::grid::{Vertex, VertexFormat};
use vertex_bench::{engine_bail, engine_debug, engine_error};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_shader::{
    descriptor_set_layout_bindings, merge_shader_reflections, shader_stage_to_vk, Shader, ENTRY_POINT,
};

/// Vulkan pipeline implementation
pub struct Pipeline {
    /// Shared GPU context (for cleanup)
    gpu: Arc<GpuContext>,
    /// Vulkan graphics pipeline
    pub(crate) pipeline: vk::Pipeline,
    /// Pipeline layout
    pub(crate) pipeline_layout: vk::PipelineLayout,
    /// One layout per descriptor set index (0..=max set index)
    descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    /// Merged reflection of the vertex and fragment stages
    reflection: ShaderReflection,
}

pub(crate) fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}

/// A shader bound to a pipeline slot must have been created for that slot's stage
pub(crate) fn check_shader_stage(actual: ShaderStage, expected: ShaderStage) -> Result<()> {
    if actual != expected {
        engine_error!("vbench::vulkan", "{:?} shader bound as the {:?} stage", actual, expected);
        return Err(Error::InvalidResource(format!(
            "{:?} shader cannot be used as the {:?} stage", actual, expected
        )));
    }
    Ok(())
}

/// Vertex attributes of the grid vertex, all on binding 0
pub(crate) fn vertex_attributes() -> Vec<vk::VertexInputAttributeDescription> {
    Vertex::attribute_layout()
        .iter()
        .map(|attribute| vk::VertexInputAttributeDescription {
            location: attribute.location,
            binding: 0,
            format: vertex_format_to_vk(attribute.format),
            offset: attribute.offset,
        })
        .collect()
}

impl Pipeline {
    /// Create a triangle-list pipeline rendering into `color_format`
    pub(crate) fn new(
        gpu: Arc<GpuContext>,
        vertex_shader: &Shader,
        fragment_shader: &Shader,
        color_format: vk::Format,
    ) -> Result<Self> {
        check_shader_stage(vertex_shader.stage(), ShaderStage::Vertex)?;
        check_shader_stage(fragment_shader.stage(), ShaderStage::Fragment)?;
        let reflection = merge_shader_reflections(&[vertex_shader.reflection(), fragment_shader.reflection()])?;

        unsafe {
            // Descriptor-set layouts, one per set index up to the highest used
            let mut descriptor_set_layouts: Vec<vk::DescriptorSetLayout> = Vec::new();
            for set in 0..reflection.descriptor_set_count() {
                let bindings = descriptor_set_layout_bindings(&reflection, set);
                let layout_create = vk::DescriptorSetLayoutCreateInfo::default()
                    .bindings(&bindings);

                match gpu.device.create_descriptor_set_layout(&layout_create, None) {
                    Ok(layout) => descriptor_set_layouts.push(layout),
                    Err(e) => {
                        destroy_set_layouts(&gpu, &descriptor_set_layouts);
                        engine_bail!("vbench::vulkan", "Failed to create descriptor set layout {}: {:?}", set, e);
                    }
                }
            }

            let layout_create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&descriptor_set_layouts);

            let pipeline_layout = match gpu.device.create_pipeline_layout(&layout_create_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    destroy_set_layouts(&gpu, &descriptor_set_layouts);
                    engine_bail!("vbench::vulkan", "Failed to create pipeline layout: {:?}", e);
                }
            };

            let shader_stages = [
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(vertex_shader.stage()))
                    .module(vertex_shader.module)
                    .name(ENTRY_POINT),
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(fragment_shader.stage()))
                    .module(fragment_shader.module)
                    .name(ENTRY_POINT),
            ];

            // Vertex input state
            let vertex_bindings = [vk::VertexInputBindingDescription {
                binding: 0,
                stride: Vertex::STRIDE,
                input_rate: vk::VertexInputRate::VERTEX,
            }];
            let vertex_attributes = vertex_attributes();
            let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&vertex_bindings)
                .vertex_attribute_descriptions(&vertex_attributes);

            // Input assembly state
            let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
                .primitive_restart_enable(false);

            // Viewport state (dynamic)
            let viewports = [vk::Viewport::default()];
            let scissors = [vk::Rect2D::default()];
            let viewport_state = vk::PipelineViewportStateCreateInfo::default()
                .viewports(&viewports)
                .scissors(&scissors);

            // Rasterization state
            let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::NONE)
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false);

            // Multisample state
            let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
                .sample_shading_enable(false)
                .rasterization_samples(vk::SampleCountFlags::TYPE_1);

            // Color blend state
            let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false);
            let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
                .logic_op_enable(false)
                .attachments(std::slice::from_ref(&color_blend_attachment));

            // Dynamic state
            let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
            let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
                .dynamic_states(&dynamic_states);

            // Dynamic rendering: attachment formats replace the render pass
            let color_formats = [color_format];
            let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
                .color_attachment_formats(&color_formats);

            let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
                .push_next(&mut rendering_info)
                .stages(&shader_stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization_state)
                .multisample_state(&multisample_state)
                .color_blend_state(&color_blend_state)
                .dynamic_state(&dynamic_state)
                .layout(pipeline_layout);

            let pipelines = match gpu.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_create_info],
                None,
            ) {
                Ok(pipelines) => pipelines,
                Err((_, e)) => {
                    gpu.device.destroy_pipeline_layout(pipeline_layout, None);
                    destroy_set_layouts(&gpu, &descriptor_set_layouts);
                    engine_bail!("vbench::vulkan", "Failed to create graphics pipeline: {:?}", e);
                }
            };

            engine_debug!("vbench::vulkan",
                "Created pipeline ({:?}, {} descriptor set layout(s))",
                color_format, descriptor_set_layouts.len());

            Ok(Self {
                gpu,
                pipeline: pipelines[0],
                pipeline_layout,
                descriptor_set_layouts,
                reflection,
            })
        }
    }

    /// Merged descriptor bindings of both stages
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Number of descriptor-set layouts the pipeline layout was built with
    pub fn descriptor_set_count(&self) -> usize {
        self.descriptor_set_layouts.len()
    }

    pub(crate) fn descriptor_set_layout(&self, set: u32) -> Option<vk::DescriptorSetLayout> {
        self.descriptor_set_layouts.get(set as usize).copied()
    }
}

unsafe fn destroy_set_layouts(gpu: &GpuContext, layouts: &[vk::DescriptorSetLayout]) {
    for layout in layouts {
        gpu.device.destroy_descriptor_set_layout(*layout, None);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.gpu.device.destroy_pipeline(self.pipeline, None);
            self.gpu.device.destroy_pipeline_layout(self.pipeline_layout, None);
            destroy_set_layouts(&self.gpu, &self.descriptor_set_layouts);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
