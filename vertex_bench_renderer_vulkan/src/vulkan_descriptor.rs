/// DynamicUniformSet - descriptor set binding one dynamic uniform buffer
///
/// Built from the pipeline's reflected layout for the set holding its dynamic uniform block.
/// The set points at the start of the buffer with a one-block range; each draw selects its
/// block through the dynamic offset passed to `CommandList::bind_dynamic_uniform`.

use ash::vk;
use std::sync::Arc;
use vertex_bench::vbench::{Error, Result};
use vertex_bench::vbench::device::{BufferUsage, ShaderReflection, ShaderResourceKind};
use vertex_bench::{engine_bail, engine_debug, engine_err};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_pipeline::Pipeline;

/// Set and binding of the dynamic uniform block a pipeline exposes
///
/// The set must hold nothing else, since only that one descriptor is written.
pub(crate) fn find_dynamic_uniform(reflection: &ShaderReflection) -> Result<(u32, u32)> {
    let Some(resource) = reflection
        .resources()
        .iter()
        .find(|r| r.kind == ShaderResourceKind::DynamicUniformBuffer)
    else {
        return Err(Error::InvalidResource(
            "Pipeline declares no dynamic uniform buffer".to_string(),
        ));
    };

    let in_set = reflection.resources_in_set(resource.set);
    if in_set.len() != 1 {
        return Err(Error::InvalidResource(format!(
            "Dynamic uniform '{}' shares set {} with {} other binding(s)",
            resource.name, resource.set, in_set.len() - 1
        )));
    }
    Ok((resource.set, resource.binding))
}

/// Check that `range` bytes of `buffer` can back one dynamic uniform block
pub(crate) fn check_uniform_range(usage: BufferUsage, buffer_size: u64, range: u64) -> Result<()> {
    if !usage.contains(BufferUsage::UNIFORM) {
        return Err(Error::InvalidResource(
            "Dynamic uniform buffer must be created with BufferUsage::UNIFORM".to_string(),
        ));
    }
    if range == 0 || range > buffer_size {
        return Err(Error::InvalidResource(format!(
            "Uniform range {} does not fit a {}-byte buffer", range, buffer_size
        )));
    }
    Ok(())
}

/// Vulkan descriptor set with a single dynamic uniform buffer binding
pub struct DynamicUniformSet {
    /// Shared GPU context (for cleanup)
    gpu: Arc<GpuContext>,
    /// Pool owning the set (one set, destroyed with it)
    pool: vk::DescriptorPool,
    /// Descriptor set handle
    pub(crate) descriptor_set: vk::DescriptorSet,
    /// Set index in the pipeline layout
    pub(crate) set_index: u32,
    /// Bytes visible to one draw
    range: u64,
}

impl DynamicUniformSet {
    pub(crate) fn new(gpu: Arc<GpuContext>, pipeline: &Pipeline, buffer: &Buffer, range: u64) -> Result<Self> {
        let (set_index, binding) = find_dynamic_uniform(pipeline.reflection())?;
        check_uniform_range(buffer.usage(), buffer.size(), range)?;

        let Some(layout) = pipeline.descriptor_set_layout(set_index) else {
            engine_bail!("vbench::vulkan", "Pipeline has no layout for descriptor set {}", set_index);
        };

        unsafe {
            let pool_sizes = [vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 1,
            }];
            let pool_info = vk::DescriptorPoolCreateInfo::default()
                .pool_sizes(&pool_sizes)
                .max_sets(1);

            let pool = gpu.device.create_descriptor_pool(&pool_info, None)
                .map_err(|e| engine_err!("vbench::vulkan", "Failed to create descriptor pool: {:?}", e))?;

            let layouts = [layout];
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);

            let descriptor_set = match gpu.device.allocate_descriptor_sets(&allocate_info) {
                Ok(sets) => sets[0],
                Err(e) => {
                    gpu.device.destroy_descriptor_pool(pool, None);
                    engine_bail!("vbench::vulkan", "Failed to allocate descriptor set: {:?}", e);
                }
            };

            let buffer_info = vk::DescriptorBufferInfo::default()
                .buffer(buffer.allocation().buffer())
                .offset(0)
                .range(range);
            let write = vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(binding)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .buffer_info(std::slice::from_ref(&buffer_info));

            gpu.device.update_descriptor_sets(&[write], &[]);

            engine_debug!("vbench::vulkan",
                "Dynamic uniform set {} (binding {}) over '{}', {} bytes per draw",
                set_index, binding, buffer.name(), range);

            Ok(Self {
                gpu,
                pool,
                descriptor_set,
                set_index,
                range,
            })
        }
    }

    /// Bytes visible to one draw
    pub fn range(&self) -> u64 {
        self.range
    }

    /// Set index in the pipeline layout
    pub fn set_index(&self) -> u32 {
        self.set_index
    }
}

impl Drop for DynamicUniformSet {
    fn drop(&mut self) {
        // Destroying the pool frees the set
        unsafe {
            self.gpu.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_descriptor_tests.rs"]
mod tests;
