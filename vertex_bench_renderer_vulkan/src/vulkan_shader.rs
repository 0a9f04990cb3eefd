/// Shader - Vulkan shader module plus reflected descriptor bindings
///
/// SPIR-V bytecode is reflected with spirq when the module is created, so pipeline layouts
/// are derived from the shader itself instead of hand-written binding tables.

use vertex_bench::vbench::{Error, Result};
use vertex_bench::vbench::device::{
    ShaderReflection, ShaderResourceKind, ShaderStage, ShaderStageFlags,
};
use vertex_bench::{engine_bail_warn, engine_debug, engine_err, engine_error, engine_warn};
use ash::vk;
use rustc_hash::FxHashSet;
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// First word of every SPIR-V module
pub(crate) const SPIRV_MAGIC: u32 = 0x0723_0203;
/// Words in the SPIR-V module header
const SPIRV_HEADER_WORDS: usize = 5;

/// Entry point of every module
pub(crate) const ENTRY_POINT: &CStr = c"main";

// ============================================================================
// Reflection
// ============================================================================

/// Reflect the descriptor bindings of a SPIR-V module
///
/// Uniform buffers are classified as dynamic when their variable or block name carries the
/// dynamic marker. Sampled images and combined image samplers become image samplers. Other
/// descriptor types are not used by the benchmark and are skipped with a warning.
///
/// # Errors
///
/// Returns `ShaderReflectionFailed` if the bytecode is not a well-formed SPIR-V module.
pub fn reflect_spirv(code: &[u32], stage: ShaderStage) -> Result<ShaderReflection> {
    if code.len() < SPIRV_HEADER_WORDS || code[0] != SPIRV_MAGIC {
        engine_error!("vbench::vulkan",
            "Invalid SPIR-V for {:?} shader ({} words, magic {:#010x})",
            stage, code.len(), code.first().copied().unwrap_or(0));
        return Err(Error::ShaderReflectionFailed(format!(
            "Not a SPIR-V module ({} words)", code.len()
        )));
    }

    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| {
            engine_error!("vbench::vulkan", "SPIR-V reflection failed for {:?} shader: {:?}", stage, e);
            Error::ShaderReflectionFailed(format!("SPIR-V reflection failed: {:?}", e))
        })?;

    let mut reflection = ShaderReflection::new(stage);
    // Several entry points may reference the same variable
    let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();

    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            let spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, ty, .. } = var else {
                continue;
            };

            let (set, binding) = (desc_bind.set(), desc_bind.bind());
            if !seen.insert((set, binding)) {
                continue;
            }
            let name = name.clone().unwrap_or_default();

            use spirq::ty::DescriptorType;
            match desc_ty {
                DescriptorType::UniformBuffer() => {
                    let block_name = match ty {
                        spirq::ty::Type::Struct(st) => st.name.as_deref(),
                        _ => None,
                    };
                    reflection.add_uniform_buffer(&name, block_name, set, binding);
                }
                DescriptorType::SampledImage() | DescriptorType::CombinedImageSampler() => {
                    reflection.add_sampled_image(&name, set, binding);
                }
                other => {
                    engine_warn!("vbench::vulkan",
                        "Skipping unsupported descriptor '{}' (set={}, binding={}): {:?}",
                        name, set, binding, other);
                }
            }
        }
    }

    engine_debug!("vbench::vulkan",
        "Reflected {:?} shader: {} resource(s), max set index {}",
        stage, reflection.resources().len(), reflection.max_set_index());

    Ok(reflection)
}

/// Merge the reflections of every stage of a pipeline
pub fn merge_shader_reflections(reflections: &[&ShaderReflection]) -> Result<ShaderReflection> {
    let mut merged = ShaderReflection::default();
    for reflection in reflections {
        merged.merge(reflection)?;
    }
    Ok(merged)
}

// ============================================================================
// Conversions
// ============================================================================

pub(crate) fn descriptor_type_to_vk(kind: ShaderResourceKind) -> vk::DescriptorType {
    match kind {
        ShaderResourceKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ShaderResourceKind::DynamicUniformBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        ShaderResourceKind::ImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

pub(crate) fn stage_flags_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStageFlags::VERTEX) { flags |= vk::ShaderStageFlags::VERTEX; }
    if stages.contains(ShaderStageFlags::FRAGMENT) { flags |= vk::ShaderStageFlags::FRAGMENT; }
    if stages.contains(ShaderStageFlags::COMPUTE) { flags |= vk::ShaderStageFlags::COMPUTE; }
    flags
}

pub(crate) fn shader_stage_to_vk(stage: ShaderStage) -> vk::ShaderStageFlags {
    stage_flags_to_vk(stage.into())
}

/// Descriptor-set layout bindings for one set, sorted by binding index
pub(crate) fn descriptor_set_layout_bindings(
    reflection: &ShaderReflection,
    set: u32,
) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    reflection
        .resources_in_set(set)
        .into_iter()
        .map(|resource| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(resource.binding)
                .descriptor_type(descriptor_type_to_vk(resource.kind))
                .descriptor_count(1)
                .stage_flags(stage_flags_to_vk(resource.stages))
        })
        .collect()
}

// ============================================================================
// Shader module
// ============================================================================

/// Vulkan shader implementation
pub struct Shader {
    /// Shared GPU context (for cleanup)
    gpu: Arc<GpuContext>,
    /// Vulkan shader module
    pub(crate) module: vk::ShaderModule,
    /// Shader stage
    stage: ShaderStage,
    /// Reflected descriptor bindings
    reflection: ShaderReflection,
}

impl Shader {
    /// Reflect SPIR-V words and create the shader module
    ///
    /// Reflection runs first, so malformed bytecode never reaches the driver.
    pub(crate) fn from_words(gpu: Arc<GpuContext>, code: &[u32], stage: ShaderStage) -> Result<Self> {
        let reflection = reflect_spirv(code, stage)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe {
            gpu.device.create_shader_module(&create_info, None)
                .map_err(|e| engine_err!("vbench::vulkan", "Failed to create shader module: {:?}", e))?
        };

        Ok(Self { gpu, module, stage, reflection })
    }

    /// Create a shader from raw SPIR-V bytes
    pub(crate) fn from_bytes(gpu: Arc<GpuContext>, bytes: &[u8], stage: ShaderStage) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            engine_bail_warn!("vbench::vulkan",
                "Shader code not 4-byte aligned (size: {} bytes)", bytes.len());
        }

        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
            .map_err(|e| Error::ShaderReflectionFailed(format!("Failed to read SPIR-V: {}", e)))?;

        Self::from_words(gpu, &code, stage)
    }

    /// Load a compiled SPIR-V file
    pub(crate) fn load(gpu: Arc<GpuContext>, path: &Path, stage: ShaderStage) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| engine_err!("vbench::vulkan", "Failed to read shader '{}': {}", path.display(), e))?;

        engine_debug!("vbench::vulkan", "Loading {:?} shader from '{}'", stage, path.display());
        Self::from_bytes(gpu, &bytes, stage)
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Descriptor bindings discovered in the bytecode
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Highest descriptor set index used by the shader
    pub fn max_set_index(&self) -> u32 {
        self.reflection.max_set_index()
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.gpu.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
