/// Shader resource model
///
/// Backend-agnostic description of the descriptor bindings a shader module declares.
/// Backends fill a `ShaderReflection` from bytecode; pipeline construction merges the
/// reflections of all stages and builds one descriptor-set layout per set index.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};

/// Name fragment that marks a uniform buffer as dynamic (bound with a per-draw offset)
pub const DYNAMIC_UNIFORM_MARKER: &str = "dynamic";

/// Shader stage of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

bitflags! {
    /// Set of shader stages a resource is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

impl From<ShaderStage> for ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
        }
    }
}

/// Kind of resource bound at a descriptor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderResourceKind {
    /// Uniform buffer bound at a fixed offset
    UniformBuffer,
    /// Uniform buffer bound with a dynamic offset per draw
    DynamicUniformBuffer,
    /// Sampled image (combined with a sampler)
    ImageSampler,
}

/// One descriptor binding discovered in a shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderResource {
    /// Declared name (variable name, or block name when the variable is anonymous)
    pub name: String,
    /// Descriptor set index
    pub set: u32,
    /// Binding index within the set
    pub binding: u32,
    /// Resource kind
    pub kind: ShaderResourceKind,
    /// Stages that access the resource
    pub stages: ShaderStageFlags,
}

/// Returns true if any of the declared names carries the dynamic marker
///
/// Both the variable name and the block type name are checked, since GLSL front-ends differ
/// in which of the two they keep. The match is case-sensitive: `DynamicTransforms` is a plain
/// uniform buffer.
pub fn is_dynamic_uniform_name(names: &[&str]) -> bool {
    names.iter().any(|name| name.contains(DYNAMIC_UNIFORM_MARKER))
}

/// Descriptor bindings of one shader module, or of several merged stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    /// Stages this reflection covers
    stages: ShaderStageFlags,
    /// Resources in discovery order
    resources: Vec<ShaderResource>,
    /// Highest set index seen (0 when there are no resources)
    max_set_index: u32,
}

impl ShaderReflection {
    /// Create an empty reflection for one stage
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stages: stage.into(),
            resources: Vec::new(),
            max_set_index: 0,
        }
    }

    /// Record a uniform buffer, classifying it as dynamic when its name carries the marker
    ///
    /// # Arguments
    ///
    /// * `name` - Variable name (may be empty for anonymous instances)
    /// * `block_name` - Block type name, if the bytecode kept one
    /// * `set` - Descriptor set index
    /// * `binding` - Binding index
    pub fn add_uniform_buffer(&mut self, name: &str, block_name: Option<&str>, set: u32, binding: u32) {
        let names: Vec<&str> = std::iter::once(name).chain(block_name).collect();
        let kind = if is_dynamic_uniform_name(&names) {
            ShaderResourceKind::DynamicUniformBuffer
        } else {
            ShaderResourceKind::UniformBuffer
        };
        let display_name = if name.is_empty() { block_name.unwrap_or_default() } else { name };
        self.push(display_name, set, binding, kind);
    }

    /// Record a sampled image
    pub fn add_sampled_image(&mut self, name: &str, set: u32, binding: u32) {
        self.push(name, set, binding, ShaderResourceKind::ImageSampler);
    }

    fn push(&mut self, name: &str, set: u32, binding: u32, kind: ShaderResourceKind) {
        self.max_set_index = self.max_set_index.max(set);
        self.resources.push(ShaderResource {
            name: name.to_string(),
            set,
            binding,
            kind,
            stages: self.stages,
        });
    }

    /// Stages covered by this reflection
    pub fn stages(&self) -> ShaderStageFlags {
        self.stages
    }

    /// All discovered resources
    pub fn resources(&self) -> &[ShaderResource] {
        &self.resources
    }

    /// True when the module declares no descriptor bindings
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Highest descriptor set index used by any resource (0 when there are none)
    pub fn max_set_index(&self) -> u32 {
        self.max_set_index
    }

    /// Number of descriptor-set layouts a pipeline must provision (max set index + 1)
    pub fn descriptor_set_count(&self) -> u32 {
        if self.resources.is_empty() {
            0
        } else {
            self.max_set_index + 1
        }
    }

    /// Resources of one set, sorted by binding index
    pub fn resources_in_set(&self, set: u32) -> Vec<&ShaderResource> {
        let mut in_set: Vec<&ShaderResource> = self.resources.iter().filter(|r| r.set == set).collect();
        in_set.sort_by_key(|r| r.binding);
        in_set
    }

    /// Merge another stage's reflection into this one
    ///
    /// Resources declared at the same set/binding in both stages are combined, with their stage
    /// flags OR-ed together.
    ///
    /// # Errors
    ///
    /// Returns `ShaderReflectionFailed` if the same slot has a different kind in the two stages.
    pub fn merge(&mut self, other: &ShaderReflection) -> Result<()> {
        let mut slots: FxHashMap<(u32, u32), usize> = self
            .resources
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.set, r.binding), i))
            .collect();

        for resource in &other.resources {
            match slots.get(&(resource.set, resource.binding)) {
                Some(&index) => {
                    let existing = &mut self.resources[index];
                    if existing.kind != resource.kind {
                        return Err(Error::ShaderReflectionFailed(format!(
                            "Binding '{}' (set={}, binding={}) is {:?} in {:?} but {:?} in {:?}",
                            existing.name, existing.set, existing.binding,
                            existing.kind, existing.stages, resource.kind, resource.stages
                        )));
                    }
                    existing.stages |= resource.stages;
                }
                None => {
                    slots.insert((resource.set, resource.binding), self.resources.len());
                    self.resources.push(resource.clone());
                }
            }
        }

        self.stages |= other.stages;
        self.max_set_index = self.max_set_index.max(other.max_set_index);
        Ok(())
    }
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
