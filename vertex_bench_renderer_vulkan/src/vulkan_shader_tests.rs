//! Unit tests for vulkan_shader.rs
//!
//! Reflection runs on small SPIR-V modules assembled in the tests, so no GPU or shader
//! compiler is needed.

use ash::vk;
use vertex_bench::vbench::device::{ShaderReflection, ShaderResourceKind, ShaderStage, ShaderStageFlags};
use vertex_bench::vbench::Error;

use crate::vulkan_shader::{
    descriptor_set_layout_bindings, descriptor_type_to_vk, merge_shader_reflections,
    reflect_spirv, stage_flags_to_vk, SPIRV_MAGIC,
};

// ============================================================================
// SPIR-V ASSEMBLER
// ============================================================================

const OP_NAME: u32 = 5;
const OP_MEMORY_MODEL: u32 = 14;
const OP_ENTRY_POINT: u32 = 15;
const OP_CAPABILITY: u32 = 17;
const OP_TYPE_VOID: u32 = 19;
const OP_TYPE_FLOAT: u32 = 22;
const OP_TYPE_IMAGE: u32 = 25;
const OP_TYPE_SAMPLED_IMAGE: u32 = 27;
const OP_TYPE_STRUCT: u32 = 30;
const OP_TYPE_POINTER: u32 = 32;
const OP_TYPE_FUNCTION: u32 = 33;
const OP_FUNCTION: u32 = 54;
const OP_FUNCTION_END: u32 = 56;
const OP_VARIABLE: u32 = 59;
const OP_DECORATE: u32 = 71;
const OP_MEMBER_DECORATE: u32 = 72;
const OP_LABEL: u32 = 248;
const OP_RETURN: u32 = 253;

const DECORATION_BLOCK: u32 = 2;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;
const DECORATION_OFFSET: u32 = 35;

const STORAGE_UNIFORM_CONSTANT: u32 = 0;
const STORAGE_UNIFORM: u32 = 2;

/// Uniform block declared in a test module
struct UniformDecl<'a> {
    /// Instance name (None for an anonymous instance)
    var_name: Option<&'a str>,
    block_name: &'a str,
    set: u32,
    binding: u32,
}

/// Encode a NUL-terminated, zero-padded literal string
fn literal_string(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn emit(section: &mut Vec<u32>, opcode: u32, operands: &[u32]) {
    section.push(((operands.len() as u32 + 1) << 16) | opcode);
    section.extend_from_slice(operands);
}

fn emit_name(section: &mut Vec<u32>, id: u32, name: &str) {
    let mut operands = vec![id];
    operands.extend(literal_string(name));
    emit(section, OP_NAME, &operands);
}

/// Assemble a vertex-stage module declaring the given uniform blocks and sampled images
fn build_module(uniforms: &[UniformDecl], images: &[(&str, u32, u32)]) -> Vec<u32> {
    let mut debug = Vec::new();
    let mut annotations = Vec::new();
    let mut types = Vec::new();

    // Fixed ids
    let void_id = 1;
    let fn_type_id = 2;
    let float_id = 3;
    let main_id = 4;
    let label_id = 5;
    let mut next_id = 6;

    emit(&mut types, OP_TYPE_VOID, &[void_id]);
    emit(&mut types, OP_TYPE_FUNCTION, &[fn_type_id, void_id]);
    emit(&mut types, OP_TYPE_FLOAT, &[float_id, 32]);

    for uniform in uniforms {
        let struct_id = next_id;
        let pointer_id = next_id + 1;
        let var_id = next_id + 2;
        next_id += 3;

        emit_name(&mut debug, struct_id, uniform.block_name);
        if let Some(var_name) = uniform.var_name {
            emit_name(&mut debug, var_id, var_name);
        }

        emit(&mut annotations, OP_DECORATE, &[struct_id, DECORATION_BLOCK]);
        emit(&mut annotations, OP_MEMBER_DECORATE, &[struct_id, 0, DECORATION_OFFSET, 0]);
        emit(&mut annotations, OP_DECORATE, &[var_id, DECORATION_DESCRIPTOR_SET, uniform.set]);
        emit(&mut annotations, OP_DECORATE, &[var_id, DECORATION_BINDING, uniform.binding]);

        emit(&mut types, OP_TYPE_STRUCT, &[struct_id, float_id]);
        emit(&mut types, OP_TYPE_POINTER, &[pointer_id, STORAGE_UNIFORM, struct_id]);
        emit(&mut types, OP_VARIABLE, &[pointer_id, var_id, STORAGE_UNIFORM]);
    }

    if !images.is_empty() {
        let image_id = next_id;
        let sampled_image_id = next_id + 1;
        let pointer_id = next_id + 2;
        next_id += 3;

        // 2D, not depth, not arrayed, single-sampled, sampled, unknown format
        emit(&mut types, OP_TYPE_IMAGE, &[image_id, float_id, 1, 0, 0, 0, 1, 0]);
        emit(&mut types, OP_TYPE_SAMPLED_IMAGE, &[sampled_image_id, image_id]);
        emit(&mut types, OP_TYPE_POINTER, &[pointer_id, STORAGE_UNIFORM_CONSTANT, sampled_image_id]);

        for (name, set, binding) in images {
            let var_id = next_id;
            next_id += 1;

            emit_name(&mut debug, var_id, name);
            emit(&mut annotations, OP_DECORATE, &[var_id, DECORATION_DESCRIPTOR_SET, *set]);
            emit(&mut annotations, OP_DECORATE, &[var_id, DECORATION_BINDING, *binding]);
            emit(&mut types, OP_VARIABLE, &[pointer_id, var_id, STORAGE_UNIFORM_CONSTANT]);
        }
    }

    // Header: magic, version 1.0, generator, bound, schema
    let mut module = vec![SPIRV_MAGIC, 0x0001_0000, 0, next_id, 0];
    emit(&mut module, OP_CAPABILITY, &[1]);
    emit(&mut module, OP_MEMORY_MODEL, &[0, 1]);
    let mut entry = vec![0, main_id];
    entry.extend(literal_string("main"));
    emit(&mut module, OP_ENTRY_POINT, &entry);
    module.extend(debug);
    module.extend(annotations);
    module.extend(types);
    emit(&mut module, OP_FUNCTION, &[void_id, main_id, 0, fn_type_id]);
    emit(&mut module, OP_LABEL, &[label_id]);
    emit(&mut module, OP_RETURN, &[]);
    emit(&mut module, OP_FUNCTION_END, &[]);
    module
}

fn find<'a>(reflection: &'a ShaderReflection, name: &str) -> &'a vertex_bench::vbench::device::ShaderResource {
    reflection
        .resources()
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("resource '{}' not reflected: {:?}", name, reflection.resources()))
}

// ============================================================================
// REFLECTION TESTS
// ============================================================================

#[test]
fn test_reflect_params_and_dynamic_lights() {
    let code = build_module(
        &[
            UniformDecl { var_name: Some("params"), block_name: "Params", set: 0, binding: 0 },
            UniformDecl { var_name: Some("dynamic_lights"), block_name: "Lights", set: 2, binding: 0 },
        ],
        &[],
    );

    let reflection = reflect_spirv(&code, ShaderStage::Vertex).unwrap();

    assert_eq!(reflection.resources().len(), 2);
    assert_eq!(find(&reflection, "params").kind, ShaderResourceKind::UniformBuffer);
    assert_eq!(find(&reflection, "dynamic_lights").kind, ShaderResourceKind::DynamicUniformBuffer);
    assert_eq!(find(&reflection, "dynamic_lights").set, 2);
    assert_eq!(reflection.max_set_index(), 2);
    assert_eq!(reflection.descriptor_set_count(), 3);
    assert_eq!(reflection.stages(), ShaderStageFlags::VERTEX);
}

#[test]
fn test_reflect_sampled_image() {
    let code = build_module(
        &[UniformDecl { var_name: Some("params"), block_name: "Params", set: 0, binding: 0 }],
        &[("albedo", 1, 3)],
    );

    let reflection = reflect_spirv(&code, ShaderStage::Fragment).unwrap();

    let albedo = find(&reflection, "albedo");
    assert_eq!(albedo.kind, ShaderResourceKind::ImageSampler);
    assert_eq!((albedo.set, albedo.binding), (1, 3));
    assert_eq!(albedo.stages, ShaderStageFlags::FRAGMENT);
    assert_eq!(reflection.max_set_index(), 1);
}

#[test]
fn test_reflect_anonymous_dynamic_block() {
    let code = build_module(
        &[UniformDecl { var_name: None, block_name: "dynamic_transforms", set: 0, binding: 1 }],
        &[],
    );

    let reflection = reflect_spirv(&code, ShaderStage::Vertex).unwrap();

    assert_eq!(reflection.resources().len(), 1);
    let resource = &reflection.resources()[0];
    assert_eq!(resource.kind, ShaderResourceKind::DynamicUniformBuffer);
    assert_eq!(resource.name, "dynamic_transforms");
    assert_eq!(resource.binding, 1);
}

#[test]
fn test_reflect_module_without_resources() {
    let code = build_module(&[], &[]);

    let reflection = reflect_spirv(&code, ShaderStage::Vertex).unwrap();

    assert!(reflection.is_empty());
    assert_eq!(reflection.max_set_index(), 0);
    assert_eq!(reflection.descriptor_set_count(), 0);
}

#[test]
fn test_reflect_rejects_bad_magic() {
    let mut code = build_module(&[], &[]);
    code[0] = 0xDEAD_BEEF;

    assert!(matches!(
        reflect_spirv(&code, ShaderStage::Vertex),
        Err(Error::ShaderReflectionFailed(_))
    ));
}

#[test]
fn test_reflect_rejects_short_module() {
    assert!(matches!(
        reflect_spirv(&[], ShaderStage::Vertex),
        Err(Error::ShaderReflectionFailed(_))
    ));
    assert!(matches!(
        reflect_spirv(&[SPIRV_MAGIC, 0x0001_0000], ShaderStage::Vertex),
        Err(Error::ShaderReflectionFailed(_))
    ));
}

// ============================================================================
// MERGE AND LAYOUT TESTS
// ============================================================================

#[test]
fn test_merge_vertex_and_fragment() {
    let vertex = reflect_spirv(
        &build_module(
            &[UniformDecl { var_name: Some("params"), block_name: "Params", set: 0, binding: 0 }],
            &[],
        ),
        ShaderStage::Vertex,
    ).unwrap();
    let fragment = reflect_spirv(
        &build_module(
            &[UniformDecl { var_name: Some("params"), block_name: "Params", set: 0, binding: 0 }],
            &[("albedo", 1, 0)],
        ),
        ShaderStage::Fragment,
    ).unwrap();

    let merged = merge_shader_reflections(&[&vertex, &fragment]).unwrap();

    assert_eq!(merged.resources().len(), 2);
    assert_eq!(find(&merged, "params").stages, ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT);
    assert_eq!(merged.descriptor_set_count(), 2);

    let set0 = descriptor_set_layout_bindings(&merged, 0);
    assert_eq!(set0.len(), 1);
    assert_eq!(set0[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(set0[0].stage_flags, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);

    let set1 = descriptor_set_layout_bindings(&merged, 1);
    assert_eq!(set1.len(), 1);
    assert_eq!(set1[0].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    assert_eq!(set1[0].stage_flags, vk::ShaderStageFlags::FRAGMENT);
}

#[test]
fn test_merge_conflicting_kinds_fails() {
    let vertex = reflect_spirv(
        &build_module(
            &[UniformDecl { var_name: Some("params"), block_name: "Params", set: 0, binding: 0 }],
            &[],
        ),
        ShaderStage::Vertex,
    ).unwrap();
    let fragment = reflect_spirv(&build_module(&[], &[("albedo", 0, 0)]), ShaderStage::Fragment).unwrap();

    assert!(matches!(
        merge_shader_reflections(&[&vertex, &fragment]),
        Err(Error::ShaderReflectionFailed(_))
    ));
}

#[test]
fn test_descriptor_type_to_vk() {
    assert_eq!(descriptor_type_to_vk(ShaderResourceKind::UniformBuffer), vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(
        descriptor_type_to_vk(ShaderResourceKind::DynamicUniformBuffer),
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
    );
    assert_eq!(
        descriptor_type_to_vk(ShaderResourceKind::ImageSampler),
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
    );
}

#[test]
fn test_stage_flags_to_vk() {
    assert_eq!(stage_flags_to_vk(ShaderStageFlags::VERTEX), vk::ShaderStageFlags::VERTEX);
    assert_eq!(
        stage_flags_to_vk(ShaderStageFlags::FRAGMENT | ShaderStageFlags::COMPUTE),
        vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::COMPUTE
    );
    assert!(stage_flags_to_vk(ShaderStageFlags::empty()).is_empty());
}
