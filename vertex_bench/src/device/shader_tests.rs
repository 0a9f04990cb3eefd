//! Unit tests for shader.rs

use crate::device::shader::{
    is_dynamic_uniform_name, ShaderReflection, ShaderResourceKind, ShaderStage, ShaderStageFlags,
};
use crate::error::Error;

// ============================================================================
// CLASSIFICATION TESTS
// ============================================================================

#[test]
fn test_params_and_dynamic_lights_classification() {
    let mut reflection = ShaderReflection::new(ShaderStage::Vertex);
    reflection.add_uniform_buffer("params", Some("Params"), 0, 0);
    reflection.add_uniform_buffer("dynamic_lights", Some("Lights"), 2, 1);

    let kinds: Vec<ShaderResourceKind> = reflection.resources().iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![ShaderResourceKind::UniformBuffer, ShaderResourceKind::DynamicUniformBuffer]
    );
    assert_eq!(
        kinds.iter().filter(|k| **k == ShaderResourceKind::DynamicUniformBuffer).count(),
        1
    );
    assert_eq!(reflection.max_set_index(), 2);
}

#[test]
fn test_dynamic_marker_in_block_name() {
    let mut reflection = ShaderReflection::new(ShaderStage::Vertex);
    reflection.add_uniform_buffer("", Some("per_draw_dynamic"), 0, 0);

    let resource = &reflection.resources()[0];
    assert_eq!(resource.kind, ShaderResourceKind::DynamicUniformBuffer);
    assert_eq!(resource.name, "per_draw_dynamic");
}

#[test]
fn test_dynamic_marker_is_case_sensitive() {
    let mut reflection = ShaderReflection::new(ShaderStage::Vertex);
    reflection.add_uniform_buffer("", Some("DynamicTransforms"), 0, 0);
    reflection.add_uniform_buffer("PerDrawDynamic", Some("Transforms"), 0, 1);
    reflection.add_uniform_buffer("DYNAMIC", None, 0, 2);

    assert!(reflection
        .resources()
        .iter()
        .all(|r| r.kind == ShaderResourceKind::UniformBuffer));
}

#[test]
fn test_dynamic_marker_helper() {
    assert!(is_dynamic_uniform_name(&["dynamic_lights"]));
    assert!(is_dynamic_uniform_name(&["ubo", "per_draw_dynamic"]));
    assert!(!is_dynamic_uniform_name(&["ubo", "PerDrawDynamic"]));
    assert!(!is_dynamic_uniform_name(&["params", "Params"]));
    assert!(!is_dynamic_uniform_name(&[]));
}

#[test]
fn test_sampled_image_is_image_sampler() {
    let mut reflection = ShaderReflection::new(ShaderStage::Fragment);
    reflection.add_sampled_image("albedo", 1, 3);

    let resource = &reflection.resources()[0];
    assert_eq!(resource.kind, ShaderResourceKind::ImageSampler);
    assert_eq!((resource.set, resource.binding), (1, 3));
    assert_eq!(resource.stages, ShaderStageFlags::FRAGMENT);
}

// ============================================================================
// SET COUNT TESTS
// ============================================================================

#[test]
fn test_empty_reflection_counts() {
    let reflection = ShaderReflection::new(ShaderStage::Vertex);
    assert!(reflection.is_empty());
    assert_eq!(reflection.max_set_index(), 0);
    assert_eq!(reflection.descriptor_set_count(), 0);
}

#[test]
fn test_default_reflection_covers_no_stage() {
    let reflection = ShaderReflection::default();
    assert!(reflection.is_empty());
    assert_eq!(reflection.stages(), ShaderStageFlags::empty());
    assert_eq!(ShaderStageFlags::default(), ShaderStageFlags::empty());
    assert_eq!(reflection.descriptor_set_count(), 0);
}

#[test]
fn test_descriptor_set_count_is_max_index_plus_one() {
    let mut reflection = ShaderReflection::new(ShaderStage::Vertex);
    reflection.add_uniform_buffer("params", None, 3, 0);
    reflection.add_uniform_buffer("camera", None, 1, 0);

    assert_eq!(reflection.max_set_index(), 3);
    assert_eq!(reflection.descriptor_set_count(), 4);
}

#[test]
fn test_resources_in_set_sorted_by_binding() {
    let mut reflection = ShaderReflection::new(ShaderStage::Vertex);
    reflection.add_uniform_buffer("b", None, 0, 2);
    reflection.add_uniform_buffer("other_set", None, 1, 0);
    reflection.add_uniform_buffer("a", None, 0, 0);

    let bindings: Vec<u32> = reflection.resources_in_set(0).iter().map(|r| r.binding).collect();
    assert_eq!(bindings, vec![0, 2]);
    assert!(reflection.resources_in_set(5).is_empty());
}

// ============================================================================
// MERGE TESTS
// ============================================================================

#[test]
fn test_merge_combines_stage_flags_for_shared_slot() {
    let mut vertex = ShaderReflection::new(ShaderStage::Vertex);
    vertex.add_uniform_buffer("params", None, 0, 0);

    let mut fragment = ShaderReflection::new(ShaderStage::Fragment);
    fragment.add_uniform_buffer("params", None, 0, 0);
    fragment.add_sampled_image("albedo", 1, 0);

    vertex.merge(&fragment).unwrap();

    assert_eq!(vertex.resources().len(), 2);
    assert_eq!(
        vertex.resources()[0].stages,
        ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT
    );
    assert_eq!(vertex.resources()[1].stages, ShaderStageFlags::FRAGMENT);
    assert_eq!(vertex.max_set_index(), 1);
    assert_eq!(vertex.stages(), ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT);
}

#[test]
fn test_merge_rejects_kind_mismatch() {
    let mut vertex = ShaderReflection::new(ShaderStage::Vertex);
    vertex.add_uniform_buffer("params", None, 0, 0);

    let mut fragment = ShaderReflection::new(ShaderStage::Fragment);
    fragment.add_sampled_image("params", 0, 0);

    match vertex.merge(&fragment) {
        Err(Error::ShaderReflectionFailed(msg)) => assert!(msg.contains("set=0, binding=0")),
        other => panic!("expected ShaderReflectionFailed, got {:?}", other),
    }
}

#[test]
fn test_merge_with_empty_keeps_resources() {
    let mut vertex = ShaderReflection::new(ShaderStage::Vertex);
    vertex.add_uniform_buffer("params", None, 2, 0);

    vertex.merge(&ShaderReflection::new(ShaderStage::Fragment)).unwrap();

    assert_eq!(vertex.resources().len(), 1);
    assert_eq!(vertex.descriptor_set_count(), 3);
}
