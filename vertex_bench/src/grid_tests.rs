//! Unit tests for grid.rs

use crate::grid::{draw_uniform_data, generate_grid, DrawUniforms, Vertex, VertexFormat};

#[test]
fn test_vertex_layout() {
    assert_eq!(Vertex::STRIDE, 28);

    let layout = Vertex::attribute_layout();
    assert_eq!(layout[0].location, 0);
    assert_eq!(layout[0].format, VertexFormat::Float3);
    assert_eq!(layout[0].offset, 0);
    assert_eq!(layout[1].location, 1);
    assert_eq!(layout[1].format, VertexFormat::Float4);
    assert_eq!(layout[1].offset, 12);
    assert_eq!(layout[1].offset + layout[1].format.size_bytes(), Vertex::STRIDE);
}

#[test]
fn test_grid_vertex_count() {
    assert_eq!(generate_grid(3, 4).len(), 72);
    assert_eq!(generate_grid(1, 1).len(), 6);
    assert!(generate_grid(0, 5).is_empty());
}

#[test]
fn test_single_cell_triangles() {
    let vertices = generate_grid(1, 1);
    let positions: Vec<[f32; 3]> = vertices.iter().map(|v| v.position).collect();
    assert_eq!(
        positions,
        vec![
            [-1.0, -1.0, 0.0],
            [-1.0, 1.0, 0.0],
            [1.0, -1.0, 0.0],
            [1.0, -1.0, 0.0],
            [-1.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ]
    );
    // Whole cell takes the color of its lower-left corner
    assert!(vertices.iter().all(|v| v.color == [-1.0, -1.0, 1.0, 1.0]));
}

#[test]
fn test_grid_stays_in_clip_space() {
    let vertices = generate_grid(7, 13);
    for v in &vertices {
        assert!(v.position[0] >= -1.0 - 1e-5 && v.position[0] <= 1.0 + 1e-5);
        assert!(v.position[1] >= -1.0 - 1e-5 && v.position[1] <= 1.0 + 1e-5);
        assert_eq!(v.position[2], 0.0);
    }
}

#[test]
fn test_non_square_grid_normalized_by_larger_side() {
    // 2 rows, 4 columns: x reaches 1, y stops halfway
    let vertices = generate_grid(2, 4);
    let max_x = vertices.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max);
    let max_y = vertices.iter().map(|v| v.position[1]).fold(f32::MIN, f32::max);
    assert!((max_x - 1.0).abs() < 1e-5);
    assert!((max_y - 0.0).abs() < 1e-5);
}

#[test]
fn test_grid_bytes_are_pod() {
    let vertices = generate_grid(2, 2);
    let bytes: &[u8] = bytemuck::cast_slice(&vertices);
    assert_eq!(bytes.len(), vertices.len() * 28);
}

#[test]
fn test_draw_uniforms_block_size() {
    assert_eq!(DrawUniforms::SIZE, 192);
    let identity = DrawUniforms::identity();
    for transform in identity.transforms.iter() {
        for (i, column) in transform.iter().enumerate() {
            assert_eq!(column[i], 1.0);
            assert_eq!(column.iter().sum::<f32>(), 1.0);
        }
    }
}

#[test]
fn test_draw_uniform_data_places_blocks_at_stride() {
    let data = draw_uniform_data(3, 256);
    assert_eq!(data.len(), 768);

    let block = DrawUniforms::identity();
    let block_bytes: &[u8] = bytemuck::bytes_of(&block);
    for draw in 0..3 {
        let start = draw * 256;
        assert_eq!(&data[start..start + 192], block_bytes);
        assert!(data[start + 192..start + 256].iter().all(|b| *b == 0));
    }
}

#[test]
fn test_draw_uniform_data_without_padding() {
    let data = draw_uniform_data(2, DrawUniforms::SIZE);
    assert_eq!(data.len(), 384);
    assert_eq!(&data[..192], &data[192..]);
}

#[test]
#[should_panic(expected = "smaller than block size")]
fn test_draw_uniform_data_rejects_short_stride() {
    let _ = draw_uniform_data(1, 64);
}
