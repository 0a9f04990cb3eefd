/// Vertex grid test data
///
/// The benchmark draws a flat grid of colored quads covering clip space. Each cell becomes two
/// triangles, six vertices, so the vertex count scales with rows * columns.

use bytemuck::{Pod, Zeroable};

/// Distance between grid lines before normalization
const GRID_SPACING: f32 = 0.1;

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    /// Three 32-bit floats
    Float3,
    /// Four 32-bit floats
    Float4,
}

impl VertexFormat {
    /// Size in bytes
    pub fn size_bytes(&self) -> u32 {
        match self {
            VertexFormat::Float3 => 12,
            VertexFormat::Float4 => 16,
        }
    }
}

/// One attribute of the vertex layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Format
    pub format: VertexFormat,
    /// Byte offset inside the vertex
    pub offset: u32,
}

/// Grid vertex: position in clip space and RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    /// Byte stride between consecutive vertices
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// Attribute layout matching the grid shaders (location 0 = position, 1 = color)
    pub fn attribute_layout() -> [VertexAttribute; 2] {
        [
            VertexAttribute {
                location: 0,
                format: VertexFormat::Float3,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            VertexAttribute {
                location: 1,
                format: VertexFormat::Float4,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// Per-draw uniform block of the uniform benchmark mode
///
/// Three chained transforms (column-major), applied to every grid vertex by `grid_uniform.vert`.
/// Field order and size match the std140 layout of the shader block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub transforms: [[[f32; 4]; 4]; 3],
}

impl DrawUniforms {
    /// Size of one block in bytes
    pub const SIZE: u64 = std::mem::size_of::<DrawUniforms>() as u64;

    /// Block leaving the grid where it is
    pub fn identity() -> Self {
        let identity = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self { transforms: [identity; 3] }
    }
}

/// Contents of a dynamic uniform buffer holding one identity block per draw
///
/// Block `i` starts at `i * stride`; the padding between blocks stays zeroed.
///
/// # Panics
///
/// Panics if `stride` is smaller than one block.
pub fn draw_uniform_data(draw_count: u32, stride: u64) -> Vec<u8> {
    assert!(stride >= DrawUniforms::SIZE, "draw_uniform_data: stride {} smaller than block size {}", stride, DrawUniforms::SIZE);

    let block = DrawUniforms::identity();
    let block_bytes: &[u8] = bytemuck::bytes_of(&block);
    let mut data = vec![0u8; (draw_count as u64 * stride) as usize];
    for draw in 0..draw_count as usize {
        let start = draw * stride as usize;
        data[start..start + block_bytes.len()].copy_from_slice(block_bytes);
    }
    data
}

/// Generate the benchmark grid
///
/// Coordinates are normalized by the larger of the two dimensions, so a square grid spans
/// `[-1, 1)` on both axes. Each vertex is colored `(x, y, 1, 1)`.
pub fn generate_grid(rows: u32, columns: u32) -> Vec<Vertex> {
    let max_coord = rows.max(columns) as f32 * GRID_SPACING;
    let to_clip = |i: u32| (i as f32 * GRID_SPACING / max_coord) * 2.0 - 1.0;

    let mut vertices = Vec::with_capacity(rows as usize * columns as usize * 6);
    for row in 0..rows {
        for col in 0..columns {
            let x = to_clip(col);
            let y = to_clip(row);
            let next_x = to_clip(col + 1);
            let next_y = to_clip(row + 1);
            let color = [x, y, 1.0, 1.0];
            let vertex = |px: f32, py: f32| Vertex { position: [px, py, 0.0], color };

            vertices.extend_from_slice(&[
                vertex(x, y),
                vertex(x, next_y),
                vertex(next_x, y),
                vertex(next_x, y),
                vertex(x, next_y),
                vertex(next_x, next_y),
            ]);
        }
    }
    vertices
}

#[cfg(test)]
#[path = "grid_tests.rs"]
mod tests;
