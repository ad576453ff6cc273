use bytemuck::{Pod, Zeroable};

use crate::error::{AnalysisError, Result};

/// Floats per vertex: position.xy followed by texcoord.uv
pub const FLOATS_PER_VERTEX: usize = 4;

/// Vertices drawn per pass (two triangles)
pub const QUAD_VERTEX_COUNT: u32 = 6;

// Full clip-space quad. Clip y = +1 is the top of the framebuffer and maps to
// v = 0, so texture row 0 lands on framebuffer row 0.
#[rustfmt::skip]
pub const QUAD_VERTICES: [f32; 24] = [
    // x     y     u    v
    -1.0,  1.0,  0.0, 0.0,
    -1.0, -1.0,  0.0, 1.0,
     1.0, -1.0,  1.0, 1.0,

    -1.0,  1.0,  0.0, 0.0,
     1.0, -1.0,  1.0, 1.0,
     1.0,  1.0,  1.0, 0.0,
];

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

impl QuadVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// The static quad viewed as typed vertices
pub fn quad_vertices() -> &'static [QuadVertex] {
    bytemuck::cast_slice(&QUAD_VERTICES)
}

/// Rejects vertex data that cannot feed one full quad draw
pub fn check_vertex_data(vertices: &[f32]) -> Result<()> {
    let needed = FLOATS_PER_VERTEX * QUAD_VERTEX_COUNT as usize;
    if vertices.len() < needed || vertices.len() % FLOATS_PER_VERTEX != 0 {
        return Err(AnalysisError::resource(
            "vertex buffer",
            format!(
                "{} floats do not hold {} whole (x, y, u, v) vertices",
                vertices.len(),
                QUAD_VERTEX_COUNT
            ),
        ));
    }
    Ok(())
}
