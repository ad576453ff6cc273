//! CPU reference rasterizer.
//!
//! Evaluates the same vertex and fragment math as the WGSL programs: the quad
//! is rasterized at pixel centers, texture coordinates are interpolated
//! barycentrically, sampling is bilinear with clamp-to-edge addressing and
//! fragment output is quantized to unorm8. Rows are shaded in parallel, each
//! pixel independently, so output is deterministic.

use rayon::prelude::*;

use crate::error::{AnalysisError, Result};
use crate::geometry::{check_vertex_data, FLOATS_PER_VERTEX, QUAD_VERTEX_COUNT};
use crate::shaders::ProgramKind;
use crate::statistics::LUMA_WEIGHTS;
use crate::surface::{
    check_region, GeometryHandle, PixelBuffer, ProgramHandle, RenderSurface, ResourceTable,
    TextureHandle, Uniforms, BYTES_PER_PIXEL,
};

/// Texture edge limit, matching wgpu's default `max_texture_dimension_2d`
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

struct SoftTexture {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl SoftTexture {
    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        // clamp-to-edge
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.texels[y * self.width as usize + x]
    }

    /// Bilinear sample at normalized coordinates
    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let tx = u * self.width as f32 - 0.5;
        let ty = v * self.height as f32 - 0.5;
        let x0 = tx.floor();
        let y0 = ty.floor();
        let fx = tx - x0;
        let fy = ty - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = lerp4(self.texel(x0, y0), self.texel(x0 + 1, y0), fx);
        let bottom = lerp4(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), fx);
        lerp4(top, bottom, fy)
    }

    fn luma(&self, u: f32, v: f32) -> f32 {
        let [r, g, b, _] = self.sample(u, v);
        r * LUMA_WEIGHTS[0] as f32 + g * LUMA_WEIGHTS[1] as f32 + b * LUMA_WEIGHTS[2] as f32
    }
}

fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

#[derive(Clone, Copy)]
struct Vertex {
    position: [f32; 2],
    tex_coord: [f32; 2],
}

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Interpolated texture coordinate if `p` lies inside the triangle
fn interpolate(tri: &[Vertex; 3], p: [f32; 2]) -> Option<[f32; 2]> {
    const INSIDE_EPSILON: f32 = -1e-6;

    let [a, b, c] = tri;
    let area = edge(a.position, b.position, c.position);
    if area.abs() <= f32::EPSILON {
        return None;
    }

    let w0 = edge(b.position, c.position, p) / area;
    let w1 = edge(c.position, a.position, p) / area;
    let w2 = edge(a.position, b.position, p) / area;
    if w0 < INSIDE_EPSILON || w1 < INSIDE_EPSILON || w2 < INSIDE_EPSILON {
        return None;
    }

    Some([
        w0 * a.tex_coord[0] + w1 * b.tex_coord[0] + w2 * c.tex_coord[0],
        w0 * a.tex_coord[1] + w1 * b.tex_coord[1] + w2 * c.tex_coord[1],
    ])
}

fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Fragment stage of `kind` evaluated at `uv`
fn shade(kind: ProgramKind, texture: &SoftTexture, uv: [f32; 2], resolution: [f32; 2]) -> [f32; 4] {
    match kind {
        ProgramKind::PassThrough => texture.sample(uv[0], uv[1]),
        ProgramKind::Laplacian => {
            let texel = [1.0 / resolution[0], 1.0 / resolution[1]];
            let [u, v] = uv;

            let center = texture.luma(u, v);
            let up = texture.luma(u, v - texel[1]);
            let down = texture.luma(u, v + texel[1]);
            let left = texture.luma(u - texel[0], v);
            let right = texture.luma(u + texel[0], v);

            let magnitude = ((up + down + left + right) - 4.0 * center).abs();
            [magnitude, magnitude, magnitude, 1.0]
        }
    }
}

/// Rendering surface backed by a CPU framebuffer.
pub struct SoftwareSurface {
    width: u32,
    height: u32,
    max_texture_dimension: u32,
    framebuffer: Vec<u8>,
    textures: ResourceTable<SoftTexture>,
    programs: ResourceTable<ProgramKind>,
    geometries: ResourceTable<Vec<Vertex>>,
}

impl SoftwareSurface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::resource(
                "framebuffer",
                format!("surface size {}x{} has no pixels", width, height),
            ));
        }
        Ok(Self {
            width,
            height,
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            framebuffer: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
            textures: ResourceTable::default(),
            programs: ResourceTable::default(),
            geometries: ResourceTable::default(),
        })
    }

    /// Caps texture uploads the way a device limit would
    pub fn with_max_texture_dimension(mut self, max_texture_dimension: u32) -> Self {
        self.max_texture_dimension = max_texture_dimension;
        self
    }
}

impl RenderSurface for SoftwareSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn backend_name(&self) -> &'static str {
        "software"
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn create_texture(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<TextureHandle> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(AnalysisError::resource(
                "texture",
                format!("{} bytes do not describe a {}x{} RGBA8 image", pixels.len(), width, height),
            ));
        }
        if width > self.max_texture_dimension || height > self.max_texture_dimension {
            return Err(AnalysisError::resource(
                "texture",
                format!(
                    "{}x{} exceeds the {} texel limit",
                    width, height, self.max_texture_dimension
                ),
            ));
        }

        let texels = pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|p| {
                [
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                    p[3] as f32 / 255.0,
                ]
            })
            .collect();

        let id = self.textures.insert(SoftTexture {
            width,
            height,
            texels,
        });
        Ok(TextureHandle(id))
    }

    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramHandle> {
        Ok(ProgramHandle(self.programs.insert(kind)))
    }

    fn create_geometry(&mut self, vertices: &[f32]) -> Result<GeometryHandle> {
        check_vertex_data(vertices)?;
        let vertices = vertices
            .chunks_exact(FLOATS_PER_VERTEX)
            .map(|v| Vertex {
                position: [v[0], v[1]],
                tex_coord: [v[2], v[3]],
            })
            .collect();
        Ok(GeometryHandle(self.geometries.insert(vertices)))
    }

    fn clear(&mut self, rgba: [f64; 4]) -> Result<()> {
        let color = rgba.map(|c| to_unorm8(c as f32));
        for pixel in self.framebuffer.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&color);
        }
        Ok(())
    }

    fn draw(
        &mut self,
        program: ProgramHandle,
        geometry: GeometryHandle,
        texture: TextureHandle,
        uniforms: &Uniforms,
    ) -> Result<()> {
        let kind = self
            .programs
            .get(program.0)
            .copied()
            .ok_or(AnalysisError::UnknownHandle("program"))?;
        let vertices = self
            .geometries
            .get(geometry.0)
            .ok_or(AnalysisError::UnknownHandle("geometry"))?;
        let texture = self
            .textures
            .get(texture.0)
            .ok_or(AnalysisError::UnknownHandle("texture"))?;

        let triangles: Vec<[Vertex; 3]> = vertices
            .chunks_exact(3)
            .take(QUAD_VERTEX_COUNT as usize / 3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();

        let (width, height) = (self.width, self.height);
        let resolution = uniforms
            .resolution
            .unwrap_or([width as f32, height as f32]);
        let row_len = width as usize * BYTES_PER_PIXEL;

        self.framebuffer
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let ndc_y = 1.0 - (y as f32 + 0.5) / height as f32 * 2.0;
                for (x, pixel) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                    let ndc_x = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
                    let covered = triangles
                        .iter()
                        .find_map(|tri| interpolate(tri, [ndc_x, ndc_y]));
                    if let Some(uv) = covered {
                        let color = shade(kind, texture, uv, resolution);
                        pixel.copy_from_slice(&color.map(to_unorm8));
                    }
                }
            });

        Ok(())
    }

    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<PixelBuffer> {
        check_region((self.width, self.height), x, y, width, height)?;

        let stride = self.width as usize * BYTES_PER_PIXEL;
        let row_len = width as usize * BYTES_PER_PIXEL;
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in y as usize..(y + height) as usize {
            let start = row * stride + x as usize * BYTES_PER_PIXEL;
            data.extend_from_slice(&self.framebuffer[start..start + row_len]);
        }

        PixelBuffer::new(width, height, data)
    }

    fn end_frame(&mut self) {
        self.textures.clear();
        self.programs.clear();
        self.geometries.clear();
    }
}
