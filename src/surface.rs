//! The rendering surface seam.
//!
//! A surface is one exclusively owned rendering context of fixed size. The
//! pipeline drives it through `&mut` methods only, so two draws can never be
//! in flight on the same surface.

use std::collections::HashMap;

use crate::error::{AnalysisError, Result};
use crate::shaders::ProgramKind;

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryHandle(pub(crate) usize);

/// Uniform values for one draw
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Uniforms {
    /// Output resolution in pixels; only the Laplacian program reads it
    pub resolution: Option<[f32; 2]>,
}

impl Uniforms {
    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self {
            resolution: Some([width as f32, height as f32]),
        }
    }
}

/// Tightly packed RGBA8 readback, row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(AnalysisError::readback(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A buffer filled with one color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Iterates pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.data
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let p = &self.data[offset..offset + BYTES_PER_PIXEL];
        Some([p[0], p[1], p[2], p[3]])
    }
}

/// A fixed-size rendering context the analysis pipeline draws into.
pub trait RenderSurface {
    /// Framebuffer size in pixels
    fn size(&self) -> (u32, u32);

    /// Short name of the backend, for reports and logs
    fn backend_name(&self) -> &'static str;

    /// Largest texture edge `create_texture` accepts
    fn max_texture_dimension(&self) -> u32 {
        u32::MAX
    }

    /// Uploads RGBA8 pixels as a linear-filtered, clamp-to-edge texture
    fn create_texture(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<TextureHandle>;

    /// Compiles the shared vertex stage with the fragment stage of `kind`
    /// and links them into a program.
    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramHandle>;

    /// Uploads interleaved (x, y, u, v) vertices
    fn create_geometry(&mut self, vertices: &[f32]) -> Result<GeometryHandle>;

    /// Clears the framebuffer to `rgba` (components in 0..=1)
    fn clear(&mut self, rgba: [f64; 4]) -> Result<()>;

    /// Draws the geometry with `texture` bound to unit 0, then flushes so a
    /// following readback observes the finished pass.
    fn draw(
        &mut self,
        program: ProgramHandle,
        geometry: GeometryHandle,
        texture: TextureHandle,
        uniforms: &Uniforms,
    ) -> Result<()>;

    /// Reads back a region of the framebuffer
    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<PixelBuffer>;

    /// Signals end of frame and releases per-frame resources
    fn end_frame(&mut self);
}

/// Checks a readback region against the framebuffer bounds
pub(crate) fn check_region(size: (u32, u32), x: u32, y: u32, width: u32, height: u32) -> Result<()> {
    let fits_x = x.checked_add(width).is_some_and(|end| end <= size.0);
    let fits_y = y.checked_add(height).is_some_and(|end| end <= size.1);
    if !fits_x || !fits_y {
        return Err(AnalysisError::readback(format!(
            "region {}x{}+{}+{} exceeds {}x{} framebuffer",
            width, height, x, y, size.0, size.1
        )));
    }
    Ok(())
}

/// Per-frame resources keyed by ids that are never issued twice.
///
/// Releasing the frame drops the entries but keeps the counter, so a handle
/// from an earlier frame cannot resolve to a later resource.
pub(crate) struct ResourceTable<T> {
    entries: HashMap<usize, T>,
    next_id: usize,
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<T> ResourceTable<T> {
    pub(crate) fn insert(&mut self, value: T) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, value);
        id
    }

    pub(crate) fn get(&self, id: usize) -> Option<&T> {
        self.entries.get(&id)
    }

    /// Removes every live entry
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.entries.drain().map(|(_, value)| value)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
