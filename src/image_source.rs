use image::imageops::FilterType;
use image::DynamicImage;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, Result};
use crate::surface::BYTES_PER_PIXEL;

/// A decoded photo ready for texture upload (RGBA, 8 bits per channel)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    name: String,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SourceImage {
    /// Wraps raw RGBA8 pixels
    pub fn from_rgba(name: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(AnalysisError::Decode {
                source_name: name,
                reason: format!(
                    "{} bytes do not describe a {}x{} RGBA8 image",
                    pixels.len(),
                    width,
                    height
                ),
            });
        }
        Ok(Self {
            name,
            width,
            height,
            pixels,
        })
    }

    /// Converts any decoded image to RGBA8
    pub fn from_dynamic(name: impl Into<String>, img: &DynamicImage) -> Result<Self> {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba(name, width, height, rgba.into_raw())
    }

    /// Decodes an image file synchronously
    pub fn open(path: &Path) -> Result<Self> {
        let name = display_name(path);
        let img = image::open(path).map_err(|e| AnalysisError::Decode {
            source_name: name.clone(),
            reason: e.to_string(),
        })?;
        Self::from_dynamic(name, &img)
    }

    /// Decodes an image file on a blocking worker; the caller suspends until
    /// the pixels are ready.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = display_name(&path);
        tokio::task::spawn_blocking(move || Self::open(&path))
            .await
            .map_err(|e| AnalysisError::Decode {
                source_name: name,
                reason: format!("decode task failed: {}", e),
            })?
    }

    /// This image, downscaled when either edge exceeds `max_dimension`.
    ///
    /// The aspect ratio is kept and the pass-through render resamples to the
    /// surface anyway, so only texture limits decide whether this copies.
    pub fn fit_within(&self, max_dimension: u32) -> Result<Cow<'_, SourceImage>> {
        if self.width <= max_dimension && self.height <= max_dimension {
            return Ok(Cow::Borrowed(self));
        }

        let (width, height) = fitted_size(self.width, self.height, max_dimension);
        let rgba = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| AnalysisError::Decode {
                source_name: self.name.clone(),
                reason: "pixel buffer does not match its dimensions".into(),
            })?;
        let resized = image::imageops::resize(&rgba, width, height, FilterType::Triangle);
        log::debug!(
            "{}: downscaled {}x{} to {}x{} for a {} texel texture limit",
            self.name,
            self.width,
            self.height,
            width,
            height,
            max_dimension
        );

        Self::from_rgba(self.name.clone(), width, height, resized.into_raw()).map(Cow::Owned)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Largest size with the same aspect ratio whose edges fit in `max_dimension`
fn fitted_size(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max_dimension = max_dimension.max(1);
    let scale = f64::from(max_dimension) / f64::from(width.max(height));
    let fit = |edge: u32| ((f64::from(edge) * scale).round() as u32).clamp(1, max_dimension);
    (fit(width), fit(height))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
