use crate::gpu_surface::GpuSurface;
use crate::image_source::SourceImage;
use crate::pipeline::AnalysisRun;
use crate::settings::AnalyzerSettings;
use crate::software_surface::SoftwareSurface;
use crate::statistics::BrightnessStatus;
use crate::surface::RenderSurface;
use anyhow::{Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification plus the statistics behind it, for one photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub source: String,
    pub image_width: u32,
    pub image_height: u32,
    pub surface_size: u32,
    pub backend: String,
    pub brightness: BrightnessStatus,
    pub is_blurry: bool,
    pub avg_luminance: f64,
    pub edge_mean: f64,
    pub edge_variance: f64,
}

/// Builds a fresh surface for one photo.
///
/// Falls back to the software rasterizer when the GPU is disabled or cannot
/// be initialized. Failures during a run are never retried on another backend.
pub async fn open_surface(settings: &AnalyzerSettings) -> Result<Box<dyn RenderSurface>> {
    let size = settings.surface_size;

    if settings.use_gpu {
        match GpuSurface::new(size, size, &settings.gpu_options()).await {
            Ok(surface) => return Ok(Box::new(surface)),
            Err(e) => log::warn!("GPU unavailable ({:#}), falling back to software rasterizer", e),
        }
    }

    let surface = SoftwareSurface::new(size, size).context("Failed to create software surface")?;
    Ok(Box::new(surface))
}

/// Runs both passes on `surface` and collects the report
pub fn analyze_on_surface(surface: &mut dyn RenderSurface, image: &SourceImage) -> Result<AnalysisReport> {
    let mut run = AnalysisRun::new(image);
    let result = run
        .finish(surface)
        .with_context(|| format!("Analysis of {} failed", image.name()))?;

    let edges = run.edge_statistics().unwrap_or_default();
    let (surface_size, _) = surface.size();

    Ok(AnalysisReport {
        source: image.name().to_string(),
        image_width: image.width(),
        image_height: image.height(),
        surface_size,
        backend: surface.backend_name().to_string(),
        brightness: result.brightness,
        is_blurry: result.is_blurry,
        avg_luminance: run.avg_luminance().unwrap_or_default(),
        edge_mean: edges.mean,
        edge_variance: edges.variance,
    })
}

/// Decodes the photo at `photo_path` and analyzes it on a new surface
pub async fn analyze_photo(photo_path: PathBuf, settings: &AnalyzerSettings) -> Result<AnalysisReport> {
    let image = SourceImage::load(photo_path)
        .await
        .context("Failed to decode photo")?;

    let mut surface = open_surface(settings).await?;
    analyze_on_surface(surface.as_mut(), &image)
}

/// Convenience for an already decoded image, outside any async runtime
pub fn analyze_image_blocking(
    name: &str,
    img: &DynamicImage,
    settings: &AnalyzerSettings,
) -> Result<AnalysisReport> {
    let image = SourceImage::from_dynamic(name, img)?;
    let mut surface = pollster::block_on(open_surface(settings))?;
    analyze_on_surface(surface.as_mut(), &image)
}
