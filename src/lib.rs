pub mod commands;
pub mod error;
pub mod geometry;
pub mod gpu_surface;
pub mod image_source;
pub mod logging;
pub mod pipeline;
pub mod settings;
pub mod shaders;
pub mod software_surface;
pub mod statistics;
pub mod surface;

pub use commands::{analyze_image_blocking, analyze_photo, AnalysisReport};
pub use error::AnalysisError;
pub use gpu_surface::{GpuOptions, GpuSurface};
pub use image_source::SourceImage;
pub use pipeline::{analyze, AnalysisResult, AnalysisRun, RunState};
pub use settings::AnalyzerSettings;
pub use software_surface::SoftwareSurface;
pub use statistics::BrightnessStatus;
pub use surface::{PixelBuffer, RenderSurface};
