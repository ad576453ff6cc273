use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AnalysisError, Result};
use crate::geometry::QUAD_VERTICES;
use crate::image_source::SourceImage;
use crate::shaders::ProgramKind;
use crate::statistics::{
    average_luminance, classify_brightness, edge_statistics, is_blurry, BrightnessStatus,
    EdgeStatistics,
};
use crate::surface::{GeometryHandle, ProgramHandle, RenderSurface, TextureHandle, Uniforms};

/// Opaque black, written between the two passes
const CLEAR_COLOR: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

/// Outcome of one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub brightness: BrightnessStatus,
    pub is_blurry: bool,
}

/// Progress of an analysis run.
///
/// Each transition requires the previous one to have succeeded; any failure
/// moves the run to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Uploaded,
    Pass1Rendered,
    Pass1Read,
    Pass2Rendered,
    Pass2Read,
    Complete,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Complete | RunState::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Ready => "ready",
            RunState::Uploaded => "uploaded",
            RunState::Pass1Rendered => "pass 1 rendered",
            RunState::Pass1Read => "pass 1 read",
            RunState::Pass2Rendered => "pass 2 rendered",
            RunState::Pass2Read => "pass 2 read",
            RunState::Complete => "complete",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

struct RunResources {
    texture: TextureHandle,
    geometry: GeometryHandle,
    pass_through: ProgramHandle,
    laplacian: ProgramHandle,
}

/// One two-pass analysis of a single photo.
///
/// Drive it with [`advance`](Self::advance) one transition at a time, or with
/// [`finish`](Self::finish). The brightness status is readable as soon as
/// pass 1 has been read back.
pub struct AnalysisRun<'a> {
    image: &'a SourceImage,
    state: RunState,
    resources: Option<RunResources>,
    avg_luminance: Option<f64>,
    brightness: Option<BrightnessStatus>,
    edges: Option<EdgeStatistics>,
    is_blurry: Option<bool>,
}

impl<'a> AnalysisRun<'a> {
    pub fn new(image: &'a SourceImage) -> Self {
        Self {
            image,
            state: RunState::Ready,
            resources: None,
            avg_luminance: None,
            brightness: None,
            edges: None,
            is_blurry: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn brightness(&self) -> Option<BrightnessStatus> {
        self.brightness
    }

    pub fn avg_luminance(&self) -> Option<f64> {
        self.avg_luminance
    }

    pub fn edge_statistics(&self) -> Option<EdgeStatistics> {
        self.edges
    }

    /// Both classifications, once the run is complete
    pub fn result(&self) -> Option<AnalysisResult> {
        if self.state != RunState::Complete {
            return None;
        }
        Some(AnalysisResult {
            brightness: self.brightness?,
            is_blurry: self.is_blurry?,
        })
    }

    /// Performs exactly one state transition on `surface`
    pub fn advance<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) -> Result<RunState> {
        match self.state {
            RunState::Complete => return Err(AnalysisError::InvalidState("complete")),
            RunState::Aborted => return Err(AnalysisError::InvalidState("aborted")),
            _ => {}
        }

        match self.step(surface) {
            Ok(next) => {
                log::debug!("{}: {} -> {}", self.image.name(), self.state, next);
                self.state = next;
                Ok(next)
            }
            Err(err) => {
                log::error!("{}: analysis aborted during {}: {}", self.image.name(), self.state, err);
                self.abort(surface);
                Err(err)
            }
        }
    }

    /// Advances until the run completes or aborts
    pub fn finish<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) -> Result<AnalysisResult> {
        while !self.state.is_terminal() {
            self.advance(surface)?;
        }
        self.result()
            .ok_or(AnalysisError::InvalidState("aborted"))
    }

    fn step<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) -> Result<RunState> {
        let (width, height) = surface.size();

        match self.state {
            RunState::Ready => {
                let source = self.image.fit_within(surface.max_texture_dimension())?;
                let texture = surface.create_texture(source.pixels(), source.width(), source.height())?;
                let geometry = surface.create_geometry(&QUAD_VERTICES)?;
                let pass_through = surface.compile_program(ProgramKind::PassThrough)?;
                let laplacian = surface.compile_program(ProgramKind::Laplacian)?;
                self.resources = Some(RunResources {
                    texture,
                    geometry,
                    pass_through,
                    laplacian,
                });
                Ok(RunState::Uploaded)
            }
            RunState::Uploaded => {
                let res = self.resources()?;
                surface.draw(res.pass_through, res.geometry, res.texture, &Uniforms::default())?;
                Ok(RunState::Pass1Rendered)
            }
            RunState::Pass1Rendered => {
                let frame = surface.read_pixels(0, 0, width, height)?;
                let avg = average_luminance(&frame);
                let status = classify_brightness(avg);
                log::info!(
                    "{}: average luminance {:.2} -> {}",
                    self.image.name(),
                    avg,
                    status
                );
                self.avg_luminance = Some(avg);
                self.brightness = Some(status);
                Ok(RunState::Pass1Read)
            }
            RunState::Pass1Read => {
                let res = self.resources()?;
                let (texture, geometry, laplacian) = (res.texture, res.geometry, res.laplacian);
                surface.clear(CLEAR_COLOR)?;
                surface.draw(
                    laplacian,
                    geometry,
                    texture,
                    &Uniforms::with_resolution(width, height),
                )?;
                Ok(RunState::Pass2Rendered)
            }
            RunState::Pass2Rendered => {
                let frame = surface.read_pixels(0, 0, width, height)?;
                let edges = edge_statistics(&frame);
                let blurry = is_blurry(edges.variance);
                log::info!(
                    "{}: edge variance {:.6} (mean {:.6}) -> {}",
                    self.image.name(),
                    edges.variance,
                    edges.mean,
                    if blurry { "blurry" } else { "sharp" }
                );
                self.edges = Some(edges);
                self.is_blurry = Some(blurry);
                Ok(RunState::Pass2Read)
            }
            RunState::Pass2Read => {
                surface.end_frame();
                self.resources = None;
                log::debug!("{}: frame released", self.image.name());
                Ok(RunState::Complete)
            }
            RunState::Complete | RunState::Aborted => {
                Err(AnalysisError::InvalidState("finished"))
            }
        }
    }

    fn resources(&self) -> Result<&RunResources> {
        self.resources
            .as_ref()
            .ok_or(AnalysisError::InvalidState("missing its uploaded resources"))
    }

    fn abort<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) {
        // Releases whatever the failed step had already created
        self.resources = None;
        surface.end_frame();
        self.avg_luminance = None;
        self.brightness = None;
        self.edges = None;
        self.is_blurry = None;
        self.state = RunState::Aborted;
    }
}

/// Runs both passes on `surface` and classifies `image`
pub fn analyze<S: RenderSurface + ?Sized>(surface: &mut S, image: &SourceImage) -> Result<AnalysisResult> {
    AnalysisRun::new(image).finish(surface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::ShaderStage;
    use crate::software_surface::SoftwareSurface;
    use crate::surface::PixelBuffer;

    /// Wraps a surface, records calls and can fail resource creation or
    /// compilation of one program
    struct ScriptedSurface {
        inner: SoftwareSurface,
        calls: Vec<String>,
        fail_geometry: bool,
        fail_compile: Option<ProgramKind>,
        fail_link: Option<ProgramKind>,
    }

    impl ScriptedSurface {
        fn new(size: u32) -> Self {
            Self {
                inner: SoftwareSurface::new(size, size).unwrap(),
                calls: Vec::new(),
                fail_geometry: false,
                fail_compile: None,
                fail_link: None,
            }
        }
    }

    impl RenderSurface for ScriptedSurface {
        fn size(&self) -> (u32, u32) {
            self.inner.size()
        }

        fn backend_name(&self) -> &'static str {
            "scripted"
        }

        fn max_texture_dimension(&self) -> u32 {
            self.inner.max_texture_dimension()
        }

        fn create_texture(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<TextureHandle> {
            self.calls.push(format!("create_texture {}x{}", width, height));
            self.inner.create_texture(pixels, width, height)
        }

        fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramHandle> {
            self.calls.push(format!("compile {}", kind));
            if self.fail_compile == Some(kind) {
                return Err(AnalysisError::Compile {
                    stage: ShaderStage::Fragment,
                    log: "syntax error".into(),
                });
            }
            if self.fail_link == Some(kind) {
                return Err(AnalysisError::Link {
                    program: kind,
                    log: "interface mismatch".into(),
                });
            }
            self.inner.compile_program(kind)
        }

        fn create_geometry(&mut self, vertices: &[f32]) -> Result<GeometryHandle> {
            self.calls.push("create_geometry".into());
            if self.fail_geometry {
                return Err(AnalysisError::resource("vertex buffer", "out of memory"));
            }
            self.inner.create_geometry(vertices)
        }

        fn clear(&mut self, rgba: [f64; 4]) -> Result<()> {
            self.calls.push("clear".into());
            self.inner.clear(rgba)
        }

        fn draw(
            &mut self,
            program: ProgramHandle,
            geometry: GeometryHandle,
            texture: TextureHandle,
            uniforms: &Uniforms,
        ) -> Result<()> {
            self.calls.push(format!("draw resolution={:?}", uniforms.resolution));
            self.inner.draw(program, geometry, texture, uniforms)
        }

        fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<PixelBuffer> {
            self.calls.push(format!("read {}x{}", width, height));
            self.inner.read_pixels(x, y, width, height)
        }

        fn end_frame(&mut self) {
            self.calls.push("end_frame".into());
            self.inner.end_frame()
        }
    }

    fn gray_image() -> SourceImage {
        SourceImage::from_rgba("gray", 8, 8, [128, 128, 128, 255].repeat(64)).unwrap()
    }

    #[test]
    fn test_run_walks_every_state_in_order() {
        let image = gray_image();
        let mut surface = ScriptedSurface::new(16);
        let mut run = AnalysisRun::new(&image);

        let mut states = vec![run.state()];
        while !run.state().is_terminal() {
            states.push(run.advance(&mut surface).unwrap());
        }

        assert_eq!(
            states,
            vec![
                RunState::Ready,
                RunState::Uploaded,
                RunState::Pass1Rendered,
                RunState::Pass1Read,
                RunState::Pass2Rendered,
                RunState::Pass2Read,
                RunState::Complete,
            ]
        );
        assert_eq!(
            surface.calls,
            vec![
                "create_texture 8x8",
                "create_geometry",
                "compile pass-through",
                "compile laplacian",
                "draw resolution=None",
                "read 16x16",
                "clear",
                "draw resolution=Some([16.0, 16.0])",
                "read 16x16",
                "end_frame",
            ]
        );
    }

    #[test]
    fn test_brightness_is_available_after_first_readback() {
        let image = gray_image();
        let mut surface = ScriptedSurface::new(16);
        let mut run = AnalysisRun::new(&image);

        while run.state() != RunState::Pass1Read {
            run.advance(&mut surface).unwrap();
        }
        assert_eq!(run.brightness(), Some(BrightnessStatus::Normal));
        assert_eq!(run.result(), None);
        assert_eq!(run.edge_statistics(), None);
    }

    #[test]
    fn test_compile_failure_aborts_without_result() {
        let image = gray_image();
        let mut surface = ScriptedSurface::new(16);
        surface.fail_compile = Some(ProgramKind::Laplacian);

        let mut run = AnalysisRun::new(&image);
        let err = run.finish(&mut surface).unwrap_err();

        assert!(matches!(err, AnalysisError::Compile { .. }));
        assert_eq!(run.state(), RunState::Aborted);
        assert_eq!(run.result(), None);
        assert_eq!(run.brightness(), None);
        assert!(!surface.calls.iter().any(|c| c.starts_with("draw")));
        assert_eq!(surface.calls.last().map(String::as_str), Some("end_frame"));
    }

    #[test]
    fn test_link_failure_aborts_before_any_pass() {
        let image = gray_image();
        let mut surface = ScriptedSurface::new(16);
        surface.fail_link = Some(ProgramKind::PassThrough);

        let err = analyze(&mut surface, &image).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Link {
                program: ProgramKind::PassThrough,
                ..
            }
        ));
        assert!(!surface.calls.iter().any(|c| c.starts_with("read")));
    }

    #[test]
    fn test_resource_failure_aborts_without_result() {
        let image = gray_image();
        let mut surface = ScriptedSurface::new(16);
        surface.fail_geometry = true;

        let mut run = AnalysisRun::new(&image);
        let err = run.advance(&mut surface).unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::ResourceCreation {
                resource: "vertex buffer",
                ..
            }
        ));
        assert_eq!(run.state(), RunState::Aborted);
        assert_eq!(run.result(), None);
        assert_eq!(run.brightness(), None);
        assert_eq!(
            surface.calls,
            vec!["create_texture 8x8", "create_geometry", "end_frame"]
        );
    }

    #[test]
    fn test_oversized_texture_failure_aborts_run() {
        let image = gray_image();
        // A surface that rejects every texture, even after downscaling
        let mut surface = ScriptedSurface {
            inner: SoftwareSurface::new(16, 16).unwrap().with_max_texture_dimension(0),
            ..ScriptedSurface::new(16)
        };

        let err = analyze(&mut surface, &image).unwrap_err();
        assert!(matches!(err, AnalysisError::ResourceCreation { resource: "texture", .. }));
        assert!(!surface.calls.iter().any(|c| c == "create_geometry"));
        assert_eq!(surface.calls.last().map(String::as_str), Some("end_frame"));
    }

    #[test]
    fn test_source_larger_than_texture_limit_is_downscaled() {
        let image = SourceImage::from_rgba("panorama", 100, 40, [150, 150, 150, 255].repeat(100 * 40))
            .unwrap();
        let mut surface = ScriptedSurface {
            inner: SoftwareSurface::new(16, 16).unwrap().with_max_texture_dimension(32),
            ..ScriptedSurface::new(16)
        };

        let result = analyze(&mut surface, &image).unwrap();
        assert_eq!(result.brightness, BrightnessStatus::Normal);
        assert!(result.is_blurry);
        assert_eq!(surface.calls[0], "create_texture 32x13");
    }

    #[test]
    fn test_finished_run_cannot_advance() {
        let image = gray_image();
        let mut surface = ScriptedSurface::new(16);
        let mut run = AnalysisRun::new(&image);
        run.finish(&mut surface).unwrap();

        let err = run.advance(&mut surface).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidState("complete")));
        assert_eq!(run.state(), RunState::Complete);
    }

    #[test]
    fn test_aborted_run_cannot_advance() {
        let image = gray_image();
        let mut surface = ScriptedSurface::new(16);
        surface.fail_compile = Some(ProgramKind::PassThrough);
        let mut run = AnalysisRun::new(&image);
        assert!(run.finish(&mut surface).is_err());

        let err = run.advance(&mut surface).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidState("aborted")));
    }
}
