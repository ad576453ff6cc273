use std::fmt;

/// Entry point of the shared vertex stage
pub const VERTEX_ENTRY: &str = "vs_main";

/// Entry point of both fragment stages
pub const FRAGMENT_ENTRY: &str = "fs_main";

// Shared vertex stage: clip-space position passes through, texture
// coordinate is forwarded untouched.
pub const VERTEX_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coord: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coord = in.tex_coord;
    return out;
}
"#;

// Pass-through fragment stage: rasterizes the source texture verbatim so the
// framebuffer can be sampled for brightness.
pub const PASS_THROUGH_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@fragment
fn fs_main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(source_texture, source_sampler, tex_coord);
}
"#;

// Laplacian fragment stage for edge detection on luma
// [ 0  1  0 ]
// [ 1 -4  1 ]
// [ 0  1  0 ]
pub const LAPLACIAN_FRAGMENT_SHADER: &str = r#"
struct Params {
    resolution: vec2<f32>,
    _pad: vec2<f32>,
};

@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> params: Params;

const LUMA_WEIGHTS = vec3<f32>(0.299, 0.587, 0.114);

fn luma_at(coord: vec2<f32>) -> f32 {
    return dot(textureSample(source_texture, source_sampler, coord).rgb, LUMA_WEIGHTS);
}

@fragment
fn fs_main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    let texel = vec2<f32>(1.0, 1.0) / params.resolution;

    let center = luma_at(tex_coord);
    let up = luma_at(tex_coord + vec2<f32>(0.0, -texel.y));
    let down = luma_at(tex_coord + vec2<f32>(0.0, texel.y));
    let left = luma_at(tex_coord + vec2<f32>(-texel.x, 0.0));
    let right = luma_at(tex_coord + vec2<f32>(texel.x, 0.0));

    let laplacian = (up + down + left + right) - 4.0 * center;
    let magnitude = abs(laplacian);
    return vec4<f32>(magnitude, magnitude, magnitude, 1.0);
}
"#;

/// Stage of a shader program, used to attribute compile failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// The two programs of the analysis pipeline.
///
/// Both share [`VERTEX_SHADER`]; they differ only in their fragment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    PassThrough,
    Laplacian,
}

impl ProgramKind {
    pub fn fragment_source(self) -> &'static str {
        match self {
            ProgramKind::PassThrough => PASS_THROUGH_FRAGMENT_SHADER,
            ProgramKind::Laplacian => LAPLACIAN_FRAGMENT_SHADER,
        }
    }

    /// Whether the program reads the `resolution` uniform
    pub fn uses_resolution(self) -> bool {
        matches!(self, ProgramKind::Laplacian)
    }

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::PassThrough => "Pass-Through Program",
            ProgramKind::Laplacian => "Laplacian Program",
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramKind::PassThrough => write!(f, "pass-through"),
            ProgramKind::Laplacian => write!(f, "laplacian"),
        }
    }
}
