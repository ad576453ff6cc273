//! # Exposure and Sharpness Statistics
//!
//! Reduces the two framebuffer readbacks of an analysis run to scalars and
//! classifies them against fixed thresholds.
//!
//! ### Average Luminance (Exposure)
//! - Luma per pixel: `0.299 R + 0.587 G + 0.114 B` on 0..=255 channels
//! - Mean below [`DARK_LUMINANCE_THRESHOLD`] is too dark, above
//!   [`BRIGHT_LUMINANCE_THRESHOLD`] too light; both bounds are exclusive
//!
//! ### Laplacian Variance (Sharpness)
//! - The edge pass writes `|laplacian|` into every color channel, so only the
//!   red channel is read, normalized to 0..=1
//! - Population variance below [`BLUR_VARIANCE_THRESHOLD`] means few or weak
//!   edges, i.e. a blurry photo
//! - The threshold is calibrated for a [`REFERENCE_SURFACE_SIZE`] square
//!   surface; the same photo rendered at another size can land on the other
//!   side of it

use serde::{Deserialize, Serialize};

use crate::surface::PixelBuffer;

/// Luma weights for R, G, B
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

pub const DARK_LUMINANCE_THRESHOLD: f64 = 50.0;
pub const BRIGHT_LUMINANCE_THRESHOLD: f64 = 200.0;
pub const BLUR_VARIANCE_THRESHOLD: f64 = 0.005;

/// Surface edge length the blur threshold was calibrated against
pub const REFERENCE_SURFACE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessStatus {
    TooDark,
    Normal,
    TooLight,
}

impl std::fmt::Display for BrightnessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrightnessStatus::TooDark => write!(f, "too_dark"),
            BrightnessStatus::Normal => write!(f, "normal"),
            BrightnessStatus::TooLight => write!(f, "too_light"),
        }
    }
}

/// Mean and population variance of the normalized edge magnitude
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeStatistics {
    pub mean: f64,
    pub variance: f64,
}

/// Luma of one RGBA pixel, alpha ignored
pub fn luminance(pixel: [u8; 4]) -> f64 {
    pixel[0] as f64 * LUMA_WEIGHTS[0]
        + pixel[1] as f64 * LUMA_WEIGHTS[1]
        + pixel[2] as f64 * LUMA_WEIGHTS[2]
}

/// Average luma over every pixel of the buffer
pub fn average_luminance(buffer: &PixelBuffer) -> f64 {
    let count = buffer.pixel_count();
    if count == 0 {
        return 0.0;
    }
    let total: f64 = buffer.pixels().map(luminance).sum();
    total / count as f64
}

pub fn classify_brightness(avg_luminance: f64) -> BrightnessStatus {
    if avg_luminance < DARK_LUMINANCE_THRESHOLD {
        BrightnessStatus::TooDark
    } else if avg_luminance > BRIGHT_LUMINANCE_THRESHOLD {
        BrightnessStatus::TooLight
    } else {
        BrightnessStatus::Normal
    }
}

/// Computes mean and variance of the red channel (edge magnitude).
/// Divides by N, not N - 1.
pub fn edge_statistics(buffer: &PixelBuffer) -> EdgeStatistics {
    let n = buffer.pixel_count();
    if n == 0 {
        return EdgeStatistics::default();
    }
    let n = n as f64;

    let edge_values = || buffer.pixels().map(|p| p[0] as f64 / 255.0);

    let mean: f64 = edge_values().sum::<f64>() / n;
    let variance: f64 = edge_values()
        .map(|x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;

    EdgeStatistics { mean, variance }
}

pub fn is_blurry(variance: f64) -> bool {
    variance < BLUR_VARIANCE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance_weights() {
        assert_eq!(luminance([0, 0, 0, 255]), 0.0);
        assert!((luminance([255, 255, 255, 0]) - 255.0).abs() < 1e-9);
        assert!((luminance([100, 0, 0, 255]) - 29.9).abs() < 1e-9);
    }

    #[test]
    fn test_average_luminance_of_uniform_buffers() {
        let gray = PixelBuffer::filled(10, 10, [128, 128, 128, 255]);
        assert!((average_luminance(&gray) - 128.0).abs() < 1e-9);

        let black = PixelBuffer::filled(10, 10, [0, 0, 0, 255]);
        assert_eq!(average_luminance(&black), 0.0);
    }

    #[test]
    fn test_brightness_boundaries_are_exclusive() {
        assert_eq!(classify_brightness(49.999), BrightnessStatus::TooDark);
        assert_eq!(classify_brightness(50.0), BrightnessStatus::Normal);
        assert_eq!(classify_brightness(200.0), BrightnessStatus::Normal);
        assert_eq!(classify_brightness(200.001), BrightnessStatus::TooLight);
    }

    #[test]
    fn test_blur_boundary_is_exclusive() {
        assert!(is_blurry(0.0049999));
        assert!(!is_blurry(BLUR_VARIANCE_THRESHOLD));
        assert!(!is_blurry(0.25));
    }

    #[test]
    fn test_edge_statistics_population_variance() {
        // Half the pixels at full edge response, half at zero
        let mut data = Vec::new();
        for i in 0..4 {
            let v = if i % 2 == 0 { 255 } else { 0 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
        let buffer = PixelBuffer::new(2, 2, data).unwrap();

        let stats = edge_statistics(&buffer);
        assert!((stats.mean - 0.5).abs() < 1e-12);
        // population variance p(1 - p), not the sample estimate 1/3
        assert!((stats.variance - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_edge_statistics_reads_red_only() {
        let buffer = PixelBuffer::filled(4, 4, [0, 255, 255, 255]);
        assert_eq!(edge_statistics(&buffer), EdgeStatistics::default());
    }

    #[test]
    fn test_empty_buffer_statistics() {
        let empty = PixelBuffer::new(0, 0, Vec::new()).unwrap();
        assert_eq!(average_luminance(&empty), 0.0);
        assert_eq!(edge_statistics(&empty), EdgeStatistics::default());
    }

    #[test]
    fn test_brightness_status_serializes_snake_case() {
        let json = serde_json::to_string(&BrightnessStatus::TooDark).unwrap();
        assert_eq!(json, "\"too_dark\"");
    }
}
