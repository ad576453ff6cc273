use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::gpu_surface::GpuOptions;
use crate::statistics::REFERENCE_SURFACE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    HighPerformance,
    LowPower,
}

/// Analyzer settings.
///
/// Classification thresholds are fixed constants and have no entry here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Edge length of the square analysis surface
    pub surface_size: u32,
    /// Render on the GPU; the software rasterizer is used otherwise
    pub use_gpu: bool,
    pub power_preference: PowerPreference,
    pub force_fallback_adapter: bool,
    /// `env_logger` filter, overrides `RUST_LOG` when set
    pub log_filter: Option<String>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            surface_size: REFERENCE_SURFACE_SIZE,
            use_gpu: true,
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            log_filter: None,
        }
    }
}

impl AnalyzerSettings {
    /// Get the settings file path
    fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        let app_dir = config_dir.join("photo-quality");
        fs::create_dir_all(&app_dir)?;
        Ok(app_dir.join("settings.json"))
    }

    /// Load settings from the user config directory, writing defaults on first run
    pub fn load() -> Result<Self> {
        Self::load_or_create(&Self::settings_path()?)
    }

    /// Load settings from an explicitly chosen file.
    ///
    /// A missing file yields defaults and is left uncreated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!("settings file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::read(path)
    }

    fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run - create default settings
            let settings = Self::default();
            settings.save_to(path)?;
            return Ok(settings);
        }
        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to the user config directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.surface_size > 0, "surface_size must be positive");
        if self.surface_size != REFERENCE_SURFACE_SIZE {
            log::warn!(
                "surface size {} differs from the {} the blur threshold is calibrated for",
                self.surface_size,
                REFERENCE_SURFACE_SIZE
            );
        }
        Ok(())
    }

    pub fn gpu_options(&self) -> GpuOptions {
        GpuOptions {
            power_preference: match self.power_preference {
                PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
                PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            },
            force_fallback_adapter: self.force_fallback_adapter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("photo_quality_{}_{}.json", tag, std::process::id()))
    }

    #[test]
    fn test_settings_serialization() {
        let settings = AnalyzerSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: AnalyzerSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, parsed);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let parsed: AnalyzerSettings = serde_json::from_str(r#"{"use_gpu": false}"#).unwrap();
        assert!(!parsed.use_gpu);
        assert_eq!(parsed.surface_size, REFERENCE_SURFACE_SIZE);
    }

    #[test]
    fn test_first_load_writes_defaults() {
        let path = temp_path("first_load");
        let _ = fs::remove_file(&path);

        let settings = AnalyzerSettings::load_or_create(&path).unwrap();
        assert_eq!(settings, AnalyzerSettings::default());
        assert!(path.exists());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_explicit_file_is_not_created() {
        let path = temp_path("explicit_missing");
        let _ = fs::remove_file(&path);

        let settings = AnalyzerSettings::load_from(&path).unwrap();
        assert_eq!(settings, AnalyzerSettings::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_explicit_file_is_read() {
        let path = temp_path("explicit_present");
        fs::write(&path, r#"{"surface_size": 250, "use_gpu": false}"#).unwrap();

        let settings = AnalyzerSettings::load_from(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(settings.surface_size, 250);
        assert!(!settings.use_gpu);
    }

    #[test]
    fn test_zero_surface_is_rejected() {
        let path = temp_path("zero_surface");
        fs::write(&path, r#"{"surface_size": 0}"#).unwrap();

        assert!(AnalyzerSettings::load_from(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_power_preference_maps_to_wgpu() {
        let settings = AnalyzerSettings {
            power_preference: PowerPreference::LowPower,
            ..Default::default()
        };
        assert_eq!(
            settings.gpu_options().power_preference,
            wgpu::PowerPreference::LowPower
        );
    }
}
