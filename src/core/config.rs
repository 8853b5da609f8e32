//! Configuration for the segmentation pipeline.
//!
//! Configuration is a set of immutable serde structs constructed once at
//! startup and validated before any processing starts. Files in TOML or
//! JSON format are supported, with the format detected from the file
//! extension.

use crate::core::errors::SegError;
use crate::domain::geometry::parse_axcodes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Intensity clipping and rescaling range.
///
/// Input samples are clipped to `[a_min, a_max]` and linearly rescaled to
/// `[b_min, b_max]`. The defaults are the soft-tissue CT window used by the
/// pretrained aorta model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityRange {
    /// Lower clip bound in input units.
    pub a_min: f32,
    /// Upper clip bound in input units.
    pub a_max: f32,
    /// Lower bound of the rescaled output.
    pub b_min: f32,
    /// Upper bound of the rescaled output.
    pub b_max: f32,
}

impl Default for IntensityRange {
    fn default() -> Self {
        Self {
            a_min: -175.0,
            a_max: 250.0,
            b_min: 0.0,
            b_max: 1.0,
        }
    }
}

/// How overlapping window predictions are weighted during blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Uniform weight 1.0 everywhere: plain averaging of overlaps.
    #[default]
    Constant,
    /// Separable Gaussian peaking at the window center, tapering towards
    /// the borders for smoother seams.
    Gaussian,
}

/// Configuration of the ONNX model backing the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the ONNX model file.
    pub path: PathBuf,
    /// The number of output classes K.
    pub num_classes: usize,
    /// Name of the model's input tensor. Auto-detected when absent.
    #[serde(default)]
    pub input_name: Option<String>,
    /// Name of the model's output tensor. The session's first output is
    /// used when absent.
    #[serde(default)]
    pub output_name: Option<String>,
    /// Number of pooled sessions for concurrent predictions.
    #[serde(default)]
    pub session_pool_size: Option<usize>,
}

/// Configuration for one segmentation pipeline instance.
///
/// Defaults match the pretrained aorta segmentation model: a 96x96x96 window
/// with 25% overlap, four windows per model call, CT soft-tissue intensity
/// window, and 1.5x1.5x2.0 mm target spacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Sliding-window size `[D, H, W]`; also the model's expected input shape.
    #[serde(default = "default_roi_size")]
    pub roi_size: [usize; 3],
    /// Fraction of window extent shared between adjacent windows, in `[0, 1)`.
    #[serde(default = "default_overlap")]
    pub overlap: f64,
    /// Number of windows submitted to the model per call. Throughput tuning
    /// only; the output is independent of the grouping.
    #[serde(default = "default_sw_batch_size")]
    pub sw_batch_size: usize,
    /// Intensity clip and rescale range applied before inference.
    #[serde(default)]
    pub intensity: IntensityRange,
    /// Target voxel spacing the volume is resampled to.
    #[serde(default = "default_target_spacing")]
    pub target_spacing: [f64; 3],
    /// Canonical orientation the volume is reoriented to, e.g. "RAS".
    #[serde(default = "default_orientation")]
    pub orientation: String,
    /// Weighting of overlapping window predictions.
    #[serde(default)]
    pub blend_mode: BlendMode,
    /// Gaussian sigma as a fraction of the window extent, used when
    /// `blend_mode` is gaussian.
    #[serde(default = "default_sigma_scale")]
    pub sigma_scale: f64,
    /// Process window batches in parallel across a rayon pool.
    #[serde(default)]
    pub parallel: bool,
    /// Load the model eagerly at construction instead of on first use.
    #[serde(default)]
    pub preload: bool,
    /// The ONNX model configuration.
    pub model: ModelConfig,
}

fn default_roi_size() -> [usize; 3] {
    [96, 96, 96]
}

fn default_overlap() -> f64 {
    0.25
}

fn default_sw_batch_size() -> usize {
    4
}

fn default_target_spacing() -> [f64; 3] {
    [1.5, 1.5, 2.0]
}

fn default_orientation() -> String {
    "RAS".to_string()
}

fn default_sigma_scale() -> f64 {
    0.125
}

impl SegmentationConfig {
    /// Creates a configuration with default pipeline parameters for the
    /// given model.
    pub fn for_model(path: impl Into<PathBuf>, num_classes: usize) -> Self {
        Self {
            roi_size: default_roi_size(),
            overlap: default_overlap(),
            sw_batch_size: default_sw_batch_size(),
            intensity: IntensityRange::default(),
            target_spacing: default_target_spacing(),
            orientation: default_orientation(),
            blend_mode: BlendMode::default(),
            sigma_scale: default_sigma_scale(),
            parallel: false,
            preload: false,
            model: ModelConfig {
                path: path.into(),
                num_classes,
                input_name: None,
                output_name: None,
                session_pool_size: None,
            },
        }
    }

    /// Validates the configuration.
    ///
    /// Every malformed value is a configuration error surfaced before any
    /// processing starts.
    pub fn validate(&self) -> Result<(), SegError> {
        for (axis, r) in self.roi_size.iter().enumerate() {
            if *r == 0 {
                return Err(SegError::config(format!(
                    "roi_size along axis {axis} must be greater than 0"
                )));
            }
        }
        if !self.overlap.is_finite() || !(0.0..1.0).contains(&self.overlap) {
            return Err(SegError::config(format!(
                "overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }
        if self.sw_batch_size == 0 {
            return Err(SegError::config("sw_batch_size must be greater than 0"));
        }
        if self.intensity.a_min >= self.intensity.a_max {
            return Err(SegError::config(format!(
                "intensity a_min ({}) must be below a_max ({})",
                self.intensity.a_min, self.intensity.a_max
            )));
        }
        if self.intensity.b_min >= self.intensity.b_max {
            return Err(SegError::config(format!(
                "intensity b_min ({}) must be below b_max ({})",
                self.intensity.b_min, self.intensity.b_max
            )));
        }
        for (axis, s) in self.target_spacing.iter().enumerate() {
            if !s.is_finite() || *s <= 0.0 {
                return Err(SegError::config(format!(
                    "target_spacing along axis {axis} must be positive, got {s}"
                )));
            }
        }
        parse_axcodes(&self.orientation)?;
        if self.blend_mode == BlendMode::Gaussian
            && (!self.sigma_scale.is_finite() || self.sigma_scale <= 0.0)
        {
            return Err(SegError::config(format!(
                "sigma_scale must be positive for gaussian blending, got {}",
                self.sigma_scale
            )));
        }
        if self.model.num_classes == 0 {
            return Err(SegError::config("model.num_classes must be at least 1"));
        }
        if let Some(pool) = self.model.session_pool_size {
            if pool == 0 {
                return Err(SegError::config(
                    "model.session_pool_size must be greater than 0",
                ));
            }
        }
        Ok(())
    }

    /// Loads a configuration from a file, detecting the format from the
    /// extension (`.toml` or `.json`). The result is validated.
    pub fn from_file(path: &Path) -> Result<Self, SegError> {
        let content = std::fs::read_to_string(path).map_err(|e| SegError::Config {
            message: format!("failed to read config file {}: {e}", path.display()),
        })?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            Some("json") => Self::from_json(&content)?,
            other => {
                return Err(SegError::config(format!(
                    "unsupported config file extension: {other:?}"
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, SegError> {
        toml::from_str(content).map_err(|e| SegError::Config {
            message: format!("failed to parse TOML config: {e}"),
        })
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, SegError> {
        serde_json::from_str(content).map_err(|e| SegError::Config {
            message: format!("failed to parse JSON config: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SegmentationConfig::for_model("model.onnx", 24);
        config.validate().unwrap();
        assert_eq!(config.roi_size, [96, 96, 96]);
        assert_eq!(config.overlap, 0.25);
        assert_eq!(config.intensity.a_min, -175.0);
        assert_eq!(config.target_spacing, [1.5, 1.5, 2.0]);
    }

    #[test]
    fn test_validation_rejects_bad_fields() {
        let base = SegmentationConfig::for_model("model.onnx", 24);

        let mut config = base.clone();
        config.roi_size = [96, 0, 96];
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.overlap = 1.0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.overlap = -0.1;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.sw_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.intensity.a_min = 300.0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.target_spacing = [1.5, 0.0, 2.0];
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.orientation = "RAR".to_string();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.model.num_classes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_src = r#"
            roi_size = [64, 64, 32]
            overlap = 0.5
            blend_mode = "gaussian"

            [model]
            path = "aorta.onnx"
            num_classes = 24
        "#;
        let config = SegmentationConfig::from_toml(toml_src).unwrap();
        config.validate().unwrap();
        assert_eq!(config.roi_size, [64, 64, 32]);
        assert_eq!(config.overlap, 0.5);
        assert_eq!(config.blend_mode, BlendMode::Gaussian);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.sw_batch_size, 4);
        assert_eq!(config.orientation, "RAS");
    }

    #[test]
    fn test_json_parse() {
        let json_src = r#"{
            "overlap": 0.25,
            "model": { "path": "aorta.onnx", "num_classes": 24 }
        }"#;
        let config = SegmentationConfig::from_json(json_src).unwrap();
        config.validate().unwrap();
        assert_eq!(config.model.num_classes, 24);
    }
}
