//! YAML and TOML configuration file support.
//!
//! A configuration file can specify the numeric quantization options, a
//! default precision, an explicit list of tensors to convert, and a batch
//! directory to sweep.

use crate::calibration::RangeConfig;
use crate::errors::{PackError, Result};
use crate::pipeline::OutputTarget;
use crate::quantization::QuantConfig;
use crate::tensor::{Precision, TensorRole};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The flat set of numeric options consumed by calibration and quantization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationOptions {
    /// Trial saturated fraction (0.0-1.0) above which outlier clipping runs.
    pub saturation_threshold: f32,

    /// Tail percentile for outlier detection (0.0-50.0).
    pub outlier_percentile: f32,

    /// Standard deviation multiplier for range clipping.
    pub sigma_multiplier: f32,

    /// Minimum range preservation ratio (0.0-1.0).
    pub range_threshold: f32,

    /// Minimum SNR (dB) for INT8; lower falls back to FP16.
    pub snr_threshold: f32,

    /// Saturation percentage above which a warning is counted.
    pub saturation_warning_threshold: f32,
}

impl Default for QuantizationOptions {
    fn default() -> Self {
        let range = RangeConfig::default();
        let quant = QuantConfig::default();
        Self {
            saturation_threshold: range.saturation_threshold,
            outlier_percentile: range.outlier_percentile,
            sigma_multiplier: range.sigma_multiplier,
            range_threshold: range.range_threshold,
            snr_threshold: quant.snr_threshold,
            saturation_warning_threshold: quant.saturation_warning_threshold,
        }
    }
}

impl QuantizationOptions {
    pub fn range_config(&self) -> RangeConfig {
        RangeConfig {
            saturation_threshold: self.saturation_threshold,
            outlier_percentile: self.outlier_percentile,
            sigma_multiplier: self.sigma_multiplier,
            range_threshold: self.range_threshold,
        }
    }

    pub fn quant_config(&self) -> QuantConfig {
        QuantConfig {
            snr_threshold: self.snr_threshold,
            saturation_warning_threshold: self.saturation_warning_threshold,
        }
    }

    /// Reject values outside their meaningful domain.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Config`] naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("saturation_threshold", self.saturation_threshold),
            ("outlier_percentile", self.outlier_percentile),
            ("sigma_multiplier", self.sigma_multiplier),
            ("range_threshold", self.range_threshold),
            ("snr_threshold", self.snr_threshold),
            ("saturation_warning_threshold", self.saturation_warning_threshold),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(PackError::Config {
                    reason: format!("{name} must be finite, got {value}"),
                });
            }
        }

        if !(0.0..=1.0).contains(&self.saturation_threshold) {
            return Err(PackError::Config {
                reason: format!(
                    "saturation_threshold must be in [0, 1], got {}",
                    self.saturation_threshold
                ),
            });
        }
        if !(0.0..=50.0).contains(&self.outlier_percentile) {
            return Err(PackError::Config {
                reason: format!(
                    "outlier_percentile must be in [0, 50], got {}",
                    self.outlier_percentile
                ),
            });
        }
        if self.sigma_multiplier < 0.0 {
            return Err(PackError::Config {
                reason: format!(
                    "sigma_multiplier must be non-negative, got {}",
                    self.sigma_multiplier
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.range_threshold) {
            return Err(PackError::Config {
                reason: format!("range_threshold must be in [0, 1], got {}", self.range_threshold),
            });
        }
        if !(0.0..=100.0).contains(&self.saturation_warning_threshold) {
            return Err(PackError::Config {
                reason: format!(
                    "saturation_warning_threshold must be in [0, 100], got {}",
                    self.saturation_warning_threshold
                ),
            });
        }

        Ok(())
    }
}

/// Top-level conversion plan.
///
/// Can be loaded from a YAML or TOML file with [`Config::from_file`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default precision for every tensor. Defaults to `int8`.
    #[serde(default)]
    pub precision: Precision,

    #[serde(default)]
    pub quantization: QuantizationOptions,

    /// Explicit tensors to convert.
    #[serde(default)]
    pub tensors: Vec<TensorJob>,

    /// Directory sweep configuration.
    #[serde(default)]
    pub batch: Option<BatchConfig>,
}

/// One tensor to convert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorJob {
    /// Path to a float32 `.npy` array.
    pub input: String,

    /// Path of the tensor file to write.
    pub output: String,

    /// Override the plan's default precision.
    #[serde(default)]
    pub precision: Option<Precision>,

    /// Defaults to `weight`.
    #[serde(default)]
    pub role: Option<TensorRole>,

    #[serde(default)]
    pub transpose: bool,

    /// Skip this tensor if the output file already exists.
    #[serde(default)]
    pub skip_existing: bool,
}

/// Convert every `.npy` file in a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub input_dir: String,

    pub output_dir: String,

    /// Skip tensors whose output already exists.
    #[serde(default)]
    pub skip_existing: bool,

    /// Continue with the remaining tensors after a failure.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Config {
    /// Load a config from a YAML or TOML file (auto-detected by extension).
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Config`] on I/O, parse, or unsupported format errors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PackError::Config { reason: "Config file has no extension".into() })?;

        let content = std::fs::read_to_string(path).map_err(|e| PackError::Config {
            reason: format!("Failed to read config file '{}': {e}", path.display()),
        })?;

        match extension {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(PackError::Config {
                reason: format!("Unsupported config format: {}", extension),
            }),
        }
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| PackError::Config { reason: format!("Failed to parse YAML config: {e}") })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PackError::Config { reason: format!("Failed to parse TOML config: {e}") })
    }

    /// Validate the options and that every path is non-empty.
    pub fn validate(&self) -> Result<()> {
        self.quantization.validate()?;

        for (idx, job) in self.tensors.iter().enumerate() {
            if job.input.is_empty() {
                return Err(PackError::Config {
                    reason: format!("Tensor {}: input path is empty", idx),
                });
            }
            if job.output.is_empty() {
                return Err(PackError::Config {
                    reason: format!("Tensor {}: output path is empty", idx),
                });
            }
        }

        if let Some(batch) = &self.batch {
            if batch.input_dir.is_empty() {
                return Err(PackError::Config { reason: "Batch input_dir is empty".into() });
            }
            if batch.output_dir.is_empty() {
                return Err(PackError::Config { reason: "Batch output_dir is empty".into() });
            }
        }

        Ok(())
    }

    /// Effective output target for a job (job overrides or plan defaults).
    pub fn target_for(&self, job: &TensorJob) -> OutputTarget {
        OutputTarget::new(&job.output)
            .with_precision(job.precision.unwrap_or(self.precision))
            .with_role(job.role.unwrap_or_default())
            .with_transpose(job.transpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
precision: int8
quantization:
  snr_threshold: 25.0
  sigma_multiplier: 3.0

tensors:
  - input: q_proj.npy
    output: layer_0_attn_q.weights

  - input: input_layernorm.npy
    output: layer_0_input_norm.weights
    role: norm

  - input: embed.npy
    output: token_embeddings.weights
    precision: fp16
    transpose: true

batch:
  input_dir: "dump/"
  output_dir: out/
  skip_existing: true
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.precision, Precision::Int8);
        assert_eq!(config.quantization.snr_threshold, 25.0);
        assert_eq!(config.quantization.sigma_multiplier, 3.0);
        // untouched fields keep their defaults
        assert_eq!(config.quantization.outlier_percentile, 0.01);
        assert_eq!(config.tensors.len(), 3);
        assert!(config.batch.is_some());
        config.validate().unwrap();

        let norm = config.target_for(&config.tensors[1]);
        assert_eq!(norm.role, TensorRole::Norm);
        assert_eq!(norm.precision, Precision::Int8);

        let emb = config.target_for(&config.tensors[2]);
        assert_eq!(emb.precision, Precision::Float16);
        assert!(emb.transpose);
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
precision = "fp32"

[quantization]
range_threshold = 0.4

[[tensors]]
input = "a.npy"
output = "a.weights"

[[tensors]]
input = "b.npy"
output = "b.weights"
precision = "int8"

[batch]
input_dir = "dump/"
output_dir = "out/"
continue_on_error = true
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.precision, Precision::Float32);
        assert_eq!(config.quantization.range_threshold, 0.4);
        assert_eq!(config.quantization.snr_threshold, 20.0);
        assert_eq!(config.tensors.len(), 2);
        assert_eq!(config.target_for(&config.tensors[0]).precision, Precision::Float32);
        assert_eq!(config.target_for(&config.tensors[1]).precision, Precision::Int8);
        assert!(config.batch.unwrap().continue_on_error);
    }

    #[test]
    fn test_defaults() {
        let options = QuantizationOptions::default();
        assert_eq!(options.saturation_threshold, 0.01);
        assert_eq!(options.outlier_percentile, 0.01);
        assert_eq!(options.sigma_multiplier, 3.5);
        assert_eq!(options.range_threshold, 0.5);
        assert_eq!(options.snr_threshold, 20.0);
        assert_eq!(options.saturation_warning_threshold, 0.1);
        options.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let options = QuantizationOptions { outlier_percentile: 60.0, ..Default::default() };
        assert!(matches!(options.validate(), Err(PackError::Config { .. })));

        let options = QuantizationOptions { snr_threshold: f32::NAN, ..Default::default() };
        assert!(matches!(options.validate(), Err(PackError::Config { .. })));

        let config = Config::from_yaml("tensors:\n  - input: ''\n    output: x.weights\n").unwrap();
        assert!(matches!(config.validate(), Err(PackError::Config { .. })));
    }

    #[test]
    fn test_unknown_precision_is_parse_error() {
        assert!(matches!(Config::from_yaml("precision: int4"), Err(PackError::Config { .. })));
    }
}
