use serde::{Deserialize, Serialize};
use spine_core::GradingResult;
use std::path::PathBuf;

use crate::log_loss::LogLossTable;
use crate::weights::WeightTable;

/// Constants of the bias correction and confidence score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentConfig {
    /// Log-loss above which a (family, level) pair counts as high uncertainty
    pub high_uncertainty_threshold: f64,
    /// Multiplier on the Severe probability in the high-uncertainty branch
    pub severe_scale: f64,
    /// Multiplier on the Moderate probability in the high-uncertainty branch
    pub moderate_scale: f64,
    /// Flat amount added to the Normal/Mild probability before renormalizing
    pub normal_bias: f64,
    /// Added inside each log term of the entropy
    pub entropy_epsilon: f64,
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            high_uncertainty_threshold: 0.8,
            severe_scale: 0.9,
            moderate_scale: 0.95,
            normal_bias: 0.1,
            entropy_epsilon: 1e-7,
        }
    }
}

impl AdjustmentConfig {
    /// Read overrides from `SPINE_*` environment variables.
    ///
    /// Env vars:
    /// - `SPINE_HIGH_UNCERTAINTY_THRESHOLD` (default 0.8)
    /// - `SPINE_SEVERE_SCALE`               (default 0.9)
    /// - `SPINE_MODERATE_SCALE`             (default 0.95)
    /// - `SPINE_NORMAL_BIAS`                (default 0.1)
    /// - `SPINE_ENTROPY_EPSILON`            (default 1e-7)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Values that fail to parse or fall outside their valid range are
    /// logged and replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let unit = 0.0..=1.0;
        Self {
            high_uncertainty_threshold: read_f64(
                &lookup,
                "SPINE_HIGH_UNCERTAINTY_THRESHOLD",
                defaults.high_uncertainty_threshold,
                |v| v >= 0.0,
            ),
            severe_scale: read_f64(&lookup, "SPINE_SEVERE_SCALE", defaults.severe_scale, |v| {
                unit.contains(&v)
            }),
            moderate_scale: read_f64(
                &lookup,
                "SPINE_MODERATE_SCALE",
                defaults.moderate_scale,
                |v| unit.contains(&v),
            ),
            normal_bias: read_f64(&lookup, "SPINE_NORMAL_BIAS", defaults.normal_bias, |v| {
                v >= 0.0
            }),
            entropy_epsilon: read_f64(
                &lookup,
                "SPINE_ENTROPY_EPSILON",
                defaults.entropy_epsilon,
                |v| v > 0.0,
            ),
        }
    }
}

/// Everything needed to assemble a pipeline besides the classifier
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub adjustment: AdjustmentConfig,
    /// JSON weight table replacing the built-in weights
    pub weights_path: Option<PathBuf>,
    /// JSON log-loss table replacing the built-in values
    pub log_loss_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// Env vars: the `AdjustmentConfig` ones plus
    /// - `SPINE_WEIGHTS_PATH`:  weight table file (default: built-in)
    /// - `SPINE_LOG_LOSS_PATH`: log-loss table file (default: built-in)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            weights_path: path("SPINE_WEIGHTS_PATH"),
            log_loss_path: path("SPINE_LOG_LOSS_PATH"),
            adjustment: AdjustmentConfig::from_lookup(&lookup),
        }
    }

    /// Load the configured tables, falling back to the built-in ones.
    pub fn load_tables(&self) -> GradingResult<(WeightTable, LogLossTable)> {
        let weights = match &self.weights_path {
            Some(path) => WeightTable::from_json_file(path)?,
            None => WeightTable::default(),
        };
        let log_loss = match &self.log_loss_path {
            Some(path) => LogLossTable::from_json_file(path)?,
            None => LogLossTable::default(),
        };
        Ok((weights, log_loss))
    }
}

fn read_f64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: f64,
    in_range: impl Fn(f64) -> bool,
) -> f64 {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && in_range(value) => value,
        Ok(value) if value.is_finite() => {
            tracing::warn!("Ignoring {}={}: out of range, using {}", key, value, default);
            default
        }
        _ => {
            tracing::warn!("Ignoring {}={:?}: not a finite number, using {}", key, raw, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AdjustmentConfig::from_lookup(|_| None);
        assert_eq!(config, AdjustmentConfig::default());
        assert_eq!(config.high_uncertainty_threshold, 0.8);
        assert_eq!(config.entropy_epsilon, 1e-7);
    }

    #[test]
    fn test_overrides() {
        let config = AdjustmentConfig::from_lookup(lookup_from(&[
            ("SPINE_HIGH_UNCERTAINTY_THRESHOLD", "0.5"),
            ("SPINE_NORMAL_BIAS", " 0.2 "),
        ]));
        assert_eq!(config.high_uncertainty_threshold, 0.5);
        assert_eq!(config.normal_bias, 0.2);
        assert_eq!(config.severe_scale, 0.9);
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = AdjustmentConfig::from_lookup(lookup_from(&[
            ("SPINE_SEVERE_SCALE", "ninety percent"),
            ("SPINE_MODERATE_SCALE", "NaN"),
        ]));
        assert_eq!(config.severe_scale, 0.9);
        assert_eq!(config.moderate_scale, 0.95);
    }

    #[test]
    fn test_negative_normal_bias_keeps_default() {
        let config = AdjustmentConfig::from_lookup(lookup_from(&[("SPINE_NORMAL_BIAS", "-0.5")]));
        assert_eq!(config.normal_bias, 0.1);

        let config = AdjustmentConfig::from_lookup(lookup_from(&[("SPINE_NORMAL_BIAS", "0")]));
        assert_eq!(config.normal_bias, 0.0);
    }

    #[test]
    fn test_scales_outside_unit_interval_keep_defaults() {
        let config = AdjustmentConfig::from_lookup(lookup_from(&[
            ("SPINE_SEVERE_SCALE", "-0.9"),
            ("SPINE_MODERATE_SCALE", "1.5"),
        ]));
        assert_eq!(config.severe_scale, 0.9);
        assert_eq!(config.moderate_scale, 0.95);

        let config = AdjustmentConfig::from_lookup(lookup_from(&[
            ("SPINE_SEVERE_SCALE", "1"),
            ("SPINE_MODERATE_SCALE", "0"),
        ]));
        assert_eq!(config.severe_scale, 1.0);
        assert_eq!(config.moderate_scale, 0.0);
    }

    #[test]
    fn test_non_positive_entropy_epsilon_keeps_default() {
        for raw in ["0", "-1e-7"] {
            let config =
                AdjustmentConfig::from_lookup(lookup_from(&[("SPINE_ENTROPY_EPSILON", raw)]));
            assert_eq!(config.entropy_epsilon, 1e-7);
        }
        let config =
            AdjustmentConfig::from_lookup(lookup_from(&[("SPINE_ENTROPY_EPSILON", "1e-9")]));
        assert_eq!(config.entropy_epsilon, 1e-9);
    }

    #[test]
    fn test_negative_threshold_keeps_default() {
        let config = AdjustmentConfig::from_lookup(lookup_from(&[(
            "SPINE_HIGH_UNCERTAINTY_THRESHOLD",
            "-1",
        )]));
        assert_eq!(config.high_uncertainty_threshold, 0.8);
    }

    #[test]
    fn test_pipeline_config_paths() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("SPINE_WEIGHTS_PATH", "/etc/spine/weights.json"),
            ("SPINE_LOG_LOSS_PATH", ""),
        ]));
        assert_eq!(config.weights_path, Some(PathBuf::from("/etc/spine/weights.json")));
        assert_eq!(config.log_loss_path, None);
    }

    #[test]
    fn test_load_builtin_tables() {
        let (weights, log_loss) = PipelineConfig::default().load_tables().unwrap();
        assert_eq!(weights, WeightTable::default());
        assert_eq!(log_loss, LogLossTable::default());
    }

    #[test]
    fn test_missing_table_file_is_an_error() {
        let config = PipelineConfig {
            log_loss_path: Some(PathBuf::from("/nonexistent/log_loss.json")),
            ..Default::default()
        };
        assert!(config.load_tables().is_err());
    }
}
