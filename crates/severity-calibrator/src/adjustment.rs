//! Condition/level adjustment of raw severity probabilities
//!
//! Order of operations:
//! 1. scale all three probabilities by the combined condition x level weight
//! 2. look up the log-loss of the condition's family at this level
//! 3. above the threshold, damp Severe and Moderate and add a flat amount to
//!    Normal/Mild
//! 4. L1-normalize
//!
//! Step 3 can push Normal/Mild past 1, so step 4 is what restores a valid
//! distribution.

use serde::{Deserialize, Serialize};
use spine_core::{Condition, ConditionFamily, Level, Severity, SeverityDistribution};

use crate::config::AdjustmentConfig;
use crate::confidence::confidence_score;
use crate::log_loss::LogLossTable;
use crate::weights::WeightTable;

/// Every intermediate of one adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub condition: Condition,
    pub level: Level,
    pub family: ConditionFamily,
    /// Condition weight times level weight
    pub combined_weight: f64,
    /// Historical log-loss for (family, level)
    pub log_loss: f64,
    /// Whether the high-uncertainty bias was applied
    pub bias_applied: bool,
    /// Raw probabilities times the combined weight
    pub scaled: [f64; 3],
    /// After the bias correction, before normalization
    pub biased: [f64; 3],
    pub calibrated: SeverityDistribution,
}

/// Stateless adjuster over immutable tables
#[derive(Debug, Clone, Default)]
pub struct SeverityAdjuster {
    weights: WeightTable,
    log_loss: LogLossTable,
    config: AdjustmentConfig,
}

impl SeverityAdjuster {
    pub fn new(weights: WeightTable, log_loss: LogLossTable, config: AdjustmentConfig) -> Self {
        Self {
            weights,
            log_loss,
            config,
        }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn log_loss(&self) -> &LogLossTable {
        &self.log_loss
    }

    pub fn config(&self) -> &AdjustmentConfig {
        &self.config
    }

    pub fn is_high_uncertainty(&self, condition: Condition, level: Level) -> bool {
        self.log_loss.for_condition(condition, level) > self.config.high_uncertainty_threshold
    }

    pub fn adjust(
        &self,
        raw: &SeverityDistribution,
        condition: Condition,
        level: Level,
    ) -> Adjustment {
        let combined_weight = self.weights.combined(condition, level);
        let family = condition.family();
        let log_loss = self.log_loss.get(family, level);

        let mut scaled = raw.probabilities();
        for p in scaled.iter_mut() {
            *p *= combined_weight;
        }

        let bias_applied = log_loss > self.config.high_uncertainty_threshold;
        let mut biased = scaled;
        if bias_applied {
            biased[Severity::Severe.index()] *= self.config.severe_scale;
            biased[Severity::Moderate.index()] *= self.config.moderate_scale;
            biased[Severity::NormalMild.index()] += self.config.normal_bias;
        }

        let calibrated = SeverityDistribution::l1_normalized(biased);

        tracing::trace!(
            "adjust {} {}: weight={:.4} log_loss={:.4} bias={} -> {:?}",
            condition,
            level,
            combined_weight,
            log_loss,
            bias_applied,
            calibrated.probabilities()
        );

        Adjustment {
            condition,
            level,
            family,
            combined_weight,
            log_loss,
            bias_applied,
            scaled,
            biased,
            calibrated,
        }
    }

    pub fn confidence(&self, distribution: &SeverityDistribution) -> f64 {
        confidence_score(distribution, self.config.entropy_epsilon)
    }
}
