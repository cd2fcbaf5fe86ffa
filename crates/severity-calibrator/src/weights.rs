//! Condition and level weights
//!
//! Each condition and each level carries a scalar in (0, 1] reflecting how
//! well the classifier performed on it during evaluation. The product of the
//! two scales the raw probabilities before any bias correction.

use serde::{Deserialize, Serialize};
use spine_core::{Condition, GradingError, GradingResult, Level};
use std::collections::BTreeMap;
use std::path::Path;

/// Weight used for a condition missing from a loaded table
pub const DEFAULT_CONDITION_WEIGHT: f64 = 0.95;
/// Weight used for a level missing from a loaded table
pub const DEFAULT_LEVEL_WEIGHT: f64 = 0.90;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    #[serde(default)]
    conditions: BTreeMap<Condition, f64>,
    #[serde(default)]
    levels: BTreeMap<Level, f64>,
}

impl Default for WeightTable {
    fn default() -> Self {
        let conditions = BTreeMap::from([
            (Condition::SpinalCanalStenosis, 1.0), // Best performing condition
            (Condition::LeftNeuralForaminalNarrowing, 0.95),
            (Condition::RightNeuralForaminalNarrowing, 0.95),
            (Condition::LeftSubarticularStenosis, 0.93),
            (Condition::RightSubarticularStenosis, 0.93),
        ]);
        let levels = BTreeMap::from([
            (Level::L1L2, 1.0), // Best performing level
            (Level::L2L3, 0.98),
            (Level::L3L4, 0.95),
            (Level::L4L5, 0.90), // Most challenging level
            (Level::L5S1, 0.92),
        ]);
        Self { conditions, levels }
    }
}

impl WeightTable {
    /// Build a table from explicit entries. Entries may be partial.
    pub fn new(
        conditions: BTreeMap<Condition, f64>,
        levels: BTreeMap<Level, f64>,
    ) -> GradingResult<Self> {
        let table = Self { conditions, levels };
        table.validate()?;
        Ok(table)
    }

    pub fn from_json_str(json: &str) -> GradingResult<Self> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> GradingResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&raw)?;
        tracing::info!(
            "Loaded weight table from {} ({} conditions, {} levels)",
            path.display(),
            table.conditions.len(),
            table.levels.len()
        );
        Ok(table)
    }

    fn validate(&self) -> GradingResult<()> {
        let entries = self
            .conditions
            .iter()
            .map(|(c, w)| (c.as_str(), *w))
            .chain(self.levels.iter().map(|(l, w)| (l.as_str(), *w)));

        for (label, weight) in entries {
            // A zero weight would scale a distribution to all zeros
            if !weight.is_finite() || weight <= 0.0 || weight > 1.0 {
                return Err(GradingError::InvalidTable(format!(
                    "weight for {label} must lie in (0, 1], got {weight}"
                )));
            }
        }
        Ok(())
    }

    pub fn condition_weight(&self, condition: Condition) -> f64 {
        self.conditions
            .get(&condition)
            .copied()
            .unwrap_or(DEFAULT_CONDITION_WEIGHT)
    }

    pub fn level_weight(&self, level: Level) -> f64 {
        self.levels.get(&level).copied().unwrap_or(DEFAULT_LEVEL_WEIGHT)
    }

    /// Product of the condition and level weights
    pub fn combined(&self, condition: Condition, level: Level) -> f64 {
        self.condition_weight(condition) * self.level_weight(level)
    }
}
