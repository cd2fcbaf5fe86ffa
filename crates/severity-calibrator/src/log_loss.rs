//! Per condition family and level log-loss measured on held-out data.
//!
//! High values mark (family, level) pairs the classifier historically got
//! wrong often, which is what triggers the conservative bias correction.

use serde::{Deserialize, Serialize};
use spine_core::{
    Condition, ConditionFamily, GradingError, GradingResult, Level, LABEL_CARDINALITY,
};
use std::collections::BTreeMap;
use std::path::Path;

type LogLossMap = BTreeMap<ConditionFamily, BTreeMap<Level, f64>>;

const FAMILIES: usize = 3;

/// Log-loss values from the evaluation run, indexed `[family][level]`.
/// Foraminal and subarticular rows average the left and right sides.
const DEFAULT_LOG_LOSS: [[f64; LABEL_CARDINALITY]; FAMILIES] = [
    // Spinal Canal Stenosis
    [0.1067, 0.4514, 0.5757, 0.8928, 0.2164],
    // Neural Foraminal Narrowing
    [0.2200, 0.4635, 0.9959, 1.1089, 1.0936],
    // Subarticular Stenosis
    [0.2285, 0.5337, 0.9766, 1.1551, 0.7856],
];

/// Complete family x level log-loss table.
///
/// Construction checks every cell, so lookups cannot fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LogLossMap", into = "LogLossMap")]
pub struct LogLossTable {
    values: [[f64; LABEL_CARDINALITY]; FAMILIES],
}

impl Default for LogLossTable {
    fn default() -> Self {
        Self {
            values: DEFAULT_LOG_LOSS,
        }
    }
}

impl LogLossTable {
    pub fn from_json_str(json: &str) -> GradingResult<Self> {
        let map: LogLossMap = serde_json::from_str(json)?;
        Self::try_from(map)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> GradingResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&raw)?;
        tracing::info!("Loaded log-loss table from {}", path.display());
        Ok(table)
    }

    pub fn get(&self, family: ConditionFamily, level: Level) -> f64 {
        self.values[family.index()][level.index()]
    }

    pub fn for_condition(&self, condition: Condition, level: Level) -> f64 {
        self.get(condition.family(), level)
    }

    /// (family, level) pairs whose log-loss exceeds `threshold`
    pub fn pairs_above(&self, threshold: f64) -> Vec<(ConditionFamily, Level)> {
        ConditionFamily::ALL
            .iter()
            .flat_map(|&family| Level::ALL.iter().map(move |&level| (family, level)))
            .filter(|&(family, level)| self.get(family, level) > threshold)
            .collect()
    }
}

impl TryFrom<LogLossMap> for LogLossTable {
    type Error = GradingError;

    fn try_from(map: LogLossMap) -> Result<Self, Self::Error> {
        let mut values = [[0.0; LABEL_CARDINALITY]; FAMILIES];
        for family in ConditionFamily::ALL {
            let row = map.get(&family).ok_or_else(|| {
                GradingError::InvalidTable(format!("log-loss table is missing family {family}"))
            })?;
            for level in Level::ALL {
                let value = row.get(&level).copied().ok_or_else(|| {
                    GradingError::InvalidTable(format!(
                        "log-loss table is missing {family} / {level}"
                    ))
                })?;
                if !value.is_finite() || value < 0.0 {
                    return Err(GradingError::InvalidTable(format!(
                        "log-loss for {family} / {level} must be a non-negative number, got {value}"
                    )));
                }
                values[family.index()][level.index()] = value;
            }
        }
        Ok(Self { values })
    }
}

impl From<LogLossTable> for LogLossMap {
    fn from(table: LogLossTable) -> Self {
        ConditionFamily::ALL
            .iter()
            .map(|&family| {
                let row = Level::ALL
                    .iter()
                    .map(|&level| (level, table.get(family, level)))
                    .collect();
                (family, row)
            })
            .collect()
    }
}
