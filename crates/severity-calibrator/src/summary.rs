//! Aggregate views over a grading run
//!
//! Numeric summaries only. Rendering and persistence belong to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spine_core::{Condition, Level, Severity, SEVERITY_CLASSES};
use std::collections::BTreeMap;

use crate::pipeline::PredictionResult;

/// Spread of confidence scores over a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Share of predictions where the high-uncertainty bias fired
    pub bias_rate: f64,
    pub generated_at: DateTime<Utc>,
}

impl ConfidenceSummary {
    /// Returns `None` for an empty run.
    pub fn from_results(results: &[PredictionResult]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        let n = results.len() as f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut total = 0.0;
        for r in results {
            min = min.min(r.confidence);
            max = max.max(r.confidence);
            total += r.confidence;
        }
        let biased = results.iter().filter(|r| r.bias_applied).count();

        Some(Self {
            count: results.len(),
            mean: total / n,
            min,
            max,
            bias_rate: biased as f64 / n,
            generated_at: Utc::now(),
        })
    }
}

/// Correct / total counter for one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAccuracy {
    pub correct: usize,
    pub total: usize,
}

impl GroupAccuracy {
    fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    /// Fraction correct, 0 for an empty group
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Accuracy breakdown over the labelled part of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub overall: GroupAccuracy,
    /// Accuracy with lower-lumbar and moderate/severe samples up-weighted
    pub weighted_accuracy: f64,
    /// Mean distance between predicted and true grade on the 0-2 scale
    pub mean_absolute_grade_error: f64,
    pub by_condition: BTreeMap<Condition, GroupAccuracy>,
    pub by_level: BTreeMap<Level, GroupAccuracy>,
    /// Rows are true grades, columns predicted grades
    pub confusion_matrix: [[usize; SEVERITY_CLASSES]; SEVERITY_CLASSES],
    pub generated_at: DateTime<Utc>,
}

impl EvaluationSummary {
    /// Only results carrying a ground-truth grade count.
    /// Returns `None` if none do.
    pub fn from_results(results: &[PredictionResult]) -> Option<Self> {
        let mut overall = GroupAccuracy::default();
        let mut by_condition: BTreeMap<Condition, GroupAccuracy> = BTreeMap::new();
        let mut by_level: BTreeMap<Level, GroupAccuracy> = BTreeMap::new();
        let mut confusion_matrix = [[0usize; SEVERITY_CLASSES]; SEVERITY_CLASSES];
        let mut weight_total = 0.0;
        let mut weight_correct = 0.0;
        let mut grade_error = 0.0;

        for r in results {
            let Some(truth) = r.ground_truth else {
                continue;
            };
            let correct = truth == r.severity;

            overall.record(correct);
            by_condition.entry(r.condition).or_default().record(correct);
            by_level.entry(r.level).or_default().record(correct);
            confusion_matrix[truth.index()][r.severity.index()] += 1;

            let weight = truth.sample_weight(r.level);
            weight_total += weight;
            if correct {
                weight_correct += weight;
            }
            grade_error += (r.severity.regression_target() - truth.regression_target()).abs();
        }

        if overall.total == 0 {
            return None;
        }

        Some(Self {
            overall,
            weighted_accuracy: weight_correct / weight_total,
            mean_absolute_grade_error: grade_error / overall.total as f64,
            by_condition,
            by_level,
            confusion_matrix,
            generated_at: Utc::now(),
        })
    }

    pub fn accuracy(&self) -> f64 {
        self.overall.accuracy()
    }

    /// Recall for one true grade (row-normalized diagonal)
    pub fn recall(&self, severity: Severity) -> f64 {
        let row = &self.confusion_matrix[severity.index()];
        let total: usize = row.iter().sum();
        if total == 0 {
            0.0
        } else {
            row[severity.index()] as f64 / total as f64
        }
    }
}
