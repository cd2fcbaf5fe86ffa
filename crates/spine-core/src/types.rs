use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{GradingError, GradingResult};
use crate::labels::{LabelAxis, Level, OneHot};

/// Number of severity grades the classifier scores.
pub const SEVERITY_CLASSES: usize = 3;

/// Severity grade of a finding
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Severity {
    #[serde(rename = "Normal/Mild")]
    NormalMild,
    Moderate,
    Severe,
}

impl Severity {
    pub const ALL: [Severity; SEVERITY_CLASSES] =
        [Severity::NormalMild, Severity::Moderate, Severity::Severe];

    pub fn index(&self) -> usize {
        match self {
            Severity::NormalMild => 0,
            Severity::Moderate => 1,
            Severity::Severe => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::NormalMild => "Normal/Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
        }
    }

    /// Map a regression output on the 0 (normal) to 2 (severe) scale to the
    /// nearest grade. Scores outside the scale clamp to the end grades.
    pub fn from_regression_score(score: f64) -> Option<Self> {
        if !score.is_finite() {
            return None;
        }
        let grade = score.round().clamp(0.0, 2.0) as usize;
        Self::from_index(grade)
    }

    /// Position of this grade on the regression scale.
    pub fn regression_target(&self) -> f64 {
        self.index() as f64
    }

    /// Importance weight of a labelled sample.
    ///
    /// Lower lumbar levels count 1.5x and moderate/severe findings 2x,
    /// compounding.
    pub fn sample_weight(&self, level: Level) -> f64 {
        let mut weight = 1.0;
        if level.is_lower_lumbar() {
            weight *= 1.5;
        }
        if *self != Severity::NormalMild {
            weight *= 2.0;
        }
        weight
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|sev| sev.as_str() == s)
            .copied()
            .ok_or_else(|| GradingError::InvalidLabel {
                axis: LabelAxis::Severity,
                value: s.to_string(),
            })
    }
}

/// Probability mass over the three severity grades.
///
/// Always non-negative and summing to 1 within floating tolerance; every
/// constructor either validates or normalizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct SeverityDistribution {
    probabilities: [f64; SEVERITY_CLASSES],
}

impl SeverityDistribution {
    /// Tolerance used when validating externally supplied probabilities.
    pub const SUM_TOLERANCE: f64 = 1e-6;

    /// Floor on the L1 norm divisor, so an all-zero vector stays finite.
    const NORM_FLOOR: f64 = 1e-12;

    /// Accept probabilities that already form a distribution.
    pub fn from_probabilities(probabilities: [f64; SEVERITY_CLASSES]) -> GradingResult<Self> {
        if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(GradingError::InvalidDistribution(format!(
                "probabilities must be finite and non-negative: {:?}",
                probabilities
            )));
        }
        let sum: f64 = probabilities.iter().sum();
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(GradingError::InvalidDistribution(format!(
                "probabilities sum to {sum}, expected 1"
            )));
        }
        Ok(Self { probabilities })
    }

    /// Softmax over raw classifier scores.
    ///
    /// The score vector must have exactly one entry per grade.
    pub fn from_logits(logits: &[f64]) -> GradingResult<Self> {
        if logits.len() != SEVERITY_CLASSES {
            return Err(GradingError::MalformedOutput {
                expected: SEVERITY_CLASSES,
                actual: logits.len(),
            });
        }
        if logits.iter().any(|v| !v.is_finite()) {
            return Err(GradingError::Inference(format!(
                "classifier produced non-finite scores: {:?}",
                logits
            )));
        }

        // Shift by the max so exp() cannot overflow
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut probabilities = [0.0; SEVERITY_CLASSES];
        for (p, &logit) in probabilities.iter_mut().zip(logits) {
            *p = (logit - max).exp();
        }
        let total: f64 = probabilities.iter().sum();
        for p in probabilities.iter_mut() {
            *p /= total;
        }
        Ok(Self { probabilities })
    }

    /// L1-normalize a non-negative weight vector into a distribution.
    pub fn l1_normalized(weights: [f64; SEVERITY_CLASSES]) -> Self {
        let norm = weights.iter().map(|w| w.abs()).sum::<f64>().max(Self::NORM_FLOOR);
        let mut probabilities = weights;
        for p in probabilities.iter_mut() {
            *p /= norm;
        }
        Self { probabilities }
    }

    pub fn probabilities(&self) -> [f64; SEVERITY_CLASSES] {
        self.probabilities
    }

    pub fn probability(&self, severity: Severity) -> f64 {
        self.probabilities[severity.index()]
    }

    pub fn sum(&self) -> f64 {
        self.probabilities.iter().sum()
    }

    pub fn is_normalized(&self, tolerance: f64) -> bool {
        (self.sum() - 1.0).abs() <= tolerance
    }

    pub fn max_probability(&self) -> f64 {
        self.probabilities.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Index of the most probable grade; the lowest grade wins ties.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &p) in self.probabilities.iter().enumerate().skip(1) {
            if p > self.probabilities[best] {
                best = i;
            }
        }
        best
    }

    pub fn most_likely(&self) -> Severity {
        // argmax is always < SEVERITY_CLASSES
        Severity::ALL[self.argmax()]
    }

    /// Shannon entropy in nats, with `epsilon` added inside each log term.
    pub fn entropy(&self, epsilon: f64) -> f64 {
        -self
            .probabilities
            .iter()
            .map(|&p| p * (p + epsilon).ln())
            .sum::<f64>()
    }
}

impl TryFrom<[f64; SEVERITY_CLASSES]> for SeverityDistribution {
    type Error = GradingError;

    fn try_from(value: [f64; SEVERITY_CLASSES]) -> Result<Self, Self::Error> {
        Self::from_probabilities(value)
    }
}

impl From<SeverityDistribution> for [f64; SEVERITY_CLASSES] {
    fn from(value: SeverityDistribution) -> Self {
        value.probabilities
    }
}

/// Preprocessed MRI slice, already in the layout the classifier expects.
///
/// The grading pipeline never looks inside; it only hands the tensor to the
/// classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceImage {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl SliceImage {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> GradingResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(GradingError::InvalidImage(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Placeholder tensor for classifiers that ignore pixel data.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One sample as delivered by the dataset collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    /// Opaque study identifier, passed through untouched
    pub study_id: String,
    pub image: SliceImage,
    pub condition: OneHot,
    pub level: OneHot,
    /// Ground-truth grade, when the sample is labelled
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Ordered group of samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleBatch {
    pub items: Vec<BatchItem>,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<BatchItem>> for SampleBatch {
    fn from(items: Vec<BatchItem>) -> Self {
        Self { items }
    }
}

impl IntoIterator for SampleBatch {
    type Item = BatchItem;
    type IntoIter = std::vec::IntoIter<BatchItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
