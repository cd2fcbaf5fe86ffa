//! Fixed label enumerations for the grading task.
//!
//! The declaration order of every enum is the one-hot position the upstream
//! network was trained with, so `ALL[i].index() == i` must always hold.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{GradingError, GradingResult};

/// Number of entries in a condition or level one-hot vector.
pub const LABEL_CARDINALITY: usize = 5;

/// One-hot encoding of a condition or level.
pub type OneHot = [f64; LABEL_CARDINALITY];

/// Which label axis a value belongs to (used in error reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelAxis {
    Condition,
    Level,
    Severity,
}

impl fmt::Display for LabelAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LabelAxis::Condition => "condition",
            LabelAxis::Level => "level",
            LabelAxis::Severity => "severity",
        };
        f.write_str(name)
    }
}

/// Degenerative condition graded on the MRI slice
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Condition {
    #[serde(rename = "Spinal Canal Stenosis")]
    SpinalCanalStenosis,
    #[serde(rename = "Left Neural Foraminal Narrowing")]
    LeftNeuralForaminalNarrowing,
    #[serde(rename = "Right Neural Foraminal Narrowing")]
    RightNeuralForaminalNarrowing,
    #[serde(rename = "Left Subarticular Stenosis")]
    LeftSubarticularStenosis,
    #[serde(rename = "Right Subarticular Stenosis")]
    RightSubarticularStenosis,
}

impl Condition {
    pub const ALL: [Condition; LABEL_CARDINALITY] = [
        Condition::SpinalCanalStenosis,
        Condition::LeftNeuralForaminalNarrowing,
        Condition::RightNeuralForaminalNarrowing,
        Condition::LeftSubarticularStenosis,
        Condition::RightSubarticularStenosis,
    ];

    pub fn index(&self) -> usize {
        match self {
            Condition::SpinalCanalStenosis => 0,
            Condition::LeftNeuralForaminalNarrowing => 1,
            Condition::RightNeuralForaminalNarrowing => 2,
            Condition::LeftSubarticularStenosis => 3,
            Condition::RightSubarticularStenosis => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::SpinalCanalStenosis => "Spinal Canal Stenosis",
            Condition::LeftNeuralForaminalNarrowing => "Left Neural Foraminal Narrowing",
            Condition::RightNeuralForaminalNarrowing => "Right Neural Foraminal Narrowing",
            Condition::LeftSubarticularStenosis => "Left Subarticular Stenosis",
            Condition::RightSubarticularStenosis => "Right Subarticular Stenosis",
        }
    }

    /// Family whose log-loss statistics apply to this condition.
    /// Left and right variants share one family.
    pub fn family(&self) -> ConditionFamily {
        match self {
            Condition::SpinalCanalStenosis => ConditionFamily::SpinalCanalStenosis,
            Condition::LeftNeuralForaminalNarrowing
            | Condition::RightNeuralForaminalNarrowing => {
                ConditionFamily::NeuralForaminalNarrowing
            }
            Condition::LeftSubarticularStenosis | Condition::RightSubarticularStenosis => {
                ConditionFamily::SubarticularStenosis
            }
        }
    }

    pub fn one_hot(&self) -> OneHot {
        one_hot_at(self.index())
    }

    /// Recover a condition from a one-hot (or soft) encoding.
    pub fn decode_one_hot(encoding: &[f64]) -> GradingResult<Self> {
        let index = decode_index(encoding, LabelAxis::Condition)?;
        // decode_index only returns indices below LABEL_CARDINALITY
        Ok(Self::ALL[index])
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| GradingError::InvalidLabel {
                axis: LabelAxis::Condition,
                value: s.to_string(),
            })
    }
}

/// Intervertebral level of the lumbar spine
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Level {
    #[serde(rename = "L1_L2")]
    L1L2,
    #[serde(rename = "L2_L3")]
    L2L3,
    #[serde(rename = "L3_L4")]
    L3L4,
    #[serde(rename = "L4_L5")]
    L4L5,
    #[serde(rename = "L5_S1")]
    L5S1,
}

impl Level {
    pub const ALL: [Level; LABEL_CARDINALITY] =
        [Level::L1L2, Level::L2L3, Level::L3L4, Level::L4L5, Level::L5S1];

    pub fn index(&self) -> usize {
        match self {
            Level::L1L2 => 0,
            Level::L2L3 => 1,
            Level::L3L4 => 2,
            Level::L4L5 => 3,
            Level::L5S1 => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L1L2 => "L1_L2",
            Level::L2L3 => "L2_L3",
            Level::L3L4 => "L3_L4",
            Level::L4L5 => "L4_L5",
            Level::L5S1 => "L5_S1",
        }
    }

    /// The two lowest segments, where most pathology (and most grading error) sits.
    pub fn is_lower_lumbar(&self) -> bool {
        matches!(self, Level::L4L5 | Level::L5S1)
    }

    pub fn one_hot(&self) -> OneHot {
        one_hot_at(self.index())
    }

    pub fn decode_one_hot(encoding: &[f64]) -> GradingResult<Self> {
        let index = decode_index(encoding, LabelAxis::Level)?;
        Ok(Self::ALL[index])
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|l| l.as_str() == s)
            .copied()
            .ok_or_else(|| GradingError::InvalidLabel {
                axis: LabelAxis::Level,
                value: s.to_string(),
            })
    }
}

/// Grouping of conditions that share empirical performance statistics
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ConditionFamily {
    #[serde(rename = "Spinal Canal Stenosis")]
    SpinalCanalStenosis,
    #[serde(rename = "Neural Foraminal Narrowing")]
    NeuralForaminalNarrowing,
    #[serde(rename = "Subarticular Stenosis")]
    SubarticularStenosis,
}

impl ConditionFamily {
    pub const ALL: [ConditionFamily; 3] = [
        ConditionFamily::SpinalCanalStenosis,
        ConditionFamily::NeuralForaminalNarrowing,
        ConditionFamily::SubarticularStenosis,
    ];

    pub fn index(&self) -> usize {
        match self {
            ConditionFamily::SpinalCanalStenosis => 0,
            ConditionFamily::NeuralForaminalNarrowing => 1,
            ConditionFamily::SubarticularStenosis => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionFamily::SpinalCanalStenosis => "Spinal Canal Stenosis",
            ConditionFamily::NeuralForaminalNarrowing => "Neural Foraminal Narrowing",
            ConditionFamily::SubarticularStenosis => "Subarticular Stenosis",
        }
    }

    /// Resolve a free-form condition label to its family by substring.
    ///
    /// Labels naming a foraminal or subarticular finding map to that family
    /// regardless of side; anything else must be the family name itself.
    /// Only for labels that do not parse as a [`Condition`], such as
    /// annotations from other datasets. The pipeline itself goes through
    /// [`Condition::family`].
    pub fn resolve(label: &str) -> Option<Self> {
        if label.contains(ConditionFamily::NeuralForaminalNarrowing.as_str()) {
            Some(ConditionFamily::NeuralForaminalNarrowing)
        } else if label.contains(ConditionFamily::SubarticularStenosis.as_str()) {
            Some(ConditionFamily::SubarticularStenosis)
        } else {
            Self::ALL.iter().find(|f| f.as_str() == label).copied()
        }
    }
}

impl fmt::Display for ConditionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn one_hot_at(index: usize) -> OneHot {
    let mut encoding = [0.0; LABEL_CARDINALITY];
    encoding[index] = 1.0;
    encoding
}

/// Position of the largest entry; the first one wins on ties.
fn decode_index(encoding: &[f64], axis: LabelAxis) -> GradingResult<usize> {
    if encoding.len() != LABEL_CARDINALITY {
        return Err(GradingError::InvalidOneHot(format!(
            "{} encoding has {} entries, expected {}",
            axis,
            encoding.len(),
            LABEL_CARDINALITY
        )));
    }
    if encoding.iter().any(|v| !v.is_finite()) {
        return Err(GradingError::InvalidOneHot(format!(
            "{} encoding contains non-finite values",
            axis
        )));
    }

    let (index, max) = encoding
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        });

    if max <= 0.0 {
        return Err(GradingError::InvalidOneHot(format!(
            "{} encoding has no active entry",
            axis
        )));
    }
    Ok(index)
}
