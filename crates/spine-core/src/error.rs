use thiserror::Error;

use crate::labels::LabelAxis;

#[derive(Error, Debug)]
pub enum GradingError {
    #[error("Invalid {axis} label: {value:?}")]
    InvalidLabel { axis: LabelAxis, value: String },

    #[error("Malformed model output: expected {expected} scores, got {actual}")]
    MalformedOutput { expected: usize, actual: usize },

    #[error("Invalid severity distribution: {0}")]
    InvalidDistribution(String),

    #[error("Invalid image tensor: {0}")]
    InvalidImage(String),

    #[error("Invalid one-hot encoding: {0}")]
    InvalidOneHot(String),

    #[error("Invalid lookup table: {0}")]
    InvalidTable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type GradingResult<T> = Result<T, GradingError>;
