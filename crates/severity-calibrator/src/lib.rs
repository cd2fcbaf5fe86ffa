//! Severity Calibrator
//!
//! Post-hoc adjustment of raw severity probabilities from a lumbar spine
//! classifier. Raw softmax output is reweighted with condition- and
//! level-specific performance statistics, biased toward the benign grade
//! where the model has historically been unreliable, and scored for
//! confidence.

pub mod adjustment;
pub mod config;
pub mod confidence;
pub mod log_loss;
pub mod pipeline;
pub mod replay;
pub mod summary;
pub mod weights;

pub use adjustment::{Adjustment, SeverityAdjuster};
pub use config::{AdjustmentConfig, PipelineConfig};
pub use confidence::{confidence_score, max_entropy, normalized_entropy};
pub use log_loss::LogLossTable;
pub use pipeline::{PredictionPipeline, PredictionResult};
pub use replay::ReplayClassifier;
pub use summary::{ConfidenceSummary, EvaluationSummary, GroupAccuracy};
pub use weights::{WeightTable, DEFAULT_CONDITION_WEIGHT, DEFAULT_LEVEL_WEIGHT};
