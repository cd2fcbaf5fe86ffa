//! Prediction pipeline: classifier inference followed by adjustment and
//! confidence scoring.

use serde::{Deserialize, Serialize};
use spine_core::{
    Condition, GradingError, GradingResult, Level, OneHot, SampleBatch, Severity,
    SeverityClassifier, SeverityDistribution, SliceImage,
};

use crate::adjustment::SeverityAdjuster;
use crate::config::PipelineConfig;

/// Outcome of grading one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Study identifier of the batch item, if the sample came from a batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_id: Option<String>,
    pub condition: Condition,
    pub level: Level,
    /// Calibrated probabilities
    pub probabilities: SeverityDistribution,
    /// Softmax of the raw classifier scores, before any adjustment
    pub original_probabilities: SeverityDistribution,
    pub severity: Severity,
    pub confidence: f64,
    pub bias_applied: bool,
    /// Ground-truth grade carried over from a labelled batch item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<Severity>,
}

impl PredictionResult {
    /// Index of the predicted grade (argmax of the calibrated probabilities)
    pub fn severity_index(&self) -> usize {
        self.severity.index()
    }

    pub fn is_correct(&self) -> Option<bool> {
        self.ground_truth.map(|truth| truth == self.severity)
    }
}

pub struct PredictionPipeline<C> {
    classifier: C,
    adjuster: SeverityAdjuster,
}

impl<C: SeverityClassifier> PredictionPipeline<C> {
    /// Pipeline with the built-in tables and constants
    pub fn new(classifier: C) -> Self {
        Self::with_adjuster(classifier, SeverityAdjuster::default())
    }

    pub fn with_adjuster(classifier: C, adjuster: SeverityAdjuster) -> Self {
        Self {
            classifier,
            adjuster,
        }
    }

    pub fn from_config(classifier: C, config: &PipelineConfig) -> GradingResult<Self> {
        let (weights, log_loss) = config.load_tables()?;
        tracing::info!(
            "Prediction pipeline ready (backend={}, threshold={})",
            classifier.backend_name(),
            config.adjustment.high_uncertainty_threshold
        );
        Ok(Self::with_adjuster(
            classifier,
            SeverityAdjuster::new(weights, log_loss, config.adjustment),
        ))
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn adjuster(&self) -> &SeverityAdjuster {
        &self.adjuster
    }

    /// Grade one slice given free-form condition and level labels.
    ///
    /// Labels outside the fixed enumerations fail with `InvalidLabel`
    /// before the classifier is called.
    pub fn predict(
        &self,
        image: &SliceImage,
        condition: &str,
        level: &str,
    ) -> GradingResult<PredictionResult> {
        let condition: Condition = condition.parse()?;
        let level: Level = level.parse()?;
        self.predict_labels(image, condition, level)
    }

    pub fn predict_labels(
        &self,
        image: &SliceImage,
        condition: Condition,
        level: Level,
    ) -> GradingResult<PredictionResult> {
        let raw = self
            .classifier
            .infer(image, &condition.one_hot(), &level.one_hot())?;
        let original = SeverityDistribution::from_logits(&raw)?;
        let result = self.calibrate(original, condition, level);

        tracing::debug!(
            "{} {}: {} (confidence {:.3})",
            condition,
            level,
            result.severity,
            result.confidence
        );
        Ok(result)
    }

    /// Adjustment and scoring of an already-softmaxed distribution.
    pub fn calibrate(
        &self,
        original: SeverityDistribution,
        condition: Condition,
        level: Level,
    ) -> PredictionResult {
        let adjustment = self.adjuster.adjust(&original, condition, level);
        let probabilities = adjustment.calibrated;

        PredictionResult {
            study_id: None,
            condition,
            level,
            probabilities,
            original_probabilities: original,
            severity: probabilities.most_likely(),
            confidence: self.adjuster.confidence(&probabilities),
            bias_applied: adjustment.bias_applied,
            ground_truth: None,
        }
    }

    /// Grade every sample of every batch, preserving input order.
    ///
    /// Condition and level are recovered from each item's one-hot
    /// encodings. The first failing sample aborts the run.
    pub fn batch_predict<I>(&self, batches: I) -> GradingResult<Vec<PredictionResult>>
    where
        I: IntoIterator<Item = SampleBatch>,
    {
        let mut results = Vec::new();
        let mut batch_count = 0usize;

        for batch in batches {
            batch_count += 1;
            if batch.is_empty() {
                continue;
            }

            let labels = batch
                .items
                .iter()
                .map(|item| -> GradingResult<(Condition, Level)> {
                    Ok((
                        Condition::decode_one_hot(&item.condition)?,
                        Level::decode_one_hot(&item.level)?,
                    ))
                })
                .collect::<GradingResult<Vec<_>>>()?;

            let inputs: Vec<(&SliceImage, &OneHot, &OneHot)> = batch
                .items
                .iter()
                .map(|item| (&item.image, &item.condition, &item.level))
                .collect();
            let outputs = self.classifier.infer_batch(&inputs)?;

            if outputs.len() != batch.len() {
                return Err(GradingError::Inference(format!(
                    "{} returned {} outputs for a batch of {}",
                    self.classifier.backend_name(),
                    outputs.len(),
                    batch.len()
                )));
            }

            for ((item, (condition, level)), raw) in
                batch.items.into_iter().zip(labels).zip(outputs)
            {
                let original = SeverityDistribution::from_logits(&raw)?;
                let mut result = self.calibrate(original, condition, level);
                result.study_id = Some(item.study_id);
                result.ground_truth = item.severity;
                results.push(result);
            }

            tracing::debug!("Batch {} done ({} predictions so far)", batch_count, results.len());
        }

        tracing::info!(
            "Graded {} samples in {} batches (backend={})",
            results.len(),
            batch_count,
            self.classifier.backend_name()
        );
        Ok(results)
    }
}
