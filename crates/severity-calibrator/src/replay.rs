use spine_core::{GradingError, GradingResult, OneHot, SeverityClassifier, SliceImage};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Classifier that plays back recorded raw scores in submission order.
///
/// Used to audit an exported inference run without loading the network:
/// the recording must line up one-to-one with the samples fed to the
/// pipeline.
pub struct ReplayClassifier {
    recorded: Mutex<VecDeque<Vec<f64>>>,
}

impl ReplayClassifier {
    pub fn new(recorded: impl IntoIterator<Item = Vec<f64>>) -> Self {
        Self {
            recorded: Mutex::new(recorded.into_iter().collect()),
        }
    }

    /// Recorded outputs not yet played back
    pub fn remaining(&self) -> usize {
        self.recorded.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl SeverityClassifier for ReplayClassifier {
    fn infer(
        &self,
        _image: &SliceImage,
        _condition: &OneHot,
        _level: &OneHot,
    ) -> GradingResult<Vec<f64>> {
        let mut recorded = self
            .recorded
            .lock()
            .map_err(|_| GradingError::Inference("replay recording lock poisoned".to_string()))?;
        recorded
            .pop_front()
            .ok_or_else(|| GradingError::Inference("replay recording exhausted".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "replay"
    }
}
