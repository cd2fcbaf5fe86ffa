use crate::error::GradingResult;
use crate::labels::OneHot;
use crate::types::SliceImage;

/// Backend-agnostic interface to a trained severity classifier.
///
/// Implementations return raw, unnormalized scores (logits) with one entry
/// per severity grade. Anything that produces the wrong number of scores is
/// rejected by the caller, not corrected.
pub trait SeverityClassifier: Send + Sync {
    fn infer(
        &self,
        image: &SliceImage,
        condition: &OneHot,
        level: &OneHot,
    ) -> GradingResult<Vec<f64>>;

    /// Score several samples at once. Output order follows input order.
    ///
    /// The default runs `infer` per sample; backends with real batching
    /// should override it.
    fn infer_batch(
        &self,
        samples: &[(&SliceImage, &OneHot, &OneHot)],
    ) -> GradingResult<Vec<Vec<f64>>> {
        samples
            .iter()
            .map(|(image, condition, level)| self.infer(image, condition, level))
            .collect()
    }

    fn backend_name(&self) -> &'static str;
}
