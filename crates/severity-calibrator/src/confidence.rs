//! Confidence score of a calibrated distribution.
//!
//! `confidence = max_probability * (1 - entropy / ln 3)`. The score is not
//! clamped: with the log epsilon a near-certain distribution has a slightly
//! negative entropy, so its confidence can land marginally above 1.

use spine_core::{SeverityDistribution, SEVERITY_CLASSES};

/// Largest possible entropy over the severity grades (ln 3 nats)
pub fn max_entropy() -> f64 {
    (SEVERITY_CLASSES as f64).ln()
}

pub fn normalized_entropy(distribution: &SeverityDistribution, epsilon: f64) -> f64 {
    distribution.entropy(epsilon) / max_entropy()
}

pub fn confidence_score(distribution: &SeverityDistribution, epsilon: f64) -> f64 {
    distribution.max_probability() * (1.0 - normalized_entropy(distribution, epsilon))
}
