//! severity-grader: replay recorded classifier outputs through the
//! prediction pipeline and report calibrated grades.
//!
//! The input file is a JSON array of recorded samples:
//!   [{"study_id": "4003253", "condition": "Spinal Canal Stenosis",
//!     "level": "L4_L5", "logits": [0.3, 1.1, -0.4], "severity": "Moderate"}]
//! `severity` (ground truth) and `regression_score` are optional.
//!
//! Usage:
//!   cargo run -p severity-grader -- --input recorded.json
//!   cargo run -p severity-grader -- --input recorded.json --batch-size 64 --json

use anyhow::Context;
use serde::Deserialize;
use severity_calibrator::{
    ConfidenceSummary, EvaluationSummary, PipelineConfig, PredictionPipeline, PredictionResult,
    ReplayClassifier,
};
use spine_core::{BatchItem, Condition, Level, SampleBatch, Severity, SliceImage};

const DEFAULT_BATCH_SIZE: usize = 32;

/// One sample of an exported inference run
#[derive(Debug, Deserialize)]
struct RecordedSample {
    study_id: String,
    condition: String,
    level: String,
    logits: Vec<f64>,
    #[serde(default)]
    severity: Option<Severity>,
    /// Output of the regression network for the same sample, if exported
    #[serde(default)]
    regression_score: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Logs go to stderr so `--json` output stays pipeable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "severity_grader=info,severity_calibrator=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let print_json = args.iter().any(|a| a == "--json");

    let batch_size: usize = args
        .iter()
        .position(|a| a == "--batch-size")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_BATCH_SIZE);

    let Some(input) = args
        .iter()
        .position(|a| a == "--input")
        .and_then(|i| args.get(i + 1))
    else {
        eprintln!("Usage:");
        eprintln!("  severity-grader --input PATH       Recorded samples (JSON array)");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --batch-size N     Samples per batch (default: {})", DEFAULT_BATCH_SIZE);
        eprintln!("  --json             Print every prediction as JSON instead of the report");
        eprintln!();
        eprintln!("Environment:");
        eprintln!("  SPINE_WEIGHTS_PATH, SPINE_LOG_LOSS_PATH, SPINE_HIGH_UNCERTAINTY_THRESHOLD, ...");
        std::process::exit(1);
    };

    let raw = std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?;
    let samples: Vec<RecordedSample> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {input}"))?;
    tracing::info!("Loaded {} recorded samples from {}", samples.len(), input);

    let mut items = Vec::with_capacity(samples.len());
    let mut recorded = Vec::with_capacity(samples.len());
    let mut regression_grades = Vec::with_capacity(samples.len());
    for sample in samples {
        let condition: Condition = sample
            .condition
            .parse()
            .with_context(|| format!("study {}", sample.study_id))?;
        let level: Level = sample
            .level
            .parse()
            .with_context(|| format!("study {}", sample.study_id))?;

        regression_grades.push(sample.regression_score.and_then(Severity::from_regression_score));
        recorded.push(sample.logits);
        items.push(BatchItem {
            study_id: sample.study_id,
            image: SliceImage::empty(),
            condition: condition.one_hot(),
            level: level.one_hot(),
            severity: sample.severity,
        });
    }

    let config = PipelineConfig::from_env();
    let pipeline = PredictionPipeline::from_config(ReplayClassifier::new(recorded), &config)?;

    let batches = items
        .chunks(batch_size)
        .map(|chunk| SampleBatch::from(chunk.to_vec()));
    let results = pipeline.batch_predict(batches)?;

    if print_json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_report(&results, &regression_grades);
    }
    Ok(())
}

fn print_report(results: &[PredictionResult], regression_grades: &[Option<Severity>]) {
    let Some(confidence) = ConfidenceSummary::from_results(results) else {
        println!("No samples graded.");
        return;
    };

    println!();
    println!("Graded {} samples", confidence.count);
    println!("Average prediction confidence: {:.4}", confidence.mean);
    println!("Minimum confidence: {:.4}", confidence.min);
    println!("Maximum confidence: {:.4}", confidence.max);
    println!("High-uncertainty bias applied: {:.1}%", confidence.bias_rate * 100.0);

    let mut counts = [0usize; 3];
    for r in results {
        counts[r.severity.index()] += 1;
    }
    println!();
    println!("Predicted grades:");
    for severity in Severity::ALL {
        println!("  {:<12} {}", severity.as_str(), counts[severity.index()]);
    }

    let compared: Vec<bool> = results
        .iter()
        .zip(regression_grades)
        .filter_map(|(r, grade)| grade.map(|g| g == r.severity))
        .collect();
    if !compared.is_empty() {
        let agree = compared.iter().filter(|a| **a).count();
        println!();
        println!(
            "Agreement with regression grades: {}/{} ({:.1}%)",
            agree,
            compared.len(),
            agree as f64 / compared.len() as f64 * 100.0
        );
    }

    let Some(eval) = EvaluationSummary::from_results(results) else {
        return;
    };

    println!();
    println!(
        "Accuracy: {:.2}% ({}/{})",
        eval.accuracy() * 100.0,
        eval.overall.correct,
        eval.overall.total
    );
    println!("Weighted accuracy: {:.2}%", eval.weighted_accuracy * 100.0);
    println!("Mean absolute grade error: {:.4}", eval.mean_absolute_grade_error);

    println!();
    println!("Accuracy by Condition:");
    for (condition, acc) in &eval.by_condition {
        println!("  {:<34} {:>6.2}%  (n={})", condition.as_str(), acc.accuracy() * 100.0, acc.total);
    }

    println!();
    println!("Accuracy by Level:");
    for (level, acc) in &eval.by_level {
        println!("  {:<34} {:>6.2}%  (n={})", level.as_str(), acc.accuracy() * 100.0, acc.total);
    }

    println!();
    println!("Confusion matrix (rows = true, columns = predicted):");
    println!(
        "  {:<12} {:>12} {:>12} {:>12}",
        "",
        Severity::NormalMild.as_str(),
        Severity::Moderate.as_str(),
        Severity::Severe.as_str()
    );
    for severity in Severity::ALL {
        let row = eval.confusion_matrix[severity.index()];
        println!(
            "  {:<12} {:>12} {:>12} {:>12}   recall {:.2}",
            severity.as_str(),
            row[0],
            row[1],
            row[2],
            eval.recall(severity)
        );
    }
}
