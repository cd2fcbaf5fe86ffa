use approx::assert_relative_eq;
use severity_calibrator::{
    confidence_score, AdjustmentConfig, ConfidenceSummary, EvaluationSummary, LogLossTable,
    PipelineConfig, PredictionPipeline, ReplayClassifier, SeverityAdjuster, WeightTable,
};
use spine_core::{
    BatchItem, Condition, GradingError, Level, SampleBatch, Severity, SeverityDistribution,
    SliceImage,
};

/// Logits whose softmax is exactly `p`
fn logits_for(p: [f64; 3]) -> Vec<f64> {
    p.iter().map(|v| v.ln()).collect()
}

fn batch_item(study_id: &str, condition: Condition, level: Level, truth: Severity) -> BatchItem {
    BatchItem {
        study_id: study_id.to_string(),
        image: SliceImage::empty(),
        condition: condition.one_hot(),
        level: level.one_hot(),
        severity: Some(truth),
    }
}

#[test]
fn test_subarticular_l4_l5_scenario_end_to_end() {
    let replay = ReplayClassifier::new(vec![logits_for([0.2, 0.3, 0.5])]);
    let pipeline = PredictionPipeline::new(replay);

    let result = pipeline
        .predict(&SliceImage::empty(), "Left Subarticular Stenosis", "L4_L5")
        .unwrap();

    let w = 0.93 * 0.90;
    let biased = [0.2 * w + 0.1, 0.3 * w * 0.95, 0.5 * w * 0.9];
    let total: f64 = biased.iter().sum();

    let probs = result.probabilities.probabilities();
    for i in 0..3 {
        assert_relative_eq!(probs[i], biased[i] / total, epsilon = 1e-9);
    }
    assert!(result.bias_applied);
    assert_eq!(result.severity, Severity::Severe);
    assert_relative_eq!(
        result.original_probabilities.probability(Severity::Severe),
        0.5,
        epsilon = 1e-9
    );
    assert_relative_eq!(
        result.confidence,
        confidence_score(&result.probabilities, 1e-7),
        epsilon = 1e-15
    );
    assert_eq!(pipeline.classifier().remaining(), 0);
}

#[test]
fn test_every_pair_yields_a_valid_prediction() {
    let mut recorded = Vec::new();
    let mut batch = Vec::new();
    for (i, c) in Condition::ALL.iter().enumerate() {
        for (j, l) in Level::ALL.iter().enumerate() {
            recorded.push(vec![i as f64 * 0.3, j as f64 * -0.2, 0.25]);
            batch.push(batch_item(&format!("{i}-{j}"), *c, *l, Severity::NormalMild));
        }
    }

    let pipeline = PredictionPipeline::new(ReplayClassifier::new(recorded));
    let results = pipeline
        .batch_predict(batch.chunks(7).map(|chunk| SampleBatch::from(chunk.to_vec())))
        .unwrap();

    assert_eq!(results.len(), 25);
    for (k, r) in results.iter().enumerate() {
        let expected_id = format!("{}-{}", k / 5, k % 5);
        assert_eq!(r.study_id.as_deref(), Some(expected_id.as_str()));
        assert!(r.probabilities.is_normalized(1e-6));
        assert_eq!(r.severity.index(), r.probabilities.argmax());

        let weight = WeightTable::default().combined(r.condition, r.level);
        assert!((0.837 - 1e-12..=1.0 + 1e-12).contains(&weight));
    }
}

#[test]
fn test_replay_misalignment_surfaces_as_error() {
    let pipeline = PredictionPipeline::new(ReplayClassifier::new(vec![vec![0.0, 0.0, 0.0]]));
    let batch = SampleBatch::from(vec![
        batch_item("a", Condition::SpinalCanalStenosis, Level::L1L2, Severity::NormalMild),
        batch_item("b", Condition::SpinalCanalStenosis, Level::L2L3, Severity::NormalMild),
    ]);
    let err = pipeline.batch_predict(vec![batch]).unwrap_err();
    assert!(matches!(err, GradingError::Inference(_)));
}

#[test]
fn test_summaries_over_a_batch_run() {
    let recorded = vec![
        logits_for([0.7, 0.2, 0.1]),
        logits_for([0.1, 0.2, 0.7]),
        logits_for([0.2, 0.6, 0.2]),
    ];
    let batch = SampleBatch::from(vec![
        batch_item("a", Condition::SpinalCanalStenosis, Level::L1L2, Severity::NormalMild),
        batch_item("b", Condition::SpinalCanalStenosis, Level::L4L5, Severity::Severe),
        batch_item(
            "c",
            Condition::RightNeuralForaminalNarrowing,
            Level::L2L3,
            Severity::Severe,
        ),
    ]);

    let pipeline = PredictionPipeline::new(ReplayClassifier::new(recorded));
    let results = pipeline.batch_predict(vec![batch]).unwrap();

    let confidence = ConfidenceSummary::from_results(&results).unwrap();
    assert_eq!(confidence.count, 3);
    assert!(confidence.min <= confidence.mean && confidence.mean <= confidence.max);
    assert_relative_eq!(confidence.bias_rate, 1.0 / 3.0, epsilon = 1e-12);

    let eval = EvaluationSummary::from_results(&results).unwrap();
    assert_eq!(eval.overall.total, 3);
    assert_eq!(eval.overall.correct, 2);
    assert_eq!(eval.confusion_matrix[2][1], 1);
}

#[test]
fn test_tables_loaded_from_files() {
    let dir = std::env::temp_dir().join(format!("severity-calibrator-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    // Everything below 0.5 except SCS at L1_L2
    let mut log_loss = String::from("{");
    let families = ["Spinal Canal Stenosis", "Neural Foraminal Narrowing", "Subarticular Stenosis"];
    for (i, family) in families.iter().enumerate() {
        let first = if i == 0 { 0.95 } else { 0.1 };
        log_loss.push_str(&format!(
            r#""{family}": {{"L1_L2": {first}, "L2_L3": 0.1, "L3_L4": 0.1, "L4_L5": 0.1, "L5_S1": 0.1}}"#
        ));
        if i + 1 < families.len() {
            log_loss.push(',');
        }
    }
    log_loss.push('}');

    let log_loss_path = dir.join("log_loss.json");
    let weights_path = dir.join("weights.json");
    std::fs::write(&log_loss_path, log_loss).unwrap();
    std::fs::write(&weights_path, r#"{"conditions": {"Spinal Canal Stenosis": 1.0}, "levels": {"L1_L2": 0.5}}"#).unwrap();

    let config = PipelineConfig {
        adjustment: AdjustmentConfig::default(),
        weights_path: Some(weights_path),
        log_loss_path: Some(log_loss_path),
    };
    let pipeline = PredictionPipeline::from_config(
        ReplayClassifier::new(vec![logits_for([0.2, 0.3, 0.5]); 2]),
        &config,
    )
    .unwrap();

    let adjuster: &SeverityAdjuster = pipeline.adjuster();
    assert_relative_eq!(
        adjuster.weights().combined(Condition::SpinalCanalStenosis, Level::L1L2),
        0.5
    );
    assert!(adjuster.is_high_uncertainty(Condition::SpinalCanalStenosis, Level::L1L2));
    assert!(!adjuster.is_high_uncertainty(Condition::SpinalCanalStenosis, Level::L4L5));

    let high = pipeline
        .predict(&SliceImage::empty(), "Spinal Canal Stenosis", "L1_L2")
        .unwrap();
    assert!(high.bias_applied);

    let low = pipeline
        .predict(&SliceImage::empty(), "Spinal Canal Stenosis", "L4_L5")
        .unwrap();
    assert!(!low.bias_applied);
    assert_relative_eq!(low.probabilities.probability(Severity::Severe), 0.5, epsilon = 1e-9);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_default_tables_match_built_in_constants() {
    let adjuster = SeverityAdjuster::new(
        WeightTable::default(),
        LogLossTable::default(),
        AdjustmentConfig::default(),
    );
    let raw = SeverityDistribution::from_probabilities([0.2, 0.3, 0.5]).unwrap();
    let adj = adjuster.adjust(&raw, Condition::SpinalCanalStenosis, Level::L4L5);
    assert_eq!(adj.biased[2], adj.scaled[2] * 0.9);
}

#[test]
fn test_out_of_range_overrides_keep_distribution_valid() {
    let config = AdjustmentConfig::from_lookup(|key| match key {
        "SPINE_NORMAL_BIAS" => Some("-0.5".to_string()),
        "SPINE_SEVERE_SCALE" => Some("-2".to_string()),
        "SPINE_ENTROPY_EPSILON" => Some("-1".to_string()),
        _ => None,
    });
    assert_eq!(config, AdjustmentConfig::default());

    let adjuster = SeverityAdjuster::new(WeightTable::default(), LogLossTable::default(), config);
    let raw = SeverityDistribution::from_probabilities([0.2, 0.3, 0.5]).unwrap();
    let adj = adjuster.adjust(&raw, Condition::SpinalCanalStenosis, Level::L4L5);
    assert!(adj.bias_applied);
    assert!(adj.calibrated.is_normalized(1e-6));
    assert!(adj.calibrated.probabilities().iter().all(|p| *p >= 0.0));
    assert!(adjuster.confidence(&adj.calibrated).is_finite());
}

#[test]
fn test_zero_weight_table_is_rejected_before_adjustment() {
    let dir = std::env::temp_dir().join(format!("severity-calibrator-zero-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let weights_path = dir.join("weights.json");
    std::fs::write(&weights_path, r#"{"conditions": {"Spinal Canal Stenosis": 0.0}}"#).unwrap();

    let config = PipelineConfig {
        weights_path: Some(weights_path),
        ..Default::default()
    };
    let err = PredictionPipeline::from_config(ReplayClassifier::new(Vec::new()), &config)
        .err()
        .unwrap();
    assert!(matches!(err, GradingError::InvalidTable(_)));

    std::fs::remove_dir_all(&dir).ok();
}
