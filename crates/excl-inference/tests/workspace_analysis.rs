//! End-to-end analysis of a serialized workspace specification.

use excl_inference::{
    upper_limit_scan, AsymptoticCalculator, MaximumLikelihoodEstimator,
};
use excl_model::{CountingModel, Workspace};

fn load_counting_workspace() -> Workspace {
    let json = include_str!("../../../tests/fixtures/counting_workspace.json");
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_workspace_compiles_to_expected_parameters() {
    let ws = load_counting_workspace();
    let model = CountingModel::from_workspace(&ws).unwrap();

    assert_eq!(model.n_params(), 2);
    assert_eq!(model.poi_index(), Some(0));
    assert_eq!(model.parameters()[0].name, "mu");
    assert_eq!(model.parameters()[1].name, "bkg_uncertainty[0]");
    assert_eq!(model.auxdata(), vec![1.0]);
}

#[test]
fn test_workspace_serializes_back_with_schema_tags() {
    let ws = load_counting_workspace();
    let json = serde_json::to_string_pretty(&ws).unwrap();
    assert!(json.contains("\"type\": \"normfactor\""));
    assert!(json.contains("\"type\": \"staterror\""));

    let back: Workspace = serde_json::from_str(&json).unwrap();
    assert_eq!(back.channels[0].samples.len(), 2);
    assert_eq!(back.observations[0].data, vec![100.0]);
}

#[test]
fn test_hypotest_and_limits_from_workspace_data() {
    // The workspace binds its own observations; analyze it directly.
    let ws = load_counting_workspace();
    let model = CountingModel::from_workspace(&ws).unwrap();
    let mle = MaximumLikelihoodEstimator::new();
    let calculator = AsymptoticCalculator::new(&mle, &model).unwrap();

    let result = calculator.hypotest(&mle, 1.0).unwrap();
    assert!(result.cls > 0.05 && result.cls <= 1.0, "CLs = {}", result.cls);
    for w in result.expected.windows(2) {
        assert!(w[0] <= w[1] + 1e-12);
    }

    let scan: Vec<f64> = (0..101).map(|i| 0.1 * i as f64).collect();
    let limits = upper_limit_scan(&calculator, &mle, &scan, 0.05).unwrap();
    assert!(limits.observed > 0.0 && limits.observed < 10.0);
    assert!(limits.expected_median() > 0.0 && limits.expected_median() < 10.0);

    // CLs at the quoted limit should sit at the level, within
    // interpolation tolerance.
    let at_limit = calculator.hypotest(&mle, limits.observed).unwrap();
    assert!((at_limit.cls - 0.05).abs() < 1e-2, "CLs at limit: {}", at_limit.cls);
}
