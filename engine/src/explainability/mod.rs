//! Explanation quality probes: how consistently and informatively the
//! model's decisions can be attributed to its input features.

pub mod backend;

pub use backend::{AttributionBackend, Backends, LocalExplanation, SurrogateBackend};

use crate::adapter::{probe_sample, probe_seed, ModelType, ProbeResult, TestAdapter, TestFault};
use crate::artifacts::ArtifactWriter;
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::model::{checked_predict, positive_scores, PredictiveModel};
use crate::stats::{
    agreement, mean, pearson, rank_descending, second_differences, shuffle_column, std_dev,
    variance,
};
use crate::types::{FeatureRanking, TestConfig, TestOutcome};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const DEFAULT_SHAP_GLOBAL_THRESHOLD: f64 = 0.7;
pub const DEFAULT_SHAP_LOCAL_THRESHOLD: f64 = 0.6;
pub const DEFAULT_LIME_THRESHOLD: f64 = 0.5;
pub const DEFAULT_PERMUTATION_THRESHOLD: f64 = 0.7;
pub const DEFAULT_PARTIAL_DEPENDENCE_THRESHOLD: f64 = 0.6;
pub const DEFAULT_COMPREHENSIVE_THRESHOLD: f64 = 0.6;

const DEFAULT_SAMPLE_SIZE: usize = 100;
const DEFAULT_BACKGROUND_SIZE: usize = 50;
const DEFAULT_LOCAL_INSTANCES: usize = 10;
const DEFAULT_LIME_INSTANCES: usize = 5;
const DEFAULT_REPEATS: usize = 5;
const DEFAULT_TOP_N: usize = 5;
const DEFAULT_PDP_FEATURES: usize = 3;
const DEFAULT_GRID_RESOLUTION: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExplainabilityTest {
    ShapGlobal,
    ShapLocal,
    LimeExplanation,
    PermutationImportance,
    PartialDependence,
    Comprehensive,
}

impl ExplainabilityTest {
    pub const ALL: [ExplainabilityTest; 6] = [
        ExplainabilityTest::ShapGlobal,
        ExplainabilityTest::ShapLocal,
        ExplainabilityTest::LimeExplanation,
        ExplainabilityTest::PermutationImportance,
        ExplainabilityTest::PartialDependence,
        ExplainabilityTest::Comprehensive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExplainabilityTest::ShapGlobal => "shap_global",
            ExplainabilityTest::ShapLocal => "shap_local",
            ExplainabilityTest::LimeExplanation => "lime_explanation",
            ExplainabilityTest::PermutationImportance => "permutation_importance",
            ExplainabilityTest::PartialDependence => "partial_dependence",
            ExplainabilityTest::Comprehensive => "comprehensive_explainability",
        }
    }

    pub fn default_threshold(&self) -> f64 {
        match self {
            ExplainabilityTest::ShapGlobal => DEFAULT_SHAP_GLOBAL_THRESHOLD,
            ExplainabilityTest::ShapLocal => DEFAULT_SHAP_LOCAL_THRESHOLD,
            ExplainabilityTest::LimeExplanation => DEFAULT_LIME_THRESHOLD,
            ExplainabilityTest::PermutationImportance => DEFAULT_PERMUTATION_THRESHOLD,
            ExplainabilityTest::PartialDependence => DEFAULT_PARTIAL_DEPENDENCE_THRESHOLD,
            ExplainabilityTest::Comprehensive => DEFAULT_COMPREHENSIVE_THRESHOLD,
        }
    }

    /// Sub-tests averaged by the comprehensive probe.
    fn components() -> [ExplainabilityTest; 5] {
        [
            ExplainabilityTest::ShapGlobal,
            ExplainabilityTest::ShapLocal,
            ExplainabilityTest::LimeExplanation,
            ExplainabilityTest::PermutationImportance,
            ExplainabilityTest::PartialDependence,
        ]
    }
}

impl FromStr for ExplainabilityTest {
    type Err = TestFault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExplainabilityTest::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| TestFault::UnknownTest {
                adapter: "explainability".to_string(),
                test: s.to_string(),
            })
    }
}

/// Averaged model output along a grid of values for one feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependenceCurve {
    pub grid: Vec<f64>,
    pub values: Vec<f64>,
}

impl DependenceCurve {
    pub fn range(&self) -> f64 {
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        if self.values.is_empty() {
            0.0
        } else {
            max - min
        }
    }

    /// `1 / (1 + variance of the second differences)`.
    pub fn smoothness(&self) -> f64 {
        1.0 / (1.0 + variance(&second_differences(&self.values)))
    }
}

pub struct ExplainabilityAdapter {
    config: EngineConfig,
    backends: Backends,
    artifacts: ArtifactWriter,
}

impl ExplainabilityAdapter {
    /// Adapter using every attribution backend compiled into this build.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backends(config, Backends::detect())
    }

    pub fn with_backends(config: EngineConfig, backends: Backends) -> Self {
        info!(backends = ?backends.names(), "Explainability backends selected");
        let artifacts = ArtifactWriter::new(config.artifact_dir.clone());
        Self {
            config,
            backends,
            artifacts,
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    fn dependency(name: &str) -> TestFault {
        TestFault::DependencyUnavailable {
            dependency: name.to_string(),
        }
    }

    /// Global importance through the best available route: Shapley
    /// attributions, then the model's own importances.
    fn global_importance(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let test = ExplainabilityTest::ShapGlobal;
        let threshold = config.threshold_or(test.name(), test.default_threshold());
        let top_n = config.param_usize("top_n")?.unwrap_or(DEFAULT_TOP_N);

        if let Some(backend) = &self.backends.shapley {
            let background_size = config
                .param_usize("background_size")?
                .unwrap_or(DEFAULT_BACKGROUND_SIZE);
            let background = data.sample(background_size.max(1), rng);
            let attributions =
                backend.attributions(model, background.features(), data.features(), rng)?;

            let flat: Vec<f64> = attributions.iter().copied().collect();
            let consistency = 1.0 / (1.0 + variance(&flat));
            let importance = mean_abs_columns(&attributions);
            let ranking = FeatureRanking::new(data.feature_names(), &importance);
            let artifact = self.artifacts.write_json(test.name(), "importance", &ranking)?;

            return Ok(TestOutcome::scored(consistency, threshold, true)
                .with_metric("consistency", consistency)
                .with_metric("feature_importance", importance)
                .with_metric("top_features", ranking.top(top_n))
                .with_metric("backend", backend.name())
                .with_artifact(artifact));
        }

        if let Some(native) = model.feature_importances() {
            if native.len() != data.n_features() {
                return Err(TestFault::DimensionMismatch {
                    expected: data.n_features(),
                    actual: native.len(),
                });
            }
            debug!("No Shapley backend, using native feature importances");
            let values = native.to_vec();
            let total: f64 = values.iter().map(|v| v.abs()).sum();
            let peak = values.iter().map(|v| v.abs()).fold(0.0, f64::max);
            let concentration = if total > 0.0 { peak / total } else { 0.0 };
            let ranking = FeatureRanking::new(data.feature_names(), &values);
            let artifact = self.artifacts.write_json(test.name(), "importance", &ranking)?;

            return Ok(TestOutcome::scored(concentration, threshold, true)
                .with_metric("concentration", concentration)
                .with_metric("feature_importance", values)
                .with_metric("top_features", ranking.top(top_n))
                .with_metric("backend", "native_importance")
                .with_artifact(artifact));
        }

        Err(Self::dependency("shapley"))
    }

    fn shap_global(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        match self.global_importance(model, data, config, rng) {
            Err(TestFault::DependencyUnavailable { dependency }) => {
                warn!(
                    "Global importance unavailable: no {} backend and no native importances",
                    dependency
                );
                let threshold = config.threshold_or(
                    ExplainabilityTest::ShapGlobal.name(),
                    DEFAULT_SHAP_GLOBAL_THRESHOLD,
                );
                Ok(TestOutcome::scored(0.0, threshold, true)
                    .with_verdict(false)
                    .with_metric(
                        "error",
                        format!(
                            "{} backend not available and the model exposes no feature importances",
                            dependency
                        ),
                    ))
            }
            other => other,
        }
    }

    fn shap_local(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let test = ExplainabilityTest::ShapLocal;
        let backend = self
            .backends
            .shapley
            .as_ref()
            .ok_or_else(|| Self::dependency("shapley"))?;
        let count = config
            .param_usize("num_instances")?
            .unwrap_or(DEFAULT_LOCAL_INSTANCES);
        let background_size = config
            .param_usize("background_size")?
            .unwrap_or(DEFAULT_BACKGROUND_SIZE);

        let instances = data.sample(count.max(2), rng);
        let background = data.sample(background_size.max(1), rng);
        let attributions =
            backend.attributions(model, background.features(), instances.features(), rng)?;

        let mean_abs = mean_abs_columns(&attributions);
        let spread: Vec<f64> = instances
            .features()
            .axis_iter(Axis(1))
            .map(|column| variance(&column.to_vec()))
            .collect();
        let consistency = pearson(&mean_abs, &spread).unwrap_or(0.0).max(0.0);

        let explanations: Vec<Vec<f64>> = attributions.outer_iter().map(|row| row.to_vec()).collect();
        let artifact = self.artifacts.write_json(test.name(), "explanations", &explanations)?;

        let threshold = config.threshold_or(test.name(), test.default_threshold());
        Ok(TestOutcome::scored(consistency, threshold, true)
            .with_metric("local_consistency", consistency)
            .with_metric("mean_abs_attribution", mean_abs)
            .with_metric("instances_explained", instances.n_samples())
            .with_artifact(artifact))
    }

    fn lime_explanation(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let test = ExplainabilityTest::LimeExplanation;
        let backend = self
            .backends
            .surrogate
            .as_ref()
            .ok_or_else(|| Self::dependency("surrogate"))?;
        let count = config
            .param_usize("num_instances")?
            .unwrap_or(DEFAULT_LIME_INSTANCES);

        let instances = data.sample(count.max(1), rng);
        let mut explanations = Vec::with_capacity(instances.n_samples());
        for row in instances.features().outer_iter() {
            explanations.push(backend.explain(model, data.features(), row, rng)?);
        }
        let fidelities: Vec<f64> = explanations.iter().map(|e| e.fidelity).collect();
        let mean_fidelity = mean(&fidelities);
        let artifact = self.artifacts.write_json(test.name(), "explanations", &explanations)?;

        let threshold = config.threshold_or(test.name(), test.default_threshold());
        Ok(TestOutcome::scored(mean_fidelity, threshold, true)
            .with_metric("mean_fidelity", mean_fidelity)
            .with_metric("fidelities", fidelities)
            .with_metric("instances_explained", explanations.len())
            .with_metric("backend", backend.name())
            .with_artifact(artifact))
    }

    fn permutation_importance(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let test = ExplainabilityTest::PermutationImportance;
        let repeats = config.param_usize("n_repeats")?.unwrap_or(DEFAULT_REPEATS);
        if repeats == 0 {
            return Err(TestFault::invalid("n_repeats", "must be greater than 0"));
        }
        let top_n = config.param_usize("top_n")?.unwrap_or(DEFAULT_TOP_N);

        let baseline = agreement(&checked_predict(model, data.features())?, data.labels());
        let mut importance_mean = Vec::with_capacity(data.n_features());
        let mut importance_std = Vec::with_capacity(data.n_features());
        for feature in 0..data.n_features() {
            let mut drops = Vec::with_capacity(repeats);
            for _ in 0..repeats {
                let shuffled = shuffle_column(data.features(), feature, rng);
                let accuracy = agreement(&checked_predict(model, &shuffled)?, data.labels());
                drops.push(baseline - accuracy);
            }
            importance_mean.push(mean(&drops));
            importance_std.push(std_dev(&drops));
        }

        let average_importance = mean(&importance_mean);
        let stability = if average_importance > 0.0 {
            (1.0 - mean(&importance_std) / average_importance).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let ranking = FeatureRanking::new(data.feature_names(), &importance_mean);
        let artifact = self.artifacts.write_json(test.name(), "importance", &ranking)?;

        let threshold = config.threshold_or(test.name(), test.default_threshold());
        Ok(TestOutcome::scored(stability, threshold, true)
            .with_metric("stability", stability)
            .with_metric("baseline_accuracy", baseline)
            .with_metric("importance_mean", importance_mean)
            .with_metric("importance_std", importance_std)
            .with_metric("top_features", ranking.top(top_n))
            .with_artifact(artifact))
    }

    fn partial_dependence(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
    ) -> ProbeResult<TestOutcome> {
        let test = ExplainabilityTest::PartialDependence;
        let top_n = config.param_usize("top_n")?.unwrap_or(DEFAULT_PDP_FEATURES);
        let resolution = config
            .param_usize("grid_resolution")?
            .unwrap_or(DEFAULT_GRID_RESOLUTION);
        if resolution < 3 {
            return Err(TestFault::invalid("grid_resolution", "must be at least 3"));
        }

        let mut curves = Vec::with_capacity(data.n_features());
        for feature in 0..data.n_features() {
            curves.push(dependence_curve(model, data.features(), feature, resolution)?);
        }

        let ranges: Vec<f64> = curves.iter().map(DependenceCurve::range).collect();
        let selected: Vec<usize> = rank_descending(&ranges).into_iter().take(top_n.max(1)).collect();
        let mut smoothness = BTreeMap::new();
        let mut dumped = BTreeMap::new();
        for &feature in &selected {
            let name = data.feature_names()[feature].clone();
            smoothness.insert(name.clone(), curves[feature].smoothness());
            dumped.insert(name, curves[feature].clone());
        }
        let score = mean(&smoothness.values().copied().collect::<Vec<_>>());
        let artifact = self.artifacts.write_json(test.name(), "curves", &dumped)?;

        let features: Vec<String> = selected
            .iter()
            .map(|&i| data.feature_names()[i].clone())
            .collect();
        let threshold = config.threshold_or(test.name(), test.default_threshold());
        Ok(TestOutcome::scored(score, threshold, true)
            .with_metric("smoothness", smoothness)
            .with_metric("features_analyzed", features)
            .with_artifact(artifact))
    }

    /// Mean of every sub-test that produced a score. Sub-tests whose
    /// backend is missing are left out of both the mean and the attempt count.
    fn comprehensive(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let mut scores = BTreeMap::new();
        let mut unavailable = Vec::new();
        let mut attempted = 0usize;
        let mut passed = 0usize;
        let mut artifacts = Vec::new();

        for test in ExplainabilityTest::components() {
            let outcome = match test {
                ExplainabilityTest::ShapGlobal => self.global_importance(model, data, config, rng),
                other => self.component(other, model, data, config, rng),
            };
            match outcome {
                Ok(outcome) => {
                    attempted += 1;
                    if outcome.passed {
                        passed += 1;
                    }
                    scores.insert(test.name().to_string(), outcome.score);
                    artifacts.extend(outcome.artifacts);
                }
                Err(TestFault::DependencyUnavailable { dependency }) => {
                    debug!(test = test.name(), %dependency, "Sub-test skipped, backend unavailable");
                    unavailable.push(test.name().to_string());
                }
                Err(fault) => {
                    attempted += 1;
                    warn!(test = test.name(), "Sub-test failed: {}", fault);
                }
            }
        }

        if scores.is_empty() {
            return Err(TestFault::insufficient(
                "no explainability sub-test produced a score",
            ));
        }

        let values: Vec<f64> = scores.values().copied().collect();
        let score = mean(&values);
        let threshold = config.threshold_or(
            ExplainabilityTest::Comprehensive.name(),
            DEFAULT_COMPREHENSIVE_THRESHOLD,
        );
        let mut outcome = TestOutcome::scored(score, threshold, true)
            .with_metric("sub_test_scores", scores)
            .with_metric("tests_passed", passed)
            .with_metric("tests_attempted", attempted)
            .with_metric("unavailable", unavailable);
        outcome.artifacts = artifacts;
        Ok(outcome)
    }

    fn component(
        &self,
        test: ExplainabilityTest,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        match test {
            ExplainabilityTest::ShapGlobal => self.shap_global(model, data, config, rng),
            ExplainabilityTest::ShapLocal => self.shap_local(model, data, config, rng),
            ExplainabilityTest::LimeExplanation => self.lime_explanation(model, data, config, rng),
            ExplainabilityTest::PermutationImportance => {
                self.permutation_importance(model, data, config, rng)
            }
            ExplainabilityTest::PartialDependence => self.partial_dependence(model, data, config),
            ExplainabilityTest::Comprehensive => self.comprehensive(model, data, config, rng),
        }
    }
}

impl Default for ExplainabilityAdapter {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TestAdapter for ExplainabilityAdapter {
    fn adapter_name(&self) -> &'static str {
        "explainability"
    }

    fn supported_model_types(&self) -> &'static [ModelType] {
        &[ModelType::Tabular]
    }

    fn get_available_tests(&self) -> Vec<&'static str> {
        ExplainabilityTest::ALL.iter().map(|t| t.name()).collect()
    }

    fn validate_config(&self, config: &TestConfig) -> bool {
        self.supports_test(&config.test_name)
    }

    fn execute_test(
        &self,
        model: &dyn PredictiveModel,
        dataset: &Dataset,
        config: &TestConfig,
    ) -> ProbeResult<TestOutcome> {
        let test: ExplainabilityTest = config.test_name.parse()?;
        let seed = probe_seed(config, &self.config)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let data = probe_sample(dataset, config, &self.config, DEFAULT_SAMPLE_SIZE, &mut rng)?;
        if data.n_features() == 0 {
            return Err(TestFault::insufficient("dataset has no features"));
        }

        let outcome = self.component(test, model, &data, config, &mut rng)?;
        Ok(outcome
            .with_metadata("sample_size", data.n_samples())
            .with_metadata("random_seed", seed))
    }
}

/// Mean absolute value of each column.
fn mean_abs_columns(values: &Array2<f64>) -> Vec<f64> {
    values
        .axis_iter(Axis(1))
        .map(|column| column.iter().map(|v| v.abs()).sum::<f64>() / column.len().max(1) as f64)
        .collect()
}

/// Partial dependence of the positive score on `feature` over an evenly
/// spaced grid spanning its observed range.
fn dependence_curve(
    model: &dyn PredictiveModel,
    features: &Array2<f64>,
    feature: usize,
    resolution: usize,
) -> ProbeResult<DependenceCurve> {
    let column = features.column(feature);
    let low = column.iter().copied().fold(f64::INFINITY, f64::min);
    let high = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let grid: Vec<f64> = Array1::linspace(low, high, resolution).to_vec();

    let mut values = Vec::with_capacity(grid.len());
    let mut modified = features.clone();
    for &point in &grid {
        modified.column_mut(feature).fill(point);
        values.push(positive_scores(model, &modified)?.mean().unwrap_or(0.0));
    }
    Ok(DependenceCurve { grid, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogisticRegression, ThresholdRule};

    /// Two informative features and one constant.
    fn dataset() -> Dataset {
        let mut rows = Vec::new();
        for i in 0..40 {
            let a = (i % 10) as f64 / 10.0 - 0.45;
            let b = ((i * 7) % 13) as f64 / 13.0 - 0.5;
            let label = if 2.0 * a + b > 0.0 { 1.0 } else { 0.0 };
            rows.push(vec![a, b, 1.0, label]);
        }
        Dataset::from_table(
            vec!["a".into(), "b".into(), "constant".into(), "label".into()],
            rows,
        )
        .unwrap()
    }

    fn model() -> LogisticRegression {
        LogisticRegression::new(vec![4.0, 2.0, 0.0], 0.0)
    }

    #[test]
    fn test_test_names_round_trip() {
        for test in ExplainabilityTest::ALL {
            assert_eq!(test.name().parse::<ExplainabilityTest>().unwrap(), test);
        }
        assert!("shap".parse::<ExplainabilityTest>().is_err());
    }

    #[test]
    fn test_linear_curve_is_smooth() {
        let curve = DependenceCurve {
            grid: vec![0.0, 1.0, 2.0, 3.0],
            values: vec![0.0, 0.5, 1.0, 1.5],
        };
        assert_eq!(curve.smoothness(), 1.0);
        assert_eq!(curve.range(), 1.5);
    }

    #[test]
    fn test_global_falls_back_to_native_importance() {
        let adapter = ExplainabilityAdapter::with_backends(EngineConfig::default(), Backends::none());
        let outcome = adapter
            .execute_test(&model(), &dataset(), &TestConfig::new("shap_global"))
            .unwrap();
        // |w| = [4, 2, 0] so the concentration is 4 / 6.
        assert!((outcome.score - 4.0 / 6.0).abs() < 1e-12);
        assert!(!outcome.passed);
        assert_eq!(
            outcome.metric("backend").and_then(|m| m.as_text()),
            Some("native_importance")
        );
        assert_eq!(
            outcome.metric("top_features").and_then(|m| m.as_labels()).map(|l| l[0].as_str()),
            Some("a")
        );
    }

    #[test]
    fn test_global_without_any_route_fails_softly() {
        let adapter = ExplainabilityAdapter::with_backends(EngineConfig::default(), Backends::none());
        let outcome = adapter
            .execute_test(
                &ThresholdRule::new(0, 0.0),
                &dataset(),
                &TestConfig::new("shap_global").with_threshold("shap_global", 0.0),
            )
            .unwrap();
        assert_eq!(outcome.score, 0.0);
        assert!(!outcome.passed);
        assert!(outcome.metric("error").is_some());
    }

    /// Returns the same attribution row for every instance.
    struct FixedAttributions(Vec<f64>);

    impl AttributionBackend for FixedAttributions {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn attributions(
            &self,
            _model: &dyn PredictiveModel,
            _background: &Array2<f64>,
            instances: &Array2<f64>,
            _rng: &mut StdRng,
        ) -> ProbeResult<Array2<f64>> {
            let row = Array1::from(self.0.clone());
            Ok(Array2::from_shape_fn((instances.nrows(), row.len()), |(_, j)| row[j]))
        }
    }

    /// Attributes each feature its variance across the explained instances.
    struct SpreadAttributions;

    impl AttributionBackend for SpreadAttributions {
        fn name(&self) -> &'static str {
            "spread"
        }

        fn attributions(
            &self,
            _model: &dyn PredictiveModel,
            _background: &Array2<f64>,
            instances: &Array2<f64>,
            _rng: &mut StdRng,
        ) -> ProbeResult<Array2<f64>> {
            let spread: Vec<f64> = instances
                .axis_iter(Axis(1))
                .map(|column| variance(&column.to_vec()))
                .collect();
            Ok(Array2::from_shape_fn(instances.dim(), |(_, j)| spread[j]))
        }
    }

    fn with_shapley(backend: impl AttributionBackend + 'static) -> ExplainabilityAdapter {
        ExplainabilityAdapter::with_backends(
            EngineConfig::default(),
            Backends {
                shapley: Some(Box::new(backend)),
                surrogate: None,
            },
        )
    }

    #[test]
    fn test_global_consistency_from_attribution_variance() {
        // Every row is [1, 3, 0]: mean 4/3, population variance 14/9.
        let outcome = with_shapley(FixedAttributions(vec![1.0, 3.0, 0.0]))
            .execute_test(&model(), &dataset(), &TestConfig::new("shap_global"))
            .unwrap();
        let expected = 1.0 / (1.0 + 14.0 / 9.0);
        assert!((outcome.score - expected).abs() < 1e-12);
        assert_eq!(
            outcome.metric("consistency").and_then(|m| m.as_f64()),
            Some(outcome.score)
        );
        assert!(!outcome.passed);
        assert_eq!(outcome.metric("backend").and_then(|m| m.as_text()), Some("fixed"));
        assert_eq!(
            outcome.metric("top_features").and_then(|m| m.as_labels()).map(|l| l[0].as_str()),
            Some("b")
        );

        let uniform = with_shapley(FixedAttributions(vec![2.0, 2.0, 2.0]))
            .execute_test(&model(), &dataset(), &TestConfig::new("shap_global"))
            .unwrap();
        assert_eq!(uniform.score, 1.0);
        assert!(uniform.passed);
    }

    #[test]
    fn test_local_consistency_tracks_feature_spread() {
        let outcome = with_shapley(SpreadAttributions)
            .execute_test(&model(), &dataset(), &TestConfig::new("shap_local"))
            .unwrap();
        assert!((outcome.score - 1.0).abs() < 1e-9);
        assert_eq!(
            outcome.metric("local_consistency").and_then(|m| m.as_f64()),
            Some(outcome.score)
        );
        assert!(outcome.passed);
    }

    #[test]
    fn test_local_consistency_clamps_negative_correlation() {
        // All attribution mass on the constant column.
        let outcome = with_shapley(FixedAttributions(vec![0.0, 0.0, 5.0]))
            .execute_test(&model(), &dataset(), &TestConfig::new("shap_local"))
            .unwrap();
        assert_eq!(outcome.score, 0.0);
        assert_eq!(
            outcome.metric("local_consistency").and_then(|m| m.as_f64()),
            Some(0.0)
        );
        assert!(!outcome.passed);
    }

    #[test]
    fn test_local_requires_backend() {
        let adapter = ExplainabilityAdapter::with_backends(EngineConfig::default(), Backends::none());
        let err = adapter
            .execute_test(&model(), &dataset(), &TestConfig::new("shap_local"))
            .unwrap_err();
        assert!(matches!(err, TestFault::DependencyUnavailable { .. }));
    }

    #[test]
    fn test_permutation_importance_ranks_informative_feature() {
        let adapter = ExplainabilityAdapter::with_backends(EngineConfig::default(), Backends::none());
        let outcome = adapter
            .execute_test(
                &model(),
                &dataset(),
                &TestConfig::new("permutation_importance").with_parameter("n_repeats", 3),
            )
            .unwrap();
        let importance = outcome
            .metric("importance_mean")
            .and_then(|m| m.as_array())
            .unwrap()
            .to_vec();
        assert_eq!(importance.len(), 3);
        assert_eq!(importance[2], 0.0);
        assert!(importance[0] > importance[2]);
        assert!((0.0..=1.0).contains(&outcome.score));
    }

    #[test]
    fn test_partial_dependence_of_constant_model() {
        struct Constant;
        impl PredictiveModel for Constant {
            fn predict(&self, features: &Array2<f64>) -> ProbeResult<Array1<f64>> {
                Ok(Array1::from_elem(features.nrows(), 1.0))
            }
        }

        let adapter = ExplainabilityAdapter::with_backends(EngineConfig::default(), Backends::none());
        let outcome = adapter
            .execute_test(&Constant, &dataset(), &TestConfig::new("partial_dependence"))
            .unwrap();
        assert_eq!(outcome.score, 1.0);
        assert!(outcome.passed);
    }

    #[test]
    fn test_partial_dependence_rejects_coarse_grid() {
        let adapter = ExplainabilityAdapter::default();
        let err = adapter
            .execute_test(
                &model(),
                &dataset(),
                &TestConfig::new("partial_dependence").with_parameter("grid_resolution", 2),
            )
            .unwrap_err();
        assert!(matches!(err, TestFault::InvalidParameter { .. }));
    }

    #[test]
    fn test_comprehensive_skips_unavailable_backends() {
        let adapter = ExplainabilityAdapter::with_backends(EngineConfig::default(), Backends::none());
        let outcome = adapter
            .execute_test(&model(), &dataset(), &TestConfig::new("comprehensive_explainability"))
            .unwrap();
        let unavailable = outcome
            .metric("unavailable")
            .and_then(|m| m.as_labels())
            .unwrap()
            .to_vec();
        assert_eq!(
            unavailable,
            vec!["shap_local".to_string(), "lime_explanation".to_string()]
        );
        assert_eq!(outcome.metric("tests_attempted").and_then(|m| m.as_f64()), Some(3.0));
    }

    #[cfg(all(feature = "shapley", feature = "surrogate"))]
    #[test]
    fn test_full_backends_are_deterministic() {
        let adapter = ExplainabilityAdapter::default();
        let config = TestConfig::new("comprehensive_explainability").with_parameter("random_state", 9);
        let first = adapter.execute_test(&model(), &dataset(), &config).unwrap();
        let second = adapter.execute_test(&model(), &dataset(), &config).unwrap();
        assert_eq!(first.passed, second.passed);
        assert!((first.score - second.score).abs() < 1e-12);
        assert_eq!(first.metric("tests_attempted").and_then(|m| m.as_f64()), Some(5.0));
    }

    #[test]
    fn test_artifacts_written_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default().with_artifact_dir(dir.path());
        let adapter = ExplainabilityAdapter::with_backends(config, Backends::none());
        let outcome = adapter
            .execute_test(&model(), &dataset(), &TestConfig::new("partial_dependence"))
            .unwrap();
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(outcome.artifacts[0].contains("partial_dependence_curves_"));
    }
}
