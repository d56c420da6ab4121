//! Prediction stability under noise, perturbation, retraining and
//! near-boundary conditions.

use crate::adapter::{probe_sample, probe_seed, ModelType, ProbeResult, TestAdapter, TestFault};
use crate::artifacts::ArtifactWriter;
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::model::{checked_predict, confidences, PredictiveModel};
use crate::stats::{
    agreement, column_std, mean, shuffle_column, variance, with_gaussian_noise, with_uniform_noise,
};
use crate::types::{FeatureRanking, TestConfig, TestOutcome};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEFAULT_ADVERSARIAL_THRESHOLD: f64 = 0.8;
pub const DEFAULT_INPUT_PERTURBATION_THRESHOLD: f64 = 0.7;
pub const DEFAULT_FEATURE_PERTURBATION_THRESHOLD: f64 = 0.5;
pub const DEFAULT_STABILITY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_STABILITY_VARIANCE: f64 = 0.1;
pub const DEFAULT_BOUNDARY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_COMPREHENSIVE_THRESHOLD: f64 = 0.6;

pub const DEFAULT_NOISE_LEVELS: [f64; 3] = [0.01, 0.05, 0.1];

const DEFAULT_SAMPLE_SIZE: usize = 500;
const DEFAULT_PERTURBATION_LEVEL: f64 = 0.1;
const DEFAULT_OUTLIER_FRACTION: f64 = 0.05;
const OUTLIER_SIGMAS: f64 = 3.0;
const DEFAULT_RUNS: usize = 5;
const DEFAULT_TEST_SIZE: f64 = 0.3;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;
const DEFAULT_BOUNDARY_SAMPLES: usize = 10;
const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RobustnessTest {
    AdversarialNoise,
    InputPerturbation,
    FeaturePerturbation,
    Stability,
    Boundary,
    Comprehensive,
}

impl RobustnessTest {
    pub const ALL: [RobustnessTest; 6] = [
        RobustnessTest::AdversarialNoise,
        RobustnessTest::InputPerturbation,
        RobustnessTest::FeaturePerturbation,
        RobustnessTest::Stability,
        RobustnessTest::Boundary,
        RobustnessTest::Comprehensive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RobustnessTest::AdversarialNoise => "adversarial_noise",
            RobustnessTest::InputPerturbation => "input_perturbation",
            RobustnessTest::FeaturePerturbation => "feature_perturbation",
            RobustnessTest::Stability => "stability_test",
            RobustnessTest::Boundary => "boundary_test",
            RobustnessTest::Comprehensive => "comprehensive_robustness",
        }
    }

    pub fn default_threshold(&self) -> f64 {
        match self {
            RobustnessTest::AdversarialNoise => DEFAULT_ADVERSARIAL_THRESHOLD,
            RobustnessTest::InputPerturbation => DEFAULT_INPUT_PERTURBATION_THRESHOLD,
            RobustnessTest::FeaturePerturbation => DEFAULT_FEATURE_PERTURBATION_THRESHOLD,
            RobustnessTest::Stability => DEFAULT_STABILITY_THRESHOLD,
            RobustnessTest::Boundary => DEFAULT_BOUNDARY_THRESHOLD,
            RobustnessTest::Comprehensive => DEFAULT_COMPREHENSIVE_THRESHOLD,
        }
    }

    fn threshold(&self, config: &TestConfig) -> f64 {
        config.threshold_or(self.name(), self.default_threshold())
    }
}

impl FromStr for RobustnessTest {
    type Err = TestFault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RobustnessTest::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| TestFault::UnknownTest {
                adapter: "robustness".to_string(),
                test: s.to_string(),
            })
    }
}

pub struct RobustnessAdapter {
    config: EngineConfig,
    artifacts: ArtifactWriter,
}

impl RobustnessAdapter {
    pub fn new(config: EngineConfig) -> Self {
        let artifacts = ArtifactWriter::new(config.artifact_dir.clone());
        Self { config, artifacts }
    }

    fn noise_levels(config: &TestConfig) -> ProbeResult<Vec<f64>> {
        let levels = config
            .param_f64_list("noise_levels")?
            .unwrap_or_else(|| DEFAULT_NOISE_LEVELS.to_vec());
        if levels.is_empty() {
            return Err(TestFault::invalid("noise_levels", "must not be empty"));
        }
        if levels.iter().any(|l| !l.is_finite() || *l < 0.0) {
            return Err(TestFault::invalid(
                "noise_levels",
                "levels must be finite and non-negative",
            ));
        }
        Ok(levels)
    }

    /// Fraction of unchanged predictions per Gaussian noise level, noise
    /// being scaled by each feature's standard deviation.
    fn adversarial_noise(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let levels = Self::noise_levels(config)?;
        let scales = column_std(data.features());
        let baseline = checked_predict(model, data.features())?;

        let mut stabilities = Vec::with_capacity(levels.len());
        for &level in &levels {
            let noisy = with_gaussian_noise(data.features(), &scales, level, rng)?;
            let stability = agreement(&baseline, &checked_predict(model, &noisy)?);
            debug!(level, stability, "Noise level evaluated");
            stabilities.push(stability);
        }

        let score = mean(&stabilities);
        Ok(
            TestOutcome::scored(score, RobustnessTest::AdversarialNoise.threshold(config), true)
                .with_metric("mean_stability", score)
                .with_metric("noise_levels", levels)
                .with_metric("stability_per_level", stabilities),
        )
    }

    fn input_perturbation(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let level = config
            .param_f64("noise_level")?
            .unwrap_or(DEFAULT_PERTURBATION_LEVEL);
        if !level.is_finite() || level < 0.0 {
            return Err(TestFault::invalid(
                "noise_level",
                "must be finite and non-negative",
            ));
        }
        let fraction = config
            .param_f64("outlier_fraction")?
            .unwrap_or(DEFAULT_OUTLIER_FRACTION);
        if !(0.0..=1.0).contains(&fraction) {
            return Err(TestFault::invalid("outlier_fraction", "must be within [0, 1]"));
        }

        let features = data.features();
        let scales = column_std(features);
        let baseline = checked_predict(model, features)?;

        let gaussian = with_gaussian_noise(features, &scales, level, rng)?;
        let uniform = with_uniform_noise(features, &scales, level, rng);
        let outliers = with_outliers(features, &scales, fraction, rng);

        let mut stability = BTreeMap::new();
        stability.insert(
            "gaussian".to_string(),
            agreement(&baseline, &checked_predict(model, &gaussian)?),
        );
        stability.insert(
            "uniform".to_string(),
            agreement(&baseline, &checked_predict(model, &uniform)?),
        );
        stability.insert(
            "outlier".to_string(),
            agreement(&baseline, &checked_predict(model, &outliers)?),
        );

        let score = mean(&stability.values().copied().collect::<Vec<_>>());
        Ok(
            TestOutcome::scored(score, RobustnessTest::InputPerturbation.threshold(config), true)
                .with_metric("mean_stability", score)
                .with_metric("stability_by_kind", stability),
        )
    }

    /// Shuffle one feature at a time and count flipped predictions.
    fn feature_perturbation(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let test = RobustnessTest::FeaturePerturbation;
        let top_n = config.param_usize("top_n")?.unwrap_or(DEFAULT_TOP_N);
        let baseline = checked_predict(model, data.features())?;

        let mut sensitivity = Vec::with_capacity(data.n_features());
        for feature in 0..data.n_features() {
            let shuffled = shuffle_column(data.features(), feature, rng);
            sensitivity.push(1.0 - agreement(&baseline, &checked_predict(model, &shuffled)?));
        }

        let robustness = 1.0 - mean(&sensitivity);
        let ranking = FeatureRanking::new(data.feature_names(), &sensitivity);
        let artifact = self.artifacts.write_json(test.name(), "sensitivity", &ranking)?;

        Ok(TestOutcome::scored(robustness, test.threshold(config), true)
            .with_metric("robustness", robustness)
            .with_metric("feature_sensitivity", sensitivity)
            .with_metric("most_sensitive_features", ranking.top(top_n))
            .with_artifact(artifact))
    }

    /// Agreement between the original model and models retrained on
    /// bootstrap resamples, measured on a held-out split.
    fn stability(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let test = RobustnessTest::Stability;
        let threshold = test.threshold(config);
        if !model.supports_retraining() {
            debug!("Model cannot be retrained, stability test not applicable");
            return Ok(TestOutcome::not_applicable(
                threshold,
                "model does not support retraining",
            ));
        }

        let runs = config.param_usize("n_runs")?.unwrap_or(DEFAULT_RUNS);
        if runs == 0 {
            return Err(TestFault::invalid("n_runs", "must be greater than 0"));
        }
        let test_size = config.param_f64("test_size")?.unwrap_or(DEFAULT_TEST_SIZE);
        let max_variance = config.threshold_or("stability_variance", DEFAULT_STABILITY_VARIANCE);

        let (train, held_out) = data.split(test_size, rng)?;
        let original = checked_predict(model, held_out.features())?;

        let mut stabilities = Vec::with_capacity(runs);
        for run in 0..runs {
            let rows: Vec<usize> = (0..train.n_samples())
                .map(|_| rng.gen_range(0..train.n_samples()))
                .collect();
            let bootstrap = train.select_rows(&rows);
            let retrained = model.fit_clone(bootstrap.features(), bootstrap.labels())?;
            let stability = agreement(&original, &checked_predict(retrained.as_ref(), held_out.features())?);
            debug!(run, stability, "Bootstrap run evaluated");
            stabilities.push(stability);
        }

        let mean_stability = mean(&stabilities);
        let stability_variance = variance(&stabilities);
        let passed = mean_stability > threshold && stability_variance < max_variance;

        Ok(TestOutcome::scored(mean_stability, threshold, true)
            .with_verdict(passed)
            .with_metric("mean_stability", mean_stability)
            .with_metric("stability_variance", stability_variance)
            .with_metric("run_stabilities", stabilities)
            .with_metric("held_out_size", held_out.n_samples()))
    }

    /// Near-boundary samples whose class survives every noise level.
    ///
    /// Rows with confidence under `confidence_threshold` are boundary rows;
    /// up to `max_boundary_samples` of them are drawn at random and each is
    /// perturbed once per entry of `noise_levels` (default
    /// `DEFAULT_NOISE_LEVELS`). A row counts as invariant only if no level
    /// flips its prediction.
    fn boundary(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let threshold = RobustnessTest::Boundary.threshold(config);
        let cutoff = config
            .param_f64("confidence_threshold")?
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        let limit = config
            .param_usize("max_boundary_samples")?
            .unwrap_or(DEFAULT_BOUNDARY_SAMPLES);
        let levels = Self::noise_levels(config)?;

        let confidence = confidences(model, data.features())?;
        let boundary: Vec<usize> = confidence
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c < cutoff)
            .map(|(i, _)| i)
            .collect();
        if boundary.is_empty() {
            return Ok(TestOutcome::scored(1.0, threshold, true)
                .with_metric("boundary_samples", 0usize)
                .with_metric("samples_tested", 0usize));
        }

        let picked = limit.max(1).min(boundary.len());
        let mut tested: Vec<usize> = index::sample(rng, boundary.len(), picked)
            .into_iter()
            .map(|i| boundary[i])
            .collect();
        tested.sort_unstable();
        let scales = column_std(data.features());
        let subset = data.features().select(Axis(0), &tested);
        let baseline = checked_predict(model, &subset)?;

        let mut invariant = vec![true; tested.len()];
        for &level in &levels {
            let noisy = with_gaussian_noise(&subset, &scales, level, rng)?;
            let predicted = checked_predict(model, &noisy)?;
            for (i, same) in invariant.iter_mut().enumerate() {
                if (predicted[i] - baseline[i]).abs() > 1e-9 {
                    *same = false;
                }
            }
        }

        let stable = invariant.iter().filter(|&&s| s).count();
        let score = stable as f64 / tested.len() as f64;
        Ok(TestOutcome::scored(score, threshold, true)
            .with_metric("boundary_robustness", score)
            .with_metric("boundary_samples", boundary.len())
            .with_metric("samples_tested", tested.len())
            .with_metric("invariant_samples", stable))
    }

    /// Mean over the applicable sub-tests that produced a score.
    fn comprehensive(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let mut scores = BTreeMap::new();
        let mut attempted = 0usize;
        let mut passed = 0usize;
        let mut artifacts = Vec::new();

        for test in [
            RobustnessTest::AdversarialNoise,
            RobustnessTest::InputPerturbation,
            RobustnessTest::FeaturePerturbation,
            RobustnessTest::Stability,
            RobustnessTest::Boundary,
        ] {
            match self.component(test, model, data, config, rng) {
                Ok(outcome) if is_applicable(&outcome) => {
                    attempted += 1;
                    if outcome.passed {
                        passed += 1;
                    }
                    scores.insert(test.name().to_string(), outcome.score);
                    artifacts.extend(outcome.artifacts);
                }
                Ok(_) => debug!(test = test.name(), "Sub-test not applicable"),
                Err(fault) => {
                    attempted += 1;
                    warn!(test = test.name(), "Sub-test failed: {}", fault);
                }
            }
        }

        if scores.is_empty() {
            return Err(TestFault::insufficient(
                "no robustness sub-test produced a score",
            ));
        }
        let score = mean(&scores.values().copied().collect::<Vec<_>>());
        let mut outcome =
            TestOutcome::scored(score, RobustnessTest::Comprehensive.threshold(config), true)
                .with_metric("sub_test_scores", scores)
                .with_metric("tests_passed", passed)
                .with_metric("tests_attempted", attempted);
        outcome.artifacts = artifacts;
        Ok(outcome)
    }

    fn component(
        &self,
        test: RobustnessTest,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        match test {
            RobustnessTest::AdversarialNoise => self.adversarial_noise(model, data, config, rng),
            RobustnessTest::InputPerturbation => self.input_perturbation(model, data, config, rng),
            RobustnessTest::FeaturePerturbation => {
                self.feature_perturbation(model, data, config, rng)
            }
            RobustnessTest::Stability => self.stability(model, data, config, rng),
            RobustnessTest::Boundary => self.boundary(model, data, config, rng),
            RobustnessTest::Comprehensive => self.comprehensive(model, data, config, rng),
        }
    }
}

impl Default for RobustnessAdapter {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TestAdapter for RobustnessAdapter {
    fn adapter_name(&self) -> &'static str {
        "robustness"
    }

    fn supported_model_types(&self) -> &'static [ModelType] {
        &[ModelType::Tabular, ModelType::Image]
    }

    fn get_available_tests(&self) -> Vec<&'static str> {
        RobustnessTest::ALL.iter().map(|t| t.name()).collect()
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
        let test: RobustnessTest = config.test_name.parse()?;
        let seed = probe_seed(config, &self.config)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let data = probe_sample(dataset, config, &self.config, DEFAULT_SAMPLE_SIZE, &mut rng)?;

        let outcome = self.component(test, model, &data, config, &mut rng)?;
        Ok(outcome
            .with_metadata("sample_size", data.n_samples())
            .with_metadata("random_seed", seed))
    }
}

fn is_applicable(outcome: &TestOutcome) -> bool {
    outcome
        .metric("applicable")
        .and_then(|m| m.as_flag())
        .unwrap_or(true)
}

/// Copy of `features` where a `fraction` of the rows (at least one when
/// the fraction is positive) is pushed to column mean plus three standard
/// deviations.
fn with_outliers(
    features: &Array2<f64>,
    scales: &Array1<f64>,
    fraction: f64,
    rng: &mut StdRng,
) -> Array2<f64> {
    let mut result = features.clone();
    let n = features.nrows();
    if n == 0 || fraction <= 0.0 {
        return result;
    }
    let count = ((n as f64 * fraction).ceil() as usize).clamp(1, n);
    let means = features
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(features.ncols()));
    let outlier = &means + &(scales * OUTLIER_SIGMAS);
    for row in index::sample(rng, n, count).into_iter() {
        result.row_mut(row).assign(&outlier);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogisticRegression, ThresholdRule};
    use crate::types::TestStatus;

    fn dataset() -> Dataset {
        let mut rows = Vec::new();
        for i in 0..60 {
            let x = i as f64 / 60.0 - 0.5;
            let z = ((i * 11) % 17) as f64 / 17.0;
            rows.push(vec![x, z, if x >= 0.0 { 1.0 } else { 0.0 }]);
        }
        Dataset::from_table(vec!["x".into(), "z".into(), "label".into()], rows).unwrap()
    }

    #[test]
    fn test_zero_noise_is_perfectly_stable() {
        let adapter = RobustnessAdapter::default();
        let model = LogisticRegression::new(vec![3.0, 0.5], 0.0);
        let config =
            TestConfig::new("adversarial_noise").with_parameter("noise_levels", vec![0.0]);
        let outcome = adapter.execute_test(&model, &dataset(), &config).unwrap();
        assert_eq!(outcome.score, 1.0);
        assert!(outcome.passed);
    }

    #[test]
    fn test_negative_noise_level_rejected() {
        let adapter = RobustnessAdapter::default();
        let config =
            TestConfig::new("adversarial_noise").with_parameter("noise_levels", vec![-0.1]);
        let err = adapter
            .execute_test(&ThresholdRule::new(0, 0.0), &dataset(), &config)
            .unwrap_err();
        assert!(matches!(err, TestFault::InvalidParameter { .. }));
    }

    #[test]
    fn test_input_perturbation_rejects_bad_noise_level() {
        let adapter = RobustnessAdapter::default();
        for level in [-5.0, f64::INFINITY] {
            let config = TestConfig::new("input_perturbation").with_parameter("noise_level", level);
            let results =
                adapter.execute_tests(&ThresholdRule::new(0, 0.0), &dataset(), &[config]);
            assert_eq!(results[0].status, TestStatus::Failed);
            assert!(!results[0].passed);
            assert!(results[0].error_message.as_deref().unwrap().contains("noise_level"));
        }
    }

    #[test]
    fn test_input_perturbation_reports_each_kind() {
        let adapter = RobustnessAdapter::default();
        let outcome = adapter
            .execute_test(
                &ThresholdRule::new(0, 0.0),
                &dataset(),
                &TestConfig::new("input_perturbation"),
            )
            .unwrap();
        let kinds = outcome.metric("stability_by_kind").and_then(|m| m.as_table()).unwrap();
        assert_eq!(kinds.len(), 3);
        assert!(kinds.values().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_feature_perturbation_ignores_unused_feature() {
        let adapter = RobustnessAdapter::default();
        let outcome = adapter
            .execute_test(
                &ThresholdRule::new(0, 0.0),
                &dataset(),
                &TestConfig::new("feature_perturbation"),
            )
            .unwrap();
        let sensitivity = outcome
            .metric("feature_sensitivity")
            .and_then(|m| m.as_array())
            .unwrap();
        assert_eq!(sensitivity[1], 0.0);
        assert!(sensitivity[0] > 0.0);
        assert_eq!(
            outcome
                .metric("most_sensitive_features")
                .and_then(|m| m.as_labels())
                .map(|l| l[0].as_str()),
            Some("x")
        );
    }

    #[test]
    fn test_stability_without_retraining_is_not_applicable() {
        let adapter = RobustnessAdapter::default();
        let outcome = adapter
            .execute_test(
                &ThresholdRule::new(0, 0.0),
                &dataset(),
                &TestConfig::new("stability_test"),
            )
            .unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.metric("applicable").and_then(|m| m.as_flag()), Some(false));
    }

    #[test]
    fn test_stability_with_retraining() {
        let adapter = RobustnessAdapter::default();
        let model = LogisticRegression::new(vec![5.0, 0.0], 0.0).with_training(0.5, 200);
        let outcome = adapter
            .execute_test(&model, &dataset(), &TestConfig::new("stability_test"))
            .unwrap();
        let runs = outcome.metric("run_stabilities").and_then(|m| m.as_array()).unwrap();
        assert_eq!(runs.len(), DEFAULT_RUNS);
        assert!(outcome.metric("stability_variance").is_some());
    }

    #[test]
    fn test_stability_fails_variance_gate() {
        // Any variance is >= 0, so a zero ceiling fails even a stable model.
        let adapter = RobustnessAdapter::default();
        let model = LogisticRegression::new(vec![5.0, 0.0], 0.0).with_training(0.5, 200);
        let config = TestConfig::new("stability_test")
            .with_threshold("stability_test", 0.0)
            .with_threshold("stability_variance", 0.0);
        let outcome = adapter.execute_test(&model, &dataset(), &config).unwrap();

        assert!(outcome.score > 0.0);
        assert!(!outcome.passed);
    }

    #[test]
    fn test_boundary_sample_draw_is_seeded() {
        let model = LogisticRegression::new(vec![0.0, 0.0], 0.0);
        let adapter = RobustnessAdapter::default();
        let config = TestConfig::new("boundary_test").with_parameter("max_boundary_samples", 4);
        let first = adapter.execute_test(&model, &dataset(), &config).unwrap();
        let second = adapter.execute_test(&model, &dataset(), &config).unwrap();

        assert_eq!(first.metric("samples_tested").and_then(|m| m.as_f64()), Some(4.0));
        assert_eq!(first.metric("boundary_samples").and_then(|m| m.as_f64()), Some(60.0));
        assert_eq!(first, second);
    }

    #[test]
    fn test_boundary_requires_probabilities() {
        let adapter = RobustnessAdapter::default();
        let err = adapter
            .execute_test(
                &ThresholdRule::new(0, 0.0),
                &dataset(),
                &TestConfig::new("boundary_test"),
            )
            .unwrap_err();
        assert!(matches!(err, TestFault::Unsupported { .. }));
    }

    #[test]
    fn test_boundary_without_uncertain_samples_passes() {
        // Decision boundary at x = -0.105 falls between two grid rows.
        let model = LogisticRegression::new(vec![100.0, 0.0], 10.5);
        let adapter = RobustnessAdapter::default();
        let outcome = adapter
            .execute_test(&model, &dataset(), &TestConfig::new("boundary_test"))
            .unwrap();
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.metric("boundary_samples").and_then(|m| m.as_f64()), Some(0.0));
    }

    #[test]
    fn test_boundary_caps_tested_samples() {
        // Flat weights put every row at probability 0.5.
        let model = LogisticRegression::new(vec![0.0, 0.0], 0.0);
        let adapter = RobustnessAdapter::default();
        let outcome = adapter
            .execute_test(&model, &dataset(), &TestConfig::new("boundary_test"))
            .unwrap();
        assert_eq!(outcome.metric("samples_tested").and_then(|m| m.as_f64()), Some(10.0));
        assert_eq!(outcome.score, 1.0);
    }

    #[test]
    fn test_comprehensive_skips_inapplicable_and_failed() {
        let adapter = RobustnessAdapter::default();
        let outcome = adapter
            .execute_test(
                &ThresholdRule::new(0, 0.0),
                &dataset(),
                &TestConfig::new("comprehensive_robustness"),
            )
            .unwrap();
        let scores = outcome.metric("sub_test_scores").and_then(|m| m.as_table()).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(!scores.contains_key("stability_test"));
        assert_eq!(outcome.metric("tests_attempted").and_then(|m| m.as_f64()), Some(4.0));
    }

    #[test]
    fn test_outliers_touch_requested_rows() {
        let x = Array2::zeros((20, 2));
        let scales = Array1::from(vec![1.0, 2.0]);
        let mut rng = StdRng::seed_from_u64(1);
        let pushed = with_outliers(&x, &scales, 0.1, &mut rng);
        let moved = pushed.outer_iter().filter(|r| r[0] == 3.0 && r[1] == 6.0).count();
        assert_eq!(moved, 2);
    }
}
