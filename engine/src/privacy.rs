//! Exposure of the model to leakage and inference-style privacy attacks.

use crate::adapter::{probe_sample, probe_seed, ModelType, ProbeResult, TestAdapter, TestFault};
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::model::{checked_predict, positive_scores, PredictiveModel};
use crate::stats::{agreement, entropy, linear_fit, mean, pearson, shuffle_column, variance};
use crate::types::{TestConfig, TestOutcome};
use ndarray::{Array1, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEFAULT_DIFFERENTIAL_PRIVACY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MEMBERSHIP_THRESHOLD: f64 = 0.6;
pub const DEFAULT_LEAKAGE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_ATTRIBUTE_INFERENCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MODEL_INVERSION_THRESHOLD: f64 = 0.3;
pub const DEFAULT_COMPREHENSIVE_THRESHOLD: f64 = 0.6;

pub const SUSPICIOUS_ACCURACY: f64 = 0.95;
pub const DOMINANT_IMPORTANCE: f64 = 0.8;
pub const PERFECT_CORRELATION: f64 = 0.99;

const ACCURACY_PENALTY: f64 = 0.5;
const IMPORTANCE_PENALTY: f64 = 0.3;
const CORRELATION_PENALTY: f64 = 0.2;

const DEFAULT_SAMPLE_SIZE: usize = 200;
const DEFAULT_LEAVE_OUT_POINTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivacyTest {
    DifferentialPrivacy,
    MembershipInference,
    DataLeakage,
    AttributeInference,
    ModelInversion,
    Comprehensive,
}

impl PrivacyTest {
    pub const ALL: [PrivacyTest; 6] = [
        PrivacyTest::DifferentialPrivacy,
        PrivacyTest::MembershipInference,
        PrivacyTest::DataLeakage,
        PrivacyTest::AttributeInference,
        PrivacyTest::ModelInversion,
        PrivacyTest::Comprehensive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PrivacyTest::DifferentialPrivacy => "differential_privacy",
            PrivacyTest::MembershipInference => "membership_inference",
            PrivacyTest::DataLeakage => "data_leakage",
            PrivacyTest::AttributeInference => "attribute_inference",
            PrivacyTest::ModelInversion => "model_inversion",
            PrivacyTest::Comprehensive => "comprehensive_privacy",
        }
    }

    pub fn default_threshold(&self) -> f64 {
        match self {
            PrivacyTest::DifferentialPrivacy => DEFAULT_DIFFERENTIAL_PRIVACY_THRESHOLD,
            PrivacyTest::MembershipInference => DEFAULT_MEMBERSHIP_THRESHOLD,
            PrivacyTest::DataLeakage => DEFAULT_LEAKAGE_THRESHOLD,
            PrivacyTest::AttributeInference => DEFAULT_ATTRIBUTE_INFERENCE_THRESHOLD,
            PrivacyTest::ModelInversion => DEFAULT_MODEL_INVERSION_THRESHOLD,
            PrivacyTest::Comprehensive => DEFAULT_COMPREHENSIVE_THRESHOLD,
        }
    }

    fn threshold(&self, config: &TestConfig) -> f64 {
        config.threshold_or(self.name(), self.default_threshold())
    }
}

impl FromStr for PrivacyTest {
    type Err = TestFault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrivacyTest::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| TestFault::UnknownTest {
                adapter: "privacy".to_string(),
                test: s.to_string(),
            })
    }
}

/// Named leakage signals with the penalty each one carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakageIndicator {
    SuspiciouslyHighAccuracy,
    DominantFeatureImportance,
    PerfectFeatureCorrelation,
}

impl LeakageIndicator {
    pub fn name(&self) -> &'static str {
        match self {
            LeakageIndicator::SuspiciouslyHighAccuracy => "suspiciously_high_accuracy",
            LeakageIndicator::DominantFeatureImportance => "dominant_feature_importance",
            LeakageIndicator::PerfectFeatureCorrelation => "perfect_feature_correlation",
        }
    }

    pub fn penalty(&self) -> f64 {
        match self {
            LeakageIndicator::SuspiciouslyHighAccuracy => ACCURACY_PENALTY,
            LeakageIndicator::DominantFeatureImportance => IMPORTANCE_PENALTY,
            LeakageIndicator::PerfectFeatureCorrelation => CORRELATION_PENALTY,
        }
    }
}

pub struct PrivacyAdapter {
    config: EngineConfig,
}

impl PrivacyAdapter {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Average change in the positive score on the remaining rows when a
    /// single training row is left out.
    fn differential_privacy(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let threshold = PrivacyTest::DifferentialPrivacy.threshold(config);
        if !model.supports_retraining() {
            debug!("Model cannot be retrained, differential privacy not applicable");
            return Ok(TestOutcome::not_applicable(
                threshold,
                "model does not support retraining",
            ));
        }
        if data.n_samples() < 2 {
            return Err(TestFault::insufficient(
                "leave-one-out needs at least two rows",
            ));
        }

        let points = config
            .param_usize("num_points")?
            .unwrap_or(DEFAULT_LEAVE_OUT_POINTS)
            .clamp(1, data.n_samples());
        let baseline = model.fit_clone(data.features(), data.labels())?;

        let mut sensitivities = Vec::with_capacity(points);
        for row in index::sample(rng, data.n_samples(), points).into_iter() {
            let reduced = data.without_row(row);
            let retrained = model.fit_clone(reduced.features(), reduced.labels())?;
            let before = positive_scores(baseline.as_ref(), reduced.features())?;
            let after = positive_scores(retrained.as_ref(), reduced.features())?;
            let change = (&before - &after).mapv(f64::abs).mean().unwrap_or(0.0);
            sensitivities.push(change);
        }

        let mean_sensitivity = mean(&sensitivities);
        let max_sensitivity = sensitivities.iter().copied().fold(0.0, f64::max);
        let score = (1.0 - mean_sensitivity).max(0.0);
        Ok(TestOutcome::scored(score, threshold, true)
            .with_metric("mean_sensitivity", mean_sensitivity)
            .with_metric("max_sensitivity", max_sensitivity)
            .with_metric("points_tested", sensitivities.len()))
    }

    /// Threshold attack on prediction confidence between two random halves.
    fn membership_inference(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let (members, non_members) = data.split(0.5, rng)?;
        let member_conf = prediction_confidence(model, &members)?;
        let outsider_conf = prediction_confidence(model, &non_members)?;

        let all: Vec<f64> = member_conf.iter().chain(outsider_conf.iter()).copied().collect();
        let cutoff = mean(&all);
        let correct = member_conf.iter().filter(|&&c| c > cutoff).count()
            + outsider_conf.iter().filter(|&&c| c <= cutoff).count();
        let attack_accuracy = correct as f64 / all.len() as f64;
        let attack_success = (2.0 * attack_accuracy - 1.0).abs().min(1.0);
        let confidence_gap = mean(&member_conf.to_vec()) - mean(&outsider_conf.to_vec());

        let score = 1.0 - attack_success;
        Ok(
            TestOutcome::scored(score, PrivacyTest::MembershipInference.threshold(config), true)
                .with_metric("attack_success_rate", attack_success)
                .with_metric("attack_accuracy", attack_accuracy)
                .with_metric("confidence_gap", confidence_gap)
                .with_metric("member_count", members.n_samples())
                .with_metric("non_member_count", non_members.n_samples()),
        )
    }

    fn data_leakage(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
    ) -> ProbeResult<TestOutcome> {
        let accuracy_limit = config
            .param_f64("accuracy_threshold")?
            .unwrap_or(SUSPICIOUS_ACCURACY);
        let importance_limit = config
            .param_f64("importance_threshold")?
            .unwrap_or(DOMINANT_IMPORTANCE);
        let correlation_limit = config
            .param_f64("correlation_threshold")?
            .unwrap_or(PERFECT_CORRELATION);

        let accuracy = agreement(&checked_predict(model, data.features())?, data.labels());

        let max_importance = model.feature_importances().and_then(|importances| {
            let total: f64 = importances.iter().map(|v| v.abs()).sum();
            (total > 0.0).then(|| importances.iter().map(|v| v.abs() / total).fold(0.0, f64::max))
        });

        let labels = data.labels().to_vec();
        let mut max_correlation = 0.0;
        let mut correlated_feature = None;
        for (j, column) in data.features().axis_iter(Axis(1)).enumerate() {
            let r = pearson(&column.to_vec(), &labels).map(f64::abs).unwrap_or(0.0);
            if r > max_correlation {
                max_correlation = r;
                correlated_feature = Some(data.feature_names()[j].clone());
            }
        }

        let mut indicators = Vec::new();
        if accuracy > accuracy_limit {
            indicators.push(LeakageIndicator::SuspiciouslyHighAccuracy);
        }
        if max_importance.is_some_and(|m| m > importance_limit) {
            indicators.push(LeakageIndicator::DominantFeatureImportance);
        }
        if max_correlation > correlation_limit {
            indicators.push(LeakageIndicator::PerfectFeatureCorrelation);
        }
        let leakage_score: f64 = indicators.iter().map(|i| i.penalty()).sum();
        if !indicators.is_empty() {
            warn!(
                indicators = ?indicators.iter().map(|i| i.name()).collect::<Vec<_>>(),
                "Possible data leakage"
            );
        }

        let score = 1.0 - leakage_score;
        let mut outcome =
            TestOutcome::scored(score, PrivacyTest::DataLeakage.threshold(config), true)
                .with_metric("accuracy", accuracy)
                .with_metric("max_feature_correlation", max_correlation)
                .with_metric("leakage_score", leakage_score)
                .with_metric(
                    "leakage_indicators",
                    indicators
                        .iter()
                        .map(|i| i.name().to_string())
                        .collect::<Vec<_>>(),
                );
        if let Some(importance) = max_importance {
            outcome = outcome.with_metric("max_normalized_importance", importance);
        }
        if let Some(feature) = correlated_feature {
            outcome = outcome.with_metric("most_correlated_feature", feature);
        }
        Ok(outcome)
    }

    /// How strongly each feature can be read back from prediction changes
    /// when it is permuted.
    fn attribute_inference(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let baseline = positive_scores(model, data.features())?;
        let mut sensitivity = BTreeMap::new();
        for (j, name) in data.feature_names().iter().enumerate() {
            let shuffled = shuffle_column(data.features(), j, rng);
            let changed = positive_scores(model, &shuffled)?;
            let magnitude = (&baseline - &changed).mapv(f64::abs).mean().unwrap_or(0.0);
            sensitivity.insert(name.clone(), magnitude);
        }

        let values: Vec<f64> = sensitivity.values().copied().collect();
        let max_sensitivity = values.iter().copied().fold(0.0, f64::max);
        let avg_sensitivity = mean(&values);
        let score = (1.0 - (max_sensitivity + avg_sensitivity) / 2.0).clamp(0.0, 1.0);
        Ok(
            TestOutcome::scored(score, PrivacyTest::AttributeInference.threshold(config), true)
                .with_metric("max_sensitivity", max_sensitivity)
                .with_metric("avg_sensitivity", avg_sensitivity)
                .with_metric("feature_sensitivity", sensitivity),
        )
    }

    /// Regress each feature on the model output; a low variance-normalised
    /// reconstruction error means the output reveals the inputs.
    fn model_inversion(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
    ) -> ProbeResult<TestOutcome> {
        let outputs = positive_scores(model, data.features())?.to_vec();
        let mut errors = BTreeMap::new();
        for (j, column) in data.features().axis_iter(Axis(1)).enumerate() {
            let values = column.to_vec();
            let spread = variance(&values);
            if spread <= 0.0 {
                continue;
            }
            let (intercept, slope) = linear_fit(&outputs, &values);
            let mse = outputs
                .iter()
                .zip(&values)
                .map(|(o, v)| (v - (intercept + slope * o)).powi(2))
                .sum::<f64>()
                / values.len() as f64;
            errors.insert(data.feature_names()[j].clone(), mse / spread);
        }

        if errors.is_empty() {
            return Err(TestFault::insufficient(
                "model inversion needs at least one non-constant feature",
            ));
        }
        let mean_error = mean(&errors.values().copied().collect::<Vec<_>>());
        let score = mean_error.clamp(0.0, 1.0);
        Ok(
            TestOutcome::scored(score, PrivacyTest::ModelInversion.threshold(config), true)
                .with_metric("mean_reconstruction_error", mean_error)
                .with_metric("reconstruction_error", errors),
        )
    }

    fn comprehensive(
        &self,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        let mut components = Vec::with_capacity(5);
        if model.supports_retraining() {
            components.push(PrivacyTest::DifferentialPrivacy);
        }
        components.extend([
            PrivacyTest::MembershipInference,
            PrivacyTest::DataLeakage,
            PrivacyTest::AttributeInference,
            PrivacyTest::ModelInversion,
        ]);

        let mut scores = BTreeMap::new();
        let mut passed = 0usize;
        for test in &components {
            match self.component(*test, model, data, config, rng) {
                Ok(outcome) => {
                    if outcome.passed {
                        passed += 1;
                    }
                    scores.insert(test.name().to_string(), outcome.score);
                }
                Err(fault) => warn!(test = test.name(), "Sub-test failed: {}", fault),
            }
        }

        if scores.is_empty() {
            return Err(TestFault::insufficient("no privacy sub-test produced a score"));
        }
        let score = mean(&scores.values().copied().collect::<Vec<_>>());
        Ok(
            TestOutcome::scored(score, PrivacyTest::Comprehensive.threshold(config), true)
                .with_metric("sub_test_scores", scores)
                .with_metric("tests_passed", passed)
                .with_metric("tests_attempted", components.len()),
        )
    }

    fn component(
        &self,
        test: PrivacyTest,
        model: &dyn PredictiveModel,
        data: &Dataset,
        config: &TestConfig,
        rng: &mut StdRng,
    ) -> ProbeResult<TestOutcome> {
        match test {
            PrivacyTest::DifferentialPrivacy => self.differential_privacy(model, data, config, rng),
            PrivacyTest::MembershipInference => self.membership_inference(model, data, config, rng),
            PrivacyTest::DataLeakage => self.data_leakage(model, data, config),
            PrivacyTest::AttributeInference => self.attribute_inference(model, data, config, rng),
            PrivacyTest::ModelInversion => self.model_inversion(model, data, config),
            PrivacyTest::Comprehensive => self.comprehensive(model, data, config, rng),
        }
    }
}

impl Default for PrivacyAdapter {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TestAdapter for PrivacyAdapter {
    fn adapter_name(&self) -> &'static str {
        "privacy"
    }

    fn supported_model_types(&self) -> &'static [ModelType] {
        &[ModelType::Tabular]
    }

    fn get_available_tests(&self) -> Vec<&'static str> {
        PrivacyTest::ALL.iter().map(|t| t.name()).collect()
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
        let test: PrivacyTest = config.test_name.parse()?;
        let seed = probe_seed(config, &self.config)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let data = probe_sample(dataset, config, &self.config, DEFAULT_SAMPLE_SIZE, &mut rng)?;

        let outcome = self.component(test, model, &data, config, &mut rng)?;
        Ok(outcome
            .with_metadata("sample_size", data.n_samples())
            .with_metadata("random_seed", seed))
    }
}

/// Per-row confidence in `[0, 1]`: one minus normalised entropy of the
/// class probabilities, or distance of the output from 0.5 when the model
/// has no probabilities.
fn prediction_confidence(model: &dyn PredictiveModel, data: &Dataset) -> ProbeResult<Array1<f64>> {
    if model.has_probabilities() {
        let proba = model.predict_proba(data.features())?;
        let classes = proba.ncols();
        if classes < 2 {
            return Ok(Array1::ones(proba.nrows()));
        }
        let max_entropy = (classes as f64).ln();
        return Ok(proba.map_axis(Axis(1), |row| 1.0 - entropy(row) / max_entropy));
    }
    Ok(checked_predict(model, data.features())?.mapv(|p| ((p - 0.5).abs() * 2.0).min(1.0)))
}
