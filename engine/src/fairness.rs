//! Group fairness metrics for one sensitive attribute split into a
//! privileged cohort and everyone else.

use crate::adapter::{
    calculate_pass_fail, probe_sample, probe_seed, ModelType, ProbeResult, TestAdapter, TestFault,
};
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::model::{decisions, PredictiveModel};
use crate::types::{Metrics, MetricValue, TestConfig, TestOutcome};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_DEMOGRAPHIC_PARITY_THRESHOLD: f64 = 0.1;
pub const DEFAULT_EQUAL_OPPORTUNITY_THRESHOLD: f64 = 0.1;
pub const DEFAULT_EQUALIZED_ODDS_THRESHOLD: f64 = 0.1;
pub const DEFAULT_DISPARATE_IMPACT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_STATISTICAL_PARITY_THRESHOLD: f64 = 0.1;

const GROUP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FairnessTest {
    DemographicParity,
    EqualOpportunity,
    EqualizedOdds,
    DisparateImpact,
    StatisticalParity,
    Comprehensive,
}

impl FairnessTest {
    pub const ALL: [FairnessTest; 6] = [
        FairnessTest::DemographicParity,
        FairnessTest::EqualOpportunity,
        FairnessTest::EqualizedOdds,
        FairnessTest::DisparateImpact,
        FairnessTest::StatisticalParity,
        FairnessTest::Comprehensive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FairnessTest::DemographicParity => "demographic_parity",
            FairnessTest::EqualOpportunity => "equal_opportunity",
            FairnessTest::EqualizedOdds => "equalized_odds",
            FairnessTest::DisparateImpact => "disparate_impact",
            FairnessTest::StatisticalParity => "statistical_parity",
            FairnessTest::Comprehensive => "comprehensive_fairness",
        }
    }

    /// Default cutoff and direction for single-metric tests.
    pub fn default_threshold(&self) -> (f64, bool) {
        match self {
            FairnessTest::DemographicParity | FairnessTest::Comprehensive => {
                (DEFAULT_DEMOGRAPHIC_PARITY_THRESHOLD, false)
            }
            FairnessTest::EqualOpportunity => (DEFAULT_EQUAL_OPPORTUNITY_THRESHOLD, false),
            FairnessTest::EqualizedOdds => (DEFAULT_EQUALIZED_ODDS_THRESHOLD, false),
            FairnessTest::DisparateImpact => (DEFAULT_DISPARATE_IMPACT_THRESHOLD, true),
            FairnessTest::StatisticalParity => (DEFAULT_STATISTICAL_PARITY_THRESHOLD, false),
        }
    }
}

impl FromStr for FairnessTest {
    type Err = TestFault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FairnessTest::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| TestFault::UnknownTest {
                adapter: "fairness".to_string(),
                test: s.to_string(),
            })
    }
}

/// Outcome rates for one cohort.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupRates {
    pub size: usize,
    pub positives: usize,
    pub negatives: usize,
    pub selection_rate: f64,
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
}

impl GroupRates {
    /// Rates from binary decisions and labels (label >= 0.5 is positive).
    pub fn from_decisions(decisions: &[f64], labels: &[f64]) -> Self {
        let size = decisions.len();
        let mut selected = 0usize;
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut positives = 0usize;
        for (&d, &y) in decisions.iter().zip(labels) {
            let predicted = d >= 0.5;
            let actual = y >= 0.5;
            if predicted {
                selected += 1;
            }
            if actual {
                positives += 1;
                if predicted {
                    tp += 1;
                }
            } else if predicted {
                fp += 1;
            }
        }
        let negatives = size - positives;
        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        Self {
            size,
            positives,
            negatives,
            selection_rate: ratio(selected, size),
            true_positive_rate: ratio(tp, positives),
            false_positive_rate: ratio(fp, negatives),
        }
    }

    fn into_table(self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("size".to_string(), self.size as f64),
            ("selection_rate".to_string(), self.selection_rate),
            ("true_positive_rate".to_string(), self.true_positive_rate),
            ("false_positive_rate".to_string(), self.false_positive_rate),
        ])
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FairnessMetrics {
    pub demographic_parity: f64,
    pub equal_opportunity: f64,
    pub equalized_odds: f64,
    pub disparate_impact: f64,
    pub statistical_parity: f64,
}

impl FairnessMetrics {
    pub fn from_groups(privileged: &GroupRates, unprivileged: &GroupRates) -> Self {
        let parity = (privileged.selection_rate - unprivileged.selection_rate).abs();
        let tpr_gap = (privileged.true_positive_rate - unprivileged.true_positive_rate).abs();
        let fpr_gap = (privileged.false_positive_rate - unprivileged.false_positive_rate).abs();
        // With no privileged positives there is no disadvantage to report.
        let disparate_impact = if privileged.selection_rate > 0.0 {
            unprivileged.selection_rate / privileged.selection_rate
        } else {
            1.0
        };
        Self {
            demographic_parity: parity,
            equal_opportunity: tpr_gap,
            equalized_odds: tpr_gap.max(fpr_gap),
            disparate_impact,
            statistical_parity: parity,
        }
    }

    pub fn value(&self, test: FairnessTest) -> f64 {
        match test {
            FairnessTest::DemographicParity | FairnessTest::Comprehensive => {
                self.demographic_parity
            }
            FairnessTest::EqualOpportunity => self.equal_opportunity,
            FairnessTest::EqualizedOdds => self.equalized_odds,
            FairnessTest::DisparateImpact => self.disparate_impact,
            FairnessTest::StatisticalParity => self.statistical_parity,
        }
    }

    pub fn into_metrics(self) -> Metrics {
        Metrics::from([
            (
                "demographic_parity".to_string(),
                MetricValue::Number(self.demographic_parity),
            ),
            (
                "equal_opportunity".to_string(),
                MetricValue::Number(self.equal_opportunity),
            ),
            (
                "equalized_odds".to_string(),
                MetricValue::Number(self.equalized_odds),
            ),
            (
                "disparate_impact".to_string(),
                MetricValue::Number(self.disparate_impact),
            ),
            (
                "statistical_parity".to_string(),
                MetricValue::Number(self.statistical_parity),
            ),
        ])
    }
}

pub struct FairnessAdapter {
    config: EngineConfig,
}

impl FairnessAdapter {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Decisions split into privileged and unprivileged cohorts.
    fn group_rates(
        &self,
        model: &dyn PredictiveModel,
        dataset: &Dataset,
        config: &TestConfig,
    ) -> ProbeResult<(GroupRates, GroupRates)> {
        let attribute = config
            .param_str("sensitive_attribute")?
            .ok_or_else(|| TestFault::missing("sensitive_attribute"))?;
        let privileged_value = config
            .parameters
            .get("privileged_group")
            .filter(|v| !v.is_null())
            .ok_or_else(|| TestFault::missing("privileged_group"))?;

        let column = dataset.column_index(attribute)?;
        let privileged_code = dataset.encode_value(attribute, privileged_value)?;
        let threshold = config
            .param_f64("decision_threshold")?
            .unwrap_or(self.config.decision_threshold);

        let decided = decisions(model, dataset.features(), threshold)?;
        let labels = dataset.labels();

        let mut privileged = (Vec::new(), Vec::new());
        let mut unprivileged = (Vec::new(), Vec::new());
        for (i, value) in dataset.column(column).iter().enumerate() {
            let target = if (value - privileged_code).abs() < GROUP_TOLERANCE {
                &mut privileged
            } else {
                &mut unprivileged
            };
            target.0.push(decided[i]);
            target.1.push(labels[i]);
        }

        if privileged.0.is_empty() || unprivileged.0.is_empty() {
            return Err(TestFault::insufficient(format!(
                "attribute '{}' needs both privileged and unprivileged rows (privileged: {}, unprivileged: {})",
                attribute,
                privileged.0.len(),
                unprivileged.0.len()
            )));
        }

        Ok((
            GroupRates::from_decisions(&privileged.0, &privileged.1),
            GroupRates::from_decisions(&unprivileged.0, &unprivileged.1),
        ))
    }

    fn single_metric(
        &self,
        test: FairnessTest,
        metrics: FairnessMetrics,
        config: &TestConfig,
    ) -> TestOutcome {
        let (default, higher_is_better) = test.default_threshold();
        let threshold = config.threshold_or(test.name(), default);
        TestOutcome::scored(metrics.value(test), threshold, higher_is_better)
            .with_metric(test.name(), metrics.value(test))
    }

    /// All metrics together. Only thresholds the caller supplied take part
    /// in the verdict; with none supplied the outcome passes.
    fn comprehensive(&self, metrics: FairnessMetrics, config: &TestConfig) -> TestOutcome {
        let mut violations = Vec::new();
        for test in FairnessTest::ALL {
            if test == FairnessTest::Comprehensive {
                continue;
            }
            if let Some(&threshold) = config.thresholds.get(test.name()) {
                let (_, higher_is_better) = test.default_threshold();
                if !calculate_pass_fail(metrics.value(test), threshold, higher_is_better) {
                    violations.push(test.name().to_string());
                }
            }
        }

        let threshold = config.threshold_or(
            FairnessTest::DemographicParity.name(),
            DEFAULT_DEMOGRAPHIC_PARITY_THRESHOLD,
        );
        let checked = FairnessTest::ALL
            .iter()
            .filter(|t| config.thresholds.contains_key(t.name()))
            .count();

        TestOutcome::scored(metrics.demographic_parity, threshold, false)
            .with_verdict(violations.is_empty())
            .with_metrics(metrics.into_metrics())
            .with_metric("thresholds_checked", checked)
            .with_metric("violations", violations)
    }
}

impl Default for FairnessAdapter {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TestAdapter for FairnessAdapter {
    fn adapter_name(&self) -> &'static str {
        "fairness"
    }

    fn supported_model_types(&self) -> &'static [ModelType] {
        &[ModelType::Tabular]
    }

    fn get_available_tests(&self) -> Vec<&'static str> {
        FairnessTest::ALL.iter().map(|t| t.name()).collect()
    }

    fn validate_config(&self, config: &TestConfig) -> bool {
        self.supports_test(&config.test_name)
            && matches!(config.param_str("sensitive_attribute"), Ok(Some(_)))
            && config.has_parameter("privileged_group")
    }

    fn execute_test(
        &self,
        model: &dyn PredictiveModel,
        dataset: &Dataset,
        config: &TestConfig,
    ) -> ProbeResult<TestOutcome> {
        let test: FairnessTest = config.test_name.parse()?;
        let seed = probe_seed(config, &self.config)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let data = probe_sample(dataset, config, &self.config, self.config.max_samples, &mut rng)?;

        let (privileged, unprivileged) = self.group_rates(model, &data, config)?;
        let metrics = FairnessMetrics::from_groups(&privileged, &unprivileged);
        debug!(test = test.name(), ?metrics, "Computed fairness metrics");

        let outcome = match test {
            FairnessTest::Comprehensive => self.comprehensive(metrics, config),
            single => self.single_metric(single, metrics, config),
        };

        Ok(outcome
            .with_metric("privileged_group", MetricValue::Table(privileged.into_table()))
            .with_metric("unprivileged_group", MetricValue::Table(unprivileged.into_table()))
            .with_metadata("sample_size", data.n_samples())
            .with_metadata("random_seed", seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ThresholdRule;
    use ndarray::{Array1, Array2};

    /// Column 0 is the group (1 = privileged), column 1 drives the model.
    fn dataset(rows: &[(f64, f64, f64)]) -> Dataset {
        let mut flat = Vec::new();
        let mut labels = Vec::new();
        for &(group, signal, label) in rows {
            flat.push(group);
            flat.push(signal);
            labels.push(label);
        }
        Dataset::new(
            vec!["group".into(), "signal".into()],
            Array2::from_shape_vec((rows.len(), 2), flat).unwrap(),
            Array1::from(labels),
        )
        .unwrap()
    }

    fn config(test: &str) -> TestConfig {
        TestConfig::new(test)
            .with_parameter("sensitive_attribute", "group")
            .with_parameter("privileged_group", 1)
    }

    /// Ten rows per group with the given number of positive decisions.
    fn rated(privileged_positive: usize, unprivileged_positive: usize) -> Dataset {
        let mut rows = Vec::new();
        for i in 0..10 {
            let decision = if i < privileged_positive { 1.0 } else { 0.0 };
            rows.push((1.0, decision, decision));
        }
        for i in 0..10 {
            let decision = if i < unprivileged_positive { 1.0 } else { 0.0 };
            rows.push((0.0, decision, decision));
        }
        dataset(&rows)
    }

    #[test]
    fn test_group_rates() {
        let rates = GroupRates::from_decisions(&[1.0, 1.0, 0.0, 0.0], &[1.0, 0.0, 1.0, 0.0]);
        assert_eq!(rates.size, 4);
        assert_eq!(rates.selection_rate, 0.5);
        assert_eq!(rates.true_positive_rate, 0.5);
        assert_eq!(rates.false_positive_rate, 0.5);
    }

    #[test]
    fn test_identical_rates_pass() {
        let adapter = FairnessAdapter::default();
        let model = ThresholdRule::new(1, 0.5);
        let data = rated(4, 4);

        let outcome = adapter
            .execute_test(&model, &data, &config("demographic_parity"))
            .unwrap();
        assert_eq!(outcome.score, 0.0);
        assert!(outcome.passed);
        assert!(!outcome.higher_is_better);
    }

    #[test]
    fn test_disparate_impact_fails_eighty_percent_rule() {
        let adapter = FairnessAdapter::default();
        let model = ThresholdRule::new(1, 0.5);
        let data = rated(9, 2);

        let outcome = adapter
            .execute_test(&model, &data, &config("disparate_impact"))
            .unwrap();
        assert!((outcome.score - 0.2 / 0.9).abs() < 1e-9);
        assert!(!outcome.passed);
        assert_eq!(outcome.threshold, DEFAULT_DISPARATE_IMPACT_THRESHOLD);
        assert!(outcome.higher_is_better);

        let dp = adapter
            .execute_test(&model, &data, &config("demographic_parity"))
            .unwrap();
        assert!((dp.score - 0.7).abs() < 1e-9);
        assert!(!dp.passed);
    }

    #[test]
    fn test_equal_opportunity_uses_positives_only() {
        // Privileged: 2 positives both selected. Unprivileged: 2 positives, one selected.
        let data = dataset(&[
            (1.0, 1.0, 1.0),
            (1.0, 1.0, 1.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 1.0),
            (0.0, 0.0, 1.0),
            (0.0, 0.0, 0.0),
            (0.0, 0.0, 0.0),
        ]);
        let adapter = FairnessAdapter::default();
        let model = ThresholdRule::new(1, 0.5);

        let eo = adapter
            .execute_test(&model, &data, &config("equal_opportunity"))
            .unwrap();
        assert!((eo.score - 0.5).abs() < 1e-9);

        let odds = adapter
            .execute_test(&model, &data, &config("equalized_odds"))
            .unwrap();
        // FPR gap is 0.5 as well: privileged 1/2, unprivileged 0/2.
        assert!((odds.score - 0.5).abs() < 1e-9);
        assert!(!odds.passed);
    }

    #[test]
    fn test_equalized_odds_passes_with_unequal_selection() {
        // Decisions equal labels, so both groups have TPR 1 and FPR 0 even
        // though their selection rates differ by 0.4.
        let adapter = FairnessAdapter::default();
        let model = ThresholdRule::new(1, 0.5);
        let data = rated(7, 3);

        let odds = adapter
            .execute_test(&model, &data, &config("equalized_odds"))
            .unwrap();
        assert_eq!(odds.score, 0.0);
        assert_eq!(odds.threshold, DEFAULT_EQUALIZED_ODDS_THRESHOLD);
        assert!(!odds.higher_is_better);
        assert!(odds.passed);

        let parity = adapter
            .execute_test(&model, &data, &config("demographic_parity"))
            .unwrap();
        assert!(!parity.passed);
    }

    #[test]
    fn test_statistical_parity_matches_demographic_parity() {
        let adapter = FairnessAdapter::default();
        let model = ThresholdRule::new(1, 0.5);
        let data = rated(6, 3);
        let dp = adapter
            .execute_test(&model, &data, &config("demographic_parity"))
            .unwrap();
        let sp = adapter
            .execute_test(&model, &data, &config("statistical_parity"))
            .unwrap();
        assert_eq!(dp.score, sp.score);
    }

    #[test]
    fn test_comprehensive_only_checks_supplied_thresholds() {
        let adapter = FairnessAdapter::default();
        let model = ThresholdRule::new(1, 0.5);
        let data = rated(9, 2);

        let unchecked = adapter
            .execute_test(&model, &data, &config("comprehensive_fairness"))
            .unwrap();
        assert!(unchecked.passed);
        assert!(unchecked.metric("equalized_odds").is_some());

        let checked = adapter
            .execute_test(
                &model,
                &data,
                &config("comprehensive_fairness").with_threshold("disparate_impact", 0.8),
            )
            .unwrap();
        assert!(!checked.passed);
        assert_eq!(
            checked.metric("violations").and_then(|m| m.as_labels()),
            Some(&["disparate_impact".to_string()][..])
        );
    }

    #[test]
    fn test_string_privileged_group() {
        let data = rated(5, 5).with_categories("group", vec!["minority".into(), "majority".into()]);
        let adapter = FairnessAdapter::default();
        let model = ThresholdRule::new(1, 0.5);
        let config = TestConfig::new("demographic_parity")
            .with_parameter("sensitive_attribute", "group")
            .with_parameter("privileged_group", "majority");
        let outcome = adapter.execute_test(&model, &data, &config).unwrap();
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn test_validate_config_requires_parameters() {
        let adapter = FairnessAdapter::default();
        assert!(adapter.validate_config(&config("demographic_parity")));
        assert!(!adapter.validate_config(&TestConfig::new("demographic_parity")));
        assert!(!adapter.validate_config(
            &TestConfig::new("demographic_parity").with_parameter("sensitive_attribute", "group")
        ));
        assert!(!adapter.validate_config(&config("not_a_test")));
    }

    #[test]
    fn test_single_group_is_an_error() {
        let adapter = FairnessAdapter::default();
        let model = ThresholdRule::new(1, 0.5);
        let data = dataset(&[(1.0, 1.0, 1.0), (1.0, 0.0, 0.0)]);
        let err = adapter
            .execute_test(&model, &data, &config("demographic_parity"))
            .unwrap_err();
        assert!(matches!(err, TestFault::InsufficientData { .. }));
    }
}
