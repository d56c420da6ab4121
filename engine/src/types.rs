use crate::adapter::{calculate_pass_fail, ProbeResult, TestFault};
use crate::stats::rank_descending;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Named findings attached to a result.
pub type Metrics = BTreeMap<String, MetricValue>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestStatus::Pending => "PENDING",
            TestStatus::Running => "RUNNING",
            TestStatus::Completed => "COMPLETED",
            TestStatus::Failed => "FAILED",
            TestStatus::Skipped => "SKIPPED",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Flag(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Pair(f64, f64),
    Array(Vec<f64>),
    Labels(Vec<String>),
    Table(BTreeMap<String, f64>),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            MetricValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_labels(&self) -> Option<&[String]> {
        match self {
            MetricValue::Labels(labels) => Some(labels),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            MetricValue::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetricValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            MetricValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Flag(v) => write!(f, "{}", v),
            MetricValue::Integer(v) => write!(f, "{}", v),
            MetricValue::Number(v) => write!(f, "{:.4}", v),
            MetricValue::Text(v) => write!(f, "{}", v),
            MetricValue::Pair(a, b) => write!(f, "({:.4}, {:.4})", a, b),
            MetricValue::Array(values) => {
                let parts: Vec<String> = values.iter().map(|v| format!("{:.4}", v)).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            MetricValue::Labels(labels) => write!(f, "[{}]", labels.join(", ")),
            MetricValue::Table(table) => {
                let parts: Vec<String> = table
                    .iter()
                    .map(|(k, v)| format!("{}: {:.4}", k, v))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue::Integer(value as i64)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Flag(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<(f64, f64)> for MetricValue {
    fn from(value: (f64, f64)) -> Self {
        MetricValue::Pair(value.0, value.1)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(value: Vec<f64>) -> Self {
        MetricValue::Array(value)
    }
}

impl From<Vec<String>> for MetricValue {
    fn from(value: Vec<String>) -> Self {
        MetricValue::Labels(value)
    }
}

impl From<BTreeMap<String, f64>> for MetricValue {
    fn from(value: BTreeMap<String, f64>) -> Self {
        MetricValue::Table(value)
    }
}

/// Per-feature scores with their names, most important first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRanking {
    pub features: Vec<String>,
    pub scores: Vec<f64>,
}

impl FeatureRanking {
    pub fn new(names: &[String], scores: &[f64]) -> Self {
        let order = rank_descending(scores);
        Self {
            features: order.iter().map(|&i| names[i].clone()).collect(),
            scores: order.iter().map(|&i| scores[i]).collect(),
        }
    }

    pub fn top(&self, n: usize) -> Vec<String> {
        self.features.iter().take(n).cloned().collect()
    }
}

fn default_enabled() -> bool {
    true
}

/// A single requested probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Must match one of the adapter's available tests
    pub test_name: String,
    /// Adapter-specific tuning values
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Metric name to pass/fail cutoff; missing entries fall back to adapter defaults
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
    /// Disabled configs are reported as skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Advisory timeout in seconds, enforced by the caller if at all
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl TestConfig {
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            parameters: BTreeMap::new(),
            thresholds: BTreeMap::new(),
            enabled: true,
            timeout: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_threshold(mut self, metric: impl Into<String>, threshold: f64) -> Self {
        self.thresholds.insert(metric.into(), threshold);
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters
            .get(name)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }

    /// Threshold supplied for `metric`, or `default` when the config omits it.
    pub fn threshold_or(&self, metric: &str, default: f64) -> f64 {
        self.thresholds.get(metric).copied().unwrap_or(default)
    }

    pub fn param_f64(&self, name: &str) -> ProbeResult<Option<f64>> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| TestFault::invalid(name, format!("expected a number, got {}", value))),
        }
    }

    pub fn param_u64(&self, name: &str) -> ProbeResult<Option<u64>> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                TestFault::invalid(
                    name,
                    format!("expected a non-negative integer, got {}", value),
                )
            }),
        }
    }

    pub fn param_usize(&self, name: &str) -> ProbeResult<Option<usize>> {
        self.param_u64(name)?
            .map(|v| {
                usize::try_from(v).map_err(|_| {
                    TestFault::invalid(name, format!("{} does not fit in this platform's usize", v))
                })
            })
            .transpose()
    }

    pub fn param_bool(&self, name: &str) -> ProbeResult<Option<bool>> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| TestFault::invalid(name, format!("expected a boolean, got {}", value))),
        }
    }

    pub fn param_str(&self, name: &str) -> ProbeResult<Option<&str>> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| TestFault::invalid(name, format!("expected a string, got {}", value))),
        }
    }

    pub fn param_f64_list(&self, name: &str) -> ProbeResult<Option<Vec<f64>>> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_f64().ok_or_else(|| {
                        TestFault::invalid(name, format!("expected numbers, got {}", item))
                    })
                })
                .collect::<ProbeResult<Vec<f64>>>()
                .map(Some),
            Some(value) => Err(TestFault::invalid(
                name,
                format!("expected a list of numbers, got {}", value),
            )),
        }
    }
}

/// Raw outcome of one successfully executed sub-test, before the
/// orchestration loop wraps it into a [`TestResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestOutcome {
    pub passed: bool,
    pub score: f64,
    pub threshold: f64,
    pub higher_is_better: bool,
    pub metrics: Metrics,
    pub artifacts: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl TestOutcome {
    /// Outcome whose verdict is `score` compared against `threshold`.
    pub fn scored(score: f64, threshold: f64, higher_is_better: bool) -> Self {
        Self {
            passed: calculate_pass_fail(score, threshold, higher_is_better),
            score,
            threshold,
            higher_is_better,
            metrics: Metrics::new(),
            artifacts: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Outcome for a probe that does not apply to this model. It passes so
    /// that an inapplicable probe never blocks an overall verdict.
    pub fn not_applicable(threshold: f64, reason: impl Into<String>) -> Self {
        Self::scored(1.0, threshold, true)
            .with_metric("applicable", false)
            .with_metric("note", reason.into())
    }

    /// Override the verdict derived from the score.
    pub fn with_verdict(mut self, passed: bool) -> Self {
        self.passed = passed;
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics.extend(metrics);
        self
    }

    pub fn with_artifact(mut self, path: Option<String>) -> Self {
        if let Some(path) = path {
            self.artifacts.push(path);
        }
        self
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }
}

/// Outcome of one executed (or skipped) probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub test_name: String,
    pub status: TestStatus,
    pub passed: bool,
    /// Comparable across sub-tests of one adapter, not across adapters
    pub score: f64,
    /// Cutoff actually applied to `score`
    pub threshold: f64,
    /// Direction in which `score` is compared to `threshold`
    pub higher_is_better: bool,
    pub metrics: Metrics,
    pub artifacts: Vec<String>,
    pub error_message: Option<String>,
    /// Wall-clock seconds spent in execution
    pub execution_time: f64,
    pub metadata: BTreeMap<String, Value>,
}

impl TestResult {
    pub fn pending(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            status: TestStatus::Pending,
            passed: false,
            score: 0.0,
            threshold: 0.0,
            higher_is_better: true,
            metrics: Metrics::new(),
            artifacts: Vec::new(),
            error_message: None,
            execution_time: 0.0,
            metadata: BTreeMap::new(),
        }
    }

    /// Skipped tests always pass so they never block an overall verdict.
    pub fn skipped(test_name: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Skipped,
            passed: true,
            ..Self::pending(test_name)
        }
    }

    pub fn failed(test_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Failed,
            passed: false,
            error_message: Some(message.into()),
            ..Self::pending(test_name)
        }
    }

    pub fn completed(test_name: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            test_name: test_name.into(),
            status: TestStatus::Completed,
            passed: outcome.passed,
            score: outcome.score,
            threshold: outcome.threshold,
            higher_is_better: outcome.higher_is_better,
            metrics: outcome.metrics,
            artifacts: outcome.artifacts,
            error_message: None,
            execution_time: 0.0,
            metadata: outcome.metadata,
        }
    }

    pub fn with_execution_time(mut self, seconds: f64) -> Self {
        self.execution_time = seconds;
        self
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TestStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TestStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status == TestStatus::Skipped
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            TestStatus::Skipped => write!(f, "⏭️  SKIPPED: {}", self.test_name),
            TestStatus::Failed => write!(
                f,
                "❌ FAILED: {} - Error: {}",
                self.test_name,
                self.error_message.as_deref().unwrap_or("unknown error")
            ),
            _ => {
                let comparison = if self.higher_is_better { ">=" } else { "<=" };
                let verdict = if self.passed { "✅ PASS" } else { "⚠️  FAIL" };
                write!(
                    f,
                    "{}: {} (score: {:.4}, required {} {:.4}, {:.3}s)",
                    verdict,
                    self.test_name,
                    self.score,
                    comparison,
                    self.threshold,
                    self.execution_time
                )
            }
        }
    }
}

/// Counts and overall verdict over a batch of results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub passed: usize,
    pub overall_passed: bool,
}

impl BatchSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            overall_passed: true,
            ..Default::default()
        };
        for result in results {
            match result.status {
                TestStatus::Completed => summary.completed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Skipped => summary.skipped += 1,
                TestStatus::Pending | TestStatus::Running => {}
            }
            if result.passed {
                summary.passed += 1;
            } else {
                summary.overall_passed = false;
            }
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} passed (completed: {}, failed: {}, skipped: {}) - overall: {}",
            self.passed,
            self.total,
            self.completed,
            self.failed,
            self.skipped,
            if self.overall_passed { "PASS" } else { "FAIL" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_ranking() {
        let names = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let ranking = FeatureRanking::new(&names, &[0.2, 0.9, 0.5]);
        assert_eq!(ranking.top(2), vec!["y".to_string(), "z".to_string()]);
        assert_eq!(ranking.scores, vec![0.9, 0.5, 0.2]);
    }

    #[test]
    fn test_status_invariants() {
        let skipped = TestResult::skipped("demographic_parity");
        assert_eq!(skipped.status, TestStatus::Skipped);
        assert!(skipped.passed);

        let failed = TestResult::failed("demographic_parity", "boom");
        assert_eq!(failed.status, TestStatus::Failed);
        assert!(!failed.passed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_completed_copies_outcome() {
        let outcome = TestOutcome::scored(0.05, 0.1, false).with_metric("demographic_parity", 0.05);
        let result = TestResult::completed("demographic_parity", outcome);
        assert!(result.is_completed());
        assert!(result.passed);
        assert!(!result.higher_is_better);
        assert_eq!(
            result.metric("demographic_parity").and_then(|m| m.as_f64()),
            Some(0.05)
        );
    }

    #[test]
    fn test_not_applicable_passes() {
        let outcome = TestOutcome::not_applicable(0.8, "model does not support retraining");
        assert!(outcome.passed);
        assert_eq!(outcome.score, 1.0);
        assert_eq!(
            outcome.metric("applicable").and_then(|m| m.as_flag()),
            Some(false)
        );
    }

    #[test]
    fn test_config_parameter_accessors() {
        let config = TestConfig::new("adversarial_noise")
            .with_parameter("noise_levels", json!([0.0, 0.1]))
            .with_parameter("sample_size", 50)
            .with_parameter("sensitive_attribute", "gender")
            .with_parameter("enabled_flag", true);

        assert_eq!(
            config.param_f64_list("noise_levels").unwrap(),
            Some(vec![0.0, 0.1])
        );
        assert_eq!(config.param_usize("sample_size").unwrap(), Some(50));
        assert_eq!(config.param_str("sensitive_attribute").unwrap(), Some("gender"));
        assert_eq!(config.param_bool("enabled_flag").unwrap(), Some(true));
        assert_eq!(config.param_f64("missing").unwrap(), None);

        assert!(config.param_f64("sensitive_attribute").is_err());
        assert!(config.param_f64_list("sample_size").is_err());
    }

    #[test]
    fn test_usize_parameter_bounds() {
        let config = TestConfig::new("partial_dependence")
            .with_parameter("grid_resolution", u32::MAX as u64)
            .with_parameter("top_n", -1);
        assert_eq!(
            config.param_usize("grid_resolution").unwrap(),
            Some(u32::MAX as usize)
        );
        assert!(matches!(
            config.param_usize("top_n"),
            Err(TestFault::InvalidParameter { .. })
        ));
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_usize_parameter_overflow() {
        let config = TestConfig::new("partial_dependence").with_parameter("top_n", u64::MAX);
        assert!(matches!(
            config.param_usize("top_n"),
            Err(TestFault::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_threshold_defaults() {
        let config = TestConfig::new("demographic_parity").with_threshold("demographic_parity", 0.2);
        assert_eq!(config.threshold_or("demographic_parity", 0.1), 0.2);
        assert_eq!(config.threshold_or("equalized_odds", 0.1), 0.1);
    }

    #[test]
    fn test_config_deserialization_defaults() {
        let config: TestConfig = serde_json::from_value(json!({
            "test_name": "data_leakage"
        }))
        .unwrap();
        assert!(config.enabled);
        assert!(config.parameters.is_empty());
        assert!(config.thresholds.is_empty());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TestStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
    }

    #[test]
    fn test_batch_summary() {
        let results = vec![
            TestResult::skipped("a"),
            TestResult::completed("b", TestOutcome::scored(0.9, 0.8, true)),
            TestResult::completed("c", TestOutcome::scored(0.5, 0.8, true)),
            TestResult::failed("d", "boom"),
        ];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.passed, 2);
        assert!(!summary.overall_passed);

        let all_skipped = BatchSummary::from_results(&[TestResult::skipped("a")]);
        assert!(all_skipped.overall_passed);
    }

    #[test]
    fn test_result_display() {
        let failed = TestResult::failed("boundary_test", "no probabilities");
        assert!(format!("{}", failed).contains("❌ FAILED"));

        let ok = TestResult::completed("adversarial_noise", TestOutcome::scored(1.0, 0.8, true));
        let display = format!("{}", ok);
        assert!(display.contains("✅ PASS"));
        assert!(display.contains(">="));
    }
}
