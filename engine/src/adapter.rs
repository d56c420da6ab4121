use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::model::PredictiveModel;
use crate::types::{TestConfig, TestOutcome, TestResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TestFault {
    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Unknown test '{test}' for adapter '{adapter}'")]
    UnknownTest { adapter: String, test: String },

    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model capability not supported: {capability}")]
    Unsupported { capability: String },

    #[error("Optional dependency unavailable: {dependency}")]
    DependencyUnavailable { dependency: String },

    #[error("Numerical error: {message}")]
    Numerical { message: String },

    #[error("Model error: {message}")]
    Model { message: String },

    #[error("Artifact error: {0}")]
    Artifact(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TestFault {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::InsufficientData {
            message: message.into(),
        }
    }

    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: capability.into(),
        }
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical {
            message: message.into(),
        }
    }
}

pub type ProbeResult<T> = Result<T, TestFault>;

/// Input modalities an adapter declares itself valid for.
///
/// Advisory only: the orchestration loop never checks it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Tabular,
    Image,
    Text,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::Tabular => "tabular",
            ModelType::Image => "image",
            ModelType::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// Shared comparison used by every adapter to turn a score into a verdict.
///
/// A NaN score never passes.
pub fn calculate_pass_fail(score: f64, threshold: f64, higher_is_better: bool) -> bool {
    if score.is_nan() {
        return false;
    }
    if higher_is_better {
        score >= threshold
    } else {
        score <= threshold
    }
}

/// Capability contract implemented by every test family.
///
/// Implementors provide discovery, validation and single-test execution;
/// the batch loop in [`TestAdapter::execute_tests`] is shared by all of them.
pub trait TestAdapter: Send + Sync {
    fn adapter_name(&self) -> &'static str;

    fn supported_model_types(&self) -> &'static [ModelType];

    fn get_available_tests(&self) -> Vec<&'static str>;

    /// Adapter-specific precondition check. Returning `false` prevents
    /// [`TestAdapter::execute_test`] from being called for this config.
    fn validate_config(&self, config: &TestConfig) -> bool;

    /// Execute exactly one named sub-test.
    fn execute_test(
        &self,
        model: &dyn PredictiveModel,
        dataset: &Dataset,
        config: &TestConfig,
    ) -> ProbeResult<TestOutcome>;

    fn supports_test(&self, test_name: &str) -> bool {
        self.get_available_tests().contains(&test_name)
    }

    /// Execute one config and convert any fault into a `FAILED` result.
    fn run_test(
        &self,
        model: &dyn PredictiveModel,
        dataset: &Dataset,
        config: &TestConfig,
    ) -> TestResult {
        let start = Instant::now();
        let result = match self.execute_test(model, dataset, config) {
            Ok(outcome) => {
                debug!(
                    adapter = self.adapter_name(),
                    test = %config.test_name,
                    passed = outcome.passed,
                    score = outcome.score,
                    "Test completed"
                );
                TestResult::completed(&config.test_name, outcome)
            }
            Err(fault) => {
                warn!(
                    adapter = self.adapter_name(),
                    test = %config.test_name,
                    "Test execution failed: {}",
                    fault
                );
                TestResult::failed(&config.test_name, fault.to_string())
            }
        };
        result
            .with_execution_time(start.elapsed().as_secs_f64())
            .with_metadata("adapter", self.adapter_name())
    }

    /// Run a batch of configs strictly in order.
    ///
    /// Always returns one result per config, in the same order. Disabled
    /// configs are skipped without validation, invalid configs fail without
    /// execution, and a failing probe never stops the rest of the batch.
    fn execute_tests(
        &self,
        model: &dyn PredictiveModel,
        dataset: &Dataset,
        configs: &[TestConfig],
    ) -> Vec<TestResult> {
        info!(
            adapter = self.adapter_name(),
            "Starting test batch with {} configs",
            configs.len()
        );

        let mut results = Vec::with_capacity(configs.len());
        for config in configs {
            if !config.enabled {
                debug!(test = %config.test_name, "Skipping disabled test");
                results.push(
                    TestResult::skipped(&config.test_name)
                        .with_metadata("adapter", self.adapter_name()),
                );
                continue;
            }

            if !self.validate_config(config) {
                warn!(test = %config.test_name, "Configuration rejected");
                results.push(
                    TestResult::failed(
                        &config.test_name,
                        format!(
                            "Invalid configuration for test '{}' on adapter '{}'",
                            config.test_name,
                            self.adapter_name()
                        ),
                    )
                    .with_metadata("adapter", self.adapter_name()),
                );
                continue;
            }

            results.push(self.run_test(model, dataset, config));
        }

        let passed = results.iter().filter(|r| r.passed).count();
        info!(
            adapter = self.adapter_name(),
            "Test batch completed: {}/{} passed",
            passed,
            results.len()
        );
        results
    }
}

/// Seed for a single probe: `random_state` in the parameters wins over the
/// engine-wide seed.
pub(crate) fn probe_seed(config: &TestConfig, engine: &EngineConfig) -> ProbeResult<u64> {
    Ok(config
        .param_u64("random_state")?
        .unwrap_or(engine.random_seed))
}

pub(crate) fn probe_rng(config: &TestConfig, engine: &EngineConfig) -> ProbeResult<StdRng> {
    Ok(StdRng::seed_from_u64(probe_seed(config, engine)?))
}

/// Draw the evaluation sample for a probe, honouring `sample_size` and the
/// engine-wide cap.
pub(crate) fn probe_sample(
    dataset: &Dataset,
    config: &TestConfig,
    engine: &EngineConfig,
    default_size: usize,
    rng: &mut StdRng,
) -> ProbeResult<Dataset> {
    if engine.max_samples == 0 {
        return Err(TestFault::invalid("max_samples", "must be greater than 0"));
    }
    let requested = config.param_usize("sample_size")?.unwrap_or(default_size);
    if requested == 0 {
        return Err(TestFault::invalid("sample_size", "must be greater than 0"));
    }
    if dataset.n_samples() == 0 {
        return Err(TestFault::insufficient("dataset has no rows"));
    }
    let sampled = dataset.sample(requested.min(engine.max_samples), rng);
    if engine.verbose_logging {
        info!(
            test = %config.test_name,
            rows = sampled.n_samples(),
            of = dataset.n_samples(),
            "Sampled probe data"
        );
    }
    Ok(sampled)
}
