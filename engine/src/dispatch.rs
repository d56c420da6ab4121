use crate::adapter::TestAdapter;
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::explainability::ExplainabilityAdapter;
use crate::fairness::FairnessAdapter;
use crate::model::PredictiveModel;
use crate::privacy::PrivacyAdapter;
use crate::robustness::RobustnessAdapter;
use crate::types::{TestConfig, TestResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown adapter: {name} (expected one of fairness, explainability, robustness, privacy)")]
    UnknownAdapter { name: String },
}

/// The closed set of test families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Fairness,
    Explainability,
    Robustness,
    Privacy,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 4] = [
        AdapterKind::Fairness,
        AdapterKind::Explainability,
        AdapterKind::Robustness,
        AdapterKind::Privacy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AdapterKind::Fairness => "fairness",
            AdapterKind::Explainability => "explainability",
            AdapterKind::Robustness => "robustness",
            AdapterKind::Privacy => "privacy",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AdapterKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AdapterKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| DispatchError::UnknownAdapter {
                name: s.to_string(),
            })
    }
}

/// Invalid engine settings are not fatal here; every sampled probe of the
/// adapter then fails with the offending setting named.
pub fn create_adapter(kind: AdapterKind, config: EngineConfig) -> Box<dyn TestAdapter> {
    if let Err(message) = config.validate() {
        warn!(adapter = kind.name(), "Invalid engine configuration: {}", message);
    }
    match kind {
        AdapterKind::Fairness => Box::new(FairnessAdapter::new(config)),
        AdapterKind::Explainability => Box::new(ExplainabilityAdapter::new(config)),
        AdapterKind::Robustness => Box::new(RobustnessAdapter::new(config)),
        AdapterKind::Privacy => Box::new(PrivacyAdapter::new(config)),
    }
}

/// Run a batch against the adapter named `adapter_name`.
///
/// An unknown adapter name never aborts: every config comes back as a
/// `FAILED` result carrying the dispatch error.
pub fn run(
    adapter_name: &str,
    model: &dyn PredictiveModel,
    dataset: &Dataset,
    configs: &[TestConfig],
    config: &EngineConfig,
) -> Vec<TestResult> {
    match adapter_name.parse::<AdapterKind>() {
        Ok(kind) => {
            info!(adapter = kind.name(), "Dispatching {} configs", configs.len());
            create_adapter(kind, config.clone()).execute_tests(model, dataset, configs)
        }
        Err(error) => {
            warn!("{}", error);
            configs
                .iter()
                .map(|c| TestResult::failed(&c.test_name, error.to_string()))
                .collect()
        }
    }
}

/// Every adapter instance keyed by kind, for discovery and reuse.
pub struct AdapterRegistry {
    adapters: BTreeMap<AdapterKind, Box<dyn TestAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Registry holding one instance of every adapter kind.
    pub fn with_defaults(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        for kind in AdapterKind::ALL {
            registry.register(kind, create_adapter(kind, config.clone()));
        }
        registry
    }

    pub fn register(&mut self, kind: AdapterKind, adapter: Box<dyn TestAdapter>) {
        self.adapters.insert(kind, adapter);
    }

    pub fn get_adapter(&self, kind: AdapterKind) -> Option<&dyn TestAdapter> {
        self.adapters.get(&kind).map(|a| a.as_ref())
    }

    pub fn list_adapters(&self) -> Vec<AdapterKind> {
        self.adapters.keys().copied().collect()
    }

    /// Available tests of every registered adapter.
    pub fn catalog(&self) -> BTreeMap<AdapterKind, Vec<&'static str>> {
        self.adapters
            .iter()
            .map(|(kind, adapter)| (*kind, adapter.get_available_tests()))
            .collect()
    }

    pub fn execute(
        &self,
        adapter_name: &str,
        model: &dyn PredictiveModel,
        dataset: &Dataset,
        configs: &[TestConfig],
    ) -> Result<Vec<TestResult>, DispatchError> {
        let kind: AdapterKind = adapter_name.parse()?;
        let adapter = self
            .get_adapter(kind)
            .ok_or_else(|| DispatchError::UnknownAdapter {
                name: adapter_name.to_string(),
            })?;
        Ok(adapter.execute_tests(model, dataset, configs))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
