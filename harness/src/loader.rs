//! Reading datasets, model descriptions and run files from disk.

use crate::{HarnessError, HarnessResult};
use engine::{
    AdapterKind, Dataset, EngineConfig, LogisticRegression, PredictiveModel, TableSpec,
    TestConfig, ThresholdRule,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

fn read(path: &Path) -> HarnessResult<String> {
    fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))
}

/// Load a JSON table (`columns`, `rows`, optional `categories`); the last
/// column is the label.
pub fn load_dataset(path: &Path) -> HarnessResult<Dataset> {
    let spec: TableSpec = serde_json::from_str(&read(path)?)?;
    let dataset = Dataset::from_spec(spec)?;
    info!(
        path = %path.display(),
        rows = dataset.n_samples(),
        features = dataset.n_features(),
        "Loaded dataset"
    );
    Ok(dataset)
}

/// A feature addressed by column name or position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureRef {
    Index(usize),
    Name(String),
}

impl FeatureRef {
    fn resolve(&self, dataset: &Dataset) -> HarnessResult<usize> {
        match self {
            FeatureRef::Index(index) if *index < dataset.n_features() => Ok(*index),
            FeatureRef::Index(index) => Err(HarnessError::invalid(format!(
                "feature index {} out of range for {} features",
                index,
                dataset.n_features()
            ))),
            FeatureRef::Name(name) => Ok(dataset.column_index(name)?),
        }
    }
}

/// Description of one of the built-in reference models.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    LogisticRegression {
        weights: Vec<f64>,
        #[serde(default)]
        bias: f64,
        #[serde(default)]
        learning_rate: Option<f64>,
        #[serde(default)]
        epochs: Option<usize>,
    },
    ThresholdRule {
        feature: FeatureRef,
        cutoff: f64,
    },
}

impl ModelSpec {
    pub fn build(&self, dataset: &Dataset) -> HarnessResult<Box<dyn PredictiveModel>> {
        match self {
            ModelSpec::LogisticRegression {
                weights,
                bias,
                learning_rate,
                epochs,
            } => {
                if weights.len() != dataset.n_features() {
                    return Err(HarnessError::invalid(format!(
                        "model has {} weights but the dataset has {} features",
                        weights.len(),
                        dataset.n_features()
                    )));
                }
                let mut model = LogisticRegression::new(weights.clone(), *bias);
                if let Some(rate) = learning_rate {
                    model.learning_rate = *rate;
                }
                if let Some(epochs) = epochs {
                    model.epochs = *epochs;
                }
                Ok(Box::new(model))
            }
            ModelSpec::ThresholdRule { feature, cutoff } => Ok(Box::new(ThresholdRule::new(
                feature.resolve(dataset)?,
                *cutoff,
            ))),
        }
    }
}

pub fn load_model(path: &Path) -> HarnessResult<ModelSpec> {
    let spec: ModelSpec = serde_json::from_str(&read(path)?)?;
    debug!(?spec, "Loaded model description");
    Ok(spec)
}

/// TOML run file: engine settings plus the probes to execute.
///
/// ```toml
/// adapter = "fairness"
///
/// [engine]
/// random_seed = 7
///
/// [[tests]]
/// test_name = "disparate_impact"
/// parameters = { sensitive_attribute = "gender", privileged_group = "male" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    /// Adapter used when none is given on the command line
    #[serde(default)]
    pub adapter: Option<AdapterKind>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tests: Vec<TestConfig>,
}

impl RunFile {
    pub fn parse(content: &str) -> HarnessResult<Self> {
        let run: RunFile = toml::from_str(content)?;
        run.engine.validate().map_err(HarnessError::invalid)?;
        if run.tests.is_empty() {
            return Err(HarnessError::invalid("run file defines no [[tests]]"));
        }
        Ok(run)
    }

    /// The command-line adapter wins over the one in the file.
    pub fn resolve_adapter(&self, requested: Option<&str>) -> HarnessResult<AdapterKind> {
        match (requested, self.adapter) {
            (Some(name), _) => Ok(name.parse()?),
            (None, Some(kind)) => Ok(kind),
            (None, None) => Err(HarnessError::invalid(
                "no adapter given on the command line or in the run file",
            )),
        }
    }
}

pub fn load_run_file(path: &Path) -> HarnessResult<RunFile> {
    let run = RunFile::parse(&read(path)?)?;
    info!(path = %path.display(), tests = run.tests.len(), "Loaded run file");
    Ok(run)
}
