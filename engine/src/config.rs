use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine-wide settings shared by every adapter instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for every sampled probe unless a config supplies `random_state`
    pub random_seed: u64,
    /// Cutoff turning a positive-class score into a binary decision
    pub decision_threshold: f64,
    /// Upper bound on rows drawn by any sampled probe
    pub max_samples: usize,
    /// Directory receiving artifact files; `None` disables artifact output
    pub artifact_dir: Option<PathBuf>,
    /// Enable detailed logging for probe internals
    pub verbose_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            random_seed: 42,
            decision_threshold: 0.5,
            max_samples: 1000,
            artifact_dir: None,
            verbose_logging: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_decision_threshold(mut self, threshold: f64) -> Self {
        self.decision_threshold = threshold;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn with_verbose_logging(mut self) -> Self {
        self.verbose_logging = true;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err("Decision threshold must be between 0.0 and 1.0".to_string());
        }

        if self.max_samples == 0 {
            return Err("Max samples must be greater than 0".to_string());
        }

        if let Some(dir) = &self.artifact_dir {
            if dir.as_os_str().is_empty() {
                return Err("Artifact directory cannot be empty".to_string());
            }
        }

        Ok(())
    }
}
