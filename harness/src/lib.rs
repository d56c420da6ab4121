pub mod loader;
pub mod report;
pub mod runner;

use engine::{DispatchError, TestFault};
use std::path::PathBuf;
use thiserror::Error;

pub use loader::{load_dataset, load_model, load_run_file, FeatureRef, ModelSpec, RunFile};
pub use report::RunReport;
pub use runner::{run_parallel, run_parallel_with, run_sequential};

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run file error: {0}")]
    RunFile(#[from] toml::de::Error),

    #[error("Invalid data: {0}")]
    Data(#[from] TestFault),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl HarnessError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
