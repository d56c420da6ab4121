pub mod adapter;
pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod explainability;
pub mod fairness;
pub mod model;
pub mod privacy;
pub mod robustness;
pub mod stats;
pub mod types;

pub use adapter::{calculate_pass_fail, ModelType, ProbeResult, TestAdapter, TestFault};
pub use artifacts::ArtifactWriter;
pub use config::EngineConfig;
pub use dataset::{Dataset, TableSpec};
pub use dispatch::{create_adapter, run, AdapterKind, AdapterRegistry, DispatchError};
pub use explainability::{
    AttributionBackend, Backends, ExplainabilityAdapter, ExplainabilityTest, LocalExplanation,
    SurrogateBackend,
};
pub use fairness::{FairnessAdapter, FairnessMetrics, FairnessTest, GroupRates};
pub use model::{LogisticRegression, PredictiveModel, ThresholdRule};
pub use privacy::{LeakageIndicator, PrivacyAdapter, PrivacyTest};
pub use robustness::{RobustnessAdapter, RobustnessTest};
pub use types::{
    BatchSummary, FeatureRanking, MetricValue, Metrics, TestConfig, TestOutcome, TestResult,
    TestStatus,
};

pub mod prelude {
    pub use crate::adapter::{ModelType, ProbeResult, TestAdapter, TestFault};
    pub use crate::config::*;
    pub use crate::dataset::*;
    pub use crate::dispatch::*;
    pub use crate::model::*;
    pub use crate::types::*;
}
