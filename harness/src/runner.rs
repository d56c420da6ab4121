//! Batch execution: sequential on the caller's thread, or one blocking task
//! per config with optional per-test timeouts.

use engine::{
    create_adapter, AdapterKind, Dataset, EngineConfig, PredictiveModel, TestAdapter, TestConfig,
    TestResult,
};
use futures::future::join_all;
use std::slice;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub fn run_sequential(
    kind: AdapterKind,
    engine_config: &EngineConfig,
    model: &dyn PredictiveModel,
    dataset: &Dataset,
    configs: &[TestConfig],
) -> Vec<TestResult> {
    info!(adapter = kind.name(), tests = configs.len(), "Running sequentially");
    create_adapter(kind, engine_config.clone()).execute_tests(model, dataset, configs)
}

/// Run every config on the blocking pool. Results keep the input order.
pub async fn run_parallel(
    kind: AdapterKind,
    engine_config: EngineConfig,
    model: Arc<dyn PredictiveModel>,
    dataset: Arc<Dataset>,
    configs: Vec<TestConfig>,
) -> Vec<TestResult> {
    info!(adapter = kind.name(), tests = configs.len(), "Running in parallel");
    let adapter: Arc<dyn TestAdapter> = Arc::from(create_adapter(kind, engine_config));
    run_parallel_with(adapter, model, dataset, configs).await
}

pub async fn run_parallel_with(
    adapter: Arc<dyn TestAdapter>,
    model: Arc<dyn PredictiveModel>,
    dataset: Arc<Dataset>,
    configs: Vec<TestConfig>,
) -> Vec<TestResult> {
    let tasks = configs.into_iter().map(|config| {
        let adapter = Arc::clone(&adapter);
        let model = Arc::clone(&model);
        let dataset = Arc::clone(&dataset);
        async move {
            let name = config.test_name.clone();
            // Disabled configs come back as skipped immediately.
            let limit = config.timeout.filter(|_| config.enabled);
            let handle = tokio::task::spawn_blocking(move || {
                adapter
                    .execute_tests(model.as_ref(), &dataset, slice::from_ref(&config))
                    .pop()
            });

            let joined = match limit {
                Some(seconds) => {
                    match tokio::time::timeout(Duration::from_secs(seconds), handle).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            warn!(test = %name, seconds, "Test timed out");
                            return TestResult::failed(
                                &name,
                                format!("Test timed out after {}s", seconds),
                            )
                            .with_execution_time(seconds as f64);
                        }
                    }
                }
                None => handle.await,
            };

            match joined {
                Ok(Some(result)) => {
                    debug!(test = %name, status = ?result.status, "Test finished");
                    result
                }
                Ok(None) => TestResult::failed(&name, "Adapter returned no result"),
                Err(e) => TestResult::failed(&name, format!("Test task aborted: {}", e)),
            }
        }
    });

    join_all(tasks).await
}
