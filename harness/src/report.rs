use crate::{HarnessError, HarnessResult};
use chrono::{DateTime, Utc};
use engine::{AdapterKind, BatchSummary, MetricValue, TestResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

/// Everything one `harness run` produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub adapter: AdapterKind,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub summary: BatchSummary,
    pub results: Vec<TestResult>,
}

impl RunReport {
    pub fn new(adapter: AdapterKind, model: impl Into<String>, results: Vec<TestResult>) -> Self {
        Self {
            adapter,
            model: model.into(),
            generated_at: Utc::now(),
            summary: BatchSummary::from_results(&results),
            results,
        }
    }

    pub fn passed(&self) -> bool {
        self.summary.overall_passed
    }

    /// Human-readable listing: one line per result, its scalar metrics
    /// indented underneath, then the summary.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "🧪 {} tests on {} ({})",
            self.adapter,
            self.model,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for result in &self.results {
            let _ = writeln!(out, "{}", result);
            for (name, value) in &result.metrics {
                if let MetricValue::Number(number) = value {
                    let _ = writeln!(out, "    {:<32} {:.4}", name, number);
                }
            }
            for artifact in &result.artifacts {
                let _ = writeln!(out, "    📄 {}", artifact);
            }
        }
        let _ = writeln!(out, "{}", self.summary);
        out
    }

    pub fn write_json(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
        }
        let body = serde_json::to_string_pretty(self)?;
        fs::write(path, body).map_err(|e| HarnessError::io(path, e))?;
        info!(path = %path.display(), "Wrote report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::TestOutcome;

    fn report() -> RunReport {
        let outcome = TestOutcome::scored(0.92, 0.8, true).with_metric("mean_stability", 0.92);
        RunReport::new(
            AdapterKind::Robustness,
            "logistic_regression",
            vec![
                TestResult::completed("adversarial_noise", outcome),
                TestResult::skipped("boundary_test"),
            ],
        )
    }

    #[test]
    fn test_render_table() {
        let report = report();
        let table = report.render_table();

        assert!(table.contains("robustness tests on logistic_regression"));
        assert!(table.contains("adversarial_noise"));
        assert!(table.contains("mean_stability"));
        assert!(table.contains("SKIPPED: boundary_test"));
        assert!(report.passed());
    }

    #[test]
    fn test_write_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let report = report();

        report.write_json(&path).unwrap();
        let loaded: RunReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.adapter, AdapterKind::Robustness);
        assert_eq!(loaded.summary, report.summary);
        assert_eq!(loaded.results, report.results);
    }
}
