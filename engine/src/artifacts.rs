//! Artifact files produced by probes.
//!
//! The engine only writes files and returns their paths; keeping or
//! publishing them is up to the caller.

use crate::adapter::ProbeResult;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ArtifactWriter {
    dir: Option<PathBuf>,
}

impl ArtifactWriter {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// File name `{test_name}_{artifact_type}_{unix_timestamp}.{ext}`.
    pub fn file_name(test_name: &str, artifact_type: &str, ext: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            test_name,
            artifact_type,
            Utc::now().timestamp(),
            ext
        )
    }

    pub fn artifact_path(dir: &Path, test_name: &str, artifact_type: &str, ext: &str) -> PathBuf {
        dir.join(Self::file_name(test_name, artifact_type, ext))
    }

    /// Write `value` as pretty JSON. Returns `None` when artifact output is
    /// disabled.
    pub fn write_json<T: Serialize>(
        &self,
        test_name: &str,
        artifact_type: &str,
        value: &T,
    ) -> ProbeResult<Option<String>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        fs::create_dir_all(dir)?;
        let path = Self::artifact_path(dir, test_name, artifact_type, "json");
        let body = serde_json::to_string_pretty(value)?;
        fs::write(&path, body)?;
        debug!(path = %path.display(), "Wrote artifact");
        Ok(Some(path.to_string_lossy().into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_name_shape() {
        let name = ArtifactWriter::file_name("shap_global", "importance", "json");
        assert!(name.starts_with("shap_global_importance_"));
        assert!(name.ends_with(".json"));
        let stamp = name
            .trim_start_matches("shap_global_importance_")
            .trim_end_matches(".json");
        assert!(stamp.parse::<i64>().is_ok());
    }

    #[test]
    fn test_disabled_writer_returns_none() {
        let writer = ArtifactWriter::disabled();
        assert!(!writer.is_enabled());
        let path = writer.write_json("t", "dump", &json!({"a": 1})).unwrap();
        assert!(path.is_none());
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(Some(dir.path().join("artifacts")));
        let path = writer
            .write_json("partial_dependence", "curves", &json!({"x": [1, 2]}))
            .unwrap()
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"x\""));
        assert!(path.contains("artifacts"));
    }
}
