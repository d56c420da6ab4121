//! Tabular evaluation data handed to the engine by the caller.

use crate::adapter::{ProbeResult, TestFault};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Serialisable table form: named columns with the label in the last column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// Category levels of label-encoded columns; level `i` is stored as `i`
    #[serde(default)]
    pub categories: HashMap<String, Vec<String>>,
}

/// Fixed-schema feature matrix plus labels. Never mutated by a probe.
#[derive(Debug, Clone)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: Array2<f64>,
    labels: Array1<f64>,
    categories: HashMap<String, Vec<String>>,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        features: Array2<f64>,
        labels: Array1<f64>,
    ) -> ProbeResult<Self> {
        if feature_names.len() != features.ncols() {
            return Err(TestFault::DimensionMismatch {
                expected: features.ncols(),
                actual: feature_names.len(),
            });
        }
        if labels.len() != features.nrows() {
            return Err(TestFault::DimensionMismatch {
                expected: features.nrows(),
                actual: labels.len(),
            });
        }
        Ok(Self {
            feature_names,
            features,
            labels,
            categories: HashMap::new(),
        })
    }

    /// Build from rows whose last column is the label.
    pub fn from_table(columns: Vec<String>, rows: Vec<Vec<f64>>) -> ProbeResult<Self> {
        if columns.len() < 2 {
            return Err(TestFault::insufficient(
                "a table needs at least one feature column and a label column",
            ));
        }
        let width = columns.len();
        let n_features = width - 1;
        let mut flat = Vec::with_capacity(rows.len() * n_features);
        let mut labels = Vec::with_capacity(rows.len());
        for row in &rows {
            if row.len() != width {
                return Err(TestFault::DimensionMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            flat.extend_from_slice(&row[..n_features]);
            labels.push(row[n_features]);
        }
        let features = Array2::from_shape_vec((rows.len(), n_features), flat)
            .map_err(|e| TestFault::numerical(e.to_string()))?;
        let mut names = columns;
        names.truncate(n_features);
        Self::new(names, features, Array1::from(labels))
    }

    pub fn from_spec(spec: TableSpec) -> ProbeResult<Self> {
        let mut dataset = Self::from_table(spec.columns, spec.rows)?;
        for (column, levels) in spec.categories {
            dataset.column_index(&column)?;
            dataset.categories.insert(column, levels);
        }
        Ok(dataset)
    }

    pub fn with_categories(mut self, column: impl Into<String>, levels: Vec<String>) -> Self {
        self.categories.insert(column.into(), levels);
        self
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &Array1<f64> {
        &self.labels
    }

    pub fn column_index(&self, name: &str) -> ProbeResult<usize> {
        self.feature_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| TestFault::invalid(name, "no such feature column in dataset"))
    }

    pub fn column(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.column(index)
    }

    /// Resolve a caller-supplied group value to the numeric code stored in
    /// `column`. Strings are looked up in the column's categories first and
    /// parsed as numbers otherwise.
    pub fn encode_value(&self, column: &str, value: &Value) -> ProbeResult<f64> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| TestFault::invalid(column, "group value is not representable")),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => {
                if let Some(levels) = self.categories.get(column) {
                    if let Some(code) = levels.iter().position(|level| level == s) {
                        return Ok(code as f64);
                    }
                }
                s.trim().parse::<f64>().map_err(|_| {
                    TestFault::invalid(
                        column,
                        format!("group value '{}' is not a known category", s),
                    )
                })
            }
            other => Err(TestFault::invalid(
                column,
                format!("unsupported group value {}", other),
            )),
        }
    }

    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
            categories: self.categories.clone(),
        }
    }

    /// Seeded subset of at most `max_rows` rows, drawn without replacement.
    pub fn sample(&self, max_rows: usize, rng: &mut StdRng) -> Dataset {
        if self.n_samples() <= max_rows {
            return self.clone();
        }
        let mut indices = index::sample(rng, self.n_samples(), max_rows).into_vec();
        indices.sort_unstable();
        self.select_rows(&indices)
    }

    /// Seeded split into `(train, held_out)` with `held_out_fraction` of
    /// the rows (at least one) held out.
    pub fn split(&self, held_out_fraction: f64, rng: &mut StdRng) -> ProbeResult<(Dataset, Dataset)> {
        if !(0.0..1.0).contains(&held_out_fraction) || held_out_fraction == 0.0 {
            return Err(TestFault::invalid(
                "test_size",
                "must be strictly between 0.0 and 1.0",
            ));
        }
        let n = self.n_samples();
        if n < 2 {
            return Err(TestFault::insufficient("need at least two rows to split"));
        }
        let held_out = ((n as f64 * held_out_fraction).round() as usize).clamp(1, n - 1);
        let permutation = index::sample(rng, n, n).into_vec();
        let mut test_idx = permutation[..held_out].to_vec();
        let mut train_idx = permutation[held_out..].to_vec();
        test_idx.sort_unstable();
        train_idx.sort_unstable();
        Ok((self.select_rows(&train_idx), self.select_rows(&test_idx)))
    }

    /// Copy of this dataset without row `row`.
    pub fn without_row(&self, row: usize) -> Dataset {
        let indices: Vec<usize> = (0..self.n_samples()).filter(|&i| i != row).collect();
        self.select_rows(&indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use serde_json::json;

    fn table() -> Dataset {
        Dataset::from_table(
            vec!["age".into(), "gender".into(), "label".into()],
            vec![
                vec![25.0, 0.0, 1.0],
                vec![40.0, 1.0, 0.0],
                vec![33.0, 1.0, 1.0],
                vec![51.0, 0.0, 0.0],
            ],
        )
        .unwrap()
        .with_categories("gender", vec!["female".into(), "male".into()])
    }

    #[test]
    fn test_from_table_splits_label() {
        let data = table();
        assert_eq!(data.n_samples(), 4);
        assert_eq!(data.n_features(), 2);
        assert_eq!(data.feature_names(), &["age".to_string(), "gender".to_string()]);
        assert_eq!(data.labels().to_vec(), vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_from_table_rejects_ragged_rows() {
        let result = Dataset::from_table(
            vec!["a".into(), "label".into()],
            vec![vec![1.0, 0.0], vec![1.0]],
        );
        assert!(matches!(result, Err(TestFault::DimensionMismatch { .. })));
    }

    #[test]
    fn test_encode_value() {
        let data = table();
        assert_eq!(data.encode_value("gender", &json!("male")).unwrap(), 1.0);
        assert_eq!(data.encode_value("gender", &json!(0)).unwrap(), 0.0);
        assert_eq!(data.encode_value("age", &json!("33")).unwrap(), 33.0);
        assert!(data.encode_value("gender", &json!("other")).is_err());
    }

    #[test]
    fn test_sample_is_seeded() {
        let data = table();
        let mut a = StdRng::seed_from_u64(1);
        let mut b = StdRng::seed_from_u64(1);
        let first = data.sample(2, &mut a);
        let second = data.sample(2, &mut b);
        assert_eq!(first.n_samples(), 2);
        assert_eq!(first.features(), second.features());

        let all = data.sample(10, &mut a);
        assert_eq!(all.n_samples(), 4);
    }

    #[test]
    fn test_split_and_without_row() {
        let data = table();
        let mut rng = StdRng::seed_from_u64(3);
        let (train, held_out) = data.split(0.25, &mut rng).unwrap();
        assert_eq!(train.n_samples(), 3);
        assert_eq!(held_out.n_samples(), 1);
        assert!(data.split(1.0, &mut rng).is_err());

        let smaller = data.without_row(0);
        assert_eq!(smaller.n_samples(), 3);
        assert_eq!(smaller.features()[[0, 0]], 40.0);
    }
}
