//! Model handles the engine probes, plus two reference implementations.

use crate::adapter::{ModelType, ProbeResult, TestFault};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// A trained predictor owned by the caller.
///
/// `predict` must be deterministic. Probabilities, intrinsic importances and
/// retraining are optional capabilities; probes that need a missing one
/// either degrade or report the probe as not applicable.
pub trait PredictiveModel: Send + Sync {
    fn predict(&self, features: &Array2<f64>) -> ProbeResult<Array1<f64>>;

    fn has_probabilities(&self) -> bool {
        false
    }

    /// Class probabilities, one column per class (binary: `[P(0), P(1)]`).
    fn predict_proba(&self, _features: &Array2<f64>) -> ProbeResult<Array2<f64>> {
        Err(TestFault::unsupported("class probabilities"))
    }

    /// Intrinsic per-feature importance scores, if the model exposes them.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }

    fn supports_retraining(&self) -> bool {
        false
    }

    /// Train a fresh instance of the same kind on `features`/`labels`.
    /// The receiver is never modified.
    fn fit_clone(
        &self,
        _features: &Array2<f64>,
        _labels: &Array1<f64>,
    ) -> ProbeResult<Box<dyn PredictiveModel>> {
        Err(TestFault::unsupported("retraining"))
    }

    fn model_type(&self) -> ModelType {
        ModelType::Tabular
    }

    fn model_name(&self) -> &str {
        "model"
    }
}

/// Positive-class score per row: `P(class 1)` when probabilities are
/// available, the raw prediction otherwise.
pub fn positive_scores(model: &dyn PredictiveModel, features: &Array2<f64>) -> ProbeResult<Array1<f64>> {
    if model.has_probabilities() {
        let proba = model.predict_proba(features)?;
        if proba.nrows() != features.nrows() {
            return Err(TestFault::DimensionMismatch {
                expected: features.nrows(),
                actual: proba.nrows(),
            });
        }
        let last = proba
            .ncols()
            .checked_sub(1)
            .ok_or_else(|| TestFault::Model {
                message: "probability output has no columns".to_string(),
            })?;
        return Ok(proba.column(last).to_owned());
    }
    checked_predict(model, features)
}

/// Binary decisions: positive-class score at or above `threshold` maps to 1.
pub fn decisions(
    model: &dyn PredictiveModel,
    features: &Array2<f64>,
    threshold: f64,
) -> ProbeResult<Array1<f64>> {
    Ok(positive_scores(model, features)?.mapv(|s| if s >= threshold { 1.0 } else { 0.0 }))
}

/// Highest class probability per row.
pub fn confidences(model: &dyn PredictiveModel, features: &Array2<f64>) -> ProbeResult<Array1<f64>> {
    if !model.has_probabilities() {
        return Err(TestFault::unsupported("class probabilities"));
    }
    let proba = model.predict_proba(features)?;
    Ok(proba.map_axis(Axis(1), |row| {
        row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }))
}

/// `predict` with a row-count check on the output.
pub fn checked_predict(model: &dyn PredictiveModel, features: &Array2<f64>) -> ProbeResult<Array1<f64>> {
    let predictions = model.predict(features)?;
    if predictions.len() != features.nrows() {
        return Err(TestFault::DimensionMismatch {
            expected: features.nrows(),
            actual: predictions.len(),
        });
    }
    Ok(predictions)
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_epochs() -> usize {
    500
}

/// Binary logistic regression with full-batch gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub bias: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
}

impl LogisticRegression {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self {
            weights,
            bias,
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
        }
    }

    pub fn with_training(mut self, learning_rate: f64, epochs: usize) -> Self {
        self.learning_rate = learning_rate;
        self.epochs = epochs;
        self
    }

    /// Fit from zero-initialised weights. Deterministic for fixed inputs.
    pub fn fit(
        features: &Array2<f64>,
        labels: &Array1<f64>,
        learning_rate: f64,
        epochs: usize,
    ) -> ProbeResult<Self> {
        let n = features.nrows();
        if n == 0 {
            return Err(TestFault::insufficient("cannot fit on an empty dataset"));
        }
        if labels.len() != n {
            return Err(TestFault::DimensionMismatch {
                expected: n,
                actual: labels.len(),
            });
        }

        let mut weights = Array1::<f64>::zeros(features.ncols());
        let mut bias = 0.0;
        for _ in 0..epochs {
            let probs = (features.dot(&weights) + bias).mapv(sigmoid);
            let errors = &probs - labels;
            let grad_w = features.t().dot(&errors) / n as f64;
            let grad_b = errors.sum() / n as f64;
            weights = weights - grad_w * learning_rate;
            bias -= grad_b * learning_rate;
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(TestFault::numerical("logistic regression diverged"));
        }

        Ok(Self {
            weights: weights.to_vec(),
            bias,
            learning_rate,
            epochs,
        })
    }

    fn probabilities(&self, features: &Array2<f64>) -> ProbeResult<Array1<f64>> {
        if features.ncols() != self.weights.len() {
            return Err(TestFault::DimensionMismatch {
                expected: self.weights.len(),
                actual: features.ncols(),
            });
        }
        let weights = Array1::from(self.weights.clone());
        Ok((features.dot(&weights) + self.bias).mapv(sigmoid))
    }
}

impl PredictiveModel for LogisticRegression {
    fn predict(&self, features: &Array2<f64>) -> ProbeResult<Array1<f64>> {
        Ok(self
            .probabilities(features)?
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    fn has_probabilities(&self) -> bool {
        true
    }

    fn predict_proba(&self, features: &Array2<f64>) -> ProbeResult<Array2<f64>> {
        let positive = self.probabilities(features)?;
        let mut proba = Array2::zeros((positive.len(), 2));
        for (i, p) in positive.iter().enumerate() {
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = *p;
        }
        Ok(proba)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        Some(self.weights.iter().map(|w| w.abs()).collect())
    }

    fn supports_retraining(&self) -> bool {
        true
    }

    fn fit_clone(
        &self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
    ) -> ProbeResult<Box<dyn PredictiveModel>> {
        Ok(Box::new(Self::fit(
            features,
            labels,
            self.learning_rate,
            self.epochs,
        )?))
    }

    fn model_name(&self) -> &str {
        "logistic_regression"
    }
}

/// Single-feature rule: predicts 1 when `features[feature] >= cutoff`.
/// Exposes neither probabilities nor retraining.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdRule {
    pub feature: usize,
    pub cutoff: f64,
}

impl ThresholdRule {
    pub fn new(feature: usize, cutoff: f64) -> Self {
        Self { feature, cutoff }
    }
}

impl PredictiveModel for ThresholdRule {
    fn predict(&self, features: &Array2<f64>) -> ProbeResult<Array1<f64>> {
        if self.feature >= features.ncols() {
            return Err(TestFault::DimensionMismatch {
                expected: self.feature + 1,
                actual: features.ncols(),
            });
        }
        Ok(features
            .column(self.feature)
            .mapv(|v| if v >= self.cutoff { 1.0 } else { 0.0 }))
    }

    fn model_name(&self) -> &str {
        "threshold_rule"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_probabilities() {
        let model = LogisticRegression::new(vec![2.0, 0.0], 0.0);
        let x = array![[0.0, 5.0], [3.0, 5.0], [-3.0, 5.0]];

        let proba = model.predict_proba(&x).unwrap();
        assert!((proba[[0, 1]] - 0.5).abs() < 1e-12);
        assert!(proba[[1, 1]] > 0.99);
        assert!((proba[[2, 0]] + proba[[2, 1]] - 1.0).abs() < 1e-12);

        let predictions = model.predict(&x).unwrap();
        assert_eq!(predictions.to_vec(), vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_logistic_fit_separates() {
        let x = array![[-2.0], [-1.0], [-1.5], [1.0], [2.0], [1.5]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let model = LogisticRegression::fit(&x, &y, 0.5, 300).unwrap();
        assert!(model.weights[0] > 0.0);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_fit_clone_leaves_original() {
        let original = LogisticRegression::new(vec![0.0], 0.0);
        let x = array![[-1.0], [1.0]];
        let y = array![0.0, 1.0];
        let refit = original.fit_clone(&x, &y).unwrap();
        assert_eq!(original.weights, vec![0.0]);
        assert_eq!(refit.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_dimension_mismatch() {
        let model = LogisticRegression::new(vec![1.0, 1.0], 0.0);
        let x = array![[1.0]];
        assert!(matches!(
            model.predict(&x),
            Err(TestFault::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_threshold_rule_capabilities() {
        let model = ThresholdRule::new(0, 0.5);
        let x = array![[0.2], [0.7]];
        assert_eq!(model.predict(&x).unwrap().to_vec(), vec![0.0, 1.0]);
        assert!(!model.has_probabilities());
        assert!(!model.supports_retraining());
        assert!(model.feature_importances().is_none());
        assert!(confidences(&model, &x).is_err());
        assert!(model.fit_clone(&x, &array![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_helpers() {
        let model = LogisticRegression::new(vec![1.0], 0.0);
        let x = array![[0.0], [2.0]];
        let scores = positive_scores(&model, &x).unwrap();
        assert!((scores[0] - 0.5).abs() < 1e-12);
        assert_eq!(decisions(&model, &x, 0.6).unwrap().to_vec(), vec![0.0, 1.0]);
        let conf = confidences(&model, &x).unwrap();
        assert!((conf[0] - 0.5).abs() < 1e-12);
        assert!(conf[1] > 0.8);
    }
}
