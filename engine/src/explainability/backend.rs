//! Attribution backends.
//!
//! The Shapley and surrogate backends are compiled in through the `shapley`
//! and `surrogate` features. [`Backends::detect`] picks whatever was linked;
//! the adapter degrades the affected sub-tests when a backend is absent.

use crate::adapter::{ProbeResult, TestFault};
use crate::model::{positive_scores, PredictiveModel};
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Per-instance, per-feature additive attributions.
pub trait AttributionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attribution matrix with one row per instance and one column per feature.
    fn attributions(
        &self,
        model: &dyn PredictiveModel,
        background: &Array2<f64>,
        instances: &Array2<f64>,
        rng: &mut StdRng,
    ) -> ProbeResult<Array2<f64>>;
}

/// Interpretable model fitted around a single prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalExplanation {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// Weighted R² of the surrogate on its perturbation neighbourhood
    pub fidelity: f64,
}

pub trait SurrogateBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn explain(
        &self,
        model: &dyn PredictiveModel,
        background: &Array2<f64>,
        instance: ArrayView1<'_, f64>,
        rng: &mut StdRng,
    ) -> ProbeResult<LocalExplanation>;
}

/// Backends available to an explainability adapter.
#[derive(Default)]
pub struct Backends {
    pub shapley: Option<Box<dyn AttributionBackend>>,
    pub surrogate: Option<Box<dyn SurrogateBackend>>,
}

impl Backends {
    /// Every backend compiled into this build.
    pub fn detect() -> Self {
        Self {
            shapley: shapley_backend(),
            surrogate: surrogate_backend(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if let Some(backend) = &self.shapley {
            names.push(backend.name());
        }
        if let Some(backend) = &self.surrogate {
            names.push(backend.name());
        }
        names
    }
}

#[cfg(feature = "shapley")]
fn shapley_backend() -> Option<Box<dyn AttributionBackend>> {
    Some(Box::new(shapley::SamplingShapley::default()))
}

#[cfg(not(feature = "shapley"))]
fn shapley_backend() -> Option<Box<dyn AttributionBackend>> {
    None
}

#[cfg(feature = "surrogate")]
fn surrogate_backend() -> Option<Box<dyn SurrogateBackend>> {
    Some(Box::new(surrogate::LinearSurrogate::default()))
}

#[cfg(not(feature = "surrogate"))]
fn surrogate_backend() -> Option<Box<dyn SurrogateBackend>> {
    None
}

/// Fail when `instances` and `background` disagree on the feature count.
fn check_width(background: &Array2<f64>, instances: usize) -> ProbeResult<()> {
    if background.ncols() != instances {
        return Err(TestFault::DimensionMismatch {
            expected: background.ncols(),
            actual: instances,
        });
    }
    if background.nrows() == 0 {
        return Err(TestFault::insufficient("background sample is empty"));
    }
    Ok(())
}

#[cfg(feature = "shapley")]
pub mod shapley {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;

    /// Monte Carlo Shapley values: for each sampled feature ordering and
    /// background row, features are switched to the instance's values one
    /// at a time and each switch is credited with the change in output.
    /// Attributions of one instance sum to `f(x) - f(z)` averaged over
    /// the sampled background rows.
    #[derive(Debug, Clone)]
    pub struct SamplingShapley {
        pub permutations: usize,
    }

    impl Default for SamplingShapley {
        fn default() -> Self {
            Self { permutations: 16 }
        }
    }

    impl AttributionBackend for SamplingShapley {
        fn name(&self) -> &'static str {
            "sampling_shapley"
        }

        fn attributions(
            &self,
            model: &dyn PredictiveModel,
            background: &Array2<f64>,
            instances: &Array2<f64>,
            rng: &mut StdRng,
        ) -> ProbeResult<Array2<f64>> {
            let n_features = instances.ncols();
            check_width(background, n_features)?;
            let permutations = self.permutations.max(1);
            let mut result = Array2::zeros((instances.nrows(), n_features));
            let mut order: Vec<usize> = (0..n_features).collect();

            for (i, instance) in instances.outer_iter().enumerate() {
                for _ in 0..permutations {
                    order.shuffle(rng);
                    let base = background.row(rng.gen_range(0..background.nrows()));

                    // Row k has the first k features of `order` switched.
                    let mut walk = Array2::zeros((n_features + 1, n_features));
                    walk.row_mut(0).assign(&base);
                    for (step, &feature) in order.iter().enumerate() {
                        let previous = walk.row(step).to_owned();
                        let mut row = walk.row_mut(step + 1);
                        row.assign(&previous);
                        row[feature] = instance[feature];
                    }

                    let outputs = positive_scores(model, &walk)?;
                    for (step, &feature) in order.iter().enumerate() {
                        result[[i, feature]] += outputs[step + 1] - outputs[step];
                    }
                }
            }

            result /= permutations as f64;
            Ok(result)
        }
    }
}

#[cfg(feature = "surrogate")]
pub mod surrogate {
    use super::*;
    use crate::stats::{column_std, solve_linear_system};
    use rand_distr::{Distribution, StandardNormal};

    /// LIME-style local linear surrogate: Gaussian perturbations around the
    /// instance, weighted by an exponential kernel on standardised distance,
    /// fitted with weighted ridge regression.
    #[derive(Debug, Clone)]
    pub struct LinearSurrogate {
        pub num_samples: usize,
        /// Kernel width as a multiple of `sqrt(n_features)`
        pub kernel_width: f64,
        pub ridge: f64,
    }

    impl Default for LinearSurrogate {
        fn default() -> Self {
            Self {
                num_samples: 500,
                kernel_width: 0.75,
                ridge: 1e-3,
            }
        }
    }

    impl SurrogateBackend for LinearSurrogate {
        fn name(&self) -> &'static str {
            "linear_surrogate"
        }

        fn explain(
            &self,
            model: &dyn PredictiveModel,
            background: &Array2<f64>,
            instance: ArrayView1<'_, f64>,
            rng: &mut StdRng,
        ) -> ProbeResult<LocalExplanation> {
            let n_features = instance.len();
            check_width(background, n_features)?;
            let scales = column_std(background);
            let samples = self.num_samples.max(n_features + 2);

            // First row is the instance itself.
            let mut neighbourhood = Array2::zeros((samples, n_features));
            let mut distances = Array1::zeros(samples);
            neighbourhood.row_mut(0).assign(&instance);
            for s in 1..samples {
                let mut squared = 0.0;
                for j in 0..n_features {
                    let z: f64 = StandardNormal.sample(rng);
                    neighbourhood[[s, j]] = instance[j] + z * scales[j];
                    if scales[j] > 0.0 {
                        squared += z * z;
                    }
                }
                distances[s] = squared.sqrt();
            }

            let targets = positive_scores(model, &neighbourhood)?;
            let width = self.kernel_width * (n_features as f64).sqrt();
            let weights = distances.mapv(|d: f64| (-(d * d) / (width * width)).exp());

            // Design matrix with a leading intercept column, in standardised
            // units so coefficients are comparable across features.
            let dim = n_features + 1;
            let mut xtwx = Array2::<f64>::zeros((dim, dim));
            let mut xtwy = Array1::<f64>::zeros(dim);
            let mut design = vec![0.0; dim];
            for s in 0..samples {
                design[0] = 1.0;
                for j in 0..n_features {
                    design[j + 1] = if scales[j] > 0.0 {
                        (neighbourhood[[s, j]] - instance[j]) / scales[j]
                    } else {
                        0.0
                    };
                }
                let w = weights[s];
                for a in 0..dim {
                    xtwy[a] += w * design[a] * targets[s];
                    for b in 0..dim {
                        xtwx[[a, b]] += w * design[a] * design[b];
                    }
                }
            }
            for d in 1..dim {
                xtwx[[d, d]] += self.ridge;
            }
            let beta = solve_linear_system(xtwx, xtwy)?;

            let weight_sum = weights.sum();
            let weighted_mean = (&weights * &targets).sum() / weight_sum;
            let mut residual = 0.0;
            let mut total = 0.0;
            for s in 0..samples {
                let mut fitted = beta[0];
                for j in 0..n_features {
                    if scales[j] > 0.0 {
                        fitted += beta[j + 1] * (neighbourhood[[s, j]] - instance[j]) / scales[j];
                    }
                }
                residual += weights[s] * (targets[s] - fitted).powi(2);
                total += weights[s] * (targets[s] - weighted_mean).powi(2);
            }
            let fidelity = if total < 1e-12 {
                1.0
            } else {
                (1.0 - residual / total).clamp(0.0, 1.0)
            };

            Ok(LocalExplanation {
                intercept: beta[0],
                coefficients: beta.iter().skip(1).copied().collect(),
                fidelity,
            })
        }
    }
}
