//! Small numerical helpers shared by the adapters.

use crate::adapter::{ProbeResult, TestFault};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};

const EPSILON: f64 = 1e-12;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Pearson correlation; `None` when either side is constant or lengths differ.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a);
    let mb = mean(b);
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va < EPSILON || vb < EPSILON {
        return None;
    }
    Some(cov / (va.sqrt() * vb.sqrt()))
}

/// Shannon entropy (nats) of a probability vector.
pub fn entropy(probabilities: ArrayView1<'_, f64>) -> f64 {
    probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}

/// Fraction of positions where the two prediction vectors agree.
pub fn agreement(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    if a.is_empty() {
        return 1.0;
    }
    let same = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| (*x - *y).abs() < 1e-9)
        .count();
    same as f64 / a.len() as f64
}

/// Population standard deviation of every column.
pub fn column_std(features: &Array2<f64>) -> Array1<f64> {
    if features.nrows() == 0 {
        return Array1::zeros(features.ncols());
    }
    features.std_axis(Axis(0), 0.0)
}

/// Copy of `features` with zero-mean Gaussian noise added, the noise scale
/// of column `j` being `level * scales[j]`.
pub fn with_gaussian_noise(
    features: &Array2<f64>,
    scales: &Array1<f64>,
    level: f64,
    rng: &mut StdRng,
) -> ProbeResult<Array2<f64>> {
    let mut noisy = features.clone();
    if level == 0.0 {
        return Ok(noisy);
    }
    for (j, mut column) in noisy.axis_iter_mut(Axis(1)).enumerate() {
        let sigma = level * scales[j];
        if sigma <= 0.0 {
            continue;
        }
        let normal = Normal::new(0.0, sigma).map_err(|e| TestFault::numerical(e.to_string()))?;
        for value in column.iter_mut() {
            *value += normal.sample(rng);
        }
    }
    Ok(noisy)
}

/// Copy of `features` with uniform noise in `[-level * scale, level * scale]`.
pub fn with_uniform_noise(
    features: &Array2<f64>,
    scales: &Array1<f64>,
    level: f64,
    rng: &mut StdRng,
) -> Array2<f64> {
    let mut noisy = features.clone();
    for (j, mut column) in noisy.axis_iter_mut(Axis(1)).enumerate() {
        let half_width = level * scales[j];
        if half_width <= 0.0 {
            continue;
        }
        for value in column.iter_mut() {
            *value += rng.gen_range(-half_width..=half_width);
        }
    }
    noisy
}

/// Copy of `features` with column `column` permuted across rows.
pub fn shuffle_column(features: &Array2<f64>, column: usize, rng: &mut StdRng) -> Array2<f64> {
    let mut shuffled = features.clone();
    let mut values = features.column(column).to_vec();
    values.shuffle(rng);
    for (row, value) in values.into_iter().enumerate() {
        shuffled[[row, column]] = value;
    }
    shuffled
}

/// Ordinary least squares `y ≈ intercept + slope * x`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> (f64, f64) {
    let mx = mean(x);
    let my = mean(y);
    let vx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    if vx < EPSILON {
        return (my, 0.0);
    }
    let cov: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let slope = cov / vx;
    (my - slope * mx, slope)
}

/// Second differences of a sampled curve.
pub fn second_differences(curve: &[f64]) -> Vec<f64> {
    curve
        .windows(3)
        .map(|w| w[2] - 2.0 * w[1] + w[0])
        .collect()
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting.
pub fn solve_linear_system(mut a: Array2<f64>, mut b: Array1<f64>) -> ProbeResult<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(TestFault::DimensionMismatch {
            expected: n,
            actual: b.len(),
        });
    }
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < EPSILON {
            return Err(TestFault::numerical("singular system"));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

/// Indices of `values` sorted by descending value.
pub fn rank_descending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order
}
