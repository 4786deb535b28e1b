//! Priority vectors from comparison matrices (geometric-mean method).
//!
//! Each row's weight is the geometric mean of its cells; weights are then
//! normalized to sum to 1. The row means are taken in log space so large
//! matrices of large ratios cannot overflow the product.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::matrix::ComparisonMatrix;

/// Saaty's random consistency index for matrices of size 1..=15.
const RANDOM_INDEX: [f64; 15] = [
    0.0, 0.0, 0.58, 0.90, 1.12, 1.24, 1.32, 1.41, 1.45, 1.49, 1.51, 1.48, 1.56, 1.57, 1.59,
];

/// Conventional acceptance threshold for the consistency ratio.
pub const ACCEPTABLE_CONSISTENCY_RATIO: f64 = 0.1;

/// Priorities plus the cells that had to be replaced before solving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritySolution {
    pub priorities: Vec<f64>,
    pub repaired_cells: Vec<(usize, usize)>,
}

/// Compute the normalized priority vector of `matrix`.
pub fn solve_priority_vector(matrix: &ComparisonMatrix) -> Vec<f64> {
    solve_priorities(matrix).priorities
}

/// Compute priorities, reporting any repaired cells.
///
/// Non-finite or non-positive cells are treated as 1 on a private copy; the
/// caller's matrix is left untouched.
pub fn solve_priorities(matrix: &ComparisonMatrix) -> PrioritySolution {
    let (values, repaired_cells) = repaired_copy(matrix);
    let n = values.nrows();
    if n == 0 {
        return PrioritySolution {
            priorities: Vec::new(),
            repaired_cells,
        };
    }

    let ln_means: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| values[(i, j)].ln()).sum::<f64>() / n as f64)
        .collect();
    let max_ln = ln_means
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let mut priorities: Vec<f64> = ln_means.iter().map(|m| (m - max_ln).exp()).collect();
    let z: f64 = priorities.iter().sum();
    for p in &mut priorities {
        *p /= z;
    }

    PrioritySolution {
        priorities,
        repaired_cells,
    }
}

fn repaired_copy(matrix: &ComparisonMatrix) -> (DMatrix<f64>, Vec<(usize, usize)>) {
    let mut values = matrix.values().clone();
    let mut repaired = Vec::new();
    let n = values.nrows();
    for i in 0..n {
        for j in 0..n {
            let v = values[(i, j)];
            if !v.is_finite() || v <= 0.0 {
                warn!(row = i, col = j, value = v, "invalid matrix cell, treating as 1");
                values[(i, j)] = 1.0;
                repaired.push((i, j));
            }
        }
    }
    (values, repaired)
}

/// Saaty consistency diagnostics for one matrix and its priorities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub lambda_max: f64,
    pub consistency_index: f64,
    /// `None` when the random index is zero (n <= 2) or unknown (n > 15).
    pub consistency_ratio: Option<f64>,
}

impl ConsistencyReport {
    pub fn is_acceptable(&self) -> bool {
        self.consistency_ratio
            .map_or(true, |cr| cr <= ACCEPTABLE_CONSISTENCY_RATIO)
    }
}

/// Estimate lambda-max, CI and CR for `matrix` given its `priorities`.
pub fn consistency(matrix: &ComparisonMatrix, priorities: &[f64]) -> ConsistencyReport {
    let (values, _) = repaired_copy(matrix);
    let n = values.nrows();
    if n < 2 || priorities.len() != n {
        return ConsistencyReport {
            lambda_max: n as f64,
            consistency_index: 0.0,
            consistency_ratio: None,
        };
    }

    let w = DVector::from_column_slice(priorities);
    let aw = &values * &w;
    let mut ratios = 0.0;
    let mut counted = 0usize;
    for i in 0..n {
        if w[i] > 0.0 {
            ratios += aw[i] / w[i];
            counted += 1;
        }
    }
    let lambda_max = if counted > 0 {
        ratios / counted as f64
    } else {
        n as f64
    };
    let consistency_index = ((lambda_max - n as f64) / (n as f64 - 1.0)).max(0.0);
    let consistency_ratio = RANDOM_INDEX
        .get(n - 1)
        .copied()
        .filter(|ri| *ri > 0.0)
        .map(|ri| consistency_index / ri);

    ConsistencyReport {
        lambda_max,
        consistency_index,
        consistency_ratio,
    }
}
