//! Dense numerical primitives shared by the trainers. All of them operate
//! on contiguous row-major storage and none allocate inside hot loops.

use faer::{linalg::matmul::matmul, Accum, Par};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::{Error, Result};

/// Global seed for factor initialization. Part of the training contract:
/// two runs over identical inputs produce identical factors.
pub const RAND_SEED: u64 = 20141207;

#[inline(always)]
pub fn dot(x: &[f32], y: &[f32]) -> f32 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// `y += alpha * x`, in place.
#[inline(always)]
pub fn axpy(alpha: f32, x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// Squared L2 norm; on a flattened matrix this is the Frobenius norm squared.
#[inline(always)]
pub fn norm2(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum()
}

/// Squared euclidean distance between two vectors.
#[inline(always)]
pub fn distance2(v: &[f32], w: &[f32]) -> f32 {
    debug_assert_eq!(v.len(), w.len());
    v.iter().zip(w).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Fills a `rows x cols` row-major matrix with independent N(mean, std²)
/// draws from the given seed.
pub fn gaussian_matrix(rows: usize, cols: usize, mean: f32, std: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(mean, std).expect("std must be finite and non-negative");
    (0..rows * cols).map(|_| normal.sample(&mut rng)).collect()
}

/// Computes the `k x k` Gram product `AᵀA` of a row-major `n x k` matrix.
///
/// faer's matmul does the heavy lifting with SIMD + rayon.
pub fn gramian(factors: &[f32], n: usize, k: usize) -> Vec<f32> {
    debug_assert_eq!(factors.len(), n * k);
    let a = faer::MatRef::from_row_major_slice(factors, n, k);

    let mut g = faer::Mat::<f32>::zeros(k, k);
    matmul(g.as_mut(), Accum::Replace, a.transpose(), a, 1.0f32, Par::rayon(0));

    let mut out = vec![0.0f32; k * k];
    for i in 0..k {
        for j in 0..k {
            out[i * k + j] = g[(i, j)];
        }
    }
    out
}

/// Gram product `AᵀA` restricted to the rows accepted by the selector.
///
/// Only the upper triangle is computed; the mirror entry is a copy, never an
/// independent accumulation.
pub fn gramian_masked(
    factors: &[f32],
    n: usize,
    k: usize,
    row_selector: impl Fn(usize) -> bool,
) -> Vec<f32> {
    debug_assert_eq!(factors.len(), n * k);
    let mut out = vec![0.0f32; k * k];
    for i in 0..k {
        for j in i..k {
            let mut s = 0.0f32;
            for row in 0..n {
                if row_selector(row) {
                    s += factors[row * k + i] * factors[row * k + j];
                }
            }
            out[i * k + j] = s;
            out[j * k + i] = s;
        }
    }
    out
}

/// Computes the `k x k` matrix G with `GᵀG = QᵀQ + λI`.
///
/// The spectral decomposition of the symmetric positive-definite system
/// matrix gives `A0 = VΛVᵀ`; row `j` of G is `√λ_j · V[:,j]`. These k rows
/// act as synthetic zero-target training points that encode the fixed
/// all-negative block plus the ridge term in the RR1 solvers.
pub fn compute_g(factors: &[f32], n: usize, k: usize, lambda: f32) -> Result<Vec<f32>> {
    let g0 = gramian(factors, n, k);
    let a0 = faer::Mat::from_fn(k, k, |i, j| g0[i * k + j] + if i == j { lambda } else { 0.0 });

    let eig = a0
        .self_adjoint_eigen(faer::Side::Lower)
        .map_err(|_| Error::Numerical("eigendecomposition of the system matrix failed".into()))?;
    let vectors = eig.U();
    let values = eig.S().column_vector();

    let mut g = vec![0.0f32; k * k];
    for j in 0..k {
        // Eigenvalues are >= lambda in exact arithmetic; clamp roundoff.
        let scale = values[j].max(0.0).sqrt();
        for i in 0..k {
            g[j * k + i] = scale * vectors[(i, j)];
        }
    }
    Ok(g)
}
