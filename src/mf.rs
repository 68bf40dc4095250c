//! Shared plumbing for the matrix-factorization trainers: hyperparameters,
//! the factor store, and the RR1 coordinate-descent solver used by the
//! fast-ALS family.

use std::cell::RefCell;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::index::StableSet;
use crate::matrix::{compute_g, dot, gaussian_matrix, norm2, RAND_SEED};
use crate::preferences::PreferenceData;

const INIT_MEAN: f32 = 0.0;
const INIT_STD: f32 = 0.1;

// ─── Hyperparameters ─────────────────────────────────────────────────────────

/// Learning parameters shared by all MF trainers. Defaults follow the usual
/// implicit-feedback setting: k=10, 15 iterations, λ=0.015, α=1.
#[derive(Debug, Clone)]
pub struct MfHyperParams {
    pub(crate) factors: usize,
    pub(crate) iterations: usize,
    pub(crate) lambda: f32,
    pub(crate) alpha: f32,
}

impl Default for MfHyperParams {
    fn default() -> Self {
        Self { factors: 10, iterations: 15, lambda: 0.015, alpha: 1.0 }
    }
}

impl MfHyperParams {
    pub fn factors(&self) -> usize {
        self.factors
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn lambda(&self) -> f32 {
        self.lambda
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_factors(&mut self, factors: usize) -> Result<()> {
        if factors == 0 {
            return Err(Error::Config("the number of factors must be at least 1".into()));
        }
        self.factors = factors;
        Ok(())
    }

    pub fn set_iterations(&mut self, iterations: usize) -> Result<()> {
        self.iterations = iterations;
        Ok(())
    }

    pub fn set_lambda(&mut self, lambda: f32) -> Result<()> {
        if !(lambda >= 0.0 && lambda.is_finite()) {
            return Err(Error::Config(format!("lambda must be finite and >= 0, got {lambda}")));
        }
        self.lambda = lambda;
        Ok(())
    }

    pub fn set_alpha(&mut self, alpha: f32) -> Result<()> {
        if !(alpha >= 0.0 && alpha.is_finite()) {
            return Err(Error::Config(format!("alpha must be finite and >= 0, got {alpha}")));
        }
        self.alpha = alpha;
        Ok(())
    }

    /// The RR1 trainers encode positives with target `(1+α)/α`, which is
    /// undefined at α = 0.
    pub(crate) fn require_positive_alpha(&self) -> Result<()> {
        if self.alpha <= 0.0 {
            return Err(Error::Config("fast ALS requires alpha > 0".into()));
        }
        Ok(())
    }
}

/// Validates a cross-domain regularization weight.
pub(crate) fn check_lambda_cross(lambda_cross: f32) -> Result<()> {
    if !(lambda_cross >= 0.0 && lambda_cross.is_finite()) {
        return Err(Error::Config(format!(
            "lambda_cross must be finite and >= 0, got {lambda_cross}"
        )));
    }
    Ok(())
}

// ─── Factor store ────────────────────────────────────────────────────────────

/// Dense row-major user and item factor matrices.
///
/// Rows are indexed by the dense ids of the training data; both matrices are
/// allocated at `init` and mutated row-wise by the ALS phases, never resized.
#[derive(Debug, Default)]
pub struct FactorModel {
    user_factors: Vec<f32>,
    item_factors: Vec<f32>,
    factors: usize,
}

impl FactorModel {
    /// Allocates and Gaussian-initializes both matrices from the global
    /// seed; user and item matrices draw from consecutive seeds.
    pub(crate) fn init(num_users: usize, num_items: usize, factors: usize) -> Self {
        Self {
            user_factors: gaussian_matrix(num_users, factors, INIT_MEAN, INIT_STD, RAND_SEED),
            item_factors: gaussian_matrix(
                num_items,
                factors,
                INIT_MEAN,
                INIT_STD,
                RAND_SEED.wrapping_add(1),
            ),
            factors,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.factors > 0
    }

    pub fn num_user_rows(&self) -> usize {
        if self.factors == 0 { 0 } else { self.user_factors.len() / self.factors }
    }

    pub fn num_item_rows(&self) -> usize {
        if self.factors == 0 { 0 } else { self.item_factors.len() / self.factors }
    }

    pub fn user_row(&self, user: u32) -> &[f32] {
        let k = self.factors;
        &self.user_factors[user as usize * k..(user as usize + 1) * k]
    }

    pub fn item_row(&self, item: u32) -> &[f32] {
        let k = self.factors;
        &self.item_factors[item as usize * k..(item as usize + 1) * k]
    }

    pub fn user_factors(&self) -> &[f32] {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &[f32] {
        &self.item_factors
    }

    pub(crate) fn user_phase_split(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.user_factors, &self.item_factors)
    }

    pub(crate) fn item_phase_split(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.item_factors, &self.user_factors)
    }

    /// Dot product of the two factor rows, or NaN before training or for
    /// ids outside the trained ranges.
    pub fn predict_ids(&self, user: u32, item: u32) -> f32 {
        if !self.is_trained()
            || user as usize >= self.num_user_rows()
            || item as usize >= self.num_item_rows()
        {
            return f32::NAN;
        }
        dot(self.user_row(user), self.item_row(item))
    }

    /// Resolves the opaque identifiers and predicts; NaN when either is
    /// unknown to the training data.
    pub fn predict_score(&self, data: &PreferenceData, user: &str, item: &str) -> f32 {
        match (data.user_id(user), data.item_id(item)) {
            (Some(u), Some(i)) => self.predict_ids(u, i),
            _ => f32::NAN,
        }
    }
}

// ─── RR1 solver ──────────────────────────────────────────────────────────────

/// Per-worker scratch for the RR1 training set. `N` varies per row, so the
/// vectors grow to the high-water mark of the worker and are reused.
#[derive(Default)]
pub(crate) struct Rr1Scratch {
    x: Vec<f32>,
    y: Vec<f32>,
    c: Vec<f32>,
    e: Vec<f32>,
}

thread_local! {
    pub(crate) static SCRATCH: RefCell<Rr1Scratch> = RefCell::new(Rr1Scratch::default());
}

impl Rr1Scratch {
    pub(crate) fn reset(&mut self) {
        self.x.clear();
        self.y.clear();
        self.c.clear();
    }

    /// Appends one weighted training point.
    pub(crate) fn push(&mut self, x: &[f32], y: f32, c: f32) {
        self.x.extend_from_slice(x);
        self.y.push(y);
        self.c.push(c);
    }

    /// Appends the k synthetic points encoding `QᵀQ + λI` (rows of G, zero
    /// target, unit weight).
    pub(crate) fn push_g(&mut self, g: &[f32], k: usize) {
        for j in 0..k {
            self.push(&g[j * k..(j + 1) * k], 0.0, 1.0);
        }
    }

    /// Appends one point per positive interaction. The `(1+α)/α` target with
    /// weight α is the residual-cancellation encoding of the confidence
    /// model from Pilászy et al.
    pub(crate) fn push_positives(&mut self, prefs: &StableSet<u32>, q: &[f32], k: usize, alpha: f32) {
        let target = (1.0 + alpha) / alpha;
        for &row in prefs {
            self.push(&q[row as usize * k..(row as usize + 1) * k], target, alpha);
        }
    }

    pub(crate) fn solve(&mut self, w: &mut [f32], lambda: f32, pull: Option<CentroidPull<'_>>) {
        let Rr1Scratch { x, y, c, e } = self;
        rr1_cycle(w, x, y, c, e, lambda, pull);
    }
}

/// Centroid-pull extension of the RR1 coordinate update: the numerator
/// gains `weight·num[k']` and the denominator `weight·den`. With no pull
/// the update degenerates to the plain form.
pub(crate) struct CentroidPull<'a> {
    pub num: &'a [f32],
    pub den: f32,
    pub weight: f32,
}

/// One full coordinate-descent cycle of ridge regression over the weighted
/// training set, with running residuals. `w` is updated in place and serves
/// as the warm start.
fn rr1_cycle(
    w: &mut [f32],
    x: &[f32],
    y: &[f32],
    c: &[f32],
    e: &mut Vec<f32>,
    lambda: f32,
    pull: Option<CentroidPull<'_>>,
) {
    let k = w.len();
    let n = y.len();
    debug_assert_eq!(x.len(), n * k);

    e.clear();
    e.resize(n, 0.0);
    for j in 0..n {
        e[j] = y[j] - dot(w, &x[j * k..(j + 1) * k]);
    }

    let (num, den, weight) = match &pull {
        Some(p) => (p.num, p.den, p.weight),
        None => (&[][..], 0.0, 0.0),
    };

    for coord in 0..k {
        // Remove this coordinate's contribution from the residuals.
        for j in 0..n {
            e[j] += w[coord] * x[j * k + coord];
        }

        let mut a = 0.0f32;
        let mut d = 0.0f32;
        for j in 0..n {
            let xv = x[j * k + coord];
            a += c[j] * xv * xv;
            d += c[j] * xv * e[j];
        }

        let pull_num = if num.is_empty() { 0.0 } else { weight * num[coord] };
        w[coord] = (d + pull_num) / (lambda + a + weight * den);

        // Reinsert it.
        for j in 0..n {
            e[j] -= w[coord] * x[j * k + coord];
        }
    }
}

pub(crate) fn check_row_finite(w: &[f32], row: usize) -> Result<()> {
    if w.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::Numerical(format!(
            "non-finite factors in row {row}; lambda = 0 with an empty interaction set \
             leaves the system singular"
        )))
    }
}

/// One plain RR1 half-iteration: optimizes every row of `p` with `q` fixed.
///
/// `prefs` yields the positive interactions of a `p` row as ids into `q`;
/// passing the user→items adjacency optimizes user factors and vice versa.
pub(crate) fn rr1_phase<'a>(
    p: &mut [f32],
    q: &[f32],
    q_rows: usize,
    k: usize,
    lambda: f32,
    alpha: f32,
    prefs: impl Fn(u32) -> &'a StableSet<u32> + Sync,
) -> Result<()> {
    let g = compute_g(q, q_rows, k, lambda)?;

    p.par_chunks_mut(k).enumerate().try_for_each(|(row, w)| {
        SCRATCH.with(|cell| {
            let scratch = &mut *cell.borrow_mut();
            scratch.reset();
            scratch.push_g(&g, k);
            scratch.push_positives(prefs(row as u32), q, k, alpha);
            scratch.solve(w, lambda, None);
        });
        check_row_finite(w, row)
    })
}

// ─── Loss ────────────────────────────────────────────────────────────────────

/// The Hu–Koren–Volinsky objective over all (user, item) pairs plus the
/// ridge term. Θ(|U|·|I|·k) — intended for debugging and tests.
pub(crate) fn implicit_loss(
    model: &FactorModel,
    data: &PreferenceData,
    lambda: f32,
    alpha: f32,
) -> f64 {
    if !model.is_trained() {
        return f64::NAN;
    }
    let num_items = data.num_items() as u32;
    let loss: f64 = (0..data.num_users() as u32)
        .into_par_iter()
        .map(|u| {
            let user_row = model.user_row(u);
            let mut acc = 0.0f64;
            for i in 0..num_items {
                let p = if data.exists_preference_ids(u, i) { 1.0f32 } else { 0.0 };
                let c = 1.0 + alpha * p;
                let err = p - dot(user_row, model.item_row(i));
                acc += f64::from(c * err * err);
            }
            acc
        })
        .sum();

    if lambda > 0.0 {
        loss + f64::from(lambda) * f64::from(norm2(model.user_factors()) + norm2(model.item_factors()))
    } else {
        loss
    }
}
