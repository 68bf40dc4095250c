//! ALS matrix factorization for implicit feedback (Hu, Koren, Volinsky,
//! ICDM 2008). Unary/binary feedback only; each observation carries the
//! confidence `c = 1 + alpha`, every unobserved pair the confidence 1.

use std::time::Instant;

use faer::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::index::StableSet;
use crate::matrix::gramian;
use crate::mf::{check_row_finite, implicit_loss, FactorModel, MfHyperParams};
use crate::preferences::PreferenceData;
use crate::recommender::Recommender;

/// Baseline implicit-feedback ALS trainer; each row's normal equations are
/// solved exactly by dense LU.
pub struct ImplicitMf<'a> {
    train: &'a PreferenceData,
    params: MfHyperParams,
    model: FactorModel,
}

impl<'a> ImplicitMf<'a> {
    pub fn new(train: &'a PreferenceData) -> Self {
        Self { train, params: MfHyperParams::default(), model: FactorModel::default() }
    }

    pub fn params(&self) -> &MfHyperParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut MfHyperParams {
        &mut self.params
    }

    pub fn model(&self) -> &FactorModel {
        &self.model
    }

    /// Runs the configured number of ALS iterations, replacing any
    /// previously trained factors.
    pub fn train(&mut self) -> Result<()> {
        let k = self.params.factors();
        self.model = FactorModel::init(self.train.num_users(), self.train.num_items(), k);

        for iteration in 0..self.params.iterations() {
            let start = Instant::now();
            self.user_phase()?;
            self.item_phase()?;

            if tracing::enabled!(tracing::Level::DEBUG) {
                debug!(
                    iteration = iteration + 1,
                    elapsed = ?start.elapsed(),
                    loss = self.compute_loss(),
                    "als iteration"
                );
            } else {
                info!(iteration = iteration + 1, elapsed = ?start.elapsed(), "als iteration");
            }
        }
        Ok(())
    }

    fn user_phase(&mut self) -> Result<()> {
        let train = self.train;
        let k = self.params.factors();
        let (lambda, alpha) = (self.params.lambda(), self.params.alpha());
        let (users, items) = self.model.user_phase_split();
        lu_phase(users, items, train.num_items(), k, lambda, alpha, |u| train.user_items(u))
    }

    fn item_phase(&mut self) -> Result<()> {
        let train = self.train;
        let k = self.params.factors();
        let (lambda, alpha) = (self.params.lambda(), self.params.alpha());
        let (items, users) = self.model.item_phase_split();
        lu_phase(items, users, train.num_users(), k, lambda, alpha, |i| train.item_users(i))
    }

    /// The training objective over all (user, item) pairs plus the ridge
    /// term. Iterates the full cross product; expensive.
    pub fn compute_loss(&self) -> f64 {
        implicit_loss(&self.model, self.train, self.params.lambda(), self.params.alpha())
    }
}

impl Recommender for ImplicitMf<'_> {
    fn train_data(&self) -> &PreferenceData {
        self.train
    }

    fn predict_score(&self, user: &str, item: &str) -> f32 {
        self.model.predict_score(self.train, user, item)
    }
}

/// Optimizes every row of `p` with `q` fixed by solving
/// `(QᵀQ + α·Σ q_i q_iᵀ + λI) w = (1+α)·Σ q_i` per row.
fn lu_phase<'a>(
    p: &mut [f32],
    q: &[f32],
    q_rows: usize,
    k: usize,
    lambda: f32,
    alpha: f32,
    prefs: impl Fn(u32) -> &'a StableSet<u32> + Sync,
) -> Result<()> {
    let g0 = gramian(q, q_rows, k);

    p.par_chunks_mut(k).enumerate().try_for_each(|(row, w)| {
        solve_row(w, q, k, &g0, lambda, alpha, prefs(row as u32), row)
    })
}

fn solve_row(
    w: &mut [f32],
    q: &[f32],
    k: usize,
    g0: &[f32],
    lambda: f32,
    alpha: f32,
    prefs: &StableSet<u32>,
    row: usize,
) -> Result<()> {
    // A = QᵀQ + α·Σ q_i q_iᵀ + λI. Only positives contribute to the sparse
    // part because c - 1 = 0 for unobserved pairs. Upper triangle computed,
    // mirrored.
    let mut a = faer::Mat::<f32>::zeros(k, k);
    for k1 in 0..k {
        for k2 in k1..k {
            let mut s = 0.0f32;
            for &i in prefs {
                s += q[i as usize * k + k2] * q[i as usize * k + k1];
            }
            let mut value = g0[k1 * k + k2] + alpha * s;
            if k1 == k2 {
                value += lambda;
            }
            a[(k1, k2)] = value;
            a[(k2, k1)] = value;
        }
    }

    // b = QᵀC p = (1+α)·Σ q_i.
    let mut b = faer::Mat::<f32>::zeros(k, 1);
    for coord in 0..k {
        let mut s = 0.0f32;
        for &i in prefs {
            s += q[i as usize * k + coord];
        }
        b[(coord, 0)] = s * (1.0 + alpha);
    }

    let solution = a.partial_piv_lu().solve(b.as_ref());
    for coord in 0..k {
        w[coord] = solution[(coord, 0)];
    }
    check_row_finite(w, row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_positive_pair_gets_a_positive_score() {
        let data = PreferenceData::from_pairs([("u1", "i1")]);
        let mut mf = ImplicitMf::new(&data);
        mf.params_mut().set_factors(2).unwrap();
        mf.params_mut().set_iterations(5).unwrap();
        mf.train().unwrap();

        assert!(mf.predict_score("u1", "i1") > 0.0);
        assert!(mf.predict_score("u1", "unseen-item").is_nan());
        assert!(mf.predict_score("unseen-user", "i1").is_nan());
    }

    #[test]
    fn factor_shapes_match_the_id_space() {
        let data = PreferenceData::from_pairs([("u1", "i1"), ("u2", "i2"), ("u3", "i1")]);
        let mut mf = ImplicitMf::new(&data);
        mf.params_mut().set_factors(3).unwrap();
        mf.params_mut().set_iterations(1).unwrap();
        mf.train().unwrap();

        assert_eq!(mf.model().num_user_rows(), data.num_users());
        assert_eq!(mf.model().num_item_rows(), data.num_items());
    }

    #[test]
    fn predictions_equal_the_factor_dot_product() {
        let data = PreferenceData::from_pairs([("u1", "i1"), ("u1", "i2"), ("u2", "i2")]);
        let mut mf = ImplicitMf::new(&data);
        mf.params_mut().set_factors(2).unwrap();
        mf.params_mut().set_iterations(3).unwrap();
        mf.train().unwrap();

        let u = data.user_id("u1").unwrap();
        let i = data.item_id("i2").unwrap();
        let expected = crate::matrix::dot(mf.model().user_row(u), mf.model().item_row(i));
        assert_eq!(mf.predict_score("u1", "i2"), expected);
    }

    fn synthetic_20x20() -> PreferenceData {
        let mut pairs = Vec::new();
        for u in 0..20usize {
            for step in [1usize, 3, 7] {
                pairs.push((format!("user{u}"), format!("item{}", (u * step + step) % 20)));
            }
        }
        PreferenceData::from_pairs(pairs.iter().map(|(u, i)| (u.as_str(), i.as_str())))
    }

    #[test]
    fn loss_is_non_increasing_over_iterations() {
        let data = synthetic_20x20();
        // Deterministic init means training for n iterations reproduces the
        // state after n iterations of a longer run.
        let mut losses = Vec::new();
        for iterations in 1..=5 {
            let mut mf = ImplicitMf::new(&data);
            mf.params_mut().set_factors(4).unwrap();
            mf.params_mut().set_iterations(iterations).unwrap();
            mf.train().unwrap();
            losses.push(mf.compute_loss());
        }
        for pair in losses.windows(2) {
            assert!(
                pair[1] <= pair[0] * 1.001,
                "loss increased: {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn training_is_deterministic_for_identical_inputs() {
        let data = synthetic_20x20();
        let run = || {
            let mut mf = ImplicitMf::new(&data);
            mf.params_mut().set_factors(4).unwrap();
            mf.params_mut().set_iterations(3).unwrap();
            mf.train().unwrap();
            (mf.model().user_factors().to_vec(), mf.model().item_factors().to_vec())
        };
        assert_eq!(run(), run());
    }
}
