//! Cross-domain similarity-coupled MF: fast ALS where every item update
//! additionally regresses onto the external similarity scores against the
//! opposite-domain item factors.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::matrix::{compute_g, dot};
use crate::mf::{
    check_lambda_cross, check_row_finite, implicit_loss, rr1_phase, FactorModel, MfHyperParams,
    SCRATCH,
};
use crate::partition::DomainPartition;
use crate::preferences::PreferenceData;
use crate::recommender::Recommender;
use crate::similarity::Similarity;

/// Fast-ALS trainer with the pairwise similarity coupling
/// `λ_cross · Σ_{s,t} (sim(s,t) − V[s]ᵀV[t])²` over source × target items.
///
/// The user phase is plain fast ALS; the item phase updates all source
/// items first and then all target items, each with one extra RR1 training
/// point per opposite-domain item.
pub struct SimMf<'a, S> {
    train: &'a PreferenceData,
    sim: S,
    partition: DomainPartition,
    params: MfHyperParams,
    lambda_cross: f32,
    model: FactorModel,
}

impl<'a, S: Similarity> SimMf<'a, S> {
    /// Creates the trainer; source items are the training items that are not
    /// in `target_items`.
    pub fn new(
        train: &'a PreferenceData,
        sim: S,
        target_items: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            train,
            sim,
            partition: DomainPartition::from_target_items(train, target_items),
            params: MfHyperParams::default(),
            lambda_cross: 0.015,
            model: FactorModel::default(),
        }
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

    pub fn partition(&self) -> &DomainPartition {
        &self.partition
    }

    pub fn lambda_cross(&self) -> f32 {
        self.lambda_cross
    }

    pub fn set_lambda_cross(&mut self, lambda_cross: f32) -> Result<()> {
        check_lambda_cross(lambda_cross)?;
        self.lambda_cross = lambda_cross;
        Ok(())
    }

    pub fn train(&mut self) -> Result<()> {
        self.params.require_positive_alpha()?;
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
                    "sim-mf iteration"
                );
            } else {
                info!(iteration = iteration + 1, elapsed = ?start.elapsed(), "sim-mf iteration");
            }
        }
        Ok(())
    }

    fn user_phase(&mut self) -> Result<()> {
        let train = self.train;
        let k = self.params.factors();
        let (lambda, alpha) = (self.params.lambda(), self.params.alpha());
        let (users, items) = self.model.user_phase_split();
        rr1_phase(users, items, train.num_items(), k, lambda, alpha, |u| train.user_items(u))
    }

    /// Source items first, then target items: target updates observe the
    /// just-updated source factors.
    fn item_phase(&mut self) -> Result<()> {
        let g = compute_g(
            self.model.user_factors(),
            self.train.num_users(),
            self.params.factors(),
            self.params.lambda(),
        )?;
        self.update_domain(&g, true)?;
        self.update_domain(&g, false)
    }

    fn update_domain(&mut self, g: &[f32], source_phase: bool) -> Result<()> {
        let train = self.train;
        let sim = &self.sim;
        let partition = &self.partition;
        let k = self.params.factors();
        let (lambda, alpha) = (self.params.lambda(), self.params.alpha());
        let lambda_cross = self.lambda_cross;
        let opposite =
            if source_phase { partition.target_items() } else { partition.source_items() };

        // Opposite-domain rows are not written during this sub-phase; the
        // frozen view gives every worker a coherent copy to read them from.
        let view = self.model.item_factors().to_vec();
        let (items, users) = self.model.item_phase_split();

        items
            .par_chunks_mut(k)
            .enumerate()
            .filter(|(i, _)| {
                let id = *i as u32;
                if source_phase { partition.is_source(id) } else { partition.is_target(id) }
            })
            .try_for_each(|(i, w)| {
                let id = i as u32;
                SCRATCH.with(|cell| {
                    let scratch = &mut *cell.borrow_mut();
                    scratch.reset();
                    scratch.push_g(g, k);
                    scratch.push_positives(train.item_users(id), users, k, alpha);
                    for &other in opposite {
                        let x = &view[other as usize * k..(other as usize + 1) * k];
                        scratch.push(x, sim.compute(id, other), lambda_cross);
                    }
                    scratch.solve(w, lambda, None);
                });
                check_row_finite(w, i)
            })
    }

    /// Implicit-feedback objective plus the similarity regularizer over
    /// source × target item pairs.
    pub fn compute_loss(&self) -> f64 {
        let mut loss =
            implicit_loss(&self.model, self.train, self.params.lambda(), self.params.alpha());

        if self.lambda_cross > 0.0 && self.model.is_trained() {
            let coupling: f64 = self
                .partition
                .source_items()
                .par_iter()
                .map(|&s| {
                    let source_row = self.model.item_row(s);
                    let mut acc = 0.0f64;
                    for &t in self.partition.target_items() {
                        let err = self.sim.compute(s, t) - dot(source_row, self.model.item_row(t));
                        acc += f64::from(err * err);
                    }
                    acc
                })
                .sum();
            loss += f64::from(self.lambda_cross) * coupling;
        }

        loss
    }
}

impl<S: Similarity> Recommender for SimMf<'_, S> {
    fn train_data(&self) -> &PreferenceData {
        self.train
    }

    fn predict_score(&self, user: &str, item: &str) -> f32 {
        self.model.predict_score(self.train, user, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::FileSimilarity;

    fn two_domain_data() -> PreferenceData {
        PreferenceData::from_pairs([
            ("u1", "s1"),
            ("u2", "s2"),
            ("u3", "t1"),
            ("u4", "t2"),
            ("u1", "t1"),
            ("u2", "t2"),
        ])
    }

    fn coupling_sim(data: &PreferenceData) -> FileSimilarity {
        FileSimilarity::from_scores(data, [("s1", "t1", 0.9f32), ("s2", "t2", 0.9f32)])
    }

    #[test]
    fn similarity_coupling_aligns_coupled_pairs() {
        let data = two_domain_data();
        let sim = coupling_sim(&data);
        let mut mf = SimMf::new(&data, sim, ["t1", "t2"]);
        mf.params_mut().set_factors(4).unwrap();
        mf.params_mut().set_iterations(20).unwrap();
        mf.set_lambda_cross(1.0).unwrap();
        mf.train().unwrap();

        let s1 = data.item_id("s1").unwrap();
        let t1 = data.item_id("t1").unwrap();
        let t2 = data.item_id("t2").unwrap();
        let coupled = dot(mf.model().item_row(s1), mf.model().item_row(t1));
        let uncoupled = dot(mf.model().item_row(s1), mf.model().item_row(t2));
        assert!(
            coupled > uncoupled,
            "expected sim coupling to dominate: {coupled} vs {uncoupled}"
        );
    }

    #[test]
    fn partition_stays_disjoint() {
        let data = two_domain_data();
        let sim = coupling_sim(&data);
        let mf = SimMf::new(&data, sim, ["t1", "t2"]);
        let partition = mf.partition();
        for &s in partition.source_items() {
            assert!(!partition.is_target(s));
        }
        for &t in partition.target_items() {
            assert!(!partition.is_source(t));
        }
        assert_eq!(
            partition.source_items().len() + partition.target_items().len(),
            data.num_items()
        );
    }

    #[test]
    fn cross_loss_decreases_when_factors_align() {
        let data = two_domain_data();
        let sim = coupling_sim(&data);
        let mut mf = SimMf::new(&data, sim, ["t1", "t2"]);
        mf.params_mut().set_factors(4).unwrap();
        mf.params_mut().set_iterations(1).unwrap();
        mf.set_lambda_cross(1.0).unwrap();
        mf.train().unwrap();
        let early = mf.compute_loss();

        mf.params_mut().set_iterations(20).unwrap();
        mf.train().unwrap();
        let late = mf.compute_loss();
        assert!(late <= early * 1.001, "loss did not improve: {early} -> {late}");
    }
}
