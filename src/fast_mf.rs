//! Fast ALS for implicit feedback (Pilászy, Zibriczky, Tikk, RecSys 2010):
//! each per-row ridge regression is recast as a weighted regression with
//! k + N points and solved by a single RR1 coordinate-descent cycle.

use std::time::Instant;

use tracing::{debug, info};

use crate::error::Result;
use crate::mf::{implicit_loss, rr1_phase, FactorModel, MfHyperParams};
use crate::preferences::PreferenceData;
use crate::recommender::Recommender;

/// RR1-based implicit ALS trainer. Same objective as [`ImplicitMf`], one
/// coordinate cycle per row per outer iteration instead of an exact solve;
/// the outer iterations absorb the difference.
///
/// [`ImplicitMf`]: crate::implicit_mf::ImplicitMf
pub struct FastMf<'a> {
    train: &'a PreferenceData,
    params: MfHyperParams,
    model: FactorModel,
}

impl<'a> FastMf<'a> {
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
                    "fast als iteration"
                );
            } else {
                info!(iteration = iteration + 1, elapsed = ?start.elapsed(), "fast als iteration");
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

    fn item_phase(&mut self) -> Result<()> {
        let train = self.train;
        let k = self.params.factors();
        let (lambda, alpha) = (self.params.lambda(), self.params.alpha());
        let (items, users) = self.model.item_phase_split();
        rr1_phase(items, users, train.num_users(), k, lambda, alpha, |i| train.item_users(i))
    }

    pub fn compute_loss(&self) -> f64 {
        implicit_loss(&self.model, self.train, self.params.lambda(), self.params.alpha())
    }
}

impl Recommender for FastMf<'_> {
    fn train_data(&self) -> &PreferenceData {
        self.train
    }

    fn predict_score(&self, user: &str, item: &str) -> f32 {
        self.model.predict_score(self.train, user, item)
    }
}
