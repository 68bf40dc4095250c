use parking_lot::RwLock;

use crate::index::{stable_map, StableMap};
use crate::preferences::PreferenceData;
use crate::recommender::Recommender;
use crate::similarity::Similarity;

/// User-based nearest neighbors for binary feedback.
///
/// A user's neighborhood is the bounded set of most similar other users,
/// computed on demand and cached.
pub struct UserKnn<'a, S> {
    train: &'a PreferenceData,
    sim: S,
    num_neighbors: usize,
    neighborhoods: RwLock<StableMap<u32, Vec<(u32, f32)>>>,
}

impl<'a, S: Similarity> UserKnn<'a, S> {
    pub fn new(train: &'a PreferenceData, sim: S, num_neighbors: usize) -> Self {
        Self { train, sim, num_neighbors, neighborhoods: RwLock::new(stable_map()) }
    }

    pub fn num_neighbors(&self) -> usize {
        self.num_neighbors
    }

    fn compute_neighborhood(&self, user: u32) -> Vec<(u32, f32)> {
        let mut scored: Vec<(u32, f32)> = (0..self.train.num_users() as u32)
            .filter(|&other| other != user)
            .map(|other| (other, self.sim.compute(user, other)))
            .collect();

        let keep = self.num_neighbors.min(scored.len());
        if keep < scored.len() {
            scored.select_nth_unstable_by(keep.saturating_sub(1), |a, b| b.1.total_cmp(&a.1));
            scored.truncate(keep);
        }
        scored
    }

    fn score(&self, neighbors: &[(u32, f32)], item: u32) -> f32 {
        let mut score = 0.0f32;
        let mut found = false;
        for &(neighbor, sim) in neighbors {
            if self.train.user_items(neighbor).contains(&item) {
                score += sim;
                found = true;
            }
        }
        if found { score } else { f32::NAN }
    }
}

impl<S: Similarity> Recommender for UserKnn<'_, S> {
    fn train_data(&self) -> &PreferenceData {
        self.train
    }

    fn predict_score(&self, user: &str, item: &str) -> f32 {
        let (Some(u), Some(i)) = (self.train.user_id(user), self.train.item_id(item)) else {
            return f32::NAN;
        };

        {
            let cache = self.neighborhoods.read();
            if let Some(neighbors) = cache.get(&u) {
                return self.score(neighbors, i);
            }
        }

        let neighbors = self.compute_neighborhood(u);
        let score = self.score(&neighbors, i);
        self.neighborhoods.write().insert(u, neighbors);
        score
    }
}
