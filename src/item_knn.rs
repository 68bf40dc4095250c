use crate::preferences::PreferenceData;
use crate::recommender::Recommender;
use crate::similarity::Similarity;

/// Item-based kNN for positive-only feedback: an item's score for a user is
/// the summed similarity between the item and the user's profile.
pub struct ItemKnn<'a, S> {
    train: &'a PreferenceData,
    sim: S,
}

impl<'a, S: Similarity> ItemKnn<'a, S> {
    pub fn new(train: &'a PreferenceData, sim: S) -> Self {
        Self { train, sim }
    }
}

impl<S: Similarity> Recommender for ItemKnn<'_, S> {
    fn train_data(&self) -> &PreferenceData {
        self.train
    }

    fn predict_score(&self, user: &str, item: &str) -> f32 {
        let (Some(u), Some(i)) = (self.train.user_id(user), self.train.item_id(item)) else {
            return f32::NAN;
        };

        let mut score = 0.0f32;
        for &j in self.train.user_items(u) {
            if j == i {
                continue;
            }
            let s = self.sim.compute(i, j);
            if !s.is_nan() {
                score += s;
            }
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommender::ScoredItem;
    use crate::similarity::Jaccard;

    fn sample_data() -> PreferenceData {
        PreferenceData::from_pairs([
            ("u1", "i1"),
            ("u2", "i1"),
            ("u2", "i2"),
            ("u3", "i2"),
            ("u3", "i3"),
        ])
    }

    #[test]
    fn accumulates_similarity_over_the_user_profile() {
        let data = sample_data();
        let knn = ItemKnn::new(&data, Jaccard::over_items(&data));

        // i2 shares u2 with i1, i3 shares nobody with i1.
        assert!(knn.predict_score("u1", "i2") > knn.predict_score("u1", "i3"));
        assert!(knn.predict_score("nobody", "i1").is_nan());
    }

    #[test]
    fn recommendations_exclude_the_profile_itself() {
        let data = sample_data();
        let knn = ItemKnn::new(&data, Jaccard::over_items(&data));
        let recs = knn.recommend("u1", 10);
        assert!(recs.iter().all(|ScoredItem { item, .. }| item != "i1"));
    }
}
