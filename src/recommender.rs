use crate::index::StableSet;
use crate::preferences::PreferenceData;

/// An item together with its predicted preference score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item: String,
    pub score: f32,
}

/// Pointwise recommenders: items are ranked by individual score, without
/// looking at the rest of the list.
pub trait Recommender {
    fn train_data(&self) -> &PreferenceData;

    /// Predicted preference of the user for the item; NaN when no prediction
    /// can be computed (unknown user/item, untrained model).
    fn predict_score(&self, user: &str, item: &str) -> f32;

    /// Top recommendations from all training items.
    fn recommend(&self, user: &str, how_many: usize) -> Vec<ScoredItem> {
        rank(self, user, how_many, self.train_data().items())
    }

    /// Top recommendations restricted to the given candidate items.
    fn recommend_from(
        &self,
        user: &str,
        how_many: usize,
        candidates: &StableSet<String>,
    ) -> Vec<ScoredItem> {
        rank(self, user, how_many, candidates.iter().map(String::as_str))
    }
}

/// Scores the candidates, drops items the user already interacted with and
/// items without a prediction, and keeps the `how_many` best in descending
/// score order.
fn rank<'a, R: Recommender + ?Sized>(
    recommender: &R,
    user: &str,
    how_many: usize,
    candidates: impl Iterator<Item = &'a str>,
) -> Vec<ScoredItem> {
    let data = recommender.train_data();
    let mut scored: Vec<(f32, &str)> = candidates
        .filter(|item| !data.exists_preference(user, item))
        .filter_map(|item| {
            let score = recommender.predict_score(user, item);
            (!score.is_nan()).then_some((score, item))
        })
        .collect();

    let take = how_many.min(scored.len());
    if take == 0 {
        return Vec::new();
    }
    scored.select_nth_unstable_by(take.saturating_sub(1), |a, b| b.0.total_cmp(&a.0));
    scored.truncate(take);
    scored.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));

    scored.into_iter().map(|(score, item)| ScoredItem { item: item.to_owned(), score }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::stable_set;

    /// Scores every item by a fixed table; used to pin the ranking rules.
    struct TableRecommender {
        data: PreferenceData,
        scores: Vec<(&'static str, f32)>,
    }

    impl Recommender for TableRecommender {
        fn train_data(&self) -> &PreferenceData {
            &self.data
        }

        fn predict_score(&self, _user: &str, item: &str) -> f32 {
            self.scores
                .iter()
                .find(|(name, _)| *name == item)
                .map_or(f32::NAN, |&(_, score)| score)
        }
    }

    #[test]
    fn ranking_filters_seen_items_and_nans_and_sorts_descending() {
        let recommender = TableRecommender {
            data: PreferenceData::from_pairs([("u1", "a"), ("u2", "b"), ("u2", "c"), ("u2", "d")]),
            scores: vec![("a", 9.0), ("b", 0.25), ("c", 0.75), ("d", f32::NAN)],
        };

        // "a" is already seen by u1 and "d" has no prediction.
        let recs = recommender.recommend("u1", 10);
        let names: Vec<&str> = recs.iter().map(|s| s.item.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);

        let top1 = recommender.recommend("u1", 1);
        assert_eq!(top1.len(), 1);
        assert_eq!(top1[0].item, "c");
        assert_eq!(top1[0].score, 0.75);
    }

    #[test]
    fn candidate_restriction_is_honored() {
        let recommender = TableRecommender {
            data: PreferenceData::from_pairs([("u1", "a"), ("u2", "b"), ("u2", "c")]),
            scores: vec![("a", 1.0), ("b", 0.5), ("c", 2.0)],
        };
        let mut candidates = stable_set();
        candidates.insert("b".to_owned());
        let recs = recommender.recommend_from("u1", 5, &candidates);
        let names: Vec<&str> = recs.iter().map(|s| s.item.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }
}
