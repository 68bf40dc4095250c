use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::index::{stable_map, StableMap, StableSet};
use crate::preferences::PreferenceData;

/// Similarity between two entities of the same id space (users or items,
/// depending on how the instance was built). Implementations must be
/// symmetric; 0 or NaN both mean "no signal".
pub trait Similarity: Sync {
    fn compute(&self, first: u32, second: u32) -> f32;
}

// ─── Precomputed similarities ────────────────────────────────────────────────

/// Item-item similarities loaded from a three-column file.
///
/// Pairs are canonicalized (smaller id first) so lookups are symmetric by
/// construction. Unknown pairs score 0, which exerts no cross-domain
/// pressure in the trainers.
pub struct FileSimilarity {
    scores: StableMap<(u32, u32), f32>,
}

impl FileSimilarity {
    /// Loads `itemA<TAB>itemB<TAB>score` lines. NaN scores and pairs with
    /// items unknown to the training data are dropped.
    pub fn from_file(path: impl AsRef<Path>, data: &PreferenceData) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut rows = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed = parse_edge(&line).ok_or_else(|| Error::MalformedLine {
                path: path.to_owned(),
                line: line_no + 1,
            })?;
            rows.push(parsed);
        }
        Ok(Self::from_scores(data, rows.iter().map(|(a, b, s)| (a.as_str(), b.as_str(), *s))))
    }

    pub fn from_scores<'a>(
        data: &PreferenceData,
        scores: impl IntoIterator<Item = (&'a str, &'a str, f32)>,
    ) -> Self {
        let mut map = stable_map();
        for (first, second, score) in scores {
            if score.is_nan() {
                continue;
            }
            let (Some(a), Some(b)) = (data.item_id(first), data.item_id(second)) else {
                continue;
            };
            map.insert(canonical(a, b), score);
        }
        Self { scores: map }
    }
}

fn canonical(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

pub(crate) fn parse_edge(line: &str) -> Option<(String, String, f32)> {
    let mut tok = line.split('\t');
    let first = tok.next()?;
    let second = tok.next()?;
    let score = tok.next()?.parse::<f32>().ok()?;
    if first.is_empty() || second.is_empty() {
        return None;
    }
    Some((first.to_owned(), second.to_owned(), score))
}

impl Similarity for FileSimilarity {
    fn compute(&self, first: u32, second: u32) -> f32 {
        self.scores.get(&canonical(first, second)).copied().unwrap_or(0.0)
    }
}

// ─── Jaccard ─────────────────────────────────────────────────────────────────

enum ProfileSide {
    Users,
    Items,
}

/// Jaccard coefficient over adjacency profiles: item profiles of users, or
/// user profiles of items.
pub struct Jaccard<'a> {
    data: &'a PreferenceData,
    side: ProfileSide,
}

impl<'a> Jaccard<'a> {
    /// Compares users by the sets of items they liked.
    pub fn over_users(data: &'a PreferenceData) -> Self {
        Self { data, side: ProfileSide::Users }
    }

    /// Compares items by the sets of users who liked them.
    pub fn over_items(data: &'a PreferenceData) -> Self {
        Self { data, side: ProfileSide::Items }
    }

    fn profile(&self, id: u32) -> &StableSet<u32> {
        match self.side {
            ProfileSide::Users => self.data.user_items(id),
            ProfileSide::Items => self.data.item_users(id),
        }
    }
}

impl Similarity for Jaccard<'_> {
    fn compute(&self, first: u32, second: u32) -> f32 {
        let (a, b) = (self.profile(first), self.profile(second));
        let (small, large) = if a.len() < b.len() { (a, b) } else { (b, a) };

        let intersection = small.iter().filter(|x| large.contains(x)).count();
        let union = a.len() + b.len() - intersection;
        // 0/0 yields NaN, which callers treat as "no signal".
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn sample_data() -> PreferenceData {
        PreferenceData::from_pairs([
            ("u1", "i1"),
            ("u1", "i2"),
            ("u2", "i2"),
            ("u2", "i3"),
            ("u3", "i3"),
        ])
    }

    #[test]
    fn file_similarity_is_symmetric_and_defaults_to_zero() {
        let data = sample_data();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "i1\ti2\t0.8\ni2\ti3\tNaN\n").unwrap();

        let sim = FileSimilarity::from_file(file.path(), &data).unwrap();
        let i1 = data.item_id("i1").unwrap();
        let i2 = data.item_id("i2").unwrap();
        let i3 = data.item_id("i3").unwrap();

        assert_eq!(sim.compute(i1, i2), 0.8);
        assert_eq!(sim.compute(i2, i1), 0.8);
        // NaN rows are dropped, unknown pairs score 0.
        assert_eq!(sim.compute(i2, i3), 0.0);
        assert_eq!(sim.compute(i1, i3), 0.0);
    }

    #[test]
    fn file_similarity_rejects_malformed_rows() {
        let data = sample_data();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "i1\ti2\tnot-a-number\n").unwrap();
        assert!(matches!(
            FileSimilarity::from_file(file.path(), &data),
            Err(Error::MalformedLine { line: 1, .. })
        ));
    }

    #[test]
    fn jaccard_over_users_counts_shared_items() {
        let data = sample_data();
        let sim = Jaccard::over_users(&data);
        let u1 = data.user_id("u1").unwrap();
        let u2 = data.user_id("u2").unwrap();
        let u3 = data.user_id("u3").unwrap();

        // u1 and u2 share i2 out of {i1, i2, i3}.
        assert!((sim.compute(u1, u2) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(sim.compute(u1, u2), sim.compute(u2, u1));
        assert_eq!(sim.compute(u1, u3), 0.0);
    }

    #[test]
    fn jaccard_over_items_counts_shared_users() {
        let data = sample_data();
        let sim = Jaccard::over_items(&data);
        let i2 = data.item_id("i2").unwrap();
        let i3 = data.item_id("i3").unwrap();
        // i2 is liked by {u1, u2}, i3 by {u2, u3}.
        assert!((sim.compute(i2, i3) - 1.0 / 3.0).abs() < 1e-6);
    }
}
