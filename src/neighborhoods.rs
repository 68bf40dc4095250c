use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::preferences::PreferenceData;
use crate::similarity::parse_edge;

/// Bounded per-item neighbor lists plus their reverse-edge view.
///
/// Built from directed `item<TAB>neighbor<TAB>score` edges: each source item
/// keeps its `num_neighbors` best-scoring edges, optionally L1-normalized.
/// The inverse map is derived from the pruned lists in the same pass, so the
/// two views always describe the same edge set.
pub struct ItemNeighborhoods {
    neighbors: Vec<Vec<(u32, f32)>>,
    inv_neighbors: Vec<Vec<(u32, f32)>>,
}

impl ItemNeighborhoods {
    pub fn from_file(
        path: impl AsRef<Path>,
        data: &PreferenceData,
        num_neighbors: usize,
        normalize: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut edges = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed = parse_edge(&line).ok_or_else(|| Error::MalformedLine {
                path: path.to_owned(),
                line: line_no + 1,
            })?;
            edges.push(parsed);
        }
        Ok(Self::from_edges(
            data,
            num_neighbors,
            normalize,
            edges.iter().map(|(a, b, s)| (a.as_str(), b.as_str(), *s)),
        ))
    }

    /// Builds the neighborhoods from in-memory edges. Edges with NaN scores
    /// or endpoints unknown to the training data are dropped.
    pub fn from_edges<'a>(
        data: &PreferenceData,
        num_neighbors: usize,
        normalize: bool,
        edges: impl IntoIterator<Item = (&'a str, &'a str, f32)>,
    ) -> Self {
        let num_items = data.num_items();
        let mut neighbors: Vec<Vec<(u32, f32)>> = vec![Vec::new(); num_items];

        for (item, neighbor, score) in edges {
            if score.is_nan() {
                continue;
            }
            let (Some(i), Some(n)) = (data.item_id(item), data.item_id(neighbor)) else {
                continue;
            };
            neighbors[i as usize].push((n, score));
        }

        for list in &mut neighbors {
            let keep = num_neighbors.min(list.len());
            if keep < list.len() {
                list.select_nth_unstable_by(keep.saturating_sub(1), |a, b| b.1.total_cmp(&a.1));
                list.truncate(keep);
            }
            if normalize && !list.is_empty() {
                let sum: f32 = list.iter().map(|(_, s)| s).sum();
                for (_, s) in list.iter_mut() {
                    *s /= sum;
                }
            }
        }

        let mut inv_neighbors: Vec<Vec<(u32, f32)>> = vec![Vec::new(); num_items];
        for (item, list) in neighbors.iter().enumerate() {
            for &(neighbor, score) in list {
                inv_neighbors[neighbor as usize].push((item as u32, score));
            }
        }

        Self { neighbors, inv_neighbors }
    }

    /// Neighbors of the given item; empty when the item has none.
    pub fn neighbors(&self, item: u32) -> &[(u32, f32)] {
        self.neighbors.get(item as usize).map_or(&[], Vec::as_slice)
    }

    /// Items whose neighbor lists include the given item.
    pub fn inv_neighbors(&self, item: u32) -> &[(u32, f32)] {
        self.inv_neighbors.get(item as usize).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn sample_data() -> PreferenceData {
        PreferenceData::from_pairs([("u1", "a"), ("u1", "b"), ("u2", "c"), ("u2", "d")])
    }

    #[test]
    fn keeps_only_the_best_scoring_edges_per_source() {
        let data = sample_data();
        let neighborhoods = ItemNeighborhoods::from_edges(
            &data,
            2,
            false,
            [("a", "b", 0.1), ("a", "c", 0.9), ("a", "d", 0.5)],
        );
        let a = data.item_id("a").unwrap();
        let list = neighborhoods.neighbors(a);
        assert_eq!(list.len(), 2);
        let kept: Vec<&str> = list.iter().map(|&(n, _)| data.item(n).unwrap()).collect();
        assert!(kept.contains(&"c") && kept.contains(&"d"));
    }

    #[test]
    fn normalized_lists_sum_to_one() {
        let data = sample_data();
        let neighborhoods = ItemNeighborhoods::from_edges(
            &data,
            10,
            true,
            [("a", "b", 1.0), ("a", "c", 3.0)],
        );
        let a = data.item_id("a").unwrap();
        let sum: f32 = neighborhoods.neighbors(a).iter().map(|(_, s)| s).sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn inverse_view_mirrors_the_pruned_edges() {
        let data = sample_data();
        let neighborhoods = ItemNeighborhoods::from_edges(
            &data,
            1,
            false,
            [("a", "c", 0.9), ("a", "d", 0.1), ("b", "c", 0.4)],
        );
        let c = data.item_id("c").unwrap();
        let d = data.item_id("d").unwrap();

        // a kept only c, so c is pointed at by both a and b; d by nobody.
        let into_c: Vec<&str> =
            neighborhoods.inv_neighbors(c).iter().map(|&(i, _)| data.item(i).unwrap()).collect();
        assert_eq!(into_c, vec!["a", "b"]);
        assert!(neighborhoods.inv_neighbors(d).is_empty());
    }

    #[test]
    fn drops_nan_and_unknown_edges() {
        let data = sample_data();
        let neighborhoods = ItemNeighborhoods::from_edges(
            &data,
            10,
            false,
            [("a", "b", f32::NAN), ("a", "nope", 1.0), ("zzz", "b", 1.0)],
        );
        let a = data.item_id("a").unwrap();
        assert!(neighborhoods.neighbors(a).is_empty());
    }

    #[test]
    fn loads_edges_from_a_file() {
        let data = sample_data();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# comment\na\tb\t0.5\n").unwrap();
        let neighborhoods = ItemNeighborhoods::from_file(file.path(), &data, 5, false).unwrap();
        let a = data.item_id("a").unwrap();
        let b = data.item_id("b").unwrap();
        assert_eq!(neighborhoods.neighbors(a), &[(b, 0.5)]);
    }
}
