use crate::preferences::PreferenceData;

/// Disjoint split of the training items into a source and a target domain.
///
/// Target items are named explicitly; every other training item belongs to
/// the source domain. Membership is O(1) and the per-domain id lists are
/// sorted, so iterating them is deterministic.
#[derive(Debug)]
pub struct DomainPartition {
    is_target: Vec<bool>,
    source: Vec<u32>,
    target: Vec<u32>,
}

impl DomainPartition {
    /// Builds the partition from the target-domain item identifiers. Names
    /// unknown to the training data are ignored.
    pub fn from_target_items<'a>(
        data: &PreferenceData,
        target_items: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut is_target = vec![false; data.num_items()];
        for item in target_items {
            if let Some(id) = data.item_id(item) {
                is_target[id as usize] = true;
            }
        }

        let (target, source) =
            (0..data.num_items() as u32).partition(|&id| is_target[id as usize]);

        Self { is_target, source, target }
    }

    pub fn is_target(&self, item: u32) -> bool {
        self.is_target.get(item as usize).copied().unwrap_or(false)
    }

    pub fn is_source(&self, item: u32) -> bool {
        (item as usize) < self.is_target.len() && !self.is_target[item as usize]
    }

    /// Source item ids in ascending order.
    pub fn source_items(&self) -> &[u32] {
        &self.source
    }

    /// Target item ids in ascending order.
    pub fn target_items(&self) -> &[u32] {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_the_complement_of_target() {
        let data = PreferenceData::from_pairs([
            ("u1", "s1"),
            ("u1", "t1"),
            ("u2", "s2"),
            ("u2", "t2"),
        ]);
        let partition = DomainPartition::from_target_items(&data, ["t1", "t2", "unknown"]);

        assert_eq!(partition.source_items().len(), 2);
        assert_eq!(partition.target_items().len(), 2);
        for &id in partition.source_items() {
            assert!(partition.is_source(id));
            assert!(!partition.is_target(id));
        }
        for &id in partition.target_items() {
            assert!(partition.is_target(id));
            assert!(!partition.is_source(id));
        }

        // Disjoint and jointly exhaustive over the item ids.
        let mut all: Vec<u32> =
            partition.source_items().iter().chain(partition.target_items()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..data.num_items() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn ids_outside_the_item_range_belong_to_neither_domain() {
        let data = PreferenceData::from_pairs([("u1", "a")]);
        let partition = DomainPartition::from_target_items(&data, ["a"]);
        assert!(!partition.is_target(99));
        assert!(!partition.is_source(99));
    }
}
