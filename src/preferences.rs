use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::index::{stable_set, Index, StableSet};

/// Container for unary/binary feedback: the set of observed (user, item)
/// pairs, indexed both ways.
///
/// Ratings and frequencies are not modeled; a pair is either observed or
/// not. Users and items are opaque strings mapped to dense zero-based ids,
/// and the adjacency sets are keyed by id. Built once by the loader (plus
/// optional merges) and immutable during training.
#[derive(Debug, Default)]
pub struct PreferenceData {
    users: Index,
    items: Index,
    user_items: Vec<StableSet<u32>>,
    item_users: Vec<StableSet<u32>>,
    num_observations: usize,
}

impl PreferenceData {
    pub fn new() -> Self {
        Self {
            users: Index::new(),
            items: Index::new(),
            user_items: Vec::new(),
            item_users: Vec::new(),
            num_observations: 0,
        }
    }

    /// Loads a dataset from a file with one `user<TAB>item` observation per
    /// line. Empty lines and lines starting with `#` are ignored.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut data = Self::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tok = line.split('\t');
            let (user, item) = match (tok.next(), tok.next()) {
                (Some(user), Some(item)) if !user.is_empty() && !item.is_empty() => (user, item),
                _ => {
                    return Err(Error::MalformedLine { path: path.to_owned(), line: line_no + 1 })
                }
            };
            data.add_observation(user, item);
        }

        Ok(data)
    }

    /// Builds a dataset from in-memory pairs; mostly useful for tests and
    /// synthetic experiments.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut data = Self::new();
        for (user, item) in pairs {
            data.add_observation(user, item);
        }
        data
    }

    fn add_observation(&mut self, user: &str, item: &str) {
        let u = self.users.add(user);
        let i = self.items.add(item);
        if self.user_items.len() <= u as usize {
            self.user_items.push(stable_set());
        }
        if self.item_users.len() <= i as usize {
            self.item_users.push(stable_set());
        }
        if self.user_items[u as usize].insert(i) {
            self.num_observations += 1;
        }
        self.item_users[i as usize].insert(u);
    }

    pub fn user_id(&self, user: &str) -> Option<u32> {
        self.users.id(user)
    }

    pub fn item_id(&self, item: &str) -> Option<u32> {
        self.items.id(item)
    }

    pub fn user(&self, id: u32) -> Option<&str> {
        self.users.element(id)
    }

    pub fn item(&self, id: u32) -> Option<&str> {
        self.items.element(id)
    }

    /// All users in id order.
    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.elements()
    }

    /// All items in id order.
    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.items.elements()
    }

    pub fn contains_user(&self, user: &str) -> bool {
        self.users.contains(user)
    }

    pub fn contains_item(&self, item: &str) -> bool {
        self.items.contains(item)
    }

    /// Items preferred by the given user id.
    pub fn user_items(&self, user: u32) -> &StableSet<u32> {
        &self.user_items[user as usize]
    }

    /// Users who expressed a preference for the given item id.
    pub fn item_users(&self, item: u32) -> &StableSet<u32> {
        &self.item_users[item as usize]
    }

    pub fn exists_preference(&self, user: &str, item: &str) -> bool {
        match (self.user_id(user), self.item_id(item)) {
            (Some(u), Some(i)) => self.exists_preference_ids(u, i),
            _ => false,
        }
    }

    pub fn exists_preference_ids(&self, user: u32, item: u32) -> bool {
        self.user_items[user as usize].contains(&item)
    }

    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn max_user_id(&self) -> Option<u32> {
        self.users.max_id()
    }

    pub fn max_item_id(&self) -> Option<u32> {
        self.items.max_id()
    }

    /// Number of observed (user, item) pairs.
    pub fn size(&self) -> usize {
        self.num_observations
    }

    /// Merges another dataset into this one: adjacencies are unioned and new
    /// users/items receive fresh ids continuing after the current maximum.
    pub fn merge(&mut self, other: &PreferenceData) {
        for user in other.users() {
            let other_u = other.user_id(user).unwrap();
            for &other_i in other.user_items(other_u) {
                let item = other.item(other_i).unwrap();
                self.add_observation(user, item);
            }
        }
        self.num_observations = self.user_items.iter().map(StableSet::len).sum();
    }
}
