use std::collections::BTreeSet;

use serde::Serialize;

/// Order ids the user removed from every metric and chart for this session.
///
/// Never persisted: a new session starts with an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionSet {
    ids: BTreeSet<i64>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the id was not excluded before.
    pub fn exclude(&mut self, id: i64) -> bool {
        self.ids.insert(id)
    }

    /// Returns true if the id was excluded before.
    pub fn include(&mut self, id: i64) -> bool {
        self.ids.remove(&id)
    }

    /// Flip the id's membership. Returns true if it is now excluded.
    pub fn toggle(&mut self, id: i64) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<i64> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
