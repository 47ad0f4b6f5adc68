//! Graph helpers for the directory tree and the event relation graph.
//!
//! - [`would_create_cycle`] guards parent assignment in the directory tree so
//!   the tree stays acyclic by construction.
//! - [`RelationGraph`] checks symmetry of `related_events` adjacency lists and
//!   groups related events into clusters with a union-find.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Returns true if making `new_parent` the parent of `node` would close a cycle.
///
/// `parents` maps every directory id to its current parent. Walking up from
/// `new_parent` must never reach `node`; a node is also never its own parent.
pub fn would_create_cycle(parents: &HashMap<i64, Option<i64>>, node: i64, new_parent: i64) -> bool {
    let mut visited = HashSet::new();
    let mut current = Some(new_parent);

    while let Some(id) = current {
        if id == node {
            return true;
        }
        if !visited.insert(id) {
            // Existing data already loops; refuse to make it worse.
            return true;
        }
        current = parents.get(&id).copied().flatten();
    }

    false
}

/// Union-Find (disjoint set union) over event ids.
///
/// Uses path compression and union by rank.
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parent: HashMap<i64, i64>,
    rank: HashMap<i64, usize>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element. No-op if it already exists.
    pub fn make_set(&mut self, x: i64) {
        if let std::collections::hash_map::Entry::Vacant(e) = self.parent.entry(x) {
            e.insert(x);
            self.rank.insert(x, 0);
        }
    }

    /// Find the root of the set containing `x`, compressing the path.
    pub fn find(&mut self, x: i64) -> Option<i64> {
        let mut root = *self.parent.get(&x)?;
        while let Some(&next) = self.parent.get(&root) {
            if next == root {
                break;
            }
            root = next;
        }

        let mut current = x;
        while current != root {
            let next = self.parent.insert(current, root).unwrap_or(root);
            current = next;
        }
        Some(root)
    }

    /// Merge the sets containing `x` and `y`.
    ///
    /// Returns false if they were already joined or either is unknown.
    pub fn union(&mut self, x: i64, y: i64) -> bool {
        let (Some(root_x), Some(root_y)) = (self.find(x), self.find(y)) else {
            return false;
        };
        if root_x == root_y {
            return false;
        }

        let rank_x = self.rank.get(&root_x).copied().unwrap_or(0);
        let rank_y = self.rank.get(&root_y).copied().unwrap_or(0);
        if rank_x < rank_y {
            self.parent.insert(root_x, root_y);
        } else if rank_x > rank_y {
            self.parent.insert(root_y, root_x);
        } else {
            self.parent.insert(root_y, root_x);
            self.rank.insert(root_x, rank_x + 1);
        }
        true
    }

    pub fn connected(&mut self, x: i64, y: i64) -> bool {
        match (self.find(x), self.find(y)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// All components, each sorted, ordered by their smallest member.
    pub fn components(&mut self) -> Vec<Vec<i64>> {
        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        let elements: Vec<i64> = self.parent.keys().copied().collect();
        for elem in elements {
            if let Some(root) = self.find(elem) {
                map.entry(root).or_default().push(elem);
            }
        }
        let mut components: Vec<Vec<i64>> = map
            .into_values()
            .map(|mut c| {
                c.sort_unstable();
                c
            })
            .collect();
        components.sort_by_key(|c| c[0]);
        components
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// Adjacency view over the `related_events` lists of a set of events.
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    adjacency: BTreeMap<i64, Vec<i64>>,
}

impl RelationGraph {
    /// Build from `(event id, related ids)` pairs.
    pub fn from_lists(lists: impl IntoIterator<Item = (i64, Vec<i64>)>) -> Self {
        Self {
            adjacency: lists.into_iter().collect(),
        }
    }

    /// Pairs `(a, b)` where `a` lists `b` but `b` does not list `a`.
    pub fn asymmetric_pairs(&self) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        for (&a, related) in &self.adjacency {
            for &b in related {
                let back = self
                    .adjacency
                    .get(&b)
                    .map(|list| list.contains(&a))
                    .unwrap_or(false);
                if !back {
                    out.push((a, b));
                }
            }
        }
        out
    }

    pub fn is_symmetric(&self) -> bool {
        self.asymmetric_pairs().is_empty()
    }

    /// Clusters of events connected through relations, singletons excluded.
    pub fn clusters(&self) -> Vec<Vec<i64>> {
        let mut uf = UnionFind::new();
        for (&a, related) in &self.adjacency {
            uf.make_set(a);
            for &b in related {
                uf.make_set(b);
                uf.union(a, b);
            }
        }
        uf.components().into_iter().filter(|c| c.len() > 1).collect()
    }
}
