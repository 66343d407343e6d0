//! Disjoint-set clustering of near-duplicate pairs.
//!
//! Items are identified by their position in input order, so the smallest
//! member of a cluster is always the first-seen one.

use std::collections::BTreeMap;

/// Union-Find with path halving and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Representative of the set containing `x`.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets containing `x` and `y`. Returns false if already merged.
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return false;
        }

        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] = self.rank[rx].saturating_add(1);
            }
        }
        true
    }

    /// Clusters with more than one member, keyed by their smallest member.
    /// Members are sorted ascending.
    #[must_use]
    pub fn duplicate_clusters(&mut self) -> BTreeMap<usize, Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }

        by_root
            .into_values()
            .filter(|members| members.len() > 1)
            .map(|members| (members[0], members))
            .collect()
    }

    /// Every clustered item except the first-seen member of its cluster,
    /// sorted ascending.
    #[must_use]
    pub fn redundant_members(&mut self) -> Vec<usize> {
        let mut redundant: Vec<usize> = self
            .duplicate_clusters()
            .into_values()
            .flat_map(|members| members.into_iter().skip(1))
            .collect();
        redundant.sort_unstable();
        redundant
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// True when there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_find() {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(0, 1));
        assert!(uf.union(3, 4));
        assert!(!uf.union(1, 0));
        assert_eq!(uf.find(0), uf.find(1));
        assert_ne!(uf.find(0), uf.find(3));
        assert_eq!(uf.len(), 5);
    }

    #[test]
    fn test_transitive_clusters() {
        let mut uf = UnionFind::new(6);
        uf.union(4, 2);
        uf.union(2, 5);
        uf.union(1, 3);

        let clusters = uf.duplicate_clusters();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[&1], vec![1, 3]);
        assert_eq!(clusters[&2], vec![2, 4, 5]);
    }

    #[test]
    fn test_redundant_members_keep_first_seen() {
        let mut uf = UnionFind::new(6);
        uf.union(5, 2);
        uf.union(0, 4);

        assert_eq!(uf.redundant_members(), vec![4, 5]);
    }

    #[test]
    fn test_empty() {
        let mut uf = UnionFind::new(0);
        assert!(uf.is_empty());
        assert!(uf.redundant_members().is_empty());
    }
}
