use crate::models::QuadId;

/// Narrow interface of the 4-D spatial index: point insertion and
/// closed-box range queries. The matcher only ever talks to this trait,
/// so the tree behind it can be swapped without touching the pipeline.
pub trait RangeIndex {
    /// Inserts a hash point for the given quad id.
    fn insert(&mut self, id: QuadId, point: [f64; 4]);

    /// Ids of every point inside the closed axis-aligned box
    /// `[lo[0], hi[0]] x .. x [lo[3], hi[3]]`.
    fn range_query(&self, lo: [f64; 4], hi: [f64; 4]) -> Vec<QuadId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const DIMS: usize = 4;

#[derive(Clone, Debug)]
struct KdNode {
    point: [f64; 4],
    id: QuadId,
    left: Option<u32>,
    right: Option<u32>,
}

/// A 4-dimensional kd-tree over quad hashes.
///
/// The catalog build path bulk-loads it bottom-up (median split on the
/// depth-cycled axis), which yields a balanced tree without any
/// rebalancing machinery; in-session stores append through `insert`.
/// Points with equal coordinates on the split axis may land on either
/// side, so queries descend both subtrees at the boundary.
#[derive(Clone, Debug, Default)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    root: Option<u32>,
}

impl KdTree {
    pub fn new() -> Self {
        KdTree::default()
    }

    /// Builds a balanced tree from a batch of `(point, id)` pairs.
    pub fn bulk_load(mut items: Vec<([f64; 4], QuadId)>) -> Self {
        let mut tree = KdTree { nodes: Vec::with_capacity(items.len()), root: None };
        tree.root = tree.build(&mut items, 0);
        tree
    }

    fn build(&mut self, items: &mut [([f64; 4], QuadId)], depth: usize) -> Option<u32> {
        if items.is_empty() {
            return None;
        }
        let axis = depth % DIMS;
        let mid = items.len() / 2;
        items.select_nth_unstable_by(mid, |a, b| a.0[axis].total_cmp(&b.0[axis]));
        let (point, id) = items[mid];

        let slot = self.nodes.len() as u32;
        self.nodes.push(KdNode { point, id, left: None, right: None });

        let left = self.build(&mut items[..mid], depth + 1);
        let (_, rest) = items.split_at_mut(mid + 1);
        let right = self.build(rest, depth + 1);
        self.nodes[slot as usize].left = left;
        self.nodes[slot as usize].right = right;
        Some(slot)
    }

    fn query_into(&self, node: u32, lo: &[f64; 4], hi: &[f64; 4], depth: usize, out: &mut Vec<QuadId>) {
        let n = &self.nodes[node as usize];
        if (0..DIMS).all(|k| lo[k] <= n.point[k] && n.point[k] <= hi[k]) {
            out.push(n.id);
        }
        let axis = depth % DIMS;
        if let Some(left) = n.left {
            if lo[axis] <= n.point[axis] {
                self.query_into(left, lo, hi, depth + 1, out);
            }
        }
        if let Some(right) = n.right {
            if hi[axis] >= n.point[axis] {
                self.query_into(right, lo, hi, depth + 1, out);
            }
        }
    }
}

impl RangeIndex for KdTree {
    fn insert(&mut self, id: QuadId, point: [f64; 4]) {
        let slot = self.nodes.len() as u32;
        self.nodes.push(KdNode { point, id, left: None, right: None });
        let mut current = match self.root {
            Some(root) => root as usize,
            None => {
                self.root = Some(slot);
                return;
            }
        };
        let mut depth = 0;
        loop {
            let axis = depth % DIMS;
            let go_left = point[axis] < self.nodes[current].point[axis];
            let child = if go_left { self.nodes[current].left } else { self.nodes[current].right };
            match child {
                Some(next) => current = next as usize,
                None => {
                    if go_left {
                        self.nodes[current].left = Some(slot);
                    } else {
                        self.nodes[current].right = Some(slot);
                    }
                    return;
                }
            }
            depth += 1;
        }
    }

    fn range_query(&self, lo: [f64; 4], hi: [f64; 4]) -> Vec<QuadId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.query_into(root, &lo, &hi, 0, &mut out);
        }
        out
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random points in the unit cube.
    fn lcg_points(n: usize) -> Vec<([f64; 4], QuadId)> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..n)
            .map(|i| ([next(), next(), next(), next()], i as QuadId))
            .collect()
    }

    fn brute_force(items: &[([f64; 4], QuadId)], lo: [f64; 4], hi: [f64; 4]) -> Vec<QuadId> {
        let mut ids: Vec<QuadId> = items
            .iter()
            .filter(|(p, _)| (0..4).all(|k| lo[k] <= p[k] && p[k] <= hi[k]))
            .map(|&(_, id)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn bulk_load_matches_brute_force() {
        let items = lcg_points(500);
        let tree = KdTree::bulk_load(items.clone());
        assert_eq!(tree.len(), 500);

        for (center, _) in items.iter().step_by(37) {
            let eps = 0.05;
            let lo = center.map(|v| v - eps);
            let hi = center.map(|v| v + eps);
            let mut got = tree.range_query(lo, hi);
            got.sort_unstable();
            assert_eq!(got, brute_force(&items, lo, hi));
        }
    }

    #[test]
    fn incremental_inserts_match_brute_force() {
        let items = lcg_points(200);
        let mut tree = KdTree::new();
        for (p, id) in &items {
            tree.insert(*id, *p);
        }

        let lo = [0.2; 4];
        let hi = [0.8; 4];
        let mut got = tree.range_query(lo, hi);
        got.sort_unstable();
        assert_eq!(got, brute_force(&items, lo, hi));
    }

    #[test]
    fn closed_box_includes_the_boundary() {
        let mut tree = KdTree::new();
        tree.insert(7, [0.5; 4]);
        assert_eq!(tree.range_query([0.5; 4], [0.5; 4]), vec![7]);
        assert!(tree.range_query([0.6; 4], [0.9; 4]).is_empty());
    }

    #[test]
    fn duplicate_points_are_all_reported() {
        let mut tree = KdTree::new();
        tree.insert(1, [0.25; 4]);
        tree.insert(2, [0.25; 4]);
        tree.insert(3, [0.25; 4]);
        let mut got = tree.range_query([0.2; 4], [0.3; 4]);
        got.sort_unstable();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let tree = KdTree::new();
        assert!(tree.is_empty());
        assert!(tree.range_query([0.0; 4], [1.0; 4]).is_empty());
    }
}
