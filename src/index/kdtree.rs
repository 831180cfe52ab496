use crate::bounds::{BoundingBox, EPSILON, Point, approx_eq};
use crate::entry::{IndexEntry, Neighbor};
use crate::error::{IndexError, check_finite};
use crate::index::SpatialIndex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::OnceLock;

const NIL: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
struct KdNode {
    entry: u32,
    axis: u8,
    left: u32, // NIL if absent
    right: u32,
}

/// A balanced tree over the entry list, stored as a flat arena.
#[derive(Debug)]
struct KdNodes {
    nodes: Vec<KdNode>,
    root: u32,
    depth: usize,
}

impl KdNodes {
    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            root: NIL,
            depth: 0,
        }
    }
}

/// A 3D k-d tree with a lazily built, median-balanced layout.
///
/// Insertions only append to the entry list and invalidate the tree. The tree
/// is rebuilt from all entries on the first query that needs it (k-NN, or an
/// explicit [`ensure_built`](KdTree::ensure_built)); range queries on a stale
/// tree fall back to a linear scan instead of forcing a rebuild.
///
/// The cached tree lives in a [`OnceLock`], so building from a shared reference
/// is safe and the index stays `Sync` for parallel queries.
pub struct KdTree<T = ()> {
    entries: Vec<IndexEntry<T>>,
    tree: OnceLock<KdNodes>,
    bounds: BoundingBox,
}

impl<T> Default for KdTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KdTree<T> {
    pub fn new() -> Self {
        KdTree {
            entries: Vec::new(),
            // Empty and built: nothing to rebuild until the first insert.
            tree: OnceLock::from(KdNodes::empty()),
            bounds: BoundingBox::EMPTY,
        }
    }

    /// Builds a tree from `(point, data)` pairs in one go.
    pub fn from_entries<I>(items: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = (Point, T)>,
    {
        let mut tree = Self::new();
        tree.extend(items)?;
        tree.ensure_built();
        Ok(tree)
    }

    /// Whether the cached tree covers every inserted entry.
    pub fn is_built(&self) -> bool {
        self.tree.get().is_some()
    }

    /// Builds the tree now if insertions made it stale.
    pub fn ensure_built(&self) {
        self.built();
    }

    /// Number of levels of the built tree (0 when empty). Builds if stale.
    pub fn depth(&self) -> usize {
        self.built().depth
    }

    fn built(&self) -> &KdNodes {
        self.tree.get_or_init(|| {
            log::debug!("building k-d tree over {} entries", self.entries.len());
            Self::build(&self.entries)
        })
    }

    /// Node and entry indices are `u32`, with `u32::MAX` reserved for [`NIL`],
    /// so a tree holds fewer than 2^32 - 1 entries.
    fn build(entries: &[IndexEntry<T>]) -> KdNodes {
        debug_assert!(entries.len() < NIL as usize, "k-d tree limited to u32::MAX - 1 entries");
        let mut indices: Vec<u32> = (0..entries.len() as u32).collect();
        let mut nodes = Vec::with_capacity(entries.len());
        let mut depth = 0;
        let root = Self::build_recursive(entries, &mut indices, 0, &mut nodes, &mut depth);
        KdNodes { nodes, root, depth }
    }

    fn build_recursive(
        entries: &[IndexEntry<T>],
        indices: &mut [u32],
        level: usize,
        nodes: &mut Vec<KdNode>,
        depth: &mut usize,
    ) -> u32 {
        if indices.is_empty() {
            return NIL;
        }
        *depth = (*depth).max(level + 1);

        // Median split on the axis cycling with depth
        let axis = level % 3;
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            let va = entries[a as usize].point[axis];
            let vb = entries[b as usize].point[axis];
            va.partial_cmp(&vb).unwrap_or(Ordering::Equal)
        });
        let entry = indices[mid];

        let (lower, upper) = indices.split_at_mut(mid);
        let left = Self::build_recursive(entries, lower, level + 1, nodes, depth);
        let right = Self::build_recursive(entries, &mut upper[1..], level + 1, nodes, depth);

        let node_idx = nodes.len() as u32;
        nodes.push(KdNode {
            entry,
            axis: axis as u8,
            left,
            right,
        });
        node_idx
    }

    fn search_recursive<'a>(
        &'a self,
        nodes: &[KdNode],
        node_idx: u32,
        bounds: &BoundingBox,
        results: &mut Vec<&'a IndexEntry<T>>,
    ) {
        if node_idx == NIL {
            return;
        }
        let node = nodes[node_idx as usize];
        let entry = &self.entries[node.entry as usize];
        if bounds.contains(entry.point) {
            results.push(entry);
        }

        // Equal coordinates can land on either side of the median.
        let axis = node.axis as usize;
        let split = entry.point[axis];
        if bounds.min[axis] <= split {
            self.search_recursive(nodes, node.left, bounds, results);
        }
        if bounds.max[axis] >= split {
            self.search_recursive(nodes, node.right, bounds, results);
        }
    }

    fn nearest_recursive(
        &self,
        nodes: &[KdNode],
        node_idx: u32,
        point: Point,
        k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        if node_idx == NIL {
            return;
        }
        let node = nodes[node_idx as usize];
        let entry = &self.entries[node.entry as usize];

        let dist_sq = entry.point.distance_squared(point);
        if heap.len() < k {
            heap.push(Candidate { dist_sq, entry: node.entry });
        } else if heap.peek().is_some_and(|worst| dist_sq < worst.dist_sq) {
            heap.pop();
            heap.push(Candidate { dist_sq, entry: node.entry });
        }

        // Visit nearest child first
        let axis = node.axis as usize;
        let diff = point[axis] - entry.point[axis];
        let (first, second) = if diff <= 0.0 { (node.left, node.right) } else { (node.right, node.left) };

        self.nearest_recursive(nodes, first, point, k, heap);

        // The far side can only help if the splitting plane is closer than the current k-th best.
        let worth_visiting = heap.len() < k || heap.peek().is_some_and(|worst| diff * diff < worst.dist_sq);
        if worth_visiting {
            self.nearest_recursive(nodes, second, point, k, heap);
        }
    }
}

impl<T> SpatialIndex<T> for KdTree<T> {
    fn insert(&mut self, point: Point, data: T) -> Result<(), IndexError> {
        let point = check_finite(point)?;
        self.entries.push(IndexEntry::new(point, data));
        self.tree.take();
        self.bounds.expand_point(point);
        Ok(())
    }

    fn search(&self, bounds: &BoundingBox) -> Vec<&IndexEntry<T>> {
        let mut results = Vec::new();
        if self.entries.is_empty() || bounds.is_empty() || !bounds.intersects(&self.bounds) {
            return results;
        }
        match self.tree.get() {
            Some(tree) => self.search_recursive(&tree.nodes, tree.root, bounds, &mut results),
            None => results.extend(self.entries.iter().filter(|e| bounds.contains(e.point))),
        }
        results
    }

    fn nearest_neighbors(&self, point: Point, k: usize) -> Vec<Neighbor<'_, T>> {
        if k == 0 || self.entries.is_empty() || !point.is_finite() {
            return Vec::new();
        }
        let tree = self.built();
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.nearest_recursive(&tree.nodes, tree.root, point, k, &mut heap);

        heap.into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                entry: &self.entries[c.entry as usize],
                distance_sq: c.dist_sq,
            })
            .collect()
    }

    fn contains(&self, point: Point) -> bool {
        if !point.is_finite() {
            return false;
        }
        self.search(&BoundingBox::from_center_half_extent(point, EPSILON))
            .iter()
            .any(|e| approx_eq(e.point, point))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.tree = OnceLock::from(KdNodes::empty());
        self.bounds = BoundingBox::EMPTY;
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    fn visit_entries(&self, visitor: &mut dyn FnMut(&IndexEntry<T>)) {
        self.entries.iter().for_each(visitor);
    }
}

/// Max-heap item: the worst of the current k best sits on top.
struct Candidate {
    dist_sq: f64,
    entry: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist_sq == other.dist_sq
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq.partial_cmp(&other.dist_sq).unwrap_or(Ordering::Equal)
    }
}
