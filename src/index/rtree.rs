use crate::bounds::{BoundingBox, EPSILON, Point, approx_eq};
use crate::entry::{IndexEntry, Neighbor};
use crate::error::{IndexError, check_finite};
use crate::index::{SpatialIndex, k_smallest, with_distances};
use std::cmp::Ordering;

/// Configuration for [`RTree`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RTreeConfig {
    /// Fan-out bound for both leaves and internal nodes. The minimum fill is half of it.
    pub max_node_entries: usize,
}

impl Default for RTreeConfig {
    fn default() -> Self {
        Self { max_node_entries: 8 }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct NodeId(usize);

enum NodeKind<T> {
    Internal { children: Vec<NodeId> },
    Leaf { entries: Vec<IndexEntry<T>> },
}

struct Node<T> {
    /// Minimum bounding box of everything below this node.
    bounds: BoundingBox,
    parent: Option<NodeId>,
    kind: NodeKind<T>,
}

impl<T> Node<T> {
    fn empty_leaf(parent: Option<NodeId>) -> Self {
        Node {
            bounds: BoundingBox::EMPTY,
            parent,
            kind: NodeKind::Leaf { entries: Vec::new() },
        }
    }
}

/// A height-balanced R*-tree over points.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]; the parent
/// link is only used to walk back up after an insertion. Subtree selection
/// minimizes volume enlargement, and overflowing nodes are split at the median
/// along the axis of greatest spread.
pub struct RTree<T = ()> {
    nodes: Vec<Node<T>>,
    root: NodeId,
    height: usize,
    size: usize,
    max_entries: usize,
    min_entries: usize,
}

impl<T> RTree<T> {
    /// Creates an empty tree. Fails if `max_node_entries < 2`.
    pub fn new(config: RTreeConfig) -> Result<Self, IndexError> {
        if config.max_node_entries < 2 {
            return Err(IndexError::InvalidFanout(config.max_node_entries));
        }
        Ok(RTree {
            nodes: vec![Node::empty_leaf(None)],
            root: NodeId(0),
            height: 0,
            size: 0,
            max_entries: config.max_node_entries,
            min_entries: config.max_node_entries / 2,
        })
    }

    pub fn with_max_entries(max_node_entries: usize) -> Result<Self, IndexError> {
        Self::new(RTreeConfig { max_node_entries })
    }

    /// Number of internal levels above the leaves; 0 while the root is a leaf.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn max_node_entries(&self) -> usize {
        self.max_entries
    }

    pub fn min_node_entries(&self) -> usize {
        self.min_entries
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.nodes[id.0]
    }

    fn push_node(&mut self, node: Node<T>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Descends from the root, always into the child that needs the least
    /// volume enlargement. Ties prefer the smaller resulting box.
    fn choose_leaf(&self, point: Point) -> NodeId {
        let target = BoundingBox::from_point(point);
        let mut current = self.root;
        while let NodeKind::Internal { children } = &self.node(current).kind {
            let cost = |id: &NodeId| {
                let b = self.node(*id).bounds;
                let union = b.union_with(&target);
                (b.volume_increase(&target), union.volume(), union.margin() - b.margin())
            };
            let best = children
                .iter()
                .map(|id| (*id, cost(id)))
                .min_by(|(_, a), (_, b)| {
                    a.0.partial_cmp(&b.0)
                        .unwrap_or(Ordering::Equal)
                        .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                        .then(a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
                });
            let Some((next, _)) = best else {
                break;
            };
            current = next;
        }
        current
    }

    /// Axis along which the given boxes' centers spread the most.
    fn choose_split_axis<'b>(boxes: impl IntoIterator<Item = &'b BoundingBox>) -> usize {
        BoundingBox::from_points(boxes.into_iter().map(BoundingBox::center)).longest_axis()
    }

    /// Moves the upper half of an overflowing leaf into a new sibling leaf.
    fn split_leaf_node(&mut self, id: NodeId) -> NodeId {
        let parent = self.node(id).parent;
        let NodeKind::Leaf { entries } = &mut self.node_mut(id).kind else {
            return id;
        };
        let mut entries = std::mem::take(entries);

        let axis = BoundingBox::from_points(entries.iter().map(|e| e.point)).longest_axis();
        entries.sort_by(|a, b| a.point[axis].partial_cmp(&b.point[axis]).unwrap_or(Ordering::Equal));
        let upper = entries.split_off(entries.len().div_ceil(2));
        log::trace!("splitting leaf {:?} on axis {}: {} / {}", id, axis, entries.len(), upper.len());

        let node = self.node_mut(id);
        node.bounds = BoundingBox::from_points(entries.iter().map(|e| e.point));
        node.kind = NodeKind::Leaf { entries };

        self.push_node(Node {
            bounds: BoundingBox::from_points(upper.iter().map(|e| e.point)),
            parent,
            kind: NodeKind::Leaf { entries: upper },
        })
    }

    /// Moves the upper half of an overflowing internal node's children into a new sibling.
    fn split_internal_node(&mut self, id: NodeId) -> NodeId {
        let parent = self.node(id).parent;
        let NodeKind::Internal { children } = &mut self.node_mut(id).kind else {
            return id;
        };
        let mut children = std::mem::take(children);

        let axis = Self::choose_split_axis(children.iter().map(|c| &self.nodes[c.0].bounds));
        children.sort_by(|a, b| {
            let ca = self.node(*a).bounds.center()[axis];
            let cb = self.node(*b).bounds.center()[axis];
            ca.partial_cmp(&cb).unwrap_or(Ordering::Equal)
        });
        let upper = children.split_off(children.len().div_ceil(2));
        log::trace!("splitting node {:?} on axis {}: {} / {}", id, axis, children.len(), upper.len());

        let lower_bounds = self.union_of(&children);
        let upper_bounds = self.union_of(&upper);
        let node = self.node_mut(id);
        node.bounds = lower_bounds;
        node.kind = NodeKind::Internal { children };

        let sibling = self.push_node(Node {
            bounds: upper_bounds,
            parent,
            kind: NodeKind::Internal { children: Vec::new() },
        });
        for child in &upper {
            self.node_mut(*child).parent = Some(sibling);
        }
        self.node_mut(sibling).kind = NodeKind::Internal { children: upper };
        sibling
    }

    fn union_of(&self, children: &[NodeId]) -> BoundingBox {
        children
            .iter()
            .fold(BoundingBox::EMPTY, |acc, c| acc.union_with(&self.node(*c).bounds))
    }

    /// Walks from `node` to the root, attaching split-off siblings, refreshing
    /// bounding boxes, and splitting ancestors that overflow. A split of the
    /// root grows the tree by one level.
    fn adjust_tree(&mut self, mut node: NodeId, mut split: Option<NodeId>) {
        let max_entries = self.max_entries;
        loop {
            let Some(parent) = self.node(node).parent else {
                if let Some(sibling) = split {
                    let bounds = self.node(node).bounds.union_with(&self.node(sibling).bounds);
                    let new_root = self.push_node(Node {
                        bounds,
                        parent: None,
                        kind: NodeKind::Internal {
                            children: vec![node, sibling],
                        },
                    });
                    self.node_mut(node).parent = Some(new_root);
                    self.node_mut(sibling).parent = Some(new_root);
                    self.root = new_root;
                    self.height += 1;
                    log::debug!("r-tree root split, height now {}", self.height);
                }
                return;
            };

            let overflow = match &mut self.node_mut(parent).kind {
                NodeKind::Internal { children } => {
                    if let Some(sibling) = split {
                        children.push(sibling);
                    }
                    children.len() > max_entries
                }
                NodeKind::Leaf { .. } => false,
            };
            if let Some(sibling) = split {
                self.node_mut(sibling).parent = Some(parent);
            }
            let bounds = match &self.node(parent).kind {
                NodeKind::Internal { children } => self.union_of(children),
                NodeKind::Leaf { .. } => self.node(parent).bounds,
            };
            self.node_mut(parent).bounds = bounds;

            split = overflow.then(|| self.split_internal_node(parent));
            node = parent;
        }
    }
}

impl<T> SpatialIndex<T> for RTree<T> {
    fn insert(&mut self, point: Point, data: T) -> Result<(), IndexError> {
        let point = check_finite(point)?;
        let leaf = self.choose_leaf(point);

        let max_entries = self.max_entries;
        let node = self.node_mut(leaf);
        let overflow = match &mut node.kind {
            NodeKind::Leaf { entries } => {
                entries.push(IndexEntry::new(point, data));
                if entries.len() == 1 {
                    node.bounds = BoundingBox::from_point(point);
                } else {
                    node.bounds.expand_point(point);
                }
                entries.len() > max_entries
            }
            NodeKind::Internal { .. } => false,
        };
        self.size += 1;

        let split = overflow.then(|| self.split_leaf_node(leaf));
        self.adjust_tree(leaf, split);
        Ok(())
    }

    fn search(&self, bounds: &BoundingBox) -> Vec<&IndexEntry<T>> {
        let mut results = Vec::new();
        if self.size == 0 || bounds.is_empty() {
            return results;
        }
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if !node.bounds.intersects(bounds) {
                continue;
            }
            match &node.kind {
                NodeKind::Internal { children } => stack.extend(children.iter().copied()),
                NodeKind::Leaf { entries } => {
                    results.extend(entries.iter().filter(|e| bounds.contains(e.point)));
                }
            }
        }
        results
    }

    /// Scores every entry and keeps the `k` closest. No MBR pruning.
    fn nearest_neighbors(&self, point: Point, k: usize) -> Vec<Neighbor<'_, T>> {
        if k == 0 || self.size == 0 || !point.is_finite() {
            return Vec::new();
        }
        let mut all = Vec::with_capacity(self.size);
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match &self.node(id).kind {
                NodeKind::Internal { children } => stack.extend(children.iter().copied()),
                NodeKind::Leaf { entries } => all.extend(entries.iter()),
            }
        }
        k_smallest(with_distances(all, point), k)
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
        self.nodes.clear();
        self.nodes.push(Node::empty_leaf(None));
        self.root = NodeId(0);
        self.height = 0;
        self.size = 0;
    }

    fn len(&self) -> usize {
        self.size
    }

    fn bounds(&self) -> BoundingBox {
        self.node(self.root).bounds
    }

    fn visit_entries(&self, visitor: &mut dyn FnMut(&IndexEntry<T>)) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match &self.node(id).kind {
                NodeKind::Internal { children } => stack.extend(children.iter().copied()),
                NodeKind::Leaf { entries } => entries.iter().for_each(&mut *visitor),
            }
        }
    }
}
