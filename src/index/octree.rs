use crate::bounds::{BoundingBox, EPSILON, Point, approx_eq, octant_code};
use crate::entry::{IndexEntry, Neighbor};
use crate::error::{IndexError, check_finite};
use crate::index::{SpatialIndex, k_smallest, with_distances};

/// Configuration for [`Octree`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OctreeConfig {
    /// A leaf holding more entries than this is split into eight children.
    pub max_entries_per_node: usize,
    /// Subdivision limit, counted from the root at insertion time. Root doubling
    /// later pushes existing leaves deeper, so [`Octree::depth`] may exceed it.
    pub max_depth: usize,
    /// Half the side length of the root cell created around the first point.
    pub initial_half_width: f64,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_entries_per_node: 8,
            max_depth: 21,
            initial_half_width: 1024.0,
        }
    }
}

/// A cell of the octree: a leaf with entries, or a parent of exactly eight cells.
struct OctreeNode<T> {
    bounds: BoundingBox,
    /// Split point of this cell. Stored so that child faces and octant routing
    /// use the very same coordinates.
    center: Point,
    entries: Vec<IndexEntry<T>>,
    children: Option<Box<[OctreeNode<T>; 8]>>,
}

impl<T> OctreeNode<T> {
    fn leaf(bounds: BoundingBox, center: Point) -> Self {
        OctreeNode {
            bounds,
            center,
            entries: Vec::new(),
            children: None,
        }
    }

    fn child_leaves(&self) -> Box<[OctreeNode<T>; 8]> {
        Box::new(std::array::from_fn(|code| {
            let bounds = self.bounds.split_octant(self.center, code);
            OctreeNode::leaf(bounds, bounds.center())
        }))
    }

    fn insert_recursive(&mut self, entry: IndexEntry<T>, depth: usize, config: &OctreeConfig) {
        if let Some(children) = &mut self.children {
            let code = octant_code(self.center, entry.point);
            children[code].insert_recursive(entry, depth + 1, config);
            return;
        }

        self.entries.push(entry);
        if self.entries.len() > config.max_entries_per_node && depth < config.max_depth {
            self.subdivide(depth, config);
        }
    }

    /// Turns this leaf into a parent and pushes its entries down by octant.
    fn subdivide(&mut self, depth: usize, config: &OctreeConfig) {
        log::trace!("subdividing octree leaf at depth {} with {} entries", depth, self.entries.len());
        let mut children = self.child_leaves();
        for entry in std::mem::take(&mut self.entries) {
            let code = octant_code(self.center, entry.point);
            children[code].entries.push(entry);
        }
        // Everything may have landed in one octant.
        for child in children.iter_mut() {
            if child.entries.len() > config.max_entries_per_node && depth + 1 < config.max_depth {
                child.subdivide(depth + 1, config);
            }
        }
        self.children = Some(children);
    }

    fn search_recursive<'a>(&'a self, bounds: &BoundingBox, results: &mut Vec<&'a IndexEntry<T>>) {
        if !self.bounds.intersects(bounds) {
            return;
        }
        match &self.children {
            Some(children) => {
                for child in children.iter() {
                    child.search_recursive(bounds, results);
                }
            }
            None => results.extend(self.entries.iter().filter(|e| bounds.contains(e.point))),
        }
    }

    fn visit_recursive<'a, F>(&'a self, visitor: &mut F)
    where
        F: FnMut(&'a IndexEntry<T>),
    {
        match &self.children {
            Some(children) => {
                for child in children.iter() {
                    child.visit_recursive(&mut *visitor);
                }
            }
            None => self.entries.iter().for_each(visitor),
        }
    }

    fn depth(&self) -> usize {
        match &self.children {
            Some(children) => 1 + children.iter().map(OctreeNode::depth).max().unwrap_or(0),
            None => 0,
        }
    }
}

/// An octree over an unbounded domain.
///
/// The root cell is created around the first point and doubled in size, away
/// from its opposite corner, whenever a point falls outside it; it never
/// shrinks until [`clear`](SpatialIndex::clear). Leaves split into eight
/// children once they hold more than `max_entries_per_node` entries, unless
/// they already sit at `max_depth`.
pub struct Octree<T = ()> {
    config: OctreeConfig,
    root: Option<OctreeNode<T>>,
    size: usize,
    bounds: BoundingBox,
}

impl<T> Octree<T> {
    /// Creates an empty octree.
    ///
    /// # Errors
    ///
    /// * [`IndexError::InvalidNodeCapacity`] if `max_entries_per_node` is zero.
    /// * [`IndexError::InvalidHalfWidth`] if `initial_half_width` is not finite and positive.
    pub fn new(config: OctreeConfig) -> Result<Self, IndexError> {
        if config.max_entries_per_node < 1 {
            return Err(IndexError::InvalidNodeCapacity(config.max_entries_per_node));
        }
        if !(config.initial_half_width.is_finite() && config.initial_half_width > 0.0) {
            return Err(IndexError::InvalidHalfWidth(config.initial_half_width));
        }
        Ok(Octree {
            config,
            root: None,
            size: 0,
            bounds: BoundingBox::EMPTY,
        })
    }

    pub fn with_capacity(max_entries_per_node: usize) -> Result<Self, IndexError> {
        Self::new(OctreeConfig {
            max_entries_per_node,
            ..OctreeConfig::default()
        })
    }

    pub fn max_entries_per_node(&self) -> usize {
        self.config.max_entries_per_node
    }

    pub fn max_depth(&self) -> usize {
        self.config.max_depth
    }

    /// The current root cell, if anything was inserted.
    pub fn root_bounds(&self) -> Option<BoundingBox> {
        self.root.as_ref().map(|root| root.bounds)
    }

    /// Depth of the deepest leaf below the root (0 for a single leaf). Not
    /// bounded by `max_depth` once the root has doubled.
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, OctreeNode::depth)
    }

    /// Doubles `root` until it encloses `point`, one new parent per step.
    ///
    /// On each axis the old root becomes the upper half if the point lies below
    /// it and the lower half otherwise. The new split point is the shared face,
    /// so the old root fits its octant exactly.
    fn grow_to_enclose(mut root: OctreeNode<T>, point: Point) -> OctreeNode<T> {
        let mut steps = 0;
        while !root.bounds.contains(point) {
            let old = root.bounds;
            let size = old.max - old.min;
            let mut bounds = old;
            let mut center = old.max;
            for axis in 0..3 {
                if point[axis] < old.min[axis] {
                    bounds.min[axis] = old.min[axis] - size[axis];
                    center[axis] = old.min[axis];
                } else {
                    bounds.max[axis] = old.max[axis] + size[axis];
                }
            }

            let mut parent = OctreeNode::leaf(bounds, center);
            let mut children = parent.child_leaves();
            let code = octant_code(center, old.center());
            children[code] = root;
            parent.children = Some(children);
            root = parent;
            steps += 1;
        }
        if steps > 0 {
            log::debug!("octree root doubled {} time(s), now {:?}", steps, root.bounds);
        }
        root
    }
}

impl<T> SpatialIndex<T> for Octree<T> {
    fn insert(&mut self, point: Point, data: T) -> Result<(), IndexError> {
        let point = check_finite(point)?;
        let root = match self.root.take() {
            Some(root) => Self::grow_to_enclose(root, point),
            None => OctreeNode::leaf(
                BoundingBox::from_center_half_extent(point, self.config.initial_half_width),
                point,
            ),
        };
        let root = self.root.insert(root);
        root.insert_recursive(IndexEntry::new(point, data), 0, &self.config);
        self.bounds.expand_point(point);
        self.size += 1;
        Ok(())
    }

    fn search(&self, bounds: &BoundingBox) -> Vec<&IndexEntry<T>> {
        let mut results = Vec::new();
        if let Some(root) = &self.root {
            if !bounds.is_empty() {
                root.search_recursive(bounds, &mut results);
            }
        }
        results
    }

    /// Scores every entry and keeps the `k` closest. No spatial pruning.
    fn nearest_neighbors(&self, point: Point, k: usize) -> Vec<Neighbor<'_, T>> {
        if k == 0 || !point.is_finite() {
            return Vec::new();
        }
        let Some(root) = &self.root else {
            return Vec::new();
        };
        let mut all = Vec::with_capacity(self.size);
        root.visit_recursive(&mut |entry| all.push(entry));
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
        self.root = None;
        self.size = 0;
        self.bounds = BoundingBox::EMPTY;
    }

    fn len(&self) -> usize {
        self.size
    }

    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    fn visit_entries(&self, visitor: &mut dyn FnMut(&IndexEntry<T>)) {
        if let Some(root) = &self.root {
            root.visit_recursive(&mut |entry| visitor(entry));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn small_config() -> OctreeConfig {
        OctreeConfig {
            max_entries_per_node: 2,
            max_depth: 4,
            initial_half_width: 1.0,
        }
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert_eq!(
            Octree::<()>::with_capacity(0).err(),
            Some(IndexError::InvalidNodeCapacity(0))
        );
        assert!(Octree::<()>::with_capacity(1).is_ok());
    }

    #[test]
    fn test_root_grows_and_keeps_entries() {
        let mut tree = Octree::new(small_config()).unwrap();
        tree.insert(DVec3::ZERO, 0).unwrap();
        assert_eq!(tree.root_bounds(), Some(BoundingBox::new([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0])));

        tree.insert(DVec3::new(-3.5, 0.5, 2.5), 1).unwrap();
        let root = tree.root_bounds().unwrap();
        assert!(root.contains(DVec3::new(-3.5, 0.5, 2.5)));
        assert!(root.contains(DVec3::ZERO));
        // Two doublings: side 2 -> 4 -> 8.
        assert_eq!(root.extent(), DVec3::splat(8.0));

        let all = tree.search(&root);
        assert_eq!(all.len(), 2);
        assert!(tree.contains(DVec3::ZERO));
        assert!(tree.contains(DVec3::new(-3.5, 0.5, 2.5)));
    }

    #[test]
    fn test_overflow_subdivides_until_max_depth() {
        let mut tree = Octree::new(small_config()).unwrap();
        // Identical points cannot be separated; the depth cap must stop the split.
        for i in 0..10 {
            tree.insert(DVec3::splat(0.25), i).unwrap();
        }
        assert_eq!(tree.depth(), 4);
        assert_eq!(tree.len(), 10);
        assert_eq!(tree.search(&BoundingBox::from_point([0.25, 0.25, 0.25])).len(), 10);
    }

    #[test]
    fn test_root_doubling_pushes_leaves_past_max_depth() {
        let mut tree = Octree::new(small_config()).unwrap();
        for i in 0..10 {
            tree.insert(DVec3::splat(0.25), i).unwrap();
        }
        assert_eq!(tree.depth(), tree.max_depth());

        tree.insert(DVec3::splat(1000.0), 10).unwrap();
        assert!(tree.depth() > tree.max_depth());
        assert!(tree.contains(DVec3::splat(0.25)));
        assert!(tree.contains(DVec3::splat(1000.0)));
        assert_eq!(tree.search(&BoundingBox::from_point([0.25, 0.25, 0.25])).len(), 10);
    }

    #[test]
    fn test_points_on_split_faces() {
        let mut tree = Octree::new(small_config()).unwrap();
        let points = [
            DVec3::ZERO,
            DVec3::new(0.5, 0.0, 0.0),
            DVec3::new(0.0, 0.5, 0.0),
            DVec3::new(0.0, 0.0, 0.5),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(-1.0, -1.0, -1.0),
        ];
        for (i, p) in points.iter().enumerate() {
            tree.insert(*p, i).unwrap();
        }
        for p in points {
            assert!(tree.contains(p), "lost {p}");
        }
    }
}
