use crate::bounds::{BoundingBox, Point};
use crate::entry::{IndexEntry, Neighbor};
use crate::error::IndexError;
use rayon::prelude::*;
use std::cmp::Ordering;

pub mod cells;
pub mod kdtree;
pub mod octree;
pub mod rtree;

/// Trait shared by every spatial index.
/// This allows swapping between the Cells, K-d tree, Octree and R*-tree variants.
///
/// Indices are in-memory and single-writer: mutation takes `&mut self`, while
/// any number of queries may run concurrently on a shared reference (see
/// [`nearest_neighbors_batch`](SpatialIndex::nearest_neighbors_batch)).
pub trait SpatialIndex<T> {
    /// Inserts a point with its payload.
    ///
    /// Fails with [`IndexError::NonFinitePoint`] on NaN or infinite coordinates,
    /// in which case the index is left untouched.
    fn insert(&mut self, point: Point, data: T) -> Result<(), IndexError>;

    /// All entries whose point lies inside `bounds` (inclusive on every face).
    fn search(&self, bounds: &BoundingBox) -> Vec<&IndexEntry<T>>;

    /// Up to `k` entries closest to `point`, sorted by non-decreasing distance.
    fn nearest_neighbors(&self, point: Point, k: usize) -> Vec<Neighbor<'_, T>>;

    /// Whether an entry within [`EPSILON`](crate::EPSILON) of `point` (per axis) exists.
    fn contains(&self, point: Point) -> bool;

    /// Removes every entry. Configuration is kept.
    fn clear(&mut self);

    /// Number of successful insertions since construction or the last clear.
    fn len(&self) -> usize;

    /// Running bounding box of every inserted point.
    fn bounds(&self) -> BoundingBox;

    /// Calls `visitor` once for every stored entry, in no particular order.
    fn visit_entries(&self, visitor: &mut dyn FnMut(&IndexEntry<T>));

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a point carrying the default payload.
    fn insert_point(&mut self, point: Point) -> Result<(), IndexError>
    where
        T: Default,
    {
        self.insert(point, T::default())
    }

    /// All entries within distance `radius` of `center`, boundary included.
    fn search_radius(&self, center: Point, radius: f64) -> Vec<&IndexEntry<T>> {
        if !(radius >= 0.0) || !center.is_finite() {
            return Vec::new();
        }
        let r_sq = radius * radius;
        let mut found = self.search(&BoundingBox::from_center_half_extent(center, radius));
        found.retain(|e| e.point.distance_squared(center) <= r_sq);
        found
    }

    /// Inserts every `(point, data)` pair, stopping at the first failure.
    fn extend<I>(&mut self, items: I) -> Result<(), IndexError>
    where
        Self: Sized,
        I: IntoIterator<Item = (Point, T)>,
    {
        for (point, data) in items {
            self.insert(point, data)?;
        }
        Ok(())
    }

    /// Runs one k-NN query per point in parallel.
    fn nearest_neighbors_batch(&self, points: &[Point], k: usize) -> Vec<Vec<Neighbor<'_, T>>>
    where
        Self: Sized + Sync,
        T: Sync,
    {
        points
            .par_iter()
            .map(|&p| self.nearest_neighbors(p, k))
            .collect()
    }
}

pub(crate) fn cmp_distance<T>(a: &Neighbor<'_, T>, b: &Neighbor<'_, T>) -> Ordering {
    a.distance_sq
        .partial_cmp(&b.distance_sq)
        .unwrap_or(Ordering::Equal)
}

/// Keeps the `k` closest candidates and sorts them by ascending distance.
pub(crate) fn k_smallest<T>(mut candidates: Vec<Neighbor<'_, T>>, k: usize) -> Vec<Neighbor<'_, T>> {
    if k == 0 {
        return Vec::new();
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, cmp_distance);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(cmp_distance);
    candidates
}

/// Pairs every entry with its squared distance to `point`.
pub(crate) fn with_distances<'a, T, I>(entries: I, point: Point) -> Vec<Neighbor<'a, T>>
where
    I: IntoIterator<Item = &'a IndexEntry<T>>,
    T: 'a,
{
    entries
        .into_iter()
        .map(|entry| Neighbor {
            entry,
            distance_sq: entry.point.distance_squared(point),
        })
        .collect()
}
