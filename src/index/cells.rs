use crate::bounds::{BoundingBox, Point, approx_eq};
use crate::entry::{IndexEntry, Neighbor};
use crate::error::{IndexError, check_finite};
use crate::index::{SpatialIndex, k_smallest, with_distances};
use std::collections::HashMap;

/// Number of times the k-NN search cube is doubled before falling back to a full scan.
const MAX_DOUBLINGS: usize = 64;

type CellKey = [i64; 3];

/// Configuration for [`CellsIndex`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CellsConfig {
    /// Side length of every grid cell.
    pub cell_size: f64,
}

impl Default for CellsConfig {
    fn default() -> Self {
        Self { cell_size: 1.0 }
    }
}

/// A spatial index based on an unbounded uniform grid.
///
/// Points are hashed into cubic cells of side `cell_size`, keyed by the integer
/// coordinates `floor(p / cell_size)`. Only occupied cells are stored, so the
/// grid needs no bounds up front and insertion is O(1) amortized. It works
/// best when the cell size is close to the typical query radius and the
/// distribution is reasonably uniform.
pub struct CellsIndex<T = ()> {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<IndexEntry<T>>>,
    size: usize,
    bounds: BoundingBox,
}

impl<T> CellsIndex<T> {
    /// Creates an empty grid. Fails if the cell size is not finite and positive.
    pub fn new(config: CellsConfig) -> Result<Self, IndexError> {
        if !(config.cell_size.is_finite() && config.cell_size > 0.0) {
            return Err(IndexError::InvalidCellSize(config.cell_size));
        }
        Ok(Self {
            cell_size: config.cell_size,
            cells: HashMap::new(),
            size: 0,
            bounds: BoundingBox::EMPTY,
        })
    }

    pub fn with_cell_size(cell_size: f64) -> Result<Self, IndexError> {
        Self::new(CellsConfig { cell_size })
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Integer coordinates of the cell holding `point`. Out-of-range values saturate.
    fn cell_key(&self, point: Point) -> CellKey {
        let k = (point / self.cell_size).floor();
        [k.x as i64, k.y as i64, k.z as i64]
    }

    /// Entries of every cell whose key lies in `[lo, hi]`, unfiltered.
    fn visit_cell_range<'a>(&'a self, lo: CellKey, hi: CellKey, visitor: &mut impl FnMut(&'a IndexEntry<T>)) {
        let span = |axis: usize| (hi[axis] as i128 - lo[axis] as i128 + 1).max(0);
        let candidates = span(0).saturating_mul(span(1)).saturating_mul(span(2));

        // Sparse data under a large query: walking the occupied cells is cheaper.
        if candidates > self.cells.len() as i128 {
            for (key, bin) in &self.cells {
                if (0..3).all(|a| lo[a] <= key[a] && key[a] <= hi[a]) {
                    bin.iter().for_each(&mut *visitor);
                }
            }
            return;
        }

        for x in lo[0]..=hi[0] {
            for y in lo[1]..=hi[1] {
                for z in lo[2]..=hi[2] {
                    if let Some(bin) = self.cells.get(&[x, y, z]) {
                        bin.iter().for_each(&mut *visitor);
                    }
                }
            }
        }
    }

    /// Closest `k` entries among those inside the cube `center ± half_width`, plus
    /// how many entries the cube held.
    fn nearest_in_cube(&self, center: Point, half_width: f64, k: usize) -> (Vec<Neighbor<'_, T>>, usize) {
        let found = self.search(&BoundingBox::from_center_half_extent(center, half_width));
        let count = found.len();
        (k_smallest(with_distances(found, center), k), count)
    }
}

impl<T> SpatialIndex<T> for CellsIndex<T> {
    fn insert(&mut self, point: Point, data: T) -> Result<(), IndexError> {
        let point = check_finite(point)?;
        let key = self.cell_key(point);
        self.cells
            .entry(key)
            .or_default()
            .push(IndexEntry::new(point, data));
        self.bounds.expand_point(point);
        self.size += 1;
        Ok(())
    }

    fn search(&self, bounds: &BoundingBox) -> Vec<&IndexEntry<T>> {
        let mut results = Vec::new();
        if self.size == 0 || bounds.is_empty() || !bounds.intersects(&self.bounds) {
            return results;
        }
        // Nothing lives outside the running bounds, so only enumerate the overlap.
        let clipped = bounds.intersection_with(&self.bounds);
        let lo = self.cell_key(clipped.min);
        let hi = self.cell_key(clipped.max);
        self.visit_cell_range(lo, hi, &mut |entry| {
            if bounds.contains(entry.point) {
                results.push(entry);
            }
        });
        results
    }

    /// Grows a search cube from one cell width, doubling until it holds `k`
    /// entries, then widens it once more to the k-th distance so the answer
    /// is exact rather than cube-shaped.
    fn nearest_neighbors(&self, point: Point, k: usize) -> Vec<Neighbor<'_, T>> {
        if k == 0 || self.size == 0 || !point.is_finite() {
            return Vec::new();
        }
        let k = k.min(self.size);

        let mut half_width = self.cell_size;
        for _ in 0..MAX_DOUBLINGS {
            let (nearest, count) = self.nearest_in_cube(point, half_width, k);
            if count >= k {
                let kth = nearest[k - 1].distance_sq.sqrt();
                if kth <= half_width {
                    return nearest;
                }
                // The ball of radius kth may poke out of the cube.
                return self.nearest_in_cube(point, kth, k).0;
            }
            if BoundingBox::from_center_half_extent(point, half_width).contains_box(&self.bounds) {
                break;
            }
            half_width *= 2.0;
        }

        let mut all = Vec::with_capacity(self.size);
        for bin in self.cells.values() {
            all.extend(bin.iter());
        }
        k_smallest(with_distances(all, point), k)
    }

    /// Scans the 3x3x3 block of cells around `point`, so a match that rounded
    /// into a neighboring cell is still found.
    fn contains(&self, point: Point) -> bool {
        if self.size == 0 || !point.is_finite() {
            return false;
        }
        let [x, y, z] = self.cell_key(point);
        let lo = [x.saturating_sub(1), y.saturating_sub(1), z.saturating_sub(1)];
        let hi = [x.saturating_add(1), y.saturating_add(1), z.saturating_add(1)];
        let mut found = false;
        self.visit_cell_range(lo, hi, &mut |entry| {
            found |= approx_eq(entry.point, point);
        });
        found
    }

    fn clear(&mut self) {
        self.cells.clear();
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
        for bin in self.cells.values() {
            bin.iter().for_each(&mut *visitor);
        }
    }
}
