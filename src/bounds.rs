use glam::DVec3;
use rand::Rng;

/// The coordinate type stored by every index.
pub type Point = DVec3;

/// Absolute per-axis tolerance used by exact-match lookups.
pub const EPSILON: f64 = 10.0 * f64::EPSILON;

/// Axis-aligned bounding box in 3D space.
///
/// The box is closed: points on any of its six faces are contained, and two
/// boxes sharing a face intersect. A box with `min > max` on some axis encloses
/// nothing; [`BoundingBox::EMPTY`] is the canonical such box and is the
/// starting point for incremental [`expand`](BoundingBox::expand) calls.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// The uninitialized box. Expanding it by anything yields exactly that thing.
    pub const EMPTY: Self = Self {
        min: DVec3::INFINITY,
        max: DVec3::NEG_INFINITY,
    };

    pub fn new(min: impl Into<Point>, max: impl Into<Point>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn empty() -> Self {
        Self::EMPTY
    }

    /// Degenerate box enclosing exactly one point.
    pub fn from_point(point: impl Into<Point>) -> Self {
        let p = point.into();
        Self { min: p, max: p }
    }

    /// Smallest box enclosing every point of the iterator, [`EMPTY`](Self::EMPTY) if none.
    pub fn from_points<I, P>(points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Point>,
    {
        let mut bounds = Self::EMPTY;
        for p in points {
            bounds.expand_point(p.into());
        }
        bounds
    }

    pub fn from_center_half_extent(center: impl Into<Point>, half_extent: f64) -> Self {
        let c = center.into();
        let h = DVec3::splat(half_extent);
        Self { min: c - h, max: c + h }
    }

    /// Whether the box encloses no point at all (`min > max` on some axis).
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Point {
        (self.min + self.max) * 0.5
    }

    /// Per-axis side lengths, zero for an empty box.
    pub fn extent(&self) -> DVec3 {
        if self.is_empty() {
            DVec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Index (0, 1 or 2) of the axis with the largest extent. Ties go to the lower axis.
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    pub fn surface_area(&self) -> f64 {
        let e = self.extent();
        2.0 * (e.x * e.y + e.y * e.z + e.z * e.x)
    }

    /// Sum of the side lengths.
    pub fn margin(&self) -> f64 {
        let e = self.extent();
        e.x + e.y + e.z
    }

    pub fn contains(&self, point: impl Into<Point>) -> bool {
        let p = point.into();
        self.min.cmple(p).all() && p.cmple(self.max).all()
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    /// True unless the boxes are strictly separated along some axis.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    pub fn union_with(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Overlap of the two boxes. Non-overlapping inputs give an empty box; check
    /// [`intersects`](Self::intersects) first when that matters.
    pub fn intersection_with(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Growth in volume needed to also enclose `other`. Zero if it already does.
    pub fn volume_increase(&self, other: &BoundingBox) -> f64 {
        self.union_with(other).volume() - self.volume()
    }

    pub fn expand(&mut self, other: &BoundingBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn expand_point(&mut self, point: Point) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Squared distance from `point` to the closest point of the box, zero inside.
    pub fn distance_squared_to(&self, point: Point) -> f64 {
        let d = (self.min - point).max(DVec3::ZERO).max(point - self.max);
        d.length_squared()
    }

    /// Octant code of `point` relative to the box midpoint:
    /// bit 0 is `x >= mid`, bit 1 is `y >= mid`, bit 2 is `z >= mid`.
    pub fn octant_of(&self, point: Point) -> usize {
        octant_code(self.center(), point)
    }

    /// The sub-box covering octant `code` (see [`octant_of`](Self::octant_of)).
    pub fn octant(&self, code: usize) -> BoundingBox {
        self.split_octant(self.center(), code)
    }

    /// The sub-box covering octant `code` when the box is split at `center`.
    ///
    /// Each face comes verbatim from either the box or `center`, so the eight
    /// octants tile the box exactly and agree with [`octant_code`].
    pub fn split_octant(&self, center: Point, code: usize) -> BoundingBox {
        let pick = |bit: usize, lo: f64, mid: f64, hi: f64| {
            if code & bit != 0 { (mid, hi) } else { (lo, mid) }
        };
        let (min_x, max_x) = pick(1, self.min.x, center.x, self.max.x);
        let (min_y, max_y) = pick(2, self.min.y, center.y, self.max.y);
        let (min_z, max_z) = pick(4, self.min.z, center.z, self.max.z);
        BoundingBox::new([min_x, min_y, min_z], [max_x, max_y, max_z])
    }

    /// Uniformly samples a point inside a non-empty box.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        DVec3::new(
            rng.gen_range(self.min.x..=self.max.x),
            rng.gen_range(self.min.y..=self.max.y),
            rng.gen_range(self.min.z..=self.max.z),
        )
    }

    pub fn random_points<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Point> {
        (0..count).map(|_| self.random_point(&mut *rng)).collect()
    }
}

/// Octant bit code of `point` around `center`: bit 0 is `x >= center.x`,
/// bit 1 is `y >= center.y`, bit 2 is `z >= center.z`.
pub fn octant_code(center: Point, point: Point) -> usize {
    (point.x >= center.x) as usize | ((point.y >= center.y) as usize) << 1 | ((point.z >= center.z) as usize) << 2
}

/// Epsilon-tolerant point equality.
pub(crate) fn approx_eq(a: Point, b: Point) -> bool {
    (a - b).abs().cmple(DVec3::splat(EPSILON)).all()
}
