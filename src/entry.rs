use crate::bounds::Point;

/// A point stored in an index together with its payload.
///
/// The payload is opaque to every index: it is moved in on insertion, handed
/// back by reference on queries, and never compared or inspected. Equality
/// therefore only looks at the point.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexEntry<T = ()> {
    pub point: Point,
    pub data: T,
}

impl<T> IndexEntry<T> {
    pub fn new(point: Point, data: T) -> Self {
        Self { point, data }
    }
}

impl<T> PartialEq for IndexEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.point == other.point
    }
}

/// One result of a k-nearest-neighbor query.
#[derive(Debug)]
pub struct Neighbor<'a, T> {
    pub entry: &'a IndexEntry<T>,
    /// Squared Euclidean distance from the query point.
    pub distance_sq: f64,
}

impl<T> Clone for Neighbor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Neighbor<'_, T> {}

impl<'a, T> Neighbor<'a, T> {
    pub fn point(&self) -> Point {
        self.entry.point
    }

    pub fn data(&self) -> &'a T {
        &self.entry.data
    }

    pub fn distance(&self) -> f64 {
        self.distance_sq.sqrt()
    }
}
