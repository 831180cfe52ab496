use crate::bounds::Point;
use thiserror::Error;

/// Errors reported by index construction and insertion.
///
/// Invalid configuration is a programmer error and is reported once, at
/// construction. The only runtime failure is a non-finite coordinate, which is
/// rejected before the index is touched.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum IndexError {
    /// The cells index needs a finite, strictly positive cell size.
    #[error("cell size must be finite and > 0, got {0}")]
    InvalidCellSize(f64),

    /// An octree leaf must be allowed to hold at least one entry.
    #[error("max entries per octree node must be >= 1, got {0}")]
    InvalidNodeCapacity(usize),

    /// An R*-tree node must hold at least two entries to be split.
    #[error("max node entries must be >= 2, got {0}")]
    InvalidFanout(usize),

    /// The octree initial half width must be finite and > 0.
    #[error("initial half width must be finite and > 0, got {0}")]
    InvalidHalfWidth(f64),

    /// Points with NaN or infinite coordinates cannot be indexed.
    #[error("point {0} has a non-finite coordinate")]
    NonFinitePoint(Point),
}

/// Rejects points with NaN or infinite coordinates.
pub(crate) fn check_finite(point: Point) -> Result<Point, IndexError> {
    if point.is_finite() {
        Ok(point)
    } else {
        Err(IndexError::NonFinitePoint(point))
    }
}
