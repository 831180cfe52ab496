//! # spacethree
//!
//! `spacethree` is a Rust library of in-memory 3D spatial indices, designed to be used in Rust
//! as well as compiled to WebAssembly (WASM). It stores points with an opaque payload and answers
//! range, radius, k-nearest-neighbor and exact-match queries.
//!
//! ## Features
//!
//! - **Four interchangeable indices** behind the [`SpatialIndex`] trait:
//!   - [`CellsIndex`]: unbounded uniform hash grid with O(1) insertion.
//!   - [`KdTree`]: median-balanced k-d tree, rebuilt lazily after insertions.
//!   - [`Octree`]: adaptive octree whose root doubles to follow the data.
//!   - [`RTree`]: height-balanced R*-tree with volume-driven subtree selection.
//! - **Shared model**: one [`BoundingBox`] with the usual volume/margin/overlap metrics and one
//!   [`IndexEntry`] type carrying any payload.
//! - **Parallel queries**: batches of k-NN queries fan out over `rayon`.
//! - **WASM-first**: the indices are exposed to JavaScript and TypeScript through `wasm-bindgen`.
//!
//! ## Example
//!
//! ```
//! use spacethree::{BoundingBox, KdTree, Point, SpatialIndex};
//!
//! let mut tree = KdTree::new();
//! tree.insert(Point::new(0.0, 0.0, 0.0), "origin").unwrap();
//! tree.insert(Point::new(10.0, 0.0, 0.0), "far").unwrap();
//!
//! let nearest = tree.nearest_neighbors(Point::new(1.0, 1.0, 1.0), 1);
//! assert_eq!(*nearest[0].data(), "origin");
//!
//! let hits = tree.search(&BoundingBox::new([5.0, -1.0, -1.0], [15.0, 1.0, 1.0]));
//! assert_eq!(hits.len(), 1);
//! ```
//!
//! ## Threading
//!
//! Indices are not internally synchronized. Mutation needs `&mut`, so a single writer is
//! enforced by the borrow checker; wrap an index in a lock to share a writer across threads.

mod bounds;
mod entry;
mod error;
pub mod index;
mod wasm;

pub use bounds::BoundingBox;
pub use bounds::EPSILON;
pub use bounds::Point;
pub use bounds::octant_code;
pub use entry::IndexEntry;
pub use entry::Neighbor;
pub use error::IndexError;
pub use index::SpatialIndex;
pub use index::cells::{CellsConfig, CellsIndex};
pub use index::kdtree::KdTree;
pub use index::octree::{Octree, OctreeConfig};
pub use index::rtree::{RTree, RTreeConfig};
pub use wasm::{BoundingBox3D, Nearest3D, SpatialIndex3D};
