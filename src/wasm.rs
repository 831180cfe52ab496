use crate::bounds::{BoundingBox, Point};
use crate::index::SpatialIndex;
use crate::index::cells::{CellsConfig, CellsIndex};
use crate::index::kdtree::KdTree;
use crate::index::octree::{Octree, OctreeConfig};
use crate::index::rtree::{RTree, RTreeConfig};
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_rayon::init_thread_pool;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init_threads(n: usize) -> js_sys::Promise {
    init_thread_pool(n)
}

#[wasm_bindgen(typescript_custom_section)]
const TS_INDEX_KINDS: &'static str = r#"
export type IndexKind = "cells" | "kdtree" | "octree" | "rtree";
"#;

// --- Bounding Box ---

/// Represents an axis-aligned bounding box in 3D space.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug)]
pub struct BoundingBox3D {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

#[wasm_bindgen]
impl BoundingBox3D {
    #[wasm_bindgen(constructor)]
    pub fn new(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> BoundingBox3D {
        BoundingBox3D {
            min_x,
            min_y,
            min_z,
            max_x,
            max_y,
            max_z,
        }
    }

    pub fn volume(&self) -> f64 {
        BoundingBox::from(*self).volume()
    }
}

impl From<BoundingBox3D> for BoundingBox {
    fn from(b: BoundingBox3D) -> Self {
        BoundingBox::new([b.min_x, b.min_y, b.min_z], [b.max_x, b.max_y, b.max_z])
    }
}

impl From<BoundingBox> for BoundingBox3D {
    fn from(b: BoundingBox) -> Self {
        BoundingBox3D::new(b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z)
    }
}

// --- Nearest ---

/// Result of a k-NN query: entry ids and distances, nearest first.
#[wasm_bindgen]
pub struct Nearest3D {
    ids: Vec<u32>,
    distances: Vec<f64>,
}

#[wasm_bindgen]
impl Nearest3D {
    #[wasm_bindgen(getter)]
    pub fn ids(&self) -> Vec<u32> {
        self.ids.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn distances(&self) -> Vec<f64> {
        self.distances.clone()
    }
}

// --- Spatial Index ---

/// Any of the four indices, storing a numeric id per point.
#[wasm_bindgen(js_name = SpatialIndex3D)]
pub struct SpatialIndex3D {
    inner: Box<dyn SpatialIndex<u32>>,
}

fn to_js(err: crate::IndexError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Last id of `count` consecutive ids starting at `first`, `None` if it does not fit a `u32`.
fn last_id(first: u32, count: usize) -> Option<u32> {
    match count {
        0 => Some(first),
        n => u32::try_from(n - 1).ok().and_then(|span| first.checked_add(span)),
    }
}

#[wasm_bindgen(js_class = SpatialIndex3D)]
impl SpatialIndex3D {
    /// Creates an index by kind name: `cells`, `kdtree`, `octree` or `rtree`.
    /// `param` is the cell size for `cells` and the node capacity for the trees;
    /// it is ignored for `kdtree`.
    #[wasm_bindgen(constructor)]
    pub fn new(kind: &str, param: f64) -> Result<SpatialIndex3D, JsValue> {
        let inner: Box<dyn SpatialIndex<u32>> = match kind {
            "cells" => Box::new(CellsIndex::new(CellsConfig { cell_size: param }).map_err(to_js)?),
            "kdtree" => Box::new(KdTree::new()),
            "octree" => Box::new(
                Octree::new(OctreeConfig {
                    max_entries_per_node: param as usize,
                    ..OctreeConfig::default()
                })
                .map_err(to_js)?,
            ),
            "rtree" => Box::new(
                RTree::new(RTreeConfig {
                    max_node_entries: param as usize,
                })
                .map_err(to_js)?,
            ),
            other => return Err(JsValue::from_str(&format!("unknown index kind '{other}'"))),
        };
        Ok(SpatialIndex3D { inner })
    }

    pub fn insert(&mut self, x: f64, y: f64, z: f64, id: u32) -> Result<(), JsValue> {
        self.inner.insert(Point::new(x, y, z), id).map_err(to_js)
    }

    /// Inserts a flat `[x0, y0, z0, x1, ...]` array; point `i` gets id `first_id + i`.
    #[wasm_bindgen(js_name = insertMany)]
    pub fn insert_many(&mut self, coords: &[f64], first_id: u32) -> Result<(), JsValue> {
        if coords.len() % 3 != 0 {
            return Err(JsValue::from_str("coordinate array length must be a multiple of 3"));
        }
        if last_id(first_id, coords.len() / 3).is_none() {
            return Err(JsValue::from_str("ids would exceed the u32 range"));
        }
        for (i, c) in coords.chunks_exact(3).enumerate() {
            self.inner.insert(Point::new(c[0], c[1], c[2]), first_id + i as u32).map_err(to_js)?;
        }
        Ok(())
    }

    /// Inserts `count` points drawn uniformly from `bounds`, with ids continuing from `len`.
    #[wasm_bindgen(js_name = insertRandom)]
    pub fn insert_random(&mut self, bounds: BoundingBox3D, count: usize) -> Result<(), JsValue> {
        let b: BoundingBox = bounds.into();
        if b.is_empty() {
            return Err(JsValue::from_str("cannot sample from an empty box"));
        }
        let first = u32::try_from(self.inner.len())
            .ok()
            .filter(|&first| last_id(first, count).is_some())
            .ok_or_else(|| JsValue::from_str("ids would exceed the u32 range"))?;
        let mut rng = rand::thread_rng();
        for (i, p) in b.random_points(count, &mut rng).into_iter().enumerate() {
            self.inner.insert(p, first + i as u32).map_err(to_js)?;
        }
        Ok(())
    }

    pub fn search(&self, bounds: BoundingBox3D) -> Vec<u32> {
        self.inner.search(&bounds.into()).into_iter().map(|e| e.data).collect()
    }

    #[wasm_bindgen(js_name = searchRadius)]
    pub fn search_radius(&self, x: f64, y: f64, z: f64, radius: f64) -> Vec<u32> {
        self.inner
            .search_radius(Point::new(x, y, z), radius)
            .into_iter()
            .map(|e| e.data)
            .collect()
    }

    #[wasm_bindgen(js_name = nearestNeighbors)]
    pub fn nearest_neighbors(&self, x: f64, y: f64, z: f64, k: usize) -> Nearest3D {
        let found = self.inner.nearest_neighbors(Point::new(x, y, z), k);
        Nearest3D {
            ids: found.iter().map(|n| n.entry.data).collect(),
            distances: found.iter().map(|n| n.distance()).collect(),
        }
    }

    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        self.inner.contains(Point::new(x, y, z))
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    #[wasm_bindgen(getter)]
    pub fn size(&self) -> usize {
        self.inner.len()
    }

    #[wasm_bindgen(getter)]
    pub fn bounds(&self) -> BoundingBox3D {
        self.inner.bounds().into()
    }

    /// Flat `[x0, y0, z0, x1, ...]` array of every stored point, in no particular order.
    pub fn points(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.inner.len() * 3);
        self.inner.visit_entries(&mut |e| out.extend_from_slice(&e.point.to_array()));
        out
    }
}
