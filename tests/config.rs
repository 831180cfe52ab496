#![cfg(feature = "serde")]

use spacethree::{BoundingBox, CellsConfig, CellsIndex, IndexEntry, OctreeConfig, Point, RTree, RTreeConfig, SpatialIndex};

#[test]
fn test_configs_fill_missing_fields_with_defaults() {
    let cells: CellsConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cells, CellsConfig::default());

    let octree: OctreeConfig = serde_json::from_str(r#"{ "max_entries_per_node": 32 }"#).unwrap();
    assert_eq!(octree.max_entries_per_node, 32);
    assert_eq!(octree.max_depth, OctreeConfig::default().max_depth);
    assert_eq!(octree.initial_half_width, OctreeConfig::default().initial_half_width);

    let rtree: RTreeConfig = serde_json::from_str(r#"{ "max_node_entries": 12 }"#).unwrap();
    assert_eq!(RTree::<()>::new(rtree).unwrap().max_node_entries(), 12);
}

#[test]
fn test_invalid_config_still_rejected_after_loading() {
    let cells: CellsConfig = serde_json::from_str(r#"{ "cell_size": -2.0 }"#).unwrap();
    assert!(CellsIndex::<()>::new(cells).is_err());

    let rtree: RTreeConfig = serde_json::from_str(r#"{ "max_node_entries": 1 }"#).unwrap();
    assert!(RTree::<()>::new(rtree).is_err());
}

#[test]
fn test_bounds_and_entries_serialize() {
    let b = BoundingBox::new([0.0, 1.0, 2.0], [3.0, 4.0, 5.0]);
    let json = serde_json::to_string(&b).unwrap();
    let back: BoundingBox = serde_json::from_str(&json).unwrap();
    assert_eq!(back, b);

    let mut index = CellsIndex::with_cell_size(1.0).unwrap();
    index.insert(Point::new(0.5, 0.5, 0.5), "a".to_string()).unwrap();
    let owned: Vec<IndexEntry<String>> = index.search(&b).into_iter().cloned().collect();
    let json = serde_json::to_string(&owned).unwrap();
    let back: Vec<IndexEntry<String>> = serde_json::from_str(&json).unwrap();
    assert_eq!(back[0].data, "a");
    assert_eq!(back[0].point, Point::new(0.5, 0.5, 0.5));
}
