use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use spacethree::{BoundingBox, CellsIndex, KdTree, Octree, Point, RTree, SpatialIndex};
use std::collections::BTreeSet;

type Index = Box<dyn SpatialIndex<usize> + Sync>;

fn all_indices() -> Vec<(&'static str, Index)> {
    vec![
        ("cells", Box::new(CellsIndex::with_cell_size(3.0).unwrap())),
        ("kdtree", Box::new(KdTree::new())),
        ("octree", Box::new(Octree::with_capacity(4).unwrap())),
        ("rtree", Box::new(RTree::with_max_entries(4).unwrap())),
    ]
}

fn random_point(rng: &mut StdRng, range: f64) -> Point {
    Point::new(rng.gen_range(-range..range), rng.gen_range(-range..range), rng.gen_range(-range..range))
}

fn random_box(rng: &mut StdRng, range: f64) -> BoundingBox {
    let a = random_point(rng, range);
    let b = random_point(rng, range);
    BoundingBox::new(a.min(b), a.max(b))
}

/// Random cloud with a few exact duplicates and some points snapped to integer coordinates.
fn point_cloud(seed: u64, n: usize) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points: Vec<Point> = (0..n).map(|_| random_point(&mut rng, 20.0)).collect();
    for i in (0..n).step_by(17) {
        points[i] = points[i].round();
    }
    for i in (5..n).step_by(31) {
        points[i] = points[i - 5];
    }
    points
}

/// Every variant filled with `(id, point)` pairs in the given order, plus a
/// k-d tree built up front so its range search walks the tree instead of the
/// unbuilt linear scan.
fn filled_with(items: &[(usize, Point)]) -> Vec<(&'static str, Index)> {
    let mut indices = all_indices();
    for (_, index) in indices.iter_mut() {
        for &(i, p) in items {
            index.insert(p, i).unwrap();
        }
    }
    let built = KdTree::from_entries(items.iter().map(|&(i, p)| (p, i))).unwrap();
    assert!(built.is_built());
    indices.push(("kdtree-built", Box::new(built)));
    indices
}

fn filled(points: &[Point]) -> Vec<(&'static str, Index)> {
    let items: Vec<(usize, Point)> = points.iter().copied().enumerate().collect();
    filled_with(&items)
}

fn ids(entries: &[&spacethree::IndexEntry<usize>]) -> BTreeSet<usize> {
    entries.iter().map(|e| e.data).collect()
}

#[test]
fn test_contains_and_len_after_each_insert() {
    let points = point_cloud(1, 300);
    for (name, mut index) in all_indices() {
        for (i, &p) in points.iter().enumerate() {
            index.insert(p, i).unwrap();
            assert!(index.contains(p), "{name}: lost {p} right after insert");
            assert_eq!(index.len(), i + 1, "{name}");
        }
        assert_eq!(index.bounds(), BoundingBox::from_points(points.iter().copied()), "{name}");
        assert!(!index.contains(Point::new(100.0, 100.0, 100.0)), "{name}");
    }
}

#[test]
fn test_search_is_sound_and_complete() {
    let points = point_cloud(2, 500);
    let indices = filled(&points);
    let mut rng = StdRng::seed_from_u64(20);

    for _ in 0..100 {
        let query = random_box(&mut rng, 25.0);
        let expected: BTreeSet<usize> = (0..points.len()).filter(|&i| query.contains(points[i])).collect();
        for (name, index) in &indices {
            let found = index.search(&query);
            assert!(found.iter().all(|e| query.contains(e.point)), "{name}: false positive");
            assert_eq!(found.len(), expected.len(), "{name}: reported an entry twice or missed one");
            assert_eq!(ids(&found), expected, "{name}");
        }
    }
}

#[test]
fn test_search_on_entry_coordinates() {
    // Query boxes whose faces pass exactly through stored points.
    let points = point_cloud(3, 200);
    let indices = filled(&points);
    for w in points.windows(2) {
        let query = BoundingBox::new(w[0].min(w[1]), w[0].max(w[1]));
        let expected: BTreeSet<usize> = (0..points.len()).filter(|&i| query.contains(points[i])).collect();
        for (name, index) in &indices {
            assert_eq!(ids(&index.search(&query)), expected, "{name}");
        }
    }
}

#[test]
fn test_built_kdtree_search_with_many_ties() {
    // Integer coordinates put many points exactly on the splitting planes.
    let mut rng = StdRng::seed_from_u64(30);
    let points: Vec<Point> = (0..2000).map(|_| random_point(&mut rng, 10.0).round()).collect();
    let tree = KdTree::from_entries(points.iter().copied().enumerate().map(|(i, p)| (p, i))).unwrap();
    assert!(tree.is_built());

    for _ in 0..300 {
        let mut query = random_box(&mut rng, 12.0);
        if rng.gen_bool(0.5) {
            query = BoundingBox::new(query.min.round(), query.max.round());
        }
        let expected: BTreeSet<usize> = (0..points.len()).filter(|&i| query.contains(points[i])).collect();
        let found = tree.search(&query);
        assert_eq!(found.len(), expected.len());
        assert_eq!(ids(&found), expected);
    }
}

#[test]
fn test_search_radius_matches_brute_force() {
    let points = point_cloud(4, 400);
    let indices = filled(&points);
    let mut rng = StdRng::seed_from_u64(40);

    for _ in 0..60 {
        let center = random_point(&mut rng, 22.0);
        let radius = rng.gen_range(0.0..12.0);
        let expected: BTreeSet<usize> = (0..points.len())
            .filter(|&i| points[i].distance_squared(center) <= radius * radius)
            .collect();
        for (name, index) in &indices {
            assert_eq!(ids(&index.search_radius(center, radius)), expected, "{name}");
        }
    }

    for (name, index) in &indices {
        assert!(index.search_radius(Point::ZERO, -1.0).is_empty(), "{name}");
        assert!(index.search_radius(Point::ZERO, f64::NAN).is_empty(), "{name}");
        // Zero radius finds exact hits only.
        let hits = index.search_radius(points[0], 0.0);
        assert!(hits.iter().all(|e| e.point == points[0]), "{name}");
        assert!(!hits.is_empty(), "{name}");
    }
}

#[test]
fn test_nearest_neighbors_are_optimal() {
    let points = point_cloud(5, 400);
    let indices = filled(&points);
    let mut rng = StdRng::seed_from_u64(50);

    for _ in 0..50 {
        // Queries both inside and well outside the cloud.
        let query = random_point(&mut rng, 40.0);
        let k = rng.gen_range(1..=25);

        let mut brute: Vec<f64> = points.iter().map(|p| p.distance_squared(query)).collect();
        brute.sort_by(|a, b| a.partial_cmp(b).unwrap());

        for (name, index) in &indices {
            let found = index.nearest_neighbors(query, k);
            assert_eq!(found.len(), k, "{name}");
            for pair in found.windows(2) {
                assert!(pair[0].distance_sq <= pair[1].distance_sq, "{name}: not sorted");
            }
            for (n, expected) in found.iter().zip(&brute) {
                assert_eq!(n.distance_sq, n.point().distance_squared(query), "{name}");
                assert_eq!(n.distance_sq, *expected, "{name}: not the k closest");
            }
        }
    }
}

#[test]
fn test_nearest_neighbors_edge_cases() {
    let points = point_cloud(6, 30);
    let indices = filled(&points);
    for (name, index) in &indices {
        assert!(index.nearest_neighbors(Point::ZERO, 0).is_empty(), "{name}");
        assert!(index.nearest_neighbors(Point::new(f64::NAN, 0.0, 0.0), 3).is_empty(), "{name}");

        let everything = index.nearest_neighbors(Point::ZERO, 1000);
        assert_eq!(everything.len(), points.len(), "{name}");
        let seen: BTreeSet<usize> = everything.iter().map(|n| *n.data()).collect();
        assert_eq!(seen.len(), points.len(), "{name}");
        for pair in everything.windows(2) {
            assert!(pair[0].distance_sq <= pair[1].distance_sq, "{name}");
        }
    }

    for (name, index) in all_indices() {
        assert!(index.nearest_neighbors(Point::ZERO, 5).is_empty(), "{name}");
    }
}

#[test]
fn test_batch_matches_single_queries() {
    let points = point_cloud(7, 300);
    let mut rng = StdRng::seed_from_u64(70);
    let queries: Vec<Point> = (0..40).map(|_| random_point(&mut rng, 25.0)).collect();

    let mut tree = KdTree::new();
    tree.extend(points.iter().copied().enumerate().map(|(i, p)| (p, i))).unwrap();
    let batch = tree.nearest_neighbors_batch(&queries, 6);
    assert_eq!(batch.len(), queries.len());
    for (q, result) in queries.iter().zip(&batch) {
        let single = tree.nearest_neighbors(*q, 6);
        let a: Vec<f64> = result.iter().map(|n| n.distance_sq).collect();
        let b: Vec<f64> = single.iter().map(|n| n.distance_sq).collect();
        assert_eq!(a, b);
    }

    let mut rtree = RTree::with_max_entries(6).unwrap();
    rtree.extend(points.iter().copied().enumerate().map(|(i, p)| (p, i))).unwrap();
    let batch = rtree.nearest_neighbors_batch(&queries, 1);
    for (q, result) in queries.iter().zip(&batch) {
        assert_eq!(result[0].distance_sq, tree.nearest_neighbors(*q, 1)[0].distance_sq);
    }
}

#[test]
fn test_insertion_order_does_not_change_results() {
    let points = point_cloud(8, 250);
    let mut shuffled: Vec<(usize, Point)> = points.iter().copied().enumerate().collect();
    shuffled.shuffle(&mut StdRng::seed_from_u64(80));

    let forward = filled(&points);
    let backward = filled_with(&shuffled);
    assert_eq!(forward.len(), backward.len());

    let mut rng = StdRng::seed_from_u64(81);
    for _ in 0..40 {
        let query = random_box(&mut rng, 20.0);
        for ((name, a), (_, b)) in forward.iter().zip(&backward) {
            assert_eq!(ids(&a.search(&query)), ids(&b.search(&query)), "{name}");
        }
        // The built tree must agree with the linear scan of the unbuilt one.
        let scan = &forward[1].1;
        let tree = &forward[4].1;
        assert_eq!(ids(&scan.search(&query)), ids(&tree.search(&query)), "kdtree built vs unbuilt");
    }
}

#[test]
fn test_query_outside_bounds_is_empty() {
    let points = point_cloud(9, 100);
    let indices = filled(&points);
    let far = BoundingBox::new([1000.0, 1000.0, 1000.0], [1010.0, 1010.0, 1010.0]);
    for (name, index) in &indices {
        assert!(index.search(&far).is_empty(), "{name}");
        assert!(index.search(&BoundingBox::EMPTY).is_empty(), "{name}");
        assert!(index.search_radius(Point::splat(1005.0), 5.0).is_empty(), "{name}");
    }
}

#[test]
fn test_clear_twice_and_reuse() {
    let points = point_cloud(10, 120);
    let everything = BoundingBox::new([-100.0, -100.0, -100.0], [100.0, 100.0, 100.0]);
    for (name, mut index) in filled(&points) {
        index.clear();
        assert_eq!(index.len(), 0, "{name}");
        assert!(index.is_empty(), "{name}");
        assert!(index.search(&everything).is_empty(), "{name}");
        assert!(index.bounds().is_empty(), "{name}");

        index.clear();
        assert_eq!(index.len(), 0, "{name}");

        // Still usable, and nothing from before comes back.
        index.insert(Point::new(50.0, 50.0, 50.0), 7).unwrap();
        assert_eq!(ids(&index.search(&everything)), BTreeSet::from([7]), "{name}");
        assert!(!index.contains(points[0]), "{name}");
        assert_eq!(*index.nearest_neighbors(Point::ZERO, 3)[0].data(), 7, "{name}");
    }
}

#[test]
fn test_visit_entries_sees_everything_once() {
    let points = point_cloud(11, 150);
    for (name, index) in filled(&points) {
        let mut seen = Vec::new();
        index.visit_entries(&mut |e| seen.push(e.data));
        seen.sort();
        assert_eq!(seen, (0..points.len()).collect::<Vec<_>>(), "{name}");
    }
}
