use rand::Rng;
use spacethree::{BoundingBox, CellsIndex, KdTree, Octree, Point, RTree, SpatialIndex};
use std::time::Instant;

const NUM_POINTS: usize = 50_000;
const NUM_QUERIES: usize = 1_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bounds = BoundingBox::new([0.0, 0.0, 0.0], [100.0, 100.0, 100.0]);
    let mut rng = rand::thread_rng();
    let points = bounds.random_points(NUM_POINTS, &mut rng);
    let queries: Vec<Point> = (0..NUM_QUERIES)
        .map(|_| Point::new(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
        .collect();

    run("cells", CellsIndex::with_cell_size(2.0)?, &points, &queries)?;
    run("kdtree", KdTree::new(), &points, &queries)?;
    run("octree", Octree::with_capacity(16)?, &points, &queries)?;
    run("rtree", RTree::with_max_entries(16)?, &points, &queries)?;
    Ok(())
}

fn run<S>(name: &str, mut index: S, points: &[Point], queries: &[Point]) -> Result<(), Box<dyn std::error::Error>>
where
    S: SpatialIndex<usize> + Sync,
{
    let start = Instant::now();
    index.extend(points.iter().copied().enumerate().map(|(i, p)| (p, i)))?;
    let insert_time = start.elapsed();

    let start = Instant::now();
    let results = index.nearest_neighbors_batch(queries, 10);
    let query_time = start.elapsed();

    let mean: f64 = results.iter().filter_map(|r| r.last()).map(|n| n.distance()).sum::<f64>() / queries.len() as f64;
    println!(
        "{:<8} insert {:>10.2?}  10-NN x{} {:>10.2?}  mean 10th distance {:.3}",
        name,
        insert_time,
        queries.len(),
        query_time,
        mean
    );
    Ok(())
}
