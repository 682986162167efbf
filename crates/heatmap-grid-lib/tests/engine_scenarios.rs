//! End-to-end scenarios across engine instances sharing one remote tier

use heatmap_grid_lib::{
    AggregatedPoint, AggregatorConfig, AggregatorOptions, CacheManager, CacheSettings, DatasetKey,
    HeatmapAggregator, InMemoryRemoteCache, MAX_ZOOM, Point, RemoteCache,
};
use std::sync::Arc;
use std::time::Duration;

fn config(min_points_per_cell: usize) -> AggregatorConfig {
    AggregatorConfig {
        map_width: 64,
        map_height: 64,
        min_cell_size: 1,
        max_cell_size: 64,
        min_points_per_cell,
        ..Default::default()
    }
}

fn cluster() -> Vec<Point> {
    vec![
        Point::new(0.0, 0.0),
        Point::new(1.0, 1.0),
        Point::new(2.0, 2.0),
        Point::new(60.0, 60.0),
    ]
}

fn engine_with(remote: &Arc<InMemoryRemoteCache>, min_points_per_cell: usize) -> HeatmapAggregator {
    let cache = CacheManager::new(CacheSettings::default()).with_remote(remote.clone());
    HeatmapAggregator::new(config(min_points_per_cell), Arc::new(cache)).unwrap()
}

#[tokio::test]
async fn test_cluster_at_both_zoom_extremes() {
    let remote = Arc::new(InMemoryRemoteCache::default());
    let engine = engine_with(&remote, 1);
    engine.set_data(DatasetKey::new("cluster", 1).unwrap(), cluster());

    let coarse = engine.get_aggregated_points(0.0).await.unwrap();
    assert_eq!(
        *coarse,
        vec![AggregatedPoint {
            x: 15.75,
            y: 15.75,
            weight: 4.0,
            count: 4,
            cell_size: 64,
        }]
    );

    let fine = engine.get_aggregated_points(MAX_ZOOM).await.unwrap();
    let centers: Vec<(f64, f64)> = fine.iter().map(|p| (p.x, p.y)).collect();
    assert_eq!(
        centers,
        vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (60.0, 60.0)]
    );
    assert!(fine.iter().all(|p| p.count == 1 && p.weight == 1.0));
}

#[tokio::test]
async fn test_sparse_cells_filtered() {
    let remote = Arc::new(InMemoryRemoteCache::default());
    let engine = engine_with(&remote, 2);
    engine.set_data(DatasetKey::new("cluster", 1).unwrap(), cluster());

    let coarse = engine.get_aggregated_points(0.0).await.unwrap();
    assert_eq!(coarse.len(), 1);
    assert_eq!(coarse[0].count, 4);

    let fine = engine.get_aggregated_points(MAX_ZOOM).await.unwrap();
    assert!(fine.is_empty());

    // Only the non-empty result reached the remote tier
    assert_eq!(remote.len().await, 1);
}

#[tokio::test]
async fn test_fresh_instance_reuses_remote_results() {
    let remote = Arc::new(InMemoryRemoteCache::default());
    let key = DatasetKey::new("cluster", 1).unwrap();

    let first = engine_with(&remote, 1);
    first.set_data(key.clone(), cluster());
    let warmed = first.precompute_for_zoom_range(0, 28).await.unwrap();

    let second = engine_with(&remote, 1);
    second.set_data(key, cluster());
    for &cell_size in &warmed {
        let a = first.get_aggregated_points_by_cell_size(cell_size).await.unwrap();
        let b = second.get_aggregated_points_by_cell_size(cell_size).await.unwrap();
        assert_eq!(a, b);
    }

    let stats = second.stats();
    assert_eq!(stats.computations, 0);
    assert_eq!(stats.remote_hits, warmed.len() as u64);
}

#[tokio::test]
async fn test_new_version_ignores_old_remote_entries() {
    let remote = Arc::new(InMemoryRemoteCache::default());

    let old = engine_with(&remote, 1);
    old.set_data(DatasetKey::new("cluster", 1).unwrap(), cluster());
    old.get_aggregated_points_by_cell_size(64).await.unwrap();

    let new = engine_with(&remote, 1);
    new.set_data(
        DatasetKey::new("cluster", 2).unwrap(),
        vec![Point::new(32.0, 32.0)],
    );
    let points = new.get_aggregated_points_by_cell_size(64).await.unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].count, 1);
    assert_eq!(new.stats().computations, 1);
    assert_eq!(new.stats().remote_hits, 0);
}

#[tokio::test]
async fn test_changed_threshold_does_not_reuse_remote_entry() {
    let remote = Arc::new(InMemoryRemoteCache::default());
    let key = DatasetKey::new("cluster", 1).unwrap();

    let engine = engine_with(&remote, 1);
    engine.set_data(key.clone(), cluster());
    engine.get_aggregated_points_by_cell_size(1).await.unwrap();

    engine
        .set_options(AggregatorOptions {
            min_points_per_cell: Some(2),
            ..Default::default()
        })
        .unwrap();
    let filtered = engine.get_aggregated_points_by_cell_size(1).await.unwrap();
    assert!(filtered.is_empty());

    let stats = engine.stats();
    assert_eq!(stats.computations, 2);
    assert_eq!(stats.remote_errors, 1);
}

#[tokio::test]
async fn test_corrupt_remote_entry_is_replaced() {
    let remote = Arc::new(InMemoryRemoteCache::default());
    remote
        .set_ex("heatmap:cluster:v1:64", Duration::from_secs(60), "[1,2,3")
        .await
        .unwrap();

    let engine = engine_with(&remote, 1);
    engine.set_data(DatasetKey::new("cluster", 1).unwrap(), cluster());
    let points = engine.get_aggregated_points(0.0).await.unwrap();
    assert_eq!(points[0].count, 4);

    // A second instance now finds a valid entry
    let other = engine_with(&remote, 1);
    other.set_data(DatasetKey::new("cluster", 1).unwrap(), cluster());
    other.get_aggregated_points(0.0).await.unwrap();
    assert_eq!(other.stats().computations, 0);
}
