//! Integration tests for the file-backed SQLite store.

use agweather_common::{DateRange, Extent, Field, Observation};
use storage::{grid_snapshot, RawDataStore, RawObservationRow, SqliteStore};
use test_utils::dates::days_ago;
use test_utils::{grid_points, temp_cache_dir};

fn rows_for(date: chrono::NaiveDate, value: f64) -> Vec<RawObservationRow> {
    grid_points((43.0, 44.0, -90.0, -89.0), 0.5)
        .into_iter()
        .map(|(lat, long)| RawObservationRow {
            source: "weather".into(),
            date,
            latitude: lat,
            longitude: long,
            values: Observation {
                max_temp: Some(value),
                min_temp: Some(value - 10.0),
                ..Default::default()
            },
        })
        .collect()
}

#[tokio::test]
async fn test_file_store_persists_across_reopen() {
    let dir = temp_cache_dir();
    let path = dir.path().join("db").join("agweather.db");

    {
        let store = SqliteStore::open(&path).await.unwrap();
        let inserted = store
            .replace_observations("weather", days_ago(1), &rows_for(days_ago(1), 25.0))
            .await
            .unwrap();
        assert_eq!(inserted, 9);
    }

    let store = SqliteStore::open(&path).await.unwrap();
    let rows = store.observations("weather", days_ago(1)).await.unwrap();
    assert_eq!(rows.len(), 9);
}

#[tokio::test]
async fn test_replace_many_rows_spans_insert_chunks() {
    let store = SqliteStore::open_memory().await.unwrap();
    let rows: Vec<RawObservationRow> = grid_points((40.0, 45.0, -95.0, -90.0), 0.1)
        .into_iter()
        .map(|(lat, long)| RawObservationRow {
            source: "weather".into(),
            date: days_ago(2),
            latitude: lat,
            longitude: long,
            values: Observation {
                avg_temp: Some(18.0),
                ..Default::default()
            },
        })
        .collect();
    assert_eq!(rows.len(), 51 * 51);

    store
        .replace_observations("weather", days_ago(2), &rows)
        .await
        .unwrap();
    store
        .replace_observations("weather", days_ago(2), &rows)
        .await
        .unwrap();

    let stored = store.observations("weather", days_ago(2)).await.unwrap();
    assert_eq!(stored.len(), rows.len());
}

#[tokio::test]
async fn test_range_query_and_snapshot() {
    let store = SqliteStore::open_memory().await.unwrap();
    for n in 1..=3 {
        store
            .replace_observations("weather", days_ago(n), &rows_for(days_ago(n), 20.0 + n as f64))
            .await
            .unwrap();
    }

    let dates = store
        .observation_dates("weather", DateRange::new(days_ago(5), days_ago(2)))
        .await
        .unwrap();
    assert_eq!(dates, vec![days_ago(3), days_ago(2)]);

    let area = Extent::new(43.5, 44.0, -90.0, -89.0).unwrap();
    let rows = store
        .observations_in("weather", DateRange::new(days_ago(1), days_ago(1)), &area)
        .await
        .unwrap();
    assert_eq!(rows.len(), 6);

    let extent = Extent::new(43.0, 44.0, -90.0, -89.0).unwrap();
    let day = store.observations("weather", days_ago(1)).await.unwrap();
    let grid = grid_snapshot(&day, &extent, 0.5, Field::MaxTemp).unwrap();
    assert_eq!(grid.defined_count(), 9);
    assert!(grid.iter_defined().all(|(_, v)| *v == 21.0));
}
