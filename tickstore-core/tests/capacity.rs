use std::time::{Duration, Instant};

use tempfile::TempDir;
use tickstore_core::storage::{Environment, EnvironmentOptions, TransactionMode};
use tickstore_core::{SearchResult, SeriesId, TickError, Timestamp};

const SERIES: SeriesId = SeriesId::from_u128(9);

/// Size of a freshly created store file
fn empty_store_len(dir: &TempDir) -> u64 {
    let path = dir.path().join("sizing.redb");
    let env = Environment::<1>::open(EnvironmentOptions::new(&path)).unwrap();
    let len = env.stats().unwrap().file_bytes;
    env.close().unwrap();
    len
}

#[test]
fn test_bulk_insert_hits_map_full() {
    let dir = TempDir::new().unwrap();
    let limit = empty_store_len(&dir) + 256 * 1024;
    let env = Environment::<1>::open(
        EnvironmentOptions::new(dir.path().join("full.redb")).with_max_size(limit),
    )
    .unwrap();

    let mut txn = env.begin_transaction(TransactionMode::Default).unwrap();
    let failure = {
        let mut cursor = txn.open_timeseries(SERIES).unwrap();
        (0..200_000u64)
            .map(|t| cursor.insert(Timestamp::new(t), 0, [t as f64]).map(|_| t))
            .find_map(|result| result.err())
    };

    match failure {
        Some(TickError::MapFull { used, limit: reported }) => {
            assert!(used > reported);
            assert_eq!(reported, limit);
        }
        other => panic!("expected MapFull, got {:?}", other),
    }
    txn.abort().unwrap();

    // Nothing from the failed transaction is visible
    let txn = env.begin_transaction(TransactionMode::ReadOnly).unwrap();
    let mut cursor = txn.open_timeseries(SERIES).unwrap();
    assert!(!cursor.move_first().unwrap());
    drop(cursor);
    drop(txn);
    assert_eq!(env.stats().unwrap().points, 0);
    assert_eq!(env.open_transactions(), 0);
}

#[test]
fn test_rejected_insert_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let env = Environment::<1>::open(
        EnvironmentOptions::new(dir.path().join("tiny.redb")).with_max_size(1),
    )
    .unwrap();

    let mut txn = env.begin_transaction(TransactionMode::Default).unwrap();
    {
        let mut cursor = txn.open_timeseries(SERIES).unwrap();
        let result = cursor.insert(Timestamp::new(7), 0, [7.0]);
        assert!(matches!(result, Err(TickError::MapFull { limit: 1, .. })));

        // The cursor did not move and the point is not in the transaction
        assert!(!cursor.is_positioned());
        assert_eq!(
            cursor.search(Timestamp::new(7)).unwrap(),
            SearchResult::EndOfSeries
        );
        assert!(!cursor.move_first().unwrap());
    }
    txn.commit().unwrap();

    assert_eq!(env.open_transactions(), 0);
    assert_eq!(env.stats().unwrap().points, 0);
}

/// Insert `count` points after the ones already stored and time it
fn timed_insert(env: &Environment<1>, from: u64, count: u64) -> Duration {
    let mut txn = env.begin_transaction(TransactionMode::Default).unwrap();
    let started = Instant::now();
    {
        let mut cursor = txn.open_timeseries(SERIES).unwrap();
        for t in from..from + count {
            cursor.insert(Timestamp::new(t), 0, [t as f64]).unwrap();
        }
    }
    let elapsed = started.elapsed();
    txn.commit().unwrap();
    elapsed
}

#[test]
#[ignore = "timing; run with --ignored --release"]
fn test_insert_cost_does_not_grow_with_store() {
    let batch = 100 * 1024;

    let dir = TempDir::new().unwrap();
    let empty = Environment::<1>::open(EnvironmentOptions::new(dir.path().join("empty.redb")))
        .unwrap();
    let into_empty = timed_insert(&empty, 0, batch);

    let full = Environment::<1>::open(EnvironmentOptions::new(dir.path().join("full.redb")))
        .unwrap();
    let mut stored = 0;
    while stored < 1_000_000 {
        timed_insert(&full, stored, 200_000);
        stored += 200_000;
    }
    let into_full = timed_insert(&full, stored, batch);

    assert!(
        into_full < into_empty * 2 + Duration::from_millis(50),
        "{} inserts took {:?} into an empty store and {:?} next to {} points",
        batch,
        into_empty,
        into_full,
        stored
    );
}
