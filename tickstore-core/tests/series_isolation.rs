use proptest::prelude::*;
use std::collections::BTreeMap;

use tempfile::TempDir;
use tickstore_core::storage::{Environment, EnvironmentOptions, TransactionMode};
use tickstore_core::{SearchResult, SeriesId, Timestamp};

/// Neighbouring ids, including both ends of the id space
const SERIES: [SeriesId; 5] = [
    SeriesId::from_u128(0),
    SeriesId::from_u128(1),
    SeriesId::from_u128(2),
    SeriesId::from_u128(u128::MAX - 1),
    SeriesId::from_u128(u128::MAX),
];

#[derive(Debug, Clone)]
enum Op {
    Insert { series: usize, tick: u64, value: i32 },
    Remove { series: usize, tick: u64 },
}

fn tick_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(0u64),
        Just(u64::MAX),
        0u64..64,
        (u64::MAX - 64)..u64::MAX,
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..SERIES.len(), tick_strategy(), any::<i32>())
            .prop_map(|(series, tick, value)| Op::Insert { series, tick, value }),
        1 => (0..SERIES.len(), tick_strategy())
            .prop_map(|(series, tick)| Op::Remove { series, tick }),
    ]
}

type Model = BTreeMap<(usize, u64), f64>;

fn apply(env: &Environment<1>, ops: &[Op]) -> Model {
    let mut model = Model::new();
    let mut txn = env.begin_transaction(TransactionMode::Default).expect("begin");
    {
        let mut cursor = txn.open_timeseries(SERIES[0]).expect("open cursor");
        for op in ops {
            match *op {
                Op::Insert { series, tick, value } => {
                    cursor.change_timeseries(SERIES[series]).expect("rebind");
                    cursor
                        .insert(Timestamp::new(tick), 0, [value as f64])
                        .expect("insert");
                    model.insert((series, tick), value as f64);
                }
                Op::Remove { series, tick } => {
                    cursor.change_timeseries(SERIES[series]).expect("rebind");
                    let existed = cursor.remove(Timestamp::new(tick)).expect("remove");
                    assert_eq!(existed, model.remove(&(series, tick)).is_some());
                }
            }
        }
    }
    txn.commit().expect("commit");
    model
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn navigation_never_leaves_the_series(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let dir = TempDir::new().expect("tempdir");
        let env = Environment::<1>::open(EnvironmentOptions::new(dir.path().join("iso.redb")))
            .expect("open env");
        let model = apply(&env, &ops);

        let txn = env.begin_transaction(TransactionMode::ReadOnly).expect("begin read");
        let mut cursor = txn.open_timeseries(SERIES[0]).expect("open cursor");

        for (index, id) in SERIES.iter().enumerate() {
            cursor.change_timeseries(*id).expect("rebind");
            let expected: Vec<(u64, f64)> = model
                .range((index, 0)..=(index, u64::MAX))
                .map(|(&(_, tick), &value)| (tick, value))
                .collect();

            // Forward scan
            let mut forward = vec![];
            if cursor.move_first().expect("first") {
                cursor
                    .for_each(|p| forward.push((p.timestamp.ticks(), p.values[0])))
                    .expect("scan");
            }
            prop_assert_eq!(&forward, &expected);

            // Backward walk
            let mut backward = vec![];
            let mut more = cursor.move_last().expect("last");
            while more {
                let p = cursor.current().expect("current");
                backward.push((p.timestamp.ticks(), p.values[0]));
                more = cursor.move_previous().expect("previous");
            }
            backward.reverse();
            prop_assert_eq!(&backward, &expected);

            // Searches at both ends of the timestamp range
            let first = cursor.search(Timestamp::MIN).expect("search min");
            prop_assert_eq!(first.found(), !expected.is_empty());
            let last = cursor.search_at_or_before(Timestamp::MAX).expect("search max");
            prop_assert_eq!(last.found(), !expected.is_empty());
            if let Some(&(tick, _)) = expected.last() {
                prop_assert_eq!(cursor.current().expect("current").timestamp.ticks(), tick);
                prop_assert_eq!(last == SearchResult::Exact, tick == u64::MAX);
            }
        }
    }
}
