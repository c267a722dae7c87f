use skewjoin::estimator::sample_keys;
use skewjoin::{EstimatorStrategy, HeavyHitterSet, Relation, Row, SpaceSaving};

fn run(strategy: EstimatorStrategy, k: usize, keys: &[u32]) -> SpaceSaving {
    let mut estimator = SpaceSaving::new(k, strategy).unwrap();
    estimator.observe_all(keys.iter().copied());
    estimator
}

#[test]
fn test_skew_scenario_with_two_counters() {
    for strategy in EstimatorStrategy::ALL {
        let estimator = run(strategy, 2, &[5, 5, 5, 5, 1, 2, 3]);
        let heavy = estimator.heavy_hitters(0.5);
        assert_eq!(heavy.len(), 1, "{}", strategy);
        assert_eq!(heavy[0].0, 5);
        assert!(heavy[0].1 >= 4.0 / 7.0);
    }
}

#[test]
fn test_strategies_agree_on_a_long_stream() {
    let keys: Vec<u32> = (0..5_000u64)
        .map(|i| {
            let mixed = (i.wrapping_mul(40_503) ^ (i >> 3)) % 997;
            if mixed < 300 { (mixed % 4) as u32 } else { mixed as u32 }
        })
        .collect();

    let reference = run(EstimatorStrategy::LinearScan, 16, &keys);
    for strategy in [EstimatorStrategy::MinHeap, EstimatorStrategy::SortedSet] {
        let other = run(strategy, 16, &keys);
        assert_eq!(other.counts(), reference.counts(), "{}", strategy);
        assert_eq!(other.heavy_hitters(0.05), reference.heavy_hitters(0.05));
    }
    let total: u64 = reference.counts().iter().map(|(_, count)| count).sum();
    assert!(total <= reference.total_seen());
}

#[test]
fn test_sampled_shard_feeds_a_heavy_hitter_set() {
    let rows: Vec<Row> = (0..1_000u32)
        .map(|i| Row::input(Relation::S, if i % 2 == 0 { 42 } else { i }, i))
        .collect();
    let sample = sample_keys(&rows, 100).unwrap();
    assert_eq!(sample.len(), 10);

    let estimator = run(EstimatorStrategy::MinHeap, 8, &sample);
    let set = estimator.heavy_hitter_set(0.3);
    assert!(set.contains(42));

    let merged = HeavyHitterSet::union([&set, &HeavyHitterSet::from_pairs([(7, 0.9)])]);
    assert_eq!(merged.len(), set.len() + 1);
    assert_eq!(merged.ranked()[0], (42, 1.0));
}

#[test]
fn test_strategy_names_parse() {
    assert_eq!(
        "heap".parse::<EstimatorStrategy>().unwrap(),
        EstimatorStrategy::MinHeap
    );
    assert_eq!(
        "sorted_array".parse::<EstimatorStrategy>().unwrap(),
        EstimatorStrategy::SortedSet
    );
    assert!("tree".parse::<EstimatorStrategy>().is_err());
}
