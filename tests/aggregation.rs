use chrono::{TimeDelta, TimeZone, Utc};
use network_history::aggregate::{AggregateBook, DAILY_30, HOURLY_24, RoundRobinAggregate};
use network_history::rollup::{
    AggregationRollupService, InMemoryRollupBookkeeping, PeriodRollupStore, RollupBookkeeping,
    RollupRepository, RollupTarget,
};
use network_history::{EntityKind, Metric, ScanMeasurement, Timestamp};
use proptest::prelude::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn at(day: u32, hour: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).single().unwrap()
}

#[test]
fn hourly_example_wraps_and_resets() {
    init();
    let mut aggregate = RoundRobinAggregate::new("GA", Metric::Validating, HOURLY_24);

    aggregate.add_measurement(true, at(1, 0), 1).unwrap();
    assert_eq!(aggregate.counters()[0], 1);
    assert!(aggregate.counters()[1..].iter().all(|&count| count == 0));

    aggregate.add_measurement(false, at(1, 1), 2).unwrap();
    assert_eq!(aggregate.position(), 1);
    assert_eq!(&aggregate.counters()[..3], &[1, 0, 0]);
    assert_eq!(&aggregate.number_of_observations()[..3], &[1, 2, 0]);

    for hour in 2..24 {
        aggregate.add_measurement(true, at(1, hour), 1).unwrap();
    }
    assert_eq!(aggregate.position(), 23);

    aggregate.add_measurement(false, at(2, 0), 1).unwrap();
    assert_eq!(aggregate.position(), 0);
    assert_eq!(aggregate.counters()[0], 0);
    assert_eq!(aggregate.number_of_observations()[0], 1);
}

proptest! {
    #[test]
    fn round_robin_is_bounded_for_any_gap(
        gaps in proptest::collection::vec(0i64..2_000, 1..60),
        positives in proptest::collection::vec(any::<bool>(), 60),
    ) {
        let mut aggregate = RoundRobinAggregate::new("GA", Metric::Active, HOURLY_24);
        let mut date = at(1, 0);

        for (index, gap_minutes) in gaps.into_iter().enumerate() {
            date += TimeDelta::minutes(gap_minutes);
            let advanced = aggregate.add_measurement(positives[index], date, 1).unwrap();

            prop_assert!(advanced <= HOURLY_24.bucket_count());
            prop_assert_eq!(aggregate.counters().len(), HOURLY_24.bucket_count());
            prop_assert_eq!(aggregate.number_of_observations().len(), HOURLY_24.bucket_count());
            prop_assert!(aggregate.position() < HOURLY_24.bucket_count());
            prop_assert_eq!(aggregate.last_date(), Some(date));
        }
    }

    #[test]
    fn same_bucket_increments_keep_position(count in 1u32..50) {
        let mut aggregate = RoundRobinAggregate::new("GA", Metric::Active, DAILY_30);
        for minute in 0..count {
            aggregate
                .add_measurement(true, at(3, 0) + TimeDelta::minutes(i64::from(minute)), count)
                .unwrap();
        }
        prop_assert_eq!(aggregate.position(), 0);
        prop_assert_eq!(aggregate.counters()[0], count);
        prop_assert!(aggregate.counters()[0] <= aggregate.number_of_observations()[0]);
    }
}

fn node(scan_id: u64, day: u32, active: bool) -> ScanMeasurement {
    ScanMeasurement::new(scan_id, EntityKind::Node, "GA", at(day, 0))
        .with(Metric::Active, active)
        .with(Metric::Validating, true)
}

#[test]
fn rollup_runs_exactly_once_and_feeds_daily_window() {
    init();
    let mut store = PeriodRollupStore::for_target(RollupTarget::NodeDay);
    for (scan_id, day, active) in [(1, 1, true), (2, 1, false), (3, 2, true)] {
        store.ingest(node(scan_id, day, active));
    }

    let mut service = AggregationRollupService::new(InMemoryRollupBookkeeping::new());
    service.register(RollupTarget::NodeDay, store);

    let report = service.rollup_measurements(3).unwrap();
    assert_eq!(report.advanced, vec![(RollupTarget::NodeDay, 1, 3)]);
    assert!(service.rollup_measurements(3).unwrap().is_noop());
    let bookkeeping = service.bookkeeping().find(RollupTarget::NodeDay.name()).unwrap().unwrap();
    assert_eq!(bookkeeping.last_aggregated_scan_id, 3);

    let repository = service.repository(RollupTarget::NodeDay).unwrap();
    let rows = repository.find_between("GA", at(1, 0), at(30, 0)).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].scan_count, 2);
    assert_eq!(rows[0].positives(Metric::Active), 1);

    let mut book = AggregateBook::new(EntityKind::Node, DAILY_30);
    book.backfill("GA", &rows).unwrap();
    let active = book.get("GA", Metric::Active).unwrap();
    let readable = active.to_readable();
    assert_eq!(readable.len(), 30);
    assert_eq!(readable[29].start, at(2, 0));
    assert_eq!(readable[29].ratio, Some(1.0));
    assert_eq!(readable[28].ratio, Some(0.5));
    assert_eq!(readable[0].ratio, None);
}
