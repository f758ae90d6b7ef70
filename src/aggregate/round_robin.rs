use alloc::string::String;
use alloc::vec::Vec;

use log::debug;
use serde::{Deserialize, Serialize};

use super::strategy::{BucketStrategy, MAX_BUCKETS};
use crate::error::{HistoryError, HistoryResult};
use crate::measurement::Metric;
use crate::time::Timestamp;

type Buckets = heapless::Vec<u32, MAX_BUCKETS>;

/// One bucket of the readable window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadableBucket {
    /// Start of the bucket's period
    pub start: Timestamp,
    /// Positive share of the observations, `None` when nothing was observed
    pub ratio: Option<f64>,
}

/// Persisted shape of a round-robin aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub entity_id: String,
    pub metric: Metric,
    pub counters: Vec<u32>,
    pub number_of_observations: Vec<u32>,
    pub position: usize,
    pub last_date: Option<Timestamp>,
}

/// Circular per-period counters for one (entity, metric) pair.
///
/// `position` always indexes the bucket of `last_date`'s period. Moving to a
/// later period zeroes every bucket passed on the way, at most once per
/// bucket, so a gap of any length costs at most `bucket_count` steps. A
/// bucket never counts more positives than observations.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRobinAggregate {
    entity_id: String,
    metric: Metric,
    strategy: BucketStrategy,
    counters: Buckets,
    number_of_observations: Buckets,
    position: usize,
    last_date: Option<Timestamp>,
}

impl RoundRobinAggregate {
    /// Creates an uninitialized aggregate.
    ///
    /// Buckets are allocated when the first measurement arrives.
    pub fn new(entity_id: impl Into<String>, metric: Metric, strategy: BucketStrategy) -> Self {
        Self {
            entity_id: entity_id.into(),
            metric,
            strategy,
            counters: Buckets::new(),
            number_of_observations: Buckets::new(),
            position: 0,
            last_date: None,
        }
    }

    /// Returns the id of the entity this aggregate belongs to.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the metric being counted.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Returns the bucket strategy of the window.
    pub fn strategy(&self) -> BucketStrategy {
        self.strategy
    }

    /// Returns the positive counts in storage order.
    pub fn counters(&self) -> &[u32] {
        &self.counters
    }

    /// Returns the observation counts in storage order.
    pub fn number_of_observations(&self) -> &[u32] {
        &self.number_of_observations
    }

    /// Returns the index of the bucket holding `last_date`'s period.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the timestamp of the latest recorded measurement.
    pub fn last_date(&self) -> Option<Timestamp> {
        self.last_date
    }

    /// Returns true once the buckets have been allocated.
    pub fn is_initialized(&self) -> bool {
        !self.counters.is_empty()
    }

    /// Records one observation taken at `observed_at`.
    ///
    /// `observations_in_period` is the number of scans performed so far in the
    /// bucket's period; it becomes the bucket's denominator. Returns the number
    /// of buckets the aggregate advanced.
    pub fn add_measurement(
        &mut self,
        is_positive: bool,
        observed_at: Timestamp,
        observations_in_period: u32,
    ) -> HistoryResult<usize> {
        let advanced = self.advance_to(observed_at)?;
        self.number_of_observations[self.position] = observations_in_period;
        if is_positive {
            self.counters[self.position] = self.counters[self.position].saturating_add(1);
        }
        Ok(advanced)
    }

    /// Overwrites the bucket of `observed_at` with an already aggregated count.
    ///
    /// A count above `observations_in_period` is rejected before the
    /// aggregate is touched.
    pub fn fill_bucket(
        &mut self,
        count: u32,
        observations_in_period: u32,
        observed_at: Timestamp,
    ) -> HistoryResult<usize> {
        if count > observations_in_period {
            return Err(HistoryError::invalid_aggregate(
                &self.entity_id,
                "count exceeds observations",
            ));
        }
        let advanced = self.advance_to(observed_at)?;
        self.number_of_observations[self.position] = observations_in_period;
        self.counters[self.position] = count;
        Ok(advanced)
    }

    fn advance_to(&mut self, observed_at: Timestamp) -> HistoryResult<usize> {
        let bucket_count = self.strategy.bucket_count();
        if self.counters.is_empty() {
            self.counters = zeroed(&self.entity_id, bucket_count)?;
            self.number_of_observations = zeroed(&self.entity_id, bucket_count)?;
            self.position = 0;
        }

        let last_date = match self.last_date {
            Some(last_date) => last_date,
            None => {
                self.last_date = Some(observed_at);
                return Ok(0);
            }
        };
        if observed_at < last_date {
            return Err(HistoryError::NonMonotonicDate {
                entity: self.entity_id.clone(),
                observed_at,
                last_date,
            });
        }

        let target = self.strategy.period_start(observed_at);
        let mut cursor = self.strategy.period_start(last_date);
        let mut advanced = 0;
        // After one full cycle every bucket has been zeroed; going further
        // would only zero them again.
        while cursor < target && advanced < bucket_count {
            self.position = (self.position + 1) % bucket_count;
            self.counters[self.position] = 0;
            self.number_of_observations[self.position] = 0;
            cursor = self.strategy.next_period_start(cursor);
            advanced += 1;
        }
        self.last_date = Some(observed_at);

        if advanced > 0 {
            let (_, period) = self.strategy.label();
            debug!(
                "Advanced {} aggregate of {} by {} {} buckets to position {}",
                self.metric.label(),
                self.entity_id,
                advanced,
                period,
                self.position
            );
        }
        Ok(advanced)
    }

    /// Returns the buckets from oldest to newest with their positive ratio.
    ///
    /// Buckets without observations yield `None` instead of dividing by zero.
    /// An uninitialized aggregate has no buckets.
    pub fn to_readable(&self) -> Vec<ReadableBucket> {
        let Some(last_date) = self.last_date else {
            return Vec::new();
        };
        let bucket_count = self.counters.len();
        let granularity = self.strategy.granularity();

        (1..=bucket_count)
            .map(|offset| {
                let index = (self.position + offset) % bucket_count;
                let periods_back = (bucket_count - offset) as u32;
                ReadableBucket {
                    start: granularity.periods_before(last_date, periods_back),
                    ratio: ratio(self.counters[index], self.number_of_observations[index]),
                }
            })
            .collect()
    }

    /// Returns the positive share over the whole window.
    ///
    /// The result is `None` when the window holds no observations.
    pub fn window_ratio(&self) -> Option<f64> {
        let positives = self.counters.iter().map(|&count| u64::from(count)).sum::<u64>();
        let observations = self
            .number_of_observations
            .iter()
            .map(|&count| u64::from(count))
            .sum::<u64>();
        (observations > 0).then(|| positives as f64 / observations as f64)
    }

    /// Converts the aggregate to its persisted row.
    pub fn to_row(&self) -> AggregateRow {
        AggregateRow {
            entity_id: self.entity_id.clone(),
            metric: self.metric,
            counters: self.counters.to_vec(),
            number_of_observations: self.number_of_observations.to_vec(),
            position: self.position,
            last_date: self.last_date,
        }
    }

    /// Creates an aggregate from a persisted row.
    ///
    /// Rows that break the buffer invariants are rejected.
    pub fn from_row(row: &AggregateRow, strategy: BucketStrategy) -> HistoryResult<Self> {
        let entity = row.entity_id.as_str();
        let expected = if row.counters.is_empty() { 0 } else { strategy.bucket_count() };

        if row.counters.len() != expected || row.number_of_observations.len() != expected {
            return Err(HistoryError::invalid_aggregate(entity, "bucket count does not match strategy"));
        }
        if expected > 0 && row.position >= expected {
            return Err(HistoryError::invalid_aggregate(entity, "position out of range"));
        }
        if expected > 0 && row.last_date.is_none() {
            return Err(HistoryError::invalid_aggregate(entity, "buckets without last date"));
        }
        if row
            .counters
            .iter()
            .zip(&row.number_of_observations)
            .any(|(count, observations)| count > observations)
        {
            return Err(HistoryError::invalid_aggregate(entity, "count exceeds observations"));
        }

        Ok(Self {
            entity_id: row.entity_id.clone(),
            metric: row.metric,
            strategy,
            counters: Buckets::from_slice(&row.counters)
                .map_err(|_| HistoryError::invalid_aggregate(entity, "too many buckets"))?,
            number_of_observations: Buckets::from_slice(&row.number_of_observations)
                .map_err(|_| HistoryError::invalid_aggregate(entity, "too many buckets"))?,
            position: row.position,
            last_date: row.last_date,
        })
    }
}

fn zeroed(entity: &str, bucket_count: usize) -> HistoryResult<Buckets> {
    let mut buckets = Buckets::new();
    buckets
        .resize(bucket_count, 0)
        .map_err(|_| HistoryError::invalid_aggregate(entity, "too many buckets"))?;
    Ok(buckets)
}

fn ratio(count: u32, observations: u32) -> Option<f64> {
    (observations > 0).then(|| f64::from(count) / f64::from(observations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{DAILY_30, HOURLY_24};
    use crate::time::{Granularity, at};
    use alloc::vec;

    fn hourly() -> RoundRobinAggregate {
        RoundRobinAggregate::new("GA", Metric::Validating, HOURLY_24)
    }

    #[test]
    fn test_first_measurement_allocates_buckets() {
        let mut aggregate = hourly();
        assert!(!aggregate.is_initialized());
        assert!(aggregate.to_readable().is_empty());

        aggregate.add_measurement(true, at(2024, 1, 1, 0, 0), 1).unwrap();
        assert_eq!(aggregate.counters().len(), 24);
        assert_eq!(aggregate.counters()[0], 1);
        assert_eq!(aggregate.position(), 0);
    }

    #[test]
    fn test_next_hour_moves_position() {
        let mut aggregate = hourly();
        aggregate.add_measurement(true, at(2024, 1, 1, 0, 0), 1).unwrap();
        let advanced = aggregate.add_measurement(false, at(2024, 1, 1, 1, 0), 2).unwrap();

        assert_eq!(advanced, 1);
        assert_eq!(aggregate.position(), 1);
        assert_eq!(&aggregate.counters()[..3], &[1, 0, 0]);
        assert_eq!(&aggregate.number_of_observations()[..3], &[1, 2, 0]);
    }

    #[test]
    fn test_same_bucket_increments_in_place() {
        let mut aggregate = hourly();
        for minute in [0, 10, 20, 30] {
            let advanced = aggregate
                .add_measurement(true, at(2024, 1, 1, 5, minute), minute / 10 + 1)
                .unwrap();
            assert_eq!(advanced, 0);
        }
        assert_eq!(aggregate.position(), 0);
        assert_eq!(aggregate.counters()[0], 4);
        assert_eq!(aggregate.number_of_observations()[0], 4);
    }

    #[test]
    fn test_full_cycle_zeroes_revisited_bucket() {
        let mut aggregate = hourly();
        for hour in 0..24 {
            aggregate.add_measurement(true, at(2024, 1, 1, hour, 0), 1).unwrap();
        }
        assert_eq!(aggregate.position(), 23);
        assert!(aggregate.counters().iter().all(|&count| count == 1));

        aggregate.add_measurement(false, at(2024, 1, 2, 0, 0), 1).unwrap();
        assert_eq!(aggregate.position(), 0);
        assert_eq!(aggregate.counters()[0], 0);
        assert_eq!(aggregate.number_of_observations()[0], 1);
        assert_eq!(aggregate.counters()[1], 1);
    }

    #[test]
    fn test_long_gap_is_bounded_and_clears_everything() {
        let mut aggregate = hourly();
        for hour in 0..10 {
            aggregate.add_measurement(true, at(2024, 1, 1, hour, 0), 1).unwrap();
        }
        let advanced = aggregate.add_measurement(true, at(2024, 6, 1, 12, 0), 1).unwrap();

        assert_eq!(advanced, 24);
        assert_eq!(aggregate.counters().iter().sum::<u32>(), 1);
        assert_eq!(aggregate.number_of_observations().iter().sum::<u32>(), 1);
        assert_eq!(aggregate.counters()[aggregate.position()], 1);
    }

    #[test]
    fn test_older_measurement_is_rejected() {
        let mut aggregate = hourly();
        aggregate.add_measurement(true, at(2024, 1, 1, 5, 30), 1).unwrap();
        let result = aggregate.add_measurement(true, at(2024, 1, 1, 5, 0), 1);
        assert!(matches!(result, Err(HistoryError::NonMonotonicDate { .. })));
        assert_eq!(aggregate.counters()[0], 1);
    }

    #[test]
    fn test_readable_window_is_oldest_first() {
        let mut aggregate = hourly();
        aggregate.add_measurement(true, at(2024, 1, 1, 22, 0), 2).unwrap();
        aggregate.add_measurement(true, at(2024, 1, 1, 23, 0), 1).unwrap();
        aggregate.add_measurement(false, at(2024, 1, 1, 23, 30), 2).unwrap();

        let readable = aggregate.to_readable();
        assert_eq!(readable.len(), 24);
        assert_eq!(readable[0].start, at(2024, 1, 1, 0, 0));
        assert_eq!(readable[0].ratio, None);
        assert_eq!(readable[22].start, at(2024, 1, 1, 22, 0));
        assert_eq!(readable[22].ratio, Some(0.5));
        assert_eq!(readable[23].start, at(2024, 1, 1, 23, 0));
        assert_eq!(readable[23].ratio, Some(0.5));
        assert_eq!(aggregate.window_ratio(), Some(0.5));
    }

    #[test]
    fn test_daily_fill_bucket_overwrites() {
        let mut aggregate = RoundRobinAggregate::new("org-1", Metric::SubQuorumAvailable, DAILY_30);
        aggregate.fill_bucket(90, 96, at(2024, 3, 1, 0, 0)).unwrap();
        aggregate.fill_bucket(96, 96, at(2024, 3, 1, 0, 0)).unwrap();
        aggregate.fill_bucket(48, 96, at(2024, 3, 3, 0, 0)).unwrap();

        assert_eq!(aggregate.position(), 2);
        assert_eq!(&aggregate.counters()[..3], &[96, 0, 48]);
        let readable = aggregate.to_readable();
        assert_eq!(readable[29].start, at(2024, 3, 3, 0, 0));
        assert_eq!(readable[28].ratio, None);
        assert_eq!(readable[27].ratio, Some(1.0));
        assert_eq!(readable[0].start, Granularity::Daily.periods_before(at(2024, 3, 3, 0, 0), 29));
    }

    #[test]
    fn test_fill_bucket_rejects_count_above_observations() {
        let mut aggregate = RoundRobinAggregate::new("org-1", Metric::SubQuorumAvailable, DAILY_30);
        aggregate.fill_bucket(10, 10, at(2024, 3, 1, 0, 0)).unwrap();

        let result = aggregate.fill_bucket(50, 10, at(2024, 3, 2, 0, 0));
        assert!(matches!(result, Err(HistoryError::InvalidAggregate { .. })));
        assert_eq!(aggregate.position(), 0);
        assert_eq!(aggregate.last_date(), Some(at(2024, 3, 1, 0, 0)));
        assert!(aggregate.to_readable().iter().all(|bucket| bucket.ratio.is_none_or(|r| r <= 1.0)));
    }

    #[test]
    fn test_row_rehydration_is_validated() {
        let mut aggregate = hourly();
        aggregate.add_measurement(true, at(2024, 1, 1, 3, 0), 1).unwrap();
        let row = aggregate.to_row();
        assert_eq!(RoundRobinAggregate::from_row(&row, HOURLY_24).unwrap(), aggregate);

        assert!(RoundRobinAggregate::from_row(&row, DAILY_30).is_err());

        let mut bad_position = row.clone();
        bad_position.position = 24;
        assert!(RoundRobinAggregate::from_row(&bad_position, HOURLY_24).is_err());

        let mut overcounted = row.clone();
        overcounted.counters[5] = 3;
        overcounted.number_of_observations[5] = 2;
        assert!(matches!(
            RoundRobinAggregate::from_row(&overcounted, HOURLY_24),
            Err(HistoryError::InvalidAggregate { .. })
        ));

        let empty = AggregateRow {
            entity_id: "GA".into(),
            metric: Metric::Validating,
            counters: vec![],
            number_of_observations: vec![],
            position: 0,
            last_date: None,
        };
        assert!(!RoundRobinAggregate::from_row(&empty, HOURLY_24).unwrap().is_initialized());
    }
}
