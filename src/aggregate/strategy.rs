use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, HistoryResult};
use crate::time::{Granularity, Timestamp};

/// Largest bucket count any strategy may use.
pub const MAX_BUCKETS: usize = 30;

/// Last 24 calendar hours.
pub const HOURLY_24: BucketStrategy = BucketStrategy {
    bucket_count: 24,
    granularity: Granularity::Hourly,
};

/// Last 30 calendar days.
pub const DAILY_30: BucketStrategy = BucketStrategy {
    bucket_count: 30,
    granularity: Granularity::Daily,
};

/// How many buckets an aggregate keeps and which period each covers.
///
/// The bucket count is always within `1..=MAX_BUCKETS`. Fields are private so
/// every strategy goes through [`BucketStrategy::new`], including ones read
/// from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StrategyFields")]
pub struct BucketStrategy {
    bucket_count: usize,
    granularity: Granularity,
}

/// Unvalidated shape of a deserialized strategy.
#[derive(Deserialize)]
struct StrategyFields {
    bucket_count: usize,
    granularity: Granularity,
}

impl TryFrom<StrategyFields> for BucketStrategy {
    type Error = HistoryError;

    fn try_from(fields: StrategyFields) -> HistoryResult<Self> {
        Self::new(fields.bucket_count, fields.granularity)
    }
}

impl BucketStrategy {
    /// Creates a strategy, rejecting bucket counts outside `1..=MAX_BUCKETS`.
    pub fn new(bucket_count: usize, granularity: Granularity) -> HistoryResult<Self> {
        if bucket_count == 0 || bucket_count > MAX_BUCKETS {
            return Err(HistoryError::Config(alloc::format!(
                "bucket count must be between 1 and {MAX_BUCKETS}, got {bucket_count}"
            )));
        }
        Ok(Self {
            bucket_count,
            granularity,
        })
    }

    /// Returns the number of buckets in the window.
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Returns the calendar period one bucket covers.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Returns the start of the bucket period containing `date`.
    pub fn period_start(&self, date: Timestamp) -> Timestamp {
        self.granularity.period_start(date)
    }

    /// Returns the start of the bucket period after the one containing `date`.
    pub fn next_period_start(&self, date: Timestamp) -> Timestamp {
        self.granularity.next_period_start(date)
    }

    /// Returns the bucket count and period label, for logs.
    pub fn label(&self) -> (usize, &'static str) {
        (self.bucket_count, self.granularity.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_strategies() {
        assert_eq!(HOURLY_24.label(), (24, "hour"));
        assert_eq!(DAILY_30.label(), (30, "day"));
        assert!(HOURLY_24.bucket_count() <= MAX_BUCKETS);
        assert_eq!(DAILY_30.granularity(), Granularity::Daily);
    }

    #[test]
    fn test_bucket_count_is_bounded() {
        assert!(BucketStrategy::new(0, Granularity::Hourly).is_err());
        assert!(BucketStrategy::new(MAX_BUCKETS + 1, Granularity::Daily).is_err());
        assert_eq!(BucketStrategy::new(24, Granularity::Hourly).unwrap(), HOURLY_24);
    }

    #[test]
    fn test_deserialized_strategy_is_validated() {
        let zero = serde_json::from_str::<BucketStrategy>(r#"{ "bucket_count": 0, "granularity": "Hourly" }"#);
        assert!(zero.is_err());

        let json = serde_json::to_string(&DAILY_30).unwrap();
        assert_eq!(serde_json::from_str::<BucketStrategy>(&json).unwrap(), DAILY_30);
    }
}
