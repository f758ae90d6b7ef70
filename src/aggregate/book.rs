use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use log::debug;

use super::round_robin::{AggregateRow, RoundRobinAggregate};
use super::strategy::BucketStrategy;
use crate::config::HistoryConfig;
use crate::error::{HistoryError, HistoryResult};
use crate::measurement::{EntityKind, Metric, ScanMeasurement};
use crate::rollup::MeasurementPeriodRow;
use crate::time::Granularity;

/// Every round-robin aggregate of one entity kind and one strategy.
///
/// Aggregates are created lazily the first time an entity is measured and
/// are keyed by (entity id, metric).
#[derive(Debug, Clone)]
pub struct AggregateBook {
    kind: EntityKind,
    strategy: BucketStrategy,
    aggregates: BTreeMap<(String, Metric), RoundRobinAggregate>,
}

impl AggregateBook {
    /// Creates an empty book.
    pub fn new(kind: EntityKind, strategy: BucketStrategy) -> Self {
        Self {
            kind,
            strategy,
            aggregates: BTreeMap::new(),
        }
    }

    /// Creates an empty book using the configured window for `granularity`.
    ///
    /// Only hourly and daily windows are configurable.
    pub fn from_config(kind: EntityKind, granularity: Granularity, config: &HistoryConfig) -> HistoryResult<Self> {
        let strategy = match granularity {
            Granularity::Hourly => config.hourly_window,
            Granularity::Daily => config.daily_window,
            other => {
                return Err(HistoryError::Config(alloc::format!(
                    "no aggregate window is configured for {} buckets",
                    other.label()
                )));
            }
        };
        Ok(Self::new(kind, strategy))
    }

    /// Rebuilds a book from persisted rows.
    pub fn load(kind: EntityKind, strategy: BucketStrategy, rows: &[AggregateRow]) -> HistoryResult<Self> {
        let mut book = Self::new(kind, strategy);
        for row in rows {
            let aggregate = RoundRobinAggregate::from_row(row, strategy)?;
            book.aggregates
                .insert((row.entity_id.clone(), row.metric), aggregate);
        }
        Ok(book)
    }

    /// Returns the entity kind this book aggregates.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the strategy shared by every aggregate in the book.
    pub fn strategy(&self) -> BucketStrategy {
        self.strategy
    }

    /// Returns the number of (entity, metric) aggregates.
    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    /// Returns true when no entity has been measured yet.
    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Returns the aggregate of one entity and metric, if it exists.
    pub fn get(&self, entity_id: &str, metric: Metric) -> Option<&RoundRobinAggregate> {
        self.aggregates.get(&(String::from(entity_id), metric))
    }

    fn entry(&mut self, entity_id: &str, metric: Metric) -> &mut RoundRobinAggregate {
        let strategy = self.strategy;
        self.aggregates
            .entry((String::from(entity_id), metric))
            .or_insert_with(|| RoundRobinAggregate::new(entity_id, metric, strategy))
    }

    /// Adds one scan's measurement to every metric of its entity.
    ///
    /// A measurement of another entity kind is rejected.
    pub fn record(&mut self, measurement: &ScanMeasurement, observations_in_period: u32) -> HistoryResult<()> {
        if measurement.kind != self.kind {
            return Err(HistoryError::KindMismatch {
                entity: measurement.entity_id.clone(),
                expected: self.kind.label(),
                found: measurement.kind.label(),
            });
        }
        for &metric in self.kind.metrics() {
            self.entry(&measurement.entity_id, metric).add_measurement(
                measurement.flag(metric),
                measurement.observed_at,
                observations_in_period,
            )?;
        }
        Ok(())
    }

    /// Rebuilds an entity's buckets from rolled-up period rows.
    ///
    /// Rows must share the strategy's granularity and are applied oldest first.
    pub fn backfill(&mut self, entity_id: &str, rows: &[MeasurementPeriodRow]) -> HistoryResult<()> {
        let mut ordered: Vec<&MeasurementPeriodRow> = rows.iter().collect();
        ordered.sort_by_key(|row| row.period_start);

        for &metric in self.kind.metrics() {
            let aggregate = self.entry(entity_id, metric);
            for row in &ordered {
                aggregate.fill_bucket(row.positives(metric), row.scan_count, row.period_start)?;
            }
        }
        debug!("Backfilled {} from {} period rows", entity_id, ordered.len());
        Ok(())
    }

    /// Returns the rows of every aggregate, for the storage layer.
    pub fn rows(&self) -> Vec<AggregateRow> {
        self.aggregates.values().map(RoundRobinAggregate::to_row).collect()
    }
}
