//! Resumable promotion of per-scan measurements into day and month rows.
//!
//! Every rollup target keeps one [`MeasurementRollup`] bookkeeping row with the
//! last scan id it aggregated. A run only ever hands the target repository the
//! scans it has not seen yet, so calling
//! [`AggregationRollupService::rollup_measurements`] twice for the same scan is
//! a no-op the second time.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::HistoryResult;
use crate::measurement::{EntityKind, Metric};
use crate::time::{Granularity, Timestamp};

pub mod period_store;
pub mod service;

pub use period_store::PeriodRollupStore;
pub use service::{AggregationRollupService, RollupReport};

/// Summary table a rollup fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RollupTarget {
    NodeDay,
    OrganizationDay,
    NetworkDay,
    NetworkMonth,
}

impl RollupTarget {
    /// Every target, in the order a rollup run visits them.
    pub const ALL: [Self; 4] = [
        Self::NodeDay,
        Self::OrganizationDay,
        Self::NetworkDay,
        Self::NetworkMonth,
    ];

    /// Returns the name of the bookkeeping row.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NodeDay => "node_measurement_day",
            Self::OrganizationDay => "organization_measurement_day",
            Self::NetworkDay => "network_measurement_day",
            Self::NetworkMonth => "network_measurement_month",
        }
    }

    /// Returns the entity kind the target summarizes.
    pub const fn kind(self) -> EntityKind {
        match self {
            Self::NodeDay => EntityKind::Node,
            Self::OrganizationDay => EntityKind::Organization,
            Self::NetworkDay | Self::NetworkMonth => EntityKind::Network,
        }
    }

    /// Returns the period length of the target's rows.
    pub const fn granularity(self) -> Granularity {
        match self {
            Self::NodeDay | Self::OrganizationDay | Self::NetworkDay => Granularity::Daily,
            Self::NetworkMonth => Granularity::Monthly,
        }
    }
}

/// Bookkeeping row holding the last scan id a target has aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRollup {
    pub name: String,
    pub last_aggregated_scan_id: u64,
}

impl MeasurementRollup {
    /// Creates a row that has aggregated nothing yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_aggregated_scan_id: 0,
        }
    }
}

/// One rolled-up period of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementPeriodRow {
    pub entity_id: String,
    pub granularity: Granularity,
    pub period_start: Timestamp,
    /// Scans in which the entity was measured during the period
    pub scan_count: u32,
    /// Positive measurements per metric
    pub positive: BTreeMap<Metric, u32>,
    /// Highest scan id folded into this row
    pub last_scan_id: u64,
}

impl MeasurementPeriodRow {
    /// Creates an empty row for the period starting at `period_start`.
    pub fn new(entity_id: impl Into<String>, granularity: Granularity, period_start: Timestamp) -> Self {
        Self {
            entity_id: entity_id.into(),
            granularity,
            period_start: granularity.period_start(period_start),
            scan_count: 0,
            positive: BTreeMap::new(),
            last_scan_id: 0,
        }
    }

    /// Returns the positive count of `metric`.
    pub fn positives(&self, metric: Metric) -> u32 {
        self.positive.get(&metric).copied().unwrap_or(0)
    }

    /// Returns the positive share of the period.
    ///
    /// The result is `None` before any scan was counted.
    pub fn ratio(&self, metric: Metric) -> Option<f64> {
        (self.scan_count > 0).then(|| f64::from(self.positives(metric)) / f64::from(self.scan_count))
    }
}

/// Storage of one rollup target.
pub trait RollupRepository {
    /// Folds scans `from_scan_id..=to_scan_id` into the summary rows.
    ///
    /// Must be an idempotent upsert per (entity, period).
    fn rollup(&mut self, from_scan_id: u64, to_scan_id: u64) -> HistoryResult<()>;

    /// Returns the rows of `entity_id` from the period containing `from`
    /// through the last period starting at or before `to`, oldest first.
    fn find_between(
        &self,
        entity_id: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> HistoryResult<Vec<MeasurementPeriodRow>>;
}

/// Storage of the [`MeasurementRollup`] rows.
pub trait RollupBookkeeping {
    /// Returns the row called `name`, if one was saved.
    fn find(&self, name: &str) -> HistoryResult<Option<MeasurementRollup>>;
    /// Inserts or replaces a row.
    fn save(&mut self, rollup: MeasurementRollup) -> HistoryResult<()>;
}

/// Bookkeeping kept in memory, for tests and single-process runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRollupBookkeeping {
    rows: BTreeMap<String, MeasurementRollup>,
}

impl InMemoryRollupBookkeeping {
    /// Creates an empty bookkeeping store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RollupBookkeeping for InMemoryRollupBookkeeping {
    fn find(&self, name: &str) -> HistoryResult<Option<MeasurementRollup>> {
        Ok(self.rows.get(name).cloned())
    }

    fn save(&mut self, rollup: MeasurementRollup) -> HistoryResult<()> {
        self.rows.insert(rollup.name.clone(), rollup);
        Ok(())
    }
}
