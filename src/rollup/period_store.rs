use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, trace};

use super::{MeasurementPeriodRow, RollupRepository, RollupTarget};
use crate::error::HistoryResult;
use crate::measurement::{EntityKind, ScanMeasurement};
use crate::time::{Granularity, Timestamp};

/// In-memory rollup repository for one entity kind and granularity.
///
/// Raw measurements are kept until a rollup covers their scan. Rolling up a
/// scan range upserts one row per (entity, period); a measurement is folded
/// into its row only when its scan id is newer than the row's `last_scan_id`,
/// so re-running any range never double counts. Once folded, every raw
/// measurement up to the end of the range is dropped.
#[derive(Debug, Clone)]
pub struct PeriodRollupStore {
    kind: EntityKind,
    granularity: Granularity,
    raw: Vec<ScanMeasurement>,
    rows: BTreeMap<(String, Timestamp), MeasurementPeriodRow>,
}

impl PeriodRollupStore {
    /// Creates an empty store for one entity kind and granularity.
    pub fn new(kind: EntityKind, granularity: Granularity) -> Self {
        Self {
            kind,
            granularity,
            raw: Vec::new(),
            rows: BTreeMap::new(),
        }
    }

    /// Creates an empty store matching a rollup target.
    pub fn for_target(target: RollupTarget) -> Self {
        Self::new(target.kind(), target.granularity())
    }

    /// Returns the entity kind this store accepts.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the period length of the rows.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Keeps a raw measurement until it is rolled up.
    ///
    /// Measurements of other entity kinds are skipped, so one scan's
    /// measurements can be offered to every store.
    pub fn ingest(&mut self, measurement: ScanMeasurement) {
        if measurement.kind != self.kind {
            trace!(
                "Skipping {} measurement in {} rollup store",
                measurement.kind.label(),
                self.kind.label()
            );
            return;
        }
        self.raw.push(measurement);
    }

    /// Returns the number of raw measurements still waiting for a rollup.
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    /// Returns the row of `entity_id` for the period containing `date`.
    pub fn row(&self, entity_id: &str, date: Timestamp) -> Option<&MeasurementPeriodRow> {
        let key = (String::from(entity_id), self.granularity.period_start(date));
        self.rows.get(&key)
    }

    /// Returns every row in (entity, period) order.
    pub fn rows(&self) -> impl Iterator<Item = &MeasurementPeriodRow> {
        self.rows.values()
    }
}

impl RollupRepository for PeriodRollupStore {
    fn rollup(&mut self, from_scan_id: u64, to_scan_id: u64) -> HistoryResult<()> {
        let mut pending: Vec<&ScanMeasurement> = self
            .raw
            .iter()
            .filter(|m| (from_scan_id..=to_scan_id).contains(&m.scan_id))
            .collect();
        // The per-row guard needs ascending scan ids.
        pending.sort_by_key(|m| m.scan_id);

        let granularity = self.granularity;
        let mut folded = 0usize;
        for measurement in pending {
            let period_start = granularity.period_start(measurement.observed_at);
            let row = self
                .rows
                .entry((measurement.entity_id.clone(), period_start))
                .or_insert_with(|| {
                    MeasurementPeriodRow::new(measurement.entity_id.as_str(), granularity, period_start)
                });
            if measurement.scan_id <= row.last_scan_id {
                continue;
            }

            row.scan_count = row.scan_count.saturating_add(1);
            for &metric in self.kind.metrics() {
                if measurement.flag(metric) {
                    let count = row.positive.entry(metric).or_insert(0);
                    *count = count.saturating_add(1);
                }
            }
            row.last_scan_id = measurement.scan_id;
            folded += 1;
        }
        self.raw.retain(|m| m.scan_id > to_scan_id);

        debug!(
            "Rolled up {} {} measurements of scans {}..={} into {} rows",
            folded,
            self.kind.label(),
            from_scan_id,
            to_scan_id,
            self.granularity.label()
        );
        Ok(())
    }

    fn find_between(
        &self,
        entity_id: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> HistoryResult<Vec<MeasurementPeriodRow>> {
        let entity = String::from(entity_id);
        let start = (entity.clone(), self.granularity.period_start(from));
        let end = (entity, to);
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.rows.range(start..=end).map(|(_, row)| row.clone()).collect())
    }
}
