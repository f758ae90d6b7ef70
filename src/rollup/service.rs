use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::{debug, error, info, warn};

use super::{MeasurementRollup, RollupBookkeeping, RollupRepository, RollupTarget};
use crate::config::HistoryConfig;
use crate::error::HistoryResult;

/// What one run did per enabled target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupReport {
    /// Targets that aggregated new scans, with the scan range handed over
    pub advanced: Vec<(RollupTarget, u64, u64)>,
    /// Targets that had nothing new
    pub skipped: Vec<RollupTarget>,
    /// Enabled targets that could not run because no repository is registered
    pub unregistered: Vec<RollupTarget>,
}

impl RollupReport {
    /// Returns true when no target aggregated anything.
    pub fn is_noop(&self) -> bool {
        self.advanced.is_empty()
    }
}

/// Drives every enabled rollup target up to a committed scan.
///
/// Targets run in [`RollupTarget::ALL`] order. A failing target stops the run;
/// targets that already advanced keep their new bookkeeping row and the
/// failing one is retried from the same range next time. An enabled target
/// without a repository is logged and listed in the report, and its
/// bookkeeping is left untouched.
pub struct AggregationRollupService<B: RollupBookkeeping> {
    bookkeeping: B,
    enabled: Vec<RollupTarget>,
    repositories: BTreeMap<RollupTarget, Box<dyn RollupRepository>>,
}

impl<B: RollupBookkeeping> AggregationRollupService<B> {
    /// Creates a service running every target.
    pub fn new(bookkeeping: B) -> Self {
        Self {
            bookkeeping,
            enabled: RollupTarget::ALL.to_vec(),
            repositories: BTreeMap::new(),
        }
    }

    /// Creates a service running the targets enabled in `config`.
    pub fn from_config(bookkeeping: B, config: &HistoryConfig) -> HistoryResult<Self> {
        config.validate()?;
        let mut enabled = config.rollup_targets.clone();
        enabled.sort();
        Ok(Self {
            bookkeeping,
            enabled,
            repositories: BTreeMap::new(),
        })
    }

    /// Attaches the repository of `target`, replacing any previous one.
    pub fn register(&mut self, target: RollupTarget, repository: impl RollupRepository + 'static) {
        if !self.enabled.contains(&target) {
            warn!("Registering repository for disabled rollup target {}", target.name());
        }
        self.repositories.insert(target, Box::new(repository));
    }

    /// Returns the repository registered for `target`.
    pub fn repository(&self, target: RollupTarget) -> Option<&dyn RollupRepository> {
        self.repositories.get(&target).map(|repository| &**repository)
    }

    /// Returns the bookkeeping store.
    pub fn bookkeeping(&self) -> &B {
        &self.bookkeeping
    }

    /// Folds every scan up to and including `scan_id` into each enabled target.
    ///
    /// `scan_id` must be fully committed.
    pub fn rollup_measurements(&mut self, scan_id: u64) -> HistoryResult<RollupReport> {
        let mut report = RollupReport::default();

        for &target in &self.enabled {
            let name = target.name();
            let Some(repository) = self.repositories.get_mut(&target) else {
                warn!("Rollup target {} is enabled but has no repository", name);
                report.unregistered.push(target);
                continue;
            };

            let mut row = match self.bookkeeping.find(name)? {
                Some(row) => row,
                None => {
                    info!("Creating rollup bookkeeping row {}", name);
                    let row = MeasurementRollup::new(name);
                    self.bookkeeping.save(row.clone())?;
                    row
                }
            };

            let from_id = row.last_aggregated_scan_id.saturating_add(1);
            if from_id > scan_id {
                debug!("Rollup {} already covers scan {}", name, scan_id);
                report.skipped.push(target);
                continue;
            }

            if let Err(e) = repository.rollup(from_id, scan_id) {
                error!("Rollup {} of scans {}..={} failed: {}", name, from_id, scan_id, e);
                return Err(e);
            }
            row.last_aggregated_scan_id = scan_id;
            self.bookkeeping.save(row)?;

            info!("Rolled up {} through scan {}", name, scan_id);
            report.advanced.push((target, from_id, scan_id));
        }

        Ok(report)
    }
}
