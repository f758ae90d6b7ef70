//! Per-scan staging of snapshot transitions.
//!
//! A scan touches many chains. Transitions are staged on copies of the
//! affected chains and swapped into the registry only when the whole scan
//! staged, and persisted, without error. A failure anywhere leaves every live
//! chain as it was, so the "exactly one open snapshot" invariant holds for the
//! stored rows too.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{HistoryError, HistoryResult};
use crate::snapshot::{SnapshotChain, SnapshotFactory, SnapshotPayload, SnapshotRepository, SnapshotRow};
use crate::time::Timestamp;

/// Result of a committed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Closed and opened snapshots to persist together
    pub rows: Vec<SnapshotRow>,
    /// Entities that got a new snapshot
    pub changed: Vec<String>,
    /// Entities observed without meaningful change
    pub unchanged: usize,
}

/// Live chains of one entity kind, keyed by entity id.
#[derive(Debug, Clone)]
pub struct ChainRegistry<P> {
    chains: BTreeMap<String, SnapshotChain<P>>,
}

impl<P> Default for ChainRegistry<P> {
    fn default() -> Self {
        Self {
            chains: BTreeMap::new(),
        }
    }
}

impl<P: SnapshotPayload + Serialize> ChainRegistry<P> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rehydrated chain, replacing any chain of the same entity.
    pub fn insert(&mut self, chain: SnapshotChain<P>) {
        self.chains.insert(String::from(chain.entity_id()), chain);
    }

    /// Returns the live chain of `entity_id`.
    pub fn get(&self, entity_id: &str) -> Option<&SnapshotChain<P>> {
        self.chains.get(entity_id)
    }

    /// Returns the number of known entities.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotChain<P>> {
        self.chains.values()
    }

    /// Starts staging the transitions of a scan taken at `as_of`.
    pub fn begin_scan(&self, as_of: Timestamp) -> ScanBatch<P> {
        ScanBatch {
            as_of,
            staged: BTreeMap::new(),
            seen: BTreeSet::new(),
            unchanged: 0,
        }
    }

    /// Stages every observation of a scan and commits them as one unit.
    ///
    /// Entities missing from `observations` keep their chain untouched.
    pub fn apply_scan<'o, F>(
        &mut self,
        factory: &mut F,
        observations: impl IntoIterator<Item = &'o F::Observation>,
        as_of: Timestamp,
    ) -> HistoryResult<ScanOutcome>
    where
        F: SnapshotFactory<Payload = P>,
        F::Observation: 'o,
    {
        let batch = self.stage_all(factory, observations, as_of)?;
        self.commit(batch)
    }

    /// Works like [`Self::apply_scan`], but only commits once `repository`
    /// stored every row.
    pub fn apply_and_persist<'o, F, R>(
        &mut self,
        factory: &mut F,
        observations: impl IntoIterator<Item = &'o F::Observation>,
        as_of: Timestamp,
        repository: &mut R,
    ) -> HistoryResult<ScanOutcome>
    where
        F: SnapshotFactory<Payload = P>,
        F::Observation: 'o,
        R: SnapshotRepository + ?Sized,
    {
        let batch = self.stage_all(factory, observations, as_of)?;
        self.commit_to(batch, repository)
    }

    fn stage_all<'o, F>(
        &self,
        factory: &mut F,
        observations: impl IntoIterator<Item = &'o F::Observation>,
        as_of: Timestamp,
    ) -> HistoryResult<ScanBatch<P>>
    where
        F: SnapshotFactory<Payload = P>,
        F::Observation: 'o,
    {
        let mut batch = self.begin_scan(as_of);
        for observation in observations {
            if let Err(e) = batch.stage(self, factory, observation) {
                warn!("Discarding scan batch at {}: {}", as_of, e);
                return Err(e);
            }
        }
        Ok(batch)
    }

    /// Swaps every staged chain into the registry.
    pub fn commit(&mut self, batch: ScanBatch<P>) -> HistoryResult<ScanOutcome> {
        let rows = batch.rows()?;
        Ok(self.swap_in(batch, rows))
    }

    /// Persists the batch's rows, then swaps the staged chains in.
    ///
    /// If the repository fails the registry is left unchanged.
    pub fn commit_to<R: SnapshotRepository + ?Sized>(
        &mut self,
        batch: ScanBatch<P>,
        repository: &mut R,
    ) -> HistoryResult<ScanOutcome> {
        let rows = batch.rows()?;
        if let Err(e) = repository.save_batch(rows.clone()) {
            warn!("Discarding scan batch at {}: {}", batch.as_of, e);
            return Err(e);
        }
        Ok(self.swap_in(batch, rows))
    }

    fn swap_in(&mut self, batch: ScanBatch<P>, rows: Vec<SnapshotRow>) -> ScanOutcome {
        let changed: Vec<String> = batch.staged.keys().cloned().collect();
        self.chains.extend(batch.staged);
        info!(
            "Committed scan at {}: {} changed, {} unchanged, {} rows",
            batch.as_of,
            changed.len(),
            batch.unchanged,
            rows.len()
        );
        ScanOutcome {
            rows,
            changed,
            unchanged: batch.unchanged,
        }
    }
}

/// Transitions of one scan that have not been committed yet.
#[derive(Debug, Clone)]
pub struct ScanBatch<P> {
    as_of: Timestamp,
    staged: BTreeMap<String, SnapshotChain<P>>,
    seen: BTreeSet<String>,
    unchanged: usize,
}

impl<P: SnapshotPayload + Serialize> ScanBatch<P> {
    /// Returns the scan time every staged snapshot starts at.
    pub fn as_of(&self) -> Timestamp {
        self.as_of
    }

    /// Builds the candidate for one observation and stages it.
    ///
    /// Returns whether the entity changed. An entity may only be observed once
    /// per scan.
    pub fn stage<F>(
        &mut self,
        registry: &ChainRegistry<P>,
        factory: &mut F,
        observation: &F::Observation,
    ) -> HistoryResult<bool>
    where
        F: SnapshotFactory<Payload = P>,
    {
        let entity_id = factory.entity_id(observation);
        if !self.seen.insert(String::from(entity_id)) {
            return Err(HistoryError::chain_order(entity_id, "entity observed twice in one scan"));
        }

        let mut chain = registry
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| SnapshotChain::new(entity_id));
        let candidate = factory.create(observation, chain.current_snapshot().ok(), self.as_of)?;

        if chain.add_snapshot(candidate)? {
            self.staged.insert(String::from(entity_id), chain);
            Ok(true)
        } else {
            debug!("No change for {} at {}", entity_id, self.as_of);
            self.unchanged += 1;
            Ok(false)
        }
    }

    /// Iterates over the entities that got a new snapshot.
    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.staged.keys().map(String::as_str)
    }

    /// Returns the closed and opened snapshot of every changed chain.
    pub fn rows(&self) -> HistoryResult<Vec<SnapshotRow>> {
        let mut rows = Vec::new();
        for chain in self.staged.values() {
            for snapshot in chain.tail(2) {
                rows.push(snapshot.to_row(chain.entity_id())?);
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, SnapshotFactory};
    use crate::time::{at, max_date};
    use alloc::vec;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Port(u16);

    impl SnapshotPayload for Port {
        fn contains_updates(&self, current: &Self) -> bool {
            self != current
        }
    }

    /// Observation is (entity id, port); port 0 is rejected
    struct PortFactory;

    impl SnapshotFactory for PortFactory {
        type Observation = (String, u16);
        type Payload = Port;

        fn entity_id<'o>(&self, observation: &'o (String, u16)) -> &'o str {
            &observation.0
        }

        fn create(
            &mut self,
            observation: &(String, u16),
            _previous: Option<&Snapshot<Port>>,
            as_of: Timestamp,
        ) -> HistoryResult<Snapshot<Port>> {
            if observation.1 == 0 {
                return Err(HistoryError::Codec("port 0".into()));
            }
            Ok(Snapshot::new(as_of, Port(observation.1)))
        }
    }

    #[derive(Default)]
    struct Rows {
        saved: Vec<SnapshotRow>,
        fail: bool,
    }

    impl SnapshotRepository for Rows {
        fn save_batch(&mut self, rows: Vec<SnapshotRow>) -> HistoryResult<()> {
            if self.fail {
                return Err(HistoryError::repository("write conflict"));
            }
            self.saved.extend(rows);
            Ok(())
        }
    }

    fn obs(entity: &str, port: u16) -> (String, u16) {
        (entity.into(), port)
    }

    #[test]
    fn test_scan_commits_changed_chains_only() {
        let mut registry = ChainRegistry::new();
        let first = vec![obs("GA", 11625), obs("GB", 11625)];
        let outcome = registry.apply_scan(&mut PortFactory, &first, at(2024, 1, 1, 0, 0)).unwrap();
        assert_eq!(outcome.changed, vec![String::from("GA"), String::from("GB")]);
        assert_eq!(outcome.rows.len(), 2);

        let second = vec![obs("GA", 11625), obs("GB", 11626)];
        let outcome = registry.apply_scan(&mut PortFactory, &second, at(2024, 1, 2, 0, 0)).unwrap();
        assert_eq!(outcome.changed, vec![String::from("GB")]);
        assert_eq!(outcome.unchanged, 1);
        // Closed predecessor and new open snapshot
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0].end_date, at(2024, 1, 2, 0, 0));
        assert_eq!(outcome.rows[1].end_date, max_date());

        assert_eq!(registry.get("GA").unwrap().len(), 1);
        assert_eq!(registry.get("GB").unwrap().len(), 2);
    }

    #[test]
    fn test_failed_observation_discards_whole_scan() {
        let mut registry = ChainRegistry::new();
        registry
            .apply_scan(&mut PortFactory, &[obs("GA", 1)], at(2024, 1, 1, 0, 0))
            .unwrap();

        let scan = vec![obs("GA", 2), obs("GB", 0)];
        assert!(registry.apply_scan(&mut PortFactory, &scan, at(2024, 1, 2, 0, 0)).is_err());
        assert_eq!(registry.get("GA").unwrap().len(), 1);
        assert!(registry.get("GB").is_none());
    }

    #[test]
    fn test_duplicate_entity_is_rejected() {
        let mut registry = ChainRegistry::new();
        let scan = vec![obs("GA", 1), obs("GA", 2)];
        let result = registry.apply_scan(&mut PortFactory, &scan, at(2024, 1, 1, 0, 0));
        assert!(matches!(result, Err(HistoryError::ChainOrder { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_repository_failure_keeps_registry() {
        let mut registry = ChainRegistry::new();
        let mut repository = Rows {
            fail: true,
            ..Rows::default()
        };
        let result = registry.apply_and_persist(
            &mut PortFactory,
            &[obs("GA", 1)],
            at(2024, 1, 1, 0, 0),
            &mut repository,
        );
        assert!(result.is_err());
        assert!(registry.is_empty());

        repository.fail = false;
        registry
            .apply_and_persist(&mut PortFactory, &[obs("GA", 1)], at(2024, 1, 1, 0, 0), &mut repository)
            .unwrap();
        assert_eq!(repository.saved.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_manual_batch() {
        let registry: ChainRegistry<Port> = ChainRegistry::new();
        let mut batch = registry.begin_scan(at(2024, 1, 1, 0, 0));
        assert!(batch.stage(&registry, &mut PortFactory, &obs("GA", 1)).unwrap());
        assert_eq!(batch.changed().collect::<Vec<_>>(), vec!["GA"]);
        assert_eq!(batch.rows().unwrap().len(), 1);
    }
}
