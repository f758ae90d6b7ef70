use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, info};

use super::{Snapshot, SnapshotPayload};
use crate::error::{HistoryError, HistoryResult};
use crate::time::{Timestamp, max_date};

/// Ordered, gap-free, overlap-free history of one entity.
///
/// Invariants kept by every mutation:
/// - `end_date >= start_date` for every snapshot
/// - every snapshot but the last ends where its successor starts
/// - the last snapshot, and only the last, is open
///
/// Open snapshots only close when superseded. Snapshots are never removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotChain<P> {
    entity_id: String,
    snapshots: Vec<Snapshot<P>>,
}

impl<P: SnapshotPayload> SnapshotChain<P> {
    /// Creates an empty chain.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            snapshots: Vec::new(),
        }
    }

    /// Rehydrates a chain from persisted snapshots ordered by start date.
    pub fn from_snapshots(entity_id: impl Into<String>, snapshots: Vec<Snapshot<P>>) -> HistoryResult<Self> {
        let chain = Self {
            entity_id: entity_id.into(),
            snapshots,
        };
        chain.verify()?;
        Ok(chain)
    }

    /// Returns the id of the entity this chain describes.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the number of snapshots, the open one included.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Iterates over the snapshots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot<P>> {
        self.snapshots.iter()
    }

    /// Returns the currently valid snapshot.
    pub fn current_snapshot(&self) -> HistoryResult<&Snapshot<P>> {
        self.snapshots
            .last()
            .ok_or_else(|| HistoryError::NoSnapshots(self.entity_id.clone()))
    }

    /// Creates an unpersisted copy of the current snapshot, valid from `as_of`.
    ///
    /// The caller mutates the payload and hands it back to [`Self::add_snapshot`].
    pub fn create_working_copy(&self, as_of: Timestamp) -> HistoryResult<Snapshot<P>> {
        let current = self.current_snapshot()?;
        Ok(Snapshot::new(as_of, current.payload.clone()))
    }

    /// Appends `candidate` if it changes anything.
    ///
    /// Returns `true` when the chain grew. An empty chain takes any candidate
    /// as its first snapshot.
    pub fn add_snapshot(&mut self, mut candidate: Snapshot<P>) -> HistoryResult<bool> {
        candidate.end_date = max_date();

        let Some(current) = self.snapshots.last_mut() else {
            info!("Opening history of {} at {}", self.entity_id, candidate.start_date);
            self.snapshots.push(candidate);
            return Ok(true);
        };

        if !candidate.payload.contains_updates(&current.payload) {
            debug!("No updates for {}, keeping current snapshot", self.entity_id);
            return Ok(false);
        }
        if !current.is_open() {
            return Err(HistoryError::chain_order(
                &self.entity_id,
                "current snapshot is already closed",
            ));
        }
        if candidate.start_date < current.start_date {
            return Err(HistoryError::chain_order(
                &self.entity_id,
                "candidate starts before current snapshot",
            ));
        }

        current.end_date = candidate.start_date;
        info!("New snapshot for {} at {}", self.entity_id, candidate.start_date);
        self.snapshots.push(candidate);
        Ok(true)
    }

    /// Returns the snapshot valid at `date`, if the entity was known then.
    pub fn snapshot_at(&self, date: Timestamp) -> Option<&Snapshot<P>> {
        // Snapshots are ordered by start date, so the last one starting at or
        // before `date` is the only candidate.
        let index = self.snapshots.partition_point(|snapshot| snapshot.start_date <= date);
        self.snapshots[..index]
            .last()
            .filter(|snapshot| snapshot.covers(date))
    }

    /// Iterates over the snapshots overlapping `[from, to)`.
    pub fn snapshots_between(&self, from: Timestamp, to: Timestamp) -> impl Iterator<Item = &Snapshot<P>> {
        self.snapshots
            .iter()
            .filter(move |snapshot| snapshot.start_date < to && snapshot.end_date > from)
    }

    /// Returns the last `count` snapshots, oldest first.
    pub(crate) fn tail(&self, count: usize) -> &[Snapshot<P>] {
        let start = self.snapshots.len().saturating_sub(count);
        &self.snapshots[start..]
    }

    /// Checks every chain invariant.
    pub fn verify(&self) -> HistoryResult<()> {
        for snapshot in &self.snapshots {
            if snapshot.end_date < snapshot.start_date {
                return Err(HistoryError::chain_order(
                    &self.entity_id,
                    "snapshot ends before it starts",
                ));
            }
        }
        for pair in self.snapshots.windows(2) {
            if pair[0].end_date != pair[1].start_date {
                return Err(HistoryError::chain_order(
                    &self.entity_id,
                    "snapshots are not contiguous",
                ));
            }
        }
        match self.snapshots.last() {
            Some(last) if !last.is_open() => Err(HistoryError::chain_order(
                &self.entity_id,
                "last snapshot is closed",
            )),
            _ => Ok(()),
        }
    }
}
