//! Versioned snapshot chains.
//!
//! Every observed entity owns a chain of immutable snapshots, each valid over
//! a half-open interval `[start_date, end_date)`. The last snapshot of a chain
//! is open (its end is [`max_date`]) and a new one is only appended when a scan
//! observed a meaningful change.

pub mod chain;
pub mod network;
pub mod node;
pub mod organization;

pub use chain::SnapshotChain;
pub use network::{NetworkObservation, NetworkSnapshot, NetworkSnapshotFactory};
pub use node::{NodeDetails, NodeObservation, NodeSnapshot, NodeSnapshotFactory};
pub use organization::{OrganizationObservation, OrganizationSnapshot, OrganizationSnapshotFactory};

use alloc::string::String;
use alloc::vec::Vec;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::HistoryResult;
use crate::time::{Timestamp, max_date};

/// Configuration of one entity, valid during `[start_date, end_date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<P> {
    /// Storage id, `None` until the row has been persisted
    pub id: Option<u64>,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub payload: P,
}

impl<P> Snapshot<P> {
    /// Creates an open, unpersisted snapshot starting at `start_date`.
    pub fn new(start_date: Timestamp, payload: P) -> Self {
        Self {
            id: None,
            start_date,
            end_date: max_date(),
            payload,
        }
    }

    /// Returns true while this snapshot is the currently valid one.
    pub fn is_open(&self) -> bool {
        self.end_date == max_date()
    }

    /// Returns true when `date` falls inside `[start_date, end_date)`.
    pub fn covers(&self, date: Timestamp) -> bool {
        self.start_date <= date && date < self.end_date
    }
}

impl<P: Serialize> Snapshot<P> {
    /// Encodes the snapshot into the row shape handed to the repository.
    pub fn to_row(&self, entity_id: &str) -> HistoryResult<SnapshotRow> {
        Ok(SnapshotRow {
            id: self.id,
            entity_id: entity_id.into(),
            start_date: self.start_date,
            end_date: self.end_date,
            payload: postcard::to_allocvec(&self.payload)?,
        })
    }
}

impl<P: DeserializeOwned> Snapshot<P> {
    /// Decodes a persisted row.
    pub fn from_row(row: &SnapshotRow) -> HistoryResult<Self> {
        Ok(Self {
            id: row.id,
            start_date: row.start_date,
            end_date: row.end_date,
            payload: postcard::from_bytes(&row.payload)?,
        })
    }
}

/// Entity-specific payload of a snapshot.
pub trait SnapshotPayload: Clone {
    /// Returns whether this payload differs meaningfully from `current`.
    ///
    /// Must be side-effect free and compare value objects by value or hash.
    fn contains_updates(&self, current: &Self) -> bool;
}

/// Builds a full snapshot from a fresh observation and the previous payload.
pub trait SnapshotFactory {
    type Observation;
    type Payload: SnapshotPayload;

    /// Returns the stable id of the entity the observation belongs to.
    fn entity_id<'o>(&self, observation: &'o Self::Observation) -> &'o str;

    /// Creates the candidate snapshot, carrying unobserved fields forward.
    fn create(
        &mut self,
        observation: &Self::Observation,
        previous: Option<&Snapshot<Self::Payload>>,
        as_of: Timestamp,
    ) -> HistoryResult<Snapshot<Self::Payload>>;
}

/// Persisted shape of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: Option<u64>,
    pub entity_id: String,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    /// postcard encoded payload
    pub payload: Vec<u8>,
}

/// Storage collaborator receiving all rows of one scan as one unit.
pub trait SnapshotRepository {
    /// Persists every row or none of them.
    fn save_batch(&mut self, rows: Vec<SnapshotRow>) -> HistoryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::at;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Version(u32);

    #[test]
    fn test_new_snapshot_is_open() {
        let snapshot = Snapshot::new(at(2024, 1, 1, 0, 0), Version(1));
        assert!(snapshot.is_open());
        assert!(snapshot.covers(at(2030, 1, 1, 0, 0)));
        assert!(!snapshot.covers(at(2023, 12, 31, 23, 0)));
    }

    #[test]
    fn test_row_keeps_interval_and_payload() {
        let mut snapshot = Snapshot::new(at(2024, 1, 1, 0, 0), Version(42));
        snapshot.end_date = at(2024, 2, 1, 0, 0);
        let row = snapshot.to_row("GA").unwrap();
        assert_eq!(row.entity_id, "GA");
        assert_eq!(row.end_date, at(2024, 2, 1, 0, 0));

        let decoded: Snapshot<Version> = Snapshot::from_row(&row).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_corrupt_payload_is_a_codec_error() {
        let row = SnapshotRow {
            id: Some(1),
            entity_id: "GA".into(),
            start_date: at(2024, 1, 1, 0, 0),
            end_date: max_date(),
            payload: Vec::new(),
        };
        let decoded: HistoryResult<Snapshot<Version>> = Snapshot::from_row(&row);
        assert!(matches!(decoded, Err(crate::HistoryError::Codec(_))));
    }
}
