//! Network snapshots: protocol versions and the quorum set configuration.

use alloc::collections::BTreeMap;
use alloc::string::String;

use serde::{Deserialize, Serialize};

use super::{Snapshot, SnapshotFactory, SnapshotPayload};
use crate::content::ContentHash;
use crate::error::HistoryResult;
use crate::observation::Observed;
use crate::time::Timestamp;

/// Quorum set hash announced by each validator, keyed by public key.
pub type QuorumSetConfiguration = BTreeMap<String, ContentHash>;

/// Versioned state of one network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub name: String,
    pub overlay_min_version: Option<u32>,
    pub overlay_version: Option<u32>,
    pub ledger_version: Option<u32>,
    pub max_ledger_version: Option<u32>,
    pub core_version: Option<String>,
    pub quorum_set_configuration_hash: Option<ContentHash>,
}

/// Returns true when any overlay or ledger protocol version differs.
pub fn protocol_changed(current: &NetworkSnapshot, candidate: &NetworkSnapshot) -> bool {
    current.overlay_min_version != candidate.overlay_min_version
        || current.overlay_version != candidate.overlay_version
        || current.ledger_version != candidate.ledger_version
        || current.max_ledger_version != candidate.max_ledger_version
}

/// Returns true when the core software version differs.
pub fn core_version_changed(current: &NetworkSnapshot, candidate: &NetworkSnapshot) -> bool {
    current.core_version != candidate.core_version
}

/// Returns true when the quorum set configuration hash differs.
pub fn quorum_set_configuration_changed(current: &NetworkSnapshot, candidate: &NetworkSnapshot) -> bool {
    current.quorum_set_configuration_hash != candidate.quorum_set_configuration_hash
}

impl SnapshotPayload for NetworkSnapshot {
    fn contains_updates(&self, current: &Self) -> bool {
        current.name != self.name
            || protocol_changed(current, self)
            || core_version_changed(current, self)
            || quorum_set_configuration_changed(current, self)
    }
}

/// Network state as seen by one scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkObservation {
    pub network_id: String,
    pub name: String,
    pub overlay_min_version: Observed<Option<u32>>,
    pub overlay_version: Observed<Option<u32>>,
    pub ledger_version: Observed<Option<u32>>,
    pub max_ledger_version: Observed<Option<u32>>,
    pub core_version: Observed<Option<String>>,
    pub quorum_set_configuration: Observed<QuorumSetConfiguration>,
}

impl NetworkObservation {
    /// Creates an observation that knows only the id and name.
    pub fn new(network_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Builds network snapshots, hashing the quorum set configuration.
#[derive(Debug, Default)]
pub struct NetworkSnapshotFactory;

impl SnapshotFactory for NetworkSnapshotFactory {
    type Observation = NetworkObservation;
    type Payload = NetworkSnapshot;

    fn entity_id<'o>(&self, observation: &'o NetworkObservation) -> &'o str {
        &observation.network_id
    }

    fn create(
        &mut self,
        observation: &NetworkObservation,
        previous: Option<&Snapshot<NetworkSnapshot>>,
        as_of: Timestamp,
    ) -> HistoryResult<Snapshot<NetworkSnapshot>> {
        let p = previous.map(|snapshot| &snapshot.payload);
        let o = observation;

        let quorum_set_configuration_hash = match &o.quorum_set_configuration {
            Observed::Unobserved => p.and_then(|p| p.quorum_set_configuration_hash.clone()),
            Observed::Observed(configuration) if configuration.is_empty() => None,
            Observed::Observed(configuration) => Some(ContentHash::of(configuration)?),
        };

        let payload = NetworkSnapshot {
            name: o.name.clone(),
            overlay_min_version: o
                .overlay_min_version
                .merge_field(p.and_then(|p| p.overlay_min_version.as_ref())),
            overlay_version: o
                .overlay_version
                .merge_field(p.and_then(|p| p.overlay_version.as_ref())),
            ledger_version: o
                .ledger_version
                .merge_field(p.and_then(|p| p.ledger_version.as_ref())),
            max_ledger_version: o
                .max_ledger_version
                .merge_field(p.and_then(|p| p.max_ledger_version.as_ref())),
            core_version: o
                .core_version
                .merge_field(p.and_then(|p| p.core_version.as_ref())),
            quorum_set_configuration_hash,
        };

        Ok(Snapshot::new(as_of, payload))
    }
}
