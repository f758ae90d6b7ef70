//! Node snapshots.
//!
//! A node is identified by its public key. Its snapshot holds the connection
//! endpoint, content hashes of its quorum set and geo data, and the details it
//! announces about itself. The coordinates of the referenced geo data are kept
//! inline so change detection never needs the content store.

use alloc::string::String;

use log::warn;
use serde::{Deserialize, Serialize};

use super::{Snapshot, SnapshotFactory, SnapshotPayload};
use crate::content::{ContentHash, ContentStore, GeoData, QuorumSet};
use crate::error::HistoryResult;
use crate::observation::Observed;
use crate::time::Timestamp;

/// Details a node announces about itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeDetails {
    pub alias: Option<String>,
    pub history_url: Option<String>,
    pub home_domain: Option<String>,
    pub host: Option<String>,
    pub isp: Option<String>,
    pub ledger_version: Option<u32>,
    pub name: Option<String>,
    pub overlay_min_version: Option<u32>,
    pub overlay_version: Option<u32>,
    pub version_str: Option<String>,
}

impl NodeDetails {
    /// Returns true when none of the fields were ever observed.
    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }
}

/// Versioned state of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub ip: String,
    pub port: u16,
    /// Hash of the quorum set in the factory's quorum-set store
    pub quorum_set_hash: Option<ContentHash>,
    /// Hash of the geo data in the factory's geo-data store
    pub geo_data_hash: Option<ContentHash>,
    /// Latitude of the referenced geo data
    pub latitude: Option<f64>,
    /// Longitude of the referenced geo data
    pub longitude: Option<f64>,
    pub node_details: Option<NodeDetails>,
}

/// Returns true when the node moved to another ip or port.
pub fn ip_port_changed(current: &NodeSnapshot, candidate: &NodeSnapshot) -> bool {
    current.ip != candidate.ip || current.port != candidate.port
}

/// Returns true when the quorum set hash differs.
pub fn quorum_set_changed(current: &NodeSnapshot, candidate: &NodeSnapshot) -> bool {
    current.quorum_set_hash != candidate.quorum_set_hash
}

/// Returns true when any announced detail was set, cleared or changed.
pub fn node_details_changed(current: &NodeSnapshot, candidate: &NodeSnapshot) -> bool {
    let unknown = NodeDetails::default();
    let a = current.node_details.as_ref().unwrap_or(&unknown);
    let b = candidate.node_details.as_ref().unwrap_or(&unknown);

    a.alias != b.alias
        || a.history_url != b.history_url
        || a.home_domain != b.home_domain
        || a.host != b.host
        || a.isp != b.isp
        || a.ledger_version != b.ledger_version
        || a.name != b.name
        || a.overlay_min_version != b.overlay_min_version
        || a.overlay_version != b.overlay_version
        || a.version_str != b.version_str
}

/// Returns true when the coordinates differ.
///
/// Country labels follow from the coordinates, so a relabelled location with
/// the same latitude and longitude is not a change.
pub fn geo_data_changed(current: &NodeSnapshot, candidate: &NodeSnapshot) -> bool {
    current.latitude != candidate.latitude || current.longitude != candidate.longitude
}

/// Returns true when any of the node checks reports a change.
pub fn node_changed(current: &NodeSnapshot, candidate: &NodeSnapshot) -> bool {
    ip_port_changed(current, candidate)
        || quorum_set_changed(current, candidate)
        || node_details_changed(current, candidate)
        || geo_data_changed(current, candidate)
}

impl SnapshotPayload for NodeSnapshot {
    fn contains_updates(&self, current: &Self) -> bool {
        node_changed(current, self)
    }
}

/// Geo data as seen by one scan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoObservation {
    pub country_code: Observed<Option<String>>,
    pub country_name: Observed<Option<String>>,
    pub latitude: Observed<Option<f64>>,
    pub longitude: Observed<Option<f64>>,
}

/// Node details as seen by one scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeDetailsObservation {
    pub alias: Observed<Option<String>>,
    pub history_url: Observed<Option<String>>,
    pub home_domain: Observed<Option<String>>,
    pub host: Observed<Option<String>>,
    pub isp: Observed<Option<String>>,
    pub ledger_version: Observed<Option<u32>>,
    pub name: Observed<Option<String>>,
    pub overlay_min_version: Observed<Option<u32>>,
    pub overlay_version: Observed<Option<u32>>,
    pub version_str: Observed<Option<String>>,
}

/// Everything one scan learned about a node.
///
/// The endpoint is always known: a node without one is not observed at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeObservation {
    pub public_key: String,
    pub ip: String,
    pub port: u16,
    pub quorum_set: Observed<Option<QuorumSet>>,
    pub geo_data: GeoObservation,
    pub details: NodeDetailsObservation,
}

impl NodeObservation {
    /// Creates an observation that knows only the node's endpoint.
    pub fn new(public_key: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            public_key: public_key.into(),
            ip: ip.into(),
            port,
            quorum_set: Observed::Unobserved,
            geo_data: GeoObservation::default(),
            details: NodeDetailsObservation::default(),
        }
    }
}

fn merge_geo(observed: &GeoObservation, previous: Option<&GeoData>) -> Option<GeoData> {
    let geo = GeoData {
        country_code: observed
            .country_code
            .merge_field(previous.and_then(|p| p.country_code.as_ref())),
        country_name: observed
            .country_name
            .merge_field(previous.and_then(|p| p.country_name.as_ref())),
        latitude: observed
            .latitude
            .merge_field(previous.and_then(|p| p.latitude.as_ref())),
        longitude: observed
            .longitude
            .merge_field(previous.and_then(|p| p.longitude.as_ref())),
    };
    (!geo.is_unknown()).then_some(geo)
}

fn merge_details(observed: &NodeDetailsObservation, previous: Option<&NodeDetails>) -> Option<NodeDetails> {
    let details = NodeDetails {
        alias: observed.alias.merge_field(previous.and_then(|p| p.alias.as_ref())),
        history_url: observed
            .history_url
            .merge_field(previous.and_then(|p| p.history_url.as_ref())),
        home_domain: observed
            .home_domain
            .merge_field(previous.and_then(|p| p.home_domain.as_ref())),
        host: observed.host.merge_field(previous.and_then(|p| p.host.as_ref())),
        isp: observed.isp.merge_field(previous.and_then(|p| p.isp.as_ref())),
        ledger_version: observed
            .ledger_version
            .merge_field(previous.and_then(|p| p.ledger_version.as_ref())),
        name: observed.name.merge_field(previous.and_then(|p| p.name.as_ref())),
        overlay_min_version: observed
            .overlay_min_version
            .merge_field(previous.and_then(|p| p.overlay_min_version.as_ref())),
        overlay_version: observed
            .overlay_version
            .merge_field(previous.and_then(|p| p.overlay_version.as_ref())),
        version_str: observed
            .version_str
            .merge_field(previous.and_then(|p| p.version_str.as_ref())),
    };
    (!details.is_unknown()).then_some(details)
}

/// Builds node snapshots and interns their shared value objects.
#[derive(Debug, Default)]
pub struct NodeSnapshotFactory {
    quorum_sets: ContentStore<QuorumSet>,
    geo_data: ContentStore<GeoData>,
}

impl NodeSnapshotFactory {
    /// Creates a factory with empty content stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory over content loaded from storage.
    ///
    /// Chains rehydrated from rows only carry hashes, so the stores must hold
    /// the referenced values for carried-forward labels to survive a restart.
    pub fn with_content(quorum_sets: ContentStore<QuorumSet>, geo_data: ContentStore<GeoData>) -> Self {
        Self { quorum_sets, geo_data }
    }

    /// Returns every quorum set interned so far.
    pub fn quorum_sets(&self) -> &ContentStore<QuorumSet> {
        &self.quorum_sets
    }

    /// Returns every geo-data value interned so far.
    pub fn geo_data(&self) -> &ContentStore<GeoData> {
        &self.geo_data
    }

    /// Resolves the geo data a previous snapshot refers to.
    ///
    /// A hash missing from the store still yields the inline coordinates, only
    /// the country labels are lost.
    fn previous_geo(&self, previous: &NodeSnapshot) -> Option<GeoData> {
        let hash = previous.geo_data_hash.as_ref()?;
        match self.geo_data.get(hash) {
            Some(geo) => Some(geo.clone()),
            None => {
                warn!("Geo data {} is not in the store, keeping coordinates only", hash);
                Some(GeoData {
                    latitude: previous.latitude,
                    longitude: previous.longitude,
                    ..GeoData::default()
                })
            }
        }
    }
}

impl SnapshotFactory for NodeSnapshotFactory {
    type Observation = NodeObservation;
    type Payload = NodeSnapshot;

    fn entity_id<'o>(&self, observation: &'o NodeObservation) -> &'o str {
        &observation.public_key
    }

    fn create(
        &mut self,
        observation: &NodeObservation,
        previous: Option<&Snapshot<NodeSnapshot>>,
        as_of: Timestamp,
    ) -> HistoryResult<Snapshot<NodeSnapshot>> {
        let previous = previous.map(|snapshot| &snapshot.payload);

        let quorum_set_hash = match &observation.quorum_set {
            Observed::Unobserved => previous.and_then(|p| p.quorum_set_hash.clone()),
            Observed::Observed(None) => None,
            Observed::Observed(Some(quorum_set)) => Some(self.quorum_sets.intern(quorum_set.clone())?),
        };

        let previous_geo = previous.and_then(|p| self.previous_geo(p));
        let geo_data = merge_geo(&observation.geo_data, previous_geo.as_ref());
        let (geo_data_hash, latitude, longitude) = match geo_data {
            Some(geo) => {
                let (latitude, longitude) = (geo.latitude, geo.longitude);
                (Some(self.geo_data.intern(geo)?), latitude, longitude)
            }
            None => (None, None, None),
        };

        let node_details = merge_details(
            &observation.details,
            previous.and_then(|p| p.node_details.as_ref()),
        );

        Ok(Snapshot::new(
            as_of,
            NodeSnapshot {
                ip: observation.ip.clone(),
                port: observation.port,
                quorum_set_hash,
                geo_data_hash,
                latitude,
                longitude,
                node_details,
            },
        ))
    }
}
