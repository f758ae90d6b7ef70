//! Per-scan measurements and the metrics derived from them.

use alloc::collections::BTreeMap;
use alloc::string::String;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Kind of network participant a chain or measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Identified by its public key
    Node,
    /// Identified by its organization id
    Organization,
    /// Identified by its network id
    Network,
}

impl EntityKind {
    /// Gets a short label for logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Organization => "organization",
            Self::Network => "network",
        }
    }

    /// Returns the metrics tracked for this kind of entity.
    pub const fn metrics(self) -> &'static [Metric] {
        match self {
            Self::Node => &[
                Metric::Active,
                Metric::Validating,
                Metric::FullValidator,
                Metric::Overloaded,
            ],
            Self::Organization => &[Metric::SubQuorumAvailable],
            Self::Network => &[Metric::QuorumIntersection],
        }
    }
}

/// Boolean metric observed once per scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Node answered during the crawl
    Active,
    /// Node externalized recent ledgers
    Validating,
    /// Node validates and publishes a full history archive
    FullValidator,
    /// Node refused connections because of load
    Overloaded,
    /// Enough of the organization's validators were validating
    SubQuorumAvailable,
    /// The FBAS analysis reported quorum intersection
    QuorumIntersection,
}

impl Metric {
    /// Gets the metric's column name.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "isActive",
            Self::Validating => "isValidating",
            Self::FullValidator => "isFullValidator",
            Self::Overloaded => "isOverloaded",
            Self::SubQuorumAvailable => "isSubQuorumAvailable",
            Self::QuorumIntersection => "hasQuorumIntersection",
        }
    }
}

/// Raw measurement of one entity taken by one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMeasurement {
    pub scan_id: u64,
    pub kind: EntityKind,
    pub entity_id: String,
    pub observed_at: Timestamp,
    pub flags: BTreeMap<Metric, bool>,
}

impl ScanMeasurement {
    /// Creates a measurement with every metric negative.
    pub fn new(scan_id: u64, kind: EntityKind, entity_id: impl Into<String>, observed_at: Timestamp) -> Self {
        Self {
            scan_id,
            kind,
            entity_id: entity_id.into(),
            observed_at,
            flags: BTreeMap::new(),
        }
    }

    /// Records a metric, builder style.
    pub fn with(mut self, metric: Metric, value: bool) -> Self {
        self.flags.insert(metric, value);
        self
    }

    /// Returns the metric's value.
    ///
    /// Metrics that were not recorded count as negative.
    pub fn flag(&self, metric: Metric) -> bool {
        self.flags.get(&metric).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::at;

    #[test]
    fn test_missing_flags_are_negative() {
        let measurement = ScanMeasurement::new(7, EntityKind::Node, "GA", at(2024, 1, 1, 0, 0))
            .with(Metric::Active, true);
        assert!(measurement.flag(Metric::Active));
        assert!(!measurement.flag(Metric::Validating));
    }

    #[test]
    fn test_kind_metrics_are_disjoint() {
        for metric in EntityKind::Node.metrics() {
            assert!(!EntityKind::Organization.metrics().contains(metric));
            assert!(!EntityKind::Network.metrics().contains(metric));
        }
    }
}
