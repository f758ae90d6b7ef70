//! Organization snapshots: branding, contact details and the validator set.

use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::{Snapshot, SnapshotFactory, SnapshotPayload};
use crate::error::HistoryResult;
use crate::observation::Observed;
use crate::time::Timestamp;

/// Versioned state of one organization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrganizationSnapshot {
    pub name: String,
    pub dba: Option<String>,
    pub url: Option<String>,
    pub official_email: Option<String>,
    pub phone_number: Option<String>,
    pub physical_address: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
    pub keybase: Option<String>,
    pub horizon_url: Option<String>,
    pub description: Option<String>,
    pub home_domain: Option<String>,
    /// Validator public keys in announced order
    pub validators: Vec<String>,
}

/// Returns true when the name, dba, url, description or home domain differ.
pub fn branding_changed(current: &OrganizationSnapshot, candidate: &OrganizationSnapshot) -> bool {
    current.name != candidate.name
        || current.dba != candidate.dba
        || current.url != candidate.url
        || current.description != candidate.description
        || current.home_domain != candidate.home_domain
        || current.horizon_url != candidate.horizon_url
}

/// Returns true when any contact channel differs.
pub fn contact_changed(current: &OrganizationSnapshot, candidate: &OrganizationSnapshot) -> bool {
    current.official_email != candidate.official_email
        || current.phone_number != candidate.phone_number
        || current.physical_address != candidate.physical_address
        || current.twitter != candidate.twitter
        || current.github != candidate.github
        || current.keybase != candidate.keybase
}

/// Returns true when the validator list differs.
///
/// Membership and order both count.
pub fn validators_changed(current: &OrganizationSnapshot, candidate: &OrganizationSnapshot) -> bool {
    current.validators != candidate.validators
}

impl SnapshotPayload for OrganizationSnapshot {
    fn contains_updates(&self, current: &Self) -> bool {
        branding_changed(current, self) || contact_changed(current, self) || validators_changed(current, self)
    }
}

/// Organization as read from its home domain's TOML by one scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrganizationObservation {
    pub organization_id: String,
    pub name: String,
    pub dba: Observed<Option<String>>,
    pub url: Observed<Option<String>>,
    pub official_email: Observed<Option<String>>,
    pub phone_number: Observed<Option<String>>,
    pub physical_address: Observed<Option<String>>,
    pub twitter: Observed<Option<String>>,
    pub github: Observed<Option<String>>,
    pub keybase: Observed<Option<String>>,
    pub horizon_url: Observed<Option<String>>,
    pub description: Observed<Option<String>>,
    pub home_domain: Observed<Option<String>>,
    pub validators: Observed<Vec<String>>,
}

impl OrganizationObservation {
    /// Creates an observation that knows only the id and name.
    pub fn new(organization_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Builds organization snapshots.
#[derive(Debug, Default)]
pub struct OrganizationSnapshotFactory;

impl SnapshotFactory for OrganizationSnapshotFactory {
    type Observation = OrganizationObservation;
    type Payload = OrganizationSnapshot;

    fn entity_id<'o>(&self, observation: &'o OrganizationObservation) -> &'o str {
        &observation.organization_id
    }

    fn create(
        &mut self,
        observation: &OrganizationObservation,
        previous: Option<&Snapshot<OrganizationSnapshot>>,
        as_of: Timestamp,
    ) -> HistoryResult<Snapshot<OrganizationSnapshot>> {
        let p = previous.map(|snapshot| &snapshot.payload);
        let o = observation;

        let payload = OrganizationSnapshot {
            name: o.name.clone(),
            dba: o.dba.merge_field(p.and_then(|p| p.dba.as_ref())),
            url: o.url.merge_field(p.and_then(|p| p.url.as_ref())),
            official_email: o
                .official_email
                .merge_field(p.and_then(|p| p.official_email.as_ref())),
            phone_number: o
                .phone_number
                .merge_field(p.and_then(|p| p.phone_number.as_ref())),
            physical_address: o
                .physical_address
                .merge_field(p.and_then(|p| p.physical_address.as_ref())),
            twitter: o.twitter.merge_field(p.and_then(|p| p.twitter.as_ref())),
            github: o.github.merge_field(p.and_then(|p| p.github.as_ref())),
            keybase: o.keybase.merge_field(p.and_then(|p| p.keybase.as_ref())),
            horizon_url: o
                .horizon_url
                .merge_field(p.and_then(|p| p.horizon_url.as_ref())),
            description: o
                .description
                .merge_field(p.and_then(|p| p.description.as_ref())),
            home_domain: o
                .home_domain
                .merge_field(p.and_then(|p| p.home_domain.as_ref())),
            validators: o
                .validators
                .clone()
                .merge(p.map(|p| p.validators.clone()).unwrap_or_default()),
        };

        Ok(Snapshot::new(as_of, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::at;
    use alloc::string::ToString;
    use alloc::vec;

    fn observation() -> OrganizationObservation {
        let mut observation = OrganizationObservation::new("org-1", "Example");
        observation.validators = Observed::from(vec!["GA".to_string(), "GB".to_string()]);
        observation.github = Observed::value("example".into());
        observation
    }

    #[test]
    fn test_validator_order_counts() {
        let mut factory = OrganizationSnapshotFactory;
        let current = factory.create(&observation(), None, at(2024, 1, 1, 0, 0)).unwrap();

        let mut reordered = observation();
        reordered.validators = Observed::from(vec!["GB".to_string(), "GA".to_string()]);
        let candidate = factory
            .create(&reordered, Some(&current), at(2024, 1, 2, 0, 0))
            .unwrap();

        assert!(validators_changed(&current.payload, &candidate.payload));
        assert!(!contact_changed(&current.payload, &candidate.payload));
        assert!(candidate.payload.contains_updates(&current.payload));
    }

    #[test]
    fn test_partial_toml_keeps_previous_contacts() {
        let mut factory = OrganizationSnapshotFactory;
        let current = factory.create(&observation(), None, at(2024, 1, 1, 0, 0)).unwrap();

        let sparse = OrganizationObservation::new("org-1", "Example");
        let candidate = factory
            .create(&sparse, Some(&current), at(2024, 1, 2, 0, 0))
            .unwrap();

        assert_eq!(candidate.payload.github.as_deref(), Some("example"));
        assert_eq!(candidate.payload.validators.len(), 2);
        assert!(!candidate.payload.contains_updates(&current.payload));
    }

    #[test]
    fn test_renaming_is_a_branding_change() {
        let mut factory = OrganizationSnapshotFactory;
        let current = factory.create(&observation(), None, at(2024, 1, 1, 0, 0)).unwrap();

        let mut renamed = observation();
        renamed.name = "Example Foundation".into();
        let candidate = factory
            .create(&renamed, Some(&current), at(2024, 1, 2, 0, 0))
            .unwrap();
        assert!(branding_changed(&current.payload, &candidate.payload));
    }
}
