//! Content-addressed value objects.
//!
//! Quorum sets and geo data are shared by many snapshots. They are keyed by
//! the sha256 of their canonical JSON form, stored once, and replaced by a new
//! hash when they change. Snapshots compare these hashes, never references.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Display;

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::HistoryResult;

/// Hex encoded sha256 of a value's canonical JSON form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hashes the canonical JSON form of `value`.
    pub fn of<T: Serialize + ?Sized>(value: &T) -> HistoryResult<Self> {
        let canonical = serde_json::to_vec(value)?;
        Ok(Self(hex::encode(Sha256::digest(&canonical))))
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trust configuration of a node: `threshold` of `validators` and inner sets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuorumSet {
    pub threshold: u32,
    pub validators: Vec<String>,
    pub inner_quorum_sets: Vec<QuorumSet>,
}

impl QuorumSet {
    /// Creates a flat quorum set.
    pub fn new(threshold: u32, validators: Vec<String>) -> Self {
        Self {
            threshold,
            validators,
            inner_quorum_sets: Vec::new(),
        }
    }

    /// Adds an inner quorum set, builder style.
    pub fn with_inner(mut self, inner: QuorumSet) -> Self {
        self.inner_quorum_sets.push(inner);
        self
    }

    /// Returns the content hash this value is stored under.
    pub fn hash(&self) -> HistoryResult<ContentHash> {
        ContentHash::of(self)
    }
}

/// Geographic location of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoData {
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoData {
    /// Returns true when nothing about the location is known.
    pub fn is_unknown(&self) -> bool {
        self.country_code.is_none()
            && self.country_name.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }

    /// Returns the content hash this value is stored under.
    pub fn hash(&self) -> HistoryResult<ContentHash> {
        ContentHash::of(self)
    }
}

/// Insert-if-absent store of values keyed by their content hash.
#[derive(Debug, Clone)]
pub struct ContentStore<V> {
    values: BTreeMap<ContentHash, V>,
}

impl<V> Default for ContentStore<V> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<V: Serialize> ContentStore<V> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` unless an equal value is already present.
    ///
    /// Returns the value's hash either way.
    pub fn intern(&mut self, value: V) -> HistoryResult<ContentHash> {
        let hash = ContentHash::of(&value)?;
        if !self.values.contains_key(&hash) {
            debug!("Storing new content {}", hash);
            self.values.insert(hash.clone(), value);
        }
        Ok(hash)
    }

    /// Returns the value stored under `hash`.
    pub fn get(&self, hash: &ContentHash) -> Option<&V> {
        self.values.get(hash)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.values.contains_key(hash)
    }

    /// Returns the number of distinct values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the stored values in hash order.
    pub fn iter(&self) -> impl Iterator<Item = (&ContentHash, &V)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn quorum_set() -> QuorumSet {
        QuorumSet::new(2, vec!["GA".to_string(), "GB".to_string(), "GC".to_string()])
    }

    #[test]
    fn test_equal_values_share_a_hash() {
        assert_eq!(quorum_set().hash().unwrap(), quorum_set().hash().unwrap());
        assert_eq!(quorum_set().hash().unwrap().as_str().len(), 64);
    }

    #[test]
    fn test_any_change_produces_a_new_hash() {
        let mut changed = quorum_set();
        changed.threshold = 3;
        assert_ne!(quorum_set().hash().unwrap(), changed.hash().unwrap());

        let nested = quorum_set().with_inner(QuorumSet::new(1, vec!["GD".to_string()]));
        assert_ne!(quorum_set().hash().unwrap(), nested.hash().unwrap());
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut store = ContentStore::new();
        let first = store.intern(quorum_set()).unwrap();
        let second = store.intern(quorum_set()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&first), Some(&quorum_set()));
    }

    #[test]
    fn test_geo_unknown() {
        assert!(GeoData::default().is_unknown());
        let geo = GeoData {
            latitude: Some(50.1),
            ..GeoData::default()
        };
        assert!(!geo.is_unknown());
    }
}
