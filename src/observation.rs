//! Partial observations.
//!
//! A scan rarely sees every field of an entity. [`Observed`] keeps "not seen
//! this scan" apart from "seen and empty" so that snapshot factories can carry
//! previous values forward with one pure merge rule:
//!
//! - `Unobserved` keeps the previous value
//! - `Observed(v)` replaces it, including `Observed(None)` for optional fields

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observed<T> {
    Unobserved,
    Observed(T),
}

impl<T> Default for Observed<T> {
    fn default() -> Self {
        Self::Unobserved
    }
}

impl<T> From<T> for Observed<T> {
    fn from(value: T) -> Self {
        Self::Observed(value)
    }
}

impl<T> Observed<T> {
    /// Returns true when the scan saw the field, empty or not.
    pub fn is_observed(&self) -> bool {
        matches!(self, Self::Observed(_))
    }

    /// Converts from `&Observed<T>` to `Observed<&T>`.
    pub fn as_ref(&self) -> Observed<&T> {
        match self {
            Self::Unobserved => Observed::Unobserved,
            Self::Observed(value) => Observed::Observed(value),
        }
    }

    /// Resolves the observation against the previous value.
    pub fn merge(self, previous: T) -> T {
        match self {
            Self::Unobserved => previous,
            Self::Observed(value) => value,
        }
    }
}

impl<T: Clone> Observed<Option<T>> {
    /// Merges an optional field against an optional previous value.
    pub fn merge_field(&self, previous: Option<&T>) -> Option<T> {
        match self {
            Self::Unobserved => previous.cloned(),
            Self::Observed(value) => value.clone(),
        }
    }

    /// Creates a field observed with a value.
    pub fn value(value: T) -> Self {
        Self::Observed(Some(value))
    }

    /// Creates a field observed as empty.
    pub fn empty() -> Self {
        Self::Observed(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn test_unobserved_carries_previous() {
        let field: Observed<Option<String>> = Observed::Unobserved;
        assert_eq!(field.merge_field(Some(&"old".into())), Some("old".into()));
        assert_eq!(field.merge_field(None), None);
    }

    #[test]
    fn test_observed_empty_clears() {
        let field: Observed<Option<String>> = Observed::empty();
        assert_eq!(field.merge_field(Some(&"old".into())), None);
    }

    #[test]
    fn test_observed_value_replaces() {
        let field = Observed::value(String::from("new"));
        assert_eq!(field.merge_field(Some(&"old".into())), Some("new".into()));
        assert!(field.is_observed());
    }

    #[test]
    fn test_plain_merge() {
        assert_eq!(Observed::Unobserved.merge(3u32), 3);
        assert_eq!(Observed::from(5u32).merge(3), 5);
    }
}
