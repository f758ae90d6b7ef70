use alloc::format;
use alloc::vec::Vec;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::aggregate::{BucketStrategy, DAILY_30, HOURLY_24};
use crate::error::{HistoryError, HistoryResult};
use crate::rollup::RollupTarget;
use crate::time::Granularity;

/// Default lifetime of a cached home-domain lookup, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;

/// Runtime settings of the history store.
///
/// Every key is optional in JSON and falls back to [`HistoryConfig::default`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    /// Rollup targets the service runs
    pub rollup_targets: Vec<RollupTarget>,
    pub home_domain_cache_ttl_secs: u64,
    /// Window of the hour-bucketed aggregates
    pub hourly_window: BucketStrategy,
    /// Window of the day-bucketed aggregates
    pub daily_window: BucketStrategy,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            rollup_targets: RollupTarget::ALL.to_vec(),
            home_domain_cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            hourly_window: HOURLY_24,
            daily_window: DAILY_30,
        }
    }
}

impl HistoryConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> HistoryResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings that deserialization alone cannot enforce.
    pub fn validate(&self) -> HistoryResult<()> {
        check_window("hourly_window", self.hourly_window, Granularity::Hourly)?;
        check_window("daily_window", self.daily_window, Granularity::Daily)?;

        for (index, target) in self.rollup_targets.iter().enumerate() {
            if self.rollup_targets[..index].contains(target) {
                return Err(HistoryError::Config(format!(
                    "rollup target {} listed twice",
                    target.name()
                )));
            }
        }

        self.cache_ttl().map(|_| ())
    }

    /// Returns the home-domain cache TTL as a duration.
    pub fn cache_ttl(&self) -> HistoryResult<TimeDelta> {
        if self.home_domain_cache_ttl_secs == 0 {
            return Err(HistoryError::Config("cache ttl must be positive".into()));
        }
        i64::try_from(self.home_domain_cache_ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                HistoryError::Config(format!(
                    "cache ttl of {} seconds is out of range",
                    self.home_domain_cache_ttl_secs
                ))
            })
    }
}

fn check_window(name: &str, window: BucketStrategy, granularity: Granularity) -> HistoryResult<()> {
    if window.granularity() != granularity {
        return Err(HistoryError::Config(format!(
            "{name} must use {} buckets, got {}",
            granularity.label(),
            window.granularity().label()
        )));
    }
    Ok(())
}
