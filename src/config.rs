//! Types for configuring the coordinator.
//!
//! # Semver note
//!
//! We do not use a builder here. Instead, additions or changes here are
//! API breaks.
//
// Rationale:
//
// The purpose of using a builder is to allow the code to continue to
// compile when new fields are added to the built struct.
//
// However, here, CoordinatorConfig is a small, closed set of tuning
// knobs that a host is expected to set deliberately; there is no
// intermediate layer (analogous to arti-client's TorClientConfig) that
// needs to keep compiling across field additions.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::DownloadSchedule;

/// Tuning knobs for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
#[allow(clippy::exhaustive_structs)]
pub struct CoordinatorConfig {
    /// How long `checkAvailable` will wait for an in-flight check before
    /// giving up and returning whatever is already known, if the caller
    /// doesn't supply their own `max_wait`.
    #[serde(with = "humantime_serde", default = "default_check_wait")]
    pub default_check_wait: Duration,

    /// Candidate URLs to fetch signed router updates from, in preference
    /// order. Not consulted by the coordinator itself -- it has no
    /// built-in signed-router `Checker`/`Updater` -- but exposed via
    /// [`crate::Coordinator::config`] so a host's own registrations can
    /// read it instead of hard-coding URLs twice.
    #[serde(default)]
    pub signed_update_urls: Vec<String>,

    /// The URL to fetch unsigned router archive updates from, if the host
    /// supports that fallback path at all.
    #[serde(default)]
    pub unsigned_update_url: Option<String>,

    /// How often the reaper sweeps the task table for dead entries.
    #[serde(with = "humantime_serde", default = "default_reaper_interval")]
    pub reaper_interval: Duration,

    /// How long a status string set via `finishStatus` stays visible
    /// before auto-clearing, absent a superseding call.
    #[serde(with = "humantime_serde", default = "default_status_expiry")]
    pub status_expiry: Duration,

    /// Backoff schedule individual updaters are encouraged to use between
    /// their own internal retry attempts. Plugged-in updaters are not
    /// required to consult this; it is exposed so that updaters shipped
    /// alongside this crate (and the dummy updater used in tests) behave
    /// consistently with host-supplied ones.
    pub retry_schedule: DownloadSchedule,

    /// Policy controlling whether a newly-available router version
    /// triggers an update automatically, or only becomes visible via
    /// `getUpdateAvailable`.
    #[serde(default)]
    pub router_update_policy: UpdatePolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            default_check_wait: default_check_wait(),
            signed_update_urls: Vec::new(),
            unsigned_update_url: None,
            reaper_interval: default_reaper_interval(),
            status_expiry: default_status_expiry(),
            retry_schedule: DownloadSchedule::default(),
            router_update_policy: UpdatePolicy::default(),
        }
    }
}

/// Default for [`CoordinatorConfig::default_check_wait`]: five minutes.
fn default_check_wait() -> Duration {
    Duration::from_secs(5 * 60)
}

/// Default for [`CoordinatorConfig::reaper_interval`]: fifteen minutes,
/// matching the sweep cadence a long-lived coordinator is expected to run
/// at.
fn default_reaper_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

/// Default for [`CoordinatorConfig::status_expiry`]: twenty minutes.
fn default_status_expiry() -> Duration {
    Duration::from_secs(20 * 60)
}

/// Whether a newly discovered router version should be downloaded
/// automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum UpdatePolicy {
    /// Never download automatically; the host must call `update` itself
    /// after observing `getUpdateAvailable`.
    #[default]
    Notify,
    /// Download automatically as soon as a newer version is announced.
    Automatic,
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.default_check_wait, Duration::from_secs(300));
        assert_eq!(cfg.router_update_policy, UpdatePolicy::Notify);
    }

    #[test]
    fn deserializes_from_json_with_defaults() {
        let cfg: CoordinatorConfig = serde_json::from_str(
            r#"{"retry_schedule": {"num_retries": 3, "initial_delay": "1s"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.reaper_interval, Duration::from_secs(900));
    }
}
