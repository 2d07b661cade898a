//! Host collaborator traits.
//!
//! Everything the coordinator needs from its embedding application but
//! does not want to hard-code a concrete implementation for: wall-clock
//! time, random ids, a periodic-task scheduler, a small string property
//! store, and the handful of operations (signature verification, archive
//! validation, installing a file, restarting the process) that are
//! inherently host-specific.
//!
//! Grounded in the same spirit as `tor_rtcompat::Runtime`, but split into
//! several narrow traits instead of one broad one, since a host may want
//! to provide, say, its own `PropertyStore` while reusing `tokio` directly
//! for scheduling.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::ids::Kind;
use crate::version::Version;

/// A source of the current time, abstracted so tests can control it.
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// A source of randomness, used only to generate opaque plugin install
/// tokens and the like; never for anything security-sensitive.
pub trait RandomSource: Send + Sync + 'static {
    /// Generate an opaque random identifier.
    fn random_id(&self) -> String;
}

/// A small string-keyed persistent property store, used to remember the
/// bootstrap sequence number and similar small bits of durable state.
///
/// Deliberately narrower than `tor_persist::StateMgr`: the coordinator
/// only ever needs to remember a handful of strings, not arbitrary
/// serde-serializable documents, so there is no value in taking on a
/// generic serialization API here.
pub trait PropertyStore: Send + Sync + 'static {
    /// Fetch a previously stored property, if any.
    fn get_property(&self, key: &str) -> Option<String>;

    /// Store (or overwrite) a property.
    fn set_property(&self, key: &str, value: &str);
}

/// A periodic-task scheduler, used by the reaper sweep.
///
/// Hosts that already run a `tokio` runtime can implement this with a
/// single `tokio::spawn` of a `tokio::time::interval` loop; it is kept as
/// a trait so tests can run sweeps synchronously instead.
pub trait Scheduler: Send + Sync + 'static {
    /// Arrange for `task` to run once per `interval`, starting after the
    /// first interval elapses, for as long as the coordinator lives.
    fn spawn_periodic(&self, interval: Duration, task: Box<dyn Fn() + Send + Sync>);
}

/// Host operations needed to actually apply a downloaded artifact.
///
/// These are the operations spec'd as "external to this component":
/// verifying a signed update file, validating an archive, moving it into
/// its install location, and (for router updates) requesting a restart.
#[async_trait]
pub trait ArtifactInstaller: Send + Sync + 'static {
    /// Verify the signature on a downloaded signed update. Only called
    /// for [`Kind::RouterSigned`].
    async fn verify_signature(&self, kind: Kind, file: &Path) -> Result<(), String>;

    /// Validate the structure of a downloaded archive (checksum, expected
    /// layout, and so on). Called for every kind before installation.
    async fn validate_archive(&self, kind: Kind, file: &Path) -> Result<(), String>;

    /// Move or copy `file` into the install location for `kind`/`id`.
    async fn install(&self, kind: Kind, id: &str, file: &Path) -> Result<(), String>;

    /// Ask the host to restart (or schedule a restart of) the embedding
    /// process. Only called after a successful [`Kind::RouterSigned`] or
    /// [`Kind::RouterUnsigned`] install.
    fn request_restart(&self, immediate: bool);

    /// The currently installed router version, used to seed the state
    /// store at bootstrap.
    fn installed_router_version(&self) -> Option<Version>;

    /// The currently installed news version, used to seed the state
    /// store at bootstrap.
    fn installed_news_version(&self) -> Option<Version>;

    /// The set of plugin ids currently installed, used to seed the state
    /// store at bootstrap.
    fn installed_plugins(&self) -> Vec<(String, Version)>;
}
