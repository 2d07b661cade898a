#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![doc = include_str!("../README.md")]
// @@ begin lint list maintained by maint/add_warning @@
#![cfg_attr(not(ci_arti_stable), allow(renamed_and_removed_lints))]
#![cfg_attr(not(ci_arti_nightly), allow(unknown_lints))]
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::cargo_common_metadata)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::implicit_clone)]
#![deny(clippy::large_stack_arrays)]
#![warn(clippy::manual_ok_or)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::option_option)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![warn(clippy::rc_buffer)]
#![deny(clippy::ref_option_ref)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::trait_duplication_in_bounds)]
#![deny(clippy::unchecked_duration_subtraction)]
#![deny(clippy::unnecessary_wraps)]
#![warn(clippy::unseparated_literal_suffix)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::let_unit_value)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::significant_drop_in_scrutinee)]
//! <!-- @@ end lint list maintained by maint/add_warning @@ -->
//!
//! Coordinates discovery, download, verification, and installation of
//! versioned artifacts -- the router itself, the news feed, and plugins --
//! from whatever sources and transports a host chooses to plug in.

mod bootstrap;
pub mod capability;
pub mod config;
pub mod err;
pub mod host;
mod ids;
pub mod notify;
mod reaper;
mod registry;
mod retry;
mod retry_engine;
mod state;
mod status;
mod task_table;
mod version;

pub use bootstrap::bootstrap;
pub use capability::{Checker, Task, Updater};
pub use config::{CoordinatorConfig, UpdatePolicy};
pub use err::{Error, Result};
pub use host::{ArtifactInstaller, Clock, PropertyStore, RandomSource, Scheduler};
pub use ids::{ArtifactId, Kind, Method};
pub use notify::Notifier;
pub use retry::DownloadSchedule;
pub use status::{StatusEvent, StatusKind};
pub use version::{AvailableVersion, Version};

use std::sync::Arc;
use std::time::Duration;

use tor_error::internal;
use tracing::{debug, warn};

use crate::registry::Registry;
use crate::state::StateStore;
use crate::task_table::TaskTable;

/// Everything the coordinator's background tasks and API methods share,
/// wrapped in a single `Arc` so [`Coordinator`] stays cheap to clone.
///
/// Split out from [`Coordinator`] itself (rather than putting these
/// fields directly on it) so that [`Notifier`] can hold the same `Arc`
/// without holding a whole `Coordinator` -- a `Notifier` only needs the
/// shared internals, not the public API surface.
pub(crate) struct Shared {
    pub(crate) config: CoordinatorConfig,
    pub(crate) checkers: Registry<dyn Checker>,
    pub(crate) updaters: Registry<dyn Updater>,
    pub(crate) state: StateStore,
    pub(crate) tasks: TaskTable,
    pub(crate) status: status::StatusChannel,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rng: Arc<dyn RandomSource>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) properties: Arc<dyn PropertyStore>,
    pub(crate) installer: Arc<dyn ArtifactInstaller>,
}

/// Coordinates checking for, downloading, verifying, and installing
/// updates to the router, the news feed, and plugins.
///
/// A `Coordinator` is cheap to clone; clones share all state. There is
/// normally exactly one per process, constructed via [`bootstrap`].
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) shared: Arc<Shared>,
}

impl Coordinator {
    /// Construct a coordinator directly from its host collaborators,
    /// without running the bootstrap sequence. Most callers want
    /// [`bootstrap`] instead; this is exposed for tests that want to
    /// control seeding themselves.
    pub fn new(
        config: CoordinatorConfig,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
        scheduler: Arc<dyn Scheduler>,
        properties: Arc<dyn PropertyStore>,
        installer: Arc<dyn ArtifactInstaller>,
    ) -> Self {
        let status = status::StatusChannel::new(clock.clone(), config.status_expiry);
        let shared = Arc::new(Shared {
            config,
            checkers: Registry::new(),
            updaters: Registry::new(),
            state: StateStore::new(),
            tasks: TaskTable::new(),
            status,
            clock,
            rng,
            scheduler,
            properties,
            installer,
        });
        reaper::spawn(&shared);
        Coordinator { shared }
    }

    /// Register a checker for `(kind, method)` at `priority`. Higher
    /// priority checkers are not actually ordered against each other --
    /// every registered checker for a kind runs on every [`Self::check`]
    /// call -- but the priority is retained for symmetry with
    /// [`Self::register_updater`] and because a future checker
    /// implementation may want to consult it.
    pub fn register_checker(&self, checker: Arc<dyn Checker>, kind: Kind, method: Method, priority: i32) {
        self.shared.checkers.register(checker, kind, method, priority);
    }

    /// Unregister a previously registered checker.
    pub fn unregister_checker(&self, checker: &Arc<dyn Checker>, kind: Kind, method: Method) -> bool {
        self.shared.checkers.unregister(checker, kind, method)
    }

    /// Register an updater for `(kind, method)` at `priority`. When a
    /// download is started, registered updaters for the relevant methods
    /// are tried in descending priority order until one accepts the job.
    pub fn register_updater(&self, updater: Arc<dyn Updater>, kind: Kind, method: Method, priority: i32) {
        self.shared.updaters.register(updater, kind, method, priority);
    }

    /// Unregister a previously registered updater.
    pub fn unregister_updater(&self, updater: &Arc<dyn Updater>, kind: Kind, method: Method) -> bool {
        self.shared.updaters.unregister(updater, kind, method)
    }

    /// Begin checking for new versions of `kind`/`id`.
    ///
    /// Non-blocking: if a check is already in progress for this identity,
    /// this is a silent no-op rather than an error. Otherwise, registered
    /// checkers for `kind` are tried in descending priority order, and the
    /// **first** one whose `check` returns a task wins; later checkers are
    /// never invoked. Returns an error only if nothing is registered for
    /// `kind` at all.
    pub fn check(&self, kind: Kind, id: impl Into<String>) -> Result<()> {
        let id = ArtifactId { kind, id: id.into() };
        let checkers = self.shared.checkers.for_kind(kind);
        if checkers.is_empty() {
            return Err(Error::NoCheckerRegistered(id));
        }

        let placeholder: Arc<dyn Task> = Arc::new(task_table::PendingTask::new(kind, id.id.clone()));
        if !self.shared.tasks.reserve_checker(id.clone(), placeholder.clone()) {
            // A check (or a reservation for one) is already in progress;
            // fail silently rather than erroring.
            return Ok(());
        }

        let current_version = self.shared.state.best_known(&id);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            for checker in checkers {
                let notifier = Arc::new(Notifier {
                    shared: shared.clone(),
                    id: id.clone(),
                    method: checker.method,
                });
                if let Some(task) =
                    checker.capability.check(notifier, id.id.clone(), current_version.clone()).await
                {
                    shared.tasks.insert_checker(id.clone(), Arc::new(task_table::TaskEntry::new(task)));
                    return;
                }
            }
            // No checker accepted the job: release the reservation and
            // wake anything waiting in `check_available`.
            shared.tasks.remove_checker_if_current(&id, &placeholder);
            shared.tasks.completion_event(&id).notify(usize::MAX);
        });
        Ok(())
    }

    /// True if a check is currently running for `kind`/`id`.
    pub fn is_check_in_progress(&self, kind: Kind, id: &str) -> bool {
        self.shared.tasks.is_checking(&ArtifactId { kind, id: id.to_owned() })
    }

    /// True if a download is currently running for `kind`/`id`.
    pub fn is_update_in_progress(&self, kind: Kind, id: &str) -> bool {
        self.shared.tasks.is_updating(&ArtifactId { kind, id: id.to_owned() })
    }

    /// Ask whatever check is running for `kind`/`id` to stop.
    pub fn stop_check(&self, kind: Kind, id: &str) {
        self.shared.tasks.stop_checker(&ArtifactId { kind, id: id.to_owned() });
    }

    /// Ask whatever download is running for `kind`/`id` to stop.
    pub fn stop_update(&self, kind: Kind, id: &str) {
        self.shared.tasks.stop_updater(&ArtifactId { kind, id: id.to_owned() });
    }

    /// Stop every running check.
    pub fn stop_checks(&self) {
        self.shared.tasks.stop_all_checkers();
    }

    /// Stop every running download.
    pub fn stop_updates(&self) {
        self.shared.tasks.stop_all_updaters();
    }

    /// The version currently advertised as available for `kind`/`id`, if
    /// any.
    pub fn get_update_available(&self, kind: Kind, id: &str) -> Option<AvailableVersion> {
        self.shared.state.available(&ArtifactId { kind, id: id.to_owned() })
    }

    /// The best version currently downloaded (but not necessarily
    /// installed) for `kind`/`id`, if any.
    pub fn get_update_downloaded(&self, kind: Kind, id: &str) -> Option<Version> {
        self.shared.state.downloaded(&ArtifactId { kind, id: id.to_owned() })
    }

    /// The version currently installed for `kind`/`id`, if any.
    pub fn get_installed(&self, kind: Kind, id: &str) -> Option<Version> {
        self.shared.state.installed(&ArtifactId { kind, id: id.to_owned() })
    }

    /// Block until a check for `kind`/`id` finishes (or `max_wait`
    /// elapses), then return whatever is currently on record as
    /// available.
    ///
    /// Returns `Ok(None)` promptly, without starting anything, if an
    /// update is already in progress for this identity, or if no checker
    /// is registered for `kind`. Otherwise launches a check exactly like
    /// [`Self::check`] (a no-op if one is already running), waits up to
    /// `max_wait` for it to complete, then returns whatever is on record
    /// as available regardless of whether the check actually finished in
    /// time.
    pub async fn check_available(
        &self,
        kind: Kind,
        id: impl Into<String>,
        max_wait: Option<Duration>,
    ) -> Result<Option<AvailableVersion>> {
        let id = ArtifactId { kind, id: id.into() };
        if self.shared.tasks.is_updating(&id) {
            return Ok(None);
        }

        match self.check(kind, id.id.clone()) {
            Ok(()) => {}
            Err(Error::NoCheckerRegistered(_)) => return Ok(None),
            Err(e) => return Err(e),
        }

        let wait = max_wait.unwrap_or(self.shared.config.default_check_wait);
        let listener = self.shared.tasks.completion_event(&id).listen();
        let _ = tokio::time::timeout(wait, listener).await;

        Ok(self.shared.state.available(&id))
    }

    /// Begin downloading and installing whatever version is currently on
    /// record as available for `kind`/`id`.
    ///
    /// Returns an error if a check or update is already in progress for
    /// this identity, if no `AvailableVersion` is recorded, or if no
    /// updater is registered for any of its sources' methods.
    pub async fn update(&self, kind: Kind, id: impl Into<String>, max_time: Option<Duration>) -> Result<()> {
        let id = ArtifactId { kind, id: id.into() };
        if self.shared.tasks.is_checking(&id) || self.shared.tasks.is_updating(&id) {
            return Err(Error::AlreadyInProgress(id));
        }
        let available = self
            .shared
            .state
            .available(&id)
            .ok_or_else(|| Error::NoUpdateAvailable(id.clone()))?;

        let has_updater =
            available.sources.keys().any(|m| self.shared.updaters.has_any_for_method(kind, *m));
        if !has_updater {
            return Err(Error::NoUpdaterRegistered(id));
        }

        if retry_engine::start(&self.shared, id, available.version, available.sources, max_time).await {
            Ok(())
        } else {
            Err(internal!("no registered updater accepted the download job").into())
        }
    }

    /// Register a plugin id as known, if it wasn't already, and start an
    /// update for it, fetching from `uri`.
    ///
    /// An empty `name` is replaced by a freshly generated random id, for
    /// callers discovering a plugin with no identifier of its own.
    /// Otherwise, inserts a synthetic `AvailableVersion` for
    /// `(Plugin, name)` only if one isn't already on record -- the
    /// insert-if-absent step (rather than an explicit prior `register`)
    /// is what lets a host discover and install a brand new plugin in one
    /// call -- then dispatches [`Self::update`] exactly as any other
    /// plugin update would be.
    pub async fn install_plugin(
        &self,
        name: impl Into<String>,
        uri: impl Into<String>,
        max_time: Option<Duration>,
    ) -> Result<()> {
        let name = name.into();
        let name = if name.is_empty() {
            let generated = self.shared.rng.random_id();
            debug!(generated_id = %generated, "installPlugin called with no id, generating one");
            generated
        } else {
            name
        };
        let id = ArtifactId::plugin(name.clone());
        if self.shared.state.available(&id).is_none() {
            debug!(plugin = %name, "registering previously unknown plugin");
            let candidate = AvailableVersion::new(Version::new(""), None, Method::Http, uri);
            self.shared.state.announce(id, candidate);
        }
        self.update(Kind::Plugin, name, max_time).await
    }

    /// The configuration this coordinator was constructed with. Exposed
    /// so a host's own `Checker`/`Updater` registrations can read shared
    /// tuning knobs (e.g. `signed_update_urls`) instead of threading them
    /// through separately.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    /// The most recent human-readable status line, if one is set and has
    /// not yet expired.
    pub fn status(&self) -> Option<StatusEvent> {
        self.shared.status.get()
    }

    /// Subscribe to status updates as they happen.
    pub fn subscribe_status(&self) -> postage::watch::Receiver<Option<StatusEvent>> {
        self.shared.status.subscribe()
    }

    /// Run one reaper sweep immediately, outside its normal schedule.
    /// Exposed mainly for tests; production code should rely on the
    /// periodic sweep started in [`Self::new`].
    pub fn reap_now(&self) -> usize {
        let removed = self.shared.tasks.reap();
        if removed > 0 {
            warn!(removed, "reaper swept dead task entries");
        }
        removed
    }
}
