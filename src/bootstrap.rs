//! Bootstrap sequence: seed the state store from the host's installed
//! inventory, register the internal dummy checker/updater pair, and start
//! the periodic reaper.
//!
//! Mirrors the shape of `tor-dirmgr`'s `DirMgr::from_config` constructor:
//! build the shared internals first, then perform whatever one-time setup
//! is needed before handing back something callers can use immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::capability::{Checker, Task, Updater};
use crate::config::CoordinatorConfig;
use crate::host::{ArtifactInstaller, Clock, PropertyStore, RandomSource, Scheduler};
use crate::ids::{ArtifactId, Kind, Method};
use crate::notify::Notifier;
use crate::version::{AvailableVersion, Version};
use crate::Coordinator;

/// Build a [`Coordinator`], seeding its state store from `installer`'s
/// reported inventory and registering the internal dummy checker/updater
/// pair used to exercise the coordinator without touching a real
/// transport.
pub fn bootstrap(
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    scheduler: Arc<dyn Scheduler>,
    properties: Arc<dyn PropertyStore>,
    installer: Arc<dyn ArtifactInstaller>,
) -> Coordinator {
    let coordinator = Coordinator::new(config, clock, rng, scheduler, properties, installer.clone());

    if let Some(version) = installer.installed_router_version() {
        coordinator
            .shared
            .state
            .seed_installed(ArtifactId::singleton(Kind::RouterSigned), version);
    }
    if let Some(version) = installer.installed_news_version() {
        coordinator.shared.state.seed_installed(ArtifactId::singleton(Kind::News), version);
    }
    for (name, version) in installer.installed_plugins() {
        coordinator.shared.state.seed_installed(ArtifactId::plugin(name), version);
    }

    coordinator.register_checker(Arc::new(DummyChecker), Kind::Dummy, Method::Dummy, 0);
    coordinator.register_updater(Arc::new(DummyUpdater), Kind::Dummy, Method::Dummy, 0);

    // Rehydrate an unsigned router update that was announced in a previous
    // run but never got installed, so it doesn't silently vanish across a
    // restart.
    if let Some(version) = coordinator.shared.properties.get_property("router.updateUnsignedAvailable") {
        if !version.is_empty() {
            let uri = coordinator.shared.config.unsigned_update_url.clone().unwrap_or_default();
            let candidate = AvailableVersion::new(Version::new(version), None, Method::HttpClearnet, uri);
            coordinator
                .shared
                .state
                .announce(ArtifactId::singleton(Kind::RouterUnsigned), candidate);
        }
    }

    info!("coordinator bootstrap complete");
    coordinator
}

/// A task that is immediately complete, used by [`DummyChecker`] and
/// [`DummyUpdater`].
struct DummyTask {
    kind: Kind,
    id: String,
}

impl Task for DummyTask {
    fn kind(&self) -> Kind {
        self.kind
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn is_running(&self) -> bool {
        false
    }
    fn cancel(&self) {}
}

/// A checker registered for `(Kind::Dummy, Method::Dummy)` at bootstrap so
/// the coordinator has at least one working checker/updater pair out of
/// the box, useful for smoke-testing a fresh host integration before any
/// real checkers are registered. Always reports nothing new.
struct DummyChecker;

#[async_trait]
impl Checker for DummyChecker {
    async fn check(
        &self,
        notifier: Arc<Notifier>,
        id: String,
        _current_version: Option<Version>,
    ) -> Option<Arc<dyn Task>> {
        let task: Arc<dyn Task> = Arc::new(DummyTask { kind: Kind::Dummy, id });
        notifier.notify_check_complete(task.clone(), None);
        Some(task)
    }
}

/// An updater registered for `(Kind::Dummy, Method::Dummy)` at bootstrap.
/// Never actually called in practice, since nothing ever reports a dummy
/// version as available, but registering it keeps the pair symmetric.
struct DummyUpdater;

#[async_trait]
impl Updater for DummyUpdater {
    async fn update(
        &self,
        _notifier: Arc<Notifier>,
        id: String,
        _version: Version,
        _uris: Vec<String>,
        _max_time: Option<Duration>,
    ) -> Option<Arc<dyn Task>> {
        Some(Arc::new(DummyTask { kind: Kind::Dummy, id }))
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use crate::host::test_support::{FakeClock, FixedIds, ManualScheduler, MemPropertyStore};
    use crate::ids::Kind;
    use std::path::Path;

    struct FakeInstaller {
        router_version: Option<Version>,
        plugins: Vec<(String, Version)>,
    }

    #[async_trait]
    impl ArtifactInstaller for FakeInstaller {
        async fn verify_signature(&self, _kind: Kind, _file: &Path) -> Result<(), String> {
            Ok(())
        }
        async fn validate_archive(&self, _kind: Kind, _file: &Path) -> Result<(), String> {
            Ok(())
        }
        async fn install(&self, _kind: Kind, _id: &str, _file: &Path) -> Result<(), String> {
            Ok(())
        }
        fn request_restart(&self, _immediate: bool) {}
        fn installed_router_version(&self) -> Option<Version> {
            self.router_version.clone()
        }
        fn installed_news_version(&self) -> Option<Version> {
            None
        }
        fn installed_plugins(&self) -> Vec<(String, Version)> {
            self.plugins.clone()
        }
    }

    #[tokio::test]
    async fn bootstrap_seeds_installed_inventory_and_dummy_pair() {
        let installer = Arc::new(FakeInstaller {
            router_version: Some(Version::new("1.0.0")),
            plugins: vec![("alice".to_owned(), Version::new("2.0.0"))],
        });
        let coordinator = bootstrap(
            CoordinatorConfig::default(),
            Arc::new(FakeClock::default()),
            Arc::new(FixedIds::default()),
            Arc::new(ManualScheduler::default()),
            Arc::new(MemPropertyStore::default()),
            installer,
        );

        assert_eq!(
            coordinator.get_installed(Kind::RouterSigned, ""),
            Some(Version::new("1.0.0"))
        );
        assert_eq!(
            coordinator.get_installed(Kind::Plugin, "alice"),
            Some(Version::new("2.0.0"))
        );

        coordinator.check(Kind::Dummy, "").unwrap();
    }

    #[tokio::test]
    async fn bootstrap_rehydrates_a_persisted_unsigned_update_marker() {
        let properties = Arc::new(MemPropertyStore::default());
        properties.set_property("router.updateUnsignedAvailable", "3.0.0");
        let installer = Arc::new(FakeInstaller { router_version: None, plugins: Vec::new() });

        let coordinator = bootstrap(
            CoordinatorConfig::default(),
            Arc::new(FakeClock::default()),
            Arc::new(FixedIds::default()),
            Arc::new(ManualScheduler::default()),
            properties,
            installer,
        );

        let available = coordinator.get_update_available(Kind::RouterUnsigned, "").unwrap();
        assert_eq!(available.version, Version::new("3.0.0"));
    }

    #[tokio::test]
    async fn bootstrap_ignores_an_empty_unsigned_update_marker() {
        let properties = Arc::new(MemPropertyStore::default());
        properties.set_property("router.updateUnsignedAvailable", "");
        let installer = Arc::new(FakeInstaller { router_version: None, plugins: Vec::new() });

        let coordinator = bootstrap(
            CoordinatorConfig::default(),
            Arc::new(FakeClock::default()),
            Arc::new(FixedIds::default()),
            Arc::new(ManualScheduler::default()),
            properties,
            installer,
        );

        assert_eq!(coordinator.get_update_available(Kind::RouterUnsigned, ""), None);
    }
}
