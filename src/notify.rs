//! The notification sink: the callback surface checkers and updaters use
//! to report progress and results back into the coordinator.
//!
//! A `Notifier` is created fresh for each `check`/`update` dispatch and
//! handed to the `Checker`/`Updater` implementation, bound to the
//! artifact identity and method it was dispatched for. It is the only
//! way background tasks touch shared coordinator state, which keeps the
//! state-mutation surface in one place instead of scattered across every
//! `Task` implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capability::Task;
use crate::config::UpdatePolicy;
use crate::ids::{ArtifactId, Kind, Method};
use crate::state::{AnnounceOutcome, DownloadOutcome};
use crate::status::StatusEvent;
use crate::version::{AvailableVersion, Version};
use crate::Shared;

/// Handed to a `Checker`/`Updater` so it can report progress and results.
pub struct Notifier {
    pub(crate) shared: Arc<Shared>,
    pub(crate) id: ArtifactId,
    pub(crate) method: Method,
}

impl Notifier {
    /// Report download/verification progress for a running task. Purely
    /// informational; forwarded to the status channel as a formatted
    /// percentage plus the raw byte count.
    pub fn notify_progress(&self, done: u64, total: Option<u64>) {
        let text = match total {
            Some(total) if total > 0 => {
                let percent = done as f64 / total as f64 * 100.0;
                format!("{}: {percent:.1}% ({done}/{total} bytes)", self.id)
            }
            Some(total) => format!("{}: {done}/{total} bytes", self.id),
            None => format!("{}: {done} bytes", self.id),
        };
        self.shared.status.set(StatusEvent::progress(text));
    }

    /// Report that one attempt (of possibly several) failed, without
    /// necessarily giving up on the whole task.
    pub fn notify_attempt_failed(&self, reason: &str) {
        tracing::debug!(id = %self.id, method = %self.method, reason, "update attempt failed");
    }

    /// Report that the task has given up entirely, having last attempted
    /// to fetch from `uri`.
    ///
    /// If this task still has candidates remaining in its retry plan, the
    /// **Retry Engine** is invoked with that plan; otherwise a
    /// "Transfer failed" status naming `uri` is published, except for
    /// [`Kind::Dummy`] tasks, which never surface a user-visible status at
    /// all.
    pub async fn notify_task_failed(&self, task: Arc<dyn Task>, uri: &str, reason: &str) {
        tracing::warn!(id = %self.id, method = %self.method, uri, reason, "task failed");
        self.shared.tasks.remove_checker_if_current(&self.id, &task);
        self.shared.tasks.completion_event(&self.id).notify(usize::MAX);

        let retried = crate::retry_engine::retry_next(&self.shared, &self.id, &task).await;
        if !retried {
            self.shared.tasks.remove_updater_if_current(&self.id, &task);
            if self.id.kind != Kind::Dummy {
                self.shared
                    .status
                    .set(StatusEvent::failure(format!("Transfer failed from {uri}")));
            }
        }
    }

    /// Report that a check completed, with `found` set if a new version
    /// was discovered.
    pub fn notify_check_complete(&self, task: Arc<dyn Task>, found: Option<AvailableVersion>) {
        self.shared.tasks.remove_checker_if_current(&self.id, &task);
        self.shared.tasks.completion_event(&self.id).notify(usize::MAX);

        let Some(candidate) = found else {
            self.shared.status.set(StatusEvent::info(format!("{}: up to date", self.id)));
            return;
        };

        match self.shared.state.announce(self.id.clone(), candidate.clone()) {
            AnnounceOutcome::Stale => {}
            AnnounceOutcome::SourcesMerged => {
                tracing::trace!(id = %self.id, "merged additional sources for known version");
            }
            AnnounceOutcome::NewVersion => {
                tracing::info!(id = %self.id, version = %candidate.version, "new version available");
                self.shared
                    .status
                    .set(StatusEvent::info(format!("{}: {} available", self.id, candidate.version)));

                if self.id.kind == Kind::RouterUnsigned {
                    self.shared
                        .properties
                        .set_property("router.updateUnsignedAvailable", &candidate.version.to_string());
                }

                if self.id.kind.is_router()
                    && self.shared.config.router_update_policy == UpdatePolicy::Automatic
                    && !self.shared.tasks.is_updating(&self.id)
                {
                    let shared = self.shared.clone();
                    let id = self.id.clone();
                    let version = candidate.version.clone();
                    let sources = candidate.sources.clone();
                    tokio::spawn(async move {
                        let _ = crate::retry_engine::start(&shared, id, version, sources, None).await;
                    });
                }
            }
        }
    }

    /// Report that a download finished, and dispatch verification/
    /// installation according to `self.id.kind`. Returns whether the
    /// artifact ended up installed.
    ///
    /// - [`Kind::News`]: accepted unconditionally, no archive handling at
    ///   all.
    /// - [`Kind::RouterSigned`]: the signed-file verifier both checks and
    ///   migrates `file` into the install slot.
    /// - [`Kind::RouterUnsigned`]: validated as an archive first; a
    ///   corrupt archive is deleted and the task fails without touching
    ///   state.
    /// - [`Kind::Plugin`] and anything else: the `Updater` is assumed to
    ///   have already installed the artifact itself; this only records
    ///   the transition.
    pub async fn notify_complete(&self, task: Arc<dyn Task>, version: Version, file: PathBuf) -> bool {
        self.shared.tasks.remove_updater_if_current(&self.id, &task);

        match self.id.kind {
            Kind::News => self.finish_assumed_installed(version).await,
            Kind::RouterSigned => self.finish_router_download(version, &file, true).await,
            Kind::RouterUnsigned => self.finish_router_download(version, &file, false).await,
            Kind::Plugin | Kind::Dummy => self.finish_assumed_installed(version).await,
        }
    }

    /// Record a download already installed by its `Updater` (news and
    /// plugin kinds): advance straight to `installed`, skipping any
    /// archive handling here.
    async fn finish_assumed_installed(&self, version: Version) -> bool {
        match self.shared.state.record_downloaded(self.id.clone(), version.clone()) {
            DownloadOutcome::Stale => {
                tracing::debug!(id = %self.id, "discarding stale download");
                return false;
            }
            DownloadOutcome::Recorded => {}
        }
        self.shared.state.record_installed(self.id.clone(), version.clone());
        self.shared
            .status
            .set(StatusEvent::info(format!("{}: installed {}", self.id, version)));
        true
    }

    /// Verify (if `signed`) or validate, then install, a downloaded
    /// router archive, persisting the §6 property pair and applying
    /// restart policy on success.
    async fn finish_router_download(&self, version: Version, file: &Path, signed: bool) -> bool {
        let checked = if signed {
            self.shared.installer.verify_signature(self.id.kind, file).await
        } else {
            self.shared.installer.validate_archive(self.id.kind, file).await
        };
        if let Err(reason) = checked {
            tracing::warn!(id = %self.id, reason, "router archive failed verification");
            if !signed {
                if let Err(remove_err) = tokio::fs::remove_file(file).await {
                    tracing::warn!(id = %self.id, error = %remove_err, "failed to delete corrupt archive");
                }
            }
            self.shared
                .status
                .set(StatusEvent::failure(format!("{}: install failed: {reason}", self.id)));
            return false;
        }

        if let Err(reason) = self.shared.installer.install(self.id.kind, &self.id.id, file).await {
            tracing::warn!(id = %self.id, reason, "router install failed");
            self.shared
                .status
                .set(StatusEvent::failure(format!("{}: install failed: {reason}", self.id)));
            return false;
        }

        match self.shared.state.record_downloaded(self.id.clone(), version.clone()) {
            DownloadOutcome::Stale => {
                tracing::debug!(id = %self.id, "discarding stale download");
                return false;
            }
            DownloadOutcome::Recorded => {}
        }

        if !signed {
            self.shared.properties.set_property("router.updateUnsignedAvailable", "");
        }
        self.shared.properties.set_property(
            "router.updateLastUpdateTime",
            &self.shared.clock.now_millis().to_string(),
        );

        self.shared.state.record_installed(self.id.clone(), version.clone());
        self.shared
            .status
            .set(StatusEvent::info(format!("{}: installed {}", self.id, version)));

        let immediate = self.shared.config.router_update_policy == UpdatePolicy::Automatic;
        self.shared.installer.request_restart(immediate);
        true
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use crate::capability::Task;
    use crate::config::CoordinatorConfig;
    use crate::host::test_support::{FakeClock, FixedIds, ManualScheduler, MemPropertyStore};
    use crate::host::{ArtifactInstaller, PropertyStore};
    use crate::registry::Registry;
    use crate::state::StateStore;
    use crate::task_table::TaskTable;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedInstaller {
        verify_ok: bool,
        validate_ok: bool,
        restarted: Mutex<Option<bool>>,
    }

    impl Default for ScriptedInstaller {
        fn default() -> Self {
            ScriptedInstaller { verify_ok: true, validate_ok: true, restarted: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl ArtifactInstaller for ScriptedInstaller {
        async fn verify_signature(&self, _kind: Kind, _file: &Path) -> std::result::Result<(), String> {
            if self.verify_ok {
                Ok(())
            } else {
                Err("bad signature".to_owned())
            }
        }
        async fn validate_archive(&self, _kind: Kind, _file: &Path) -> std::result::Result<(), String> {
            if self.validate_ok {
                Ok(())
            } else {
                Err("corrupt archive".to_owned())
            }
        }
        async fn install(&self, _kind: Kind, _id: &str, _file: &Path) -> std::result::Result<(), String> {
            Ok(())
        }
        fn request_restart(&self, immediate: bool) {
            *self.restarted.lock().expect("poisoned") = Some(immediate);
        }
        fn installed_router_version(&self) -> Option<Version> {
            None
        }
        fn installed_news_version(&self) -> Option<Version> {
            None
        }
        fn installed_plugins(&self) -> Vec<(String, Version)> {
            Vec::new()
        }
    }

    struct StubTask;

    impl Task for StubTask {
        fn kind(&self) -> Kind {
            Kind::Dummy
        }
        fn id(&self) -> &str {
            ""
        }
        fn is_running(&self) -> bool {
            false
        }
        fn cancel(&self) {}
    }

    fn shared_with(installer: Arc<ScriptedInstaller>) -> Arc<Shared> {
        Arc::new(Shared {
            config: CoordinatorConfig::default(),
            checkers: Registry::new(),
            updaters: Registry::new(),
            state: StateStore::new(),
            tasks: TaskTable::new(),
            status: crate::status::StatusChannel::new(Arc::new(FakeClock::default()), Duration::from_secs(60)),
            clock: Arc::new(FakeClock::default()),
            rng: Arc::new(FixedIds::default()),
            scheduler: Arc::new(ManualScheduler::default()),
            properties: Arc::new(MemPropertyStore::default()),
            installer,
        })
    }

    fn notifier_for(shared: Arc<Shared>, id: ArtifactId) -> Notifier {
        Notifier { shared, id, method: Method::Http }
    }

    #[test]
    fn notify_progress_formats_a_one_decimal_percentage() {
        let shared = shared_with(Arc::new(ScriptedInstaller::default()));
        let notifier = notifier_for(shared.clone(), ArtifactId::singleton(Kind::News));
        notifier.notify_progress(50, Some(200));
        let status = shared.status.get().unwrap();
        assert!(status.text.contains("25.0%"), "unexpected status: {}", status.text);
    }

    #[tokio::test]
    async fn notify_task_failed_reports_the_uri_and_is_silent_for_dummy() {
        let shared = shared_with(Arc::new(ScriptedInstaller::default()));
        let id = ArtifactId::singleton(Kind::News);
        let notifier = notifier_for(shared.clone(), id.clone());
        let task: Arc<dyn Task> = Arc::new(StubTask);
        notifier.notify_task_failed(task, "http://example/news.xml", "timed out").await;
        let status = shared.status.get().unwrap();
        assert_eq!(status.text, "Transfer failed from http://example/news.xml");

        let dummy_shared = shared_with(Arc::new(ScriptedInstaller::default()));
        let dummy_notifier = notifier_for(dummy_shared.clone(), ArtifactId::singleton(Kind::Dummy));
        let dummy_task: Arc<dyn Task> = Arc::new(StubTask);
        dummy_notifier.notify_task_failed(dummy_task, "http://example/dummy", "timed out").await;
        assert!(dummy_shared.status.get().is_none());
    }

    #[tokio::test]
    async fn notify_complete_accepts_news_unconditionally() {
        let shared = shared_with(Arc::new(ScriptedInstaller::default()));
        let id = ArtifactId::singleton(Kind::News);
        let notifier = notifier_for(shared.clone(), id.clone());
        let task: Arc<dyn Task> = Arc::new(StubTask);
        let installed = notifier
            .notify_complete(task, Version::new("2.0.0"), PathBuf::from("/tmp/news.xml"))
            .await;
        assert!(installed);
        assert_eq!(shared.state.installed(&id), Some(Version::new("2.0.0")));
    }

    #[tokio::test]
    async fn notify_complete_assumes_plugin_already_installed() {
        let shared = shared_with(Arc::new(ScriptedInstaller::default()));
        let id = ArtifactId::plugin("alice");
        let notifier = notifier_for(shared.clone(), id.clone());
        let task: Arc<dyn Task> = Arc::new(StubTask);
        let installed = notifier
            .notify_complete(task, Version::new("1.0.0"), PathBuf::from("/tmp/alice.jar"))
            .await;
        assert!(installed);
        assert_eq!(shared.state.installed(&id), Some(Version::new("1.0.0")));
    }

    #[tokio::test]
    async fn notify_complete_installs_a_signed_router_update_and_persists_properties() {
        let installer = Arc::new(ScriptedInstaller::default());
        let shared = shared_with(installer.clone());
        let id = ArtifactId::singleton(Kind::RouterSigned);
        let notifier = notifier_for(shared.clone(), id.clone());
        let task: Arc<dyn Task> = Arc::new(StubTask);
        let installed = notifier
            .notify_complete(task, Version::new("9.0.0"), PathBuf::from("/tmp/router.bin"))
            .await;
        assert!(installed);
        assert_eq!(shared.state.installed(&id), Some(Version::new("9.0.0")));
        assert!(shared.properties.get_property("router.updateLastUpdateTime").is_some());
        assert_eq!(*installer.restarted.lock().expect("poisoned"), Some(false));
    }

    #[tokio::test]
    async fn notify_complete_deletes_a_corrupt_unsigned_archive_and_leaves_state_untouched() {
        let shared = shared_with(Arc::new(ScriptedInstaller { validate_ok: false, ..ScriptedInstaller::default() }));
        let id = ArtifactId::singleton(Kind::RouterUnsigned);
        let notifier = notifier_for(shared.clone(), id.clone());
        let task: Arc<dyn Task> = Arc::new(StubTask);

        let dir = std::env::temp_dir();
        let file = dir.join(format!("update-coordinator-test-{}.archive", std::process::id()));
        tokio::fs::write(&file, b"not a real archive").await.unwrap();

        let installed = notifier.notify_complete(task, Version::new("5.0.0"), file.clone()).await;

        assert!(!installed);
        assert!(!file.exists(), "corrupt archive should have been deleted");
        assert!(shared.state.installed(&id).is_none());
        let status = shared.status.get().unwrap();
        assert!(status.text.contains("corrupt archive"), "unexpected status: {}", status.text);
    }
}
