//! The three capability traits hosts plug into the coordinator: [`Checker`],
//! [`Updater`], and the [`Task`] handle their methods hand back.
//!
//! These mirror the role `DirState`/downloader objects play in
//! `tor-dirmgr`'s bootstrap loop: the coordinator itself never knows how to
//! reach the network, it only knows how to drive whatever a `Checker` or
//! `Updater` gives it back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::ids::Kind;
use crate::notify::Notifier;
use crate::version::Version;

/// A running unit of work started by a [`Checker`] or [`Updater`].
///
/// Implementations are expected to spawn their own work (onto whatever
/// executor the host provides) and report back through the [`Notifier`]
/// they were handed at construction time; the coordinator only needs to
/// know whether the task is still alive and how to ask it to stop.
///
/// The condition [`checkAvailable`](crate::Coordinator::check_available)
/// waits on is not exposed here: it lives in the task table, keyed by
/// artifact identity rather than by a particular `Task` object, since the
/// task bound to an identity can be replaced mid-check (see
/// [`crate::task_table::TaskTable::completion_event`]).
pub trait Task: Send + Sync {
    /// The artifact kind this task is working on.
    fn kind(&self) -> Kind;

    /// The artifact id this task is working on (empty for singleton kinds).
    fn id(&self) -> &str;

    /// True while the task has not yet reported completion or failure.
    fn is_running(&self) -> bool;

    /// Ask the task to stop as soon as it reasonably can. Does not block
    /// until the task has actually stopped.
    fn cancel(&self);
}

/// A plugged-in discovery mechanism for one `(kind, method)` pair.
///
/// `check` is called once per [`Coordinator::check`](crate::Coordinator::check)
/// invocation and is expected to start a background task (if any work is
/// needed at all) rather than block.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Begin checking for new versions of `kind`/`id`.
    ///
    /// `current_version` is the best version the coordinator already knows
    /// about (installed or downloaded), so the checker can skip reporting
    /// anything not newer. Returns the task driving the check, or `None`
    /// if no background work was needed (for example, because the checker
    /// decided synchronously that there was nothing to do).
    async fn check(
        &self,
        notifier: Arc<Notifier>,
        id: String,
        current_version: Option<Version>,
    ) -> Option<Arc<dyn Task>>;
}

/// A plugged-in download mechanism for one `(kind, method)` pair.
#[async_trait]
pub trait Updater: Send + Sync {
    /// Begin downloading `version` of `kind`/`id` from one of `uris`
    /// (all reachable via this updater's method).
    ///
    /// `max_time`, if set, is a hint for how long the host is willing to
    /// wait before giving up and trying the next candidate; updaters are
    /// not required to enforce it themselves; the coordinator may race
    /// them if they don't.
    async fn update(
        &self,
        notifier: Arc<Notifier>,
        id: String,
        version: Version,
        uris: Vec<String>,
        max_time: Option<Duration>,
    ) -> Option<Arc<dyn Task>>;
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct CancellableTask {
        kind: Kind,
        id: String,
        cancelled: AtomicBool,
    }

    impl Task for CancellableTask {
        fn kind(&self) -> Kind {
            self.kind
        }
        fn id(&self) -> &str {
            &self.id
        }
        fn is_running(&self) -> bool {
            !self.cancelled.load(Ordering::SeqCst)
        }
        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn task_reports_kind_id_and_reacts_to_cancel() {
        let task: Arc<dyn Task> =
            Arc::new(CancellableTask { kind: Kind::Plugin, id: "alice".to_owned(), cancelled: AtomicBool::new(false) });
        assert_eq!(task.kind(), Kind::Plugin);
        assert_eq!(task.id(), "alice");
        assert!(task.is_running());

        task.cancel();
        assert!(!task.is_running());
    }
}
