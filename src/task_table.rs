//! The task table: which checker/updater task is currently active for
//! which artifact, plus (for updaters) the remaining failover candidates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use event_listener::Event;

use crate::capability::{Task, Updater};
use crate::ids::{ArtifactId, Kind, Method};
use crate::registry::Registration;
use crate::version::Version;

/// The job context an updater task was started with, retained so the
/// retry engine can hand the same job to the next candidate if this one
/// fails.
pub struct RetryContext {
    /// The version being downloaded.
    pub version: Version,
    /// Candidate source URIs, by method.
    pub sources: HashMap<Method, Vec<String>>,
    /// The host's hint for how long to allow, unchanged across retries.
    pub max_time: Option<Duration>,
    /// Updaters not yet tried for this job, in the order they should be
    /// tried next.
    pub remaining_candidates: Mutex<Vec<Registration<dyn Updater>>>,
}

/// A running task plus whatever retry state the retry engine needs if it
/// fails.
pub struct TaskEntry {
    /// The task handle itself.
    pub task: Arc<dyn Task>,
    /// Present only for updater entries; `None` for checker entries.
    pub retry: Option<RetryContext>,
}

impl TaskEntry {
    /// Wrap a task with no failover context (used for checker entries).
    pub fn new(task: Arc<dyn Task>) -> Self {
        TaskEntry { task, retry: None }
    }

    /// Wrap an updater task together with the job context and remaining
    /// failover candidates.
    pub fn with_retry_context(task: Arc<dyn Task>, retry: RetryContext) -> Self {
        TaskEntry { task, retry: Some(retry) }
    }
}

/// A placeholder [`Task`] used to atomically reserve the checker slot for
/// an identity while [`Coordinator::check`](crate::Coordinator::check)
/// sequentially asks registered checkers whether they want the job.
///
/// Always reports itself as running, since the decision of which checker
/// (if any) accepts is expected to resolve quickly; the reaper is not
/// relied on to clean these up.
pub(crate) struct PendingTask {
    kind: Kind,
    id: String,
}

impl PendingTask {
    pub(crate) fn new(kind: Kind, id: String) -> Self {
        PendingTask { kind, id }
    }
}

impl Task for PendingTask {
    fn kind(&self) -> Kind {
        self.kind
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn is_running(&self) -> bool {
        true
    }
    fn cancel(&self) {}
}

/// Two independent per-identity task tables: one for checks, one for
/// updates (downloads). An identity can have both a check and an update
/// running at once; it can never have two of the same kind running at
/// once.
#[derive(Default)]
pub struct TaskTable {
    checkers: Mutex<HashMap<ArtifactId, Arc<TaskEntry>>>,
    updaters: Mutex<HashMap<ArtifactId, Arc<TaskEntry>>>,
    /// Per-identity "check complete" signals, kept independent of
    /// whichever `Task` object currently occupies the checker slot for
    /// that identity (the slot may be replaced mid-check, from the
    /// reservation placeholder to the accepting checker's real task;
    /// sharing one persistent event per identity means a waiter that
    /// grabbed the event before the replacement still gets woken).
    completion_events: Mutex<HashMap<ArtifactId, Arc<Event>>>,
}

impl TaskTable {
    /// Construct an empty task table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The persistent "check complete" event for `id`, created on first
    /// use.
    pub fn completion_event(&self, id: &ArtifactId) -> Arc<Event> {
        self.completion_events
            .lock()
            .expect("poisoned")
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Event::new()))
            .clone()
    }

    /// Atomically reserve the checker slot for `id` with `placeholder`,
    /// if it is not already occupied. Returns false if a check is already
    /// in progress (reserved or resolved) for this identity.
    pub fn reserve_checker(&self, id: ArtifactId, placeholder: Arc<dyn Task>) -> bool {
        let mut entries = self.checkers.lock().expect("poisoned");
        if entries.contains_key(&id) {
            false
        } else {
            entries.insert(id, Arc::new(TaskEntry::new(placeholder)));
            true
        }
    }

    /// Insert a checker entry for `id`, returning the previous one if the
    /// caller raced itself (callers are expected to have already checked
    /// `is_checking`).
    pub fn insert_checker(&self, id: ArtifactId, entry: Arc<TaskEntry>) -> Option<Arc<TaskEntry>> {
        self.checkers.lock().expect("poisoned").insert(id, entry)
    }

    /// Insert an updater entry for `id`.
    pub fn insert_updater(&self, id: ArtifactId, entry: Arc<TaskEntry>) -> Option<Arc<TaskEntry>> {
        self.updaters.lock().expect("poisoned").insert(id, entry)
    }

    /// Fetch the current checker entry for `id`, if any.
    pub fn checker(&self, id: &ArtifactId) -> Option<Arc<TaskEntry>> {
        self.checkers.lock().expect("poisoned").get(id).cloned()
    }

    /// Fetch the current updater entry for `id`, if any.
    pub fn updater(&self, id: &ArtifactId) -> Option<Arc<TaskEntry>> {
        self.updaters.lock().expect("poisoned").get(id).cloned()
    }

    /// True if a checker task is on record for `id`.
    pub fn is_checking(&self, id: &ArtifactId) -> bool {
        self.checkers.lock().expect("poisoned").contains_key(id)
    }

    /// True if an updater task is on record for `id`.
    pub fn is_updating(&self, id: &ArtifactId) -> bool {
        self.updaters.lock().expect("poisoned").contains_key(id)
    }

    /// Remove and return the checker entry for `id`, if any, asking it to
    /// cancel first.
    pub fn stop_checker(&self, id: &ArtifactId) -> Option<Arc<TaskEntry>> {
        let entry = self.checkers.lock().expect("poisoned").remove(id);
        if let Some(entry) = &entry {
            entry.task.cancel();
        }
        entry
    }

    /// Remove and return the updater entry for `id`, if any, asking it to
    /// cancel first.
    pub fn stop_updater(&self, id: &ArtifactId) -> Option<Arc<TaskEntry>> {
        let entry = self.updaters.lock().expect("poisoned").remove(id);
        if let Some(entry) = &entry {
            entry.task.cancel();
        }
        entry
    }

    /// Stop every running checker task.
    pub fn stop_all_checkers(&self) {
        let entries = self.checkers.lock().expect("poisoned");
        for entry in entries.values() {
            entry.task.cancel();
        }
    }

    /// Stop every running updater task.
    pub fn stop_all_updaters(&self) {
        let entries = self.updaters.lock().expect("poisoned");
        for entry in entries.values() {
            entry.task.cancel();
        }
    }

    /// Remove the checker entry for `id` only if it still points at
    /// `expected` (pointer identity), leaving a newer entry (from a
    /// subsequent `check` call) untouched. Used when a task reports
    /// completion and wants to retire itself without clobbering a task
    /// that replaced it in the meantime.
    pub fn remove_checker_if_current(&self, id: &ArtifactId, expected: &Arc<dyn Task>) {
        let mut entries = self.checkers.lock().expect("poisoned");
        if let Some(entry) = entries.get(id) {
            if Arc::ptr_eq(&entry.task, expected) {
                entries.remove(id);
            }
        }
    }

    /// Same as [`Self::remove_checker_if_current`], for updaters.
    pub fn remove_updater_if_current(&self, id: &ArtifactId, expected: &Arc<dyn Task>) {
        let mut entries = self.updaters.lock().expect("poisoned");
        if let Some(entry) = entries.get(id) {
            if Arc::ptr_eq(&entry.task, expected) {
                entries.remove(id);
            }
        }
    }

    /// Sweep both tables, dropping every entry whose task is no longer
    /// running. Tolerant of concurrent inserts/removes racing the sweep:
    /// it only ever removes entries it has observed to be dead, and a
    /// task that finishes between the `is_running` check and the removal
    /// is simply caught on the next sweep instead.
    pub fn reap(&self) -> usize {
        let mut removed = 0;
        for table in [&self.checkers, &self.updaters] {
            let mut entries = table.lock().expect("poisoned");
            let before = entries.len();
            entries.retain(|_, entry| entry.task.is_running());
            removed += before - entries.len();
        }
        removed
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use crate::ids::Kind;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubTask {
        running: AtomicBool,
    }

    impl Task for StubTask {
        fn kind(&self) -> Kind {
            Kind::Dummy
        }
        fn id(&self) -> &str {
            ""
        }
        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
        fn cancel(&self) {
            self.running.store(false, Ordering::SeqCst);
        }
    }

    fn stub(running: bool) -> Arc<dyn Task> {
        Arc::new(StubTask { running: AtomicBool::new(running) })
    }

    #[test]
    fn reservation_is_exclusive_until_released() {
        let table = TaskTable::new();
        let id = ArtifactId::singleton(Kind::News);
        let placeholder = stub(true);

        assert!(table.reserve_checker(id.clone(), placeholder.clone()));
        assert!(!table.reserve_checker(id.clone(), stub(true)));
        table.remove_checker_if_current(&id, &placeholder);
        assert!(table.reserve_checker(id, stub(true)));
    }

    #[tokio::test]
    async fn completion_event_is_stable_across_slot_replacement() {
        let table = TaskTable::new();
        let id = ArtifactId::singleton(Kind::News);
        let placeholder = stub(true);
        table.reserve_checker(id.clone(), placeholder.clone());

        let event = table.completion_event(&id);
        let listener = event.listen();

        table.insert_checker(id.clone(), Arc::new(TaskEntry::new(stub(true))));
        table.completion_event(&id).notify(usize::MAX);

        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener should resolve once notified");
    }

    #[test]
    fn reap_removes_only_dead_entries() {
        let table = TaskTable::new();
        let alive = ArtifactId::singleton(Kind::News);
        let dead = ArtifactId::singleton(Kind::RouterSigned);

        table.insert_checker(alive.clone(), Arc::new(TaskEntry::new(stub(true))));
        table.insert_checker(dead.clone(), Arc::new(TaskEntry::new(stub(false))));

        assert_eq!(table.reap(), 1);
        assert!(table.is_checking(&alive));
        assert!(!table.is_checking(&dead));
    }

    #[test]
    fn stop_checker_cancels_and_removes() {
        let table = TaskTable::new();
        let id = ArtifactId::singleton(Kind::News);
        table.insert_checker(id.clone(), Arc::new(TaskEntry::new(stub(true))));

        let entry = table.stop_checker(&id).unwrap();
        assert!(!entry.task.is_running());
        assert!(!table.is_checking(&id));
    }
}
