//! Candidate failover: when a download attempt fails outright, try the
//! next-highest-priority registered updater before giving up, carrying
//! the same version/source/`max_time` context across every attempt.
//!
//! This is distinct from [`crate::retry::DownloadSchedule`], which governs
//! how many times a *single* updater retries its own internal attempts.
//! This module only runs once an updater has given up and reported
//! failure through [`Notifier::notify_task_failed`](crate::notify::Notifier::notify_task_failed).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capability::Task;
use crate::ids::{ArtifactId, Method};
use crate::notify::Notifier;
use crate::registry::Registration;
use crate::task_table::{RetryContext, TaskEntry};
use crate::version::Version;
use crate::Shared;

/// Begin downloading `id` at `version`, trying registered updaters in
/// descending priority order across every method listed in `sources`,
/// until one accepts the job or all are exhausted.
///
/// Returns true if some updater accepted the job and a task is now
/// installed in the task table.
pub(crate) async fn start(
    shared: &Arc<Shared>,
    id: ArtifactId,
    version: Version,
    sources: HashMap<Method, Vec<String>>,
    max_time: Option<Duration>,
) -> bool {
    let mut candidates: Vec<Registration<dyn crate::capability::Updater>> = Vec::new();
    for method in sources.keys() {
        candidates.extend(shared.updaters.for_kind_and_method(id.kind, *method));
    }
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

    try_candidates(shared, id, version, sources, max_time, candidates).await
}

/// Try the next candidate in `task`'s retry context, if any. Returns true
/// if a new task is now running for this identity.
pub(crate) async fn retry_next(shared: &Arc<Shared>, id: &ArtifactId, task: &Arc<dyn Task>) -> bool {
    let Some(entry) = shared.tasks.updater(id) else { return false };
    if !Arc::ptr_eq(&entry.task, task) {
        return false;
    }
    let Some(retry) = &entry.retry else { return false };
    let remaining = std::mem::take(&mut *retry.remaining_candidates.lock().expect("poisoned"));
    try_candidates(shared, id.clone(), retry.version.clone(), retry.sources.clone(), retry.max_time, remaining)
        .await
}

/// Try each candidate (highest priority first, i.e. last in the vec) in
/// order until one accepts the job, installing a [`TaskEntry`] carrying
/// the rest as failover candidates.
async fn try_candidates(
    shared: &Arc<Shared>,
    id: ArtifactId,
    version: Version,
    sources: HashMap<Method, Vec<String>>,
    max_time: Option<Duration>,
    mut candidates: Vec<Registration<dyn crate::capability::Updater>>,
) -> bool {
    while !candidates.is_empty() {
        let candidate = candidates.remove(0);
        let still_registered = shared
            .updaters
            .for_kind_and_method(id.kind, candidate.method)
            .iter()
            .any(|r| r.is(&candidate.capability));
        if !still_registered {
            continue;
        }
        let Some(uris) = sources.get(&candidate.method) else { continue };
        let notifier = Arc::new(Notifier { shared: shared.clone(), id: id.clone(), method: candidate.method });
        if let Some(task) = candidate
            .capability
            .update(notifier, id.id.clone(), version.clone(), uris.clone(), max_time)
            .await
        {
            let retry = RetryContext {
                version,
                sources,
                max_time,
                remaining_candidates: Mutex::new(candidates),
            };
            let entry = Arc::new(TaskEntry::with_retry_context(task, retry));
            shared.tasks.insert_updater(id, entry);
            return true;
        }
    }
    false
}
