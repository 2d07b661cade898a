//! Wires [`TaskTable::reap`](crate::task_table::TaskTable::reap) into the
//! host's [`Scheduler`](crate::host::Scheduler), so dead checker/updater
//! entries get swept out without a caller having to remember to call
//! [`Coordinator::reap_now`](crate::Coordinator::reap_now) themselves.

use std::sync::Arc;

use tracing::debug;

use crate::Shared;

/// Register a periodic sweep with `shared.scheduler`, running every
/// `shared.config.reaper_interval`.
pub(crate) fn spawn(shared: &Arc<Shared>) {
    let shared = shared.clone();
    shared.scheduler.spawn_periodic(
        shared.config.reaper_interval,
        Box::new(move || {
            let removed = shared.tasks.reap();
            if removed > 0 {
                debug!(removed, "reaper swept dead task entries");
            }
        }),
    );
}
