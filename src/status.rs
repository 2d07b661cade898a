//! The status channel: a single volatile human-readable string describing
//! the coordinator's most recent activity, with automatic expiry.
//!
//! Broadcast over a [`postage::watch`] channel, the same primitive
//! `tor-dirmgr` uses for its own bootstrap status reporting, so multiple
//! observers (a status page, a log tailer, a test) can all subscribe
//! independently.

use std::time::Duration;

use postage::watch;

/// The kind of the most recent status update, used by presenters that
/// want to style progress differently from failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Routine informational update (check complete, install complete).
    Info,
    /// A download or verification is in progress.
    Progress,
    /// An attempt or task failed.
    Failure,
}

/// A single status line, plus when it was set so expiry can be computed.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    /// What kind of update this is.
    pub kind: StatusKind,
    /// Human-readable text. Not meant to be machine-parsed; exact wording
    /// may change between releases.
    pub text: String,
    set_at_millis: u64,
}

impl StatusEvent {
    /// Build an informational status event.
    pub fn info(text: impl Into<String>) -> Self {
        StatusEvent { kind: StatusKind::Info, text: text.into(), set_at_millis: 0 }
    }

    /// Build a progress status event.
    pub fn progress(text: impl Into<String>) -> Self {
        StatusEvent { kind: StatusKind::Progress, text: text.into(), set_at_millis: 0 }
    }

    /// Build a failure status event.
    pub fn failure(text: impl Into<String>) -> Self {
        StatusEvent { kind: StatusKind::Failure, text: text.into(), set_at_millis: 0 }
    }
}

/// The coordinator's volatile status string.
///
/// Unlike `tor-dirmgr`'s bootstrap event stream, there is no history here:
/// only the single latest event is kept, and it auto-clears after
/// `expiry` unless superseded by a newer one. Expiry is computed lazily
/// on read rather than via a background timer, since a wall-clock
/// comparison at read time is simpler and exactly as correct.
pub struct StatusChannel {
    sender: std::sync::Mutex<watch::Sender<Option<StatusEvent>>>,
    receiver: watch::Receiver<Option<StatusEvent>>,
    clock: std::sync::Arc<dyn crate::host::Clock>,
    expiry: Duration,
}

impl StatusChannel {
    /// Construct an empty status channel.
    pub fn new(clock: std::sync::Arc<dyn crate::host::Clock>, expiry: Duration) -> Self {
        let (sender, receiver) = watch::channel();
        StatusChannel { sender: std::sync::Mutex::new(sender), receiver, clock, expiry }
    }

    /// Set the current status, stamped with the current time.
    pub fn set(&self, mut event: StatusEvent) {
        event.set_at_millis = self.clock.now_millis();
        let mut sender = self.sender.lock().expect("poisoned");
        *sender.borrow_mut() = Some(event);
    }

    /// Read the current status, if any and not yet expired.
    pub fn get(&self) -> Option<StatusEvent> {
        let event = self.receiver.borrow().clone();
        event.filter(|e| {
            let age = self.clock.now_millis().saturating_sub(e.set_at_millis);
            Duration::from_millis(age) < self.expiry
        })
    }

    /// Subscribe to status changes as they happen. Expiry is not applied
    /// to the stream -- only to [`Self::get`] -- since a subscriber
    /// naturally stops seeing stale events once a new one is set.
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusEvent>> {
        self.receiver.clone()
    }
}
