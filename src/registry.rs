//! The priority-ordered table of registered [`Checker`](crate::capability::Checker)s
//! and [`Updater`](crate::capability::Updater)s.
//!
//! Modeled on the way `tor-dirmgr` keeps its directory-cache candidate list:
//! a small sorted `Vec` behind a lock, re-sorted on every registration rather
//! than kept in a heap, since registrations are rare compared to lookups.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use crate::ids::{Kind, Method};

/// A single registration: a capability plus the `(kind, method)` it applies
/// to and the priority it was registered with.
///
/// Higher `priority` is tried first. Ties break on registration order
/// (earlier registrations win), via the monotonic `seq` counter rather than
/// any property of the capability itself, so that two otherwise-identical
/// registrations never collide.
pub struct Registration<Cap: ?Sized> {
    /// The registered capability.
    pub capability: Arc<Cap>,
    /// The artifact kind this registration applies to.
    pub kind: Kind,
    /// The transport this registration applies to.
    pub method: Method,
    /// Priority; higher is tried first.
    pub priority: i32,
    seq: u64,
}

impl<Cap: ?Sized> Clone for Registration<Cap> {
    fn clone(&self) -> Self {
        Registration {
            capability: self.capability.clone(),
            kind: self.kind,
            method: self.method,
            priority: self.priority,
            seq: self.seq,
        }
    }
}

impl<Cap: ?Sized> Registration<Cap> {
    /// True if `capability` is the very same registered object (by pointer
    /// identity, not structural equality -- capabilities are trait objects
    /// and need not implement `PartialEq`).
    pub fn is(&self, capability: &Arc<Cap>) -> bool {
        Arc::ptr_eq(&self.capability, capability)
    }
}

/// A priority-ordered, thread-safe registry of capabilities of one kind
/// (checkers, or updaters).
pub struct Registry<Cap: ?Sized> {
    entries: Mutex<Vec<Registration<Cap>>>,
    next_seq: AtomicU64,
}

impl<Cap: ?Sized> Default for Registry<Cap> {
    fn default() -> Self {
        Registry { entries: Mutex::new(Vec::new()), next_seq: AtomicU64::new(0) }
    }
}

impl<Cap: ?Sized> Registry<Cap> {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `capability` for `(kind, method)` at `priority`.
    ///
    /// A re-registration of the same `(capability, kind, method)` triple
    /// (by pointer identity) replaces the priority of the existing entry
    /// instead of adding a duplicate.
    pub fn register(&self, capability: Arc<Cap>, kind: Kind, method: Method, priority: i32) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        if let Some(existing) = entries
            .iter_mut()
            .find(|r| r.is(&capability) && r.kind == kind && r.method == method)
        {
            existing.priority = priority;
        } else {
            let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
            entries.push(Registration { capability, kind, method, priority, seq });
        }
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    }

    /// Remove a registration by pointer identity. Returns true if a
    /// registration was found and removed.
    pub fn unregister(&self, capability: &Arc<Cap>, kind: Kind, method: Method) -> bool {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        let before = entries.len();
        entries.retain(|r| !(r.is(capability) && r.kind == kind && r.method == method));
        entries.len() != before
    }

    /// Return a priority-ordered snapshot of every registration matching
    /// `kind` (across all methods).
    pub fn for_kind(&self, kind: Kind) -> Vec<Registration<Cap>> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.iter().filter(|r| r.kind == kind).cloned().collect()
    }

    /// Return a priority-ordered snapshot of every registration matching
    /// `kind` and `method`.
    pub fn for_kind_and_method(&self, kind: Kind, method: Method) -> Vec<Registration<Cap>> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries
            .iter()
            .filter(|r| r.kind == kind && r.method == method)
            .cloned()
            .collect()
    }

    /// True if at least one capability is registered for `kind`.
    pub fn has_any(&self, kind: Kind) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.iter().any(|r| r.kind == kind)
    }

    /// True if at least one capability is registered for `kind` and
    /// `method`.
    pub fn has_any_for_method(&self, kind: Kind, method: Method) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.iter().any(|r| r.kind == kind && r.method == method)
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;

    #[test]
    fn priority_order_with_stable_ties() {
        let reg: Registry<&'static str> = Registry::new();
        let low = Arc::new("low");
        let high = Arc::new("high");
        let mid_first = Arc::new("mid-first");
        let mid_second = Arc::new("mid-second");

        reg.register(low.clone(), Kind::News, Method::Http, 0);
        reg.register(high.clone(), Kind::News, Method::Http, 100);
        reg.register(mid_first.clone(), Kind::News, Method::Http, 50);
        reg.register(mid_second.clone(), Kind::News, Method::Http, 50);

        let order: Vec<_> = reg
            .for_kind(Kind::News)
            .into_iter()
            .map(|r| *r.capability)
            .collect();
        assert_eq!(order, vec!["high", "mid-first", "mid-second", "low"]);
    }

    #[test]
    fn unregister_removes_by_identity() {
        let reg: Registry<&'static str> = Registry::new();
        let cap = Arc::new("cap");
        reg.register(cap.clone(), Kind::Plugin, Method::File, 0);
        assert!(reg.has_any(Kind::Plugin));
        assert!(reg.unregister(&cap, Kind::Plugin, Method::File));
        assert!(!reg.has_any(Kind::Plugin));
    }

    #[test]
    fn reregistration_updates_priority_without_duplicating() {
        let reg: Registry<&'static str> = Registry::new();
        let cap = Arc::new("cap");
        reg.register(cap.clone(), Kind::Plugin, Method::File, 0);
        reg.register(cap.clone(), Kind::Plugin, Method::File, 10);
        assert_eq!(reg.for_kind(Kind::Plugin).len(), 1);
        assert_eq!(reg.for_kind(Kind::Plugin)[0].priority, 10);
    }
}
