//! The three-map state store: `installed`, `downloaded`, and `available`.
//!
//! There are three (active) states an artifact can occupy, much like the
//! `tor-dirmgr` documents each track whether they're consensus-only,
//! fetched, or usable. Transitions here are simpler -- there's no
//! multi-stage document graph -- but the same rule applies: never move
//! backwards, and always take the critical section per artifact id so
//! concurrent checkers/updaters can't race each other's writes.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ids::ArtifactId;
use crate::version::{AvailableVersion, Version};

/// What happened when a new [`AvailableVersion`] was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// The reported version was older than one already on record;
    /// nothing changed.
    Stale,
    /// The reported version matched the one on record; new sources (if
    /// any) were merged in.
    SourcesMerged,
    /// The reported version was newer than anything on record; it is now
    /// the new `available` entry.
    NewVersion,
}

/// What happened when a downloaded artifact was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The downloaded version was not newer than what's already recorded
    /// as downloaded (after accounting for router signed/unsigned mutual
    /// supersession); nothing changed.
    Stale,
    /// The downloaded version is now on record as the best downloaded
    /// version for this identity (or, for router kinds, for the router
    /// slot as a whole).
    Recorded,
}

/// The coordinator's three-tier version bookkeeping.
///
/// # Invariants
///
/// * `installed` only ever advances to strictly newer versions.
/// * `downloaded` only ever advances to strictly newer versions, except
///   that a [`Kind::RouterSigned`](crate::ids::Kind::RouterSigned) entry
///   and a [`Kind::RouterUnsigned`](crate::ids::Kind::RouterUnsigned)
///   entry mutually supersede each other: whichever was recorded more
///   recently wins regardless of kind, since they occupy the same
///   install slot.
/// * `available` entries for the same version accumulate sources
///   instead of being replaced.
#[derive(Default)]
pub struct StateStore {
    installed: Mutex<HashMap<ArtifactId, Version>>,
    downloaded: Mutex<HashMap<ArtifactId, Version>>,
    /// The `(kind, id)` that currently holds the router download slot,
    /// used to implement signed/unsigned mutual supersession: whichever
    /// of the two kinds was downloaded most recently occupies this slot,
    /// and the losing kind's `downloaded` entry is cleared.
    router_slot: Mutex<Option<ArtifactId>>,
    available: Mutex<HashMap<ArtifactId, AvailableVersion>>,
}

impl StateStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the `installed` map at bootstrap. Does not enforce
    /// monotonicity, since there is nothing to be monotonic against yet.
    pub fn seed_installed(&self, id: ArtifactId, version: Version) {
        self.installed.lock().expect("poisoned").insert(id, version);
    }

    /// The best version known to be installed, if any.
    pub fn installed(&self, id: &ArtifactId) -> Option<Version> {
        self.installed.lock().expect("poisoned").get(id).cloned()
    }

    /// The best version known to be downloaded, if any.
    pub fn downloaded(&self, id: &ArtifactId) -> Option<Version> {
        self.downloaded.lock().expect("poisoned").get(id).cloned()
    }

    /// The newer of `installed(id)` and `downloaded(id)`, used as the
    /// baseline a checker compares candidate versions against.
    pub fn best_known(&self, id: &ArtifactId) -> Option<Version> {
        match (self.installed(id), self.downloaded(id)) {
            (Some(a), Some(b)) => Some(if a >= b { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    /// The current `available` record, if any.
    pub fn available(&self, id: &ArtifactId) -> Option<AvailableVersion> {
        self.available.lock().expect("poisoned").get(id).cloned()
    }

    /// Record that `version` was installed for `id`, replacing whatever
    /// was there (installs always happen after a successful download, so
    /// there's no separate "only if newer" guard -- the download step
    /// already enforced that).
    ///
    /// Also drops the now-dominated `downloaded`/`available` entries for
    /// `id`, if any, so a higher-level map never lags behind a map it
    /// supersedes (the reverse would make `getUpdateDownloaded` keep
    /// reporting a pending download that has already been installed).
    pub fn record_installed(&self, id: ArtifactId, version: Version) {
        self.installed.lock().expect("poisoned").insert(id.clone(), version.clone());

        let mut downloaded = self.downloaded.lock().expect("poisoned");
        if matches!(downloaded.get(&id), Some(d) if *d <= version) {
            downloaded.remove(&id);
        }
        drop(downloaded);

        let mut available = self.available.lock().expect("poisoned");
        if matches!(available.get(&id), Some(a) if a.version <= version) {
            available.remove(&id);
        }
    }

    /// Record a newly announced available version. See [`AnnounceOutcome`]
    /// for what can happen.
    ///
    /// Rejects (as [`AnnounceOutcome::Stale`]) a candidate that is not
    /// newer than whatever is already recorded as `installed` or
    /// `downloaded` for `id` -- a checker reporting a version the
    /// coordinator already has in hand must never resurrect it into
    /// `available`.
    pub fn announce(&self, id: ArtifactId, candidate: AvailableVersion) -> AnnounceOutcome {
        if matches!(self.installed(&id), Some(v) if v >= candidate.version) {
            return AnnounceOutcome::Stale;
        }
        if matches!(self.downloaded(&id), Some(v) if v >= candidate.version) {
            return AnnounceOutcome::Stale;
        }

        let mut available = self.available.lock().expect("poisoned");
        match available.get_mut(&id) {
            Some(existing) if existing.version == candidate.version => {
                existing.merge_sources(&candidate);
                AnnounceOutcome::SourcesMerged
            }
            Some(existing) if existing.version > candidate.version => AnnounceOutcome::Stale,
            _ => {
                available.insert(id, candidate);
                AnnounceOutcome::NewVersion
            }
        }
    }

    /// Clear any `available` record for `id`, e.g. once it has been
    /// downloaded.
    pub fn clear_available(&self, id: &ArtifactId) {
        self.available.lock().expect("poisoned").remove(id);
    }

    /// Record that `version` of `id` was downloaded.
    ///
    /// For router kinds, this also evicts whichever sibling router kind
    /// previously held the download slot, implementing mutual
    /// supersession between signed and unsigned router archives.
    pub fn record_downloaded(&self, id: ArtifactId, version: Version) -> DownloadOutcome {
        if id.kind.is_router() {
            return self.record_router_downloaded(id, version);
        }
        let mut downloaded = self.downloaded.lock().expect("poisoned");
        match downloaded.get(&id) {
            Some(existing) if *existing >= version => DownloadOutcome::Stale,
            _ => {
                downloaded.insert(id, version);
                DownloadOutcome::Recorded
            }
        }
    }

    fn record_router_downloaded(&self, id: ArtifactId, version: Version) -> DownloadOutcome {
        let mut slot = self.router_slot.lock().expect("poisoned");
        let mut downloaded = self.downloaded.lock().expect("poisoned");

        if let Some(incumbent) = slot.as_ref() {
            if incumbent != &id {
                // Different kind already occupies the slot: the newcomer
                // always supersedes it, since the two kinds aren't
                // comparable versions of the same artifact, they're
                // alternate ways of getting the same upgrade.
                downloaded.remove(incumbent);
                downloaded.insert(id.clone(), version);
                *slot = Some(id);
                return DownloadOutcome::Recorded;
            }
        }

        match downloaded.get(&id) {
            Some(existing) if *existing >= version => DownloadOutcome::Stale,
            _ => {
                downloaded.insert(id.clone(), version);
                *slot = Some(id);
                DownloadOutcome::Recorded
            }
        }
    }
}
