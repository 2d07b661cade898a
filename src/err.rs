//! Declare an error type for the update-coordinator crate.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

use crate::ids::ArtifactId;

/// An error produced by the coordinator's own API calls.
///
/// Errors produced by plugged-in `Checker`/`Updater` implementations are
/// not represented here; those are reported out-of-band through the
/// [`Notifier`](crate::notify::Notifier), since a check or update runs as
/// a detached background task rather than something the caller awaits.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The caller asked to check or update an artifact no checker/updater
    /// is registered for.
    #[error("No checker registered for {0}")]
    NoCheckerRegistered(ArtifactId),

    /// Same as [`Error::NoCheckerRegistered`], but for updates.
    #[error("No updater registered for {0} via any method")]
    NoUpdaterRegistered(ArtifactId),

    /// A check or update was requested for an artifact that already has
    /// one in progress.
    #[error("Check or update already in progress for {0}")]
    AlreadyInProgress(ArtifactId),

    /// `update` was called for an identity with no `AvailableVersion` on
    /// record to drive the download from.
    #[error("No update available to install for {0}")]
    NoUpdateAvailable(ArtifactId),

    /// An internal invariant was violated; this always indicates a bug in
    /// this crate rather than in a caller or a plugged-in checker/updater.
    #[error("Internal error: {0}")]
    Bug(#[from] tor_error::Bug),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        use Error as E;
        use ErrorKind as EK;
        match self {
            E::NoCheckerRegistered(_) | E::NoUpdaterRegistered(_) => EK::NotImplemented,
            E::AlreadyInProgress(_) => EK::BadApiUsage,
            E::NoUpdateAvailable(_) => EK::BadApiUsage,
            E::Bug(e) => e.kind(),
        }
    }
}

/// Convenience alias for this crate's fallible results.
pub type Result<T> = std::result::Result<T, Error>;
