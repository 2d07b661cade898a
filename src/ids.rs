//! Artifact identity: the `(Kind, Id)` pair that keys every map and table
//! in this crate, plus the `Method` enum used to pick a transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of artifact an [`ArtifactId`] refers to.
///
/// `Id` is meaningless for every variant except [`Kind::Plugin`]; the
/// singleton kinds always pair with an empty id.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[non_exhaustive]
pub enum Kind {
    /// The news feed.
    News,
    /// The signed router binary/package.
    RouterSigned,
    /// An unsigned drop-in router archive.
    RouterUnsigned,
    /// A named plugin.
    Plugin,
    /// Internal-only kind used to exercise the coordinator without touching
    /// real transports.
    Dummy,
}

impl Kind {
    /// Return true for the two router kinds, which mutually supersede each
    /// other in the `downloaded` map (see the state store invariants).
    pub fn is_router(self) -> bool {
        matches!(self, Kind::RouterSigned | Kind::RouterUnsigned)
    }
}

/// A transport mechanism used to fetch an artifact.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[non_exhaustive]
pub enum Method {
    /// Plain HTTP, routed however the host normally routes HTTP.
    Http,
    /// HTTPS, explicitly over the clearnet (bypassing any overlay network).
    HttpsClearnet,
    /// HTTP, explicitly over the clearnet.
    HttpClearnet,
    /// BitTorrent.
    Torrent,
    /// A local file move/copy.
    File,
    /// Internal-only method paired with [`Kind::Dummy`].
    Dummy,
}

/// The identity of a single artifact: what kind it is, and (for kinds that
/// have more than one instance) which one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId {
    /// The artifact kind.
    pub kind: Kind,
    /// Empty for singleton kinds; the plugin name for [`Kind::Plugin`].
    pub id: String,
}

impl ArtifactId {
    /// Build an id for one of the singleton kinds.
    pub fn singleton(kind: Kind) -> Self {
        debug_assert!(!matches!(kind, Kind::Plugin), "Plugin is not a singleton kind");
        ArtifactId { kind, id: String::new() }
    }

    /// Build a plugin id.
    pub fn plugin(name: impl Into<String>) -> Self {
        ArtifactId { kind: Kind::Plugin, id: name.into() }
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}:{}", self.kind, self.id)
        }
    }
}
