use serde::{Deserialize, Serialize};

/// Error surface for the whole crate (§7). Every variant here is returned as
/// part of a reply, never raised out of band — except the two snapshot
/// variants, which are fatal to the instance and must be surfaced to the
/// replication engine (§7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no path matched the pattern")]
    NoMatchingNodes,

    #[error("pattern matched more than one node")]
    ManyMatchingNodes,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid regex in pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("snapshot is corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// The wire-level counterpart of [`Error`] (§6, §7): the reply envelope's
/// `kind` field. Kept as a separate, `Copy`, serializable type so that the
/// in-process `Result<T, Error>` and the replicated reply share one source
/// of truth without forcing `Error` itself (which wraps a non-`Clone`
/// `regex::Error`) to be serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub enum ErrorKind {
    NoMatchingNodes,
    ManyMatchingNodes,
    InvalidPath,
    InvalidPattern,
    ResourceLimit,
    CorruptSnapshot,
    UnsupportedVersion,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMatchingNodes => ErrorKind::NoMatchingNodes,
            Self::ManyMatchingNodes => ErrorKind::ManyMatchingNodes,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::InvalidPattern(_) | Self::InvalidRegex(_) => ErrorKind::InvalidPattern,
            Self::ResourceLimit(_) => ErrorKind::ResourceLimit,
            Self::CorruptSnapshot(_) => ErrorKind::CorruptSnapshot,
            Self::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, Error>;
