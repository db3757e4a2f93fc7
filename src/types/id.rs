use {
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// A single node identifier: either an interned atom (compared and displayed
/// as a string) or an opaque binary blob (compared bytewise). The root has no
/// identifier of its own.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Atom(String),
    Binary(Vec<u8>),
}

impl NodeId {
    pub fn atom(s: impl Into<String>) -> Self {
        Self::Atom(s.into())
    }

    pub fn binary(b: impl Into<Vec<u8>>) -> Self {
        Self::Binary(b.into())
    }

    /// Stringified form used by `if_name_matches` and `if_path_matches`.
    /// Atoms stringify to themselves; binaries stringify to their lowercase
    /// hex encoding, so that the regex predicates have a stable textual
    /// surface regardless of id kind.
    pub fn stringify(&self) -> String {
        match self {
            Self::Atom(s) => s.clone(),
            Self::Binary(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
        }
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::Atom(s.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self::Atom(s)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(s) => write!(f, "{s}"),
            Self::Binary(_) => write!(f, "0x{}", self.stringify()),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}
