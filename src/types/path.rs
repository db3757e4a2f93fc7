use {
    crate::{error::Error, types::id::NodeId},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// A relative anchor component, resolved against a running "current path"
/// during normalization or matching.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Anchor {
    This,
    Parent,
    Root,
}

/// One component of a [`Path`] prior to normalization: either a literal id or
/// a relative anchor. A `Path` contains only these two kinds of component; a
/// pattern additionally allows predicates (see [`crate::types::pattern`]).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PathComponent {
    Id(NodeId),
    Anchor(Anchor),
}

/// A fully normalized, absolute sequence of node identifiers from the root
/// (exclusive) to the target (inclusive). The empty path denotes the root.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
pub struct Path(pub Vec<NodeId>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, id: NodeId) {
        self.0.push(id);
    }

    pub fn child(&self, id: NodeId) -> Self {
        let mut path = self.clone();
        path.push(id);
        path
    }

    pub fn last(&self) -> Option<&NodeId> {
        self.0.last()
    }

    /// The path one level up, or `None` if this is already the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Joined stringification, used by `if_path_matches` regexes.
    pub fn joined(&self) -> String {
        self.0
            .iter()
            .map(NodeId::stringify)
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.joined())
    }
}

impl From<Vec<NodeId>> for Path {
    fn from(ids: Vec<NodeId>) -> Self {
        Self(ids)
    }
}

/// Resolve a sequence of literal ids and relative anchors into an absolute
/// [`Path`], starting from an empty current path (i.e. the root), per §4.1:
/// `THIS` leaves the current path unchanged, `PARENT` drops the last element
/// (an error if already at the root), `ROOT` resets it to `[]`, and a literal
/// id appends.
pub fn normalize(components: &[PathComponent]) -> Result<Path, Error> {
    let mut current = Path::root();
    for component in components {
        match component {
            PathComponent::Id(id) => current.push(id.clone()),
            PathComponent::Anchor(Anchor::This) => {},
            PathComponent::Anchor(Anchor::Root) => current = Path::root(),
            PathComponent::Anchor(Anchor::Parent) => {
                current = current
                    .parent()
                    .ok_or_else(|| Error::InvalidPath("PARENT anchor above root".to_owned()))?;
            },
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::atom(s)
    }

    #[test]
    fn normalize_resolves_anchors_left_to_right() {
        let components = vec![
            PathComponent::Id(id("foo")),
            PathComponent::Id(id("bar")),
            PathComponent::Anchor(Anchor::Parent),
            PathComponent::Id(id("baz")),
        ];
        assert_eq!(normalize(&components).unwrap(), Path(vec![id("foo"), id("baz")]));
    }

    #[test]
    fn normalize_root_anchor_resets() {
        let components = vec![
            PathComponent::Id(id("foo")),
            PathComponent::Anchor(Anchor::Root),
            PathComponent::Id(id("bar")),
        ];
        assert_eq!(normalize(&components).unwrap(), Path(vec![id("bar")]));
    }

    #[test]
    fn normalize_parent_above_root_errors() {
        let components = vec![PathComponent::Anchor(Anchor::Parent)];
        assert!(normalize(&components).is_err());
    }

    #[test]
    fn joined_uses_slash_separator() {
        let path = Path(vec![id("foo"), id("bar")]);
        assert_eq!(path.joined(), "foo/bar");
    }
}
