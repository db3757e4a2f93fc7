//! The matcher (§4.3): evaluates a pattern against the tree, producing a
//! result map from absolute path to node projection. Used both for `get`
//! queries and as the read-only pre-pass of every `put`/`delete`.

use {
    crate::{
        error::Error,
        tree::{walk, Node},
        types::{
            id::NodeId,
            path::{Anchor, Path},
            pattern::{eval_predicate, path_match_matches, PatternComponent},
            payload::Payload,
        },
    },
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// The subset of node fields the matcher returns for a matched path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub payload_version: u64,
    pub child_list_version: u64,
    pub child_list_count: u64,
    pub data: Option<Vec<u8>>,
    pub child_names: Option<Vec<NodeId>>,
}

impl Projection {
    pub fn of(node: &Node, include_child_names: bool) -> Self {
        Self {
            payload_version: node.payload_version,
            child_list_version: node.child_list_version,
            child_list_count: node.child_list_count,
            data: node.payload.as_ref().map(Payload::as_bytes).map(<[u8]>::to_vec),
            child_names: include_child_names.then(|| node.children.names()),
        }
    }
}

/// Options controlling a [`find_matching`] call. Unknown options must be
/// ignored by implementations replaying an older command stream (§4.3,
/// forward-compat note) — in this crate that simply means new fields get
/// `#[serde(default)]`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MatchOptions {
    #[serde(default)]
    pub include_child_names: bool,
    #[serde(default)]
    pub expect_specific_node: bool,
}

/// Ordered (by path) mapping from absolute path to projection. A `BTreeMap`
/// gives deterministic iteration order for free, and is also the order
/// `delete` processes matches in (§4.4).
pub type ResultMap = BTreeMap<Path, Projection>;

pub fn find_matching(root: &Node, pattern: &[PatternComponent], options: &MatchOptions) -> Result<ResultMap, Error> {
    let mut result = ResultMap::new();
    match_component(root, root, &Path::root(), pattern, options, &mut result)?;

    if options.expect_specific_node {
        match result.len() {
            0 => return Err(Error::NoMatchingNodes),
            1 => {},
            _ => return Err(Error::ManyMatchingNodes),
        }
    }

    Ok(result)
}

fn match_component(
    tree_root: &Node,
    current: &Node,
    current_path: &Path,
    pattern: &[PatternComponent],
    options: &MatchOptions,
    result: &mut ResultMap,
) -> Result<(), Error> {
    let Some((head, tail)) = pattern.split_first() else {
        result
            .entry(current_path.clone())
            .or_insert_with(|| Projection::of(current, options.include_child_names));
        return Ok(());
    };

    match head {
        PatternComponent::Anchor(Anchor::This) => {
            match_component(tree_root, current, current_path, tail, options, result)
        },
        PatternComponent::Anchor(Anchor::Parent) => {
            let Some(parent_path) = current_path.parent() else {
                // PARENT above root: this branch simply fails to match.
                return Ok(());
            };
            let parent_node = walk(tree_root, &parent_path)
                .expect("a node's parent along an already-walked path always exists");
            match_component(tree_root, parent_node, &parent_path, tail, options, result)
        },
        PatternComponent::Anchor(Anchor::Root) => {
            match_component(tree_root, tree_root, &Path::root(), tail, options, result)
        },
        PatternComponent::Id(id) => {
            let Some(child) = current.get_child(id) else {
                return Ok(());
            };
            match_component(tree_root, child, &current_path.child(id.clone()), tail, options, result)
        },
        PatternComponent::Predicate(predicate) => {
            for (id, child) in current.children.iter() {
                if eval_predicate(predicate, id, Some(child))? {
                    match_component(
                        tree_root,
                        child,
                        &current_path.child(id.clone()),
                        tail,
                        options,
                        result,
                    )?;
                }
            }
            Ok(())
        },
        PatternComponent::PathMatches(path_match) => {
            match_path_matches(tree_root, current, current_path, path_match, tail, "", options, result)
        },
    }
}

/// Expand `if_path_matches` (§4.3): at each step, either stop consuming (and
/// check the regex against the segment consumed so far before continuing
/// with `tail`), or consume one more component from any child and recurse,
/// still in head position (Kleene-star). Segments are joined the same way
/// [`Path::joined`] joins full paths.
#[allow(clippy::too_many_arguments)]
fn match_path_matches(
    tree_root: &Node,
    current: &Node,
    current_path: &Path,
    path_match: &crate::types::pattern::PathMatch,
    tail: &[PatternComponent],
    segment: &str,
    options: &MatchOptions,
    result: &mut ResultMap,
) -> Result<(), Error> {
    if path_match_matches(path_match, segment)? {
        match_component(tree_root, current, current_path, tail, options, result)?;
    }

    for (id, child) in current.children.iter() {
        let next_segment = if segment.is_empty() {
            id.stringify()
        } else {
            format!("{segment}/{}", id.stringify())
        };
        match_path_matches(
            tree_root,
            child,
            &current_path.child(id.clone()),
            path_match,
            tail,
            &next_segment,
            options,
            result,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::pattern::PathMatch;

    fn id(s: &str) -> NodeId {
        NodeId::atom(s)
    }

    fn put_leaf(root: &mut Node, path: &[&str], value: &str) {
        let mut current = root;
        for (i, part) in path.iter().enumerate() {
            let part_id = id(part);
            if current.get_child(&part_id).is_none() {
                current.set_child(part_id.clone(), Node::empty());
            }
            current = current.get_child_mut(&part_id).unwrap();
            if i == path.len() - 1 {
                current.write_payload(Some(Payload::data(value.as_bytes().to_vec())));
            }
        }
    }

    #[test]
    fn empty_store_matches_nothing() {
        let root = Node::empty();
        let result = find_matching(&root, &[PatternComponent::Id(id("foo"))], &MatchOptions::default()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn seed_scenario_2_intermediary_projection() {
        let mut root = Node::empty();
        put_leaf(&mut root, &["foo", "bar"], "value");

        let result = find_matching(&root, &[PatternComponent::Id(id("foo"))], &MatchOptions::default()).unwrap();
        let projection = &result[&Path::from(vec![id("foo")])];
        assert_eq!(projection.payload_version, 1);
        assert_eq!(projection.child_list_version, 1);
        assert_eq!(projection.child_list_count, 1);
        assert!(projection.data.is_none());
    }

    #[test]
    fn seed_scenario_4_child_names_in_insertion_order() {
        let mut root = Node::empty();
        put_leaf(&mut root, &["foo", "bar"], "bar_value");
        put_leaf(&mut root, &["foo", "quux"], "quux_value");

        let options = MatchOptions { include_child_names: true, ..Default::default() };
        let result = find_matching(&root, &[PatternComponent::Id(id("foo"))], &options).unwrap();
        let projection = &result[&Path::from(vec![id("foo")])];
        assert_eq!(projection.child_list_count, 2);
        assert_eq!(projection.child_list_version, 2);
        assert_eq!(projection.child_names, Some(vec![id("bar"), id("quux")]));
    }

    #[test]
    fn seed_scenario_5_path_matches_any_then_name_matches() {
        let mut root = Node::empty();
        put_leaf(&mut root, &["foo", "bar"], "bar_value");
        put_leaf(&mut root, &["foo", "youpi"], "youpi_value");
        put_leaf(&mut root, &["baz"], "baz_value");
        put_leaf(&mut root, &["baz", "pouet"], "pouet_value");

        let pattern = vec![
            PatternComponent::PathMatches(PathMatch::Any),
            PatternComponent::Predicate(crate::types::pattern::Predicate::NameMatches(
                crate::types::pattern::NameMatch::Regex("o".to_owned()),
            )),
        ];
        let result = find_matching(&root, &pattern, &MatchOptions::default()).unwrap();

        let expected: std::collections::BTreeSet<_> = [
            Path::from(vec![id("foo"), id("youpi")]),
            Path::from(vec![id("baz"), id("pouet")]),
        ]
        .into_iter()
        .collect();
        let actual: std::collections::BTreeSet<_> = result.keys().cloned().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn expect_specific_node_errors_on_zero_or_many() {
        let mut root = Node::empty();
        put_leaf(&mut root, &["foo"], "v");

        let options = MatchOptions { expect_specific_node: true, ..Default::default() };
        assert!(find_matching(&root, &[PatternComponent::Id(id("missing"))], &options).is_err());

        put_leaf(&mut root, &["foo2"], "v2");
        let predicate = PatternComponent::Predicate(crate::types::pattern::Predicate::NameMatches(
            crate::types::pattern::NameMatch::Any,
        ));
        assert!(find_matching(&root, &[predicate], &options).is_err());
    }

    #[test]
    fn a_node_is_emitted_at_most_once() {
        let mut root = Node::empty();
        put_leaf(&mut root, &["foo"], "v");

        // Two independent branches of `if_any` both land on the same child.
        let predicate = crate::types::pattern::Predicate::Any(vec![
            crate::types::pattern::Predicate::Literal(id("foo")),
            crate::types::pattern::Predicate::NameMatches(crate::types::pattern::NameMatch::Any),
        ]);
        let result =
            find_matching(&root, &[PatternComponent::Predicate(predicate)], &MatchOptions::default()).unwrap();
        assert_eq!(result.len(), 1);
    }
}
