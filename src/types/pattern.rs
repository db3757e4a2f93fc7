use {
    crate::{
        error::Error,
        tree::Node,
        types::{
            id::NodeId,
            path::Anchor,
        },
    },
    regex::Regex,
    serde::{Deserialize, Serialize},
};

/// The counter a `Operand` comparison is evaluated against.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn apply(self, lhs: u64, rhs: u64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    pub op: CmpOp,
    pub n: u64,
}

/// `if_name_matches`: `Any` is equivalent to the regex `.*`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum NameMatch {
    Any,
    Regex(String),
}

/// `if_path_matches`: matches a segment of zero or more components whose
/// joined stringification matches the regex; `Any` means "any descendant
/// tail".
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PathMatch {
    Any,
    Regex(String),
}

/// A single-component predicate: a pure function of `(current id, current
/// node)`. `if_path_matches` is not a `Predicate` — it spans zero or more
/// components and is handled directly by the matcher as its own
/// `PatternComponent` variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Literal(NodeId),
    NameMatches(NameMatch),
    DataMatches(serde_json::Value),
    ChildListCount(Operand),
    ChildListVersion(Operand),
    PayloadVersion(Operand),
    NodeExists(bool),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

/// One component of a pattern: anything a [`crate::types::path::PathComponent`]
/// can be, plus single-component predicates and the recursive
/// `if_path_matches` form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PatternComponent {
    Id(NodeId),
    Anchor(Anchor),
    Predicate(Predicate),
    PathMatches(PathMatch),
}

fn compile(regex: &str) -> Result<Regex, Error> {
    Regex::new(regex).map_err(Error::from)
}

fn name_matches(m: &NameMatch, id: &NodeId) -> Result<bool, Error> {
    match m {
        NameMatch::Any => Ok(true),
        NameMatch::Regex(pattern) => Ok(compile(pattern)?.is_match(&id.stringify())),
    }
}

pub(crate) fn path_match_matches(m: &PathMatch, segment: &str) -> Result<bool, Error> {
    match m {
        PathMatch::Any => Ok(true),
        PathMatch::Regex(pattern) => Ok(compile(pattern)?.is_match(segment)),
    }
}

/// `'_'` is the host pattern language's wildcard; it matches anything at
/// that position. Objects match structurally: every key present in `pattern`
/// must be present in `value` and match recursively (extra keys in `value`
/// are ignored). Arrays must match length-for-length. Everything else is
/// compared by equality.
pub fn data_matches(value: &serde_json::Value, pattern: &serde_json::Value) -> bool {
    use serde_json::Value;

    if let Value::String(s) = pattern {
        if s == "_" {
            return true;
        }
    }

    match (value, pattern) {
        (Value::Object(v), Value::Object(p)) => p
            .iter()
            .all(|(k, pv)| v.get(k).is_some_and(|vv| data_matches(vv, pv))),
        (Value::Array(v), Value::Array(p)) => {
            v.len() == p.len() && v.iter().zip(p).all(|(vv, pv)| data_matches(vv, pv))
        },
        _ => value == pattern,
    }
}

/// Evaluate a single-component predicate against `(id, node)`, where `node`
/// is `None` if the node does not exist (only possible when called from the
/// keep-while cascade against a watched path; the matcher only ever calls
/// this against children it has already confirmed exist).
pub fn eval_predicate(predicate: &Predicate, id: &NodeId, node: Option<&Node>) -> Result<bool, Error> {
    match predicate {
        Predicate::Literal(expected) => Ok(id == expected),
        Predicate::NameMatches(m) => name_matches(m, id),
        Predicate::DataMatches(pattern) => Ok(node.is_some_and(|node| {
            node.payload
                .as_ref()
                .and_then(|payload| serde_json::from_slice::<serde_json::Value>(payload.as_bytes()).ok())
                .is_some_and(|value| data_matches(&value, pattern))
        })),
        Predicate::ChildListCount(operand) => {
            Ok(node.is_some_and(|node| operand.op.apply(node.child_list_count, operand.n)))
        },
        Predicate::ChildListVersion(operand) => {
            Ok(node.is_some_and(|node| operand.op.apply(node.child_list_version, operand.n)))
        },
        Predicate::PayloadVersion(operand) => {
            Ok(node.is_some_and(|node| operand.op.apply(node.payload_version, operand.n)))
        },
        Predicate::NodeExists(expected) => Ok(node.is_some() == *expected),
        Predicate::All(conditions) => {
            for condition in conditions {
                if !eval_predicate(condition, id, node)? {
                    return Ok(false);
                }
            }
            Ok(true)
        },
        Predicate::Any(conditions) => {
            for condition in conditions {
                if eval_predicate(condition, id, node)? {
                    return Ok(true);
                }
            }
            Ok(false)
        },
    }
}

/// Lenient variant used by the keep-while cascade (§4.5): a malformed
/// predicate (e.g. an unparsable regex) fails evaluation as `false` rather
/// than surfacing an error — cascade has no error channel.
pub fn eval_predicate_lenient(predicate: &Predicate, id: &NodeId, node: Option<&Node>) -> bool {
    eval_predicate(predicate, id, node).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::payload::Payload;

    fn leaf(payload: serde_json::Value) -> Node {
        let mut node = Node::empty();
        node.write_payload(Some(Payload::data(serde_json::to_vec(&payload).unwrap())));
        node
    }

    #[test]
    fn data_matches_wildcard() {
        let pattern = serde_json::json!({"a": "_", "b": 1});
        assert!(data_matches(&serde_json::json!({"a": "anything", "b": 1}), &pattern));
        assert!(!data_matches(&serde_json::json!({"a": "anything", "b": 2}), &pattern));
    }

    #[test]
    fn node_exists_predicate() {
        let id = NodeId::atom("x");
        assert!(eval_predicate(&Predicate::NodeExists(true), &id, Some(&Node::empty())).unwrap());
        assert!(!eval_predicate(&Predicate::NodeExists(true), &id, None).unwrap());
        assert!(eval_predicate(&Predicate::NodeExists(false), &id, None).unwrap());
    }

    #[test]
    fn counter_predicate_compares_operand() {
        let id = NodeId::atom("x");
        let node = leaf(serde_json::json!(1));
        let operand = Operand { op: CmpOp::Ge, n: 1 };
        assert!(eval_predicate(&Predicate::PayloadVersion(operand), &id, Some(&node)).unwrap());
    }

    #[test]
    fn all_and_any_short_circuit() {
        let id = NodeId::atom("x");
        let node = Node::empty();
        let all_true = Predicate::All(vec![Predicate::NodeExists(true), Predicate::NodeExists(true)]);
        assert!(eval_predicate(&all_true, &id, Some(&node)).unwrap());

        let any_false = Predicate::Any(vec![Predicate::NodeExists(false), Predicate::NodeExists(false)]);
        assert!(!eval_predicate(&any_false, &id, Some(&node)).unwrap());
    }

    #[test]
    fn lenient_eval_swallows_bad_regex() {
        let id = NodeId::atom("x");
        let bad = Predicate::NameMatches(NameMatch::Regex("(".to_owned()));
        assert!(!eval_predicate_lenient(&bad, &id, Some(&Node::empty())));
        assert!(eval_predicate(&bad, &id, Some(&Node::empty())).is_err());
    }
}
