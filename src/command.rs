//! The command interpreter (§4.4): translates `put`/`delete`/`get` commands
//! into matcher invocations and tree edits, updates version counters, and
//! triggers the keep-while cascade.

use {
    crate::{
        config::Config,
        error::{Error, ErrorKind},
        keepwhile::{delete_node, run_cascade, KeepWhileTable},
        matcher::{find_matching, MatchOptions, Projection, ResultMap},
        tree::{walk, walk_mut, Node},
        types::{
            path::{normalize, PathComponent},
            NodeId, Path, PatternComponent, Payload, Predicate,
        },
    },
    serde::{Deserialize, Serialize},
    std::collections::{BTreeMap, BTreeSet},
    tracing::debug,
};

/// A `put` command (§4.4). `keep_while` is registered under every path the
/// command ends up touching (created or updated).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PutCommand {
    pub pattern: Vec<PatternComponent>,
    /// `None` writes an absent (`none`) payload — still a write: it bumps
    /// `payload_version` like any other put (§3, §9 open question (b)).
    pub payload: Option<Payload>,
    #[serde(default)]
    pub keep_while: Option<BTreeMap<Path, Predicate>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteCommand {
    pub pattern: Vec<PatternComponent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetCommand {
    pub pattern: Vec<PatternComponent>,
    #[serde(default)]
    pub options: MatchOptions,
}

/// The tagged command envelope delivered by the replication engine (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Command {
    Put(PutCommand),
    Delete(DeleteCommand),
    Get(GetCommand),
}

/// `put`'s reply entry: `None` means the path was created by this command
/// (empty prior projection, §4.4 step 4); `Some` carries the projection as
/// it was immediately before the write.
pub type PutReply = BTreeMap<Path, Option<Projection>>;
pub type DeleteReply = BTreeMap<Path, Projection>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CommandOutcome {
    Put(PutReply),
    Delete(DeleteReply),
    Get(ResultMap),
}

/// The reply envelope (§6): `{ok, result_map}` or `{error, kind, detail}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Reply {
    Ok(CommandOutcome),
    Err { kind: ErrorKind, detail: String },
}

impl From<Error> for Reply {
    fn from(error: Error) -> Self {
        Reply::Err { kind: error.kind(), detail: error.to_string() }
    }
}

/// If `pattern` contains no predicate-like component (only literal ids and
/// anchors), resolve it eagerly into an absolute [`Path`] — this is the
/// "pattern has no predicates and resolves to exactly one path" condition
/// from §4.4 that makes a `put` eligible to create nodes. Returns `None` for
/// a genuine query pattern (one with at least one predicate component).
pub fn resolve_literal_path(pattern: &[PatternComponent]) -> Result<Option<Path>, Error> {
    let mut components = Vec::with_capacity(pattern.len());
    for component in pattern {
        components.push(match component {
            PatternComponent::Id(id) => PathComponent::Id(id.clone()),
            PatternComponent::Anchor(anchor) => PathComponent::Anchor(*anchor),
            PatternComponent::Predicate(_) | PatternComponent::PathMatches(_) => return Ok(None),
        });
    }
    Ok(Some(normalize(&components)?))
}

/// Walk `path` from `root`, creating intermediaries (no payload, counters at
/// 1) as needed, and set `payload` at the leaf (§4.4 step 4). Returns the
/// set of paths dirtied: every ancestor whose child list changed, plus the
/// leaf itself.
fn create_path(root: &mut Node, path: &Path, payload: Option<Payload>) -> BTreeSet<Path> {
    let mut dirty = BTreeSet::new();

    if path.is_empty() {
        root.write_payload(payload);
        dirty.insert(Path::root());
        return dirty;
    }

    let mut current = root;
    let mut current_path = Path::root();
    for id in path.as_slice() {
        if current.get_child(id).is_none() {
            current.set_child(id.clone(), Node::empty());
            dirty.insert(current_path.clone());
        }
        current_path.push(id.clone());
        current = current.get_child_mut(id).expect("child was just created or already existed");
    }
    current.write_payload(payload);
    dirty.insert(current_path);
    dirty
}

fn put(root: &mut Node, table: &mut KeepWhileTable, cmd: &PutCommand, command_seq: u64, config: &Config) -> Result<(PutReply, BTreeSet<Path>), Error> {
    let options = MatchOptions::default();
    let matches = find_matching(root, &cmd.pattern, &options)?;
    if matches.len() > config.max_result_map_size {
        return Err(Error::ResourceLimit(format!("match exceeded {} entries", config.max_result_map_size)));
    }

    let literal_path = resolve_literal_path(&cmd.pattern)?;

    let mut reply = PutReply::new();
    let mut dirty = BTreeSet::new();
    let mut targets = Vec::new();
    let created = literal_path.is_some() && matches.is_empty();

    if matches.is_empty() {
        if let Some(path) = literal_path {
            dirty.extend(create_path(root, &path, cmd.payload.clone()));
            reply.insert(path.clone(), None);
            targets.push(path);
        }
        // A predicate-bearing pattern with zero matches is a no-op query:
        // it must not fabricate nodes (§4.4 rationale).
    } else {
        for path in matches.keys() {
            let node = walk_mut(root, path).expect("matched path must exist");
            let prior = Projection::of(node, options.include_child_names);
            node.write_payload(cmd.payload.clone());
            dirty.insert(path.clone());
            reply.insert(path.clone(), Some(prior));
            targets.push(path.clone());
        }
    }

    if let Some(predicates) = &cmd.keep_while {
        for path in &targets {
            table.register(path.clone(), predicates.clone(), command_seq);
        }
    }

    debug!(matched = reply.len(), created, "put");

    Ok((reply, dirty))
}

fn delete(
    root: &mut Node,
    table: &mut KeepWhileTable,
    cmd: &DeleteCommand,
    config: &Config,
) -> Result<(DeleteReply, BTreeSet<Path>), Error> {
    let options = MatchOptions::default();
    let matches = find_matching(root, &cmd.pattern, &options)?;
    if matches.len() > config.max_result_map_size {
        return Err(Error::ResourceLimit(format!("match exceeded {} entries", config.max_result_map_size)));
    }

    let mut reply = DeleteReply::new();
    let mut dirty = BTreeSet::new();

    for path in matches.keys() {
        // A node may already be gone if an ancestor matched earlier in this
        // same batch (processed in the lexicographic order `BTreeMap`
        // iteration already gives us, per §4.4 step 2).
        let Some(node) = walk(root, path) else {
            continue;
        };
        let prior = Projection::of(node, options.include_child_names);
        let removed = delete_node(root, path);
        if removed.is_empty() {
            continue;
        }
        table.remove(path);
        reply.insert(path.clone(), prior);
        dirty.extend(removed);
    }

    debug!(deleted = reply.len(), "delete");

    Ok((reply, dirty))
}

fn get(root: &Node, cmd: &GetCommand, config: &Config) -> Result<ResultMap, Error> {
    let result = find_matching(root, &cmd.pattern, &cmd.options)?;
    if result.len() > config.max_result_map_size {
        return Err(Error::ResourceLimit(format!("result map exceeded {} entries", config.max_result_map_size)));
    }
    Ok(result)
}

/// Execute one command against the tree, running the keep-while cascade for
/// mutating commands. `command_seq` is a monotonically increasing counter
/// bumped by the caller ([`crate::state::State`]) for every `put`/`delete`
/// (not for `get`, which must leave state untouched — §4.6, I5).
pub fn execute(
    root: &mut Node,
    table: &mut KeepWhileTable,
    command: &Command,
    command_seq: u64,
    config: &Config,
) -> Reply {
    let outcome = match command {
        Command::Put(cmd) => put(root, table, cmd, command_seq, config).map(|(reply, dirty)| {
            (CommandOutcome::Put(reply), Some(dirty))
        }),
        Command::Delete(cmd) => delete(root, table, cmd, config).map(|(reply, dirty)| {
            (CommandOutcome::Delete(reply), Some(dirty))
        }),
        Command::Get(cmd) => get(root, cmd, config).map(|result| (CommandOutcome::Get(result), None)),
    };

    match outcome {
        Ok((outcome, Some(dirty))) => {
            match run_cascade(root, table, dirty, command_seq, config.max_cascade_iterations) {
                Ok(_deleted) => Reply::Ok(outcome),
                Err(error) => error.into(),
            }
        },
        Ok((outcome, None)) => Reply::Ok(outcome),
        Err(error) => error.into(),
    }
}
