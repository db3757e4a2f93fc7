//! The keep-while graph and cascade (§3, §4.5): a watcher exists only while,
//! for every entry in its map, the watched node exists and satisfies its
//! predicate. Re-evaluated to a fixpoint after every mutation.

use {
    crate::{
        error::Error,
        tree::{walk, walk_mut, Node},
        types::{
            path::Path,
            pattern::{eval_predicate_lenient, Predicate},
        },
    },
    serde::{Deserialize, Serialize},
    std::collections::{BTreeMap, BTreeSet},
    tracing::trace,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Entry {
    predicates: BTreeMap<Path, Predicate>,
    /// Sequence number of the command that last (re)installed this
    /// watcher's keep-while map. Used for the bootstrap exemption (§3, §9).
    installed_in: u64,
}

/// `watcher_path → { watched_path → predicate }` (§3).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeepWhileTable {
    entries: BTreeMap<Path, Entry>,
}

impl KeepWhileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `predicates` as `watcher`'s keep-while map, replacing any
    /// previous entry (§4.4 step 5).
    pub fn register(&mut self, watcher: Path, predicates: BTreeMap<Path, Predicate>, command_seq: u64) {
        self.entries.insert(watcher, Entry { predicates, installed_in: command_seq });
    }

    pub fn remove(&mut self, watcher: &Path) {
        self.entries.remove(watcher);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `(watcher, predicates, installed_in)` triples in watcher-path order,
    /// for the snapshot codec (§6).
    pub fn entries_for_snapshot(
        &self,
    ) -> impl ExactSizeIterator<Item = (&Path, &BTreeMap<Path, Predicate>, &u64)> {
        self.entries.iter().map(|(watcher, entry)| (watcher, &entry.predicates, &entry.installed_in))
    }

    fn watchers_of(&self, dirty: &BTreeSet<Path>) -> Vec<Path> {
        let mut candidates: Vec<Path> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.predicates.keys().any(|watched| dirty.contains(watched)))
            .map(|(watcher, _)| watcher.clone())
            .collect();
        candidates.sort();
        candidates
    }
}

/// Remove the node at `path` from the tree, per the special root handling
/// in §3/§4.4: the root object itself is never removed, but `path == []`
/// still removes each of the root's current children (each one its own
/// dirtying mutation, so per-child keep-while watchers see it). Returns the
/// set of paths dirtied by this removal (the removed node(s) and their
/// parent(s)).
pub fn delete_node(root: &mut Node, path: &Path) -> BTreeSet<Path> {
    let mut dirty = BTreeSet::new();

    if path.is_root() {
        let children = root.children.names();
        for id in &children {
            root.remove_child(id);
            dirty.insert(path.child(id.clone()));
        }
        if !children.is_empty() {
            dirty.insert(path.clone());
        }
        return dirty;
    }

    let Some(parent_path) = path.parent() else {
        return dirty;
    };
    let Some(parent) = walk_mut(root, &parent_path) else {
        return dirty;
    };
    let Some(id) = path.last() else {
        return dirty;
    };
    if parent.remove_child(id).is_some() {
        dirty.insert(path.clone());
        dirty.insert(parent_path);
    }

    dirty
}

/// Run the keep-while cascade to a fixpoint (§4.5). `dirty` is the set of
/// paths whose existence, payload, or child counters changed as a direct
/// result of the triggering command. `triggering_command` is that
/// command's sequence number, used for the bootstrap exemption. Returns the
/// paths synthetically deleted by the cascade, in the order they were
/// removed.
pub fn run_cascade(
    root: &mut Node,
    table: &mut KeepWhileTable,
    mut dirty: BTreeSet<Path>,
    triggering_command: u64,
    max_iterations: usize,
) -> Result<Vec<Path>, Error> {
    let exempt_self: BTreeSet<Path> = table
        .entries
        .iter()
        .filter(|(watcher, entry)| entry.installed_in == triggering_command && entry.predicates.contains_key(*watcher))
        .map(|(watcher, _)| watcher.clone())
        .collect();

    let mut deleted = Vec::new();
    let mut iterations = 0usize;

    loop {
        let candidates = table.watchers_of(&dirty);
        if candidates.is_empty() {
            break;
        }

        iterations += 1;
        if iterations > max_iterations {
            return Err(Error::ResourceLimit(format!(
                "keep-while cascade exceeded {max_iterations} iterations"
            )));
        }

        let mut next_dirty = BTreeSet::new();
        let mut any_deleted = false;

        for watcher in candidates {
            let Some(entry) = table.entries.get(&watcher) else {
                continue;
            };

            let mut satisfied = true;
            for (watched, predicate) in &entry.predicates {
                if watcher == *watched && exempt_self.contains(&watcher) {
                    continue;
                }
                let node = walk(root, watched);
                let id = watched.last().cloned().unwrap_or_else(|| crate::types::NodeId::atom(""));
                if !eval_predicate_lenient(predicate, &id, node) {
                    satisfied = false;
                    break;
                }
            }

            if !satisfied {
                trace!(watcher = ?watcher, "keep-while cascade deleting watcher");
                let newly_dirty = delete_node(root, &watcher);
                table.remove(&watcher);
                next_dirty.extend(newly_dirty);
                deleted.push(watcher);
                any_deleted = true;
            }
        }

        if !any_deleted {
            break;
        }
        dirty = next_dirty;
    }

    Ok(deleted)
}
