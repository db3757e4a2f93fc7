//! The replicated state machine (§4.6): owns the tree, the keep-while table,
//! and the monotonic command sequence. `apply` is the only entry point that
//! advances the sequence or mutates state; `get` is a pure read.

use {
    crate::{
        command::{Command, GetCommand, Reply},
        config::Config,
        error::Error,
        keepwhile::KeepWhileTable,
        matcher::{find_matching, MatchOptions, ResultMap},
        tree::Node,
    },
    serde::{Deserialize, Serialize},
    tracing::info_span,
};

/// The full replicated state (§4.6, I5: deterministic replay). Every replica
/// that has applied the same command sequence holds bit-for-bit identical
/// state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct State {
    config: Config,
    root: Node,
    keep_while: KeepWhileTable,
    command_seq: u64,
}

impl State {
    pub fn new(config: Config) -> Self {
        Self { config, root: Node::empty(), keep_while: KeepWhileTable::new(), command_seq: 0 }
    }

    /// Build an empty state and replay `commands` into it before returning
    /// (§4.6). Intended for tests that want to stand up a populated replica
    /// in one call rather than looping `apply` themselves; behaves exactly
    /// as if each command in `commands` had been passed to `apply` in order.
    pub fn init(config: Config, commands: &[Command]) -> Self {
        let mut state = Self::new(config);
        for command in commands {
            state.apply(command);
        }
        state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn command_seq(&self) -> u64 {
        self.command_seq
    }

    /// Apply one command, advancing `command_seq` (§4.6). `command_seq` only
    /// advances for commands that go through this method; a bare [`State::get`]
    /// call never touches it, matching the read/write split in §4.4.
    pub fn apply(&mut self, command: &Command) -> Reply {
        self.command_seq += 1;
        let span = info_span!("apply", command_seq = self.command_seq);
        let _entered = span.enter();
        crate::command::execute(&mut self.root, &mut self.keep_while, command, self.command_seq, &self.config)
    }

    /// A read-only query: never advances `command_seq`, never mutates the
    /// tree or the keep-while table (§4.4, I5).
    pub fn get(&self, pattern: &[crate::types::PatternComponent], options: MatchOptions) -> Result<ResultMap, Error> {
        let result = find_matching(&self.root, pattern, &options)?;
        if result.len() > self.config.max_result_map_size {
            return Err(Error::ResourceLimit(format!(
                "result map exceeded {} entries",
                self.config.max_result_map_size
            )));
        }
        Ok(result)
    }

    /// Convenience wrapper around [`State::get`] taking a pre-built
    /// [`GetCommand`], mirroring the shape `apply` takes for mutating
    /// commands while still skipping the sequence bump.
    pub fn query(&self, command: &GetCommand) -> Result<ResultMap, Error> {
        self.get(&command.pattern, command.options)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn keep_while(&self) -> &KeepWhileTable {
        &self.keep_while
    }

    pub(crate) fn from_parts(config: Config, root: Node, keep_while: KeepWhileTable, command_seq: u64) -> Self {
        Self { config, root, keep_while, command_seq }
    }

    pub(crate) fn into_parts(self) -> (Config, Node, KeepWhileTable, u64) {
        (self.config, self.root, self.keep_while, self.command_seq)
    }
}
