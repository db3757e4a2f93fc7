use serde::{Deserialize, Serialize};

/// Resource caps (§5, §4.8). These are not part of the replicated state:
/// two replicas may run different caps without affecting determinism, since
/// a cap only ever turns a would-succeed command into a `resource_limit`
/// error reply *before* any mutation is applied.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Abort a command with `ErrorKind::ResourceLimit` if a single
    /// `find_matching` call would emit more entries than this.
    pub max_result_map_size: usize,

    /// Hard ceiling on keep-while cascade passes, guarding against a
    /// programming error turning the fixpoint loop into an infinite one.
    /// The cascade's own termination argument (§4.5) bounds the number of
    /// passes by the number of keep-while entries, so this should never be
    /// the limiting factor in a correct implementation.
    pub max_cascade_iterations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_result_map_size: 10_000,
            max_cascade_iterations: 10_000,
        }
    }
}
