//! The external interface envelope (§6): the wire-level shape a replication
//! engine or client SDK encodes commands and replies as. `Command` and
//! `Reply` (in [`crate::command`]) already carry the `serde` derives needed
//! to go on the wire; this module just names the boundary and offers the
//! JSON helpers a host embedding this state machine would reach for.

use crate::{
    command::{Command, Reply},
    error::Error,
};

/// Decode one command from its wire JSON representation.
pub fn decode_command(bytes: &[u8]) -> Result<Command, Error> {
    serde_json::from_slice(bytes).map_err(|error| Error::InvalidPattern(error.to_string()))
}

/// Encode a reply to its wire JSON representation. Replies are always
/// serializable (no borrowed data, no non-serializable error payloads), so
/// this never fails.
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    serde_json::to_vec(reply).expect("Reply always serializes")
}
