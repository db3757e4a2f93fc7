pub mod id;
pub mod path;
pub mod pattern;
pub mod payload;

pub use {
    id::NodeId,
    path::{Anchor, Path, PathComponent},
    pattern::{CmpOp, NameMatch, Operand, PathMatch, Predicate, PatternComponent},
    payload::Payload,
};
