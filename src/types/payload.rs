use serde::{Deserialize, Serialize};

/// A node's payload. Currently the only kind is an opaque data blob; the
/// matcher never interprets these bytes except when an `if_data_matches`
/// predicate asks it to parse them as JSON (§4.1).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Data(Vec<u8>),
}

impl Payload {
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Data(bytes) => bytes,
        }
    }
}
