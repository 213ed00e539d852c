use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque checkpoint marker minted by a source.
///
/// Only the source that issued a token knows what position it stands for; the
/// loader forwards tokens back to it unchanged once their events are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(u64);

impl Token {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.0)
    }
}
