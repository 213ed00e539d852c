use crate::records::token::Token;
use bytes::Bytes;

/// A chunk of raw events pulled from the source together with the tokens that
/// checkpoint them.
#[derive(Debug, Clone, Default)]
pub struct TokenedBatch {
    pub events: Vec<Bytes>,
    pub tokens: Vec<Token>,
}

impl TokenedBatch {
    pub fn new(events: Vec<Bytes>, tokens: Vec<Token>) -> Self {
        Self { events, tokens }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.events.iter().map(Bytes::len).sum()
    }
}
