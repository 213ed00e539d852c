use engine_core::{error::SourceError, state::models::FileOffset};
use model::records::token::Token;
use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};

#[derive(Debug)]
struct LineRange {
    end: u64,
    acked: bool,
    issued_at: Instant,
}

#[derive(Debug, Default)]
struct FileLedger {
    /// Lines `0..committed` are fully processed.
    committed: u64,
    /// Issued ranges keyed by their first line.
    ranges: BTreeMap<u64, LineRange>,
}

/// Maps tokens to the line ranges they stand for and turns out-of-order
/// acknowledgements into monotonically growing per-file offsets.
#[derive(Debug, Default)]
pub struct AckLedger {
    next_token: u64,
    tokens: HashMap<u64, (String, u64)>,
    files: HashMap<String, FileLedger>,
}

impl AckLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the token for lines `start..end` of `file`. Ranges of one file
    /// must be issued in order and without gaps, starting at its committed
    /// offset.
    pub fn issue(&mut self, file: &str, start: u64, end: u64) -> Token {
        let token = self.next_token;
        self.next_token += 1;

        let ledger = self
            .files
            .entry(file.to_string())
            .or_insert_with(|| FileLedger {
                committed: start,
                ranges: BTreeMap::new(),
            });
        ledger.ranges.insert(
            start,
            LineRange {
                end,
                acked: false,
                issued_at: Instant::now(),
            },
        );
        self.tokens.insert(token, (file.to_string(), start));
        Token::new(token)
    }

    /// Acknowledges a token. Returns the file's new offset when the
    /// contiguous acknowledged prefix grew.
    pub fn ack(&mut self, token: Token) -> Result<Option<FileOffset>, SourceError> {
        let (file, start) = self
            .tokens
            .remove(&token.raw())
            .ok_or(SourceError::UnknownToken(token.raw()))?;
        let ledger = self
            .files
            .get_mut(&file)
            .ok_or(SourceError::UnknownToken(token.raw()))?;

        if let Some(range) = ledger.ranges.get_mut(&start) {
            range.acked = true;
        }

        let before = ledger.committed;
        while let Some(entry) = ledger.ranges.first_entry() {
            if *entry.key() != ledger.committed || !entry.get().acked {
                break;
            }
            ledger.committed = entry.remove().end;
        }

        Ok((ledger.committed > before).then(|| FileOffset::new(file, ledger.committed)))
    }

    /// When the oldest unacknowledged range was issued.
    pub fn oldest_outstanding(&self) -> Option<Instant> {
        self.files
            .values()
            .flat_map(|ledger| ledger.ranges.values())
            .filter(|range| !range.acked)
            .map(|range| range.issued_at)
            .min()
    }

    pub fn outstanding(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_acks_advance_offset() {
        let mut ledger = AckLedger::new();
        let first = ledger.issue("a.jsonl", 0, 10);
        let second = ledger.issue("a.jsonl", 10, 20);

        let offset = ledger.ack(first).unwrap().unwrap();
        assert_eq!(offset.file, "a.jsonl");
        assert_eq!(offset.lines_done, 10);

        let offset = ledger.ack(second).unwrap().unwrap();
        assert_eq!(offset.lines_done, 20);
        assert_eq!(ledger.outstanding(), 0);
        assert!(ledger.oldest_outstanding().is_none());
    }

    #[test]
    fn test_out_of_order_ack_waits_for_gap() {
        let mut ledger = AckLedger::new();
        let first = ledger.issue("a.jsonl", 5, 10);
        let second = ledger.issue("a.jsonl", 10, 15);
        let third = ledger.issue("a.jsonl", 15, 20);

        assert!(ledger.ack(third).unwrap().is_none());
        assert!(ledger.ack(second).unwrap().is_none());
        assert!(ledger.oldest_outstanding().is_some());

        let offset = ledger.ack(first).unwrap().unwrap();
        assert_eq!(offset.lines_done, 20);
    }

    #[test]
    fn test_files_are_tracked_independently() {
        let mut ledger = AckLedger::new();
        let a = ledger.issue("a.jsonl", 0, 3);
        let b = ledger.issue("b.jsonl", 0, 4);

        assert_eq!(ledger.ack(b).unwrap().unwrap().lines_done, 4);
        assert_eq!(ledger.outstanding(), 1);
        assert_eq!(ledger.ack(a).unwrap().unwrap().file, "a.jsonl");
    }

    #[test]
    fn test_unknown_and_repeated_tokens_are_rejected() {
        let mut ledger = AckLedger::new();
        let token = ledger.issue("a.jsonl", 0, 1);

        assert!(matches!(
            ledger.ack(Token::new(99)),
            Err(SourceError::UnknownToken(99))
        ));
        ledger.ack(token).unwrap();
        assert!(matches!(ledger.ack(token), Err(SourceError::UnknownToken(_))));
    }
}
