use std::fmt;

/// Why the destination refused a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The row carries columns the table does not have (yet). The list holds
    /// the names the destination reported and may be empty when it did not say.
    MissingColumns(Vec<String>),
    /// Any other rejection. The row will not be retried.
    Other(String),
}

/// A per-row rejection, indexed by the row's position in the submitted slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub index: usize,
    pub reason: FailureReason,
}

impl RowFailure {
    pub fn missing_columns<I, S>(index: usize, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index,
            reason: FailureReason::MissingColumns(columns.into_iter().map(Into::into).collect()),
        }
    }

    pub fn other(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            reason: FailureReason::Other(message.into()),
        }
    }
}

/// Result of a single write call against a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    AllAccepted,
    PartialFailures(Vec<RowFailure>),
    /// The channel must be replaced; nothing in this attempt was accepted.
    ChannelInvalid,
}

impl WriteOutcome {
    /// Builds an outcome from a destination's failure list. An empty list is an
    /// explicit acceptance of every row.
    pub fn from_failures(failures: Vec<RowFailure>) -> Self {
        if failures.is_empty() {
            WriteOutcome::AllAccepted
        } else {
            WriteOutcome::PartialFailures(failures)
        }
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOutcome::AllAccepted => write!(f, "all accepted"),
            WriteOutcome::PartialFailures(failures) => {
                write!(f, "{} row failure(s)", failures.len())
            }
            WriteOutcome::ChannelInvalid => write!(f, "channel invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_failure_list_is_all_accepted() {
        assert_eq!(WriteOutcome::from_failures(vec![]), WriteOutcome::AllAccepted);
    }

    #[test]
    fn test_failures_are_kept() {
        let outcome = WriteOutcome::from_failures(vec![
            RowFailure::missing_columns(0, ["x"]),
            RowFailure::other(2, "value too long"),
        ]);

        let WriteOutcome::PartialFailures(failures) = outcome else {
            panic!("expected partial failures");
        };
        assert!(matches!(failures[1].reason, FailureReason::Other(_)));
        assert_eq!(
            failures[0].reason,
            FailureReason::MissingColumns(vec!["x".to_string()])
        );
    }
}
