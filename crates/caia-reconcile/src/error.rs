use std::fmt;

/// Every way a reconciliation call can fail.
///
/// All variants abort the call; no partial [`DiffResult`](crate::DiffResult)
/// is ever returned alongside an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A record lacks the configured key field (or carries it as null).
    MissingKeyField {
        /// Position of the record within its snapshot.
        record_index: usize,
        /// Compact JSON rendering of the offending record.
        record: String,
        field: String,
    },
    /// A ledger timestamp could not be parsed.
    CorruptLedgerEntry { key: String, timestamp: String },
    /// Snapshot input is not a sequence of flat string-or-null mappings.
    MalformedSnapshot { reason: String },
    /// A serialized diff result could not be decoded.
    MalformedDiffResult { reason: String },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKeyField {
                record_index,
                record,
                field,
            } => write!(
                f,
                "record {record_index} is missing key field '{field}': {record}"
            ),
            Self::CorruptLedgerEntry { key, timestamp } => write!(
                f,
                "denial ledger entry for key '{key}' has unparsable timestamp '{timestamp}'"
            ),
            Self::MalformedSnapshot { reason } => write!(f, "malformed snapshot: {reason}"),
            Self::MalformedDiffResult { reason } => write!(f, "malformed diff result: {reason}"),
        }
    }
}

impl std::error::Error for ReconcileError {}
