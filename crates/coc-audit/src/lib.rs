/*!
# Custody Audit Ledger

A single-writer, append-only text ledger. Every entry embeds the hash of the
entry before it, so editing, reordering or dropping an entry in the middle of
the file breaks the chain at that point.

```text
# Audit Log - Chain of Custody Simulator
# Each entry is chained by hashing the previous entry's hash.
GENESIS | SYSTEM | Log Initialized | 2024-01-01T00:00:00.000000Z | Initial state. |  | 3f1c...
DELETE_ISSUE | alice | Node: 9ab0... | 2024-01-01T00:00:01.000000Z |  | 3f1c... | 77de...
```
*/

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

mod entry;
mod log;

pub use entry::{AuditEntry, FIELD_SEPARATOR};
pub use log::{AuditLog, AUDIT_FILE_NAME, HEADER_LINES};

/// Errors raised by the audit ledger
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit log not found: {0}")]
    Missing(PathBuf),

    #[error("Chain broken at entry {entry} (line {line}): {reason}")]
    IntegrityViolation {
        /// 1-based position of the first entry that fails verification
        entry: usize,
        /// 1-based line number in the file
        line: usize,
        reason: String,
    },
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// Kinds of events recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    /// First entry of every ledger
    Genesis,
    /// A custodian signed a deletion token
    DeleteIssue,
    /// A replica honoured a deletion token
    DeleteSuccess,
    /// A deletion token was rejected
    DeleteFail,
    /// Any other event, recorded under the given name
    Custom(&'static str),
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Genesis => "GENESIS",
            Self::DeleteIssue => "DELETE_ISSUE",
            Self::DeleteSuccess => "DELETE_SUCCESS",
            Self::DeleteFail => "DELETE_FAIL",
            Self::Custom(name) => *name,
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
