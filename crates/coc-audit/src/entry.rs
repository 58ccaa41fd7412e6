use sha2::{Digest, Sha256};

/// Delimiter between the seven fields of an entry line
pub const FIELD_SEPARATOR: &str = " | ";

const FIELD_COUNT: usize = 7;

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub event_type: String,
    pub actor: String,
    pub target: String,
    pub timestamp: String,
    pub details: String,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEntry {
    /// Build an entry chained onto `prev_hash`, computing its own hash
    pub(crate) fn chained(
        event_type: &str,
        actor: &str,
        target: &str,
        timestamp: String,
        details: &str,
        prev_hash: String,
    ) -> Self {
        let mut entry = Self {
            event_type: sanitize(event_type),
            actor: sanitize(actor),
            target: sanitize(target),
            timestamp: sanitize(&timestamp),
            details: sanitize(details),
            prev_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// The first six fields joined by [`FIELD_SEPARATOR`]; this is what gets hashed
    pub fn content(&self) -> String {
        [
            self.event_type.as_str(),
            self.actor.as_str(),
            self.target.as_str(),
            self.timestamp.as_str(),
            self.details.as_str(),
            self.prev_hash.as_str(),
        ]
        .join(FIELD_SEPARATOR)
    }

    /// Hex SHA-256 of [`AuditEntry::content`]
    pub fn compute_hash(&self) -> String {
        hex::encode(Sha256::digest(self.content().as_bytes()))
    }

    /// Render as a ledger line (without trailing newline)
    pub fn to_line(&self) -> String {
        format!("{}{}{}", self.content(), FIELD_SEPARATOR, self.hash)
    }

    /// Parse a ledger line; `None` unless it has exactly seven fields
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if parts.len() != FIELD_COUNT {
            return None;
        }

        Some(Self {
            event_type: parts[0].to_string(),
            actor: parts[1].to_string(),
            target: parts[2].to_string(),
            timestamp: parts[3].to_string(),
            details: parts[4].to_string(),
            prev_hash: parts[5].to_string(),
            hash: parts[6].to_string(),
        })
    }
}

/// Keep free text from forging extra fields or lines
fn sanitize(field: &str) -> String {
    field.replace(['\n', '\r'], " ").replace('|', "/")
}
