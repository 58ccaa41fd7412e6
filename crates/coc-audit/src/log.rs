use chrono::{SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::entry::{AuditEntry, FIELD_SEPARATOR};
use crate::{AuditError, AuditEventType, AuditResult};

/// File name used inside the configured log directory
pub const AUDIT_FILE_NAME: &str = "audit.log";

/// Fixed header written when a ledger is created
pub const HEADER_LINES: [&str; 2] = [
    "# Audit Log - Chain of Custody Simulator",
    "# Each entry is chained by hashing the previous entry's hash.",
];

/// Append-only, hash-chained ledger backed by a text file
pub struct AuditLog {
    path: PathBuf,
    /// Hash of the newest entry. Held for the whole read-modify-write of an
    /// append so concurrent writers cannot fork the chain.
    last_hash: Mutex<String>,
}

impl AuditLog {
    /// Open (or create) `audit.log` inside `log_dir`
    pub fn open(log_dir: impl AsRef<Path>) -> AuditResult<Self> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;
        Self::open_file(log_dir.join(AUDIT_FILE_NAME))
    }

    /// Open an existing ledger at `path`, or create one with a header and
    /// GENESIS entry if it holds no entries yet
    pub fn open_file(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        let last_hash = read_last_hash(&path)?;
        let resumed = last_hash.is_some();

        let log = Self {
            path,
            last_hash: Mutex::new(last_hash.unwrap_or_default()),
        };

        if !resumed {
            log.initialize()?;
        }

        info!(path = %log.path.display(), resumed, "Audit log initialized");
        Ok(log)
    }

    fn initialize(&self) -> AuditResult<()> {
        let mut last_hash = self.lock();

        let mut file = File::create(&self.path)?;
        for header in HEADER_LINES {
            writeln!(file, "{}", header)?;
        }
        last_hash.clear();

        self.append(
            &mut last_hash,
            AuditEventType::Genesis,
            "SYSTEM",
            "Log Initialized",
            "Initial state.",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.last_hash.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Location of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash of the newest entry
    pub fn last_hash(&self) -> String {
        self.lock().clone()
    }

    /// Append an event to the ledger
    pub fn log_event(
        &self,
        event_type: AuditEventType,
        actor: &str,
        target: &str,
        details: &str,
    ) -> AuditResult<AuditEntry> {
        let mut last_hash = self.lock();
        self.append(&mut last_hash, event_type, actor, target, details)
    }

    fn append(
        &self,
        last_hash: &mut String,
        event_type: AuditEventType,
        actor: &str,
        target: &str,
        details: &str,
    ) -> AuditResult<AuditEntry> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let entry = AuditEntry::chained(
            event_type.as_str(),
            actor,
            target,
            timestamp,
            details,
            last_hash.clone(),
        );

        let mut file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        *last_hash = entry.hash.clone();

        debug!(event = %event_type, actor, target, "Audit event logged");
        Ok(entry)
    }

    /// Walk the whole ledger, returning how many entries verified.
    ///
    /// Stops at the first entry whose embedded previous hash or own hash does
    /// not check out; nothing after a break can be trusted.
    pub fn verify_chain(&self) -> AuditResult<usize> {
        let _writer = self.lock();

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AuditError::Missing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut running_hash = String::new();
        let mut verified = 0usize;
        let mut last_line = 0usize;

        for (idx, raw) in contents.lines().enumerate() {
            let line = idx + 1;
            last_line = line;
            let entry_no = verified + 1;
            let violation = |reason: String| AuditError::IntegrityViolation {
                entry: entry_no,
                line,
                reason,
            };

            if raw.is_empty() {
                continue;
            }
            if raw.starts_with('#') {
                if verified == 0 {
                    continue;
                }
                return Err(violation("comment line after first entry".to_string()));
            }

            let entry = AuditEntry::parse(raw).ok_or_else(|| {
                violation(format!(
                    "expected 7 fields separated by '{}'",
                    FIELD_SEPARATOR.trim()
                ))
            })?;

            if entry.prev_hash != running_hash {
                return Err(violation(format!(
                    "expected previous hash '{}', found '{}'",
                    running_hash, entry.prev_hash
                )));
            }

            let recalculated = entry.compute_hash();
            if recalculated != entry.hash {
                return Err(violation(format!(
                    "recalculated hash {} does not match stored hash {}",
                    recalculated, entry.hash
                )));
            }

            running_hash = entry.hash;
            verified += 1;
        }

        if verified == 0 {
            return Err(AuditError::IntegrityViolation {
                entry: 1,
                line: last_line,
                reason: "no genesis entry".to_string(),
            });
        }

        Ok(verified)
    }

    /// `true` only if every entry, in order, checks out
    pub fn verify_log_integrity(&self) -> bool {
        match self.verify_chain() {
            Ok(count) => {
                info!(entries = count, "Audit log integrity verified");
                true
            }
            Err(e) => {
                warn!(error = %e, "Audit log integrity check failed");
                false
            }
        }
    }

    /// Parse every well-formed entry in file order
    pub fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        let _writer = self.lock();
        let contents = fs::read_to_string(&self.path)?;
        Ok(contents
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(AuditEntry::parse)
            .collect())
    }
}

/// Hash stored on the newest entry line, or `None` for a missing file or a
/// file without entries
fn read_last_hash(path: &Path) -> AuditResult<Option<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(contents
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .and_then(|line| line.rsplit(FIELD_SEPARATOR).next())
        .map(str::to_string))
}
