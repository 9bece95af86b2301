//! Append-only audit trail of match attempts.
//!
//! Every evaluated match is recorded as one JSON object per line. The file
//! logger opens its target once in append mode and flushes after each line,
//! so a crash never leaves a half-written record behind.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{AdoptionStatus, AuditLogEntry, MatchResult, Result, WorldmatchError};

/// Destination for audit entries.
pub trait AuditSink {
    /// Record one entry. Prior entries are never rewritten.
    fn log(&mut self, entry: &AuditLogEntry) -> Result<()>;

    /// Snapshot `result` with the world it was matched against, record it,
    /// and hand the entry back.
    fn log_match_result(
        &mut self,
        result: &MatchResult,
        world_objects: &BTreeSet<String>,
    ) -> Result<AuditLogEntry> {
        let entry = AuditLogEntry::from_match_result(result, world_objects);
        self.log(&entry)?;
        Ok(entry)
    }
}

/// JSONL file logger. The file handle is released on drop.
#[derive(Debug)]
pub struct AuditLogger {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl AuditLogger {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for AuditLogger {
    fn log(&mut self, entry: &AuditLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Buffering logger for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLogger {
    entries: Vec<AuditLogEntry>,
}

impl InMemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AuditLogEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries as JSONL, without a trailing newline.
    pub fn to_jsonl(&self) -> Result<String> {
        let lines = self
            .entries
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(lines.join("\n"))
    }
}

impl AuditSink for InMemoryAuditLogger {
    fn log(&mut self, entry: &AuditLogEntry) -> Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

/// Replay a JSONL audit log.
///
/// A missing file is an empty log. Blank lines are skipped; a line that does
/// not parse is reported with its 1-based line number.
pub fn load_audit_log(path: impl AsRef<Path>) -> Result<Vec<AuditLogEntry>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry =
            serde_json::from_str(line).map_err(|source| WorldmatchError::MalformedAuditLog {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Per-status counts of a replayed log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub total: usize,
    pub auto_adopted: usize,
    pub suggested: usize,
    pub rejected: usize,
    /// Keyed by rejection reason code.
    pub reasons: BTreeMap<String, usize>,
}

pub fn summarize_audit_log(entries: &[AuditLogEntry]) -> AuditSummary {
    let mut summary = AuditSummary {
        total: entries.len(),
        ..AuditSummary::default()
    };
    for entry in entries {
        match entry.status {
            AdoptionStatus::AutoAdopted => summary.auto_adopted += 1,
            AdoptionStatus::Suggested => summary.suggested += 1,
            AdoptionStatus::Rejected => summary.rejected += 1,
        }
        if let Some(reason) = entry.rejection_reason {
            *summary.reasons.entry(reason.to_string()).or_default() += 1;
        }
    }
    summary
}
