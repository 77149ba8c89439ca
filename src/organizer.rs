/// One pass over the dump directory.
///
/// A pass lists the immediate files of the dump directory, picks the first
/// matching destination rule for each and relocates the file there. Per-file
/// failures are recorded and counted as skipped; only failing to list the dump
/// directory aborts the pass.
use crate::relocate::{self, RelocateError, Relocation};
use crate::rules::{self, DestinationRule};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A file found in the dump directory.
#[derive(Debug, Clone)]
pub struct DumpEntry {
    /// Raw file name, used to build the destination path.
    pub file_name: OsString,
    /// File name as used for rule matching.
    pub name: String,
    /// Full path inside the dump directory.
    pub path: PathBuf,
}

/// Why a file was left in the dump directory.
#[derive(Debug)]
pub enum SkipReason {
    /// No configured rule matched the file name.
    NoRuleMatched,
    /// A rule matched but the relocation failed.
    Failed(RelocateError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleMatched => write!(f, "no rule matched"),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Outcome for a single file, handed to the pass observer.
#[derive(Debug)]
pub enum FileOutcome<'a> {
    Moved(&'a Relocation),
    Skipped(&'a Path, &'a SkipReason),
}

/// Aggregated result of one organize pass.
#[derive(Debug)]
pub struct OrganizeOutcome {
    pub moved: Vec<Relocation>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl OrganizeOutcome {
    fn new() -> Self {
        let now = Local::now();
        Self {
            moved: Vec::new(),
            skipped: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Number of files moved into each destination directory.
    pub fn moved_by_destination(&self) -> BTreeMap<PathBuf, usize> {
        let mut counts = BTreeMap::new();
        for relocation in &self.moved {
            if let Some(dir) = relocation.destination.parent() {
                *counts.entry(dir.to_path_buf()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// A move that a pass would perform, as reported by [`plan`].
#[derive(Debug, Clone)]
pub struct PlannedMove {
    pub source: PathBuf,
    /// `None` when no rule matches.
    pub destination: Option<PathBuf>,
    /// Index of the matching rule in the configured list.
    pub rule_index: Option<usize>,
    /// The destination is already occupied, so the move would be refused.
    pub blocked: bool,
}

/// Errors that abort a whole pass.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("failed to read dump directory {}: {source}", .path.display())]
    ReadDumpDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for organize passes.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Lists the files directly inside `dump_dir`, sorted by name.
///
/// Subdirectories are skipped. Entries that vanish or cannot be inspected
/// while listing are ignored; they are picked up by a later pass if they come
/// back.
pub fn scan_dump_dir(dump_dir: &Path) -> OrganizeResult<Vec<DumpEntry>> {
    let listing = fs::read_dir(dump_dir).map_err(|e| OrganizeError::ReadDumpDir {
        path: dump_dir.to_path_buf(),
        source: e,
    })?;

    let mut entries = Vec::new();
    for entry in listing.flatten() {
        if let Ok(file_type) = entry.file_type()
            && !file_type.is_dir()
        {
            let file_name = entry.file_name();
            entries.push(DumpEntry {
                name: file_name.to_string_lossy().into_owned(),
                file_name,
                path: entry.path(),
            });
        }
    }

    entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(entries)
}

/// Runs one organize pass over `dump_dir`.
///
/// # Examples
///
/// ```no_run
/// use dumpsort::organizer::organize;
/// use dumpsort::rules::DestinationRule;
/// use std::path::Path;
///
/// let rules = vec![DestinationRule::new("/archive", Some("report_"), None)];
/// let outcome = organize(Path::new("/home/me/dump"), &rules).unwrap();
/// println!("{} moved, {} skipped", outcome.moved_count(), outcome.skipped_count());
/// ```
pub fn organize(dump_dir: &Path, rules: &[DestinationRule]) -> OrganizeResult<OrganizeOutcome> {
    organize_with(dump_dir, rules, |_| {})
}

/// Runs one organize pass, calling `on_file` after each file is handled.
pub fn organize_with<F>(
    dump_dir: &Path,
    rules: &[DestinationRule],
    on_file: F,
) -> OrganizeResult<OrganizeOutcome>
where
    F: FnMut(FileOutcome<'_>),
{
    let entries = scan_dump_dir(dump_dir)?;
    Ok(organize_entries(&entries, rules, on_file))
}

/// Organizes an already scanned list of entries, in order.
///
/// The first matching rule decides the destination. A failed relocation is
/// not retried against later rules.
pub fn organize_entries<F>(
    entries: &[DumpEntry],
    rules: &[DestinationRule],
    mut on_file: F,
) -> OrganizeOutcome
where
    F: FnMut(FileOutcome<'_>),
{
    let mut outcome = OrganizeOutcome::new();

    for entry in entries {
        let result = match rules::first_match(rules, &entry.name) {
            Some((_, rule)) => {
                let destination = rule.path.join(&entry.file_name);
                relocate::relocate(&entry.path, &destination).map_err(SkipReason::Failed)
            }
            None => Err(SkipReason::NoRuleMatched),
        };

        match result {
            Ok(relocation) => {
                outcome.moved.push(relocation);
                if let Some(relocation) = outcome.moved.last() {
                    on_file(FileOutcome::Moved(relocation));
                }
            }
            Err(reason) => {
                outcome.skipped.push((entry.path.clone(), reason));
                if let Some((path, reason)) = outcome.skipped.last() {
                    on_file(FileOutcome::Skipped(path, reason));
                }
            }
        }
    }

    outcome.finished_at = Local::now();
    outcome
}

/// Computes what a pass would do without touching the filesystem.
pub fn plan(dump_dir: &Path, rules: &[DestinationRule]) -> OrganizeResult<Vec<PlannedMove>> {
    let entries = scan_dump_dir(dump_dir)?;
    Ok(entries
        .into_iter()
        .map(|entry| match rules::first_match(rules, &entry.name) {
            Some((index, rule)) => {
                let destination = rule.path.join(&entry.file_name);
                PlannedMove {
                    blocked: fs::symlink_metadata(&destination).is_ok(),
                    source: entry.path,
                    destination: Some(destination),
                    rule_index: Some(index),
                }
            }
            None => PlannedMove {
                source: entry.path,
                destination: None,
                rule_index: None,
                blocked: false,
            },
        })
        .collect())
}
