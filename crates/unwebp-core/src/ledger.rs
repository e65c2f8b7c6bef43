//! Durable processed-files ledger.
//!
//! The ledger is an append-only text file with one `<source> <destination>`
//! pair per line, mirrored by an in-memory set of source names. It is the
//! only record of what has already been converted, so it is replayed on
//! startup and every successful conversion is appended and synced before the
//! worker moves on.

use serde::Serialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::config::MalformedLinePolicy;
use crate::error::LedgerError;

/// One completed conversion as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedRecord {
    /// Source file name within the watched directory
    pub source: String,
    /// Where the converted file was written
    pub destination: String,
}

impl ProcessedRecord {
    /// Parse one ledger line. Returns `None` unless it has exactly two fields.
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let source = fields.next()?;
        let destination = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            source: source.to_string(),
            destination: destination.to_string(),
        })
    }
}

/// Set of already-converted source names, backed by the ledger file.
#[derive(Debug)]
pub struct ProcessedSet {
    path: PathBuf,
    entries: Mutex<HashSet<String>>,
}

impl ProcessedSet {
    /// Create an empty set that appends to `path`, without reading it.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(HashSet::new()),
        }
    }

    /// Replay the ledger at `path`.
    ///
    /// A missing file is an empty set. Blank lines are ignored; any other line
    /// that is not exactly two fields is handled according to `policy`.
    pub fn load(path: impl Into<PathBuf>, policy: MalformedLinePolicy) -> Result<Self, LedgerError> {
        let path = path.into();
        let mut entries = HashSet::new();
        for record in read_records(&path, policy)? {
            entries.insert(record.source);
        }
        tracing::debug!(path = %path.display(), entries = entries.len(), "Replayed ledger");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Whether `source` has already been recorded.
    pub fn contains(&self, source: &str) -> bool {
        self.lock().contains(source)
    }

    /// Record a completed conversion.
    ///
    /// Returns `Ok(false)` without touching the file when `source` is already
    /// present. On an append failure the entry stays in memory so this process
    /// does not convert the file again; only a restart would.
    pub fn record(&self, source: &str, destination: &str) -> Result<bool, LedgerError> {
        let mut entries = self.lock();
        if !entries.insert(source.to_string()) {
            return Ok(false);
        }

        check_field("source", source)?;
        check_field("destination", destination)?;

        self.append(source, destination)
            .map_err(|e| LedgerError::Append {
                path: self.path.clone(),
                source: e,
            })?;
        Ok(true)
    }

    /// Number of recorded sources.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Path of the backing ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, source: &str, destination: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Single write so a line is never interleaved with another record.
        file.write_all(format!("{source} {destination}\n").as_bytes())?;
        file.sync_data()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block every lookup and record until the guard is dropped.
    #[cfg(test)]
    pub(crate) fn hold(&self) -> MutexGuard<'_, HashSet<String>> {
        self.lock()
    }
}

/// Read every record from the ledger at `path`.
///
/// A missing file yields no records.
pub fn read_records(
    path: &Path,
    policy: MalformedLinePolicy,
) -> Result<Vec<ProcessedRecord>, LedgerError> {
    let read_err = |source: io::Error| LedgerError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_err(e)),
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
        let mut bytes = line.map_err(read_err)?;
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        // Invalid UTF-8 is just another malformed line.
        let parsed = match String::from_utf8(bytes) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => ProcessedRecord::parse(&line).ok_or(line),
            Err(e) => Err(String::from_utf8_lossy(e.as_bytes()).into_owned()),
        };
        let content = match parsed {
            Ok(record) => {
                records.push(record);
                continue;
            }
            Err(content) => content,
        };
        match policy {
            MalformedLinePolicy::Abort => {
                return Err(LedgerError::Malformed {
                    path: path.to_path_buf(),
                    line: index + 1,
                    content,
                });
            }
            MalformedLinePolicy::Skip => {
                tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    %content,
                    "Skipping malformed ledger line"
                );
            }
        }
    }
    Ok(records)
}

fn check_field(field: &'static str, value: &str) -> Result<(), LedgerError> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(LedgerError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ledger_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = ProcessedSet::load(dir.path().join("none.log"), MalformedLinePolicy::Abort)
            .unwrap();
        assert!(set.is_empty());
        assert!(!set.contains("a.webp"));
    }

    #[test]
    fn test_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.log");

        let set = ProcessedSet::empty(&path);
        for i in 0..5 {
            let recorded = set
                .record(&format!("img{i}.webp"), &format!("converted/out{i}.png"))
                .unwrap();
            assert!(recorded);
        }
        drop(set);

        let replayed = ProcessedSet::load(&path, MalformedLinePolicy::Abort).unwrap();
        assert_eq!(replayed.len(), 5);
        for i in 0..5 {
            assert!(replayed.contains(&format!("img{i}.webp")));
        }
        assert!(!replayed.contains("img5.webp"));
    }

    #[test]
    fn test_record_writes_one_line_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.log");
        let set = ProcessedSet::empty(&path);

        assert!(set.record("a.webp", "converted/Xy12.png").unwrap());
        assert!(!set.record("a.webp", "converted/Zz99.png").unwrap());

        assert_eq!(ledger_lines(&path), vec!["a.webp converted/Xy12.png"]);
    }

    #[test]
    fn test_concurrent_records_for_same_source_append_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.log");
        let set = Arc::new(ProcessedSet::empty(&path));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let set = set.clone();
                std::thread::spawn(move || set.record("same.webp", &format!("out/{i}.png")))
            })
            .collect();
        let appended = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|appended| *appended)
            .count();

        assert_eq!(appended, 1);
        assert_eq!(ledger_lines(&path).len(), 1);
    }

    #[test]
    fn test_append_failure_keeps_entry_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist, so every append fails.
        let set = ProcessedSet::empty(dir.path().join("missing").join("ledger.log"));

        let err = set.record("a.webp", "converted/x.png").unwrap_err();
        assert!(matches!(err, LedgerError::Append { .. }));
        assert!(set.contains("a.webp"));
    }

    #[test]
    fn test_whitespace_field_is_rejected_but_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.log");
        let set = ProcessedSet::empty(&path);

        let err = set.record("holiday photo.webp", "converted/x.png").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidField { field: "source", .. }));
        assert!(set.contains("holiday photo.webp"));
        assert!(!path.exists());
    }

    #[test]
    fn test_malformed_line_aborts_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.log");
        std::fs::write(&path, "a.webp converted/a.png\ntruncated\n").unwrap();

        let err = ProcessedSet::load(&path, MalformedLinePolicy::Abort).unwrap_err();
        match err {
            LedgerError::Malformed { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "truncated");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_line_skipped_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.log");
        std::fs::write(
            &path,
            "a.webp converted/a.png\none two three\n\nb.webp converted/b.png\n",
        )
        .unwrap();

        let set = ProcessedSet::load(&path, MalformedLinePolicy::Skip).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("a.webp"));
        assert!(set.contains("b.webp"));
    }

    #[test]
    fn test_invalid_utf8_line_follows_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.log");
        std::fs::write(
            &path,
            b"a.webp converted/a.png\r\n\xff\xfe junk\nb.webp converted/b.png\n",
        )
        .unwrap();

        let set = ProcessedSet::load(&path, MalformedLinePolicy::Skip).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("a.webp"));
        assert!(set.contains("b.webp"));

        match ProcessedSet::load(&path, MalformedLinePolicy::Abort) {
            Err(LedgerError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed line, got {other:?}"),
        }
    }

    #[test]
    fn test_long_fields_are_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.log");
        let long_name = format!("{}.webp", "x".repeat(600));

        let set = ProcessedSet::empty(&path);
        set.record(&long_name, "converted/a.png").unwrap();

        let records = read_records(&path, MalformedLinePolicy::Abort).unwrap();
        assert_eq!(records[0].source, long_name);
    }
}
