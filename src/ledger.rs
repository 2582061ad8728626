//! Append-only record of already-processed source URLs
//!
//! The ledger file holds one entry per line, `<hex-digest>|<source-url>`, the URL taken
//! verbatim after the first `|`. Older files may contain bare URLs; both forms count as
//! "already handled". Lines are only ever
//! appended, each with a single write, so a crash loses at most the line being written.
//!
//! Membership is by URL. Content identity is the store's concern; the ledger only
//! remembers which URLs have been dealt with so later runs skip them without a request.

use crate::error::{Error, Result};
use crate::types::LedgerEntry;
use crate::utils::looks_like_url;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Classification of one ledger line
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Comment,
    Entry { url: &'a str },
    Malformed(&'static str),
}

fn parse_line(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if line.starts_with('#') {
        return Line::Comment;
    }

    match line.split_once('|') {
        Some((hash, url)) => {
            let hash = hash.trim();
            if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                Line::Malformed("digest is not hexadecimal")
            } else if url.trim().is_empty() {
                Line::Malformed("entry has no URL")
            } else {
                Line::Entry { url }
            }
        }
        None if looks_like_url(line) => Line::Entry { url: line },
        None => Line::Malformed("neither `hash|url` nor a bare URL"),
    }
}

/// Parse ledger text into its URL set, warning about and skipping malformed lines
fn parse_ledger(content: &str, path: &Path) -> HashSet<String> {
    let mut urls = HashSet::new();
    for (index, raw) in content.lines().enumerate() {
        match parse_line(raw) {
            Line::Blank | Line::Comment => {}
            Line::Entry { url } => {
                urls.insert(url.to_string());
            }
            Line::Malformed(reason) => {
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    reason,
                    "Skipping malformed ledger line"
                );
            }
        }
    }
    urls
}

/// Load the set of processed URLs from a ledger file
///
/// A missing file is an empty ledger. Malformed lines are skipped with a warning.
pub fn load(path: &Path) -> Result<HashSet<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(parse_ledger(&String::from_utf8_lossy(&bytes), path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(e) => Err(e.into()),
    }
}

struct LedgerState {
    /// URLs recorded in the file
    urls: HashSet<String>,
    /// Append handle
    file: File,
    /// The existing file did not end with a newline
    needs_newline: bool,
}

/// The URL ledger: the on-disk file plus its in-memory URL set
///
/// Recorded URLs and the file sit behind one async mutex, so "check, then append" is
/// atomic with respect to other fetch tasks of the same run.
pub struct UrlLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
    /// URLs claimed by a fetch but not yet recorded; only locked while `state` is held
    /// or on its own, never across an await
    in_flight: std::sync::Mutex<HashSet<String>>,
}

impl UrlLedger {
    /// Open (creating if needed) the ledger file and load its URL set
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        let needs_newline = content.last().is_some_and(|b| *b != b'\n');
        let urls = parse_ledger(&String::from_utf8_lossy(&content), &path);
        file.seek(SeekFrom::End(0))?;

        info!(path = %path.display(), urls = urls.len(), "Loaded URL ledger");

        Ok(Self {
            path,
            state: Mutex::new(LedgerState {
                urls,
                file,
                needs_newline,
            }),
            in_flight: std::sync::Mutex::new(HashSet::new()),
        })
    }

    /// Ledger file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `url` is recorded in the ledger
    pub async fn contains(&self, url: &str) -> bool {
        self.state.lock().await.urls.contains(url)
    }

    /// Number of recorded URLs
    pub async fn len(&self) -> usize {
        self.state.lock().await.urls.len()
    }

    /// Whether the ledger has no recorded URLs
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Claim `url` for fetching in this run
    ///
    /// Returns false if the URL is already recorded or another task holds a claim on it.
    /// A successful claim ends with [`LedgerGuard::append`] or [`UrlLedger::release`].
    pub async fn claim(&self, url: &str) -> bool {
        let state = self.state.lock().await;
        if state.urls.contains(url) {
            return false;
        }
        lock_in_flight(&self.in_flight).insert(url.to_string())
    }

    /// Drop a claim without recording the URL (the fetch failed)
    ///
    /// Synchronous, so it can run from `Drop` while a task unwinds.
    pub fn release(&self, url: &str) {
        lock_in_flight(&self.in_flight).remove(url);
    }

    /// Take exclusive access for a check-then-append sequence
    pub async fn lock(&self) -> LedgerGuard<'_> {
        LedgerGuard {
            path: &self.path,
            state: self.state.lock().await,
            in_flight: &self.in_flight,
        }
    }

    /// Record `(content_hash, url)` as a new line
    pub async fn append(&self, content_hash: &str, url: &str) -> Result<()> {
        self.lock().await.append(content_hash, url)
    }
}

/// Exclusive access to the ledger, held across a store check and the matching append
pub struct LedgerGuard<'a> {
    path: &'a Path,
    state: MutexGuard<'a, LedgerState>,
    in_flight: &'a std::sync::Mutex<HashSet<String>>,
}

fn lock_in_flight(
    in_flight: &std::sync::Mutex<HashSet<String>>,
) -> std::sync::MutexGuard<'_, HashSet<String>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LedgerGuard<'_> {
    /// Append one `hash|url` line with a single write, then update the in-memory set
    ///
    /// Prior lines are never touched. The set is only updated once the write succeeded.
    pub fn append(&mut self, content_hash: &str, url: &str) -> Result<()> {
        if content_hash.is_empty() || !content_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Other(format!(
                "refusing to record non-hex digest {:?}",
                content_hash
            )));
        }
        if url.is_empty() || url.trim() != url || url.contains(['\n', '\r']) {
            return Err(Error::InvalidUrl {
                url: url.to_string(),
                reason: "URL cannot be stored as a single ledger line".into(),
            });
        }

        let entry = LedgerEntry {
            content_hash: content_hash.to_string(),
            source_url: url.to_string(),
        };
        let mut line = entry.to_line();
        if self.state.needs_newline {
            line.insert(0, '\n');
        }

        self.state.file.write_all(line.as_bytes())?;
        self.state.file.flush()?;
        self.state.needs_newline = false;

        lock_in_flight(self.in_flight).remove(url);
        self.state.urls.insert(entry.source_url);
        debug!(path = %self.path.display(), url, content_hash, "Recorded URL in ledger");
        Ok(())
    }
}
