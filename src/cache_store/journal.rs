//! Journal format for the cache store
//!
//! ```text
//! favicon-cache.journal
//! 1
//!
//! CLEAN 0f115db0...e9d7 5120
//! READ 0f115db0...e9d7
//! REMOVE 0f115db0...e9d7
//! ```
//!
//! Replaying the records in order rebuilds both the index and its access
//! order. Anything that does not fit the format is reported as corruption.

use lru::LruCache;
use std::fmt;

use crate::errors::{CacheStoreError, StoreResult};
use crate::models::Fingerprint;

pub const JOURNAL_FILE: &str = "journal";
pub const JOURNAL_TEMP_FILE: &str = "journal.tmp";
pub const MAGIC: &str = "favicon-cache.journal";
pub const VERSION: &str = "1";

/// Header written at the top of every journal
pub fn header() -> String {
    format!("{MAGIC}\n{VERSION}\n\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    Clean { key: Fingerprint, len: u64 },
    Read { key: Fingerprint },
    Remove { key: Fingerprint },
}

impl JournalRecord {
    pub fn parse(line: &str) -> StoreResult<Self> {
        let mut parts = line.split(' ');
        let kind = parts.next().unwrap_or_default();
        let key = parts
            .next()
            .and_then(Fingerprint::parse)
            .ok_or_else(|| CacheStoreError::corrupt(format!("bad key in record '{line}'")))?;

        let record = match kind {
            "CLEAN" => {
                let len = parts
                    .next()
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| {
                        CacheStoreError::corrupt(format!("bad length in record '{line}'"))
                    })?;
                Self::Clean { key, len }
            }
            "READ" => Self::Read { key },
            "REMOVE" => Self::Remove { key },
            other => {
                return Err(CacheStoreError::corrupt(format!(
                    "unknown record kind '{other}'"
                )));
            }
        };

        if parts.next().is_some() {
            return Err(CacheStoreError::corrupt(format!(
                "trailing fields in record '{line}'"
            )));
        }

        Ok(record)
    }
}

impl fmt::Display for JournalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean { key, len } => writeln!(f, "CLEAN {key} {len}"),
            Self::Read { key } => writeln!(f, "READ {key}"),
            Self::Remove { key } => writeln!(f, "REMOVE {key}"),
        }
    }
}

/// Index rebuilt from a journal
#[derive(Debug)]
pub struct Replay {
    /// Live entries and their blob lengths, most recently used first
    pub index: LruCache<Fingerprint, u64>,
    /// Complete records read, including superseded ones
    pub records: usize,
    /// The journal ended mid-record and must be rewritten
    pub truncated_tail: bool,
}

/// Rebuild the index from the journal's contents
pub fn replay(contents: &str) -> StoreResult<Replay> {
    // A crash mid-append leaves a final line without its newline.
    let (complete, truncated_tail) = match contents.rfind('\n') {
        Some(end) => (&contents[..=end], end + 1 < contents.len()),
        None => ("", !contents.is_empty()),
    };

    let mut lines = complete.lines();
    if lines.next() != Some(MAGIC) {
        return Err(CacheStoreError::corrupt("missing journal magic"));
    }
    match lines.next() {
        Some(VERSION) => {}
        Some(other) => {
            return Err(CacheStoreError::corrupt(format!(
                "unsupported journal version '{other}'"
            )));
        }
        None => return Err(CacheStoreError::corrupt("missing journal version")),
    }
    if lines.next() != Some("") {
        return Err(CacheStoreError::corrupt("malformed journal header"));
    }

    let mut index = LruCache::unbounded();
    let mut records = 0;

    for line in lines {
        match JournalRecord::parse(line)? {
            JournalRecord::Clean { key, len } => {
                index.put(key, len);
            }
            JournalRecord::Read { key } => {
                if index.get(&key).is_none() {
                    return Err(CacheStoreError::corrupt(format!("READ of unknown key {key}")));
                }
            }
            JournalRecord::Remove { key } => {
                if index.pop(&key).is_none() {
                    return Err(CacheStoreError::corrupt(format!(
                        "REMOVE of unknown key {key}"
                    )));
                }
            }
        }
        records += 1;
    }

    Ok(Replay {
        index,
        records,
        truncated_tail,
    })
}

/// Journal text holding one CLEAN record per live entry
///
/// Entries are written least recently used first so a replay restores the
/// same access order.
pub fn compacted(index: &LruCache<Fingerprint, u64>) -> String {
    let mut contents = header();
    for (key, len) in index.iter().rev() {
        contents.push_str(
            &JournalRecord::Clean {
                key: key.clone(),
                len: *len,
            }
            .to_string(),
        );
    }
    contents
}
