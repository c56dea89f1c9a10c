use lru::LruCache;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::journal::{self, JOURNAL_FILE, JOURNAL_TEMP_FILE, JournalRecord};
use crate::errors::{CacheStoreError, StoreResult};
use crate::models::Fingerprint;

const BLOB_EXTENSION: &str = "blob";
const TEMP_EXTENSION: &str = "tmp";

/// Redundant journal records tolerated before a compaction
pub const COMPACTION_THRESHOLD: usize = 2000;

/// Snapshot of the store's occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: u64,
    pub capacity_bytes: u64,
}

/// Size-bounded, journaled blob store keyed by [`Fingerprint`]
///
/// Every mutation (writes, evictions, journal appends and resets) happens
/// under one async mutex. Blob bytes are written to a temporary file
/// before the lock is taken and renamed into place under it, so readers
/// never observe a partial blob.
pub struct CacheStore {
    directory: PathBuf,
    capacity_bytes: u64,
    state: Mutex<StoreState>,
}

struct StoreState {
    directory: PathBuf,
    index: LruCache<Fingerprint, u64>,
    size_bytes: u64,
    journal: File,
    journal_records: usize,
}

/// Files the store recognises in its directory
enum StoreFile {
    Blob(Option<Fingerprint>),
    Temp,
    Journal,
    Foreign,
}

impl StoreFile {
    fn classify(name: &str) -> Self {
        if name == JOURNAL_FILE {
            return Self::Journal;
        }
        match name.rsplit_once('.') {
            Some((stem, BLOB_EXTENSION)) => Self::Blob(Fingerprint::parse(stem)),
            Some((_, TEMP_EXTENSION)) => Self::Temp,
            _ => Self::Foreign,
        }
    }
}

impl CacheStore {
    /// Open or create the store rooted at `directory`
    ///
    /// An unreadable or inconsistent journal is discarded together with the
    /// blobs it describes; only I/O failures on the directory itself are
    /// returned.
    pub async fn open(directory: impl AsRef<Path>, capacity_bytes: u64) -> StoreResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).await?;

        let mut state = match StoreState::load(&directory).await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Cache store at {} is unusable, resetting: {}",
                    directory.display(),
                    e
                );
                StoreState::reset(&directory).await?
            }
        };

        state.evict_to(capacity_bytes).await;
        state.compact_if_needed().await;

        info!(
            "Opened icon cache at {} ({} entries, {} of {} bytes)",
            directory.display(),
            state.index.len(),
            state.size_bytes,
            capacity_bytes
        );

        Ok(Self {
            directory,
            capacity_bytes,
            state: Mutex::new(state),
        })
    }

    /// Read the blob stored under `key`, promoting it in access order
    pub async fn get(&self, key: &Fingerprint) -> Option<Vec<u8>> {
        let mut state = self.state.lock().await;
        let expected = *state.index.get(key)?;

        match fs::read(state.blob_path(key)).await {
            Ok(blob) if blob.len() as u64 == expected => {
                // A failed append has already reset the store; the bytes are still good.
                let _ = state.append(JournalRecord::Read { key: key.clone() }).await;
                state.compact_if_needed().await;
                Some(blob)
            }
            Ok(blob) => {
                warn!(
                    "Cached blob {} has {} bytes, expected {}; dropping it",
                    key,
                    blob.len(),
                    expected
                );
                state.discard(key).await;
                None
            }
            Err(e) => {
                warn!("Cached blob {} is unreadable, dropping it: {}", key, e);
                state.discard(key).await;
                None
            }
        }
    }

    /// Whether `key` is present, without touching access order
    pub async fn contains(&self, key: &Fingerprint) -> bool {
        self.state.lock().await.index.contains(key)
    }

    /// Store `blob` under `key`, replacing any previous value
    ///
    /// Least recently used entries are evicted until the store fits its
    /// capacity. A blob larger than the whole capacity is rejected and
    /// leaves the store untouched.
    pub async fn put(&self, key: &Fingerprint, blob: &[u8]) -> StoreResult<()> {
        let size = blob.len() as u64;
        if size > self.capacity_bytes {
            return Err(CacheStoreError::BlobTooLarge {
                size,
                capacity: self.capacity_bytes,
            });
        }

        let temp_path = self.directory.join(format!(
            "{}.{}.{}",
            key,
            uuid::Uuid::new_v4().simple(),
            TEMP_EXTENSION
        ));
        if let Err(e) = write_synced(&temp_path, blob).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        let mut state = self.state.lock().await;
        if let Err(e) = fs::rename(&temp_path, state.blob_path(key)).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Some(previous) = state.index.put(key.clone(), size) {
            state.size_bytes -= previous;
        }
        state.size_bytes += size;

        state
            .append(JournalRecord::Clean {
                key: key.clone(),
                len: size,
            })
            .await?;

        debug!("Stored {} bytes under {}", size, key);
        state.evict_to(self.capacity_bytes).await;
        state.compact_if_needed().await;
        Ok(())
    }

    /// Remove the entry for `key`, returning whether one existed
    pub async fn remove(&self, key: &Fingerprint) -> bool {
        let mut state = self.state.lock().await;
        if !state.index.contains(key) {
            return false;
        }
        state.discard(key).await;
        state.compact_if_needed().await;
        true
    }

    /// Remove the entry for `key` only while it still holds exactly `blob`
    ///
    /// Lets a reader drop bytes it found unusable without discarding a newer
    /// value written since it read them.
    pub async fn remove_if_matches(&self, key: &Fingerprint, blob: &[u8]) -> bool {
        let mut state = self.state.lock().await;
        if state.index.peek(key) != Some(&(blob.len() as u64)) {
            return false;
        }
        match fs::read(state.blob_path(key)).await {
            Ok(current) if current != blob => return false,
            Ok(_) => {}
            Err(e) => debug!("Cached blob {} is unreadable, dropping it: {}", key, e),
        }
        state.discard(key).await;
        state.compact_if_needed().await;
        true
    }

    /// Drop every entry and start a fresh journal
    pub async fn clear(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        *state = StoreState::reset(&self.directory).await?;
        info!("Cleared icon cache at {}", self.directory.display());
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.index.len(),
            size_bytes: state.size_bytes,
            capacity_bytes: self.capacity_bytes,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }
}

impl StoreState {
    /// Rebuild state from an existing journal, or start empty if there is none
    async fn load(directory: &Path) -> StoreResult<Self> {
        let journal_path = directory.join(JOURNAL_FILE);

        let contents = match fs::read(&journal_path).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map_err(|_| CacheStoreError::corrupt("journal is not valid UTF-8"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No journal in {}, starting empty", directory.display());
                return Self::reset(directory).await;
            }
            Err(e) => return Err(e.into()),
        };

        let replay = journal::replay(&contents)?;

        let mut size_bytes: u64 = 0;
        for (key, len) in replay.index.iter() {
            let path = blob_path(directory, key);
            let actual = match fs::metadata(&path).await {
                Ok(metadata) => metadata.len(),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(CacheStoreError::corrupt(format!("blob {key} is missing")));
                }
                Err(e) => return Err(e.into()),
            };
            if actual != *len {
                return Err(CacheStoreError::corrupt(format!(
                    "blob {key} has {actual} bytes, journal says {len}"
                )));
            }
            size_bytes += *len;
        }

        // Leftovers of interrupted writes: temp files and blobs never committed.
        let mut entries = fs::read_dir(directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let stale = match StoreFile::classify(&name.to_string_lossy()) {
                StoreFile::Temp => true,
                StoreFile::Blob(Some(key)) => !replay.index.contains(&key),
                StoreFile::Blob(None) => true,
                StoreFile::Journal | StoreFile::Foreign => false,
            };
            if stale {
                debug!("Removing stale cache file {}", entry.path().display());
                remove_if_present(&entry.path()).await?;
            }
        }

        let mut state = Self {
            directory: directory.to_path_buf(),
            index: replay.index,
            size_bytes,
            journal: open_journal(&journal_path).await?,
            journal_records: replay.records,
        };

        if replay.truncated_tail {
            warn!("Journal in {} ended mid-record, rewriting", directory.display());
            state.rewrite_journal().await?;
        }

        Ok(state)
    }

    /// Delete everything the store owns in `directory` and start empty
    async fn reset(directory: &Path) -> StoreResult<Self> {
        let mut entries = fs::read_dir(directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !matches!(
                StoreFile::classify(&name.to_string_lossy()),
                StoreFile::Foreign
            ) {
                remove_if_present(&entry.path()).await?;
            }
        }

        let journal_path = directory.join(JOURNAL_FILE);
        write_synced(&journal_path, journal::header().as_bytes()).await?;

        Ok(Self {
            directory: directory.to_path_buf(),
            index: LruCache::unbounded(),
            size_bytes: 0,
            journal: open_journal(&journal_path).await?,
            journal_records: 0,
        })
    }

    fn blob_path(&self, key: &Fingerprint) -> PathBuf {
        blob_path(&self.directory, key)
    }

    /// Append a record, resetting the store if the journal cannot be written
    async fn append(&mut self, record: JournalRecord) -> std::io::Result<()> {
        let line = record.to_string();
        let written = match self.journal.write_all(line.as_bytes()).await {
            Ok(()) => self.journal.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            warn!(
                "Failed to append to journal in {}, resetting cache: {}",
                self.directory.display(),
                e
            );
            self.heal().await;
            return Err(e);
        }

        self.journal_records += 1;
        Ok(())
    }

    async fn heal(&mut self) {
        match Self::reset(&self.directory).await {
            Ok(fresh) => *self = fresh,
            Err(e) => {
                // Keep serving from memory; the next open will try again.
                warn!("Cache reset in {} failed: {}", self.directory.display(), e);
                self.index.clear();
                self.size_bytes = 0;
            }
        }
    }

    /// Drop `key` from the index and delete its blob
    async fn discard(&mut self, key: &Fingerprint) {
        if let Some(len) = self.index.pop(key) {
            self.size_bytes -= len;
            if let Err(e) = remove_if_present(&self.blob_path(key)).await {
                warn!("Failed to delete cached blob {}: {}", key, e);
            }
            let _ = self.append(JournalRecord::Remove { key: key.clone() }).await;
        }
    }

    /// Evict least recently used entries until the total fits `budget`
    async fn evict_to(&mut self, budget: u64) {
        while self.size_bytes > budget {
            let Some((key, _)) = self.index.peek_lru().map(|(k, v)| (k.clone(), *v)) else {
                break;
            };
            debug!("Evicting {} from icon cache", key);
            self.discard(&key).await;
        }
    }

    fn redundant_records(&self) -> usize {
        self.journal_records.saturating_sub(self.index.len())
    }

    async fn compact_if_needed(&mut self) {
        if self.redundant_records() <= COMPACTION_THRESHOLD.max(self.index.len()) {
            return;
        }
        let before = self.journal_records;
        match self.rewrite_journal().await {
            Ok(()) => info!(
                "Compacted icon cache journal from {} to {} records",
                before, self.journal_records
            ),
            Err(e) => {
                warn!("Journal compaction failed, resetting cache: {}", e);
                self.heal().await;
            }
        }
    }

    /// Replace the journal with one CLEAN record per live entry
    async fn rewrite_journal(&mut self) -> StoreResult<()> {
        let temp_path = self.directory.join(JOURNAL_TEMP_FILE);
        let journal_path = self.directory.join(JOURNAL_FILE);

        write_synced(&temp_path, journal::compacted(&self.index).as_bytes()).await?;
        fs::rename(&temp_path, &journal_path).await?;

        self.journal = open_journal(&journal_path).await?;
        self.journal_records = self.index.len();
        Ok(())
    }
}

fn blob_path(directory: &Path, key: &Fingerprint) -> PathBuf {
    directory.join(format!("{key}.{BLOB_EXTENSION}"))
}

async fn open_journal(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().append(true).open(path).await
}

async fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
