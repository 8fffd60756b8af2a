//! Per-player record persistence.
//!
//! Consent survives restarts through a flat store of one record per player.
//! The store is behind the [`RecordStore`] trait so tests can swap the disk
//! for a map:
//!
//! - [`JsonFileRecordStore`]: `<dir>/<player id>.json`, pretty-printed,
//!   written atomically (temp file, then rename).
//! - [`MemoryRecordStore`]: a mutex-guarded map with an off switch for
//!   simulating write failures.
//!
//! [`RecordWriter`] decides WHERE saves run. `Inline` writes on the calling
//! thread; `Background` hands records to a blocking worker so the event
//! thread never touches the disk. [`RecordWriter::flush`] waits for that
//! worker to catch up.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use pvpguard_protocol::{Codec, JsonCodec, PlayerId, PlayerStatus, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::StoreError;

/// The persisted form of a player's consent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub pvp_enabled: bool,
    #[serde(default)]
    pub cooldown_end: Option<Timestamp>,
    #[serde(default)]
    pub status: PlayerStatus,
    #[serde(default = "epoch")]
    pub last_updated: Timestamp,
}

fn epoch() -> Timestamp {
    Timestamp::ZERO
}

/// Loads and saves consent records.
///
/// Implementations do blocking I/O. The consent store only calls `save`
/// through a [`RecordWriter`], which keeps it off the event thread when
/// configured as `Background`.
pub trait RecordStore: Send + Sync + 'static {
    /// Returns `Ok(None)` if the player has no record yet.
    fn load(&self, id: PlayerId) -> Result<Option<ConsentRecord>, StoreError>;

    fn save(&self, id: PlayerId, record: &ConsentRecord) -> Result<(), StoreError>;

    /// Every readable record. Unreadable ones are skipped.
    fn load_all(&self) -> Result<Vec<(PlayerId, ConsentRecord)>, StoreError>;
}

// ---------------------------------------------------------------------------
// JsonFileRecordStore
// ---------------------------------------------------------------------------

/// A directory of JSON files, one per player.
#[derive(Debug, Clone)]
pub struct JsonFileRecordStore {
    dir: PathBuf,
    codec: JsonCodec,
}

impl JsonFileRecordStore {
    /// Opens (and if needed creates) the record directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), "consent record store opened");
        Ok(Self { dir, codec: JsonCodec::pretty() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: PlayerId) -> PathBuf {
        self.dir.join(format!("{}.json", id.0))
    }

    fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, data)?;
        fs::rename(&temp, path)?;
        Ok(())
    }
}

impl RecordStore for JsonFileRecordStore {
    fn load(&self, id: PlayerId) -> Result<Option<ConsentRecord>, StoreError> {
        let path = self.path_for(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, id: PlayerId, record: &ConsentRecord) -> Result<(), StoreError> {
        let bytes = self.codec.encode(record)?;
        Self::write_atomic(&self.path_for(id), &bytes)
    }

    fn load_all(&self) -> Result<Vec<(PlayerId, ConsentRecord)>, StoreError> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
                .map(PlayerId)
            else {
                continue;
            };

            match fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|b| self.codec.decode(&b).map_err(StoreError::from))
            {
                Ok(record) => records.push((id, record)),
                Err(e) => {
                    tracing::warn!(player_id = %id, error = %e, "skipping unreadable consent record");
                }
            }
        }

        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// MemoryRecordStore
// ---------------------------------------------------------------------------

/// An in-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<PlayerId, ConsentRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The stored record for a player, bypassing any cache.
    pub fn get(&self, id: PlayerId) -> Option<ConsentRecord> {
        self.lock().get(&id).cloned()
    }

    pub fn insert(&self, id: PlayerId, record: ConsentRecord) {
        self.lock().insert(id, record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PlayerId, ConsentRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, id: PlayerId) -> Result<Option<ConsentRecord>, StoreError> {
        Ok(self.get(id))
    }

    fn save(&self, id: PlayerId, record: &ConsentRecord) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        self.insert(id, record.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<(PlayerId, ConsentRecord)>, StoreError> {
        Ok(self.lock().iter().map(|(id, r)| (*id, r.clone())).collect())
    }
}

// ---------------------------------------------------------------------------
// RecordWriter
// ---------------------------------------------------------------------------

/// A job for the background writer.
#[derive(Debug)]
pub enum WriteOp {
    Save(PlayerId, ConsentRecord),
    /// Acknowledged once every save queued before it has been attempted.
    Flush(oneshot::Sender<()>),
}

/// Where record saves are executed.
///
/// Both variants log failures with `tracing::error!` and drop them. A lost
/// save costs at most one state change after a restart; blocking or failing
/// the command would cost the player their action right now.
#[derive(Clone)]
pub enum RecordWriter {
    /// Save synchronously on the caller's thread.
    Inline(Arc<dyn RecordStore>),
    /// Queue saves to a dedicated blocking worker.
    Background(mpsc::UnboundedSender<WriteOp>),
}

impl RecordWriter {
    pub fn inline(store: Arc<dyn RecordStore>) -> Self {
        Self::Inline(store)
    }

    /// Starts the background worker on Tokio's blocking pool.
    ///
    /// Records are saved in the order they were queued. The worker exits
    /// after every clone of the writer is dropped and the queue is drained;
    /// the handle resolves to the number of records saved.
    pub fn spawn(store: Arc<dyn RecordStore>) -> (Self, JoinHandle<u64>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();

        let handle = tokio::task::spawn_blocking(move || {
            let mut saved = 0;
            while let Some(op) = rx.blocking_recv() {
                match op {
                    WriteOp::Save(id, record) => {
                        if save_logged(store.as_ref(), id, &record) {
                            saved += 1;
                        }
                    }
                    WriteOp::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            tracing::debug!(saved, "record writer stopped");
            saved
        });

        (Self::Background(tx), handle)
    }

    pub fn write(&self, id: PlayerId, record: ConsentRecord) {
        match self {
            Self::Inline(store) => {
                save_logged(store.as_ref(), id, &record);
            }
            Self::Background(tx) => {
                if tx.send(WriteOp::Save(id, record)).is_err() {
                    tracing::error!(player_id = %id, "record writer stopped, consent record not saved");
                }
            }
        }
    }

    /// Waits until every save queued so far has been attempted.
    ///
    /// Returns immediately for `Inline`. Logs and returns if the background
    /// worker is gone; saves it never took are lost.
    pub async fn flush(&self) {
        let Self::Background(tx) = self else {
            return;
        };

        let (ack, done) = oneshot::channel();
        if tx.send(WriteOp::Flush(ack)).is_err() || done.await.is_err() {
            tracing::error!("record writer stopped before flushing, queued consent records may be lost");
            return;
        }
        tracing::debug!("consent records flushed");
    }
}

impl std::fmt::Debug for RecordWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("RecordWriter::Inline"),
            Self::Background(_) => f.write_str("RecordWriter::Background"),
        }
    }
}

fn save_logged(store: &dyn RecordStore, id: PlayerId, record: &ConsentRecord) -> bool {
    match store.save(id, record) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(player_id = %id, error = %e, "failed to save consent record");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(enabled: bool) -> ConsentRecord {
        ConsentRecord {
            username: Some("alex".into()),
            pvp_enabled: enabled,
            cooldown_end: None,
            status: PlayerStatus::Recording,
            last_updated: Timestamp(9),
        }
    }

    #[test]
    fn test_json_store_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).unwrap();

        store.save(PlayerId(7), &record(true)).unwrap();

        assert_eq!(store.load(PlayerId(7)).unwrap(), Some(record(true)));
        assert!(dir.path().join("7.json").exists());
        // No temp file left behind after the rename.
        assert!(!dir.path().join("7.json.tmp").exists());
    }

    #[test]
    fn test_json_store_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).unwrap();

        assert_eq!(store.load(PlayerId(1)).unwrap(), None);
    }

    #[test]
    fn test_json_store_corrupt_record_is_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("3.json"), b"{ nope").unwrap();

        assert!(matches!(store.load(PlayerId(3)), Err(StoreError::Codec(_))));
    }

    #[test]
    fn test_json_store_load_all_skips_junk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::open(dir.path()).unwrap();
        store.save(PlayerId(1), &record(true)).unwrap();
        store.save(PlayerId(2), &record(false)).unwrap();
        fs::write(dir.path().join("3.json"), b"garbage").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("alice.json"), b"{}").unwrap();

        let mut all = store.load_all().unwrap();
        all.sort_by_key(|(id, _)| *id);

        let ids: Vec<_> = all.iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_record_missing_fields_use_defaults() {
        let record: ConsentRecord = JsonCodec::compact().decode(b"{}").unwrap();
        assert!(!record.pvp_enabled);
        assert_eq!(record.status, PlayerStatus::None);
        assert_eq!(record.last_updated, Timestamp::ZERO);
    }

    #[test]
    fn test_memory_store_failure_injection() {
        let store = MemoryRecordStore::new();
        store.set_fail_writes(true);

        assert!(store.save(PlayerId(1), &record(true)).is_err());
        assert!(store.is_empty());

        store.set_fail_writes(false);
        assert!(store.save(PlayerId(1), &record(true)).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_inline_writer_swallows_failures() {
        let store = Arc::new(MemoryRecordStore::new());
        store.set_fail_writes(true);
        let writer = RecordWriter::inline(store.clone());

        // Must not panic or propagate.
        writer.write(PlayerId(1), record(true));

        assert!(store.get(PlayerId(1)).is_none());
    }

    #[tokio::test]
    async fn test_background_writer_saves_in_order() {
        let store = Arc::new(MemoryRecordStore::new());
        let (writer, handle) = RecordWriter::spawn(store.clone());

        writer.write(PlayerId(1), record(true));
        writer.write(PlayerId(1), record(false));
        drop(writer);

        assert_eq!(handle.await.unwrap(), 2);
        // The later write wins.
        assert_eq!(store.get(PlayerId(1)), Some(record(false)));
    }

    /// Takes a while per save, like a slow disk.
    struct SlowStore {
        inner: MemoryRecordStore,
    }

    impl RecordStore for SlowStore {
        fn load(&self, id: PlayerId) -> Result<Option<ConsentRecord>, StoreError> {
            self.inner.load(id)
        }

        fn save(&self, id: PlayerId, record: &ConsentRecord) -> Result<(), StoreError> {
            std::thread::sleep(std::time::Duration::from_millis(20));
            self.inner.save(id, record)
        }

        fn load_all(&self) -> Result<Vec<(PlayerId, ConsentRecord)>, StoreError> {
            self.inner.load_all()
        }
    }

    #[tokio::test]
    async fn test_background_writer_flush_waits_for_queued_saves() {
        let store = Arc::new(SlowStore { inner: MemoryRecordStore::new() });
        let (writer, _handle) = RecordWriter::spawn(store.clone());

        for id in 1..=5 {
            writer.write(PlayerId(id), record(true));
        }
        writer.flush().await;

        // The writer is still alive; flushing did not need to close it.
        assert_eq!(store.inner.len(), 5);
        writer.write(PlayerId(6), record(true));
        writer.flush().await;
        assert_eq!(store.inner.len(), 6);
    }

    #[tokio::test]
    async fn test_inline_writer_flush_is_immediate() {
        let store = Arc::new(MemoryRecordStore::new());
        let writer = RecordWriter::inline(store.clone());

        writer.write(PlayerId(1), record(true));
        writer.flush().await;

        assert_eq!(store.len(), 1);
    }
}
