// src/store.rs
//! Storage port for the snapshot, stats, schedule state and run lock.
//!
//! Every write is an atomic replace: `FileStore` writes a sibling temp file
//! and renames it over the target, so readers never see a partial file.
//! Readers treat a missing or unparsable file as "no data yet".

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{SnapshotWriteError, StoreError};

/// Named locations the collector persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Snapshot,
    Stats,
    Schedule,
    Lock,
}

impl Slot {
    pub fn file_name(self) -> &'static str {
        match self {
            Slot::Snapshot => "scraped_titles.json",
            Slot::Stats => "scraper_stats.json",
            Slot::Schedule => "scheduler_config.json",
            Slot::Lock => "scheduler.lock",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// `Ok(None)` when nothing has been written yet.
    async fn read(&self, slot: Slot) -> Result<Option<Vec<u8>>, StoreError>;
    async fn write_atomic(&self, slot: Slot, bytes: &[u8]) -> Result<(), StoreError>;
    /// Removing an absent slot is not an error.
    async fn remove(&self, slot: Slot) -> Result<(), StoreError>;
}

/// Read and decode a JSON slot. Missing, unreadable or corrupt content all
/// come back as `None`; the failure is logged.
pub async fn load_json<T: DeserializeOwned>(store: &dyn Store, slot: Slot) -> Option<T> {
    let bytes = match store.read(slot).await {
        Ok(Some(b)) => b,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(%slot, error = %e, "read failed; treating as empty");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(%slot, error = %e, "unparsable content; treating as empty");
            None
        }
    }
}

/// Encode as pretty JSON and replace the slot atomically. Returns the exact
/// bytes written.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn Store,
    slot: Slot,
    value: &T,
) -> Result<Vec<u8>, SnapshotWriteError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|source| SnapshotWriteError::Encode { slot, source })?;
    store.write_atomic(slot, &bytes).await?;
    Ok(bytes)
}

/* ----------------------------
File-backed store
---------------------------- */

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    fn temp_path_for(&self, slot: Slot) -> PathBuf {
        self.dir
            .join(format!(".{}.{}.tmp", slot.file_name(), std::process::id()))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn read(&self, slot: Slot) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(slot)).await {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { slot, source }),
        }
    }

    async fn write_atomic(&self, slot: Slot, bytes: &[u8]) -> Result<(), StoreError> {
        let io = |source: std::io::Error| StoreError::Io { slot, source };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;
        let tmp = self.temp_path_for(slot);
        if let Err(source) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io(source));
        }
        if let Err(source) = tokio::fs::rename(&tmp, self.path_for(slot)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io(source));
        }
        Ok(())
    }

    async fn remove(&self, slot: Slot) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(slot)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { slot, source }),
        }
    }
}

/* ----------------------------
In-memory store (tests, tools)
---------------------------- */

/// Map-backed store. Individual slots can be made to reject writes, which is
/// how tests exercise the snapshot-write failure path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<Slot, Vec<u8>>>,
    rejecting: Mutex<HashSet<Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_writes(&self, slot: Slot, reject: bool) {
        let mut r = self.rejecting.lock().expect("memory store mutex poisoned");
        if reject {
            r.insert(slot);
        } else {
            r.remove(&slot);
        }
    }

    pub fn get(&self, slot: Slot) -> Option<Vec<u8>> {
        self.slots
            .lock()
            .expect("memory store mutex poisoned")
            .get(&slot)
            .cloned()
    }

    pub fn put(&self, slot: Slot, bytes: impl Into<Vec<u8>>) {
        self.slots
            .lock()
            .expect("memory store mutex poisoned")
            .insert(slot, bytes.into());
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, slot: Slot) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.get(slot))
    }

    async fn write_atomic(&self, slot: Slot, bytes: &[u8]) -> Result<(), StoreError> {
        if self
            .rejecting
            .lock()
            .expect("memory store mutex poisoned")
            .contains(&slot)
        {
            return Err(StoreError::Rejected(slot));
        }
        self.put(slot, bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, slot: Slot) -> Result<(), StoreError> {
        self.slots
            .lock()
            .expect("memory store mutex poisoned")
            .remove(&slot);
        Ok(())
    }
}
