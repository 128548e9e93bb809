// src/error.rs
//! Error taxonomy for the collection pipeline and scheduler.
//!
//! Per-source errors (`FetchError`, `ExtractionError`) are absorbed by the
//! coordinator; `SnapshotWriteError` fails a run; `LockError::Held` is a skip,
//! not a failure; `SchedulerRunError` drives the retry-or-exhaust path.

use thiserror::Error;

use crate::store::Slot;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {locator} timed out after {secs}s")]
    Timeout { locator: String, secs: u64 },

    #[error("request to {locator} failed: {reason}")]
    Network { locator: String, reason: String },

    #[error("{locator} answered HTTP {status}")]
    Status { locator: String, status: u16 },

    #[error("unsupported locator `{0}`")]
    UnsupportedLocator(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("body from `{source_name}` is not valid UTF-8: {reason}")]
    Encoding { source_name: String, reason: String },

    #[error("malformed content from `{source_name}`: {reason}")]
    Malformed { source_name: String, reason: String },
}

/// Why one source contributed nothing to a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o on {slot}: {source}")]
    Io {
        slot: Slot,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {0} rejected")]
    Rejected(Slot),
}

#[derive(Debug, Error)]
pub enum SnapshotWriteError {
    #[error("encoding {slot}: {source}")]
    Encode {
        slot: Slot,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("run lock held for {age_secs}s")]
    Held { age_secs: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SchedulerRunError {
    #[error("pipeline attempt panicked: {0}")]
    Panicked(String),

    #[error("pipeline failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("schedule state: {0}")]
    State(#[source] SnapshotWriteError),

    #[error("run lock: {0}")]
    Lock(#[source] StoreError),
}

#[derive(Debug, Error)]
pub enum StateUpdateError {
    #[error("invalid schedule update: {0}")]
    Invalid(#[source] serde_json::Error),

    #[error(transparent)]
    Write(#[from] SnapshotWriteError),
}
