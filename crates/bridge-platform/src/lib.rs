//! Filesystem drop-box used to hand push events to the host application.
//!
//! Each event becomes one JSON file in a watched directory. Files are written
//! under a hidden temporary name and renamed into place, so a consumer never
//! observes a partially-written event.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Field carrying the event timestamp in milliseconds since the Unix epoch.
pub const TIMESTAMP_FIELD: &str = "ts_ms";

#[derive(Debug, Error)]
pub enum DropBoxError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("event payload must serialize to a JSON object")]
    NotAnObject,
    #[error("failed creating events directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed writing event file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Atomic JSON file writer for one events directory.
#[derive(Debug)]
pub struct EventDropBox {
    dir: RwLock<PathBuf>,
    last_ts_ms: AtomicU64,
}

impl EventDropBox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: RwLock::new(dir.into()),
            last_ts_ms: AtomicU64::new(0),
        }
    }

    pub fn events_dir(&self) -> PathBuf {
        self.dir
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Point subsequent writes at another directory.
    pub fn set_dir(&self, dir: impl Into<PathBuf>) {
        let mut guard = self
            .dir
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = dir.into();
    }

    /// Create the directory if needed.
    pub fn ensure_dir(&self) -> Result<PathBuf, DropBoxError> {
        let dir = self.events_dir();
        fs::create_dir_all(&dir).map_err(|source| DropBoxError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Check that the directory accepts writes without leaving an event behind.
    pub fn probe(&self) -> Result<(), DropBoxError> {
        let dir = self.ensure_dir()?;
        let path = dir.join(format!(".probe-{}.tmp", Uuid::new_v4().simple()));
        fs::write(&path, b"{}").map_err(|source| DropBoxError::Write {
            path: path.clone(),
            source,
        })?;
        let _ = fs::remove_file(&path);
        Ok(())
    }

    /// Serialize `event` and atomically place it in the events directory.
    ///
    /// A `ts_ms` field is added when the payload does not carry one. Nothing is
    /// written when serialization fails.
    pub fn publish<T: Serialize + ?Sized>(&self, event: &T) -> Result<PathBuf, DropBoxError> {
        let mut object = match serde_json::to_value(event)? {
            Value::Object(object) => object,
            _ => return Err(DropBoxError::NotAnObject),
        };
        let ts_ms = match object.get(TIMESTAMP_FIELD).and_then(Value::as_u64) {
            Some(ts_ms) => ts_ms,
            None => {
                let ts_ms = self.next_timestamp_ms();
                object.insert(TIMESTAMP_FIELD.to_owned(), Value::from(ts_ms));
                ts_ms
            }
        };
        let encoded = encode(object)?;

        let dir = self.ensure_dir()?;
        let file_name = format!("{ts_ms}_{}.json", Uuid::new_v4().simple());
        let path = dir.join(&file_name);
        write_atomically(&path, &file_name, &encoded)?;

        debug!(path = %path.display(), "event file published");
        Ok(path)
    }

    /// Wall-clock milliseconds, forced to increase strictly between calls.
    fn next_timestamp_ms(&self) -> u64 {
        let now = now_ms();
        let previous = self
            .last_ts_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        now.max(previous.saturating_add(1))
    }
}

fn encode(object: Map<String, Value>) -> Result<Vec<u8>, DropBoxError> {
    Ok(serde_json::to_vec(&Value::Object(object))?)
}

fn write_atomically(path: &Path, file_name: &str, contents: &[u8]) -> Result<(), DropBoxError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!(".{file_name}.tmp"));

    fs::write(&temp_path, contents).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        DropBoxError::Write {
            path: temp_path.clone(),
            source,
        }
    })?;

    fs::rename(&temp_path, path).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        DropBoxError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
