//! Durable storage for session records and health alerts
//!
//! Persistence is best-effort from the engine's point of view: callers log
//! and swallow failures so the in-memory flow always completes.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::SessionRecord;
use crate::monitor::health::Alert;

/// File name for session records inside a `JsonlStore` directory
pub const SESSIONS_FILE: &str = "sessions.jsonl";

/// File name for alerts inside a `JsonlStore` directory
pub const ALERTS_FILE: &str = "alerts.jsonl";

/// Error type for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Shared reference to a persistence backend
pub type SharedPersistence = Arc<dyn Persistence>;

/// Durable storage consumed by the coordinator and health monitor
#[cfg_attr(test, mockall::automock)]
pub trait Persistence: Send + Sync {
    fn save_session(&self, record: &SessionRecord) -> PersistenceResult<()>;

    fn save_alert(&self, alert: &Alert) -> PersistenceResult<()>;
}

/// In-memory store, the default when no path is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<Vec<SessionRecord>>,
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Persistence for MemoryStore {
    fn save_session(&self, record: &SessionRecord) -> PersistenceResult<()> {
        self.sessions
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?
            .push(record.clone());
        Ok(())
    }

    fn save_alert(&self, alert: &Alert) -> PersistenceResult<()> {
        self.alerts
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?
            .push(alert.clone());
        Ok(())
    }
}

/// Append-only JSONL store: one JSON object per line, one file per kind
#[derive(Debug)]
pub struct JsonlStore {
    dir: PathBuf,
    // Serializes appends so concurrent sessions never interleave lines
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read back every persisted session, skipping unreadable lines
    pub fn load_sessions(&self) -> PersistenceResult<Vec<SessionRecord>> {
        self.read_lines(SESSIONS_FILE)
    }

    /// Read back every persisted alert, skipping unreadable lines
    pub fn load_alerts(&self) -> PersistenceResult<Vec<Alert>> {
        self.read_lines(ALERTS_FILE)
    }

    fn append<T: Serialize>(&self, file: &str, value: &T) -> PersistenceResult<()> {
        let json = serde_json::to_string(value)?;
        let path = self.dir.join(file);

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        let mut handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(handle, "{json}")?;

        debug!(path = %path.display(), "Appended record");
        Ok(())
    }

    fn read_lines<T: DeserializeOwned>(&self, file: &str) -> PersistenceResult<Vec<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = std::io::BufReader::new(std::fs::File::open(&path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(value) => out.push(value),
                Err(e) => debug!(path = %path.display(), "Skipping unreadable line: {e}"),
            }
        }
        Ok(out)
    }
}

impl Persistence for JsonlStore {
    fn save_session(&self, record: &SessionRecord) -> PersistenceResult<()> {
        self.append(SESSIONS_FILE, record)
    }

    fn save_alert(&self, alert: &Alert) -> PersistenceResult<()> {
        self.append(ALERTS_FILE, alert)
    }
}
