//! Persistence substrate seam and the in-memory implementation
//!
//! A substrate is a durable ordered record log plus named boolean flags.
//! Records are opaque strings; [`RouteStore`](super::RouteStore) owns their
//! encoding.

use crate::types::StorageError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable ordered key-value/log store
///
/// Implementations must make a single `append_record` atomic with respect to
/// `list_records`: a reader sees either the whole record or none of it.
pub trait PersistenceSubstrate: Send + Sync {
    fn append_record(&self, key: &str, record: &str) -> Result<(), StorageError>;

    /// All records under `key` in append order
    fn list_records(&self, key: &str) -> Result<Vec<String>, StorageError>;

    fn clear_records(&self, key: &str) -> Result<(), StorageError>;

    fn get_flag(&self, key: &str) -> Result<Option<bool>, StorageError>;

    fn set_flag(&self, key: &str, value: bool) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    logs: HashMap<String, Vec<String>>,
    flags: HashMap<String, bool>,
    failing_appends: usize,
    failing_reads: usize,
}

/// Process-local substrate
///
/// Shared via `Arc` it outlives any single controller, which is how tests
/// simulate a process restart. Fault injection hooks make append and list
/// fail on demand.
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    state: Mutex<MemoryState>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` appends fail with an I/O error
    pub fn fail_next_appends(&self, count: usize) {
        self.lock().failing_appends = count;
    }

    /// Make the next `count` list calls fail with an I/O error
    pub fn fail_next_reads(&self, count: usize) {
        self.lock().failing_reads = count;
    }

    /// Push a raw record bypassing encoding (used to plant corrupt data)
    pub fn insert_raw(&self, key: &str, record: impl Into<String>) {
        self.lock()
            .logs
            .entry(key.to_string())
            .or_default()
            .push(record.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave a half-written record
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PersistenceSubstrate for MemorySubstrate {
    fn append_record(&self, key: &str, record: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        if state.failing_appends > 0 {
            state.failing_appends -= 1;
            return Err(StorageError::io("injected append failure"));
        }
        state
            .logs
            .entry(key.to_string())
            .or_default()
            .push(record.to_string());
        Ok(())
    }

    fn list_records(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let mut state = self.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(StorageError::io("injected read failure"));
        }
        Ok(state.logs.get(key).cloned().unwrap_or_default())
    }

    fn clear_records(&self, key: &str) -> Result<(), StorageError> {
        self.lock().logs.remove(key);
        Ok(())
    }

    fn get_flag(&self, key: &str) -> Result<Option<bool>, StorageError> {
        Ok(self.lock().flags.get(key).copied())
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<(), StorageError> {
        self.lock().flags.insert(key.to_string(), value);
        Ok(())
    }
}
