//! Directory-backed persistence substrate
//!
//! Layout under `<root>/<namespace>/`:
//! - `<key>.jsonl`: one record per line, in append order
//! - `flags.json`: a JSON object of named booleans
//!
//! Each append is a single `write_all` of a newline-terminated line followed
//! by `sync_data`. A crash mid-write can leave a trailing fragment without a
//! newline; it is returned as-is so the caller can reject it, and the next
//! append starts on a fresh line.

use super::substrate::PersistenceSubstrate;
use crate::types::{StorageError, StorageErrorKind};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default namespace keeping tracker data apart from other application settings
pub const DEFAULT_NAMESPACE: &str = "location_tracking";

const FLAGS_FILE: &str = "flags.json";

/// File-backed substrate that survives process restarts
#[derive(Debug)]
pub struct FileSubstrate {
    dir: PathBuf,
    // Serializes appends, listings and flag rewrites within the process
    io_lock: Mutex<()>,
}

impl FileSubstrate {
    /// Open (creating if needed) `<root>/location_tracking`
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        Self::open_namespaced(root, DEFAULT_NAMESPACE)
    }

    pub fn open_namespaced(root: &Path, namespace: &str) -> Result<Self, StorageError> {
        let dir = root.join(namespace);
        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::io(format!("Failed to create storage dir {:?}: {}", dir, e))
        })?;

        log::debug!("Opened file substrate at {:?}", dir);
        Ok(Self {
            dir,
            io_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", key))
    }

    fn flags_path(&self) -> PathBuf {
        self.dir.join(FLAGS_FILE)
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.io_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_flags(&self) -> Result<BTreeMap<String, bool>, StorageError> {
        let path = self.flags_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read(&path)?;
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }

        serde_json::from_slice(&content).map_err(|e| {
            StorageError::corrupt(format!("Failed to parse flags file {:?}: {}", path, e))
        })
    }

    fn write_flags(&self, flags: &BTreeMap<String, bool>) -> Result<(), StorageError> {
        let path = self.flags_path();
        let tmp = path.with_extension("json.tmp");

        let mut file = File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, flags)?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// True if the file is non-empty and its last byte is not a newline
fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl PersistenceSubstrate for FileSubstrate {
    fn append_record(&self, key: &str, record: &str) -> Result<(), StorageError> {
        if record.contains('\n') {
            return Err(StorageError::corrupt("record must not contain a newline"));
        }

        let _guard = self.guard();
        let path = self.log_path(key);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(format!("Failed to open {:?}: {}", path, e)))?;

        let mut line = String::with_capacity(record.len() + 2);
        if ends_mid_line(&mut file)? {
            log::warn!("Route log {:?} ends with a torn record, starting a new line", path);
            line.push('\n');
        }
        line.push_str(record);
        line.push('\n');

        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn list_records(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let _guard = self.guard();
        let path = self.log_path(key);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read(&path)
            .map_err(|e| StorageError::io(format!("Failed to read {:?}: {}", path, e)))?;

        // Invalid UTF-8 stays confined to its own line and fails to decode there
        Ok(content
            .split(|&byte| byte == b'\n')
            .map(String::from_utf8_lossy)
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect())
    }

    fn clear_records(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        let path = self.log_path(key);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(format!("Failed to remove {:?}: {}", path, e))),
        }
    }

    fn get_flag(&self, key: &str) -> Result<Option<bool>, StorageError> {
        let _guard = self.guard();
        Ok(self.read_flags()?.get(key).copied())
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<(), StorageError> {
        let _guard = self.guard();
        let mut flags = match self.read_flags() {
            Ok(flags) => flags,
            Err(e) if e.kind == StorageErrorKind::Corrupt => {
                log::warn!("Discarding unreadable flags, rewriting: {}", e);
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        flags.insert(key.to_string(), value);
        self.write_flags(&flags)
    }
}
