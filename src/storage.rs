//! Durable key-value storage for persisted form state.
//!
//! [`FileStorage`] maps each key to `<dir>/<key>.json` and writes through a
//! temp file plus rename. [`MemoryStorage`] backs tests and ephemeral runs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SurveyError;

/// A key names a single file, so it must be non-empty and carry no path
/// separators or dots.
pub fn check_key(key: &str) -> Result<(), SurveyError> {
    let bad = key.trim().is_empty() || key.contains(['/', '\\', '.']);
    if bad {
        return Err(SurveyError::InvalidStorageKey {
            key: key.to_owned(),
        });
    }
    Ok(())
}

/// Client-side key-value store, scoped to one origin (one directory).
pub trait Storage {
    /// Returns `Ok(None)` when no entry exists for `key`.
    fn get(&self, key: &str) -> Result<Option<String>, SurveyError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SurveyError>;

    /// Removing a missing entry is not an error.
    fn remove(&self, key: &str) -> Result<(), SurveyError>;
}

impl<S: Storage + ?Sized> Storage for &S {
    fn get(&self, key: &str) -> Result<Option<String>, SurveyError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SurveyError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), SurveyError> {
        (**self).remove(key)
    }
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`. Keys that could escape `dir` are
    /// rejected.
    pub fn entry_path(&self, key: &str) -> Result<PathBuf, SurveyError> {
        check_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SurveyError> {
        match fs::read_to_string(self.entry_path(key)?) {
            Ok(c) => Ok(Some(c)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SurveyError::StorageReadFailed {
                key: key.to_owned(),
                detail: e.to_string(),
            }),
        }
    }

    /// Creates the storage directory on first write. Writes to a temp file
    /// and renames; falls back to a direct write if the rename fails.
    fn set(&self, key: &str, value: &str) -> Result<(), SurveyError> {
        let path = self.entry_path(key)?;
        let write_err = |detail: String| SurveyError::StorageWriteFailed {
            key: key.to_owned(),
            detail,
        };

        fs::create_dir_all(&self.dir)
            .map_err(|e| write_err(format!("failed to create {}: {e}", self.dir.display())))?;

        let tmp_path = self.dir.join(format!("{key}.json.tmp"));

        (|| -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(value.as_bytes())?;
            f.flush()?;
            Ok(())
        })()
        .map_err(|e| write_err(format!("{}: {e}", tmp_path.display())))?;

        if fs::rename(&tmp_path, &path).is_err() {
            fs::write(&path, value).map_err(|e| write_err(e.to_string()))?;
            let _ = fs::remove_file(&tmp_path);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SurveyError> {
        match fs::remove_file(self.entry_path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SurveyError::StorageRemoveFailed {
                key: key.to_owned(),
                detail: e.to_string(),
            }),
        }
    }
}

/// In-process storage. Interior mutability mirrors the shared, always-writable
/// nature of browser storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SurveyError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SurveyError> {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SurveyError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
