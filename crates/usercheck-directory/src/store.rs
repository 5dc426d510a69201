//! The directory file: one JSON account record per line.
//!
//! Loading rejects anything a session could not have written: malformed
//! lines, invalid account paths and repeated ids. Saving stages the whole
//! file next to the target, syncs it and renames it into place.

use crate::account::AccountRecord;
use crate::directory::is_valid_account_path;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} line {line}: malformed account record: {source}")]
    Record {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} line {line}: invalid account path {id:?}")]
    InvalidAccount {
        path: PathBuf,
        line: usize,
        id: String,
    },

    #[error("{path} line {line}: account {id} already defined on line {first}")]
    DuplicateAccount {
        path: PathBuf,
        line: usize,
        first: usize,
        id: String,
    },

    #[error("failed to encode account {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Location of a directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryFile {
    path: PathBuf,
}

impl DirectoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Every stored account, in file order.
    pub fn load(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let text = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        self.parse(&text)
    }

    fn parse(&self, text: &str) -> Result<Vec<AccountRecord>, StoreError> {
        let mut records = Vec::new();
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let record: AccountRecord =
                serde_json::from_str(raw).map_err(|source| StoreError::Record {
                    path: self.path.clone(),
                    line,
                    source,
                })?;
            if !is_valid_account_path(&record.id) {
                return Err(StoreError::InvalidAccount {
                    path: self.path.clone(),
                    line,
                    id: record.id,
                });
            }
            if let Some(&first) = seen.get(&record.id) {
                return Err(StoreError::DuplicateAccount {
                    path: self.path.clone(),
                    line,
                    first,
                    id: record.id,
                });
            }
            seen.insert(record.id.clone(), line);
            records.push(record);
        }
        Ok(records)
    }

    /// Replace the file contents with `records`.
    ///
    /// Nothing on disk changes unless the whole write succeeds.
    pub fn save<'a>(
        &self,
        records: impl IntoIterator<Item = &'a AccountRecord>,
    ) -> Result<(), StoreError> {
        let mut contents = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|source| StoreError::Encode {
                id: record.id.clone(),
                source,
            })?;
            contents.push_str(&line);
            contents.push('\n');
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let staging = self.staging_path();
        if let Err(source) = write_synced(&staging, contents.as_bytes()) {
            let _ = fs::remove_file(&staging);
            return Err(StoreError::Write {
                path: staging,
                source,
            });
        }
        fs::rename(&staging, &self.path).map_err(|source| {
            let _ = fs::remove_file(&staging);
            StoreError::Write {
                path: self.path.clone(),
                source,
            }
        })
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging: OsString = self.path.as_os_str().to_os_string();
        staging.push(format!(".{}.partial", std::process::id()));
        PathBuf::from(staging)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
