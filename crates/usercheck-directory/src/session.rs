//! File-backed directory sessions.
//!
//! A session opens a JSONL directory file under an exclusive lock file,
//! authenticates one account against it, serves requests from memory and
//! rewrites the file after every mutation. A mutation only becomes visible
//! in memory once the file holds it. Dropping the session releases the lock,
//! whatever the outcome of the run.

use crate::account::AccountRecord;
use crate::directory::{Directory, DirectoryError, ListOpts};
use crate::memory::MemoryDirectory;
use crate::store::DirectoryFile;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use usercheck_policy::ObservedAccount;

const FILE_SCHEME: &str = "file://";

/// Filesystem path named by a directory endpoint (`path` or `file://path`).
pub fn endpoint_path(endpoint: &str) -> PathBuf {
    PathBuf::from(endpoint.strip_prefix(FILE_SCHEME).unwrap_or(endpoint))
}

pub fn directory_lock_path(path: &Path) -> PathBuf {
    let mut lock: OsString = path.as_os_str().to_os_string();
    lock.push(".lock");
    PathBuf::from(lock)
}

/// An open, lock-holding connection to a JSONL directory.
#[derive(Debug)]
pub struct DirectorySession {
    file: DirectoryFile,
    state: MemoryDirectory,
    user: Option<String>,
    _lock: DirectoryLockGuard,
}

impl DirectorySession {
    /// Create a new directory file holding one administrative account.
    pub fn initialize(
        endpoint: &str,
        admin: &str,
        secret: &str,
    ) -> Result<PathBuf, DirectoryError> {
        let file = DirectoryFile::new(endpoint_path(endpoint));
        if file.exists() {
            return Err(DirectoryError::AlreadyExists(file.path().display().to_string()));
        }
        if !crate::directory::is_valid_account_path(admin) {
            return Err(DirectoryError::InvalidPath(admin.to_string()));
        }
        file.save(&[AccountRecord::new(admin, secret)])?;
        tracing::info!(path = %file.path().display(), admin, "initialized directory");
        Ok(file.path().to_path_buf())
    }

    /// Open the directory at `endpoint` and take its lock.
    pub fn connect(endpoint: &str) -> Result<Self, DirectoryError> {
        let file = DirectoryFile::new(endpoint_path(endpoint));
        if !file.path().is_file() {
            return Err(DirectoryError::NotFound(file.path().display().to_string()));
        }
        let lock = DirectoryLockGuard::acquire(file.path())?;
        let state = MemoryDirectory::from_records(file.load()?);
        tracing::debug!(path = %file.path().display(), accounts = state.len(), "connected to directory");
        Ok(Self {
            file,
            state,
            user: None,
            _lock: lock,
        })
    }

    /// Prove the session holds `user`'s secret.
    pub fn authenticate(&mut self, user: &str, secret: &str) -> Result<(), DirectoryError> {
        let verified = self
            .state
            .account(user)
            .is_some_and(|record| record.verify_secret(secret));
        if !verified {
            return Err(DirectoryError::AuthenticationFailed(user.to_string()));
        }
        tracing::info!(user, path = %self.file.path().display(), "authenticated");
        self.user = Some(user.to_string());
        Ok(())
    }

    /// `connect` followed by `authenticate`.
    pub fn open(endpoint: &str, user: &str, secret: &str) -> Result<Self, DirectoryError> {
        let mut session = Self::connect(endpoint)?;
        session.authenticate(user, secret)?;
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn require_auth(&self) -> Result<(), DirectoryError> {
        match self.user {
            Some(_) => Ok(()),
            None => Err(DirectoryError::NotAuthenticated),
        }
    }

    /// Run `mutation` against a copy of the state and adopt the copy once
    /// it is on disk.
    fn mutate<F>(&mut self, mutation: F) -> Result<(), DirectoryError>
    where
        F: FnOnce(&mut MemoryDirectory) -> Result<(), DirectoryError>,
    {
        self.require_auth()?;
        let mut next = self.state.clone();
        mutation(&mut next)?;
        self.file.save(next.records())?;
        self.state = next;
        Ok(())
    }
}

impl Directory for DirectorySession {
    fn list_accounts(
        &mut self,
        prefix: &str,
        offset: usize,
        limit: usize,
        opts: ListOpts,
    ) -> Result<Vec<ObservedAccount>, DirectoryError> {
        self.require_auth()?;
        self.state.list_accounts(prefix, offset, limit, opts)
    }

    fn create_account(&mut self, path: &str, secret: &str) -> Result<(), DirectoryError> {
        self.mutate(|state| state.create_account(path, secret))
    }

    fn delete_account(&mut self, path: &str) -> Result<(), DirectoryError> {
        self.mutate(|state| state.delete_account(path))
    }

    fn add_template(&mut self, account: &str, template: &str) -> Result<(), DirectoryError> {
        self.mutate(|state| state.add_template(account, template))
    }

    fn remove_template(&mut self, account: &str, template: &str) -> Result<(), DirectoryError> {
        self.mutate(|state| state.remove_template(account, template))
    }

    fn set_tags(
        &mut self,
        account: &str,
        prefix: &str,
        tags: &BTreeMap<String, Value>,
    ) -> Result<(), DirectoryError> {
        self.mutate(|state| state.set_tags(account, prefix, tags))
    }

    fn delete_tags(
        &mut self,
        account: &str,
        prefix: &str,
        keys: &[String],
    ) -> Result<(), DirectoryError> {
        self.mutate(|state| state.delete_tags(account, prefix, keys))
    }
}

#[derive(Debug)]
struct DirectoryLockGuard {
    lock_path: PathBuf,
    _file: File,
}

impl DirectoryLockGuard {
    fn acquire(path: &Path) -> Result<Self, DirectoryError> {
        let lock_path = directory_lock_path(path);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(Self {
                    lock_path,
                    _file: file,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(DirectoryError::LockBusy(lock_path.display().to_string()))
            }
            Err(source) => Err(DirectoryError::Lock {
                path: lock_path,
                source,
            }),
        }
    }
}

impl Drop for DirectoryLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
