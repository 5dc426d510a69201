//! # usercheck-directory
//!
//! Account directory layer.
//!
//! This crate provides:
//! - the `Directory` contract the reconciliation core talks to
//! - `AccountRecord` (stored accounts, secrets kept as SHA-256 digests)
//! - `MemoryDirectory` (canonical in-memory state, call log, fault injection)
//! - `DirectoryFile` (the JSONL file, validated on load, replaced atomically)
//! - `DirectorySession` (file-backed directory held under a lock for one run)
//! - `scan` (scope-aware account enumeration)
//!
//! ## Data model
//!
//! ```text
//! JSONL (on disk, one line per account)
//!     ↕  connect / flush after every mutation
//! MemoryDirectory (deterministic in-memory state)
//!     ↓  list_accounts
//! ObservedAccount (what the policy core diffs)
//! ```

pub mod account;
pub mod directory;
pub mod memory;
pub mod scan;
pub mod session;
pub mod store;

pub use account::{AccountRecord, secret_digest};
pub use directory::{
    Directory, DirectoryCall, DirectoryError, ListOpts, is_valid_account_path, is_within,
    relative_depth,
};
pub use memory::MemoryDirectory;
pub use scan::scan;
pub use session::{DirectorySession, directory_lock_path, endpoint_path};
pub use store::{DirectoryFile, StoreError};
