//! The directory contract consumed by the reconciliation core.

use crate::store::StoreError;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use usercheck_policy::ObservedAccount;

/// Errors from directory requests.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("invalid account path: {0:?}")]
    InvalidPath(String),

    #[error("template {template} is not held by {account}")]
    TemplateNotHeld { account: String, template: String },

    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("directory lock busy: {0}")]
    LockBusy(String),

    #[error("directory not found: {0}")]
    NotFound(String),

    #[error("{operation} rejected for {account}: {reason}")]
    Rejected {
        account: String,
        operation: String,
        reason: String,
    },

    #[error("directory already exists: {0}")]
    AlreadyExists(String),

    #[error("failed to lock {path}: {source}")]
    Lock {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Listing constraints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOpts {
    pub limit_by_depth: bool,
    /// Maximum number of segments below the prefix when `limit_by_depth`.
    pub depth: usize,
}

impl ListOpts {
    /// Any depth below the prefix.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// At most `depth` segments below the prefix.
    pub fn max_depth(depth: usize) -> Self {
        Self {
            limit_by_depth: true,
            depth,
        }
    }

    pub fn admits(&self, depth: usize) -> bool {
        !self.limit_by_depth || depth <= self.depth
    }
}

/// One request as seen by a directory, for logs and test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryCall {
    List {
        prefix: String,
        opts: ListOpts,
    },
    CreateAccount {
        path: String,
    },
    DeleteAccount {
        path: String,
    },
    AddTemplate {
        account: String,
        template: String,
    },
    RemoveTemplate {
        account: String,
        template: String,
    },
    SetTags {
        account: String,
        prefix: String,
        keys: Vec<String>,
    },
    DeleteTags {
        account: String,
        prefix: String,
        keys: Vec<String>,
    },
}

impl DirectoryCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::List { .. })
    }
}

/// Account directory capabilities.
///
/// Every request is a blocking request/response. Implementations own their
/// timeout and retry policy; callers never retry.
pub trait Directory {
    /// Accounts equal to or below `prefix`, ordered by identifier.
    ///
    /// `offset` skips that many matches, `limit == 0` means no limit.
    fn list_accounts(
        &mut self,
        prefix: &str,
        offset: usize,
        limit: usize,
        opts: ListOpts,
    ) -> Result<Vec<ObservedAccount>, DirectoryError>;

    fn create_account(&mut self, path: &str, secret: &str) -> Result<(), DirectoryError>;

    fn delete_account(&mut self, path: &str) -> Result<(), DirectoryError>;

    /// Append `template` to the account's ordered template list.
    fn add_template(&mut self, account: &str, template: &str) -> Result<(), DirectoryError>;

    /// Remove the first occurrence of `template`.
    fn remove_template(&mut self, account: &str, template: &str) -> Result<(), DirectoryError>;

    /// Set `tags` under `prefix`, leaving other keys under it untouched.
    fn set_tags(
        &mut self,
        account: &str,
        prefix: &str,
        tags: &BTreeMap<String, Value>,
    ) -> Result<(), DirectoryError>;

    /// Delete `keys` under `prefix`. Absent keys are ignored.
    fn delete_tags(
        &mut self,
        account: &str,
        prefix: &str,
        keys: &[String],
    ) -> Result<(), DirectoryError>;
}

fn account_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-]+(\.[A-Za-z0-9_\-]+)*$").expect("account path regex must compile")
    })
}

/// Dot-separated segments of letters, digits, `_` and `-`.
pub fn is_valid_account_path(path: &str) -> bool {
    account_path_re().is_match(path)
}

/// Whether `id` is `prefix` itself or lies below it.
///
/// The empty prefix contains every account.
pub fn is_within(prefix: &str, id: &str) -> bool {
    if prefix.is_empty() || id == prefix {
        return true;
    }
    id.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Number of segments `id` sits below `prefix`, or `None` if outside it.
///
/// Under the empty prefix, top-level accounts have depth 0.
pub fn relative_depth(prefix: &str, id: &str) -> Option<usize> {
    if !is_within(prefix, id) {
        return None;
    }
    if prefix.is_empty() {
        return Some(id.split('.').count().saturating_sub(1));
    }
    if id == prefix {
        return Some(0);
    }
    Some(id[prefix.len() + 1..].split('.').count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_paths_are_dot_separated_segments() {
        assert!(is_valid_account_path("org"));
        assert!(is_valid_account_path("org.team-1.alice_b"));
        assert!(!is_valid_account_path(""));
        assert!(!is_valid_account_path("org..alice"));
        assert!(!is_valid_account_path(".org"));
        assert!(!is_valid_account_path("org alice"));
    }

    #[test]
    fn within_respects_segment_boundaries() {
        assert!(is_within("org", "org"));
        assert!(is_within("org", "org.alice"));
        assert!(!is_within("org", "organization"));
        assert!(!is_within("org.alice", "org"));
        assert!(is_within("", "anything.at.all"));
    }

    #[test]
    fn depth_counts_segments_below_prefix() {
        assert_eq!(relative_depth("org", "org"), Some(0));
        assert_eq!(relative_depth("org", "org.alice"), Some(1));
        assert_eq!(relative_depth("org", "org.team.alice"), Some(2));
        assert_eq!(relative_depth("org", "other"), None);
        assert_eq!(relative_depth("", "org"), Some(0));
        assert_eq!(relative_depth("", "org.alice"), Some(1));
    }

    #[test]
    fn list_opts_admit_by_depth() {
        assert!(ListOpts::unlimited().admits(7));
        assert!(ListOpts::max_depth(0).admits(0));
        assert!(!ListOpts::max_depth(0).admits(1));
    }
}
