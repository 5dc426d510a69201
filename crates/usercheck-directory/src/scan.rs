//! Scope-aware account enumeration.

use crate::directory::{Directory, DirectoryError, ListOpts};
use usercheck_policy::{ObservedAccount, ScopeMode};

/// Accounts a declaration for `prefix` applies to.
///
/// `ExactAccountOnly` lists at depth 0 and keeps the prefix account itself;
/// `DescendantsOnly` lists at any depth and drops it. An empty result is
/// returned as-is: whether that is an error is the caller's decision.
pub fn scan<D: Directory + ?Sized>(
    directory: &mut D,
    prefix: &str,
    scope: ScopeMode,
) -> Result<Vec<ObservedAccount>, DirectoryError> {
    let opts = match scope {
        ScopeMode::ExactAccountOnly => ListOpts::max_depth(0),
        ScopeMode::DescendantsOnly => ListOpts::unlimited(),
    };

    let listed = directory.list_accounts(prefix, 0, 0, opts)?;
    let total = listed.len();
    let accounts: Vec<ObservedAccount> = listed
        .into_iter()
        .filter(|account| match scope {
            ScopeMode::ExactAccountOnly => account.account_id == prefix,
            ScopeMode::DescendantsOnly => account.account_id != prefix,
        })
        .collect();

    tracing::debug!(prefix, %scope, listed = total, selected = accounts.len(), "scanned accounts");
    Ok(accounts)
}
