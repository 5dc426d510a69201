//! Fail-fast plan execution.

use crate::plan::{ApplyPlan, Operation};
use thiserror::Error;
use usercheck_directory::{Directory, DirectoryError};

/// A directory request failed part-way through an account's plan.
///
/// Operations before `failed_at` were applied; nothing after it was attempted.
/// No rollback happens, so the account may be partially converged.
#[derive(Debug, Error)]
#[error("apply failed for {account} at operation {} of {total} ({operation}): {source}", .failed_at + 1)]
pub struct ApplyError {
    pub account: String,
    pub operation: String,
    pub failed_at: usize,
    pub total: usize,
    #[source]
    pub source: DirectoryError,
}

impl ApplyError {
    /// Operations that completed before the failure.
    pub fn completed(&self) -> usize {
        self.failed_at
    }
}

/// Run every operation of `plan` in order, stopping at the first failure.
///
/// Returns the number of operations applied.
pub fn execute<D: Directory + ?Sized>(
    directory: &mut D,
    plan: &ApplyPlan,
) -> Result<usize, ApplyError> {
    let total = plan.len();
    for (index, operation) in plan.iter().enumerate() {
        execute_operation(directory, operation).map_err(|source| ApplyError {
            account: plan.account.clone(),
            operation: operation.to_string(),
            failed_at: index,
            total,
            source,
        })?;
        tracing::info!(account = %plan.account, step = index + 1, total, %operation, "applied");
    }
    Ok(total)
}

/// Issue the directory requests behind one operation.
pub fn execute_operation<D: Directory + ?Sized>(
    directory: &mut D,
    operation: &Operation,
) -> Result<(), DirectoryError> {
    match operation {
        Operation::CreateAccount { path, secret } => {
            directory.create_account(path, secret.expose())
        }
        Operation::ReplaceTemplates {
            account,
            current,
            desired,
        } => {
            for template in current {
                directory.remove_template(account, template)?;
            }
            for template in desired {
                directory.add_template(account, template)?;
            }
            Ok(())
        }
        Operation::DeleteTags {
            account,
            prefix,
            keys,
        } => directory.delete_tags(account, prefix, keys),
        Operation::SetTags {
            account,
            prefix,
            tags,
        } => directory.set_tags(account, prefix, tags),
    }
}
