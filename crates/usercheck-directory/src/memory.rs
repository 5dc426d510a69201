//! In-memory directory.
//!
//! The canonical state behind every directory in this crate. File-backed
//! sessions wrap one and persist it; tests use it directly, together with
//! the call log and fault injection.

use crate::account::AccountRecord;
use crate::directory::{
    Directory, DirectoryCall, DirectoryError, ListOpts, is_valid_account_path, relative_depth,
};
use serde_json::Value;
use std::collections::BTreeMap;
use usercheck_policy::ObservedAccount;

/// Deterministic in-memory account directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    accounts: BTreeMap<String, AccountRecord>,
    calls: Vec<DirectoryCall>,
    /// Account → mutations still allowed before every further one fails.
    faults: BTreeMap<String, usize>,
    failing_lists: Vec<String>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored records. Duplicate IDs use last-write-wins.
    pub fn from_records(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        let mut directory = Self::new();
        for record in records {
            directory.accounts.insert(record.id.clone(), record);
        }
        directory
    }

    /// Insert or replace a record without logging a call.
    pub fn upsert(&mut self, record: AccountRecord) -> Option<AccountRecord> {
        self.accounts.insert(record.id.clone(), record)
    }

    pub fn account(&self, id: &str) -> Option<&AccountRecord> {
        self.accounts.get(id)
    }

    /// All records in identifier order.
    pub fn records(&self) -> impl Iterator<Item = &AccountRecord> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> &[DirectoryCall] {
        &self.calls
    }

    /// Requests that changed (or tried to change) state.
    pub fn mutations(&self) -> Vec<&DirectoryCall> {
        self.calls.iter().filter(|call| call.is_mutation()).collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Let `successes` more mutations of `account` through, then reject the rest.
    pub fn fail_after(&mut self, account: &str, successes: usize) {
        self.faults.insert(account.to_string(), successes);
    }

    /// Reject listings whose prefix equals `prefix`.
    pub fn fail_listing(&mut self, prefix: &str) {
        self.failing_lists.push(prefix.to_string());
    }

    fn admit(&mut self, call: DirectoryCall, account: &str, operation: &str) -> Result<(), DirectoryError> {
        self.calls.push(call);
        match self.faults.get_mut(account) {
            Some(0) => Err(DirectoryError::Rejected {
                account: account.to_string(),
                operation: operation.to_string(),
                reason: "injected fault".to_string(),
            }),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_mut(&mut self, account: &str) -> Result<&mut AccountRecord, DirectoryError> {
        self.accounts
            .get_mut(account)
            .ok_or_else(|| DirectoryError::AccountNotFound(account.to_string()))
    }
}

impl Directory for MemoryDirectory {
    fn list_accounts(
        &mut self,
        prefix: &str,
        offset: usize,
        limit: usize,
        opts: ListOpts,
    ) -> Result<Vec<ObservedAccount>, DirectoryError> {
        self.calls.push(DirectoryCall::List {
            prefix: prefix.to_string(),
            opts,
        });
        if self.failing_lists.iter().any(|p| p == prefix) {
            return Err(DirectoryError::Rejected {
                account: prefix.to_string(),
                operation: "list".to_string(),
                reason: "injected fault".to_string(),
            });
        }
        if !prefix.is_empty() && !is_valid_account_path(prefix) {
            return Err(DirectoryError::InvalidPath(prefix.to_string()));
        }

        let matches = self
            .accounts
            .values()
            .filter(|record| {
                relative_depth(prefix, &record.id).is_some_and(|depth| opts.admits(depth))
            })
            .skip(offset);
        let accounts: Vec<ObservedAccount> = if limit == 0 {
            matches.map(AccountRecord::observe).collect()
        } else {
            matches.take(limit).map(AccountRecord::observe).collect()
        };
        Ok(accounts)
    }

    fn create_account(&mut self, path: &str, secret: &str) -> Result<(), DirectoryError> {
        self.admit(
            DirectoryCall::CreateAccount {
                path: path.to_string(),
            },
            path,
            "create account",
        )?;
        if !is_valid_account_path(path) {
            return Err(DirectoryError::InvalidPath(path.to_string()));
        }
        if self.accounts.contains_key(path) {
            return Err(DirectoryError::AccountExists(path.to_string()));
        }
        self.accounts
            .insert(path.to_string(), AccountRecord::new(path, secret));
        Ok(())
    }

    fn delete_account(&mut self, path: &str) -> Result<(), DirectoryError> {
        self.admit(
            DirectoryCall::DeleteAccount {
                path: path.to_string(),
            },
            path,
            "delete account",
        )?;
        self.accounts
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| DirectoryError::AccountNotFound(path.to_string()))
    }

    fn add_template(&mut self, account: &str, template: &str) -> Result<(), DirectoryError> {
        self.admit(
            DirectoryCall::AddTemplate {
                account: account.to_string(),
                template: template.to_string(),
            },
            account,
            "add template",
        )?;
        self.record_mut(account)?.templates.push(template.to_string());
        Ok(())
    }

    fn remove_template(&mut self, account: &str, template: &str) -> Result<(), DirectoryError> {
        self.admit(
            DirectoryCall::RemoveTemplate {
                account: account.to_string(),
                template: template.to_string(),
            },
            account,
            "remove template",
        )?;
        let record = self.record_mut(account)?;
        let Some(index) = record.templates.iter().position(|t| t == template) else {
            return Err(DirectoryError::TemplateNotHeld {
                account: account.to_string(),
                template: template.to_string(),
            });
        };
        record.templates.remove(index);
        Ok(())
    }

    fn set_tags(
        &mut self,
        account: &str,
        prefix: &str,
        tags: &BTreeMap<String, Value>,
    ) -> Result<(), DirectoryError> {
        self.admit(
            DirectoryCall::SetTags {
                account: account.to_string(),
                prefix: prefix.to_string(),
                keys: tags.keys().cloned().collect(),
            },
            account,
            "set tags",
        )?;
        let record = self.record_mut(account)?;
        for (key, value) in tags {
            record.attributes.insert(prefix, key.as_str(), value.clone());
        }
        Ok(())
    }

    fn delete_tags(
        &mut self,
        account: &str,
        prefix: &str,
        keys: &[String],
    ) -> Result<(), DirectoryError> {
        self.admit(
            DirectoryCall::DeleteTags {
                account: account.to_string(),
                prefix: prefix.to_string(),
                keys: keys.to_vec(),
            },
            account,
            "delete tags",
        )?;
        let record = self.record_mut(account)?;
        for key in keys {
            record.attributes.remove(prefix, key);
        }
        Ok(())
    }
}
