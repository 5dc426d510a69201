//! Apply planning.
//!
//! A plan is the ordered list of directory mutations that drives one account
//! from its observed state to the desired one. Templates are replaced
//! outright; tags and permissions are converged per prefix by deleting every
//! wrong (and, under strict matching, extra) key before setting the missing
//! ones. There is no update primitive, so a wrong value is always removed
//! before its replacement is written.

use crate::secret::Secret;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use usercheck_policy::{AccountDiff, AttributeFinding, AttributeMatch};

/// One account-scoped directory mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    CreateAccount { path: String, secret: Secret },
    /// Remove every template in `current`, then add `desired` in order.
    #[serde(rename_all = "camelCase")]
    ReplaceTemplates {
        account: String,
        current: Vec<String>,
        desired: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteTags {
        account: String,
        prefix: String,
        keys: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    SetTags {
        account: String,
        prefix: String,
        tags: BTreeMap<String, Value>,
    },
}

impl Operation {
    /// Account the operation mutates (the created path for `CreateAccount`).
    pub fn account(&self) -> &str {
        match self {
            Self::CreateAccount { path, .. } => path,
            Self::ReplaceTemplates { account, .. }
            | Self::DeleteTags { account, .. }
            | Self::SetTags { account, .. } => account,
        }
    }

    /// Directory requests the operation issues.
    pub fn request_count(&self) -> usize {
        match self {
            Self::ReplaceTemplates {
                current, desired, ..
            } => current.len() + desired.len(),
            _ => 1,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateAccount { path, .. } => write!(f, "create account {path}"),
            Self::ReplaceTemplates {
                account,
                current,
                desired,
            } => write!(
                f,
                "replace templates of {account}: [{}] -> [{}]",
                current.join(", "),
                desired.join(", ")
            ),
            Self::DeleteTags {
                account,
                prefix,
                keys,
            } => write!(f, "delete on {account} at {prefix}: {}", keys.join(", ")),
            Self::SetTags {
                account,
                prefix,
                tags,
            } => {
                let pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "set on {account} at {prefix}: {}", pairs.join(", "))
            }
        }
    }
}

/// Ordered operations for one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPlan {
    pub account: String,
    pub operations: Vec<Operation>,
}

impl ApplyPlan {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            operations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }
}

/// Provisioning for an account that should exist but does not.
pub fn creation(path: &str) -> Operation {
    Operation::CreateAccount {
        path: path.to_string(),
        secret: Secret::generate(),
    }
}

/// Corrective operations for every failing dimension of `diff`.
///
/// Passing dimensions contribute nothing, so a passing diff yields an empty
/// plan. Order: templates, then tags, then permissions.
pub fn plan_account(diff: &AccountDiff) -> ApplyPlan {
    let mut plan = ApplyPlan::new(&diff.account_id);

    if let Some(templates) = &diff.templates
        && !templates.passed()
    {
        plan.operations.push(Operation::ReplaceTemplates {
            account: diff.account_id.clone(),
            current: templates.has.clone(),
            desired: templates.converged_list(),
        });
    }

    for finding in diff.attribute_findings() {
        if !finding.passed() {
            plan_attributes(&diff.account_id, finding, &mut plan.operations);
        }
    }
    plan
}

fn plan_attributes(account: &str, finding: &AttributeFinding, operations: &mut Vec<Operation>) {
    let diff = &finding.diff;

    let mut deletions: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let stale = diff.wrong.entries().chain(
        (finding.mode == AttributeMatch::Strict)
            .then(|| diff.extra.entries())
            .into_iter()
            .flatten(),
    );
    for (prefix, key, _) in stale {
        deletions.entry(prefix).or_default().insert(key);
    }

    for (prefix, keys) in deletions {
        operations.push(Operation::DeleteTags {
            account: account.to_string(),
            prefix: prefix.to_string(),
            keys: keys.into_iter().map(str::to_string).collect(),
        });
    }
    for (prefix, tags) in diff.missing.prefixes() {
        operations.push(Operation::SetTags {
            account: account.to_string(),
            prefix: prefix.to_string(),
            tags: tags.clone(),
        });
    }
}
