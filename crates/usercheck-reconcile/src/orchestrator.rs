//! Batch orchestration: scan, diff and optionally apply, one declaration at
//! a time.
//!
//! ```text
//! Scanned → Diffed → Converged
//!                  → Mismatched                      (check)
//!                  → Planned                         (plan)
//!                  → Applied | PartiallyApplied      (apply)
//! ```
//!
//! Diffs always describe the state before any mutation. A failing account
//! never stops the batch; only a connection failure aborts a run.

use crate::apply::{ApplyError, execute, execute_operation};
use crate::config::{CheckDocument, CheckOptions, ConfigError, ConnectionOverrides, load_document};
use crate::plan::{ApplyPlan, creation, plan_account};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::Path;
use thiserror::Error;
use usercheck_directory::{Directory, DirectoryError, DirectorySession, scan};
use usercheck_policy::{
    AccountDiff, CompiledPolicy, ExpansionLint, ObservedAccount, PolicyDeclaration, ScopeMode,
    diff_account,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    /// Diff only.
    #[default]
    Check,
    /// Diff and compute the operations an apply would issue.
    Plan,
    /// Diff, then drive every failing account toward the declaration.
    Apply,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Check => write!(f, "check"),
            Self::Plan => write!(f, "plan"),
            Self::Apply => write!(f, "apply"),
        }
    }
}

/// Failure that ends one declaration without affecting the others.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("error listing accounts on {prefix}: {source}")]
    Scan {
        prefix: String,
        #[source]
        source: DirectoryError,
    },

    #[error("error listing accounts on {prefix}: no accounts found")]
    NoAccountsFound { prefix: String },

    #[error("error creating account {prefix}: {source}")]
    Create {
        prefix: String,
        #[source]
        source: DirectoryError,
    },
}

/// Failure that prevents a run from starting.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connection failed: {0}")]
    Connection(#[source] DirectoryError),
}

#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AccountState {
    Converged,
    Mismatched,
    Planned,
    Applied {
        operations: usize,
    },
    #[serde(rename_all = "camelCase")]
    PartiallyApplied {
        completed: usize,
        total: usize,
        #[serde(serialize_with = "as_display")]
        error: ApplyError,
    },
}

impl AccountState {
    /// Whether the account ends the run in an acceptable state.
    pub fn passed(&self) -> bool {
        matches!(self, Self::Converged | Self::Applied { .. })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOutcome {
    pub diff: AccountDiff,
    #[serde(skip_serializing_if = "ApplyPlan::is_empty")]
    pub plan: ApplyPlan,
    #[serde(flatten)]
    pub state: AccountState,
}

impl AccountOutcome {
    pub fn account(&self) -> &str {
        &self.diff.account_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Provisioning {
    /// The target account was absent and would be created by an apply.
    Planned,
    /// The target account was absent and has been created.
    Created,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationOutcome {
    pub prefix: String,
    pub scope: ScopeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning: Option<Provisioning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lints: Vec<ExpansionLint>,
    pub accounts: Vec<AccountOutcome>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "as_display_opt"
    )]
    pub error: Option<CheckError>,
}

impl DeclarationOutcome {
    fn new(policy: &CompiledPolicy<'_>) -> Self {
        Self {
            prefix: policy.prefix().to_string(),
            scope: policy.scope(),
            provisioning: None,
            lints: policy.lints.clone(),
            accounts: Vec::new(),
            error: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.error.is_none()
            && self.provisioning != Some(Provisioning::Planned)
            && self.accounts.iter().all(|account| account.state.passed())
    }

    /// Every account already matched; nothing was (or would be) changed.
    pub fn clean(&self) -> bool {
        self.error.is_none()
            && self.provisioning.is_none()
            && self
                .accounts
                .iter()
                .all(|account| matches!(account.state, AccountState::Converged))
    }
}

/// Outcome of one batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub passed: bool,
    pub declarations: Vec<DeclarationOutcome>,
}

impl RunReport {
    pub fn failed_count(&self) -> usize {
        self.declarations.iter().filter(|d| !d.passed()).count()
    }
}

/// Run `declarations` in order against `directory`.
pub fn run_batch<D: Directory + ?Sized>(
    directory: &mut D,
    declarations: &[PolicyDeclaration],
    mode: RunMode,
) -> RunReport {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, %mode);
    let _entered = span.enter();

    let started_at = Utc::now();
    let mut outcomes = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        outcomes.push(run_declaration(directory, declaration, mode));
    }

    let passed = outcomes.iter().all(DeclarationOutcome::passed);
    tracing::info!(declarations = outcomes.len(), passed, "run finished");
    RunReport {
        run_id,
        mode,
        started_at,
        finished_at: Utc::now(),
        passed,
        declarations: outcomes,
    }
}

/// Check (and in apply mode converge) every account one declaration covers.
pub fn run_declaration<D: Directory + ?Sized>(
    directory: &mut D,
    declaration: &PolicyDeclaration,
    mode: RunMode,
) -> DeclarationOutcome {
    let span = tracing::info_span!(
        "declaration",
        prefix = %declaration.target_prefix,
        scope = %declaration.scope
    );
    let _entered = span.enter();

    let policy = declaration.compile();
    for lint in &policy.lints {
        tracing::warn!(%lint, "policy lint");
    }

    let mut outcome = DeclarationOutcome::new(&policy);
    reconcile(directory, &policy, mode, &mut outcome, true);
    tracing::info!(
        accounts = outcome.accounts.len(),
        passed = outcome.passed(),
        "declaration finished"
    );
    outcome
}

fn reconcile<D: Directory + ?Sized>(
    directory: &mut D,
    policy: &CompiledPolicy<'_>,
    mode: RunMode,
    outcome: &mut DeclarationOutcome,
    may_create: bool,
) {
    let prefix = policy.prefix();
    let accounts = match scan(directory, prefix, policy.scope()) {
        Ok(accounts) => accounts,
        Err(source) => {
            tracing::warn!(%source, "scan failed");
            outcome.error = Some(CheckError::Scan {
                prefix: prefix.to_string(),
                source,
            });
            return;
        }
    };

    if accounts.is_empty() {
        let creatable = may_create
            && policy.declaration.create_missing
            && policy.scope() == ScopeMode::ExactAccountOnly;
        match mode {
            RunMode::Apply if creatable => {
                if let Err(source) = execute_operation(directory, &creation(prefix)) {
                    tracing::warn!(%source, "account creation failed");
                    outcome.error = Some(CheckError::Create {
                        prefix: prefix.to_string(),
                        source,
                    });
                    return;
                }
                tracing::info!("created missing account");
                outcome.provisioning = Some(Provisioning::Created);
                reconcile(directory, policy, mode, outcome, false);
            }
            RunMode::Plan if creatable => {
                outcome.provisioning = Some(Provisioning::Planned);
            }
            _ => {
                outcome.error = Some(CheckError::NoAccountsFound {
                    prefix: prefix.to_string(),
                });
            }
        }
        return;
    }

    for account in &accounts {
        outcome
            .accounts
            .push(reconcile_account(directory, policy, account, mode));
    }
}

fn reconcile_account<D: Directory + ?Sized>(
    directory: &mut D,
    policy: &CompiledPolicy<'_>,
    account: &ObservedAccount,
    mode: RunMode,
) -> AccountOutcome {
    let diff = diff_account(account, policy);
    if diff.has_warnings() {
        tracing::warn!(account = %diff.account_id, "extra attributes tolerated");
    }

    if diff.passed() {
        tracing::debug!(account = %diff.account_id, "converged");
        return AccountOutcome {
            plan: ApplyPlan::new(&diff.account_id),
            diff,
            state: AccountState::Converged,
        };
    }

    let (plan, state) = match mode {
        RunMode::Check => (ApplyPlan::new(&diff.account_id), AccountState::Mismatched),
        RunMode::Plan => (plan_account(&diff), AccountState::Planned),
        RunMode::Apply => {
            let plan = plan_account(&diff);
            let state = match execute(directory, &plan) {
                Ok(operations) => AccountState::Applied { operations },
                Err(error) => {
                    tracing::warn!(%error, "apply aborted");
                    AccountState::PartiallyApplied {
                        completed: error.completed(),
                        total: error.total,
                        error,
                    }
                }
            };
            (plan, state)
        }
    };
    AccountOutcome { diff, plan, state }
}

/// Load, validate, connect and run a check document.
///
/// The directory session is held for the whole run and released when this
/// returns, whatever the outcome.
pub fn run_document(
    document: &CheckDocument,
    options: &CheckOptions,
    connection: &ConnectionOverrides,
    mode: RunMode,
) -> Result<RunReport, RunError> {
    document.validate()?;
    let connection = document.connection(connection)?;
    let declarations = document.declarations(options);

    let mut session =
        DirectorySession::open(&connection.endpoint, &connection.user, &connection.secret)
            .map_err(RunError::Connection)?;
    Ok(run_batch(&mut session, &declarations, mode))
}

pub fn run_file(
    path: &Path,
    options: &CheckOptions,
    connection: &ConnectionOverrides,
    mode: RunMode,
) -> Result<RunReport, RunError> {
    let document = load_document(path)?;
    run_document(&document, options, connection, mode)
}

fn as_display<T: std::fmt::Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn as_display_opt<T: std::fmt::Display, S: Serializer>(
    value: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.collect_str(value),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use usercheck_directory::{AccountRecord, DirectoryCall, MemoryDirectory};
    use usercheck_policy::{AttributeMatch, PrefixRuleSet, TemplateMatch};

    fn tagged(id: &str, team: &str) -> AccountRecord {
        let mut record = AccountRecord::new(id, "s");
        record.attributes.insert("org", "team", json!(team));
        record
    }

    fn team_policy(prefix: &str) -> PolicyDeclaration {
        PolicyDeclaration::new(prefix).with_tags(
            PrefixRuleSet::default().by_prefix("org", "team", json!("blue")),
            AttributeMatch::Permissive,
        )
    }

    #[test]
    fn check_mode_never_mutates() {
        let mut dir = MemoryDirectory::from_records([tagged("org.alice", "red")]);
        let report = run_batch(&mut dir, &[team_policy("org.alice")], RunMode::Check);

        assert!(!report.passed);
        let outcome = &report.declarations[0];
        assert!(matches!(outcome.accounts[0].state, AccountState::Mismatched));
        assert!(outcome.accounts[0].plan.is_empty());
        assert!(dir.mutations().is_empty());
    }

    #[test]
    fn plan_mode_computes_operations_without_applying() {
        let mut dir = MemoryDirectory::from_records([tagged("org.alice", "red")]);
        let report = run_batch(&mut dir, &[team_policy("org.alice")], RunMode::Plan);

        let account = &report.declarations[0].accounts[0];
        assert!(matches!(account.state, AccountState::Planned));
        assert_eq!(account.plan.len(), 2);
        assert!(dir.mutations().is_empty());
        assert!(!report.passed);
    }

    #[test]
    fn apply_converges_and_reports_pre_apply_state() {
        let mut dir = MemoryDirectory::from_records([tagged("org.alice", "red")]);
        let report = run_batch(&mut dir, &[team_policy("org.alice")], RunMode::Apply);

        assert!(report.passed);
        let account = &report.declarations[0].accounts[0];
        assert!(matches!(account.state, AccountState::Applied { operations: 2 }));
        let tags = account.diff.tags.as_ref().expect("tags checked");
        assert_eq!(tags.diff.wrong.get("org", "team"), Some(&json!("red")));

        let again = run_batch(&mut dir, &[team_policy("org.alice")], RunMode::Check);
        assert!(again.passed);
        assert!(again.declarations[0].clean());
    }

    #[test]
    fn zero_matches_is_a_declaration_error() {
        let mut dir = MemoryDirectory::new();
        let report = run_batch(&mut dir, &[team_policy("org.ghost")], RunMode::Apply);

        assert!(!report.passed);
        assert!(matches!(
            report.declarations[0].error,
            Some(CheckError::NoAccountsFound { .. })
        ));
        assert!(dir.mutations().is_empty());
    }

    #[test]
    fn creation_is_only_planned_in_plan_mode() {
        let mut dir = MemoryDirectory::new();
        let declaration = team_policy("org.ghost").with_create_missing(true);
        let report = run_batch(&mut dir, &[declaration], RunMode::Plan);

        let outcome = &report.declarations[0];
        assert_eq!(outcome.provisioning, Some(Provisioning::Planned));
        assert!(outcome.error.is_none());
        assert!(!outcome.passed());
        assert!(dir.is_empty());
    }

    #[test]
    fn descendant_scope_never_creates() {
        let mut dir = MemoryDirectory::new();
        let declaration = team_policy("org")
            .with_scope(ScopeMode::DescendantsOnly)
            .with_create_missing(true);
        let report = run_batch(&mut dir, &[declaration], RunMode::Apply);

        assert!(matches!(
            report.declarations[0].error,
            Some(CheckError::NoAccountsFound { .. })
        ));
        assert!(dir.is_empty());
    }

    #[test]
    fn scan_failure_is_isolated_to_its_declaration() {
        let mut dir = MemoryDirectory::from_records([tagged("org.bob", "blue")]);
        dir.fail_listing("org.alice");
        let report = run_batch(
            &mut dir,
            &[team_policy("org.alice"), team_policy("org.bob")],
            RunMode::Check,
        );

        assert!(matches!(
            report.declarations[0].error,
            Some(CheckError::Scan { .. })
        ));
        assert!(report.declarations[1].passed());
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn report_json_renders_errors_as_text() {
        let mut dir = MemoryDirectory::new();
        let report = run_batch(&mut dir, &[team_policy("org.ghost")], RunMode::Check);
        let value = serde_json::to_value(&report).expect("serialize");

        assert_eq!(value["mode"], json!("check"));
        assert_eq!(value["passed"], json!(false));
        assert_eq!(
            value["declarations"][0]["error"],
            json!("error listing accounts on org.ghost: no accounts found")
        );
    }

    #[test]
    fn templates_are_planned_before_attributes() {
        let mut record = tagged("org.alice", "red");
        record.templates = vec!["guest".to_string()];
        let mut dir = MemoryDirectory::from_records([record]);
        let declaration =
            team_policy("org.alice").with_templates(["base"], TemplateMatch::ExactOrder);
        run_batch(&mut dir, &[declaration], RunMode::Apply);

        let mutations = dir.mutations();
        assert!(matches!(mutations[0], DirectoryCall::RemoveTemplate { .. }));
        assert!(matches!(mutations[1], DirectoryCall::AddTemplate { .. }));
        assert!(matches!(mutations[2], DirectoryCall::DeleteTags { .. }));
        assert!(matches!(mutations[3], DirectoryCall::SetTags { .. }));
    }
}
