//! # usercheck-reconcile
//!
//! Drives policy declarations against a directory.
//!
//! This crate provides:
//! - check documents (JSON or TOML) and their resolution into declarations
//! - apply planning (`plan_account`) and fail-fast execution (`execute`)
//! - batch orchestration with per-declaration and per-account isolation
//! - text and JSON reports
//!
//! ## Flow
//!
//! ```text
//! CheckDocument ──validate──▶ PolicyDeclaration[]
//!     │ run_batch (one span per run)
//!     ▼
//! scan ──▶ diff_account ──▶ plan_account ──▶ execute     (apply only)
//!     │
//!     ▼
//! RunReport ──▶ render_report / serde_json
//! ```

pub mod apply;
pub mod config;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod secret;

pub use apply::{ApplyError, execute, execute_operation};
pub use config::{
    CheckDocument, CheckEntry, CheckOptions, ConfigError, Connection, ConnectionOverrides,
    load_document,
};
pub use orchestrator::{
    AccountOutcome, AccountState, CheckError, DeclarationOutcome, Provisioning, RunError,
    RunMode, RunReport, run_batch, run_declaration, run_document, run_file,
};
pub use plan::{ApplyPlan, Operation, creation, plan_account};
pub use report::{error_lines, render_account, render_declaration, render_report};
pub use secret::{SECRET_BYTES, Secret};
