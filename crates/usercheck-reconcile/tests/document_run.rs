//! Integration tests: running check documents against a file-backed directory.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use usercheck_directory::{
    Directory, DirectoryError, DirectoryFile, DirectorySession, directory_lock_path,
};
use usercheck_policy::TemplateMatch;
use usercheck_reconcile::{
    CheckOptions, ConfigError, ConnectionOverrides, RunError, RunMode, render_report, run_file,
};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "usercheck-reconcile-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn setup(tmp: &TempDirGuard, document: serde_json::Value) -> (PathBuf, PathBuf) {
    let directory = tmp.path().join("accounts.jsonl");
    DirectorySession::initialize(&directory.display().to_string(), "root", "rootpw")
        .expect("init should succeed");
    let checks = tmp.path().join("checks.json");
    let mut document = document;
    document["endpoint"] = json!(directory.display().to_string());
    fs::write(&checks, document.to_string()).expect("document should be written");
    (directory, checks)
}

fn credentials() -> ConnectionOverrides {
    ConnectionOverrides {
        user: Some("root".to_string()),
        secret: Some("rootpw".to_string()),
        ..ConnectionOverrides::default()
    }
}

#[test]
fn apply_creates_and_converges_persistently() {
    let tmp = TempDirGuard::new("apply");
    let (directory, checks) = setup(
        &tmp,
        json!({
            "checks": [{
                "prefix": "org.alice",
                "createMissing": true,
                "templates": ["base"],
                "tags": {"byPrefix": {"org": {"team": "blue"}}},
            }],
        }),
    );

    let report = run_file(&checks, &CheckOptions::default(), &credentials(), RunMode::Apply)
        .expect("run should start");
    assert!(report.passed);
    let text = render_report(&report);
    assert!(text.starts_with("org.alice does not exist\norg.alice created"));

    let records = DirectoryFile::new(&directory)
        .load()
        .expect("directory should read");
    let alice = records
        .iter()
        .find(|record| record.id == "org.alice")
        .expect("alice should be persisted");
    assert_eq!(alice.templates, vec!["base".to_string()]);
    assert_eq!(alice.attributes.get("org", "team"), Some(&json!("blue")));
    assert!(!directory_lock_path(&directory).exists());

    let again = run_file(&checks, &CheckOptions::default(), &credentials(), RunMode::Check)
        .expect("second run should start");
    assert!(again.passed);
    assert_eq!(
        render_report(&again),
        "org.alice passed all checks\n1 checks passed successfully"
    );
}

#[test]
fn command_line_options_override_the_document() {
    let tmp = TempDirGuard::new("overrides");
    let (directory, checks) = setup(
        &tmp,
        json!({
            "checks": [{"prefix": "root", "templates": ["base"]}],
            "opts": {"templateMatch": "exact"},
        }),
    );
    {
        let mut session =
            DirectorySession::open(&directory.display().to_string(), "root", "rootpw")
                .expect("open");
        session.add_template("root", "ops").expect("add ops");
        session.add_template("root", "base").expect("add base");
    }

    let exact = run_file(&checks, &CheckOptions::default(), &credentials(), RunMode::Check)
        .expect("run");
    assert!(!exact.passed);

    let any_order = CheckOptions {
        template_match: Some(TemplateMatch::AnyOrder),
        ..CheckOptions::default()
    };
    let report = run_file(&checks, &any_order, &credentials(), RunMode::Check).expect("run");
    assert!(report.passed);
}

#[test]
fn bad_credentials_abort_the_run() {
    let tmp = TempDirGuard::new("auth");
    let (directory, checks) = setup(&tmp, json!({"checks": [{"prefix": "root"}]}));

    let err = run_file(
        &checks,
        &CheckOptions::default(),
        &ConnectionOverrides {
            user: Some("root".to_string()),
            secret: Some("wrong".to_string()),
            ..ConnectionOverrides::default()
        },
        RunMode::Check,
    )
    .expect_err("authentication must fail");
    assert!(matches!(
        err,
        RunError::Connection(DirectoryError::AuthenticationFailed(_))
    ));
    assert!(!directory_lock_path(&directory).exists());
}

#[test]
fn invalid_documents_fail_before_connecting() {
    let tmp = TempDirGuard::new("invalid");
    let (directory, checks) = setup(&tmp, json!({"checks": [{"prefix": "not a path"}]}));
    fs::remove_file(&directory).expect("directory should be removed");

    let err = run_file(&checks, &CheckOptions::default(), &credentials(), RunMode::Check)
        .expect_err("validation must fail");
    assert!(matches!(err, RunError::Config(ConfigError::Invalid { .. })));
}
