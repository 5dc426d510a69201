//! Integration tests: file-backed directory sessions.

use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use usercheck_directory::{
    Directory, DirectoryError, DirectoryFile, DirectorySession, ListOpts, StoreError,
    directory_lock_path,
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
            "usercheck-directory-{prefix}-{}-{unique}",
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

fn init_directory(tmp: &TempDirGuard) -> String {
    let endpoint = tmp.path().join("accounts.jsonl").display().to_string();
    DirectorySession::initialize(&endpoint, "root", "rootpw").expect("init should succeed");
    endpoint
}

#[test]
fn initialize_refuses_to_overwrite() {
    let tmp = TempDirGuard::new("init-twice");
    let endpoint = init_directory(&tmp);
    let err = DirectorySession::initialize(&endpoint, "root", "other")
        .expect_err("second init must fail");
    assert!(matches!(err, DirectoryError::AlreadyExists(_)));
}

#[test]
fn authentication_checks_the_secret() {
    let tmp = TempDirGuard::new("auth");
    let endpoint = init_directory(&tmp);

    let mut session = DirectorySession::connect(&endpoint).expect("connect should succeed");
    assert!(matches!(
        session.list_accounts("", 0, 0, ListOpts::unlimited()),
        Err(DirectoryError::NotAuthenticated)
    ));
    assert!(matches!(
        session.authenticate("root", "wrong"),
        Err(DirectoryError::AuthenticationFailed(_))
    ));
    session
        .authenticate("root", "rootpw")
        .expect("correct secret should authenticate");
    assert_eq!(session.user(), Some("root"));
}

#[test]
fn mutations_are_persisted_immediately() {
    let tmp = TempDirGuard::new("persist");
    let endpoint = init_directory(&tmp);

    let mut session =
        DirectorySession::open(&format!("file://{endpoint}"), "root", "rootpw").expect("open");
    session
        .create_account("org.alice", "alicepw")
        .expect("create should succeed");
    session
        .add_template("org.alice", "base")
        .expect("add template should succeed");
    session
        .set_tags(
            "org.alice",
            "org",
            &BTreeMap::from([("@user.list".to_string(), json!(true))]),
        )
        .expect("set tags should succeed");

    let on_disk = DirectoryFile::new(session.path())
        .load()
        .expect("file should read");
    let alice = on_disk
        .iter()
        .find(|record| record.id == "org.alice")
        .expect("alice should be persisted");
    assert_eq!(alice.templates, vec!["base".to_string()]);
    assert_eq!(alice.attributes.get("org", "@user.list"), Some(&json!(true)));
    assert!(alice.verify_secret("alicepw"));
}

#[test]
fn lock_is_exclusive_and_released_on_drop() {
    let tmp = TempDirGuard::new("lock");
    let endpoint = init_directory(&tmp);

    let session = DirectorySession::connect(&endpoint).expect("first connect");
    assert!(directory_lock_path(session.path()).exists());
    assert!(matches!(
        DirectorySession::connect(&endpoint),
        Err(DirectoryError::LockBusy(_))
    ));

    let lock_path = directory_lock_path(session.path());
    drop(session);
    assert!(!lock_path.exists());
    DirectorySession::connect(&endpoint).expect("connect after release");
}

#[test]
fn connect_reports_missing_directory() {
    let tmp = TempDirGuard::new("missing");
    let endpoint = tmp.path().join("nope.jsonl").display().to_string();
    assert!(matches!(
        DirectorySession::connect(&endpoint),
        Err(DirectoryError::NotFound(_))
    ));
}

#[test]
fn failed_writes_are_not_carried_into_later_ones() {
    let tmp = TempDirGuard::new("failed-write");
    let endpoint = init_directory(&tmp);
    let mut session = DirectorySession::open(&endpoint, "root", "rootpw").expect("open");
    session.create_account("root.a", "a").expect("create root.a");
    session.create_account("root.b", "b").expect("create root.b");

    // Swap the file for a non-empty directory so the rename fails.
    let path = session.path().to_path_buf();
    let saved = fs::read(&path).expect("directory file should read");
    fs::remove_file(&path).expect("directory file should be removed");
    fs::create_dir_all(path.join("occupied")).expect("blocking dir should be created");

    let tags = BTreeMap::from([("role".to_string(), json!("admin"))]);
    let err = session
        .set_tags("root.a", "root", &tags)
        .expect_err("write into a blocked path must fail");
    assert!(matches!(err, DirectoryError::Store(StoreError::Write { .. })));

    fs::remove_dir_all(&path).expect("blocking dir should be removed");
    fs::write(&path, saved).expect("directory file should be restored");
    session
        .delete_account("root.b")
        .expect("delete should succeed");

    let on_disk = DirectoryFile::new(&path).load().expect("file should read");
    let ids: Vec<&str> = on_disk.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["root", "root.a"]);
    assert_eq!(on_disk[1].attributes.get("root", "role"), None);

    let listed = session
        .list_accounts("root.a", 0, 0, ListOpts::max_depth(0))
        .expect("list should succeed");
    assert_eq!(listed[0].attributes.get("root", "role"), None);
}

#[test]
fn connect_rejects_repeated_accounts() {
    let tmp = TempDirGuard::new("duplicate");
    let endpoint = init_directory(&tmp);
    let path = tmp.path().join("accounts.jsonl");
    let line = fs::read_to_string(&path).expect("directory file should read");
    fs::write(&path, format!("{line}{line}")).expect("directory file should be written");

    let err = DirectorySession::connect(&endpoint).expect_err("duplicate ids must be rejected");
    assert!(matches!(
        err,
        DirectoryError::Store(StoreError::DuplicateAccount { line: 2, first: 1, .. })
    ));
    assert!(!directory_lock_path(&path).exists());
}
