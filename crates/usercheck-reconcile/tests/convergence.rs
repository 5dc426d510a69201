//! Integration tests: apply convergence, batch isolation and provisioning.

use serde_json::json;
use usercheck_directory::{AccountRecord, DirectoryCall, MemoryDirectory};
use usercheck_policy::{
    AttributeMatch, PolicyDeclaration, PrefixRuleSet, ScopeMode, TemplateMatch,
};
use usercheck_reconcile::{AccountState, CheckError, Provisioning, RunMode, run_batch};

fn drifted(id: &str) -> AccountRecord {
    let mut record = AccountRecord::new(id, "s");
    record.templates = vec!["admin".to_string(), "guest".to_string()];
    record.attributes.insert("org", "team", json!("red"));
    record.attributes.insert("org", "legacy", json!([1, 2]));
    record.attributes.insert("org.dev", "@task.push", json!(true));
    record.attributes.insert("org.dev", "@user.list", json!("false"));
    record
}

fn full_policy(prefix: &str, mode: AttributeMatch, templates: TemplateMatch) -> PolicyDeclaration {
    PolicyDeclaration::new(prefix)
        .with_scope(ScopeMode::DescendantsOnly)
        .with_templates(["base", "admin"], templates)
        .with_tags(
            PrefixRuleSet::default()
                .by_prefix("org", "team", json!("blue"))
                .on_prefix("level", "org.dev", json!(3.0)),
            mode,
        )
        .with_permissions(
            PrefixRuleSet::default()
                .by_prefix("org.dev", "@user.list", json!(1))
                .on_prefix("@user.delete", "org", json!(false)),
            mode,
        )
}

#[test]
fn applying_twice_is_idempotent_for_every_mode() {
    for attribute_mode in [AttributeMatch::Strict, AttributeMatch::Permissive] {
        for template_mode in [
            TemplateMatch::ExactOrder,
            TemplateMatch::SubsequenceOrder,
            TemplateMatch::AnyOrder,
        ] {
            let mut dir = MemoryDirectory::from_records([
                AccountRecord::new("org", "s"),
                drifted("org.alice"),
                drifted("org.bob"),
            ]);
            let policy = full_policy("org", attribute_mode, template_mode);

            let first = run_batch(&mut dir, std::slice::from_ref(&policy), RunMode::Apply);
            assert!(first.passed, "{attribute_mode} / {template_mode}");
            assert_eq!(first.declarations[0].accounts.len(), 2);

            let second = run_batch(&mut dir, std::slice::from_ref(&policy), RunMode::Check);
            assert!(second.passed, "{attribute_mode} / {template_mode}");
            for account in &second.declarations[0].accounts {
                assert!(matches!(account.state, AccountState::Converged));
                for finding in account.diff.attribute_findings() {
                    assert!(finding.diff.wrong.is_empty());
                    assert!(finding.diff.missing.is_empty());
                    if attribute_mode == AttributeMatch::Strict {
                        assert!(finding.diff.extra.is_empty());
                    }
                }
            }

            dir.clear_calls();
            run_batch(&mut dir, std::slice::from_ref(&policy), RunMode::Apply);
            assert!(dir.mutations().is_empty(), "converged accounts are left alone");
        }
    }
}

#[test]
fn permissive_apply_keeps_unrelated_attributes() {
    let mut dir = MemoryDirectory::from_records([drifted("org.alice")]);
    let policy = full_policy("org.alice", AttributeMatch::Permissive, TemplateMatch::AnyOrder)
        .with_scope(ScopeMode::ExactAccountOnly);

    let report = run_batch(&mut dir, &[policy], RunMode::Apply);
    assert!(report.passed);

    let alice = dir.account("org.alice").expect("alice");
    assert_eq!(alice.attributes.get("org", "legacy"), Some(&json!([1, 2])));
    assert_eq!(alice.attributes.get("org.dev", "@task.push"), Some(&json!(true)));
    assert_eq!(alice.attributes.get("org", "team"), Some(&json!("blue")));
    assert_eq!(
        alice.templates,
        vec!["admin".to_string(), "guest".to_string(), "base".to_string()]
    );
}

#[test]
fn failing_account_does_not_stop_the_batch() {
    let mut dir = MemoryDirectory::from_records([
        AccountRecord::new("org.a", "s"),
        AccountRecord::new("org.b", "s"),
    ]);
    // Three single-request operations per account: two sets under org and
    // org.dev plus one permission set.
    let policy = PolicyDeclaration::new("org")
        .with_scope(ScopeMode::DescendantsOnly)
        .with_tags(
            PrefixRuleSet::default()
                .by_prefix("org", "team", json!("blue"))
                .by_prefix("org.dev", "level", json!(3)),
            AttributeMatch::Strict,
        )
        .with_permissions(
            PrefixRuleSet::default().by_prefix("org", "@user.list", json!(true)),
            AttributeMatch::Strict,
        );
    dir.fail_after("org.a", 1);

    let report = run_batch(&mut dir, &[policy], RunMode::Apply);
    assert!(!report.passed);

    let accounts = &report.declarations[0].accounts;
    let AccountState::PartiallyApplied {
        completed, total, ..
    } = &accounts[0].state
    else {
        panic!("org.a should be partially applied");
    };
    assert_eq!((*completed, *total), (1, 3));
    assert!(matches!(accounts[1].state, AccountState::Applied { operations: 3 }));

    let b = dir.account("org.b").expect("org.b");
    assert_eq!(b.attributes.get("org", "team"), Some(&json!("blue")));
    assert_eq!(b.attributes.get("org.dev", "level"), Some(&json!(3)));
    assert_eq!(b.attributes.get("org", "@user.list"), Some(&json!(true)));
}

#[test]
fn missing_account_is_created_once_and_rescanned() {
    let mut dir = MemoryDirectory::new();
    let policy = PolicyDeclaration::new("org.alice")
        .with_templates(["base"], TemplateMatch::ExactOrder)
        .with_create_missing(true);

    let report = run_batch(&mut dir, &[policy], RunMode::Apply);
    assert!(report.passed);

    let outcome = &report.declarations[0];
    assert_eq!(outcome.provisioning, Some(Provisioning::Created));
    assert_eq!(outcome.accounts.len(), 1);

    let creates = dir
        .calls()
        .iter()
        .filter(|call| matches!(call, DirectoryCall::CreateAccount { .. }))
        .count();
    let lists = dir
        .calls()
        .iter()
        .filter(|call| matches!(call, DirectoryCall::List { .. }))
        .count();
    assert_eq!(creates, 1);
    assert_eq!(lists, 2);
    assert_eq!(
        dir.account("org.alice").expect("created").templates,
        vec!["base".to_string()]
    );
}

#[test]
fn failed_creation_is_a_declaration_error() {
    let mut dir = MemoryDirectory::new();
    dir.fail_after("org.alice", 0);
    let policy = PolicyDeclaration::new("org.alice").with_create_missing(true);

    let report = run_batch(&mut dir, &[policy, PolicyDeclaration::new("org.bob")], RunMode::Apply);
    assert!(matches!(
        report.declarations[0].error,
        Some(CheckError::Create { .. })
    ));
    assert!(matches!(
        report.declarations[1].error,
        Some(CheckError::NoAccountsFound { .. })
    ));
    assert!(dir.is_empty());
}
