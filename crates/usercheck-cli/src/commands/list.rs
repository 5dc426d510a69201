use crate::cli::ConnectionArgs;
use crate::support::{or_exit, print_json};
use usercheck_directory::{DirectoryError, DirectorySession, scan};
use usercheck_policy::{ObservedAccount, ScopeMode};
use usercheck_reconcile::{CheckDocument, Connection};

pub fn run(prefix: String, scope: ScopeMode, connection: ConnectionArgs, json_output: bool) {
    let connection = or_exit(CheckDocument::default().connection(&connection.overrides()));
    let accounts = or_exit(list_accounts(&connection, &prefix, scope));

    if json_output {
        print_json(&accounts);
        return;
    }

    println!("usercheck list {prefix} ({scope})");
    if accounts.is_empty() {
        println!("  (no accounts)");
    }
    for account in &accounts {
        print_account(account);
    }
}

fn print_account(account: &ObservedAccount) {
    println!("  {}", account.account_id);
    println!("    templates: [{}]", account.templates.join(", "));
    for (prefix, key, value) in account.attributes.entries() {
        println!("    {prefix} {key} = {value}");
    }
}

/// The session, and with it the directory lock, ends before any exit.
fn list_accounts(
    connection: &Connection,
    prefix: &str,
    scope: ScopeMode,
) -> Result<Vec<ObservedAccount>, DirectoryError> {
    let mut session =
        DirectorySession::open(&connection.endpoint, &connection.user, &connection.secret)?;
    scan(&mut session, prefix, scope)
}
