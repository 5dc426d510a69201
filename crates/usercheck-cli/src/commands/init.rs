use crate::support::or_exit;
use usercheck_directory::DirectorySession;
use usercheck_reconcile::Secret;

pub fn run(path: String, user: String, secret: Option<String>) {
    let generated = secret.is_none();
    let secret = secret.map_or_else(Secret::generate, Secret::from);
    let directory = or_exit(DirectorySession::initialize(&path, &user, secret.expose()));

    println!("usercheck init {path}");
    println!();
    println!("  directory: {}", directory.display());
    println!("  admin: {user}");
    if generated {
        println!("  secret: {}", secret.expose());
    }
}
