//! usercheck CLI: the `usercheck` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use usercheck_reconcile::RunMode;

fn main() {
    let cli = Cli::parse();
    support::init_tracing(cli.verbose);

    match cli.command {
        Commands::Init { path, user, secret } => commands::init::run(path, user, secret),

        Commands::Check(args) => commands::reconcile::run(args, RunMode::Check),

        Commands::Plan(args) => commands::reconcile::run(args, RunMode::Plan),

        Commands::Apply(args) => commands::reconcile::run(args, RunMode::Apply),

        Commands::List {
            prefix,
            descendants,
            connection,
            json,
        } => commands::list::run(prefix, cli::scope_of(descendants), connection, json),
    }
}
