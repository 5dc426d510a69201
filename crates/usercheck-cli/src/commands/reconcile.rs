use crate::cli::RunArgs;
use crate::support::{fail, print_json};
use std::path::Path;
use usercheck_reconcile::{RunMode, error_lines, render_report, run_file};

pub fn run(args: RunArgs, mode: RunMode) {
    let options = args.check_options();
    tracing::info!(document = %args.document, %mode, "starting run");
    let report = run_file(
        Path::new(&args.document),
        &options,
        &args.connection.overrides(),
        mode,
    )
    .unwrap_or_else(|e| fail(e));

    if args.json {
        print_json(&report);
    } else {
        println!("{}", render_report(&report));
    }

    if !report.passed {
        // The text report already carries these.
        if args.json {
            for line in error_lines(&report) {
                eprintln!("error: {line}");
            }
        }
        std::process::exit(1);
    }
}
