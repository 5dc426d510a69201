//! Human-readable reports.
//!
//! Each failing account gets a block of WRONG / MISSING / EXTRA sections per
//! dimension; tolerated extras go in a separate warnings block. Permission
//! values are shown as the booleans they are compared as, tag values as
//! compact JSON.

use crate::orchestrator::{
    AccountOutcome, AccountState, DeclarationOutcome, Provisioning, RunMode, RunReport,
};
use serde_json::Value;
use usercheck_policy::value::{is_truthy, render};
use usercheck_policy::{AttributeFinding, AttributeMatch, Namespace, RuleMap, TemplateFinding};

/// Full text report: one block per declaration, then the verdict line.
pub fn render_report(report: &RunReport) -> String {
    let mut lines: Vec<String> = report
        .declarations
        .iter()
        .map(|declaration| render_declaration(declaration, report.mode))
        .filter(|block| !block.is_empty())
        .collect();

    let total = report.declarations.len();
    if report.passed {
        lines.push(format!("{total} checks passed successfully"));
    } else {
        lines.push(format!("{} of {total} checks failed", report.failed_count()));
    }
    lines.join("\n")
}

/// One error line per declaration or account that failed.
pub fn error_lines(report: &RunReport) -> Vec<String> {
    let mut errors = Vec::new();
    for declaration in &report.declarations {
        if let Some(error) = &declaration.error {
            errors.push(error.to_string());
        }
        for account in &declaration.accounts {
            match &account.state {
                AccountState::PartiallyApplied { error, .. } => errors.push(error.to_string()),
                AccountState::Mismatched | AccountState::Planned => {
                    errors.push(format!("{} check errors", account.account()));
                }
                AccountState::Converged | AccountState::Applied { .. } => {}
            }
        }
        if declaration.provisioning == Some(Provisioning::Planned) {
            errors.push(format!("{} does not exist", declaration.prefix));
        }
    }
    errors
}

pub fn render_declaration(outcome: &DeclarationOutcome, mode: RunMode) -> String {
    let mut lines = Vec::new();
    match outcome.provisioning {
        Some(Provisioning::Created) => {
            lines.push(format!("{} does not exist", outcome.prefix));
            lines.push(format!("{} created", outcome.prefix));
        }
        Some(Provisioning::Planned) => {
            lines.push(format!("{} does not exist", outcome.prefix));
            lines.push(format!("{} would be created", outcome.prefix));
        }
        None => {}
    }

    for account in &outcome.accounts {
        let block = render_account(account);
        if !block.is_empty() {
            lines.push(block);
        }
    }

    if let Some(error) = &outcome.error {
        lines.push(error.to_string());
    } else if outcome.clean() {
        lines.push(format!("{} passed all checks", outcome.prefix));
    } else if mode == RunMode::Apply && outcome.passed() {
        lines.push(format!("{} converged", outcome.prefix));
    }
    lines.join("\n")
}

/// Errors, warnings and apply progress for one account; empty when there is
/// nothing to say.
pub fn render_account(outcome: &AccountOutcome) -> String {
    let diff = &outcome.diff;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Some(templates) = &diff.templates
        && !templates.passed()
    {
        errors.push(template_section(templates));
    }
    for finding in diff.attribute_findings() {
        if !finding.passed() {
            errors.push(attribute_errors(finding));
        }
        if let Some(extra) = finding.warnings() {
            warnings.push(attribute_sections(
                finding.namespace,
                &RuleMap::new(),
                &RuleMap::new(),
                extra,
            ));
        }
    }

    let account = diff.account_id.as_str();
    let mut blocks = Vec::new();
    if !errors.is_empty() {
        blocks.push(format!("{account} check errors:\n\n{}", errors.join("\n")));
    }
    if !warnings.is_empty() {
        blocks.push(format!("{account} check warnings:\n\n{}", warnings.join("\n")));
    }

    match &outcome.state {
        AccountState::Planned => {
            let steps: Vec<String> = outcome.plan.iter().map(|op| format!("\t- {op}")).collect();
            blocks.push(format!("{account} plan:\n{}", steps.join("\n")));
        }
        AccountState::Applied { operations } => {
            blocks.push(format!("{account}: applied {operations} operations"));
        }
        AccountState::PartiallyApplied { error, .. } => blocks.push(error.to_string()),
        AccountState::Converged | AccountState::Mismatched => {}
    }
    blocks.join("\n").trim_end_matches('\n').to_string()
}

fn template_section(finding: &TemplateFinding) -> String {
    format!(
        "\tWRONG TEMPLATES:\n\n\t* Has: [{}]\n\t* Wants {}: [{}]\n",
        finding.has.join(", "),
        finding.mode,
        finding.wants.join(", ")
    )
}

fn attribute_errors(finding: &AttributeFinding) -> String {
    let empty = RuleMap::new();
    let extra = match finding.mode {
        AttributeMatch::Strict => &finding.diff.extra,
        AttributeMatch::Permissive => &empty,
    };
    attribute_sections(
        finding.namespace,
        &finding.diff.wrong,
        &finding.diff.missing,
        extra,
    )
}

fn attribute_sections(
    namespace: Namespace,
    wrong: &RuleMap,
    missing: &RuleMap,
    extra: &RuleMap,
) -> String {
    let show = |value: &Value| match namespace {
        Namespace::Tag => render(value),
        Namespace::Permission => is_truthy(value).to_string(),
    };
    let heading = namespace.heading();
    let mut lines = Vec::new();

    if !wrong.is_empty() {
        lines.push(format!("\tWRONG {heading}:\n"));
        for (prefix, keys) in wrong.prefixes() {
            lines.push(format!("\t* {prefix}"));
            for (key, has) in keys {
                let wants = missing.get(prefix, key).map(&show).unwrap_or_default();
                lines.push(format!("\t\t- {key}: wants {wants} has {}", show(has)));
            }
            lines.push(String::new());
        }
    }

    // Wrong keys are already listed with their desired value.
    let absent: Vec<(&str, Vec<(&String, &Value)>)> = missing
        .prefixes()
        .map(|(prefix, keys)| {
            let keys = keys
                .iter()
                .filter(|(key, _)| !wrong.contains(prefix, key))
                .collect();
            (prefix, keys)
        })
        .filter(|(_, keys): &(&str, Vec<_>)| !keys.is_empty())
        .collect();
    if !absent.is_empty() {
        lines.push(format!("\tMISSING {heading}:\n"));
        for (prefix, keys) in absent {
            lines.push(format!("\t* {prefix}"));
            for (key, wants) in keys {
                lines.push(format!("\t\t- {key}: wants {}", show(wants)));
            }
            lines.push(String::new());
        }
    }

    if !extra.is_empty() {
        lines.push(format!("\tEXTRA {heading}:\n"));
        for (prefix, keys) in extra.prefixes() {
            lines.push(format!("\t* {prefix}"));
            for (key, has) in keys {
                lines.push(format!("\t\t- {key}: has {}", show(has)));
            }
            lines.push(String::new());
        }
    }
    lines.join("\n")
}
