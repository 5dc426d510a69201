//! Per-account diff engine.

use crate::declaration::CompiledPolicy;
use crate::matching::{
    AttributeDiff, AttributeMatch, TemplateMatch, TemplateOutcome, diff_attributes,
    match_templates,
};
use crate::rules::{Namespace, RuleMap};
use serde::{Deserialize, Serialize};

/// An account as reported by a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedAccount {
    pub account_id: String,
    #[serde(default)]
    pub templates: Vec<String>,
    /// Tags and permissions together, told apart by the key marker.
    #[serde(default)]
    pub attributes: RuleMap,
}

/// Template comparison for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFinding {
    pub mode: TemplateMatch,
    pub has: Vec<String>,
    pub wants: Vec<String>,
    pub outcome: TemplateOutcome,
}

impl TemplateFinding {
    pub fn passed(&self) -> bool {
        self.outcome.matched
    }

    /// Full template list the account should hold after convergence.
    ///
    /// Exact matching replaces the list outright; the looser modes keep what
    /// the account has and append what is missing.
    pub fn converged_list(&self) -> Vec<String> {
        match self.mode {
            TemplateMatch::ExactOrder => self.wants.clone(),
            TemplateMatch::SubsequenceOrder | TemplateMatch::AnyOrder => self
                .has
                .iter()
                .chain(self.outcome.missing.iter())
                .cloned()
                .collect(),
        }
    }
}

/// Tag or permission comparison for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeFinding {
    pub namespace: Namespace,
    pub mode: AttributeMatch,
    pub diff: AttributeDiff,
}

impl AttributeFinding {
    pub fn passed(&self) -> bool {
        self.diff.passes(self.mode)
    }

    /// Extras reported as warnings rather than failures. A failing finding
    /// has no warnings.
    pub fn warnings(&self) -> Option<&RuleMap> {
        if !self.passed() {
            return None;
        }
        self.diff.tolerated_extras(self.mode)
    }
}

/// Everything checked for one account.
///
/// A `None` dimension was not configured on the declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDiff {
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplateFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<AttributeFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<AttributeFinding>,
}

impl AccountDiff {
    /// All configured dimensions pass.
    pub fn passed(&self) -> bool {
        self.templates.as_ref().is_none_or(TemplateFinding::passed)
            && self.attribute_findings().all(AttributeFinding::passed)
    }

    pub fn has_warnings(&self) -> bool {
        self.attribute_findings()
            .any(|finding| finding.warnings().is_some())
    }

    /// Tag then permission findings, whichever are present.
    pub fn attribute_findings(&self) -> impl Iterator<Item = &AttributeFinding> {
        self.tags.iter().chain(self.permissions.iter())
    }
}

/// Diff one observed account against a compiled policy.
pub fn diff_account(account: &ObservedAccount, policy: &CompiledPolicy<'_>) -> AccountDiff {
    let declaration = policy.declaration;

    let templates = declaration.templates.as_ref().map(|wants| {
        let mode = declaration.template_match;
        TemplateFinding {
            mode,
            has: account.templates.clone(),
            wants: wants.clone(),
            outcome: match_templates(mode, &account.templates, wants),
        }
    });

    let attribute = |namespace: Namespace| {
        policy.rules(namespace).map(|wants| AttributeFinding {
            namespace,
            mode: policy.attribute_match(namespace),
            diff: diff_attributes(&account.attributes, wants, namespace),
        })
    };

    AccountDiff {
        account_id: account.account_id.clone(),
        templates,
        tags: attribute(Namespace::Tag),
        permissions: attribute(Namespace::Permission),
    }
}
