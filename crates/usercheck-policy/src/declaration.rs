//! Policy declarations and their compiled form.

use crate::error::PolicyError;
use crate::matching::{AttributeMatch, TemplateMatch};
use crate::rules::{CanonicalRules, ExpansionLint, Namespace, PrefixRuleSet, expand_with_lints};
use serde::{Deserialize, Serialize};

/// Which accounts under the target prefix a declaration applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeMode {
    /// Only the account whose identifier equals the prefix.
    #[default]
    #[serde(alias = "exact")]
    ExactAccountOnly,
    /// Every account strictly below the prefix.
    #[serde(alias = "descendants")]
    DescendantsOnly,
}

impl std::fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactAccountOnly => write!(f, "exact"),
            Self::DescendantsOnly => write!(f, "descendants"),
        }
    }
}

impl std::str::FromStr for ScopeMode {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "exact" | "exactaccountonly" => Ok(Self::ExactAccountOnly),
            "descendants" | "descendantsonly" | "subusers" => Ok(Self::DescendantsOnly),
            _ => Err(PolicyError::unknown("scope mode", s)),
        }
    }
}

/// One checkable unit of desired state.
///
/// An absent `templates`, `permissions` or `tags` means the dimension is not
/// checked at all; it never means "must be empty".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDeclaration {
    pub target_prefix: String,
    #[serde(default)]
    pub scope: ScopeMode,
    #[serde(default)]
    pub create_missing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<String>>,
    #[serde(default)]
    pub template_match: TemplateMatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PrefixRuleSet>,
    #[serde(default)]
    pub permission_match: AttributeMatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<PrefixRuleSet>,
    #[serde(default)]
    pub tag_match: AttributeMatch,
}

impl PolicyDeclaration {
    /// Declaration for `prefix` that checks nothing yet.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            target_prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: ScopeMode) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_templates<I, S>(mut self, templates: I, mode: TemplateMatch) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.templates = Some(templates.into_iter().map(Into::into).collect());
        self.template_match = mode;
        self
    }

    pub fn with_tags(mut self, tags: PrefixRuleSet, mode: AttributeMatch) -> Self {
        self.tags = Some(tags);
        self.tag_match = mode;
        self
    }

    pub fn with_permissions(mut self, permissions: PrefixRuleSet, mode: AttributeMatch) -> Self {
        self.permissions = Some(permissions);
        self.permission_match = mode;
        self
    }

    pub fn with_create_missing(mut self, create_missing: bool) -> Self {
        self.create_missing = create_missing;
        self
    }

    /// Derive the canonical rule maps once for this check.
    pub fn compile(&self) -> CompiledPolicy<'_> {
        let mut lints = Vec::new();

        let tags = self.tags.as_ref().map(|rules| {
            let expansion = expand_with_lints(rules, Namespace::Tag);
            lints.extend(expansion.lints);
            expansion.rules
        });
        let permissions = self.permissions.as_ref().map(|rules| {
            let expansion = expand_with_lints(rules, Namespace::Permission);
            lints.extend(expansion.lints);
            expansion.rules
        });

        CompiledPolicy {
            declaration: self,
            tags,
            permissions,
            lints,
        }
    }
}

/// A declaration with its canonical rules derived.
///
/// Built once per check and passed by reference to every account diff.
#[derive(Debug, Clone)]
pub struct CompiledPolicy<'a> {
    pub declaration: &'a PolicyDeclaration,
    pub tags: Option<CanonicalRules>,
    pub permissions: Option<CanonicalRules>,
    pub lints: Vec<ExpansionLint>,
}

impl CompiledPolicy<'_> {
    pub fn prefix(&self) -> &str {
        &self.declaration.target_prefix
    }

    pub fn scope(&self) -> ScopeMode {
        self.declaration.scope
    }

    /// Canonical rules for `namespace`, if that dimension is checked.
    pub fn rules(&self, namespace: Namespace) -> Option<&CanonicalRules> {
        match namespace {
            Namespace::Tag => self.tags.as_ref(),
            Namespace::Permission => self.permissions.as_ref(),
        }
    }

    pub fn attribute_match(&self, namespace: Namespace) -> AttributeMatch {
        match namespace {
            Namespace::Tag => self.declaration.tag_match,
            Namespace::Permission => self.declaration.permission_match,
        }
    }
}
