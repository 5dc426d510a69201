//! Check documents.
//!
//! A document lists the checks to run, optional defaults shared by every
//! check and optional connection parameters. Both the enum spellings
//! (`templateMatch: "subsequence"`) and the older boolean switches
//! (`allowExtraTemplates: true`) are accepted. Per dimension the first of
//! these that is set wins:
//!
//! 1. the check's enum field
//! 2. the check's boolean switch
//! 3. the document (or command line) `opts`, same order
//! 4. the built-in default: exact templates, permissive tags and permissions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use usercheck_directory::is_valid_account_path;
use usercheck_policy::{
    AttributeMatch, PolicyDeclaration, PrefixRuleSet, ScopeMode, TemplateMatch,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid check document:\n  {}", .problems.join("\n  "))]
    Invalid { problems: Vec<String> },

    #[error("no {0} given (set it in the document or on the command line)")]
    MissingConnection(&'static str),
}

/// Defaults applied to every check that does not set its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_match: Option<TemplateMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_extra_templates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_match: Option<AttributeMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_extra_tags: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_match: Option<AttributeMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_extra_permissions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_missing: Option<bool>,
}

impl CheckOptions {
    /// Overlay `overrides` on `self`; set fields in `overrides` win.
    pub fn merged_with(&self, overrides: &CheckOptions) -> CheckOptions {
        CheckOptions {
            template_match: overrides.template_match.or(self.template_match),
            allow_extra_templates: overrides
                .allow_extra_templates
                .or(self.allow_extra_templates),
            tag_match: overrides.tag_match.or(self.tag_match),
            no_extra_tags: overrides.no_extra_tags.or(self.no_extra_tags),
            permission_match: overrides.permission_match.or(self.permission_match),
            no_extra_permissions: overrides.no_extra_permissions.or(self.no_extra_permissions),
            create_missing: overrides.create_missing.or(self.create_missing),
        }
    }

    fn template_match(&self) -> Option<TemplateMatch> {
        self.template_match
            .or(switch(self.allow_extra_templates, TemplateMatch::SubsequenceOrder))
    }

    fn tag_match(&self) -> Option<AttributeMatch> {
        self.tag_match
            .or(switch(self.no_extra_tags, AttributeMatch::Strict))
    }

    fn permission_match(&self) -> Option<AttributeMatch> {
        self.permission_match
            .or(switch(self.no_extra_permissions, AttributeMatch::Strict))
    }
}

/// A boolean switch only ever opts in; `false` defers to the next level.
fn switch<T>(flag: Option<bool>, mode: T) -> Option<T> {
    flag.filter(|on| *on).map(|_| mode)
}

/// One check as written in a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckEntry {
    #[serde(alias = "targetPrefix")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_sub_users: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_missing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_match: Option<TemplateMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_extra_templates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PrefixRuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_match: Option<AttributeMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_extra_permissions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<PrefixRuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_match: Option<AttributeMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_extra_tags: Option<bool>,
}

impl CheckEntry {
    pub fn scope(&self) -> ScopeMode {
        self.scope
            .or(self.only_sub_users.map(|sub| {
                if sub {
                    ScopeMode::DescendantsOnly
                } else {
                    ScopeMode::ExactAccountOnly
                }
            }))
            .unwrap_or_default()
    }

    /// Resolve every mode against `opts` into an immutable declaration.
    pub fn resolve(&self, opts: &CheckOptions) -> PolicyDeclaration {
        let template_match = self
            .template_match
            .or(switch(self.allow_extra_templates, TemplateMatch::SubsequenceOrder))
            .or(opts.template_match())
            .unwrap_or_default();
        let tag_match = self
            .tag_match
            .or(switch(self.no_extra_tags, AttributeMatch::Strict))
            .or(opts.tag_match())
            .unwrap_or_default();
        let permission_match = self
            .permission_match
            .or(switch(self.no_extra_permissions, AttributeMatch::Strict))
            .or(opts.permission_match())
            .unwrap_or_default();

        PolicyDeclaration {
            target_prefix: self.prefix.clone(),
            scope: self.scope(),
            create_missing: self.create_missing.unwrap_or(false)
                || opts.create_missing.unwrap_or(false),
            templates: self.templates.clone(),
            template_match,
            permissions: self.permissions.clone(),
            permission_match,
            tags: self.tags.clone(),
            tag_match,
        }
    }

    fn problems(&self, index: usize) -> Vec<String> {
        let mut problems = Vec::new();
        let at = format!("checks[{index}]");

        if !is_valid_account_path(&self.prefix) {
            problems.push(format!("{at}: invalid prefix {:?}", self.prefix));
        }
        if let (Some(scope), Some(sub)) = (self.scope, self.only_sub_users)
            && (scope == ScopeMode::DescendantsOnly) != sub
        {
            problems.push(format!(
                "{at}: scope {scope} contradicts onlySubUsers {sub}"
            ));
        }
        if let Some(templates) = &self.templates {
            for (i, template) in templates.iter().enumerate() {
                if template.trim().is_empty() {
                    problems.push(format!("{at}: empty template name at {i}"));
                }
            }
        }
        for (field, rules) in [("tags", &self.tags), ("permissions", &self.permissions)] {
            let Some(rules) = rules else { continue };
            let by_prefix = rules.by_prefix.iter().flat_map(|(prefix, keys)| {
                keys.keys().map(move |key| (prefix.as_str(), key.as_str()))
            });
            let on_prefixes = rules.on_prefixes.iter().flat_map(|(key, prefixes)| {
                prefixes.keys().map(move |prefix| (prefix.as_str(), key.as_str()))
            });
            for (prefix, key) in by_prefix.chain(on_prefixes) {
                if prefix.is_empty() || key.is_empty() {
                    problems.push(format!(
                        "{at}: {field} entry with empty prefix or key ({prefix:?}, {key:?})"
                    ));
                }
            }
        }
        problems
    }
}

/// A whole check document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckDocument {
    #[serde(default)]
    pub checks: Vec<CheckEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<CheckOptions>,
    #[serde(default, alias = "nexusHost", skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, alias = "nexusUser", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, alias = "nexusPass", skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl CheckDocument {
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Every problem in the document, or `Ok` if there are none.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.checks.is_empty() {
            problems.push("no checks declared".to_string());
        }
        for (index, entry) in self.checks.iter().enumerate() {
            problems.extend(entry.problems(index));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Declarations with every mode resolved.
    ///
    /// `overrides` (typically from the command line) take precedence over the
    /// document's own `opts`.
    pub fn declarations(&self, overrides: &CheckOptions) -> Vec<PolicyDeclaration> {
        let opts = self.opts.clone().unwrap_or_default().merged_with(overrides);
        self.checks.iter().map(|entry| entry.resolve(&opts)).collect()
    }

    /// Connection parameters, `overrides` first, then the document.
    pub fn connection(&self, overrides: &ConnectionOverrides) -> Result<Connection, ConfigError> {
        let pick = |over: &Option<String>, doc: &Option<String>, name: &'static str| {
            over.clone()
                .or_else(|| doc.clone())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingConnection(name))
        };
        Ok(Connection {
            endpoint: pick(&overrides.endpoint, &self.endpoint, "endpoint")?,
            user: pick(&overrides.user, &self.user, "user")?,
            secret: pick(&overrides.secret, &self.secret, "secret")?,
        })
    }
}

/// Connection parameters given outside the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub endpoint: Option<String>,
    pub user: Option<String>,
    pub secret: Option<String>,
}

/// Resolved directory connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    pub endpoint: String,
    pub user: String,
    pub secret: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Read, parse and validate a document. `.toml` files are TOML, anything
/// else is JSON.
pub fn load_document(path: &Path) -> Result<CheckDocument, ConfigError> {
    let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let document = if is_toml {
        CheckDocument::from_toml_str(&input).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        CheckDocument::from_json_str(&input).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?
    };
    document.validate()?;
    tracing::debug!(path = %path.display(), checks = document.checks.len(), "loaded check document");
    Ok(document)
}
