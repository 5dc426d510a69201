//! Match strategies.
//!
//! Template lists are compared by [`match_templates`]; tag and permission
//! maps by [`diff_attributes`]. Both are pure and never look at a directory.

use crate::error::PolicyError;
use crate::rules::{CanonicalRules, Namespace, RuleMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How an observed template list must relate to the desired one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateMatch {
    /// Same length, same element at every index.
    #[default]
    #[serde(alias = "exact")]
    ExactOrder,
    /// Desired templates appear in order, other templates may sit between.
    #[serde(alias = "subsequence", alias = "ordered")]
    SubsequenceOrder,
    /// Every desired template is held, in any order.
    #[serde(alias = "any")]
    AnyOrder,
}

impl std::fmt::Display for TemplateMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactOrder => write!(f, "exactly"),
            Self::SubsequenceOrder => write!(f, "in order"),
            Self::AnyOrder => write!(f, "in any order"),
        }
    }
}

impl std::str::FromStr for TemplateMatch {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "exact" | "exactorder" => Ok(Self::ExactOrder),
            "subsequence" | "subsequenceorder" | "ordered" => Ok(Self::SubsequenceOrder),
            "any" | "anyorder" => Ok(Self::AnyOrder),
            _ => Err(PolicyError::unknown("template match", s)),
        }
    }
}

/// How strictly observed tags or permissions must match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeMatch {
    /// No missing and no extra keys.
    Strict,
    /// No missing keys; extras are tolerated and reported as warnings.
    #[default]
    Permissive,
}

impl std::fmt::Display for AttributeMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Permissive => write!(f, "permissive"),
        }
    }
}

impl std::str::FromStr for AttributeMatch {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" | "exact" => Ok(Self::Strict),
            "permissive" | "lenient" => Ok(Self::Permissive),
            _ => Err(PolicyError::unknown("attribute match", s)),
        }
    }
}

/// Result of one template comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOutcome {
    pub matched: bool,
    /// Templates that would have to be added to converge.
    ///
    /// Always empty for `ExactOrder`. For `SubsequenceOrder` this is the
    /// unmatched tail of the desired list, not an exact set difference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl TemplateOutcome {
    fn matched() -> Self {
        Self {
            matched: true,
            missing: Vec::new(),
        }
    }

    fn failed(missing: Vec<String>) -> Self {
        Self {
            matched: false,
            missing,
        }
    }
}

/// Compare an observed template list against the desired one.
pub fn match_templates(mode: TemplateMatch, has: &[String], wants: &[String]) -> TemplateOutcome {
    match mode {
        TemplateMatch::ExactOrder => {
            if has == wants {
                TemplateOutcome::matched()
            } else {
                TemplateOutcome::failed(Vec::new())
            }
        }
        TemplateMatch::SubsequenceOrder => {
            let mut cursor = 0;
            for template in has {
                if cursor < wants.len() && wants[cursor] == *template {
                    cursor += 1;
                }
            }
            if cursor == wants.len() {
                TemplateOutcome::matched()
            } else {
                TemplateOutcome::failed(wants[cursor..].to_vec())
            }
        }
        TemplateMatch::AnyOrder => {
            let held: BTreeSet<&str> = has.iter().map(String::as_str).collect();
            let missing: Vec<String> = wants
                .iter()
                .filter(|template| !held.contains(template.as_str()))
                .cloned()
                .collect();
            if missing.is_empty() {
                TemplateOutcome::matched()
            } else {
                TemplateOutcome::failed(missing)
            }
        }
    }
}

/// Three-way difference between observed and desired attributes.
///
/// Invariants:
/// - every `(prefix, key)` in `wrong` is also in `missing`
/// - `extra` shares no `(prefix, key)` with `wrong` or `missing`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDiff {
    /// Observed values of keys whose value differs.
    pub wrong: RuleMap,
    /// Desired values of keys that are absent or wrong.
    pub missing: RuleMap,
    /// Observed keys that are not desired at all.
    pub extra: RuleMap,
}

impl AttributeDiff {
    /// Whether this diff satisfies `mode`.
    pub fn passes(&self, mode: AttributeMatch) -> bool {
        match mode {
            AttributeMatch::Strict => self.missing.is_empty() && self.extra.is_empty(),
            AttributeMatch::Permissive => self.missing.is_empty(),
        }
    }

    /// Number of entries that count as failures under `mode`.
    pub fn failure_count(&self, mode: AttributeMatch) -> usize {
        match mode {
            AttributeMatch::Strict => self.missing.len() + self.extra.len(),
            AttributeMatch::Permissive => self.missing.len(),
        }
    }

    /// Extras that `mode` tolerates instead of failing on.
    pub fn tolerated_extras(&self, mode: AttributeMatch) -> Option<&RuleMap> {
        match mode {
            AttributeMatch::Permissive if !self.extra.is_empty() => Some(&self.extra),
            _ => None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.wrong.is_empty() && self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Diff raw observed attributes against canonical desired rules.
///
/// `has` may mix both namespaces; only keys of `namespace` are considered.
pub fn diff_attributes(
    has: &RuleMap,
    wants: &CanonicalRules,
    namespace: Namespace,
) -> AttributeDiff {
    let has = has.filter_namespace(namespace);
    let mut diff = AttributeDiff::default();

    for (prefix, key, value) in has.entries() {
        if !wants.contains(prefix, key) {
            diff.extra.insert(prefix, key, value.clone());
        }
    }

    for (prefix, key, desired) in wants.entries() {
        match has.get(prefix, key) {
            None => {
                diff.missing.insert(prefix, key, desired.clone());
            }
            Some(observed) if !namespace.same(observed, desired) => {
                diff.missing.insert(prefix, key, desired.clone());
                diff.wrong.insert(prefix, key, observed.clone());
            }
            Some(_) => {}
        }
    }

    diff
}
