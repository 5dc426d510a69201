//! Canonical rule expansion.
//!
//! A [`PrefixRuleSet`] carries the same fact in two shapes:
//!
//! ```text
//! byPrefix:   { "app.users": { "@user.list": true, "tier": 2 } }
//! onPrefixes: { "@user.list": { "app.users": true } }
//! ```
//!
//! [`expand`] folds both into one [`RuleMap`] keyed `prefix → key → value`,
//! keeping only keys that belong to the requested [`Namespace`]. Nothing
//! downstream of expansion sees the dual form.

use crate::value::{is_truthy, normalize, same_permission_value, same_tag_value};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Leading character that marks a key as a permission.
pub const PERMISSION_MARKER: char = '@';

/// Which half of an account's attribute store a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Tag,
    Permission,
}

impl Namespace {
    /// Namespace of `key`, decided solely by the permission marker.
    pub fn of(key: &str) -> Self {
        if key.starts_with(PERMISSION_MARKER) {
            Self::Permission
        } else {
            Self::Tag
        }
    }

    pub fn contains(self, key: &str) -> bool {
        Self::of(key) == self
    }

    /// Canonical stored form of a desired value in this namespace.
    ///
    /// Permissions collapse to booleans; tags keep their shape with numbers
    /// normalized.
    pub fn canonical_value(self, value: &Value) -> Value {
        match self {
            Self::Permission => Value::Bool(is_truthy(value)),
            Self::Tag => normalize(value),
        }
    }

    /// Whether an observed value satisfies a desired one.
    pub fn same(self, has: &Value, wants: &Value) -> bool {
        match self {
            Self::Permission => same_permission_value(has, wants),
            Self::Tag => same_tag_value(has, wants),
        }
    }

    /// Plural upper-case label used in report headings.
    pub fn heading(self) -> &'static str {
        match self {
            Self::Tag => "TAGS",
            Self::Permission => "PERMISSIONS",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag => write!(f, "tag"),
            Self::Permission => write!(f, "permission"),
        }
    }
}

/// `prefix → key → value`, ordered for deterministic output.
///
/// Used for canonical desired rules, observed attributes and the three
/// diff buckets alike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleMap(BTreeMap<String, BTreeMap<String, Value>>);

/// Desired rules after expansion.
pub type CanonicalRules = RuleMap;

impl RuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one entry. Returns the previous value if present.
    pub fn insert(
        &mut self,
        prefix: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Option<Value> {
        self.0
            .entry(prefix.into())
            .or_default()
            .insert(key.into(), value)
    }

    /// Remove one entry, dropping the prefix once it is empty.
    pub fn remove(&mut self, prefix: &str, key: &str) -> Option<Value> {
        let keys = self.0.get_mut(prefix)?;
        let removed = keys.remove(key);
        if keys.is_empty() {
            self.0.remove(prefix);
        }
        removed
    }

    pub fn get(&self, prefix: &str, key: &str) -> Option<&Value> {
        self.0.get(prefix).and_then(|keys| keys.get(key))
    }

    pub fn contains(&self, prefix: &str, key: &str) -> bool {
        self.get(prefix, key).is_some()
    }

    /// Entries under one prefix.
    pub fn prefix(&self, prefix: &str) -> Option<&BTreeMap<String, Value>> {
        self.0.get(prefix).filter(|keys| !keys.is_empty())
    }

    /// Prefixes that hold at least one entry, in order.
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Value>)> {
        self.0
            .iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(prefix, keys)| (prefix.as_str(), keys))
    }

    /// Every `(prefix, key, value)` triple in order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.0.iter().flat_map(|(prefix, keys)| {
            keys.iter()
                .map(move |(key, value)| (prefix.as_str(), key.as_str(), value))
        })
    }

    /// Number of `(prefix, key)` entries.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Entries whose key belongs to `namespace`, values normalized.
    pub fn filter_namespace(&self, namespace: Namespace) -> Self {
        self.entries()
            .filter(|(_, key, _)| namespace.contains(key))
            .map(|(prefix, key, value)| (prefix.to_string(), key.to_string(), normalize(value)))
            .collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.0
    }
}

impl From<BTreeMap<String, BTreeMap<String, Value>>> for RuleMap {
    fn from(map: BTreeMap<String, BTreeMap<String, Value>>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String, Value)> for RuleMap {
    fn from_iter<I: IntoIterator<Item = (String, String, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (prefix, key, value) in iter {
            map.insert(prefix, key, value);
        }
        map
    }
}

/// Tags or permissions as declared, in either addressing style.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixRuleSet {
    /// `prefix → key → value`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_prefix: BTreeMap<String, BTreeMap<String, Value>>,
    /// `key → prefix → value`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub on_prefixes: BTreeMap<String, BTreeMap<String, Value>>,
}

impl PrefixRuleSet {
    pub fn by_prefix(mut self, prefix: &str, key: &str, value: Value) -> Self {
        self.by_prefix
            .entry(prefix.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self
    }

    pub fn on_prefix(mut self, key: &str, prefix: &str, value: Value) -> Self {
        self.on_prefixes
            .entry(key.to_string())
            .or_default()
            .insert(prefix.to_string(), value);
        self
    }
}

/// Something expansion resolved silently that a caller may want to surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpansionLint {
    /// The same `(prefix, key)` was declared in both styles with different
    /// values. The `onPrefixes` value won.
    Conflict {
        prefix: String,
        key: String,
        by_prefix: Value,
        on_prefixes: Value,
    },
    /// A key was declared in a rule set of the other namespace and dropped.
    ForeignKey {
        prefix: String,
        key: String,
        expected: Namespace,
    },
}

impl std::fmt::Display for ExpansionLint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict {
                prefix,
                key,
                by_prefix,
                on_prefixes,
            } => write!(
                f,
                "{key} on {prefix} declared as {by_prefix} (byPrefix) and {on_prefixes} (onPrefixes); using {on_prefixes}"
            ),
            Self::ForeignKey {
                prefix,
                key,
                expected,
            } => write!(f, "{key} on {prefix} is not a {expected} key; ignored"),
        }
    }
}

/// Canonical rules plus the lints collected while building them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub rules: CanonicalRules,
    pub lints: Vec<ExpansionLint>,
}

/// Fold both addressing styles into canonical rules for one namespace.
pub fn expand(rule_set: &PrefixRuleSet, namespace: Namespace) -> CanonicalRules {
    expand_with_lints(rule_set, namespace).rules
}

/// [`expand`], also reporting collisions and dropped keys.
///
/// `byPrefix` is processed first, then `onPrefixes`; a collision keeps the
/// later value.
pub fn expand_with_lints(rule_set: &PrefixRuleSet, namespace: Namespace) -> Expansion {
    let mut rules = RuleMap::new();
    let mut lints = Vec::new();

    let by_prefix = rule_set.by_prefix.iter().flat_map(|(prefix, keys)| {
        keys.iter()
            .map(move |(key, value)| (prefix.as_str(), key.as_str(), value))
    });
    for (prefix, key, value) in by_prefix {
        if !namespace.contains(key) {
            lints.push(foreign_key(prefix, key, namespace));
            continue;
        }
        rules.insert(prefix, key, namespace.canonical_value(value));
    }

    for (key, prefixes) in &rule_set.on_prefixes {
        if !namespace.contains(key) {
            for prefix in prefixes.keys() {
                lints.push(foreign_key(prefix, key, namespace));
            }
            continue;
        }
        for (prefix, value) in prefixes {
            let value = namespace.canonical_value(value);
            if let Some(previous) = rules.insert(prefix.as_str(), key.as_str(), value.clone())
                && previous != value
            {
                lints.push(ExpansionLint::Conflict {
                    prefix: prefix.clone(),
                    key: key.clone(),
                    by_prefix: previous,
                    on_prefixes: value,
                });
            }
        }
    }

    Expansion { rules, lints }
}

fn foreign_key(prefix: &str, key: &str, expected: Namespace) -> ExpansionLint {
    ExpansionLint::ForeignKey {
        prefix: prefix.to_string(),
        key: key.to_string(),
        expected,
    }
}
