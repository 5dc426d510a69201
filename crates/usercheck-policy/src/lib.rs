//! # usercheck-policy
//!
//! Desired-state model for directory accounts and the pure machinery that
//! compares it against what a directory reports.
//!
//! A declaration names templates, tags and permissions. Tags and permissions
//! may be written per prefix (`byPrefix`) or per key (`onPrefixes`); both
//! forms collapse into one canonical `prefix → key → value` map before any
//! comparison happens.
//!
//! ## Architecture
//!
//! ```text
//! PolicyDeclaration      ← immutable input, one per check
//!     │ compile()
//! CompiledPolicy         ← canonical tag/permission maps, derived once
//!     │
//! diff_account()         ← per observed account
//!     ├─ match_templates()   exact / subsequence / any-order
//!     └─ diff_attributes()   wrong / missing / extra per namespace
//!     │
//! AccountDiff            ← findings consumed by planners and reports
//! ```

pub mod declaration;
pub mod diff;
pub mod error;
pub mod matching;
pub mod rules;
pub mod value;

pub use declaration::{CompiledPolicy, PolicyDeclaration, ScopeMode};
pub use diff::{AccountDiff, AttributeFinding, ObservedAccount, TemplateFinding, diff_account};
pub use error::PolicyError;
pub use matching::{
    AttributeDiff, AttributeMatch, TemplateMatch, TemplateOutcome, diff_attributes,
    match_templates,
};
pub use rules::{
    CanonicalRules, Expansion, ExpansionLint, Namespace, PERMISSION_MARKER, PrefixRuleSet,
    RuleMap, expand, expand_with_lints,
};
