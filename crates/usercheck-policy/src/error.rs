//! Error types for policy parsing.

/// Errors raised while interpreting policy input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A mode name did not match any known variant.
    #[error("unknown {kind}: {value}")]
    UnknownMode { kind: &'static str, value: String },
}

impl PolicyError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownMode {
            kind,
            value: value.to_string(),
        }
    }
}
