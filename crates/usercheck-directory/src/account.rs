//! Stored account records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use usercheck_policy::{ObservedAccount, RuleMap};

/// One account as persisted by a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub id: String,
    /// Lowercase hex SHA-256 of the account secret.
    pub secret_sha256: String,
    #[serde(default)]
    pub templates: Vec<String>,
    /// Tags and permissions, `prefix → key → value`.
    #[serde(default)]
    pub attributes: RuleMap,
    pub created_at: DateTime<Utc>,
}

impl AccountRecord {
    /// Fresh account with no templates or attributes.
    pub fn new(id: impl Into<String>, secret: &str) -> Self {
        Self {
            id: id.into(),
            secret_sha256: secret_digest(secret),
            templates: Vec::new(),
            attributes: RuleMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn verify_secret(&self, secret: &str) -> bool {
        self.secret_sha256 == secret_digest(secret)
    }

    /// The listing view: everything except the secret and timestamps.
    pub fn observe(&self) -> ObservedAccount {
        ObservedAccount {
            account_id: self.id.clone(),
            templates: self.templates.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Lowercase hex SHA-256 of `secret`.
pub fn secret_digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
