//! External secret vault placeholder.
//!
//! No vault backend exists yet. Every operation reports
//! [`VaultOutcome::Unimplemented`] so callers can branch on it instead of
//! handling an error.

use crate::credentials::CredentialCategory;
use serde::Serialize;
use std::fmt;

pub const NOT_IMPLEMENTED: &str = "Vault functionality is not implemented yet.";

/// Result of a vault operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum VaultOutcome<T> {
    Ready(T),
    Unimplemented,
}

impl<T> VaultOutcome<T> {
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Self::Unimplemented)
    }
}

impl<T: fmt::Display> fmt::Display for VaultOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => value.fmt(f),
            Self::Unimplemented => f.write_str(NOT_IMPLEMENTED),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Vault;

impl Vault {
    pub fn new() -> Self {
        Self
    }

    pub fn list(&self) -> VaultOutcome<Vec<String>> {
        VaultOutcome::Unimplemented
    }

    pub fn store(
        &self,
        _category: CredentialCategory,
        _name: &str,
        _value: &serde_json::Value,
    ) -> VaultOutcome<String> {
        VaultOutcome::Unimplemented
    }

    pub fn retrieve(&self, _id: &str, _category: CredentialCategory) -> VaultOutcome<serde_json::Value> {
        VaultOutcome::Unimplemented
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_is_unimplemented() {
        let vault = Vault::new();
        assert!(vault.list().is_unimplemented());
        assert!(
            vault
                .store(CredentialCategory::Db, "prod", &serde_json::json!({}))
                .is_unimplemented()
        );
        assert!(vault.retrieve("id", CredentialCategory::ServiceNow).is_unimplemented());
        assert_eq!(
            vault
                .store(CredentialCategory::Db, "prod", &serde_json::Value::Null)
                .to_string(),
            "Vault functionality is not implemented yet."
        );
    }
}
