//! API key registry.
//!
//! Keys come from `[auth] api_keys`; each maps to one caller identity.

use std::collections::HashMap;

use crate::config::AuthConfig;
use crate::security::identity::CallerIdentity;

/// Header carrying the caller's API key.
pub const X_API_KEY: &str = "x-api-key";

/// Outcome of checking a presented key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    Missing,
    Invalid,
    Valid(CallerIdentity),
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeyRegistry {
    keys: HashMap<String, CallerIdentity>,
    required: bool,
}

impl ApiKeyRegistry {
    pub fn from_config(config: &AuthConfig) -> Self {
        let keys = config
            .api_keys
            .iter()
            .map(|k| {
                (
                    k.key.clone(),
                    CallerIdentity::authenticated(k.principal.clone(), k.roles.clone()),
                )
            })
            .collect();
        Self {
            keys,
            required: config.required,
        }
    }

    /// Whether requests without a valid key are rejected.
    pub fn required(&self) -> bool {
        self.required
    }

    pub fn check(&self, presented: Option<&str>) -> KeyCheck {
        match presented.map(str::trim).filter(|k| !k.is_empty()) {
            None => KeyCheck::Missing,
            Some(key) => self
                .keys
                .get(key)
                .cloned()
                .map_or(KeyCheck::Invalid, KeyCheck::Valid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyConfig;

    fn registry() -> ApiKeyRegistry {
        ApiKeyRegistry::from_config(&AuthConfig {
            required: true,
            api_keys: vec![ApiKeyConfig {
                key: "k-123".into(),
                principal: "alice".into(),
                roles: vec!["admin".into()],
            }],
        })
    }

    #[test]
    fn test_check() {
        let registry = registry();
        assert!(registry.required());
        assert_eq!(registry.check(None), KeyCheck::Missing);
        assert_eq!(registry.check(Some("  ")), KeyCheck::Missing);
        assert_eq!(registry.check(Some("nope")), KeyCheck::Invalid);
        assert_eq!(
            registry.check(Some("k-123")),
            KeyCheck::Valid(CallerIdentity::authenticated("alice", vec!["admin".into()]))
        );
    }
}
