//! Caller identity attached to each request.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who issued a request, as established by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallerIdentity {
    Authenticated { principal: String, roles: Vec<String> },
    Unauthenticated,
}

impl CallerIdentity {
    pub fn authenticated(principal: impl Into<String>, roles: Vec<String>) -> Self {
        Self::Authenticated {
            principal: principal.into(),
            roles,
        }
    }

    /// Compact descriptor stored with audit and performance records.
    ///
    /// `user:<name> (roles: a,b)` for authenticated callers, `unauthenticated`
    /// when no credentials were presented, `unknown` when the principal is blank.
    pub fn descriptor(&self) -> String {
        match self {
            CallerIdentity::Authenticated { principal, .. } if principal.is_empty() => {
                "unknown".to_string()
            }
            CallerIdentity::Authenticated { principal, roles } if roles.is_empty() => {
                format!("user:{}", principal)
            }
            CallerIdentity::Authenticated { principal, roles } => {
                format!("user:{} (roles: {})", principal, roles.join(","))
            }
            CallerIdentity::Unauthenticated => "unauthenticated".to_string(),
        }
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// Descriptor for an optional identity; absence means the pipeline never learned who called.
pub fn describe(identity: Option<&CallerIdentity>) -> String {
    identity
        .map(CallerIdentity::descriptor)
        .unwrap_or_else(|| "unknown".to_string())
}
