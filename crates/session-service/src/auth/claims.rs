//! JWT claims structure.
//!
//! The `sub` field is redacted in Debug output to keep user identities out
//! of logs.

use common::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Claims carried by an identity provider access token.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user identity. Redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

impl Claims {
    /// The authenticated user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        UserId::from(self.sub.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_sub() {
        let claims = Claims {
            sub: "alice@example.com".to_string(),
            exp: 1_900_000_000,
            iat: 1_800_000_000,
        };
        let debug = format!("{claims:?}");
        assert!(!debug.contains("alice@example.com"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("1900000000"));
    }

    #[test]
    fn test_user_id_from_sub() {
        let claims = Claims {
            sub: "alice".to_string(),
            exp: 0,
            iat: 0,
        };
        assert_eq!(claims.user_id(), UserId::from("alice"));
    }
}
