//! Identity provider seam.
//!
//! Credentials are issued elsewhere; the core only asks who the current
//! user is.

use crate::errors::SessionError;
use common::types::UserId;

pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `Unauthorized` when there is none.
    fn current_identity(&self) -> Result<UserId, SessionError>;
}

/// Fixed identity, for embedding applications that resolved the user up
/// front.
#[derive(Debug, Clone)]
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    pub fn signed_in(user: impl Into<UserId>) -> Self {
        Self(Some(user.into()))
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_identity(&self) -> Result<UserId, SessionError> {
        self.0
            .clone()
            .ok_or_else(|| SessionError::Unauthorized("Not signed in".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_static_identity() {
        let id = StaticIdentity::signed_in("alice");
        assert_eq!(id.current_identity().unwrap().as_str(), "alice");

        let err = StaticIdentity::anonymous().current_identity().unwrap_err();
        assert!(matches!(err, SessionError::Unauthorized(_)));
    }
}
