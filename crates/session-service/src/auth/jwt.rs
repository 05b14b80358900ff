//! HS256 JWT validation.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted
//! - `exp` is required and validated
//! - Every failure maps to the same generic client message

use crate::auth::claims::Claims;
use crate::errors::ServiceError;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::instrument;

/// Upper bound on accepted token length.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Validates identity provider tokens against a shared secret.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = 30;
        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Validate a JWT and return its claims.
    #[instrument(skip_all, name = "session.service.auth.validate")]
    pub fn validate(&self, token: &str) -> Result<Claims, ServiceError> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(
                target: "session.service.auth",
                size = token.len(),
                "Token rejected: exceeds size limit"
            );
            return Err(ServiceError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string()));
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(target: "session.service.auth", error = %e, "Token validation failed");
            ServiceError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
        })?;

        if data.claims.sub.is_empty() {
            tracing::debug!(target: "session.service.auth", "Token rejected: empty subject");
            return Err(ServiceError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string()));
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-signing-secret";

    fn mint(sub: &str, exp_offset: i64, secret: &str, alg: Algorithm) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::new(alg),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn validator() -> JwtValidator {
        JwtValidator::new(&SecretString::from(SECRET))
    }

    #[test]
    fn test_valid_token_yields_claims() {
        let token = mint("alice", 3600, SECRET, Algorithm::HS256);
        let claims = validator().validate(&token).unwrap();
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = mint("alice", -3600, SECRET, Algorithm::HS256);
        assert!(matches!(
            validator().validate(&token),
            Err(ServiceError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = mint("alice", 3600, "other-secret", Algorithm::HS256);
        assert!(validator().validate(&token).is_err());
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let token = mint("alice", 3600, SECRET, Algorithm::HS512);
        assert!(validator().validate(&token).is_err());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let token = mint("", 3600, SECRET, Algorithm::HS256);
        assert!(validator().validate(&token).is_err());
    }

    #[test]
    fn test_oversized_token_rejected_before_parsing() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let err = validator().validate(&token).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidToken(msg) if msg == INVALID_TOKEN_MESSAGE));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(validator().validate("not.a.jwt").is_err());
    }
}
