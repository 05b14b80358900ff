//! Access token validation.
//!
//! Tokens come from the external identity provider, signed with a shared
//! HS256 secret. The `sub` claim is the user identity used throughout the
//! admission flow.

pub mod claims;
pub mod jwt;

pub use claims::Claims;
pub use jwt::{JwtValidator, MAX_JWT_SIZE_BYTES};
