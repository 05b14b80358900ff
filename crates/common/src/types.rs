//! Identifier newtypes shared by the session core and the service.
//!
//! Identifiers are opaque strings on the wire. Room tokens and user
//! identities come from external systems, so only [`ConnectionId`] is minted
//! locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque room token identifying a session.
    SessionId
);

string_id!(
    /// Identity of a user as asserted by the identity provider.
    UserId
);

string_id!(
    /// Identifier of one client connection inside a session.
    ///
    /// Ordering is significant: during simultaneous negotiation the side with
    /// the smaller id yields.
    ConnectionId
);

impl ConnectionId {
    /// Mint a fresh random connection id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
