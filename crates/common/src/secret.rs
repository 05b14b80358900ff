//! Secret wrappers for values that must never reach a log line.
//!
//! Re-exports [`secrecy`] types. Session passcodes, the database URL and the
//! identity provider signing secret are all carried as [`SecretString`], so a
//! derived `Debug` on any struct holding them prints a redaction marker.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinRequest {
//!     session: String,
//!     passcode: Option<SecretString>,
//! }
//!
//! let req = JoinRequest {
//!     session: "standup".to_string(),
//!     passcode: Some(SecretString::from("letmein")),
//! };
//!
//! assert!(!format!("{req:?}").contains("letmein"));
//! let supplied: &str = req.passcode.as_ref().map(|p| p.expose_secret()).unwrap_or("");
//! assert_eq!(supplied, "letmein");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Expose an optional secret as a string slice, empty when absent.
#[must_use]
pub fn expose_or_empty(secret: Option<&SecretString>) -> &str {
    secret.map_or("", ExposeSecret::expose_secret)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_passcode_debug_is_redacted() {
        let passcode = SecretString::from("hunter2");
        let debug_str = format!("{passcode:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_or_empty() {
        let passcode = SecretString::from("1234");
        assert_eq!(expose_or_empty(Some(&passcode)), "1234");
        assert_eq!(expose_or_empty(None), "");
    }

    #[test]
    fn test_join_body_deserializes_passcode_as_secret() {
        #[derive(Debug, Deserialize)]
        struct JoinBody {
            passcode: Option<SecretString>,
        }

        let body: JoinBody = serde_json::from_str(r#"{"passcode": "open-sesame"}"#).unwrap();
        assert_eq!(
            body.passcode.as_ref().map(|p| p.expose_secret().to_string()),
            Some("open-sesame".to_string())
        );
        assert!(!format!("{body:?}").contains("open-sesame"));

        let empty: JoinBody = serde_json::from_str("{}").unwrap();
        assert!(empty.passcode.is_none());
    }
}
