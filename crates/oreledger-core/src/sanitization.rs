//! Sanitization of backend error text
//!
//! Driver errors can echo connection strings back at us. Everything that
//! ends up inside a [`StorageError`](crate::StorageError) or a log line
//! goes through [`DatabaseErrorSanitizer`] first.
//!
//! ```rust
//! use oreledger_core::sanitization::DatabaseErrorSanitizer;
//!
//! let safe = DatabaseErrorSanitizer::sanitize("connect failed: host=db password=hunter2");
//! assert!(!safe.contains("hunter2"));
//! ```

use crate::error::StorageErrorKind;

/// Maximum length for sanitized error messages
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 200;

/// Keys whose values are redacted wherever they appear as `key=value`.
const SENSITIVE_KEYS: &[&str] = &["password", "passwd", "pwd", "secret", "token"];

/// Helper for sanitizing database-specific errors
pub struct DatabaseErrorSanitizer;

impl DatabaseErrorSanitizer {
    /// Redact credentials and truncate the message.
    pub fn sanitize<E: std::fmt::Display + ?Sized>(error: &E) -> String {
        let text = error.to_string();
        let redacted: Vec<String> = text
            .split(' ')
            .map(|word| {
                let lower = word.to_ascii_lowercase();
                match SENSITIVE_KEYS
                    .iter()
                    .find(|key| lower.starts_with(&format!("{}=", key)))
                {
                    Some(key) => format!("{}=***", &word[..key.len()]),
                    None => word.to_string(),
                }
            })
            .collect();
        let joined = redacted.join(" ");

        if joined.chars().count() > MAX_ERROR_MESSAGE_LENGTH {
            let truncated: String = joined.chars().take(MAX_ERROR_MESSAGE_LENGTH - 3).collect();
            format!("{}...", truncated)
        } else {
            joined
        }
    }

    /// Classify a backend error message into a [`StorageErrorKind`].
    pub fn classify<E: std::fmt::Display + ?Sized>(error: &E) -> StorageErrorKind {
        let details = Self::sanitize(error);
        let lower = details.to_lowercase();

        if lower.contains("password")
            || lower.contains("authentication")
            || lower.contains("permission denied")
            || lower.contains("access denied")
        {
            StorageErrorKind::AccessDenied { reason: details }
        } else if lower.contains("connection")
            || lower.contains("connect")
            || lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("closed")
        {
            StorageErrorKind::NetworkError { details }
        } else if lower.contains("disk")
            || lower.contains("unable to open")
            || lower.contains("readonly")
            || lower.contains("i/o")
        {
            StorageErrorKind::IoError { details }
        } else {
            StorageErrorKind::InternalError {
                backend_error: details,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_credentials() {
        let safe = DatabaseErrorSanitizer::sanitize("dbname=ore user=ore Password=hunter2 port=5432");
        assert!(!safe.contains("hunter2"));
        assert!(safe.contains("Password=***"));
        assert!(safe.contains("port=5432"));
    }

    #[test]
    fn truncates_long_messages() {
        let safe = DatabaseErrorSanitizer::sanitize(&"x".repeat(500));
        assert_eq!(safe.chars().count(), MAX_ERROR_MESSAGE_LENGTH);
        assert!(safe.ends_with("..."));
    }

    #[test]
    fn classifies_common_failures() {
        assert!(matches!(
            DatabaseErrorSanitizer::classify("password authentication failed for user \"ore\""),
            StorageErrorKind::AccessDenied { .. }
        ));
        assert!(matches!(
            DatabaseErrorSanitizer::classify("error connecting to server: Connection refused"),
            StorageErrorKind::NetworkError { .. }
        ));
        assert!(matches!(
            DatabaseErrorSanitizer::classify("unable to open database file"),
            StorageErrorKind::IoError { .. }
        ));
        assert!(matches!(
            DatabaseErrorSanitizer::classify("near \"SELEC\": syntax error"),
            StorageErrorKind::InternalError { .. }
        ));
    }
}
