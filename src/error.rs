//! Unified error handling for hitch-core.
//!
//! The detector and the route matcher are pure and never fail. Errors only
//! surface at the collaborator edges: repositories (storage backends and
//! corrupted rows), location tracking and the routing HTTP client.

use thiserror::Error;

/// Unified error type for hitch-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A stored row holds a value the domain model cannot represent.
    ///
    /// These are fatal to the read: corrupted state is surfaced, never coerced.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A requested entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Location tracking could not be started or failed while running.
    #[error("Location tracking error: {0}")]
    Tracking(String),

    /// HTTP/API error
    #[error("HTTP error{}: {message}", .status_code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for hitch-core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a data-integrity error for an unexpected stored value.
    pub fn invalid_value(field: &str, value: &str, owner: &str, owner_id: &str) -> Self {
        Error::DataIntegrity(format!(
            "Invalid {} \"{}\" for {} \"{}\"",
            field, value, owner, owner_id
        ))
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Encoding failures while writing. Stored JSON that fails to decode is
/// reported through [`Error::invalid_value`] at the read site instead.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(format!("JSON encode failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err = Error::invalid_value("appreciation", "meh", "spot", "spot-1");
        let msg = err.to_string();
        assert!(msg.contains("appreciation"));
        assert!(msg.contains("\"meh\""));
        assert!(msg.contains("spot-1"));
        assert!(matches!(err, Error::DataIntegrity(_)));
    }

    #[test]
    fn test_http_display_with_and_without_status() {
        let with = Error::Http { message: "boom".into(), status_code: Some(502) };
        assert_eq!(with.to_string(), "HTTP error (502): boom");

        let without = Error::Http { message: "offline".into(), status_code: None };
        assert_eq!(without.to_string(), "HTTP error: offline");
    }

    #[test]
    fn test_json_encode_failure_is_storage_error() {
        // Non-string map keys cannot be encoded as JSON
        let map: std::collections::HashMap<(i32, i32), i32> = [((1, 2), 3)].into_iter().collect();
        let err: Error = serde_json::to_string(&map).unwrap_err().into();
        assert!(matches!(err, Error::Storage(ref m) if m.contains("JSON encode failed")));
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound { entity: "Travel", id: "t-1".into() };
        assert_eq!(err.to_string(), "Travel 't-1' not found");
    }
}
