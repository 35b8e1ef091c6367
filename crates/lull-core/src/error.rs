//! Error types and result aliases shared across Lull components.

/// The result type used throughout lull-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_id_display() {
        let err = Error::InvalidId {
            message: "not a ULID".into(),
        };
        assert!(err.to_string().contains("invalid identifier"));
        assert!(err.to_string().contains("not a ULID"));
    }

    #[test]
    fn serialization_display() {
        let err = Error::Serialization {
            message: "truncated payload".into(),
        };
        assert!(err.to_string().contains("serialization error"));
    }
}
