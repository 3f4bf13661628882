use thiserror::Error;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("database error")]
    Sqlx { source: sqlx::Error },

    /// Represents a required field that was absent or empty.
    #[error("{field} is required")]
    MissingField { field: &'static str },

    /// Represents an identifier that does not match the 24-character
    /// hexadecimal shape.
    #[error("invalid diagnosis ID format: {id}")]
    InvalidId { id: String },

    /// Represents a well-formed identifier with no matching record.
    #[error("diagnosis not found: {id}")]
    NotFound { id: String },

    /// Represents a multipart submission that could not be read.
    #[error("malformed form submission")]
    MalformedFormSubmission,

    /// Represents an upload without the expected file part.
    #[error("no {field} file provided")]
    NoEvidenceFile { field: &'static str },

    /// Represents an upload with an unrecognized form field.
    #[error("unexpected form field: {field}")]
    UnexpectedField { field: String },

    /// Represents evidence declared with the wrong media type for its kind.
    #[error("wrong media type: expected {expected}, got {actual}")]
    WrongMediaType {
        expected: &'static str,
        actual: String,
    },

    /// Represents evidence exceeding the size ceiling.
    #[error("file too large: {size} bytes exceeds the {limit}-byte limit")]
    EvidenceTooLarge { size: u64, limit: u64 },

    /// Represents a failure to write staged evidence.
    #[error("failed to stage evidence file")]
    Staging { source: std::io::Error },

    /// Represents a failure in an external analysis or localization engine.
    #[error("external service failure: {reason}")]
    ExternalService { reason: String },

    /// Represents a stored URL that could not be parsed back.
    #[error("unable to parse URL: {url}")]
    UnableToParseUrl {
        url: String,
        source: url::ParseError,
    },

    /// Represents a failure to generate an audio reference URL.
    #[error("failed to generate URL")]
    FailedToGenerateUrl { source: url::ParseError },
}
