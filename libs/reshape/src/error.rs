use std::fmt;
use std::sync::Arc;

/// Error type returned by validators and capability hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cloneable form of [`BoxError`] stored inside [`ConvertError`].
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Error category. Mirrors where in a conversion the failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source value is missing or not usable.
    Source,
    /// No conversion strategy exists for a type pair.
    Synthesis,
    /// A conversion strategy exists but the value could not be converted.
    Execution,
    /// A field validator rejected the converted value.
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Source => f.write_str("source"),
            ErrorKind::Synthesis => f.write_str("synthesis"),
            ErrorKind::Execution => f.write_str("execution"),
            ErrorKind::Validation => f.write_str("validation"),
        }
    }
}

/// Error returned by every conversion entry point.
///
/// Cloneable so that a failed in-flight synthesis can be handed to every
/// thread waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConvertError {
    #[error("conversion source is not valid")]
    InvalidSource,

    #[error("invalid conversion from {src} to {dst}")]
    Impossible { src: &'static str, dst: &'static str },

    #[error("attempt to read from a nil pointer")]
    NilPointerRead,

    #[error("failed to convert {src} to {dst}")]
    Coerce { src: &'static str, dst: &'static str },

    #[error("value {value} is out of range for {dst}")]
    OutOfRange { value: String, dst: &'static str },

    #[error("value does not match the shape described by {0}")]
    ShapeMismatch(&'static str),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("json: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("{0}")]
    Hook(SharedError),

    #[error("unknown validator '{0}'")]
    UnknownValidator(String),

    #[error("validator '{name}': {reason}")]
    ValidatorArgs { name: String, reason: String },

    #[error("{0}")]
    Validation(SharedError),

    #[error("on field {field}: {source}")]
    Field {
        field: String,
        source: Box<ConvertError>,
    },
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InvalidSource | ConvertError::NilPointerRead => ErrorKind::Source,
            ConvertError::Impossible { .. }
            | ConvertError::UnknownValidator(_)
            | ConvertError::ValidatorArgs { .. } => ErrorKind::Synthesis,
            ConvertError::Validation(_) => ErrorKind::Validation,
            ConvertError::Field { source, .. } => source.kind(),
            _ => ErrorKind::Execution,
        }
    }

    /// Attribute the error to a destination field.
    ///
    /// Only the innermost field is kept: an error that already names a
    /// field is returned unchanged.
    pub fn with_field(self, field: impl fmt::Display) -> Self {
        match self {
            field_error @ ConvertError::Field { .. } => field_error,
            other => ConvertError::Field {
                field: field.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Name of the field the error is attributed to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConvertError::Field { field, .. } => Some(field),
            _ => None,
        }
    }

    /// The underlying error with field attribution stripped.
    pub fn root(&self) -> &ConvertError {
        match self {
            ConvertError::Field { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(e: serde_json::Error) -> Self {
        ConvertError::Json(Arc::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_field_keeps_innermost_name() {
        let err = ConvertError::NilPointerRead
            .with_field("inner")
            .with_field("outer");
        assert_eq!(err.field(), Some("inner"));
        assert_eq!(err.to_string(), "on field inner: attempt to read from a nil pointer");
        assert!(matches!(err.root(), ConvertError::NilPointerRead));
    }

    #[test]
    fn kind_follows_the_wrapped_error() {
        let err = ConvertError::Impossible { src: "a", dst: "b" }.with_field("x");
        assert_eq!(err.kind(), ErrorKind::Synthesis);
        assert_eq!(ConvertError::InvalidSource.kind(), ErrorKind::Source);
        let coerce = ConvertError::Coerce { src: "alloc::string::String", dst: "i64" };
        assert_eq!(coerce.kind(), ErrorKind::Execution);
    }
}
