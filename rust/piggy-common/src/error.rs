use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// A stored value was rejected before any of its bytes were encoded.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Validation {
                field: field.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    /// Malformed encoded data (varint overflow, bad UTF-8, unknown type code, ...).
    pub fn encoding(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Encoding {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn concurrency_violation(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::ConcurrencyViolation {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn unexpected_eof(context: impl Into<String>) -> Error {
        Error::io(context, std::io::ErrorKind::UnexpectedEof.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io { .. })
    }

    pub fn is_concurrency_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::ConcurrencyViolation { .. })
    }

    /// Returns the underlying I/O error kind, if this is an I/O failure.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self.kind() {
            ErrorKind::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid value for field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("invalid encoding of '{element}': {message}")]
    Encoding { element: String, message: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("concurrency violation: {message}")]
    ConcurrencyViolation { message: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn test_error_kinds() {
        let e = Error::validation("title", "too long");
        assert!(e.is_validation());
        assert_eq!(e.to_string(), "invalid value for field 'title': too long");

        let e = Error::unexpected_eof("read_byte");
        assert!(e.is_io());
        assert_eq!(e.io_kind(), Some(std::io::ErrorKind::UnexpectedEof));

        let e: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(e.into_kind(), ErrorKind::Io { .. }));

        let e = Error::concurrency_violation("release");
        assert!(e.is_concurrency_violation());
        assert!(!e.is_io());
    }
}
