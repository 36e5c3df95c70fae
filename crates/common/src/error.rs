//! Error variants.
use std::{
    convert::{Infallible, TryFrom},
    error, fmt, result,
};

use log::SetLoggerError;

/// Result type with [`Error`] variants.
///
/// [`Error`]: ./enum.Error.html
pub type Result<T> = result::Result<T, Error>;

/// Error variants used in the back-end crates.
///
/// Every variant is fatal: generation stops at the first error and nothing is
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Error {
    /// Unknown error.
    UnknownError,
    /// Generic CLI error.
    CLIError(String),
    /// Indicates an invalid argument is provided.
    InvalidArgument(String),
    /// Indicates an unexpected duplicate is provided.
    UnexpectedDuplicate,
    /// File I/O error.
    FileIOError(String),
    /// Parsing error.
    ParsingError(String),
    /// Back-end error.
    BackEndError(String),
    /// Project error
    ProjectError(String),
    /// Library error
    LibraryError(String),
    /// Two owners attempted to drive the same storage.
    DriverConflict(String),
    /// A variable was referenced before it was declared.
    UndeclaredReference(String),
    /// A component port or generic could not be mapped.
    MappingError(String),
    /// A stream is missing mandatory ports or is otherwise malformed.
    StreamError(String),
    /// No library core matches an operation.
    ResolutionError(String),
    /// The dataflow graph is malformed or uses unsupported constructs.
    GraphError(String),
}

impl fmt::Display for Error {
    /// Display the error variants.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::CLIError(ref msg) => write!(f, "CLI Error: {}", msg),
            Error::InvalidArgument(ref msg) => write!(f, "Invalid argument: {}", msg),
            Error::UnexpectedDuplicate => write!(f, "Unexpected duplicate"),
            Error::UnknownError => write!(f, "Unknown error"),
            Error::FileIOError(ref msg) => write!(f, "File I/O error: {}", msg),
            Error::ParsingError(ref msg) => write!(f, "Parsing error: {}", msg),
            Error::BackEndError(ref msg) => write!(f, "Back-end error: {}", msg),
            Error::ProjectError(ref msg) => write!(f, "Project error: {}", msg),
            Error::LibraryError(ref msg) => write!(f, "Library error: {}", msg),
            Error::DriverConflict(ref msg) => write!(f, "Driver conflict: {}", msg),
            Error::UndeclaredReference(ref msg) => write!(f, "Undeclared reference: {}", msg),
            Error::MappingError(ref msg) => write!(f, "Mapping error: {}", msg),
            Error::StreamError(ref msg) => write!(f, "Stream error: {}", msg),
            Error::ResolutionError(ref msg) => write!(f, "Resolution error: {}", msg),
            Error::GraphError(ref msg) => write!(f, "Graph error: {}", msg),
        }
    }
}

impl error::Error for Error {}

impl From<Box<dyn error::Error>> for Error {
    fn from(error: Box<dyn error::Error>) -> Self {
        if let Ok(error) = error.downcast::<Self>() {
            *error
        } else {
            Error::UnknownError
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::FileIOError(e.to_string())
    }
}

impl From<SetLoggerError> for Error {
    fn from(e: SetLoggerError) -> Self {
        Error::CLIError(e.to_string())
    }
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

pub trait ResultFrom<T>: Sized {
    fn result_from(value: T) -> Result<Self>;
}

pub trait TryResult<T> {
    fn try_result(self) -> Result<T>;
}

impl<T, U, E> ResultFrom<U> for T
where
    Error: From<E>,
    T: TryFrom<U, Error = E>,
{
    fn result_from(value: U) -> Result<Self> {
        T::try_from(value).map_err(From::from)
    }
}

impl<T, U> TryResult<T> for U
where
    T: ResultFrom<U>,
{
    fn try_result(self) -> Result<T> {
        T::result_from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error() {
        let a = Error::InvalidArgument("test".to_string());
        let b = Error::UnexpectedDuplicate;
        let c = Error::DriverConflict("x".to_string());
        assert_eq!(a.to_string(), "Invalid argument: test");
        assert_eq!(b.to_string(), "Unexpected duplicate");
        assert_eq!(c.to_string(), "Driver conflict: x");
    }

    #[test]
    fn io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err, Error::FileIOError("gone".to_string()));
    }
}
