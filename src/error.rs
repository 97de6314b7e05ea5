use thiserror::Error;

/// SIFT3D error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-keypoint outcome of a pipeline stage.
///
/// A `Reject` drops the keypoint from the store without failing the
/// surrounding operation; hard failures use `Err` on the enclosing `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Accept(T),
    Reject,
}

impl<T> Outcome<T> {
    /// Map the accepted value, passing rejection through.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Accept(v) => Outcome::Accept(f(v)),
            Outcome::Reject => Outcome::Reject,
        }
    }
}
