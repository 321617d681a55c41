//! Error types for the fs-store persistence provider.

use thiserror::Error;

/// Result type alias using the provider's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type returned by every provider operation.
///
/// Every variant here corresponds to one of the error kinds the mutation
/// path can surface synchronously; none are swallowed except malformed
/// records encountered during `load`, which are logged and skipped.
#[derive(Error, Debug)]
pub enum Error {
    /// `publicKey` contains a path separator, a leading `~`, or is empty.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// `publicKey` collides with an existing document in the same entity set.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The target of an update/remove/reload does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation referenced an entity set that was never registered.
    #[error("Schema unknown: {0}")]
    SchemaUnknown(String),

    /// A `config.json` record could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Underlying filesystem failure during stage, commit or read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure outside of a decode-on-load path.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Anything else that should never happen in a correct caller.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
