//! Crate-wide error taxonomy.
//!
//! Mirrors the abstract kinds in the design document: schema errors, AST
//! contract violations, validation failures, conflicts, and I/O/corruption
//! during WAL or on-disk index access.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("malformed AST: {0}")]
    ParseForm(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate external id: {0}")]
    DuplicateExternalId(u64),

    #[error("serialization failure: write-write conflict on row {0}, retry the transaction")]
    SerializationFailure(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Corruption(err.to_string())
    }
}
