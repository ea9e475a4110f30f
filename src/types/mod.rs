//! Core scalar and schema types shared by the row store, WAL, and SQL layers.

mod scalar;
mod schema;

pub use scalar::Scalar;
pub use schema::{ColumnSchema, ColumnType, TableSchema};

/// Row identifier, unique within a table for the table's lifetime.
pub type RowId = u64;

/// Transaction identifier, monotonically increasing across the database.
pub type TxId = u64;

/// A row's values keyed by column name, in schema-declared order for
/// iteration but addressed by name everywhere else.
pub type RowValues = std::collections::BTreeMap<String, Scalar>;
