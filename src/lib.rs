//! `strataql`: an embeddable database unifying a row store with MVCC
//! snapshot isolation, a B-tree secondary-index layer, a write-ahead log
//! with crash recovery, an HNSW approximate vector index, and a
//! property-graph layer over the same external ids, all driven through one
//! SQL-shaped statement language.
//!
//! [`Database`] is the façade: open or create one, then drive it through
//! [`Session`] with [`Database::execute`].

pub mod clog;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod persistence;
pub mod recovery;
pub mod sql;
pub mod storage;
pub mod txn;
pub mod types;
pub mod vector;
pub mod wal;

pub use config::{DbConfig, DurabilityLevel, HnswDefaults};
pub use database::{Database, Session};
pub use error::{Error, Result};
pub use executor::QueryResult;
pub use sql::Statement;
pub use types::{ColumnSchema, ColumnType, Scalar, TableSchema};
