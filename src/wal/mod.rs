//! Write-ahead log: records, the append-only writer, and the sequential
//! reader recovery replays.

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::{read_all, WalReadResult};
pub use record::{Lsn, SchemaChange, WalRecord};
pub use writer::{WalConfig, WalWriter};
