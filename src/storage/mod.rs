//! The row store: multi-version row chains, secondary B-tree indexes, and
//! the table that owns them.

pub mod btree_index;
pub mod row;
pub mod table;

pub use btree_index::BTreeIndex;
pub use row::RowVersion;
pub use table::{Table, VacuumStats};
