//! Transaction management: snapshot isolation, the CLOG-backed visibility
//! oracle, and the undo journal used to roll back a transaction's writes.

pub mod manager;
pub mod visibility;

pub use manager::{Snapshot, Transaction, TransactionManager, TxState, UndoOp};
pub use visibility::is_visible;
