//! The query executor: turns a parsed [`Statement`] into row-store, index,
//! and vector-store mutations (DDL/DML) or a result set (SELECT), inside
//! the caller's transaction.
//!
//! DDL and VACUUM dispatch straight to `Database`'s own methods, which
//! already own WAL logging for schema changes; this module's own concerns
//! are the SELECT pipeline (`select`), row mutation with MVCC conflict
//! detection and undo recording (`dml`), and join strategy selection
//! (`join`).

mod ddl;
mod dml;
pub mod join;
mod select;

use std::sync::Arc;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::sql::ast::{SelectStmt, Statement};
use crate::txn::Transaction;
use crate::types::Scalar;

#[derive(Debug, Clone)]
pub enum QueryResult {
    /// A plain status string: DDL acknowledgements, BEGIN/COMMIT/ROLLBACK,
    /// VACUUM summaries, EXPLAIN plans.
    Message(String),
    RowsAffected(usize),
    Select {
        columns: Vec<String>,
        rows: Vec<Vec<Scalar>>,
    },
}

pub fn execute(db: &Database, tx: &Arc<Transaction>, stmt: &Statement) -> Result<QueryResult> {
    match stmt {
        Statement::CreateTable(s) => ddl::create_table(db, s),
        Statement::DropTable(s) => ddl::drop_table(db, s),
        Statement::AlterTableAddColumn(s) => ddl::alter_table_add_column(db, s),
        Statement::CreateIndex(s) => ddl::create_index(db, s),
        Statement::DropIndex(s) => ddl::drop_index(db, s),
        Statement::Insert(s) => dml::insert(db, tx, s),
        Statement::Update(s) => dml::update(db, tx, s),
        Statement::Delete(s) => dml::delete(db, tx, s),
        Statement::Select(s) => select::execute_select(db, tx, s),
        Statement::Vacuum(table) => vacuum(db, table.as_deref()),
        Statement::Begin | Statement::Commit | Statement::Rollback => Err(Error::Validation(
            "BEGIN/COMMIT/ROLLBACK are handled by the session, not the executor".into(),
        )),
    }
}

pub fn explain_select(db: &Database, tx: &Arc<Transaction>, stmt: &SelectStmt) -> Result<QueryResult> {
    select::explain(db, tx, stmt)
}

fn vacuum(db: &Database, table: Option<&str>) -> Result<QueryResult> {
    let stats = db.vacuum(table)?;
    let removed: usize = stats.iter().map(|(_, s)| s.versions_removed).sum();
    let chains: usize = stats.iter().map(|(_, s)| s.chains_visited).sum();
    Ok(QueryResult::Message(format!(
        "VACUUM: {removed} row version(s) reclaimed across {chains} chain(s) in {} table(s)",
        stats.len()
    )))
}
