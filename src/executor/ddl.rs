//! DDL dispatch. Every variant here is a thin wrapper over a `Database`
//! method that already owns WAL logging and catalog mutation; the
//! executor's only job is turning the parsed statement into that call and
//! an acknowledgement message.

use crate::database::Database;
use crate::error::Result;
use crate::executor::QueryResult;
use crate::sql::ast::{AlterTableAddColumnStmt, CreateIndexStmt, CreateTableStmt, DropIndexStmt, DropTableStmt};
use crate::types::{ColumnSchema, TableSchema};

pub(crate) fn create_table(db: &Database, stmt: &CreateTableStmt) -> Result<QueryResult> {
    let columns = stmt
        .columns
        .iter()
        .map(|c| ColumnSchema { name: c.name.clone(), ty: c.ty, nullable: c.nullable })
        .collect();
    db.create_table(TableSchema::new(stmt.table.clone(), columns))?;
    Ok(QueryResult::Message(format!("CREATE TABLE {}", stmt.table)))
}

pub(crate) fn drop_table(db: &Database, stmt: &DropTableStmt) -> Result<QueryResult> {
    db.drop_table(&stmt.table)?;
    Ok(QueryResult::Message(format!("DROP TABLE {}", stmt.table)))
}

pub(crate) fn alter_table_add_column(db: &Database, stmt: &AlterTableAddColumnStmt) -> Result<QueryResult> {
    db.alter_table_add_column(&stmt.table, &stmt.column, stmt.default.clone())?;
    Ok(QueryResult::Message(format!("ALTER TABLE {} ADD COLUMN {}", stmt.table, stmt.column.name)))
}

pub(crate) fn create_index(db: &Database, stmt: &CreateIndexStmt) -> Result<QueryResult> {
    db.create_index(&stmt.table, &stmt.column)?;
    Ok(QueryResult::Message(format!("CREATE INDEX ON {}({})", stmt.table, stmt.column)))
}

pub(crate) fn drop_index(db: &Database, stmt: &DropIndexStmt) -> Result<QueryResult> {
    db.drop_index(&stmt.table, &stmt.column)?;
    Ok(QueryResult::Message(format!("DROP INDEX ON {}({})", stmt.table, stmt.column)))
}
