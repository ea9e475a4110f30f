//! The embeddable façade: owns every table, every auto-provisioned vector
//! store, the transaction manager/CLOG, and (when opened on disk) the WAL
//! writer. `Session` is an explicit per-connection transaction handle,
//! resolving the "per-thread or per-connection" tx-context question in
//! favor of a handle the host owns and passes explicitly, rather than
//! thread-local state — the natural choice for an in-process library that
//! may be driven from more threads than it has open transactions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::clog::Clog;
use crate::config::DbConfig;
use crate::error::{Error, Result};
use crate::executor::{self, QueryResult};
use crate::recovery;
use crate::sql::ast::{ColumnDef, Statement};
use crate::sql::parser::parse_statement;
use crate::storage::Table;
use crate::txn::manager::UndoOp;
use crate::txn::{Transaction, TransactionManager};
use crate::types::{ColumnType, Scalar, TableSchema};
use crate::vector::VectorStore;
use crate::wal::{self, WalConfig, WalRecord, WalWriter};

/// An explicit per-connection transaction handle. `None` means autocommit:
/// each statement runs in its own implicit transaction.
pub struct Session {
    tx: Mutex<Option<Arc<Transaction>>>,
}

impl Session {
    pub fn new() -> Self {
        Self { tx: Mutex::new(None) }
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.lock().is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Database {
    pub(crate) tables: DashMap<String, Arc<Table>>,
    pub(crate) vectors: DashMap<(String, String), Arc<VectorStore>>,
    pub(crate) tm: Arc<TransactionManager>,
    pub(crate) clog: Arc<Clog>,
    pub(crate) wal: Option<Arc<WalWriter>>,
    pub(crate) config: DbConfig,
    data_dir: Option<PathBuf>,
}

impl Database {
    /// An ephemeral, WAL-less database: durable only across the lifetime of
    /// the process. Useful for tests and scratch sessions.
    pub fn in_memory(config: DbConfig) -> Self {
        let clog = Arc::new(Clog::new());
        Self {
            tables: DashMap::new(),
            vectors: DashMap::new(),
            tm: Arc::new(TransactionManager::new(clog.clone())),
            clog,
            wal: None,
            config,
            data_dir: None,
        }
    }

    /// Create a fresh on-disk database rooted at `dir`.
    pub fn create(dir: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        std::fs::create_dir_all(dir.join("tables"))?;
        std::fs::create_dir_all(dir.join("vectors"))?;
        let writer = WalWriter::create(dir.join("wal"), config.wal.clone())?;
        let clog = Arc::new(Clog::new());
        Ok(Self {
            tables: DashMap::new(),
            vectors: DashMap::new(),
            tm: Arc::new(TransactionManager::new(clog.clone())),
            clog,
            wal: Some(Arc::new(writer)),
            config,
            data_dir: Some(dir),
        })
    }

    /// Open an existing on-disk database, replaying its WAL via the
    /// two-pass analyze-then-redo recovery algorithm. Every
    /// table is rebuilt purely from the log — the WAL's `Schema` records
    /// already make it self-sufficient, so `persistence::{save,load}_table`
    /// is a separate explicit export/import facility, not consulted here.
    /// Once tables are repopulated, every vector column's HNSW is rebuilt
    /// by rescanning live rows, since vector inserts are not individually
    /// WAL-logged.
    pub fn open(dir: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let wal_dir = dir.join("wal");
        let read = wal::read_all(&wal_dir)?;
        let record_count = read.records.len() as u64;
        let plan = recovery::analyze(read.records, read.truncated);

        let tables: DashMap<String, Arc<Table>> = DashMap::new();
        let report = recovery::apply(&plan, &tables);
        tracing::info!(
            redo = report.redo_count,
            skipped = report.skipped_txns,
            schema_changes = report.schema_changes,
            "recovered database from WAL"
        );

        let clog = Arc::new(Clog::new());
        for tx_id in &plan.committed {
            clog.mark_committed(*tx_id);
        }

        let vectors: DashMap<(String, String), Arc<VectorStore>> = DashMap::new();
        for entry in tables.iter() {
            rebuild_vector_stores(entry.key(), entry.value(), &config, &vectors);
        }

        let max_tx_id = plan.committed.iter().next_back().copied().unwrap_or(0);
        let tm = Arc::new(TransactionManager::resume_at(clog.clone(), max_tx_id + 1));

        let writer = WalWriter::resume(&wal_dir, config.wal.clone(), record_count + 1)?;

        Ok(Self {
            tables,
            vectors,
            tm,
            clog,
            wal: Some(Arc::new(writer)),
            config,
            data_dir: Some(dir),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn tm(&self) -> &Arc<TransactionManager> {
        &self.tm
    }

    pub fn clog(&self) -> &Arc<Clog> {
        &self.clog
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).map(|e| e.clone())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|e| e.key().clone()).collect()
    }

    pub fn vector_store(&self, table: &str, column: &str) -> Option<Arc<VectorStore>> {
        self.vectors.get(&(table.to_string(), column.to_string())).map(|e| e.clone())
    }

    /// Lowest tx id any active transaction's snapshot could still need;
    /// `None` means no transaction is active and any version may be
    /// reclaimed by VACUUM.
    pub fn oldest_active_tx(&self) -> Option<u64> {
        self.tm.oldest_active_tx()
    }

    /// Append a WAL record (no-op in WAL-less in-memory mode) and, under
    /// `DurabilityLevel::EveryWrite`, fsync immediately.
    pub(crate) fn log(&self, record: &WalRecord) -> Result<()> {
        let Some(wal) = &self.wal else { return Ok(()) };
        let lsn = wal.append(record)?;
        if self.config.durability == crate::config::DurabilityLevel::EveryWrite {
            wal.flush_through(lsn)?;
        }
        Ok(())
    }

    /// Make every WAL record appended so far for `tx_id`'s commit durable.
    /// Called after the COMMIT record itself has been appended, and before
    /// the transaction manager flips the CLOG — WAL durability must precede
    /// the visible commit.
    pub(crate) fn flush_commit(&self) -> Result<()> {
        let Some(wal) = &self.wal else { return Ok(()) };
        let lsn = wal.current_lsn();
        wal.flush_through(lsn)
    }

    /// Register a brand new vector store for `column` on `table`, used by
    /// CREATE TABLE when the schema includes a `Vector(dim)` column.
    pub(crate) fn provision_vector_store(&self, table: &str, column: &str, dimension: usize) {
        let store = Arc::new(VectorStore::new(self.config.hnsw.config_for(dimension)));
        self.vectors.insert((table.to_string(), column.to_string()), store);
    }

    pub(crate) fn drop_table_vector_stores(&self, table: &str) {
        self.vectors.retain(|(t, _), _| t != table);
    }

    /// Execute one SQL statement. `BEGIN`/`COMMIT`/`ROLLBACK` manage
    /// `session`'s transaction handle directly; everything else runs inside
    /// `session`'s open transaction, or an implicit autocommit transaction
    /// if none is open.
    pub fn execute(&self, session: &Session, sql: &str) -> Result<QueryResult> {
        let trimmed = sql.trim();
        if trimmed.to_ascii_uppercase().starts_with("EXPLAIN") {
            let rest = trimmed["EXPLAIN".len()..].trim();
            let stmt = parse_statement(rest)?;
            let Statement::Select(select) = stmt else {
                return Err(Error::Validation("EXPLAIN only supports SELECT".into()));
            };
            return self.with_autocommit(session, |db, tx| executor::explain_select(db, tx, &select));
        }

        let stmt = parse_statement(sql)?;
        match stmt {
            Statement::Begin => {
                let mut guard = session.tx.lock();
                if guard.is_some() {
                    return Err(Error::Validation("transaction already open".into()));
                }
                *guard = Some(self.tm.begin());
                Ok(QueryResult::Message("BEGIN".into()))
            }
            Statement::Commit => {
                let tx = session.tx.lock().take().ok_or_else(|| Error::Validation("no open transaction".into()))?;
                self.commit(&tx)?;
                Ok(QueryResult::Message("COMMIT".into()))
            }
            Statement::Rollback => {
                let tx = session.tx.lock().take().ok_or_else(|| Error::Validation("no open transaction".into()))?;
                self.rollback(&tx);
                Ok(QueryResult::Message("ROLLBACK".into()))
            }
            other => {
                let explicit = session.tx.lock().clone();
                match explicit {
                    Some(tx) => executor::execute(self, &tx, &other),
                    None => self.with_autocommit(session, |db, tx| executor::execute(db, tx, &other)),
                }
            }
        }
    }

    fn with_autocommit<T>(&self, _session: &Session, f: impl FnOnce(&Database, &Arc<Transaction>) -> Result<T>) -> Result<T> {
        let tx = self.tm.begin();
        match f(self, &tx) {
            Ok(value) => {
                self.commit(&tx)?;
                Ok(value)
            }
            Err(err) => {
                self.rollback(&tx);
                Err(err)
            }
        }
    }

    pub(crate) fn commit(&self, tx: &Arc<Transaction>) -> Result<()> {
        self.log(&WalRecord::Commit { tx_id: tx.id })?;
        self.flush_commit()?;
        self.tm.finish_commit(tx);
        Ok(())
    }

    pub(crate) fn rollback(&self, tx: &Arc<Transaction>) {
        for op in tx.take_undo_reversed() {
            self.undo(op);
        }
        let _ = self.log(&WalRecord::Abort { tx_id: tx.id });
        self.tm.finish_rollback(tx);
    }

    fn undo(&self, op: UndoOp) {
        match op {
            UndoOp::InsertedRow { table, row_id } => {
                if let Some(t) = self.table(&table) {
                    t.remove_chain(row_id);
                }
            }
            UndoOp::UpdatedRow { table, row_id, old_head } => {
                if let Some(t) = self.table(&table) {
                    old_head.clear_xmax();
                    t.set_chain_head(row_id, old_head);
                }
            }
            UndoOp::DeletedRow { table, row_id } => {
                if let Some(t) = self.table(&table) {
                    if let Some(head) = t.chain_head(row_id) {
                        head.clear_xmax();
                    }
                }
            }
            UndoOp::IndexInsert { table, column, key, row_id } => {
                if let Some(t) = self.table(&table) {
                    t.index_remove(&column, &key, row_id);
                }
            }
            UndoOp::IndexRemove { table, column, key, row_id } => {
                if let Some(t) = self.table(&table) {
                    t.index_insert(&column, key, row_id);
                }
            }
            UndoOp::VectorInserted { table, column, external_id } => {
                if let Some(v) = self.vector_store(&table, &column) {
                    v.remove(external_id);
                }
            }
            UndoOp::VectorRemoved { table, column, external_id, vector, metadata } => {
                if let Some(v) = self.vector_store(&table, &column) {
                    let _ = v.insert(external_id, vector, metadata);
                }
            }
        }
    }

    /// Reclaim row versions no longer visible to any possible snapshot.
    /// `table` restricts the sweep to one table; `None` vacuums every
    /// table.
    pub fn vacuum(&self, table: Option<&str>) -> Result<Vec<(String, crate::storage::VacuumStats)>> {
        let horizon = self.tm.oldest_active_tx().unwrap_or(u64::MAX);
        let names: Vec<String> = match table {
            Some(t) => vec![t.to_string()],
            None => self.table_names(),
        };
        let mut out = Vec::new();
        for name in names {
            let Some(t) = self.table(&name) else {
                return Err(Error::NotFound(format!("table '{name}'")));
            };
            let stats = t.vacuum(horizon, &self.clog);
            out.push((name, stats));
        }
        Ok(out)
    }

    /// Write a full snapshot of every table and vector store to `dir`
    /// (defaulting to the database's own data directory). A separate,
    /// explicit facility from crash recovery — see `open`'s doc comment.
    pub fn checkpoint(&self, dir: Option<&Path>) -> Result<()> {
        let root = dir.or(self.data_dir.as_deref()).ok_or_else(|| Error::Validation("checkpoint requires a directory".into()))?;
        let tables_dir = root.join("tables");
        let vectors_dir = root.join("vectors");
        std::fs::create_dir_all(&tables_dir)?;
        std::fs::create_dir_all(&vectors_dir)?;
        for entry in self.tables.iter() {
            crate::persistence::save_table(entry.value(), tables_dir.join(format!("{}.tbl", entry.key())))?;
        }
        for entry in self.vectors.iter() {
            let (table, column) = entry.key();
            entry.value().save(vectors_dir.join(format!("{table}.{column}.vec")))?;
        }
        if let Some(wal) = &self.wal {
            let lsn = wal.current_lsn();
            wal.append(&WalRecord::Checkpoint { lsn })?;
            wal.flush_through(lsn)?;
        }
        Ok(())
    }

    /// Create a table, provisioning a vector store for every `Vector(dim)`
    /// column.
    pub(crate) fn create_table(&self, schema: TableSchema) -> Result<()> {
        if self.tables.contains_key(&schema.name) {
            return Err(Error::Schema(format!("table '{}' already exists", schema.name)));
        }
        self.log(&WalRecord::Schema(crate::wal::SchemaChange::CreateTable(schema.clone())))?;
        let vector_columns: Vec<(String, usize)> = schema
            .columns
            .iter()
            .filter_map(|c| match c.ty {
                ColumnType::Vector(dim) => Some((c.name.clone(), dim)),
                _ => None,
            })
            .collect();
        let name = schema.name.clone();
        self.tables.insert(name.clone(), Arc::new(Table::new(schema)));
        for (column, dim) in vector_columns {
            self.provision_vector_store(&name, &column, dim);
        }
        Ok(())
    }

    pub(crate) fn drop_table(&self, name: &str) -> Result<()> {
        if self.tables.remove(name).is_none() {
            return Err(Error::NotFound(format!("table '{name}'")));
        }
        self.drop_table_vector_stores(name);
        self.log(&WalRecord::Schema(crate::wal::SchemaChange::DropTable { table: name.to_string() }))
    }

    pub(crate) fn alter_table_add_column(&self, table: &str, column: &ColumnDef, default: Option<Scalar>) -> Result<()> {
        let entry = self.table(table).ok_or_else(|| Error::NotFound(format!("table '{table}'")))?;
        let col_schema = crate::types::ColumnSchema { name: column.name.clone(), ty: column.ty, nullable: column.nullable };
        let default_value = default.clone().unwrap_or(Scalar::Null);
        if !column.nullable && default.is_none() {
            return Err(Error::Schema(format!("column '{}' is not nullable and has no default", column.name)));
        }
        let rebuilt = entry.with_added_column(col_schema.clone(), default_value.clone());
        self.log(&WalRecord::Schema(crate::wal::SchemaChange::AddColumn {
            table: table.to_string(),
            column: col_schema.clone(),
            default,
        }))?;
        if let ColumnType::Vector(dim) = col_schema.ty {
            self.provision_vector_store(table, &col_schema.name, dim);
        }
        self.tables.insert(table.to_string(), Arc::new(rebuilt));
        Ok(())
    }

    pub(crate) fn create_index(&self, table: &str, column: &str) -> Result<()> {
        let t = self.table(table).ok_or_else(|| Error::NotFound(format!("table '{table}'")))?;
        t.create_index(column)?;
        self.log(&WalRecord::Schema(crate::wal::SchemaChange::CreateIndex { table: table.to_string(), column: column.to_string() }))
    }

    pub(crate) fn drop_index(&self, table: &str, column: &str) -> Result<()> {
        let t = self.table(table).ok_or_else(|| Error::NotFound(format!("table '{table}'")))?;
        t.drop_index(column);
        self.log(&WalRecord::Schema(crate::wal::SchemaChange::DropIndex { table: table.to_string(), column: column.to_string() }))
    }
}

fn rebuild_vector_stores(table_name: &str, table: &Arc<Table>, config: &DbConfig, vectors: &DashMap<(String, String), Arc<VectorStore>>) {
    for col in &table.schema.columns {
        if let ColumnType::Vector(dim) = col.ty {
            let store = Arc::new(VectorStore::new(config.hnsw.config_for(dim)));
            for row_id in table.row_ids() {
                if let Some(head) = table.chain_head(row_id) {
                    if head.is_live() {
                        if let Some(Scalar::Vector(v)) = head.values.get(&col.name) {
                            let _ = store.insert(row_id, v.clone(), None);
                        }
                    }
                }
            }
            vectors.insert((table_name.to_string(), col.name.clone()), store);
        }
    }
}
