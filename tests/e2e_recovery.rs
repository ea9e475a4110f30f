//! Crash recovery: close a database (simulating a crash by simply dropping
//! it without an explicit checkpoint) and reopen it, asserting the WAL
//! replay reconstructs exactly the committed state.

use strataql::{Database, DbConfig, Error, QueryResult, Scalar, Session};

fn select_rows(db: &Database, session: &Session, sql: &str) -> Vec<Vec<Scalar>> {
    match db.execute(session, sql).unwrap() {
        QueryResult::Select { rows, .. } => rows,
        other => panic!("expected a SELECT result, got {other:?}"),
    }
}

#[test]
fn committed_writes_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::create(dir.path(), DbConfig::default()).unwrap();
        let session = Session::new();
        db.execute(&session, "CREATE TABLE accounts (id INT, balance INT)").unwrap();
        db.execute(&session, "INSERT INTO accounts VALUES (1, 100)").unwrap();
        db.execute(&session, "INSERT INTO accounts VALUES (2, 250)").unwrap();
        db.execute(&session, "UPDATE accounts SET balance = 150 WHERE id = 1").unwrap();
    }
    // db is dropped here with no explicit checkpoint or shutdown call.

    let db = Database::open(dir.path(), DbConfig::default()).unwrap();
    let session = Session::new();
    let rows = select_rows(&db, &session, "SELECT id, balance FROM accounts ORDER BY id");
    assert_eq!(rows, vec![vec![Scalar::Int(1), Scalar::Int(150)], vec![Scalar::Int(2), Scalar::Int(250)]]);
}

#[test]
fn an_uncommitted_transaction_is_rolled_back_by_recovery() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::create(dir.path(), DbConfig::default()).unwrap();
        let session = Session::new();
        db.execute(&session, "CREATE TABLE items (id INT, name TEXT)").unwrap();
        db.execute(&session, "INSERT INTO items VALUES (1, 'committed')").unwrap();
        db.execute(&session, "BEGIN").unwrap();
        db.execute(&session, "INSERT INTO items VALUES (2, 'never-committed')").unwrap();
        // No COMMIT: the process "crashes" with this transaction still open.
    }

    let db = Database::open(dir.path(), DbConfig::default()).unwrap();
    let session = Session::new();
    let rows = select_rows(&db, &session, "SELECT name FROM items ORDER BY id");
    assert_eq!(rows.len(), 1, "a transaction with no commit record must not be replayed");
    assert_eq!(rows[0][0], Scalar::Text("committed".into()));
}

#[test]
fn an_explicitly_rolled_back_transaction_leaves_no_trace_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::create(dir.path(), DbConfig::default()).unwrap();
        let session = Session::new();
        db.execute(&session, "CREATE TABLE items (id INT, name TEXT)").unwrap();
        db.execute(&session, "INSERT INTO items VALUES (1, 'keep')").unwrap();
        db.execute(&session, "BEGIN").unwrap();
        db.execute(&session, "INSERT INTO items VALUES (2, 'abandoned')").unwrap();
        db.execute(&session, "ROLLBACK").unwrap();
    }

    let db = Database::open(dir.path(), DbConfig::default()).unwrap();
    let session = Session::new();
    let rows = select_rows(&db, &session, "SELECT id FROM items");
    assert_eq!(rows.len(), 1);
}

#[test]
fn schema_changes_survive_recovery_alongside_data() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::create(dir.path(), DbConfig::default()).unwrap();
        let session = Session::new();
        db.execute(&session, "CREATE TABLE widgets (id INT, label TEXT)").unwrap();
        db.execute(&session, "INSERT INTO widgets VALUES (1, 'a')").unwrap();
        db.execute(&session, "ALTER TABLE widgets ADD COLUMN weight INT DEFAULT 0").unwrap();
        db.execute(&session, "INSERT INTO widgets VALUES (2, 'b', 10)").unwrap();
    }

    let db = Database::open(dir.path(), DbConfig::default()).unwrap();
    let session = Session::new();
    let rows = select_rows(&db, &session, "SELECT id, weight FROM widgets ORDER BY id");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1], Scalar::Int(0));
    assert_eq!(rows[1][1], Scalar::Int(10));
}

#[test]
fn vector_columns_are_rebuilt_from_recovered_rows() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::create(dir.path(), DbConfig::default()).unwrap();
        let session = Session::new();
        db.execute(&session, "CREATE TABLE docs (id INT, embedding VECTOR(2))").unwrap();
        db.execute(&session, "INSERT INTO docs VALUES (1, [1.0, 0.0])").unwrap();
        db.execute(&session, "INSERT INTO docs VALUES (2, [0.0, 1.0])").unwrap();
    }

    let db = Database::open(dir.path(), DbConfig::default()).unwrap();
    let store = db.vector_store("docs", "embedding").unwrap();
    assert_eq!(store.hnsw.len(), 2);
    let hits = store.hnsw.search(&[1.0, 0.0], 1, 16).unwrap();
    assert_eq!(hits[0].0, 1);
}

#[test]
fn a_new_transaction_after_reopen_gets_a_fresh_id_past_recovered_transactions() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::create(dir.path(), DbConfig::default()).unwrap();
        let session = Session::new();
        db.execute(&session, "CREATE TABLE t (id INT)").unwrap();
        for i in 0..5 {
            db.execute(&session, &format!("INSERT INTO t VALUES ({i})")).unwrap();
        }
    }

    let db = Database::open(dir.path(), DbConfig::default()).unwrap();
    let session = Session::new();
    // A fresh write-write conflict check still functions after reopen, which
    // requires the resumed transaction id counter to be strictly ahead of
    // every id recovery marked committed.
    let other = Session::new();
    db.execute(&session, "BEGIN").unwrap();
    db.execute(&session, "UPDATE t SET id = 99 WHERE id = 0").unwrap();
    let result = db.execute(&other, "UPDATE t SET id = 100 WHERE id = 0");
    assert!(matches!(result, Err(Error::SerializationFailure(_))));
    db.execute(&session, "ROLLBACK").unwrap();
}
