//! Snapshot isolation, write-write conflict detection, and commit/rollback
//! undo correctness, all driven through explicit `BEGIN`/`COMMIT`/`ROLLBACK`
//! sessions.

use strataql::{Database, DbConfig, Error, QueryResult, Scalar, Session};

fn scalar_rows(db: &Database, session: &Session, sql: &str) -> Vec<Vec<Scalar>> {
    match db.execute(session, sql).unwrap() {
        QueryResult::Select { rows, .. } => rows,
        other => panic!("expected a SELECT result, got {other:?}"),
    }
}

#[test]
fn own_uncommitted_writes_are_visible_to_self() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE counters (id INT, value INT)").unwrap();
    db.execute(&session, "INSERT INTO counters VALUES (1, 0)").unwrap();

    db.execute(&session, "BEGIN").unwrap();
    db.execute(&session, "UPDATE counters SET value = 5 WHERE id = 1").unwrap();
    let rows = scalar_rows(&db, &session, "SELECT value FROM counters WHERE id = 1");
    assert_eq!(rows[0][0], Scalar::Int(5), "a transaction must see its own uncommitted write");
    db.execute(&session, "ROLLBACK").unwrap();
}

#[test]
fn uncommitted_writes_are_invisible_to_other_sessions() {
    let db = Database::in_memory(DbConfig::default());
    let writer = Session::new();
    let reader = Session::new();
    db.execute(&writer, "CREATE TABLE counters (id INT, value INT)").unwrap();
    db.execute(&writer, "INSERT INTO counters VALUES (1, 0)").unwrap();

    db.execute(&writer, "BEGIN").unwrap();
    db.execute(&writer, "UPDATE counters SET value = 99 WHERE id = 1").unwrap();

    let rows = scalar_rows(&db, &reader, "SELECT value FROM counters WHERE id = 1");
    assert_eq!(rows[0][0], Scalar::Int(0), "an uncommitted write must not leak into another session's snapshot");

    db.execute(&writer, "COMMIT").unwrap();

    let rows = scalar_rows(&db, &reader, "SELECT value FROM counters WHERE id = 1");
    assert_eq!(rows[0][0], Scalar::Int(99), "the write becomes visible to new reads once committed");
}

#[test]
fn concurrent_update_of_same_row_yields_serialization_failure() {
    let db = Database::in_memory(DbConfig::default());
    let tx1 = Session::new();
    let tx2 = Session::new();
    db.execute(&tx1, "CREATE TABLE accounts (id INT, balance INT)").unwrap();
    db.execute(&tx1, "INSERT INTO accounts VALUES (1, 100)").unwrap();

    db.execute(&tx1, "BEGIN").unwrap();
    db.execute(&tx2, "BEGIN").unwrap();

    db.execute(&tx1, "UPDATE accounts SET balance = 150 WHERE id = 1").unwrap();
    let result = db.execute(&tx2, "UPDATE accounts SET balance = 200 WHERE id = 1");
    assert!(
        matches!(result, Err(Error::SerializationFailure(_))),
        "the second writer to an unclaimed row must lose the race, got {result:?}"
    );

    db.execute(&tx1, "COMMIT").unwrap();
    db.execute(&tx2, "ROLLBACK").unwrap();

    let rows = scalar_rows(&db, &tx1, "SELECT balance FROM accounts WHERE id = 1");
    assert_eq!(rows[0][0], Scalar::Int(150));
}

#[test]
fn rollback_undoes_insert_update_and_delete() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE items (id INT, name TEXT)").unwrap();
    db.execute(&session, "INSERT INTO items VALUES (1, 'kept')").unwrap();
    db.execute(&session, "INSERT INTO items VALUES (2, 'also-kept')").unwrap();

    db.execute(&session, "BEGIN").unwrap();
    db.execute(&session, "INSERT INTO items VALUES (3, 'ghost')").unwrap();
    db.execute(&session, "UPDATE items SET name = 'renamed' WHERE id = 1").unwrap();
    db.execute(&session, "DELETE FROM items WHERE id = 2").unwrap();
    db.execute(&session, "ROLLBACK").unwrap();

    let rows = scalar_rows(&db, &session, "SELECT id FROM items ORDER BY id");
    assert_eq!(rows.len(), 2, "rollback must undo the insert and the delete");
    assert_eq!(rows[0][0], Scalar::Int(1));
    assert_eq!(rows[1][0], Scalar::Int(2));

    let rows = scalar_rows(&db, &session, "SELECT name FROM items WHERE id = 1");
    assert_eq!(rows[0][0], Scalar::Text("kept".into()), "rollback must undo the update");
}

#[test]
fn commit_makes_every_statement_in_the_transaction_durable_together() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE items (id INT, name TEXT)").unwrap();

    db.execute(&session, "BEGIN").unwrap();
    db.execute(&session, "INSERT INTO items VALUES (1, 'a')").unwrap();
    db.execute(&session, "INSERT INTO items VALUES (2, 'b')").unwrap();
    db.execute(&session, "COMMIT").unwrap();

    let other = Session::new();
    let rows = scalar_rows(&db, &other, "SELECT id FROM items ORDER BY id");
    assert_eq!(rows.len(), 2);
}

#[test]
fn begin_twice_on_the_same_session_is_rejected() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE t (id INT)").unwrap();
    db.execute(&session, "BEGIN").unwrap();
    let result = db.execute(&session, "BEGIN");
    assert!(result.is_err());
    db.execute(&session, "ROLLBACK").unwrap();
}

#[test]
fn autocommit_statements_do_not_require_begin() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE t (id INT)").unwrap();
    assert!(!session.in_transaction());
    db.execute(&session, "INSERT INTO t VALUES (1)").unwrap();
    let rows = scalar_rows(&db, &session, "SELECT id FROM t");
    assert_eq!(rows.len(), 1);
}
