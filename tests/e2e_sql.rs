//! End-to-end SQL surface coverage: DDL, DML, joins, aggregation, ordering,
//! subqueries, and `EXPLAIN`, all driven through `Database::execute` the
//! way a host application would.

use strataql::{Database, DbConfig, QueryResult, Scalar, Session};

fn select_rows(db: &Database, session: &Session, sql: &str) -> (Vec<String>, Vec<Vec<Scalar>>) {
    match db.execute(session, sql).unwrap() {
        QueryResult::Select { columns, rows } => (columns, rows),
        other => panic!("expected a SELECT result, got {other:?}"),
    }
}

fn setup_users_orders(db: &Database, session: &Session) {
    db.execute(session, "CREATE TABLE users (id INT, name TEXT, age INT)").unwrap();
    db.execute(session, "CREATE TABLE orders (id INT, user_id INT, total INT)").unwrap();
    db.execute(session, "INSERT INTO users VALUES (1, 'Alice', 30)").unwrap();
    db.execute(session, "INSERT INTO users VALUES (2, 'Bob', 25)").unwrap();
    db.execute(session, "INSERT INTO users VALUES (3, 'Carol', 40)").unwrap();
    db.execute(session, "INSERT INTO orders VALUES (100, 1, 50)").unwrap();
    db.execute(session, "INSERT INTO orders VALUES (101, 1, 75)").unwrap();
    db.execute(session, "INSERT INTO orders VALUES (102, 2, 20)").unwrap();
}

#[test]
fn insert_and_select_round_trip() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    let (columns, rows) = select_rows(&db, &session, "SELECT name, age FROM users WHERE age > 25 ORDER BY age");
    assert_eq!(columns, vec!["name".to_string(), "age".to_string()]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Scalar::Text("Alice".into()));
    assert_eq!(rows[1][0], Scalar::Text("Carol".into()));
}

#[test]
fn update_and_delete_affect_only_matching_rows() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    let result = db.execute(&session, "UPDATE users SET age = 31 WHERE name = 'Alice'").unwrap();
    assert!(matches!(result, QueryResult::RowsAffected(1)));

    let (_, rows) = select_rows(&db, &session, "SELECT age FROM users WHERE name = 'Alice'");
    assert_eq!(rows[0][0], Scalar::Int(31));

    let result = db.execute(&session, "DELETE FROM users WHERE age < 30").unwrap();
    assert!(matches!(result, QueryResult::RowsAffected(1)));

    let (_, rows) = select_rows(&db, &session, "SELECT name FROM users ORDER BY name");
    assert_eq!(rows.len(), 2);
}

#[test]
fn inner_join_matches_related_rows() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    let (columns, rows) = select_rows(
        &db,
        &session,
        "SELECT u.name, o.total FROM users u JOIN orders o ON u.id = o.user_id ORDER BY o.total",
    );
    assert_eq!(columns, vec!["name".to_string(), "total".to_string()]);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec![Scalar::Text("Bob".into()), Scalar::Int(20)]);
    assert_eq!(rows[2], vec![Scalar::Text("Alice".into()), Scalar::Int(75)]);
}

#[test]
fn left_join_null_fills_users_without_orders() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    let (_, rows) = select_rows(
        &db,
        &session,
        "SELECT u.name, o.total FROM users u LEFT JOIN orders o ON u.id = o.user_id WHERE u.name = 'Carol'",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Scalar::Text("Carol".into()));
    assert!(rows[0][1].is_null());
}

#[test]
fn group_by_with_having_filters_on_aggregate() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    let (columns, rows) = select_rows(
        &db,
        &session,
        "SELECT user_id, SUM(total) FROM orders GROUP BY user_id HAVING SUM(total) > 60 ORDER BY user_id",
    );
    assert_eq!(columns[0], "user_id");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Scalar::Int(1));
    assert_eq!(rows[0][1], Scalar::Int(125));
}

#[test]
fn scalar_subquery_in_select_list() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    let (_, rows) = select_rows(
        &db,
        &session,
        "SELECT name FROM users WHERE id = (SELECT user_id FROM orders WHERE total = 20)",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Scalar::Text("Bob".into()));
}

#[test]
fn correlated_exists_subquery_finds_users_with_orders() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    let (_, rows) = select_rows(
        &db,
        &session,
        "SELECT name FROM users u WHERE EXISTS (SELECT id FROM orders o WHERE o.user_id = u.id) ORDER BY name",
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Scalar::Text("Alice".into()));
    assert_eq!(rows[1][0], Scalar::Text("Bob".into()));
}

#[test]
fn explain_reports_join_strategy_without_mutating() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    let result = db
        .execute(&session, "EXPLAIN SELECT u.name FROM users u JOIN orders o ON u.id = o.user_id")
        .unwrap();
    let QueryResult::Message(plan) = result else { panic!("EXPLAIN should return a message") };
    assert!(plan.contains("nested loop") || plan.contains("hash join"));

    let (_, rows) = select_rows(&db, &session, "SELECT name FROM users");
    assert_eq!(rows.len(), 3, "EXPLAIN must not have mutated or consumed any state");
}

#[test]
fn ddl_create_index_then_point_lookup_still_returns_correct_rows() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    db.execute(&session, "CREATE INDEX ON users(name)").unwrap();
    let (_, rows) = select_rows(&db, &session, "SELECT age FROM users WHERE name = 'Bob'");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Scalar::Int(25));
}

#[test]
fn alter_table_add_column_applies_default_to_existing_rows() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    setup_users_orders(&db, &session);

    db.execute(&session, "ALTER TABLE users ADD COLUMN active BOOL").unwrap();
    let (_, rows) = select_rows(&db, &session, "SELECT active FROM users WHERE name = 'Alice'");
    assert!(rows[0][0].is_null());
}
