//! The HNSW/GraphRAG vector surface: direct `VectorStore` k-NN search and
//! graph traversal via `Database::vector_store`, plus the SQL-surfaced
//! per-row `SIMILARITY TO` distance expression.

use strataql::vector::NodeMetadata;
use strataql::{Database, DbConfig, QueryResult, Scalar, Session};

#[test]
fn create_table_with_vector_column_provisions_a_vector_store() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE docs (id INT, embedding VECTOR(3))").unwrap();

    assert!(db.vector_store("docs", "embedding").is_some());
    assert!(db.vector_store("docs", "nonexistent").is_none());
}

#[test]
fn insert_update_delete_keep_the_vector_store_in_sync_with_row_ids() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE docs (id INT, embedding VECTOR(3))").unwrap();
    db.execute(&session, "INSERT INTO docs VALUES (1, [1.0, 0.0, 0.0])").unwrap();
    db.execute(&session, "INSERT INTO docs VALUES (2, [0.0, 1.0, 0.0])").unwrap();

    let store = db.vector_store("docs", "embedding").unwrap();
    assert_eq!(store.hnsw.len(), 2);

    let hits = store.hnsw.search(&[1.0, 0.0, 0.0], 1, 16).unwrap();
    assert_eq!(hits.len(), 1);
    // external ids are row ids, so the closest hit resolves back to a SELECT.
    let QueryResult::Select { rows, .. } =
        db.execute(&session, &format!("SELECT id FROM docs WHERE id = {}", hits[0].0)).unwrap()
    else {
        panic!("expected a SELECT result");
    };
    assert_eq!(rows.len(), 1);

    db.execute(&session, "UPDATE docs SET embedding = [0.0, 0.0, 1.0] WHERE id = 1").unwrap();
    assert_eq!(store.hnsw.len(), 2, "an UPDATE replaces the vector in place, it doesn't grow the index");

    db.execute(&session, "DELETE FROM docs WHERE id = 2").unwrap();
    assert_eq!(store.hnsw.len(), 1);
}

#[test]
fn vector_mutations_are_undone_on_rollback() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE docs (id INT, embedding VECTOR(2))").unwrap();
    db.execute(&session, "INSERT INTO docs VALUES (1, [1.0, 0.0])").unwrap();
    let store = db.vector_store("docs", "embedding").unwrap();

    db.execute(&session, "BEGIN").unwrap();
    db.execute(&session, "INSERT INTO docs VALUES (2, [0.0, 1.0])").unwrap();
    db.execute(&session, "DELETE FROM docs WHERE id = 1").unwrap();
    assert_eq!(store.hnsw.len(), 1);
    db.execute(&session, "ROLLBACK").unwrap();

    assert_eq!(store.hnsw.len(), 1, "rollback must restore the vector store to its pre-transaction state");
    assert!(store.hnsw.search(&[1.0, 0.0], 1, 16).unwrap().iter().any(|(id, _)| *id == 1));
}

#[test]
fn search_by_type_and_traverse_use_graph_metadata_over_the_same_ids() {
    let config = DbConfig::default().hnsw.config_for(2);
    let store = strataql::vector::VectorStore::new(config);

    store
        .insert(
            1,
            vec![0.0, 0.0],
            Some(NodeMetadata { node_type: "chunk".into(), content_ref: Some("doc-a".into()), timestamp: 0, attributes: Default::default() }),
        )
        .unwrap();
    store
        .insert(
            2,
            vec![0.1, 0.0],
            Some(NodeMetadata { node_type: "chunk".into(), content_ref: Some("doc-b".into()), timestamp: 0, attributes: Default::default() }),
        )
        .unwrap();
    store
        .insert(
            3,
            vec![5.0, 5.0],
            Some(NodeMetadata { node_type: "summary".into(), content_ref: Some("doc-c".into()), timestamp: 0, attributes: Default::default() }),
        )
        .unwrap();
    store.graph.write().add_edge(1, 3, "summarized_by", 1.0);

    let chunks = store.search_by_type(&[0.0, 0.0], 2, "chunk", 16).unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|(id, _)| *id == 1 || *id == 2));

    let reached = store.search_then_traverse(&[0.0, 0.0], 1, Some("summarized_by"), 1, 16).unwrap();
    assert!(reached.contains(&1));
    assert!(reached.contains(&3), "traversal should follow the edge from the nearest hit to the summary node");
}

#[test]
fn similarity_to_orders_rows_by_brute_force_distance_in_sql() {
    let db = Database::in_memory(DbConfig::default());
    let session = Session::new();
    db.execute(&session, "CREATE TABLE notes (id INT, body TEXT)").unwrap();
    db.execute(&session, "INSERT INTO notes VALUES (1, 'alpha')").unwrap();
    db.execute(&session, "INSERT INTO notes VALUES (2, 'alpha')").unwrap();
    db.execute(&session, "INSERT INTO notes VALUES (3, 'zzz totally different')").unwrap();

    let QueryResult::Select { rows, .. } = db
        .execute(&session, "SELECT id FROM notes ORDER BY SIMILARITY TO 'alpha' USING body LIMIT 2")
        .unwrap()
    else {
        panic!("expected a SELECT result");
    };
    assert_eq!(rows.len(), 2);
    let ids: Vec<i64> = rows
        .iter()
        .map(|r| match &r[0] {
            Scalar::Int(i) => *i,
            other => panic!("expected an int id, got {other:?}"),
        })
        .collect();
    assert!(ids.contains(&1) && ids.contains(&2), "the two identical bodies should be the closest matches");
}
