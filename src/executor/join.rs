//! Join strategies shared by the SELECT pipeline: a hash join for equi-joins
//! over hashable keys, and a nested-loop fallback for everything else
//! (non-equi predicates, or keys that don't hash cleanly — floats and
//! vectors, whose `Scalar` equality is not hash-consistent).
//!
//! Splits each join into a `HashKey` the build side indexes on and a probe
//! phase per join type, generalized to arbitrary tuple sources rather than
//! a fixed two-table shape.

use crate::error::Result;
use crate::sql::ast::{BinaryOp, ColumnRef, Expr, JoinType};
use crate::sql::evaluator::{eval, to_bool, SubqueryRunner};
use crate::sql::tuple::Tuple;
use crate::types::Scalar;
use std::collections::HashMap;

/// A join key restricted to tags with a hash consistent with `Scalar`'s
/// `PartialEq` (int/float cross-promotion makes `Scalar`'s own `Hash`
/// unsafe to use directly as a join key — see `HashKey::from_scalar`).
#[derive(Clone, PartialEq, Eq, Hash)]
enum HashKey {
    Int(i64),
    Text(String),
    Bool(bool),
}

impl HashKey {
    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Int(i) => Some(HashKey::Int(*i)),
            Scalar::Text(s) => Some(HashKey::Text(s.clone())),
            Scalar::Bool(b) => Some(HashKey::Bool(*b)),
            Scalar::Float(_) | Scalar::Vector(_) | Scalar::Null => None,
        }
    }
}

fn key_value(tuple: &Tuple, column: &ColumnRef) -> Option<Scalar> {
    tuple.resolve(column.table.as_deref(), &column.name).ok().cloned()
}

/// If `on` is a single `left.col = right.col` equality between two plain
/// column references, return the two sides. Multi-key (AND-combined) equi
/// joins and non-equality predicates fall back to the nested-loop path.
pub(crate) fn extract_equi_join_columns(on: &Expr) -> Option<(ColumnRef, ColumnRef)> {
    if let Expr::BinaryOp { left, op: BinaryOp::Eq, right } = on {
        if let (Expr::Column(l), Expr::Column(r)) = (left.as_ref(), right.as_ref()) {
            return Some((l.clone(), r.clone()));
        }
    }
    None
}

fn columns_of(rows: &[Tuple]) -> Vec<String> {
    rows.first()
        .map(|t| t.iter().map(|(k, _)| k.clone()).collect())
        .unwrap_or_default()
}

fn null_fill(tuple: &Tuple, columns: &[String]) -> Tuple {
    let mut out = tuple.clone();
    for col in columns {
        out.insert(col.clone(), Scalar::Null);
    }
    out
}

fn build_table(rows: &[Tuple], key: &ColumnRef) -> HashMap<HashKey, Vec<Tuple>> {
    let mut table: HashMap<HashKey, Vec<Tuple>> = HashMap::new();
    for row in rows {
        if let Some(k) = key_value(row, key).and_then(|v| HashKey::from_scalar(&v)) {
            table.entry(k).or_default().push(row.clone());
        }
    }
    table
}

fn hash_inner(left: Vec<Tuple>, right: Vec<Tuple>, left_key: &ColumnRef, right_key: &ColumnRef) -> Vec<Tuple> {
    let (build_rows, probe_rows, build_key, probe_key, build_is_left) = if left.len() <= right.len() {
        (&left, &right, left_key, right_key, true)
    } else {
        (&right, &left, right_key, left_key, false)
    };
    let table = build_table(build_rows, build_key);
    let mut out = Vec::new();
    for probe in probe_rows {
        let Some(k) = key_value(probe, probe_key).and_then(|v| HashKey::from_scalar(&v)) else {
            continue;
        };
        if let Some(matches) = table.get(&k) {
            for m in matches {
                out.push(if build_is_left { Tuple::merge(m, probe) } else { Tuple::merge(probe, m) });
            }
        }
    }
    out
}

/// Build from `other`, preserve every row of `preserved` (emitting a
/// null-filled row for `preserved` entries with no match). Used directly
/// for LEFT JOIN and, with sides swapped, for RIGHT JOIN.
fn hash_left(preserved: Vec<Tuple>, other: Vec<Tuple>, preserved_key: &ColumnRef, other_key: &ColumnRef, other_columns: &[String]) -> Vec<Tuple> {
    let table = build_table(&other, other_key);
    let mut out = Vec::new();
    for p in &preserved {
        match key_value(p, preserved_key).and_then(|v| HashKey::from_scalar(&v)) {
            Some(k) => match table.get(&k) {
                Some(matches) => {
                    for m in matches {
                        out.push(Tuple::merge(p, m));
                    }
                }
                None => out.push(null_fill(p, other_columns)),
            },
            None => out.push(null_fill(p, other_columns)),
        }
    }
    out
}

fn nested_inner(left: &[Tuple], right: &[Tuple], on: &Expr, runner: &dyn SubqueryRunner) -> Result<Vec<Tuple>> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            let merged = Tuple::merge(l, r);
            if to_bool(&eval(on, &merged, runner)?)? {
                out.push(merged);
            }
        }
    }
    Ok(out)
}

fn nested_left(preserved: &[Tuple], other: &[Tuple], on: &Expr, other_columns: &[String], runner: &dyn SubqueryRunner) -> Result<Vec<Tuple>> {
    let mut out = Vec::new();
    for p in preserved {
        let mut any = false;
        for o in other {
            let merged = Tuple::merge(p, o);
            if to_bool(&eval(on, &merged, runner)?)? {
                out.push(merged);
                any = true;
            }
        }
        if !any {
            out.push(null_fill(p, other_columns));
        }
    }
    Ok(out)
}

/// Join `left` and `right` under `join_type` on predicate `on`. Picks a
/// hash join when `on` is a plain equi-join over hashable columns and the
/// combined row count reaches `threshold`; falls back to nested loop
/// otherwise (this also covers RIGHT JOIN's hash path, realized as a LEFT
/// JOIN with sides swapped — `Tuple` keys are fully qualified so merge
/// order never affects correctness, only the arbitrary internal column
/// iteration order before projection reorders it anyway).
pub fn join(
    left: Vec<Tuple>,
    right: Vec<Tuple>,
    join_type: JoinType,
    on: &Expr,
    threshold: usize,
    runner: &dyn SubqueryRunner,
) -> Result<Vec<Tuple>> {
    let equi = extract_equi_join_columns(on);
    let use_hash = equi.is_some() && left.len() + right.len() >= threshold;
    let right_columns = columns_of(&right);
    let left_columns = columns_of(&left);

    match join_type {
        JoinType::Inner => {
            if use_hash {
                let (lk, rk) = equi.unwrap();
                Ok(hash_inner(left, right, &lk, &rk))
            } else {
                nested_inner(&left, &right, on, runner)
            }
        }
        JoinType::Left => {
            if use_hash {
                let (lk, rk) = equi.unwrap();
                Ok(hash_left(left, right, &lk, &rk, &right_columns))
            } else {
                nested_left(&left, &right, on, &right_columns, runner)
            }
        }
        JoinType::Right => {
            if use_hash {
                let (lk, rk) = equi.unwrap();
                Ok(hash_left(right, left, &rk, &lk, &left_columns))
            } else {
                nested_left(&right, &left, on, &left_columns, runner)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(qualifier: &str, id: i64, extra: Option<(&str, Scalar)>) -> Tuple {
        let mut values = vec![("id".to_string(), Scalar::Int(id))];
        if let Some((name, v)) = extra {
            values.push((name.to_string(), v));
        }
        Tuple::from_row(qualifier, values)
    }

    fn col(table: &str, name: &str) -> ColumnRef {
        ColumnRef { table: Some(table.to_string()), name: name.to_string() }
    }

    struct NoSubqueries;
    impl SubqueryRunner for NoSubqueries {
        fn run(&self, _stmt: &crate::sql::ast::SelectStmt) -> Result<Vec<Tuple>> {
            Ok(Vec::new())
        }
    }

    fn eq_on(left_table: &str, right_table: &str) -> Expr {
        Expr::BinaryOp {
            left: Box::new(Expr::Column(col(left_table, "id"))),
            op: BinaryOp::Eq,
            right: Box::new(Expr::Column(col(right_table, "id"))),
        }
    }

    #[test]
    fn hash_inner_join_matches_equal_keys() {
        let left = vec![tuple("u", 1, None), tuple("u", 2, None)];
        let right = vec![tuple("o", 1, Some(("total", Scalar::Int(50))))];
        let on = eq_on("u", "o");
        let out = join(left, right, JoinType::Inner, &on, 0, &NoSubqueries).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].resolve(Some("o"), "total").unwrap(), &Scalar::Int(50));
    }

    #[test]
    fn left_join_null_fills_unmatched_rows() {
        let left = vec![tuple("u", 1, None), tuple("u", 2, None)];
        let right = vec![tuple("o", 1, Some(("total", Scalar::Int(50))))];
        let on = eq_on("u", "o");
        let out = join(left, right, JoinType::Left, &on, 0, &NoSubqueries).unwrap();
        assert_eq!(out.len(), 2);
        let unmatched = out.iter().find(|t| t.resolve(Some("u"), "id").unwrap() == &Scalar::Int(2)).unwrap();
        assert!(unmatched.resolve(Some("o"), "total").unwrap().is_null());
    }

    #[test]
    fn nested_loop_handles_non_equi_predicate() {
        let left = vec![tuple("a", 1, None), tuple("a", 3, None)];
        let right = vec![tuple("b", 2, None)];
        let on = Expr::BinaryOp {
            left: Box::new(Expr::Column(col("a", "id"))),
            op: BinaryOp::Gt,
            right: Box::new(Expr::Column(col("b", "id"))),
        };
        let out = join(left, right, JoinType::Inner, &on, 0, &NoSubqueries).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].resolve(Some("a"), "id").unwrap(), &Scalar::Int(3));
    }
}
