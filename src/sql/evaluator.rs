//! Scalar expression evaluation against a [`Tuple`].
//!
//! Sub-queries create a circular dependency between expression evaluation
//! and the executor (evaluating a WHERE clause may need to run a SELECT).
//! Rather than threading function pointers through, the evaluator calls
//! back into a `SubqueryRunner` capability the executor implements.

use crate::error::{Error, Result};
use crate::sql::ast::{BinaryOp, Expr};
use crate::sql::tuple::Tuple;
use crate::types::Scalar;

pub trait SubqueryRunner {
    /// Execute `stmt` and return its result tuples. Implementations decide
    /// caching: an uncorrelated subquery's result may be reused across
    /// rows, a correlated one must be re-run per row.
    fn run(&self, stmt: &crate::sql::ast::SelectStmt) -> Result<Vec<Tuple>>;
}

/// A deterministic placeholder text-to-vector embedding: no real embedding
/// model is available to the core, so a fixed hash-based
/// mapping fills the declared dimension. Two calls with the same text and
/// dimension always produce the same vector.
pub fn placeholder_embed(text: &str, dim: usize) -> Vec<f32> {
    use std::hash::{Hash, Hasher};
    let mut out = Vec::with_capacity(dim);
    let mut seed = {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut h);
        h.finish()
    };
    for _ in 0..dim {
        // xorshift64*, cheap and deterministic.
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let unit = (seed >> 11) as f64 / ((1u64 << 53) as f64);
        out.push((unit * 2.0 - 1.0) as f32);
    }
    out
}

pub fn eval(expr: &Expr, tuple: &Tuple, runner: &dyn SubqueryRunner) -> Result<Scalar> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Column(c) => tuple.resolve(c.table.as_deref(), &c.name).cloned(),
        Expr::Not(inner) => Ok(Scalar::Bool(!to_bool(&eval(inner, tuple, runner)?)?)),
        Expr::IsNull { expr, negated } => {
            let is_null = eval(expr, tuple, runner)?.is_null();
            Ok(Scalar::Bool(is_null != *negated))
        }
        Expr::BinaryOp { left, op, right } => eval_binary(left, *op, right, tuple, runner),
        Expr::In { expr, subquery, negated } => {
            let value = eval(expr, tuple, runner)?;
            let rows = runner.run(subquery)?;
            let mut is_member = false;
            for row in &rows {
                if let Some((_, v)) = row.iter().next() {
                    if *v == value {
                        is_member = true;
                        break;
                    }
                }
            }
            Ok(Scalar::Bool(is_member != *negated))
        }
        Expr::Exists { subquery, negated } => {
            let rows = runner.run(subquery)?;
            Ok(Scalar::Bool(!rows.is_empty() != *negated))
        }
        Expr::ScalarSubquery(subquery) => {
            let rows = runner.run(subquery)?;
            match rows.len() {
                0 => Ok(Scalar::Null),
                1 => rows[0]
                    .iter()
                    .next()
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| Error::Validation("scalar subquery returned no columns".into())),
                _ => Err(Error::Validation("scalar subquery returned more than one row".into())),
            }
        }
        Expr::Aggregate { func, arg } => tuple.resolve(None, &func.canonical(arg)).cloned(),
        Expr::SimilarityTo { column, text } => {
            let column = column
                .as_deref()
                .ok_or_else(|| Error::Validation("SIMILARITY TO requires an explicit column".into()))?;
            let vector = tuple.resolve(None, column)?;
            let Scalar::Vector(row_vec) = vector else {
                return Err(Error::Schema(format!("column '{column}' is not a vector column")));
            };
            let query = placeholder_embed(text, row_vec.len());
            Ok(Scalar::Float(crate::vector::distance::cosine_distance(&query, row_vec) as f64))
        }
    }
}

fn eval_binary(left: &Expr, op: BinaryOp, right: &Expr, tuple: &Tuple, runner: &dyn SubqueryRunner) -> Result<Scalar> {
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let l = to_bool(&eval(left, tuple, runner)?)?;
        return match op {
            BinaryOp::And => {
                if !l {
                    return Ok(Scalar::Bool(false));
                }
                Ok(Scalar::Bool(to_bool(&eval(right, tuple, runner)?)?))
            }
            BinaryOp::Or => {
                if l {
                    return Ok(Scalar::Bool(true));
                }
                Ok(Scalar::Bool(to_bool(&eval(right, tuple, runner)?)?))
            }
            _ => unreachable!(),
        };
    }
    let l = eval(left, tuple, runner)?;
    let r = eval(right, tuple, runner)?;
    let result = match op {
        BinaryOp::Eq => l == r,
        BinaryOp::Ne => !(l == r),
        BinaryOp::Lt => l.cmp_total(&r) == std::cmp::Ordering::Less,
        BinaryOp::Gt => l.cmp_total(&r) == std::cmp::Ordering::Greater,
        BinaryOp::Le => l.cmp_total(&r) != std::cmp::Ordering::Greater,
        BinaryOp::Ge => l.cmp_total(&r) != std::cmp::Ordering::Less,
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    };
    Ok(Scalar::Bool(result))
}

pub fn to_bool(value: &Scalar) -> Result<bool> {
    match value {
        Scalar::Bool(b) => Ok(*b),
        Scalar::Null => Ok(false),
        other => Err(Error::Validation(format!("expected boolean expression, found {}", other.type_name()))),
    }
}

/// Does `expr` reference any aggregate function? Used to reject aggregates
/// in WHERE and to detect whether a SELECT
/// needs the grouping/aggregation stage at all.
pub fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Aggregate { .. } => true,
        Expr::Not(e) | Expr::IsNull { expr: e, .. } => contains_aggregate(e),
        Expr::BinaryOp { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
        Expr::In { expr, .. } => contains_aggregate(expr),
        Expr::SimilarityTo { .. } | Expr::Exists { .. } | Expr::ScalarSubquery(_) | Expr::Literal(_) | Expr::Column(_) => false,
    }
}
