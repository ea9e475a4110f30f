//! The SELECT pipeline: source resolution (including joins and subqueries),
//! filtering, grouping/aggregation, `HAVING`, `ORDER BY` (including
//! `VIBES` and `SIMILARITY TO`), and `LIMIT`.
//!
//! Generalizes a fixed two-table join pipeline to arbitrary `TableRef`
//! trees and threads it through the row store's snapshot-isolated reads
//! instead of a single current-state table scan.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::executor::join;
use crate::executor::QueryResult;
use crate::sql::ast::{AggregateFunc, BinaryOp, Expr, JoinType, OrderByItem, OrderByKey, SelectItem, SelectStmt, TableRef};
use crate::sql::evaluator::{contains_aggregate, eval, to_bool, SubqueryRunner};
use crate::sql::tuple::Tuple;
use crate::storage::Table;
use crate::txn::Transaction;
use crate::types::{RowId, Scalar, TableSchema};

pub(crate) fn execute_select(db: &Database, tx: &Arc<Transaction>, stmt: &SelectStmt) -> Result<QueryResult> {
    let projected = run_select_tuples(db, tx, stmt, None)?;
    let columns = output_columns(stmt, projected.first());
    let rows = projected
        .iter()
        .map(|t| columns.iter().map(|c| t.resolve(None, c).cloned().unwrap_or(Scalar::Null)).collect())
        .collect();
    Ok(QueryResult::Select { columns, rows })
}

pub(crate) fn explain(db: &Database, tx: &Arc<Transaction>, stmt: &SelectStmt) -> Result<QueryResult> {
    let threshold = db.config().hash_join_threshold;
    let plan = explain_source(db, tx, &stmt.source, threshold)?;
    Ok(QueryResult::Message(plan))
}

/// Run one SELECT to its final, projected output tuples (flat-keyed by
/// output column name). `outer` is `Some` when this is a correlated
/// subquery's re-run for one outer row; it is merged into every source row
/// before the filter runs so the inner WHERE/HAVING can resolve the outer
/// row's columns.
pub(crate) fn run_select_tuples(db: &Database, tx: &Arc<Transaction>, stmt: &SelectStmt, outer: Option<&Tuple>) -> Result<Vec<Tuple>> {
    let threshold = db.config().hash_join_threshold;
    let mut rows = resolve_source(db, tx, &stmt.source, threshold, stmt.filter.as_ref())?;

    if let Some(outer_tuple) = outer {
        rows = rows.into_iter().map(|r| Tuple::merge(outer_tuple, &r)).collect();
    }

    let runner = ExecRunner::new(db, tx, outer);

    if let Some(filter) = &stmt.filter {
        if contains_aggregate(filter) {
            return Err(Error::Validation("aggregate functions are not allowed in WHERE".into()));
        }
        rows = filter_rows(rows, filter, &runner)?;
    }

    let needs_aggregation =
        stmt.group_by.is_some() || stmt.projections.iter().any(|i| matches!(i, SelectItem::Expr { expr, .. } if contains_aggregate(expr)));

    let mut staged = if needs_aggregation { aggregate(stmt, rows, &runner)? } else { rows };

    if let Some(having) = &stmt.having {
        staged = filter_rows(staged, having, &runner)?;
    }

    let mut pairs: Vec<(Tuple, Tuple)> = staged
        .into_iter()
        .map(|pre| {
            let proj = project(&stmt.projections, &pre, &runner)?;
            Ok((pre, proj))
        })
        .collect::<Result<Vec<_>>>()?;

    order_by(&mut pairs, &stmt.order_by, &runner)?;

    if let Some(limit) = stmt.limit {
        pairs.truncate(limit);
    }

    Ok(pairs.into_iter().map(|(_, proj)| proj).collect())
}

fn filter_rows(rows: Vec<Tuple>, predicate: &Expr, runner: &dyn SubqueryRunner) -> Result<Vec<Tuple>> {
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        if to_bool(&eval(predicate, &row, runner)?)? {
            kept.push(row);
        }
    }
    Ok(kept)
}

/// Resolve one `FROM`-clause source to its tuples. `filter_hint` is the
/// statement's whole WHERE clause; only a plain top-level `col = literal`
/// conjunct against an indexed column of a directly-named table is used,
/// to narrow the scan via a B-tree point lookup — nested
/// joins and subqueries always full-scan their own inputs.
fn resolve_source(db: &Database, tx: &Arc<Transaction>, source: &TableRef, threshold: usize, filter_hint: Option<&Expr>) -> Result<Vec<Tuple>> {
    match source {
        TableRef::Named { name, alias } => {
            let table = db.table(name).ok_or_else(|| Error::NotFound(format!("table '{name}'")))?;
            let qualifier = alias.clone().unwrap_or_else(|| name.clone());
            let versions = match filter_hint.and_then(|f| try_point_lookup(&table, f)) {
                Some(ids) => ids
                    .into_iter()
                    .filter_map(|id| table.visible_version(id, &tx.snapshot, db.clog()))
                    .collect::<Vec<_>>(),
                None => table.scan_visible(&tx.snapshot, db.clog()),
            };
            Ok(versions.into_iter().map(|v| row_tuple(&qualifier, &table.schema, &v.values)).collect())
        }
        TableRef::Join { left, right, join_type, on } => {
            let l = resolve_source(db, tx, left, threshold, None)?;
            let r = resolve_source(db, tx, right, threshold, None)?;
            let runner = ExecRunner::new(db, tx, None);
            join::join(l, r, *join_type, on, threshold, &runner)
        }
        TableRef::Subquery { query, alias } => {
            let rows = run_select_tuples(db, tx, query, None)?;
            Ok(rows.into_iter().map(|t| requalify(t, alias)).collect())
        }
    }
}

fn explain_source(db: &Database, tx: &Arc<Transaction>, source: &TableRef, threshold: usize) -> Result<String> {
    match source {
        TableRef::Named { name, alias } => {
            let table = db.table(name).ok_or_else(|| Error::NotFound(format!("table '{name}'")))?;
            let label = alias.as_ref().map(|a| format!("{name} AS {a}")).unwrap_or_else(|| name.clone());
            Ok(format!("scan {label} (~{} rows)", table.row_count()))
        }
        TableRef::Join { left, right, join_type, on } => {
            let l = resolve_source(db, tx, left, threshold, None)?;
            let r = resolve_source(db, tx, right, threshold, None)?;
            let strategy = if join::extract_equi_join_columns(on).is_some() && l.len() + r.len() >= threshold {
                "hash join"
            } else {
                "nested loop"
            };
            let join_kind = match join_type {
                JoinType::Inner => "INNER",
                JoinType::Left => "LEFT",
                JoinType::Right => "RIGHT",
            };
            let left_plan = explain_source(db, tx, left, threshold)?;
            let right_plan = explain_source(db, tx, right, threshold)?;
            Ok(format!(
                "{join_kind} {strategy}: ({left_plan}) x ({right_plan}) over {} + {} rows",
                l.len(),
                r.len()
            ))
        }
        TableRef::Subquery { query, alias } => {
            let rows = run_select_tuples(db, tx, query, None)?;
            Ok(format!("materialize subquery {alias} (~{} rows)", rows.len()))
        }
    }
}

/// If `expr` is (or conjunctively contains) a plain `col = literal` over a
/// column `table` has a B-tree index on, return the matching row ids.
pub(crate) fn try_point_lookup(table: &Table, expr: &Expr) -> Option<Vec<RowId>> {
    match expr {
        Expr::BinaryOp { left, op: BinaryOp::Eq, right } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(c), Expr::Literal(v)) | (Expr::Literal(v), Expr::Column(c)) => {
                if table.has_index(&c.name) {
                    table.index_point_lookup(&c.name, v)
                } else {
                    None
                }
            }
            _ => None,
        },
        Expr::BinaryOp { left, op: BinaryOp::And, right } => try_point_lookup(table, left).or_else(|| try_point_lookup(table, right)),
        _ => None,
    }
}

pub(crate) fn row_tuple(qualifier: &str, schema: &TableSchema, values: &crate::types::RowValues) -> Tuple {
    Tuple::from_row(
        qualifier,
        schema.columns.iter().map(|c| (c.name.clone(), values.get(&c.name).cloned().unwrap_or(Scalar::Null))),
    )
}

fn requalify(tuple: Tuple, alias: &str) -> Tuple {
    let mut out = Tuple::new();
    for (k, v) in tuple.iter() {
        out.insert(format!("{alias}.{k}"), v.clone());
    }
    out
}

/// A projection's output column name: the explicit alias, or a display
/// form derived from the expression (matching the `?column?` convention
/// SQL engines fall back to for unnamed computed columns).
fn display_name(expr: &Expr) -> String {
    match expr {
        Expr::Column(c) => c.name.clone(),
        Expr::Aggregate { func, arg } => func.canonical(arg),
        Expr::SimilarityTo { .. } => "similarity".to_string(),
        _ => "?column?".to_string(),
    }
}

fn project(items: &[SelectItem], tuple: &Tuple, runner: &dyn SubqueryRunner) -> Result<Tuple> {
    let mut out = Tuple::new();
    for item in items {
        match item {
            SelectItem::Star => {
                for name in tuple.unqualified_names() {
                    let v = tuple.resolve(None, &name)?;
                    out.insert(name, v.clone());
                }
            }
            SelectItem::Expr { expr, alias } => {
                let name = alias.clone().unwrap_or_else(|| display_name(expr));
                out.insert(name, eval(expr, tuple, runner)?);
            }
        }
    }
    Ok(out)
}

fn output_columns(stmt: &SelectStmt, sample: Option<&Tuple>) -> Vec<String> {
    let mut cols = Vec::new();
    for item in &stmt.projections {
        match item {
            SelectItem::Star => {
                if let Some(t) = sample {
                    for name in t.unqualified_names() {
                        if !cols.contains(&name) {
                            cols.push(name);
                        }
                    }
                }
            }
            SelectItem::Expr { expr, alias } => cols.push(alias.clone().unwrap_or_else(|| display_name(expr))),
        }
    }
    cols
}

fn order_by(pairs: &mut Vec<(Tuple, Tuple)>, order: &[OrderByItem], runner: &dyn SubqueryRunner) -> Result<()> {
    if order.is_empty() {
        return Ok(());
    }
    if order.iter().any(|o| matches!(o.expr, OrderByKey::Vibes)) {
        pairs.shuffle(&mut rand::thread_rng());
        return Ok(());
    }

    let mut keyed = Vec::with_capacity(pairs.len());
    for (pre, proj) in pairs.drain(..) {
        let merged = Tuple::merge(&pre, &proj);
        let mut keys = Vec::with_capacity(order.len());
        for item in order {
            let OrderByKey::Expr(e) = &item.expr else { unreachable!("VIBES handled above") };
            keys.push(eval(e, &merged, runner)?);
        }
        keyed.push((keys, pre, proj));
    }
    keyed.sort_by(|a, b| {
        for (i, item) in order.iter().enumerate() {
            let ord = a.0[i].cmp_total(&b.0[i]);
            let ord = if item.descending { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    *pairs = keyed.into_iter().map(|(_, pre, proj)| (pre, proj)).collect();
    Ok(())
}

/// Per-group running state for one aggregate expression.
struct Accumulator {
    func: AggregateFunc,
    arg: Option<Box<Expr>>,
    canonical: String,
    count: i64,
    sum: f64,
    sum_is_float: bool,
    min: Option<Scalar>,
    max: Option<Scalar>,
}

impl Accumulator {
    fn new(func: AggregateFunc, arg: Option<Box<Expr>>) -> Self {
        let canonical = func.canonical(&arg);
        Self { func, arg, canonical, count: 0, sum: 0.0, sum_is_float: false, min: None, max: None }
    }

    fn update(&mut self, tuple: &Tuple, runner: &dyn SubqueryRunner) -> Result<()> {
        match self.func {
            AggregateFunc::CountStar => self.count += 1,
            AggregateFunc::Count => {
                let v = eval(self.arg.as_deref().expect("COUNT(col) always carries an arg"), tuple, runner)?;
                if !v.is_null() {
                    self.count += 1;
                }
            }
            AggregateFunc::Sum | AggregateFunc::Avg => {
                let v = eval(self.arg.as_deref().expect("SUM/AVG always carry an arg"), tuple, runner)?;
                match v {
                    Scalar::Null => {}
                    Scalar::Int(i) => {
                        self.sum += i as f64;
                        self.count += 1;
                    }
                    Scalar::Float(f) => {
                        self.sum += f;
                        self.sum_is_float = true;
                        self.count += 1;
                    }
                    other => return Err(Error::Validation(format!("cannot aggregate non-numeric value '{}'", other.type_name()))),
                }
            }
            AggregateFunc::Min => {
                let v = eval(self.arg.as_deref().expect("MIN always carries an arg"), tuple, runner)?;
                if !v.is_null() {
                    if self.min.as_ref().map(|cur| v.cmp_total(cur) == std::cmp::Ordering::Less).unwrap_or(true) {
                        self.min = Some(v);
                    }
                }
            }
            AggregateFunc::Max => {
                let v = eval(self.arg.as_deref().expect("MAX always carries an arg"), tuple, runner)?;
                if !v.is_null() {
                    if self.max.as_ref().map(|cur| v.cmp_total(cur) == std::cmp::Ordering::Greater).unwrap_or(true) {
                        self.max = Some(v);
                    }
                }
            }
        }
        Ok(())
    }

    fn finalize(self) -> Scalar {
        match self.func {
            AggregateFunc::CountStar | AggregateFunc::Count => Scalar::Int(self.count),
            AggregateFunc::Sum => {
                if self.count == 0 {
                    Scalar::Null
                } else if self.sum_is_float {
                    Scalar::Float(self.sum)
                } else {
                    Scalar::Int(self.sum as i64)
                }
            }
            AggregateFunc::Avg => {
                if self.count == 0 {
                    Scalar::Null
                } else {
                    Scalar::Float(self.sum / self.count as f64)
                }
            }
            AggregateFunc::Min => self.min.unwrap_or(Scalar::Null),
            AggregateFunc::Max => self.max.unwrap_or(Scalar::Null),
        }
    }
}

fn collect_aggregates(expr: &Expr, out: &mut Vec<(AggregateFunc, Option<Box<Expr>>)>) {
    if let Expr::Aggregate { func, arg } = expr {
        let canon = func.canonical(arg);
        if !out.iter().any(|(f, a)| f.canonical(a) == canon) {
            out.push((*func, arg.clone()));
        }
        return;
    }
    match expr {
        Expr::Not(e) | Expr::IsNull { expr: e, .. } => collect_aggregates(e, out),
        Expr::BinaryOp { left, right, .. } => {
            collect_aggregates(left, out);
            collect_aggregates(right, out);
        }
        Expr::In { expr, .. } => collect_aggregates(expr, out),
        Expr::Aggregate { .. } | Expr::Exists { .. } | Expr::ScalarSubquery(_) | Expr::SimilarityTo { .. } | Expr::Literal(_) | Expr::Column(_) => {}
    }
}

/// Encode a grouping key's values so that two rows with the same grouping
/// values (including `NULL`, which SQL groups together even though it
/// never compares equal) land in the same bucket.
fn group_key_bytes(tuple: &Tuple, group_cols: &[String]) -> Result<Vec<u8>> {
    let mut key = Vec::new();
    for col in group_cols {
        let v = tuple.resolve(None, col)?;
        match v {
            Scalar::Int(i) => {
                key.push(0);
                key.extend_from_slice(&i.to_le_bytes());
            }
            Scalar::Float(f) => {
                key.push(1);
                key.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Scalar::Text(s) => {
                key.push(2);
                key.extend_from_slice(s.as_bytes());
                key.push(0);
            }
            Scalar::Bool(b) => {
                key.push(3);
                key.push(*b as u8);
            }
            Scalar::Vector(v) => {
                key.push(4);
                for x in v {
                    key.extend_from_slice(&x.to_bits().to_le_bytes());
                }
            }
            Scalar::Null => key.push(5),
        }
    }
    Ok(key)
}

fn aggregate(stmt: &SelectStmt, rows: Vec<Tuple>, runner: &dyn SubqueryRunner) -> Result<Vec<Tuple>> {
    let group_cols = stmt.group_by.clone().unwrap_or_default();

    for item in &stmt.projections {
        if let SelectItem::Expr { expr: Expr::Column(c), .. } = item {
            if !group_cols.iter().any(|g| g == &c.name) {
                return Err(Error::Validation(format!(
                    "column '{}' must appear in GROUP BY or be used inside an aggregate function",
                    c.name
                )));
            }
        }
    }

    let mut specs: Vec<(AggregateFunc, Option<Box<Expr>>)> = Vec::new();
    for item in &stmt.projections {
        if let SelectItem::Expr { expr, .. } = item {
            collect_aggregates(expr, &mut specs);
        }
    }
    if let Some(h) = &stmt.having {
        collect_aggregates(h, &mut specs);
    }
    for o in &stmt.order_by {
        if let OrderByKey::Expr(e) = &o.expr {
            collect_aggregates(e, &mut specs);
        }
    }

    if rows.is_empty() && group_cols.is_empty() {
        let mut tuple = Tuple::new();
        for (func, arg) in &specs {
            let acc = Accumulator::new(*func, arg.clone());
            tuple.insert(acc.canonical.clone(), acc.finalize());
        }
        return Ok(vec![tuple]);
    }

    let mut order: Vec<Vec<u8>> = Vec::new();
    let mut groups: HashMap<Vec<u8>, (Tuple, Vec<Accumulator>)> = HashMap::new();

    for row in rows {
        let key = group_key_bytes(&row, &group_cols)?;
        if !groups.contains_key(&key) {
            let mut base = Tuple::new();
            for col in &group_cols {
                base.insert(col.clone(), row.resolve(None, col)?.clone());
            }
            let accs = specs.iter().map(|(f, a)| Accumulator::new(*f, a.clone())).collect();
            groups.insert(key.clone(), (base, accs));
            order.push(key.clone());
        }
        let (_, accs) = groups.get_mut(&key).expect("just inserted");
        for acc in accs.iter_mut() {
            acc.update(&row, runner)?;
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let (mut base, accs) = groups.remove(&key).expect("tracked in `order`");
        for acc in accs {
            base.insert(acc.canonical.clone(), acc.finalize());
        }
        out.push(base);
    }
    Ok(out)
}

/// Bridges expression evaluation (which needs to run sub-`SELECT`s) back
/// into this module. An uncorrelated subquery's result is cached per
/// top-level statement (keyed by the subquery AST node's address, stable
/// for the lifetime of one `run_select_tuples` call); a correlated one is
/// re-run against the current outer row every time.
pub(crate) struct ExecRunner<'a> {
    db: &'a Database,
    tx: &'a Arc<Transaction>,
    outer: Option<&'a Tuple>,
    cache: RefCell<HashMap<usize, Vec<Tuple>>>,
}

impl<'a> ExecRunner<'a> {
    pub(crate) fn new(db: &'a Database, tx: &'a Arc<Transaction>, outer: Option<&'a Tuple>) -> Self {
        Self { db, tx, outer, cache: RefCell::new(HashMap::new()) }
    }
}

impl<'a> SubqueryRunner for ExecRunner<'a> {
    fn run(&self, stmt: &SelectStmt) -> Result<Vec<Tuple>> {
        if self.outer.is_some() && is_correlated(stmt) {
            return run_select_tuples(self.db, self.tx, stmt, self.outer);
        }
        let key = stmt as *const SelectStmt as usize;
        if let Some(cached) = self.cache.borrow().get(&key) {
            return Ok(cached.clone());
        }
        let rows = run_select_tuples(self.db, self.tx, stmt, None)?;
        self.cache.borrow_mut().insert(key, rows.clone());
        Ok(rows)
    }
}

fn is_correlated(stmt: &SelectStmt) -> bool {
    let own = source_aliases(&stmt.source);
    stmt.filter.as_ref().map(|e| references_outside(e, &own)).unwrap_or(false)
        || stmt.having.as_ref().map(|e| references_outside(e, &own)).unwrap_or(false)
}

fn source_aliases(source: &TableRef) -> Vec<String> {
    match source {
        TableRef::Named { name, alias } => vec![alias.clone().unwrap_or_else(|| name.clone())],
        TableRef::Join { left, right, .. } => {
            let mut v = source_aliases(left);
            v.extend(source_aliases(right));
            v
        }
        TableRef::Subquery { alias, .. } => vec![alias.clone()],
    }
}

fn references_outside(expr: &Expr, own: &[String]) -> bool {
    match expr {
        Expr::Column(c) => c.table.as_ref().map(|t| !own.iter().any(|o| o == t)).unwrap_or(false),
        Expr::Not(e) | Expr::IsNull { expr: e, .. } => references_outside(e, own),
        Expr::BinaryOp { left, right, .. } => references_outside(left, own) || references_outside(right, own),
        Expr::In { expr, .. } => references_outside(expr, own),
        Expr::Aggregate { arg, .. } => arg.as_deref().map(|a| references_outside(a, own)).unwrap_or(false),
        Expr::Exists { .. } | Expr::ScalarSubquery(_) | Expr::SimilarityTo { .. } | Expr::Literal(_) => false,
    }
}
