//! AST node kinds the executor contracts against. This crate
//! owns both ends of the contract — parser and executor — since an
//! external parser is out of scope and only interface-compatible with
//! what's defined here.

use crate::types::{ColumnType, Scalar};

#[derive(Debug, Clone)]
pub enum Statement {
    CreateTable(CreateTableStmt),
    DropTable(DropTableStmt),
    AlterTableAddColumn(AlterTableAddColumnStmt),
    CreateIndex(CreateIndexStmt),
    DropIndex(DropIndexStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Select(SelectStmt),
    Begin,
    Commit,
    Rollback,
    Vacuum(Option<String>),
}

#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct DropTableStmt {
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct AlterTableAddColumnStmt {
    pub table: String,
    pub column: ColumnDef,
    pub default: Option<Scalar>,
}

#[derive(Debug, Clone)]
pub struct CreateIndexStmt {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone)]
pub struct DropIndexStmt {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone)]
pub struct InsertStmt {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct DeleteStmt {
    pub table: String,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct SelectStmt {
    pub projections: Vec<SelectItem>,
    pub source: TableRef,
    pub filter: Option<Expr>,
    pub group_by: Option<Vec<String>>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum SelectItem {
    Star,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone)]
pub enum TableRef {
    Named {
        name: String,
        alias: Option<String>,
    },
    Join {
        left: Box<TableRef>,
        right: Box<TableRef>,
        join_type: JoinType,
        on: Expr,
    },
    Subquery {
        query: Box<SelectStmt>,
        alias: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub expr: OrderByKey,
    pub descending: bool,
}

/// Most ORDER BY keys are plain expressions, but `VIBES` is a keyword, not
/// an expression — it has no column reference and its ordering is a
/// permutation rather than a comparison.
#[derive(Debug, Clone)]
pub enum OrderByKey {
    Expr(Expr),
    Vibes,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Scalar),
    Column(ColumnRef),
    Not(Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    In {
        expr: Box<Expr>,
        subquery: Box<SelectStmt>,
        negated: bool,
    },
    Exists {
        subquery: Box<SelectStmt>,
        negated: bool,
    },
    ScalarSubquery(Box<SelectStmt>),
    /// `COUNT(*)`, `COUNT(col)`, `SUM`/`AVG`/`MIN`/`MAX(col)`.
    Aggregate { func: AggregateFunc, arg: Option<Box<Expr>> },
    /// `SIMILARITY TO '<text>'` (optionally against a named vector
    /// column — required when a table has more than one vector column,
    /// since there would otherwise be no way to tell which one to search).
    SimilarityTo { column: Option<String>, text: String },
}

#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    /// Canonical printed form HAVING references to match against
    /// that a HAVING clause can reference.
    pub fn canonical(&self, arg: &Option<Box<Expr>>) -> String {
        match self {
            AggregateFunc::CountStar => "COUNT(*)".to_string(),
            AggregateFunc::Count => format!("COUNT({})", render_arg(arg)),
            AggregateFunc::Sum => format!("SUM({})", render_arg(arg)),
            AggregateFunc::Avg => format!("AVG({})", render_arg(arg)),
            AggregateFunc::Min => format!("MIN({})", render_arg(arg)),
            AggregateFunc::Max => format!("MAX({})", render_arg(arg)),
        }
    }
}

fn render_arg(arg: &Option<Box<Expr>>) -> String {
    match arg.as_deref() {
        Some(Expr::Column(c)) => match &c.table {
            Some(t) => format!("{t}.{}", c.name),
            None => c.name.clone(),
        },
        _ => "?".to_string(),
    }
}
