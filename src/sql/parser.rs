//! Recursive-descent parser producing the AST in `sql::ast`. Permissive
//! and deliberately not a full SQL grammar: it covers exactly
//! the statement and expression surface this crate's executor supports.

use crate::error::{Error, Result};
use crate::sql::ast::*;
use crate::sql::lexer::Lexer;
use crate::sql::token::{Token, TokenKind};
use crate::types::{ColumnType, Scalar};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse_statement(sql: &str) -> Result<Statement> {
    let tokens = Lexer::new(sql).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmt = parser.statement()?;
    parser.expect_end()?;
    Ok(stmt)
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(Error::ParseForm(format!(
                "expected {kind:?}, found {:?} at token {}",
                self.peek(),
                self.pos
            )))
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        self.eat(&TokenKind::Semicolon);
        if *self.peek() != TokenKind::Eof {
            return Err(Error::ParseForm(format!("unexpected trailing input at token {}", self.pos)));
        }
        Ok(())
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.bump() {
            TokenKind::Identifier(s) => Ok(s),
            other => Err(Error::ParseForm(format!("expected identifier, found {other:?}"))),
        }
    }

    fn statement(&mut self) -> Result<Statement> {
        match self.peek().clone() {
            TokenKind::Select => Ok(Statement::Select(self.select_stmt()?)),
            TokenKind::Insert => Ok(Statement::Insert(self.insert_stmt()?)),
            TokenKind::Update => Ok(Statement::Update(self.update_stmt()?)),
            TokenKind::Delete => Ok(Statement::Delete(self.delete_stmt()?)),
            TokenKind::Create => self.create_stmt(),
            TokenKind::Drop => self.drop_stmt(),
            TokenKind::Alter => Ok(Statement::AlterTableAddColumn(self.alter_stmt()?)),
            TokenKind::Begin => {
                self.bump();
                Ok(Statement::Begin)
            }
            TokenKind::Commit => {
                self.bump();
                Ok(Statement::Commit)
            }
            TokenKind::Rollback => {
                self.bump();
                Ok(Statement::Rollback)
            }
            TokenKind::Vacuum => {
                self.bump();
                let table = match self.peek().clone() {
                    TokenKind::Identifier(name) => {
                        self.bump();
                        Some(name)
                    }
                    _ => None,
                };
                Ok(Statement::Vacuum(table))
            }
            other => Err(Error::ParseForm(format!("unexpected token at statement start: {other:?}"))),
        }
    }

    // ---- DDL ----

    fn create_stmt(&mut self) -> Result<Statement> {
        self.bump(); // CREATE
        match self.peek().clone() {
            TokenKind::Table => {
                self.bump();
                let table = self.expect_ident()?;
                self.expect(TokenKind::LParen)?;
                let mut columns = Vec::new();
                loop {
                    columns.push(self.column_def()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
                Ok(Statement::CreateTable(CreateTableStmt { table, columns }))
            }
            TokenKind::Index => {
                self.bump();
                self.expect(TokenKind::On)?;
                let table = self.expect_ident()?;
                self.expect(TokenKind::LParen)?;
                let column = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Statement::CreateIndex(CreateIndexStmt { table, column }))
            }
            other => Err(Error::ParseForm(format!("expected TABLE or INDEX after CREATE, found {other:?}"))),
        }
    }

    fn drop_stmt(&mut self) -> Result<Statement> {
        self.bump(); // DROP
        match self.peek().clone() {
            TokenKind::Table => {
                self.bump();
                let table = self.expect_ident()?;
                Ok(Statement::DropTable(DropTableStmt { table }))
            }
            TokenKind::Index => {
                self.bump();
                self.expect(TokenKind::On)?;
                let table = self.expect_ident()?;
                self.expect(TokenKind::LParen)?;
                let column = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Statement::DropIndex(DropIndexStmt { table, column }))
            }
            other => Err(Error::ParseForm(format!("expected TABLE or INDEX after DROP, found {other:?}"))),
        }
    }

    fn alter_stmt(&mut self) -> Result<AlterTableAddColumnStmt> {
        self.bump(); // ALTER
        self.expect(TokenKind::Table)?;
        let table = self.expect_ident()?;
        self.expect(TokenKind::Add)?;
        self.eat(&TokenKind::Column);
        let column = self.column_def()?;
        let default = if self.eat(&TokenKind::Default) {
            Some(self.literal_scalar()?)
        } else {
            None
        };
        Ok(AlterTableAddColumnStmt { table, column, default })
    }

    fn column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_ident()?;
        let ty = self.column_type()?;
        let mut nullable = true;
        // Tolerate "NOT NULL" as a trailing modifier.
        if self.peek() == &TokenKind::Not {
            self.bump();
            self.expect(TokenKind::Null)?;
            nullable = false;
        }
        Ok(ColumnDef { name, ty, nullable })
    }

    fn column_type(&mut self) -> Result<ColumnType> {
        match self.bump() {
            TokenKind::Int => Ok(ColumnType::Int),
            TokenKind::Float => Ok(ColumnType::Float),
            TokenKind::Text => Ok(ColumnType::Text),
            TokenKind::Bool => Ok(ColumnType::Bool),
            TokenKind::Vector => {
                self.expect(TokenKind::LParen)?;
                let dim = match self.bump() {
                    TokenKind::IntNumber(n) => n as usize,
                    other => return Err(Error::ParseForm(format!("expected vector dimension, found {other:?}"))),
                };
                self.expect(TokenKind::RParen)?;
                Ok(ColumnType::Vector(dim))
            }
            other => Err(Error::ParseForm(format!("expected a column type, found {other:?}"))),
        }
    }

    fn literal_scalar(&mut self) -> Result<Scalar> {
        match self.primary_expr()? {
            Expr::Literal(s) => Ok(s),
            _ => Err(Error::ParseForm("expected a literal default value".into())),
        }
    }

    // ---- DML ----

    fn insert_stmt(&mut self) -> Result<InsertStmt> {
        self.bump(); // INSERT
        self.expect(TokenKind::Into)?;
        let table = self.expect_ident()?;
        let columns = if self.eat(&TokenKind::LParen) {
            let mut cols = Vec::new();
            loop {
                cols.push(self.expect_ident()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            Some(cols)
        } else {
            None
        };
        self.expect(TokenKind::Values)?;
        let mut rows = Vec::new();
        loop {
            self.expect(TokenKind::LParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            rows.push(row);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(InsertStmt { table, columns, rows })
    }

    fn update_stmt(&mut self) -> Result<UpdateStmt> {
        self.bump(); // UPDATE
        let table = self.expect_ident()?;
        self.expect(TokenKind::Set)?;
        let mut assignments = Vec::new();
        loop {
            let col = self.expect_ident()?;
            self.expect(TokenKind::Eq)?;
            let value = self.expr()?;
            assignments.push((col, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let filter = if self.eat(&TokenKind::Where) { Some(self.expr()?) } else { None };
        Ok(UpdateStmt { table, assignments, filter })
    }

    fn delete_stmt(&mut self) -> Result<DeleteStmt> {
        self.bump(); // DELETE
        self.expect(TokenKind::From)?;
        let table = self.expect_ident()?;
        let filter = if self.eat(&TokenKind::Where) { Some(self.expr()?) } else { None };
        Ok(DeleteStmt { table, filter })
    }

    // ---- SELECT ----

    fn select_stmt(&mut self) -> Result<SelectStmt> {
        self.bump(); // SELECT
        let mut projections = Vec::new();
        loop {
            projections.push(self.select_item()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::From)?;
        let source = self.table_ref()?;
        let filter = if self.eat(&TokenKind::Where) { Some(self.expr()?) } else { None };
        let group_by = if self.eat(&TokenKind::Group) {
            self.expect(TokenKind::By)?;
            let mut cols = Vec::new();
            loop {
                cols.push(self.expect_ident()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            Some(cols)
        } else {
            None
        };
        let having = if self.eat(&TokenKind::Having) { Some(self.expr()?) } else { None };
        let order_by = if self.eat(&TokenKind::Order) {
            self.expect(TokenKind::By)?;
            let mut items = Vec::new();
            loop {
                items.push(self.order_by_item()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            items
        } else {
            Vec::new()
        };
        let limit = if self.eat(&TokenKind::Limit) {
            match self.bump() {
                TokenKind::IntNumber(n) => Some(n as usize),
                other => return Err(Error::ParseForm(format!("expected integer after LIMIT, found {other:?}"))),
            }
        } else {
            None
        };
        Ok(SelectStmt {
            projections,
            source,
            filter,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    fn select_item(&mut self) -> Result<SelectItem> {
        if self.peek() == &TokenKind::Star {
            self.bump();
            return Ok(SelectItem::Star);
        }
        let expr = self.expr()?;
        let alias = if self.eat(&TokenKind::As) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    fn order_by_item(&mut self) -> Result<OrderByItem> {
        let expr = if self.peek() == &TokenKind::Vibes {
            self.bump();
            OrderByKey::Vibes
        } else {
            OrderByKey::Expr(self.expr()?)
        };
        let descending = if self.eat(&TokenKind::Desc) {
            true
        } else {
            self.eat(&TokenKind::Asc);
            false
        };
        Ok(OrderByItem { expr, descending })
    }

    fn table_ref(&mut self) -> Result<TableRef> {
        let mut left = self.table_primary()?;
        loop {
            let join_type = match self.peek() {
                TokenKind::Join => Some(JoinType::Inner),
                TokenKind::Inner => {
                    self.bump();
                    Some(JoinType::Inner)
                }
                TokenKind::Left => {
                    self.bump();
                    self.eat(&TokenKind::Outer);
                    Some(JoinType::Left)
                }
                TokenKind::Right => {
                    self.bump();
                    self.eat(&TokenKind::Outer);
                    Some(JoinType::Right)
                }
                _ => None,
            };
            let Some(join_type) = join_type else { break };
            self.expect(TokenKind::Join)?;
            let right = self.table_primary()?;
            self.expect(TokenKind::On)?;
            let on = self.expr()?;
            left = TableRef::Join {
                left: Box::new(left),
                right: Box::new(right),
                join_type,
                on,
            };
        }
        Ok(left)
    }

    fn table_primary(&mut self) -> Result<TableRef> {
        if self.eat(&TokenKind::LParen) {
            let query = self.select_stmt()?;
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::As)?;
            let alias = self.expect_ident()?;
            return Ok(TableRef::Subquery { query: Box::new(query), alias });
        }
        let name = self.expect_ident()?;
        let alias = if self.eat(&TokenKind::As) {
            Some(self.expect_ident()?)
        } else if let TokenKind::Identifier(_) = self.peek() {
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(TableRef::Named { name, alias })
    }

    // ---- Expressions ----
    //
    // expr := or_expr
    // or_expr := and_expr (OR and_expr)*
    // and_expr := unary (AND unary)*
    // unary := NOT unary | EXISTS '(' select ')' | predicate
    // predicate := primary [ IS [NOT] NULL | [NOT] IN '(' select ')' | cmp-op primary ]

    pub fn expr(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and_expr()?;
            left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Or, right: Box::new(right) };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.unary_expr()?;
        while self.eat(&TokenKind::And) {
            let right = self.unary_expr()?;
            left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::And, right: Box::new(right) };
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Not) {
            let inner = self.unary_expr()?;
            return Ok(match inner {
                Expr::Exists { subquery, negated } => Expr::Exists { subquery, negated: !negated },
                Expr::In { expr, subquery, negated } => Expr::In { expr, subquery, negated: !negated },
                other => Expr::Not(Box::new(other)),
            });
        }
        if self.eat(&TokenKind::Exists) {
            self.expect(TokenKind::LParen)?;
            let subquery = self.select_stmt()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::Exists { subquery: Box::new(subquery), negated: false });
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Expr> {
        let left = self.primary_expr()?;

        if self.peek() == &TokenKind::Is {
            self.bump();
            let negated = self.eat(&TokenKind::Not);
            self.expect(TokenKind::Null)?;
            return Ok(Expr::IsNull { expr: Box::new(left), negated });
        }

        let negated = if self.peek() == &TokenKind::Not {
            // Only NOT IN is valid here; other NOT usages are prefix unary.
            self.bump();
            self.expect(TokenKind::In)?;
            true
        } else if self.eat(&TokenKind::In) {
            false
        } else {
            return self.comparison_tail(left);
        };
        self.expect(TokenKind::LParen)?;
        let subquery = self.select_stmt()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::In { expr: Box::new(left), subquery: Box::new(subquery), negated })
    }

    fn comparison_tail(&mut self, left: Expr) -> Result<Expr> {
        let op = match self.peek() {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.bump();
        let right = self.primary_expr()?;
        Ok(Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) })
    }

    fn primary_expr(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            TokenKind::IntNumber(n) => {
                self.bump();
                Ok(Expr::Literal(Scalar::Int(n)))
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(Expr::Literal(Scalar::Float(n)))
            }
            TokenKind::String(s) => {
                self.bump();
                Ok(Expr::Literal(Scalar::Text(s)))
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::Literal(Scalar::Bool(true)))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::Literal(Scalar::Bool(false)))
            }
            TokenKind::Null => {
                self.bump();
                Ok(Expr::Literal(Scalar::Null))
            }
            TokenKind::LBracket => {
                self.bump();
                let mut values = Vec::new();
                if self.peek() != &TokenKind::RBracket {
                    loop {
                        values.push(self.number_literal()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Literal(Scalar::Vector(values)))
            }
            TokenKind::LParen => {
                self.bump();
                if self.peek() == &TokenKind::Select {
                    let sub = self.select_stmt()?;
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::ScalarSubquery(Box::new(sub)))
                } else {
                    let inner = self.expr()?;
                    self.expect(TokenKind::RParen)?;
                    Ok(inner)
                }
            }
            TokenKind::Count | TokenKind::Sum | TokenKind::Avg | TokenKind::Min | TokenKind::Max => {
                let func = match self.bump() {
                    TokenKind::Count => AggregateFunc::Count,
                    TokenKind::Sum => AggregateFunc::Sum,
                    TokenKind::Avg => AggregateFunc::Avg,
                    TokenKind::Min => AggregateFunc::Min,
                    TokenKind::Max => AggregateFunc::Max,
                    _ => unreachable!(),
                };
                self.expect(TokenKind::LParen)?;
                if func == AggregateFunc::Count && self.peek() == &TokenKind::Star {
                    self.bump();
                    self.expect(TokenKind::RParen)?;
                    return Ok(Expr::Aggregate { func: AggregateFunc::CountStar, arg: None });
                }
                let arg = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Aggregate { func, arg: Some(Box::new(arg)) })
            }
            TokenKind::Similarity => {
                self.bump();
                self.expect(TokenKind::To)?;
                let text = match self.bump() {
                    TokenKind::String(s) => s,
                    other => return Err(Error::ParseForm(format!("expected string after SIMILARITY TO, found {other:?}"))),
                };
                let column = if self.eat(&TokenKind::Using) {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                Ok(Expr::SimilarityTo { column, text })
            }
            TokenKind::Identifier(first) => {
                self.bump();
                if self.eat(&TokenKind::Dot) {
                    let name = self.expect_ident()?;
                    Ok(Expr::Column(ColumnRef { table: Some(first), name }))
                } else {
                    Ok(Expr::Column(ColumnRef { table: None, name: first }))
                }
            }
            other => Err(Error::ParseForm(format!("unexpected token in expression: {other:?}"))),
        }
    }

    fn number_literal(&mut self) -> Result<f32> {
        match self.bump() {
            TokenKind::Number(n) => Ok(n as f32),
            TokenKind::IntNumber(n) => Ok(n as f32),
            other => Err(Error::ParseForm(format!("expected a number in vector literal, found {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_table() {
        let stmt = parse_statement("CREATE TABLE t(id int, name text)").unwrap();
        assert!(matches!(stmt, Statement::CreateTable(_)));
    }

    #[test]
    fn parses_select_with_where_and_order() {
        let stmt = parse_statement("SELECT name FROM t WHERE id = 2 ORDER BY id").unwrap();
        match stmt {
            Statement::Select(s) => {
                assert!(s.filter.is_some());
                assert_eq!(s.order_by.len(), 1);
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_join_on() {
        let stmt = parse_statement(
            "SELECT name, total FROM users JOIN orders ON users.id = orders.user_id ORDER BY total",
        )
        .unwrap();
        match stmt {
            Statement::Select(s) => assert!(matches!(s.source, TableRef::Join { .. })),
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_vector_literal_insert() {
        let stmt = parse_statement("INSERT INTO t VALUES (1, [1.0, 2.0, 3.0])").unwrap();
        match stmt {
            Statement::Insert(i) => assert_eq!(i.rows.len(), 1),
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn parses_not_in_subquery() {
        let stmt = parse_statement("SELECT * FROM t WHERE id NOT IN (SELECT id FROM u)").unwrap();
        match stmt {
            Statement::Select(s) => assert!(matches!(s.filter, Some(Expr::In { negated: true, .. }))),
            _ => panic!("expected select"),
        }
    }
}
