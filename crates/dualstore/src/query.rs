//! Query nodes: expression templates specialized with clause buckets.
//!
//! A [`Query`] carries named buckets (table, fields, joins, where, group,
//! having, order, limit) and one active [`QueryMode`]; buckets unrelated to
//! the active mode are ignored at render time. Rendering flows through the
//! same [`RenderContext`] as plain expressions, so a query can be spliced
//! into another query or expression without parameter collisions.

use crate::error::{StoreError, StoreResult};
use crate::expr::{Expr, RenderContext, Statement};
use crate::platform::Platform;
use crate::value::Value;
use std::fmt::Write as _;

/// The statement shape a query renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
}

/// Sort direction for order-bucket entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    fn as_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }
}

/// One entry of the field bucket.
#[derive(Debug, Clone)]
enum FieldItem {
    Name(String),
    Expr { expr: Expr, alias: Option<String> },
}

/// Join kind. Only the two shapes both backends can mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone)]
struct Join {
    kind: JoinKind,
    table: String,
    on: Expr,
}

/// A renderable SQL statement description.
#[derive(Debug, Clone, Default)]
pub struct Query {
    mode: QueryMode,
    table: Option<String>,
    fields: Vec<FieldItem>,
    set_values: Vec<(String, Value)>,
    joins: Vec<Join>,
    where_: Vec<Expr>,
    having: Vec<Expr>,
    group: Vec<String>,
    order: Vec<(String, SortDir)>,
    limit: Option<(u64, u64)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add a field by name (soft-escaped at render time).
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldItem::Name(name.into()));
        self
    }

    /// Add a computed field.
    pub fn field_expr(mut self, expr: Expr, alias: Option<String>) -> Self {
        self.fields.push(FieldItem::Expr { expr, alias });
        self
    }

    /// Set a column value for insert/update.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_values.push((column.into(), value.into()));
        self
    }

    pub fn join(mut self, kind: JoinKind, table: impl Into<String>, on: Expr) -> Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            on,
        });
        self
    }

    /// Attach one rendered condition fragment to the where bucket.
    /// Fragments are joined with `and`.
    pub fn where_expr(mut self, expr: Expr) -> Self {
        self.where_.push(expr);
        self
    }

    /// Attach one fragment to the having bucket.
    pub fn having_expr(mut self, expr: Expr) -> Self {
        self.having.push(expr);
        self
    }

    pub fn group(mut self, field: impl Into<String>) -> Self {
        self.group.push(field.into());
        self
    }

    pub fn order(mut self, field: impl Into<String>, dir: SortDir) -> Self {
        self.order.push((field.into(), dir));
        self
    }

    /// Row window: (count, offset).
    pub fn limit(mut self, count: u64, offset: u64) -> Self {
        self.limit = Some((count, offset));
        self
    }

    pub fn active_mode(&self) -> QueryMode {
        self.mode
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Render to a complete statement with a fresh context.
    pub fn render(&self, platform: Platform) -> StoreResult<Statement> {
        let mut ctx = RenderContext::new();
        let sql = self.render_into(platform, &mut ctx)?;
        Ok(Statement {
            sql,
            params: ctx.into_params(),
        })
    }

    /// Render into a shared context (for sub-query embedding).
    pub fn render_into(&self, platform: Platform, ctx: &mut RenderContext) -> StoreResult<String> {
        match self.mode {
            QueryMode::Select => self.render_select(platform, ctx),
            QueryMode::Insert => self.render_insert(platform, ctx),
            QueryMode::Update => self.render_update(platform, ctx),
            QueryMode::Delete => self.render_delete(platform, ctx),
            QueryMode::Truncate => self.render_truncate(platform),
        }
    }

    fn table_ref(&self, platform: Platform) -> StoreResult<String> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| StoreError::validation("query has no table"))?;
        Ok(platform.escape_identifier(table))
    }

    fn render_fields(&self, platform: Platform, ctx: &mut RenderContext) -> StoreResult<String> {
        if self.fields.is_empty() {
            return Ok("*".to_string());
        }
        let mut parts = Vec::with_capacity(self.fields.len());
        for item in &self.fields {
            match item {
                FieldItem::Name(name) => parts.push(platform.escape_soft(name)),
                FieldItem::Expr { expr, alias } => {
                    let mut sql = expr.render_into(platform, ctx)?;
                    if expr.wants_parens() {
                        sql = format!("({sql})");
                    }
                    if let Some(alias) = alias {
                        let _ = write!(sql, " {}", platform.escape_identifier(alias));
                    }
                    parts.push(sql);
                }
            }
        }
        Ok(parts.join(", "))
    }

    fn render_where_bucket(
        bucket: &[Expr],
        keyword: &str,
        platform: Platform,
        ctx: &mut RenderContext,
        out: &mut String,
    ) -> StoreResult<()> {
        if bucket.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::with_capacity(bucket.len());
        for expr in bucket {
            parts.push(expr.render_into(platform, ctx)?);
        }
        let _ = write!(out, " {keyword} {}", parts.join(" and "));
        Ok(())
    }

    fn render_select(&self, platform: Platform, ctx: &mut RenderContext) -> StoreResult<String> {
        let mut out = String::from("select ");
        out.push_str(&self.render_fields(platform, ctx)?);
        let _ = write!(out, " from {}", self.table_ref(platform)?);

        for join in &self.joins {
            let kind = match join.kind {
                JoinKind::Inner => "join",
                JoinKind::Left => "left join",
            };
            let on = join.on.render_into(platform, ctx)?;
            let _ = write!(
                out,
                " {kind} {} on {on}",
                platform.escape_identifier(&join.table)
            );
        }

        Self::render_where_bucket(&self.where_, "where", platform, ctx, &mut out)?;

        if !self.group.is_empty() {
            let parts: Vec<String> = self.group.iter().map(|g| platform.escape_soft(g)).collect();
            let _ = write!(out, " group by {}", parts.join(", "));
        }

        Self::render_where_bucket(&self.having, "having", platform, ctx, &mut out)?;

        if !self.order.is_empty() {
            let parts: Vec<String> = self
                .order
                .iter()
                .map(|(f, d)| format!("{} {}", platform.escape_soft(f), d.as_sql()))
                .collect();
            let _ = write!(out, " order by {}", parts.join(", "));
        } else if platform == Platform::MsSql && self.limit.is_some() {
            // OFFSET/FETCH is only legal after an ORDER BY.
            out.push_str(" order by (select null)");
        }

        if let Some((count, offset)) = self.limit {
            match platform {
                Platform::MsSql => {
                    let _ = write!(out, " offset {offset} rows fetch next {count} rows only");
                }
                _ => {
                    let _ = write!(out, " limit {count}");
                    if offset > 0 {
                        let _ = write!(out, " offset {offset}");
                    }
                }
            }
        }

        Ok(out)
    }

    fn render_insert(&self, platform: Platform, ctx: &mut RenderContext) -> StoreResult<String> {
        if self.set_values.is_empty() {
            return Err(StoreError::validation("insert has no values to set"));
        }
        let mut cols = Vec::with_capacity(self.set_values.len());
        let mut binds = Vec::with_capacity(self.set_values.len());
        for (column, value) in &self.set_values {
            cols.push(platform.escape_identifier(column));
            let placeholder = Expr::new("[]").push(value.clone()).render_into(platform, ctx)?;
            binds.push(placeholder);
        }
        Ok(format!(
            "insert into {} ({}) values ({})",
            self.table_ref(platform)?,
            cols.join(", "),
            binds.join(", ")
        ))
    }

    fn render_update(&self, platform: Platform, ctx: &mut RenderContext) -> StoreResult<String> {
        if self.set_values.is_empty() {
            return Err(StoreError::validation("update has no values to set"));
        }
        let mut out = format!("update {} set ", self.table_ref(platform)?);
        for (i, (column, value)) in self.set_values.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let placeholder = Expr::new("[]").push(value.clone()).render_into(platform, ctx)?;
            let _ = write!(out, "{} = {placeholder}", platform.escape_identifier(column));
        }
        Self::render_where_bucket(&self.where_, "where", platform, ctx, &mut out)?;
        Ok(out)
    }

    fn render_delete(&self, platform: Platform, ctx: &mut RenderContext) -> StoreResult<String> {
        let mut out = format!("delete from {}", self.table_ref(platform)?);
        Self::render_where_bucket(&self.where_, "where", platform, ctx, &mut out)?;
        Ok(out)
    }

    fn render_truncate(&self, platform: Platform) -> StoreResult<String> {
        // SQLite has no TRUNCATE statement.
        match platform {
            Platform::Sqlite => Ok(format!("delete from {}", self.table_ref(platform)?)),
            _ => Ok(format!("truncate table {}", self.table_ref(platform)?)),
        }
    }
}
