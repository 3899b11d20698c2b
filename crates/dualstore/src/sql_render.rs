//! Rendering condition trees to parameterized SQL.
//!
//! The tree is simplified first, then folded bottom-up into one WHERE
//! fragment per top-level call. Every scalar becomes a bound parameter
//! through the shared [`RenderContext`]; identifiers go through the
//! platform's escaping. The output must accept exactly the rows the
//! in-memory interpreter accepts.

use crate::condition::{CondValue, Condition, Operator};
use crate::error::{StoreError, StoreResult};
use crate::expr::{Expr, ExprArg, RenderContext, Statement};
use crate::platform::Platform;
use crate::query::Query;
use crate::refs::{SubQuery, SubQueryKind};
use crate::value::Value;
use std::fmt::Write as _;

/// Render a condition as a WHERE fragment. `table` names the table the
/// condition filters; correlated sub-queries qualify against it. Returns
/// `None` when the simplified tree is `Empty`.
pub fn render_condition(
    condition: &Condition,
    table: &str,
    platform: Platform,
    ctx: &mut RenderContext,
) -> StoreResult<Option<String>> {
    match condition.clone().simplify() {
        Condition::Empty => Ok(None),
        simplified => render_node(&simplified, table, platform, ctx).map(Some),
    }
}

/// Render a condition as a standalone fragment statement.
pub fn render(condition: &Condition, table: &str, platform: Platform) -> StoreResult<Option<Statement>> {
    let mut ctx = RenderContext::new();
    Ok(render_condition(condition, table, platform, &mut ctx)?.map(|sql| Statement {
        sql,
        params: ctx.into_params(),
    }))
}

/// Fold a condition into the query's where bucket, binding its parameters
/// through `ctx`. The same context must carry through to the query render.
pub fn filter_query(
    query: Query,
    condition: &Condition,
    platform: Platform,
    ctx: &mut RenderContext,
) -> StoreResult<Query> {
    let table = query.table_name().unwrap_or_default().to_string();
    match render_condition(condition, &table, platform, ctx)? {
        Some(fragment) => Ok(query.where_expr(Expr::new("[w]").arg("w", ExprArg::Raw(fragment)))),
        None => Ok(query),
    }
}

/// Fold a condition into the query's having bucket.
pub fn filter_query_having(
    query: Query,
    condition: &Condition,
    platform: Platform,
    ctx: &mut RenderContext,
) -> StoreResult<Query> {
    let table = query.table_name().unwrap_or_default().to_string();
    match render_condition(condition, &table, platform, ctx)? {
        Some(fragment) => Ok(query.having_expr(Expr::new("[h]").arg("h", ExprArg::Raw(fragment)))),
        None => Ok(query),
    }
}

/// Render a query with a condition folded into its where bucket, sharing
/// one parameter namespace.
pub fn render_query(
    query: &Query,
    condition: &Condition,
    platform: Platform,
) -> StoreResult<Statement> {
    let mut ctx = RenderContext::new();
    let filtered = filter_query(query.clone(), condition, platform, &mut ctx)?;
    let sql = filtered.render_into(platform, &mut ctx)?;
    Ok(Statement {
        sql,
        params: ctx.into_params(),
    })
}

/// `select * from <table>` filtered by the condition.
pub fn select_where(
    table: &str,
    condition: &Condition,
    platform: Platform,
) -> StoreResult<Statement> {
    let mut ctx = RenderContext::new();
    let mut sql = format!("select * from {}", platform.escape_identifier(table));
    if let Some(fragment) = render_condition(condition, table, platform, &mut ctx)? {
        let _ = write!(sql, " where {fragment}");
    }
    Ok(Statement {
        sql,
        params: ctx.into_params(),
    })
}

/// `delete from <table>` filtered by the condition.
pub fn delete_where(
    table: &str,
    condition: &Condition,
    platform: Platform,
) -> StoreResult<Statement> {
    let mut ctx = RenderContext::new();
    let mut sql = format!("delete from {}", platform.escape_identifier(table));
    if let Some(fragment) = render_condition(condition, table, platform, &mut ctx)? {
        let _ = write!(sql, " where {fragment}");
    }
    Ok(Statement {
        sql,
        params: ctx.into_params(),
    })
}

/// `select count(*) from <table>` filtered by the condition.
pub fn count_where(
    table: &str,
    condition: &Condition,
    platform: Platform,
) -> StoreResult<Statement> {
    let mut ctx = RenderContext::new();
    let mut sql = format!("select count(*) from {}", platform.escape_identifier(table));
    if let Some(fragment) = render_condition(condition, table, platform, &mut ctx)? {
        let _ = write!(sql, " where {fragment}");
    }
    Ok(Statement {
        sql,
        params: ctx.into_params(),
    })
}

fn render_node(
    condition: &Condition,
    table: &str,
    platform: Platform,
    ctx: &mut RenderContext,
) -> StoreResult<String> {
    match condition {
        // simplify removed Empty except at top level.
        Condition::Empty => Ok("1 = 1".to_string()),
        Condition::Never => Ok("1 = 0".to_string()),
        Condition::Leaf { key, op, value } => render_leaf(key, *op, value, table, platform, ctx),
        Condition::Compound { junction, children } => {
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                let rendered = render_node(child, table, platform, ctx)?;
                if matches!(child, Condition::Compound { .. }) {
                    parts.push(format!("({rendered})"));
                } else {
                    parts.push(rendered);
                }
            }
            Ok(parts.join(&format!(" {} ", junction.as_sql())))
        }
    }
}

fn render_leaf(
    key: &str,
    op: Operator,
    value: &CondValue,
    table: &str,
    platform: Platform,
    ctx: &mut RenderContext,
) -> StoreResult<String> {
    let column = platform.escape_soft(key);
    match value {
        CondValue::Scalar(v) => render_scalar(&column, op, v, platform, ctx),
        CondValue::List(items) => render_list(&column, op, items, platform, ctx),
        CondValue::Expr(expr) => {
            let mut inner = expr.render_into(platform, ctx)?;
            if expr.wants_parens() {
                inner = format!("({inner})");
            }
            Ok(format!("{column} {} {inner}", op.as_sql()))
        }
        CondValue::SubQuery(sub) => render_subquery(key, &column, op, sub, table, platform, ctx),
    }
}

fn render_scalar(
    column: &str,
    op: Operator,
    value: &Value,
    platform: Platform,
    ctx: &mut RenderContext,
) -> StoreResult<String> {
    match op {
        Operator::In | Operator::NotIn => {
            // A scalar on an IN is a one-element list.
            let placeholder = ctx.bind(platform, value.clone())?;
            let base = format!("{column} {} ({placeholder})", op.as_sql());
            Ok(null_safe(column, base, op))
        }
        Operator::Eq if value.is_null() => Ok(format!("{column} is null")),
        Operator::Ne if value.is_null() => Ok(format!("{column} is not null")),
        _ => {
            let placeholder = ctx.bind(platform, value.clone())?;
            let base = if platform.has_lax_numeric_coercion()
                && value.looks_numeric()
                && comparison_op(op)
            {
                // Stored text must still compare numerically when the bound
                // value is a number, matching the interpreter's rule. A cast
                // expression carries numeric affinity, so the round-trip
                // check is true exactly for numeric-looking cells. The
                // placeholder appears twice but stays one parameter.
                format!(
                    "case when typeof({column}) in ('integer', 'real') \
                     or cast({column} as numeric) = {column} \
                     then cast({column} as numeric) {o} cast({p} as numeric) \
                     else {column} {o} {p} end",
                    o = op.as_sql(),
                    p = placeholder,
                )
            } else {
                format!("{column} {} {placeholder}", op.as_sql())
            };
            Ok(null_safe(column, base, op))
        }
    }
}

/// Negated operators accept NULL rows in the interpreter (`!=` is the
/// negation of `=`). Plain SQL comparisons yield NULL instead, so negated
/// forms get an explicit is-null escape hatch.
fn null_safe(column: &str, base: String, op: Operator) -> String {
    match op {
        Operator::Ne | Operator::NotLike | Operator::NotIn | Operator::NotRegexp => {
            format!("({base} or {column} is null)")
        }
        _ => base,
    }
}

fn comparison_op(op: Operator) -> bool {
    matches!(
        op,
        Operator::Eq | Operator::Ne | Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge
    )
}

fn render_list(
    column: &str,
    op: Operator,
    items: &[Value],
    platform: Platform,
    ctx: &mut RenderContext,
) -> StoreResult<String> {
    // `=` against a list means IN, `!=` means NOT IN.
    let op = match op {
        Operator::Eq => Operator::In,
        Operator::Ne => Operator::NotIn,
        Operator::In | Operator::NotIn => op,
        other => {
            return Err(StoreError::Condition(format!(
                "operator '{}' cannot take a list value",
                other.as_sql()
            )));
        }
    };
    if items.is_empty() {
        // IN () is not valid SQL; an empty set matches nothing.
        return Ok(match op {
            Operator::In => "1 = 0".to_string(),
            _ => "1 = 1".to_string(),
        });
    }
    let mut placeholders = Vec::with_capacity(items.len());
    for item in items {
        placeholders.push(ctx.bind(platform, item.clone())?);
    }
    let base = format!("{column} {} ({})", op.as_sql(), placeholders.join(", "));
    Ok(null_safe(column, base, op))
}

fn render_subquery(
    key: &str,
    column: &str,
    op: Operator,
    sub: &SubQuery,
    table: &str,
    platform: Platform,
    ctx: &mut RenderContext,
) -> StoreResult<String> {
    let child_table = platform.escape_identifier(&sub.table);
    let child_column = platform.escape_identifier(&sub.column);

    match &sub.kind {
        SubQueryKind::IdSet => {
            let op = match op {
                Operator::Eq | Operator::In => Operator::In,
                Operator::Ne | Operator::NotIn => Operator::NotIn,
                other => {
                    return Err(StoreError::Condition(format!(
                        "operator '{}' cannot test sub-query membership",
                        other.as_sql()
                    )));
                }
            };
            let mut inner = format!("select {child_column} from {child_table}");
            if let Some(cond) = &sub.condition {
                if let Some(fragment) = render_condition(cond, &sub.table, platform, ctx)? {
                    let _ = write!(inner, " where {fragment}");
                }
            }
            let base = format!("{column} {} ({inner})", op.as_sql());
            Ok(null_safe(column, base, op))
        }
        SubQueryKind::Count { compare_to } => {
            if !comparison_op(op) {
                return Err(StoreError::Condition(format!(
                    "operator '{}' cannot compare a count",
                    op.as_sql()
                )));
            }
            let outer = format!(
                "{}.{}",
                platform.escape_identifier(table),
                platform.escape_identifier(key)
            );
            let mut inner = format!(
                "select count(*) from {child_table} where {child_table}.{child_column} = {outer}"
            );
            if let Some(cond) = &sub.condition {
                if let Some(fragment) = render_condition(cond, &sub.table, platform, ctx)? {
                    let _ = write!(inner, " and {fragment}");
                }
            }
            let placeholder = ctx.bind(platform, compare_to.clone())?;
            Ok(format!("({inner}) {} {placeholder}", op.as_sql()))
        }
    }
}
