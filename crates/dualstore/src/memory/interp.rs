//! Direct interpretation of condition trees over rows.
//!
//! The semantics here define the engine: the SQL renderer's output must
//! select exactly the rows this module accepts. `=` against a list means
//! IN, `!=` is the logical negation of the engine's own `=`, LIKE compiles
//! to a case-insensitive fully-anchored regex, and relational operators use
//! the shared numeric-if-both-numeric comparison from [`Value`].

use crate::condition::{CondValue, Condition, Junction, Operator};
use crate::error::{StoreError, StoreResult};
use crate::memory::store::{Row, StoreView};
use crate::refs::{SubQuery, SubQueryKind};
use crate::value::Value;
use regex::RegexBuilder;
use std::cmp::Ordering;

/// Evaluate a condition against one row, without reference sub-conditions.
pub fn evaluate(condition: &Condition, row: &Row) -> StoreResult<bool> {
    evaluate_with(condition, row, None)
}

/// Evaluate a condition against one row, resolving reference sub-conditions
/// through `view`. Hitting a sub-query without a view is fatal, never a
/// silent "no match".
pub fn evaluate_with(
    condition: &Condition,
    row: &Row,
    view: Option<&dyn StoreView>,
) -> StoreResult<bool> {
    match condition {
        Condition::Empty => Ok(true),
        Condition::Never => Ok(false),
        Condition::Leaf { key, op, value } => {
            let row_value = row.get(key).cloned().unwrap_or(Value::Null);
            eval_leaf(&row_value, *op, value, key, view)
        }
        Condition::Compound { junction, children } => match junction {
            Junction::And => {
                // Visit every child so evaluation order can never matter.
                let mut all = true;
                for child in children {
                    if !evaluate_with(child, row, view)? {
                        all = false;
                    }
                }
                Ok(all)
            }
            Junction::Or => {
                for child in children {
                    if evaluate_with(child, row, view)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        },
    }
}

fn eval_leaf(
    row_value: &Value,
    op: Operator,
    value: &CondValue,
    key: &str,
    view: Option<&dyn StoreView>,
) -> StoreResult<bool> {
    if let CondValue::SubQuery(sub) = value {
        return eval_subquery(row_value, op, sub, key, view);
    }

    match op {
        Operator::Eq => eval_equals(row_value, value),
        Operator::Ne => Ok(!eval_equals(row_value, value)?),
        Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
            let rhs = scalar_operand(value, op)?;
            if row_value.is_null() || rhs.is_null() {
                return Ok(false);
            }
            Ok(ordering_matches(op, row_value.compare(rhs)))
        }
        Operator::Like => eval_like(row_value, value),
        Operator::NotLike => Ok(!eval_like(row_value, value)?),
        Operator::In => eval_in(row_value, value),
        Operator::NotIn => Ok(!eval_in(row_value, value)?),
        Operator::Regexp => eval_regexp(row_value, value),
        Operator::NotRegexp => Ok(!eval_regexp(row_value, value)?),
    }
}

/// `=` against a list value means "equals any element": IN semantics.
/// `=` against NULL is an is-null test, mirroring the rendered `is null`.
fn eval_equals(row_value: &Value, value: &CondValue) -> StoreResult<bool> {
    match value {
        CondValue::Scalar(Value::Null) => Ok(row_value.is_null()),
        CondValue::Scalar(v) => Ok(row_value.loosely_equals(v)),
        CondValue::List(items) => Ok(items.iter().any(|v| row_value.loosely_equals(v))),
        other => Err(non_interpretable(other, Operator::Eq)),
    }
}

fn eval_in(row_value: &Value, value: &CondValue) -> StoreResult<bool> {
    match value {
        CondValue::List(items) => Ok(items.iter().any(|v| row_value.loosely_equals(v))),
        CondValue::Scalar(v) => Ok(row_value.loosely_equals(v)),
        other => Err(non_interpretable(other, Operator::In)),
    }
}

fn eval_like(row_value: &Value, value: &CondValue) -> StoreResult<bool> {
    let pattern = match value {
        CondValue::Scalar(Value::Str(s)) => s,
        other => return Err(non_interpretable(other, Operator::Like)),
    };
    if row_value.is_null() {
        return Ok(false);
    }
    let regex = like_to_regex(pattern)?;
    Ok(regex.is_match(&row_value.to_string()))
}

fn eval_regexp(row_value: &Value, value: &CondValue) -> StoreResult<bool> {
    let pattern = match value {
        CondValue::Scalar(Value::Str(s)) => s,
        other => return Err(non_interpretable(other, Operator::Regexp)),
    };
    if row_value.is_null() {
        return Ok(false);
    }
    let regex = regex::Regex::new(pattern)
        .map_err(|e| StoreError::Condition(format!("malformed pattern '{pattern}': {e}")))?;
    Ok(regex.is_match(&row_value.to_string()))
}

fn eval_subquery(
    row_value: &Value,
    op: Operator,
    sub: &SubQuery,
    key: &str,
    view: Option<&dyn StoreView>,
) -> StoreResult<bool> {
    let view = view.ok_or_else(|| StoreError::NoStoreView(key.to_string()))?;
    let child_rows = view
        .table_rows(&sub.table)
        .ok_or_else(|| StoreError::NotFound(format!("table '{}'", sub.table)))?;

    match &sub.kind {
        SubQueryKind::IdSet => {
            let mut matched = false;
            for child in child_rows {
                let passes = match &sub.condition {
                    Some(cond) => evaluate_with(cond, child, Some(view))?,
                    None => true,
                };
                if passes {
                    let linked = child.get(&sub.column).cloned().unwrap_or(Value::Null);
                    if row_value.loosely_equals(&linked) {
                        matched = true;
                    }
                }
            }
            match op {
                Operator::In | Operator::Eq => Ok(matched),
                Operator::NotIn | Operator::Ne => Ok(!matched),
                other => Err(StoreError::Condition(format!(
                    "operator '{}' cannot test sub-query membership",
                    other.as_sql()
                ))),
            }
        }
        SubQueryKind::Count { compare_to } => {
            let mut count = 0i64;
            for child in child_rows {
                let linked = child.get(&sub.column).cloned().unwrap_or(Value::Null);
                if !row_value.loosely_equals(&linked) {
                    continue;
                }
                let passes = match &sub.condition {
                    Some(cond) => evaluate_with(cond, child, Some(view))?,
                    None => true,
                };
                if passes {
                    count += 1;
                }
            }
            let count = Value::Int(count);
            match op {
                Operator::Eq => Ok(count.loosely_equals(compare_to)),
                Operator::Ne => Ok(!count.loosely_equals(compare_to)),
                Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
                    Ok(ordering_matches(op, count.compare(compare_to)))
                }
                other => Err(StoreError::Condition(format!(
                    "operator '{}' cannot compare a count",
                    other.as_sql()
                ))),
            }
        }
    }
}

fn scalar_operand<'a>(value: &'a CondValue, op: Operator) -> StoreResult<&'a Value> {
    match value {
        CondValue::Scalar(v) => Ok(v),
        other => Err(non_interpretable(other, op)),
    }
}

fn ordering_matches(op: Operator, ord: Ordering) -> bool {
    match op {
        Operator::Lt => ord == Ordering::Less,
        Operator::Gt => ord == Ordering::Greater,
        Operator::Le => ord != Ordering::Greater,
        Operator::Ge => ord != Ordering::Less,
        _ => false,
    }
}

fn non_interpretable(value: &CondValue, op: Operator) -> StoreError {
    let kind = match value {
        CondValue::Scalar(_) => "scalar",
        CondValue::List(_) => "list",
        CondValue::Expr(_) => "sql expression",
        CondValue::SubQuery(_) => "sub-query",
    };
    StoreError::Condition(format!(
        "operator '{}' cannot be interpreted against a {kind} value",
        op.as_sql()
    ))
}

/// Compile a `%`/`_` wildcard pattern into a case-insensitive, fully
/// anchored regular expression. Everything else in the pattern is literal.
fn like_to_regex(pattern: &str) -> StoreResult<regex::Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    RegexBuilder::new(&out)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| StoreError::Condition(format!("malformed pattern '{pattern}': {e}")))
}
