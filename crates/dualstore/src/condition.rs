//! Boolean condition trees: the single source of truth for WHERE.
//!
//! A [`Condition`] is pure data, independent of rendering: the SQL renderer
//! and the in-memory interpreter both consume the same tree and must agree
//! on every row.

use crate::error::{StoreError, StoreResult};
use crate::expr::Expr;
use crate::refs::SubQuery;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Filter operator for a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    NotLike,
    In,
    NotIn,
    Regexp,
    NotRegexp,
}

impl Operator {
    /// Parse the SQL spelling of an operator. Unknown spellings fail loudly;
    /// a filter that silently matched nothing would be worse.
    pub fn parse(s: &str) -> StoreResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "=" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            "REGEXP" => Ok(Operator::Regexp),
            "NOT REGEXP" => Ok(Operator::NotRegexp),
            other => Err(StoreError::Condition(format!("unknown operator '{other}'"))),
        }
    }

    /// SQL spelling.
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Like => "like",
            Operator::NotLike => "not like",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Regexp => "regexp",
            Operator::NotRegexp => "not regexp",
        }
    }

    /// The fixed opposite-operator table used by negation.
    pub fn negated(self) -> Self {
        match self {
            Operator::Eq => Operator::Ne,
            Operator::Ne => Operator::Eq,
            Operator::Lt => Operator::Ge,
            Operator::Ge => Operator::Lt,
            Operator::Gt => Operator::Le,
            Operator::Le => Operator::Gt,
            Operator::Like => Operator::NotLike,
            Operator::NotLike => Operator::Like,
            Operator::In => Operator::NotIn,
            Operator::NotIn => Operator::In,
            Operator::Regexp => Operator::NotRegexp,
            Operator::NotRegexp => Operator::Regexp,
        }
    }
}

/// The value side of a leaf condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CondValue {
    Scalar(Value),
    List(Vec<Value>),
    /// A sub-expression, rendered inline by the SQL backend.
    Expr(Box<Expr>),
    /// A backend-neutral sub-query produced by the reference-path rewrite.
    SubQuery(Box<SubQuery>),
}

impl<T: Into<Value>> From<T> for CondValue {
    fn from(v: T) -> Self {
        CondValue::Scalar(v.into())
    }
}

/// The boolean operator joining a compound's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Junction {
    And,
    Or,
}

impl Junction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Junction::And => "and",
            Junction::Or => "or",
        }
    }

    fn swapped(self) -> Self {
        match self {
            Junction::And => Junction::Or,
            Junction::Or => Junction::And,
        }
    }
}

/// A boolean filter: leaf predicate or AND/OR aggregate. Pure data: it can
/// be serialized, logged, and consumed by either backend unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    /// No condition at all; contributes nothing to either backend.
    Empty,
    /// The always-false marker.
    Never,
    Leaf {
        key: String,
        op: Operator,
        value: CondValue,
    },
    Compound {
        junction: Junction,
        children: Vec<Condition>,
    },
}

impl Condition {
    /// Full three-argument constructor.
    pub fn new(key: impl Into<String>, op: Operator, value: impl Into<CondValue>) -> Self {
        Condition::Leaf {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    /// Three-argument constructor with the operator given as its SQL spelling.
    pub fn parse(
        key: impl Into<String>,
        op: &str,
        value: impl Into<CondValue>,
    ) -> StoreResult<Self> {
        Ok(Condition::new(key, Operator::parse(op)?, value))
    }

    /// Two-argument form: operator defaults to `=`.
    pub fn eq(key: impl Into<String>, value: impl Into<CondValue>) -> Self {
        Condition::new(key, Operator::Eq, value)
    }

    /// AND aggregate.
    pub fn and(children: Vec<Condition>) -> Self {
        Condition::Compound {
            junction: Junction::And,
            children,
        }
    }

    /// OR aggregate.
    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Compound {
            junction: Junction::Or,
            children,
        }
    }

    /// AND-list with an inline OR-group appended as one child.
    ///
    /// This preserves the "OR group inside an AND list" construction as an
    /// explicit, typed constructor.
    pub fn and_grouped(mut and_children: Vec<Condition>, or_group: Vec<Condition>) -> Self {
        and_children.push(Condition::or(or_group));
        Condition::and(and_children)
    }

    /// True if this tree contributes nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Condition::Empty)
    }

    /// Recursively unwrap single-child compounds and drop no-op children.
    ///
    /// - `Empty` children contribute nothing and are dropped from both
    ///   junctions.
    /// - A `Never` child collapses an AND to `Never`; an OR drops it (and
    ///   collapses to `Never` only when nothing else remains).
    /// - A compound left with exactly one child becomes that child, at any
    ///   nesting depth.
    pub fn simplify(self) -> Self {
        match self {
            Condition::Compound { junction, children } => {
                let mut simplified = Vec::with_capacity(children.len());
                let mut saw_never = false;
                for child in children {
                    match child.simplify() {
                        Condition::Empty => {}
                        Condition::Never => {
                            if junction == Junction::And {
                                return Condition::Never;
                            }
                            saw_never = true;
                        }
                        other => simplified.push(other),
                    }
                }
                match simplified.len() {
                    0 if saw_never => Condition::Never,
                    0 => Condition::Empty,
                    1 => simplified.pop().unwrap_or(Condition::Empty),
                    _ => Condition::Compound {
                        junction,
                        children: simplified,
                    },
                }
            }
            other => other,
        }
    }

    /// Logical negation.
    ///
    /// Compounds swap junction and negate every child (De Morgan); leaves map
    /// through the fixed opposite-operator table; `Empty` and `Never` swap.
    pub fn negate(self) -> Self {
        match self {
            Condition::Empty => Condition::Never,
            Condition::Never => Condition::Empty,
            Condition::Leaf { key, op, value } => Condition::Leaf {
                key,
                op: op.negated(),
                value,
            },
            Condition::Compound { junction, children } => Condition::Compound {
                junction: junction.swapped(),
                children: children.into_iter().map(Condition::negate).collect(),
            },
        }
    }
}

/// Literal booleans collapse: `true` is "no condition", `false` is the
/// always-false marker.
impl From<bool> for Condition {
    fn from(b: bool) -> Self {
        if b { Condition::Empty } else { Condition::Never }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(key: &str, op: Operator, v: i64) -> Condition {
        Condition::new(key, op, Value::Int(v))
    }

    #[test]
    fn operator_parse_round_trips() {
        for op in [
            "=", "!=", "<", ">", "<=", ">=", "LIKE", "NOT LIKE", "IN", "NOT IN", "REGEXP",
            "NOT REGEXP",
        ] {
            Operator::parse(op).unwrap();
        }
        assert!(Operator::parse("SOUNDS LIKE").is_err());
    }

    #[test]
    fn negation_table_is_an_involution() {
        use Operator::*;
        for op in [Eq, Ne, Lt, Gt, Le, Ge, Like, NotLike, In, NotIn, Regexp, NotRegexp] {
            assert_eq!(op.negated().negated(), op);
        }
        assert_eq!(Eq.negated(), Ne);
        assert_eq!(Lt.negated(), Ge);
        assert_eq!(Gt.negated(), Le);
    }

    #[test]
    fn negate_leaf_flips_operator() {
        let c = Condition::new("x", Operator::Eq, Value::Int(5)).negate();
        match c {
            Condition::Leaf { key, op, .. } => {
                assert_eq!(key, "x");
                assert_eq!(op, Operator::Ne);
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn negate_compound_applies_de_morgan() {
        let c = Condition::and(vec![
            leaf("a", Operator::Eq, 1),
            leaf("b", Operator::Gt, 2),
        ])
        .negate();
        match c {
            Condition::Compound { junction, children } => {
                assert_eq!(junction, Junction::Or);
                assert!(matches!(
                    children[0],
                    Condition::Leaf { op: Operator::Ne, .. }
                ));
                assert!(matches!(
                    children[1],
                    Condition::Leaf { op: Operator::Le, .. }
                ));
            }
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn simplify_unwraps_single_children_recursively() {
        let inner = leaf("a", Operator::Eq, 1);
        let nested = Condition::and(vec![Condition::or(vec![Condition::and(vec![
            inner.clone(),
        ])])]);
        match nested.simplify() {
            Condition::Leaf { key, .. } => assert_eq!(key, "a"),
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn simplify_collapses_never_in_and() {
        let c = Condition::and(vec![leaf("a", Operator::Eq, 1), Condition::Never]);
        assert!(matches!(c.simplify(), Condition::Never));
    }

    #[test]
    fn simplify_drops_never_in_or_with_siblings() {
        let c = Condition::or(vec![Condition::Never, leaf("a", Operator::Eq, 1)]);
        assert!(matches!(c.simplify(), Condition::Leaf { .. }));
        let all_never = Condition::or(vec![Condition::Never, Condition::Never]);
        assert!(matches!(all_never.simplify(), Condition::Never));
    }

    #[test]
    fn empty_contributes_nothing() {
        let c = Condition::and(vec![Condition::Empty, Condition::Empty]);
        assert!(matches!(c.simplify(), Condition::Empty));
        assert!(matches!(Condition::from(true), Condition::Empty));
        assert!(matches!(Condition::from(false), Condition::Never));
    }

    #[test]
    fn and_grouped_preserves_the_inline_or_group() {
        let c = Condition::and_grouped(
            vec![Condition::eq("status", "active")],
            vec![Condition::eq("role", "admin"), Condition::eq("role", "owner")],
        );
        match c {
            Condition::Compound { junction, children } => {
                assert_eq!(junction, Junction::And);
                assert_eq!(children.len(), 2);
                assert!(matches!(
                    &children[1],
                    Condition::Compound { junction: Junction::Or, children } if children.len() == 2
                ));
            }
            other => panic!("expected compound, got {other:?}"),
        }
    }
}
