//! Reference-path sugar: conditions that reach through named relations.
//!
//! A leaf key containing `/` means "follow the named relation(s), then test
//! a field — or test relation existence via the reserved trailing tokens
//! `#` (count), `~` (any exist), `!` (none exist)". [`expand`] rewrites such
//! leaves exactly once into plain leaves over [`SubQuery`] data; the SQL
//! renderer and the in-memory engine only ever see the rewritten form.

use crate::condition::{CondValue, Condition, Operator};
use crate::error::{StoreError, StoreResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named relation from a parent table to a child table.
///
/// Everything the rewrite needs is exposed through intentional accessors;
/// in particular the column a foreign key points at is asked for directly
/// rather than dug out of the related model.
#[derive(Debug, Clone)]
pub struct Relation {
    child_table: String,
    foreign_key_column: String,
    target_column: String,
}

impl Relation {
    pub fn new(
        child_table: impl Into<String>,
        foreign_key_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            foreign_key_column: foreign_key_column.into(),
            target_column: target_column.into(),
        }
    }

    /// The table the relation points into.
    pub fn child_table(&self) -> &str {
        &self.child_table
    }

    /// The child column holding the foreign key.
    pub fn foreign_key_column(&self) -> &str {
        &self.foreign_key_column
    }

    /// The parent column the foreign key targets.
    pub fn target_column_name(&self) -> &str {
        &self.target_column
    }
}

/// Relation registry: (table, relation name) -> [`Relation`].
#[derive(Debug, Clone, Default)]
pub struct RelationMap {
    by_table: BTreeMap<String, BTreeMap<String, Relation>>,
}

impl RelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        table: impl Into<String>,
        name: impl Into<String>,
        relation: Relation,
    ) -> &mut Self {
        self.by_table
            .entry(table.into())
            .or_default()
            .insert(name.into(), relation);
        self
    }

    pub fn get(&self, table: &str, name: &str) -> Option<&Relation> {
        self.by_table.get(table).and_then(|m| m.get(name))
    }
}

/// What a [`SubQuery`] yields when evaluated against the child table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SubQueryKind {
    /// The set of `column` values of matching child rows; the owning leaf
    /// tests membership (`IN` / `NOT IN`).
    IdSet,
    /// The count of child rows whose `column` equals the outer row's key
    /// column; the owning leaf's operator compares it to `compare_to`.
    Count { compare_to: Value },
}

/// A backend-neutral sub-query over one child table.
///
/// Produced only by [`expand`]; pure data, like the condition tree itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuery {
    pub table: String,
    pub column: String,
    pub condition: Option<Condition>,
    pub kind: SubQueryKind,
}

/// Rewrite every reference-path leaf in `condition`, resolving relation
/// names against `relations` starting from `table`. Non-reference leaves and
/// the tree shape are left untouched. Unknown relation names are fatal.
pub fn expand(
    condition: Condition,
    table: &str,
    relations: &RelationMap,
) -> StoreResult<Condition> {
    match condition {
        Condition::Compound { junction, children } => {
            let children = children
                .into_iter()
                .map(|c| expand(c, table, relations))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(Condition::Compound { junction, children })
        }
        Condition::Leaf { key, op, value } if key.contains('/') => {
            expand_leaf(&key, op, value, table, relations)
        }
        other => Ok(other),
    }
}

fn expand_leaf(
    path: &str,
    op: Operator,
    value: CondValue,
    table: &str,
    relations: &RelationMap,
) -> StoreResult<Condition> {
    let Some((name, rest)) = path.split_once('/') else {
        return Ok(Condition::Leaf {
            key: path.to_string(),
            op,
            value,
        });
    };
    let relation = relations.get(table, name).ok_or_else(|| {
        StoreError::UnknownRelation {
            relation: name.to_string(),
            path: path.to_string(),
        }
    })?;

    match rest {
        // Existence tests compare a correlated count; the leaf's own
        // operator and value are irrelevant for ~ and !.
        "~" => Ok(count_leaf(relation, Operator::Gt, Value::Int(0), None)),
        "!" => Ok(count_leaf(relation, Operator::Eq, Value::Int(0), None)),
        "#" => {
            let CondValue::Scalar(n) = value else {
                return Err(StoreError::Condition(format!(
                    "count condition '{path}' needs a scalar to compare against"
                )));
            };
            Ok(count_leaf(relation, op, n, None))
        }
        _ => {
            // Field test, possibly through further relations: the inner
            // condition is expanded against the child table.
            let inner = expand(
                Condition::Leaf {
                    key: rest.to_string(),
                    op,
                    value,
                },
                relation.child_table(),
                relations,
            )?;
            Ok(Condition::Leaf {
                key: relation.target_column_name().to_string(),
                op: Operator::In,
                value: CondValue::SubQuery(Box::new(SubQuery {
                    table: relation.child_table().to_string(),
                    column: relation.foreign_key_column().to_string(),
                    condition: Some(inner),
                    kind: SubQueryKind::IdSet,
                })),
            })
        }
    }
}

fn count_leaf(
    relation: &Relation,
    op: Operator,
    compare_to: Value,
    condition: Option<Condition>,
) -> Condition {
    Condition::Leaf {
        key: relation.target_column_name().to_string(),
        op,
        value: CondValue::SubQuery(Box::new(SubQuery {
            table: relation.child_table().to_string(),
            column: relation.foreign_key_column().to_string(),
            condition,
            kind: SubQueryKind::Count { compare_to },
        })),
    }
}
