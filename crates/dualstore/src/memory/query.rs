//! Query pipeline over a [`MemoryStore`]: filter, sort, slice, aggregate.

use crate::condition::Condition;
use crate::error::{StoreError, StoreResult};
use crate::memory::interp::evaluate_with;
use crate::memory::store::{MemoryStore, Row};
use crate::query::SortDir;
use crate::value::Value;
use std::cmp::Ordering;

/// Column aggregate over the filtered row set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
}

/// A read query against one in-memory table.
///
/// Rows flow through the stages in a fixed order, matching what a SQL
/// SELECT would do: WHERE, then ORDER BY, then OFFSET/LIMIT.
#[derive(Debug)]
pub struct MemoryQuery<'a> {
    store: &'a MemoryStore,
    table: String,
    condition: Condition,
    order: Vec<(String, SortDir)>,
    limit: Option<(u64, u64)>,
}

impl<'a> MemoryQuery<'a> {
    pub fn new(store: &'a MemoryStore, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            condition: Condition::Empty,
            order: Vec::new(),
            limit: None,
        }
    }

    /// Filter rows. Successive calls AND together.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = if self.condition.is_empty() {
            condition
        } else {
            Condition::and(vec![self.condition, condition])
        };
        self
    }

    /// Add a sort key. Earlier keys take precedence; ties fall through to
    /// later keys, and the sort is stable beyond the last key.
    pub fn order_by(mut self, column: impl Into<String>, dir: SortDir) -> Self {
        self.order.push((column.into(), dir));
        self
    }

    /// Keep at most `count` rows, skipping `offset` first.
    pub fn limit(mut self, count: u64, offset: u64) -> Self {
        self.limit = Some((count, offset));
        self
    }

    /// Run the pipeline and return the matching rows.
    pub fn fetch(&self) -> StoreResult<Vec<Row>> {
        let rows = self.store.rows(&self.table)?;
        let mut matched = Vec::new();
        for row in rows {
            if evaluate_with(&self.condition, row, Some(self.store))? {
                matched.push(row.clone());
            }
        }

        if !self.order.is_empty() {
            matched.sort_by(|a, b| self.compare_rows(a, b));
        }

        if let Some((count, offset)) = self.limit {
            let offset = offset.min(matched.len() as u64) as usize;
            let end = (offset as u64 + count).min(matched.len() as u64) as usize;
            matched = matched[offset..end].to_vec();
        }

        Ok(matched)
    }

    /// Number of rows the filter accepts, before any limit.
    pub fn count(&self) -> StoreResult<u64> {
        let rows = self.store.rows(&self.table)?;
        let mut n = 0;
        for row in rows {
            if evaluate_with(&self.condition, row, Some(self.store))? {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Aggregate one column over the filtered rows. With `coalesce_nulls`
    /// set, NULL cells count as zero; otherwise they are skipped, and an
    /// all-NULL (or empty) input yields NULL.
    pub fn aggregate(
        &self,
        agg: Aggregate,
        column: &str,
        coalesce_nulls: bool,
    ) -> StoreResult<Value> {
        let rows = self.store.rows(&self.table)?;
        let mut values = Vec::new();
        for row in rows {
            if !evaluate_with(&self.condition, row, Some(self.store))? {
                continue;
            }
            match row.get(column) {
                Some(v) if !v.is_null() => values.push(v.clone()),
                _ if coalesce_nulls => values.push(Value::Int(0)),
                _ => {}
            }
        }
        if values.is_empty() {
            return Ok(Value::Null);
        }

        match agg {
            Aggregate::Min => Ok(fold_extreme(values, Ordering::Less)),
            Aggregate::Max => Ok(fold_extreme(values, Ordering::Greater)),
            Aggregate::Sum => numeric_sum(&values, column).map(|s| s.value()),
            Aggregate::Avg => {
                let sum = numeric_sum(&values, column)?;
                Ok(Value::Float(sum.mean()))
            }
        }
    }

    fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        for (column, dir) in &self.order {
            let av = a.get(column).cloned().unwrap_or(Value::Null);
            let bv = b.get(column).cloned().unwrap_or(Value::Null);
            let ord = match dir {
                SortDir::Asc => av.compare(&bv),
                SortDir::Desc => bv.compare(&av),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// MIN/MAX work on any comparable values via the shared ordering.
fn fold_extreme(values: Vec<Value>, keep_when: Ordering) -> Value {
    let mut best = Value::Null;
    for v in values {
        if best.is_null() || v.compare(&best) == keep_when {
            best = v;
        }
    }
    best
}

struct NumericSum {
    int_sum: i64,
    float_sum: f64,
    saw_float: bool,
    count: usize,
}

impl NumericSum {
    /// Integer inputs stay integer; any float input promotes the whole sum.
    fn value(&self) -> Value {
        if self.saw_float {
            Value::Float(self.float_sum)
        } else {
            Value::Int(self.int_sum)
        }
    }

    fn mean(&self) -> f64 {
        self.float_sum / self.count as f64
    }
}

/// SUM/AVG require numbers.
fn numeric_sum(values: &[Value], column: &str) -> StoreResult<NumericSum> {
    let mut sum = NumericSum {
        int_sum: 0,
        float_sum: 0.0,
        saw_float: false,
        count: values.len(),
    };
    for v in values {
        match v {
            Value::Int(i) => {
                sum.int_sum += i;
                sum.float_sum += *i as f64;
            }
            Value::Float(f) => {
                sum.saw_float = true;
                sum.float_sum += f;
            }
            other => {
                return Err(StoreError::Condition(format!(
                    "cannot sum {} value in column '{column}'",
                    other.type_name()
                )));
            }
        }
    }
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::row;

    fn people() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (name, age, city) in [
            ("ann", 34, "berlin"),
            ("bob", 28, "paris"),
            ("cid", 34, "athens"),
            ("dee", 41, "berlin"),
        ] {
            store
                .insert(
                    "people",
                    row([
                        ("name", Value::Str(name.into())),
                        ("age", Value::Int(age)),
                        ("city", Value::Str(city.into())),
                    ]),
                )
                .unwrap();
        }
        store
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r["name"].to_string()).collect()
    }

    #[test]
    fn filter_then_sort_then_limit() {
        let store = people();
        let rows = MemoryQuery::new(&store, "people")
            .filter(Condition::parse("age", ">", Value::Int(27)).unwrap())
            .order_by("age", SortDir::Desc)
            .order_by("name", SortDir::Asc)
            .limit(2, 1)
            .fetch()
            .unwrap();
        assert_eq!(names(&rows), vec!["ann", "cid"]);
    }

    #[test]
    fn multi_key_sort_breaks_ties_with_later_keys() {
        let store = people();
        let rows = MemoryQuery::new(&store, "people")
            .order_by("age", SortDir::Asc)
            .order_by("name", SortDir::Desc)
            .fetch()
            .unwrap();
        assert_eq!(names(&rows), vec!["bob", "cid", "ann", "dee"]);
    }

    #[test]
    fn nulls_sort_first_ascending() {
        let mut store = people();
        store.insert("people", row([("name", Value::Str("eve".into()))])).unwrap();
        let rows = MemoryQuery::new(&store, "people")
            .order_by("age", SortDir::Asc)
            .fetch()
            .unwrap();
        assert_eq!(rows[0]["name"], Value::Str("eve".into()));
    }

    #[test]
    fn offset_past_the_end_yields_nothing() {
        let store = people();
        let rows = MemoryQuery::new(&store, "people")
            .limit(10, 100)
            .fetch()
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn count_ignores_limit() {
        let store = people();
        let q = MemoryQuery::new(&store, "people")
            .filter(Condition::eq("city", "berlin"))
            .limit(1, 0);
        assert_eq!(q.count().unwrap(), 2);
    }

    #[test]
    fn sum_and_avg_over_ages() {
        let store = people();
        let q = MemoryQuery::new(&store, "people");
        assert_eq!(q.aggregate(Aggregate::Sum, "age", false).unwrap(), Value::Int(137));
        assert_eq!(
            q.aggregate(Aggregate::Avg, "age", false).unwrap(),
            Value::Float(137.0 / 4.0)
        );
        assert_eq!(q.aggregate(Aggregate::Min, "age", false).unwrap(), Value::Int(28));
        assert_eq!(q.aggregate(Aggregate::Max, "age", false).unwrap(), Value::Int(41));
    }

    #[test]
    fn null_handling_in_aggregates() {
        let mut store = MemoryStore::new();
        store.insert("t", row([("n", Value::Int(10))])).unwrap();
        store.insert("t", row([("n", Value::Null)])).unwrap();

        let q = MemoryQuery::new(&store, "t");
        // Skipped: one non-null value.
        assert_eq!(q.aggregate(Aggregate::Avg, "n", false).unwrap(), Value::Float(10.0));
        // Coalesced: the NULL counts as zero.
        assert_eq!(q.aggregate(Aggregate::Avg, "n", true).unwrap(), Value::Float(5.0));

        let mut empty = MemoryStore::new();
        empty.create_table("t");
        let q = MemoryQuery::new(&empty, "t");
        assert_eq!(q.aggregate(Aggregate::Sum, "n", false).unwrap(), Value::Null);
    }

    #[test]
    fn sum_of_non_numeric_column_errors() {
        let store = people();
        let q = MemoryQuery::new(&store, "people");
        assert!(q.aggregate(Aggregate::Sum, "name", false).is_err());
    }

    #[test]
    fn min_works_on_strings() {
        let store = people();
        let q = MemoryQuery::new(&store, "people");
        assert_eq!(
            q.aggregate(Aggregate::Min, "name", false).unwrap(),
            Value::Str("ann".into())
        );
    }
}
