//! Plain in-memory row storage: table name -> ordered row list.

use crate::error::{StoreError, StoreResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// One row: column name -> scalar.
pub type Row = BTreeMap<String, Value>;

/// Read access to tables, used by the interpreter to resolve reference
/// sub-conditions against sibling tables.
pub trait StoreView {
    fn table_rows(&self, table: &str) -> Option<&[Row]>;
}

#[derive(Debug, Clone, Default)]
struct MemTable {
    rows: Vec<Row>,
    /// Highest id ever handed out. Ids are monotonic and never reused,
    /// even after the owning row is deleted.
    last_id: i64,
}

impl MemTable {
    fn max_existing_id(&self, id_column: &str) -> i64 {
        self.rows
            .iter()
            .filter_map(|row| match row.get(id_column) {
                Some(Value::Int(i)) => Some(*i),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

/// An in-memory persistence surface with the same filtering semantics as the
/// SQL path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemTable>,
    id_column: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            id_column: "id".to_string(),
        }
    }

    /// Use a different id column for auto-increment allocation.
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Create an empty table. Inserting also creates tables on demand.
    pub fn create_table(&mut self, name: impl Into<String>) {
        self.tables.entry(name.into()).or_default();
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Insert a row, assigning an id when none is given:
    /// `max(last allocated, max existing numeric id) + 1`.
    pub fn insert(&mut self, table: &str, mut row: Row) -> StoreResult<i64> {
        let id_column = self.id_column.clone();
        let t = self.tables.entry(table.to_string()).or_default();
        let id = match row.get(&id_column) {
            Some(Value::Int(i)) => *i,
            Some(other) if !other.is_null() => {
                return Err(StoreError::validation(format!(
                    "id column '{id_column}' must be an integer, got {}",
                    other.type_name()
                )));
            }
            _ => {
                let next = t.last_id.max(t.max_existing_id(&id_column)) + 1;
                row.insert(id_column.clone(), Value::Int(next));
                next
            }
        };
        t.last_id = t.last_id.max(id);
        t.rows.push(row);
        Ok(id)
    }

    /// Replace the columns of the row with the given id.
    pub fn update(&mut self, table: &str, id: i64, changes: Row) -> StoreResult<()> {
        let id_column = self.id_column.clone();
        let row = self
            .row_mut(table, id)?;
        for (column, value) in changes {
            if column == id_column {
                continue;
            }
            row.insert(column, value);
        }
        Ok(())
    }

    /// Delete the row with the given id. The id stays allocated.
    pub fn delete(&mut self, table: &str, id: i64) -> StoreResult<()> {
        let id_column = self.id_column.clone();
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(format!("table '{table}'")))?;
        let before = t.rows.len();
        t.rows
            .retain(|row| row.get(&id_column) != Some(&Value::Int(id)));
        if t.rows.len() == before {
            return Err(StoreError::NotFound(format!("row {id} in '{table}'")));
        }
        Ok(())
    }

    pub fn rows(&self, table: &str) -> StoreResult<&[Row]> {
        self.tables
            .get(table)
            .map(|t| t.rows.as_slice())
            .ok_or_else(|| StoreError::NotFound(format!("table '{table}'")))
    }

    fn row_mut(&mut self, table: &str, id: i64) -> StoreResult<&mut Row> {
        let id_column = self.id_column.clone();
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(format!("table '{table}'")))?;
        t.rows
            .iter_mut()
            .find(|row| row.get(&id_column) == Some(&Value::Int(id)))
            .ok_or_else(|| StoreError::NotFound(format!("row {id} in '{table}'")))
    }
}

impl StoreView for MemoryStore {
    fn table_rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(|t| t.rows.as_slice())
    }
}

/// Build a row from (column, value) pairs.
pub fn row(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_sequential_ids() {
        let mut store = MemoryStore::new();
        let a = store.insert("users", row([("name", Value::Str("a".into()))])).unwrap();
        let b = store.insert("users", row([("name", Value::Str("b".into()))])).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn ids_are_never_reused_after_delete() {
        let mut store = MemoryStore::new();
        let a = store.insert("users", Row::new()).unwrap();
        let b = store.insert("users", Row::new()).unwrap();
        store.delete("users", b).unwrap();
        let c = store.insert("users", Row::new()).unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
        store.delete("users", a).unwrap();
        store.delete("users", c).unwrap();
        assert_eq!(store.insert("users", Row::new()).unwrap(), 4);
    }

    #[test]
    fn explicit_id_advances_the_allocator() {
        let mut store = MemoryStore::new();
        store
            .insert("users", row([("id", Value::Int(10))]))
            .unwrap();
        assert_eq!(store.insert("users", Row::new()).unwrap(), 11);
    }

    #[test]
    fn update_keeps_the_id() {
        let mut store = MemoryStore::new();
        let id = store
            .insert("users", row([("name", Value::Str("old".into()))]))
            .unwrap();
        store
            .update(
                "users",
                id,
                row([("name", Value::Str("new".into())), ("id", Value::Int(99))]),
            )
            .unwrap();
        let rows = store.rows("users").unwrap();
        assert_eq!(rows[0].get("id"), Some(&Value::Int(id)));
        assert_eq!(rows[0].get("name"), Some(&Value::Str("new".into())));
    }

    #[test]
    fn delete_missing_row_errors() {
        let mut store = MemoryStore::new();
        store.create_table("users");
        assert!(store.delete("users", 1).is_err());
        assert!(store.delete("ghosts", 1).is_err());
    }
}
