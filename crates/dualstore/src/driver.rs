//! The driver seam: the core never opens a connection itself.
//!
//! [`Driver`] is the narrow surface a physical database binding must
//! provide; [`Connection`] layers nesting-counted transactions, statement
//! preparation (positional rewrite where needed) and error wrapping on
//! top of it.

use crate::error::{StoreError, StoreResult};
use crate::expr::Statement;
use crate::memory::Row;
use crate::platform::Platform;
use crate::value::Value;
use tracing::debug;

/// Blocking statement execution against one database connection.
pub trait Driver {
    fn platform(&self) -> Platform;

    /// Run a statement that returns no rows; yields the affected-row count.
    fn execute(&mut self, sql: &str, params: &[(String, Value)]) -> StoreResult<u64>;

    /// Run a statement that returns rows.
    fn query(&mut self, sql: &str, params: &[(String, Value)]) -> StoreResult<Vec<Row>>;

    fn last_insert_id(&mut self) -> StoreResult<i64>;

    fn begin(&mut self) -> StoreResult<()>;
    fn commit(&mut self) -> StoreResult<()>;
    fn rollback(&mut self) -> StoreResult<()>;
}

/// One column as the live database reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
}

/// Schema introspection and DDL, required by the migrator.
pub trait SchemaDriver: Driver {
    fn list_tables(&mut self) -> StoreResult<Vec<String>>;

    /// Columns of an existing table, or `None` when the table does not exist.
    fn describe_table(&mut self, table: &str) -> StoreResult<Option<Vec<ColumnInfo>>>;

    fn run_ddl(&mut self, sql: &str) -> StoreResult<()>;

    /// Toggle foreign-key enforcement around destructive ALTER batches.
    fn set_foreign_key_checks(&mut self, enabled: bool) -> StoreResult<()>;

    /// Check referential integrity while enforcement is off. Runs between
    /// a destructive ALTER and the re-enable; drivers with a native check
    /// (such as a foreign-key pragma scan) should override this.
    fn verify_referential_integrity(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

/// A driver wrapped with nesting-counted transactions.
///
/// An inner `begin` only increments depth; only the outermost `commit`
/// issues the physical COMMIT. A rollback anywhere inside the nest poisons
/// the whole transaction: the outermost commit rolls back instead and
/// reports it.
#[derive(Debug)]
pub struct Connection<D> {
    driver: D,
    depth: u32,
    rollback_only: bool,
}

impl<D: Driver> Connection<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            depth: 0,
            rollback_only: false,
        }
    }

    pub fn platform(&self) -> Platform {
        self.driver.platform()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Named placeholders by default; platforms without native support get
    /// the positional rewrite.
    fn prepared(&self, statement: &Statement) -> (String, Vec<(String, Value)>) {
        if self.driver.platform().supports_named_params() {
            (statement.sql.clone(), statement.params.clone())
        } else {
            statement.positional()
        }
    }

    pub fn execute(&mut self, statement: &Statement) -> StoreResult<u64> {
        let (sql, params) = self.prepared(statement);
        debug!(sql = %sql, params = %statement.describe_params(), "execute");
        self.driver
            .execute(&sql, &params)
            .map_err(|e| wrap_execution(e, statement))
    }

    pub fn query(&mut self, statement: &Statement) -> StoreResult<Vec<Row>> {
        let (sql, params) = self.prepared(statement);
        debug!(sql = %sql, params = %statement.describe_params(), "query");
        self.driver
            .query(&sql, &params)
            .map_err(|e| wrap_execution(e, statement))
    }

    pub fn last_insert_id(&mut self) -> StoreResult<i64> {
        self.driver.last_insert_id()
    }

    pub fn begin(&mut self) -> StoreResult<()> {
        if self.depth == 0 {
            self.driver.begin()?;
            self.rollback_only = false;
        }
        self.depth += 1;
        debug!(depth = self.depth, "begin");
        Ok(())
    }

    pub fn commit(&mut self) -> StoreResult<()> {
        if self.depth == 0 {
            return Err(StoreError::Transaction("commit without begin".into()));
        }
        self.depth -= 1;
        debug!(depth = self.depth, "commit");
        if self.depth > 0 {
            return Ok(());
        }
        if self.rollback_only {
            self.rollback_only = false;
            self.driver.rollback()?;
            return Err(StoreError::Transaction(
                "transaction rolled back by an inner block".into(),
            ));
        }
        self.driver.commit()
    }

    pub fn rollback(&mut self) -> StoreResult<()> {
        if self.depth == 0 {
            return Err(StoreError::Transaction("rollback without begin".into()));
        }
        self.depth -= 1;
        debug!(depth = self.depth, "rollback");
        if self.depth == 0 {
            self.rollback_only = false;
            self.driver.rollback()
        } else {
            self.rollback_only = true;
            Ok(())
        }
    }

    /// Run `f` inside a transaction: commit on success, roll back on error.
    /// Nested calls share the outer transaction; an error in any nested
    /// block rolls back everything.
    pub fn atomic<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                // The original error wins over any rollback failure.
                if let Err(rb) = self.rollback() {
                    debug!(error = %rb, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn wrap_execution(err: StoreError, statement: &Statement) -> StoreError {
    match err {
        already @ StoreError::Execution { .. } => already,
        other => StoreError::execution(
            other.to_string(),
            statement.sql.clone(),
            statement.describe_params(),
        ),
    }
}
