//! Schema migration: diff a desired field set against a live table and
//! apply the difference.
//!
//! The diff is by field name only, with the primary key excluded; a field
//! present on both sides is altered only when its resolved SQL *type*
//! differs. Length, precision and nullability changes are ignored by the
//! diff on purpose.

use crate::driver::{ColumnInfo, SchemaDriver};
use crate::error::{StoreError, StoreResult};
use crate::field::{FieldDescriptor, Role, TypeTag};
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Bidirectional, overridable type mapping with a fallback on each side.
#[derive(Debug, Clone)]
pub struct TypeMap {
    to_sql: BTreeMap<TypeTag, String>,
    to_declared: BTreeMap<String, TypeTag>,
    fallback_sql: String,
    fallback_declared: TypeTag,
}

impl Default for TypeMap {
    fn default() -> Self {
        let mut map = Self {
            to_sql: BTreeMap::new(),
            to_declared: BTreeMap::new(),
            fallback_sql: "varchar".to_string(),
            fallback_declared: TypeTag::String,
        };
        for (tag, sql) in [
            (TypeTag::Integer, "integer"),
            (TypeTag::Float, "double precision"),
            (TypeTag::Boolean, "boolean"),
            (TypeTag::String, "varchar"),
            (TypeTag::Text, "text"),
            (TypeTag::Date, "date"),
            (TypeTag::DateTime, "timestamp"),
            (TypeTag::Binary, "blob"),
        ] {
            map.set(tag, sql);
        }
        map
    }
}

impl TypeMap {
    /// Map a declared type to a SQL type and back, overriding both
    /// directions.
    pub fn set(&mut self, tag: TypeTag, sql: impl Into<String>) -> &mut Self {
        let sql = sql.into();
        self.to_sql.insert(tag, sql.clone());
        self.to_declared.insert(sql, tag);
        self
    }

    pub fn sql_type(&self, tag: TypeTag) -> &str {
        self.to_sql.get(&tag).map_or(&self.fallback_sql, |s| s)
    }

    pub fn declared_type(&self, sql: &str) -> TypeTag {
        // Introspected types may carry a length suffix.
        let bare = sql.split('(').next().unwrap_or(sql).trim();
        self.to_declared
            .get(&bare.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.fallback_declared)
    }
}

/// One column as the migrator is about to create or alter it. Built fresh
/// per run, diffed, then discarded.
#[derive(Debug, Clone)]
struct ColumnSpec {
    name: String,
    sql_type: String,
    size: Option<u32>,
    not_null: bool,
    primary: bool,
    autoincrement: bool,
    unsigned: bool,
}

/// What one migration run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationReport {
    Created,
    NoChanges,
    Changed {
        added: usize,
        altered: usize,
        dropped: usize,
    },
}

impl MigrationReport {
    pub fn is_no_changes(&self) -> bool {
        matches!(self, MigrationReport::NoChanges)
    }
}

fn fields_word(n: usize) -> &'static str {
    if n == 1 { "field" } else { "fields" }
}

impl fmt::Display for MigrationReport {
    /// Log text only; structured callers must use the counts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationReport::Created => write!(f, "created new table"),
            MigrationReport::NoChanges => write!(f, "no changes"),
            MigrationReport::Changed {
                added,
                altered,
                dropped,
            } => write!(
                f,
                "added {added} {}, changed {altered} {} and deleted {dropped} {}",
                fields_word(*added),
                fields_word(*altered),
                fields_word(*dropped)
            ),
        }
    }
}

/// Diffs desired fields against live tables and applies DDL through a
/// [`SchemaDriver`].
pub struct Migrator<'a, D: SchemaDriver> {
    driver: &'a mut D,
    types: TypeMap,
}

impl<'a, D: SchemaDriver> Migrator<'a, D> {
    pub fn new(driver: &'a mut D) -> Self {
        Self {
            driver,
            types: TypeMap::default(),
        }
    }

    /// Override type mappings before running.
    pub fn types_mut(&mut self) -> &mut TypeMap {
        &mut self.types
    }

    /// Bring `table` in line with `fields`: create it when absent, otherwise
    /// apply the name diff as one batched ALTER.
    pub fn run(&mut self, table: &str, fields: &[FieldDescriptor]) -> StoreResult<MigrationReport> {
        let platform = self.driver.platform();
        let desired: Vec<ColumnSpec> = fields
            .iter()
            .map(|f| self.resolve_column(f, platform))
            .collect();

        let Some(existing) = self.driver.describe_table(table)? else {
            self.create(table, &desired, platform)?;
            info!(table, "created new table");
            return Ok(MigrationReport::Created);
        };

        let report = self.diff_and_apply(table, &desired, &existing, platform)?;
        info!(table, report = %report, "migrated");
        Ok(report)
    }

    /// Issue CREATE TABLE unconditionally. A driver error (such as the
    /// table already existing) propagates unmodified.
    pub fn create_table(
        &mut self,
        table: &str,
        fields: &[FieldDescriptor],
    ) -> StoreResult<MigrationReport> {
        let platform = self.driver.platform();
        let desired: Vec<ColumnSpec> = fields
            .iter()
            .map(|f| self.resolve_column(f, platform))
            .collect();
        self.create(table, &desired, platform)?;
        Ok(MigrationReport::Created)
    }

    /// Issue DROP TABLE. Dropping a missing table propagates the driver's
    /// error.
    pub fn drop_table(&mut self, table: &str) -> StoreResult<()> {
        let platform = self.driver.platform();
        self.driver
            .run_ddl(&format!("drop table {}", platform.escape_identifier(table)))
    }

    /// The only entry point that swallows a missing table.
    pub fn drop_table_if_exists(&mut self, table: &str) -> StoreResult<()> {
        match self.drop_table(table) {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                warn!(table, "drop skipped, table does not exist");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_column(&self, field: &FieldDescriptor, platform: Platform) -> ColumnSpec {
        let primary = field.is_primary();
        ColumnSpec {
            name: field.column_name().to_string(),
            sql_type: self.types.sql_type(field.declared_type).to_string(),
            size: field.size,
            // NOT NULL is forced for mandatory fields and for the primary
            // key unconditionally.
            not_null: field.mandatory || primary,
            primary,
            autoincrement: primary,
            unsigned: field.role == Role::Reference
                && field.declared_type == TypeTag::Integer
                && platform.supports_unsigned(),
        }
    }

    fn render_column(spec: &ColumnSpec, platform: Platform) -> String {
        let mut out = format!(
            "{} {}",
            platform.escape_identifier(&spec.name),
            spec.sql_type
        );
        if let Some(size) = spec.size {
            out.push_str(&format!("({size})"));
        }
        if spec.unsigned {
            out.push_str(" unsigned");
        }
        if spec.not_null {
            out.push_str(" not null");
        }
        if spec.autoincrement {
            match platform {
                // SQLite only honors autoincrement on an inline primary key.
                Platform::Sqlite => out.push_str(" primary key autoincrement"),
                Platform::MySql => out.push_str(" auto_increment"),
                Platform::MsSql => out.push_str(" identity"),
                Platform::Generic => out.push_str(" generated by default as identity"),
            }
        }
        out
    }

    fn create(&mut self, table: &str, desired: &[ColumnSpec], platform: Platform) -> StoreResult<()> {
        let mut parts: Vec<String> = desired
            .iter()
            .map(|c| Self::render_column(c, platform))
            .collect();
        // Autoincrement always pairs with an explicit primary-key
        // constraint; SQLite already carried it inline.
        if platform != Platform::Sqlite {
            if let Some(pk) = desired.iter().find(|c| c.primary) {
                parts.push(format!(
                    "primary key ({})",
                    platform.escape_identifier(&pk.name)
                ));
            }
        }
        self.driver.run_ddl(&format!(
            "create table {} ({})",
            platform.escape_identifier(table),
            parts.join(", ")
        ))
    }

    fn diff_and_apply(
        &mut self,
        table: &str,
        desired: &[ColumnSpec],
        existing: &[ColumnInfo],
        platform: Platform,
    ) -> StoreResult<MigrationReport> {
        let mut added: Vec<&ColumnSpec> = Vec::new();
        let mut altered: Vec<&ColumnSpec> = Vec::new();
        let mut dropped: Vec<&ColumnInfo> = Vec::new();

        for spec in desired.iter().filter(|c| !c.primary) {
            match existing.iter().find(|c| c.name == spec.name) {
                None => added.push(spec),
                Some(live) => {
                    // Type-only comparison through the declared side, so
                    // spelling variants of the same type do not churn.
                    let live_tag = self.types.declared_type(&live.sql_type);
                    let want_tag = self.types.declared_type(&spec.sql_type);
                    if live_tag != want_tag {
                        altered.push(spec);
                    }
                }
            }
        }
        let pk_names: Vec<&str> = desired
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.name.as_str())
            .collect();
        for live in existing {
            if pk_names.contains(&live.name.as_str()) {
                continue;
            }
            if !desired.iter().any(|c| c.name == live.name) {
                dropped.push(live);
            }
        }

        if added.is_empty() && altered.is_empty() && dropped.is_empty() {
            return Ok(MigrationReport::NoChanges);
        }

        let mut clauses = Vec::new();
        for spec in &added {
            clauses.push(format!("add column {}", Self::render_column(spec, platform)));
        }
        for spec in &altered {
            let name = platform.escape_identifier(&spec.name);
            let mut ty = spec.sql_type.clone();
            if let Some(size) = spec.size {
                ty.push_str(&format!("({size})"));
            }
            clauses.push(match platform {
                Platform::MySql => {
                    format!("modify column {}", Self::render_column(spec, platform))
                }
                Platform::MsSql => format!("alter column {name} {ty}"),
                _ => format!("alter column {name} type {ty}"),
            });
        }
        for live in &dropped {
            clauses.push(format!(
                "drop column {}",
                platform.escape_identifier(&live.name)
            ));
        }

        let ddl = format!(
            "alter table {} {}",
            platform.escape_identifier(table),
            clauses.join(", ")
        );

        // Destructive changes run with foreign keys disabled, then the
        // driver verifies integrity before enforcement comes back.
        let destructive = !altered.is_empty() || !dropped.is_empty();
        if destructive {
            self.driver.set_foreign_key_checks(false)?;
        }
        let result = self.driver.run_ddl(&ddl);
        if destructive {
            let verify = result
                .and_then(|()| self.driver.verify_referential_integrity())
                .map_err(|e| StoreError::migration(table, e.to_string()));
            self.driver.set_foreign_key_checks(true)?;
            verify?;
        } else {
            result?;
        }

        Ok(MigrationReport::Changed {
            added: added.len(),
            altered: altered.len(),
            dropped: dropped.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::memory::Row;
    use crate::value::Value;

    struct MockSchema {
        platform: Platform,
        tables: BTreeMap<String, Vec<ColumnInfo>>,
        ddl: Vec<String>,
        fk_checks: Vec<bool>,
    }

    impl MockSchema {
        fn new(platform: Platform) -> Self {
            Self {
                platform,
                tables: BTreeMap::new(),
                ddl: Vec::new(),
                fk_checks: Vec::new(),
            }
        }

        fn set_table(&mut self, name: &str, columns: &[(&str, &str)]) {
            self.tables.insert(
                name.to_string(),
                columns
                    .iter()
                    .map(|(n, t)| ColumnInfo {
                        name: n.to_string(),
                        sql_type: t.to_string(),
                    })
                    .collect(),
            );
        }
    }

    impl Driver for MockSchema {
        fn platform(&self) -> Platform {
            self.platform
        }
        fn execute(&mut self, _: &str, _: &[(String, Value)]) -> StoreResult<u64> {
            unimplemented!("migration tests only issue DDL")
        }
        fn query(&mut self, _: &str, _: &[(String, Value)]) -> StoreResult<Vec<Row>> {
            unimplemented!("migration tests only issue DDL")
        }
        fn last_insert_id(&mut self) -> StoreResult<i64> {
            unimplemented!("migration tests only issue DDL")
        }
        fn begin(&mut self) -> StoreResult<()> {
            Ok(())
        }
        fn commit(&mut self) -> StoreResult<()> {
            Ok(())
        }
        fn rollback(&mut self) -> StoreResult<()> {
            Ok(())
        }
    }

    impl SchemaDriver for MockSchema {
        fn list_tables(&mut self) -> StoreResult<Vec<String>> {
            Ok(self.tables.keys().cloned().collect())
        }
        fn describe_table(&mut self, table: &str) -> StoreResult<Option<Vec<ColumnInfo>>> {
            Ok(self.tables.get(table).cloned())
        }
        fn run_ddl(&mut self, sql: &str) -> StoreResult<()> {
            if sql.starts_with("drop table") && !sql.contains("users") {
                return Err(StoreError::NotFound(sql.to_string()));
            }
            self.ddl.push(sql.to_string());
            Ok(())
        }
        fn set_foreign_key_checks(&mut self, enabled: bool) -> StoreResult<()> {
            self.fk_checks.push(enabled);
            Ok(())
        }
    }

    fn user_fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::primary("id"),
            FieldDescriptor::new("name", TypeTag::String).sized(255),
        ]
    }

    #[test]
    fn creates_a_missing_table_with_pk_constraint() {
        let mut driver = MockSchema::new(Platform::Generic);
        let mut migrator = Migrator::new(&mut driver);
        let report = migrator.run("users", &user_fields()).unwrap();
        assert_eq!(report, MigrationReport::Created);
        assert_eq!(report.to_string(), "created new table");
        assert_eq!(
            driver.ddl,
            vec![
                "create table \"users\" (\"id\" integer not null generated by default as identity, \
                 \"name\" varchar(255), primary key (\"id\"))"
            ]
        );
    }

    #[test]
    fn sqlite_pk_is_inline() {
        let mut driver = MockSchema::new(Platform::Sqlite);
        let mut migrator = Migrator::new(&mut driver);
        migrator.run("users", &user_fields()).unwrap();
        assert_eq!(
            driver.ddl,
            vec![
                "create table \"users\" (\"id\" integer not null primary key autoincrement, \
                 \"name\" varchar(255))"
            ]
        );
    }

    #[test]
    fn unchanged_table_reports_no_changes() {
        let mut driver = MockSchema::new(Platform::Generic);
        driver.set_table("users", &[("id", "integer"), ("name", "varchar(255)")]);
        let mut migrator = Migrator::new(&mut driver);
        let report = migrator.run("users", &user_fields()).unwrap();
        assert!(report.is_no_changes());
        assert_eq!(report.to_string(), "no changes");
        assert!(driver.ddl.is_empty());
    }

    #[test]
    fn adding_one_field_reports_added_1_field() {
        let mut driver = MockSchema::new(Platform::Generic);
        driver.set_table("users", &[("id", "integer"), ("name", "varchar(255)")]);
        let mut fields = user_fields();
        fields.push(FieldDescriptor::new("age", TypeTag::Integer));
        let mut migrator = Migrator::new(&mut driver);
        let report = migrator.run("users", &fields).unwrap();
        assert_eq!(
            report,
            MigrationReport::Changed {
                added: 1,
                altered: 0,
                dropped: 0
            }
        );
        assert_eq!(
            report.to_string(),
            "added 1 field, changed 0 fields and deleted 0 fields"
        );
        assert_eq!(
            driver.ddl,
            vec!["alter table \"users\" add column \"age\" integer"]
        );
        // Additive changes leave foreign keys alone.
        assert!(driver.fk_checks.is_empty());
    }

    #[test]
    fn removing_the_field_reports_deleted_1_field() {
        let mut driver = MockSchema::new(Platform::Generic);
        driver.set_table(
            "users",
            &[("id", "integer"), ("name", "varchar(255)"), ("age", "integer")],
        );
        let mut migrator = Migrator::new(&mut driver);
        let report = migrator.run("users", &user_fields()).unwrap();
        assert_eq!(
            report,
            MigrationReport::Changed {
                added: 0,
                altered: 0,
                dropped: 1
            }
        );
        assert!(report.to_string().contains("deleted 1 field"));
        assert_eq!(driver.ddl, vec!["alter table \"users\" drop column \"age\""]);
        // Destructive change: disable, apply, re-enable.
        assert_eq!(driver.fk_checks, vec![false, true]);
    }

    #[test]
    fn type_change_alters_but_length_change_does_not() {
        let mut driver = MockSchema::new(Platform::Generic);
        driver.set_table(
            "users",
            &[("id", "integer"), ("name", "text"), ("nick", "varchar(20)")],
        );
        let fields = vec![
            FieldDescriptor::primary("id"),
            FieldDescriptor::new("name", TypeTag::String).sized(255),
            // Same type, different length: ignored by the diff.
            FieldDescriptor::new("nick", TypeTag::String).sized(80),
        ];
        let mut migrator = Migrator::new(&mut driver);
        let report = migrator.run("users", &fields).unwrap();
        assert_eq!(
            report,
            MigrationReport::Changed {
                added: 0,
                altered: 1,
                dropped: 0
            }
        );
        assert_eq!(
            driver.ddl,
            vec!["alter table \"users\" alter column \"name\" type varchar(255)"]
        );
    }

    #[test]
    fn reference_integers_are_unsigned_where_supported() {
        let mut driver = MockSchema::new(Platform::MySql);
        driver.set_table("orders", &[("id", "integer")]);
        let fields = vec![
            FieldDescriptor::primary("id"),
            FieldDescriptor::reference("user_id").mandatory(),
        ];
        let mut migrator = Migrator::new(&mut driver);
        migrator.run("orders", &fields).unwrap();
        assert_eq!(
            driver.ddl,
            vec!["alter table `orders` add column `user_id` integer unsigned not null"]
        );
    }

    #[test]
    fn rerunning_after_apply_is_idempotent() {
        let mut driver = MockSchema::new(Platform::Generic);
        driver.set_table("users", &[("id", "integer"), ("name", "varchar(255)")]);
        let mut fields = user_fields();
        fields.push(FieldDescriptor::new("age", TypeTag::Integer));
        {
            let mut migrator = Migrator::new(&mut driver);
            migrator.run("users", &fields).unwrap();
        }
        driver.set_table(
            "users",
            &[("id", "integer"), ("name", "varchar(255)"), ("age", "integer")],
        );
        let mut migrator = Migrator::new(&mut driver);
        assert!(migrator.run("users", &fields).unwrap().is_no_changes());
    }

    #[test]
    fn drop_if_exists_swallows_only_missing_tables() {
        let mut driver = MockSchema::new(Platform::Generic);
        let mut migrator = Migrator::new(&mut driver);
        // The mock reports non-user tables as missing.
        migrator.drop_table_if_exists("ghosts").unwrap();
        assert!(migrator.drop_table("ghosts").is_err());
        migrator.drop_table("users").unwrap();
    }

    #[test]
    fn overridden_type_map_wins() {
        let mut driver = MockSchema::new(Platform::Generic);
        let mut migrator = Migrator::new(&mut driver);
        migrator.types_mut().set(TypeTag::DateTime, "datetime");
        let fields = vec![
            FieldDescriptor::primary("id"),
            FieldDescriptor::new("created", TypeTag::DateTime),
        ];
        migrator.run("events", &fields).unwrap();
        assert!(driver.ddl[0].contains("\"created\" datetime"));
    }

    #[test]
    fn persisted_name_is_used_for_the_column() {
        let mut driver = MockSchema::new(Platform::Generic);
        let mut migrator = Migrator::new(&mut driver);
        let fields = vec![
            FieldDescriptor::primary("id"),
            FieldDescriptor::new("created", TypeTag::Date).persisted_as("created_on"),
        ];
        migrator.run("events", &fields).unwrap();
        assert!(driver.ddl[0].contains("\"created_on\" date"));
    }
}
