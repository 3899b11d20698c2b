//! # dualstore
//!
//! A dual-backend data-access layer: describe records and filter conditions
//! once, then run them against a relational backend (rendered to
//! dialect-correct parameterized SQL) or an in-memory row store (interpreted
//! directly) with identical semantics.
//!
//! ## Pieces
//!
//! - **Expressions** ([`expr`]): composable SQL templates with three token
//!   kinds (bind parameter, hard-escaped identifier, soft-escaped
//!   identifier), rendered through an explicit [`expr::RenderContext`]
//! - **Queries** ([`query`]): clause-bucket builders for select / insert /
//!   update / delete / truncate
//! - **Conditions** ([`condition`]): a pure-data boolean tree with
//!   simplification and De Morgan negation, consumed by both backends
//! - **Reference paths** ([`refs`]): `relation/field` condition sugar,
//!   rewritten once into backend-neutral sub-queries
//! - **SQL rendering** ([`sql_render`]): condition tree → WHERE fragment
//!   with bound parameters
//! - **In-memory backend** ([`memory`]): row store, interpreter, and a
//!   filter/sort/limit/aggregate pipeline matching the SQL path row for row
//! - **Driver seam** ([`driver`]): blocking execution plus nesting-counted
//!   transactions; the crate never opens a connection itself
//! - **Migration** ([`migrate`]): name-based schema diffing with
//!   bidirectional type maps
//!
//! ## Example
//!
//! ```
//! use dualstore::condition::Condition;
//! use dualstore::memory::{MemoryQuery, MemoryStore, row};
//! use dualstore::platform::Platform;
//! use dualstore::sql_render;
//! use dualstore::value::Value;
//!
//! let cond = Condition::and_grouped(
//!     vec![Condition::eq("status", "active")],
//!     vec![Condition::eq("role", "admin"), Condition::eq("role", "owner")],
//! );
//!
//! // SQL backend
//! let stmt = sql_render::render(&cond, "users", Platform::Generic)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(stmt.sql, "\"status\" = :a and (\"role\" = :b or \"role\" = :c)");
//!
//! // In-memory backend, same tree
//! let mut store = MemoryStore::new();
//! store
//!     .insert("users", row([
//!         ("status", Value::Str("active".into())),
//!         ("role", Value::Str("owner".into())),
//!     ]))
//!     .unwrap();
//! let rows = MemoryQuery::new(&store, "users").filter(cond).fetch().unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

pub mod condition;
pub mod driver;
pub mod error;
pub mod expr;
pub mod field;
pub mod memory;
pub mod migrate;
pub mod platform;
pub mod query;
pub mod refs;
pub mod sql_render;
pub mod value;

pub use condition::{CondValue, Condition, Junction, Operator};
pub use driver::{ColumnInfo, Connection, Driver, SchemaDriver};
pub use error::{StoreError, StoreResult};
pub use expr::{Expr, ExprArg, RenderContext, Statement};
pub use field::{FieldDescriptor, Role, TypeTag};
pub use memory::{MemoryQuery, MemoryStore, Row, StoreView};
pub use migrate::{MigrationReport, Migrator, TypeMap};
pub use platform::Platform;
pub use query::{JoinKind, Query, QueryMode, SortDir};
pub use refs::{Relation, RelationMap, SubQuery, SubQueryKind, expand};
pub use value::Value;
