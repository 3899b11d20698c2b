//! The in-memory backend: a row store plus a condition interpreter with
//! the same matching semantics as the rendered SQL.

pub mod interp;
pub mod query;
pub mod store;

pub use interp::{evaluate, evaluate_with};
pub use query::{Aggregate, MemoryQuery};
pub use store::{MemoryStore, Row, StoreView, row};
