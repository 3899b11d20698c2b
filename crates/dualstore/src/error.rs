//! Error types for dualstore

use thiserror::Error;

/// Result type alias for dualstore operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types for rendering, evaluation, and schema operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A template referenced a tag with no matching argument
    #[error("Unknown tag '{tag}' in template: {template}")]
    UnknownTag { template: String, tag: String },

    /// A template argument had the wrong shape for its token
    #[error("Template error in '{template}': {message}")]
    Template { template: String, message: String },

    /// Malformed condition (bad operator spelling, bad pattern delimiter, ...)
    #[error("Condition error: {0}")]
    Condition(String),

    /// Unknown relation name in a reference path
    #[error("Unknown relation '{relation}' in reference path '{path}'")]
    UnknownRelation { relation: String, path: String },

    /// Evaluating a reference sub-condition without store context
    #[error("Reference condition on '{0}' requires a store view")]
    NoStoreView(String),

    /// Statement execution failure, wrapped with the rendered SQL and binds
    #[error("Execution error: {message}\n  sql: {sql}\n  params: {params}")]
    Execution {
        message: String,
        sql: String,
        params: String,
    },

    /// Corrupt or double-encoded binary payload
    #[error("Binary encoding error: {0}")]
    Encoding(String),

    /// Transaction protocol violation (commit without begin, rollback failure)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Schema migration failure
    #[error("Migration error on table '{table}': {message}")]
    Migration { table: String, message: String },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Row or table not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Create an unknown-tag error for a template
    pub fn unknown_tag(template: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::UnknownTag {
            template: template.into(),
            tag: tag.into(),
        }
    }

    /// Create a template error
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a migration error for a table
    pub fn migration(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Wrap a driver failure with the statement that produced it
    pub fn execution(
        message: impl Into<String>,
        sql: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            sql: sql.into(),
            params: params.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a transaction protocol error
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}
