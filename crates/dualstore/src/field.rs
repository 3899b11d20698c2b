//! Field descriptors: the model-side view of a column that the schema
//! migrator consumes.

use serde::{Deserialize, Serialize};

/// The declared logical type of a field, before platform type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Integer,
    Float,
    Boolean,
    String,
    Text,
    Date,
    DateTime,
    Binary,
}

/// What the field is for, beyond its scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ordinary data column.
    Plain,
    /// Foreign key into another table.
    Reference,
    /// The primary key.
    Primary,
}

/// One column as the model declares it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Name used in conditions and row maps.
    pub short_name: String,
    /// Column name in the database, when it differs from `short_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted_name: Option<String>,
    pub declared_type: TypeTag,
    pub role: Role,
    /// Length cap for `String` fields, in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub read_only: bool,
}

impl FieldDescriptor {
    pub fn new(short_name: impl Into<String>, declared_type: TypeTag) -> Self {
        Self {
            short_name: short_name.into(),
            persisted_name: None,
            declared_type,
            role: Role::Plain,
            size: None,
            mandatory: false,
            read_only: false,
        }
    }

    pub fn primary(short_name: impl Into<String>) -> Self {
        let mut f = Self::new(short_name, TypeTag::Integer);
        f.role = Role::Primary;
        f.mandatory = true;
        f
    }

    pub fn reference(short_name: impl Into<String>) -> Self {
        let mut f = Self::new(short_name, TypeTag::Integer);
        f.role = Role::Reference;
        f
    }

    pub fn persisted_as(mut self, name: impl Into<String>) -> Self {
        self.persisted_name = Some(name.into());
        self
    }

    pub fn sized(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// The column name as stored.
    pub fn column_name(&self) -> &str {
        self.persisted_name.as_deref().unwrap_or(&self.short_name)
    }

    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }
}
