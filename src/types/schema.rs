//! Column and table schema definitions.

use super::Scalar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Bool,
    /// Embedding column; the declared dimension is enforced on every write.
    Vector(usize),
}

impl ColumnType {
    /// Whether `value` satisfies this column's type (and, for vectors, its
    /// declared dimension).
    pub fn accepts(&self, value: &Scalar) -> bool {
        match (self, value) {
            (_, Scalar::Null) => true,
            (ColumnType::Int, Scalar::Int(_)) => true,
            (ColumnType::Float, Scalar::Float(_)) => true,
            (ColumnType::Float, Scalar::Int(_)) => true,
            (ColumnType::Text, Scalar::Text(_)) => true,
            (ColumnType::Bool, Scalar::Bool(_)) => true,
            (ColumnType::Vector(dim), Scalar::Vector(v)) => v.len() == *dim,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Validate a candidate row's values against this schema: every
    /// non-nullable column must be present and non-null, and every present
    /// value must match its column's declared type/dimension. Unknown
    /// columns are rejected.
    pub fn validate(&self, values: &super::RowValues) -> Result<(), String> {
        for (name, _) in values.iter() {
            if self.column(name).is_none() {
                return Err(format!("unknown column '{name}'"));
            }
        }
        for col in &self.columns {
            match values.get(&col.name) {
                Some(v) => {
                    if !col.ty.accepts(v) {
                        return Err(format!(
                            "column '{}' expects {:?}, got {}",
                            col.name,
                            col.ty,
                            v.type_name()
                        ));
                    }
                    if v.is_null() && !col.nullable {
                        return Err(format!("column '{}' is not nullable", col.name));
                    }
                }
                None => {
                    if !col.nullable {
                        return Err(format!("missing required column '{}'", col.name));
                    }
                }
            }
        }
        Ok(())
    }
}
