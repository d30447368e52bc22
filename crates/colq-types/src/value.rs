//! Column types and cell values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Int,
    Long,
    Double,
    /// Dictionary-encoded text; the stored value is an `i32` key into the
    /// column's symbol table.
    Symbol,
    Varchar,
}

impl ColumnType {
    /// Stable label used in errors and plans.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Double => "DOUBLE",
            Self::Symbol => "SYMBOL",
            Self::Varchar => "VARCHAR",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed view of a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    /// Symbol key; resolve through [`crate::SymbolTable`].
    Symbol(i32),
    Varchar(&'a str),
}

impl<'a> ValueRef<'a> {
    /// Label of the value's type, `"NULL"` for nulls.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Boolean(_) => ColumnType::Boolean.as_str(),
            Self::Int(_) => ColumnType::Int.as_str(),
            Self::Long(_) => ColumnType::Long.as_str(),
            Self::Double(_) => ColumnType::Double.as_str(),
            Self::Symbol(_) => ColumnType::Symbol.as_str(),
            Self::Varchar(_) => ColumnType::Varchar.as_str(),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Copy the referenced data into an owned [`Value`].
    #[must_use]
    pub fn to_owned_value(&self) -> Value {
        match *self {
            Self::Null => Value::Null,
            Self::Boolean(v) => Value::Boolean(v),
            Self::Int(v) => Value::Int(v),
            Self::Long(v) => Value::Long(v),
            Self::Double(v) => Value::Double(v),
            Self::Symbol(v) => Value::Symbol(v),
            Self::Varchar(v) => Value::Varchar(v.to_owned()),
        }
    }

    /// Integer view for `Int` and `Long` cells.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v as i64),
            Self::Long(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> Option<&'a str> {
        match *self {
            Self::Varchar(v) => Some(v),
            _ => None,
        }
    }
}

/// Owned cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Symbol(i32),
    Varchar(String),
}

impl Value {
    #[must_use]
    pub fn as_value_ref(&self) -> ValueRef<'_> {
        match self {
            Self::Null => ValueRef::Null,
            Self::Boolean(v) => ValueRef::Boolean(*v),
            Self::Int(v) => ValueRef::Int(*v),
            Self::Long(v) => ValueRef::Long(*v),
            Self::Double(v) => ValueRef::Double(*v),
            Self::Symbol(v) => ValueRef::Symbol(*v),
            Self::Varchar(v) => ValueRef::Varchar(v),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Varchar(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Varchar(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
