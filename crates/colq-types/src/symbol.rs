//! Symbol (dictionary) tables.
//!
//! Symbol columns store an `i32` key per row; the text lives in a table owned
//! by whoever produced the row. Readers that keep rows around after the
//! producer moves on (the hash-join row chain, for one) hold on to the
//! producer's [`SymbolTableSource`] to turn keys back into text.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Key → text lookup for one symbol column.
pub trait SymbolTable: Send + Sync {
    fn value_of(&self, key: i32) -> Option<&str>;
}

/// Per-column symbol tables of a row producer.
pub trait SymbolTableSource: Send + Sync {
    fn symbol_table(&self, column: usize) -> Option<&dyn SymbolTable>;
}

/// Shared handle to a producer's symbol tables.
pub type SymbolResolver = Arc<dyn SymbolTableSource>;

/// Immutable symbol table backed by a vector; key `i` maps to `values[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSymbolTable {
    values: Vec<String>,
}

impl StaticSymbolTable {
    pub fn new<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Key of `value`, if present.
    #[must_use]
    pub fn key_of(&self, value: &str) -> Option<i32> {
        self.values
            .iter()
            .position(|v| v == value)
            .and_then(|p| i32::try_from(p).ok())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SymbolTable for StaticSymbolTable {
    fn value_of(&self, key: i32) -> Option<&str> {
        usize::try_from(key)
            .ok()
            .and_then(|k| self.values.get(k))
            .map(String::as_str)
    }
}

/// Column-indexed collection of [`StaticSymbolTable`]s.
#[derive(Debug, Clone, Default)]
pub struct SymbolTables {
    by_column: BTreeMap<usize, StaticSymbolTable>,
}

impl SymbolTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table(mut self, column: usize, table: StaticSymbolTable) -> Self {
        self.by_column.insert(column, table);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }
}

impl SymbolTableSource for SymbolTables {
    fn symbol_table(&self, column: usize) -> Option<&dyn SymbolTable> {
        self.by_column
            .get(&column)
            .map(|t| t as &dyn SymbolTable)
    }
}
