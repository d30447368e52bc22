//! Record schemas and table identity.

use serde::{Deserialize, Serialize};

use crate::value::ColumnType;

/// Name and type of one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered column list describing the records a cursor produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    columns: Vec<ColumnMetadata>,
}

impl RecordMetadata {
    #[must_use]
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self { columns }
    }

    /// Build metadata from `(name, type)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, ColumnType)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, ty)| ColumnMetadata::new(name, ty))
                .collect(),
        )
    }

    /// Metadata of a join output: master columns followed by slave columns.
    #[must_use]
    pub fn join(master: &Self, slave: &Self) -> Self {
        let mut columns = Vec::with_capacity(master.len() + slave.len());
        columns.extend(master.columns.iter().cloned());
        columns.extend(slave.columns.iter().cloned());
        Self { columns }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn column(&self, index: usize) -> Option<&ColumnMetadata> {
        self.columns.get(index)
    }

    #[must_use]
    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.columns.get(index).map(|c| c.column_type)
    }

    /// Position of the first column called `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Column types in order.
    pub fn column_types(&self) -> impl Iterator<Item = ColumnType> + '_ {
        self.columns.iter().map(|c| c.column_type)
    }
}

/// Identity of a physical table, used by row-id update capability checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableToken {
    pub table_name: String,
    pub table_id: u32,
}

impl TableToken {
    pub fn new(table_name: impl Into<String>, table_id: u32) -> Self {
        Self {
            table_name: table_name.into(),
            table_id,
        }
    }
}
