//! Record sinks: copy selected columns of a record into a row writer.
//!
//! A sink is how the join derives its key encodings (master key, slave key)
//! and how it materializes full slave rows into the row chain. The writer
//! decides the byte layout; the sink decides which columns go in and at what
//! type.

use colq_error::{ColqError, Result};
use colq_types::{ColumnType, RecordMetadata, ValueRef};
use smallvec::SmallVec;

use crate::cursor::Record;

/// Destination of a sink copy.
pub trait RowWriter {
    fn put(&mut self, value: ValueRef<'_>) -> Result<()>;
}

/// Copies a fixed projection of a record into a [`RowWriter`].
pub trait RecordSink: Send + Sync {
    fn copy(&self, record: &dyn Record, writer: &mut dyn RowWriter) -> Result<()>;
}

/// One column of a [`ColumnSink`]: source index and the type it is written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkColumn {
    pub index: usize,
    pub target: ColumnType,
}

impl SinkColumn {
    #[must_use]
    pub const fn new(index: usize, target: ColumnType) -> Self {
        Self { index, target }
    }
}

/// Column-list sink with type coercion.
///
/// Supported coercions: `INT` to `LONG` and `DOUBLE`, and `SYMBOL` to
/// `VARCHAR` (through the record's symbol table). Everything else must match
/// exactly. NULL passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSink {
    columns: SmallVec<[SinkColumn; 4]>,
}

impl ColumnSink {
    pub fn new(columns: impl IntoIterator<Item = SinkColumn>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    /// Sink copying every column of `metadata` at its own type.
    #[must_use]
    pub fn all_columns(metadata: &RecordMetadata) -> Self {
        Self::new(
            metadata
                .column_types()
                .enumerate()
                .map(|(index, target)| SinkColumn::new(index, target)),
        )
    }

    /// Key sink over `(column, key type)` pairs.
    #[must_use]
    pub fn keys(columns: &[(usize, ColumnType)]) -> Self {
        Self::new(columns.iter().map(|&(i, t)| SinkColumn::new(i, t)))
    }

    pub fn columns(&self) -> &[SinkColumn] {
        &self.columns
    }

    /// Declared target types, in write order.
    #[must_use]
    pub fn target_types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.target).collect()
    }
}

impl RecordSink for ColumnSink {
    fn copy(&self, record: &dyn Record, writer: &mut dyn RowWriter) -> Result<()> {
        for column in &self.columns {
            let value = record.try_value(column.index)?;
            let value = coerce(record, *column, value)?;
            writer.put(value)?;
        }
        Ok(())
    }
}

fn coerce<'r>(record: &'r dyn Record, column: SinkColumn, value: ValueRef<'r>) -> Result<ValueRef<'r>> {
    let coerced = match (value, column.target) {
        (ValueRef::Null, _)
        | (ValueRef::Boolean(_), ColumnType::Boolean)
        | (ValueRef::Int(_), ColumnType::Int)
        | (ValueRef::Long(_), ColumnType::Long)
        | (ValueRef::Double(_), ColumnType::Double)
        | (ValueRef::Symbol(_), ColumnType::Symbol)
        | (ValueRef::Varchar(_), ColumnType::Varchar) => value,
        (ValueRef::Int(v), ColumnType::Long) => ValueRef::Long(i64::from(v)),
        (ValueRef::Int(v), ColumnType::Double) => ValueRef::Double(f64::from(v)),
        // Negative keys denote a NULL symbol.
        (ValueRef::Symbol(key), ColumnType::Varchar) if key < 0 => ValueRef::Null,
        (ValueRef::Symbol(key), ColumnType::Varchar) => match record.symbol(column.index) {
            Some(text) => ValueRef::Varchar(text),
            None => {
                return Err(ColqError::internal(format!(
                    "symbol key {key} in column {} has no symbol table entry",
                    column.index
                )));
            }
        },
        (other, target) => {
            return Err(ColqError::TypeMismatch {
                expected: target.as_str(),
                actual: other.type_name(),
            });
        }
    };
    Ok(coerced)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use colq_types::{StaticSymbolTable, SymbolTable, Value};

    /// Row-backed record used by unit tests across the crate.
    pub(crate) struct RowRecord {
        pub(crate) values: Vec<Value>,
        pub(crate) symbols: Option<StaticSymbolTable>,
    }

    impl RowRecord {
        pub(crate) fn new(values: Vec<Value>) -> Self {
            Self {
                values,
                symbols: None,
            }
        }
    }

    impl Record for RowRecord {
        fn column_count(&self) -> usize {
            self.values.len()
        }

        fn value(&self, column: usize) -> ValueRef<'_> {
            self.values
                .get(column)
                .map_or(ValueRef::Null, Value::as_value_ref)
        }

        fn symbol(&self, column: usize) -> Option<&str> {
            match self.value(column) {
                ValueRef::Symbol(key) => self.symbols.as_ref()?.value_of(key),
                other => other.as_str(),
            }
        }
    }

    #[derive(Default)]
    struct Collect(Vec<Value>);

    impl RowWriter for Collect {
        fn put(&mut self, value: ValueRef<'_>) -> Result<()> {
            self.0.push(value.to_owned_value());
            Ok(())
        }
    }

    #[test]
    fn int_widens_to_long_and_double() {
        let record = RowRecord::new(vec![Value::Int(7), Value::Int(2)]);
        let sink = ColumnSink::keys(&[(0, ColumnType::Long), (1, ColumnType::Double)]);
        let mut out = Collect::default();
        sink.copy(&record, &mut out).unwrap();
        assert_eq!(out.0, vec![Value::Long(7), Value::Double(2.0)]);
    }

    #[test]
    fn symbol_resolves_to_text_for_varchar_targets() {
        let mut record = RowRecord::new(vec![Value::Symbol(1), Value::Symbol(-1)]);
        record.symbols = Some(StaticSymbolTable::new(["eu", "us"]));
        let sink = ColumnSink::keys(&[(0, ColumnType::Varchar), (1, ColumnType::Varchar)]);
        let mut out = Collect::default();
        sink.copy(&record, &mut out).unwrap();
        assert_eq!(out.0, vec![Value::from("us"), Value::Null]);
    }

    #[test]
    fn unresolvable_symbol_is_an_error() {
        let record = RowRecord::new(vec![Value::Symbol(3)]);
        let sink = ColumnSink::keys(&[(0, ColumnType::Varchar)]);
        let err = sink.copy(&record, &mut Collect::default()).unwrap_err();
        assert!(matches!(err, ColqError::Internal(_)), "case=unresolved_symbol err={err}");
    }

    #[test]
    fn narrowing_is_rejected() {
        let record = RowRecord::new(vec![Value::Long(1)]);
        let sink = ColumnSink::keys(&[(0, ColumnType::Int)]);
        let err = sink.copy(&record, &mut Collect::default()).unwrap_err();
        assert!(matches!(
            err,
            ColqError::TypeMismatch {
                expected: "INT",
                actual: "LONG"
            }
        ));
    }

    #[test]
    fn missing_column_is_reported() {
        let record = RowRecord::new(vec![Value::Long(1)]);
        let sink = ColumnSink::keys(&[(2, ColumnType::Long)]);
        let err = sink.copy(&record, &mut Collect::default()).unwrap_err();
        assert!(matches!(err, ColqError::ColumnOutOfRange { index: 2, count: 1 }));
    }

    #[test]
    fn all_columns_follows_metadata() {
        let metadata = RecordMetadata::from_pairs([("a", ColumnType::Long), ("b", ColumnType::Symbol)]);
        let sink = ColumnSink::all_columns(&metadata);
        assert_eq!(sink.target_types(), vec![ColumnType::Long, ColumnType::Symbol]);
        assert_eq!(sink.columns()[1].index, 1);
    }
}
