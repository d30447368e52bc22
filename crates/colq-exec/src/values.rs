//! In-memory row source over a fixed, shared row set.

use std::sync::Arc;

use colq_error::{ColqError, Result};
use colq_types::{
    ColumnType, RecordMetadata, SymbolResolver, SymbolTables, TableToken, Value, ValueRef,
};
use tracing::trace;

use crate::context::ExecutionContext;
use crate::cursor::{Record, RecordCursor, RecordCursorFactory, ScanDirection};
use crate::plan::PlanSink;

/// Leaf factory producing the same rows on every execution.
#[derive(Debug, Clone)]
pub struct ValuesRecordCursorFactory {
    metadata: RecordMetadata,
    rows: Arc<[Vec<Value>]>,
    symbols: Option<Arc<SymbolTables>>,
    table: Option<TableToken>,
    scan_direction: ScanDirection,
    followed_order_by_advice: bool,
    is_closed: bool,
}

impl ValuesRecordCursorFactory {
    /// Every row must have one value per column, each NULL or of the
    /// column's type.
    pub fn new(metadata: RecordMetadata, rows: Vec<Vec<Value>>) -> Result<Self> {
        for row in &rows {
            if row.len() != metadata.len() {
                return Err(ColqError::invalid_config(format!(
                    "values row has {} cells, metadata declares {}",
                    row.len(),
                    metadata.len()
                )));
            }
            for (value, column_type) in row.iter().zip(metadata.column_types()) {
                check_cell(value, column_type)?;
            }
        }
        Ok(Self {
            metadata,
            rows: rows.into(),
            symbols: None,
            table: None,
            scan_direction: ScanDirection::Forward,
            followed_order_by_advice: false,
            is_closed: false,
        })
    }

    #[must_use]
    pub fn with_symbol_tables(mut self, symbols: SymbolTables) -> Self {
        self.symbols = Some(Arc::new(symbols));
        self
    }

    /// Rows carry identities of `table`.
    #[must_use]
    pub fn with_table(mut self, table: TableToken) -> Self {
        self.table = Some(table);
        self
    }

    #[must_use]
    pub fn with_scan_direction(mut self, scan_direction: ScanDirection) -> Self {
        self.scan_direction = scan_direction;
        self
    }

    #[must_use]
    pub fn with_order_by_advice(mut self, followed: bool) -> Self {
        self.followed_order_by_advice = followed;
        self
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }
}

impl RecordCursorFactory for ValuesRecordCursorFactory {
    fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    fn get_cursor(&mut self, _ctx: &ExecutionContext) -> Result<Box<dyn RecordCursor>> {
        if self.is_closed {
            return Err(ColqError::FactoryClosed);
        }
        Ok(Box::new(ValuesRecordCursor {
            rows: Arc::clone(&self.rows),
            column_count: self.metadata.len(),
            symbols: self
                .symbols
                .as_ref()
                .map(|s| Arc::clone(s) as SymbolResolver),
            current: None,
            next: 0,
            is_closed: false,
        }))
    }

    fn followed_order_by_advice(&self) -> bool {
        self.followed_order_by_advice
    }

    fn scan_direction(&self) -> ScanDirection {
        self.scan_direction
    }

    fn supports_update_row_id(&self, table: &TableToken) -> bool {
        self.table.as_ref() == Some(table)
    }

    fn to_plan(&self, sink: &mut PlanSink) {
        sink.node_type("Values").attr("rows", self.rows.len());
    }

    fn close(&mut self) {
        if !self.is_closed {
            trace!(rows = self.rows.len(), "values factory closed");
            self.is_closed = true;
        }
    }
}

/// Cursor of a [`ValuesRecordCursorFactory`]; the cursor is its own record.
pub struct ValuesRecordCursor {
    rows: Arc<[Vec<Value>]>,
    column_count: usize,
    symbols: Option<SymbolResolver>,
    current: Option<usize>,
    next: usize,
    is_closed: bool,
}

impl RecordCursor for ValuesRecordCursor {
    fn has_next(&mut self) -> Result<bool> {
        if self.is_closed {
            return Err(ColqError::CursorClosed);
        }
        if self.next < self.rows.len() {
            self.current = Some(self.next);
            self.next += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn record(&self) -> &dyn Record {
        self
    }

    fn to_top(&mut self) -> Result<()> {
        if self.is_closed {
            return Err(ColqError::CursorClosed);
        }
        self.current = None;
        self.next = 0;
        Ok(())
    }

    fn size(&mut self) -> Result<Option<u64>> {
        if self.is_closed {
            return Err(ColqError::CursorClosed);
        }
        Ok(Some(self.rows.len() as u64))
    }

    fn symbol_tables(&self) -> Option<SymbolResolver> {
        self.symbols.clone()
    }

    fn close(&mut self) {
        self.is_closed = true;
        self.current = None;
    }
}

impl Record for ValuesRecordCursor {
    fn column_count(&self) -> usize {
        self.column_count
    }

    fn value(&self, column: usize) -> ValueRef<'_> {
        self.current
            .and_then(|row| self.rows[row].get(column))
            .map_or(ValueRef::Null, Value::as_value_ref)
    }

    fn symbol(&self, column: usize) -> Option<&str> {
        match self.value(column) {
            ValueRef::Symbol(key) => self.symbols.as_deref()?.symbol_table(column)?.value_of(key),
            other => other.as_str(),
        }
    }
}

fn check_cell(value: &Value, column_type: ColumnType) -> Result<()> {
    let matches = matches!(
        (value, column_type),
        (Value::Null, _)
            | (Value::Boolean(_), ColumnType::Boolean)
            | (Value::Int(_), ColumnType::Int)
            | (Value::Long(_), ColumnType::Long)
            | (Value::Double(_), ColumnType::Double)
            | (Value::Symbol(_), ColumnType::Symbol)
            | (Value::Varchar(_), ColumnType::Varchar)
    );
    if matches {
        Ok(())
    } else {
        Err(ColqError::TypeMismatch {
            expected: column_type.as_str(),
            actual: value.as_value_ref().type_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colq_types::StaticSymbolTable;

    fn factory() -> ValuesRecordCursorFactory {
        let metadata = RecordMetadata::from_pairs([("id", ColumnType::Long), ("venue", ColumnType::Symbol)]);
        ValuesRecordCursorFactory::new(
            metadata,
            vec![
                vec![Value::Long(1), Value::Symbol(0)],
                vec![Value::Long(2), Value::Null],
            ],
        )
        .unwrap()
        .with_symbol_tables(SymbolTables::new().with_table(1, StaticSymbolTable::new(["lse"])))
    }

    #[test]
    fn cursor_iterates_rewinds_and_resolves_symbols() {
        let mut factory = factory();
        let mut cursor = factory.get_cursor(&ExecutionContext::default()).unwrap();
        assert_eq!(cursor.size().unwrap(), Some(2));

        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.record().value(0), ValueRef::Long(1));
        assert_eq!(cursor.record().symbol(1), Some("lse"));
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.record().value(1), ValueRef::Null);
        assert!(!cursor.has_next().unwrap());
        assert!(!cursor.has_next().unwrap(), "case=exhausted_cursor_stays_exhausted");

        cursor.to_top().unwrap();
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.record().value(0), ValueRef::Long(1));

        let tables = cursor.symbol_tables().unwrap();
        assert_eq!(tables.symbol_table(1).and_then(|t| t.value_of(0)), Some("lse"));
    }

    #[test]
    fn closed_cursor_and_factory_refuse_work() {
        let mut factory = factory();
        let mut cursor = factory.get_cursor(&ExecutionContext::default()).unwrap();
        cursor.close();
        cursor.close();
        assert!(matches!(cursor.has_next(), Err(ColqError::CursorClosed)));
        assert!(matches!(cursor.to_top(), Err(ColqError::CursorClosed)));

        factory.close();
        assert!(factory.is_closed());
        assert!(matches!(
            factory.get_cursor(&ExecutionContext::default()),
            Err(ColqError::FactoryClosed)
        ));
    }

    #[test]
    fn rows_are_validated_against_metadata() {
        let metadata = RecordMetadata::from_pairs([("id", ColumnType::Long)]);
        let err = ValuesRecordCursorFactory::new(metadata.clone(), vec![vec![Value::Int(1)]]).unwrap_err();
        assert!(matches!(err, ColqError::TypeMismatch { expected: "LONG", actual: "INT" }));

        let err = ValuesRecordCursorFactory::new(metadata, vec![vec![]]).unwrap_err();
        assert!(matches!(err, ColqError::InvalidConfig(_)), "case=short_row err={err}");
    }

    #[test]
    fn capabilities_and_plan() {
        let table = TableToken::new("trades", 7);
        let factory = factory()
            .with_table(table.clone())
            .with_scan_direction(ScanDirection::Backward)
            .with_order_by_advice(true);
        assert!(factory.supports_update_row_id(&table));
        assert!(!factory.supports_update_row_id(&TableToken::new("quotes", 8)));
        assert_eq!(factory.scan_direction(), ScanDirection::Backward);
        assert!(factory.followed_order_by_advice());

        let plan = crate::plan::explain(&factory);
        assert_eq!(plan.node_type, "Values");
        assert_eq!(plan.attr("rows"), Some("2"));
    }
}
