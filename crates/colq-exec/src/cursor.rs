//! Iterator-tree (volcano) operator contracts.
//!
//! A [`RecordCursorFactory`] is a node of the compiled operator tree. Each
//! execution asks it for a [`RecordCursor`], which the consumer drives with
//! `has_next()` and reads through `record()`. Factories expose a small set of
//! capability flags with pass-through defaults; operators that inherit
//! ordering or row identity from a child override them.

use colq_error::{ColqError, Result};
use colq_types::{RecordMetadata, SymbolResolver, TableToken, ValueRef};

use crate::context::ExecutionContext;
use crate::plan::PlanSink;

/// Read access to the row a cursor is positioned on.
pub trait Record {
    fn column_count(&self) -> usize;

    /// Cell at `column`. Out-of-range columns read as NULL; use
    /// [`Record::try_value`] where a bad index must surface as an error.
    fn value(&self, column: usize) -> ValueRef<'_>;

    /// Text of a symbol or varchar cell.
    fn symbol(&self, column: usize) -> Option<&str> {
        self.value(column).as_str()
    }

    fn try_value(&self, column: usize) -> Result<ValueRef<'_>> {
        let count = self.column_count();
        if column >= count {
            return Err(ColqError::ColumnOutOfRange {
                index: column,
                count,
            });
        }
        Ok(self.value(column))
    }
}

/// Row iterator produced by a factory for one execution.
pub trait RecordCursor: Send {
    /// Advance to the next row.
    fn has_next(&mut self) -> Result<bool>;

    /// The current row. The returned view is stable; its contents move as
    /// the cursor advances.
    fn record(&self) -> &dyn Record;

    /// Rewind to before the first row.
    fn to_top(&mut self) -> Result<()>;

    /// Total row count, `None` when it cannot be known without a scan the
    /// cursor does not want to perform.
    fn size(&mut self) -> Result<Option<u64>> {
        Ok(None)
    }

    /// Symbol tables backing the symbol columns of [`RecordCursor::record`].
    fn symbol_tables(&self) -> Option<SymbolResolver> {
        None
    }

    /// Release the cursor. Idempotent, never fails.
    fn close(&mut self);
}

/// Direction in which a factory produces rows relative to its natural order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    #[default]
    Forward,
    Backward,
    Other,
}

/// Operator-tree node producing cursors.
pub trait RecordCursorFactory: Send {
    fn metadata(&self) -> &RecordMetadata;

    fn get_cursor(&mut self, ctx: &ExecutionContext) -> Result<Box<dyn RecordCursor>>;

    /// Whether the produced rows honour the ORDER BY advice given at
    /// compile time.
    fn followed_order_by_advice(&self) -> bool {
        false
    }

    fn scan_direction(&self) -> ScanDirection {
        ScanDirection::Forward
    }

    /// Whether rows carry identities that an UPDATE of `table` can target.
    fn supports_update_row_id(&self, _table: &TableToken) -> bool {
        false
    }

    fn record_cursor_supports_random_access(&self) -> bool {
        false
    }

    /// Describe this node (and its children) for EXPLAIN.
    fn to_plan(&self, sink: &mut PlanSink);

    /// Release the factory and its children. Idempotent.
    fn close(&mut self);
}

/// Record with no columns; stands in for a cursor that has been closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRecord;

impl Record for EmptyRecord {
    fn column_count(&self) -> usize {
        0
    }

    fn value(&self, _column: usize) -> ValueRef<'_> {
        ValueRef::Null
    }
}
