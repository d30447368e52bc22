//! Composite record of a join: master columns first, then slave columns.

use colq_types::{SymbolResolver, SymbolTable, SymbolTableSource, ValueRef};

use crate::cursor::Record;

/// View over a master row and the slave row it is paired with.
///
/// Columns `0..split` read from the master, `split..` from the slave at
/// `column - split`. Nothing is copied.
#[derive(Clone, Copy)]
pub struct JoinRecord<'a> {
    split: usize,
    master: &'a dyn Record,
    slave: &'a dyn Record,
}

impl<'a> JoinRecord<'a> {
    pub fn of(split: usize, master: &'a dyn Record, slave: &'a dyn Record) -> Self {
        Self {
            split,
            master,
            slave,
        }
    }

    /// Point at a different pair of rows.
    pub fn rebind(&mut self, master: &'a dyn Record, slave: &'a dyn Record) {
        self.master = master;
        self.slave = slave;
    }

    #[must_use]
    pub fn split(&self) -> usize {
        self.split
    }

    /// Cell at `column` with the lifetime of the underlying rows.
    pub fn get(&self, column: usize) -> ValueRef<'a> {
        if column < self.split {
            self.master.value(column)
        } else {
            self.slave.value(column - self.split)
        }
    }

    pub fn get_symbol(&self, column: usize) -> Option<&'a str> {
        if column < self.split {
            self.master.symbol(column)
        } else {
            self.slave.symbol(column - self.split)
        }
    }
}

impl Record for JoinRecord<'_> {
    fn column_count(&self) -> usize {
        self.split + self.slave.column_count()
    }

    fn value(&self, column: usize) -> ValueRef<'_> {
        self.get(column)
    }

    fn symbol(&self, column: usize) -> Option<&str> {
        self.get_symbol(column)
    }
}

/// Symbol tables of a join output, routed to the side owning the column.
pub struct JoinSymbolTables {
    master: Option<SymbolResolver>,
    slave: Option<SymbolResolver>,
    split: usize,
}

impl JoinSymbolTables {
    pub fn new(master: Option<SymbolResolver>, slave: Option<SymbolResolver>, split: usize) -> Self {
        Self {
            master,
            slave,
            split,
        }
    }
}

impl SymbolTableSource for JoinSymbolTables {
    fn symbol_table(&self, column: usize) -> Option<&dyn SymbolTable> {
        if column < self.split {
            self.master.as_deref()?.symbol_table(column)
        } else {
            self.slave.as_deref()?.symbol_table(column - self.split)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sink::tests::RowRecord;
    use colq_types::{StaticSymbolTable, SymbolTables, Value};

    #[test]
    fn columns_route_by_split() {
        let master = RowRecord::new(vec![Value::Long(1), Value::from("a")]);
        let slave = RowRecord::new(vec![Value::Long(1), Value::from("x"), Value::Double(0.5)]);
        let record = JoinRecord::of(2, &master, &slave);

        assert_eq!(record.column_count(), 5);
        assert_eq!(record.value(1), ValueRef::Varchar("a"));
        assert_eq!(record.value(2), ValueRef::Long(1));
        assert_eq!(record.value(4), ValueRef::Double(0.5));
        assert_eq!(record.value(9), ValueRef::Null, "case=past_slave_columns");
        assert_eq!(record.symbol(3), Some("x"));
    }

    #[test]
    fn rebind_switches_rows() {
        let master = RowRecord::new(vec![Value::Long(1)]);
        let first = RowRecord::new(vec![Value::from("x")]);
        let second = RowRecord::new(vec![Value::from("y")]);
        let mut record = JoinRecord::of(1, &master, &first);
        record.rebind(&master, &second);
        assert_eq!(record.get(1), ValueRef::Varchar("y"));
    }

    #[test]
    fn symbol_tables_are_shifted_for_slave_columns() {
        let master: SymbolResolver =
            Arc::new(SymbolTables::new().with_table(0, StaticSymbolTable::new(["m0"])));
        let slave: SymbolResolver =
            Arc::new(SymbolTables::new().with_table(1, StaticSymbolTable::new(["s0", "s1"])));
        let tables = JoinSymbolTables::new(Some(master), Some(slave), 2);

        assert_eq!(tables.symbol_table(0).and_then(|t| t.value_of(0)), Some("m0"));
        assert!(tables.symbol_table(1).is_none());
        assert!(tables.symbol_table(2).is_none());
        assert_eq!(tables.symbol_table(3).and_then(|t| t.value_of(1)), Some("s1"));

        let no_slave = JoinSymbolTables::new(None, None, 2);
        assert!(no_slave.symbol_table(3).is_none());
    }
}
