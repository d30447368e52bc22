//! Paged store of slave rows, linked into one chain per join key.
//!
//! Every stored row is a node in [`PagedMemory`]; its byte offset is its
//! locator. The first node of a chain (the head) additionally tracks the
//! chain's tail and row count, so appends stay O(1) and keep insertion
//! order.
//!
//! ```text
//! node:  next u64 | tail u64 | count u64 | payload_len u32 | payload
//! cell:  tag u8 (0 = NULL, 1 = value) | fixed-width or u32-prefixed bytes
//! ```
//!
//! Only the head's `tail` and `count` are meaningful. Reading is a cursor
//! walk: [`RecordChain::position_at`] then [`RecordChain::advance`]; the
//! chain itself is the [`Record`] of the row it is positioned on.

use std::sync::Arc;

use colq_error::{ColqError, Result};
use colq_types::{ColumnType, RecordMetadata, SymbolResolver, Value, ValueRef};
use smallvec::SmallVec;

use crate::cursor::Record;
use crate::join_key_map::NO_LOCATOR;
use crate::paged::PagedMemory;
use crate::sink::{RecordSink, RowWriter};

const NEXT_OFFSET: u64 = 0;
const TAIL_OFFSET: u64 = 8;
const COUNT_OFFSET: u64 = 16;
const PAYLOAD_LEN_OFFSET: usize = 24;
const HEADER_LEN: usize = 28;

const CELL_NULL: u8 = 0;
const CELL_VALUE: u8 = 1;

pub struct RecordChain {
    memory: PagedMemory,
    column_types: SmallVec<[ColumnType; 8]>,
    sink: Arc<dyn RecordSink>,
    scratch: Vec<u8>,
    read_buf: Vec<u8>,
    row: Vec<Value>,
    has_row: bool,
    next_locator: u64,
    symbol_resolver: Option<SymbolResolver>,
    is_open: bool,
}

impl RecordChain {
    /// Chain storing rows shaped like `metadata`, written through `sink`.
    pub fn try_new(
        metadata: &RecordMetadata,
        sink: Arc<dyn RecordSink>,
        page_size: usize,
        max_pages: usize,
    ) -> Result<Self> {
        let column_types: SmallVec<[ColumnType; 8]> = metadata.column_types().collect();
        if column_types.is_empty() {
            return Err(ColqError::invalid_config("row chain needs at least one column"));
        }
        Ok(Self {
            memory: PagedMemory::try_new(page_size, max_pages)?,
            row: Vec::with_capacity(column_types.len()),
            column_types,
            sink,
            scratch: Vec::with_capacity(256),
            read_buf: Vec::with_capacity(256),
            has_row: false,
            next_locator: NO_LOCATOR,
            symbol_resolver: None,
            is_open: true,
        })
    }

    /// Store `record` at the end of the chain headed at `head`, or start a
    /// new chain when `head` is `None`. Returns the head locator.
    ///
    /// A failed append leaves every existing chain intact.
    pub fn append(&mut self, record: &dyn Record, head: Option<u64>) -> Result<u64> {
        if !self.is_open {
            return Err(ColqError::internal("row chain is closed"));
        }
        self.scratch.clear();
        self.scratch.resize(HEADER_LEN, 0);
        {
            let mut writer = ChainRowWriter {
                buf: &mut self.scratch,
                column_types: &self.column_types,
                column: 0,
            };
            self.sink.copy(record, &mut writer)?;
            writer.finish()?;
        }
        let payload_len = u32::try_from(self.scratch.len() - HEADER_LEN).map_err(|_| {
            ColqError::LimitExceeded {
                resource: "hash join row bytes",
                limit: u32::MAX as usize,
            }
        })?;

        let locator = self.memory.len();
        let (tail, count) = match head {
            None => (locator, 1_u64),
            Some(_) => (NO_LOCATOR, 0),
        };
        self.scratch[0..8].copy_from_slice(&NO_LOCATOR.to_le_bytes());
        self.scratch[8..16].copy_from_slice(&tail.to_le_bytes());
        self.scratch[16..24].copy_from_slice(&count.to_le_bytes());
        self.scratch[PAYLOAD_LEN_OFFSET..HEADER_LEN].copy_from_slice(&payload_len.to_le_bytes());
        self.memory.append(&self.scratch)?;

        let Some(head) = head else {
            return Ok(locator);
        };
        let old_tail = self.memory.read_u64(head + TAIL_OFFSET)?;
        let old_count = self.memory.read_u64(head + COUNT_OFFSET)?;
        self.memory.write_u64(old_tail + NEXT_OFFSET, locator)?;
        self.memory.write_u64(head + TAIL_OFFSET, locator)?;
        self.memory.write_u64(head + COUNT_OFFSET, old_count + 1)?;
        Ok(head)
    }

    /// Rows in the chain headed at `head`.
    pub fn chain_len(&self, head: u64) -> Result<u64> {
        if head == NO_LOCATOR {
            return Ok(0);
        }
        self.memory.read_u64(head + COUNT_OFFSET)
    }

    /// Position before the first row of the chain headed at `head`.
    pub fn position_at(&mut self, head: u64) {
        self.next_locator = head;
        self.has_row = false;
    }

    /// Move to the next row of the current chain.
    pub fn advance(&mut self) -> Result<bool> {
        if self.next_locator == NO_LOCATOR {
            self.has_row = false;
            return Ok(false);
        }
        let locator = self.next_locator;
        let mut header = [0_u8; HEADER_LEN];
        self.memory.read_at(locator, &mut header)?;
        let next = read_u64_le(&header[0..8]);
        let mut len_raw = [0_u8; 4];
        len_raw.copy_from_slice(&header[PAYLOAD_LEN_OFFSET..HEADER_LEN]);
        let payload_len = u32::from_le_bytes(len_raw) as usize;

        self.read_buf.clear();
        self.read_buf.resize(payload_len, 0);
        self.memory.read_at(locator + HEADER_LEN as u64, &mut self.read_buf)?;
        decode_row(&self.read_buf, &self.column_types, &mut self.row)?;

        self.next_locator = next;
        self.has_row = true;
        Ok(true)
    }

    /// Resolver for the symbol columns of stored rows.
    pub fn set_symbol_table_resolver(&mut self, resolver: Option<SymbolResolver>) {
        self.symbol_resolver = resolver;
    }

    #[must_use]
    pub fn symbol_table_resolver(&self) -> Option<SymbolResolver> {
        self.symbol_resolver.clone()
    }

    #[must_use]
    pub fn pages_in_use(&self) -> usize {
        self.memory.pages_in_use()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Forget all rows. Pages stay allocated.
    pub fn clear(&mut self) {
        self.memory.truncate();
        self.row.clear();
        self.has_row = false;
        self.next_locator = NO_LOCATOR;
    }

    pub fn reopen(&mut self) {
        self.is_open = true;
    }

    /// Forget all rows and free the pages.
    pub fn close(&mut self) {
        if self.is_open {
            self.clear();
            self.memory.release();
            self.symbol_resolver = None;
            self.is_open = false;
        }
    }
}

impl Record for RecordChain {
    fn column_count(&self) -> usize {
        self.column_types.len()
    }

    fn value(&self, column: usize) -> ValueRef<'_> {
        if !self.has_row {
            return ValueRef::Null;
        }
        self.row.get(column).map_or(ValueRef::Null, Value::as_value_ref)
    }

    fn symbol(&self, column: usize) -> Option<&str> {
        match self.value(column) {
            ValueRef::Symbol(key) => self
                .symbol_resolver
                .as_deref()?
                .symbol_table(column)?
                .value_of(key),
            other => other.as_str(),
        }
    }
}

struct ChainRowWriter<'a> {
    buf: &'a mut Vec<u8>,
    column_types: &'a [ColumnType],
    column: usize,
}

impl ChainRowWriter<'_> {
    fn finish(&self) -> Result<()> {
        if self.column != self.column_types.len() {
            return Err(ColqError::internal(format!(
                "row chain sink wrote {} of {} columns",
                self.column,
                self.column_types.len()
            )));
        }
        Ok(())
    }
}

impl RowWriter for ChainRowWriter<'_> {
    fn put(&mut self, value: ValueRef<'_>) -> Result<()> {
        let Some(&column_type) = self.column_types.get(self.column) else {
            return Err(ColqError::internal(format!(
                "row chain declares {} columns, sink wrote more",
                self.column_types.len()
            )));
        };
        let buf = &mut *self.buf;
        match (column_type, value) {
            (_, ValueRef::Null) => buf.push(CELL_NULL),
            (ColumnType::Boolean, ValueRef::Boolean(v)) => {
                buf.push(CELL_VALUE);
                buf.push(u8::from(v));
            }
            (ColumnType::Int, ValueRef::Int(v)) | (ColumnType::Symbol, ValueRef::Symbol(v)) => {
                buf.push(CELL_VALUE);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            (ColumnType::Long, ValueRef::Long(v)) => {
                buf.push(CELL_VALUE);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            (ColumnType::Long, ValueRef::Int(v)) => {
                buf.push(CELL_VALUE);
                buf.extend_from_slice(&i64::from(v).to_le_bytes());
            }
            (ColumnType::Double, ValueRef::Double(v)) => {
                buf.push(CELL_VALUE);
                buf.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            (ColumnType::Double, ValueRef::Int(v)) => {
                buf.push(CELL_VALUE);
                buf.extend_from_slice(&f64::from(v).to_bits().to_le_bytes());
            }
            (ColumnType::Varchar, ValueRef::Varchar(s)) => {
                let len = u32::try_from(s.len()).map_err(|_| ColqError::LimitExceeded {
                    resource: "hash join varchar bytes",
                    limit: u32::MAX as usize,
                })?;
                buf.push(CELL_VALUE);
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            (expected, actual) => {
                return Err(ColqError::TypeMismatch {
                    expected: expected.as_str(),
                    actual: actual.type_name(),
                });
            }
        }
        self.column += 1;
        Ok(())
    }
}

fn decode_row(payload: &[u8], column_types: &[ColumnType], row: &mut Vec<Value>) -> Result<()> {
    row.clear();
    let mut reader = PayloadReader { payload, pos: 0 };
    for &column_type in column_types {
        if reader.take(1)?[0] == CELL_NULL {
            row.push(Value::Null);
            continue;
        }
        let value = match column_type {
            ColumnType::Boolean => Value::Boolean(reader.take(1)?[0] != 0),
            ColumnType::Int => Value::Int(reader.i32()?),
            ColumnType::Symbol => Value::Symbol(reader.i32()?),
            ColumnType::Long => Value::Long(read_u64_le(reader.take(8)?) as i64),
            ColumnType::Double => Value::Double(f64::from_bits(read_u64_le(reader.take(8)?))),
            ColumnType::Varchar => {
                let len = reader.u32()? as usize;
                let bytes = reader.take(len)?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| ColqError::internal(format!("row chain varchar: {e}")))?;
                Value::Varchar(text.to_owned())
            }
        };
        row.push(value);
    }
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let bytes = self.payload.get(self.pos..end).ok_or_else(|| {
            ColqError::internal(format!(
                "row chain payload truncated at {} of {}",
                self.pos,
                self.payload.len()
            ))
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut raw = [0_u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn i32(&mut self) -> Result<i32> {
        self.u32().map(|v| v as i32)
    }
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut raw = [0_u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ColumnSink;
    use crate::sink::tests::RowRecord;
    use colq_types::{StaticSymbolTable, SymbolTables};

    fn metadata() -> RecordMetadata {
        RecordMetadata::from_pairs([
            ("id", ColumnType::Long),
            ("name", ColumnType::Varchar),
            ("px", ColumnType::Double),
        ])
    }

    fn chain(page_size: usize, max_pages: usize) -> RecordChain {
        let metadata = metadata();
        let sink = Arc::new(ColumnSink::all_columns(&metadata));
        RecordChain::try_new(&metadata, sink, page_size, max_pages).unwrap()
    }

    fn row(id: i64, name: &str, px: Option<f64>) -> RowRecord {
        RowRecord::new(vec![Value::Long(id), Value::from(name), Value::from(px)])
    }

    fn collect(chain: &mut RecordChain, head: u64) -> Vec<Vec<Value>> {
        let mut out = Vec::new();
        chain.position_at(head);
        while chain.advance().unwrap() {
            out.push((0..chain.column_count()).map(|c| chain.value(c).to_owned_value()).collect());
        }
        out
    }

    #[test]
    fn chains_keep_insertion_order() {
        let mut chain = chain(64, 64);
        let a = chain.append(&row(1, "x", Some(1.5)), None).unwrap();
        let b = chain.append(&row(2, "other", None), None).unwrap();
        assert_eq!(chain.append(&row(1, "y", None), Some(a)).unwrap(), a);
        assert_eq!(chain.append(&row(1, "z", Some(-2.0)), Some(a)).unwrap(), a);

        let names: Vec<Value> = collect(&mut chain, a).into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(names, vec![Value::from("x"), Value::from("y"), Value::from("z")]);
        assert_eq!(chain.chain_len(a).unwrap(), 3);
        assert_eq!(chain.chain_len(b).unwrap(), 1);
        assert_eq!(chain.chain_len(NO_LOCATOR).unwrap(), 0);
        assert_eq!(collect(&mut chain, b), vec![vec![Value::Long(2), Value::from("other"), Value::Null]]);
    }

    #[test]
    fn rows_may_straddle_pages() {
        let mut chain = chain(64, 1024);
        let long_name = "n".repeat(150);
        let head = chain.append(&row(7, &long_name, Some(0.25)), None).unwrap();
        chain.append(&row(8, "short", None), Some(head)).unwrap();
        assert!(chain.pages_in_use() > 2);
        let rows = collect(&mut chain, head);
        assert_eq!(rows[0], vec![Value::Long(7), Value::from(long_name), Value::Double(0.25)]);
        assert_eq!(rows[1][0], Value::Long(8));
    }

    #[test]
    fn page_ceiling_fails_without_corrupting_chains() {
        let mut chain = chain(64, 1);
        let head = chain.append(&row(1, "a", None), None).unwrap();
        let err = chain.append(&row(1, &"b".repeat(64), None), Some(head)).unwrap_err();
        assert!(matches!(err, ColqError::LimitExceeded { .. }), "case=chain_overflow err={err}");
        assert_eq!(chain.chain_len(head).unwrap(), 1);
        assert_eq!(collect(&mut chain, head).len(), 1);
    }

    #[test]
    fn sink_output_is_type_checked() {
        let mut chain = chain(64, 8);
        let bad = RowRecord::new(vec![Value::from("id"), Value::from("x"), Value::Null]);
        let err = chain.append(&bad, None).unwrap_err();
        assert!(matches!(err, ColqError::TypeMismatch { expected: "LONG", .. }));
        assert_eq!(chain.pages_in_use(), 0, "case=rejected_row_not_stored");
    }

    #[test]
    fn symbols_resolve_through_the_resolver() {
        let metadata = RecordMetadata::from_pairs([("k", ColumnType::Long), ("venue", ColumnType::Symbol)]);
        let sink = Arc::new(ColumnSink::all_columns(&metadata));
        let mut chain = RecordChain::try_new(&metadata, sink, 64, 8).unwrap();
        let head = chain
            .append(&RowRecord::new(vec![Value::Long(1), Value::Symbol(1)]), None)
            .unwrap();
        chain.set_symbol_table_resolver(Some(Arc::new(
            SymbolTables::new().with_table(1, StaticSymbolTable::new(["lse", "nyse"])),
        )));

        chain.position_at(head);
        assert!(chain.advance().unwrap());
        assert_eq!(chain.value(1), ValueRef::Symbol(1));
        assert_eq!(chain.symbol(1), Some("nyse"));
        assert_eq!(chain.symbol(0), None);
    }

    #[test]
    fn clear_reuses_pages_and_close_is_idempotent() {
        let mut chain = chain(64, 8);
        let head = chain.append(&row(1, "a", None), None).unwrap();
        chain.clear();
        assert_eq!(chain.pages_in_use(), 0);
        assert_eq!(chain.append(&row(2, "b", None), None).unwrap(), head);

        chain.close();
        chain.close();
        assert!(!chain.is_open());
        assert!(chain.append(&row(3, "c", None), None).is_err());
        chain.reopen();
        assert_eq!(chain.append(&row(3, "c", None), None).unwrap(), 0);
    }

    #[test]
    fn unpositioned_chain_reads_null() {
        let mut chain = chain(64, 8);
        assert_eq!(chain.value(0), ValueRef::Null);
        chain.position_at(NO_LOCATOR);
        assert!(!chain.advance().unwrap());
    }
}
