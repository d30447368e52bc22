//! Shared fixtures for the hash-join integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use colq_error::{ColqError, Result};
use colq_exec::{
    ColumnSink, ExecutionContext, HashJoinConfig, HashJoinRecordCursorFactory, JoinContext,
    PlanSink, Record, RecordCursor, RecordCursorFactory, ScanDirection, ValuesRecordCursorFactory,
};
use colq_types::{
    CircuitBreaker, ColumnType, RecordMetadata, SymbolResolver, TableToken, Value,
};

/// Small pages keep the chain tests multi-page without large inputs.
pub fn test_config() -> HashJoinConfig {
    HashJoinConfig::default()
        .with_value_page_size(256)
        .with_value_max_pages(1024)
}

/// `(id LONG, v VARCHAR)` rows.
pub fn id_rows(rows: &[(i64, &str)]) -> ValuesRecordCursorFactory {
    let metadata = RecordMetadata::from_pairs([("id", ColumnType::Long), ("v", ColumnType::Varchar)]);
    ValuesRecordCursorFactory::new(
        metadata,
        rows.iter()
            .map(|&(id, v)| vec![Value::Long(id), Value::from(v)])
            .collect(),
    )
    .expect("fixture rows match metadata")
}

/// Join on column 0 of both sides, keyed as `key_type`.
pub fn join_on_first_column(
    config: &HashJoinConfig,
    master: Box<dyn RecordCursorFactory>,
    slave: Box<dyn RecordCursorFactory>,
    key_type: ColumnType,
) -> Result<HashJoinRecordCursorFactory> {
    let metadata = RecordMetadata::join(master.metadata(), slave.metadata());
    let split = master.metadata().len();
    let chain_sink = Arc::new(ColumnSink::all_columns(slave.metadata()));
    HashJoinRecordCursorFactory::try_new(
        config,
        metadata,
        master,
        slave,
        &[key_type],
        &[ColumnType::Long],
        Arc::new(ColumnSink::keys(&[(0, key_type)])),
        Arc::new(ColumnSink::keys(&[(0, key_type)])),
        chain_sink,
        split,
        JoinContext::new("m", "s").with_key("id", "id"),
    )
}

/// Drain a cursor into owned rows.
pub fn drain(cursor: &mut dyn RecordCursor) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    while cursor.has_next().expect("has_next") {
        rows.push(snapshot(cursor.record()));
    }
    rows
}

pub fn snapshot(record: &dyn Record) -> Vec<Value> {
    (0..record.column_count())
        .map(|c| record.value(c).to_owned_value())
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// ── Instrumented source ────────────────────────────────────────────────────

/// Counters shared between a [`TrackingFactory`] and its cursors.
#[derive(Debug, Default)]
pub struct Tracker {
    pub cursors_opened: AtomicUsize,
    pub cursors_closed: AtomicUsize,
    pub rows_read: AtomicUsize,
    pub rewinds: AtomicUsize,
    pub factory_closes: AtomicUsize,
}

impl Tracker {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        Self::get(&self.cursors_opened)
    }

    pub fn closed(&self) -> usize {
        Self::get(&self.cursors_closed)
    }

    pub fn rows(&self) -> usize {
        Self::get(&self.rows_read)
    }

    pub fn rewinds(&self) -> usize {
        Self::get(&self.rewinds)
    }

    pub fn factory_closes(&self) -> usize {
        Self::get(&self.factory_closes)
    }
}

/// Wraps a factory and counts what the consumer does with it.
pub struct TrackingFactory {
    inner: Box<dyn RecordCursorFactory>,
    tracker: Arc<Tracker>,
}

impl TrackingFactory {
    pub fn wrap(inner: impl RecordCursorFactory + 'static) -> (Box<dyn RecordCursorFactory>, Arc<Tracker>) {
        let tracker = Arc::new(Tracker::default());
        let factory = Box::new(Self {
            inner: Box::new(inner),
            tracker: Arc::clone(&tracker),
        });
        (factory, tracker)
    }
}

impl RecordCursorFactory for TrackingFactory {
    fn metadata(&self) -> &RecordMetadata {
        self.inner.metadata()
    }

    fn get_cursor(&mut self, ctx: &ExecutionContext) -> Result<Box<dyn RecordCursor>> {
        let inner = self.inner.get_cursor(ctx)?;
        self.tracker.cursors_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackingCursor {
            inner,
            tracker: Arc::clone(&self.tracker),
            closed: false,
        }))
    }

    fn followed_order_by_advice(&self) -> bool {
        self.inner.followed_order_by_advice()
    }

    fn scan_direction(&self) -> ScanDirection {
        self.inner.scan_direction()
    }

    fn supports_update_row_id(&self, table: &TableToken) -> bool {
        self.inner.supports_update_row_id(table)
    }

    fn to_plan(&self, sink: &mut PlanSink) {
        self.inner.to_plan(sink);
    }

    fn close(&mut self) {
        self.tracker.factory_closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}

struct TrackingCursor {
    inner: Box<dyn RecordCursor>,
    tracker: Arc<Tracker>,
    closed: bool,
}

impl RecordCursor for TrackingCursor {
    fn has_next(&mut self) -> Result<bool> {
        let has = self.inner.has_next()?;
        if has {
            self.tracker.rows_read.fetch_add(1, Ordering::SeqCst);
        }
        Ok(has)
    }

    fn record(&self) -> &dyn Record {
        self.inner.record()
    }

    fn to_top(&mut self) -> Result<()> {
        self.tracker.rewinds.fetch_add(1, Ordering::SeqCst);
        self.inner.to_top()
    }

    fn size(&mut self) -> Result<Option<u64>> {
        self.inner.size()
    }

    fn symbol_tables(&self) -> Option<SymbolResolver> {
        self.inner.symbol_tables()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.tracker.cursors_closed.fetch_add(1, Ordering::SeqCst);
            self.inner.close();
        }
    }
}

// ── Failure injection ──────────────────────────────────────────────────────

/// Factory whose `get_cursor` always fails.
pub struct FailingFactory {
    metadata: RecordMetadata,
    pub closes: Arc<AtomicUsize>,
}

impl FailingFactory {
    pub fn new(metadata: RecordMetadata) -> Self {
        Self {
            metadata,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl RecordCursorFactory for FailingFactory {
    fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    fn get_cursor(&mut self, _ctx: &ExecutionContext) -> Result<Box<dyn RecordCursor>> {
        Err(ColqError::Unsupported("cursor acquisition"))
    }

    fn to_plan(&self, sink: &mut PlanSink) {
        sink.node_type("Failing");
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Breaker that trips on its `n`-th checkpoint (1-based) and only then.
pub struct TripAfter {
    n: usize,
    seen: AtomicUsize,
}

impl TripAfter {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            seen: AtomicUsize::new(0),
        }
    }

    pub fn checkpoints(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

impl CircuitBreaker for TripAfter {
    fn checkpoint(&self) -> Result<()> {
        let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if seen == self.n {
            Err(ColqError::QueryCancelled)
        } else {
            Ok(())
        }
    }

    fn is_tripped(&self) -> bool {
        self.seen.load(Ordering::SeqCst) == self.n
    }
}
