//! Hash-join operator: build a key → row-chain table from the slave, then
//! stream the master through it.
//!
//! The factory owns one join-key map and one row chain for its whole life.
//! A cursor leases them exclusively; a second `get_cursor` while a cursor is
//! live fails with [`ColqError::CursorInUse`] rather than rebinding the
//! first cursor's state. Closing or dropping the cursor releases the memory
//! and returns the lease.
//!
//! Cursor state machine:
//!
//! ```text
//!   bind ──► Unbuilt ──(has_next / size: build)──► Probing
//!               ▲   │ build error: map and chain cleared,
//!               └───┘ next attempt rewinds the slave first
//!   to_top: Unbuilt → rewind slave, clear map and chain
//!           Probing → rewind master only
//!   close:  any → Closed
//! ```
//!
//! The build polls the circuit breaker after every slave row; the probe
//! never does.

use std::sync::Arc;

use colq_error::{ColqError, Result};
use colq_types::{
    CircuitBreaker, ColumnType, RecordMetadata, SymbolResolver, TableToken, ValueRef,
};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::chain::RecordChain;
use crate::config::HashJoinConfig;
use crate::context::ExecutionContext;
use crate::cursor::{Record, RecordCursor, RecordCursorFactory, ScanDirection};
use crate::join_key_map::JoinKeyMap;
use crate::join_record::{JoinRecord, JoinSymbolTables};
use crate::plan::{JoinContext, PlanSink};
use crate::sink::RecordSink;

// ── Shared resources ───────────────────────────────────────────────────────

/// Map and chain reused by every execution of one factory.
struct JoinResources {
    map: JoinKeyMap,
    chain: RecordChain,
}

impl JoinResources {
    fn reopen(&mut self) {
        self.map.reopen();
        self.chain.reopen();
    }

    fn clear(&mut self) {
        self.map.clear();
        self.chain.clear();
    }

    fn close(&mut self) {
        self.map.close();
        self.chain.close();
    }
}

type ResourceSlot = Arc<Mutex<Option<JoinResources>>>;

/// Exclusive hold on a factory's [`JoinResources`]. Releasing (or dropping)
/// the lease closes them and puts them back into the factory's slot.
struct JoinLease {
    resources: Option<JoinResources>,
    home: ResourceSlot,
}

impl JoinLease {
    fn acquire(home: &ResourceSlot) -> Result<Self> {
        let resources = home.lock().take().ok_or(ColqError::CursorInUse)?;
        trace!("hash join resources leased");
        Ok(Self {
            resources: Some(resources),
            home: Arc::clone(home),
        })
    }

    fn get(&self) -> Option<&JoinResources> {
        self.resources.as_ref()
    }

    fn get_mut(&mut self) -> Result<&mut JoinResources> {
        self.resources.as_mut().ok_or(ColqError::CursorClosed)
    }

    fn release(&mut self) {
        if let Some(mut resources) = self.resources.take() {
            resources.close();
            *self.home.lock() = Some(resources);
            trace!("hash join resources returned");
        }
    }
}

impl Drop for JoinLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Per-factory constants every cursor needs.
#[derive(Clone)]
struct JoinShape {
    column_split: usize,
    column_count: usize,
    master_key_sink: Arc<dyn RecordSink>,
    slave_key_sink: Arc<dyn RecordSink>,
}

// ── Factory ────────────────────────────────────────────────────────────────

/// Equi-join of a master (probe) factory against a slave (build) factory.
///
/// Output rows are the master columns followed by the slave columns, in
/// master order and, per master row, slave scan order. Unmatched master rows
/// are dropped.
pub struct HashJoinRecordCursorFactory {
    metadata: RecordMetadata,
    master_factory: Box<dyn RecordCursorFactory>,
    slave_factory: Box<dyn RecordCursorFactory>,
    shape: JoinShape,
    join_context: JoinContext,
    resources: ResourceSlot,
    is_closed: bool,
}

impl HashJoinRecordCursorFactory {
    /// Build the factory and allocate its map and chain.
    ///
    /// `join_key_types` declares the key layout both key sinks write;
    /// `value_types` must be `[LONG]`. `slave_chain_sink` decides what of a
    /// slave row is kept in the chain and must write the slave's full
    /// metadata. `column_split` is the master column count.
    ///
    /// On failure both child factories are closed before the error is
    /// returned.
    #[allow(clippy::too_many_arguments)]
    pub fn try_new(
        config: &HashJoinConfig,
        metadata: RecordMetadata,
        mut master_factory: Box<dyn RecordCursorFactory>,
        mut slave_factory: Box<dyn RecordCursorFactory>,
        join_key_types: &[ColumnType],
        value_types: &[ColumnType],
        master_key_sink: Arc<dyn RecordSink>,
        slave_key_sink: Arc<dyn RecordSink>,
        slave_chain_sink: Arc<dyn RecordSink>,
        column_split: usize,
        join_context: JoinContext,
    ) -> Result<Self> {
        let built = allocate_resources(
            config,
            &metadata,
            master_factory.as_ref(),
            slave_factory.as_ref(),
            join_key_types,
            value_types,
            slave_chain_sink,
            column_split,
        );
        let resources = match built {
            Ok(resources) => resources,
            Err(err) => {
                warn!(error = %err, "hash join construction failed; closing child factories");
                master_factory.close();
                slave_factory.close();
                return Err(err);
            }
        };
        debug!(
            column_split,
            key_columns = join_key_types.len(),
            page_size = config.value_page_size,
            max_pages = config.value_max_pages,
            "hash join factory created"
        );
        Ok(Self {
            shape: JoinShape {
                column_split,
                column_count: metadata.len(),
                master_key_sink,
                slave_key_sink,
            },
            metadata,
            master_factory,
            slave_factory,
            join_context,
            resources: Arc::new(Mutex::new(Some(resources))),
            is_closed: false,
        })
    }

    /// [`RecordCursorFactory::get_cursor`] without the boxing.
    ///
    /// The slave cursor is acquired before the master; if the master cannot
    /// be opened the slave cursor is closed and the lease returned.
    pub fn get_hash_join_cursor(&mut self, ctx: &ExecutionContext) -> Result<HashJoinRecordCursor> {
        if self.is_closed {
            return Err(ColqError::FactoryClosed);
        }
        let lease = JoinLease::acquire(&self.resources)?;
        let mut slave = self.slave_factory.get_cursor(ctx)?;
        let master = match self.master_factory.get_cursor(ctx) {
            Ok(master) => master,
            Err(err) => {
                slave.close();
                return Err(err);
            }
        };
        Ok(HashJoinRecordCursor::bind(
            &self.shape,
            lease,
            master,
            slave,
            ctx.circuit_breaker(),
        ))
    }

    pub fn master_factory(&self) -> &dyn RecordCursorFactory {
        self.master_factory.as_ref()
    }

    pub fn slave_factory(&self) -> &dyn RecordCursorFactory {
        self.slave_factory.as_ref()
    }

    #[must_use]
    pub fn column_split(&self) -> usize {
        self.shape.column_split
    }

    pub fn join_context(&self) -> &JoinContext {
        &self.join_context
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }
}

#[allow(clippy::too_many_arguments)]
fn allocate_resources(
    config: &HashJoinConfig,
    metadata: &RecordMetadata,
    master_factory: &dyn RecordCursorFactory,
    slave_factory: &dyn RecordCursorFactory,
    join_key_types: &[ColumnType],
    value_types: &[ColumnType],
    slave_chain_sink: Arc<dyn RecordSink>,
    column_split: usize,
) -> Result<JoinResources> {
    config.validate()?;
    let master_columns = master_factory.metadata().len();
    let slave_columns = slave_factory.metadata().len();
    if column_split != master_columns {
        return Err(ColqError::invalid_config(format!(
            "column split {column_split} does not match {master_columns} master columns"
        )));
    }
    if metadata.len() != master_columns + slave_columns {
        return Err(ColqError::invalid_config(format!(
            "join metadata has {} columns, children provide {}",
            metadata.len(),
            master_columns + slave_columns
        )));
    }
    let mut map = JoinKeyMap::try_new(join_key_types, value_types, config.map_initial_capacity)?;
    let chain = match RecordChain::try_new(
        slave_factory.metadata(),
        slave_chain_sink,
        config.value_page_size,
        config.value_max_pages,
    ) {
        Ok(chain) => chain,
        Err(err) => {
            map.close();
            return Err(err);
        }
    };
    Ok(JoinResources { map, chain })
}

impl RecordCursorFactory for HashJoinRecordCursorFactory {
    fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    fn get_cursor(&mut self, ctx: &ExecutionContext) -> Result<Box<dyn RecordCursor>> {
        Ok(Box::new(self.get_hash_join_cursor(ctx)?))
    }

    fn followed_order_by_advice(&self) -> bool {
        self.master_factory.followed_order_by_advice()
    }

    fn scan_direction(&self) -> ScanDirection {
        self.master_factory.scan_direction()
    }

    fn supports_update_row_id(&self, table: &TableToken) -> bool {
        self.master_factory.supports_update_row_id(table)
    }

    fn record_cursor_supports_random_access(&self) -> bool {
        false
    }

    fn to_plan(&self, sink: &mut PlanSink) {
        sink.node_type("Hash Join")
            .attr("condition", &self.join_context)
            .child(self.master_factory.as_ref())
            .child_labeled("Hash", self.slave_factory.as_ref());
    }

    fn close(&mut self) {
        if self.is_closed {
            return;
        }
        self.is_closed = true;
        self.master_factory.close();
        self.slave_factory.close();
        // A live cursor keeps its lease; it closes the resources on release.
        let mut slot = self.resources.lock();
        if let Some(resources) = slot.as_mut() {
            resources.close();
        }
        drop(slot);
        debug!("hash join factory closed");
    }
}

impl Drop for HashJoinRecordCursorFactory {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Cursor ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Unbuilt,
    Probing,
    Closed,
}

/// What the last successful build produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub rows: u64,
    pub keys: usize,
    pub pages: usize,
}

/// Cursor of a [`HashJoinRecordCursorFactory`]. The cursor is also the
/// composite record it produces.
pub struct HashJoinRecordCursor {
    lease: JoinLease,
    shape: JoinShape,
    master: Box<dyn RecordCursor>,
    slave: Box<dyn RecordCursor>,
    circuit_breaker: Arc<dyn CircuitBreaker>,
    state: CursorState,
    in_chain: bool,
    // A failed build leaves the slave part-way through; the next attempt
    // starts from its top.
    slave_consumed: bool,
    size: Option<u64>,
    stats: Option<BuildStats>,
}

impl HashJoinRecordCursor {
    fn bind(
        shape: &JoinShape,
        mut lease: JoinLease,
        master: Box<dyn RecordCursor>,
        slave: Box<dyn RecordCursor>,
        circuit_breaker: Arc<dyn CircuitBreaker>,
    ) -> Self {
        if let Some(resources) = lease.resources.as_mut() {
            resources.reopen();
            resources.clear();
            resources
                .chain
                .set_symbol_table_resolver(slave.symbol_tables());
        }
        trace!(column_split = shape.column_split, "hash join cursor bound");
        Self {
            lease,
            shape: shape.clone(),
            master,
            slave,
            circuit_breaker,
            state: CursorState::Unbuilt,
            in_chain: false,
            slave_consumed: false,
            size: None,
            stats: None,
        }
    }

    /// Statistics of the completed build, `None` before it.
    #[must_use]
    pub fn build_stats(&self) -> Option<BuildStats> {
        self.stats
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.state == CursorState::Probing
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    fn check_open(&self) -> Result<()> {
        if self.state == CursorState::Closed {
            return Err(ColqError::CursorClosed);
        }
        Ok(())
    }

    fn ensure_built(&mut self) -> Result<()> {
        if self.state != CursorState::Unbuilt {
            return Ok(());
        }
        if self.slave_consumed {
            self.slave.to_top()?;
        }
        self.slave_consumed = true;
        let resources = self.lease.get_mut()?;
        match build_table(
            resources,
            self.slave.as_mut(),
            self.shape.slave_key_sink.as_ref(),
            self.circuit_breaker.as_ref(),
        ) {
            Ok(stats) => {
                debug!(
                    rows = stats.rows,
                    keys = stats.keys,
                    pages = stats.pages,
                    "hash join build complete"
                );
                self.stats = Some(stats);
                self.state = CursorState::Probing;
                Ok(())
            }
            Err(err) => {
                resources.clear();
                if err.is_cancellation() {
                    warn!(error = %err, "hash join build cancelled");
                } else {
                    warn!(error = %err, "hash join build failed");
                }
                Err(err)
            }
        }
    }
}

fn build_table(
    resources: &mut JoinResources,
    slave: &mut dyn RecordCursor,
    key_sink: &dyn RecordSink,
    circuit_breaker: &dyn CircuitBreaker,
) -> Result<BuildStats> {
    let mut rows = 0_u64;
    while slave.has_next()? {
        let record = slave.record();
        let mut key = resources.map.with_key();
        key_sink.copy(record, &mut key)?;
        let mut value = key.find_or_create()?;
        if value.is_new() {
            let head = resources.chain.append(record, None)?;
            value.set_locator(head);
        } else {
            resources.chain.append(record, Some(value.locator()))?;
        }
        rows += 1;
        circuit_breaker.checkpoint()?;
    }
    Ok(BuildStats {
        rows,
        keys: resources.map.len(),
        pages: resources.chain.pages_in_use(),
    })
}

impl RecordCursor for HashJoinRecordCursor {
    fn has_next(&mut self) -> Result<bool> {
        self.check_open()?;
        self.ensure_built()?;
        let resources = self.lease.get_mut()?;
        if self.in_chain && resources.chain.advance()? {
            return Ok(true);
        }
        self.in_chain = false;
        while self.master.has_next()? {
            let mut key = resources.map.with_key();
            self.shape.master_key_sink.copy(self.master.record(), &mut key)?;
            if let Some(head) = key.find_value()? {
                resources.chain.position_at(head);
                if resources.chain.advance()? {
                    self.in_chain = true;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn record(&self) -> &dyn Record {
        self
    }

    fn to_top(&mut self) -> Result<()> {
        self.check_open()?;
        self.master.to_top()?;
        self.in_chain = false;
        if self.state == CursorState::Unbuilt {
            self.slave.to_top()?;
            self.slave_consumed = false;
            self.lease.get_mut()?.clear();
        }
        Ok(())
    }

    /// Exact row count. Builds if needed, then walks the master once; the
    /// cursor is left rewound to the top.
    fn size(&mut self) -> Result<Option<u64>> {
        self.check_open()?;
        if let Some(size) = self.size {
            return Ok(Some(size));
        }
        self.ensure_built()?;
        let resources = self.lease.get_mut()?;
        self.master.to_top()?;
        self.in_chain = false;
        let mut total = 0_u64;
        while self.master.has_next()? {
            let mut key = resources.map.with_key();
            self.shape.master_key_sink.copy(self.master.record(), &mut key)?;
            if let Some(head) = key.find_value()? {
                total += resources.chain.chain_len(head)?;
            }
        }
        self.master.to_top()?;
        self.size = Some(total);
        debug!(size = total, "hash join size computed");
        Ok(Some(total))
    }

    fn symbol_tables(&self) -> Option<SymbolResolver> {
        if self.state == CursorState::Closed {
            return None;
        }
        Some(Arc::new(JoinSymbolTables::new(
            self.master.symbol_tables(),
            self.slave.symbol_tables(),
            self.shape.column_split,
        )))
    }

    fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        self.state = CursorState::Closed;
        self.in_chain = false;
        self.master.close();
        self.slave.close();
        self.lease.release();
    }
}

impl Drop for HashJoinRecordCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl HashJoinRecordCursor {
    fn joined(&self) -> Option<JoinRecord<'_>> {
        if self.state == CursorState::Closed {
            return None;
        }
        let resources = self.lease.get()?;
        Some(JoinRecord::of(
            self.shape.column_split,
            self.master.record(),
            &resources.chain,
        ))
    }
}

impl Record for HashJoinRecordCursor {
    fn column_count(&self) -> usize {
        if self.state == CursorState::Closed {
            0
        } else {
            self.shape.column_count
        }
    }

    fn value(&self, column: usize) -> ValueRef<'_> {
        self.joined().map_or(ValueRef::Null, |record| record.get(column))
    }

    fn symbol(&self, column: usize) -> Option<&str> {
        self.joined()?.get_symbol(column)
    }
}
