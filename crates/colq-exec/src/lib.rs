//! Volcano-model record cursors and the hash-join operator.
//!
//! Operators are [`RecordCursorFactory`] trees. The hash join builds a
//! key → row-chain table from its slave child, then streams its master child
//! through it; see [`hash_join`].

pub mod chain;
pub mod config;
pub mod context;
pub mod cursor;
pub mod hash_join;
pub mod join_key_map;
pub mod join_record;
pub mod paged;
pub mod plan;
pub mod sink;
pub mod values;

pub use chain::RecordChain;
pub use config::HashJoinConfig;
pub use context::ExecutionContext;
pub use cursor::{EmptyRecord, Record, RecordCursor, RecordCursorFactory, ScanDirection};
pub use hash_join::{BuildStats, HashJoinRecordCursor, HashJoinRecordCursorFactory};
pub use join_key_map::{JoinKeyMap, MapKey, MapValue, NO_LOCATOR};
pub use join_record::{JoinRecord, JoinSymbolTables};
pub use paged::PagedMemory;
pub use plan::{JoinContext, PlanNode, PlanRow, PlanSink, explain};
pub use sink::{ColumnSink, RecordSink, RowWriter, SinkColumn};
pub use values::{ValuesRecordCursor, ValuesRecordCursorFactory};
