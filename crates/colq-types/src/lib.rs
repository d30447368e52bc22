//! Core type definitions shared by the colq execution crates.

pub mod cx;
pub mod metadata;
pub mod symbol;
pub mod value;

pub use cx::{CancelHandle, CircuitBreaker, NoopCircuitBreaker, QueryCircuitBreaker};
pub use metadata::{ColumnMetadata, RecordMetadata, TableToken};
pub use symbol::{StaticSymbolTable, SymbolResolver, SymbolTable, SymbolTableSource, SymbolTables};
pub use value::{ColumnType, Value, ValueRef};
