//! Engine call contract: the narrow synchronous boundary below this crate.
//!
//! Everything the control layer knows about the storage kernel goes through
//! [`Engine`]. Native objects (schemas, indexes, transactions, open tables)
//! are opaque reference-typed handles; every call reports a [`DbErr`] status
//! on failure. Page layout, logging, recovery and MVCC stay on the far side
//! of this trait.

pub mod memory;

use thiserror::Error;

use crate::config::ConfigValue;
use crate::types::{FileFormat, ShutdownMode, TableFormat, TableId};

pub use memory::{EngineOp, MemoryEngine};

/// Native status codes reported by the engine.
///
/// Discriminants are the engine's wire codes; [`DbErr::code`] exposes them.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DbErr {
    #[error("generic error")]
    Error = 11,
    #[error("operation interrupted")]
    Interrupted = 12,
    #[error("out of memory")]
    OutOfMemory = 13,
    #[error("out of file space")]
    OutOfFileSpace = 14,
    #[error("lock wait")]
    LockWait = 15,
    #[error("deadlock")]
    Deadlock = 16,
    #[error("transaction rolled back")]
    Rollback = 17,
    #[error("duplicate key")]
    DuplicateKey = 18,
    #[error("clustered index not found")]
    ClusterNotFound = 30,
    #[error("table not found")]
    TableNotFound = 31,
    #[error("table is being used")]
    TableIsBeingUsed = 33,
    #[error("lock wait timeout")]
    LockWaitTimeout = 35,
    #[error("data corruption")]
    Corruption = 39,
    #[error("column appears twice in index")]
    ColAppearsTwiceInIndex = 40,
    #[error("too many concurrent transactions")]
    TooManyConcurrentTrxs = 47,
    #[error("unsupported operation")]
    Unsupported = 48,
    #[error("fatal engine error")]
    Fatal = 50,
    #[error("schema error")]
    SchemaError = 2000,
    #[error("schema is not locked")]
    SchemaNotLocked = 2002,
    #[error("not found")]
    NotFound = 2003,
    #[error("read only")]
    ReadOnly = 2004,
    #[error("invalid input")]
    InvalidInput = 2005,
    #[error("engine already started")]
    AlreadyStarted = 2100,
}

impl DbErr {
    /// The native status code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether the status means the engine ran out of a bounded resource.
    pub fn is_resource_exhaustion(self) -> bool {
        matches!(
            self,
            DbErr::OutOfMemory | DbErr::OutOfFileSpace | DbErr::TooManyConcurrentTrxs
        )
    }
}

/// Opaque native schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaRef(pub u64);

/// Opaque native index object, owned by its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexRef(pub u64);

/// Opaque native transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrxRef(pub u64);

/// Opaque reference to an open table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef(pub u64);

/// The synchronous call contract of the embedded engine.
///
/// Every call blocks until the engine answers; none are cancellable. An
/// implementation must be safe to call from several threads at once, each
/// thread driving its own transactions.
pub trait Engine: Send + Sync {
    // -- lifecycle ---------------------------------------------------------

    /// Initialize engine globals. Fails with [`DbErr::AlreadyStarted`] while
    /// another owner has the engine started.
    fn init(&self) -> Result<(), DbErr>;
    /// Apply one named configuration option. Only valid between `init` and
    /// `startup`.
    fn configure(&self, name: &str, value: &ConfigValue) -> Result<(), DbErr>;
    /// Start the engine with the given on-disk file format.
    fn startup(&self, format: FileFormat) -> Result<(), DbErr>;
    /// Stop the engine.
    fn shutdown(&self, mode: ShutdownMode) -> Result<(), DbErr>;

    // -- database DDL ------------------------------------------------------

    fn database_create(&self, name: &str) -> Result<(), DbErr>;
    fn database_drop(&self, name: &str) -> Result<(), DbErr>;

    // -- schema / table DDL ------------------------------------------------

    fn schema_create(
        &self,
        name: &str,
        format: TableFormat,
        page_size: u32,
    ) -> Result<SchemaRef, DbErr>;
    fn schema_add_column(
        &self,
        schema: SchemaRef,
        name: &str,
        type_code: u32,
        attrs: u32,
        length: u32,
    ) -> Result<(), DbErr>;
    fn schema_add_index(&self, schema: SchemaRef, name: &str) -> Result<IndexRef, DbErr>;
    fn index_add_column(&self, index: IndexRef, name: &str, prefix_len: u32)
    -> Result<(), DbErr>;
    fn index_set_clustered(&self, index: IndexRef) -> Result<(), DbErr>;
    fn index_set_unique(&self, index: IndexRef) -> Result<(), DbErr>;
    /// Release a native schema object and every index it owns.
    fn schema_delete(&self, schema: SchemaRef) -> Result<(), DbErr>;
    fn table_create(&self, trx: TrxRef, schema: SchemaRef) -> Result<TableId, DbErr>;
    fn table_truncate(&self, name: &str) -> Result<TableId, DbErr>;
    fn table_open(&self, trx: TrxRef, name: &str) -> Result<TableRef, DbErr>;
    fn table_close(&self, table: TableRef) -> Result<(), DbErr>;

    // -- transactions and locking -----------------------------------------

    fn trx_begin(&self, level_code: u32) -> Result<TrxRef, DbErr>;
    fn trx_commit(&self, trx: TrxRef) -> Result<(), DbErr>;
    /// Roll back a transaction. The native context is released even when
    /// this reports a failure.
    fn trx_rollback(&self, trx: TrxRef) -> Result<(), DbErr>;
    /// Take the engine's exclusive schema (DDL) lock for `trx`. Blocks while
    /// another transaction holds it; released on commit or rollback.
    fn schema_lock_exclusive(&self, trx: TrxRef) -> Result<(), DbErr>;
}
