//! In-process reference implementation of the engine call contract.
//!
//! `MemoryEngine` keeps the catalog (databases, tables, native schema and
//! index objects, transactions, the schema lock) in memory. It enforces the
//! same preconditions the storage kernel does, so the control layer can be
//! exercised without a native library. Catalog state survives
//! `shutdown`/`startup` cycles of the same instance, the way an on-disk
//! catalog would.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::{ConfigValue, option_kind};
use crate::types::{
    ColumnType, FileFormat, MAX_PAGE_SIZE, NAME_SEPARATOR, ShutdownMode, TableFormat, TableId,
};

use super::{DbErr, Engine, IndexRef, SchemaRef, TableRef, TrxRef};

/// Engine calls that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Init,
    Configure,
    Startup,
    Shutdown,
    DatabaseCreate,
    DatabaseDrop,
    SchemaCreate,
    SchemaAddColumn,
    SchemaAddIndex,
    IndexAddColumn,
    IndexSetClustered,
    IndexSetUnique,
    SchemaDelete,
    TableCreate,
    TableTruncate,
    TableOpen,
    TableClose,
    TrxBegin,
    TrxCommit,
    TrxRollback,
    SchemaLock,
}

/// A column as the engine stored it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeColumn {
    pub name: String,
    pub type_code: u32,
    pub attrs: u32,
    pub length: u32,
}

/// An index as the engine stored it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeIndex {
    pub name: String,
    pub columns: Vec<(String, u32)>,
    pub clustered: bool,
    pub unique: bool,
}

struct SchemaObject {
    name: String,
    format: TableFormat,
    page_size: u32,
    columns: Vec<NativeColumn>,
    indexes: Vec<(IndexRef, NativeIndex)>,
}

#[derive(Clone)]
struct TableEntry {
    id: TableId,
    columns: Vec<NativeColumn>,
    indexes: Vec<NativeIndex>,
}

struct TrxEntry {
    /// Tables created by this transaction, visible to others on commit.
    staged: Vec<(String, TableEntry)>,
}

struct Inner {
    initialized: bool,
    started: bool,
    config: BTreeMap<String, ConfigValue>,
    file_format: Option<FileFormat>,
    needs_recovery: bool,
    recoveries: u64,
    last_shutdown: Option<ShutdownMode>,
    databases: BTreeSet<String>,
    tables: BTreeMap<String, TableEntry>,
    schemas: HashMap<SchemaRef, SchemaObject>,
    index_owner: HashMap<IndexRef, SchemaRef>,
    trxs: HashMap<TrxRef, TrxEntry>,
    schema_lock_owner: Option<TrxRef>,
    open_tables: HashMap<TableRef, String>,
    next_ref: u64,
    next_table_id: TableId,
    max_trxs: usize,
    faults: Vec<(EngineOp, DbErr)>,
}

impl Inner {
    fn new() -> Self {
        Self {
            initialized: false,
            started: false,
            config: BTreeMap::new(),
            file_format: None,
            needs_recovery: false,
            recoveries: 0,
            last_shutdown: None,
            databases: BTreeSet::new(),
            tables: BTreeMap::new(),
            schemas: HashMap::new(),
            index_owner: HashMap::new(),
            trxs: HashMap::new(),
            schema_lock_owner: None,
            open_tables: HashMap::new(),
            next_ref: 1,
            next_table_id: 1,
            max_trxs: usize::MAX,
            faults: Vec::new(),
        }
    }

    /// Consume an injected failure for `op`, if one is pending.
    fn take_fault(&mut self, op: EngineOp) -> Result<(), DbErr> {
        match self.faults.iter().position(|(o, _)| *o == op) {
            Some(pos) => Err(self.faults.remove(pos).1),
            None => Ok(()),
        }
    }

    fn require_started(&self) -> Result<(), DbErr> {
        if self.started { Ok(()) } else { Err(DbErr::Error) }
    }

    fn next_ref(&mut self) -> u64 {
        let id = self.next_ref;
        self.next_ref += 1;
        id
    }

    fn schema_mut(&mut self, schema: SchemaRef) -> Result<&mut SchemaObject, DbErr> {
        self.schemas.get_mut(&schema).ok_or(DbErr::InvalidInput)
    }

    fn table_visible_to(&self, trx: TrxRef, name: &str) -> bool {
        self.tables.contains_key(name)
            || self
                .trxs
                .get(&trx)
                .is_some_and(|t| t.staged.iter().any(|(n, _)| n == name))
    }

    fn table_name_taken(&self, name: &str) -> bool {
        self.tables.contains_key(name)
            || self
                .trxs
                .values()
                .any(|t| t.staged.iter().any(|(n, _)| n == name))
    }

    /// End a transaction: drop it, close nothing, release the schema lock.
    /// Returns the staged tables so commit can publish them.
    fn end_trx(&mut self, trx: TrxRef) -> Option<Vec<(String, TableEntry)>> {
        if self.schema_lock_owner == Some(trx) {
            self.schema_lock_owner = None;
        }
        self.trxs.remove(&trx).map(|t| t.staged)
    }

    fn home_dir_ok(&self, option: &str) -> bool {
        match self.config.get(option) {
            Some(ConfigValue::Str(dir)) => Path::new(dir).is_dir(),
            _ => true,
        }
    }
}

/// In-memory engine. Cheap to create; one instance per test fixture.
pub struct MemoryEngine {
    inner: Mutex<Inner>,
    lock_released: Condvar,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            lock_released: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    /// Make the next call of `op` fail with `err`. Injected failures queue
    /// up in order per operation.
    pub fn fail_next(&self, op: EngineOp, err: DbErr) {
        self.lock().faults.push((op, err));
    }

    /// Cap the number of concurrently active transactions.
    pub fn set_max_transactions(&self, max: usize) {
        self.lock().max_trxs = max;
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn active_transactions(&self) -> usize {
        self.lock().trxs.len()
    }

    /// Native schema objects not yet released.
    pub fn live_schemas(&self) -> usize {
        self.lock().schemas.len()
    }

    pub fn open_tables(&self) -> usize {
        self.lock().open_tables.len()
    }

    pub fn schema_lock_holder(&self) -> Option<TrxRef> {
        self.lock().schema_lock_owner
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.lock().databases.contains(name)
    }

    /// Committed tables, in name order.
    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.lock().tables.get(name).map(|t| t.id)
    }

    pub fn table_columns(&self, name: &str) -> Option<Vec<NativeColumn>> {
        self.lock().tables.get(name).map(|t| t.columns.clone())
    }

    pub fn table_indexes(&self, name: &str) -> Option<Vec<NativeIndex>> {
        self.lock().tables.get(name).map(|t| t.indexes.clone())
    }

    /// The value applied for a configuration option since the last `init`.
    pub fn config_value(&self, name: &str) -> Option<ConfigValue> {
        self.lock().config.get(name).cloned()
    }

    pub fn file_format(&self) -> Option<FileFormat> {
        self.lock().file_format
    }

    pub fn last_shutdown(&self) -> Option<ShutdownMode> {
        self.lock().last_shutdown
    }

    /// Number of startups that had to run crash recovery.
    pub fn recovery_count(&self) -> u64 {
        self.lock().recoveries
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn valid_page_size(page_size: u32) -> bool {
    page_size == 0 || (page_size.is_power_of_two() && (1024..=MAX_PAGE_SIZE).contains(&page_size))
}

/// Fixed-width types must be declared with their native width.
fn valid_column_width(column_type: ColumnType, length: u32) -> bool {
    match column_type {
        ColumnType::Blob => length == 0,
        ColumnType::Int => matches!(length, 1 | 2 | 4 | 8),
        ColumnType::Float => length == 4,
        ColumnType::Double => length == 8,
        _ => true,
    }
}

impl Engine for MemoryEngine {
    fn init(&self) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::Init)?;
        if inner.started {
            return Err(DbErr::AlreadyStarted);
        }
        inner.initialized = true;
        inner.config.clear();
        Ok(())
    }

    fn configure(&self, name: &str, value: &ConfigValue) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::Configure)?;
        if !inner.initialized || inner.started {
            return Err(DbErr::Error);
        }
        match option_kind(name) {
            Some(kind) if kind == value.kind() => {
                inner.config.insert(name.to_string(), value.clone());
                Ok(())
            }
            _ => Err(DbErr::InvalidInput),
        }
    }

    fn startup(&self, format: FileFormat) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::Startup)?;
        if inner.started {
            return Err(DbErr::AlreadyStarted);
        }
        if !inner.initialized {
            return Err(DbErr::Error);
        }
        if !inner.home_dir_ok("data_home_dir") || !inner.home_dir_ok("log_group_home_dir") {
            return Err(DbErr::Error);
        }
        if inner.needs_recovery {
            inner.needs_recovery = false;
            inner.recoveries += 1;
        }
        inner.file_format = Some(format);
        inner.started = true;
        Ok(())
    }

    fn shutdown(&self, mode: ShutdownMode) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::Shutdown)?;
        inner.require_started()?;
        // Uncommitted work does not survive shutdown.
        inner.trxs.clear();
        inner.schema_lock_owner = None;
        inner.open_tables.clear();
        inner.started = false;
        inner.initialized = false;
        inner.needs_recovery = mode == ShutdownMode::NoBufpoolFlush;
        inner.last_shutdown = Some(mode);
        drop(inner);
        self.lock_released.notify_all();
        Ok(())
    }

    fn database_create(&self, name: &str) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::DatabaseCreate)?;
        inner.require_started()?;
        if name.is_empty() || name.contains(NAME_SEPARATOR) {
            return Err(DbErr::InvalidInput);
        }
        if !inner.databases.insert(name.to_string()) {
            return Err(DbErr::DuplicateKey);
        }
        Ok(())
    }

    fn database_drop(&self, name: &str) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::DatabaseDrop)?;
        inner.require_started()?;
        if !inner.databases.remove(name) {
            return Err(DbErr::NotFound);
        }
        let prefix = format!("{name}{NAME_SEPARATOR}");
        inner.tables.retain(|table, _| !table.starts_with(&prefix));
        Ok(())
    }

    fn schema_create(
        &self,
        name: &str,
        format: TableFormat,
        page_size: u32,
    ) -> Result<SchemaRef, DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::SchemaCreate)?;
        inner.require_started()?;
        match name.split_once(NAME_SEPARATOR) {
            Some((db, table)) if !db.is_empty() && !table.is_empty() => {}
            _ => return Err(DbErr::InvalidInput),
        }
        if !valid_page_size(page_size) {
            return Err(DbErr::InvalidInput);
        }
        if format.requires_barracuda() && inner.file_format != Some(FileFormat::Barracuda) {
            return Err(DbErr::Unsupported);
        }
        let schema = SchemaRef(inner.next_ref());
        inner.schemas.insert(
            schema,
            SchemaObject {
                name: name.to_string(),
                format,
                page_size,
                columns: Vec::new(),
                indexes: Vec::new(),
            },
        );
        Ok(schema)
    }

    fn schema_add_column(
        &self,
        schema: SchemaRef,
        name: &str,
        type_code: u32,
        attrs: u32,
        length: u32,
    ) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::SchemaAddColumn)?;
        let obj = inner.schema_mut(schema)?;
        let column_type = ColumnType::from_code(type_code).ok_or(DbErr::InvalidInput)?;
        if name.is_empty() || !valid_column_width(column_type, length) {
            return Err(DbErr::InvalidInput);
        }
        if column_type == ColumnType::Blob && attrs != 0 {
            return Err(DbErr::InvalidInput);
        }
        if obj.columns.iter().any(|c| c.name == name) {
            return Err(DbErr::SchemaError);
        }
        obj.columns.push(NativeColumn {
            name: name.to_string(),
            type_code,
            attrs,
            length,
        });
        Ok(())
    }

    fn schema_add_index(&self, schema: SchemaRef, name: &str) -> Result<IndexRef, DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::SchemaAddIndex)?;
        let index = IndexRef(inner.next_ref());
        let obj = inner.schema_mut(schema)?;
        if name.is_empty() {
            return Err(DbErr::InvalidInput);
        }
        if obj.indexes.iter().any(|(_, idx)| idx.name == name) {
            return Err(DbErr::SchemaError);
        }
        obj.indexes.push((
            index,
            NativeIndex {
                name: name.to_string(),
                columns: Vec::new(),
                clustered: false,
                unique: false,
            },
        ));
        inner.index_owner.insert(index, schema);
        Ok(index)
    }

    fn index_add_column(
        &self,
        index: IndexRef,
        name: &str,
        prefix_len: u32,
    ) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::IndexAddColumn)?;
        let schema = *inner.index_owner.get(&index).ok_or(DbErr::InvalidInput)?;
        let obj = inner.schema_mut(schema)?;
        if !obj.columns.iter().any(|c| c.name == name) {
            return Err(DbErr::NotFound);
        }
        let (_, idx) = obj
            .indexes
            .iter_mut()
            .find(|(r, _)| *r == index)
            .ok_or(DbErr::InvalidInput)?;
        if idx.columns.iter().any(|(c, _)| c == name) {
            return Err(DbErr::ColAppearsTwiceInIndex);
        }
        idx.columns.push((name.to_string(), prefix_len));
        Ok(())
    }

    fn index_set_clustered(&self, index: IndexRef) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::IndexSetClustered)?;
        let schema = *inner.index_owner.get(&index).ok_or(DbErr::InvalidInput)?;
        let obj = inner.schema_mut(schema)?;
        if obj
            .indexes
            .iter()
            .any(|(r, idx)| *r != index && idx.clustered)
        {
            return Err(DbErr::SchemaError);
        }
        let (_, idx) = obj
            .indexes
            .iter_mut()
            .find(|(r, _)| *r == index)
            .ok_or(DbErr::InvalidInput)?;
        idx.clustered = true;
        Ok(())
    }

    fn index_set_unique(&self, index: IndexRef) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::IndexSetUnique)?;
        let schema = *inner.index_owner.get(&index).ok_or(DbErr::InvalidInput)?;
        let obj = inner.schema_mut(schema)?;
        let (_, idx) = obj
            .indexes
            .iter_mut()
            .find(|(r, _)| *r == index)
            .ok_or(DbErr::InvalidInput)?;
        idx.unique = true;
        Ok(())
    }

    fn schema_delete(&self, schema: SchemaRef) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::SchemaDelete)?;
        inner.schemas.remove(&schema).ok_or(DbErr::InvalidInput)?;
        inner.index_owner.retain(|_, owner| *owner != schema);
        Ok(())
    }

    fn table_create(&self, trx: TrxRef, schema: SchemaRef) -> Result<TableId, DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::TableCreate)?;
        inner.require_started()?;
        if !inner.trxs.contains_key(&trx) {
            return Err(DbErr::InvalidInput);
        }
        if inner.schema_lock_owner != Some(trx) {
            return Err(DbErr::SchemaNotLocked);
        }
        let obj = inner.schemas.get(&schema).ok_or(DbErr::InvalidInput)?;
        let name = obj.name.clone();
        let database = name
            .split_once(NAME_SEPARATOR)
            .map(|(db, _)| db)
            .ok_or(DbErr::InvalidInput)?;
        if !inner.databases.contains(database) {
            return Err(DbErr::NotFound);
        }
        if obj.format.requires_barracuda() && inner.file_format != Some(FileFormat::Barracuda) {
            return Err(DbErr::Unsupported);
        }
        if obj.format == TableFormat::Compressed && obj.page_size == 0 {
            return Err(DbErr::InvalidInput);
        }
        if obj.columns.is_empty() || obj.indexes.iter().any(|(_, idx)| idx.columns.is_empty()) {
            return Err(DbErr::SchemaError);
        }
        if inner.table_name_taken(&name) {
            return Err(DbErr::TableIsBeingUsed);
        }
        let entry = TableEntry {
            id: inner.next_table_id,
            columns: obj.columns.clone(),
            indexes: obj.indexes.iter().map(|(_, idx)| idx.clone()).collect(),
        };
        inner.next_table_id += 1;
        let id = entry.id;
        inner
            .trxs
            .get_mut(&trx)
            .ok_or(DbErr::InvalidInput)?
            .staged
            .push((name, entry));
        Ok(id)
    }

    fn table_truncate(&self, name: &str) -> Result<TableId, DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::TableTruncate)?;
        inner.require_started()?;
        let new_id = inner.next_table_id;
        let table = inner.tables.get_mut(name).ok_or(DbErr::TableNotFound)?;
        // Truncate recreates the table under a fresh id.
        table.id = new_id;
        inner.next_table_id += 1;
        Ok(new_id)
    }

    fn table_open(&self, trx: TrxRef, name: &str) -> Result<TableRef, DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::TableOpen)?;
        inner.require_started()?;
        if !inner.trxs.contains_key(&trx) {
            return Err(DbErr::InvalidInput);
        }
        if !inner.table_visible_to(trx, name) {
            return Err(DbErr::TableNotFound);
        }
        let table = TableRef(inner.next_ref());
        inner.open_tables.insert(table, name.to_string());
        Ok(table)
    }

    fn table_close(&self, table: TableRef) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::TableClose)?;
        inner
            .open_tables
            .remove(&table)
            .map(|_| ())
            .ok_or(DbErr::InvalidInput)
    }

    fn trx_begin(&self, level_code: u32) -> Result<TrxRef, DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::TrxBegin)?;
        inner.require_started()?;
        if level_code > 3 {
            return Err(DbErr::InvalidInput);
        }
        if inner.trxs.len() >= inner.max_trxs {
            return Err(DbErr::TooManyConcurrentTrxs);
        }
        let trx = TrxRef(inner.next_ref());
        inner.trxs.insert(trx, TrxEntry { staged: Vec::new() });
        Ok(trx)
    }

    fn trx_commit(&self, trx: TrxRef) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::TrxCommit)?;
        let staged = inner.end_trx(trx).ok_or(DbErr::InvalidInput)?;
        for (name, entry) in staged {
            inner.tables.insert(name, entry);
        }
        drop(inner);
        self.lock_released.notify_all();
        Ok(())
    }

    fn trx_rollback(&self, trx: TrxRef) -> Result<(), DbErr> {
        let mut inner = self.lock();
        // The context is released before any failure is reported.
        let ended = inner.end_trx(trx);
        let fault = inner.take_fault(EngineOp::TrxRollback);
        drop(inner);
        self.lock_released.notify_all();
        fault?;
        ended.map(|_| ()).ok_or(DbErr::InvalidInput)
    }

    fn schema_lock_exclusive(&self, trx: TrxRef) -> Result<(), DbErr> {
        let mut inner = self.lock();
        inner.take_fault(EngineOp::SchemaLock)?;
        loop {
            if !inner.started || !inner.trxs.contains_key(&trx) {
                return Err(DbErr::InvalidInput);
            }
            let owner = inner.schema_lock_owner;
            match owner {
                None => {
                    inner.schema_lock_owner = Some(trx);
                    return Ok(());
                }
                Some(owner) if owner == trx => return Ok(()),
                Some(_) => self.lock_released.wait(&mut inner),
            }
        }
    }
}
