//! Core types: native codes, isolation levels, column/index/table definitions.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Table identifier assigned by the engine.
pub type TableId = u64;

/// Page size value meaning "use the engine's default".
pub const DEFAULT_PAGE_SIZE: u32 = 0;

/// Largest page size the engine accepts for a table.
pub const MAX_PAGE_SIZE: u32 = 16 * 1024;

/// Separator between database and table in a qualified table name.
pub const NAME_SEPARATOR: char = '/';

/// Transaction isolation level, ordered by increasing strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Native level code passed to `trx_begin`.
    pub fn code(self) -> u32 {
        match self {
            IsolationLevel::ReadUncommitted => 0,
            IsolationLevel::ReadCommitted => 1,
            IsolationLevel::RepeatableRead => 2,
            IsolationLevel::Serializable => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(IsolationLevel::ReadUncommitted),
            1 => Some(IsolationLevel::ReadCommitted),
            2 => Some(IsolationLevel::RepeatableRead),
            3 => Some(IsolationLevel::Serializable),
            _ => None,
        }
    }
}

/// Row storage format of a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableFormat {
    Redundant,
    #[default]
    Compact,
    Dynamic,
    Compressed,
}

impl TableFormat {
    pub fn code(self) -> u32 {
        match self {
            TableFormat::Redundant => 0,
            TableFormat::Compact => 1,
            TableFormat::Dynamic => 2,
            TableFormat::Compressed => 3,
        }
    }

    /// Parse a format name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "REDUNDANT" => Some(TableFormat::Redundant),
            "COMPACT" => Some(TableFormat::Compact),
            "DYNAMIC" => Some(TableFormat::Dynamic),
            "COMPRESSED" => Some(TableFormat::Compressed),
            _ => None,
        }
    }

    /// Whether this format needs the Barracuda file format.
    pub fn requires_barracuda(self) -> bool {
        matches!(self, TableFormat::Dynamic | TableFormat::Compressed)
    }
}

/// On-disk file format version selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Antelope,
    #[default]
    Barracuda,
}

impl FileFormat {
    pub fn name(self) -> &'static str {
        match self {
            FileFormat::Antelope => "antelope",
            FileFormat::Barracuda => "barracuda",
        }
    }
}

/// How the engine stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownMode {
    /// Flush dirty pages and write a clean checkpoint.
    Normal,
    /// Skip insert-buffer merge and purge.
    NoIbufMergePurge,
    /// Skip the buffer-pool flush; the next startup runs crash recovery.
    NoBufpoolFlush,
}

impl ShutdownMode {
    pub fn code(self) -> u32 {
        match self {
            ShutdownMode::Normal => 0,
            ShutdownMode::NoIbufMergePurge => 1,
            ShutdownMode::NoBufpoolFlush => 2,
        }
    }

    /// `fast` selects [`ShutdownMode::NoBufpoolFlush`].
    pub fn from_fast(fast: bool) -> Self {
        if fast {
            ShutdownMode::NoBufpoolFlush
        } else {
            ShutdownMode::Normal
        }
    }
}

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Varchar,
    Char,
    Binary,
    Varbinary,
    Blob,
    Int,
    Sys,
    Float,
    Double,
    Decimal,
    VarcharAnyCharset,
    CharAnyCharset,
}

impl ColumnType {
    pub fn code(self) -> u32 {
        match self {
            ColumnType::Varchar => 1,
            ColumnType::Char => 2,
            ColumnType::Binary => 3,
            ColumnType::Varbinary => 4,
            ColumnType::Blob => 5,
            ColumnType::Int => 6,
            ColumnType::Sys => 8,
            ColumnType::Float => 9,
            ColumnType::Double => 10,
            ColumnType::Decimal => 11,
            ColumnType::VarcharAnyCharset => 12,
            ColumnType::CharAnyCharset => 13,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => ColumnType::Varchar,
            2 => ColumnType::Char,
            3 => ColumnType::Binary,
            4 => ColumnType::Varbinary,
            5 => ColumnType::Blob,
            6 => ColumnType::Int,
            8 => ColumnType::Sys,
            9 => ColumnType::Float,
            10 => ColumnType::Double,
            11 => ColumnType::Decimal,
            12 => ColumnType::VarcharAnyCharset,
            13 => ColumnType::CharAnyCharset,
            _ => return None,
        })
    }

    /// Parse a SQL-ish type name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "VARCHAR" => ColumnType::Varchar,
            "CHAR" => ColumnType::Char,
            "BINARY" => ColumnType::Binary,
            "VARBINARY" => ColumnType::Varbinary,
            "BLOB" => ColumnType::Blob,
            "INT" | "INTEGER" => ColumnType::Int,
            "SYS" => ColumnType::Sys,
            "FLOAT" => ColumnType::Float,
            "DOUBLE" => ColumnType::Double,
            "DECIMAL" => ColumnType::Decimal,
            "VARCHAR_ANYCHARSET" => ColumnType::VarcharAnyCharset,
            "CHAR_ANYCHARSET" => ColumnType::CharAnyCharset,
            _ => return None,
        })
    }
}

bitflags! {
    /// Column attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ColumnAttrs: u32 {
        const NOT_NULL = 1;
        const UNSIGNED = 2;
        const NOT_USED = 4;
        const CUSTOM1 = 8;
        const CUSTOM2 = 16;
        const CUSTOM3 = 32;
    }
}

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    /// Declared length in bytes.
    pub length: u32,
    pub attrs: ColumnAttrs,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType, length: u32) -> Self {
        Self {
            name: name.into(),
            column_type,
            length,
            attrs: ColumnAttrs::empty(),
        }
    }

    pub fn with_attrs(mut self, attrs: ColumnAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    /// Length handed to the engine. BLOB columns carry no fixed width.
    pub fn native_length(&self) -> u32 {
        if self.column_type == ColumnType::Blob {
            0
        } else {
            self.length
        }
    }

    /// Attribute bits handed to the engine. Always zero for BLOB columns.
    pub fn native_attrs(&self) -> u32 {
        if self.column_type == ColumnType::Blob {
            0
        } else {
            self.attrs.bits()
        }
    }
}

/// One `(column, prefix length)` part of an index. A prefix length of zero
/// indexes the whole column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPart {
    pub column: String,
    pub prefix_len: u32,
}

/// Resolved role of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexRole {
    Clustered,
    Unique,
    Secondary,
}

/// One index of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub parts: Vec<IndexPart>,
    pub clustered: bool,
    pub unique: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: Vec::new(),
            clustered: false,
            unique: false,
        }
    }

    /// Append a part; parts are registered in the order they are added.
    pub fn part(mut self, column: impl Into<String>, prefix_len: u32) -> Self {
        self.parts.push(IndexPart {
            column: column.into(),
            prefix_len,
        });
        self
    }

    pub fn clustered(mut self) -> Self {
        self.clustered = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_clustered(&self) -> bool {
        self.clustered
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Clustered wins over unique: an index flagged both is clustered only.
    pub fn role(&self) -> IndexRole {
        if self.clustered {
            IndexRole::Clustered
        } else if self.unique {
            IndexRole::Unique
        } else {
            IndexRole::Secondary
        }
    }
}

/// A complete table definition: name, storage parameters, columns and
/// indexes in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Qualified name, `database/table`.
    pub name: String,
    pub format: TableFormat,
    pub page_size: u32,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The database part of the qualified name, if any.
    pub fn database(&self) -> Option<&str> {
        self.name.split_once(NAME_SEPARATOR).map(|(db, _)| db)
    }

    pub fn clustered_index(&self) -> Option<&IndexDef> {
        self.indexes.iter().find(|idx| idx.is_clustered())
    }
}
