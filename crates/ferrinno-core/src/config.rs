//! Engine startup configuration.
//!
//! [`EngineConfiguration`] holds every tuning option the engine accepts, with
//! defaults. [`EngineConfiguration::options`] turns it into the exact ordered
//! list of `configure(name, value)` effects applied at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, LifecycleError};
use crate::types::FileFormat;

/// A configuration value as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(u64),
    Str(String),
}

impl ConfigValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            ConfigValue::Bool(_) => OptionKind::Bool,
            ConfigValue::Int(_) => OptionKind::Int,
            ConfigValue::Str(_) => OptionKind::Str,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", if *b { "on" } else { "off" }),
            ConfigValue::Int(n) => write!(f, "{n}"),
            ConfigValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// The value type an option expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Int,
    Str,
}

/// Every option name the engine recognizes, with its value type.
pub const KNOWN_OPTIONS: &[(&str, OptionKind)] = &[
    ("adaptive_hash_index", OptionKind::Bool),
    ("adaptive_flushing", OptionKind::Bool),
    ("doublewrite", OptionKind::Bool),
    ("file_per_table", OptionKind::Bool),
    ("checksums", OptionKind::Bool),
    ("print_verbose_log", OptionKind::Bool),
    ("rollback_on_timeout", OptionKind::Bool),
    ("status_file", OptionKind::Bool),
    ("use_sys_malloc", OptionKind::Bool),
    ("data_file_path", OptionKind::Str),
    ("data_home_dir", OptionKind::Str),
    ("log_group_home_dir", OptionKind::Str),
    ("flush_log_at_trx_commit", OptionKind::Int),
    ("flush_method", OptionKind::Str),
    ("force_recovery", OptionKind::Int),
    ("additional_mem_pool_size", OptionKind::Int),
    ("buffer_pool_size", OptionKind::Int),
    ("lru_block_access_recency", OptionKind::Int),
    ("lru_old_blocks_pct", OptionKind::Int),
    ("max_dirty_pages_pct", OptionKind::Int),
    ("max_purge_lag", OptionKind::Int),
    ("open_files", OptionKind::Int),
    ("autoextend_increment", OptionKind::Int),
    ("file_io_threads", OptionKind::Int),
    ("read_io_threads", OptionKind::Int),
    ("io_capacity", OptionKind::Int),
    ("sync_spin_loops", OptionKind::Int),
    ("write_io_threads", OptionKind::Int),
];

/// Look up the value type of a recognized option name.
pub fn option_kind(name: &str) -> Option<OptionKind> {
    KNOWN_OPTIONS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, kind)| *kind)
}

/// When the redo log is flushed relative to commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Write and flush roughly once per second.
    NoFlush,
    /// Write and flush at every commit.
    #[default]
    FlushAtCommit,
    /// Write at commit, flush once per second.
    WriteAtCommit,
}

impl FlushMode {
    pub fn code(self) -> u64 {
        match self {
            FlushMode::NoFlush => 0,
            FlushMode::FlushAtCommit => 1,
            FlushMode::WriteAtCommit => 2,
        }
    }
}

/// How data and log files are synced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMethod {
    #[default]
    Fsync,
    ODsync,
    ODirect,
    LittleSync,
    NoSync,
}

impl FlushMethod {
    pub fn code(self) -> &'static str {
        match self {
            FlushMethod::Fsync => "fsync",
            FlushMethod::ODsync => "O_DSYNC",
            FlushMethod::ODirect => "O_DIRECT",
            FlushMethod::LittleSync => "littlesync",
            FlushMethod::NoSync => "nosync",
        }
    }
}

/// Forced recovery level; anything above `None` is for salvaging data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    #[default]
    None,
    IgnoreCorrupt,
    NoBackground,
    NoTrxUndo,
    NoIbufMerge,
    NoUndoLogScan,
    NoLogRedo,
}

impl RecoveryMode {
    pub fn code(self) -> u64 {
        match self {
            RecoveryMode::None => 0,
            RecoveryMode::IgnoreCorrupt => 1,
            RecoveryMode::NoBackground => 2,
            RecoveryMode::NoTrxUndo => 3,
            RecoveryMode::NoIbufMerge => 4,
            RecoveryMode::NoUndoLogScan => 5,
            RecoveryMode::NoLogRedo => 6,
        }
    }
}

/// Startup parameter set for the engine.
///
/// # Example
///
/// ```rust
/// use ferrinno_core::config::EngineConfiguration;
///
/// let config = EngineConfiguration::default().with_buffer_pool_size(64 * 1024 * 1024);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.options().len(), 28);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    /// Default: true
    pub adaptive_hash_index: bool,
    /// Default: true
    pub adaptive_flushing: bool,
    /// Default: true
    pub doublewrite: bool,
    /// Default: true
    pub file_per_table: bool,
    /// Page checksums. Default: true
    pub checksums: bool,
    /// Default: false
    pub print_verbose_log: bool,
    /// Roll back the whole transaction on lock wait timeout. Default: true
    pub rollback_on_timeout: bool,
    /// Default: false
    pub status_file: bool,
    /// Default: false
    pub use_sys_malloc: bool,

    /// System tablespace definition. Default: `ibdata1:32M:autoextend`
    pub data_file_path: String,
    /// Default: `./`
    pub data_home_dir: String,
    /// Default: `./`
    pub log_group_home_dir: String,

    pub flush_log_at_trx_commit: FlushMode,
    pub flush_method: FlushMethod,
    pub force_recovery: RecoveryMode,

    /// Bytes. Default: 4 MB
    pub additional_mem_pool_size: u64,
    /// Bytes. Default: 8 MB
    pub buffer_pool_size: u64,
    /// Milliseconds. Default: 0
    pub lru_block_access_recency: u64,
    /// Default: 37
    pub lru_old_blocks_pct: u64,
    /// Default: 75
    pub max_dirty_pages_pct: u64,
    /// Seconds. Default: 0 (no lag limit)
    pub max_purge_lag: u64,
    /// Default: 300
    pub open_files: u64,
    /// Pages. Default: 8
    pub autoextend_increment: u64,
    /// Default: 4
    pub file_io_threads: u64,
    /// Default: 4
    pub read_io_threads: u64,
    /// Default: 4
    pub write_io_threads: u64,
    /// IOPS. Default: 200
    pub io_capacity: u64,
    /// Default: 30
    pub sync_spin_loops: u64,

    /// File format selected at startup. Default: barracuda
    pub file_format: FileFormat,

    /// Raw options passed through after the typed ones. Names are checked by
    /// the engine at startup.
    pub extra: BTreeMap<String, ConfigValue>,
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        Self {
            adaptive_hash_index: true,
            adaptive_flushing: true,
            doublewrite: true,
            file_per_table: true,
            checksums: true,
            print_verbose_log: false,
            rollback_on_timeout: true,
            status_file: false,
            use_sys_malloc: false,
            data_file_path: "ibdata1:32M:autoextend".to_string(),
            data_home_dir: "./".to_string(),
            log_group_home_dir: "./".to_string(),
            flush_log_at_trx_commit: FlushMode::default(),
            flush_method: FlushMethod::default(),
            force_recovery: RecoveryMode::default(),
            additional_mem_pool_size: 4 * 1024 * 1024,
            buffer_pool_size: 8 * 1024 * 1024,
            lru_block_access_recency: 0,
            lru_old_blocks_pct: 37,
            max_dirty_pages_pct: 75,
            max_purge_lag: 0,
            open_files: 300,
            autoextend_increment: 8,
            file_io_threads: 4,
            read_io_threads: 4,
            write_io_threads: 4,
            io_capacity: 200,
            sync_spin_loops: 30,
            file_format: FileFormat::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl EngineConfiguration {
    /// Defaults with both home directories pointed at `dir`.
    #[must_use]
    pub fn with_home_dir(dir: impl AsRef<Path>) -> Self {
        let dir = home_dir_string(dir.as_ref());
        Self {
            data_home_dir: dir.clone(),
            log_group_home_dir: dir,
            ..Default::default()
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| {
            LifecycleError::InvalidConfiguration {
                option: "<json>".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LifecycleError::InvalidConfiguration {
                option: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        Self::from_json_str(&text)
    }

    #[must_use]
    pub fn with_buffer_pool_size(mut self, bytes: u64) -> Self {
        self.buffer_pool_size = bytes;
        self
    }

    #[must_use]
    pub fn with_flush_log_at_trx_commit(mut self, mode: FlushMode) -> Self {
        self.flush_log_at_trx_commit = mode;
        self
    }

    #[must_use]
    pub fn with_file_format(mut self, format: FileFormat) -> Self {
        self.file_format = format;
        self
    }

    #[must_use]
    pub fn with_print_verbose_log(mut self, on: bool) -> Self {
        self.print_verbose_log = on;
        self
    }

    /// Add or replace a raw pass-through option.
    #[must_use]
    pub fn set_option(mut self, name: impl Into<String>, value: ConfigValue) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Check values the engine would otherwise reject only after partial
    /// application.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        fn invalid(option: &str, reason: impl Into<String>) -> LifecycleError {
            LifecycleError::InvalidConfiguration {
                option: option.to_string(),
                reason: reason.into(),
            }
        }

        for (option, value) in [
            ("data_file_path", &self.data_file_path),
            ("data_home_dir", &self.data_home_dir),
            ("log_group_home_dir", &self.log_group_home_dir),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(option, "must not be empty"));
            }
        }
        if self.buffer_pool_size == 0 {
            return Err(invalid("buffer_pool_size", "must be greater than zero"));
        }
        if !(5..=95).contains(&self.lru_old_blocks_pct) {
            return Err(invalid("lru_old_blocks_pct", "must be between 5 and 95"));
        }
        if self.max_dirty_pages_pct > 100 {
            return Err(invalid("max_dirty_pages_pct", "must be at most 100"));
        }
        for (option, threads) in [
            ("file_io_threads", self.file_io_threads),
            ("read_io_threads", self.read_io_threads),
            ("write_io_threads", self.write_io_threads),
        ] {
            if threads == 0 {
                return Err(invalid(option, "must be at least 1"));
            }
        }
        if self.io_capacity < 100 {
            return Err(invalid("io_capacity", "must be at least 100"));
        }
        if self.open_files < 10 {
            return Err(invalid("open_files", "must be at least 10"));
        }
        Ok(())
    }

    /// The ordered `configure` calls this configuration stands for.
    pub fn options(&self) -> Vec<ConfigOption> {
        use ConfigValue::{Bool, Int, Str};

        let mut options = vec![
            ConfigOption::new("adaptive_hash_index", Bool(self.adaptive_hash_index)),
            ConfigOption::new("adaptive_flushing", Bool(self.adaptive_flushing)),
            ConfigOption::new("doublewrite", Bool(self.doublewrite)),
            ConfigOption::new("file_per_table", Bool(self.file_per_table)),
            ConfigOption::new("checksums", Bool(self.checksums)),
            ConfigOption::new("print_verbose_log", Bool(self.print_verbose_log)),
            ConfigOption::new("rollback_on_timeout", Bool(self.rollback_on_timeout)),
            ConfigOption::new("status_file", Bool(self.status_file)),
            ConfigOption::new("use_sys_malloc", Bool(self.use_sys_malloc)),
            ConfigOption::new("data_file_path", Str(self.data_file_path.clone())),
            ConfigOption::new("data_home_dir", Str(self.data_home_dir.clone())),
            ConfigOption::new("log_group_home_dir", Str(self.log_group_home_dir.clone())),
            ConfigOption::new(
                "flush_log_at_trx_commit",
                Int(self.flush_log_at_trx_commit.code()),
            ),
            ConfigOption::new("flush_method", Str(self.flush_method.code().to_string())),
            ConfigOption::new("force_recovery", Int(self.force_recovery.code())),
            ConfigOption::new(
                "additional_mem_pool_size",
                Int(self.additional_mem_pool_size),
            ),
            ConfigOption::new("buffer_pool_size", Int(self.buffer_pool_size)),
            ConfigOption::new(
                "lru_block_access_recency",
                Int(self.lru_block_access_recency),
            ),
            ConfigOption::new("lru_old_blocks_pct", Int(self.lru_old_blocks_pct)),
            ConfigOption::new("max_dirty_pages_pct", Int(self.max_dirty_pages_pct)),
            ConfigOption::new("max_purge_lag", Int(self.max_purge_lag)),
            ConfigOption::new("open_files", Int(self.open_files)),
            ConfigOption::new("autoextend_increment", Int(self.autoextend_increment)),
            ConfigOption::new("file_io_threads", Int(self.file_io_threads)),
            ConfigOption::new("read_io_threads", Int(self.read_io_threads)),
            ConfigOption::new("io_capacity", Int(self.io_capacity)),
            ConfigOption::new("sync_spin_loops", Int(self.sync_spin_loops)),
            ConfigOption::new("write_io_threads", Int(self.write_io_threads)),
        ];
        options.extend(
            self.extra
                .iter()
                .map(|(name, value)| ConfigOption::new(name.clone(), value.clone())),
        );
        options
    }
}

/// One `configure(name, value)` effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOption {
    pub name: String,
    pub value: ConfigValue,
}

impl ConfigOption {
    pub fn new(name: impl Into<String>, value: ConfigValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The engine expects home directories with a trailing separator.
fn home_dir_string(dir: &Path) -> String {
    let mut s = dir.display().to_string();
    if !s.ends_with(std::path::MAIN_SEPARATOR) {
        s.push(std::path::MAIN_SEPARATOR);
    }
    s
}
