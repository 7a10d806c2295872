//! Error types for all ferrinno operations.

use thiserror::Error;

use crate::api::transaction::TxnState;
use crate::engine::DbErr;

/// A native engine failure: which engine call failed and with what status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{op} failed: {status} (status {})", .status.code())]
pub struct EngineFailure {
    pub op: &'static str,
    pub status: DbErr,
}

impl EngineFailure {
    pub fn new(op: &'static str, status: DbErr) -> Self {
        Self { op, status }
    }
}

/// Top-level error type for ferrinno operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Transaction(#[from] TxnError),

    /// A native failure outside the typed categories (lock, commit, create).
    #[error("engine error: {0}")]
    Engine(EngineFailure),
}

impl Error {
    /// The native failure behind this error, if there is one.
    pub fn engine_failure(&self) -> Option<EngineFailure> {
        match self {
            Error::Engine(f) => Some(*f),
            Error::Lifecycle(
                LifecycleError::Configuration { failure, .. }
                | LifecycleError::Startup(failure)
                | LifecycleError::Shutdown(failure),
            ) => Some(*failure),
            Error::Schema(
                SchemaError::SchemaOperation { failure, .. }
                | SchemaError::SchemaDefinition { failure, .. }
                | SchemaError::Truncate { failure, .. },
            ) => Some(*failure),
            Error::Transaction(TxnError::ResourceExhausted(failure)) => Some(*failure),
            _ => None,
        }
    }
}

impl From<EngineFailure> for Error {
    fn from(failure: EngineFailure) -> Self {
        Error::Engine(failure)
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuration option '{option}' rejected: {failure}")]
    Configuration {
        option: String,
        failure: EngineFailure,
    },

    #[error("invalid value for configuration option '{option}': {reason}")]
    InvalidConfiguration { option: String, reason: String },

    #[error("engine startup failed: {0}")]
    Startup(EngineFailure),

    #[error("engine shutdown failed: {0}")]
    Shutdown(EngineFailure),

    #[error("engine shutdown failed: engine is not running")]
    ShutdownNotRunning,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema operation on '{name}' failed: {failure}")]
    SchemaOperation {
        name: String,
        failure: EngineFailure,
    },

    #[error("definition of '{object}' rejected: {failure}")]
    SchemaDefinition {
        object: String,
        failure: EngineFailure,
    },

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("truncate of '{table}' failed: {failure}")]
    Truncate {
        table: String,
        failure: EngineFailure,
    },

    #[error("schema '{0}' is partially built after a failed definition and must be discarded")]
    SchemaUnusable(String),

    #[error("invalid table definition for '{table}': {reason}")]
    InvalidTableDef { table: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TxnError {
    #[error("cannot {op} a transaction that is {state}")]
    InvalidState { op: &'static str, state: TxnState },

    #[error("engine resources exhausted: {0}")]
    ResourceExhausted(EngineFailure),
}

pub type Result<T> = std::result::Result<T, Error>;
