use std::fmt;

use tracing::{debug, warn};

use crate::engine::{DbErr, SchemaRef, TableRef, TrxRef};
use crate::error::{EngineFailure, Error, SchemaError, TxnError};
use crate::types::{IsolationLevel, TableId};

use super::handle::EngineHandle;

/// Lifecycle state of a [`TransactionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxnState::Active => "active",
            TxnState::Committed => "committed",
            TxnState::RolledBack => "rolled back",
        })
    }
}

/// One native transaction.
///
/// Single-use: exactly one of [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) succeeds in ending it, and any later call
/// fails with `InvalidTransactionState`. A handle dropped while still active
/// is rolled back best-effort with a warning; code in this crate always ends
/// its transactions explicitly.
pub struct TransactionHandle<'a> {
    handle: &'a EngineHandle,
    trx: TrxRef,
    level: IsolationLevel,
    state: TxnState,
}

impl<'a> TransactionHandle<'a> {
    pub(crate) fn begin(handle: &'a EngineHandle, level: IsolationLevel) -> Result<Self, Error> {
        handle.require_running()?;
        let trx = handle.engine().trx_begin(level.code()).map_err(|status| {
            let failure = EngineFailure::new("trx_begin", status);
            if status.is_resource_exhaustion() {
                Error::from(TxnError::ResourceExhausted(failure))
            } else {
                Error::Engine(failure)
            }
        })?;
        debug!(trx = trx.0, level = ?level, "transaction started");
        Ok(Self {
            handle,
            trx,
            level,
            state: TxnState::Active,
        })
    }

    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    pub fn trx_ref(&self) -> TrxRef {
        self.trx
    }

    fn ensure_active(&self, op: &'static str) -> Result<(), Error> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TxnError::InvalidState {
                op,
                state: self.state,
            }
            .into())
        }
    }

    /// Commit. If the engine refuses, the transaction is rolled back so it
    /// never stays active, and the commit failure is returned.
    pub fn commit(&mut self) -> Result<(), Error> {
        self.ensure_active("commit")?;
        let engine = self.handle.engine();
        match engine.trx_commit(self.trx) {
            Ok(()) => {
                self.state = TxnState::Committed;
                debug!(trx = self.trx.0, "transaction committed");
                Ok(())
            }
            Err(status) => {
                self.state = TxnState::RolledBack;
                warn!(trx = self.trx.0, error = %status, "commit failed; rolling back");
                if let Err(rb) = engine.trx_rollback(self.trx) {
                    warn!(trx = self.trx.0, error = %rb, "rollback after failed commit failed");
                }
                Err(Error::Engine(EngineFailure::new("trx_commit", status)))
            }
        }
    }

    /// Roll back. The handle is terminal afterwards even if the engine
    /// reports a failure, since the engine releases the context either way.
    pub fn rollback(&mut self) -> Result<(), Error> {
        self.ensure_active("rollback")?;
        self.state = TxnState::RolledBack;
        self.handle
            .engine()
            .trx_rollback(self.trx)
            .map_err(|status| Error::Engine(EngineFailure::new("trx_rollback", status)))?;
        debug!(trx = self.trx.0, "transaction rolled back");
        Ok(())
    }

    /// Take the engine's exclusive schema lock; held until this transaction
    /// ends.
    pub fn lock_schema_exclusive(&self) -> Result<(), Error> {
        self.ensure_active("lock schema in")?;
        self.handle
            .engine()
            .schema_lock_exclusive(self.trx)
            .map_err(|status| Error::Engine(EngineFailure::new("schema_lock_exclusive", status)))
    }

    /// Open a table by name within this transaction.
    ///
    /// A missing table is reported as `SchemaError::TableNotFound`, decided
    /// by the engine's status code.
    pub fn open_table(&self, name: &str) -> Result<OpenTable<'a>, Error> {
        self.ensure_active("open a table in")?;
        match self.handle.engine().table_open(self.trx, name) {
            Ok(table) => Ok(OpenTable {
                handle: self.handle,
                table,
                closed: false,
            }),
            Err(DbErr::TableNotFound) => Err(SchemaError::TableNotFound(name.to_string()).into()),
            Err(status) => Err(Error::Engine(EngineFailure::new("table_open", status))),
        }
    }

    /// Materialize a fully built native schema. Requires the schema lock.
    pub(crate) fn create_table(&self, schema: SchemaRef) -> Result<TableId, DbErr> {
        self.handle.engine().table_create(self.trx, schema)
    }
}

impl Drop for TransactionHandle<'_> {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            warn!(trx = self.trx.0, "transaction dropped while active; rolling back");
            self.state = TxnState::RolledBack;
            if let Err(status) = self.handle.engine().trx_rollback(self.trx) {
                warn!(trx = self.trx.0, error = %status, "rollback on drop failed");
            }
        }
    }
}

/// An open table reference, closed on [`close`](Self::close) or drop.
pub struct OpenTable<'a> {
    handle: &'a EngineHandle,
    table: TableRef,
    closed: bool,
}

impl OpenTable<'_> {
    pub fn table_ref(&self) -> TableRef {
        self.table
    }

    pub fn close(mut self) -> Result<(), Error> {
        self.closed = true;
        self.handle
            .engine()
            .table_close(self.table)
            .map_err(|status| Error::Engine(EngineFailure::new("table_close", status)))
    }
}

impl Drop for OpenTable<'_> {
    fn drop(&mut self) {
        if !self.closed
            && let Err(status) = self.handle.engine().table_close(self.table)
        {
            warn!(error = %status, "closing table on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfiguration;
    use crate::engine::{EngineOp, MemoryEngine};
    use crate::error::LifecycleError;

    fn running() -> (Arc<MemoryEngine>, EngineHandle) {
        let engine = Arc::new(MemoryEngine::new());
        let handle = EngineHandle::new(engine.clone());
        handle.startup(&EngineConfiguration::default()).unwrap();
        (engine, handle)
    }

    fn assert_invalid_state(err: Error, expected_op: &str, expected_state: TxnState) {
        match err {
            Error::Transaction(TxnError::InvalidState { op, state }) => {
                assert_eq!(op, expected_op);
                assert_eq!(state, expected_state);
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn test_commit_then_commit_or_rollback_is_invalid() {
        let (_engine, handle) = running();
        let mut txn = handle
            .begin_transaction(IsolationLevel::RepeatableRead)
            .unwrap();
        assert_eq!(txn.level(), IsolationLevel::RepeatableRead);
        txn.commit().unwrap();
        assert_eq!(txn.state(), TxnState::Committed);

        assert_invalid_state(txn.commit().unwrap_err(), "commit", TxnState::Committed);
        assert_invalid_state(txn.rollback().unwrap_err(), "rollback", TxnState::Committed);
    }

    #[test]
    fn test_rollback_then_anything_is_invalid() {
        let (_engine, handle) = running();
        let mut txn = handle.begin_transaction(IsolationLevel::Serializable).unwrap();
        txn.rollback().unwrap();
        assert_invalid_state(txn.rollback().unwrap_err(), "rollback", TxnState::RolledBack);
        assert_invalid_state(txn.commit().unwrap_err(), "commit", TxnState::RolledBack);
        assert!(txn.lock_schema_exclusive().is_err());
    }

    #[test]
    fn test_begin_requires_running_engine() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = EngineHandle::new(engine);
        let err = handle
            .begin_transaction(IsolationLevel::ReadCommitted)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::NotRunning)));
    }

    #[test]
    fn test_exhaustion_is_resource_exhausted() {
        let (engine, handle) = running();
        engine.set_max_transactions(1);
        let _held = handle.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        let err = handle
            .begin_transaction(IsolationLevel::ReadCommitted)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Transaction(TxnError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let (engine, handle) = running();
        let mut txn = handle.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        engine.fail_next(EngineOp::TrxCommit, DbErr::Deadlock);

        let err = txn.commit().unwrap_err();
        assert_eq!(err.engine_failure().map(|f| f.status), Some(DbErr::Deadlock));
        assert_eq!(txn.state(), TxnState::RolledBack);
        assert_eq!(engine.active_transactions(), 0);
    }

    #[test]
    fn test_failed_rollback_still_terminal_and_released() {
        let (engine, handle) = running();
        let mut txn = handle.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        engine.fail_next(EngineOp::TrxRollback, DbErr::Error);

        assert!(txn.rollback().is_err());
        assert_eq!(txn.state(), TxnState::RolledBack);
        assert_eq!(engine.active_transactions(), 0);
    }

    #[test]
    fn test_drop_rolls_back_active_transaction() {
        let (engine, handle) = running();
        {
            let txn = handle.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
            txn.lock_schema_exclusive().unwrap();
            assert_eq!(engine.active_transactions(), 1);
        }
        assert_eq!(engine.active_transactions(), 0);
        assert_eq!(engine.schema_lock_holder(), None);
    }

    #[test]
    fn test_open_missing_table_is_table_not_found() {
        let (engine, handle) = running();
        let mut txn = handle.begin_transaction(IsolationLevel::RepeatableRead).unwrap();
        let err = txn.open_table("db/missing").err().unwrap();
        assert!(matches!(err, Error::Schema(SchemaError::TableNotFound(_))));
        txn.rollback().unwrap();
        assert_eq!(engine.open_tables(), 0);
    }
}
