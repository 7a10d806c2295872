use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::CatalogManager;
use crate::config::EngineConfiguration;
use crate::engine::{DbErr, Engine};
use crate::error::{EngineFailure, Error, LifecycleError};
use crate::types::{IsolationLevel, ShutdownMode};

use super::transaction::TransactionHandle;

/// Lifecycle state of an [`EngineHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Running,
    ShutDown,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Running => "running",
            EngineState::ShutDown => "shut down",
        })
    }
}

/// One live engine instance.
///
/// The handle owns the startup/shutdown state machine. It moves
/// `Uninitialized → Running → ShutDown` exactly once each way; every other
/// component borrows it and fails fast unless it is `Running`. The engine is
/// passed in rather than reached through a global, and only one handle can
/// have a given engine running at a time.
///
/// `EngineHandle` is `Send + Sync`; independent threads may each drive their
/// own transactions through a shared reference.
pub struct EngineHandle {
    engine: Arc<dyn Engine>,
    lifecycle: Mutex<Lifecycle>,
}

/// State machine position plus the configuration that took the handle to
/// `Running`. Both change under one lock.
struct Lifecycle {
    state: EngineState,
    config: Option<EngineConfiguration>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::Uninitialized,
                config: None,
            }),
        }
    }

    /// Apply every option of `config`, then start the engine.
    ///
    /// Fails with `ConfigurationError` on the first rejected option (the
    /// engine is left unstarted and the next `init` discards what was
    /// applied), with `StartupError` if the engine cannot start, and with
    /// `AlreadyRunning` if this handle, or another handle on the same
    /// engine, is running.
    pub fn startup(&self, config: &EngineConfiguration) -> Result<(), Error> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            EngineState::Uninitialized => {}
            EngineState::Running => return Err(LifecycleError::AlreadyRunning.into()),
            EngineState::ShutDown => return Err(LifecycleError::NotRunning.into()),
        }

        config.validate()?;

        self.engine.init().map_err(|status| match status {
            DbErr::AlreadyStarted => LifecycleError::AlreadyRunning,
            status => LifecycleError::Startup(EngineFailure::new("init", status)),
        })?;

        self.apply_options(config)?;

        self.engine
            .startup(config.file_format)
            .map_err(|status| LifecycleError::Startup(EngineFailure::new("startup", status)))?;

        lifecycle.config = Some(config.clone());
        lifecycle.state = EngineState::Running;

        info!(
            file_format = config.file_format.name(),
            data_home = %config.data_home_dir,
            "engine started"
        );
        Ok(())
    }

    /// Apply the configuration as a single step: stops at the first option
    /// the engine rejects and reports it.
    fn apply_options(&self, config: &EngineConfiguration) -> Result<(), LifecycleError> {
        config.options().into_iter().try_for_each(|opt| {
            self.engine
                .configure(&opt.name, &opt.value)
                .map_err(|status| LifecycleError::Configuration {
                    option: opt.name.clone(),
                    failure: EngineFailure::new("configure", status),
                })?;
            debug!(option = %opt.name, value = %opt.value, "option applied");
            Ok(())
        })
    }

    /// Stop the engine: `fast` skips the buffer-pool flush and leaves the
    /// next startup to crash recovery.
    pub fn shutdown(&self, fast: bool) -> Result<(), Error> {
        self.shutdown_with(ShutdownMode::from_fast(fast))
    }

    /// Stop the engine with an explicit mode.
    pub fn shutdown_with(&self, mode: ShutdownMode) -> Result<(), Error> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != EngineState::Running {
            return Err(LifecycleError::ShutdownNotRunning.into());
        }
        self.engine
            .shutdown(mode)
            .map_err(|status| LifecycleError::Shutdown(EngineFailure::new("shutdown", status)))?;
        lifecycle.state = EngineState::ShutDown;
        info!(mode = ?mode, "engine shut down");
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Fail fast with `NotRunning` unless the handle is running.
    pub fn require_running(&self) -> Result<(), Error> {
        if self.is_running() {
            Ok(())
        } else {
            Err(LifecycleError::NotRunning.into())
        }
    }

    /// The configuration the engine was started with. Kept after shutdown.
    pub fn config(&self) -> Option<EngineConfiguration> {
        self.lifecycle.lock().config.clone()
    }

    pub(crate) fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Begin a transaction at `level`.
    pub fn begin_transaction(&self, level: IsolationLevel) -> Result<TransactionHandle<'_>, Error> {
        TransactionHandle::begin(self, level)
    }

    /// Run `f` inside a transaction: commit if it returns `Ok`, roll back
    /// before returning its error otherwise.
    pub fn transact<F, R>(&self, level: IsolationLevel, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut TransactionHandle<'_>) -> Result<R, Error>,
    {
        let mut txn = self.begin_transaction(level)?;
        match f(&mut txn) {
            Ok(val) => {
                txn.commit()?;
                Ok(val)
            }
            Err(err) => {
                if txn.is_active()
                    && let Err(rb) = txn.rollback()
                {
                    warn!(error = %rb, "rollback after failed transaction body failed");
                }
                Err(err)
            }
        }
    }

    /// Catalog operations against this engine.
    pub fn catalog(&self) -> CatalogManager<'_> {
        CatalogManager::new(self)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().state == EngineState::Running {
            warn!("engine handle dropped while running; shutting down");
            if let Err(status) = self.engine.shutdown(ShutdownMode::Normal) {
                warn!(error = %status, "shutdown on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::config::ConfigValue;
    use crate::engine::{EngineOp, MemoryEngine};

    fn fixture() -> (Arc<MemoryEngine>, EngineHandle) {
        let engine = Arc::new(MemoryEngine::new());
        let handle = EngineHandle::new(engine.clone());
        (engine, handle)
    }

    #[test]
    fn test_startup_applies_every_option() {
        let dir = tempdir().unwrap();
        let (engine, handle) = fixture();
        let config = EngineConfiguration::with_home_dir(dir.path()).with_buffer_pool_size(1 << 24);

        handle.startup(&config).unwrap();

        assert_eq!(handle.state(), EngineState::Running);
        assert_eq!(
            engine.config_value("buffer_pool_size"),
            Some(ConfigValue::Int(1 << 24))
        );
        for opt in config.options() {
            assert_eq!(engine.config_value(&opt.name), Some(opt.value));
        }
        assert_eq!(handle.config(), Some(config));
    }

    #[test]
    fn test_config_recorded_only_by_successful_startup() {
        let dir = tempdir().unwrap();
        let (_engine, handle) = fixture();
        assert_eq!(handle.config(), None);

        let missing = EngineConfiguration::with_home_dir(dir.path().join("missing"));
        assert!(handle.startup(&missing).is_err());
        assert_eq!(handle.config(), None);

        let config = EngineConfiguration::with_home_dir(dir.path());
        handle.startup(&config).unwrap();
        handle.shutdown(false).unwrap();
        assert_eq!(handle.config(), Some(config));
    }

    #[test]
    fn test_double_startup_is_already_running() {
        let (_engine, handle) = fixture();
        handle.startup(&EngineConfiguration::default()).unwrap();
        let err = handle.startup(&EngineConfiguration::default()).unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::AlreadyRunning)));
    }

    #[test]
    fn test_second_handle_on_running_engine_is_already_running() {
        let (engine, first) = fixture();
        first.startup(&EngineConfiguration::default()).unwrap();

        let second = EngineHandle::new(engine.clone());
        let err = second.startup(&EngineConfiguration::default()).unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::AlreadyRunning)));
        assert_eq!(second.state(), EngineState::Uninitialized);

        first.shutdown(false).unwrap();
        second.startup(&EngineConfiguration::default()).unwrap();
        assert!(second.is_running());
    }

    #[test]
    fn test_unrecognized_option_fails_startup() {
        let (engine, handle) = fixture();
        let config =
            EngineConfiguration::default().set_option("warp_drive", ConfigValue::Bool(true));

        let err = handle.startup(&config).unwrap_err();
        match err {
            Error::Lifecycle(LifecycleError::Configuration { option, failure }) => {
                assert_eq!(option, "warp_drive");
                assert_eq!(failure.status, DbErr::InvalidInput);
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
        assert_eq!(handle.state(), EngineState::Uninitialized);
        assert!(!engine.is_started());
    }

    #[test]
    fn test_first_rejected_option_stops_application() {
        let (engine, handle) = fixture();
        engine.fail_next(EngineOp::Configure, DbErr::Error);

        let err = handle.startup(&EngineConfiguration::default()).unwrap_err();
        match err {
            Error::Lifecycle(LifecycleError::Configuration { option, .. }) => {
                assert_eq!(option, "adaptive_hash_index");
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
        // Nothing after the failing option reached the engine.
        assert_eq!(engine.config_value("adaptive_flushing"), None);
    }

    #[test]
    fn test_missing_home_dir_is_startup_error() {
        let dir = tempdir().unwrap();
        let (_engine, handle) = fixture();
        let config = EngineConfiguration::with_home_dir(dir.path().join("missing"));

        let err = handle.startup(&config).unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::Startup(_))));
        assert!(!handle.is_running());
    }

    #[test]
    fn test_invalid_value_rejected_before_engine_is_touched() {
        let (engine, handle) = fixture();
        let config = EngineConfiguration {
            io_capacity: 1,
            ..Default::default()
        };
        let err = handle.startup(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::InvalidConfiguration { .. })
        ));
        assert_eq!(engine.config_value("adaptive_hash_index"), None);
    }

    #[test]
    fn test_shutdown_state_machine() {
        let (engine, handle) = fixture();
        let err = handle.shutdown(false).unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::ShutdownNotRunning)
        ));

        handle.startup(&EngineConfiguration::default()).unwrap();
        handle.shutdown(true).unwrap();
        assert_eq!(handle.state(), EngineState::ShutDown);
        assert_eq!(engine.last_shutdown(), Some(ShutdownMode::NoBufpoolFlush));

        // ShutDown is terminal for this handle.
        assert!(handle.shutdown(false).is_err());
        let err = handle.startup(&EngineConfiguration::default()).unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::NotRunning)));
        assert!(matches!(
            handle.require_running(),
            Err(Error::Lifecycle(LifecycleError::NotRunning))
        ));
    }

    #[test]
    fn test_engine_shutdown_failure_keeps_running() {
        let (engine, handle) = fixture();
        handle.startup(&EngineConfiguration::default()).unwrap();
        engine.fail_next(EngineOp::Shutdown, DbErr::Error);

        let err = handle.shutdown(false).unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::Shutdown(_))));
        assert!(handle.is_running());
        handle.shutdown(false).unwrap();
    }

    #[test]
    fn test_drop_while_running_shuts_engine_down() {
        let (engine, handle) = fixture();
        handle.startup(&EngineConfiguration::default()).unwrap();
        drop(handle);
        assert!(!engine.is_started());
        assert_eq!(engine.last_shutdown(), Some(ShutdownMode::Normal));
    }

    #[test]
    fn test_transact_commits_or_rolls_back() {
        let (engine, handle) = fixture();
        handle.startup(&EngineConfiguration::default()).unwrap();

        let value = handle
            .transact(IsolationLevel::ReadCommitted, |_txn| Ok(7))
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(engine.active_transactions(), 0);

        let err = handle
            .transact(IsolationLevel::ReadCommitted, |txn| -> Result<(), Error> {
                txn.lock_schema_exclusive()?;
                Err(LifecycleError::NotRunning.into())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::NotRunning)));
        assert_eq!(engine.active_transactions(), 0);
        assert_eq!(engine.schema_lock_holder(), None);
    }
}
