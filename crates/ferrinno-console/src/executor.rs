use ferrinno_core::api::{EngineHandle, EngineState};
use ferrinno_core::error::Error;
use ferrinno_core::types::{FileFormat, TableId};

use crate::commands::Command;

/// Structured result from executing a command.
pub enum CommandResult {
    /// DDL succeeded (CREATE/DROP DATABASE).
    Ok(String),
    /// Table created or truncated, with its table id.
    Table { message: String, id: TableId },
    /// Existence probe result (EXISTS).
    Exists { table: String, exists: bool },
    /// Engine status (STATUS).
    Status(StatusInfo),
    /// Help text (optional topic for per-command help).
    Help(Option<String>),
    /// Exit signal.
    Exit,
}

pub struct StatusInfo {
    pub state: EngineState,
    pub file_format: Option<FileFormat>,
    pub data_home_dir: Option<String>,
    pub buffer_pool_size: Option<u64>,
}

/// Execute a parsed command against the engine.
pub fn execute(handle: &EngineHandle, cmd: Command) -> Result<CommandResult, Error> {
    let catalog = handle.catalog();
    match cmd {
        Command::CreateDatabase { name } => {
            catalog.create_database(&name)?;
            Ok(CommandResult::Ok(format!("Database '{name}' created")))
        }
        Command::DropDatabase { name } => {
            catalog.drop_database(&name)?;
            Ok(CommandResult::Ok(format!("Database '{name}' dropped")))
        }
        Command::CreateTable { def } => {
            let id = catalog.create_table_from_def(&def)?;
            Ok(CommandResult::Table {
                message: format!("Table '{}' created", def.name),
                id,
            })
        }
        Command::Exists { table } => {
            let exists = catalog.table_exists_named(&table)?;
            Ok(CommandResult::Exists { table, exists })
        }
        Command::Truncate { table } => {
            let id = catalog.truncate_table(&table)?;
            Ok(CommandResult::Table {
                message: format!("Table '{table}' truncated"),
                id,
            })
        }
        Command::Status => {
            let config = handle.config();
            Ok(CommandResult::Status(StatusInfo {
                state: handle.state(),
                file_format: config.as_ref().map(|c| c.file_format),
                buffer_pool_size: config.as_ref().map(|c| c.buffer_pool_size),
                data_home_dir: config.map(|c| c.data_home_dir),
            }))
        }
        Command::Help(topic) => Ok(CommandResult::Help(topic)),
        Command::Exit => Ok(CommandResult::Exit),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ferrinno_core::config::EngineConfiguration;
    use ferrinno_core::engine::MemoryEngine;

    use super::*;
    use crate::parser::parse;

    fn running() -> EngineHandle {
        let handle = EngineHandle::new(Arc::new(MemoryEngine::new()));
        handle.startup(&EngineConfiguration::default()).unwrap();
        handle
    }

    fn run(handle: &EngineHandle, line: &str) -> Result<CommandResult, Error> {
        execute(handle, parse(line).unwrap())
    }

    #[test]
    fn test_create_then_exists() {
        let handle = running();
        run(&handle, "CREATE DATABASE shop").unwrap();
        run(
            &handle,
            "CREATE TABLE shop/orders (id INT(8) NOT NULL, CLUSTERED INDEX PRIMARY (id))",
        )
        .unwrap();

        match run(&handle, "EXISTS shop/orders").unwrap() {
            CommandResult::Exists { exists, .. } => assert!(exists),
            _ => panic!("expected Exists"),
        }
        match run(&handle, "EXISTS shop/missing").unwrap() {
            CommandResult::Exists { exists, .. } => assert!(!exists),
            _ => panic!("expected Exists"),
        }
    }

    #[test]
    fn test_duplicate_table_is_error() {
        let handle = running();
        run(&handle, "CREATE DATABASE shop").unwrap();
        let create = "CREATE TABLE shop/orders (id INT)";
        run(&handle, create).unwrap();
        let err = run(&handle, create).err().unwrap();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_status_reports_running_engine() {
        let handle = running();
        match run(&handle, "STATUS").unwrap() {
            CommandResult::Status(info) => {
                assert_eq!(info.state, EngineState::Running);
                assert_eq!(info.file_format, Some(FileFormat::Barracuda));
            }
            _ => panic!("expected Status"),
        }
    }
}
