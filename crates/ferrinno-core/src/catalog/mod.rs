//! Catalog management: databases, table creation, existence checks and
//! truncation.

pub mod ops;

use tracing::{debug, info};

use crate::api::handle::EngineHandle;
use crate::api::schema::SchemaBuilder;
use crate::api::transaction::TransactionHandle;
use crate::engine::DbErr;
use crate::error::{EngineFailure, Error, SchemaError};
use crate::types::{IsolationLevel, TableDef, TableFormat, TableId};

/// Catalog operations against one running engine.
///
/// A table is created in three phases. `create_schema` allocates a native
/// schema object, `create_table` replays whatever part of the definition
/// was not already added through the builder, and a final transaction holding the exclusive schema
/// lock materializes and commits the table. A failure at any point leaves
/// no table behind and no transaction open.
pub struct CatalogManager<'a> {
    handle: &'a EngineHandle,
}

impl<'a> CatalogManager<'a> {
    pub(crate) fn new(handle: &'a EngineHandle) -> Self {
        Self { handle }
    }

    pub fn create_database(&self, name: &str) -> Result<(), Error> {
        self.handle.require_running()?;
        self.handle
            .engine()
            .database_create(name)
            .map_err(|status| schema_operation(name, "database_create", status))?;
        info!(database = name, "database created");
        Ok(())
    }

    /// Drop a database and every table in it. Dropping a database that does
    /// not exist succeeds.
    pub fn drop_database(&self, name: &str) -> Result<(), Error> {
        self.handle.require_running()?;
        match self.handle.engine().database_drop(name) {
            Ok(()) => {
                info!(database = name, "database dropped");
                Ok(())
            }
            Err(DbErr::NotFound) => {
                debug!(database = name, "database not present; nothing to drop");
                Ok(())
            }
            Err(status) => Err(schema_operation(name, "database_drop", status)),
        }
    }

    /// Allocate an empty native schema for the table `name`
    /// (`database/table`). A `page_size` of 0 selects the engine default.
    pub fn create_schema(
        &self,
        name: &str,
        format: TableFormat,
        page_size: u32,
    ) -> Result<SchemaBuilder<'a>, Error> {
        let schema = ops::create_native_schema(self.handle, name, format, page_size)?;
        debug!(table = name, format = ?format, page_size, "native schema created");
        Ok(SchemaBuilder::new(self.handle, schema, name, format, page_size))
    }

    /// Create the table described by `def` on `schema`.
    ///
    /// Columns and indexes already added through the builder must be the
    /// leading entries of `def`; the rest are added here. Fails with
    /// `TableAlreadyExists` if the table exists before the definition is
    /// replayed. The schema is consumed whether or not the table is created.
    pub fn create_table(&self, mut schema: SchemaBuilder<'a>, def: &TableDef) -> Result<TableId, Error> {
        schema.ensure_usable()?;
        if schema.name() != def.name() {
            return Err(SchemaError::InvalidTableDef {
                table: def.name().to_string(),
                reason: format!("schema was created for '{}'", schema.name()),
            }
            .into());
        }

        if ops::probe_table(self.handle, def.name())? {
            return Err(SchemaError::TableAlreadyExists(def.name().to_string()).into());
        }

        ops::replay_definition(&mut schema, def)?;
        let id = ops::materialize(self.handle, &schema)?;
        info!(
            table = def.name(),
            id,
            columns = def.columns.len(),
            indexes = def.indexes.len(),
            "table created"
        );
        Ok(id)
    }

    /// Create a table in one call: schema allocation followed by
    /// [`create_table`](Self::create_table).
    pub fn create_table_from_def(&self, def: &TableDef) -> Result<TableId, Error> {
        let schema = self.create_schema(def.name(), def.format, def.page_size)?;
        self.create_table(schema, def)
    }

    pub fn table_exists(&self, def: &TableDef) -> Result<bool, Error> {
        self.table_exists_named(def.name())
    }

    pub fn table_exists_named(&self, name: &str) -> Result<bool, Error> {
        let exists = ops::probe_table(self.handle, name)?;
        debug!(table = name, exists, "existence probe");
        Ok(exists)
    }

    /// Remove every row of a table. Returns the table's new id.
    pub fn truncate_table(&self, name: &str) -> Result<TableId, Error> {
        self.handle.require_running()?;
        let id = self
            .handle
            .engine()
            .table_truncate(name)
            .map_err(|status| SchemaError::Truncate {
                table: name.to_string(),
                failure: EngineFailure::new("table_truncate", status),
            })?;
        info!(table = name, id, "table truncated");
        Ok(id)
    }

    pub fn begin_transaction(&self, level: IsolationLevel) -> Result<TransactionHandle<'a>, Error> {
        self.handle.begin_transaction(level)
    }
}

fn schema_operation(name: &str, op: &'static str, status: DbErr) -> Error {
    SchemaError::SchemaOperation {
        name: name.to_string(),
        failure: EngineFailure::new(op, status),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfiguration;
    use crate::engine::{EngineOp, MemoryEngine};
    use crate::types::{ColumnAttrs, ColumnType, IndexDef};

    fn running() -> (Arc<MemoryEngine>, EngineHandle) {
        let engine = Arc::new(MemoryEngine::new());
        let handle = EngineHandle::new(engine.clone());
        handle.startup(&EngineConfiguration::default()).unwrap();
        (engine, handle)
    }

    fn users() -> TableDef {
        TableDef::builder("app/users")
            .column_with("id", ColumnType::Int, 4, ColumnAttrs::NOT_NULL | ColumnAttrs::UNSIGNED)
            .column("email", ColumnType::Varchar, 128)
            .index(IndexDef::new("PRIMARY").part("id", 0).clustered().unique())
            .index(IndexDef::new("by_email").part("email", 16).unique())
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_database_twice_is_schema_operation_error() {
        let (_engine, handle) = running();
        let catalog = handle.catalog();
        catalog.create_database("app").unwrap();
        let err = catalog.create_database("app").unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::SchemaOperation { .. })
        ));
    }

    #[test]
    fn test_drop_database_failure_other_than_missing_propagates() {
        let (engine, handle) = running();
        let catalog = handle.catalog();
        catalog.create_database("app").unwrap();
        engine.fail_next(EngineOp::DatabaseDrop, DbErr::TableIsBeingUsed);
        let err = catalog.drop_database("app").unwrap_err();
        assert_eq!(
            err.engine_failure().map(|f| f.status),
            Some(DbErr::TableIsBeingUsed)
        );
        assert!(engine.has_database("app"));
    }

    #[test]
    fn test_index_roles_reach_engine() {
        let (engine, handle) = running();
        let catalog = handle.catalog();
        catalog.create_database("app").unwrap();
        catalog.create_table_from_def(&users()).unwrap();

        let indexes = engine.table_indexes("app/users").unwrap();
        assert_eq!(indexes.len(), 2);
        // Clustered takes precedence over unique.
        assert!(indexes[0].clustered);
        assert!(!indexes[0].unique);
        assert!(!indexes[1].clustered);
        assert!(indexes[1].unique);
        assert_eq!(indexes[1].columns, vec![("email".to_string(), 16)]);
    }

    #[test]
    fn test_schema_for_other_table_is_rejected() {
        let (engine, handle) = running();
        let catalog = handle.catalog();
        catalog.create_database("app").unwrap();
        let schema = catalog.create_schema("app/other", TableFormat::Compact, 0).unwrap();

        let err = catalog.create_table(schema, &users()).unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::InvalidTableDef { .. })
        ));
        assert_eq!(engine.live_schemas(), 0);
        assert!(!catalog.table_exists(&users()).unwrap());
    }

    #[test]
    fn test_poisoned_schema_is_unusable() {
        let (engine, handle) = running();
        let catalog = handle.catalog();
        catalog.create_database("app").unwrap();
        let mut schema = catalog.create_schema("app/users", TableFormat::Compact, 0).unwrap();
        engine.fail_next(EngineOp::SchemaAddColumn, DbErr::OutOfMemory);

        let err = schema
            .add_column(&users().columns[0])
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::SchemaDefinition { .. })
        ));
        assert!(schema.is_poisoned());

        let err = catalog.create_table(schema, &users()).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::SchemaUnusable(_))));
        assert_eq!(engine.active_transactions(), 0);
    }

    #[test]
    fn test_truncate_missing_table_is_truncate_error() {
        let (_engine, handle) = running();
        let err = handle.catalog().truncate_table("app/none").unwrap_err();
        match err {
            Error::Schema(SchemaError::Truncate { table, failure }) => {
                assert_eq!(table, "app/none");
                assert_eq!(failure.status, DbErr::TableNotFound);
            }
            other => panic!("expected Truncate, got {other:?}"),
        }
    }

    #[test]
    fn test_operations_require_running_engine() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = EngineHandle::new(engine);
        let catalog = handle.catalog();
        assert!(catalog.create_database("app").is_err());
        assert!(catalog.drop_database("app").is_err());
        assert!(catalog.table_exists_named("app/users").is_err());
        assert!(catalog.truncate_table("app/users").is_err());
    }
}
