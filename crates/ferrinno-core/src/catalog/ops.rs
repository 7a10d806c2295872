//! Catalog operations: native schema creation, definition replay, the
//! existence probe and table materialization.
//!
//! Every step that needs a transaction runs in its own RepeatableRead
//! transaction, and every failure path rolls that transaction back before
//! the error is returned.

use tracing::{debug, warn};

use crate::api::handle::EngineHandle;
use crate::api::schema::SchemaBuilder;
use crate::api::transaction::TransactionHandle;
use crate::engine::{DbErr, SchemaRef};
use crate::error::{EngineFailure, Error, SchemaError};
use crate::types::{IsolationLevel, TableDef, TableFormat, TableId};

/// Isolation level for every DDL transaction.
const DDL_LEVEL: IsolationLevel = IsolationLevel::RepeatableRead;

/// Create an empty native schema object under the exclusive schema lock.
pub fn create_native_schema(
    handle: &EngineHandle,
    name: &str,
    format: TableFormat,
    page_size: u32,
) -> Result<SchemaRef, Error> {
    let mut txn = handle.begin_transaction(DDL_LEVEL)?;
    let created = txn.lock_schema_exclusive().and_then(|()| {
        handle
            .engine()
            .schema_create(name, format, page_size)
            .map_err(|status| {
                Error::from(SchemaError::SchemaOperation {
                    name: name.to_string(),
                    failure: EngineFailure::new("schema_create", status),
                })
            })
    });

    match created {
        Ok(schema) => {
            if let Err(err) = txn.commit() {
                if let Err(status) = handle.engine().schema_delete(schema) {
                    warn!(schema = name, error = %status, "releasing native schema failed");
                }
                return Err(err);
            }
            Ok(schema)
        }
        Err(err) => {
            rollback_after_failure(&mut txn, "schema creation");
            Err(err)
        }
    }
}

/// Register the columns, then the indexes, of `def` on the builder, in
/// declaration order.
///
/// Entries already added through the builder are not registered again. They
/// must match the leading entries of `def` exactly; anything else is
/// `InvalidTableDef` and nothing further reaches the engine.
pub fn replay_definition(schema: &mut SchemaBuilder<'_>, def: &TableDef) -> Result<(), Error> {
    let columns = unregistered(schema.columns(), &def.columns, def.name(), "columns")?;
    let indexes = unregistered(schema.indexes(), &def.indexes, def.name(), "indexes")?;
    for column in columns {
        schema.add_column(column)?;
    }
    for index in indexes {
        schema.add_index(index)?;
    }
    Ok(())
}

/// The tail of `wanted` left after the entries already on the schema.
fn unregistered<'d, T: PartialEq>(
    registered: &[T],
    wanted: &'d [T],
    table: &str,
    what: &str,
) -> Result<&'d [T], Error> {
    let is_prefix = registered.len() <= wanted.len()
        && registered.iter().zip(wanted).all(|(have, want)| have == want);
    if !is_prefix {
        return Err(SchemaError::InvalidTableDef {
            table: table.to_string(),
            reason: format!("{what} already added to the schema do not match the definition"),
        }
        .into());
    }
    Ok(&wanted[registered.len()..])
}

/// Existence probe: try to open the table inside a throwaway transaction.
///
/// A not-found status means `false`; any other failure is returned as is.
/// The transaction is rolled back on every path. When both the open and the
/// rollback fail, the open failure wins.
pub fn probe_table(handle: &EngineHandle, name: &str) -> Result<bool, Error> {
    let mut txn = handle.begin_transaction(DDL_LEVEL)?;
    let probe = txn.open_table(name).and_then(|table| table.close());
    let rolled_back = txn.rollback();

    match probe {
        Ok(()) => rolled_back.map(|()| true),
        Err(Error::Schema(SchemaError::TableNotFound(_))) => rolled_back.map(|()| false),
        Err(err) => {
            if let Err(rb) = rolled_back {
                warn!(table = name, error = %rb, "rollback after failed probe failed");
            }
            Err(err)
        }
    }
}

/// Create the table from a fully built schema and commit it.
pub fn materialize(handle: &EngineHandle, schema: &SchemaBuilder<'_>) -> Result<TableId, Error> {
    let mut txn = handle.begin_transaction(DDL_LEVEL)?;
    let created = txn.lock_schema_exclusive().and_then(|()| {
        txn.create_table(schema.schema_ref())
            .map_err(|status| match status {
                DbErr::TableIsBeingUsed => {
                    Error::from(SchemaError::TableAlreadyExists(schema.name().to_string()))
                }
                status => Error::Engine(EngineFailure::new("table_create", status)),
            })
    });

    match created {
        Ok(id) => {
            txn.commit()?;
            debug!(table = schema.name(), id, "table materialized");
            Ok(id)
        }
        Err(err) => {
            rollback_after_failure(&mut txn, "table creation");
            Err(err)
        }
    }
}

fn rollback_after_failure(txn: &mut TransactionHandle<'_>, what: &str) {
    warn!(trx = txn.trx_ref().0, "{what} failed; rolling back");
    if let Err(err) = txn.rollback() {
        warn!(error = %err, "rollback after failed {what} failed");
    }
}
