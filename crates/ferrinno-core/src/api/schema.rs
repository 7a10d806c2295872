use tracing::{debug, warn};

use crate::engine::{DbErr, SchemaRef};
use crate::error::{EngineFailure, Error, SchemaError};
use crate::types::{ColumnDef, IndexDef, IndexRole, TableFormat};

use super::handle::EngineHandle;

/// An in-progress native schema object for one table.
///
/// Obtained from [`CatalogManager::create_schema`](crate::catalog::CatalogManager::create_schema)
/// and consumed by [`CatalogManager::create_table`](crate::catalog::CatalogManager::create_table).
/// The native object is released when the builder is dropped, so a schema
/// can never be materialized twice.
///
/// If a column or index definition is rejected the native object is left
/// partially built; every later use of the builder fails with
/// `SchemaUnusable` and it should be dropped.
pub struct SchemaBuilder<'a> {
    handle: &'a EngineHandle,
    schema: SchemaRef,
    name: String,
    format: TableFormat,
    page_size: u32,
    columns: Vec<ColumnDef>,
    indexes: Vec<IndexDef>,
    poisoned: bool,
}

impl<'a> SchemaBuilder<'a> {
    pub(crate) fn new(
        handle: &'a EngineHandle,
        schema: SchemaRef,
        name: &str,
        format: TableFormat,
        page_size: u32,
    ) -> Self {
        Self {
            handle,
            schema,
            name: name.to_string(),
            format,
            page_size,
            columns: Vec::new(),
            indexes: Vec::new(),
            poisoned: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> TableFormat {
        self.format
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    /// Whether a rejected definition left the native schema half built.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn schema_ref(&self) -> SchemaRef {
        self.schema
    }

    pub(crate) fn ensure_usable(&self) -> Result<(), Error> {
        if self.poisoned {
            Err(SchemaError::SchemaUnusable(self.name.clone()).into())
        } else {
            Ok(())
        }
    }

    /// Add a column. BLOB columns are registered with no width and no
    /// attributes whatever the definition says.
    pub fn add_column(&mut self, column: &ColumnDef) -> Result<&mut Self, Error> {
        self.ensure_usable()?;
        let result = self
            .handle
            .engine()
            .schema_add_column(
                self.schema,
                &column.name,
                column.column_type.code(),
                column.native_attrs(),
                column.native_length(),
            )
            .map_err(|status| EngineFailure::new("schema_add_column", status));
        self.check(result, &column.name)?;
        debug!(
            table = %self.name,
            column = %column.name,
            column_type = ?column.column_type,
            "column added"
        );
        self.columns.push(column.clone());
        Ok(self)
    }

    /// Add an index: its parts in order, then its role. A clustered index
    /// is never additionally flagged unique.
    pub fn add_index(&mut self, index: &IndexDef) -> Result<&mut Self, Error> {
        self.ensure_usable()?;
        let result = self.register_index(index);
        self.check(result, &index.name)?;
        debug!(table = %self.name, index = %index.name, role = ?index.role(), "index added");
        self.indexes.push(index.clone());
        Ok(self)
    }

    fn register_index(&self, index: &IndexDef) -> Result<(), EngineFailure> {
        let engine = self.handle.engine();
        let idx = engine
            .schema_add_index(self.schema, &index.name)
            .map_err(fail("schema_add_index"))?;
        for part in &index.parts {
            engine
                .index_add_column(idx, &part.column, part.prefix_len)
                .map_err(fail("index_add_column"))?;
        }
        match index.role() {
            IndexRole::Clustered => engine
                .index_set_clustered(idx)
                .map_err(fail("index_set_clustered")),
            IndexRole::Unique => engine
                .index_set_unique(idx)
                .map_err(fail("index_set_unique")),
            IndexRole::Secondary => Ok(()),
        }
    }

    /// Poison the builder on a rejected definition.
    fn check(&mut self, result: Result<(), EngineFailure>, object: &str) -> Result<(), Error> {
        result.map_err(|failure| {
            self.poisoned = true;
            warn!(table = %self.name, object, error = %failure, "schema definition rejected");
            Error::from(SchemaError::SchemaDefinition {
                object: object.to_string(),
                failure,
            })
        })
    }
}

fn fail(op: &'static str) -> impl Fn(DbErr) -> EngineFailure {
    move |status| EngineFailure::new(op, status)
}

impl Drop for SchemaBuilder<'_> {
    fn drop(&mut self) {
        if let Err(status) = self.handle.engine().schema_delete(self.schema) {
            warn!(table = %self.name, error = %status, "releasing native schema failed");
        }
    }
}
