use std::collections::HashSet;

use crate::error::{Error, SchemaError};
use crate::types::{
    ColumnAttrs, ColumnDef, ColumnType, DEFAULT_PAGE_SIZE, IndexDef, NAME_SEPARATOR, TableDef,
    TableFormat,
};

// ---------------------------------------------------------------------------
// TableDefBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`TableDef`].
pub struct TableDefBuilder {
    name: String,
    format: TableFormat,
    page_size: u32,
    columns: Vec<ColumnDef>,
    indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Start a definition for the table `database/table`.
    pub fn builder(name: &str) -> TableDefBuilder {
        TableDefBuilder {
            name: name.to_string(),
            format: TableFormat::default(),
            page_size: DEFAULT_PAGE_SIZE,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Check the definition for mistakes the engine would reject only after
    /// a schema object had been partly built.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason: String| {
            Error::from(SchemaError::InvalidTableDef {
                table: self.name.clone(),
                reason,
            })
        };

        match self.name.split_once(NAME_SEPARATOR) {
            Some((db, table)) if !db.is_empty() && !table.is_empty() => {}
            _ => {
                return Err(invalid(format!(
                    "name must have the form database{NAME_SEPARATOR}table"
                )));
            }
        }
        if self.columns.is_empty() {
            return Err(invalid("at least one column is required".to_string()));
        }

        let mut columns = HashSet::new();
        for col in &self.columns {
            if col.name.is_empty() {
                return Err(invalid("column names must not be empty".to_string()));
            }
            if !columns.insert(col.name.as_str()) {
                return Err(invalid(format!("duplicate column '{}'", col.name)));
            }
        }

        let mut indexes = HashSet::new();
        for idx in &self.indexes {
            if !indexes.insert(idx.name.as_str()) {
                return Err(invalid(format!("duplicate index '{}'", idx.name)));
            }
            if idx.parts.is_empty() {
                return Err(invalid(format!("index '{}' has no columns", idx.name)));
            }
            if let Some(part) = idx
                .parts
                .iter()
                .find(|p| !columns.contains(p.column.as_str()))
            {
                return Err(invalid(format!(
                    "index '{}' references unknown column '{}'",
                    idx.name, part.column
                )));
            }
        }
        if self.indexes.iter().filter(|i| i.is_clustered()).count() > 1 {
            return Err(invalid("at most one clustered index is allowed".to_string()));
        }
        Ok(())
    }
}

impl TableDefBuilder {
    pub fn format(mut self, format: TableFormat) -> Self {
        self.format = format;
        self
    }

    /// Page size in bytes; 0 selects the engine default.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Add a column with no attributes.
    pub fn column(self, name: &str, column_type: ColumnType, length: u32) -> Self {
        self.column_def(ColumnDef::new(name, column_type, length))
    }

    /// Add a column with attributes.
    pub fn column_with(
        self,
        name: &str,
        column_type: ColumnType,
        length: u32,
        attrs: ColumnAttrs,
    ) -> Self {
        self.column_def(ColumnDef::new(name, column_type, length).with_attrs(attrs))
    }

    pub fn column_def(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Validate and return the definition.
    pub fn build(self) -> Result<TableDef, Error> {
        let def = TableDef {
            name: self.name,
            format: self.format,
            page_size: self.page_size,
            columns: self.columns,
            indexes: self.indexes,
        };
        def.validate()?;
        Ok(def)
    }
}
