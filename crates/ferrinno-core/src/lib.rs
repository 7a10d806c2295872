//! # Ferrinno
//!
//! A control layer over an embedded transactional storage engine.
//!
//! Ferrinno owns the engine's lifecycle (configure, start, shut down) and
//! the transactional DDL protocol around it: databases, native schema
//! objects, table creation under the engine's exclusive schema lock, the
//! table existence probe, and single-use transaction handles. The engine
//! itself sits behind the [`engine::Engine`] call contract;
//! [`engine::MemoryEngine`] is an in-process implementation of it.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use ferrinno_core::api::EngineHandle;
//! use ferrinno_core::config::EngineConfiguration;
//! use ferrinno_core::engine::MemoryEngine;
//! use ferrinno_core::types::{ColumnAttrs, ColumnType, IndexDef, TableDef, TableFormat};
//!
//! let handle = EngineHandle::new(Arc::new(MemoryEngine::new()));
//! handle.startup(&EngineConfiguration::default()).unwrap();
//!
//! let catalog = handle.catalog();
//! catalog.create_database("shop").unwrap();
//!
//! let orders = TableDef::builder("shop/orders")
//!     .format(TableFormat::Compact)
//!     .page_size(16384)
//!     .column_with("id", ColumnType::Int, 8, ColumnAttrs::NOT_NULL)
//!     .column("total", ColumnType::Double, 8)
//!     .index(IndexDef::new("PRIMARY").part("id", 0).clustered())
//!     .build()
//!     .unwrap();
//!
//! let schema = catalog
//!     .create_schema("shop/orders", TableFormat::Compact, 16384)
//!     .unwrap();
//! catalog.create_table(schema, &orders).unwrap();
//! assert!(catalog.table_exists(&orders).unwrap());
//!
//! handle.shutdown(false).unwrap();
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod types;
