//! Public API: engine handle, transactions, schema builders and table
//! definitions.

pub mod builders;
pub mod handle;
pub mod schema;
pub mod transaction;

pub use builders::TableDefBuilder;
pub use handle::{EngineHandle, EngineState};
pub use schema::SchemaBuilder;
pub use transaction::{OpenTable, TransactionHandle, TxnState};
