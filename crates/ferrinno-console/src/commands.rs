use ferrinno_core::types::TableDef;

/// A parsed console command.
#[derive(Debug)]
pub enum Command {
    CreateDatabase { name: String },
    DropDatabase { name: String },
    CreateTable { def: TableDef },
    Exists { table: String },
    Truncate { table: String },
    Status,
    Help(Option<String>),
    Exit,
}
