use ferrinno_core::types::{
    ColumnAttrs, ColumnDef, ColumnType, IndexDef, TableDef, TableFormat,
};

use crate::commands::Command;

/// Tokenize an input line.
///
/// Words are separated by whitespace; `(`, `)` and `,` are always tokens of
/// their own, so `INT(8)` becomes `INT`, `(`, `8`, `)`.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in input.chars() {
        if c.is_whitespace() || matches!(c, '(' | ')' | ',') {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            if !c.is_whitespace() {
                tokens.push(c.to_string());
            }
        } else {
            word.push(c);
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

/// Cursor over a token list.
struct Tokens<'a> {
    tokens: &'a [String],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(tokens: &'a [String]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn peek_is(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.eq_ignore_ascii_case(keyword))
    }

    fn next(&mut self) -> Option<&'a str> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn next_or(&mut self, what: &str) -> Result<&'a str, String> {
        self.next().ok_or_else(|| format!("Expected {what}, got end of input"))
    }

    fn expect(&mut self, keyword: &str) -> Result<(), String> {
        match self.next() {
            Some(t) if t.eq_ignore_ascii_case(keyword) => Ok(()),
            Some(t) => Err(format!("Expected '{keyword}', got '{t}'")),
            None => Err(format!("Expected '{keyword}', got end of input")),
        }
    }

    fn eat(&mut self, keyword: &str) -> bool {
        if self.peek_is(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn number(&mut self, what: &str) -> Result<u32, String> {
        let token = self.next_or(what)?;
        token
            .parse::<u32>()
            .map_err(|_| format!("Invalid {what} '{token}'"))
    }

    fn finish(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("Unexpected '{t}' after command")),
        }
    }
}

/// Parse an input line into a [`Command`].
pub fn parse(input: &str) -> Result<Command, String> {
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return Err("Empty command".to_string());
    }
    let mut toks = Tokens::new(&tokens);

    let first = toks.next_or("a command")?.to_ascii_uppercase();
    let cmd = match first.as_str() {
        "CREATE" => match toks.next().map(str::to_ascii_uppercase).as_deref() {
            Some("DATABASE") => Command::CreateDatabase {
                name: toks.next_or("database name")?.to_string(),
            },
            Some("TABLE") => parse_create_table(&mut toks)?,
            _ => return Err("Expected DATABASE or TABLE after CREATE".to_string()),
        },
        "DROP" => {
            toks.expect("DATABASE")?;
            Command::DropDatabase {
                name: toks.next_or("database name")?.to_string(),
            }
        }
        "EXISTS" => Command::Exists {
            table: toks.next_or("table name")?.to_string(),
        },
        "TRUNCATE" => {
            toks.eat("TABLE");
            Command::Truncate {
                table: toks.next_or("table name")?.to_string(),
            }
        }
        "STATUS" => Command::Status,
        "HELP" => {
            let rest: Vec<_> = std::iter::from_fn(|| toks.next()).collect();
            let topic = (!rest.is_empty()).then(|| rest.join(" "));
            return Ok(Command::Help(topic));
        }
        "EXIT" | "QUIT" => Command::Exit,
        _ => return Err(format!("Unknown command '{}'", tokens[0])),
    };
    toks.finish()?;
    Ok(cmd)
}

/// CREATE TABLE <db/table> [FORMAT <f>] [PAGE_SIZE <n>] ( <element>, ... )
fn parse_create_table(toks: &mut Tokens<'_>) -> Result<Command, String> {
    let name = toks.next_or("table name")?;
    let mut builder = TableDef::builder(name);

    loop {
        if toks.eat("FORMAT") {
            let f = toks.next_or("table format")?;
            let format = TableFormat::parse(f).ok_or_else(|| {
                format!("Invalid format '{f}'. Expected REDUNDANT, COMPACT, DYNAMIC, or COMPRESSED.")
            })?;
            builder = builder.format(format);
        } else if toks.eat("PAGE_SIZE") {
            builder = builder.page_size(toks.number("page size")?);
        } else {
            break;
        }
    }

    toks.expect("(")?;
    loop {
        if toks.peek_is("CLUSTERED") || toks.peek_is("UNIQUE") || toks.peek_is("INDEX") {
            builder = builder.index(parse_index(toks)?);
        } else {
            builder = builder.column_def(parse_column(toks)?);
        }
        match toks.next() {
            Some(",") => continue,
            Some(")") => break,
            Some(t) => return Err(format!("Expected ',' or ')', got '{t}'")),
            None => return Err("Missing ')' at end of table definition".to_string()),
        }
    }

    let def = builder.build().map_err(|e| e.to_string())?;
    Ok(Command::CreateTable { def })
}

/// <name> <TYPE>[(<len>)] [NOT NULL] [UNSIGNED]
fn parse_column(toks: &mut Tokens<'_>) -> Result<ColumnDef, String> {
    let name = toks.next_or("column name")?;
    let type_name = toks.next_or("column type")?;
    let column_type =
        ColumnType::parse(type_name).ok_or_else(|| format!("Unknown column type '{type_name}'"))?;

    let length = if toks.eat("(") {
        let len = toks.number("column length")?;
        toks.expect(")")?;
        len
    } else {
        default_length(column_type)
            .ok_or_else(|| format!("Column '{name}' of type {type_name} needs a length"))?
    };

    let mut attrs = ColumnAttrs::empty();
    loop {
        if toks.eat("NOT") {
            toks.expect("NULL")?;
            attrs |= ColumnAttrs::NOT_NULL;
        } else if toks.eat("UNSIGNED") {
            attrs |= ColumnAttrs::UNSIGNED;
        } else {
            break;
        }
    }
    Ok(ColumnDef::new(name, column_type, length).with_attrs(attrs))
}

/// [CLUSTERED] [UNIQUE] INDEX <name> ( <col>[(<prefix>)], ... )
fn parse_index(toks: &mut Tokens<'_>) -> Result<IndexDef, String> {
    let mut clustered = false;
    let mut unique = false;
    loop {
        if toks.eat("CLUSTERED") {
            clustered = true;
        } else if toks.eat("UNIQUE") {
            unique = true;
        } else {
            break;
        }
    }
    toks.expect("INDEX")?;
    let mut index = IndexDef::new(toks.next_or("index name")?);
    if clustered {
        index = index.clustered();
    }
    if unique {
        index = index.unique();
    }

    toks.expect("(")?;
    loop {
        let column = toks.next_or("index column")?;
        let prefix = if toks.eat("(") {
            let prefix = toks.number("prefix length")?;
            toks.expect(")")?;
            prefix
        } else {
            0
        };
        index = index.part(column, prefix);
        match toks.next() {
            Some(",") => continue,
            Some(")") => break,
            Some(t) => return Err(format!("Expected ',' or ')' in index, got '{t}'")),
            None => return Err("Missing ')' at end of index".to_string()),
        }
    }
    Ok(index)
}

/// Width used when a column type is given without one.
fn default_length(column_type: ColumnType) -> Option<u32> {
    match column_type {
        ColumnType::Int | ColumnType::Float => Some(4),
        ColumnType::Double => Some(8),
        ColumnType::Blob => Some(0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(
            tokenize("t (id INT(8),x)"),
            vec!["t", "(", "id", "INT", "(", "8", ")", ",", "x", ")"]
        );
    }

    #[test]
    fn test_parse_database_commands() {
        match parse("create database shop").unwrap() {
            Command::CreateDatabase { name } => assert_eq!(name, "shop"),
            other => panic!("unexpected {other:?}"),
        }
        match parse("DROP DATABASE shop").unwrap() {
            Command::DropDatabase { name } => assert_eq!(name, "shop"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("DROP TABLE shop/orders").is_err());
    }

    #[test]
    fn test_parse_create_table() {
        let cmd = parse(
            "CREATE TABLE shop/orders FORMAT compact PAGE_SIZE 16384 \
             (id INT(8) NOT NULL, total DOUBLE, note VARCHAR(64), \
              CLUSTERED INDEX PRIMARY (id), UNIQUE INDEX by_note (note(10)))",
        )
        .unwrap();
        let Command::CreateTable { def } = cmd else {
            panic!("expected CreateTable");
        };
        assert_eq!(def.name, "shop/orders");
        assert_eq!(def.format, TableFormat::Compact);
        assert_eq!(def.page_size, 16384);
        assert_eq!(def.columns.len(), 3);
        assert_eq!(def.columns[0].length, 8);
        assert_eq!(def.columns[0].attrs, ColumnAttrs::NOT_NULL);
        assert_eq!(def.columns[1].length, 8);
        assert_eq!(def.indexes.len(), 2);
        assert!(def.indexes[0].is_clustered());
        assert!(def.indexes[1].is_unique());
        assert_eq!(def.indexes[1].parts[0].prefix_len, 10);
    }

    #[test]
    fn test_parse_create_table_errors() {
        assert!(parse("CREATE TABLE shop/t (id WIDGET)").is_err());
        assert!(parse("CREATE TABLE shop/t (name VARCHAR)").is_err());
        assert!(parse("CREATE TABLE shop/t (id INT").is_err());
        assert!(parse("CREATE TABLE shop/t FORMAT sideways (id INT)").is_err());
        // Definition errors are caught before anything reaches the engine.
        assert!(parse("CREATE TABLE shop/t (id INT, INDEX i (missing))").is_err());
    }

    #[test]
    fn test_parse_misc_commands() {
        assert!(matches!(parse("EXISTS shop/t").unwrap(), Command::Exists { .. }));
        assert!(matches!(parse("truncate table shop/t").unwrap(), Command::Truncate { .. }));
        assert!(matches!(parse("STATUS").unwrap(), Command::Status));
        assert!(matches!(parse("quit").unwrap(), Command::Exit));
        match parse("HELP CREATE TABLE").unwrap() {
            Command::Help(Some(topic)) => assert_eq!(topic, "CREATE TABLE"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("STATUS now").is_err());
        assert!(parse("").is_err());
        assert!(parse("FROBNICATE").is_err());
    }
}
