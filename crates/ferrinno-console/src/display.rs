use serde_json::json;

use crate::executor::{CommandResult, StatusInfo};

/// Output mode for rendering command results.
pub enum OutputMode {
    /// Human-readable output.
    Pretty,
    /// Machine-parseable JSON (one JSON object per result on stdout).
    Json,
}

/// Render a command result to stdout in the given mode.
///
/// Returns `true` to continue execution, `false` to signal exit.
pub fn render(result: &CommandResult, mode: &OutputMode) -> bool {
    match result {
        CommandResult::Ok(msg) => match mode {
            OutputMode::Pretty => print_ok(msg),
            OutputMode::Json => println!("{}", json!({"ok": true, "message": msg})),
        },
        CommandResult::Table { message, id } => match mode {
            OutputMode::Pretty => print_ok(&format!("{message} (id {id})")),
            OutputMode::Json => {
                println!("{}", json!({"ok": true, "message": message, "table_id": id}))
            }
        },
        CommandResult::Exists { table, exists } => match mode {
            OutputMode::Pretty => {
                if *exists {
                    println!("{table} exists");
                } else {
                    println!("{table} does not exist");
                }
            }
            OutputMode::Json => println!("{}", json!({"table": table, "exists": exists})),
        },
        CommandResult::Status(info) => match mode {
            OutputMode::Pretty => print_status(info),
            OutputMode::Json => println!(
                "{}",
                json!({
                    "state": info.state.to_string(),
                    "file_format": info.file_format.map(|f| f.name()),
                    "data_home_dir": info.data_home_dir,
                    "buffer_pool_size": info.buffer_pool_size,
                })
            ),
        },
        CommandResult::Help(topic) => match mode {
            OutputMode::Pretty => render_help_pretty(topic.as_deref()),
            OutputMode::Json => render_help_json(topic.as_deref()),
        },
        CommandResult::Exit => {
            if let OutputMode::Pretty = mode {
                println!("Bye!");
            }
            return false;
        }
    }
    true
}

pub fn render_error(err: &dyn std::fmt::Display, mode: &OutputMode) {
    match mode {
        OutputMode::Pretty => print_error(err),
        OutputMode::Json => println!("{}", json!({"error": err.to_string()})),
    }
}

pub fn print_ok(msg: &str) {
    println!("OK: {msg}");
}

pub fn print_error(err: &dyn std::fmt::Display) {
    eprintln!("Error: {err}");
}

fn print_status(info: &StatusInfo) {
    println!("State:       {}", info.state);
    if let Some(format) = info.file_format {
        println!("File format: {}", format.name());
    }
    if let Some(dir) = &info.data_home_dir {
        println!("Data home:   {dir}");
    }
    if let Some(size) = info.buffer_pool_size {
        println!("Buffer pool: {size} bytes");
    }
}

// ---------------------------------------------------------------------------
// Help
// ---------------------------------------------------------------------------

struct CommandHelp {
    name: &'static str,
    usage: &'static str,
    description: &'static str,
}

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        name: "CREATE DATABASE",
        usage: "CREATE DATABASE <name>",
        description: "Create a database.",
    },
    CommandHelp {
        name: "DROP DATABASE",
        usage: "DROP DATABASE <name>",
        description: "Drop a database and its tables. Dropping a missing database succeeds.",
    },
    CommandHelp {
        name: "CREATE TABLE",
        usage: "CREATE TABLE <db/table> [FORMAT <REDUNDANT|COMPACT|DYNAMIC|COMPRESSED>] \
                [PAGE_SIZE <n>] (<col> <TYPE>[(<len>)] [NOT NULL] [UNSIGNED], ..., \
                [CLUSTERED] [UNIQUE] INDEX <name> (<col>[(<prefix>)], ...))",
        description: "Create a table. Fails if the table already exists.",
    },
    CommandHelp {
        name: "EXISTS",
        usage: "EXISTS <db/table>",
        description: "Check whether a table exists.",
    },
    CommandHelp {
        name: "TRUNCATE",
        usage: "TRUNCATE [TABLE] <db/table>",
        description: "Remove every row of a table.",
    },
    CommandHelp {
        name: "STATUS",
        usage: "STATUS",
        description: "Show engine state and key settings.",
    },
    CommandHelp {
        name: "HELP",
        usage: "HELP [command]",
        description: "Show help.",
    },
    CommandHelp {
        name: "EXIT",
        usage: "EXIT",
        description: "Shut the engine down and leave the console.",
    },
];

fn find_command(topic: &str) -> Option<&'static CommandHelp> {
    COMMANDS
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(topic.trim()))
}

fn render_help_pretty(topic: Option<&str>) {
    match topic {
        None => {
            println!("Commands:");
            for cmd in COMMANDS {
                println!("  {:<16} {}", cmd.name, cmd.description);
            }
            println!("\nType HELP <command> for details.");
        }
        Some(t) => match find_command(t) {
            Some(cmd) => println!("{}\n\n  {}", cmd.usage, cmd.description),
            None => print_error(&format!("No help for '{t}'")),
        },
    }
}

fn render_help_json(topic: Option<&str>) {
    let entry = |cmd: &CommandHelp| {
        json!({"name": cmd.name, "usage": cmd.usage, "description": cmd.description})
    };
    match topic {
        None => {
            let all: Vec<_> = COMMANDS.iter().map(entry).collect();
            println!("{}", json!({ "commands": all }));
        }
        Some(t) => match find_command(t) {
            Some(cmd) => println!("{}", entry(cmd)),
            None => println!("{}", json!({"error": format!("No help for '{t}'")})),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_lookup_is_case_insensitive() {
        assert_eq!(find_command("create table").map(|c| c.name), Some("CREATE TABLE"));
        assert!(find_command("SELECT").is_none());
    }

    #[test]
    fn test_exit_stops_rendering() {
        assert!(!render(&CommandResult::Exit, &OutputMode::Json));
        assert!(render(&CommandResult::Ok("done".to_string()), &OutputMode::Json));
    }
}
