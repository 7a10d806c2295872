use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use ferrinno_core::api::EngineHandle;
use ferrinno_core::config::EngineConfiguration;
use ferrinno_core::engine::MemoryEngine;
use rustyline::DefaultEditor;
use tracing::{info, warn};

mod commands;
mod display;
mod executor;
mod parser;

use display::OutputMode;

/// Interactive and scriptable DDL console for a ferrinno
/// engine.
#[derive(Parser, Debug)]
#[command(name = "ferrinno-console", version)]
struct Cli {
    /// Engine configuration file, JSON (default: ~/.config/ferrinno/engine.json
    /// if it exists, built-in defaults otherwise).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Execute a command non-interactively (can be repeated).
    #[arg(short, long = "exec")]
    exec: Vec<String>,

    /// Output results as machine-parseable JSON.
    #[arg(short, long)]
    json: bool,

    /// Skip the buffer-pool flush on exit; the next start runs recovery.
    #[arg(long)]
    fast_shutdown: bool,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ferrinno")
        .join("engine.json")
}

fn load_config(cli: &Cli) -> Result<EngineConfiguration, ferrinno_core::error::Error> {
    match &cli.config {
        Some(path) => EngineConfiguration::load(path),
        None => {
            let path = default_config_path();
            if path.is_file() {
                EngineConfiguration::load(&path)
            } else {
                Ok(EngineConfiguration::default())
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Cannot load configuration: {e}");
            process::exit(1);
        }
    };

    let handle = EngineHandle::new(Arc::new(MemoryEngine::new()));
    if let Err(e) = handle.startup(&config) {
        eprintln!("Cannot start engine: {e}");
        process::exit(1);
    }
    info!(data_home = %config.data_home_dir, "console attached");

    let code = if !cli.exec.is_empty() {
        run_exec_mode(&handle, &cli.exec, cli.json)
    } else if !std::io::stdin().is_terminal() {
        run_pipe_mode(&handle, cli.json)
    } else {
        run_repl(&handle);
        0
    };

    if let Err(e) = handle.shutdown(cli.fast_shutdown) {
        warn!(error = %e, "engine shutdown failed");
        process::exit(1);
    }
    process::exit(code);
}

fn output_mode(json_mode: bool) -> OutputMode {
    if json_mode {
        OutputMode::Json
    } else {
        OutputMode::Pretty
    }
}

/// Execute one or more commands non-interactively (--exec mode).
///
/// Returns exit code: 0 = all succeeded, 1 = first error stops execution.
fn run_exec_mode(handle: &EngineHandle, commands: &[String], json_mode: bool) -> i32 {
    let mode = output_mode(json_mode);
    for cmd_str in commands {
        match run_line(handle, cmd_str, &mode) {
            Ok(true) => {}
            Ok(false) => return 0,
            Err(()) => return 1,
        }
    }
    0
}

/// Read commands from stdin (pipe mode).
///
/// Returns exit code: 0 = all succeeded, 1 = first error.
fn run_pipe_mode(handle: &EngineHandle, json_mode: bool) -> i32 {
    let mode = output_mode(json_mode);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                display::render_error(&e, &mode);
                return 1;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        match run_line(handle, trimmed, &mode) {
            Ok(true) => {}
            Ok(false) => return 0,
            Err(()) => return 1,
        }
    }
    0
}

/// Parse, execute and render one line. `Ok(false)` means EXIT; errors have
/// already been rendered.
fn run_line(handle: &EngineHandle, line: &str, mode: &OutputMode) -> Result<bool, ()> {
    let cmd = parser::parse(line).map_err(|e| display::render_error(&e, mode))?;
    let result = executor::execute(handle, cmd).map_err(|e| display::render_error(&e, mode))?;
    Ok(display::render(&result, mode))
}

/// Interactive REPL mode.
fn run_repl(handle: &EngineHandle) {
    println!("Ferrinno Console v{}", env!("CARGO_PKG_VERSION"));
    println!("Type HELP for available commands.\n");

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to initialize line editor: {e}");
            return;
        }
    };

    loop {
        match rl.readline("ferrinno> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                let cmd = match parser::parse(trimmed) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        display::print_error(&e);
                        continue;
                    }
                };
                match executor::execute(handle, cmd) {
                    Ok(result) => {
                        if !display::render(&result, &OutputMode::Pretty) {
                            break; // EXIT command
                        }
                    }
                    Err(e) => display::print_error(&e),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!();
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("Bye!");
                break;
            }
            Err(e) => {
                eprintln!("Readline error: {e}");
                break;
            }
        }
    }
}
