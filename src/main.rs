//! ptywrap CLI
//!
//! Runs a command as though it were on a terminal using a PTY. This is
//! useful to trick programs into disabling buffering, or otherwise acting
//! as if they are interactive, while still capturing their output.

use std::io;
use std::process::ExitCode;

use ptywrap::{Command, Session};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    // Logging goes to stderr; stdout belongs to the wrapped command.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            },
            "-V" | "--version" => {
                println!("ptywrap {}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            },
            "--" => {
                i += 1;
                break;
            },
            other if other.starts_with('-') => {
                eprintln!("ptywrap: unknown option: {other}");
                eprintln!("Try 'ptywrap --help' for usage.");
                return ExitCode::FAILURE;
            },
            _ => break,
        }
    }

    if i >= args.len() {
        eprintln!("ptywrap: missing command");
        eprintln!("Try 'ptywrap --help' for usage.");
        return ExitCode::FAILURE;
    }

    let command = Command::new(args[i].clone(), args[i + 1..].iter().cloned());

    tracing::debug!(program = command.program(), "starting session");

    let session = match Session::spawn(&command) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("ptywrap: {e}");
            return ExitCode::FAILURE;
        },
    };

    match session.run() {
        Ok(status) => ExitCode::from(status as u8),
        Err(e) => {
            eprintln!("ptywrap: {e}");
            ExitCode::FAILURE
        },
    }
}

fn print_help() {
    println!("ptywrap - run a command on a pseudo-terminal");
    println!();
    println!("Usage: ptywrap [OPTIONS] [--] COMMAND [ARGS...]");
    println!();
    println!("The command's standard streams are attached to a PTY slave so it");
    println!("behaves as if interactive; bytes are relayed between this process's");
    println!("stdin/stdout and the PTY master. Input is forwarded verbatim with an");
    println!("EOT byte appended at end-of-file; output is forwarded verbatim. The");
    println!("exit status is the command's own.");
    println!();
    println!("Options:");
    println!("  -h, --help     Show this help message");
    println!("  -V, --version  Show version");
    println!();
    println!("Environment:");
    println!("  RUST_LOG       Log filter written to stderr (default: warn)");
}
