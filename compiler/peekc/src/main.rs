//! Peek CLI
//!
//! Runs programs in the peek VM and evaluates expressions while they are
//! stopped at breakpoints.

mod commands;

use commands::{debug_file, parse_debug_options, run_file};

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "run" => {
            let Some(path) = args.get(2) else {
                eprintln!("Usage: peek run <file.pk>");
                std::process::exit(1);
            };
            run_file(path);
        }
        "debug" => match parse_debug_options(&args[2..]) {
            Ok(options) => debug_file(&options),
            Err(message) => {
                eprintln!("error: {message}");
                eprintln!("Usage: peek debug <file.pk> --break <line> [--eval <expr>]... [--interpret]");
                std::process::exit(1);
            }
        },
        "help" | "--help" | "-h" => print_usage(),
        "version" | "--version" | "-V" => {
            println!("peek {}", env!("CARGO_PKG_VERSION"));
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

/// Enable with `RUST_LOG=peek_eval=debug`; nothing is logged otherwise.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn print_usage() {
    println!("Peek - a debugger with expression evaluation");
    println!();
    println!("Usage: peek <command> [options]");
    println!();
    println!("Commands:");
    println!("  run <file.pk>        Run a program to completion");
    println!("  debug <file.pk>      Run a program under the debugger");
    println!("  help                 Show this help message");
    println!("  version              Show version information");
    println!();
    println!("Debug options:");
    println!("  --break <line>       Stop at <line> (repeatable)");
    println!("  --eval <expr>        Evaluate <expr> at every stop instead of prompting");
    println!("  --interpret          Never run fragments natively in the VM");
    println!();
    println!("At the prompt:");
    println!("  :continue, :c        Resume until the next breakpoint");
    println!("  :step, :s            Run to the next line");
    println!("  :locals, :l          Show variables of the current frame");
    println!("  :quit, :q            Stop debugging");
    println!("  <expr>               Evaluate <expr> in the current frame");
}

#[cfg(test)]
mod tests;
