//! `peek run` and `peek debug`.

use std::io::{self, BufRead, Write};

use peek_eval::{DebugSession, EvaluatorConfig, SessionError};
use peek_vm::{StopReason, Vm, VmConfig};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugOptions {
    pub file: String,
    pub breakpoints: Vec<u32>,
    /// Evaluated at every stop; empty means prompt on stdin.
    pub evals: Vec<String>,
    pub interpret: bool,
}

pub fn parse_debug_options(args: &[String]) -> Result<DebugOptions, String> {
    let mut options = DebugOptions::default();
    let mut file = None;
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--break" | "-b" => {
                let line = args.next().ok_or("--break needs a line number")?;
                let line = line
                    .parse()
                    .map_err(|_| format!("invalid line number `{line}`"))?;
                options.breakpoints.push(line);
            }
            "--eval" | "-e" => {
                let expr = args.next().ok_or("--eval needs an expression")?;
                options.evals.push(expr.clone());
            }
            "--interpret" => options.interpret = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option `{flag}`")),
            path if file.is_none() => file = Some(path.to_owned()),
            extra => return Err(format!("unexpected argument `{extra}`")),
        }
    }
    options.file = file.ok_or("missing file path")?;
    Ok(options)
}

fn read_source(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read {path}: {e}");
            std::process::exit(1);
        }
    }
}

fn open_session(path: &str, config: EvaluatorConfig) -> DebugSession {
    let source = read_source(path);
    match DebugSession::new(&source, path, Vm::new(VmConfig::default()), config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

fn fail(error: &SessionError) -> ! {
    eprintln!("error: {error}");
    std::process::exit(1);
}

pub fn run_file(path: &str) {
    let mut session = open_session(path, EvaluatorConfig::default());
    match session.run() {
        Ok(StopReason::Exception { message }) => {
            eprintln!("uncaught exception: {message}");
            std::process::exit(1);
        }
        Ok(_) => {}
        Err(e) => fail(&e),
    }
}

pub fn debug_file(options: &DebugOptions) {
    let config = EvaluatorConfig {
        native: !options.interpret,
        ..EvaluatorConfig::default()
    };
    let mut session = open_session(&options.file, config);
    for &line in &options.breakpoints {
        session.set_breakpoint(line);
    }

    let mut stop = match session.run() {
        Ok(stop) => stop,
        Err(e) => fail(&e),
    };
    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        let Some(line) = report(&stop) else {
            return;
        };
        if options.evals.is_empty() {
            match prompt(&mut session, &mut input, line) {
                Some(next) => stop = next,
                None => return,
            }
        } else {
            for expr in &options.evals {
                println!("{expr} = {}", evaluate(&mut session, expr));
            }
            stop = match session.resume() {
                Ok(stop) => stop,
                Err(e) => fail(&e),
            };
        }
    }
}

/// Print why the thread stopped; `None` once it can no longer be debugged.
fn report(stop: &StopReason) -> Option<u32> {
    match stop {
        StopReason::Breakpoint { line } => {
            println!("stopped at breakpoint, line {line}");
            Some(*line)
        }
        StopReason::Step { line } => {
            println!("stepped to line {line}");
            Some(*line)
        }
        StopReason::Finished => {
            println!("program finished");
            None
        }
        StopReason::Exception { message } => {
            println!("program terminated: {message}");
            None
        }
    }
}

/// Read commands until one moves the thread. `None` ends the session.
fn prompt(
    session: &mut DebugSession,
    input: &mut impl BufRead,
    line: u32,
) -> Option<StopReason> {
    loop {
        print!("({line}) ");
        // A failed flush only loses the prompt text.
        let _ = io::stdout().flush();

        let mut text = String::new();
        match input.read_line(&mut text) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let moved = match text.trim() {
            "" => continue,
            ":quit" | ":q" => return None,
            ":continue" | ":c" => session.resume(),
            ":step" | ":s" => session.step(),
            ":locals" | ":l" => {
                match session.locals() {
                    Ok(locals) => {
                        for (name, value) in locals {
                            println!("  {name} = {value}");
                        }
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
                continue;
            }
            expr => {
                println!("{}", evaluate(session, expr));
                continue;
            }
        };
        match moved {
            Ok(stop) => return Some(stop),
            Err(e) => fail(&e),
        }
    }
}

/// Result of `expr` as shown to the user.
pub fn evaluate(session: &mut DebugSession, expr: &str) -> String {
    match session.evaluate(expr) {
        Ok(result) => session
            .render(&result)
            .unwrap_or_else(|e| format!("error: {e}")),
        Err(e) => format!("error: {e}"),
    }
}
