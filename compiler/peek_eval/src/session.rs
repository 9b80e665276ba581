//! A debugging session: one program running in a VM, stopped at
//! breakpoints, with an evaluator for the suspended frame.

use std::sync::Arc;

use parking_lot::RwLock;
use peek_codegen::{compile_program, CodegenError};
use peek_diagnostic::render;
use peek_ir::SharedInterner;
use peek_resolve::Program;
use peek_target::{DebugTarget, TargetError};
use peek_vm::{StopReason, Vm, VmError};
use tracing::debug;

use crate::{CodeFragment, EvaluateError, EvaluationResult, Evaluator, EvaluatorConfig};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The program does not compile; holds the rendered diagnostics.
    #[error("{diagnostics}")]
    Program { diagnostics: String },
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Target(#[from] TargetError),
}

pub struct DebugSession {
    program: RwLock<Arc<Program>>,
    file: String,
    vm: Vm,
    evaluator: Evaluator,
}

impl DebugSession {
    /// Compile `source` and load it into `vm`, ready to run.
    pub fn new(
        source: &str,
        file: impl Into<String>,
        mut vm: Vm,
        config: EvaluatorConfig,
    ) -> Result<Self, SessionError> {
        let file = file.into();
        let program = build(source, &file)?;
        install(&mut vm, &program)?;
        Ok(DebugSession {
            program: RwLock::new(Arc::new(program)),
            file,
            vm,
            evaluator: Evaluator::new(config),
        })
    }

    /// Replace the program with a new version of its source. The thread
    /// starts over; every compiled fragment is dropped.
    pub fn reload(&mut self, source: &str) -> Result<(), SessionError> {
        let program = build(source, &self.file)?;
        install(&mut self.vm, &program)?;
        *self.program.write() = Arc::new(program);
        self.evaluator.invalidate();
        debug!(file = %self.file, "program reloaded");
        Ok(())
    }

    pub fn program(&self) -> Arc<Program> {
        Arc::clone(&self.program.read())
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn set_breakpoint(&mut self, line: u32) {
        self.vm.set_breakpoint(line);
    }

    pub fn clear_breakpoint(&mut self, line: u32) -> bool {
        self.vm.clear_breakpoint(line)
    }

    /// Start the program and run to the first breakpoint.
    pub fn run(&mut self) -> Result<StopReason, SessionError> {
        self.evaluator.invalidate();
        Ok(self.vm.run()?)
    }

    pub fn resume(&mut self) -> Result<StopReason, SessionError> {
        self.evaluator.invalidate();
        Ok(self.vm.resume()?)
    }

    pub fn step(&mut self) -> Result<StopReason, SessionError> {
        self.evaluator.invalidate();
        Ok(self.vm.step()?)
    }

    /// Variables of the suspended frame and their rendered values. Slots
    /// the compiler introduced (`$`-prefixed) are left out.
    pub fn locals(&self) -> Result<Vec<(String, String)>, SessionError> {
        let mut locals = Vec::new();
        for variable in self
            .vm
            .frame_variables()?
            .into_iter()
            .chain(self.vm.captured_variables()?)
            .filter(|variable| !variable.name.starts_with('$'))
        {
            let value = self.vm.render_value(variable.value)?;
            locals.push((variable.name, value));
        }
        Ok(locals)
    }

    /// Evaluate `text` at the line the thread is suspended at.
    pub fn evaluate(&mut self, text: &str) -> Result<EvaluationResult, EvaluateError> {
        let line = self.vm.current_line().ok_or(TargetError::NotSuspended)?;
        let fragment = CodeFragment::new(text, line);
        self.evaluator
            .evaluate(&self.program, &mut self.vm, &fragment)
    }

    /// Text shown for `result`.
    pub fn render(&self, result: &EvaluationResult) -> Result<String, TargetError> {
        match result {
            EvaluationResult::ValueReturned(value) => self.vm.render_value(*value),
            EvaluationResult::ExceptionThrown { exception, .. } => Ok(format!(
                "exception: {}",
                self.vm.exception_message(*exception)?
            )),
            EvaluationResult::AbnormalTermination(message) => {
                Ok(format!("evaluation terminated: {message}"))
            }
        }
    }
}

/// Analyze `source`, rejecting it with rendered diagnostics on errors.
fn build(source: &str, file: &str) -> Result<Program, SessionError> {
    let program = Program::analyze(source, &SharedInterner::default());
    if program.has_errors() {
        let diagnostics = program
            .diagnostics()
            .iter()
            .filter(|d| d.is_error())
            .map(|d| render(d, source, file))
            .collect::<Vec<_>>()
            .join("\n\n");
        return Err(SessionError::Program { diagnostics });
    }
    Ok(program)
}

fn install(vm: &mut Vm, program: &Program) -> Result<(), SessionError> {
    let binaries = compile_program(program)?;
    vm.load_program(&binaries)?;
    Ok(())
}
