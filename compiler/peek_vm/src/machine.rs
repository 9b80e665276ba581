//! The thread, its frames and the instruction loop.

use std::sync::Arc;

use peek_codegen::{
    ClassFile, Instruction, MethodInfo, NamedBinary, INVOKE_METHOD, PROGRAM_CLASS_NAME,
};
use peek_target::{DebugTarget, InvocationOutcome, ObjectId, TargetError, TargetValue};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::heap::{Heap, HeapObject};
use crate::{Output, StopReason, VmConfig, VmError, ENTRY_POINT};

/// Activation of one method.
pub(crate) struct Frame {
    pub(crate) class: Arc<ClassFile>,
    method: usize,
    /// Next instruction to execute.
    pub(crate) pc: u32,
    pub(crate) locals: Vec<TargetValue>,
    stack: Vec<TargetValue>,
    /// The closure whose `invoke` this is.
    pub(crate) closure: Option<ObjectId>,
}

impl Frame {
    pub(crate) fn method(&self) -> &MethodInfo {
        &self.class.methods[self.method]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadState {
    NotStarted,
    Suspended,
    Finished,
    /// Ended by an uncaught exception or a VM fault.
    Terminated,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    /// Until a breakpoint or the end.
    Run,
    /// Until the next line start in any frame.
    Step,
}

enum Halt {
    Returned(TargetValue),
    Threw(ObjectId),
    Breakpoint(u32),
    Step(u32),
}

enum Flow {
    Next,
    Return(TargetValue),
    Throw(ObjectId),
}

pub struct Vm {
    pub(crate) config: VmConfig,
    pub(crate) classes: FxHashMap<String, Arc<ClassFile>>,
    pub(crate) heap: Heap,
    pub(crate) frames: Vec<Frame>,
    pub(crate) state: ThreadState,
    pub(crate) breakpoints: FxHashSet<u32>,
    pub(crate) breakpoints_enabled: bool,
    pub(crate) generation: u64,
    pub(crate) output: Output,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Vm {
            config,
            classes: FxHashMap::default(),
            heap: Heap::default(),
            frames: Vec::new(),
            state: ThreadState::NotStarted,
            breakpoints: FxHashSet::default(),
            breakpoints_enabled: true,
            generation: 0,
            output: Output::default(),
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Replace the program. Classes loaded by debuggers are dropped with it.
    pub fn load_program(&mut self, binaries: &[NamedBinary]) -> Result<(), VmError> {
        let mut classes = FxHashMap::default();
        for binary in binaries {
            let class = binary.decode()?;
            classes.insert(class.name.clone(), Arc::new(class));
        }
        self.classes = classes;
        self.heap = Heap::default();
        self.frames.clear();
        self.state = ThreadState::NotStarted;
        self.generation += 1;
        debug!(classes = self.classes.len(), "program loaded");
        Ok(())
    }

    pub fn set_breakpoint(&mut self, line: u32) {
        self.breakpoints.insert(line);
    }

    pub fn clear_breakpoint(&mut self, line: u32) -> bool {
        self.breakpoints.remove(&line)
    }

    /// Start `main` from the beginning.
    pub fn run(&mut self) -> Result<StopReason, VmError> {
        let class = self
            .classes
            .get(PROGRAM_CLASS_NAME)
            .cloned()
            .ok_or(VmError::NoEntryPoint)?;
        let method = class
            .methods
            .iter()
            .position(|m| m.name == ENTRY_POINT && m.is_static() && m.params.is_empty())
            .ok_or(VmError::NoEntryPoint)?;
        self.frames.clear();
        self.push_frame(class, method, &[], None)?;
        self.proceed(Mode::Run, false)
    }

    /// Continue until the next breakpoint or the end.
    pub fn resume(&mut self) -> Result<StopReason, VmError> {
        self.require_suspended()?;
        self.proceed(Mode::Run, true)
    }

    /// Continue to the start of the next line.
    pub fn step(&mut self) -> Result<StopReason, VmError> {
        self.require_suspended()?;
        self.proceed(Mode::Step, true)
    }

    fn require_suspended(&self) -> Result<(), VmError> {
        if self.state == ThreadState::Suspended {
            Ok(())
        } else {
            Err(VmError::NotSuspended { state: self.state })
        }
    }

    fn proceed(&mut self, mode: Mode, resuming: bool) -> Result<StopReason, VmError> {
        self.generation += 1;
        let halt = match self.execute(0, mode, resuming) {
            Ok(halt) => halt,
            Err(error) => {
                self.frames.clear();
                self.state = ThreadState::Terminated;
                return Err(error.into());
            }
        };
        let reason = match halt {
            Halt::Breakpoint(line) => {
                self.state = ThreadState::Suspended;
                StopReason::Breakpoint { line }
            }
            Halt::Step(line) => {
                self.state = ThreadState::Suspended;
                StopReason::Step { line }
            }
            Halt::Returned(_) => {
                self.state = ThreadState::Finished;
                StopReason::Finished
            }
            Halt::Threw(exception) => {
                self.state = ThreadState::Terminated;
                StopReason::Exception {
                    message: self.heap.exception_message(exception)?.to_owned(),
                }
            }
        };
        debug!(?reason, generation = self.generation, "thread stopped");
        Ok(reason)
    }

    // ── Invocation on behalf of debuggers ───────────────────────────

    /// Run a method on top of the suspended frames to completion.
    pub(crate) fn invoke(
        &mut self,
        class: Arc<ClassFile>,
        method: usize,
        args: &[TargetValue],
        closure: Option<ObjectId>,
    ) -> Result<InvocationOutcome, TargetError> {
        let base = self.frames.len();
        self.push_frame(class, method, args, closure)?;
        let outcome = match self.execute(base, Mode::Run, false) {
            Ok(Halt::Returned(value)) => Ok(InvocationOutcome::Returned(value)),
            Ok(Halt::Threw(exception)) => Ok(InvocationOutcome::Threw(exception)),
            Ok(Halt::Breakpoint(line) | Halt::Step(line)) => {
                Err(TargetError::BreakpointDuringInvocation { line })
            }
            Err(error) => Err(error),
        };
        self.frames.truncate(base);
        outcome
    }

    pub(crate) fn resolve_static(
        &self,
        class: &str,
        method: &str,
        argc: usize,
    ) -> Result<(Arc<ClassFile>, usize), TargetError> {
        let callee = self
            .classes
            .get(class)
            .ok_or_else(|| TargetError::ClassNotLoaded {
                class: class.to_owned(),
            })?;
        let index = callee
            .methods
            .iter()
            .position(|m| m.name == method)
            .ok_or_else(|| TargetError::MethodNotFound {
                class: class.to_owned(),
                method: method.to_owned(),
            })?;
        let info = &callee.methods[index];
        if !info.is_static() {
            return Err(TargetError::Linkage {
                message: format!("`{class}.{method}` is not static"),
            });
        }
        check_arity(class, info, argc)?;
        Ok((Arc::clone(callee), index))
    }

    pub(crate) fn resolve_closure(
        &self,
        closure: ObjectId,
        argc: usize,
    ) -> Result<(Arc<ClassFile>, usize), TargetError> {
        let (class, _) = self.heap.closure(closure)?;
        let callee = self
            .classes
            .get(class)
            .ok_or_else(|| TargetError::ClassNotLoaded {
                class: class.to_owned(),
            })?;
        let index = callee
            .methods
            .iter()
            .position(|m| m.name == INVOKE_METHOD)
            .ok_or_else(|| TargetError::MethodNotFound {
                class: class.to_owned(),
                method: INVOKE_METHOD.to_owned(),
            })?;
        check_arity(class, &callee.methods[index], argc)?;
        Ok((Arc::clone(callee), index))
    }

    pub(crate) fn instantiate_closure(
        &mut self,
        class: &str,
        captures: Vec<TargetValue>,
    ) -> Result<ObjectId, TargetError> {
        let template = self
            .classes
            .get(class)
            .ok_or_else(|| TargetError::ClassNotLoaded {
                class: class.to_owned(),
            })?;
        if !template.is_closure() {
            return Err(TargetError::Linkage {
                message: format!("`{class}` is not a closure class"),
            });
        }
        if template.captures.len() != captures.len() {
            return Err(TargetError::Linkage {
                message: format!(
                    "`{class}` captures {} values, got {}",
                    template.captures.len(),
                    captures.len()
                ),
            });
        }
        Ok(self.heap.alloc(HeapObject::Closure {
            class: class.to_owned(),
            captures,
        }))
    }

    // ── Frames and operands ─────────────────────────────────────────

    fn push_frame(
        &mut self,
        class: Arc<ClassFile>,
        method: usize,
        args: &[TargetValue],
        closure: Option<ObjectId>,
    ) -> Result<(), TargetError> {
        let info = &class.methods[method];
        let offset = usize::from(closure.is_some());
        let mut locals = vec![TargetValue::Unit; usize::from(info.max_locals)];
        if locals.len() < offset + args.len() {
            return Err(invalid_code(
                &class,
                format!("`{}` has fewer slots than parameters", info.name),
            ));
        }
        if let Some(closure) = closure {
            locals[0] = TargetValue::Object(closure);
        }
        locals[offset..offset + args.len()].copy_from_slice(args);
        self.frames.push(Frame {
            class,
            method,
            pc: 0,
            locals,
            stack: Vec::new(),
            closure,
        });
        Ok(())
    }

    pub(crate) fn top(&self) -> Result<&Frame, TargetError> {
        self.frames.last().ok_or(TargetError::NotSuspended)
    }

    fn top_mut(&mut self) -> Result<&mut Frame, TargetError> {
        self.frames.last_mut().ok_or(TargetError::NotSuspended)
    }

    fn push(&mut self, value: TargetValue) -> Result<(), TargetError> {
        self.top_mut()?.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, class: &ClassFile) -> Result<TargetValue, TargetError> {
        self.top_mut()?
            .stack
            .pop()
            .ok_or_else(|| invalid_code(class, "operand stack underflow"))
    }

    fn pop_int(&mut self, class: &ClassFile) -> Result<i64, TargetError> {
        match self.pop(class)? {
            TargetValue::Int(n) => Ok(n),
            other => Err(invalid_code(class, format!("expected Int, found {other:?}"))),
        }
    }

    fn pop_bool(&mut self, class: &ClassFile) -> Result<bool, TargetError> {
        match self.pop(class)? {
            TargetValue::Bool(b) => Ok(b),
            other => Err(invalid_code(class, format!("expected Bool, found {other:?}"))),
        }
    }

    fn pop_object(&mut self, class: &ClassFile) -> Result<ObjectId, TargetError> {
        match self.pop(class)? {
            TargetValue::Object(id) => Ok(id),
            other => Err(invalid_code(
                class,
                format!("expected an object, found {other:?}"),
            )),
        }
    }

    fn pop_args(&mut self, count: u16, class: &ClassFile) -> Result<Vec<TargetValue>, TargetError> {
        let count = usize::from(count);
        let stack = &mut self.top_mut()?.stack;
        if stack.len() < count {
            return Err(invalid_code(class, "operand stack underflow"));
        }
        Ok(stack.split_off(stack.len() - count))
    }

    fn alloc_str(&mut self, text: String) -> Result<(), TargetError> {
        let id = self.heap.alloc(HeapObject::Str(text));
        self.push(TargetValue::Object(id))
    }

    fn throw(&mut self, message: &str) -> Flow {
        debug!(message, "exception thrown");
        Flow::Throw(self.heap.alloc(HeapObject::Exception {
            message: message.to_owned(),
        }))
    }

    // ── Execution ───────────────────────────────────────────────────

    /// Run until the frame at depth `base` returns or a stop condition in
    /// `mode` is met. A `resuming` run does not stop at the instruction it
    /// is suspended at.
    fn execute(&mut self, base: usize, mode: Mode, resuming: bool) -> Result<Halt, TargetError> {
        let mut check = !resuming;
        loop {
            let frame = self.top()?;
            let class = Arc::clone(&frame.class);
            let method = &class.methods[frame.method];
            let pc = frame.pc;

            if check {
                if let Some(line) = method.line_starting_at(pc) {
                    if mode == Mode::Step {
                        return Ok(Halt::Step(line));
                    }
                    if self.breakpoints_enabled && self.breakpoints.contains(&line) {
                        return Ok(Halt::Breakpoint(line));
                    }
                }
            }
            check = true;

            let instruction = method
                .code
                .get(pc as usize)
                .ok_or_else(|| invalid_code(&class, "execution ran past the end of the method"))?;
            self.top_mut()?.pc = pc + 1;

            match self.dispatch(instruction, &class)? {
                Flow::Next => {}
                Flow::Return(value) => {
                    if self.frames.len() <= base {
                        return Ok(Halt::Returned(value));
                    }
                    self.push(value)?;
                }
                Flow::Throw(exception) => {
                    self.frames.truncate(base);
                    return Ok(Halt::Threw(exception));
                }
            }
        }
    }

    fn dispatch(&mut self, instruction: &Instruction, class: &ClassFile) -> Result<Flow, TargetError> {
        match instruction {
            Instruction::PushInt(n) => self.push(TargetValue::Int(*n))?,
            Instruction::PushBool(b) => self.push(TargetValue::Bool(*b))?,
            Instruction::PushStr(text) => self.alloc_str(text.clone())?,
            Instruction::PushUnit => self.push(TargetValue::Unit)?,

            Instruction::Load(slot) => {
                let value = self
                    .top()?
                    .locals
                    .get(usize::from(*slot))
                    .copied()
                    .ok_or_else(|| invalid_code(class, format!("no local slot {slot}")))?;
                self.push(value)?;
            }
            Instruction::Store(slot) => {
                let value = self.pop(class)?;
                let Some(local) = self.top_mut()?.locals.get_mut(usize::from(*slot)) else {
                    return Err(invalid_code(class, format!("no local slot {slot}")));
                };
                *local = value;
            }
            Instruction::LoadCapture(index) => {
                let closure = self
                    .top()?
                    .closure
                    .ok_or_else(|| invalid_code(class, "captured variable outside a closure"))?;
                let (_, captures) = self.heap.closure(closure)?;
                let value = captures
                    .get(usize::from(*index))
                    .copied()
                    .ok_or_else(|| invalid_code(class, format!("no captured variable {index}")))?;
                self.push(value)?;
            }

            Instruction::NewRef => {
                let value = self.pop(class)?;
                let cell = self.heap.alloc(HeapObject::Ref(value));
                self.push(TargetValue::Object(cell))?;
            }
            Instruction::RefGet => {
                let cell = self.pop_object(class)?;
                let value = self.heap.box_get(cell)?;
                self.push(value)?;
            }
            Instruction::RefSet => {
                let value = self.pop(class)?;
                let cell = self.pop_object(class)?;
                self.heap.box_set(cell, value)?;
            }

            Instruction::Add | Instruction::Sub | Instruction::Mul => {
                let right = self.pop_int(class)?;
                let left = self.pop_int(class)?;
                let result = match instruction {
                    Instruction::Add => left.wrapping_add(right),
                    Instruction::Sub => left.wrapping_sub(right),
                    _ => left.wrapping_mul(right),
                };
                self.push(TargetValue::Int(result))?;
            }
            Instruction::Div | Instruction::Rem => {
                let right = self.pop_int(class)?;
                let left = self.pop_int(class)?;
                if right == 0 {
                    return Ok(self.throw("/ by zero"));
                }
                let result = if matches!(instruction, Instruction::Div) {
                    left.wrapping_div(right)
                } else {
                    left.wrapping_rem(right)
                };
                self.push(TargetValue::Int(result))?;
            }
            Instruction::Neg => {
                let operand = self.pop_int(class)?;
                self.push(TargetValue::Int(operand.wrapping_neg()))?;
            }
            Instruction::Not => {
                let operand = self.pop_bool(class)?;
                self.push(TargetValue::Bool(!operand))?;
            }
            Instruction::Eq | Instruction::NotEq => {
                let right = self.pop(class)?;
                let left = self.pop(class)?;
                let equal = self.values_equal(left, right)?;
                self.push(TargetValue::Bool(equal == matches!(instruction, Instruction::Eq)))?;
            }
            Instruction::Lt | Instruction::LtEq | Instruction::Gt | Instruction::GtEq => {
                let right = self.pop_int(class)?;
                let left = self.pop_int(class)?;
                let result = match instruction {
                    Instruction::Lt => left < right,
                    Instruction::LtEq => left <= right,
                    Instruction::Gt => left > right,
                    _ => left >= right,
                };
                self.push(TargetValue::Bool(result))?;
            }

            Instruction::Concat => {
                let right = self.pop(class)?;
                let left = self.pop(class)?;
                let text = self.render_value(left)? + &self.render_value(right)?;
                self.alloc_str(text)?;
            }
            Instruction::ToStr => {
                let value = self.pop(class)?;
                let text = self.render_value(value)?;
                self.alloc_str(text)?;
            }
            Instruction::StrLen => {
                let id = self.pop_object(class)?;
                let length = self.heap.string(id)?.chars().count();
                self.push(TargetValue::Int(i64::try_from(length).unwrap_or(i64::MAX)))?;
            }

            Instruction::Jump(target) => self.top_mut()?.pc = *target,
            Instruction::JumpIfFalse(target) => {
                if !self.pop_bool(class)? {
                    self.top_mut()?.pc = *target;
                }
            }
            Instruction::Pop => {
                self.pop(class)?;
            }
            Instruction::Dup => {
                let value = self.pop(class)?;
                self.push(value)?;
                self.push(value)?;
            }

            Instruction::InvokeStatic {
                class: owner,
                method,
                argc,
            } => {
                let args = self.pop_args(*argc, class)?;
                let (callee, index) = self.resolve_static(owner, method, args.len())?;
                return self.call(callee, index, &args, None);
            }
            Instruction::MakeClosure {
                class: closure_class,
                captures,
            } => {
                let values = self.pop_args(*captures, class)?;
                let closure = self.instantiate_closure(closure_class, values)?;
                self.push(TargetValue::Object(closure))?;
            }
            Instruction::InvokeClosure { argc } => {
                let args = self.pop_args(*argc, class)?;
                let closure = self.pop_object(class)?;
                let (callee, index) = self.resolve_closure(closure, args.len())?;
                return self.call(callee, index, &args, Some(closure));
            }

            Instruction::Print => {
                let value = self.pop(class)?;
                let text = self.render_value(value)?;
                self.output.println(&text);
            }
            Instruction::Throw => {
                let value = self.pop(class)?;
                let message = self.render_value(value)?;
                return Ok(self.throw(&message));
            }
            Instruction::Return => {
                let value = self.pop(class)?;
                self.frames.pop();
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn call(
        &mut self,
        class: Arc<ClassFile>,
        method: usize,
        args: &[TargetValue],
        closure: Option<ObjectId>,
    ) -> Result<Flow, TargetError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Ok(self.throw("stack overflow"));
        }
        self.push_frame(class, method, args, closure)?;
        Ok(Flow::Next)
    }
}

fn check_arity(class: &str, method: &MethodInfo, argc: usize) -> Result<(), TargetError> {
    if method.params.len() == argc {
        Ok(())
    } else {
        Err(TargetError::Linkage {
            message: format!(
                "`{class}.{}` takes {} argument(s), got {argc}",
                method.name,
                method.params.len()
            ),
        })
    }
}

fn invalid_code(class: &ClassFile, message: impl Into<String>) -> TargetError {
    TargetError::InvalidCode {
        class: class.name.clone(),
        message: message.into(),
    }
}
