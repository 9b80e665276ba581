//! Host-side interpretation of compiled fragments.
//!
//! When the debuggee cannot run a compiled fragment itself, the fragment's
//! own classes are executed here, instruction by instruction. Every value
//! still lives in the debuggee: strings are mirrored into it, boxes and
//! closures are created there, and calls to program code are invoked on
//! the suspended thread.

use std::sync::Arc;

use peek_codegen::{ClassFile, Instruction, INVOKE_METHOD};
use peek_target::{DebugTarget, InvocationOutcome, ObjectId, ObjectKind, TargetError, TargetValue};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::{EvaluateError, EvaluationResult, ExceptionKind};

/// Deepest nesting of interpreted calls.
pub const DEFAULT_MAX_DEPTH: usize = 256;

enum Completion {
    Returned(TargetValue),
    Threw(ObjectId),
}

impl From<InvocationOutcome> for Completion {
    fn from(outcome: InvocationOutcome) -> Self {
        match outcome {
            InvocationOutcome::Returned(value) => Completion::Returned(value),
            InvocationOutcome::Threw(exception) => Completion::Threw(exception),
        }
    }
}

enum Fault {
    Target(TargetError),
    /// The code itself is malformed or ran too deep.
    Abnormal(String),
}

impl From<TargetError> for Fault {
    fn from(error: TargetError) -> Self {
        Fault::Target(error)
    }
}

pub struct Interpreter<'t> {
    target: &'t mut dyn DebugTarget,
    classes: FxHashMap<String, Arc<ClassFile>>,
    max_depth: usize,
}

impl<'t> Interpreter<'t> {
    /// Interpreter running `classes` host-side; every other class is the
    /// debuggee's.
    pub fn new(target: &'t mut dyn DebugTarget, classes: Vec<ClassFile>) -> Self {
        Interpreter {
            target,
            classes: classes
                .into_iter()
                .map(|class| (class.name.clone(), Arc::new(class)))
                .collect(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Run static `method` of `class`.
    ///
    /// Structural failures of the debuggee become a
    /// [`ExceptionKind::BrokenCode`] exception; other debuggee failures are
    /// errors.
    #[tracing::instrument(level = "debug", skip(self, args))]
    pub fn interpret(
        &mut self,
        class: &str,
        method: &str,
        args: &[TargetValue],
    ) -> Result<EvaluationResult, EvaluateError> {
        let result = match self.run(class, method, args, None, 0) {
            Ok(Completion::Returned(value)) => EvaluationResult::ValueReturned(value),
            Ok(Completion::Threw(exception)) => EvaluationResult::ExceptionThrown {
                exception,
                kind: ExceptionKind::FromEvaluatedCode,
            },
            Err(Fault::Target(error)) if error.is_structural() => {
                debug!(%error, "interpreted code does not match the debuggee");
                let exception = self.target.new_exception(&error.to_string())?;
                EvaluationResult::ExceptionThrown {
                    exception,
                    kind: ExceptionKind::BrokenCode,
                }
            }
            Err(Fault::Target(error)) => return Err(error.into()),
            Err(Fault::Abnormal(message)) => EvaluationResult::AbnormalTermination(message),
        };
        Ok(result)
    }

    fn run(
        &mut self,
        class: &str,
        method: &str,
        args: &[TargetValue],
        closure: Option<ObjectId>,
        depth: usize,
    ) -> Result<Completion, Fault> {
        if depth >= self.max_depth {
            return Err(Fault::Abnormal("stack overflow in evaluated code".to_owned()));
        }
        let Some(owner) = self.classes.get(class).cloned() else {
            return Err(TargetError::ClassNotLoaded {
                class: class.to_owned(),
            }
            .into());
        };
        let Some(info) = owner.method(method) else {
            return Err(TargetError::MethodNotFound {
                class: class.to_owned(),
                method: method.to_owned(),
            }
            .into());
        };
        if info.params.len() != args.len() {
            return Err(TargetError::Linkage {
                message: format!(
                    "`{class}.{method}` takes {} argument(s), got {}",
                    info.params.len(),
                    args.len()
                ),
            }
            .into());
        }

        let offset = usize::from(closure.is_some());
        let mut locals = vec![TargetValue::Unit; usize::from(info.max_locals).max(offset + args.len())];
        if let Some(closure) = closure {
            locals[0] = TargetValue::Object(closure);
        }
        locals[offset..offset + args.len()].copy_from_slice(args);
        let captures = match closure {
            Some(closure) => self.target.closure_captures(closure)?,
            None => Vec::new(),
        };
        let mut stack: Vec<TargetValue> = Vec::new();
        let mut pc = 0usize;

        loop {
            let instruction = info
                .code
                .get(pc)
                .ok_or_else(|| abnormal(class, "execution ran past the end of the method"))?;
            pc += 1;

            match instruction {
                Instruction::PushInt(n) => stack.push(TargetValue::Int(*n)),
                Instruction::PushBool(b) => stack.push(TargetValue::Bool(*b)),
                Instruction::PushStr(text) => {
                    let id = self.target.mirror_string(text)?;
                    stack.push(TargetValue::Object(id));
                }
                Instruction::PushUnit => stack.push(TargetValue::Unit),

                Instruction::Load(slot) => {
                    let value = locals
                        .get(usize::from(*slot))
                        .copied()
                        .ok_or_else(|| abnormal(class, format!("no local slot {slot}")))?;
                    stack.push(value);
                }
                Instruction::Store(slot) => {
                    let value = pop(&mut stack, class)?;
                    let local = locals
                        .get_mut(usize::from(*slot))
                        .ok_or_else(|| abnormal(class, format!("no local slot {slot}")))?;
                    *local = value;
                }
                Instruction::LoadCapture(index) => {
                    let value = captures
                        .get(usize::from(*index))
                        .copied()
                        .ok_or_else(|| abnormal(class, format!("no captured variable {index}")))?;
                    stack.push(value);
                }

                Instruction::NewRef => {
                    let value = pop(&mut stack, class)?;
                    let cell = self.target.new_box(value)?;
                    stack.push(TargetValue::Object(cell));
                }
                Instruction::RefGet => {
                    let cell = pop_object(&mut stack, class)?;
                    stack.push(self.target.box_get(cell)?);
                }
                Instruction::RefSet => {
                    let value = pop(&mut stack, class)?;
                    let cell = pop_object(&mut stack, class)?;
                    self.target.box_set(cell, value)?;
                }

                Instruction::Add | Instruction::Sub | Instruction::Mul => {
                    let right = pop_int(&mut stack, class)?;
                    let left = pop_int(&mut stack, class)?;
                    stack.push(TargetValue::Int(match instruction {
                        Instruction::Add => left.wrapping_add(right),
                        Instruction::Sub => left.wrapping_sub(right),
                        _ => left.wrapping_mul(right),
                    }));
                }
                Instruction::Div | Instruction::Rem => {
                    let right = pop_int(&mut stack, class)?;
                    let left = pop_int(&mut stack, class)?;
                    if right == 0 {
                        return Ok(Completion::Threw(self.target.new_exception("/ by zero")?));
                    }
                    stack.push(TargetValue::Int(if matches!(instruction, Instruction::Div) {
                        left.wrapping_div(right)
                    } else {
                        left.wrapping_rem(right)
                    }));
                }
                Instruction::Neg => {
                    let operand = pop_int(&mut stack, class)?;
                    stack.push(TargetValue::Int(operand.wrapping_neg()));
                }
                Instruction::Not => {
                    let operand = pop_bool(&mut stack, class)?;
                    stack.push(TargetValue::Bool(!operand));
                }
                Instruction::Eq | Instruction::NotEq => {
                    let right = pop(&mut stack, class)?;
                    let left = pop(&mut stack, class)?;
                    let equal = self.target.values_equal(left, right)?;
                    stack.push(TargetValue::Bool(equal == matches!(instruction, Instruction::Eq)));
                }
                Instruction::Lt | Instruction::LtEq | Instruction::Gt | Instruction::GtEq => {
                    let right = pop_int(&mut stack, class)?;
                    let left = pop_int(&mut stack, class)?;
                    stack.push(TargetValue::Bool(match instruction {
                        Instruction::Lt => left < right,
                        Instruction::LtEq => left <= right,
                        Instruction::Gt => left > right,
                        _ => left >= right,
                    }));
                }

                Instruction::Concat => {
                    let right = pop(&mut stack, class)?;
                    let left = pop(&mut stack, class)?;
                    let text = self.target.render_value(left)? + &self.target.render_value(right)?;
                    stack.push(TargetValue::Object(self.target.mirror_string(&text)?));
                }
                Instruction::ToStr => {
                    let value = pop(&mut stack, class)?;
                    let text = self.target.render_value(value)?;
                    stack.push(TargetValue::Object(self.target.mirror_string(&text)?));
                }
                Instruction::StrLen => {
                    let id = pop_object(&mut stack, class)?;
                    let length = self.target.read_string(id)?.chars().count();
                    stack.push(TargetValue::Int(i64::try_from(length).unwrap_or(i64::MAX)));
                }

                Instruction::Jump(target) => pc = *target as usize,
                Instruction::JumpIfFalse(target) => {
                    if !pop_bool(&mut stack, class)? {
                        pc = *target as usize;
                    }
                }
                Instruction::Pop => {
                    pop(&mut stack, class)?;
                }
                Instruction::Dup => {
                    let value = pop(&mut stack, class)?;
                    stack.push(value);
                    stack.push(value);
                }

                Instruction::InvokeStatic {
                    class: callee,
                    method,
                    argc,
                } => {
                    let args = pop_args(&mut stack, *argc, class)?;
                    let completion = if self.classes.contains_key(callee) {
                        self.run(callee, method, &args, None, depth + 1)?
                    } else {
                        self.target.invoke_static(callee, method, &args)?.into()
                    };
                    match completion {
                        Completion::Returned(value) => stack.push(value),
                        Completion::Threw(exception) => return Ok(Completion::Threw(exception)),
                    }
                }
                Instruction::MakeClosure {
                    class: closure_class,
                    captures: count,
                } => {
                    let values = pop_args(&mut stack, *count, class)?;
                    let closure = self.target.new_closure(closure_class, values.into_vec())?;
                    stack.push(TargetValue::Object(closure));
                }
                Instruction::InvokeClosure { argc } => {
                    let args = pop_args(&mut stack, *argc, class)?;
                    let closure = pop_object(&mut stack, class)?;
                    let completion = match self.target.object_kind(closure)? {
                        ObjectKind::Closure { class: closure_class }
                            if self.classes.contains_key(&closure_class) =>
                        {
                            self.run(&closure_class, INVOKE_METHOD, &args, Some(closure), depth + 1)?
                        }
                        ObjectKind::Closure { .. } => {
                            self.target.invoke_closure(closure, &args)?.into()
                        }
                        other => {
                            return Err(abnormal(class, format!("cannot invoke {other:?}")));
                        }
                    };
                    match completion {
                        Completion::Returned(value) => stack.push(value),
                        Completion::Threw(exception) => return Ok(Completion::Threw(exception)),
                    }
                }

                Instruction::Print => {
                    let value = pop(&mut stack, class)?;
                    let text = self.target.render_value(value)?;
                    self.target.print(&text)?;
                }
                Instruction::Throw => {
                    let value = pop(&mut stack, class)?;
                    let message = self.target.render_value(value)?;
                    return Ok(Completion::Threw(self.target.new_exception(&message)?));
                }
                Instruction::Return => return Ok(Completion::Returned(pop(&mut stack, class)?)),
            }
        }
    }
}

fn abnormal(class: &str, message: impl Into<String>) -> Fault {
    Fault::Abnormal(format!("invalid code in `{class}`: {}", message.into()))
}

fn pop(stack: &mut Vec<TargetValue>, class: &str) -> Result<TargetValue, Fault> {
    stack
        .pop()
        .ok_or_else(|| abnormal(class, "operand stack underflow"))
}

fn pop_int(stack: &mut Vec<TargetValue>, class: &str) -> Result<i64, Fault> {
    match pop(stack, class)? {
        TargetValue::Int(n) => Ok(n),
        other => Err(abnormal(class, format!("expected Int, found {other:?}"))),
    }
}

fn pop_bool(stack: &mut Vec<TargetValue>, class: &str) -> Result<bool, Fault> {
    match pop(stack, class)? {
        TargetValue::Bool(b) => Ok(b),
        other => Err(abnormal(class, format!("expected Bool, found {other:?}"))),
    }
}

fn pop_object(stack: &mut Vec<TargetValue>, class: &str) -> Result<ObjectId, Fault> {
    match pop(stack, class)? {
        TargetValue::Object(id) => Ok(id),
        other => Err(abnormal(class, format!("expected an object, found {other:?}"))),
    }
}

/// The top `count` values, deepest first.
fn pop_args(
    stack: &mut Vec<TargetValue>,
    count: u16,
    class: &str,
) -> Result<SmallVec<[TargetValue; 4]>, Fault> {
    let count = usize::from(count);
    if stack.len() < count {
        return Err(abnormal(class, "operand stack underflow"));
    }
    Ok(stack.drain(stack.len() - count..).collect())
}
