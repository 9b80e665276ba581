//! The VM as seen by a debugger.

use std::sync::Arc;

use peek_codegen::{ClassFlags, NamedBinary};
use peek_target::{
    DebugTarget, FrameVariable, InvocationOutcome, ObjectId, ObjectKind, TargetError, TargetValue,
};
use tracing::debug;

use crate::heap::HeapObject;
use crate::machine::{ThreadState, Vm};

impl Vm {
    fn suspended(&self) -> Result<(), TargetError> {
        match self.state {
            ThreadState::Suspended => Ok(()),
            ThreadState::Finished | ThreadState::Terminated => Err(TargetError::Disconnected),
            ThreadState::NotStarted => Err(TargetError::NotSuspended),
        }
    }

    fn may_invoke(&self) -> Result<(), TargetError> {
        self.suspended()?;
        if self.config.allow_invocation {
            Ok(())
        } else {
            Err(TargetError::InvocationRefused)
        }
    }
}

impl DebugTarget for Vm {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn is_suspended(&self) -> bool {
        self.state == ThreadState::Suspended
    }

    fn current_line(&self) -> Option<u32> {
        if !self.is_suspended() {
            return None;
        }
        let frame = self.frames.last()?;
        frame.method().line_at(frame.pc)
    }

    fn frame_variables(&self) -> Result<Vec<FrameVariable>, TargetError> {
        self.suspended()?;
        let frame = self.top()?;
        let mut variables = Vec::new();
        for local in frame.method().live_locals(frame.pc) {
            let value = frame
                .locals
                .get(usize::from(local.slot))
                .copied()
                .ok_or_else(|| TargetError::InconsistentDebugInfo {
                    message: format!("`{}` lives in missing slot {}", local.name, local.slot),
                })?;
            variables.push(FrameVariable {
                name: local.name.clone(),
                ty: local.ty,
                value,
            });
        }
        Ok(variables)
    }

    fn captured_variables(&self) -> Result<Vec<FrameVariable>, TargetError> {
        self.suspended()?;
        let frame = self.top()?;
        let Some(closure) = frame.closure else {
            return Ok(Vec::new());
        };
        let (_, values) = self.heap.closure(closure)?;
        if values.len() != frame.class.captures.len() {
            return Err(TargetError::InconsistentDebugInfo {
                message: format!(
                    "closure {closure} holds {} values, `{}` declares {}",
                    values.len(),
                    frame.class.name,
                    frame.class.captures.len()
                ),
            });
        }
        Ok(frame
            .class
            .captures
            .iter()
            .zip(values)
            .map(|(variable, &value)| FrameVariable {
                name: variable.name.clone(),
                ty: variable.ty,
                value,
            })
            .collect())
    }

    fn load_class(&mut self, binary: &NamedBinary) -> Result<(), TargetError> {
        if !self.config.allow_class_loading {
            return Err(TargetError::ClassLoadingRefused);
        }
        let class = binary.decode().map_err(|e| TargetError::InvalidCode {
            class: binary.class_name.clone(),
            message: e.to_string(),
        })?;
        if class.name != binary.class_name {
            return Err(TargetError::InvalidCode {
                class: binary.class_name.clone(),
                message: format!("binary defines `{}`", class.name),
            });
        }
        // Generated classes are redefined by every evaluation; program
        // classes are not.
        if let Some(existing) = self.classes.get(&class.name) {
            if !existing.flags.contains(ClassFlags::SYNTHETIC) {
                return Err(TargetError::Linkage {
                    message: format!("duplicate definition of `{}`", class.name),
                });
            }
        }
        debug!(class = %class.name, methods = class.methods.len(), "class loaded");
        self.classes.insert(class.name.clone(), Arc::new(class));
        Ok(())
    }

    fn is_loaded(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    fn has_method(&self, class: &str, method: &str) -> bool {
        self.classes
            .get(class)
            .is_some_and(|c| c.method(method).is_some())
    }

    fn invoke_static(
        &mut self,
        class: &str,
        method: &str,
        args: &[TargetValue],
    ) -> Result<InvocationOutcome, TargetError> {
        self.may_invoke()?;
        let (callee, index) = self.resolve_static(class, method, args.len())?;
        self.invoke(callee, index, args, None)
    }

    fn invoke_closure(
        &mut self,
        closure: ObjectId,
        args: &[TargetValue],
    ) -> Result<InvocationOutcome, TargetError> {
        self.may_invoke()?;
        let (callee, index) = self.resolve_closure(closure, args.len())?;
        self.invoke(callee, index, args, Some(closure))
    }

    fn object_kind(&self, id: ObjectId) -> Result<ObjectKind, TargetError> {
        Ok(self.heap.get(id)?.kind())
    }

    fn new_closure(
        &mut self,
        class: &str,
        captures: Vec<TargetValue>,
    ) -> Result<ObjectId, TargetError> {
        self.suspended()?;
        self.instantiate_closure(class, captures)
    }

    fn closure_captures(&self, closure: ObjectId) -> Result<Vec<TargetValue>, TargetError> {
        let (_, captures) = self.heap.closure(closure)?;
        Ok(captures.to_vec())
    }

    fn new_box(&mut self, value: TargetValue) -> Result<ObjectId, TargetError> {
        self.suspended()?;
        Ok(self.heap.alloc(HeapObject::Ref(value)))
    }

    fn box_get(&self, cell: ObjectId) -> Result<TargetValue, TargetError> {
        self.heap.box_get(cell)
    }

    fn box_set(&mut self, cell: ObjectId, value: TargetValue) -> Result<(), TargetError> {
        self.heap.box_set(cell, value)
    }

    fn mirror_string(&mut self, text: &str) -> Result<ObjectId, TargetError> {
        self.suspended()?;
        Ok(self.heap.alloc(HeapObject::Str(text.to_owned())))
    }

    fn read_string(&self, id: ObjectId) -> Result<String, TargetError> {
        self.heap.string(id).map(str::to_owned)
    }

    fn new_exception(&mut self, message: &str) -> Result<ObjectId, TargetError> {
        self.suspended()?;
        Ok(self.heap.alloc(HeapObject::Exception {
            message: message.to_owned(),
        }))
    }

    fn exception_message(&self, id: ObjectId) -> Result<String, TargetError> {
        self.heap.exception_message(id).map(str::to_owned)
    }

    fn print(&mut self, text: &str) -> Result<(), TargetError> {
        self.output.println(text);
        Ok(())
    }

    fn breakpoints(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = self.breakpoints.iter().copied().collect();
        lines.sort_unstable();
        lines
    }

    fn breakpoints_enabled(&self) -> bool {
        self.breakpoints_enabled
    }

    fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.breakpoints_enabled = enabled;
    }
}
