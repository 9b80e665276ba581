//! Per-method code buffer and slot bookkeeping.

use peek_ir::{ExprId, Type};
use peek_resolve::{Capture, DeclId};
use rustc_hash::FxHashMap;

use crate::{
    BinaryType, CapturedVariable, CodegenError, Instruction, LineEntry, LocalVariable,
    MethodFlags, MethodInfo,
};

/// How a closure holds one captured value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct CaptureSlot {
    pub(crate) index: u16,
    /// The entry is a shared box rather than the value itself.
    pub(crate) boxed: bool,
}

/// A captured value as laid out in a new closure class.
pub(crate) struct CaptureLayout {
    pub(crate) capture: Capture,
    pub(crate) variable: CapturedVariable,
    pub(crate) boxed: bool,
}

/// Position in the instruction stream of a jump to be patched.
#[derive(Copy, Clone, Debug)]
pub(crate) struct PendingJump(usize);

/// Marks where a lexical block starts, for closing its locals.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ScopeMark(usize);

/// State of the method currently being generated.
///
/// Values are addressed by declaration: `slots` holds locals and parameters
/// of this frame (including those introduced by inline expansion),
/// `receivers` the implicit receivers, and `captures` the closure's
/// captured-variable table.
pub(crate) struct FrameBuilder {
    /// Prefix for classes of closures created in this frame.
    pub(crate) owner: String,
    code: Vec<Instruction>,
    locals: Vec<LocalVariable>,
    /// Indices into `locals` whose scope is still open.
    open: Vec<usize>,
    next_slot: u16,
    pub(crate) slots: FxHashMap<DeclId, u16>,
    pub(crate) receivers: FxHashMap<DeclId, u16>,
    pub(crate) captures: FxHashMap<Capture, CaptureSlot>,
    capture_table: Vec<CapturedVariable>,
    /// Local function whose body this is; it refers to itself through the
    /// closure object in slot 0.
    pub(crate) self_decl: Option<DeclId>,
    /// Function-typed parameters of inline functions bound to the lambda
    /// passed at the call being expanded.
    pub(crate) inline_lambdas: FxHashMap<DeclId, ExprId>,
    lines: Vec<LineEntry>,
    /// Depth of inline function expansion; lines are not recorded inside.
    pub(crate) inlining: u32,
    /// Whether the reference interceptor applies to this frame.
    pub(crate) intercept: bool,
}

impl FrameBuilder {
    /// Frame of a static method.
    pub(crate) fn method(class: &str, method: &str, intercept: bool) -> Self {
        FrameBuilder {
            owner: format!("{class}${method}"),
            code: Vec::new(),
            locals: Vec::new(),
            open: Vec::new(),
            next_slot: 0,
            slots: FxHashMap::default(),
            receivers: FxHashMap::default(),
            captures: FxHashMap::default(),
            capture_table: Vec::new(),
            self_decl: None,
            inline_lambdas: FxHashMap::default(),
            lines: Vec::new(),
            inlining: 0,
            intercept,
        }
    }

    /// Frame of a closure's `invoke` method. Slot 0 holds the closure.
    pub(crate) fn closure(
        class: &str,
        self_decl: Option<DeclId>,
        layout: Vec<CaptureLayout>,
    ) -> Result<Self, CodegenError> {
        let mut frame = FrameBuilder::method(class, "", false);
        frame.owner = class.to_owned();
        frame.next_slot = 1;
        frame.self_decl = self_decl;
        for (i, entry) in layout.into_iter().enumerate() {
            let index = u16::try_from(i).map_err(|_| CodegenError::TooManyCaptures {
                class: class.to_owned(),
            })?;
            frame.captures.insert(
                entry.capture,
                CaptureSlot {
                    index,
                    boxed: entry.boxed,
                },
            );
            frame.capture_table.push(entry.variable);
        }
        Ok(frame)
    }

    // ── Emission ────────────────────────────────────────────────────

    pub(crate) fn pc(&self) -> u32 {
        u32::try_from(self.code.len()).unwrap_or(u32::MAX)
    }

    pub(crate) fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    pub(crate) fn jump(&mut self) -> PendingJump {
        self.code.push(Instruction::Jump(0));
        PendingJump(self.code.len() - 1)
    }

    pub(crate) fn jump_if_false(&mut self) -> PendingJump {
        self.code.push(Instruction::JumpIfFalse(0));
        PendingJump(self.code.len() - 1)
    }

    /// Point a pending jump at the next instruction.
    pub(crate) fn patch_here(&mut self, jump: PendingJump) {
        let target = self.pc();
        match &mut self.code[jump.0] {
            Instruction::Jump(t) | Instruction::JumpIfFalse(t) => *t = target,
            other => panic!("patching non-jump instruction {other:?}"),
        }
    }

    /// Record that code for `line` starts here.
    pub(crate) fn line(&mut self, line: u32) {
        if self.inlining > 0 {
            return;
        }
        let pc = self.pc();
        match self.lines.last_mut() {
            Some(last) if last.line == line => {}
            Some(last) if last.pc == pc => last.line = line,
            _ => self.lines.push(LineEntry { pc, line }),
        }
    }

    // ── Slots ───────────────────────────────────────────────────────

    fn alloc_slot(&mut self) -> Result<u16, CodegenError> {
        let slot = self.next_slot;
        self.next_slot = slot
            .checked_add(1)
            .ok_or_else(|| CodegenError::TooManyLocals {
                method: self.owner.clone(),
            })?;
        Ok(slot)
    }

    /// Reserve a slot for `decl` before its value is computed.
    pub(crate) fn alloc(&mut self, decl: DeclId) -> Result<u16, CodegenError> {
        let slot = self.alloc_slot()?;
        self.slots.insert(decl, slot);
        Ok(slot)
    }

    /// A slot no declaration refers to.
    pub(crate) fn temp(&mut self) -> Result<u16, CodegenError> {
        self.alloc_slot()
    }

    /// Make `slot` visible in the local variable table from here on, until
    /// the enclosing scope closes.
    pub(crate) fn open_local(&mut self, slot: u16, name: &str, ty: BinaryType) {
        self.open.push(self.locals.len());
        self.locals.push(LocalVariable {
            name: name.to_owned(),
            ty,
            slot,
            start: self.pc(),
            end: u32::MAX,
        });
    }

    /// Declare a parameter, live for the whole method.
    pub(crate) fn param(
        &mut self,
        decl: Option<DeclId>,
        name: &str,
        ty: &Type,
    ) -> Result<u16, CodegenError> {
        let slot = match decl {
            Some(decl) => self.alloc(decl)?,
            None => self.temp()?,
        };
        self.open_local(slot, name, BinaryType::of(ty));
        Ok(slot)
    }

    /// Declare the receiver parameter of `owner`.
    pub(crate) fn receiver_param(
        &mut self,
        owner: DeclId,
        name: &str,
        ty: &Type,
    ) -> Result<u16, CodegenError> {
        let slot = self.temp()?;
        self.receivers.insert(owner, slot);
        self.open_local(slot, name, BinaryType::of(ty));
        Ok(slot)
    }

    pub(crate) fn scope_mark(&self) -> ScopeMark {
        ScopeMark(self.open.len())
    }

    /// End the scope of every local opened since `mark`.
    pub(crate) fn close_scope(&mut self, mark: ScopeMark) {
        let end = self.pc();
        for index in self.open.drain(mark.0..) {
            self.locals[index].end = end;
        }
    }

    /// Remember how `owner` and its parameters are bound, before an inline
    /// expansion rebinds them.
    pub(crate) fn save(&self, owner: DeclId, params: &[DeclId]) -> SavedBindings {
        SavedBindings {
            receiver: (owner, self.receivers.get(&owner).copied()),
            slots: params
                .iter()
                .map(|p| (*p, self.slots.get(p).copied()))
                .collect(),
            lambdas: params
                .iter()
                .map(|p| (*p, self.inline_lambdas.get(p).copied()))
                .collect(),
        }
    }

    pub(crate) fn restore(&mut self, saved: SavedBindings) {
        fn put<V>(map: &mut FxHashMap<DeclId, V>, key: DeclId, value: Option<V>) {
            match value {
                Some(value) => map.insert(key, value),
                None => map.remove(&key),
            };
        }
        let (owner, receiver) = saved.receiver;
        put(&mut self.receivers, owner, receiver);
        for (decl, slot) in saved.slots {
            put(&mut self.slots, decl, slot);
        }
        for (decl, lambda) in saved.lambdas {
            put(&mut self.inline_lambdas, decl, lambda);
        }
    }

    // ── Finishing ───────────────────────────────────────────────────

    /// Return the value on the stack, or `Unit` for a `Unit` method, and
    /// close the method.
    pub(crate) fn finish_body(mut self, ret: &Type) -> MethodCode {
        if BinaryType::of(ret) == BinaryType::Void {
            self.emit(Instruction::Pop);
            self.emit(Instruction::PushUnit);
        }
        self.emit(Instruction::Return);
        self.close_scope(ScopeMark(0));
        MethodCode {
            code: self.code,
            locals: self.locals,
            lines: self.lines,
            max_locals: self.next_slot,
            captures: self.capture_table,
        }
    }
}

/// Bindings shadowed by an inline expansion.
pub(crate) struct SavedBindings {
    receiver: (DeclId, Option<u16>),
    slots: Vec<(DeclId, Option<u16>)>,
    lambdas: Vec<(DeclId, Option<ExprId>)>,
}

/// Generated body of one method.
pub(crate) struct MethodCode {
    pub(crate) code: Vec<Instruction>,
    pub(crate) locals: Vec<LocalVariable>,
    pub(crate) lines: Vec<LineEntry>,
    pub(crate) max_locals: u16,
    pub(crate) captures: Vec<CapturedVariable>,
}

impl MethodCode {
    pub(crate) fn into_method(
        self,
        name: &str,
        flags: MethodFlags,
        params: Vec<BinaryType>,
        ret: BinaryType,
    ) -> MethodInfo {
        MethodInfo {
            name: name.to_owned(),
            flags,
            params,
            ret,
            max_locals: self.max_locals,
            code: self.code,
            locals: self.locals,
            lines: self.lines,
        }
    }
}
