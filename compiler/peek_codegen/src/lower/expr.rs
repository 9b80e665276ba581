use peek_ir::{BinaryOp, ExprId, ExprKind, Type, UnaryOp};
use peek_resolve::{receiver_slot_name, Capture, DeclId, MemberBuiltin, Reference};

use super::{FrameBuilder, Lowerer};
use crate::{BinaryType, CodegenError, Instruction};

fn param_slot(index: usize) -> Result<u16, CodegenError> {
    u16::try_from(index).map_err(|_| CodegenError::TooManyArguments)
}

impl Lowerer<'_> {
    pub(super) fn expr_inner(
        &mut self,
        frame: &mut FrameBuilder,
        id: ExprId,
    ) -> Result<(), CodegenError> {
        let arena = self.arena;
        match arena.kind(id) {
            ExprKind::Int(value) => frame.emit(Instruction::PushInt(*value)),
            ExprKind::Bool(value) => frame.emit(Instruction::PushBool(*value)),
            ExprKind::Str(text) => {
                frame.emit(Instruction::PushStr(self.interner.lookup(*text).to_owned()));
            }
            ExprKind::Ident(_) | ExprKind::This { .. } | ExprKind::Super { .. } => {
                self.load_reference(frame, id)?;
            }
            ExprKind::Unary { op, operand } => {
                self.expr(frame, *operand)?;
                frame.emit(match op {
                    UnaryOp::Neg => Instruction::Neg,
                    UnaryOp::Not => Instruction::Not,
                });
            }
            ExprKind::Binary { op, left, right } => self.binary(frame, id, *op, *left, *right)?,
            ExprKind::Call { callee, args } => self.call(frame, id, *callee, args)?,
            ExprKind::MethodCall { receiver, args, .. } => {
                self.method_call(frame, id, *receiver, args)?;
            }
            ExprKind::Member { receiver, .. } => match self.bindings.member(id) {
                Some(MemberBuiltin::Length) => {
                    self.expr(frame, *receiver)?;
                    frame.emit(Instruction::StrLen);
                }
                _ => return Err(self.unresolved(id)),
            },
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.if_expr(frame, id, *cond, *then_branch, *else_branch)?,
            ExprKind::Block { stmts } => {
                let mark = frame.scope_mark();
                self.statements(frame, stmts)?;
                frame.close_scope(mark);
            }
            ExprKind::Lambda(_) => {
                let decl = self
                    .bindings
                    .definition(id)
                    .ok_or_else(|| self.unresolved(id))?;
                self.make_closure(frame, decl)?;
            }
            ExprKind::Let { .. }
            | ExprKind::Assign { .. }
            | ExprKind::While { .. }
            | ExprKind::LocalFun(_) => {
                self.statement(frame, id)?;
                frame.emit(Instruction::PushUnit);
            }
            ExprKind::Error => {
                return Err(CodegenError::Unsupported {
                    what: "an expression that failed to parse".to_owned(),
                })
            }
        }
        Ok(())
    }

    /// Compile a declaration or statement form; nothing is left on the stack.
    pub(super) fn statement(
        &mut self,
        frame: &mut FrameBuilder,
        stmt: ExprId,
    ) -> Result<(), CodegenError> {
        let arena = self.arena;
        match arena.kind(stmt) {
            ExprKind::Let { init, .. } => {
                let decl = self
                    .bindings
                    .definition(stmt)
                    .ok_or_else(|| self.unresolved(stmt))?;
                let slot = frame.alloc(decl)?;
                self.expr(frame, *init)?;
                let boxed = self.bindings.is_boxed(decl);
                if boxed {
                    frame.emit(Instruction::NewRef);
                }
                frame.emit(Instruction::Store(slot));
                let ty = if boxed {
                    BinaryType::Ref
                } else {
                    BinaryType::of(&self.decls.get(decl).ty)
                };
                frame.open_local(slot, &self.slot_name(decl), ty);
            }
            ExprKind::Assign { target, value } => {
                let Some(Reference::Decl(decl)) = self.bindings.reference(*target) else {
                    return Err(self.unresolved(*target));
                };
                self.store(frame, decl, *value)?;
            }
            ExprKind::While { cond, body } => {
                let start = frame.pc();
                self.expr(frame, *cond)?;
                let exit = frame.jump_if_false();
                self.expr(frame, *body)?;
                frame.emit(Instruction::Pop);
                frame.emit(Instruction::Jump(start));
                frame.patch_here(exit);
            }
            ExprKind::LocalFun(_) => {
                let decl = self
                    .bindings
                    .definition(stmt)
                    .ok_or_else(|| self.unresolved(stmt))?;
                self.make_closure(frame, decl)?;
                let slot = frame.alloc(decl)?;
                frame.emit(Instruction::Store(slot));
                frame.open_local(slot, &self.slot_name(decl), BinaryType::Function);
            }
            _ => self.effect(frame, stmt)?,
        }
        Ok(())
    }

    fn binary(
        &mut self,
        frame: &mut FrameBuilder,
        id: ExprId,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    ) -> Result<(), CodegenError> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                self.expr(frame, left)?;
                frame.emit(Instruction::Dup);
                if op == BinaryOp::Or {
                    frame.emit(Instruction::Not);
                }
                let short_circuit = frame.jump_if_false();
                frame.emit(Instruction::Pop);
                self.expr(frame, right)?;
                frame.patch_here(short_circuit);
                return Ok(());
            }
            BinaryOp::Add if self.type_of(id) == Type::Str => {
                self.expr(frame, left)?;
                self.expr(frame, right)?;
                if self.type_of(right) != Type::Str {
                    frame.emit(Instruction::ToStr);
                }
                frame.emit(Instruction::Concat);
                return Ok(());
            }
            _ => {}
        }
        self.expr(frame, left)?;
        self.expr(frame, right)?;
        frame.emit(match op {
            BinaryOp::Add => Instruction::Add,
            BinaryOp::Sub => Instruction::Sub,
            BinaryOp::Mul => Instruction::Mul,
            BinaryOp::Div => Instruction::Div,
            BinaryOp::Rem => Instruction::Rem,
            BinaryOp::Eq => Instruction::Eq,
            BinaryOp::NotEq => Instruction::NotEq,
            BinaryOp::Lt => Instruction::Lt,
            BinaryOp::LtEq => Instruction::LtEq,
            BinaryOp::Gt => Instruction::Gt,
            BinaryOp::GtEq => Instruction::GtEq,
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators handled above"),
        });
        Ok(())
    }

    fn if_expr(
        &mut self,
        frame: &mut FrameBuilder,
        id: ExprId,
        cond: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    ) -> Result<(), CodegenError> {
        // Branches of a `Unit` conditional may have unrelated types; both
        // drop their value.
        let unit = BinaryType::of(&self.type_of(id)) == BinaryType::Void;
        self.expr(frame, cond)?;
        let to_else = frame.jump_if_false();
        self.expr(frame, then_branch)?;
        if unit {
            frame.emit(Instruction::Pop);
        }
        let to_end = frame.jump();
        frame.patch_here(to_else);
        if let Some(else_branch) = else_branch {
            self.expr(frame, else_branch)?;
            if unit {
                frame.emit(Instruction::Pop);
            }
        }
        frame.patch_here(to_end);
        if unit {
            frame.emit(Instruction::PushUnit);
        }
        Ok(())
    }

    // ── References ──────────────────────────────────────────────────

    /// Push the value an identifier, `this` or `super` expression denotes.
    pub(super) fn load_reference(
        &mut self,
        frame: &mut FrameBuilder,
        id: ExprId,
    ) -> Result<(), CodegenError> {
        if frame.intercept {
            if let Some(index) = self.interceptor.intercept(id) {
                frame.emit(Instruction::Load(param_slot(index)?));
                return Ok(());
            }
        }
        match self.bindings.reference(id) {
            Some(Reference::Decl(decl)) => self.load_decl(frame, decl),
            Some(Reference::Receiver(owner)) => self.load_receiver(frame, owner),
            None => match self.arena.kind(id) {
                ExprKind::Super { .. } => Err(CodegenError::Unsupported {
                    what: "`super`".to_owned(),
                }),
                _ => Err(self.unresolved(id)),
            },
        }
    }

    fn load_decl(&mut self, frame: &mut FrameBuilder, decl: DeclId) -> Result<(), CodegenError> {
        if let Some(&slot) = frame.slots.get(&decl) {
            frame.emit(Instruction::Load(slot));
            if self.bindings.is_boxed(decl) {
                frame.emit(Instruction::RefGet);
            }
            return Ok(());
        }
        if frame.self_decl == Some(decl) {
            frame.emit(Instruction::Load(0));
            return Ok(());
        }
        if let Some(capture) = frame.captures.get(&Capture::Value(decl)).copied() {
            frame.emit(Instruction::LoadCapture(capture.index));
            if capture.boxed {
                frame.emit(Instruction::RefGet);
            }
            return Ok(());
        }
        Err(CodegenError::UnboundReference {
            name: self.slot_name(decl),
        })
    }

    pub(super) fn load_receiver(
        &mut self,
        frame: &mut FrameBuilder,
        owner: DeclId,
    ) -> Result<(), CodegenError> {
        if let Some(&slot) = frame.receivers.get(&owner) {
            frame.emit(Instruction::Load(slot));
            return Ok(());
        }
        if let Some(capture) = frame.captures.get(&Capture::Receiver(owner)).copied() {
            frame.emit(Instruction::LoadCapture(capture.index));
            return Ok(());
        }
        Err(CodegenError::UnboundReference {
            name: receiver_slot_name(self.name(owner)),
        })
    }

    /// Push the value a new closure captures; returns whether it is a box.
    pub(super) fn push_capture(
        &mut self,
        frame: &mut FrameBuilder,
        capture: Capture,
    ) -> Result<bool, CodegenError> {
        if frame.intercept {
            if let Some(index) = self.interceptor.intercept_capture(capture) {
                frame.emit(Instruction::Load(param_slot(index)?));
                return Ok(false);
            }
        }
        let decl = match capture {
            Capture::Value(decl) => decl,
            Capture::Receiver(owner) => {
                self.load_receiver(frame, owner)?;
                return Ok(false);
            }
        };
        if let Some(&slot) = frame.slots.get(&decl) {
            frame.emit(Instruction::Load(slot));
            return Ok(self.bindings.is_boxed(decl));
        }
        if frame.self_decl == Some(decl) {
            frame.emit(Instruction::Load(0));
            return Ok(false);
        }
        if let Some(held) = frame.captures.get(&capture).copied() {
            frame.emit(Instruction::LoadCapture(held.index));
            return Ok(held.boxed);
        }
        Err(CodegenError::UnboundReference {
            name: self.slot_name(decl),
        })
    }

    fn store(
        &mut self,
        frame: &mut FrameBuilder,
        decl: DeclId,
        value: ExprId,
    ) -> Result<(), CodegenError> {
        if let Some(&slot) = frame.slots.get(&decl) {
            if self.bindings.is_boxed(decl) {
                frame.emit(Instruction::Load(slot));
                self.expr(frame, value)?;
                frame.emit(Instruction::RefSet);
            } else {
                self.expr(frame, value)?;
                frame.emit(Instruction::Store(slot));
            }
            return Ok(());
        }
        match frame.captures.get(&Capture::Value(decl)).copied() {
            Some(capture) if capture.boxed => {
                frame.emit(Instruction::LoadCapture(capture.index));
                self.expr(frame, value)?;
                frame.emit(Instruction::RefSet);
                Ok(())
            }
            Some(_) => Err(CodegenError::Unsupported {
                what: format!("assignment to captured value `{}`", self.slot_name(decl)),
            }),
            None => Err(CodegenError::UnboundReference {
                name: self.slot_name(decl),
            }),
        }
    }
}
