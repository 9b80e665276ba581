//! Stack machine instruction set.
//!
//! Every expression leaves exactly one value on the operand stack; `Unit`
//! expressions push [`Instruction::PushUnit`]. Jump targets are absolute
//! instruction indices within the method.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    // ── Constants ───────────────────────────────────────────────────
    PushInt(i64),
    PushBool(bool),
    PushStr(String),
    PushUnit,

    // ── Locals and captured state ───────────────────────────────────
    /// Push local slot.
    Load(u16),
    /// Pop into local slot.
    Store(u16),
    /// Push entry of the running closure's captured-variable table.
    LoadCapture(u16),

    // ── Shared variable boxes ───────────────────────────────────────
    /// Pop a value, push a new box holding it.
    NewRef,
    /// Pop a box, push its content.
    RefGet,
    /// Pop a value and a box, store the value into the box.
    RefSet,

    // ── Arithmetic and comparison ───────────────────────────────────
    Add,
    Sub,
    Mul,
    /// Throws on a zero divisor.
    Div,
    Rem,
    Neg,
    Not,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // ── Strings ─────────────────────────────────────────────────────
    Concat,
    /// Pop any value, push its string form.
    ToStr,
    StrLen,

    // ── Control flow ────────────────────────────────────────────────
    Jump(u32),
    /// Pop a `Bool`; jump when it is false.
    JumpIfFalse(u32),
    Pop,
    Dup,

    // ── Calls ───────────────────────────────────────────────────────
    /// Pop `argc` arguments, call a static method, push its result.
    InvokeStatic {
        class: String,
        method: String,
        argc: u16,
    },
    /// Pop `captures` values, push a closure object of `class`.
    MakeClosure { class: String, captures: u16 },
    /// Pop `argc` arguments and then a closure, call its `invoke` method.
    InvokeClosure { argc: u16 },

    // ── Effects ─────────────────────────────────────────────────────
    /// Pop a value and print its string form on its own line.
    Print,
    /// Pop a message and throw an exception carrying it.
    Throw,
    /// Pop the result and leave the method.
    Return,
}

impl Instruction {
    /// Target of a jump instruction.
    pub fn jump_target(&self) -> Option<u32> {
        match self {
            Instruction::Jump(target) | Instruction::JumpIfFalse(target) => Some(*target),
            _ => None,
        }
    }
}
