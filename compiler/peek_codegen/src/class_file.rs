//! Binary class format.
//!
//! A class is a named set of methods. Top-level functions of a program are
//! static methods of one class; every closure (non-inlined lambda or local
//! function) is a class of its own with a single `invoke` method and a
//! captured-variable table. Classes travel between the compiler and the
//! debuggee as bincode-encoded [`ClassFile`]s wrapped in [`NamedBinary`].

use std::fmt;

use bitflags::bitflags;
use peek_ir::Type;
use serde::{Deserialize, Serialize};

use crate::Instruction;

/// Bumped whenever the encoded layout changes.
pub const CLASS_FORMAT_VERSION: u16 = 1;

/// Method name of every closure class.
pub const INVOKE_METHOD: &str = "invoke";

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ClassFlags: u16 {
        const FINAL = 1 << 0;
        /// Produced by the compiler rather than declared in source.
        const SYNTHETIC = 1 << 1;
        /// Instances carry captured state and are invoked through `invoke`.
        const CLOSURE = 1 << 2;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MethodFlags: u16 {
        const STATIC = 1 << 0;
        const SYNTHETIC = 1 << 1;
    }
}

/// Runtime representation of a value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryType {
    Int,
    Bool,
    Str,
    /// A closure object.
    Function,
    /// A shared box holding a captured mutable variable.
    Ref,
    Void,
}

impl BinaryType {
    pub fn of(ty: &Type) -> BinaryType {
        match ty {
            Type::Int => BinaryType::Int,
            Type::Bool => BinaryType::Bool,
            Type::Str => BinaryType::Str,
            Type::Function(_) => BinaryType::Function,
            Type::Unit | Type::Nothing | Type::Error => BinaryType::Void,
        }
    }
}

impl fmt::Display for BinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryType::Int => "I",
            BinaryType::Bool => "Z",
            BinaryType::Str => "S",
            BinaryType::Function => "F",
            BinaryType::Ref => "R",
            BinaryType::Void => "V",
        };
        f.write_str(name)
    }
}

/// Entry of a method's local variable table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVariable {
    pub name: String,
    pub ty: BinaryType,
    pub slot: u16,
    /// First instruction at which the variable holds its value.
    pub start: u32,
    /// One past the last instruction of its scope.
    pub end: u32,
}

impl LocalVariable {
    pub fn is_live_at(&self, pc: u32) -> bool {
        self.start <= pc && pc < self.end
    }
}

/// Entry of a closure's captured-variable table; its index is the operand
/// of [`Instruction::LoadCapture`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedVariable {
    pub name: String,
    pub ty: BinaryType,
}

/// Start of the code for a source line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry {
    pub pc: u32,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub flags: MethodFlags,
    /// Declared parameters; a closure's own object is not included.
    pub params: Vec<BinaryType>,
    pub ret: BinaryType,
    pub max_locals: u16,
    pub code: Vec<Instruction>,
    pub locals: Vec<LocalVariable>,
    pub lines: Vec<LineEntry>,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Variables live at `pc`, innermost (latest declared) last.
    pub fn live_locals(&self, pc: u32) -> impl Iterator<Item = &LocalVariable> {
        self.locals.iter().filter(move |local| local.is_live_at(pc))
    }

    /// Source line whose code starts exactly at `pc`.
    pub fn line_starting_at(&self, pc: u32) -> Option<u32> {
        self.lines
            .iter()
            .find(|entry| entry.pc == pc)
            .map(|entry| entry.line)
    }

    /// Source line of the code containing `pc`.
    pub fn line_at(&self, pc: u32) -> Option<u32> {
        self.lines
            .iter()
            .take_while(|entry| entry.pc <= pc)
            .last()
            .map(|entry| entry.line)
    }

    /// Signature in descriptor form, e.g. `(IS)Z`.
    pub fn descriptor(&self) -> String {
        let params: String = self.params.iter().map(ToString::to_string).collect();
        format!("({params}){}", self.ret)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFile {
    pub version: u16,
    pub name: String,
    pub flags: ClassFlags,
    pub methods: Vec<MethodInfo>,
    /// Non-empty for closure classes only.
    pub captures: Vec<CapturedVariable>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassFormatError {
    #[error("failed to encode class `{class}`: {message}")]
    Encode { class: String, message: String },
    #[error("malformed class file: {message}")]
    Decode { message: String },
    #[error("unsupported class format version {found} (expected {CLASS_FORMAT_VERSION})")]
    UnsupportedVersion { found: u16 },
}

impl ClassFile {
    pub fn new(name: impl Into<String>, flags: ClassFlags) -> Self {
        ClassFile {
            version: CLASS_FORMAT_VERSION,
            name: name.into(),
            flags,
            methods: Vec::new(),
            captures: Vec::new(),
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn is_closure(&self) -> bool {
        self.flags.contains(ClassFlags::CLOSURE)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassFormatError> {
        bincode::serialize(self).map_err(|e| ClassFormatError::Encode {
            class: self.name.clone(),
            message: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
        let class: ClassFile = bincode::deserialize(bytes).map_err(|e| ClassFormatError::Decode {
            message: e.to_string(),
        })?;
        if class.version != CLASS_FORMAT_VERSION {
            return Err(ClassFormatError::UnsupportedVersion {
                found: class.version,
            });
        }
        Ok(class)
    }
}

/// One compiled class, ready to be loaded into a debuggee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedBinary {
    pub class_name: String,
    pub bytes: Vec<u8>,
    /// The class holding the entry method of a compilation.
    pub is_main: bool,
}

impl NamedBinary {
    pub fn encode(class: &ClassFile, is_main: bool) -> Result<NamedBinary, ClassFormatError> {
        Ok(NamedBinary {
            class_name: class.name.clone(),
            bytes: class.to_bytes()?,
            is_main,
        })
    }

    pub fn decode(&self) -> Result<ClassFile, ClassFormatError> {
        ClassFile::from_bytes(&self.bytes)
    }
}
