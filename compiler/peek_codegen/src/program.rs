//! Compilation of whole programs.

use peek_resolve::{receiver_slot_name, Program};
use tracing::debug;

use crate::lower::{FrameBuilder, Lowerer};
use crate::module::method_name;
use crate::{
    BinaryType, ClassFile, ClassFlags, CodegenError, MethodFlags, NamedBinary, NoIntercept,
    ProgramModule, PROGRAM_CLASS_NAME,
};

/// Compile every non-inline top-level function of `program` into static
/// methods of the program class.
///
/// Inline functions have no method of their own; every call site expands
/// them. The program class is flagged main and comes first, followed by
/// the closure classes in creation order.
#[tracing::instrument(level = "debug", skip_all)]
pub fn compile_program(program: &Program) -> Result<Vec<NamedBinary>, CodegenError> {
    if program.has_errors() {
        let count = program
            .diagnostics()
            .iter()
            .filter(|d| d.is_error())
            .count();
        return Err(CodegenError::ProgramHasErrors { count });
    }

    let module = ProgramModule::new(program);
    let interner = program.interner();
    let mut lowerer = Lowerer::new(
        program.arena(),
        program.decls(),
        program.bindings(),
        interner,
        &module,
        &NoIntercept,
        Some(program.line_index()),
    );

    let mut class = ClassFile::new(PROGRAM_CLASS_NAME, ClassFlags::FINAL);
    for &decl in program.function_decls() {
        let declaration = program.decls().get(decl);
        if declaration.is_inline_function() {
            continue;
        }
        let Some(function) = program.function(decl) else {
            continue;
        };
        let Some(signature) = declaration.ty.as_function() else {
            continue;
        };

        let name = method_name(program, decl);
        let mut frame = FrameBuilder::method(PROGRAM_CLASS_NAME, &name, false);
        if let Some(receiver) = &signature.receiver {
            let label = interner.lookup(declaration.name);
            frame.receiver_param(decl, &receiver_slot_name(label), receiver)?;
        }
        for &param in program.bindings().params(decl) {
            let param_decl = program.decls().get(param);
            frame.param(Some(param), interner.lookup(param_decl.name), &param_decl.ty)?;
        }
        lowerer.function_body(&mut frame, function)?;
        let code = frame.finish_body(&signature.ret);
        debug!(method = %name, instructions = code.code.len(), "compiled function");

        class.methods.push(code.into_method(
            &name,
            MethodFlags::STATIC,
            signature.invocation_params().map(BinaryType::of).collect(),
            BinaryType::of(&signature.ret),
        ));
    }

    let mut binaries = vec![NamedBinary::encode(&class, true)?];
    for closure in lowerer.finish() {
        binaries.push(NamedBinary::encode(&closure, false)?);
    }
    Ok(binaries)
}
