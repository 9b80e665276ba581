use peek_diagnostic::ErrorCode;
use peek_ir::{ParsedType, Type};

use super::Walker;

impl Walker<'_> {
    /// Turn a written type into a semantic one.
    pub(crate) fn lower_type(&mut self, ty: &ParsedType) -> Type {
        match ty {
            ParsedType::Named { name, span } => match self.name(*name) {
                "Int" => Type::Int,
                "Bool" => Type::Bool,
                "Str" => Type::Str,
                "Unit" => Type::Unit,
                other => {
                    self.error(ErrorCode::E2002, *span, format!("unresolved type `{other}`"));
                    Type::Error
                }
            },
            ParsedType::Function {
                receiver,
                params,
                ret,
                ..
            } => {
                let receiver = receiver.as_deref().map(|r| self.lower_type(r));
                let params = params.iter().map(|p| self.lower_type(p)).collect();
                let ret = self.lower_type(ret);
                Type::function(receiver, params, ret)
            }
        }
    }
}
