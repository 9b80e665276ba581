//! Reading argument values out of the suspended frame.

use peek_capture::{Parameter, ParameterInfo, ParameterKind};
use peek_codegen::{local_function_slot_name, BinaryType};
use peek_target::{DebugTarget, FrameVariable, TargetError, TargetValue};

use crate::EvaluateError;

/// Looks variables up by name and binary type: locals of the top frame
/// first (innermost declaration wins), then the captured state of the
/// closure it runs. Shared boxes are opened when the expected type is not
/// the box itself.
pub struct VariableFinder<'a> {
    target: &'a dyn DebugTarget,
}

impl<'a> VariableFinder<'a> {
    pub fn new(target: &'a dyn DebugTarget) -> Self {
        VariableFinder { target }
    }

    pub fn find(&self, name: &str, ty: BinaryType) -> Result<Option<TargetValue>, TargetError> {
        for variable in self.target.frame_variables()?.iter().rev() {
            if variable.name == name {
                if let Some(value) = self.coerce(variable, ty)? {
                    return Ok(Some(value));
                }
            }
        }
        for variable in &self.target.captured_variables()? {
            if variable.name == name {
                if let Some(value) = self.coerce(variable, ty)? {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    fn coerce(
        &self,
        variable: &FrameVariable,
        expected: BinaryType,
    ) -> Result<Option<TargetValue>, TargetError> {
        if variable.ty == expected {
            return Ok(Some(variable.value));
        }
        if variable.ty == BinaryType::Ref {
            if let TargetValue::Object(cell) = variable.value {
                let content = self.target.box_get(cell)?;
                if self.has_type(content, expected)? {
                    return Ok(Some(content));
                }
            }
        }
        Ok(None)
    }

    fn has_type(&self, value: TargetValue, expected: BinaryType) -> Result<bool, TargetError> {
        Ok(match value {
            TargetValue::Int(_) => expected == BinaryType::Int,
            TargetValue::Bool(_) => expected == BinaryType::Bool,
            TargetValue::Unit => expected == BinaryType::Void,
            TargetValue::Object(id) => self.target.object_kind(id)?.binary_type() == expected,
        })
    }

    /// Arguments of the generated method, in parameter order.
    pub fn arguments(&self, info: &ParameterInfo) -> Result<Vec<TargetValue>, EvaluateError> {
        info.parameters
            .iter()
            .map(|parameter| {
                let name = frame_name(parameter);
                match self.find(&name, BinaryType::of(&parameter.ty))? {
                    Some(value) => Ok(value),
                    None if info.is_crossing(parameter.index) => Err(EvaluateError::NotCaptured {
                        name: parameter.raw.clone(),
                    }),
                    None => Err(EvaluateError::VariableNotFound {
                        name,
                        ty: parameter.ty.to_string(),
                    }),
                }
            })
            .collect()
    }
}

/// Name of the frame variable holding `parameter`.
fn frame_name(parameter: &Parameter) -> String {
    match parameter.kind {
        ParameterKind::LocalFunction { .. } => local_function_slot_name(&parameter.raw),
        ParameterKind::Ordinary { .. } | ParameterKind::ExtensionReceiver { .. } => {
            parameter.raw.clone()
        }
    }
}
