use peek_codegen::BinaryType;
use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_structural_errors() {
    let structural = [
        TargetError::ClassLoadingRefused,
        TargetError::ClassNotLoaded {
            class: "Gen".to_owned(),
        },
        TargetError::MethodNotFound {
            class: "Program".to_owned(),
            method: "twice".to_owned(),
        },
        TargetError::InvocationRefused,
    ];
    for error in &structural {
        assert!(error.is_structural(), "{error} should be structural");
    }
    assert!(!TargetError::ClassLoadingRefused.is_linkage());
    assert!(!TargetError::InvocationRefused.is_linkage());
}

#[test]
fn test_process_errors_are_not_structural() {
    let process = [
        TargetError::NotSuspended,
        TargetError::Disconnected,
        TargetError::ObjectCollected {
            id: ObjectId::new(3),
        },
        TargetError::BreakpointDuringInvocation { line: 4 },
    ];
    for error in &process {
        assert!(!error.is_structural(), "{error} should not be structural");
        assert!(!error.is_linkage());
    }
}

#[test]
fn test_error_messages() {
    let error = TargetError::MethodNotFound {
        class: "Program".to_owned(),
        method: "twice".to_owned(),
    };
    assert_eq!(error.to_string(), "method `Program.twice` not found");
    let error = TargetError::ObjectCollected {
        id: ObjectId::new(7),
    };
    assert_eq!(error.to_string(), "object @7 has been collected");
}

#[test]
fn test_object_binary_types() {
    assert_eq!(ObjectKind::Str.binary_type(), BinaryType::Str);
    assert_eq!(
        ObjectKind::Closure {
            class: "Program$main$lambda$1".to_owned()
        }
        .binary_type(),
        BinaryType::Function
    );
    assert_eq!(ObjectKind::Ref.binary_type(), BinaryType::Ref);
}

#[test]
fn test_as_object() {
    let id = ObjectId::new(1);
    assert_eq!(TargetValue::Object(id).as_object(), Some(id));
    assert_eq!(TargetValue::Int(1).as_object(), None);
    assert_eq!(id.index(), 1);
}
