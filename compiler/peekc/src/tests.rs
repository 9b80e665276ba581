use peek_eval::{DebugSession, EvaluatorConfig};
use peek_vm::{Output, Vm, VmConfig};
use pretty_assertions::assert_eq;

use crate::commands::{evaluate, parse_debug_options, DebugOptions};

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

#[test]
fn test_parse_debug_options() {
    let options = parse_debug_options(&args(&[
        "main.pk", "--break", "3", "-b", "7", "--eval", "x + 1", "--interpret",
    ]))
    .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        options,
        DebugOptions {
            file: "main.pk".to_owned(),
            breakpoints: vec![3, 7],
            evals: vec!["x + 1".to_owned()],
            interpret: true,
        }
    );
}

#[test]
fn test_parse_debug_options_errors() {
    assert_eq!(
        parse_debug_options(&args(&["--break", "3"])),
        Err("missing file path".to_owned())
    );
    assert_eq!(
        parse_debug_options(&args(&["main.pk", "--break", "three"])),
        Err("invalid line number `three`".to_owned())
    );
    assert_eq!(
        parse_debug_options(&args(&["main.pk", "--eval"])),
        Err("--eval needs an expression".to_owned())
    );
    assert_eq!(
        parse_debug_options(&args(&["main.pk", "--verbose"])),
        Err("unknown option `--verbose`".to_owned())
    );
    assert_eq!(
        parse_debug_options(&args(&["main.pk", "other.pk"])),
        Err("unexpected argument `other.pk`".to_owned())
    );
}

#[test]
fn test_evaluate_renders_values_and_errors() {
    let source = "fun main() {\n    val x = 4\n    println(x)\n}\n";
    let vm = Vm::new(VmConfig::default()).with_output(Output::buffer());
    let mut session = DebugSession::new(source, "main.pk", vm, EvaluatorConfig::default())
        .unwrap_or_else(|e| panic!("{e}"));
    session.set_breakpoint(3);
    session.run().unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(evaluate(&mut session, "x * 3"), "12");
    assert_eq!(evaluate(&mut session, "\"x=\" + x"), "x=4");
    assert!(evaluate(&mut session, "1 +").starts_with("error: "));
}
