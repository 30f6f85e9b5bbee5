//! End-to-end compilation tests
//!
//! Source text goes in; LLVM IR, VM output or signature listings come out.

use llforthc::{
    CompileError, CompilerConfig, ExternDecl, check_source, compile_file, compile_to_ir,
    run_source,
};
use std::fs;

fn ir(source: &str) -> String {
    compile_to_ir(source, &CompilerConfig::default()).unwrap()
}

#[test]
fn test_square_ir() {
    let ir = ir(": square dup * ;");
    assert!(ir.contains("define i32 @square(i32 %arg0) {"));
    assert!(ir.contains("%t0 = mul i32 %arg0, %arg0"));
    assert!(ir.contains("ret i32 %t0"));
    // Shared operand: exactly one multiply
    assert_eq!(ir.matches(" mul ").count(), 1);
}

#[test]
fn test_subtraction_operand_order() {
    let ir = ir(": sub - ;");
    // arg0 was on top of the stack, so it is the right-hand operand
    assert!(ir.contains("sub i32 %arg1, %arg0"));
}

#[test]
fn test_multi_output_call_ir() {
    let ir = ir(": pair 1 2.5 ; : use pair f>i + ;");
    assert!(ir.contains("define { i32, float } @pair() {"));
    assert!(ir.contains("call { i32, float } @pair()"));
    assert!(ir.contains("extractvalue { i32, float }"));
    assert!(ir.contains("fptosi float"));
}

#[test]
fn test_extern_ir() {
    let ir = ir("extern puts ( s -- ) : hello \" hello, world\" puts ;");
    assert!(ir.contains("@.str.0 = private unnamed_addr constant [13 x i8] c\"hello, world\\00\""));
    assert!(ir.contains("call void @puts(ptr @.str.0)"));
    assert!(ir.contains("declare void @puts(ptr)"));
}

#[test]
fn test_int_to_string_uses_runtime_helper() {
    let ir = ir(": show i>s ;");
    assert!(ir.contains("call ptr @llforth_int_to_string(i32 %arg0)"));
    assert!(ir.contains("declare ptr @llforth_int_to_string(i32)"));
}

#[test]
fn test_redefinition_ir_keeps_both_bodies() {
    let ir = ir(": f 1 ; : g f ; : f 2 ;");
    assert!(ir.contains("define i32 @f() {"));
    assert!(ir.contains("define i32 @f.1() {"));
    assert!(ir.contains("call i32 @f()"));
}

#[test]
fn test_polymorphic_word_cannot_be_lowered() {
    let err = compile_to_ir(": g dup ;", &CompilerConfig::default()).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedOperation { .. }));
}

#[test]
fn test_llvm_has_no_immediate_execution() {
    let err = compile_to_ir(": one 1 ; one", &CompilerConfig::default()).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedOperation { .. }));
}

#[test]
fn test_config_target_and_externs() {
    let config = CompilerConfig::new()
        .with_module_name("demo")
        .with_target_triple("wasm32-unknown-unknown")
        .with_extern(
            ExternDecl::new("add", "i i", "i")
                .with_symbol("runtime_add")
                .unwrap(),
        );
    let ir = compile_to_ir(": add3 add add ;", &config).unwrap();
    assert!(ir.contains("; ModuleID = 'demo'"));
    assert!(ir.contains("target triple = \"wasm32-unknown-unknown\""));
    assert!(ir.contains("declare i32 @runtime_add(i32, i32)"));
    assert!(ir.contains("define i32 @add3(i32 %arg0, i32 %arg1, i32 %arg2)"));
}

#[test]
fn test_run_source_on_vm() {
    let output = run_source(
        r#"
        \ squares and a greeting
        : square dup * ;
        : greet " hi" print ;
        extern print ( s -- )
        extern print-int ( i -- )
        : greet " hi " print ;
        greet 12 square print-int
        "#,
        &CompilerConfig::default(),
    );
    // `greet` was first defined before `print` existed
    assert_eq!(
        output.unwrap_err(),
        CompileError::UnknownToken {
            name: "print".to_string()
        }
    );

    let output = run_source(
        "extern print ( s -- ) extern print-int ( i -- ) \
         : square dup * ; : greet \" hi \" print ; greet 12 square print-int",
        &CompilerConfig::default(),
    )
    .unwrap();
    assert_eq!(output, "hi 144\n");
}

#[test]
fn test_check_source_lists_signatures() {
    let words = check_source(
        "extern strlen ( s -- i ) : len+ strlen + ; : swap2 rot rot ;",
        &CompilerConfig::default(),
    )
    .unwrap();
    let listing: Vec<_> = words
        .iter()
        .map(|(name, sig)| format!("{} {}", name, sig))
        .collect();
    assert_eq!(
        listing,
        vec![
            "strlen ( s -- i )",
            "len+ ( s i -- i )",
            "swap2 ( ? ? ? -- ? ? ? )",
        ]
    );
}

#[test]
fn test_compile_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("square.fs");
    let output = dir.path().join("square.ll");
    fs::write(&source, "( n -- n*n ) : square dup * ;\n").unwrap();

    compile_file(&source, &output, &CompilerConfig::default()).unwrap();

    let ir = fs::read_to_string(&output).unwrap();
    assert!(ir.contains("define i32 @square(i32 %arg0)"));
}

#[test]
fn test_compile_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = compile_file(
        &dir.path().join("missing.fs"),
        &dir.path().join("out.ll"),
        &CompilerConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Io { .. }));
}

#[test]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("llforth.toml");
    fs::write(
        &path,
        r#"
        module_name = "from-file"

        [[externs]]
        name = "strlen"
        inputs = "s"
        outputs = "i"
        "#,
    )
    .unwrap();

    let config = CompilerConfig::load(&path).unwrap();
    assert_eq!(config.module_name, "from-file");
    let output = run_source("\" abc\" strlen .", &config).unwrap();
    assert_eq!(output, "3 ");
}
