//! Module assembly: declaration, entry synthesis, verification, emission.
#[path = "../common/mod.rs"]
mod common;

use std::path::Path;

use common::*;
use cranelift_codegen::cursor::{Cursor, FuncCursor};
use cranelift_codegen::ir::{self, types, InstBuilder, Opcode, UserFuncName};
use cranelift_codegen::isa::CallConv;
use cranelift_module::{Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};
use seam::codegen::types::TypeLowering;
use seam::codegen::{build_isa, verify, FunctionTable};
use seam::config::CodegenOptions;
use seam::diagnostics::CompileError;
use seam::parser::ast::BinOp;

#[test]
fn entry_calls_constructors_in_declaration_order() {
    let module = lower(vec![
        constructor("f1", vec![]),
        func("helper", vec![], Void, vec![]),
        constructor("f2", vec![]),
        constructor("f3", vec![]),
    ]);
    assert_eq!(module.entry_name(), "entry");
    let entry = module.entry().unwrap();
    assert_eq!(entry.linkage, Linkage::Local);
    assert!(entry.signature.params.is_empty());
    assert!(entry.signature.returns.is_empty());

    assert_eq!(module.callees("entry"), vec!["f1__void__void", "f2__void__void", "f3__void__void"]);
    let body = body(&module, "entry");
    assert_eq!(
        opcodes(body, entry_block(body)),
        vec![Opcode::Call, Opcode::Call, Opcode::Call, Opcode::Return]
    );
}

#[test]
fn entry_without_constructors_just_returns() {
    let module = lower(vec![func("main", vec![], Void, vec![])]);
    let body = body(&module, "entry");
    assert_eq!(all_opcodes(body), vec![Opcode::Return]);
    assert!(module.callees("entry").is_empty());
}

#[test]
fn constructor_may_call_externs() {
    let module = lower(vec![
        extern_fn("puts", vec![param("s", Str)], I32),
        extern_fn("setup", vec![], I32),
        constructor("init", vec![expr_stmt(call("setup", vec![]))]),
    ]);
    assert_eq!(module.callees("init__void__void"), vec!["setup"]);
    assert_eq!(module.callees("entry"), vec!["init__void__void"]);
}

#[test]
fn entry_symbol_is_configurable() {
    let options = CodegenOptions::from_toml_str("[codegen]\nentry_symbol = \"__seam_init\"\n", Path::new("seam.toml")).unwrap();
    let mut program = program(vec![constructor("boot", vec![])]);
    let module = seam::lower_program(&mut program, &options).unwrap();
    assert_eq!(module.entry_name(), "__seam_init");
    assert!(module.function("entry").is_none());
    assert_eq!(module.callees("__seam_init"), vec!["boot__void__void"]);
}

#[test]
fn entry_symbol_collision_is_an_error() {
    let err = lower_err(vec![extern_fn("entry", vec![], Void)]);
    assert!(matches!(err, CompileError::Codegen { .. }));
    assert!(err.to_string().contains("collides"), "{err}");
}

#[test]
fn every_local_function_is_defined_and_verifies() {
    let module = lower(vec![
        extern_fn("puts", vec![param("s", Str)], I32),
        func("a", vec![param("x", I32)], I32, vec![ret(Some(ident("x")))]),
        func("b", vec![], I32, vec![ret(Some(call("a", vec![int(5)])))]),
        constructor("c", vec![expr_stmt(call("b", vec![]))]),
    ]);
    let mut locals = 0;
    for (name, function) in module.functions() {
        match function.linkage {
            Linkage::Local => {
                locals += 1;
                let body = function.body.as_ref().unwrap();
                assert_well_terminated(body);
                verify(name, body, module.isa()).unwrap();
            }
            _ => assert!(!function.is_defined(), "{name} should be imported"),
        }
    }
    // a, b, c and entry
    assert_eq!(locals, 4);
}

#[test]
fn verifier_failure_is_reported_with_function_name() {
    let isa = build_isa(&CodegenOptions::default()).unwrap();
    let mut func = ir::Function::with_name_signature(UserFuncName::user(0, 0), ir::Signature::new(CallConv::SystemV));
    let block = func.dfg.make_block();
    func.layout.append_block(block);
    // A block with no terminator.
    FuncCursor::new(&mut func).at_bottom(block).ins().iconst(types::I32, 7);

    match verify("broken", &func, &*isa).unwrap_err() {
        CompileError::Verify { function, msg } => {
            assert_eq!(function, "broken");
            assert!(!msg.is_empty());
        }
        other => panic!("expected verify error, got {other:?}"),
    }
}

#[test]
fn get_or_declare_is_idempotent() {
    let isa = build_isa(&CodegenOptions::default()).unwrap();
    let types = TypeLowering::new(isa.pointer_type(), isa.default_call_conv());
    let builder = ObjectBuilder::new(isa, "idempotence", cranelift_module::default_libcall_names()).unwrap();
    let mut module = ObjectModule::new(builder);
    let mut table = FunctionTable::new(types);

    let puts = signature("puts", vec![param("s", Str)], I32).external();
    let first = table.get_or_declare(&mut module, &puts).unwrap();
    let second = table.get_or_declare(&mut module, &puts).unwrap();
    assert_eq!(first, second);
    assert_eq!(table.get("puts").unwrap().linkage, Linkage::Import);
    assert_eq!(module.declarations().get_functions().count(), 1);
}

#[test]
fn unmangled_signature_cannot_be_declared() {
    let isa = build_isa(&CodegenOptions::default()).unwrap();
    let types = TypeLowering::new(isa.pointer_type(), isa.default_call_conv());
    let builder = ObjectBuilder::new(isa, "unmangled", cranelift_module::default_libcall_names()).unwrap();
    let mut module = ObjectModule::new(builder);
    let mut table = FunctionTable::new(types);

    let err = table.get_or_declare(&mut module, &signature("f", vec![], Void)).unwrap_err();
    assert!(err.is_internal());
}

#[test]
fn emits_object_bytes() {
    let mut program = program(vec![
        extern_fn("puts", vec![param("s", Str)], I32),
        func("add", vec![param("a", I32), param("b", I32)], I32, vec![ret(Some(binop(BinOp::Add, ident("a"), ident("b"))))]),
        constructor("init", vec![]),
    ]);
    let bytes = seam::compile_to_object(&mut program, &CodegenOptions::default()).unwrap();
    assert!(bytes.len() > 16);
}

#[test]
fn optimised_build_still_lowers() {
    let options = CodegenOptions::from_toml_str(
        "[codegen]\nopt_level = \"speed\"\nis_pic = false\nmodule_name = \"fast\"\n",
        Path::new("seam.toml"),
    )
    .unwrap();
    let mut program = program(vec![func("one", vec![], I32, vec![ret(Some(int(1)))])]);
    let module = seam::lower_program(&mut program, &options).unwrap();
    assert!(module.emit().unwrap().len() > 16);
}

#[test]
fn resolution_errors_stop_before_codegen() {
    let err = lower_err(vec![func("f", vec![], I32, vec![])]);
    assert!(matches!(err, CompileError::Resolve { .. }), "{err:?}");
}

#[test]
fn extern_named_like_a_mangled_function_collides() {
    let err = lower_err(vec![
        extern_fn("f__void__void", vec![], Void),
        func("f", vec![], Void, vec![]),
    ]);
    assert!(matches!(err, CompileError::Declaration { .. }), "{err:?}");
    assert!(err.to_string().contains("collides with module symbol 'f__void__void'"), "{err}");
}

#[test]
fn local_then_extern_with_same_symbol_collides() {
    let isa = build_isa(&CodegenOptions::default()).unwrap();
    let types = TypeLowering::new(isa.pointer_type(), isa.default_call_conv());
    let builder = ObjectBuilder::new(isa, "clash", cranelift_module::default_libcall_names()).unwrap();
    let mut module = ObjectModule::new(builder);
    let mut table = FunctionTable::new(types);

    let local = signature("g", vec![], Void);
    local.mangled_name.set("g__void__void".to_string()).unwrap();
    table.get_or_declare(&mut module, &local).unwrap();

    let import = signature("g__void__void", vec![], Void).external();
    let err = table.get_or_declare(&mut module, &import).unwrap_err();
    assert!(matches!(err, CompileError::Declaration { .. }), "{err:?}");
    assert_eq!(table.get("g__void__void").unwrap().linkage, Linkage::Local);
}
