//! Name binding, evaluated types and mangling.
#[path = "../common/mod.rs"]
mod common;

use std::rc::Rc;

use common::*;
use seam::diagnostics::CompileError;
use seam::parser::ast::*;
use seam::span::Spanned;
use seam::typeck;

fn resolve(items: Vec<Spanned<Item>>) -> Result<Program, CompileError> {
    let mut program = program(items);
    typeck::run_passes(&mut program)?;
    Ok(program)
}

fn resolve_err(items: Vec<Spanned<Item>>) -> String {
    match resolve(items) {
        Ok(_) => panic!("resolution should have failed"),
        Err(e) => e.to_string(),
    }
}

fn function(program: &Program, index: usize) -> &Function {
    match &program.items[index].node {
        Item::Function(f) => f,
        Item::Type(_) => panic!("item {index} is a type"),
    }
}

fn first_stmt(program: &Program, index: usize) -> &Stmt {
    &function(program, index).body.as_ref().unwrap().node.stmts[0].node
}

#[test]
fn mangles_every_non_extern_signature() {
    let program = resolve(vec![
        func("add", vec![param("a", I32), param("b", I32)], I32, vec![ret(Some(binop(
            BinOp::Add,
            ident("a"),
            ident("b"),
        )))]),
        constructor("init", vec![]),
        extern_fn("puts", vec![param("s", Str)], I32),
    ])
    .unwrap();
    assert_eq!(function(&program, 0).signature.module_name(), Some("add__i32_i32__i32"));
    assert_eq!(function(&program, 1).signature.module_name(), Some("init__void__void"));
    let puts = &function(&program, 2).signature;
    assert!(puts.mangled_name.get().is_none());
    assert_eq!(puts.module_name(), Some("puts"));
}

#[test]
fn binds_parameters_by_identity() {
    let program = resolve(vec![func("id", vec![param("x", U64)], U64, vec![ret(Some(ident("x")))])]).unwrap();
    let func = function(&program, 0);
    let Stmt::Return(Some(value)) = first_stmt(&program, 0) else { panic!("expected return") };
    let ExprKind::Ident { symbol: Some(Symbol::Variable(decl)), .. } = &value.node.kind else {
        panic!("identifier was not bound to a variable")
    };
    assert!(Rc::ptr_eq(decl, &func.signature.params[0]));
    assert_eq!(value.node.ty, Some(Type::Builtin(U64)));
}

#[test]
fn call_binds_shared_signature() {
    let program = resolve(vec![
        func("one", vec![], I32, vec![ret(Some(int(1)))]),
        func("main", vec![], I32, vec![ret(Some(call("one", vec![])))]),
    ])
    .unwrap();
    let Stmt::Return(Some(value)) = first_stmt(&program, 1) else { panic!("expected return") };
    let ExprKind::Call { callee, .. } = &value.node.kind else { panic!("expected call") };
    let ExprKind::Ident { symbol: Some(Symbol::Function(sig)), .. } = &callee.node.kind else {
        panic!("callee was not bound to a function")
    };
    assert!(Rc::ptr_eq(sig, &function(&program, 0).signature));
    assert_eq!(callee.node.ty, Some(Type::Builtin(I32)));
}

#[test]
fn literals_adopt_the_expected_type() {
    let program = resolve(vec![func(
        "f",
        vec![],
        Void,
        vec![let_("small", U8, Some(int(200))), let_("ratio", F32, Some(float(0.5)))],
    )])
    .unwrap();
    let Stmt::Let { value: Some(value), .. } = first_stmt(&program, 0) else { panic!("expected let") };
    assert_eq!(value.node.ty, Some(Type::Builtin(U8)));
}

#[test]
fn literal_out_of_range_is_rejected() {
    let msg = resolve_err(vec![func("f", vec![], Void, vec![let_("x", I8, Some(int(300)))])]);
    assert!(msg.contains("does not fit in i8"), "{msg}");
}

#[test]
fn literal_beside_variable_takes_its_type() {
    let program = resolve(vec![func(
        "f",
        vec![param("x", I64)],
        Bool,
        vec![ret(Some(binop(BinOp::Lt, int(3), ident("x"))))],
    )])
    .unwrap();
    let Stmt::Return(Some(value)) = first_stmt(&program, 0) else { panic!("expected return") };
    let ExprKind::BinOp { lhs, .. } = &value.node.kind else { panic!("expected binop") };
    assert_eq!(lhs.node.ty, Some(Type::Builtin(I64)));
    assert_eq!(value.node.ty, Some(Type::BOOL));
}

#[test]
fn unknown_identifier() {
    let msg = resolve_err(vec![func("f", vec![], I32, vec![ret(Some(ident("nope")))])]);
    assert!(msg.contains("unknown identifier 'nope'"), "{msg}");
}

#[test]
fn unknown_function() {
    let msg = resolve_err(vec![func("f", vec![], Void, vec![expr_stmt(call("missing", vec![]))])]);
    assert!(msg.contains("unknown function 'missing'"), "{msg}");
}

#[test]
fn wrong_argument_count() {
    let msg = resolve_err(vec![
        func("g", vec![param("a", I32)], Void, vec![]),
        func("f", vec![], Void, vec![expr_stmt(call("g", vec![]))]),
    ]);
    assert!(msg.contains("expects 1 argument(s), found 0"), "{msg}");
}

#[test]
fn argument_type_mismatch() {
    let msg = resolve_err(vec![
        func("g", vec![param("a", I32)], Void, vec![]),
        func("f", vec![], Void, vec![expr_stmt(call("g", vec![boolean(true)]))]),
    ]);
    assert!(msg.contains("expected i32, found bool"), "{msg}");
}

#[test]
fn mismatched_operands() {
    let msg = resolve_err(vec![func(
        "f",
        vec![param("a", I32), param("b", I64)],
        I32,
        vec![ret(Some(binop(BinOp::Add, ident("a"), ident("b"))))],
    )]);
    assert!(msg.contains("mismatched operand types"), "{msg}");
}

#[test]
fn arithmetic_on_bool_is_rejected() {
    let msg = resolve_err(vec![func(
        "f",
        vec![],
        Bool,
        vec![ret(Some(binop(BinOp::Add, boolean(true), boolean(false))))],
    )]);
    assert!(msg.contains("operator '+' is not defined for bool"), "{msg}");
}

#[test]
fn condition_must_be_bool() {
    let msg = resolve_err(vec![func("f", vec![], Void, vec![while_(int(1), vec![])])]);
    assert!(msg.contains("expected bool"), "{msg}");
}

#[test]
fn missing_return_value_path() {
    let msg = resolve_err(vec![func(
        "f",
        vec![param("c", Bool)],
        I32,
        vec![if_(ident("c"), vec![ret(Some(int(1)))], None)],
    )]);
    assert!(msg.contains("may exit without returning a value"), "{msg}");
}

#[test]
fn if_else_returning_on_both_paths_is_complete() {
    assert!(resolve(vec![func(
        "f",
        vec![param("c", Bool)],
        I32,
        vec![if_(ident("c"), vec![ret(Some(int(1)))], Some(vec![ret(Some(int(2)))]))],
    )])
    .is_ok());
}

#[test]
fn return_value_from_void_function() {
    let msg = resolve_err(vec![func("f", vec![], Void, vec![ret(Some(int(1)))])]);
    assert!(msg.contains("cannot return a value from a void function"), "{msg}");
}

#[test]
fn assignment_to_function_is_rejected() {
    let msg = resolve_err(vec![
        func("g", vec![], Void, vec![]),
        func("f", vec![], Void, vec![assign("g", int(1))]),
    ]);
    assert!(msg.contains("function 'g' can only be called"), "{msg}");
}

#[test]
fn assignment_type_must_match() {
    let msg = resolve_err(vec![func(
        "f",
        vec![param("x", I32)],
        Void,
        vec![assign("x", boolean(true))],
    )]);
    assert!(msg.contains("expected i32, found bool"), "{msg}");
}

#[test]
fn locals_are_scoped_to_their_block() {
    let msg = resolve_err(vec![func(
        "f",
        vec![],
        I32,
        vec![sp(Stmt::Block(block(vec![let_("x", I32, Some(int(1)))]))), ret(Some(ident("x")))],
    )]);
    assert!(msg.contains("unknown identifier 'x'"), "{msg}");
}

#[test]
fn redeclaration_in_same_scope() {
    let msg = resolve_err(vec![func(
        "f",
        vec![],
        Void,
        vec![let_("x", I32, None), let_("x", I32, None)],
    )]);
    assert!(msg.contains("already declared in this scope"), "{msg}");
}

#[test]
fn shadowing_in_nested_block_is_allowed() {
    assert!(resolve(vec![func(
        "f",
        vec![param("x", I32)],
        Void,
        vec![sp(Stmt::Block(block(vec![let_("x", F64, Some(float(1.0)))])))],
    )])
    .is_ok());
}

#[test]
fn void_variable_is_rejected() {
    let msg = resolve_err(vec![func("f", vec![], Void, vec![let_("x", Void, None)])]);
    assert!(msg.contains("cannot have type void"), "{msg}");
}

#[test]
fn void_parameter_is_rejected() {
    let msg = resolve_err(vec![func("f", vec![param("x", Void)], Void, vec![])]);
    assert!(msg.contains("parameter 'x' cannot have type void"), "{msg}");
}

#[test]
fn constructor_with_parameters_is_rejected() {
    let sig = signature("init", vec![param("x", I32)], Void).with_attribute(CONSTRUCTOR_ATTRIBUTE);
    let msg = resolve_err(vec![item(sig, Some(vec![]))]);
    assert!(msg.contains("must not take parameters"), "{msg}");
}

#[test]
fn extern_with_body_is_rejected() {
    let msg = resolve_err(vec![item(signature("puts", vec![], Void).external(), Some(vec![]))]);
    assert!(msg.contains("cannot have a body"), "{msg}");
}

#[test]
fn declared_class_type_resolves_but_unknown_type_does_not() {
    let known = VarDecl::new(sp("p".to_string()), named("Point"));
    assert!(resolve(vec![type_decl("Point"), item(signature("f", vec![known], Void), Some(vec![]))]).is_ok());

    let unknown = VarDecl::new(sp("p".to_string()), named("Shape"));
    let msg = resolve_err(vec![item(signature("f", vec![unknown], Void), Some(vec![]))]);
    assert!(msg.contains("unknown type 'Shape'"), "{msg}");
}

#[test]
fn mixed_literal_comparison_is_order_independent() {
    for (lhs, op, rhs) in [(float(2.5), BinOp::Gt, int(1)), (int(1), BinOp::Lt, float(2.5))] {
        let program = resolve(vec![func("f", vec![], Bool, vec![ret(Some(binop(op, lhs, rhs)))])]).unwrap();
        let Stmt::Return(Some(value)) = first_stmt(&program, 0) else { panic!("expected return") };
        let ExprKind::BinOp { lhs, rhs, .. } = &value.node.kind else { panic!("expected binop") };
        assert_eq!(lhs.node.ty, Some(Type::Builtin(F64)));
        assert_eq!(rhs.node.ty, Some(Type::Builtin(F64)));
        assert_eq!(value.node.ty, Some(Type::BOOL));
    }
}

#[test]
fn mixed_literal_arithmetic_follows_float_context() {
    let program = resolve(vec![func("f", vec![], F32, vec![ret(Some(binop(BinOp::Add, int(1), float(0.5))))])]).unwrap();
    let Stmt::Return(Some(value)) = first_stmt(&program, 0) else { panic!("expected return") };
    assert_eq!(value.node.ty, Some(Type::Builtin(F32)));
}
