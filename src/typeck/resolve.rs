use std::rc::Rc;

use crate::diagnostics::CompileError;
use crate::parser::ast::*;
use crate::span::{Span, Spanned};

use super::env::{mangle_signature, TypeEnv};

/// Second pass: bind identifiers, attach evaluated types and mangle names.
pub fn resolve_program(program: &mut Program, env: &mut TypeEnv) -> Result<(), CompileError> {
    for item in &program.items {
        if let Item::Function(func) = &item.node {
            check_signature(func, env)?;
        }
    }

    for item in &mut program.items {
        let Item::Function(func) = &mut item.node else { continue };
        let sig = Rc::clone(&func.signature);
        if let Some(body) = &mut func.body {
            let mut resolver = TypeResolver { env: &mut *env, return_type: sig.return_type.node.clone() };
            resolver.resolve_function(&sig, body)?;
        }
    }
    Ok(())
}

/// Validate a signature's types and shape, then mangle it.
fn check_signature(func: &Function, env: &TypeEnv) -> Result<(), CompileError> {
    let sig = &func.signature;
    let name = &sig.name.node;

    match (&func.body, sig.is_extern) {
        (Some(body), true) => {
            return Err(CompileError::resolve(
                format!("extern function '{name}' cannot have a body"),
                body.span,
            ));
        }
        (None, false) => {
            return Err(CompileError::resolve(format!("function '{name}' has no body"), sig.span));
        }
        _ => {}
    }

    for (i, param) in sig.params.iter().enumerate() {
        check_type(&param.ty, env)?;
        if param.ty.node.is_void() {
            return Err(CompileError::resolve(
                format!("parameter '{}' cannot have type void", param.name.node),
                param.ty.span,
            ));
        }
        if sig.params[..i].iter().any(|p| p.name.node == param.name.node) {
            return Err(CompileError::resolve(
                format!("parameter '{}' is declared twice", param.name.node),
                param.name.span,
            ));
        }
    }
    check_type(&sig.return_type, env)?;

    if sig.is_constructor() && !sig.params.is_empty() {
        return Err(CompileError::resolve(
            format!("constructor '{name}' must not take parameters"),
            sig.span,
        ));
    }

    if !sig.is_extern {
        let params: Vec<Type> = sig.params.iter().map(|p| p.ty.node.clone()).collect();
        let mangled = sig
            .mangled_name
            .get_or_init(|| mangle_signature(name, &params, &sig.return_type.node));
        tracing::trace!("mangled '{name}' as '{mangled}'");
    }
    Ok(())
}

fn check_type(ty: &Spanned<Type>, env: &TypeEnv) -> Result<(), CompileError> {
    match &ty.node {
        Type::Builtin(_) => Ok(()),
        Type::Named(name) if env.has_type(name) => Ok(()),
        Type::Named(name) => Err(CompileError::resolve(format!("unknown type '{name}'"), ty.span)),
    }
}

fn expect_type(actual: &Type, expected: &Type, span: Span) -> Result<(), CompileError> {
    if actual == expected {
        Ok(())
    } else {
        Err(CompileError::resolve(format!("expected {expected}, found {actual}"), span))
    }
}

/// Whether every path through `block` ends in a return.
fn block_always_returns(block: &Block) -> bool {
    block.stmts.iter().any(|stmt| match &stmt.node {
        Stmt::Return(_) => true,
        Stmt::If { then_block, else_block: Some(else_block), .. } => {
            block_always_returns(&then_block.node) && block_always_returns(&else_block.node)
        }
        Stmt::Block(inner) => block_always_returns(&inner.node),
        _ => false,
    })
}

struct TypeResolver<'a> {
    env: &'a mut TypeEnv,
    return_type: Type,
}

impl TypeResolver<'_> {
    fn resolve_function(
        &mut self,
        sig: &FunctionSignature,
        body: &mut Spanned<Block>,
    ) -> Result<(), CompileError> {
        self.env.push_scope();
        for param in &sig.params {
            self.env.define(Rc::clone(param));
        }
        let result = self.resolve_block(body);
        self.env.pop_scope();
        result?;

        if !self.return_type.is_void() && !block_always_returns(&body.node) {
            return Err(CompileError::resolve(
                format!("function '{}' may exit without returning a value", sig.name.node),
                sig.span,
            ));
        }
        Ok(())
    }

    fn resolve_block(&mut self, block: &mut Spanned<Block>) -> Result<(), CompileError> {
        self.env.push_scope();
        let result = block.node.stmts.iter_mut().try_for_each(|stmt| self.resolve_stmt(stmt));
        self.env.pop_scope();
        result
    }

    fn resolve_stmt(&mut self, stmt: &mut Spanned<Stmt>) -> Result<(), CompileError> {
        let span = stmt.span;
        match &mut stmt.node {
            Stmt::Let { decl, value } => {
                check_type(&decl.ty, self.env)?;
                if decl.ty.node.is_void() {
                    return Err(CompileError::resolve(
                        format!("variable '{}' cannot have type void", decl.name.node),
                        decl.ty.span,
                    ));
                }
                if let Some(value) = value {
                    let ty = self.resolve_expr(value, Some(&decl.ty.node))?;
                    expect_type(&ty, &decl.ty.node, value.span)?;
                }
                if self.env.define(Rc::clone(decl)).is_some() {
                    return Err(CompileError::resolve(
                        format!("variable '{}' is already declared in this scope", decl.name.node),
                        decl.name.span,
                    ));
                }
                Ok(())
            }
            Stmt::Assign { target, value } => {
                let target_ty = self.resolve_expr(target, None)?;
                let is_variable = matches!(
                    &target.node.kind,
                    ExprKind::Ident { symbol: Some(Symbol::Variable(_)), .. }
                );
                if !is_variable {
                    return Err(CompileError::resolve("invalid assignment target", target.span));
                }
                let value_ty = self.resolve_expr(value, Some(&target_ty))?;
                expect_type(&value_ty, &target_ty, value.span)
            }
            Stmt::Return(value) => {
                let expected = self.return_type.clone();
                match value {
                    Some(_) if expected.is_void() => {
                        Err(CompileError::resolve("cannot return a value from a void function", span))
                    }
                    Some(value) => {
                        let ty = self.resolve_expr(value, Some(&expected))?;
                        expect_type(&ty, &expected, value.span)
                    }
                    None if !expected.is_void() => {
                        Err(CompileError::resolve(format!("missing return value of type {expected}"), span))
                    }
                    None => Ok(()),
                }
            }
            Stmt::If { condition, then_block, else_block } => {
                self.resolve_condition(condition)?;
                self.resolve_block(then_block)?;
                if let Some(else_block) = else_block {
                    self.resolve_block(else_block)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.resolve_condition(condition)?;
                self.resolve_block(body)
            }
            Stmt::Block(block) => self.resolve_block(block),
            Stmt::Expr(expr) => self.resolve_expr(expr, None).map(|_| ()),
        }
    }

    fn resolve_condition(&mut self, condition: &mut Spanned<Expr>) -> Result<(), CompileError> {
        let ty = self.resolve_expr(condition, Some(&Type::BOOL))?;
        expect_type(&ty, &Type::BOOL, condition.span)
    }

    /// Resolve `expr`, attach and return its evaluated type. `expected` is a
    /// hint that untyped number literals adopt when it is numeric.
    fn resolve_expr(
        &mut self,
        expr: &mut Spanned<Expr>,
        expected: Option<&Type>,
    ) -> Result<Type, CompileError> {
        let span = expr.span;
        let ty = match &mut expr.node.kind {
            ExprKind::BoolLit(_) => Type::BOOL,
            ExprKind::NumberLit(lit) => literal_type(*lit, expected, span)?,
            ExprKind::Ident { name, symbol } => {
                let resolved = self.env.lookup(name).ok_or_else(|| {
                    CompileError::resolve(format!("unknown identifier '{name}'"), span)
                })?;
                let ty = match &resolved {
                    Symbol::Variable(decl) => decl.ty.node.clone(),
                    Symbol::Function(_) => {
                        return Err(CompileError::resolve(
                            format!("function '{name}' can only be called"),
                            span,
                        ));
                    }
                };
                *symbol = Some(resolved);
                ty
            }
            ExprKind::Call { callee, args } => self.resolve_call(callee, args, span)?,
            ExprKind::BinOp { op, lhs, rhs } => self.resolve_binop(*op, lhs, rhs, expected, span)?,
        };
        expr.node.ty = Some(ty.clone());
        Ok(ty)
    }

    fn resolve_call(
        &mut self,
        callee: &mut Spanned<Expr>,
        args: &mut [Spanned<Expr>],
        span: Span,
    ) -> Result<Type, CompileError> {
        let ExprKind::Ident { name, symbol } = &mut callee.node.kind else {
            return Err(CompileError::resolve("expression is not callable", callee.span));
        };
        let sig = match self.env.lookup(name) {
            Some(Symbol::Function(sig)) => sig,
            Some(Symbol::Variable(_)) => {
                return Err(CompileError::resolve(format!("'{name}' is not a function"), callee.span));
            }
            None => {
                return Err(CompileError::resolve(format!("unknown function '{name}'"), callee.span));
            }
        };
        if args.len() != sig.params.len() {
            return Err(CompileError::resolve(
                format!(
                    "function '{}' expects {} argument(s), found {}",
                    sig.name.node,
                    sig.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        for (arg, param) in args.iter_mut().zip(&sig.params) {
            let ty = self.resolve_expr(arg, Some(&param.ty.node))?;
            expect_type(&ty, &param.ty.node, arg.span)?;
        }

        // The callee identifier evaluates to the function's return type.
        let return_type = sig.return_type.node.clone();
        *symbol = Some(Symbol::Function(sig));
        callee.node.ty = Some(return_type.clone());
        Ok(return_type)
    }

    fn resolve_binop(
        &mut self,
        op: BinOp,
        lhs: &mut Spanned<Expr>,
        rhs: &mut Spanned<Expr>,
        expected: Option<&Type>,
        span: Span,
    ) -> Result<Type, CompileError> {
        let hint = if op.is_arithmetic() { expected } else { None };

        // Resolve the non-literal side first so a literal can adopt its type.
        // Between two literals the float one goes first, so `1 < 2.5` and
        // `2.5 > 1` both compare as floats.
        let lhs_is_literal = matches!(lhs.node.kind, ExprKind::NumberLit(_));
        let rhs_is_literal = matches!(rhs.node.kind, ExprKind::NumberLit(_));
        let rhs_first = match (&lhs.node.kind, &rhs.node.kind) {
            (ExprKind::NumberLit(NumberLit::Int(_)), ExprKind::NumberLit(NumberLit::Float(_))) => true,
            _ => lhs_is_literal && !rhs_is_literal,
        };
        let (lhs_ty, rhs_ty) = if rhs_first {
            let rhs_ty = self.resolve_expr(rhs, hint)?;
            let lhs_ty = self.resolve_expr(lhs, Some(&rhs_ty))?;
            (lhs_ty, rhs_ty)
        } else {
            let lhs_ty = self.resolve_expr(lhs, hint)?;
            let rhs_ty = self.resolve_expr(rhs, Some(&lhs_ty))?;
            (lhs_ty, rhs_ty)
        };

        if lhs_ty != rhs_ty {
            return Err(CompileError::resolve(
                format!("mismatched operand types for '{}': {lhs_ty} and {rhs_ty}", op.symbol()),
                span,
            ));
        }
        let allowed = if op.is_equality() {
            lhs_ty.is_numeric() || lhs_ty == Type::BOOL
        } else {
            lhs_ty.is_numeric()
        };
        if !allowed {
            return Err(CompileError::resolve(
                format!("operator '{}' is not defined for {lhs_ty}", op.symbol()),
                span,
            ));
        }

        Ok(if op.is_arithmetic() { lhs_ty } else { Type::BOOL })
    }
}

fn literal_type(lit: NumberLit, expected: Option<&Type>, span: Span) -> Result<Type, CompileError> {
    let target = expected.and_then(Type::builtin);
    match lit {
        NumberLit::Int(value) => {
            let ty = match target {
                Some(b) if b.is_numeric() => b,
                _ => BuiltinType::I32,
            };
            if ty.int_max().is_some_and(|max| value > max) {
                return Err(CompileError::resolve(
                    format!("integer literal {value} does not fit in {}", ty.name()),
                    span,
                ));
            }
            Ok(Type::Builtin(ty))
        }
        NumberLit::Float(_) => match target {
            Some(b) if b.is_float() => Ok(Type::Builtin(b)),
            _ => Ok(Type::Builtin(BuiltinType::F64)),
        },
    }
}
