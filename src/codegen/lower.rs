use std::collections::HashMap;
use std::rc::Rc;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{self, types, InstBuilder, StackSlot, StackSlotData, StackSlotKind, TrapCode, Value};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{FuncId, Module};

use crate::diagnostics::CompileError;
use crate::parser::ast::*;
use crate::span::{Span, Spanned};

use super::types::LoweredType;
use super::FunctionTable;

/// Identity of a variable declaration. Two declarations with the same name
/// in different scopes get different slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VarKey(*const VarDecl);

impl VarKey {
    fn of(decl: &Rc<VarDecl>) -> Self {
        VarKey(Rc::as_ptr(decl))
    }
}

#[derive(Debug, Clone)]
struct VarSlot {
    slot: StackSlot,
    layout: LoweredType,
}

/// Result of lowering an expression.
#[derive(Debug, Clone)]
enum Operand {
    /// Loaded SSA values, one per field; empty for a void call.
    Values(Vec<Value>),
    /// A variable's storage location.
    Slot(VarSlot),
    Function(FuncId),
}

struct LowerContext<'a> {
    builder: FunctionBuilder<'a>,
    module: &'a mut dyn Module,
    functions: &'a mut FunctionTable,
    // Per-function state
    variables: HashMap<VarKey, VarSlot>,
    return_type: Type,
}

impl<'a> LowerContext<'a> {
    fn finalize(self) {
        self.builder.finalize();
    }

    /// Whether the current block already ends in a terminator.
    fn block_filled(&self) -> bool {
        let Some(block) = self.builder.current_block() else { return false };
        self.builder
            .func
            .layout
            .last_inst(block)
            .is_some_and(|inst| self.builder.func.dfg.insts[inst].opcode().is_terminator())
    }

    /// Storage for `decl`, allocated the first time the variable is referenced.
    fn slot_for(&mut self, decl: &Rc<VarDecl>) -> Result<VarSlot, CompileError> {
        let key = VarKey::of(decl);
        if let Some(existing) = self.variables.get(&key) {
            return Ok(existing.clone());
        }
        let layout = self.functions.types().lower(&decl.ty.node, decl.ty.span)?;
        if !layout.is_valid_argument() {
            return Err(CompileError::internal(
                format!("variable '{}' has no storage type", decl.name.node),
                decl.name.span,
            ));
        }
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            layout.size(),
            layout.align().trailing_zeros() as u8,
        ));
        let var = VarSlot { slot, layout };
        self.variables.insert(key, var.clone());
        Ok(var)
    }

    fn load(&mut self, var: &VarSlot) -> Vec<Value> {
        var.layout
            .field_offsets()
            .into_iter()
            .map(|(ty, offset)| self.builder.ins().stack_load(ty, var.slot, offset))
            .collect()
    }

    fn store(&mut self, var: &VarSlot, values: &[Value], span: Span) -> Result<(), CompileError> {
        let fields = var.layout.field_offsets();
        if fields.len() != values.len() {
            return Err(CompileError::internal(
                format!("storing {} value(s) into a slot of {} field(s)", values.len(), fields.len()),
                span,
            ));
        }
        for ((_, offset), &value) in fields.into_iter().zip(values) {
            self.builder.ins().stack_store(value, var.slot, offset);
        }
        Ok(())
    }

    /// Turn an operand into loaded values.
    fn values(&mut self, operand: Operand, span: Span) -> Result<Vec<Value>, CompileError> {
        match operand {
            Operand::Values(values) => Ok(values),
            Operand::Slot(var) => Ok(self.load(&var)),
            Operand::Function(_) => Err(CompileError::internal("function used as a value", span)),
        }
    }

    fn scalar(&mut self, operand: Operand, span: Span) -> Result<Value, CompileError> {
        match self.values(operand, span)?.as_slice() {
            [value] => Ok(*value),
            _ => Err(CompileError::internal("expected a scalar operand", span)),
        }
    }

    /// Spill incoming arguments into their parameter slots.
    fn spill_params(&mut self, entry: ir::Block, params: &[Rc<VarDecl>]) -> Result<(), CompileError> {
        let args = self.builder.block_params(entry).to_vec();
        let mut next = 0;
        for param in params {
            let var = self.slot_for(param)?;
            let width = var.layout.fields().len();
            let incoming = args.get(next..next + width).ok_or_else(|| {
                CompileError::internal(format!("missing argument for parameter '{}'", param.name.node), param.name.span)
            })?;
            self.store(&var, incoming, param.name.span)?;
            next += width;
        }
        Ok(())
    }

    fn lower_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Spanned<Stmt>) -> Result<(), CompileError> {
        // Unreachable: the current block already ended in a return.
        if self.block_filled() {
            return Ok(());
        }
        match &stmt.node {
            Stmt::Let { decl, value } => {
                let var = self.slot_for(decl)?;
                if let Some(value) = value {
                    let operand = self.lower_expr(value)?;
                    let values = self.values(operand, value.span)?;
                    self.store(&var, &values, stmt.span)?;
                }
                Ok(())
            }
            Stmt::Assign { target, value } => self.lower_assign(target, value),
            Stmt::Return(value) => {
                let values = match value {
                    Some(expr) => {
                        let operand = self.lower_expr(expr)?;
                        self.values(operand, expr.span)?
                    }
                    None => Vec::new(),
                };
                self.builder.ins().return_(&values);
                Ok(())
            }
            Stmt::If { condition, then_block, else_block } => {
                self.lower_if(condition, then_block, else_block.as_ref())
            }
            Stmt::While { condition, body } => self.lower_while(condition, body),
            Stmt::Block(block) => self.lower_block(&block.node),
            Stmt::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
        }
    }

    fn lower_assign(&mut self, target: &Spanned<Expr>, value: &Spanned<Expr>) -> Result<(), CompileError> {
        let Operand::Slot(var) = self.lower_expr(target)? else {
            return Err(CompileError::internal("assignment target is not a storage location", target.span));
        };
        let operand = self.lower_expr(value)?;
        let values = self.values(operand, value.span)?;
        self.store(&var, &values, value.span)
    }

    /// Branches into `target` unless the current block already terminated.
    fn jump_if_open(&mut self, target: ir::Block) {
        if !self.block_filled() {
            self.builder.ins().jump(target, &[]);
        }
    }

    fn lower_if(
        &mut self,
        condition: &Spanned<Expr>,
        then_block: &Spanned<Block>,
        else_block: Option<&Spanned<Block>>,
    ) -> Result<(), CompileError> {
        let operand = self.lower_expr(condition)?;
        let cond = self.scalar(operand, condition.span)?;

        let then_bb = self.builder.create_block();
        let merge_bb = match else_block {
            Some(else_block) => {
                let else_bb = self.builder.create_block();
                let merge_bb = self.builder.create_block();
                self.builder.ins().brif(cond, then_bb, &[], else_bb, &[]);

                self.builder.switch_to_block(then_bb);
                self.lower_block(&then_block.node)?;
                self.jump_if_open(merge_bb);

                self.builder.switch_to_block(else_bb);
                self.lower_block(&else_block.node)?;
                self.jump_if_open(merge_bb);
                merge_bb
            }
            None => {
                let merge_bb = self.builder.create_block();
                self.builder.ins().brif(cond, then_bb, &[], merge_bb, &[]);

                self.builder.switch_to_block(then_bb);
                self.lower_block(&then_block.node)?;
                self.jump_if_open(merge_bb);
                merge_bb
            }
        };

        self.builder.switch_to_block(merge_bb);
        Ok(())
    }

    fn lower_while(&mut self, condition: &Spanned<Expr>, body: &Spanned<Block>) -> Result<(), CompileError> {
        let header_bb = self.builder.create_block();
        let exit_bb = self.builder.create_block();
        self.jump_if_open(header_bb);

        // The condition is re-evaluated on every iteration.
        self.builder.switch_to_block(header_bb);
        let operand = self.lower_expr(condition)?;
        let cond = self.scalar(operand, condition.span)?;
        let body_bb = self.builder.create_block();
        self.builder.ins().brif(cond, body_bb, &[], exit_bb, &[]);

        self.builder.switch_to_block(body_bb);
        self.lower_block(&body.node)?;
        self.jump_if_open(header_bb);

        self.builder.switch_to_block(exit_bb);
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Spanned<Expr>) -> Result<Operand, CompileError> {
        match &expr.node.kind {
            ExprKind::BoolLit(value) => Ok(Operand::Values(vec![self.builder.ins().iconst(types::I8, *value as i64)])),
            ExprKind::NumberLit(lit) => self.lower_number(*lit, expr),
            ExprKind::Ident { name, symbol } => match symbol {
                Some(Symbol::Variable(decl)) => Ok(Operand::Slot(self.slot_for(decl)?)),
                Some(Symbol::Function(sig)) => {
                    Ok(Operand::Function(self.functions.get_or_declare(self.module, sig)?))
                }
                None => Err(CompileError::internal(format!("unresolved identifier '{name}'"), expr.span)),
            },
            ExprKind::Call { callee, args } => self.lower_call(callee, args),
            ExprKind::BinOp { op, lhs, rhs } => self.lower_binop(*op, lhs, rhs, expr.span),
        }
    }

    fn lower_number(&mut self, lit: NumberLit, expr: &Spanned<Expr>) -> Result<Operand, CompileError> {
        let ty = expr.node.ty.as_ref().and_then(Type::builtin).ok_or_else(|| {
            CompileError::internal("number literal has no evaluated type", expr.span)
        })?;
        let LoweredType::Scalar(ir_ty) = self.functions.types().lower_builtin(ty) else {
            return Err(CompileError::internal(format!("number literal of type {}", ty.name()), expr.span));
        };
        let ins = self.builder.ins();
        let value = match (lit, ir_ty) {
            (NumberLit::Int(v), t) if t.is_int() && ty != BuiltinType::Bool => ins.iconst(t, v as i64),
            (NumberLit::Int(v), types::F32) => ins.f32const(v as f32),
            (NumberLit::Int(v), types::F64) => ins.f64const(v as f64),
            (NumberLit::Float(v), types::F32) => ins.f32const(v as f32),
            (NumberLit::Float(v), types::F64) => ins.f64const(v),
            _ => {
                return Err(CompileError::internal(format!("number literal of type {}", ty.name()), expr.span));
            }
        };
        Ok(Operand::Values(vec![value]))
    }

    fn lower_call(&mut self, callee: &Spanned<Expr>, args: &[Spanned<Expr>]) -> Result<Operand, CompileError> {
        let Operand::Function(func_id) = self.lower_expr(callee)? else {
            return Err(CompileError::internal("expected function for call", callee.span));
        };
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            let operand = self.lower_expr(arg)?;
            arg_values.extend(self.values(operand, arg.span)?);
        }
        let func_ref = self.module.declare_func_in_func(func_id, self.builder.func);
        let call = self.builder.ins().call(func_ref, &arg_values);
        Ok(Operand::Values(self.builder.inst_results(call).to_vec()))
    }

    fn lower_binop(
        &mut self,
        op: BinOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
        span: Span,
    ) -> Result<Operand, CompileError> {
        let l = self.lower_expr(lhs)?;
        let l = self.scalar(l, lhs.span)?;
        let r = self.lower_expr(rhs)?;
        let r = self.scalar(r, rhs.span)?;

        let (lhs_ty, rhs_ty) = match (&lhs.node.ty, &rhs.node.ty) {
            (Some(l), Some(r)) => (l, r),
            _ => return Err(CompileError::internal("binary operand has no evaluated type", span)),
        };
        let is_float = lhs_ty.is_float() || rhs_ty.is_float();
        let is_unsigned = lhs_ty.is_unsigned() && rhs_ty.is_unsigned();

        let ins = self.builder.ins();
        let result = match op {
            BinOp::Add if is_float => ins.fadd(l, r),
            BinOp::Add => ins.iadd(l, r),
            BinOp::Sub if is_float => ins.fsub(l, r),
            BinOp::Sub => ins.isub(l, r),
            BinOp::Mul if is_float => ins.fmul(l, r),
            BinOp::Mul => ins.imul(l, r),
            BinOp::Div if is_float => ins.fdiv(l, r),
            BinOp::Div if is_unsigned => ins.udiv(l, r),
            BinOp::Div => ins.sdiv(l, r),
            _ if is_float => ins.fcmp(float_cc(op), l, r),
            _ => ins.icmp(int_cc(op, is_unsigned), l, r),
        };
        Ok(Operand::Values(vec![result]))
    }

    /// Close the block lowering stopped in.
    fn finish_body(&mut self) {
        if self.block_filled() {
            return;
        }
        if self.return_type.is_void() {
            self.builder.ins().return_(&[]);
        } else {
            // The resolver proved every path returns, so this block is dead.
            self.builder.ins().trap(TrapCode::unwrap_user(1));
        }
    }
}

fn float_cc(op: BinOp) -> FloatCC {
    match op {
        BinOp::Eq => FloatCC::Equal,
        BinOp::Neq => FloatCC::NotEqual,
        BinOp::Lt => FloatCC::LessThan,
        BinOp::LtEq => FloatCC::LessThanOrEqual,
        BinOp::Gt => FloatCC::GreaterThan,
        _ => FloatCC::GreaterThanOrEqual,
    }
}

fn int_cc(op: BinOp, unsigned: bool) -> IntCC {
    match (op, unsigned) {
        (BinOp::Eq, _) => IntCC::Equal,
        (BinOp::Neq, _) => IntCC::NotEqual,
        (BinOp::Lt, true) => IntCC::UnsignedLessThan,
        (BinOp::Lt, false) => IntCC::SignedLessThan,
        (BinOp::LtEq, true) => IntCC::UnsignedLessThanOrEqual,
        (BinOp::LtEq, false) => IntCC::SignedLessThanOrEqual,
        (BinOp::Gt, true) => IntCC::UnsignedGreaterThan,
        (BinOp::Gt, false) => IntCC::SignedGreaterThan,
        (_, true) => IntCC::UnsignedGreaterThanOrEqual,
        (_, false) => IntCC::SignedGreaterThanOrEqual,
    }
}

/// Lower the body of `func` into the function `builder` points at. The
/// builder's function must already carry the lowered signature.
pub fn lower_function(
    func: &Function,
    mut builder: FunctionBuilder<'_>,
    module: &mut dyn Module,
    functions: &mut FunctionTable,
) -> Result<(), CompileError> {
    let sig = &func.signature;
    let body = func.body.as_ref().ok_or_else(|| {
        CompileError::internal(format!("function '{}' has no body", sig.name.node), sig.span)
    })?;

    let entry_block = builder.create_block();
    builder.append_block_params_for_function_params(entry_block);
    builder.switch_to_block(entry_block);

    let mut ctx = LowerContext {
        builder,
        module,
        functions,
        variables: HashMap::new(),
        return_type: sig.return_type.node.clone(),
    };
    ctx.spill_params(entry_block, &sig.params)?;
    ctx.lower_block(&body.node)?;
    ctx.finish_body();
    ctx.builder.seal_all_blocks();

    tracing::trace!(
        "lowered '{}' with {} stack slot(s)",
        sig.name.node,
        ctx.variables.len()
    );
    ctx.finalize();
    Ok(())
}
