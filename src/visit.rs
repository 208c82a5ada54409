//! AST visitor infrastructure
//!
//! Every `visit_*` method is called before a node's children and answers
//! whether the traversal should descend into them. The `walk_*` functions
//! drive the traversal and honour that answer, so a pass only overrides the
//! node kinds it cares about.
//!
//! ```rust
//! use seam::parser::ast::{Expr, ExprKind};
//! use seam::span::Spanned;
//! use seam::visit::{Visitor, Walk};
//!
//! struct CallCounter {
//!     calls: usize,
//! }
//!
//! impl Visitor for CallCounter {
//!     fn visit_expr(&mut self, expr: &Spanned<Expr>) -> Walk {
//!         if let ExprKind::Call { .. } = &expr.node.kind {
//!             self.calls += 1;
//!         }
//!         Walk::Descend
//!     }
//! }
//! ```
//!
//! Passes where most node kinds need custom logic (the resolver, the code
//! generator) match on the tree directly instead.

use crate::parser::ast::*;
use crate::span::Spanned;

/// Whether a traversal continues into the children of the visited node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Descend,
    Skip,
}

/// Read-only AST visitor. Default implementations descend everywhere.
pub trait Visitor: Sized {
    fn visit_item(&mut self, _item: &Spanned<Item>) -> Walk {
        Walk::Descend
    }

    fn visit_function(&mut self, _func: &Function) -> Walk {
        Walk::Descend
    }

    fn visit_type_decl(&mut self, _decl: &TypeDecl) -> Walk {
        Walk::Descend
    }

    fn visit_block(&mut self, _block: &Spanned<Block>) -> Walk {
        Walk::Descend
    }

    fn visit_stmt(&mut self, _stmt: &Spanned<Stmt>) -> Walk {
        Walk::Descend
    }

    fn visit_expr(&mut self, _expr: &Spanned<Expr>) -> Walk {
        Walk::Descend
    }
}

pub fn walk_program<V: Visitor>(v: &mut V, program: &Program) {
    for item in &program.items {
        if v.visit_item(item) == Walk::Descend {
            walk_item(v, item);
        }
    }
}

pub fn walk_item<V: Visitor>(v: &mut V, item: &Spanned<Item>) {
    match &item.node {
        Item::Function(func) => {
            if v.visit_function(func) == Walk::Descend {
                walk_function(v, func);
            }
        }
        Item::Type(decl) => {
            v.visit_type_decl(decl);
        }
    }
}

pub fn walk_function<V: Visitor>(v: &mut V, func: &Function) {
    if let Some(body) = &func.body {
        visit_block(v, body);
    }
}

fn visit_block<V: Visitor>(v: &mut V, block: &Spanned<Block>) {
    if v.visit_block(block) == Walk::Descend {
        walk_block(v, block);
    }
}

fn visit_stmt<V: Visitor>(v: &mut V, stmt: &Spanned<Stmt>) {
    if v.visit_stmt(stmt) == Walk::Descend {
        walk_stmt(v, stmt);
    }
}

fn visit_expr<V: Visitor>(v: &mut V, expr: &Spanned<Expr>) {
    if v.visit_expr(expr) == Walk::Descend {
        walk_expr(v, expr);
    }
}

pub fn walk_block<V: Visitor>(v: &mut V, block: &Spanned<Block>) {
    for stmt in &block.node.stmts {
        visit_stmt(v, stmt);
    }
}

pub fn walk_stmt<V: Visitor>(v: &mut V, stmt: &Spanned<Stmt>) {
    match &stmt.node {
        Stmt::Let { value, .. } => {
            if let Some(value) = value {
                visit_expr(v, value);
            }
        }
        Stmt::Assign { target, value } => {
            visit_expr(v, target);
            visit_expr(v, value);
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                visit_expr(v, value);
            }
        }
        Stmt::If { condition, then_block, else_block } => {
            visit_expr(v, condition);
            visit_block(v, then_block);
            if let Some(else_block) = else_block {
                visit_block(v, else_block);
            }
        }
        Stmt::While { condition, body } => {
            visit_expr(v, condition);
            visit_block(v, body);
        }
        Stmt::Block(block) => visit_block(v, block),
        Stmt::Expr(expr) => visit_expr(v, expr),
    }
}

pub fn walk_expr<V: Visitor>(v: &mut V, expr: &Spanned<Expr>) {
    match &expr.node.kind {
        ExprKind::BoolLit(_) | ExprKind::NumberLit(_) | ExprKind::Ident { .. } => {}
        ExprKind::Call { callee, args } => {
            visit_expr(v, callee);
            for arg in args {
                visit_expr(v, arg);
            }
        }
        ExprKind::BinOp { lhs, rhs, .. } => {
            visit_expr(v, lhs);
            visit_expr(v, rhs);
        }
    }
}
