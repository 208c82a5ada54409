use std::rc::Rc;

use crate::diagnostics::CompileError;
use crate::parser::ast::*;
use crate::span::Spanned;
use crate::visit::{walk_program, Visitor, Walk};

use super::env::TypeEnv;

/// First pass: record every type and function declaration by name.
struct TypeCollector {
    env: TypeEnv,
    errors: Vec<CompileError>,
}

impl Visitor for TypeCollector {
    fn visit_item(&mut self, item: &Spanned<Item>) -> Walk {
        match &item.node {
            Item::Function(func) => self.register_function(&func.signature),
            Item::Type(decl) => self.register_type(decl),
        }
        // Declarations are only top-level; bodies are left to the resolver.
        Walk::Skip
    }
}

impl TypeCollector {
    fn register_type(&mut self, decl: &TypeDecl) {
        let name = &decl.name;
        if BuiltinType::from_name(&name.node).is_some() {
            self.errors.push(CompileError::declaration(
                format!("type '{}' collides with a built-in type", name.node),
                name.span,
            ));
            return;
        }
        if self.env.types.contains_key(&name.node) {
            self.errors.push(CompileError::declaration(
                format!("type '{}' is already declared", name.node),
                name.span,
            ));
            return;
        }
        self.env.types.insert(name.node.clone(), name.span);
    }

    fn register_function(&mut self, sig: &Rc<FunctionSignature>) {
        let name = &sig.name;
        if self.env.functions.contains_key(&name.node) {
            self.errors.push(CompileError::declaration(
                format!("function '{}' is already declared", name.node),
                name.span,
            ));
            return;
        }
        self.env.functions.insert(name.node.clone(), Rc::clone(sig));
    }
}

/// Collect every declaration in `program`. All collisions are reported, not
/// just the first.
pub fn collect_declarations(program: &Program) -> Result<TypeEnv, CompileError> {
    let mut collector = TypeCollector { env: TypeEnv::new(), errors: Vec::new() };
    walk_program(&mut collector, program);
    if !collector.errors.is_empty() {
        return Err(CompileError::from_many(collector.errors));
    }
    tracing::debug!(
        "collected {} type(s) and {} function(s)",
        collector.env.types.len(),
        collector.env.functions.len()
    );
    Ok(collector.env)
}
