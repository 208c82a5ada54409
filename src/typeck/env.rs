use std::collections::HashMap;
use std::rc::Rc;

use crate::parser::ast::{FunctionSignature, Symbol, Type, VarDecl};
use crate::span::Span;

/// Name-keyed declaration tables built by the collector, plus the lexical
/// scope stack the resolver uses while walking function bodies.
#[derive(Debug, Default)]
pub struct TypeEnv {
    scopes: Vec<HashMap<String, Rc<VarDecl>>>,
    /// User-defined type name → declaration span.
    pub types: HashMap<String, Span>,
    /// Declared function name → signature.
    pub functions: HashMap<String, Rc<FunctionSignature>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind a variable in the innermost scope. Returns the previous binding
    /// from the same scope, if any.
    pub fn define(&mut self, decl: Rc<VarDecl>) -> Option<Rc<VarDecl>> {
        if self.scopes.is_empty() {
            self.scopes.push(HashMap::new());
        }
        self.scopes.last_mut()?.insert(decl.name.node.clone(), decl)
    }

    pub fn lookup_var(&self, name: &str) -> Option<&Rc<VarDecl>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Resolve a name: variables shadow functions.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        if let Some(decl) = self.lookup_var(name) {
            return Some(Symbol::Variable(Rc::clone(decl)));
        }
        self.functions.get(name).map(|sig| Symbol::Function(Rc::clone(sig)))
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

/// Mangle a function name from its signature: `add(i32, i32) -> i32`
/// becomes `add__i32_i32__i32`. An empty parameter list mangles as `void`,
/// which cannot clash because `void` parameters are rejected.
pub fn mangle_signature(name: &str, params: &[Type], return_type: &Type) -> String {
    let params = if params.is_empty() {
        "void".to_string()
    } else {
        params.iter().map(ToString::to_string).collect::<Vec<_>>().join("_")
    };
    format!("{name}__{params}__{return_type}")
}
