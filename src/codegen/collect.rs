use std::rc::Rc;

use crate::parser::ast::{Function, FunctionSignature, Item, Program};
use crate::span::Spanned;
use crate::visit::{walk_program, Visitor, Walk};

/// Top-level functions of a program, split by kind, in declaration order.
/// Entries are indices into `Program::items`.
#[derive(Debug, Default)]
pub struct CollectedFunctions {
    pub externs: Vec<usize>,
    pub functions: Vec<usize>,
    /// Signatures tagged `constructor`, in first-collected order.
    pub constructors: Vec<Rc<FunctionSignature>>,
}

impl CollectedFunctions {
    pub fn externs<'a>(&'a self, program: &'a Program) -> impl Iterator<Item = &'a Function> {
        function_items(program, &self.externs)
    }

    pub fn functions<'a>(&'a self, program: &'a Program) -> impl Iterator<Item = &'a Function> {
        function_items(program, &self.functions)
    }
}

fn function_items<'a>(program: &'a Program, indices: &'a [usize]) -> impl Iterator<Item = &'a Function> {
    indices.iter().filter_map(|&i| match &program.items.get(i)?.node {
        Item::Function(func) => Some(func),
        Item::Type(_) => None,
    })
}

struct FunctionCollector {
    position: usize,
    collected: CollectedFunctions,
}

impl Visitor for FunctionCollector {
    fn visit_item(&mut self, item: &Spanned<Item>) -> Walk {
        let index = self.position;
        self.position += 1;
        if let Item::Function(func) = &item.node {
            let sig = &func.signature;
            if sig.is_extern {
                self.collected.externs.push(index);
            } else {
                self.collected.functions.push(index);
            }
            if sig.is_constructor() {
                self.collected.constructors.push(Rc::clone(sig));
            }
        }
        Walk::Skip
    }
}

pub fn collect_functions(program: &Program) -> CollectedFunctions {
    let mut collector = FunctionCollector { position: 0, collected: CollectedFunctions::default() };
    walk_program(&mut collector, program);
    tracing::debug!(
        "collected {} extern(s), {} function(s), {} constructor(s)",
        collector.collected.externs.len(),
        collector.collected.functions.len(),
        collector.collected.constructors.len()
    );
    collector.collected
}
