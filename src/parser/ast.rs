use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::span::{Span, Spanned};

/// Attribute that makes a function run from the synthesized entry function.
pub const CONSTRUCTOR_ATTRIBUTE: &str = "constructor";

#[derive(Debug, Default)]
pub struct Program {
    pub items: Vec<Spanned<Item>>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Function(Function),
    Type(TypeDecl),
}

/// A user-defined (class) type declaration. Only the name is tracked; class
/// types can be declared and referenced but not lowered.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: Spanned<String>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub signature: Rc<FunctionSignature>,
    /// `None` for extern declarations.
    pub body: Option<Spanned<Block>>,
}

#[derive(Debug)]
pub struct FunctionSignature {
    pub name: Spanned<String>,
    /// Filled in once by the type resolver. Extern signatures are never mangled.
    pub mangled_name: OnceCell<String>,
    pub params: Vec<Rc<VarDecl>>,
    pub return_type: Spanned<Type>,
    pub is_extern: bool,
    pub attributes: BTreeSet<String>,
    pub span: Span,
}

impl FunctionSignature {
    pub fn new(
        name: Spanned<String>,
        params: Vec<Rc<VarDecl>>,
        return_type: Spanned<Type>,
        span: Span,
    ) -> Self {
        Self {
            name,
            mangled_name: OnceCell::new(),
            params,
            return_type,
            is_extern: false,
            attributes: BTreeSet::new(),
            span,
        }
    }

    pub fn external(mut self) -> Self {
        self.is_extern = true;
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.insert(attribute.into());
        self
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains(attribute)
    }

    pub fn is_constructor(&self) -> bool {
        self.has_attribute(CONSTRUCTOR_ATTRIBUTE)
    }

    /// The name this function is registered under in the IR module: the
    /// declared name for externs, the mangled name otherwise. `None` until the
    /// resolver has mangled a non-extern signature.
    pub fn module_name(&self) -> Option<&str> {
        if self.is_extern {
            Some(&self.name.node)
        } else {
            self.mangled_name.get().map(String::as_str)
        }
    }
}

/// A parameter or local variable.
#[derive(Debug)]
pub struct VarDecl {
    pub name: Spanned<String>,
    pub ty: Spanned<Type>,
}

impl VarDecl {
    pub fn new(name: Spanned<String>, ty: Spanned<Type>) -> Rc<Self> {
        Rc::new(Self { name, ty })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Void,
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    String,
}

impl BuiltinType {
    pub const ALL: [BuiltinType; 13] = [
        BuiltinType::Void,
        BuiltinType::Bool,
        BuiltinType::U8,
        BuiltinType::I8,
        BuiltinType::U16,
        BuiltinType::I16,
        BuiltinType::U32,
        BuiltinType::I32,
        BuiltinType::U64,
        BuiltinType::I64,
        BuiltinType::F32,
        BuiltinType::F64,
        BuiltinType::String,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinType::Void => "void",
            BuiltinType::Bool => "bool",
            BuiltinType::U8 => "u8",
            BuiltinType::I8 => "i8",
            BuiltinType::U16 => "u16",
            BuiltinType::I16 => "i16",
            BuiltinType::U32 => "u32",
            BuiltinType::I32 => "i32",
            BuiltinType::U64 => "u64",
            BuiltinType::I64 => "i64",
            BuiltinType::F32 => "f32",
            BuiltinType::F64 => "f64",
            BuiltinType::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<BuiltinType> {
        BuiltinType::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn is_float(self) -> bool {
        matches!(self, BuiltinType::F32 | BuiltinType::F64)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, BuiltinType::U8 | BuiltinType::U16 | BuiltinType::U32 | BuiltinType::U64)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BuiltinType::U8
                | BuiltinType::I8
                | BuiltinType::U16
                | BuiltinType::I16
                | BuiltinType::U32
                | BuiltinType::I32
                | BuiltinType::U64
                | BuiltinType::I64
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Largest literal value representable in this integer type.
    pub fn int_max(self) -> Option<u64> {
        let max = match self {
            BuiltinType::U8 => u8::MAX as u64,
            BuiltinType::I8 => i8::MAX as u64,
            BuiltinType::U16 => u16::MAX as u64,
            BuiltinType::I16 => i16::MAX as u64,
            BuiltinType::U32 => u32::MAX as u64,
            BuiltinType::I32 => i32::MAX as u64,
            BuiltinType::U64 => u64::MAX,
            BuiltinType::I64 => i64::MAX as u64,
            _ => return None,
        };
        Some(max)
    }
}

/// Language-level type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Builtin(BuiltinType),
    /// Reference to a user-defined type.
    Named(String),
}

impl Type {
    pub const VOID: Type = Type::Builtin(BuiltinType::Void);
    pub const BOOL: Type = Type::Builtin(BuiltinType::Bool);

    pub fn builtin(&self) -> Option<BuiltinType> {
        match self {
            Type::Builtin(b) => Some(*b),
            Type::Named(_) => None,
        }
    }

    pub fn is_void(&self) -> bool {
        *self == Type::VOID
    }

    pub fn is_float(&self) -> bool {
        self.builtin().is_some_and(BuiltinType::is_float)
    }

    pub fn is_unsigned(&self) -> bool {
        self.builtin().is_some_and(BuiltinType::is_unsigned)
    }

    pub fn is_numeric(&self) -> bool {
        self.builtin().is_some_and(BuiltinType::is_numeric)
    }
}

impl From<BuiltinType> for Type {
    fn from(b: BuiltinType) -> Self {
        Type::Builtin(b)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Builtin(b) => f.write_str(b.name()),
            Type::Named(name) => f.write_str(name),
        }
    }
}

/// What an identifier was bound to by the resolver.
#[derive(Debug, Clone)]
pub enum Symbol {
    Function(Rc<FunctionSignature>),
    Variable(Rc<VarDecl>),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Spanned<Stmt>>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Let {
        decl: Rc<VarDecl>,
        value: Option<Spanned<Expr>>,
    },
    Assign {
        target: Spanned<Expr>,
        value: Spanned<Expr>,
    },
    Return(Option<Spanned<Expr>>),
    If {
        condition: Spanned<Expr>,
        then_block: Spanned<Block>,
        else_block: Option<Spanned<Block>>,
    },
    While {
        condition: Spanned<Expr>,
        body: Spanned<Block>,
    },
    Block(Spanned<Block>),
    Expr(Spanned<Expr>),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    /// Evaluated type, attached by the resolver.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, ty: None }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    BoolLit(bool),
    NumberLit(NumberLit),
    Ident {
        name: String,
        symbol: Option<Symbol>,
    },
    Call {
        callee: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },
    BinOp {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberLit {
    Int(u64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Neq)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
        }
    }
}
