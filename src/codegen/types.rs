use std::collections::HashMap;
use std::rc::Rc;

use cranelift_codegen::ir::{types, AbiParam, Signature};
use cranelift_codegen::isa::CallConv;

use crate::diagnostics::CompileError;
use crate::parser::ast::{BuiltinType, FunctionSignature, Type};
use crate::span::Span;

/// IR-level shape of a language type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoweredType {
    Void,
    Scalar(types::Type),
    /// Flat record passed and returned field by field.
    Record(Vec<types::Type>),
}

impl LoweredType {
    pub fn fields(&self) -> &[types::Type] {
        match self {
            LoweredType::Void => &[],
            LoweredType::Scalar(ty) => std::slice::from_ref(ty),
            LoweredType::Record(fields) => fields,
        }
    }

    /// Each field with its byte offset, naturally aligned.
    pub fn field_offsets(&self) -> Vec<(types::Type, i32)> {
        let mut offset = 0u32;
        self.fields()
            .iter()
            .map(|&ty| {
                let align = ty.bytes();
                offset = offset.div_ceil(align) * align;
                let at = offset;
                offset += ty.bytes();
                (ty, at as i32)
            })
            .collect()
    }

    pub fn align(&self) -> u32 {
        self.fields().iter().map(|ty| ty.bytes()).max().unwrap_or(1)
    }

    pub fn size(&self) -> u32 {
        let end = self
            .field_offsets()
            .last()
            .map(|(ty, offset)| *offset as u32 + ty.bytes())
            .unwrap_or(0);
        end.div_ceil(self.align()) * self.align()
    }

    pub fn abi_params(&self) -> Vec<AbiParam> {
        self.fields().iter().map(|&ty| AbiParam::new(ty)).collect()
    }

    pub fn is_valid_argument(&self) -> bool {
        !self.fields().is_empty()
    }

    /// Return values must fit the return registers: at most two scalars.
    pub fn is_valid_return(&self) -> bool {
        self.fields().len() <= 2
    }
}

/// Maps language types onto Cranelift types for one target.
#[derive(Debug, Clone, Copy)]
pub struct TypeLowering {
    pub pointer_type: types::Type,
    pub call_conv: CallConv,
}

impl TypeLowering {
    pub fn new(pointer_type: types::Type, call_conv: CallConv) -> Self {
        Self { pointer_type, call_conv }
    }

    pub fn lower(&self, ty: &Type, span: Span) -> Result<LoweredType, CompileError> {
        match ty {
            Type::Builtin(b) => Ok(self.lower_builtin(*b)),
            Type::Named(name) => Err(CompileError::internal(
                format!("user-defined type '{name}' cannot be lowered; class types are not supported"),
                span,
            )),
        }
    }

    pub fn lower_builtin(&self, ty: BuiltinType) -> LoweredType {
        match ty {
            BuiltinType::Void => LoweredType::Void,
            // Cranelift has no 1-bit integer; comparisons produce i8 as well.
            BuiltinType::Bool | BuiltinType::U8 | BuiltinType::I8 => LoweredType::Scalar(types::I8),
            BuiltinType::U16 | BuiltinType::I16 => LoweredType::Scalar(types::I16),
            BuiltinType::U32 | BuiltinType::I32 => LoweredType::Scalar(types::I32),
            BuiltinType::U64 | BuiltinType::I64 => LoweredType::Scalar(types::I64),
            BuiltinType::F32 => LoweredType::Scalar(types::F32),
            BuiltinType::F64 => LoweredType::Scalar(types::F64),
            // { size, data }
            BuiltinType::String => LoweredType::Record(vec![self.pointer_type, self.pointer_type]),
        }
    }
}

/// Computes IR signatures, caching them by module-level name.
#[derive(Debug)]
pub struct SignatureLowering {
    types: TypeLowering,
    cache: HashMap<String, Rc<Signature>>,
}

impl SignatureLowering {
    pub fn new(types: TypeLowering) -> Self {
        Self { types, cache: HashMap::new() }
    }

    pub fn types(&self) -> &TypeLowering {
        &self.types
    }

    pub fn lower(&mut self, sig: &FunctionSignature) -> Result<Rc<Signature>, CompileError> {
        let key = sig.module_name().ok_or_else(|| {
            CompileError::internal(format!("function '{}' was never mangled", sig.name.node), sig.span)
        })?;
        if let Some(cached) = self.cache.get(key) {
            return Ok(Rc::clone(cached));
        }

        let return_type = self.types.lower(&sig.return_type.node, sig.return_type.span)?;
        if !return_type.is_valid_return() {
            return Err(CompileError::internal(
                format!("invalid return type {} for '{}'", sig.return_type.node, sig.name.node),
                sig.span,
            ));
        }

        let mut signature = Signature::new(self.types.call_conv);
        for param in &sig.params {
            let param_type = self.types.lower(&param.ty.node, param.ty.span)?;
            if !param_type.is_valid_argument() {
                return Err(CompileError::internal(
                    format!("invalid parameter type {} for '{}'", param.ty.node, param.name.node),
                    sig.span,
                ));
            }
            signature.params.extend(param_type.abi_params());
        }
        signature.returns.extend(return_type.abi_params());

        let signature = Rc::new(signature);
        self.cache.insert(key.to_string(), Rc::clone(&signature));
        Ok(signature)
    }
}
