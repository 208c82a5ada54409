pub mod collect;
pub mod lower;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use cranelift_codegen::ir::{self, ExternalName, InstBuilder, InstructionData, Signature, UserFuncName};
use cranelift_codegen::isa::{self, OwnedTargetIsa, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::config::CodegenOptions;
use crate::diagnostics::CompileError;
use crate::parser::ast::*;
use lower::lower_function;
use types::{SignatureLowering, TypeLowering};

/// A function registered in the module.
#[derive(Debug)]
pub struct DeclaredFunction {
    pub id: FuncId,
    pub linkage: Linkage,
    pub signature: Rc<Signature>,
    /// The verified IR, as handed to the backend. `None` for imports.
    pub body: Option<ir::Function>,
}

impl DeclaredFunction {
    pub fn is_defined(&self) -> bool {
        self.body.is_some()
    }
}

/// Deduplicating registry of module functions, keyed by module-level name,
/// plus the signature cache that feeds it.
#[derive(Debug)]
pub struct FunctionTable {
    signatures: SignatureLowering,
    functions: BTreeMap<String, DeclaredFunction>,
}

impl FunctionTable {
    pub fn new(types: TypeLowering) -> Self {
        Self { signatures: SignatureLowering::new(types), functions: BTreeMap::new() }
    }

    pub fn types(&self) -> &TypeLowering {
        self.signatures.types()
    }

    pub fn signature(&mut self, sig: &FunctionSignature) -> Result<Rc<Signature>, CompileError> {
        self.signatures.lower(sig)
    }

    pub fn get(&self, name: &str) -> Option<&DeclaredFunction> {
        self.functions.get(name)
    }

    /// Fetch the function for `sig`, declaring it on first use. Externs are
    /// imported; everything else is local to the module. An extern whose name
    /// equals a mangled name is a collision.
    pub fn get_or_declare(&mut self, module: &mut dyn Module, sig: &FunctionSignature) -> Result<FuncId, CompileError> {
        let name = module_name(sig)?;
        let linkage = if sig.is_extern { Linkage::Import } else { Linkage::Local };
        if let Some(existing) = self.functions.get(name) {
            if existing.linkage != linkage {
                return Err(CompileError::declaration(
                    format!("function '{}' collides with module symbol '{name}'", sig.name.node),
                    sig.span,
                ));
            }
            return Ok(existing.id);
        }
        let signature = self.signatures.lower(sig)?;
        self.declare(module, name, linkage, signature)
    }

    fn declare(
        &mut self,
        module: &mut dyn Module,
        name: &str,
        linkage: Linkage,
        signature: Rc<Signature>,
    ) -> Result<FuncId, CompileError> {
        let id = module
            .declare_function(name, linkage, &signature)
            .map_err(|e| CompileError::codegen(format!("declare function '{name}' error: {e}")))?;
        tracing::debug!(function = name, ?linkage, "declared");
        self.functions.insert(name.to_string(), DeclaredFunction { id, linkage, signature, body: None });
        Ok(id)
    }

    /// Verify a finished function and hand it to the module.
    fn define(&mut self, module: &mut dyn Module, name: &str, mut ctx: Context) -> Result<(), CompileError> {
        let entry = self
            .functions
            .get_mut(name)
            .ok_or_else(|| CompileError::codegen(format!("function '{name}' was defined before being declared")))?;
        verify(name, &ctx.func, module.isa())?;
        let body = ctx.func.clone();
        module
            .define_function(entry.id, &mut ctx)
            .map_err(|e| CompileError::codegen(format!("define function '{name}' error: {e}")))?;
        tracing::debug!(function = name, blocks = body.layout.blocks().count(), "defined");
        entry.body = Some(body);
        Ok(())
    }

    /// Every function local to the module must have a body.
    fn verify_module(&self) -> Result<(), CompileError> {
        let undefined: Vec<_> = self
            .functions
            .iter()
            .filter(|(_, f)| f.linkage == Linkage::Local && !f.is_defined())
            .map(|(name, _)| name.as_str())
            .collect();
        if undefined.is_empty() {
            Ok(())
        } else {
            Err(CompileError::verify("<module>", format!("declared but never defined: {}", undefined.join(", "))))
        }
    }
}

fn module_name(sig: &FunctionSignature) -> Result<&str, CompileError> {
    sig.module_name().ok_or_else(|| {
        CompileError::internal(format!("function '{}' was never mangled", sig.name.node), sig.span)
    })
}

/// Run the Cranelift verifier over one function.
pub fn verify(name: &str, func: &ir::Function, isa: &dyn TargetIsa) -> Result<(), CompileError> {
    cranelift_codegen::verify_function(func, isa).map_err(|errors| CompileError::verify(name, errors.to_string()))
}

/// Build the target ISA: the host when no triple is configured.
pub fn build_isa(options: &CodegenOptions) -> Result<OwnedTargetIsa, CompileError> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", options.opt_level.as_setting())
        .map_err(|e| CompileError::codegen(format!("invalid opt_level: {e}")))?;
    flag_builder
        .set("is_pic", if options.is_pic { "true" } else { "false" })
        .map_err(|e| CompileError::codegen(format!("invalid is_pic: {e}")))?;

    let isa_builder = match &options.target {
        Some(triple) => isa::lookup_by_name(triple)
            .map_err(|e| CompileError::codegen(format!("unsupported target '{triple}': {e}")))?,
        None => cranelift_native::builder()
            .map_err(|e| CompileError::codegen(format!("host ISA not supported: {e}")))?,
    };
    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| CompileError::codegen(format!("ISA error: {e}")))
}

/// Lower a resolved program into a verified module.
pub fn codegen(program: &Program, options: &CodegenOptions) -> Result<LoweredModule, CompileError> {
    let isa = build_isa(options)?;
    let types = TypeLowering::new(isa.pointer_type(), isa.default_call_conv());
    let obj_builder = ObjectBuilder::new(isa, options.module_name.as_str(), cranelift_module::default_libcall_names())
        .map_err(|e| CompileError::codegen(format!("object builder error: {e}")))?;
    let mut module = ObjectModule::new(obj_builder);
    let mut table = FunctionTable::new(types);

    let collected = collect::collect_functions(program);

    // Pass 1: declare externs so every body can call them
    for func in collected.externs(program) {
        table.get_or_declare(&mut module, &func.signature)?;
    }

    // Pass 2: lower and define every body
    for func in collected.functions(program) {
        let sig = &func.signature;
        let name = module_name(sig)?;
        let func_id = table.get_or_declare(&mut module, sig)?;

        let mut fn_ctx = Context::new();
        fn_ctx.func.signature = (*table.signature(sig)?).clone();
        fn_ctx.func.name = UserFuncName::user(0, func_id.as_u32());

        let mut builder_ctx = FunctionBuilderContext::new();
        {
            let builder = FunctionBuilder::new(&mut fn_ctx.func, &mut builder_ctx);
            lower_function(func, builder, &mut module, &mut table)?;
        }
        table.define(&mut module, name, fn_ctx)?;
    }

    // Pass 3: the entry function runs every constructor
    synthesize_entry(&mut module, &mut table, &collected.constructors, &options.entry_symbol)?;

    table.verify_module()?;

    Ok(LoweredModule { module, functions: table.functions, entry: options.entry_symbol.clone() })
}

fn synthesize_entry(
    module: &mut dyn Module,
    table: &mut FunctionTable,
    constructors: &[Rc<FunctionSignature>],
    entry_name: &str,
) -> Result<(), CompileError> {
    if table.get(entry_name).is_some() {
        return Err(CompileError::codegen(format!("entry symbol '{entry_name}' collides with an existing function")));
    }
    let signature = Signature::new(table.types().call_conv);
    let entry_id = table.declare(module, entry_name, Linkage::Local, Rc::new(signature.clone()))?;

    let mut fn_ctx = Context::new();
    fn_ctx.func.signature = signature;
    fn_ctx.func.name = UserFuncName::user(0, entry_id.as_u32());

    let mut builder_ctx = FunctionBuilderContext::new();
    {
        let mut builder = FunctionBuilder::new(&mut fn_ctx.func, &mut builder_ctx);
        let block = builder.create_block();
        builder.switch_to_block(block);
        builder.seal_block(block);
        for ctor in constructors {
            let callee = table.get_or_declare(module, ctor)?;
            let func_ref = module.declare_func_in_func(callee, builder.func);
            // Results are discarded.
            builder.ins().call(func_ref, &[]);
        }
        builder.ins().return_(&[]);
        builder.finalize();
    }

    tracing::debug!(
        "entry '{entry_name}' runs constructors: [{}]",
        constructors.iter().map(|c| c.name.node.as_str()).collect::<Vec<_>>().join(", ")
    );
    table.define(module, entry_name, fn_ctx)
}

/// The assembled, verified module, ready for object emission.
pub struct LoweredModule {
    module: ObjectModule,
    functions: BTreeMap<String, DeclaredFunction>,
    entry: String,
}

impl LoweredModule {
    pub fn function(&self, name: &str) -> Option<&DeclaredFunction> {
        self.functions.get(name)
    }

    /// All registered functions, ordered by module-level name.
    pub fn functions(&self) -> impl Iterator<Item = (&str, &DeclaredFunction)> {
        self.functions.iter().map(|(name, f)| (name.as_str(), f))
    }

    pub fn entry_name(&self) -> &str {
        &self.entry
    }

    pub fn entry(&self) -> Option<&DeclaredFunction> {
        self.functions.get(&self.entry)
    }

    pub fn isa(&self) -> &dyn TargetIsa {
        self.module.isa()
    }

    /// Module-level names of the functions called by `name`, in layout order.
    pub fn callees(&self, name: &str) -> Vec<&str> {
        let Some(body) = self.function(name).and_then(|f| f.body.as_ref()) else {
            return Vec::new();
        };
        let by_id: HashMap<u32, &str> =
            self.functions.iter().map(|(callee, f)| (f.id.as_u32(), callee.as_str())).collect();
        body.layout
            .blocks()
            .flat_map(|block| body.layout.block_insts(block))
            .filter_map(|inst| match body.dfg.insts[inst] {
                InstructionData::Call { func_ref, .. } => Some(func_ref),
                _ => None,
            })
            .filter_map(|func_ref| match &body.dfg.ext_funcs[func_ref].name {
                ExternalName::User(user) => by_id.get(&body.params.user_named_funcs()[*user].index).copied(),
                _ => None,
            })
            .collect()
    }

    pub fn emit(self) -> Result<Vec<u8>, CompileError> {
        let object = self.module.finish();
        object.emit().map_err(|e| CompileError::codegen(format!("emit error: {e}")))
    }
}
