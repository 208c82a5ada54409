pub mod span;
pub mod diagnostics;
pub mod parser;
pub mod visit;
pub mod typeck;
pub mod codegen;
pub mod config;

use codegen::LoweredModule;
use config::CodegenOptions;
use diagnostics::CompileError;
use parser::ast::Program;

/// Resolve a parsed program and lower it to a verified module
/// (collect → resolve → lower → entry synthesis → verify).
pub fn lower_program(program: &mut Program, options: &CodegenOptions) -> Result<LoweredModule, CompileError> {
    typeck::run_passes(program)?;
    codegen::codegen(program, options)
}

/// Compile a parsed program to object bytes. No file I/O or linking.
pub fn compile_to_object(program: &mut Program, options: &CodegenOptions) -> Result<Vec<u8>, CompileError> {
    lower_program(program, options)?.emit()
}
