pub mod env;
pub mod register;
pub mod resolve;

use crate::diagnostics::CompileError;
use crate::parser::ast::Program;
use env::TypeEnv;

/// Run symbol resolution: collect every declaration, then resolve every
/// body against the collected tables. On success every identifier carries a
/// binding, every expression an evaluated type, and every non-extern
/// signature a mangled name.
pub fn run_passes(program: &mut Program) -> Result<TypeEnv, CompileError> {
    let mut env = register::collect_declarations(program)?;
    resolve::resolve_program(program, &mut env)?;
    Ok(env)
}
