//! Parser output. Lexing and parsing happen upstream of this crate; the
//! middle-end consumes the tree defined in [`ast`].

pub mod ast;
