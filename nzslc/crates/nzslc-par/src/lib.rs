//! nzslc-par - NZSL AST and Parser
//!
//! This crate owns the intermediate representation shared by the whole
//! compiler: expression and statement nodes, expression types, constant
//! values and the module structure. The parser turns the token stream
//! produced by `nzslc-lex` into one [`ast::Module`] whose root is an
//! untyped [`ast::MultiStatement`]; identifier resolution and typing are
//! the semantic pipeline's job (`nzslc-sem`).

pub mod ast;
mod parser;

pub use parser::{parse, parse_source, parse_tokens};
