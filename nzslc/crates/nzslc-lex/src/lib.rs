//! nzslc-lex - NZSL Lexer
//!
//! Turns NZSL source text into an ordered token sequence with source
//! spans. Tokenization is a pure function: the whole source is consumed
//! in one pass and materialized as a vector so the parser can look ahead
//! freely. The sequence always ends with exactly one
//! [`TokenKind::EndOfStream`].

mod lexer;
mod token;

pub use lexer::tokenize;
pub use token::{Token, TokenKind};
