//! Front end for stencil scripts: a small JavaScript-like language.
//!
//! The tokenizer and parser are hand written so the parser can account for
//! its own nesting depth; the compile frontend turns its native stack quota
//! into a depth budget and hands it to [`parse_program`].

pub mod ast;
pub mod error;
pub mod parser;
pub mod span;
pub mod token;
pub mod tokenizer;

pub use error::{LexerError, SyntaxError};
pub use parser::{ParseOptions, parse_program};
pub use span::{LineIndex, Span};
pub use token::{Keyword, Punct, TemplateChunk, Token, TokenKind};
pub use tokenizer::{LexResult, MAX_TEMPLATE_NESTING, tokenize};
