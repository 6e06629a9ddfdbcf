//! XPath 1.0 expressions and XSLT 1.0 match patterns.
//!
//! Both grammars share one lexer and one recursive descent parser with an
//! explicit nesting bound, so pathological input fails with
//! [`ParserError::TooComplex`] instead of exhausting the stack.

pub mod ast;
mod error;
mod lexer;
mod parser;
pub mod pattern;
mod span;
pub mod value_template;

pub use error::ParserError;
pub use parser::{parse_expression, parse_pattern, XPathParser, DEFAULT_MAX_DEPTH};
pub use pattern::Pattern;
pub use span::Span;
