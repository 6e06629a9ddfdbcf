use logos::{Lexer, Logos};

use crate::error::ParserError;
use crate::span::Span;

// XPath 1.0 has no reserved words; `and`, `div`, axis names and node type
// names all lex as NCName and are disambiguated by the parser.
#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[\u{20}\u{9}\u{d}\u{a}]+")]
#[logos(subpattern name_start_char = r"[A-Za-z_\u{c0}-\u{d6}\u{d8}-\u{f6}\u{f8}-\u{2ff}\u{370}-\u{37d}\u{37f}-\u{1fff}\u{200c}-\u{200d}\u{2070}-\u{218f}\u{2c00}-\u{2fef}\u{3001}-\u{d7ff}\u{f900}-\u{fdcf}\u{fdf0}-\u{fffd}\u{10000}-\u{effff}]")]
#[logos(subpattern name_char = r"(?&name_start_char)|[\-\.0-9\u{b7}\u{300}-\u{36f}\u{203f}-\u{2040}]")]
#[logos(subpattern ncname = r"(?&name_start_char)(?&name_char)*")]
pub enum Token<'a> {
    #[regex(r"[0-9]+(\.[0-9]*)?|\.[0-9]+", number_literal)]
    Number(f64),
    #[regex(r#""[^"]*"|'[^']*'"#, string_literal)]
    Literal(&'a str),
    #[regex(r"(?&ncname)")]
    NCName(&'a str),

    #[token("!=")]
    NotEqual,
    #[token("$")]
    Dollar,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("*")]
    Asterisk,
    #[token("+")]
    Plus,
    #[token(",")]
    Comma,
    #[token("-")]
    Minus,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token(":")]
    Colon,
    #[token("::")]
    DoubleColon,
    #[token("<")]
    LessThan,
    #[token("<=")]
    LessThanEqual,
    #[token("=")]
    Equal,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanEqual,
    #[token("@")]
    At,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("|")]
    Pipe,
}

fn number_literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Result<f64, ()> {
    lex.slice().parse().map_err(|_| ())
}

fn string_literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[1..slice.len() - 1]
}

impl Token<'_> {
    /// A short human readable rendering for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Literal(s) => format!("literal {:?}", s),
            Token::NCName(name) => format!("name {:?}", name),
            Token::NotEqual => "'!='".to_string(),
            Token::Dollar => "'$'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Asterisk => "'*'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::DotDot => "'..'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::DoubleSlash => "'//'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::DoubleColon => "'::'".to_string(),
            Token::LessThan => "'<'".to_string(),
            Token::LessThanEqual => "'<='".to_string(),
            Token::Equal => "'='".to_string(),
            Token::GreaterThan => "'>'".to_string(),
            Token::GreaterThanEqual => "'>='".to_string(),
            Token::At => "'@'".to_string(),
            Token::LeftBracket => "'['".to_string(),
            Token::RightBracket => "']'".to_string(),
            Token::Pipe => "'|'".to_string(),
        }
    }
}

/// Lex the whole input up front; the parser needs two tokens of lookahead
/// for the name disambiguation rules.
pub(crate) fn tokenize(input: &str) -> Result<Vec<(Token<'_>, Span)>, ParserError> {
    let mut tokens = Vec::new();
    for (token, range) in Token::lexer(input).spanned() {
        let span = Span::new(range.start, range.end);
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(ParserError::InvalidToken { span }),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token<'_>> {
        tokenize(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_names_and_operators() {
        assert_eq!(
            kinds("a-b div 2"),
            vec![Token::NCName("a-b"), Token::NCName("div"), Token::Number(2.0)]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds(".5 1. 10"),
            vec![Token::Number(0.5), Token::Number(1.0), Token::Number(10.0)]
        );
    }

    #[test]
    fn test_dots() {
        assert_eq!(
            kinds("../."),
            vec![Token::DotDot, Token::Slash, Token::Dot]
        );
    }

    #[test]
    fn test_axis_and_qname() {
        assert_eq!(
            kinds("child::x:y"),
            vec![
                Token::NCName("child"),
                Token::DoubleColon,
                Token::NCName("x"),
                Token::Colon,
                Token::NCName("y")
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#"'a"b' "c'd""#),
            vec![Token::Literal("a\"b"), Token::Literal("c'd")]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("a != b").unwrap();
        assert_eq!(tokens[1].1, Span::new(2, 4));
    }

    #[test]
    fn test_invalid_token() {
        assert!(matches!(
            tokenize("a # b"),
            Err(ParserError::InvalidToken { .. })
        ));
    }
}
