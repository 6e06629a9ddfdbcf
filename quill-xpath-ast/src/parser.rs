use std::str::FromStr;

use ordered_float::OrderedFloat;
use quill_name::{NamespaceLookup, QName, XML_NAMESPACE};

use crate::ast::{
    Axis, BinaryExpr, BinaryOperator, Expr, FilterExpr, FunctionCall, KindTest, NameTest,
    NodeTest, PathExpr, PathRoot, Step,
};
use crate::error::ParserError;
use crate::lexer::{tokenize, Token};
use crate::pattern::{Connector, PathPattern, Pattern, PatternRoot, StepPattern};
use crate::span::Span;

/// Default bound on expression nesting. Every parenthesized expression,
/// predicate, function argument and chained operator counts as one level.
pub const DEFAULT_MAX_DEPTH: usize = 256;

type Result<T> = std::result::Result<T, ParserError>;

/// A recursive descent parser for XPath 1.0 expressions and XSLT 1.0
/// match patterns.
///
/// Prefixes are resolved while parsing; unprefixed names in node tests,
/// variable references and function names are in no namespace.
pub struct XPathParser<'a> {
    input: &'a str,
    tokens: Vec<(Token<'a>, Span)>,
    position: usize,
    namespaces: &'a dyn NamespaceLookup,
    depth: usize,
    max_depth: usize,
}

pub fn parse_expression(
    input: &str,
    namespaces: &dyn NamespaceLookup,
    max_depth: usize,
) -> Result<Expr> {
    XPathParser::new(input, namespaces)?
        .with_max_depth(max_depth)
        .expression()
}

pub fn parse_pattern(
    input: &str,
    namespaces: &dyn NamespaceLookup,
    max_depth: usize,
) -> Result<Pattern> {
    XPathParser::new(input, namespaces)?
        .with_max_depth(max_depth)
        .pattern()
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "node" | "text" | "comment" | "processing-instruction")
}

impl<'a> XPathParser<'a> {
    pub fn new(input: &'a str, namespaces: &'a dyn NamespaceLookup) -> Result<Self> {
        Ok(Self {
            input,
            tokens: tokenize(input)?,
            position: 0,
            namespaces,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        })
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn expression(mut self) -> Result<Expr> {
        if self.tokens.is_empty() {
            return Err(ParserError::Empty);
        }
        let expr = self.expr()?;
        self.expect_end()?;
        Ok(expr)
    }

    pub fn pattern(mut self) -> Result<Pattern> {
        if self.tokens.is_empty() {
            return Err(ParserError::Empty);
        }
        let mut alternatives = vec![self.path_pattern()?];
        while self.peek() == Some(Token::Pipe) {
            self.position += 1;
            alternatives.push(self.path_pattern()?);
        }
        self.expect_end()?;
        Ok(Pattern { alternatives })
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<Token<'a>> {
        self.tokens
            .get(self.position + offset)
            .map(|(token, _)| token.clone())
    }

    fn span(&self) -> Span {
        match self.tokens.get(self.position) {
            Some((_, span)) => *span,
            None => Span::new(self.input.len(), self.input.len()),
        }
    }

    fn advance(&mut self) -> Option<(Token<'a>, Span)> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn unexpected(&self) -> ParserError {
        match self.tokens.get(self.position) {
            Some((token, span)) => ParserError::Unexpected {
                span: *span,
                found: token.describe(),
            },
            None => ParserError::UnexpectedEnd { span: self.span() },
        }
    }

    fn expect(&mut self, expected: Token<'a>) -> Result<Span> {
        if self.peek().as_ref() == Some(&expected) {
            let span = self.span();
            self.position += 1;
            Ok(span)
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.position < self.tokens.len() {
            Err(self.unexpected())
        } else {
            Ok(())
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParserError::TooComplex { span: self.span() });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn resolve_prefix(&self, prefix: &str, span: Span) -> Result<String> {
        if prefix == "xml" {
            return Ok(XML_NAMESPACE.to_string());
        }
        self.namespaces
            .by_prefix(prefix)
            .map(|uri| uri.to_string())
            .ok_or_else(|| ParserError::UnknownPrefix {
                span,
                prefix: prefix.to_string(),
            })
    }

    fn expr(&mut self) -> Result<Expr> {
        self.enter()?;
        let result = self.or_expr();
        self.leave();
        result
    }

    // Operators are only recognized after a complete operand, which is
    // exactly where XPath's lexical disambiguation rules treat `*` as
    // multiplication and NCNames as operator names.
    fn binary_level(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr>,
        operator: fn(&Token<'a>) -> Option<BinaryOperator>,
    ) -> Result<Expr> {
        let mut left = operand(self)?;
        let mut chained = 0;
        let result = loop {
            let found = match self.peek() {
                Some(token) => operator(&token),
                None => None,
            };
            let Some(found) = found else {
                break Ok(left);
            };
            self.position += 1;
            chained += 1;
            if let Err(e) = self.enter() {
                break Err(e);
            }
            let right = match operand(self) {
                Ok(right) => right,
                Err(e) => break Err(e),
            };
            left = Expr::Binary(BinaryExpr {
                operator: found,
                left: Box::new(left),
                right: Box::new(right),
            });
        };
        self.depth -= chained;
        result
    }

    fn or_expr(&mut self) -> Result<Expr> {
        self.binary_level(Self::and_expr, |token| match token {
            Token::NCName("or") => Some(BinaryOperator::Or),
            _ => None,
        })
    }

    fn and_expr(&mut self) -> Result<Expr> {
        self.binary_level(Self::equality_expr, |token| match token {
            Token::NCName("and") => Some(BinaryOperator::And),
            _ => None,
        })
    }

    fn equality_expr(&mut self) -> Result<Expr> {
        self.binary_level(Self::relational_expr, |token| match token {
            Token::Equal => Some(BinaryOperator::Equal),
            Token::NotEqual => Some(BinaryOperator::NotEqual),
            _ => None,
        })
    }

    fn relational_expr(&mut self) -> Result<Expr> {
        self.binary_level(Self::additive_expr, |token| match token {
            Token::LessThan => Some(BinaryOperator::LessThan),
            Token::LessThanEqual => Some(BinaryOperator::LessThanEqual),
            Token::GreaterThan => Some(BinaryOperator::GreaterThan),
            Token::GreaterThanEqual => Some(BinaryOperator::GreaterThanEqual),
            _ => None,
        })
    }

    fn additive_expr(&mut self) -> Result<Expr> {
        self.binary_level(Self::multiplicative_expr, |token| match token {
            Token::Plus => Some(BinaryOperator::Add),
            Token::Minus => Some(BinaryOperator::Subtract),
            _ => None,
        })
    }

    fn multiplicative_expr(&mut self) -> Result<Expr> {
        self.binary_level(Self::unary_expr, |token| match token {
            Token::Asterisk => Some(BinaryOperator::Multiply),
            Token::NCName("div") => Some(BinaryOperator::Divide),
            Token::NCName("mod") => Some(BinaryOperator::Modulo),
            _ => None,
        })
    }

    fn unary_expr(&mut self) -> Result<Expr> {
        let mut negations = 0;
        while self.peek() == Some(Token::Minus) {
            self.position += 1;
            negations += 1;
        }
        if self.depth + negations > self.max_depth {
            return Err(ParserError::TooComplex { span: self.span() });
        }
        let mut expr = self.union_expr()?;
        for _ in 0..negations {
            expr = Expr::Negate(Box::new(expr));
        }
        Ok(expr)
    }

    fn union_expr(&mut self) -> Result<Expr> {
        self.binary_level(Self::path_expr, |token| match token {
            Token::Pipe => Some(BinaryOperator::Union),
            _ => None,
        })
    }

    fn at_function_call(&self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::NCName(name)), Some(Token::LeftParen)) => !is_node_type(name),
            (Some(Token::NCName(_)), Some(Token::Colon)) => matches!(
                (self.peek_at(2), self.peek_at(3)),
                (Some(Token::NCName(_)), Some(Token::LeftParen))
            ),
            _ => false,
        }
    }

    fn at_filter_start(&self) -> bool {
        match self.peek() {
            Some(Token::Dollar | Token::LeftParen | Token::Literal(_) | Token::Number(_)) => true,
            Some(Token::NCName(_)) => self.at_function_call(),
            _ => false,
        }
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Asterisk | Token::NCName(_))
        )
    }

    fn path_expr(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Slash) => {
                self.position += 1;
                let steps = if self.at_step_start() {
                    self.relative_location_path(Vec::new())?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path(PathExpr {
                    root: PathRoot::Absolute,
                    steps,
                }))
            }
            Some(Token::DoubleSlash) => {
                self.position += 1;
                let steps = self.relative_location_path(vec![Step::descendant_or_self_node()])?;
                Ok(Expr::Path(PathExpr {
                    root: PathRoot::Absolute,
                    steps,
                }))
            }
            _ if self.at_filter_start() => {
                let primary = self.filter_expr()?;
                if matches!(self.peek(), Some(Token::Slash | Token::DoubleSlash)) {
                    let mut steps = Vec::new();
                    self.continue_path(&mut steps)?;
                    Ok(Expr::Path(PathExpr {
                        root: PathRoot::Expr(Box::new(primary)),
                        steps,
                    }))
                } else {
                    Ok(primary)
                }
            }
            _ if self.at_step_start() => {
                let steps = self.relative_location_path(Vec::new())?;
                Ok(Expr::Path(PathExpr {
                    root: PathRoot::Relative,
                    steps,
                }))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn relative_location_path(&mut self, mut steps: Vec<Step>) -> Result<Vec<Step>> {
        steps.push(self.step()?);
        self.continue_path(&mut steps)?;
        Ok(steps)
    }

    fn continue_path(&mut self, steps: &mut Vec<Step>) -> Result<()> {
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.position += 1;
                    steps.push(self.step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.position += 1;
                    steps.push(Step::descendant_or_self_node());
                    steps.push(self.step()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn step(&mut self) -> Result<Step> {
        match self.peek() {
            Some(Token::Dot) => {
                self.position += 1;
                return Ok(Step {
                    axis: Axis::Self_,
                    node_test: NodeTest::Kind(KindTest::Node),
                    predicates: Vec::new(),
                });
            }
            Some(Token::DotDot) => {
                self.position += 1;
                return Ok(Step {
                    axis: Axis::Parent,
                    node_test: NodeTest::Kind(KindTest::Node),
                    predicates: Vec::new(),
                });
            }
            _ => {}
        }
        let axis = self.axis_specifier()?;
        let node_test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(Step {
            axis,
            node_test,
            predicates,
        })
    }

    fn axis_specifier(&mut self) -> Result<Axis> {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::At), _) => {
                self.position += 1;
                Ok(Axis::Attribute)
            }
            (Some(Token::NCName(name)), Some(Token::DoubleColon)) => {
                let span = self.span();
                let axis = Axis::from_str(name).map_err(|_| ParserError::UnknownAxis {
                    span,
                    name: name.to_string(),
                })?;
                self.position += 2;
                Ok(axis)
            }
            _ => Ok(Axis::Child),
        }
    }

    fn node_test(&mut self) -> Result<NodeTest> {
        let unexpected = self.unexpected();
        match self.advance() {
            Some((Token::Asterisk, _)) => Ok(NodeTest::Name(NameTest::Any)),
            Some((Token::NCName(name), span)) => {
                if is_node_type(name) && self.peek() == Some(Token::LeftParen) {
                    self.position += 1;
                    let kind_test = match name {
                        "node" => KindTest::Node,
                        "text" => KindTest::Text,
                        "comment" => KindTest::Comment,
                        _ => match self.peek() {
                            Some(Token::Literal(target)) => {
                                self.position += 1;
                                KindTest::ProcessingInstruction(Some(target.trim().to_string()))
                            }
                            _ => KindTest::ProcessingInstruction(None),
                        },
                    };
                    self.expect(Token::RightParen)?;
                    return Ok(NodeTest::Kind(kind_test));
                }
                if self.peek() == Some(Token::Colon) {
                    self.position += 1;
                    let namespace = self.resolve_prefix(name, span)?;
                    let unexpected = self.unexpected();
                    return match self.advance() {
                        Some((Token::Asterisk, _)) => {
                            Ok(NodeTest::Name(NameTest::Namespace(namespace)))
                        }
                        Some((Token::NCName(local), _)) => {
                            Ok(NodeTest::Name(NameTest::Name(QName::new(
                                local.to_string(),
                                Some(namespace),
                                Some(name.to_string()),
                            ))))
                        }
                        _ => Err(unexpected),
                    };
                }
                Ok(NodeTest::Name(NameTest::Name(QName::unprefixed(name))))
            }
            _ => Err(unexpected),
        }
    }

    fn predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.peek() == Some(Token::LeftBracket) {
            self.position += 1;
            predicates.push(self.expr()?);
            self.expect(Token::RightBracket)?;
        }
        Ok(predicates)
    }

    fn filter_expr(&mut self) -> Result<Expr> {
        let primary = self.primary_expr()?;
        let predicates = self.predicates()?;
        if predicates.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Filter(FilterExpr {
                primary: Box::new(primary),
                predicates,
            }))
        }
    }

    fn qname(&mut self) -> Result<QName> {
        let unexpected = self.unexpected();
        match self.advance() {
            Some((Token::NCName(first), span)) => {
                if self.peek() == Some(Token::Colon) {
                    self.position += 1;
                    let unexpected = self.unexpected();
                    match self.advance() {
                        Some((Token::NCName(local), _)) => {
                            let namespace = self.resolve_prefix(first, span)?;
                            Ok(QName::new(
                                local.to_string(),
                                Some(namespace),
                                Some(first.to_string()),
                            ))
                        }
                        _ => Err(unexpected),
                    }
                } else {
                    Ok(QName::unprefixed(first))
                }
            }
            _ => Err(unexpected),
        }
    }

    fn primary_expr(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Dollar) => {
                self.position += 1;
                Ok(Expr::VarRef(self.qname()?))
            }
            Some(Token::LeftParen) => {
                self.position += 1;
                let expr = self.expr()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            Some(Token::Literal(text)) => {
                self.position += 1;
                Ok(Expr::Literal(text.to_string()))
            }
            Some(Token::Number(n)) => {
                self.position += 1;
                Ok(Expr::Number(OrderedFloat(n)))
            }
            Some(Token::NCName(_)) => self.function_call(),
            _ => Err(self.unexpected()),
        }
    }

    fn function_call(&mut self) -> Result<Expr> {
        let name = self.qname()?;
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(Token::RightParen) {
            loop {
                args.push(self.expr()?);
                if self.peek() == Some(Token::Comma) {
                    self.position += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RightParen)?;
        Ok(Expr::FunctionCall(FunctionCall { name, args }))
    }

    fn path_pattern(&mut self) -> Result<PathPattern> {
        self.enter()?;
        let result = self.path_pattern_inner();
        self.leave();
        result
    }

    fn path_pattern_inner(&mut self) -> Result<PathPattern> {
        match self.peek() {
            Some(Token::Slash) => {
                self.position += 1;
                let steps = if self.at_step_start() {
                    self.relative_path_pattern(Connector::Child)?
                } else {
                    Vec::new()
                };
                Ok(PathPattern {
                    root: PatternRoot::Root,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.position += 1;
                Ok(PathPattern {
                    root: PatternRoot::Root,
                    steps: self.relative_path_pattern(Connector::Descendant)?,
                })
            }
            Some(Token::NCName("id" | "key")) if self.peek_at(1) == Some(Token::LeftParen) => {
                let span = self.span();
                let call = self.function_call()?;
                check_id_key_call(&call, span)?;
                let steps = match self.peek() {
                    Some(Token::Slash) => {
                        self.position += 1;
                        self.relative_path_pattern(Connector::Child)?
                    }
                    Some(Token::DoubleSlash) => {
                        self.position += 1;
                        self.relative_path_pattern(Connector::Descendant)?
                    }
                    _ => Vec::new(),
                };
                Ok(PathPattern {
                    root: PatternRoot::IdKey(Box::new(call)),
                    steps,
                })
            }
            _ => Ok(PathPattern {
                root: PatternRoot::Relative,
                steps: self.relative_path_pattern(Connector::Child)?,
            }),
        }
    }

    fn relative_path_pattern(&mut self, first: Connector) -> Result<Vec<StepPattern>> {
        let mut steps = vec![self.step_pattern(first)?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.position += 1;
                    steps.push(self.step_pattern(Connector::Child)?);
                }
                Some(Token::DoubleSlash) => {
                    self.position += 1;
                    steps.push(self.step_pattern(Connector::Descendant)?);
                }
                _ => return Ok(steps),
            }
        }
    }

    fn step_pattern(&mut self, connector: Connector) -> Result<StepPattern> {
        let axis = self.axis_specifier()?;
        if !matches!(axis, Axis::Child | Axis::Attribute) {
            return Err(ParserError::InvalidPattern {
                span: self.span(),
                message: format!("the {} axis is not allowed in a pattern", axis),
            });
        }
        let node_test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(StepPattern {
            connector,
            axis,
            node_test,
            predicates,
        })
    }
}

fn check_id_key_call(call: &Expr, span: Span) -> Result<()> {
    let Expr::FunctionCall(call) = call else {
        return Err(ParserError::InvalidPattern {
            span,
            message: "expected id() or key()".to_string(),
        });
    };
    let arity = if call.name.local_name() == "id" { 1 } else { 2 };
    if call.args.len() != arity || !call.args.iter().all(|arg| matches!(arg, Expr::Literal(_))) {
        return Err(ParserError::InvalidPattern {
            span,
            message: format!(
                "{}() in a pattern takes {} literal argument(s)",
                call.name.local_name(),
                arity
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_name::Namespaces;

    fn parse(input: &str) -> Expr {
        let mut namespaces = Namespaces::default();
        namespaces.add("ex", "urn:example");
        parse_expression(input, &namespaces, DEFAULT_MAX_DEPTH).unwrap()
    }

    fn parse_err(input: &str) -> ParserError {
        let namespaces = Namespaces::default();
        parse_expression(input, &namespaces, DEFAULT_MAX_DEPTH).unwrap_err()
    }

    fn binary(operator: BinaryOperator, left: Expr, right: Expr) -> Expr {
        Expr::Binary(BinaryExpr {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn num(n: f64) -> Expr {
        Expr::Number(OrderedFloat(n))
    }

    fn child(name: &str) -> Step {
        Step {
            axis: Axis::Child,
            node_test: NodeTest::Name(NameTest::Name(QName::unprefixed(name))),
            predicates: Vec::new(),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("1 + 2 * 3"),
            binary(
                BinaryOperator::Add,
                num(1.0),
                binary(BinaryOperator::Multiply, num(2.0), num(3.0))
            )
        );
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(
            parse("8 - 4 - 2"),
            binary(
                BinaryOperator::Subtract,
                binary(BinaryOperator::Subtract, num(8.0), num(4.0)),
                num(2.0)
            )
        );
    }

    #[test]
    fn test_star_disambiguation() {
        let star = Expr::Path(PathExpr {
            root: PathRoot::Relative,
            steps: vec![Step {
                axis: Axis::Child,
                node_test: NodeTest::Name(NameTest::Any),
                predicates: Vec::new(),
            }],
        });
        assert_eq!(
            parse("* * *"),
            binary(BinaryOperator::Multiply, star.clone(), star)
        );
    }

    #[test]
    fn test_operator_names_as_element_names() {
        assert_eq!(
            parse("div div mod"),
            binary(
                BinaryOperator::Divide,
                Expr::Path(PathExpr {
                    root: PathRoot::Relative,
                    steps: vec![child("div")]
                }),
                Expr::Path(PathExpr {
                    root: PathRoot::Relative,
                    steps: vec![child("mod")]
                })
            )
        );
    }

    #[test]
    fn test_double_slash_expands() {
        assert_eq!(
            parse("//a"),
            Expr::Path(PathExpr {
                root: PathRoot::Absolute,
                steps: vec![Step::descendant_or_self_node(), child("a")]
            })
        );
    }

    #[test]
    fn test_root_only() {
        assert_eq!(
            parse("/"),
            Expr::Path(PathExpr {
                root: PathRoot::Absolute,
                steps: Vec::new()
            })
        );
    }

    #[test]
    fn test_filter_then_path() {
        let expr = parse("$doc[1]/a");
        match expr {
            Expr::Path(PathExpr {
                root: PathRoot::Expr(root),
                steps,
            }) => {
                assert!(matches!(*root, Expr::Filter(_)));
                assert_eq!(steps, vec![child("a")]);
            }
            _ => panic!("expected a path"),
        }
    }

    #[test]
    fn test_prefixed_names_resolve() {
        match parse("ex:f(@ex:a, ex:*)") {
            Expr::FunctionCall(call) => {
                assert_eq!(call.name.namespace(), Some("urn:example"));
                assert_eq!(call.args.len(), 2);
            }
            _ => panic!("expected a function call"),
        }
    }

    #[test]
    fn test_node_type_is_not_function() {
        match parse("text()") {
            Expr::Path(path) => {
                assert_eq!(path.steps[0].node_test, NodeTest::Kind(KindTest::Text))
            }
            _ => panic!("expected a path"),
        }
    }

    #[test]
    fn test_processing_instruction_target() {
        match parse("processing-instruction('xml-stylesheet')") {
            Expr::Path(path) => assert_eq!(
                path.steps[0].node_test,
                NodeTest::Kind(KindTest::ProcessingInstruction(Some(
                    "xml-stylesheet".to_string()
                )))
            ),
            _ => panic!("expected a path"),
        }
    }

    #[test]
    fn test_unknown_prefix() {
        assert!(matches!(
            parse_err("nope:a"),
            ParserError::UnknownPrefix { .. }
        ));
    }

    #[test]
    fn test_unknown_axis() {
        assert!(matches!(
            parse_err("sideways::a"),
            ParserError::UnknownAxis { .. }
        ));
    }

    #[test]
    fn test_trailing_input() {
        assert!(matches!(parse_err("1 2"), ParserError::Unexpected { .. }));
    }

    #[test]
    fn test_unclosed_paren() {
        assert!(matches!(
            parse_err("(1 + 2"),
            ParserError::UnexpectedEnd { .. }
        ));
    }

    #[test]
    fn test_deep_parentheses_too_complex() {
        let input = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        assert!(parse_err(&input).is_too_complex());
    }

    #[test]
    fn test_long_operator_chain_too_complex() {
        let input = vec!["1"; 400].join(" + ");
        assert!(parse_err(&input).is_too_complex());
    }

    #[test]
    fn test_moderate_nesting_is_fine() {
        let input = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse(&input), num(1.0));
    }
}
