use quill_name::NamespaceLookup;

use crate::ast::{Axis, Expr, KindTest, NameTest, NodeTest};
use crate::error::ParserError;
use crate::parser::parse_pattern;

/// An XSLT 1.0 match pattern: one or more location path patterns joined
/// by `|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Pattern {
    pub alternatives: Vec<PathPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PathPattern {
    pub root: PatternRoot,
    /// Steps in document order; the last step tests the candidate node.
    pub steps: Vec<StepPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PatternRoot {
    /// No anchoring; the first step may match at any depth.
    Relative,
    /// Anchored at the document node. With no steps this is the `/`
    /// pattern.
    Root,
    /// Anchored at the nodes selected by an `id()` or `key()` call.
    IdKey(Box<Expr>),
}

/// How a step relates to the step (or root) before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Connector {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StepPattern {
    pub connector: Connector,
    /// Either `child` or `attribute`.
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expr>,
}

/// The kinds of node a pattern step can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchKind {
    Element,
    Attribute,
    Text,
    Document,
    Comment,
    ProcessingInstruction,
}

impl Pattern {
    pub fn parse(
        input: &str,
        namespaces: &dyn NamespaceLookup,
        max_depth: usize,
    ) -> Result<Pattern, ParserError> {
        parse_pattern(input, namespaces, max_depth)
    }
}

impl PathPattern {
    pub fn last_step(&self) -> Option<&StepPattern> {
        self.steps.last()
    }

    /// The node kinds a candidate can have for this alternative to match.
    pub fn match_kinds(&self) -> Vec<MatchKind> {
        match self.last_step() {
            Some(step) => step.match_kinds(),
            None => match self.root {
                PatternRoot::Root => vec![MatchKind::Document],
                // id() and key() can return any node
                _ => vec![
                    MatchKind::Element,
                    MatchKind::Attribute,
                    MatchKind::Text,
                    MatchKind::Comment,
                    MatchKind::ProcessingInstruction,
                ],
            },
        }
    }
}

impl StepPattern {
    pub fn match_kinds(&self) -> Vec<MatchKind> {
        let attribute = self.axis == Axis::Attribute;
        match &self.node_test {
            NodeTest::Name(_) if attribute => vec![MatchKind::Attribute],
            NodeTest::Name(_) => vec![MatchKind::Element],
            NodeTest::Kind(KindTest::Node) if attribute => vec![MatchKind::Attribute],
            NodeTest::Kind(KindTest::Node) => vec![
                MatchKind::Element,
                MatchKind::Text,
                MatchKind::Comment,
                MatchKind::ProcessingInstruction,
            ],
            // the attribute axis never contains these
            NodeTest::Kind(_) if attribute => Vec::new(),
            NodeTest::Kind(KindTest::Text) => vec![MatchKind::Text],
            NodeTest::Kind(KindTest::Comment) => vec![MatchKind::Comment],
            NodeTest::Kind(KindTest::ProcessingInstruction(_)) => {
                vec![MatchKind::ProcessingInstruction]
            }
        }
    }

    /// The exact name this step tests, if it is a plain name test.
    pub fn fixed_name(&self) -> Option<&quill_name::QName> {
        match &self.node_test {
            NodeTest::Name(NameTest::Name(name)) => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DEFAULT_MAX_DEPTH;
    use quill_name::{Namespaces, QName};

    fn parse(input: &str) -> Pattern {
        let mut namespaces = Namespaces::default();
        namespaces.add("ex", "urn:example");
        Pattern::parse(input, &namespaces, DEFAULT_MAX_DEPTH).unwrap()
    }

    fn parse_err(input: &str) -> ParserError {
        let namespaces = Namespaces::default();
        Pattern::parse(input, &namespaces, DEFAULT_MAX_DEPTH).unwrap_err()
    }

    #[test]
    fn test_root_pattern() {
        let pattern = parse("/");
        assert_eq!(pattern.alternatives.len(), 1);
        assert_eq!(pattern.alternatives[0].root, PatternRoot::Root);
        assert!(pattern.alternatives[0].steps.is_empty());
        assert_eq!(
            pattern.alternatives[0].match_kinds(),
            vec![MatchKind::Document]
        );
    }

    #[test]
    fn test_union_alternatives() {
        let pattern = parse("a | ex:b | @c");
        assert_eq!(pattern.alternatives.len(), 3);
        assert_eq!(
            pattern.alternatives[1].steps[0].fixed_name(),
            Some(&QName::uri_qualified("urn:example", "b"))
        );
        assert_eq!(
            pattern.alternatives[2].match_kinds(),
            vec![MatchKind::Attribute]
        );
    }

    #[test]
    fn test_connectors() {
        let pattern = parse("a//b/c");
        let steps = &pattern.alternatives[0].steps;
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].connector, Connector::Descendant);
        assert_eq!(steps[2].connector, Connector::Child);
    }

    #[test]
    fn test_id_key_root() {
        let pattern = parse("key('k', 'v')//item");
        let alternative = &pattern.alternatives[0];
        assert!(matches!(alternative.root, PatternRoot::IdKey(_)));
        assert_eq!(alternative.steps[0].connector, Connector::Descendant);
    }

    #[test]
    fn test_node_kinds() {
        assert_eq!(
            parse("node()").alternatives[0].match_kinds(),
            vec![
                MatchKind::Element,
                MatchKind::Text,
                MatchKind::Comment,
                MatchKind::ProcessingInstruction
            ]
        );
        assert_eq!(
            parse("processing-instruction()").alternatives[0].match_kinds(),
            vec![MatchKind::ProcessingInstruction]
        );
    }

    #[test]
    fn test_disallowed_axis() {
        assert!(matches!(
            parse_err("ancestor::a"),
            ParserError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_id_requires_literal() {
        assert!(matches!(
            parse_err("id(@ref)"),
            ParserError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_expression_is_not_pattern() {
        assert!(parse_err("1 + 2").span().start == 0);
    }
}
