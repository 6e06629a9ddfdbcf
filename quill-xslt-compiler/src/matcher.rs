//! Template rule selection.
//!
//! The rules of a mode are compiled into one dispatcher function per mode:
//! a chain of conditionals on the kind of the candidate node, then on the
//! names that rules test for, then on each rule's pattern in order of
//! preference. The built-in rule for the node kind ends each
//! chain.

use ahash::HashMap;
use ahash::HashMapExt;
use quill_name::QName;
use quill_qil::{QilNodeId, QilNodeType, XmlQueryType};
use quill_xpath_ast::ast::{KindTest, NameTest, NodeTest};
use quill_xpath_ast::pattern::{MatchKind, PathPattern, PatternRoot};
use quill_xpath_ast::Pattern;
use quill_xslt_ast::{ErrorCode, NodeId, StylesheetId};
use rust_decimal::Decimal;

use crate::generator::{Dispatcher, Focus, Generator};
use crate::priority::{default_priority, explicit_priority};

/// One alternative of a template's match pattern.
#[derive(Debug, Clone)]
pub(crate) struct MatchRule {
    pub(crate) template: NodeId,
    pub(crate) alternative: usize,
    pub(crate) path: PathPattern,
    pub(crate) priority: Decimal,
    pub(crate) import_precedence: i32,
    pub(crate) order: i32,
}

impl MatchRule {
    fn fixed_name(&self) -> Option<&QName> {
        self.path.last_step().and_then(|step| step.fixed_name())
    }
}

/// Sort rules so the preferred rule comes first: higher import
/// precedence, then higher priority, then the later declaration. The
/// alternatives of one template keep their order.
pub(crate) fn sort_rules(rules: &mut [MatchRule]) {
    rules.sort_by(|a, b| {
        b.import_precedence
            .cmp(&a.import_precedence)
            .then(b.priority.cmp(&a.priority))
            .then(b.order.cmp(&a.order))
    });
}

const KINDS: [(MatchKind, XmlQueryType); 6] = [
    (MatchKind::Element, XmlQueryType::ELEMENT),
    (MatchKind::Text, XmlQueryType::TEXT),
    (MatchKind::Attribute, XmlQueryType::ATTRIBUTE),
    (MatchKind::Document, XmlQueryType::DOCUMENT),
    (MatchKind::Comment, XmlQueryType::COMMENT),
    (MatchKind::ProcessingInstruction, XmlQueryType::PI),
];

impl Generator<'_> {
    /// The match pattern of a template, parsed and checked once.
    pub(crate) fn match_pattern(&mut self, template: NodeId) -> Option<Pattern> {
        if let Some(pattern) = self.match_patterns.get(&template) {
            return pattern.clone();
        }
        let program = self.program;
        let pattern = match &program.ast[template].arg {
            Some(text) => self.parse_pattern(text, template),
            None => None,
        };
        self.match_patterns.insert(template, pattern.clone());
        pattern
    }

    /// Parse a pattern in the namespace scope of node `id`, reporting
    /// errors.
    pub(crate) fn parse_pattern(&mut self, text: &str, id: NodeId) -> Option<Pattern> {
        let program = self.program;
        let namespaces = &program.ast[id].namespaces;
        match Pattern::parse(text, namespaces, self.settings.max_expression_depth) {
            Ok(pattern) => Some(pattern),
            Err(error) => {
                let code = if error.is_too_complex() {
                    ErrorCode::QUILL0001
                } else {
                    ErrorCode::XTSE0340
                };
                self.report(id, code, format!("invalid pattern '{}': {}", text, error));
                None
            }
        }
    }

    /// Every rule of `mode` in the given import levels, best first.
    pub(crate) fn mode_rules(
        &mut self,
        levels: &[StylesheetId],
        mode: Option<&QName>,
    ) -> Vec<MatchRule> {
        let program = self.program;
        let mut rules = Vec::new();
        for level in levels {
            for template in program.stylesheet(*level).mode(mode) {
                let Some(info) = program.ast[*template].template() else {
                    continue;
                };
                let Some(pattern) = self.match_pattern(*template) else {
                    continue;
                };
                for (alternative, (path, default)) in default_priority(&pattern).enumerate() {
                    rules.push(MatchRule {
                        template: *template,
                        alternative,
                        path: path.clone(),
                        priority: info.priority.map(explicit_priority).unwrap_or(default),
                        import_precedence: info.import_precedence,
                        order: info.order,
                    });
                }
            }
        }
        sort_rules(&mut rules);
        rules
    }

    /// The body of a dispatcher: choose the first rule matching the
    /// current node and invoke its template.
    pub(crate) fn dispatch_body(
        &mut self,
        rules: &[MatchRule],
        dispatcher: &Dispatcher,
        mode: Option<&QName>,
    ) -> QilNodeId {
        let candidate = self.current();
        // namespace nodes have no built-in rule
        let mut result = self.g.empty();
        for (kind, ty) in KINDS.iter().rev() {
            let bucket = rules
                .iter()
                .filter(|rule| rule.path.match_kinds().contains(kind))
                .collect::<Vec<_>>();
            let branch = self.kind_branch(*kind, &bucket, candidate, dispatcher, mode);
            let test = self.g.is_type(candidate, *ty);
            result = self.g.conditional(test, branch, result);
        }
        result
    }

    fn kind_branch(
        &mut self,
        kind: MatchKind,
        rules: &[&MatchRule],
        candidate: QilNodeId,
        dispatcher: &Dispatcher,
        mode: Option<&QName>,
    ) -> QilNodeId {
        let mut names: Vec<&QName> = Vec::new();
        if matches!(kind, MatchKind::Element | MatchKind::Attribute) {
            for rule in rules {
                if let Some(name) = rule.fixed_name() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        let unnamed = rules
            .iter()
            .filter(|rule| rule.fixed_name().is_none())
            .copied()
            .collect::<Vec<_>>();
        let mut result = self.rule_chain(kind, &unnamed, false, candidate, dispatcher, mode);
        for name in names.iter().rev() {
            let named = rules
                .iter()
                .filter(|rule| rule.fixed_name().map_or(true, |fixed| fixed == *name))
                .copied()
                .collect::<Vec<_>>();
            let chain = self.rule_chain(kind, &named, true, candidate, dispatcher, mode);
            let name_of = self.g.node_property(QilNodeType::NameOf, candidate);
            let literal = self.g.literal_qname((*name).clone());
            let test = self.g.eq(name_of, literal);
            result = self.g.conditional(test, chain, result);
        }
        result
    }

    fn rule_chain(
        &mut self,
        kind: MatchKind,
        rules: &[&MatchRule],
        name_known: bool,
        candidate: QilNodeId,
        dispatcher: &Dispatcher,
        mode: Option<&QName>,
    ) -> QilNodeId {
        let mut result = self.builtin_rule(kind, candidate, mode);
        for rule in rules.iter().rev() {
            let focus = self.focus;
            let action = self.invoke_template(rule.template, focus, &dispatcher.params);
            result = match self.rule_test(rule, candidate, name_known) {
                Some(test) => self.g.conditional(test, action, result),
                None => action,
            };
        }
        result
    }

    /// The test of a rule against a candidate already known to be of the
    /// rule's node kind, or `None` if that is all the rule requires.
    fn rule_test(
        &mut self,
        rule: &MatchRule,
        candidate: QilNodeId,
        name_known: bool,
    ) -> Option<QilNodeId> {
        let path = &rule.path;
        match &path.root {
            PatternRoot::Root if path.steps.is_empty() => return None,
            PatternRoot::Relative
                if path.steps.len() == 1 && path.steps[0].predicates.is_empty() =>
            {
                let implied = match &path.steps[0].node_test {
                    NodeTest::Kind(KindTest::ProcessingInstruction(Some(_))) => false,
                    NodeTest::Kind(_) => true,
                    NodeTest::Name(NameTest::Any) => true,
                    NodeTest::Name(NameTest::Name(_)) => name_known,
                    NodeTest::Name(NameTest::Namespace(_)) => false,
                };
                if implied {
                    return None;
                }
            }
            _ => {}
        }
        Some(self.cached_pattern_test(rule, candidate))
    }

    /// Pattern tests are generated once against a placeholder and copied
    /// into every dispatcher that needs them.
    fn cached_pattern_test(&mut self, rule: &MatchRule, candidate: QilNodeId) -> QilNodeId {
        let key = (rule.template, rule.alternative);
        let (placeholder, test) = match self.pattern_tests.get(&key) {
            Some(cached) => *cached,
            None => {
                let placeholder = self.g.parameter("candidate", XmlQueryType::NODE);
                let test = self.path_pattern_test(&rule.path, placeholder, rule.template);
                self.pattern_tests.insert(key, (placeholder, test));
                (placeholder, test)
            }
        };
        let mut substitutions = HashMap::new();
        substitutions.insert(placeholder, candidate);
        self.g.clone_with_substitution(test, &substitutions)
    }

    /// What XSLT does for a node no template matches.
    fn builtin_rule(
        &mut self,
        kind: MatchKind,
        candidate: QilNodeId,
        mode: Option<&QName>,
    ) -> QilNodeId {
        match kind {
            MatchKind::Element | MatchKind::Document => {
                let dispatcher = self.dispatcher(mode, &[]);
                let children = self.g.axis(QilNodeType::Children, candidate);
                self.apply_to_each(&dispatcher, children, None, &[])
            }
            MatchKind::Text | MatchKind::Attribute => {
                let value = self.g.node_value(candidate);
                self.g.text_ctor(value)
            }
            MatchKind::Comment | MatchKind::ProcessingInstruction => self.g.empty(),
        }
    }

    /// Invoke `dispatcher` for each node of `nodes`, sorted by `sort` if
    /// given, with the node as current node.
    pub(crate) fn apply_to_each(
        &mut self,
        dispatcher: &Dispatcher,
        nodes: QilNodeId,
        sort: Option<&[NodeId]>,
        params: &[QilNodeId],
    ) -> QilNodeId {
        let nodes = match sort {
            Some(sorts) if !sorts.is_empty() => self.sorted(nodes, sorts),
            _ => nodes,
        };
        let sequence = if dispatcher.focus.last.is_some() {
            Some(self.bind(nodes, "nodes"))
        } else {
            None
        };
        let node = self.iterate(sequence.unwrap_or(nodes), "node");
        let position = self.g.position_of(node);
        let last = match sequence {
            Some(sequence) => self.g.length(sequence),
            None => self.g.literal_double(0.0),
        };
        let mut args = self.focus_actuals(&dispatcher.focus, Focus::new(node, position, last));
        args.extend_from_slice(params);
        let call = self.g.invoke(dispatcher.function, args);
        let result = self.g.loop_(node, call);
        match sequence {
            Some(sequence) => self.g.loop_(sequence, result),
            None => result,
        }
    }

    /// Invoke a template with the given focus. Parameters not in `passed`
    /// get their default value.
    pub(crate) fn invoke_template(
        &mut self,
        template: NodeId,
        actual: Focus,
        passed: &[(QName, QilNodeId)],
    ) -> QilNodeId {
        let Some(callee) = self.templates.get(&template).cloned() else {
            return self.internal_error("template without a function");
        };
        let mut substitutions = HashMap::new();
        let mut args = Vec::new();
        let focus_args = self.focus_actuals(&callee.focus, actual);
        for (formal, arg) in callee.focus.parts().into_iter().zip(focus_args) {
            substitutions.insert(formal, arg);
            args.push(arg);
        }
        for (index, param) in callee.params.iter().enumerate() {
            let ty = self.g.xml_type(param.formal);
            let arg = match passed.iter().find(|(name, _)| *name == param.name) {
                Some((_, value)) => self.coerce(*value, ty),
                None => self.default_value(template, index, &substitutions),
            };
            substitutions.insert(param.formal, arg);
            args.push(arg);
        }
        self.g.invoke(callee.function, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_name::Namespaces;
    use quill_xpath_ast::DEFAULT_MAX_DEPTH;
    use quill_xslt_ast::{Ast, Location, NsList, XslNode, XslNodeType, XslVersion};
    use rust_decimal_macros::dec;

    fn rule(template: &str, priority: Decimal, import_precedence: i32, order: i32) -> MatchRule {
        let pattern = Pattern::parse(template, &Namespaces::default(), DEFAULT_MAX_DEPTH).unwrap();
        let mut ast = Ast::new();
        let node = XslNode::new(
            XslNodeType::Template,
            Location::default(),
            NsList::new(),
            XslVersion::V1,
        );
        MatchRule {
            template: ast.add(node),
            alternative: 0,
            path: pattern.alternatives[0].clone(),
            priority,
            import_precedence,
            order,
        }
    }

    fn names(rules: &[MatchRule]) -> Vec<String> {
        rules
            .iter()
            .map(|rule| rule.fixed_name().map(|name| name.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_later_rule_wins_tie() {
        let mut rules = vec![rule("a", dec!(0), 1, 1), rule("b", dec!(0), 1, 2)];
        sort_rules(&mut rules);
        assert_eq!(names(&rules), vec!["b", "a"]);
    }

    #[test]
    fn test_priority_beats_order() {
        let mut rules = vec![rule("b", dec!(0), 1, 2), rule("a", dec!(0.5), 1, 1)];
        sort_rules(&mut rules);
        assert_eq!(names(&rules), vec!["a", "b"]);
    }

    #[test]
    fn test_import_precedence_beats_priority() {
        let mut rules = vec![rule("a", dec!(10), 1, 1), rule("b", dec!(-0.5), 2, 0)];
        sort_rules(&mut rules);
        assert_eq!(names(&rules), vec!["b", "a"]);
    }
}
