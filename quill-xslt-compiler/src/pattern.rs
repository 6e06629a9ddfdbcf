// Pattern matching: a pattern becomes a boolean expression over a
// candidate node, testing the last step against the node itself and each
// earlier step against its parent or one of its ancestors.
use quill_qil::{ItemKinds, QilNodeId, QilNodeType, XmlQueryType};
use quill_xpath_ast::ast::{Axis, Expr, KindTest, NameTest, NodeTest};
use quill_xpath_ast::pattern::{Connector, PathPattern, PatternRoot, StepPattern};
use quill_xpath_ast::Pattern;
use quill_xslt_ast::{NodeId, XslFlags};

use crate::analyzer::expression_flags;
use crate::generator::{Context, Focus, Generator};

impl Generator<'_> {
    /// True when `candidate` matches any alternative of `pattern`.
    pub(crate) fn pattern_matches(
        &mut self,
        pattern: &Pattern,
        candidate: QilNodeId,
        id: NodeId,
    ) -> QilNodeId {
        let mut result: Option<QilNodeId> = None;
        for alternative in &pattern.alternatives {
            let test = self.path_pattern_test(alternative, candidate, id);
            result = Some(match result {
                Some(previous) => self.g.or(previous, test),
                None => test,
            });
        }
        match result {
            Some(result) => result,
            None => self.g.false_(),
        }
    }

    /// True when `candidate` matches one alternative. Inside predicates
    /// `current()` is the candidate.
    pub(crate) fn path_pattern_test(
        &mut self,
        path: &PathPattern,
        candidate: QilNodeId,
        id: NodeId,
    ) -> QilNodeId {
        let mut context = Context::new(Focus::default());
        context.xslt_current = Some(candidate);
        // patterns cannot refer to local variables, only to globals
        self.in_context(context, |this| this.steps_test(path, path.steps.len(), candidate, id))
    }

    /// Test `node` against the first `count` steps of `path` and its root.
    fn steps_test(
        &mut self,
        path: &PathPattern,
        count: usize,
        node: QilNodeId,
        id: NodeId,
    ) -> QilNodeId {
        if count == 0 {
            return match &path.root {
                PatternRoot::Root => self.g.is_type(node, XmlQueryType::DOCUMENT),
                PatternRoot::Relative => self.g.true_(),
                PatternRoot::IdKey(expr) => self.id_key_test(expr, node, id),
            };
        }
        let step = &path.steps[count - 1];
        let own = self.step_test(step, node, id);
        if count == 1 && path.root == PatternRoot::Relative {
            return own;
        }
        if count == 1 && path.root == PatternRoot::Root && step.connector == Connector::Descendant {
            // every node is below the document node
            return own;
        }
        let axis = match step.connector {
            Connector::Child => QilNodeType::Parent,
            Connector::Descendant => QilNodeType::Ancestor,
        };
        let nodes = self.g.axis(axis, node);
        let name = if axis == QilNodeType::Parent { "parent" } else { "ancestor" };
        let above = self.iterate(nodes, name);
        let rest = self.steps_test(path, count - 1, above, id);
        let found = self.g.filter(above, rest);
        let exists = self.exists(found);
        self.g.and(own, exists)
    }

    fn step_test(&mut self, step: &StepPattern, node: QilNodeId, id: NodeId) -> QilNodeId {
        let mut result = self.node_test(step, node);
        for (index, predicate) in step.predicates.iter().enumerate() {
            let test = self.pattern_predicate(step, &step.predicates[..index], predicate, node, id);
            result = self.g.and(result, test);
        }
        result
    }

    /// The node test of a pattern step.
    pub(crate) fn node_test(&mut self, step: &StepPattern, node: QilNodeId) -> QilNodeId {
        let attribute = step.axis == Axis::Attribute;
        let principal = if attribute {
            XmlQueryType::ATTRIBUTE
        } else {
            XmlQueryType::ELEMENT
        };
        match &step.node_test {
            NodeTest::Kind(KindTest::Node) => {
                let ty = if attribute {
                    XmlQueryType::ATTRIBUTE
                } else {
                    XmlQueryType::new(ItemKinds::CONTENT, quill_qil::Cardinality::ONE)
                };
                self.g.is_type(node, ty)
            }
            NodeTest::Kind(_) if attribute => self.g.false_(),
            NodeTest::Kind(KindTest::Text) => self.g.is_type(node, XmlQueryType::TEXT),
            NodeTest::Kind(KindTest::Comment) => self.g.is_type(node, XmlQueryType::COMMENT),
            NodeTest::Kind(KindTest::ProcessingInstruction(None)) => {
                self.g.is_type(node, XmlQueryType::PI)
            }
            NodeTest::Kind(KindTest::ProcessingInstruction(Some(target))) => {
                let is_pi = self.g.is_type(node, XmlQueryType::PI);
                let name = self.g.node_property(QilNodeType::LocalNameOf, node);
                let target = self.g.literal_string(target.as_str());
                let same = self.g.eq(name, target);
                self.g.and(is_pi, same)
            }
            NodeTest::Name(NameTest::Any) => self.g.is_type(node, principal),
            NodeTest::Name(NameTest::Name(name)) => {
                let is_kind = self.g.is_type(node, principal);
                let name_of = self.g.node_property(QilNodeType::NameOf, node);
                let literal = self.g.literal_qname(name.clone());
                let same = self.g.eq(name_of, literal);
                self.g.and(is_kind, same)
            }
            NodeTest::Name(NameTest::Namespace(uri)) => {
                let is_kind = self.g.is_type(node, principal);
                let namespace = self.g.node_property(QilNodeType::NamespaceUriOf, node);
                let literal = self.g.literal_string(uri.as_str());
                let same = self.g.eq(namespace, literal);
                self.g.and(is_kind, same)
            }
        }
    }

    /// A predicate of a pattern step. A predicate that may depend on the
    /// position is evaluated over the node and its siblings that pass the
    /// step's node test and the predicates before it.
    fn pattern_predicate(
        &mut self,
        step: &StepPattern,
        earlier: &[Expr],
        predicate: &Expr,
        node: QilNodeId,
        id: NodeId,
    ) -> QilNodeId {
        let flags = expression_flags(predicate);
        let positional = flags.intersects(XslFlags::POSITION | XslFlags::LAST)
            || !flags.has_known_type()
            || flags.type_bits() == XslFlags::NUMBER;
        if !positional {
            let value = self.with_focus(
                Focus {
                    current: Some(node),
                    position: None,
                    last: None,
                },
                |this| this.expr(predicate, id),
            );
            return self.to_boolean(value);
        }
        let parents = self.g.axis(QilNodeType::Parent, node);
        let parent = self.iterate(parents, "parent");
        let axis = if step.axis == Axis::Attribute {
            QilNodeType::Attributes
        } else {
            QilNodeType::Children
        };
        let all = self.g.axis(axis, parent);
        let sibling = self.iterate(all, "sibling");
        let test = self.node_test(step, sibling);
        let mut siblings = self.g.filter(sibling, test);
        for earlier in earlier {
            siblings = self.predicate(siblings, earlier, false, id);
        }
        let siblings = self.bind(siblings, "siblings");
        let item = self.iterate(siblings, "item");
        let position = self.g.position_of(item);
        let last = self.g.length(siblings);
        let value = self.with_focus(Focus::new(item, position, last), |this| {
            this.expr(predicate, id)
        });
        let condition = self.predicate_condition(value, position);
        let same = self.g.is_(item, node);
        let both = self.g.and(same, condition);
        let matching = self.g.filter(item, both);
        let found = self.exists(matching);
        let in_parent = self.g.loop_(siblings, found);
        let result = self.g.filter(parent, in_parent);
        self.exists(result)
    }

    /// `node` is one of the nodes selected by an `id()` or `key()` call.
    fn id_key_test(&mut self, expr: &Expr, node: QilNodeId, id: NodeId) -> QilNodeId {
        let focus = Focus {
            current: Some(node),
            position: None,
            last: None,
        };
        let selected = self.with_focus(focus, |this| this.expr(expr, id));
        let selected = self.to_node_set(selected);
        let item = self.iterate(selected, "selected");
        let same = self.g.is_(item, node);
        let matching = self.g.filter(item, same);
        self.exists(matching)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{compile_ok, function_dump};

    #[test]
    fn test_child_pattern_checks_parent() {
        let compiled = compile_ok(
            r#"<xsl:template match="list/item"><x/></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "apply-templates");
        assert!(dump.contains("(Parent $current)"));
        assert!(dump.contains("'list"));
    }

    #[test]
    fn test_root_pattern_is_document_test() {
        let compiled = compile_ok(r#"<xsl:template match="/"><x/></xsl:template>"#);
        let dump = function_dump(&compiled, "apply-templates");
        assert!(dump.contains("(Invoke @quill:template-1"));
    }
}
