// Parameter defaults at call sites, and the functions behind key().
use ahash::HashMap;
use quill_name::QName;
use quill_qil::{QilNodeId, QilNodeType, XmlQueryType};
use quill_xpath_ast::pattern::MatchKind;
use quill_xslt_ast::{ErrorCode, NodeId, XslDetail};

use crate::generator::{internal_name, Context, Focus, Generator, KeyFunction, ParamDefault};
use crate::xpath::atomic_kind;

impl Generator<'_> {
    /// The default of parameter `index` of `template` at a call site that
    /// omits it. `substitutions` maps the template's formals to the
    /// actuals of the call.
    pub(crate) fn default_value(
        &mut self,
        template: NodeId,
        index: usize,
        substitutions: &HashMap<QilNodeId, QilNodeId>,
    ) -> QilNodeId {
        match self.param_default(template, index) {
            Some(ParamDefault::Inline(value)) => {
                self.g.clone_with_substitution(value, substitutions)
            }
            Some(ParamDefault::Helper { function, uses }) => {
                let args = uses
                    .iter()
                    .map(|formal| substitutions.get(formal).copied().unwrap_or(*formal))
                    .collect();
                self.g.invoke(function, args)
            }
            None => self.internal_error("parameter without a default"),
        }
    }

    /// The body of the function for key `name`: every node of the document
    /// of `context` that a declaration of the key matches and whose use
    /// value contains `value`.
    pub(crate) fn key_body(&mut self, name: &QName) {
        let program = self.program;
        let Some(key) = self.keys.get(name).copied() else {
            return;
        };
        let mut declarations = Vec::new();
        for declaration in program.keys.get(name).map(Vec::as_slice).unwrap_or_default() {
            self.at(*declaration);
            let XslDetail::Key { match_, use_ } = &program.ast[*declaration].detail else {
                continue;
            };
            if let Some(pattern) = self.parse_pattern(match_, *declaration) {
                declarations.push((*declaration, pattern, use_.as_str()));
            }
        }
        let attributes = declarations.iter().any(|(_, pattern, _)| {
            pattern
                .alternatives
                .iter()
                .any(|path| path.match_kinds().contains(&MatchKind::Attribute))
        });
        let candidates = self.key_candidates(key, attributes);
        let node = self.iterate(candidates, "node");
        let mut test = None;
        for (declaration, pattern, use_) in &declarations {
            let matches = self.pattern_matches(pattern, node, *declaration);
            let one = self.g.literal_double(1.0);
            let used = self.in_context(Context::new(Focus::new(node, one, one)), |this| {
                this.xpath(use_, *declaration)
            });
            let member = self.string_member(used, key.value);
            let both = self.g.and(matches, member);
            test = Some(match test {
                Some(previous) => self.g.or(previous, both),
                None => both,
            });
        }
        let test = match test {
            Some(test) => test,
            None => self.g.false_(),
        };
        let body = self.g.filter(node, test);
        self.g.set_function_body(key.function, body);
    }

    /// The nodes of the document of the key's context node, with their
    /// attributes if a declaration can match one.
    fn key_candidates(&mut self, key: KeyFunction, attributes: bool) -> QilNodeId {
        let root = self.g.axis(QilNodeType::Root, key.context);
        let nodes = self.g.axis(QilNodeType::DescendantOrSelf, root);
        if !attributes {
            return nodes;
        }
        let root = self.g.axis(QilNodeType::Root, key.context);
        let all = self.g.axis(QilNodeType::DescendantOrSelf, root);
        let element = self.iterate(all, "element");
        let own = self.g.axis(QilNodeType::Attributes, element);
        let attributes = self.g.loop_(element, own);
        self.g.union(nodes, attributes)
    }

    /// Whether `string` is one of the string values of `value`.
    fn string_member(&mut self, value: QilNodeId, string: QilNodeId) -> QilNodeId {
        let ty = self.g.xml_type(value);
        if ty.is_node_set() {
            let item = self.iterate(value, "used");
            let item_value = self.g.node_value(item);
            let same = self.g.eq(item_value, string);
            let found = self.g.filter(item, same);
            return self.exists(found);
        }
        if atomic_kind(ty).is_some() {
            let value = self.to_string(value);
            return self.g.eq(value, string);
        }
        let bound = self.bind(value, "used");
        let is_nodes = self.g.is_type(bound, XmlQueryType::NODE_SET);
        let nodes = self.g.xslt_convert(bound, XmlQueryType::NODE_SET);
        let in_nodes = self.string_member(nodes, string);
        let converted = self.g.xslt_convert(bound, XmlQueryType::STRING);
        let same = self.g.eq(converted, string);
        let choice = self.g.conditional(is_nodes, in_nodes, same);
        self.g.loop_(bound, choice)
    }

    /// The function behind key() calls whose key name is only known at
    /// run time: it dispatches on the name to the function of each key.
    pub(crate) fn key_lookup_function(&mut self) -> QilNodeId {
        if let Some(function) = self.key_lookup {
            return function;
        }
        let name = self.g.parameter("name", XmlQueryType::QNAME);
        let context = self.g.parameter("context", XmlQueryType::NODE);
        let value = self.g.parameter("value", XmlQueryType::STRING);
        let function = self.new_function(
            internal_name("key"),
            vec![name, context, value],
            XmlQueryType::NODE_SET,
            false,
        );
        self.key_lookup = Some(function);
        let message = self.g.literal_string(format!(
            "{}: there is no key with the requested name",
            ErrorCode::XTDE1260
        ));
        let mut body = self.g.error(message);
        let keys: Vec<(QName, KeyFunction)> = self
            .keys
            .iter()
            .map(|(name, key)| (name.clone(), *key))
            .collect();
        for (key_name, key) in keys.into_iter().rev() {
            let literal = self.g.literal_qname(key_name);
            let same = self.g.eq(name, literal);
            let call = self.g.invoke(key.function, vec![context, value]);
            body = self.g.conditional(same, call, body);
        }
        self.g.set_function_body(function, body);
        function
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{compile_ok, function_dump};

    #[test]
    fn test_key_function_filters_document() {
        let compiled = compile_ok(
            r#"<xsl:key name="k" match="item" use="@id"/>
            <xsl:template match="/"><xsl:copy-of select="key('k', 'a')"/></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "key-k");
        assert!(dump.contains("(DescendantOrSelf (Root $context))"));
        assert!(dump.contains("$value"));
        let template = function_dump(&compiled, "template-1");
        assert!(template.contains("(Invoke @quill:key-k"));
    }

    #[test]
    fn test_attribute_key_includes_attributes() {
        let compiled = compile_ok(
            r#"<xsl:key name="k" match="@ref" use="."/>
            <xsl:template match="/"><xsl:copy-of select="key('k', 'a')"/></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "key-k");
        assert!(dump.contains("(Attributes $element)"));
    }

    #[test]
    fn test_dynamic_key_name_uses_lookup() {
        let compiled = compile_ok(
            r#"<xsl:key name="k" match="item" use="@id"/>
            <xsl:template match="/"><xsl:copy-of select="key(string(/*/@k), 'a')"/></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "key");
        assert!(dump.contains("'k"));
    }

    #[test]
    fn test_omitted_parameter_gets_default() {
        let compiled = compile_ok(
            r#"<xsl:template name="t"><xsl:param name="p" select="'d'"/><xsl:value-of select="$p"/></xsl:template>
            <xsl:template match="/"><xsl:call-template name="t"/></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "template-1");
        assert!(dump.contains("(Invoke @t"));
        assert!(dump.contains("\"d\""));
    }
}
