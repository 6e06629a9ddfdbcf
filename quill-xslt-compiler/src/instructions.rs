//! Template content: instructions and literal result elements.

use std::mem;

use quill_name::{is_ncname, QName};
use quill_qil::{QilNodeId, QilNodeType, XmlQueryType};
use quill_xpath_ast::value_template::static_value;
use quill_xpath_ast::Pattern;
use quill_xslt_ast::{
    ErrorCode, NodeId, NumberInfo, NumberLevel, SortInfo, XslDetail, XslFlags, XslNodeType,
};

use crate::generator::{internal_name, Focus, Generator};
use crate::xpath::atomic_kind;

const COLLATION: &str = "urn:quill:collation?";

impl Generator<'_> {
    /// The content of node `id` as a sequence. Variables are in scope for
    /// the siblings that follow them.
    pub(crate) fn content(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        self.scope.enter_scope();
        let result = self.siblings(program.ast.content(id));
        self.scope.exit_scope();
        result
    }

    fn siblings(&mut self, children: &[NodeId]) -> QilNodeId {
        let program = self.program;
        let mut items = Vec::new();
        for (index, child) in children.iter().enumerate() {
            let node = &program.ast[*child];
            match node.kind {
                XslNodeType::Param | XslNodeType::Sort | XslNodeType::WithParam => {}
                XslNodeType::Variable => {
                    self.at(*child);
                    let value = self.variable_value(*child);
                    let Some(name) = node.name.clone() else {
                        continue;
                    };
                    let variable = self.bind(value, &name.to_string());
                    self.scope.add_variable(name, variable);
                    let rest = self.siblings(&children[index + 1..]);
                    items.push(self.g.loop_(variable, rest));
                    break;
                }
                _ => {
                    self.at(*child);
                    let item = self.instruction(*child);
                    items.push(item);
                }
            }
        }
        self.sequence(items)
    }

    fn instruction(&mut self, id: NodeId) -> QilNodeId {
        use XslNodeType::*;
        let program = self.program;
        let node = &program.ast[id];
        match node.kind {
            ApplyTemplates => self.apply_templates(id),
            ApplyImports => self.apply_imports(id),
            CallTemplate => self.call_template(id),
            UseAttributeSet => self.use_attribute_set(id),
            ForEach => self.for_each(id),
            If => {
                let test = self.select(id);
                let test = self.to_boolean(test);
                let content = self.content(id);
                let otherwise = self.g.empty();
                self.g.conditional(test, content, otherwise)
            }
            Choose => self.choose(id),
            When | Otherwise | List => self.content(id),
            Copy => {
                let current = self.current();
                let content = self.content(id);
                self.g.xslt_copy(current, content)
            }
            CopyOf => self.copy_of(id),
            ValueOf | ValueOfDoe => {
                let value = self.select(id);
                let string = self.to_string(value);
                if node.kind == ValueOfDoe {
                    self.g.raw_text_ctor(string)
                } else {
                    self.g.text_ctor(string)
                }
            }
            Text => {
                let text = node.arg.clone().unwrap_or_default();
                if text.is_empty() {
                    return self.g.empty();
                }
                let text = self.g.literal_string(text);
                match node.detail {
                    XslDetail::Text {
                        disable_output_escaping: true,
                    } => self.g.raw_text_ctor(text),
                    _ => self.g.text_ctor(text),
                }
            }
            Element => {
                let name = self.constructor_name(id, true);
                let content = self.content(id);
                self.g.element_ctor(name, content)
            }
            Attribute => {
                let name = self.constructor_name(id, false);
                let value = self.content_string(id);
                self.g.attribute_ctor(name, value)
            }
            LiteralElement => self.literal_element(id),
            LiteralAttribute => {
                let Some(name) = node.name.as_ref() else {
                    return self.internal_error("literal attribute without a name");
                };
                let name = self.aliased(name, false);
                let name = self.g.literal_qname(name);
                let value = self.avt(node.arg.as_deref().unwrap_or_default(), id);
                self.g.attribute_ctor(name, value)
            }
            Comment => {
                let value = self.content_string(id);
                self.g.comment_ctor(value)
            }
            PI => {
                let name = self.avt(node.arg.as_deref().unwrap_or_default(), id);
                let value = self.content_string(id);
                self.g.pi_ctor(name, value)
            }
            Message => {
                let content = self.content(id);
                let fragment = self.g.rtf_ctor(content);
                let text = self.g.node_value(fragment);
                match node.detail {
                    XslDetail::Message { terminate: true } => self.g.error(text),
                    _ => self.g.warning(text),
                }
            }
            Number => self.number(id),
            Error => {
                let message = match &node.detail {
                    XslDetail::Error { message } => message.as_str(),
                    _ => "instruction is not supported",
                };
                let text = self
                    .g
                    .literal_string(format!("{}: {}", ErrorCode::XTDE1450, message));
                self.g.error(text)
            }
            Variable | Param | WithParam | Sort | Nop | Key | Template | AttributeSet => {
                self.g.empty()
            }
        }
    }

    /// The expression in the main attribute of an instruction.
    fn select(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        match program.ast[id].arg.as_deref() {
            Some(text) => self.xpath(text, id),
            None => self.internal_error("instruction without an expression"),
        }
    }

    /// The string value of the content of `id`, for attributes, comments
    /// and processing instructions.
    fn content_string(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        match program.ast.content(id) {
            [] => self.g.literal_string(""),
            [only] if program.ast[*only].kind == XslNodeType::Text => {
                let text = program.ast[*only].arg.clone().unwrap_or_default();
                self.g.literal_string(text)
            }
            _ => {
                let content = self.content(id);
                let fragment = self.g.rtf_ctor(content);
                self.g.node_value(fragment)
            }
        }
    }

    fn sorts(&self, id: NodeId) -> Vec<NodeId> {
        let program = self.program;
        program
            .ast
            .content(id)
            .iter()
            .copied()
            .filter(|child| program.ast[*child].kind == XslNodeType::Sort)
            .collect()
    }

    /// `xsl:with-param` values bound to `let`s, ordered by name.
    fn with_params(&mut self, id: NodeId) -> Vec<(QName, QilNodeId)> {
        let program = self.program;
        let mut params = Vec::new();
        for child in program.ast.content(id) {
            let node = &program.ast[*child];
            if node.kind != XslNodeType::WithParam {
                continue;
            }
            let Some(name) = node.name.clone() else {
                continue;
            };
            self.at(*child);
            let value = self.variable_value(*child);
            let bound = self.bind(value, &name.to_string());
            params.push((name, bound));
        }
        params.sort_by(|(a, _), (b, _)| a.cmp(b));
        params
    }

    fn wrap_params(&mut self, params: &[(QName, QilNodeId)], body: QilNodeId) -> QilNodeId {
        params
            .iter()
            .rev()
            .fold(body, |body, (_, bound)| self.g.loop_(*bound, body))
    }

    /// Run `f` iterating over nodes with `focus`; `current()` is the node
    /// being visited.
    fn with_iteration<T>(&mut self, focus: Focus, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = mem::replace(&mut self.xslt_current, focus.current);
        let result = self.with_focus(focus, f);
        self.xslt_current = saved;
        result
    }

    // templates

    fn apply_templates(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let node = &program.ast[id];
        let nodes = match &node.arg {
            Some(select) => {
                let value = self.xpath(select, id);
                self.to_node_set(value)
            }
            None => {
                let current = self.current();
                self.g.axis(QilNodeType::Children, current)
            }
        };
        let sorts = self.sorts(id);
        let params = self.with_params(id);
        let names: Vec<QName> = params.iter().map(|(name, _)| name.clone()).collect();
        let values: Vec<QilNodeId> = params.iter().map(|(_, value)| *value).collect();
        let dispatcher = self.dispatcher(node.mode(), &names);
        self.at(id);
        let applied = self.apply_to_each(&dispatcher, nodes, Some(&sorts), &values);
        self.wrap_params(&params, applied)
    }

    /// `xsl:apply-imports` applies the rules imported into the level of the
    /// current template rule, in its mode. Inside `xsl:for-each` there is
    /// no current template rule.
    fn apply_imports(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let rule = match self.rule {
            Some(rule) if self.loop_depth == 0 => rule,
            _ => {
                return self.report(
                    id,
                    ErrorCode::XTSE0010,
                    "xsl:apply-imports is only allowed in a template rule, outside xsl:for-each",
                )
            }
        };
        let Some(info) = program.ast[rule].template() else {
            return self.internal_error("template rule without template information");
        };
        let importer = self.importer(info.stylesheet, info.mode.as_ref());
        let focus = self.focus;
        let args = self.focus_actuals(&importer.focus, focus);
        self.g.invoke(importer.function, args)
    }

    fn call_template(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let Some(name) = program.ast[id].name.as_ref() else {
            return self.internal_error("xsl:call-template without a name");
        };
        let Some(template) = program.named_templates.get(name).copied() else {
            return self.report(id, ErrorCode::XTSE0650, format!("no template named {}", name));
        };
        let params = self.with_params(id);
        self.at(id);
        let focus = self.focus;
        let call = self.invoke_template(template, focus, &params);
        self.wrap_params(&params, call)
    }

    fn use_attribute_set(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let Some(name) = program.ast[id].name.as_ref() else {
            return self.internal_error("use-attribute-sets without a name");
        };
        let Some(callee) = self.attribute_sets.get(name).cloned() else {
            return self.report(
                id,
                ErrorCode::XTSE0710,
                format!("no attribute set named {}", name),
            );
        };
        let focus = self.focus;
        let args = self.focus_actuals(&callee.focus, focus);
        self.g.invoke(callee.function, args)
    }

    // control flow

    fn for_each(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let selected = self.select(id);
        let mut nodes = self.to_node_set(selected);
        let sorts = self.sorts(id);
        if !sorts.is_empty() {
            nodes = self.sorted(nodes, &sorts);
        }
        let needs_last = program
            .ast
            .content(id)
            .iter()
            .any(|child| program.ast[*child].flags.contains(XslFlags::LAST));
        let sequence = needs_last.then(|| self.bind(nodes, "selected"));
        let item = self.iterate(sequence.unwrap_or(nodes), "item");
        let position = self.g.position_of(item);
        let last = sequence.map(|sequence| self.g.length(sequence));
        let focus = Focus {
            current: Some(item),
            position: Some(position),
            last,
        };
        self.loop_depth += 1;
        let body = self.with_iteration(focus, |this| this.content(id));
        self.loop_depth -= 1;
        let result = self.g.loop_(item, body);
        match sequence {
            Some(sequence) => self.g.loop_(sequence, result),
            None => result,
        }
    }

    /// `nodes` ordered by the `xsl:sort` keys in `sorts`.
    pub(crate) fn sorted(&mut self, nodes: QilNodeId, sorts: &[NodeId]) -> QilNodeId {
        let program = self.program;
        let unsorted = self.bind(nodes, "unsorted");
        let item = self.iterate(unsorted, "item");
        let position = self.g.position_of(item);
        let last = self.g.length(unsorted);
        let mut keys = Vec::new();
        for sort in sorts {
            self.at(*sort);
            let node = &program.ast[*sort];
            let info = match &node.detail {
                XslDetail::Sort(info) => info.clone(),
                _ => SortInfo::default(),
            };
            let select = node.arg.as_deref().unwrap_or(".");
            let numeric = matches!(
                info.data_type.as_deref().map(static_value),
                Some(Ok(Some(ref data_type))) if data_type == "number"
            );
            let key = self.with_iteration(Focus::new(item, position, last), |this| {
                let value = this.xpath(select, *sort);
                if numeric {
                    this.to_number(value)
                } else {
                    this.to_string(value)
                }
            });
            let collation = self.collation(&info, *sort);
            keys.push(self.g.sort_key(key, collation));
        }
        let keys = self.g.list(keys);
        let ordered = self.g.sort(item, keys);
        self.g.loop_(unsorted, ordered)
    }

    /// The collation of a sort key, as a URI carrying its attributes.
    fn collation(&mut self, info: &SortInfo, id: NodeId) -> QilNodeId {
        let fields = [
            ("order", info.order.as_deref().or(Some("ascending"))),
            ("data-type", info.data_type.as_deref().or(Some("text"))),
            ("lang", info.lang.as_deref()),
            ("case-order", info.case_order.as_deref()),
        ];
        let mut parts = Vec::new();
        let mut text = String::from(COLLATION);
        let mut first = true;
        for (name, value) in fields {
            let Some(value) = value else {
                continue;
            };
            if !first {
                text.push('&');
            }
            first = false;
            text.push_str(name);
            text.push('=');
            match static_value(value) {
                Ok(Some(value)) => text.push_str(&value),
                _ => {
                    parts.push(self.g.literal_string(mem::take(&mut text)));
                    parts.push(self.avt(value, id));
                }
            }
        }
        if parts.is_empty() {
            return self.g.literal_string(text);
        }
        if !text.is_empty() {
            parts.push(self.g.literal_string(text));
        }
        self.g.str_concat(parts)
    }

    fn choose(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let mut result = self.g.empty();
        for branch in program.ast.content(id).iter().rev() {
            self.at(*branch);
            result = if program.ast[*branch].kind == XslNodeType::When {
                let test = self.select(*branch);
                let test = self.to_boolean(test);
                let content = self.content(*branch);
                self.g.conditional(test, content, result)
            } else {
                self.content(*branch)
            };
        }
        result
    }

    // copying

    fn copy_of(&mut self, id: NodeId) -> QilNodeId {
        let value = self.select(id);
        let ty = self.g.xml_type(value);
        if ty.is_node_set() {
            return self.g.xslt_copy_of(value);
        }
        if atomic_kind(ty).is_some() {
            let string = self.to_string(value);
            return self.g.text_ctor(string);
        }
        let bound = self.bind(value, "value");
        let is_nodes = self.g.is_type(bound, XmlQueryType::NODE_SET);
        let nodes = self.g.xslt_convert(bound, XmlQueryType::NODE_SET);
        let copy = self.g.xslt_copy_of(nodes);
        let string = self.g.xslt_convert(bound, XmlQueryType::STRING);
        let text = self.g.text_ctor(string);
        let choice = self.g.conditional(is_nodes, copy, text);
        self.g.loop_(bound, choice)
    }

    // constructors

    /// The name of an `xsl:element` or `xsl:attribute`. Names known at
    /// compile time are resolved here, others at run time against the
    /// namespaces in scope.
    fn constructor_name(&mut self, id: NodeId, element: bool) -> QilNodeId {
        let program = self.program;
        let node = &program.ast[id];
        let Some(name) = node.arg.as_deref() else {
            return self.internal_error("constructor without a name");
        };
        let namespace = match &node.detail {
            XslDetail::Constructor { namespace } => namespace.as_deref(),
            _ => None,
        };
        let static_name = static_value(name).ok().flatten();
        let static_namespace = match namespace {
            None => Some(None),
            Some(namespace) => static_value(namespace).ok().flatten().map(Some),
        };
        if let (Some(name), Some(namespace)) = (static_name, static_namespace) {
            return self.static_constructor_name(&name, namespace.as_deref(), element, id);
        }
        let name = self.avt(name, id);
        let resolver = match namespace {
            Some(namespace) => self.avt(namespace, id),
            None => self.namespace_resolver(id, element),
        };
        self.g.str_parse_qname(name, resolver)
    }

    fn static_constructor_name(
        &mut self,
        text: &str,
        namespace: Option<&str>,
        element: bool,
        id: NodeId,
    ) -> QilNodeId {
        let text = text.trim();
        let (prefix, local) = match text.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, text),
        };
        if !is_ncname(local) || prefix.is_some_and(|prefix| !is_ncname(prefix)) {
            return self.report(id, ErrorCode::XTSE0020, format!("'{}' is not a valid name", text));
        }
        if !element && prefix.is_none() && local == "xmlns" && namespace.is_none() {
            return self.report(id, ErrorCode::XTSE0020, "xmlns is not a valid attribute name");
        }
        let uri = match (namespace, prefix) {
            (Some(uri), _) => uri.to_string(),
            (None, Some(prefix)) => match self.lookup_prefix(prefix, id) {
                Some(uri) => uri,
                None => {
                    return self.report(
                        id,
                        ErrorCode::XTSE0280,
                        format!("namespace prefix {} is not declared", prefix),
                    )
                }
            },
            (None, None) if element => {
                let program = self.program;
                program.ast[id]
                    .namespaces
                    .default_namespace()
                    .unwrap_or_default()
                    .to_string()
            }
            (None, None) => String::new(),
        };
        let name = QName::new(
            local.to_string(),
            (!uri.is_empty()).then_some(uri),
            prefix.map(String::from),
        );
        self.g.literal_qname(name)
    }

    /// A name from the stylesheet with `xsl:namespace-alias` applied.
    /// Unprefixed attributes are in no namespace and are never aliased.
    fn aliased(&self, name: &QName, element: bool) -> QName {
        let uri = name.namespace_str();
        if uri.is_empty() && !element {
            return name.clone();
        }
        match self.program.namespace_aliases.get(uri) {
            Some(alias) => QName::new(
                name.local_name().to_string(),
                (!alias.result_uri.is_empty()).then(|| alias.result_uri.clone()),
                (!alias.result_prefix.is_empty()).then(|| alias.result_prefix.clone()),
            ),
            None => name.clone(),
        }
    }

    fn literal_element(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let node = &program.ast[id];
        let Some(name) = node.name.as_ref() else {
            return self.internal_error("literal result element without a name");
        };
        let name = self.aliased(name, true);
        let name = self.g.literal_qname(name);
        let mut items = Vec::new();
        if let XslDetail::LiteralElement { namespaces } = &node.detail {
            let mut written: Vec<(String, String)> = Vec::new();
            for (prefix, uri) in namespaces {
                let (prefix, uri) = match program.namespace_aliases.get(uri) {
                    Some(alias) => (alias.result_prefix.clone(), alias.result_uri.clone()),
                    None => (prefix.clone(), uri.clone()),
                };
                match written.iter().find(|(seen, _)| *seen == prefix) {
                    Some((_, existing)) if *existing != uri => {
                        let message = format!(
                            "prefix '{}' is bound to both {} and {} on {}",
                            prefix,
                            existing,
                            uri,
                            node.name.as_ref().map(|n| n.to_string()).unwrap_or_default()
                        );
                        self.report(id, ErrorCode::QUILL0004, message);
                        continue;
                    }
                    Some(_) => continue,
                    None => {}
                }
                let prefix_literal = self.g.literal_string(prefix.as_str());
                let uri_literal = self.g.literal_string(uri.as_str());
                items.push(self.g.namespace_decl(prefix_literal, uri_literal));
                written.push((prefix, uri));
            }
        }
        items.push(self.content(id));
        let content = self.sequence(items);
        self.g.element_ctor(name, content)
    }

    // numbering

    fn number(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let XslDetail::Number(info) = &program.ast[id].detail else {
            return self.internal_error("xsl:number without numbering information");
        };
        let numbers = match &info.value {
            Some(value) => {
                let value = self.xpath(value, id);
                self.to_number(value)
            }
            None => self.count_nodes(info, id),
        };
        let format = self.optional_avt(info.format.as_deref(), "1", id);
        let lang = self.optional_avt(info.lang.as_deref(), "", id);
        let letter_value = self.optional_avt(info.letter_value.as_deref(), "", id);
        let separator = self.optional_avt(info.grouping_separator.as_deref(), "", id);
        let size = self.optional_avt(info.grouping_size.as_deref(), "", id);
        let formatted = self.g.xslt_invoke(
            internal_name("format-number-list"),
            vec![numbers, format, lang, letter_value, separator, size],
            XmlQueryType::STRING,
        );
        self.g.text_ctor(formatted)
    }

    fn optional_avt(&mut self, text: Option<&str>, default: &str, id: NodeId) -> QilNodeId {
        match text {
            Some(text) => self.avt(text, id),
            None => self.g.literal_string(default),
        }
    }

    /// The numbers `xsl:number` writes when it has no value: positions of
    /// the current node or its ancestors among the nodes `count` matches.
    fn count_nodes(&mut self, info: &NumberInfo, id: NodeId) -> QilNodeId {
        let current = self.current();
        let count = match info.count.as_deref() {
            Some(text) => self.parse_pattern(text, id),
            None => None,
        };
        let from = match info.from.as_deref() {
            Some(text) => self.parse_pattern(text, id),
            None => None,
        };
        match info.level {
            NumberLevel::Single => {
                let counted = self.counted_ancestors(count.as_ref(), from.as_ref(), current, id);
                let counted = self.bind(counted, "counted");
                let candidate = self.iterate(counted, "candidate");
                let position = self.g.position_of(candidate);
                let length = self.g.length(counted);
                let is_nearest = self.g.eq(position, length);
                let nearest = self.g.filter(candidate, is_nearest);
                let node = self.iterate(nearest, "node");
                let number = self.sibling_number(count.as_ref(), node, current, id);
                let numbers = self.g.loop_(node, number);
                self.g.loop_(counted, numbers)
            }
            NumberLevel::Multiple => {
                let counted = self.counted_ancestors(count.as_ref(), from.as_ref(), current, id);
                let node = self.iterate(counted, "node");
                let number = self.sibling_number(count.as_ref(), node, current, id);
                self.g.loop_(node, number)
            }
            NumberLevel::Any => {
                let preceding = self.g.axis(QilNodeType::Preceding, current);
                let ancestors = self.g.axis(QilNodeType::AncestorOrSelf, current);
                let all = self.g.union(preceding, ancestors);
                let node = self.iterate(all, "node");
                let mut test = self.counts(count.as_ref(), node, current, id);
                if let Some(from) = &from {
                    // only nodes after the last node matching from count
                    let preceding = self.g.axis(QilNodeType::Preceding, current);
                    let ancestors = self.g.axis(QilNodeType::AncestorOrSelf, current);
                    let all = self.g.union(preceding, ancestors);
                    let start = self.iterate(all, "start");
                    let is_start = self.pattern_matches(from, start, id);
                    let later = self.g.compare(QilNodeType::Before, node, start);
                    let both = self.g.and(is_start, later);
                    let starts = self.g.filter(start, both);
                    let after = self.g.is_empty_(starts);
                    test = self.g.and(test, after);
                }
                let matching = self.g.filter(node, test);
                let number = self.g.length(matching);
                let number = self.bind(number, "number");
                let zero = self.g.literal_double(0.0);
                let is_zero = self.g.eq(number, zero);
                let none = self.g.empty();
                let result = self.g.conditional(is_zero, none, number);
                self.g.loop_(number, result)
            }
        }
    }

    /// Ancestors-or-self of `current` that `count` matches, in document
    /// order, below the nearest one `from` matches.
    fn counted_ancestors(
        &mut self,
        count: Option<&Pattern>,
        from: Option<&Pattern>,
        current: QilNodeId,
        id: NodeId,
    ) -> QilNodeId {
        let ancestors = self.g.axis(QilNodeType::AncestorOrSelf, current);
        let ancestor = self.iterate(ancestors, "ancestor");
        let mut test = self.counts(count, ancestor, current, id);
        if let Some(from) = from {
            let boundaries = self.g.axis(QilNodeType::AncestorOrSelf, current);
            let boundary = self.iterate(boundaries, "boundary");
            let is_boundary = self.pattern_matches(from, boundary, id);
            let above = self.g.compare(QilNodeType::Before, boundary, ancestor);
            let below = self.g.not(above);
            let both = self.g.and(is_boundary, below);
            let found = self.g.filter(boundary, both);
            let within = self.g.is_empty_(found);
            test = self.g.and(test, within);
        }
        self.g.filter(ancestor, test)
    }

    /// One plus the number of preceding siblings of `node` that `count`
    /// matches.
    fn sibling_number(
        &mut self,
        count: Option<&Pattern>,
        node: QilNodeId,
        current: QilNodeId,
        id: NodeId,
    ) -> QilNodeId {
        let siblings = self.g.axis(QilNodeType::PrecedingSibling, node);
        let sibling = self.iterate(siblings, "sibling");
        let test = self.counts(count, sibling, current, id);
        let matching = self.g.filter(sibling, test);
        let length = self.g.length(matching);
        let one = self.g.literal_double(1.0);
        self.g.arithmetic(QilNodeType::Add, length, one)
    }

    /// Whether `node` is counted: it matches `count`, or without a count
    /// pattern has the kind and name of `current`.
    fn counts(
        &mut self,
        count: Option<&Pattern>,
        node: QilNodeId,
        current: QilNodeId,
        id: NodeId,
    ) -> QilNodeId {
        if let Some(count) = count {
            return self.pattern_matches(count, node, id);
        }
        let mut same_kind: Option<QilNodeId> = None;
        for ty in [
            XmlQueryType::ELEMENT,
            XmlQueryType::ATTRIBUTE,
            XmlQueryType::TEXT,
            XmlQueryType::COMMENT,
            XmlQueryType::PI,
            XmlQueryType::NAMESPACE,
            XmlQueryType::DOCUMENT,
        ] {
            let node_is = self.g.is_type(node, ty);
            let current_is = self.g.is_type(current, ty);
            let both = self.g.and(node_is, current_is);
            same_kind = Some(match same_kind {
                Some(previous) => self.g.or(previous, both),
                None => both,
            });
        }
        let node_name = self.g.node_property(QilNodeType::NameOf, node);
        let current_name = self.g.node_property(QilNodeType::NameOf, current);
        let same_name = self.g.eq(node_name, current_name);
        match same_kind {
            Some(same_kind) => self.g.and(same_kind, same_name),
            None => same_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{compile_ok, function_dump};

    #[test]
    fn test_static_element_name() {
        let compiled = compile_ok(
            r#"<xsl:template match="/"><xsl:element name="out">x</xsl:element></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "template-1");
        assert!(dump.contains("(ElementCtor 'out"));
    }

    #[test]
    fn test_dynamic_element_name_resolved_at_run_time() {
        let compiled = compile_ok(
            r#"<xsl:template match="/"><xsl:element name="{name(*)}"/></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "template-1");
        assert!(dump.contains("(StrParseQName"));
    }

    #[test]
    fn test_for_each_without_last_binds_no_length() {
        let compiled = compile_ok(
            r#"<xsl:template match="/"><xsl:for-each select="*"><xsl:value-of select="position()"/></xsl:for-each></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "template-1");
        assert!(dump.contains("PositionOf"));
        assert!(!dump.contains("Length"));
    }

    #[test]
    fn test_sort_collation() {
        let compiled = compile_ok(
            r#"<xsl:template match="/"><xsl:for-each select="*"><xsl:sort select="@n" data-type="number" order="descending"/><x/></xsl:for-each></xsl:template>"#,
        );
        let dump = function_dump(&compiled, "template-1");
        assert!(dump.contains("urn:quill:collation?order=descending&data-type=number"));
    }
}
