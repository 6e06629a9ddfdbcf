//! Loading template content: instructions, literal result elements and
//! text.

use quill_name::XSLT_NAMESPACE;

use crate::ast::{
    NodeId, NumberInfo, NumberLevel, SortInfo, VarKind, XslDetail, XslNode, XslNodeType, XslVersion,
};
use crate::error::ErrorCode;
use crate::input::{InputElement, InputNode};
use crate::loader::{Loader, Standard};
use crate::names::XsltElement;

/// What kind of content is being loaded, which decides the elements
/// allowed in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentKind {
    /// Template body: parameters first, then instructions.
    Template,
    /// `xsl:for-each`: sorts first, then instructions.
    ForEach,
    /// Only `xsl:sort` and `xsl:with-param`.
    ApplyTemplates,
    /// Only `xsl:with-param`.
    CallTemplate,
    /// Only `xsl:when` and `xsl:otherwise`.
    Choose,
    /// Only `xsl:attribute`.
    AttributeSet,
    Plain,
}

impl ContentKind {
    fn allows_text(self) -> bool {
        !matches!(
            self,
            ContentKind::ApplyTemplates
                | ContentKind::CallTemplate
                | ContentKind::Choose
                | ContentKind::AttributeSet
        )
    }
}

impl<'a> Loader<'a> {
    pub(crate) fn load_content(&mut self, parent: &InputElement, kind: ContentKind) -> Vec<NodeId> {
        self.scope.enter_scope();
        let mut content = Vec::new();
        let mut prelude = true;
        for child in &parent.children {
            match child {
                InputNode::Text(text) => {
                    if !kind.allows_text() {
                        if !text.trim().is_empty() {
                            self.error(
                                parent,
                                ErrorCode::XTSE0010,
                                format!("text is not allowed in {}", parent.name),
                            );
                        }
                        continue;
                    }
                    prelude = false;
                    let node = self
                        .node(XslNodeType::Text, parent)
                        .with_arg(Some(text.clone()))
                        .with_detail(XslDetail::Text {
                            disable_output_escaping: false,
                        });
                    let node = self.ast.add(node);
                    self.ast.set_content(node, Vec::new());
                    content.push(node);
                }
                InputNode::Element(element) => {
                    if let Some(id) = self.load_child(element, kind, &mut prelude) {
                        content.push(id);
                    }
                }
            }
        }
        self.scope.exit_scope();
        if kind == ContentKind::Choose {
            self.check_choose(parent, &content);
        }
        content
    }

    fn load_child(
        &mut self,
        element: &InputElement,
        kind: ContentKind,
        prelude: &mut bool,
    ) -> Option<NodeId> {
        self.depth += 1;
        let result = if self.depth > self.settings.max_content_depth {
            if !self.too_complex_reported {
                self.too_complex_reported = true;
                self.error(
                    element,
                    ErrorCode::QUILL0001,
                    "instructions are nested too deeply",
                );
            }
            None
        } else if element.in_xslt_namespace() {
            self.load_instruction(element, kind, prelude)
        } else {
            *prelude = false;
            if kind.allows_text() {
                self.load_literal_element(element)
            } else {
                self.error(
                    element,
                    ErrorCode::XTSE0010,
                    format!("{} is not allowed here", element.name),
                );
                None
            }
        };
        self.depth -= 1;
        result
    }

    fn load_instruction(
        &mut self,
        element: &InputElement,
        parent: ContentKind,
        prelude: &mut bool,
    ) -> Option<NodeId> {
        let Ok(kind) = element.name.local_name().parse::<XsltElement>() else {
            *prelude = false;
            return self.load_unknown(element);
        };
        let allowed = match kind {
            XsltElement::Param => parent == ContentKind::Template && *prelude,
            XsltElement::Sort => {
                parent == ContentKind::ApplyTemplates
                    || (parent == ContentKind::ForEach && *prelude)
            }
            XsltElement::WithParam => {
                matches!(parent, ContentKind::ApplyTemplates | ContentKind::CallTemplate)
            }
            XsltElement::When | XsltElement::Otherwise => parent == ContentKind::Choose,
            XsltElement::Attribute => parent.allows_text() || parent == ContentKind::AttributeSet,
            XsltElement::Variable => parent.allows_text(),
            XsltElement::Stylesheet | XsltElement::Transform => false,
            _ if kind.is_declaration() => false,
            _ => parent.allows_text(),
        };
        if !matches!(kind, XsltElement::Param | XsltElement::Sort) {
            *prelude = false;
        }
        if !allowed {
            self.error(
                element,
                ErrorCode::XTSE0010,
                format!("xsl:{} is not allowed here", kind),
            );
            return None;
        }

        let saved = self.enter_element(element, Standard::None);
        let outer_literal = std::mem::replace(&mut self.literal_parent, false);
        let result = if self.check_attributes(element, kind) {
            self.load_checked(element, kind)
        } else {
            None
        };
        if result.is_some() && kind.must_be_empty() && !element.children.is_empty() {
            self.error(
                element,
                ErrorCode::XTSE0260,
                format!("xsl:{} must be empty", kind),
            );
        }
        self.literal_parent = outer_literal;
        self.exit_element(saved);

        if let (Some(id), XsltElement::Variable | XsltElement::Param) = (result, kind) {
            self.bind_local(id);
        }
        result
    }

    /// Make a local variable or parameter visible to the following
    /// siblings.
    fn bind_local(&mut self, id: NodeId) {
        let Some(name) = self.ast[id].name.clone() else {
            return;
        };
        if self.version == XslVersion::V1 && self.scope.lookup_variable(&name).is_some() {
            let location = self.ast[id].location;
            self.diagnostics.error(
                location,
                ErrorCode::XTSE0630,
                format!("local variable {} shadows another local variable", name),
            );
        }
        self.scope.add_variable(name, id);
    }

    fn leaf(&mut self, node: XslNode) -> NodeId {
        let id = self.ast.add(node);
        self.ast.set_content(id, Vec::new());
        id
    }

    fn with_content(&mut self, node: XslNode, element: &InputElement, kind: ContentKind) -> NodeId {
        let id = self.ast.add(node);
        let content = self.load_content(element, kind);
        self.ast.set_content(id, content);
        id
    }

    fn optional(element: &InputElement, name: &str) -> Option<String> {
        element.attribute(name).map(|value| value.to_string())
    }

    fn load_checked(&mut self, element: &InputElement, kind: XsltElement) -> Option<NodeId> {
        match kind {
            XsltElement::ApplyImports => {
                let node = self.node(XslNodeType::ApplyImports, element);
                Some(self.leaf(node))
            }
            XsltElement::ApplyTemplates => {
                let mode = match element.attribute("mode").map(str::trim) {
                    None | Some("#default") => None,
                    Some(value) => Some(self.qname(element, value)?),
                };
                let node = self
                    .node(XslNodeType::ApplyTemplates, element)
                    .with_arg(Self::optional(element, "select"))
                    .with_detail(XslDetail::ApplyTemplates { mode });
                let id = self.with_content(node, element, ContentKind::ApplyTemplates);
                let content = self.ast.content(id).to_vec();
                self.check_duplicate_names(&content, XslNodeType::WithParam, ErrorCode::XTSE0670);
                Some(id)
            }
            XsltElement::Attribute => {
                let node = self
                    .node(XslNodeType::Attribute, element)
                    .with_arg(Self::optional(element, "name"))
                    .with_detail(XslDetail::Constructor {
                        namespace: Self::optional(element, "namespace"),
                    });
                Some(self.with_content(node, element, ContentKind::Plain))
            }
            XsltElement::CallTemplate => {
                let name = self.qname(element, element.attribute("name")?)?;
                let node = self.node(XslNodeType::CallTemplate, element).with_name(name);
                let id = self.with_content(node, element, ContentKind::CallTemplate);
                let content = self.ast.content(id).to_vec();
                self.check_duplicate_names(&content, XslNodeType::WithParam, ErrorCode::XTSE0670);
                Some(id)
            }
            XsltElement::Choose => {
                let node = self.node(XslNodeType::Choose, element);
                Some(self.with_content(node, element, ContentKind::Choose))
            }
            XsltElement::Comment => {
                let node = self.node(XslNodeType::Comment, element);
                Some(self.with_content(node, element, ContentKind::Plain))
            }
            XsltElement::Copy => {
                let node = self.node(XslNodeType::Copy, element);
                Some(self.with_attribute_sets(node, element, "use-attribute-sets"))
            }
            XsltElement::CopyOf => {
                let node = self
                    .node(XslNodeType::CopyOf, element)
                    .with_arg(Self::optional(element, "select"));
                Some(self.leaf(node))
            }
            XsltElement::Element => {
                let node = self
                    .node(XslNodeType::Element, element)
                    .with_arg(Self::optional(element, "name"))
                    .with_detail(XslDetail::Constructor {
                        namespace: Self::optional(element, "namespace"),
                    });
                Some(self.with_attribute_sets(node, element, "use-attribute-sets"))
            }
            // fallback content is for instructions this processor does not
            // know; here it is never used
            XsltElement::Fallback => None,
            XsltElement::ForEach => {
                let node = self
                    .node(XslNodeType::ForEach, element)
                    .with_arg(Self::optional(element, "select"));
                Some(self.with_content(node, element, ContentKind::ForEach))
            }
            XsltElement::If | XsltElement::When => {
                let node_type = if kind == XsltElement::If {
                    XslNodeType::If
                } else {
                    XslNodeType::When
                };
                let node = self
                    .node(node_type, element)
                    .with_arg(Self::optional(element, "test"));
                Some(self.with_content(node, element, ContentKind::Plain))
            }
            XsltElement::Otherwise => {
                let node = self.node(XslNodeType::Otherwise, element);
                Some(self.with_content(node, element, ContentKind::Plain))
            }
            XsltElement::Message => {
                let terminate = self.yes_no(element, "terminate", false);
                let node = self
                    .node(XslNodeType::Message, element)
                    .with_detail(XslDetail::Message { terminate });
                Some(self.with_content(node, element, ContentKind::Plain))
            }
            XsltElement::Number => self.load_number(element),
            XsltElement::Param => self.load_variable(element, kind, VarKind::Local),
            XsltElement::Variable => self.load_variable(element, kind, VarKind::Local),
            XsltElement::WithParam => self.load_variable(element, kind, VarKind::WithParam),
            XsltElement::ProcessingInstruction => {
                let node = self
                    .node(XslNodeType::PI, element)
                    .with_arg(Self::optional(element, "name"));
                Some(self.with_content(node, element, ContentKind::Plain))
            }
            XsltElement::Sort => {
                let info = SortInfo {
                    lang: Self::optional(element, "lang"),
                    data_type: Self::optional(element, "data-type"),
                    order: Self::optional(element, "order"),
                    case_order: Self::optional(element, "case-order"),
                };
                let select = Self::optional(element, "select").unwrap_or_else(|| ".".to_string());
                let node = self
                    .node(XslNodeType::Sort, element)
                    .with_arg(Some(select))
                    .with_detail(XslDetail::Sort(info));
                Some(self.leaf(node))
            }
            XsltElement::Text => {
                let mut text = String::new();
                for child in &element.children {
                    match child {
                        InputNode::Text(value) => text.push_str(value),
                        InputNode::Element(child) => self.error(
                            child,
                            ErrorCode::XTSE0010,
                            "xsl:text cannot contain elements",
                        ),
                    }
                }
                let disable_output_escaping =
                    self.yes_no(element, "disable-output-escaping", false);
                let node = self
                    .node(XslNodeType::Text, element)
                    .with_arg(Some(text))
                    .with_detail(XslDetail::Text {
                        disable_output_escaping,
                    });
                Some(self.leaf(node))
            }
            XsltElement::ValueOf => {
                let node_type = if self.yes_no(element, "disable-output-escaping", false) {
                    XslNodeType::ValueOfDoe
                } else {
                    XslNodeType::ValueOf
                };
                let node = self
                    .node(node_type, element)
                    .with_arg(Self::optional(element, "select"));
                Some(self.leaf(node))
            }
            _ => None,
        }
    }

    fn with_attribute_sets(
        &mut self,
        node: XslNode,
        element: &InputElement,
        attribute: &str,
    ) -> NodeId {
        let id = self.ast.add(node);
        let mut content = match element.attribute(attribute) {
            Some(names) => self.use_attribute_sets(element, names),
            None => Vec::new(),
        };
        content.extend(self.load_content(element, ContentKind::Plain));
        self.ast.set_content(id, content);
        id
    }

    fn load_number(&mut self, element: &InputElement) -> Option<NodeId> {
        let level = match element.attribute("level").map(str::trim) {
            None | Some("single") => NumberLevel::Single,
            Some("multiple") => NumberLevel::Multiple,
            Some("any") => NumberLevel::Any,
            Some(value) => {
                self.error(
                    element,
                    ErrorCode::XTSE0020,
                    format!("invalid level {:?}", value),
                );
                NumberLevel::Single
            }
        };
        let info = NumberInfo {
            level,
            count: Self::optional(element, "count"),
            from: Self::optional(element, "from"),
            value: Self::optional(element, "value"),
            format: Self::optional(element, "format"),
            lang: Self::optional(element, "lang"),
            letter_value: Self::optional(element, "letter-value"),
            grouping_separator: Self::optional(element, "grouping-separator"),
            grouping_size: Self::optional(element, "grouping-size"),
        };
        let node = self
            .node(XslNodeType::Number, element)
            .with_detail(XslDetail::Number(info));
        Some(self.leaf(node))
    }

    fn check_choose(&mut self, parent: &InputElement, content: &[NodeId]) {
        let whens = content
            .iter()
            .filter(|id| self.ast[**id].kind == XslNodeType::When)
            .count();
        if whens == 0 {
            self.error(
                parent,
                ErrorCode::XTSE0010,
                "xsl:choose needs at least one xsl:when",
            );
        }
        let otherwise = content
            .iter()
            .position(|id| self.ast[*id].kind == XslNodeType::Otherwise);
        if let Some(position) = otherwise {
            if position + 1 != content.len() {
                self.error(
                    parent,
                    ErrorCode::XTSE0010,
                    "xsl:otherwise must be the last child of xsl:choose",
                );
            }
        }
    }

    /// An XSLT element this processor does not know.
    fn load_unknown(&mut self, element: &InputElement) -> Option<NodeId> {
        let saved = self.enter_element(element, Standard::None);
        let result = if self.forwards_compatible() {
            log::debug!("using fallback for {}", element.name);
            Some(self.load_fallback(element, format!("{} is not supported", element.name)))
        } else {
            self.error(
                element,
                ErrorCode::XTSE0010,
                format!("unknown XSLT element {}", element.name),
            );
            None
        };
        self.exit_element(saved);
        result
    }

    /// The `xsl:fallback` children of an element as a list, or an error
    /// raised when the element is evaluated if it has none.
    fn load_fallback(&mut self, element: &InputElement, message: String) -> NodeId {
        let fallbacks: Vec<&InputElement> = element
            .child_elements()
            .filter(|child| child.is_xslt("fallback"))
            .collect();
        if fallbacks.is_empty() {
            let node = self
                .node(XslNodeType::Error, element)
                .with_detail(XslDetail::Error { message });
            return self.leaf(node);
        }
        let list = self.node(XslNodeType::List, element);
        let list = self.ast.add(list);
        let mut content = Vec::new();
        for fallback in fallbacks {
            let saved = self.enter_element(fallback, Standard::None);
            let outer_literal = std::mem::replace(&mut self.literal_parent, false);
            content.extend(self.load_content(fallback, ContentKind::Plain));
            self.literal_parent = outer_literal;
            self.exit_element(saved);
        }
        self.ast.set_content(list, content);
        list
    }

    pub(crate) fn load_literal_element(&mut self, element: &InputElement) -> Option<NodeId> {
        let saved = self.enter_element(element, Standard::Xsl);
        if let Some(namespace) = element.name.namespace() {
            if self.scope.is_extension_namespace(namespace) {
                let message = format!("extension element {} is not supported", element.name);
                let id = self.load_fallback(element, message);
                self.exit_element(saved);
                return Some(id);
            }
        }

        let namespaces = self.literal_namespaces(element);
        let node = self
            .node(XslNodeType::LiteralElement, element)
            .with_name(element.name.clone())
            .with_detail(XslDetail::LiteralElement { namespaces });
        let id = self.ast.add(node);

        let mut content = Vec::new();
        let forwards_compatible = self.forwards_compatible();
        for attribute in &element.attributes {
            if attribute.name.namespace() == Some(XSLT_NAMESPACE) {
                let standard = matches!(
                    attribute.name.local_name(),
                    "version"
                        | "exclude-result-prefixes"
                        | "extension-element-prefixes"
                        | "use-attribute-sets"
                );
                if !standard && !forwards_compatible {
                    self.error(
                        element,
                        ErrorCode::XTSE0805,
                        format!("unknown XSLT attribute {}", attribute.name),
                    );
                }
                continue;
            }
            let mut node = self
                .node(XslNodeType::LiteralAttribute, element)
                .with_name(attribute.name.clone())
                .with_arg(Some(attribute.value.clone()));
            node.location.line = attribute.line;
            node.location.column = attribute.column;
            content.push(self.leaf(node));
        }
        if let Some(names) = element.xsl_attribute("use-attribute-sets") {
            content.extend(self.use_attribute_sets(element, names));
        }
        let outer_literal = std::mem::replace(&mut self.literal_parent, true);
        content.extend(self.load_content(element, ContentKind::Plain));
        self.literal_parent = outer_literal;
        self.ast.set_content(id, content);
        self.exit_element(saved);
        Some(id)
    }

    /// The namespace nodes a literal result element writes. An element
    /// inside another literal result element inherits the namespaces its
    /// parent wrote, so it only writes the ones it declares itself.
    fn literal_namespaces(&self, element: &InputElement) -> Vec<(String, String)> {
        let candidates: Vec<(String, String)> = if self.literal_parent {
            element.namespace_decls.clone()
        } else {
            self.ns
                .in_scope()
                .into_iter()
                .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
                .collect()
        };
        candidates
            .into_iter()
            .filter(|(_, uri)| {
                !uri.is_empty() && uri != XSLT_NAMESPACE && !self.scope.is_excluded_namespace(uri)
            })
            .collect()
    }
}
