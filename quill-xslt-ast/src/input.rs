//! Reading stylesheet modules.
//!
//! A module is parsed with xot and turned into a small owned tree holding
//! only what the loader needs: names with their prefixes, attributes,
//! namespace declarations, text and source positions. Comments and
//! processing instructions are dropped, and whitespace-only text is
//! dropped unless it is inside `xsl:text` or `xml:space="preserve"`.

use ahash::{HashMap, HashMapExt};
use iri_string::types::{IriAbsoluteStr, IriReferenceStr};
use quill_name::{QName, XSLT_NAMESPACE};
use xot::{Node, NodeEdge, SpanInfo, SpanInfoKey, Value, Xot};

use crate::error::ResolveError;

/// Finds and reads stylesheet modules.
pub trait DocumentResolver {
    /// Resolve `href` against the URI of the module it appears in.
    fn resolve(&self, base: Option<&str>, href: &str) -> Result<String, ResolveError> {
        resolve_uri(base, href)
    }

    /// The text of the module at an absolute URI.
    fn load(&self, uri: &str) -> Result<String, ResolveError>;
}

/// RFC 3986 reference resolution. A base that is not an absolute IRI is
/// treated as a file path.
pub fn resolve_uri(base: Option<&str>, href: &str) -> Result<String, ResolveError> {
    let reference: &IriReferenceStr = href.try_into().map_err(|e| ResolveError::InvalidUri {
        href: href.to_string(),
        message: format!("{}", e),
    })?;
    let Some(base) = base else {
        return Ok(href.to_string());
    };
    match <&IriAbsoluteStr>::try_from(base) {
        Ok(base) => Ok(reference.resolve_against(base).to_string()),
        Err(_) => Ok(join_path(base, href)),
    }
}

fn join_path(base: &str, href: &str) -> String {
    if href.starts_with('/') {
        return href.to_string();
    }
    match base.rfind('/') {
        Some(slash) => format!("{}{}", &base[..=slash], href),
        None => href.to_string(),
    }
}

/// Modules held in memory, keyed by URI.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    documents: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        MemoryResolver {
            documents: HashMap::new(),
        }
    }

    pub fn add(&mut self, uri: &str, text: &str) {
        self.documents.insert(uri.to_string(), text.to_string());
    }

    pub fn with(mut self, uri: &str, text: &str) -> Self {
        self.add(uri, text);
        self
    }
}

impl DocumentResolver for MemoryResolver {
    fn load(&self, uri: &str) -> Result<String, ResolveError> {
        self.documents
            .get(uri)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                uri: uri.to_string(),
            })
    }
}

/// Modules on the local file system, by path or `file:` URI.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResolver;

impl DocumentResolver for FileResolver {
    fn load(&self, uri: &str) -> Result<String, ResolveError> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ResolveError::NotFound {
                uri: uri.to_string(),
            },
            _ => ResolveError::Io {
                uri: uri.to_string(),
                message: e.to_string(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAttribute {
    pub name: QName,
    pub value: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputElement {
    pub name: QName,
    pub attributes: Vec<InputAttribute>,
    /// Namespaces declared on this element, `(prefix, uri)`; the default
    /// namespace has the empty prefix.
    pub namespace_decls: Vec<(String, String)>,
    pub children: Vec<InputNode>,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputNode {
    Element(InputElement),
    Text(String),
}

impl InputElement {
    pub fn is_xslt(&self, local: &str) -> bool {
        self.name.namespace() == Some(XSLT_NAMESPACE) && self.name.local_name() == local
    }

    pub fn in_xslt_namespace(&self) -> bool {
        self.name.namespace() == Some(XSLT_NAMESPACE)
    }

    /// The value of an attribute in no namespace.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace().is_none() && a.name.local_name() == local)
            .map(|a| a.value.as_str())
    }

    /// The value of an attribute in the XSLT namespace.
    pub fn xsl_attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace() == Some(XSLT_NAMESPACE) && a.name.local_name() == local)
            .map(|a| a.value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &InputElement> {
        self.children.iter().filter_map(|child| match child {
            InputNode::Element(element) => Some(element),
            InputNode::Text(_) => None,
        })
    }
}

/// One parsed stylesheet module.
#[derive(Debug, Clone)]
pub struct XsltInput {
    pub uri: String,
    pub document_element: InputElement,
}

impl XsltInput {
    pub fn parse(uri: &str, text: &str) -> Result<XsltInput, ResolveError> {
        let parse_error = |message: String| ResolveError::Parse {
            uri: uri.to_string(),
            message,
        };
        let mut xot = Xot::new();
        let (document, span_info) = xot
            .parse_with_span_info(text)
            .map_err(|e| parse_error(e.to_string()))?;
        let root = xot
            .document_element(document)
            .map_err(|e| parse_error(e.to_string()))?;
        let lines = LineIndex::new(text);
        let converter = Converter {
            xot: &xot,
            span_info: &span_info,
            lines: &lines,
        };
        let document_element = converter
            .convert(root)
            .ok_or_else(|| parse_error("no document element".to_string()))?;
        Ok(XsltInput {
            uri: uri.to_string(),
            document_element,
        })
    }
}

struct Converter<'a> {
    xot: &'a Xot,
    span_info: &'a SpanInfo,
    lines: &'a LineIndex,
}

impl<'a> Converter<'a> {
    // iterative, so deeply nested input cannot exhaust the stack here
    fn convert(&self, root: Node) -> Option<InputElement> {
        let mut stack: Vec<InputElement> = Vec::new();
        let mut xml_space_preserve: Vec<bool> = Vec::new();
        let mut result = None;
        for edge in self.xot.traverse(root) {
            match edge {
                NodeEdge::Start(node) => match self.xot.value(node) {
                    Value::Element(element) => {
                        let space = self.xot.attributes(node).get(self.xot.xml_space_name());
                        if let Some(space) = space {
                            xml_space_preserve.push(space.as_str() == "preserve");
                        }
                        stack.push(self.element(node, element.name()));
                    }
                    Value::Text(text) => {
                        if let Some(parent) = stack.last_mut() {
                            push_text(parent, text.get());
                        }
                    }
                    _ => {}
                },
                NodeEdge::End(node) => {
                    if !self.xot.is_element(node) {
                        continue;
                    }
                    let Some(mut finished) = stack.pop() else {
                        continue;
                    };
                    let preserve = finished.is_xslt("text")
                        || xml_space_preserve.last().copied().unwrap_or(false);
                    if !preserve {
                        strip_whitespace(&mut finished);
                    }
                    if self.xot.attributes(node).get(self.xot.xml_space_name()).is_some() {
                        xml_space_preserve.pop();
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(InputNode::Element(finished)),
                        None => result = Some(finished),
                    }
                }
            }
        }
        result
    }

    fn element(&self, node: Node, name: xot::NameId) -> InputElement {
        let (line, column) = self.position(SpanInfoKey::ElementStart(node));
        let mut attributes = Vec::new();
        for (attribute_name, value) in self.xot.attributes(node).iter() {
            let attribute_name = attribute_name.clone();
            let (line, column) = self.position(SpanInfoKey::AttributeName(node, attribute_name));
            attributes.push(InputAttribute {
                name: QName::from_xot(attribute_name, node, self.xot),
                value: value.to_string(),
                line,
                column,
            });
        }
        let mut namespace_decls = Vec::new();
        for (prefix, namespace) in self.xot.namespaces(node).iter() {
            namespace_decls.push((
                self.xot.prefix_str(prefix.clone()).to_string(),
                self.xot.namespace_str(namespace.clone()).to_string(),
            ));
        }
        InputElement {
            name: QName::from_xot(name, node, self.xot),
            attributes,
            namespace_decls,
            children: Vec::new(),
            line,
            column,
        }
    }

    fn position(&self, key: SpanInfoKey) -> (u32, u32) {
        match self.span_info.get(key) {
            Some(span) => self.lines.position(span.start),
            None => (0, 0),
        }
    }
}

fn is_xml_whitespace_char(c: char) -> bool {
    matches!(c, '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}')
}

fn is_xml_whitespace(s: &str) -> bool {
    s.chars().all(is_xml_whitespace_char)
}

// A text node split by a dropped comment is merged back together.
fn push_text(parent: &mut InputElement, text: &str) {
    if let Some(InputNode::Text(previous)) = parent.children.last_mut() {
        previous.push_str(text);
        return;
    }
    parent.children.push(InputNode::Text(text.to_string()));
}

fn strip_whitespace(element: &mut InputElement) {
    element.children.retain(|child| match child {
        InputNode::Text(text) => !is_xml_whitespace(text),
        InputNode::Element(_) => true,
    });
}

/// Byte offset to 1-based line and column.
struct LineIndex {
    starts: Vec<usize>,
    text: String,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex {
            starts,
            text: text.to_string(),
        }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.starts[line];
        let column = self
            .text
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (line as u32 + 1, column as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> InputElement {
        XsltInput::parse("memory:/test.xsl", text)
            .unwrap()
            .document_element
    }

    #[test]
    fn test_comments_dropped_and_text_merged() {
        let element = parse("<doc>a<!--c-->b<?pi x?>c</doc>");
        assert_eq!(element.children, vec![InputNode::Text("abc".to_string())]);
    }

    #[test]
    fn test_whitespace_stripped() {
        let element = parse("<doc>\n  <a/>\n  <b> x </b>\n</doc>");
        assert_eq!(element.children.len(), 2);
        let b = element.child_elements().nth(1).unwrap();
        assert_eq!(b.children, vec![InputNode::Text(" x ".to_string())]);
    }

    #[test]
    fn test_whitespace_kept_in_xsl_text() {
        let element = parse(
            r#"<doc xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:text> </xsl:text></doc>"#,
        );
        let text = element.child_elements().next().unwrap();
        assert!(text.is_xslt("text"));
        assert_eq!(text.children, vec![InputNode::Text(" ".to_string())]);
    }

    #[test]
    fn test_whitespace_kept_with_xml_space() {
        let element = parse(r#"<doc xml:space="preserve"> <a/></doc>"#);
        assert_eq!(element.children.len(), 2);
    }

    #[test]
    fn test_names_and_positions() {
        let element = parse("<p:doc xmlns:p=\"urn:p\"\n  a=\"1\"/>");
        assert_eq!(element.name.prefix(), Some("p"));
        assert_eq!(element.name.namespace(), Some("urn:p"));
        assert_eq!(
            element.namespace_decls,
            vec![("p".to_string(), "urn:p".to_string())]
        );
        assert_eq!((element.line, element.column), (1, 2));
        assert_eq!(element.attribute("a"), Some("1"));
        assert_eq!(element.attributes[0].line, 2);
    }

    #[test]
    fn test_not_well_formed() {
        assert!(matches!(
            XsltInput::parse("memory:/bad.xsl", "<doc>"),
            Err(ResolveError::Parse { .. })
        ));
    }

    #[test]
    fn test_resolve() {
        assert_eq!(
            resolve_uri(Some("memory:/dir/main.xsl"), "other.xsl").unwrap(),
            "memory:/dir/other.xsl"
        );
        assert_eq!(
            resolve_uri(Some("dir/main.xsl"), "other.xsl").unwrap(),
            "dir/other.xsl"
        );
        assert_eq!(resolve_uri(None, "a.xsl").unwrap(), "a.xsl");
    }

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryResolver::new().with("memory:/a.xsl", "<a/>");
        assert_eq!(resolver.load("memory:/a.xsl").unwrap(), "<a/>");
        assert!(matches!(
            resolver.load("memory:/b.xsl"),
            Err(ResolveError::NotFound { .. })
        ));
    }
}
