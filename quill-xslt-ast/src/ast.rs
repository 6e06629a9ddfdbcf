//! The stylesheet AST.
//!
//! Every instruction and declaration is an [`XslNode`] stored in one
//! [`Ast`] arena. Nodes are created by the loader, their content is set
//! once, and afterwards only their flags change.

use std::ops::{Index, IndexMut};

use quill_name::QName;
use strum_macros::Display;

use crate::flags::XslFlags;
use crate::ns::NsList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a stylesheet level in a [`Program`](crate::Program).
pub type StylesheetId = usize;

/// Where a node was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Location {
    /// Declaration order of the stylesheet module.
    pub module: usize,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum XslNodeType {
    ApplyImports,
    ApplyTemplates,
    Attribute,
    AttributeSet,
    CallTemplate,
    Choose,
    Comment,
    Copy,
    CopyOf,
    Element,
    /// Raises a dynamic error when evaluated; stands in for constructs that
    /// could not be compiled under forwards-compatible processing.
    Error,
    ForEach,
    If,
    Key,
    /// A plain sequence of instructions, such as fallback content.
    List,
    LiteralAttribute,
    LiteralElement,
    Message,
    Nop,
    Number,
    Otherwise,
    Param,
    PI,
    Sort,
    Template,
    Text,
    UseAttributeSet,
    ValueOf,
    ValueOfDoe,
    Variable,
    When,
    WithParam,
}

/// The language level a node was loaded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum XslVersion {
    #[default]
    V1,
    V2,
    /// A version this processor does not know: unknown constructs are
    /// tolerated instead of rejected.
    ForwardsCompatible,
}

impl XslVersion {
    pub fn parse(value: &str) -> Option<XslVersion> {
        let number: f64 = value.trim().parse().ok()?;
        Some(if number == 1.0 {
            XslVersion::V1
        } else if number == 2.0 {
            XslVersion::V2
        } else {
            XslVersion::ForwardsCompatible
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInfo {
    /// `None` is the default mode.
    pub mode: Option<QName>,
    /// An explicit priority; `None` means the default priority of the
    /// pattern is used.
    pub priority: Option<f64>,
    pub import_precedence: i32,
    /// Declaration order within the stylesheet level.
    pub order: i32,
    pub stylesheet: StylesheetId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Global,
    Local,
    WithParam,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortInfo {
    pub lang: Option<String>,
    pub data_type: Option<String>,
    pub order: Option<String>,
    pub case_order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberLevel {
    #[default]
    Single,
    Multiple,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NumberInfo {
    pub level: NumberLevel,
    pub count: Option<String>,
    pub from: Option<String>,
    pub value: Option<String>,
    pub format: Option<String>,
    pub lang: Option<String>,
    pub letter_value: Option<String>,
    pub grouping_separator: Option<String>,
    pub grouping_size: Option<String>,
}

/// The parts of a node that only some kinds have.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum XslDetail {
    #[default]
    None,
    Template(TemplateInfo),
    /// Declaration order of an attribute set and the precedence of its
    /// stylesheet level.
    AttributeSet { import_precedence: i32, order: i32 },
    Key { match_: String, use_: String },
    Variable(VarKind),
    ApplyTemplates { mode: Option<QName> },
    Sort(SortInfo),
    Number(NumberInfo),
    /// `xsl:element` and `xsl:attribute`: the namespace attribute value
    /// template.
    Constructor { namespace: Option<String> },
    /// Namespace nodes a literal result element writes, `(prefix, uri)`.
    LiteralElement { namespaces: Vec<(String, String)> },
    Text { disable_output_escaping: bool },
    Message { terminate: bool },
    Error { message: String },
}

#[derive(Debug, Clone)]
pub struct XslNode {
    pub kind: XslNodeType,
    pub name: Option<QName>,
    /// The main expression or text of the node, depending on its kind: the
    /// select of `for-each`, the test of `if`, the match pattern of a
    /// template, the value of a literal attribute, and so on.
    pub arg: Option<String>,
    content: Option<Vec<NodeId>>,
    pub location: Location,
    pub namespaces: NsList,
    pub version: XslVersion,
    pub flags: XslFlags,
    pub detail: XslDetail,
}

impl XslNode {
    pub fn new(
        kind: XslNodeType,
        location: Location,
        namespaces: NsList,
        version: XslVersion,
    ) -> Self {
        XslNode {
            kind,
            name: None,
            arg: None,
            content: None,
            location,
            namespaces,
            version,
            flags: XslFlags::empty(),
            detail: XslDetail::None,
        }
    }

    pub fn with_name(self, name: QName) -> Self {
        XslNode {
            name: Some(name),
            ..self
        }
    }

    pub fn with_arg(self, arg: Option<String>) -> Self {
        XslNode { arg, ..self }
    }

    pub fn with_detail(self, detail: XslDetail) -> Self {
        XslNode { detail, ..self }
    }

    /// The content, empty if the node has none.
    pub fn content(&self) -> &[NodeId] {
        self.content.as_deref().unwrap_or(&[])
    }

    /// Whether content was ever set, as opposed to set to nothing.
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_forwards_compatible(&self) -> bool {
        self.version == XslVersion::ForwardsCompatible
    }

    pub fn template(&self) -> Option<&TemplateInfo> {
        match &self.detail {
            XslDetail::Template(info) => Some(info),
            _ => None,
        }
    }

    pub fn var_kind(&self) -> Option<VarKind> {
        match self.detail {
            XslDetail::Variable(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.var_kind() == Some(VarKind::Global)
    }

    pub fn mode(&self) -> Option<&QName> {
        match &self.detail {
            XslDetail::Template(info) => info.mode.as_ref(),
            XslDetail::ApplyTemplates { mode } => mode.as_ref(),
            _ => None,
        }
    }
}

/// Owns every node of one compilation.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<XslNode>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: XslNode) -> NodeId {
        self.nodes.push(node);
        NodeId(u32::try_from(self.nodes.len() - 1).unwrap_or(u32::MAX))
    }

    /// Set the content of a node. Content is set once; a node with no
    /// children still gets an empty list.
    pub fn set_content(&mut self, id: NodeId, content: Vec<NodeId>) {
        debug_assert!(self.nodes[id.index()].content.is_none());
        self.nodes[id.index()].content = Some(content);
    }

    /// Replace content that was already set. Only the complexity rewriter
    /// does this, before any analysis.
    pub(crate) fn replace_content(&mut self, id: NodeId, content: Vec<NodeId>) {
        self.nodes[id.index()].content = Some(content);
    }

    pub fn content(&self, id: NodeId) -> &[NodeId] {
        self.nodes[id.index()].content()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// The node and all its descendants, parents before children.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            result.push(id);
            stack.extend(self.content(id).iter().rev());
        }
        result
    }
}

impl Index<NodeId> for Ast {
    type Output = XslNode;

    fn index(&self, id: NodeId) -> &XslNode {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut XslNode {
        &mut self.nodes[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: XslNodeType) -> XslNode {
        XslNode::new(kind, Location::default(), NsList::new(), XslVersion::V1)
    }

    #[test]
    fn test_content_absent_versus_empty() {
        let mut ast = Ast::new();
        let a = ast.add(node(XslNodeType::If));
        let b = ast.add(node(XslNodeType::If));
        ast.set_content(b, vec![]);
        assert!(!ast[a].has_content());
        assert!(ast[b].has_content());
        assert!(ast.content(a).is_empty());
    }

    #[test]
    fn test_descendants() {
        let mut ast = Ast::new();
        let root = ast.add(node(XslNodeType::Template));
        let a = ast.add(node(XslNodeType::If));
        let b = ast.add(node(XslNodeType::Text));
        let c = ast.add(node(XslNodeType::Text));
        ast.set_content(a, vec![b]);
        ast.set_content(root, vec![a, c]);
        assert_eq!(ast.descendants(root), vec![root, a, b, c]);
    }

    #[test]
    fn test_version() {
        assert_eq!(XslVersion::parse("1.0"), Some(XslVersion::V1));
        assert_eq!(XslVersion::parse("2.0"), Some(XslVersion::V2));
        assert_eq!(
            XslVersion::parse("1.1"),
            Some(XslVersion::ForwardsCompatible)
        );
        assert_eq!(XslVersion::parse("x"), None);
    }
}
