use ordered_float::OrderedFloat;
use quill_name::QName;
use strum_macros::Display;

use crate::arena::Handle;
use crate::types::XmlQueryType;

pub type QilNodeId = Handle<QilNode>;

/// The operator of a graph node. The expected children of each operator
/// are listed in brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum QilNodeType {
    /// Placeholder for a function body that is generated later.
    Unknown,
    /// [items...] a plain list, not a value (formal and actual parameter
    /// lists, sort key lists).
    List,
    /// [items...] the concatenation of its children.
    Sequence,

    /// [message] raises a dynamic error.
    Error,
    /// [message] reports a message and produces nothing.
    Warning,

    /// [binding] iterates over each item of the binding.
    For,
    /// [binding] binds the whole value.
    Let,
    /// [] a function parameter, or [default] a global parameter.
    Parameter,
    /// [iterator] the 1-based position of the current item.
    PositionOf,

    True,
    False,
    LiteralString,
    LiteralDouble,
    LiteralQName,

    /// [left, right]
    And,
    /// [left, right]
    Or,
    /// [operand]
    Not,
    /// [condition, then, else]; only the selected branch is evaluated.
    Conditional,

    /// [sequence]
    Length,
    /// [sequence]
    IsEmpty,
    /// [left, right] node sets, result in document order.
    Union,
    /// [sequence]
    Sum,

    Negate,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    /// [strings...]
    StrConcat,
    /// [string]
    StrLength,
    /// [name, namespace-or-resolver] a resolver is a Sequence of
    /// NamespaceDecl nodes.
    StrParseQName,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// [left, right] node identity.
    Is,
    /// [left, right] document order.
    Before,
    After,

    /// [iterator, body]
    Loop,
    /// [iterator, condition]
    Filter,
    /// [iterator, List of SortKey]; stable.
    Sort,
    /// [key, collation]
    SortKey,
    /// [sequence]
    DocOrderDistinct,

    /// [List of Parameter, body]
    Function,
    /// [function, List of arguments]
    Invoke,

    /// [] the node the transformation was started on.
    XmlContext,
    Children,
    Attributes,
    Parent,
    Root,
    Descendant,
    DescendantOrSelf,
    Ancestor,
    AncestorOrSelf,
    Following,
    FollowingSibling,
    Preceding,
    PrecedingSibling,
    NamespaceNodes,
    /// [context, ids] elements whose ID is among the whitespace separated ids.
    Deref,

    NameOf,
    LocalNameOf,
    NamespaceUriOf,
    PrefixOf,
    /// [node] the string value.
    NodeValue,

    /// [value] whether the value matches the type stored on the node.
    IsType,

    /// [name, content]
    ElementCtor,
    /// [name, value]
    AttributeCtor,
    CommentCtor,
    /// [name, value]
    PICtor,
    TextCtor,
    RawTextCtor,
    /// [prefix, uri]
    NamespaceDecl,
    /// [content] a result tree fragment.
    RtfCtor,

    /// [node, content] shallow copy; content is only evaluated for
    /// elements and documents.
    XsltCopy,
    /// [sequence] deep copy.
    XsltCopyOf,
    XsltGenerateId,
    /// [value] converts to the type stored on the node.
    XsltConvert,
    /// [args...] a call into the runtime library; the function name is the
    /// node value.
    XsltInvoke,
}

impl QilNodeType {
    /// Nodes other nodes refer to by identity.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            QilNodeType::For | QilNodeType::Let | QilNodeType::Parameter | QilNodeType::Function
        )
    }

    /// Operators whose first child is an iterator they bind.
    pub fn binds_iterator(self) -> bool {
        matches!(
            self,
            QilNodeType::Loop | QilNodeType::Filter | QilNodeType::Sort
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum QilValue {
    None,
    String(String),
    Double(OrderedFloat<f64>),
    QName(QName),
    /// Debug name of an iterator or parameter.
    Name(String),
    Function { name: QName, side_effects: bool },
    Type(XmlQueryType),
}

/// Where a node came from in the stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SourceLine {
    pub module: u32,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QilNode {
    pub node_type: QilNodeType,
    pub children: Vec<QilNodeId>,
    pub value: QilValue,
    pub xml_type: XmlQueryType,
    pub source_line: Option<SourceLine>,
}

impl QilNode {
    pub fn name(&self) -> Option<&str> {
        match &self.value {
            QilValue::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match &self.value {
            QilValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn function_name(&self) -> Option<&QName> {
        match &self.value {
            QilValue::Function { name, .. } => Some(name),
            _ => None,
        }
    }
}
