use ordered_float::OrderedFloat;
use quill_name::QName;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Expr {
    Literal(String),
    Number(OrderedFloat<f64>),
    VarRef(QName),
    FunctionCall(FunctionCall),
    Binary(BinaryExpr),
    Negate(Box<Expr>),
    /// A primary expression followed by one or more predicates.
    Filter(FilterExpr),
    Path(PathExpr),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FunctionCall {
    pub name: QName,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BinaryExpr {
    pub operator: BinaryOperator,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum BinaryOperator {
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanEqual,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "div")]
    Divide,
    #[strum(serialize = "mod")]
    Modulo,
    #[strum(serialize = "|")]
    Union,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanEqual
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FilterExpr {
    pub primary: Box<Expr>,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PathExpr {
    pub root: PathRoot,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PathRoot {
    /// Steps start at the context node.
    Relative,
    /// Steps start at the root of the context node's tree.
    Absolute,
    /// Steps start at each node the expression selects.
    Expr(Box<Expr>),
}

/// A location step. `//` is expanded into an explicit
/// `descendant-or-self::node()` step while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    pub fn descendant_or_self_node() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            node_test: NodeTest::Kind(KindTest::Node),
            predicates: Vec::new(),
        }
    }

    /// `.` with no predicates.
    pub fn is_self_node(&self) -> bool {
        self.axis == Axis::Self_
            && self.node_test == NodeTest::Kind(KindTest::Node)
            && self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[strum(serialize_all = "kebab-case")]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    #[strum(serialize = "self")]
    Self_,
}

impl Axis {
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::Parent
                | Axis::Preceding
                | Axis::PrecedingSibling
        )
    }

    pub fn principal_node_kind(self) -> PrincipalNodeKind {
        match self {
            Axis::Attribute => PrincipalNodeKind::Attribute,
            Axis::Namespace => PrincipalNodeKind::Namespace,
            _ => PrincipalNodeKind::Element,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalNodeKind {
    Element,
    Attribute,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NodeTest {
    Name(NameTest),
    Kind(KindTest),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`
    Namespace(String),
    Name(QName),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum KindTest {
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

impl Expr {
    /// The variable name when the whole expression is a single variable
    /// reference.
    pub fn as_var_ref(&self) -> Option<&QName> {
        match self {
            Expr::VarRef(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Number(_))
    }

    pub fn function_call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::FunctionCall(FunctionCall {
            name: QName::unprefixed(name),
            args,
        })
    }

    /// `child::node()`, the default select of `xsl:apply-templates`.
    pub fn child_nodes() -> Expr {
        Expr::Path(PathExpr {
            root: PathRoot::Relative,
            steps: vec![Step {
                axis: Axis::Child,
                node_test: NodeTest::Kind(KindTest::Node),
                predicates: Vec::new(),
            }],
        })
    }

    /// `self::node()`
    pub fn context_node() -> Expr {
        Expr::Path(PathExpr {
            root: PathRoot::Relative,
            steps: vec![Step {
                axis: Axis::Self_,
                node_test: NodeTest::Kind(KindTest::Node),
                predicates: Vec::new(),
            }],
        })
    }

    /// Visit this expression and every sub-expression, outermost first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Number(_) | Expr::VarRef(_) => {}
            Expr::FunctionCall(call) => {
                for arg in &call.args {
                    arg.walk(f);
                }
            }
            Expr::Binary(binary) => {
                binary.left.walk(f);
                binary.right.walk(f);
            }
            Expr::Negate(inner) => inner.walk(f),
            Expr::Filter(filter) => {
                filter.primary.walk(f);
                for predicate in &filter.predicates {
                    predicate.walk(f);
                }
            }
            Expr::Path(path) => {
                if let PathRoot::Expr(root) = &path.root {
                    root.walk(f);
                }
                for step in &path.steps {
                    for predicate in &step.predicates {
                        predicate.walk(f);
                    }
                }
            }
        }
    }

    /// Every variable referenced anywhere in the expression.
    pub fn variables(&self) -> Vec<&QName> {
        let mut names = Vec::new();
        self.walk(&mut |expr| {
            if let Expr::VarRef(name) = expr {
                names.push(name);
            }
        });
        names
    }
}
