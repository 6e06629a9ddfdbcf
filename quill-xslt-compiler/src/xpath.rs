//! XPath expressions.
//!
//! Expressions are lowered against the generator's focus. XPath 1.0 is
//! weakly typed: wherever the static type of an operand is known the
//! conversion is done here, otherwise an `XsltConvert` node leaves it to
//! run time.

use quill_name::{NamespaceLookup, QName, XSLT_NAMESPACE};
use quill_qil::{Cardinality, ItemKinds, QilNodeId, QilNodeType, XmlQueryType};
use quill_xpath_ast::ast::{
    Axis, BinaryExpr, BinaryOperator, Expr, KindTest, NameTest, NodeTest, PathExpr, PathRoot,
    PrincipalNodeKind, Step,
};
use quill_xpath_ast::parse_expression;
use quill_xpath_ast::value_template::{parse_value_template, ValueTemplatePart};
use quill_xslt_ast::{ErrorCode, NodeId, XslFlags, XsltElement};
use std::str::FromStr;

use crate::analyzer::expression_flags;
use crate::functions::Function;
use crate::generator::{internal_name, Focus, Generator};

const VENDOR: &str = "Quill";
const VENDOR_URL: &str = "http://github.com/quill-xslt/quill";

/// The kind of a single atomic value, if that is what `ty` is.
pub(crate) fn atomic_kind(ty: XmlQueryType) -> Option<ItemKinds> {
    [ItemKinds::STRING, ItemKinds::DOUBLE, ItemKinds::BOOLEAN]
        .into_iter()
        .find(|kind| ty.is_atomic_of(*kind))
}

impl Generator<'_> {
    /// Parse and lower an expression in the scope of node `id`.
    pub(crate) fn xpath(&mut self, text: &str, id: NodeId) -> QilNodeId {
        let program = self.program;
        let namespaces = &program.ast[id].namespaces;
        match parse_expression(text, namespaces, self.settings.max_expression_depth) {
            Ok(expr) => self.expr(&expr, id),
            Err(error) => {
                let code = if error.is_too_complex() {
                    ErrorCode::QUILL0001
                } else {
                    ErrorCode::XPST0003
                };
                self.report(id, code, format!("invalid expression '{}': {}", text, error))
            }
        }
    }

    /// An attribute value template, as a string.
    pub(crate) fn avt(&mut self, text: &str, id: NodeId) -> QilNodeId {
        let parts = match parse_value_template(text) {
            Ok(parts) => parts,
            Err(error) => {
                return self.report(
                    id,
                    ErrorCode::XPST0003,
                    format!("invalid attribute value template '{}': {}", text, error),
                )
            }
        };
        let mut items = Vec::new();
        for part in parts {
            let item = match part {
                ValueTemplatePart::Text(text) => self.g.literal_string(text),
                ValueTemplatePart::Expr { text, .. } => {
                    let value = self.xpath(&text, id);
                    self.to_string(value)
                }
            };
            items.push(item);
        }
        match items.len() {
            0 => self.g.literal_string(""),
            1 => items[0],
            _ => self.g.str_concat(items),
        }
    }

    /// The value of a variable, parameter or `xsl:with-param`: its select
    /// expression, a result tree fragment of its content, or the empty
    /// string.
    pub(crate) fn variable_value(&mut self, id: NodeId) -> QilNodeId {
        let program = self.program;
        let node = &program.ast[id];
        match &node.arg {
            Some(select) => self.xpath(select, id),
            None if node.has_content() => {
                let content = self.content(id);
                self.g.rtf_ctor(content)
            }
            None => self.g.literal_string(""),
        }
    }

    pub(crate) fn expr(&mut self, expr: &Expr, id: NodeId) -> QilNodeId {
        match expr {
            Expr::Literal(text) => self.g.literal_string(text.as_str()),
            Expr::Number(number) => self.g.literal_double(number.0),
            Expr::VarRef(name) => match self.variable(name) {
                Some(variable) => variable,
                None => self.report(
                    id,
                    ErrorCode::XPST0008,
                    format!("variable ${} is not declared", name),
                ),
            },
            Expr::FunctionCall(call) => self.function_call(&call.name, &call.args, id),
            Expr::Binary(binary) => self.binary(binary, id),
            Expr::Negate(operand) => {
                let value = self.expr(operand, id);
                let number = self.to_number(value);
                self.g.negate(number)
            }
            Expr::Filter(filter) => {
                let primary = self.expr(&filter.primary, id);
                let mut nodes = self.to_node_set(primary);
                for predicate in &filter.predicates {
                    nodes = self.predicate(nodes, predicate, false, id);
                }
                nodes
            }
            Expr::Path(path) => self.path(path, id),
        }
    }

    // conversions

    pub(crate) fn to_string(&mut self, value: QilNodeId) -> QilNodeId {
        let ty = self.g.xml_type(value);
        if ty.is_atomic_of(ItemKinds::STRING) {
            value
        } else if ty.is_single_node() {
            self.g.node_value(value)
        } else {
            self.g.xslt_convert(value, XmlQueryType::STRING)
        }
    }

    pub(crate) fn to_number(&mut self, value: QilNodeId) -> QilNodeId {
        if self.g.xml_type(value).is_atomic_of(ItemKinds::DOUBLE) {
            value
        } else {
            self.g.xslt_convert(value, XmlQueryType::DOUBLE)
        }
    }

    pub(crate) fn to_boolean(&mut self, value: QilNodeId) -> QilNodeId {
        let ty = self.g.xml_type(value);
        if ty.is_atomic_of(ItemKinds::BOOLEAN) {
            value
        } else if ty.is_node_set() {
            self.exists(value)
        } else {
            self.g.xslt_convert(value, XmlQueryType::BOOLEAN)
        }
    }

    pub(crate) fn to_node_set(&mut self, value: QilNodeId) -> QilNodeId {
        if self.g.xml_type(value).is_node_set() {
            value
        } else {
            self.g.xslt_convert(value, XmlQueryType::NODE_SET)
        }
    }

    // operators

    fn binary(&mut self, binary: &BinaryExpr, id: NodeId) -> QilNodeId {
        let left = self.expr(&binary.left, id);
        let right = self.expr(&binary.right, id);
        use BinaryOperator::*;
        match binary.operator {
            Or | And => {
                let left = self.to_boolean(left);
                let right = self.to_boolean(right);
                if binary.operator == Or {
                    self.g.or(left, right)
                } else {
                    self.g.and(left, right)
                }
            }
            Union => {
                let left = self.to_node_set(left);
                let right = self.to_node_set(right);
                self.g.union(left, right)
            }
            Add | Subtract | Multiply | Divide | Modulo => {
                let operator = match binary.operator {
                    Add => QilNodeType::Add,
                    Subtract => QilNodeType::Subtract,
                    Multiply => QilNodeType::Multiply,
                    Divide => QilNodeType::Divide,
                    _ => QilNodeType::Modulo,
                };
                let left = self.to_number(left);
                let right = self.to_number(right);
                self.g.arithmetic(operator, left, right)
            }
            Equal | NotEqual | LessThan | LessThanEqual | GreaterThan | GreaterThanEqual => {
                self.comparison(binary.operator, left, right)
            }
        }
    }

    /// Comparisons between two single atomic values are resolved here;
    /// anything involving node-sets or values of unknown type is left to
    /// the run-time library.
    fn comparison(
        &mut self,
        operator: BinaryOperator,
        left: QilNodeId,
        right: QilNodeId,
    ) -> QilNodeId {
        let left_kind = atomic_kind(self.g.xml_type(left));
        let right_kind = atomic_kind(self.g.xml_type(right));
        let (Some(left_kind), Some(right_kind)) = (left_kind, right_kind) else {
            let symbol = self.g.literal_string(operator.to_string());
            return self.g.xslt_invoke(
                internal_name("general-compare"),
                vec![symbol, left, right],
                XmlQueryType::BOOLEAN,
            );
        };
        let node_type = match operator {
            BinaryOperator::Equal => QilNodeType::Eq,
            BinaryOperator::NotEqual => QilNodeType::Ne,
            BinaryOperator::LessThan => QilNodeType::Lt,
            BinaryOperator::LessThanEqual => QilNodeType::Le,
            BinaryOperator::GreaterThan => QilNodeType::Gt,
            _ => QilNodeType::Ge,
        };
        let kinds = left_kind | right_kind;
        let equality = matches!(operator, BinaryOperator::Equal | BinaryOperator::NotEqual);
        let (left, right) = if !equality {
            (self.to_number(left), self.to_number(right))
        } else if kinds.contains(ItemKinds::BOOLEAN) {
            (self.to_boolean(left), self.to_boolean(right))
        } else if kinds.contains(ItemKinds::DOUBLE) {
            (self.to_number(left), self.to_number(right))
        } else {
            (left, right)
        };
        self.g.compare(node_type, left, right)
    }

    // location paths

    fn path(&mut self, path: &PathExpr, id: NodeId) -> QilNodeId {
        let mut nodes = match &path.root {
            PathRoot::Relative => self.current(),
            PathRoot::Absolute => {
                let current = self.current();
                self.g.axis(QilNodeType::Root, current)
            }
            PathRoot::Expr(root) => {
                let value = self.expr(root, id);
                self.to_node_set(value)
            }
        };
        for step in &path.steps {
            if step.is_self_node() {
                continue;
            }
            nodes = if self.g.xml_type(nodes).is_single_node() {
                self.step(nodes, step, id)
            } else {
                let context = self.iterate(nodes, "context");
                let selected = self.step(context, step, id);
                let each = self.g.loop_(context, selected);
                self.g.doc_order_distinct(each)
            };
        }
        nodes
    }

    fn step(&mut self, node: QilNodeId, step: &Step, id: NodeId) -> QilNodeId {
        let axis = match step.axis {
            Axis::Self_ => None,
            Axis::Child => Some(QilNodeType::Children),
            Axis::Attribute => Some(QilNodeType::Attributes),
            Axis::Parent => Some(QilNodeType::Parent),
            Axis::Ancestor => Some(QilNodeType::Ancestor),
            Axis::AncestorOrSelf => Some(QilNodeType::AncestorOrSelf),
            Axis::Descendant => Some(QilNodeType::Descendant),
            Axis::DescendantOrSelf => Some(QilNodeType::DescendantOrSelf),
            Axis::Following => Some(QilNodeType::Following),
            Axis::FollowingSibling => Some(QilNodeType::FollowingSibling),
            Axis::Preceding => Some(QilNodeType::Preceding),
            Axis::PrecedingSibling => Some(QilNodeType::PrecedingSibling),
            Axis::Namespace => Some(QilNodeType::NamespaceNodes),
        };
        let nodes = match axis {
            Some(axis) => self.g.axis(axis, node),
            None => node,
        };
        let item = self.iterate(nodes, "step");
        let mut result = match self.step_node_test(step, item) {
            Some(test) => self.g.filter(item, test),
            None if axis.is_none() => {
                // self::node() with predicates; a filter keeps it a sequence
                let always = self.g.true_();
                self.g.filter(item, always)
            }
            None => nodes,
        };
        for predicate in &step.predicates {
            result = self.predicate(result, predicate, step.axis.is_reverse(), id);
        }
        result
    }

    /// The node test of an XPath step, or `None` if every node on the axis
    /// passes it.
    fn step_node_test(&mut self, step: &Step, node: QilNodeId) -> Option<QilNodeId> {
        let principal = match step.axis.principal_node_kind() {
            PrincipalNodeKind::Element => XmlQueryType::ELEMENT,
            PrincipalNodeKind::Attribute => XmlQueryType::ATTRIBUTE,
            PrincipalNodeKind::Namespace => XmlQueryType::NAMESPACE,
        };
        let only_principal = matches!(step.axis, Axis::Attribute | Axis::Namespace);
        let test = match &step.node_test {
            NodeTest::Kind(KindTest::Node) => return None,
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
            NodeTest::Name(NameTest::Any) if only_principal => return None,
            NodeTest::Name(NameTest::Any) => self.g.is_type(node, principal),
            NodeTest::Name(NameTest::Name(name)) => {
                let is_kind = self.g.is_type(node, principal);
                let same = if step.axis == Axis::Namespace {
                    // the name of a namespace node is its prefix
                    let prefix = self.g.node_property(QilNodeType::LocalNameOf, node);
                    let literal = self.g.literal_string(name.local_name());
                    self.g.eq(prefix, literal)
                } else {
                    let name_of = self.g.node_property(QilNodeType::NameOf, node);
                    let literal = self.g.literal_qname(name.clone());
                    self.g.eq(name_of, literal)
                };
                self.g.and(is_kind, same)
            }
            NodeTest::Name(NameTest::Namespace(uri)) => {
                let is_kind = self.g.is_type(node, principal);
                let namespace = self.g.node_property(QilNodeType::NamespaceUriOf, node);
                let literal = self.g.literal_string(uri.as_str());
                let same = self.g.eq(namespace, literal);
                self.g.and(is_kind, same)
            }
        };
        Some(test)
    }

    /// Filter `nodes` by a predicate. On a reverse axis positions count
    /// from the end.
    pub(crate) fn predicate(
        &mut self,
        nodes: QilNodeId,
        predicate: &Expr,
        reverse: bool,
        id: NodeId,
    ) -> QilNodeId {
        let flags = expression_flags(predicate);
        let positional = flags.contains(XslFlags::POSITION)
            || !flags.has_known_type()
            || flags.type_bits() == XslFlags::NUMBER;
        let needs_last = flags.contains(XslFlags::LAST) || (reverse && positional);
        if !needs_last {
            let item = self.iterate(nodes, "item");
            let position = self.g.position_of(item);
            let focus = Focus {
                current: Some(item),
                position: Some(position),
                last: None,
            };
            let value = self.with_focus(focus, |this| this.expr(predicate, id));
            let condition = self.predicate_condition(value, position);
            return self.g.filter(item, condition);
        }
        let sequence = self.bind(nodes, "sequence");
        let item = self.iterate(sequence, "item");
        let last = self.g.length(sequence);
        let mut position = self.g.position_of(item);
        if reverse {
            let from_end = self.g.arithmetic(QilNodeType::Subtract, last, position);
            let one = self.g.literal_double(1.0);
            position = self.g.arithmetic(QilNodeType::Add, from_end, one);
        }
        let value = self.with_focus(Focus::new(item, position, last), |this| {
            this.expr(predicate, id)
        });
        let condition = self.predicate_condition(value, position);
        let filtered = self.g.filter(item, condition);
        self.g.loop_(sequence, filtered)
    }

    /// A predicate value as a condition: a number is compared with the
    /// position, anything else is converted to a boolean.
    pub(crate) fn predicate_condition(
        &mut self,
        value: QilNodeId,
        position: QilNodeId,
    ) -> QilNodeId {
        let ty = self.g.xml_type(value);
        if ty.is_atomic_of(ItemKinds::DOUBLE) {
            return self.g.eq(position, value);
        }
        if ty.is_node_set() || atomic_kind(ty).is_some() {
            return self.to_boolean(value);
        }
        let bound = self.bind(value, "predicate");
        let is_number = self.g.is_type(bound, XmlQueryType::DOUBLE);
        let number = self.g.xslt_convert(bound, XmlQueryType::DOUBLE);
        let numeric = self.g.eq(position, number);
        let boolean = self.g.xslt_convert(bound, XmlQueryType::BOOLEAN);
        let condition = self.g.conditional(is_number, numeric, boolean);
        self.g.loop_(bound, condition)
    }

    // functions

    fn function_call(&mut self, name: &QName, args: &[Expr], id: NodeId) -> QilNodeId {
        let Some(function) = Function::lookup(name) else {
            return self.report(id, ErrorCode::XPST0017, format!("unknown function {}()", name));
        };
        if !function.accepts(args.len()) {
            return self.report(
                id,
                ErrorCode::XPST0017,
                format!("{}() does not take {} arguments", name, args.len()),
            );
        }
        match function {
            Function::Key => return self.key_call(args, id),
            Function::SystemProperty | Function::ElementAvailable | Function::FunctionAvailable => {
                if let Some(value) = self.static_call(function, args, id) {
                    return value;
                }
            }
            _ => {}
        }
        let mut values = args.iter().map(|arg| self.expr(arg, id)).collect::<Vec<_>>();
        if values.is_empty() && function.defaults_to_context() {
            let current = self.current();
            values.push(current);
        }
        self.library_call(function, values, id)
    }

    fn library_call(
        &mut self,
        function: Function,
        values: Vec<QilNodeId>,
        id: NodeId,
    ) -> QilNodeId {
        use Function::*;
        let first = values.first().copied();
        match (function, first) {
            (Last, _) => self.last(),
            (Position, _) => self.position(),
            (Current, _) => self.xslt_current(),
            (True, _) => self.g.true_(),
            (False, _) => self.g.false_(),
            (Count, Some(value)) => {
                let nodes = self.to_node_set(value);
                self.g.length(nodes)
            }
            (Id, Some(value)) => {
                let current = self.current();
                self.per_string(value, &mut |this, string| this.g.deref(current, string))
            }
            (LocalName, Some(value)) => self.node_string(value, &mut |this, node| {
                this.g.node_property(QilNodeType::LocalNameOf, node)
            }),
            (NamespaceUri, Some(value)) => self.node_string(value, &mut |this, node| {
                this.g.node_property(QilNodeType::NamespaceUriOf, node)
            }),
            (Name, Some(value)) => self.node_string(value, &mut |this, node| this.node_name(node)),
            (GenerateId, Some(value)) => {
                self.node_string(value, &mut |this, node| this.g.xslt_generate_id(node))
            }
            (String, Some(value)) => self.to_string(value),
            (StringLength, Some(value)) => {
                let string = self.to_string(value);
                self.g.str_length(string)
            }
            (Number, Some(value)) => self.to_number(value),
            (Boolean, Some(value)) => self.to_boolean(value),
            (Not, Some(value)) => {
                let boolean = self.to_boolean(value);
                self.g.not(boolean)
            }
            (Concat, _) => {
                let strings = values.into_iter().map(|value| self.to_string(value)).collect();
                self.g.str_concat(strings)
            }
            (Sum, Some(value)) => {
                let nodes = self.to_node_set(value);
                let node = self.iterate(nodes, "node");
                let string = self.g.node_value(node);
                let number = self.g.xslt_convert(string, XmlQueryType::DOUBLE);
                let numbers = self.g.loop_(node, number);
                self.g.sum(numbers)
            }
            (
                StartsWith | Contains | SubstringBefore | SubstringAfter | NormalizeSpace
                | Translate,
                _,
            ) => {
                let strings = values.into_iter().map(|value| self.to_string(value)).collect();
                let ty = function_type(function);
                self.g.xslt_invoke(internal_name(&function.to_string()), strings, ty)
            }
            (Substring, Some(value)) => {
                let mut converted = vec![self.to_string(value)];
                for value in values.into_iter().skip(1) {
                    converted.push(self.to_number(value));
                }
                self.g
                    .xslt_invoke(internal_name("substring"), converted, XmlQueryType::STRING)
            }
            (Floor | Ceiling | Round, Some(value)) => {
                let number = self.to_number(value);
                self.g.xslt_invoke(
                    internal_name(&function.to_string()),
                    vec![number],
                    XmlQueryType::DOUBLE,
                )
            }
            (Lang | UnparsedEntityUri, Some(value)) => {
                let string = self.to_string(value);
                let current = self.current();
                self.g.xslt_invoke(
                    internal_name(&function.to_string()),
                    vec![string, current],
                    function_type(function),
                )
            }
            (Document, Some(value)) => {
                let mut args = vec![value];
                if let Some(base) = values.get(1).copied() {
                    args.push(self.to_node_set(base));
                }
                let module = self.program.ast[id].location.module;
                let uri = self.diagnostics.module_uri(module).to_string();
                args.push(self.g.literal_string(uri));
                self.g
                    .xslt_invoke(internal_name("document"), args, XmlQueryType::NODE_SET)
            }
            (FormatNumber, Some(value)) => {
                let number = self.to_number(value);
                let picture = match values.get(1) {
                    Some(picture) => self.to_string(*picture),
                    None => self.g.literal_string(""),
                };
                let format = match values.get(2) {
                    Some(format) => self.decimal_format_name(*format, id),
                    None => self.g.literal_string(""),
                };
                self.g.xslt_invoke(
                    internal_name("format-number"),
                    vec![number, picture, format],
                    XmlQueryType::STRING,
                )
            }
            (SystemProperty | ElementAvailable | FunctionAvailable, Some(value)) => {
                let name = self.to_string(value);
                let resolver = self.namespace_resolver(id, false);
                self.g.xslt_invoke(
                    internal_name(&function.to_string()),
                    vec![name, resolver],
                    function_type(function),
                )
            }
            // arity is checked before lowering
            (_, None) => self.internal_error("missing function argument"),
            (Key, Some(_)) => self.internal_error("key() is lowered separately"),
        }
    }

    /// Apply `f` to `value` if it is a single node, otherwise to the first
    /// node of it, giving the empty string for an empty node-set.
    fn node_string(
        &mut self,
        value: QilNodeId,
        f: &mut dyn FnMut(&mut Self, QilNodeId) -> QilNodeId,
    ) -> QilNodeId {
        if self.g.xml_type(value).is_single_node() {
            return f(self, value);
        }
        let nodes = self.to_node_set(value);
        let node = self.iterate(nodes, "node");
        let position = self.g.position_of(node);
        let one = self.g.literal_double(1.0);
        let is_first = self.g.eq(position, one);
        let first = self.g.filter(node, is_first);
        let item = self.iterate(first, "first");
        let string = f(self, item);
        let strings = self.g.loop_(item, string);
        self.g.str_concat(vec![strings])
    }

    /// `prefix:local`, or just `local` for a node without a prefix.
    fn node_name(&mut self, node: QilNodeId) -> QilNodeId {
        let prefix = self.g.node_property(QilNodeType::PrefixOf, node);
        let local = self.g.node_property(QilNodeType::LocalNameOf, node);
        let empty = self.g.literal_string("");
        let unprefixed = self.g.eq(prefix, empty);
        let colon = self.g.literal_string(":");
        let prefixed = self.g.str_concat(vec![prefix, colon, local]);
        self.g.conditional(unprefixed, local, prefixed)
    }

    /// Apply `f` to every string value of `value`: the string value of
    /// each node of a node-set, or the value itself as a string. The
    /// results are unioned.
    pub(crate) fn per_string(
        &mut self,
        value: QilNodeId,
        f: &mut dyn FnMut(&mut Self, QilNodeId) -> QilNodeId,
    ) -> QilNodeId {
        let ty = self.g.xml_type(value);
        if ty.is_node_set() {
            let node = self.iterate(value, "node");
            let string = self.g.node_value(node);
            let selected = f(self, string);
            let each = self.g.loop_(node, selected);
            return self.g.doc_order_distinct(each);
        }
        if atomic_kind(ty).is_some() {
            let string = self.to_string(value);
            return f(self, string);
        }
        let bound = self.bind(value, "value");
        let nodes = self.g.xslt_convert(bound, XmlQueryType::NODE_SET);
        let from_nodes = self.per_string(nodes, f);
        let string = self.g.xslt_convert(bound, XmlQueryType::STRING);
        let from_string = f(self, string);
        let is_nodes = self.g.is_type(bound, XmlQueryType::NODE_SET);
        let choice = self.g.conditional(is_nodes, from_nodes, from_string);
        self.g.loop_(bound, choice)
    }

    fn key_call(&mut self, args: &[Expr], id: NodeId) -> QilNodeId {
        let value = self.expr(&args[1], id);
        let current = self.current();
        if let Expr::Literal(text) = &args[0] {
            let Some(name) = self.static_qname(text, id) else {
                return self.report(id, ErrorCode::XTSE0280, format!("invalid key name '{}'", text));
            };
            let Some(key) = self.keys.get(&name).copied() else {
                return self.report(id, ErrorCode::XTDE1260, format!("no key named {}", name));
            };
            return self.per_string(value, &mut |this, string| {
                this.g.invoke(key.function, vec![current, string])
            });
        }
        let name = self.expr(&args[0], id);
        let name = self.to_string(name);
        let resolver = self.namespace_resolver(id, false);
        let qname = self.g.str_parse_qname(name, resolver);
        let qname = self.bind(qname, "key");
        let lookup = self.key_lookup_function();
        let selected = self.per_string(value, &mut |this, string| {
            this.g.invoke(lookup, vec![qname, current, string])
        });
        self.g.loop_(qname, selected)
    }

    /// `system-property()`, `element-available()` and
    /// `function-available()` with a literal name are answered here.
    fn static_call(&mut self, function: Function, args: &[Expr], id: NodeId) -> Option<QilNodeId> {
        let Some(Expr::Literal(text)) = args.first() else {
            return None;
        };
        let Some(name) = self.static_qname(text, id) else {
            return Some(self.report(id, ErrorCode::XTSE0280, format!("invalid name '{}'", text)));
        };
        let xslt = name.namespace() == Some(XSLT_NAMESPACE);
        let value = match function {
            Function::SystemProperty => match name.local_name() {
                "version" if xslt => self.g.literal_double(1.0),
                "vendor" if xslt => self.g.literal_string(VENDOR),
                "vendor-url" if xslt => self.g.literal_string(VENDOR_URL),
                _ => self.g.literal_string(""),
            },
            Function::ElementAvailable => {
                let available = xslt
                    && XsltElement::from_str(name.local_name())
                        .is_ok_and(|element| !element.is_declaration());
                self.g.boolean(available)
            }
            Function::FunctionAvailable => self.g.boolean(Function::lookup(&name).is_some()),
            _ => return None,
        };
        Some(value)
    }

    /// A lexical QName resolved with the namespaces in scope at `id`.
    pub(crate) fn static_qname(&self, text: &str, id: NodeId) -> Option<QName> {
        let program = self.program;
        QName::parse(text.trim(), &program.ast[id].namespaces).ok()
    }

    /// The name of a decimal format as the run time looks it up: its
    /// expanded name.
    fn decimal_format_name(&mut self, value: QilNodeId, id: NodeId) -> QilNodeId {
        let literal = self.g.node(value).string().map(String::from);
        if self.g.node_type(value) == QilNodeType::LiteralString {
            if let Some(text) = literal {
                return match self.static_qname(&text, id) {
                    Some(name) => self.g.literal_string(name.expanded()),
                    None => self.report(
                        id,
                        ErrorCode::XTSE0280,
                        format!("invalid decimal format name '{}'", text),
                    ),
                };
            }
        }
        let name = self.to_string(value);
        let resolver = self.namespace_resolver(id, false);
        self.g
            .xslt_invoke(internal_name("expand-qname"), vec![name, resolver], XmlQueryType::STRING)
    }

    /// The namespace declarations in scope at `id` as a sequence, for
    /// resolving names at run time.
    pub(crate) fn namespace_resolver(&mut self, id: NodeId, with_default: bool) -> QilNodeId {
        let program = self.program;
        let mut declarations = Vec::new();
        for (prefix, uri) in program.ast[id].namespaces.in_scope() {
            if prefix.is_empty() && !with_default {
                continue;
            }
            let prefix = self.g.literal_string(prefix);
            let uri = self.g.literal_string(uri);
            declarations.push(self.g.namespace_decl(prefix, uri));
        }
        self.sequence(declarations)
    }

    /// Look a prefix up in the scope of `id`.
    pub(crate) fn lookup_prefix(&self, prefix: &str, id: NodeId) -> Option<String> {
        let program = self.program;
        program.ast[id].namespaces.by_prefix(prefix).map(String::from)
    }
}

fn function_type(function: Function) -> XmlQueryType {
    let result = function.signature().result;
    if result == XslFlags::STRING {
        XmlQueryType::STRING
    } else if result == XslFlags::NUMBER {
        XmlQueryType::DOUBLE
    } else if result == XslFlags::BOOLEAN {
        XmlQueryType::BOOLEAN
    } else if result == XslFlags::NODESET {
        XmlQueryType::NODE_SET
    } else {
        XmlQueryType::new(ItemKinds::STRING | ItemKinds::DOUBLE, Cardinality::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_kind() {
        assert_eq!(atomic_kind(XmlQueryType::STRING), Some(ItemKinds::STRING));
        assert_eq!(atomic_kind(XmlQueryType::BOOLEAN), Some(ItemKinds::BOOLEAN));
        assert_eq!(atomic_kind(XmlQueryType::NODE), None);
        assert_eq!(atomic_kind(XmlQueryType::ITEM_STAR), None);
    }

    #[test]
    fn test_function_types() {
        assert_eq!(function_type(Function::Contains), XmlQueryType::BOOLEAN);
        assert_eq!(function_type(Function::Translate), XmlQueryType::STRING);
        assert_eq!(function_type(Function::Round), XmlQueryType::DOUBLE);
        assert!(!function_type(Function::SystemProperty).is_node_set());
    }
}
