//! Node constructors. Each one computes the static type of the node from
//! the types of its children, so every node's type is a supertype of what
//! it can produce.

use ordered_float::OrderedFloat;
use quill_name::QName;

use crate::graph::QilGraph;
use crate::node::{QilNodeId, QilNodeType, QilValue};
use crate::types::{Cardinality, ItemKinds, XmlQueryType};

const OPTIONAL_PARENT: XmlQueryType = XmlQueryType::new(
    ItemKinds::DOCUMENT.union(ItemKinds::ELEMENT),
    Cardinality::ZERO_OR_ONE,
);
const ANCESTORS: XmlQueryType = XmlQueryType::new(
    ItemKinds::DOCUMENT.union(ItemKinds::ELEMENT),
    Cardinality::ZERO_OR_MORE,
);
const CONTENT_SET: XmlQueryType = XmlQueryType::new(ItemKinds::CONTENT, Cardinality::ZERO_OR_MORE);

impl QilGraph {
    fn op(
        &mut self,
        node_type: QilNodeType,
        children: Vec<QilNodeId>,
        ty: XmlQueryType,
    ) -> QilNodeId {
        self.add(node_type, children, QilValue::None, ty)
    }

    pub fn literal_string(&mut self, value: impl Into<String>) -> QilNodeId {
        self.add(
            QilNodeType::LiteralString,
            vec![],
            QilValue::String(value.into()),
            XmlQueryType::STRING,
        )
    }

    pub fn literal_double(&mut self, value: f64) -> QilNodeId {
        self.add(
            QilNodeType::LiteralDouble,
            vec![],
            QilValue::Double(OrderedFloat(value)),
            XmlQueryType::DOUBLE,
        )
    }

    pub fn literal_qname(&mut self, name: QName) -> QilNodeId {
        self.add(
            QilNodeType::LiteralQName,
            vec![],
            QilValue::QName(name),
            XmlQueryType::QNAME,
        )
    }

    pub fn true_(&mut self) -> QilNodeId {
        self.op(QilNodeType::True, vec![], XmlQueryType::BOOLEAN)
    }

    pub fn false_(&mut self) -> QilNodeId {
        self.op(QilNodeType::False, vec![], XmlQueryType::BOOLEAN)
    }

    pub fn boolean(&mut self, value: bool) -> QilNodeId {
        if value {
            self.true_()
        } else {
            self.false_()
        }
    }

    pub fn empty(&mut self) -> QilNodeId {
        self.op(QilNodeType::Sequence, vec![], XmlQueryType::EMPTY)
    }

    pub fn sequence(&mut self, items: Vec<QilNodeId>) -> QilNodeId {
        let ty = items
            .iter()
            .fold(XmlQueryType::EMPTY, |ty, item| ty.sequence(self.xml_type(*item)));
        self.op(QilNodeType::Sequence, items, ty)
    }

    /// A plain list of nodes that is not itself a value.
    pub fn list(&mut self, items: Vec<QilNodeId>) -> QilNodeId {
        self.op(QilNodeType::List, items, XmlQueryType::EMPTY)
    }

    pub fn and(&mut self, left: QilNodeId, right: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::And, vec![left, right], XmlQueryType::BOOLEAN)
    }

    pub fn or(&mut self, left: QilNodeId, right: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::Or, vec![left, right], XmlQueryType::BOOLEAN)
    }

    pub fn not(&mut self, operand: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::Not, vec![operand], XmlQueryType::BOOLEAN)
    }

    pub fn conditional(
        &mut self,
        condition: QilNodeId,
        then: QilNodeId,
        otherwise: QilNodeId,
    ) -> QilNodeId {
        let ty = self.xml_type(then).union(self.xml_type(otherwise));
        self.op(QilNodeType::Conditional, vec![condition, then, otherwise], ty)
    }

    /// An iterator over each item of `binding`.
    pub fn for_(&mut self, binding: QilNodeId) -> QilNodeId {
        let ty = self.xml_type(binding).item_type();
        self.op(QilNodeType::For, vec![binding], ty)
    }

    /// An iterator bound once to the whole of `binding`.
    pub fn let_(&mut self, binding: QilNodeId) -> QilNodeId {
        let ty = self.xml_type(binding);
        self.op(QilNodeType::Let, vec![binding], ty)
    }

    pub fn parameter(&mut self, name: impl Into<String>, ty: XmlQueryType) -> QilNodeId {
        self.add(QilNodeType::Parameter, vec![], QilValue::Name(name.into()), ty)
    }

    /// Attach a debugging name to an iterator.
    pub fn set_debug_name(&mut self, iterator: QilNodeId, name: impl Into<String>) {
        self.node_mut(iterator).value = QilValue::Name(name.into());
    }

    pub fn position_of(&mut self, iterator: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::PositionOf, vec![iterator], XmlQueryType::DOUBLE)
    }

    /// How many times a loop over `iterator` runs its body.
    fn iterations(&self, iterator: QilNodeId) -> Cardinality {
        match self.node_type(iterator) {
            QilNodeType::For => match self.child(iterator, 0) {
                Some(binding) => self.xml_type(binding).cardinality,
                None => Cardinality::ZERO_OR_MORE,
            },
            _ => Cardinality::ONE,
        }
    }

    pub fn loop_(&mut self, iterator: QilNodeId, body: QilNodeId) -> QilNodeId {
        let iterations = self.iterations(iterator);
        let body_type = self.xml_type(body);
        let mut cardinality = iterations.product(body_type.cardinality);
        if iterations.contains(Cardinality::ZERO) {
            cardinality |= Cardinality::ZERO;
        }
        let ty = XmlQueryType::new(body_type.items, cardinality);
        self.op(QilNodeType::Loop, vec![iterator, body], ty)
    }

    pub fn filter(&mut self, iterator: QilNodeId, condition: QilNodeId) -> QilNodeId {
        let iterations = self.iterations(iterator);
        let mut cardinality = Cardinality::ZERO;
        if iterations.intersects(Cardinality::ONE_OR_MORE) {
            cardinality |= Cardinality::ONE;
        }
        if iterations.contains(Cardinality::MORE) {
            cardinality |= Cardinality::MORE;
        }
        let ty = self.xml_type(iterator).with_cardinality(cardinality);
        self.op(QilNodeType::Filter, vec![iterator, condition], ty)
    }

    /// Stable sort of the items of `iterator`; `keys` is a list of sort keys.
    pub fn sort(&mut self, iterator: QilNodeId, keys: QilNodeId) -> QilNodeId {
        let iterations = self.iterations(iterator);
        let ty = self.xml_type(iterator).with_cardinality(iterations);
        self.op(QilNodeType::Sort, vec![iterator, keys], ty)
    }

    pub fn sort_key(&mut self, key: QilNodeId, collation: QilNodeId) -> QilNodeId {
        let ty = self.xml_type(key);
        self.op(QilNodeType::SortKey, vec![key, collation], ty)
    }

    pub fn doc_order_distinct(&mut self, sequence: QilNodeId) -> QilNodeId {
        let ty = self.xml_type(sequence);
        self.op(QilNodeType::DocOrderDistinct, vec![sequence], ty)
    }

    pub fn length(&mut self, sequence: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::Length, vec![sequence], XmlQueryType::DOUBLE)
    }

    pub fn is_empty_(&mut self, sequence: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::IsEmpty, vec![sequence], XmlQueryType::BOOLEAN)
    }

    pub fn union(&mut self, left: QilNodeId, right: QilNodeId) -> QilNodeId {
        let l = self.xml_type(left);
        let r = self.xml_type(right);
        let mut cardinality = Cardinality::ZERO_OR_MORE;
        if !l.cardinality.contains(Cardinality::ZERO) || !r.cardinality.contains(Cardinality::ZERO)
        {
            cardinality = Cardinality::ONE_OR_MORE;
        }
        let ty = XmlQueryType::new(l.items | r.items, cardinality);
        self.op(QilNodeType::Union, vec![left, right], ty)
    }

    pub fn sum(&mut self, sequence: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::Sum, vec![sequence], XmlQueryType::DOUBLE)
    }

    pub fn negate(&mut self, operand: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::Negate, vec![operand], XmlQueryType::DOUBLE)
    }

    /// An arithmetic operator: one of `Add`, `Subtract`, `Multiply`,
    /// `Divide` or `Modulo`.
    pub fn arithmetic(
        &mut self,
        operator: QilNodeType,
        left: QilNodeId,
        right: QilNodeId,
    ) -> QilNodeId {
        debug_assert!(matches!(
            operator,
            QilNodeType::Add
                | QilNodeType::Subtract
                | QilNodeType::Multiply
                | QilNodeType::Divide
                | QilNodeType::Modulo
        ));
        self.op(operator, vec![left, right], XmlQueryType::DOUBLE)
    }

    /// A value comparison (`Eq` to `Ge`) or a node comparison (`Is`,
    /// `Before`, `After`).
    pub fn compare(
        &mut self,
        operator: QilNodeType,
        left: QilNodeId,
        right: QilNodeId,
    ) -> QilNodeId {
        debug_assert!(matches!(
            operator,
            QilNodeType::Eq
                | QilNodeType::Ne
                | QilNodeType::Lt
                | QilNodeType::Le
                | QilNodeType::Gt
                | QilNodeType::Ge
                | QilNodeType::Is
                | QilNodeType::Before
                | QilNodeType::After
        ));
        self.op(operator, vec![left, right], XmlQueryType::BOOLEAN)
    }

    pub fn eq(&mut self, left: QilNodeId, right: QilNodeId) -> QilNodeId {
        self.compare(QilNodeType::Eq, left, right)
    }

    pub fn is_(&mut self, left: QilNodeId, right: QilNodeId) -> QilNodeId {
        self.compare(QilNodeType::Is, left, right)
    }

    pub fn str_concat(&mut self, items: Vec<QilNodeId>) -> QilNodeId {
        self.op(QilNodeType::StrConcat, items, XmlQueryType::STRING)
    }

    pub fn str_length(&mut self, operand: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::StrLength, vec![operand], XmlQueryType::DOUBLE)
    }

    /// Resolves a lexical QName at run time, either against a namespace URI
    /// or against a sequence of namespace declarations.
    pub fn str_parse_qname(&mut self, name: QilNodeId, resolver: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::StrParseQName, vec![name, resolver], XmlQueryType::QNAME)
    }

    /// A function with an `Unknown` body; the body is filled in with
    /// [`QilGraph::set_function_body`] once it is generated, which allows
    /// mutually recursive functions.
    pub fn function(
        &mut self,
        name: QName,
        formals: Vec<QilNodeId>,
        ty: XmlQueryType,
        side_effects: bool,
    ) -> QilNodeId {
        let formals = self.list(formals);
        let body = self.unknown(ty);
        self.add(
            QilNodeType::Function,
            vec![formals, body],
            QilValue::Function { name, side_effects },
            ty,
        )
    }

    pub fn set_function_body(&mut self, function: QilNodeId, body: QilNodeId) {
        self.set_child(function, 1, body);
    }

    pub fn set_side_effects(&mut self, function: QilNodeId, value: bool) {
        if let QilValue::Function { side_effects, .. } = &mut self.node_mut(function).value {
            *side_effects = value;
        }
    }

    pub fn invoke(&mut self, function: QilNodeId, args: Vec<QilNodeId>) -> QilNodeId {
        let ty = self.xml_type(function);
        let args = self.list(args);
        self.op(QilNodeType::Invoke, vec![function, args], ty)
    }

    pub fn unknown(&mut self, ty: XmlQueryType) -> QilNodeId {
        self.op(QilNodeType::Unknown, vec![], ty)
    }

    /// The node the transformation was started on.
    pub fn xml_context(&mut self) -> QilNodeId {
        self.op(QilNodeType::XmlContext, vec![], XmlQueryType::NODE)
    }

    /// A navigation step from `context` along an axis.
    pub fn axis(&mut self, axis: QilNodeType, context: QilNodeId) -> QilNodeId {
        let ty = match axis {
            QilNodeType::Children
            | QilNodeType::Descendant
            | QilNodeType::Following
            | QilNodeType::FollowingSibling
            | QilNodeType::Preceding
            | QilNodeType::PrecedingSibling => CONTENT_SET,
            QilNodeType::Attributes => {
                XmlQueryType::ATTRIBUTE.with_cardinality(Cardinality::ZERO_OR_MORE)
            }
            QilNodeType::NamespaceNodes => {
                XmlQueryType::NAMESPACE.with_cardinality(Cardinality::ZERO_OR_MORE)
            }
            QilNodeType::Parent => OPTIONAL_PARENT,
            QilNodeType::Ancestor => ANCESTORS,
            QilNodeType::Root => XmlQueryType::DOCUMENT,
            QilNodeType::DescendantOrSelf | QilNodeType::AncestorOrSelf => XmlQueryType::NODE_SET
                .with_cardinality(Cardinality::ONE_OR_MORE),
            _ => XmlQueryType::NODE_SET,
        };
        self.op(axis, vec![context], ty)
    }

    /// Elements of the document of `context` with one of the IDs in `ids`.
    pub fn deref(&mut self, context: QilNodeId, ids: QilNodeId) -> QilNodeId {
        let ty = XmlQueryType::ELEMENT.with_cardinality(Cardinality::ZERO_OR_MORE);
        self.op(QilNodeType::Deref, vec![context, ids], ty)
    }

    /// A property of a node: `NameOf`, `LocalNameOf`, `NamespaceUriOf`,
    /// `PrefixOf` or `NodeValue`.
    pub fn node_property(&mut self, property: QilNodeType, node: QilNodeId) -> QilNodeId {
        let ty = match property {
            QilNodeType::NameOf => XmlQueryType::QNAME,
            _ => XmlQueryType::STRING,
        };
        self.op(property, vec![node], ty)
    }

    pub fn node_value(&mut self, node: QilNodeId) -> QilNodeId {
        self.node_property(QilNodeType::NodeValue, node)
    }

    pub fn is_type(&mut self, value: QilNodeId, ty: XmlQueryType) -> QilNodeId {
        self.add(
            QilNodeType::IsType,
            vec![value],
            QilValue::Type(ty),
            XmlQueryType::BOOLEAN,
        )
    }

    pub fn element_ctor(&mut self, name: QilNodeId, content: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::ElementCtor, vec![name, content], XmlQueryType::ELEMENT)
    }

    pub fn attribute_ctor(&mut self, name: QilNodeId, value: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::AttributeCtor, vec![name, value], XmlQueryType::ATTRIBUTE)
    }

    pub fn comment_ctor(&mut self, content: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::CommentCtor, vec![content], XmlQueryType::COMMENT)
    }

    pub fn pi_ctor(&mut self, name: QilNodeId, value: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::PICtor, vec![name, value], XmlQueryType::PI)
    }

    pub fn text_ctor(&mut self, value: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::TextCtor, vec![value], XmlQueryType::TEXT)
    }

    /// Text that is serialized without escaping.
    pub fn raw_text_ctor(&mut self, value: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::RawTextCtor, vec![value], XmlQueryType::TEXT)
    }

    pub fn namespace_decl(&mut self, prefix: QilNodeId, uri: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::NamespaceDecl, vec![prefix, uri], XmlQueryType::NAMESPACE)
    }

    /// A result tree fragment holding `content`.
    pub fn rtf_ctor(&mut self, content: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::RtfCtor, vec![content], XmlQueryType::DOCUMENT)
    }

    pub fn xslt_copy(&mut self, node: QilNodeId, content: QilNodeId) -> QilNodeId {
        let ty = self
            .xml_type(node)
            .union(self.xml_type(content))
            .with_cardinality(Cardinality::ZERO_OR_MORE);
        let ty = XmlQueryType::new(ty.items & ItemKinds::NODE, ty.cardinality);
        self.op(QilNodeType::XsltCopy, vec![node, content], ty)
    }

    pub fn xslt_copy_of(&mut self, sequence: QilNodeId) -> QilNodeId {
        let items = self.xml_type(sequence).items & ItemKinds::NODE;
        let ty = XmlQueryType::new(items, Cardinality::ZERO_OR_MORE);
        self.op(QilNodeType::XsltCopyOf, vec![sequence], ty)
    }

    pub fn xslt_generate_id(&mut self, node: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::XsltGenerateId, vec![node], XmlQueryType::STRING)
    }

    pub fn xslt_convert(&mut self, value: QilNodeId, ty: XmlQueryType) -> QilNodeId {
        self.add(QilNodeType::XsltConvert, vec![value], QilValue::Type(ty), ty)
    }

    /// A call into the runtime library.
    pub fn xslt_invoke(
        &mut self,
        name: QName,
        args: Vec<QilNodeId>,
        ty: XmlQueryType,
    ) -> QilNodeId {
        self.add(QilNodeType::XsltInvoke, args, QilValue::QName(name), ty)
    }

    /// Raises a dynamic error with `message` when evaluated.
    pub fn error(&mut self, message: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::Error, vec![message], XmlQueryType::NONE)
    }

    pub fn warning(&mut self, message: QilNodeId) -> QilNodeId {
        self.op(QilNodeType::Warning, vec![message], XmlQueryType::EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::QilExpression;
    use crate::Error;

    #[test]
    fn test_loop_over_nodes() {
        let mut g = QilGraph::new();
        let context = g.xml_context();
        let children = g.axis(QilNodeType::Children, context);
        let it = g.for_(children);
        assert_eq!(g.xml_type(it), XmlQueryType::new(ItemKinds::CONTENT, Cardinality::ONE));
        let value = g.node_value(it);
        let body = g.text_ctor(value);
        let l = g.loop_(it, body);
        assert_eq!(g.xml_type(l).to_string(), "text*");
    }

    #[test]
    fn test_filter_may_drop_items() {
        let mut g = QilGraph::new();
        let context = g.xml_context();
        let parent = g.axis(QilNodeType::Parent, context);
        let it = g.for_(parent);
        let t = g.true_();
        let f = g.filter(it, t);
        assert_eq!(g.xml_type(f).to_string(), "(document|element)?");
    }

    #[test]
    fn test_conditional_ignores_error_branch() {
        let mut g = QilGraph::new();
        let c = g.true_();
        let s = g.literal_string("x");
        let msg = g.literal_string("boom");
        let e = g.error(msg);
        let cond = g.conditional(c, s, e);
        assert_eq!(g.xml_type(cond), XmlQueryType::STRING);
    }

    #[test]
    fn test_sequence_type() {
        let mut g = QilGraph::new();
        let a = g.literal_string("a");
        let b = g.literal_string("b");
        let seq = g.sequence(vec![a, b]);
        assert_eq!(g.xml_type(seq).to_string(), "string+");
        let empty = g.empty();
        assert!(g.xml_type(empty).is_empty());
    }

    fn expression(graph: QilGraph, root: QilNodeId, functions: Vec<QilNodeId>) -> QilExpression {
        QilExpression {
            graph,
            root,
            functions,
            global_parameters: vec![],
            global_variables: vec![],
        }
    }

    #[test]
    fn test_validate_arity() {
        let mut g = QilGraph::new();
        let p = g.parameter("current", XmlQueryType::NODE);
        let f = g.function(QName::unprefixed("t"), vec![p], XmlQueryType::STRING, false);
        let body = g.node_value(p);
        g.set_function_body(f, body);
        let call = g.invoke(f, vec![]);
        let e = expression(g, call, vec![f]);
        assert!(matches!(
            e.validate(),
            Err(Error::ArityMismatch {
                expected: 1,
                found: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_missing_body() {
        let mut g = QilGraph::new();
        let f = g.function(QName::unprefixed("t"), vec![], XmlQueryType::EMPTY, false);
        let call = g.invoke(f, vec![]);
        let e = expression(g, call, vec![f]);
        assert!(matches!(e.validate(), Err(Error::MissingBody { .. })));
    }

    #[test]
    fn test_validate_ok() {
        let mut g = QilGraph::new();
        let p = g.parameter("current", XmlQueryType::NODE);
        let f = g.function(QName::unprefixed("t"), vec![p], XmlQueryType::STRING, false);
        let body = g.node_value(p);
        g.set_function_body(f, body);
        let context = g.xml_context();
        let call = g.invoke(f, vec![context]);
        let e = expression(g, call, vec![f]);
        assert_eq!(e.validate(), Ok(()));
        assert_eq!(e.function(&QName::unprefixed("t")), Some(f));
    }
}
