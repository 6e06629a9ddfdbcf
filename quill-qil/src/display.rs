use std::fmt::Write;

use crate::graph::QilGraph;
use crate::node::{QilNodeId, QilNodeType, QilValue};

impl QilGraph {
    /// A compact s-expression rendering of the expression rooted at `root`.
    ///
    /// Iterators are written in full where they are bound and as `$name`
    /// where they are referenced; invoked functions are written as `@name`.
    pub fn dump(&self, root: QilNodeId) -> String {
        let mut out = String::new();
        self.dump_node(root, true, &mut out);
        out
    }

    /// Renders a function definition: its formals and its body.
    pub fn dump_function(&self, function: QilNodeId) -> String {
        let node = self.node(function);
        let mut out = String::new();
        let name = node
            .function_name()
            .map(|name| name.to_string())
            .unwrap_or_default();
        let _ = write!(out, "(Function @{} (", name);
        if let Some(formals) = node.children.first() {
            for (i, formal) in self.children(*formals).iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(&self.reference_name(*formal));
            }
        }
        out.push_str(") ");
        if let Some(body) = node.children.get(1) {
            self.dump_node(*body, false, &mut out);
        }
        out.push(')');
        out
    }

    fn reference_name(&self, id: QilNodeId) -> String {
        match self.node(id).name() {
            Some(name) => format!("${}", name),
            None => format!("${:?}", id),
        }
    }

    fn dump_node(&self, id: QilNodeId, binding: bool, out: &mut String) {
        let node = self.node(id);
        match node.node_type {
            QilNodeType::Function => {
                let name = node
                    .function_name()
                    .map(|name| name.to_string())
                    .unwrap_or_default();
                let _ = write!(out, "@{}", name);
                return;
            }
            QilNodeType::Parameter => {
                out.push_str(&self.reference_name(id));
                return;
            }
            QilNodeType::For | QilNodeType::Let if !binding => {
                out.push_str(&self.reference_name(id));
                return;
            }
            _ => {}
        }
        match &node.value {
            QilValue::String(s) => {
                let _ = write!(out, "{:?}", s);
                return;
            }
            QilValue::Double(d) => {
                let _ = write!(out, "{}", d);
                return;
            }
            QilValue::QName(name) if node.node_type == QilNodeType::LiteralQName => {
                let _ = write!(out, "'{}", name.expanded());
                return;
            }
            _ => {}
        }
        if node.children.is_empty()
            && !matches!(node.node_type, QilNodeType::For | QilNodeType::Let)
        {
            let _ = write!(out, "({})", node.node_type);
            return;
        }
        let _ = write!(out, "({}", node.node_type);
        match &node.value {
            QilValue::Name(name) => {
                let _ = write!(out, " ${}", name);
            }
            QilValue::QName(name) => {
                let _ = write!(out, " {}", name);
            }
            QilValue::Type(ty) => {
                let _ = write!(out, " <{}>", ty);
            }
            _ => {}
        }
        for (index, child) in node.children.iter().enumerate() {
            out.push(' ');
            let binds = index == 0 && node.node_type.binds_iterator();
            self.dump_node(*child, binds, out);
        }
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use quill_name::QName;

    use crate::graph::QilGraph;
    use crate::node::QilNodeType;
    use crate::types::XmlQueryType;

    #[test]
    fn test_dump_loop() {
        let mut g = QilGraph::new();
        let context = g.xml_context();
        let children = g.axis(QilNodeType::Children, context);
        let it = g.for_(children);
        g.set_debug_name(it, "i");
        let value = g.node_value(it);
        let body = g.text_ctor(value);
        let l = g.loop_(it, body);
        insta::assert_snapshot!(g.dump(l), @"(Loop (For $i (Children (XmlContext))) (TextCtor (NodeValue $i)))");
    }

    #[test]
    fn test_dump_function() {
        let mut g = QilGraph::new();
        let p = g.parameter("current", XmlQueryType::NODE);
        let f = g.function(QName::unprefixed("t"), vec![p], XmlQueryType::STRING, false);
        let body = g.node_value(p);
        g.set_function_body(f, body);
        let a = g.literal_string("a");
        let call = g.invoke(f, vec![a]);
        insta::assert_snapshot!(g.dump(call), @r#"(Invoke @t (List "a"))"#);
        insta::assert_snapshot!(g.dump_function(f), @"(Function @t ($current) (NodeValue $current))");
    }
}
