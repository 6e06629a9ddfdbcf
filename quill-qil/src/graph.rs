use ahash::{HashSet, HashSetExt};
use quill_name::QName;

use crate::arena::Arena;
use crate::error::Error;
use crate::node::{QilNode, QilNodeId, QilNodeType, QilValue, SourceLine};
use crate::types::XmlQueryType;

/// The node store. Construction helpers that infer static types live in
/// the factory module; rewriting helpers in the rewrite module.
#[derive(Debug, Clone, Default)]
pub struct QilGraph {
    nodes: Arena<QilNode>,
    annotate: bool,
    current_line: Option<SourceLine>,
}

impl QilGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// When annotating, every node created records the current source line.
    pub fn with_annotations(annotate: bool) -> Self {
        Self {
            annotate,
            ..Self::default()
        }
    }

    pub fn set_source_line(&mut self, line: Option<SourceLine>) {
        self.current_line = line;
    }

    pub fn source_line(&self) -> Option<SourceLine> {
        self.current_line
    }

    pub fn add(
        &mut self,
        node_type: QilNodeType,
        children: Vec<QilNodeId>,
        value: QilValue,
        xml_type: XmlQueryType,
    ) -> QilNodeId {
        let source_line = if self.annotate {
            self.current_line
        } else {
            None
        };
        self.nodes.add(QilNode {
            node_type,
            children,
            value,
            xml_type,
            source_line,
        })
    }

    pub(crate) fn add_node(&mut self, node: QilNode) -> QilNodeId {
        self.nodes.add(node)
    }

    pub fn node(&self, id: QilNodeId) -> &QilNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: QilNodeId) -> &mut QilNode {
        &mut self.nodes[id]
    }

    pub fn node_type(&self, id: QilNodeId) -> QilNodeType {
        self.nodes[id].node_type
    }

    pub fn xml_type(&self, id: QilNodeId) -> XmlQueryType {
        self.nodes[id].xml_type
    }

    pub fn children(&self, id: QilNodeId) -> &[QilNodeId] {
        &self.nodes[id].children
    }

    pub fn child(&self, id: QilNodeId, index: usize) -> Option<QilNodeId> {
        self.nodes[id].children.get(index).copied()
    }

    pub fn set_child(&mut self, id: QilNodeId, index: usize, child: QilNodeId) {
        self.nodes[id].children[index] = child;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node reachable from `root`, including through function
    /// invocations, each once.
    pub fn reachable(&self, root: QilNodeId) -> Vec<QilNodeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        let mut result = Vec::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            result.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        result
    }
}

/// A whole compiled transformation.
#[derive(Debug, Clone)]
pub struct QilExpression {
    pub graph: QilGraph,
    /// The expression evaluated to run the transformation.
    pub root: QilNodeId,
    pub functions: Vec<QilNodeId>,
    pub global_parameters: Vec<QilNodeId>,
    pub global_variables: Vec<QilNodeId>,
}

impl QilExpression {
    pub fn function(&self, name: &QName) -> Option<QilNodeId> {
        self.functions
            .iter()
            .copied()
            .find(|f| self.graph.node(*f).function_name() == Some(name))
    }

    pub fn function_by_local_name(&self, local: &str) -> Vec<QilNodeId> {
        self.functions
            .iter()
            .copied()
            .filter(|f| {
                self.graph
                    .node(*f)
                    .function_name()
                    .is_some_and(|name| name.local_name() == local)
            })
            .collect()
    }

    /// The formal parameters of a function.
    pub fn formals(&self, function: QilNodeId) -> &[QilNodeId] {
        match self.graph.child(function, 0) {
            Some(list) => self.graph.children(list),
            None => &[],
        }
    }

    pub fn function_body(&self, function: QilNodeId) -> Option<QilNodeId> {
        self.graph.child(function, 1)
    }

    /// Check the structural contract with consumers: every invocation
    /// passes exactly the declared number of arguments, each argument and
    /// each function body fits its declared type, and no function body is
    /// left unfilled.
    pub fn validate(&self) -> Result<(), Error> {
        let mut roots = vec![self.root];
        roots.extend(self.global_parameters.iter().copied());
        roots.extend(self.global_variables.iter().copied());
        roots.extend(self.functions.iter().copied());
        let mut seen = HashSet::new();
        for root in roots {
            for id in self.graph.reachable(root) {
                if !seen.insert(id) {
                    continue;
                }
                self.validate_node(id)?;
            }
        }
        Ok(())
    }

    fn validate_node(&self, id: QilNodeId) -> Result<(), Error> {
        let node = self.graph.node(id);
        match node.node_type {
            QilNodeType::Invoke => {
                let function = node.children[0];
                let formals = self.formals(function);
                let actuals = self.graph.children(node.children[1]);
                let name = self.function_label(function);
                if formals.len() != actuals.len() {
                    return Err(Error::ArityMismatch {
                        function: name,
                        expected: formals.len(),
                        found: actuals.len(),
                    });
                }
                for (formal, actual) in formals.iter().zip(actuals) {
                    let declared = self.graph.xml_type(*formal);
                    let actual_type = self.graph.xml_type(*actual);
                    if !actual_type.is_subtype_of(declared) {
                        return Err(Error::TypeMismatch {
                            context: format!(
                                "argument {} of {}",
                                self.graph.node(*formal).name().unwrap_or("?"),
                                name
                            ),
                            actual: actual_type,
                            declared,
                        });
                    }
                }
            }
            QilNodeType::Function => {
                let body = node.children[1];
                if self.graph.node_type(body) == QilNodeType::Unknown {
                    return Err(Error::MissingBody {
                        function: self.function_label(id),
                    });
                }
                let actual = self.graph.xml_type(body);
                if !actual.is_subtype_of(node.xml_type) {
                    return Err(Error::TypeMismatch {
                        context: format!("body of {}", self.function_label(id)),
                        actual,
                        declared: node.xml_type,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn function_label(&self, function: QilNodeId) -> String {
        self.graph
            .node(function)
            .function_name()
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("{:?}", function))
    }
}
