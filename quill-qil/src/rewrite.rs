//! Rewriting helpers used to specialize expressions for particular actual
//! arguments.

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};

use crate::error::Error;
use crate::graph::QilGraph;
use crate::node::{QilNode, QilNodeId, QilNodeType};

impl QilGraph {
    /// Copy the expression rooted at `root`, replacing every reference to a
    /// key of `substitutions` with its value.
    ///
    /// Functions are shared, not copied. An iterator bound inside the copied
    /// expression is copied along with its binder, so the copy is independent
    /// of the original; references to iterators and parameters bound outside
    /// stay as they are.
    pub fn clone_with_substitution(
        &mut self,
        root: QilNodeId,
        substitutions: &HashMap<QilNodeId, QilNodeId>,
    ) -> QilNodeId {
        let mut memo = substitutions.clone();
        self.clone_node(root, &mut memo)
    }

    fn clone_node(&mut self, id: QilNodeId, memo: &mut HashMap<QilNodeId, QilNodeId>) -> QilNodeId {
        if let Some(mapped) = memo.get(&id) {
            return *mapped;
        }
        let node_type = self.node_type(id);
        if node_type.is_reference() {
            // free reference
            return id;
        }
        let original: QilNode = self.node(id).clone();
        let mut children = Vec::with_capacity(original.children.len());
        for (index, child) in original.children.iter().enumerate() {
            if index == 0 && node_type.binds_iterator() {
                children.push(self.clone_binding(*child, memo));
            } else {
                children.push(self.clone_node(*child, memo));
            }
        }
        let copy = self.add_node(QilNode {
            children,
            ..original
        });
        memo.insert(id, copy);
        copy
    }

    fn clone_binding(
        &mut self,
        iterator: QilNodeId,
        memo: &mut HashMap<QilNodeId, QilNodeId>,
    ) -> QilNodeId {
        if let Some(mapped) = memo.get(&iterator) {
            return *mapped;
        }
        let original: QilNode = self.node(iterator).clone();
        let children = original
            .children
            .iter()
            .map(|child| self.clone_node(*child, memo))
            .collect();
        let copy = self.add_node(QilNode {
            children,
            ..original
        });
        memo.insert(iterator, copy);
        copy
    }

    /// Replace references in place throughout the expression rooted at
    /// `root`. Function bodies reached through invocations are left alone.
    pub fn replace_references(
        &mut self,
        root: QilNodeId,
        replacements: &HashMap<QilNodeId, QilNodeId>,
    ) -> QilNodeId {
        if let Some(replacement) = replacements.get(&root) {
            return *replacement;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) || self.node_type(id) == QilNodeType::Function {
                continue;
            }
            for index in 0..self.children(id).len() {
                let child = self.children(id)[index];
                match replacements.get(&child) {
                    Some(replacement) => self.set_child(id, index, *replacement),
                    None => stack.push(child),
                }
            }
        }
        root
    }

    /// The nesting depth of the expression rooted at `root`, without
    /// descending into functions. A leaf has depth 1.
    pub fn depth(&self, root: QilNodeId) -> usize {
        if self.node_type(root) == QilNodeType::Function {
            return match self.child(root, 1) {
                Some(body) => self.depth(body) + 1,
                None => 1,
            };
        }
        let mut depths: HashMap<QilNodeId, usize> = HashMap::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if depths.contains_key(&id) {
                continue;
            }
            let children: &[QilNodeId] = if self.node_type(id) == QilNodeType::Function {
                &[]
            } else {
                self.children(id)
            };
            if expanded {
                let deepest = children
                    .iter()
                    .filter_map(|child| depths.get(child))
                    .max()
                    .copied()
                    .unwrap_or(0);
                depths.insert(id, deepest + 1);
            } else {
                stack.push((id, true));
                for child in children {
                    if !depths.contains_key(child) {
                        stack.push((*child, false));
                    }
                }
            }
        }
        depths.get(&root).copied().unwrap_or(1)
    }

    pub fn check_depth(&self, root: QilNodeId, limit: usize) -> Result<usize, Error> {
        let depth = self.depth(root);
        if depth > limit {
            return Err(Error::TooDeep { depth, limit });
        }
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use quill_name::QName;

    use super::*;
    use crate::types::XmlQueryType;

    #[test]
    fn test_clone_substitutes_parameter() {
        let mut g = QilGraph::new();
        let p = g.parameter("current", XmlQueryType::NODE);
        let children = g.axis(QilNodeType::Children, p);
        let it = g.for_(children);
        let value = g.node_value(it);
        let body = g.text_ctor(value);
        let l = g.loop_(it, body);

        let context = g.xml_context();
        let mut substitutions = HashMap::new();
        substitutions.insert(p, context);
        let copy = g.clone_with_substitution(l, &substitutions);

        assert_ne!(copy, l);
        let copied_it = g.children(copy)[0];
        assert_ne!(copied_it, it);
        assert_eq!(g.node_type(copied_it), QilNodeType::For);
        // the binding now navigates from the substituted node
        let copied_children = g.children(copied_it)[0];
        assert_eq!(g.children(copied_children)[0], context);
        // the body refers to the copied iterator
        let copied_body = g.children(copy)[1];
        let copied_value = g.children(copied_body)[0];
        assert_eq!(g.children(copied_value)[0], copied_it);
        // the original is unchanged
        assert_eq!(g.children(children)[0], p);
    }

    #[test]
    fn test_clone_shares_functions_and_free_references() {
        let mut g = QilGraph::new();
        let outer = g.parameter("outer", XmlQueryType::STRING);
        let f = g.function(QName::unprefixed("f"), vec![], XmlQueryType::EMPTY, false);
        let empty = g.empty();
        g.set_function_body(f, empty);
        let call = g.invoke(f, vec![]);
        let seq = g.sequence(vec![outer, call]);
        let copy = g.clone_with_substitution(seq, &HashMap::new());
        assert_eq!(g.children(copy)[0], outer);
        let copied_call = g.children(copy)[1];
        assert_ne!(copied_call, call);
        assert_eq!(g.children(copied_call)[0], f);
    }

    #[test]
    fn test_replace_references_in_place() {
        let mut g = QilGraph::new();
        let p = g.parameter("x", XmlQueryType::STRING);
        let len = g.str_length(p);
        let negated = g.negate(len);
        let literal = g.literal_string("abc");
        let mut map = HashMap::new();
        map.insert(p, literal);
        let root = g.replace_references(negated, &map);
        assert_eq!(root, negated);
        assert_eq!(g.children(len)[0], literal);
    }

    #[test]
    fn test_depth() {
        let mut g = QilGraph::new();
        let mut node = g.literal_double(1.0);
        assert_eq!(g.depth(node), 1);
        for _ in 0..9 {
            node = g.negate(node);
        }
        assert_eq!(g.depth(node), 10);
        assert_eq!(g.check_depth(node, 10), Ok(10));
        assert_eq!(
            g.check_depth(node, 5),
            Err(Error::TooDeep {
                depth: 10,
                limit: 5
            })
        );
    }

    #[test]
    fn test_depth_handles_shared_nodes() {
        let mut g = QilGraph::new();
        let leaf = g.literal_double(1.0);
        let shared = g.negate(leaf);
        let left = g.negate(shared);
        let sum = g.arithmetic(QilNodeType::Add, left, shared);
        assert_eq!(g.depth(sum), 4);
    }
}
