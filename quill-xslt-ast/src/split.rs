//! Splitting overly large templates.
//!
//! Every node gets an estimated cost: one for the node itself plus a cost
//! per location step in the expressions it holds. When the running cost of
//! a content list crosses the threshold, the rest of the list moves into a
//! new named template, and a call to that template takes its place. Every
//! local variable in scope at the split point is passed to the new
//! template as a parameter of the same name, so references in the moved
//! content still resolve to the same values.

use quill_name::{QName, QUILL_NAMESPACE};
use quill_xpath_ast::ast::Expr;
use quill_xpath_ast::value_template::{parse_value_template, ValueTemplatePart};

use crate::ast::{NodeId, StylesheetId, TemplateInfo, VarKind, XslDetail, XslNode, XslNodeType};
use crate::ns::NsList;
use crate::scope::CompilerScopeManager;
use crate::settings::CompilerSettings;
use crate::stylesheet::Program;

/// Split every template and attribute set whose content is too costly.
/// Returns the number of templates created.
pub fn split_complex(program: &mut Program, settings: &CompilerSettings) -> usize {
    let Some(threshold) = settings.split_threshold else {
        return 0;
    };
    let mut work: Vec<NodeId> = program
        .stylesheets
        .iter()
        .flat_map(|level| level.templates.iter().chain(level.attribute_sets.iter()))
        .copied()
        .collect();
    let mut splitter = Splitter {
        program,
        threshold,
        step_cost: settings.split_step_cost,
        max_depth: settings.max_expression_depth,
        scope: CompilerScopeManager::new(),
        created: 0,
    };
    while let Some(owner) = work.pop() {
        splitter.scope = CompilerScopeManager::new();
        splitter.visit(owner, owner, &mut work);
    }
    if splitter.created > 0 {
        log::debug!("split off {} templates", splitter.created);
    }
    splitter.created
}

/// The number of location steps in an expression.
pub fn path_steps(expr: &Expr) -> usize {
    let mut steps = 0;
    expr.walk(&mut |expr| {
        if let Expr::Path(path) = expr {
            steps += path.steps.len();
        }
    });
    steps
}

struct Splitter<'a> {
    program: &'a mut Program,
    threshold: usize,
    step_cost: usize,
    max_depth: usize,
    scope: CompilerScopeManager<NodeId>,
    created: usize,
}

fn is_splittable(kind: XslNodeType) -> bool {
    use XslNodeType::*;
    matches!(
        kind,
        Template
            | AttributeSet
            | If
            | When
            | Otherwise
            | ForEach
            | LiteralElement
            | Element
            | Copy
            | Message
            | Variable
            | Param
            | WithParam
            | List
            | Attribute
            | Comment
            | PI
    )
}

/// Nodes that must stay at the start of their parent's content.
fn is_prelude(kind: XslNodeType) -> bool {
    use XslNodeType::*;
    matches!(
        kind,
        Param | Sort | LiteralAttribute | UseAttributeSet | WithParam
    )
}

impl<'a> Splitter<'a> {
    /// Visit a node, splitting its content where needed, and return its
    /// cost afterwards.
    fn visit(&mut self, owner: NodeId, id: NodeId, work: &mut Vec<NodeId>) -> usize {
        let cost = 1 + self.expression_cost(id);
        let content = self.program.ast.content(id).to_vec();
        if content.is_empty() {
            return cost;
        }
        let splittable = is_splittable(self.program.ast[id].kind);
        let prelude = content
            .iter()
            .take_while(|child| is_prelude(self.program.ast[**child].kind))
            .count();
        // apply-imports needs the current template rule, so it never moves
        // into a split template
        let first_split = content
            .iter()
            .rposition(|child| self.holds_apply_imports(*child))
            .map_or(prelude, |last| last.max(prelude));

        self.scope.enter_scope();
        let mut total = 0;
        let mut split_at = None;
        for (i, child) in content.iter().enumerate() {
            let child_cost = self.visit(owner, *child, work);
            if splittable && i > first_split && total + child_cost > self.threshold {
                split_at = Some(i);
                break;
            }
            total += child_cost;
            let node = &self.program.ast[*child];
            if matches!(node.kind, XslNodeType::Variable | XslNodeType::Param) {
                if let Some(name) = node.name.clone() {
                    self.scope.add_variable(name, *child);
                }
            }
        }
        if let Some(i) = split_at {
            let call = self.split_off(owner, content[i..].to_vec(), work);
            let mut head = content[..i].to_vec();
            head.push(call);
            self.program.ast.replace_content(id, head);
            total += 1;
        }
        self.scope.exit_scope();
        cost + total
    }

    /// Whether `id` is or contains an `xsl:apply-imports` that runs with
    /// the template rule's focus, i.e. outside any `xsl:for-each`.
    fn holds_apply_imports(&self, id: NodeId) -> bool {
        match self.program.ast[id].kind {
            XslNodeType::ApplyImports => true,
            XslNodeType::ForEach => false,
            _ => self
                .program
                .ast
                .content(id)
                .iter()
                .any(|child| self.holds_apply_imports(*child)),
        }
    }

    fn split_off(
        &mut self,
        owner: NodeId,
        tail: Vec<NodeId>,
        work: &mut Vec<NodeId>,
    ) -> NodeId {
        self.created += 1;
        let name = QName::new(
            format!("split-{}", self.program.ast.len()),
            Some(QUILL_NAMESPACE.to_string()),
            Some("quill".to_string()),
        );
        let first = &self.program.ast[tail[0]];
        let location = first.location;
        let namespaces = first.namespaces.clone();
        let version = first.version;
        let (level, precedence) = self.owner_level(owner);
        let order = self.program.stylesheets[level].next_order();

        let mut variables: Vec<QName> = self
            .scope
            .variables()
            .into_iter()
            .map(|(name, _)| name.clone())
            .collect();
        // outermost first, as they were declared
        variables.reverse();

        let mut params = Vec::new();
        let mut with_params = Vec::new();
        for variable in &variables {
            let param = XslNode::new(XslNodeType::Param, location, namespaces.clone(), version)
                .with_name(variable.clone())
                .with_detail(XslDetail::Variable(VarKind::Local));
            let param = self.program.ast.add(param);
            self.program.ast.set_content(param, Vec::new());
            params.push(param);

            let (select, select_namespaces) = reference(variable, &namespaces);
            let with_param =
                XslNode::new(XslNodeType::WithParam, location, select_namespaces, version)
                    .with_name(variable.clone())
                    .with_arg(Some(select))
                    .with_detail(XslDetail::Variable(VarKind::WithParam));
            let with_param = self.program.ast.add(with_param);
            self.program.ast.set_content(with_param, Vec::new());
            with_params.push(with_param);
        }

        let info = TemplateInfo {
            mode: None,
            priority: None,
            import_precedence: precedence,
            order,
            stylesheet: level,
        };
        let template = XslNode::new(XslNodeType::Template, location, namespaces.clone(), version)
            .with_name(name.clone())
            .with_detail(XslDetail::Template(info));
        let template = self.program.ast.add(template);
        params.extend(tail);
        self.program.ast.set_content(template, params);
        self.program.stylesheets[level].templates.push(template);
        self.program.named_templates.insert(name.clone(), template);
        log::trace!(
            "split template {} off with {} parameters",
            name.expanded(),
            variables.len()
        );

        let call =
            XslNode::new(XslNodeType::CallTemplate, location, namespaces, version).with_name(name);
        let call = self.program.ast.add(call);
        self.program.ast.set_content(call, with_params);
        work.push(template);
        call
    }

    fn owner_level(&self, owner: NodeId) -> (StylesheetId, i32) {
        match &self.program.ast[owner].detail {
            XslDetail::Template(info) => (info.stylesheet, info.import_precedence),
            XslDetail::AttributeSet {
                import_precedence, ..
            } => {
                let level = self
                    .program
                    .stylesheets
                    .iter()
                    .position(|level| level.attribute_sets.contains(&owner))
                    .unwrap_or(self.program.principal);
                (level, *import_precedence)
            }
            _ => (
                self.program.principal,
                self.program.principal().import_precedence,
            ),
        }
    }

    fn expression_cost(&self, id: NodeId) -> usize {
        let node = &self.program.ast[id];
        let Some(arg) = &node.arg else {
            return 0;
        };
        use XslNodeType::*;
        let steps = match node.kind {
            ApplyTemplates | CopyOf | ForEach | If | When | Sort | ValueOf | ValueOfDoe
            | Variable | Param | WithParam => self.steps(arg, &node.namespaces),
            LiteralAttribute | Element | Attribute | PI => match parse_value_template(arg) {
                Ok(parts) => parts
                    .iter()
                    .map(|part| match part {
                        ValueTemplatePart::Expr { text, .. } => self.steps(text, &node.namespaces),
                        ValueTemplatePart::Text(_) => 0,
                    })
                    .sum(),
                Err(_) => 0,
            },
            _ => 0,
        };
        steps * self.step_cost
    }

    fn steps(&self, text: &str, namespaces: &NsList) -> usize {
        quill_xpath_ast::parse_expression(text, namespaces, self.max_depth)
            .map(|expr| path_steps(&expr))
            .unwrap_or(0)
    }
}

/// A `$name` reference to a variable, with the namespaces it needs.
fn reference(name: &QName, namespaces: &NsList) -> (String, NsList) {
    match name.namespace() {
        Some(uri) => {
            let prefix = name.prefix().unwrap_or("var");
            (
                format!("${}:{}", prefix, name.local_name()),
                namespaces.push(prefix, uri),
            )
        }
        None => (format!("${}", name.local_name()), namespaces.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemoryResolver;
    use crate::loader::load_text;

    fn program(text: &str, threshold: usize) -> Program {
        let settings = CompilerSettings {
            split_threshold: Some(threshold),
            ..Default::default()
        };
        let mut program = load_text(&MemoryResolver::new(), &settings, text);
        split_complex(&mut program, &settings);
        program
    }

    fn stylesheet(body: &str) -> String {
        format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
<xsl:template match="/">{}</xsl:template>
</xsl:stylesheet>"#,
            body
        )
    }

    #[test]
    fn test_path_steps() {
        let namespaces = NsList::new();
        let expr = quill_xpath_ast::parse_expression("a/b[c] | //d", &namespaces, 64).unwrap();
        // a, b, c, descendant-or-self::node(), d
        assert_eq!(path_steps(&expr), 5);
    }

    #[test]
    fn test_small_template_is_not_split() {
        let program = program(&stylesheet("<xsl:value-of select='a'/>"), 100);
        assert_eq!(program.principal().templates.len(), 1);
    }

    #[test]
    fn test_split_passes_variables() {
        let body = r#"<xsl:variable name="x" select="1"/><xsl:value-of select="a/b/c"/><xsl:value-of select="concat($x, d/e/f)"/>"#;
        let program = program(&stylesheet(body), 8);
        let level = program.principal();
        assert_eq!(level.templates.len(), 2);
        let root = level.templates[0];
        let content = program.ast.content(root);
        let call = *content.last().unwrap();
        assert_eq!(program.ast[call].kind, XslNodeType::CallTemplate);
        let with_params = program.ast.content(call);
        assert_eq!(with_params.len(), 1);
        assert_eq!(
            program.ast[with_params[0]].name,
            Some(QName::unprefixed("x"))
        );
        assert_eq!(program.ast[with_params[0]].arg.as_deref(), Some("$x"));

        let name = program.ast[call].name.clone().unwrap();
        assert_eq!(name.namespace(), Some(QUILL_NAMESPACE));
        let split = program.named_templates[&name];
        let split_content = program.ast.content(split);
        assert_eq!(program.ast[split_content[0]].kind, XslNodeType::Param);
        assert_eq!(
            program.ast[split_content[0]].name,
            Some(QName::unprefixed("x"))
        );
    }

    #[test]
    fn test_params_stay_in_head() {
        let text = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
<xsl:template name="t"><xsl:param name="p"/><xsl:value-of select="a/b/c/d/e"/><xsl:value-of select="a/b/c/d/e"/></xsl:template>
</xsl:stylesheet>"#;
        let program = program(text, 4);
        let template = program.named_templates[&QName::unprefixed("t")];
        let content = program.ast.content(template);
        assert_eq!(program.ast[content[0]].kind, XslNodeType::Param);
        // the first value-of is too costly on its own, so there is nothing
        // to keep in the head and it is the crossing point for the second
        assert_eq!(program.ast[content[1]].kind, XslNodeType::ValueOf);
        assert_eq!(program.ast[content[2]].kind, XslNodeType::CallTemplate);
    }

    fn holds_apply_imports(program: &Program, id: NodeId) -> bool {
        program.ast[id].kind == XslNodeType::ApplyImports
            || program
                .ast
                .content(id)
                .iter()
                .any(|child| holds_apply_imports(program, *child))
    }

    #[test]
    fn test_apply_imports_stays_in_template_rule() {
        let mut body = String::new();
        for _ in 0..30 {
            body.push_str("<e/>");
        }
        body.push_str("<wrapper><xsl:apply-imports/></wrapper>");
        let program = program(&stylesheet(&body), 8);
        let level = program.principal();
        let root = level.templates[0];
        assert!(holds_apply_imports(&program, root));
        assert!(program.ast.content(root).len() > 30);
        assert_eq!(level.templates.len(), 1);
    }

    #[test]
    fn test_split_after_apply_imports() {
        let mut body = String::from("<xsl:apply-imports/>");
        for _ in 0..30 {
            body.push_str("<e/>");
        }
        let program = program(&stylesheet(&body), 8);
        let level = program.principal();
        assert!(level.templates.len() > 1);
        assert!(holds_apply_imports(&program, level.templates[0]));
        for split in &level.templates[1..] {
            assert!(!holds_apply_imports(&program, *split));
        }
    }

    #[test]
    fn test_disabled() {
        let settings = CompilerSettings {
            split_threshold: None,
            ..Default::default()
        };
        let mut program = load_text(
            &MemoryResolver::new(),
            &settings,
            &stylesheet("<xsl:value-of select='a/b/c/d/e/f/g'/>"),
        );
        assert_eq!(split_complex(&mut program, &settings), 0);
    }
}
