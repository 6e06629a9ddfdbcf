//! Flow analysis.
//!
//! Before any code is generated every instruction gets [`XslFlags`]: the
//! focus it reads, whether it has side effects or calls templates, and for
//! variables and parameters the type of their value. Flags of one template
//! reach the templates that call it through three call graphs:
//!
//! - calls outside any `xsl:for-each`, which share the caller's focus,
//! - calls inside an `xsl:for-each`, which get the loop's focus,
//! - `xsl:apply-templates`, which reaches every template of a mode.
//!
//! Focus spreads backwards over the first graph only; side effects spread
//! over all three. Types spread forward from variables to the variables
//! and parameters bound to them.

use std::collections::BTreeMap;

use quill_name::QName;
use quill_xpath_ast::ast::{BinaryOperator, Expr, PathRoot};
use quill_xpath_ast::value_template::{parse_value_template, ValueTemplatePart};
use quill_xpath_ast::{parse_expression, Pattern};
use quill_xslt_ast::{
    Ast, CompilerScopeManager, ErrorCode, NodeId, Program, XslDetail, XslFlags, XslNodeType,
};

use crate::functions::Function;
use crate::graph::{FlagStore, Graph};

/// What code generation needs to know beyond the flags on each node.
#[derive(Debug, Clone, Default)]
pub(crate) struct Analysis {
    /// Focus and side effects of the templates of each mode, the built-in
    /// rules included.
    pub(crate) mode_flags: BTreeMap<Option<QName>, XslFlags>,
    /// Global variables and parameters, each after the globals its value
    /// refers to.
    pub(crate) global_order: Vec<NodeId>,
}

impl Analysis {
    pub(crate) fn mode(&self, mode: Option<&QName>) -> XslFlags {
        self.mode_flags
            .get(&mode.cloned())
            .copied()
            .unwrap_or(XslFlags::CURRENT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FlowNode {
    Node(NodeId),
    Mode(Option<QName>),
}

struct FlowStore<'a> {
    ast: &'a mut Ast,
    modes: &'a mut BTreeMap<Option<QName>, XslFlags>,
}

impl FlagStore<FlowNode> for FlowStore<'_> {
    fn get(&self, node: &FlowNode) -> XslFlags {
        match node {
            FlowNode::Node(id) => self.ast[*id].flags,
            FlowNode::Mode(mode) => self.modes.get(mode).copied().unwrap_or_default(),
        }
    }

    fn set(&mut self, node: &FlowNode, flags: XslFlags) {
        match node {
            FlowNode::Node(id) => self.ast[*id].flags = flags,
            FlowNode::Mode(mode) => {
                self.modes.insert(mode.clone(), flags);
            }
        }
    }
}

struct NodeStore<'a>(&'a mut Ast);

impl FlagStore<NodeId> for NodeStore<'_> {
    fn get(&self, node: &NodeId) -> XslFlags {
        self.0[*node].flags
    }

    fn set(&mut self, node: &NodeId, flags: XslFlags) {
        self.0[*node].flags = flags;
    }
}

/// Flags of an XPath expression: the type of its value and the focus it
/// reads. Variable references have an unknown type here.
pub(crate) fn expression_flags(expr: &Expr) -> XslFlags {
    match expr {
        Expr::Literal(_) => XslFlags::STRING,
        Expr::Number(_) => XslFlags::NUMBER,
        Expr::VarRef(_) => XslFlags::TYPE_FILTER,
        Expr::FunctionCall(call) => {
            let args = call
                .args
                .iter()
                .fold(XslFlags::empty(), |flags, arg| flags | untyped(expression_flags(arg)));
            match Function::lookup(&call.name) {
                Some(function) => {
                    args | function.focus(call.args.len()) | function.signature().result
                }
                None => args | XslFlags::TYPE_FILTER,
            }
        }
        Expr::Binary(binary) => {
            let operands =
                untyped(expression_flags(&binary.left)) | untyped(expression_flags(&binary.right));
            let result = if binary.operator == BinaryOperator::Union {
                XslFlags::NODESET
            } else if binary.operator.is_arithmetic() {
                XslFlags::NUMBER
            } else {
                XslFlags::BOOLEAN
            };
            operands | result
        }
        Expr::Negate(operand) => untyped(expression_flags(operand)) | XslFlags::NUMBER,
        Expr::Filter(filter) => {
            let mut flags = untyped(expression_flags(&filter.primary)) | XslFlags::NODESET;
            for predicate in &filter.predicates {
                flags |= predicate_flags(expression_flags(predicate));
            }
            flags
        }
        Expr::Path(path) => {
            let mut flags = match &path.root {
                PathRoot::Relative | PathRoot::Absolute => XslFlags::CURRENT,
                PathRoot::Expr(root) => untyped(expression_flags(root)),
            };
            for step in &path.steps {
                for predicate in &step.predicates {
                    flags |= predicate_flags(expression_flags(predicate));
                }
            }
            let single = match &path.root {
                PathRoot::Relative => path.steps.len() == 1 && path.steps[0].is_self_node(),
                PathRoot::Absolute => path.steps.is_empty(),
                PathRoot::Expr(_) => false,
            };
            if single {
                flags | XslFlags::NODE
            } else {
                flags | XslFlags::NODESET
            }
        }
    }
}

fn untyped(flags: XslFlags) -> XslFlags {
    flags - XslFlags::TYPE_FILTER
}

/// A predicate has a focus of its own; only `current()` still reads the
/// focus outside it.
fn predicate_flags(flags: XslFlags) -> XslFlags {
    let mut result = flags - XslFlags::TYPE_FILTER - XslFlags::FOCUS_FILTER;
    if flags.contains(XslFlags::XSLT_CURRENT) {
        result |= XslFlags::CURRENT;
    }
    result
}

/// Run the flow analysis, leaving flags on every node. Circular attribute
/// sets, global variables and keys are reported to the program's
/// diagnostics.
pub(crate) fn analyze(program: &mut Program, max_depth: usize) -> Analysis {
    let mut analyzer = Analyzer::new(program, max_depth);
    analyzer.visit_program();
    analyzer.mark_defaults();
    analyzer.report_cycles();
    analyzer.propagate();
    analyzer.mode_flags();
    analyzer.refresh = true;
    analyzer.visit_program();
    analyzer.mode_flags();
    let global_order = analyzer.global_order();
    log::debug!(
        "flow analysis: {} modes, {} globals",
        analyzer.modes.len(),
        global_order.len()
    );
    Analysis {
        mode_flags: analyzer.modes,
        global_order,
    }
}

struct Analyzer<'a> {
    program: &'a mut Program,
    max_depth: usize,
    scope: CompilerScopeManager<NodeId>,
    /// The template, attribute set or global being visited.
    owner: Option<NodeId>,
    owner_mode: Option<QName>,
    loop_depth: usize,
    /// The key whose match and use are being visited.
    key: Option<QName>,
    /// Second pass: flags only grow, and no edges are added.
    refresh: bool,
    zero_depth: Graph<FlowNode>,
    one_depth: Graph<FlowNode>,
    mode_graph: Graph<FlowNode>,
    donors: Graph<NodeId>,
    attribute_sets: Graph<QName>,
    globals: Graph<NodeId>,
    keys: Graph<QName>,
    defaulted: Vec<NodeId>,
    modes: BTreeMap<Option<QName>, XslFlags>,
}

impl<'a> Analyzer<'a> {
    fn new(program: &'a mut Program, max_depth: usize) -> Self {
        Analyzer {
            program,
            max_depth,
            scope: CompilerScopeManager::new(),
            owner: None,
            owner_mode: None,
            loop_depth: 0,
            key: None,
            refresh: false,
            zero_depth: Graph::new(),
            one_depth: Graph::new(),
            mode_graph: Graph::new(),
            donors: Graph::new(),
            attribute_sets: Graph::new(),
            globals: Graph::new(),
            keys: Graph::new(),
            defaulted: Vec::new(),
            modes: BTreeMap::new(),
        }
    }

    fn visit_program(&mut self) {
        let mut templates = Vec::new();
        let mut attribute_sets = Vec::new();
        for level in &self.program.stylesheets {
            templates.extend(level.templates.iter().copied());
            attribute_sets.extend(level.attribute_sets.iter().copied());
            if !self.refresh {
                for (mode, rules) in &level.modes {
                    for rule in rules {
                        self.mode_graph
                            .add_edge(FlowNode::Mode(mode.clone()), FlowNode::Node(*rule));
                    }
                }
            }
        }
        for template in templates {
            let mode = self.program.ast[template].mode().cloned();
            self.enter_owner(template, mode);
            let flags = self.content(template);
            self.store(template, flags);
        }
        for set in attribute_sets {
            self.enter_owner(set, None);
            let flags = self.content(set);
            self.store(set, flags);
        }
        for global in self.program.globals.clone() {
            self.enter_owner(global, None);
            let flags = self.variable(global);
            self.store(global, flags);
        }
        self.owner = None;
        let keys: Vec<(QName, NodeId)> = self
            .program
            .keys
            .iter()
            .flat_map(|(name, ids)| ids.iter().map(move |id| (name.clone(), *id)))
            .collect();
        for (name, id) in keys {
            self.key = Some(name);
            self.scope = CompilerScopeManager::new();
            if let XslDetail::Key { match_, use_ } = self.program.ast[id].detail.clone() {
                self.pattern(&match_, id);
                self.expression(&use_, id);
            }
        }
        self.key = None;
    }

    fn enter_owner(&mut self, owner: NodeId, mode: Option<QName>) {
        self.owner = Some(owner);
        self.owner_mode = mode;
        self.loop_depth = 0;
        self.scope = CompilerScopeManager::new();
    }

    fn store(&mut self, id: NodeId, flags: XslFlags) {
        let flags = if self.refresh {
            flags - XslFlags::TYPE_FILTER
        } else {
            flags
        };
        self.program.ast[id].flags |= flags;
    }

    fn call_edge(&mut self, callee: NodeId) {
        let Some(owner) = self.owner else {
            return;
        };
        let graph = if self.loop_depth == 0 {
            &mut self.zero_depth
        } else {
            &mut self.one_depth
        };
        graph.add_edge(FlowNode::Node(owner), FlowNode::Node(callee));
    }

    /// Flags of a content list, without type bits.
    fn content(&mut self, id: NodeId) -> XslFlags {
        let children = self.program.ast.content(id).to_vec();
        self.scope.enter_scope();
        let mut flags = XslFlags::empty();
        for child in children {
            flags |= untyped(self.visit(child));
            let node = &self.program.ast[child];
            if matches!(node.kind, XslNodeType::Variable | XslNodeType::Param) {
                if let Some(name) = node.name.clone() {
                    self.scope.add_variable(name, child);
                }
            }
        }
        self.scope.exit_scope();
        flags
    }

    fn visit(&mut self, id: NodeId) -> XslFlags {
        use XslNodeType::*;
        let node = &self.program.ast[id];
        let kind = node.kind;
        let arg = node.arg.clone();
        let flags = match kind {
            Variable | Param | WithParam => self.variable(id),
            ApplyImports => {
                if !self.refresh {
                    if let Some(owner) = self.owner {
                        self.mode_graph.add_edge(
                            FlowNode::Node(owner),
                            FlowNode::Mode(self.owner_mode.clone()),
                        );
                    }
                }
                let mode = self.modes.get(&self.owner_mode).copied().unwrap_or_default();
                XslFlags::FOCUS_FILTER | (mode & XslFlags::SIDE_EFFECTS)
            }
            ApplyTemplates => self.apply_templates(id, arg.as_deref()),
            CallTemplate => self.call_template(id),
            UseAttributeSet => self.use_attribute_set(id),
            ForEach => {
                let select = self.optional_expression(arg.as_deref(), id);
                self.loop_depth += 1;
                let content = self.content(id);
                self.loop_depth -= 1;
                untyped(select)
                    | (content - XslFlags::FOCUS_FILTER - XslFlags::XSLT_CURRENT)
            }
            Sort => {
                let mut flags = untyped(self.optional_expression(arg.as_deref(), id));
                if let XslDetail::Sort(info) = self.program.ast[id].detail.clone() {
                    for avt in [&info.lang, &info.data_type, &info.order, &info.case_order]
                        .into_iter()
                        .flatten()
                    {
                        flags |= self.avt(avt, id);
                    }
                }
                flags
            }
            Copy => XslFlags::CURRENT | self.content(id),
            CopyOf | ValueOf | ValueOfDoe | If | When => {
                untyped(self.optional_expression(arg.as_deref(), id)) | self.content(id)
            }
            Element | Attribute => {
                let mut flags = self.content(id);
                if let Some(name) = &arg {
                    flags |= self.avt(name, id);
                }
                if let XslDetail::Constructor {
                    namespace: Some(namespace),
                } = self.program.ast[id].detail.clone()
                {
                    flags |= self.avt(&namespace, id);
                }
                flags
            }
            PI | LiteralAttribute => {
                let mut flags = self.content(id);
                if let Some(text) = &arg {
                    flags |= self.avt(text, id);
                }
                flags
            }
            Message => self.content(id) | XslFlags::SIDE_EFFECTS,
            Number => self.number(id),
            Choose | Otherwise | List | Comment | LiteralElement => self.content(id),
            Text | Nop | Error | Key | Template | AttributeSet => XslFlags::empty(),
        };
        self.store(id, flags);
        flags
    }

    fn resolve_variable(&self, name: &QName) -> Option<NodeId> {
        self.scope
            .lookup_variable(name)
            .copied()
            .or_else(|| self.program.global(name))
    }

    /// Flags of a variable, parameter or with-param, with the type of its
    /// value. A value that is just another variable gets its type from
    /// that variable later.
    fn variable(&mut self, id: NodeId) -> XslFlags {
        let node = &self.program.ast[id];
        let has_content = !node.content().is_empty();
        match node.arg.clone() {
            Some(select) => {
                let Some(expr) = self.parse(&select, id) else {
                    return XslFlags::TYPE_FILTER;
                };
                let flags = self.expression_flags(&expr, id);
                match expr.as_var_ref().and_then(|name| self.resolve_variable(name)) {
                    Some(donor) => {
                        if !self.refresh {
                            self.donors.add_edge(donor, id);
                        }
                        untyped(flags)
                    }
                    None => flags,
                }
            }
            None if has_content => self.content(id) | XslFlags::RTF,
            None => XslFlags::STRING,
        }
    }

    fn with_param_names(&self, id: NodeId) -> Vec<(QName, NodeId)> {
        self.program
            .ast
            .content(id)
            .iter()
            .filter(|child| self.program.ast[**child].kind == XslNodeType::WithParam)
            .filter_map(|child| {
                self.program.ast[*child]
                    .name
                    .clone()
                    .map(|name| (name, *child))
            })
            .collect()
    }

    fn params(&self, template: NodeId) -> Vec<(QName, NodeId)> {
        self.program
            .ast
            .content(template)
            .iter()
            .take_while(|child| self.program.ast[**child].kind == XslNodeType::Param)
            .filter_map(|child| {
                self.program.ast[*child]
                    .name
                    .clone()
                    .map(|name| (name, *child))
            })
            .collect()
    }

    fn apply_templates(&mut self, id: NodeId, select: Option<&str>) -> XslFlags {
        let mode = self.program.ast[id].mode().cloned();
        let mut flags = match select {
            Some(select) => untyped(self.expression(select, id)),
            None => XslFlags::CURRENT,
        };
        for child in self.program.ast.content(id).to_vec() {
            let child_flags = self.visit(child);
            if self.program.ast[child].kind == XslNodeType::Sort {
                flags |= untyped(child_flags) - XslFlags::FOCUS_FILTER - XslFlags::XSLT_CURRENT;
            } else {
                flags |= untyped(child_flags);
            }
        }
        if !self.refresh {
            if let Some(owner) = self.owner {
                self.mode_graph
                    .add_edge(FlowNode::Node(owner), FlowNode::Mode(mode.clone()));
            }
            let with_params = self.with_param_names(id);
            let rules: Vec<NodeId> = self
                .program
                .stylesheets
                .iter()
                .flat_map(|level| level.mode(mode.as_ref()).iter().copied())
                .collect();
            for rule in rules {
                for (name, param) in self.params(rule) {
                    if let Some((_, with_param)) = with_params.iter().find(|(n, _)| *n == name) {
                        self.donors.add_edge(*with_param, param);
                    }
                }
            }
        }
        let mode_flags = self.modes.get(&mode).copied().unwrap_or_default();
        flags | (mode_flags & XslFlags::SIDE_EFFECTS)
    }

    fn call_template(&mut self, id: NodeId) -> XslFlags {
        let flags = XslFlags::HAS_CALLS | self.content(id);
        let callee = self.program.ast[id]
            .name
            .as_ref()
            .and_then(|name| self.program.named_templates.get(name))
            .copied();
        let Some(callee) = callee else {
            return flags;
        };
        if self.refresh {
            let callee_flags = self.program.ast[callee].flags;
            return flags | (callee_flags & (XslFlags::FOCUS_FILTER | XslFlags::SIDE_EFFECTS));
        }
        self.call_edge(callee);
        let with_params = self.with_param_names(id);
        for (name, param) in self.params(callee) {
            match with_params.iter().find(|(n, _)| *n == name) {
                Some((_, with_param)) => self.donors.add_edge(*with_param, param),
                None => self.defaulted.push(param),
            }
        }
        flags
    }

    fn use_attribute_set(&mut self, id: NodeId) -> XslFlags {
        let mut flags = XslFlags::HAS_CALLS;
        let Some(name) = self.program.ast[id].name.clone() else {
            return flags;
        };
        let sets = self
            .program
            .attribute_sets
            .get(&name)
            .cloned()
            .unwrap_or_default();
        for set in sets {
            if self.refresh {
                flags |= self.program.ast[set].flags
                    & (XslFlags::FOCUS_FILTER | XslFlags::SIDE_EFFECTS);
            } else {
                self.call_edge(set);
            }
        }
        if !self.refresh {
            if let Some(owner) = self.owner {
                if self.program.ast[owner].kind == XslNodeType::AttributeSet {
                    if let Some(owner_name) = self.program.ast[owner].name.clone() {
                        self.attribute_sets.add_edge(owner_name, name);
                    }
                }
            }
        }
        flags
    }

    fn number(&mut self, id: NodeId) -> XslFlags {
        let XslDetail::Number(info) = self.program.ast[id].detail.clone() else {
            return XslFlags::CURRENT;
        };
        let mut flags = match &info.value {
            Some(value) => untyped(self.expression(value, id)),
            None => XslFlags::CURRENT,
        };
        for avt in [
            &info.format,
            &info.lang,
            &info.letter_value,
            &info.grouping_separator,
            &info.grouping_size,
        ]
        .into_iter()
        .flatten()
        {
            flags |= self.avt(avt, id);
        }
        flags
    }

    fn parse(&self, text: &str, id: NodeId) -> Option<Expr> {
        parse_expression(text, &self.program.ast[id].namespaces, self.max_depth).ok()
    }

    fn optional_expression(&mut self, text: Option<&str>, id: NodeId) -> XslFlags {
        match text {
            Some(text) => self.expression(text, id),
            None => XslFlags::empty(),
        }
    }

    /// Parse errors are reported during generation; here they just make the
    /// type unknown.
    fn expression(&mut self, text: &str, id: NodeId) -> XslFlags {
        match self.parse(text, id) {
            Some(expr) => self.expression_flags(&expr, id),
            None => XslFlags::TYPE_FILTER,
        }
    }

    fn expression_flags(&mut self, expr: &Expr, id: NodeId) -> XslFlags {
        if !self.refresh {
            self.references(expr, id);
        }
        expression_flags(expr)
    }

    fn avt(&mut self, text: &str, id: NodeId) -> XslFlags {
        let Ok(parts) = parse_value_template(text) else {
            return XslFlags::empty();
        };
        let mut flags = XslFlags::empty();
        for part in parts {
            if let ValueTemplatePart::Expr { text, .. } = part {
                flags |= untyped(self.expression(&text, id));
            }
        }
        flags
    }

    fn pattern(&mut self, text: &str, id: NodeId) {
        if self.refresh {
            return;
        }
        let Ok(pattern) = Pattern::parse(text, &self.program.ast[id].namespaces, self.max_depth)
        else {
            return;
        };
        for alternative in &pattern.alternatives {
            if let quill_xpath_ast::pattern::PatternRoot::IdKey(expr) = &alternative.root {
                self.references(expr, id);
            }
            for step in &alternative.steps {
                for predicate in &step.predicates {
                    self.references(predicate, id);
                }
            }
        }
    }

    /// Record the globals a global's value refers to, and the keys a key
    /// refers to by a literal name.
    fn references(&mut self, expr: &Expr, id: NodeId) {
        if let Some(owner) = self.owner.filter(|owner| self.program.ast[*owner].is_global()) {
            for name in expr.variables() {
                if self.scope.lookup_variable(name).is_some() {
                    continue;
                }
                if let Some(global) = self.program.global(name) {
                    self.globals.add_edge(owner, global);
                }
            }
        }
        if let Some(key) = self.key.clone() {
            let mut referenced = Vec::new();
            expr.walk(&mut |expr| {
                if let Expr::FunctionCall(call) = expr {
                    if Function::lookup(&call.name) == Some(Function::Key) {
                        if let Some(Expr::Literal(name)) = call.args.first() {
                            referenced.push(name.clone());
                        }
                    }
                }
            });
            for name in referenced {
                if let Ok(name) = QName::parse(&name, &self.program.ast[id].namespaces) {
                    self.keys.add_edge(key.clone(), name);
                }
            }
        }
    }

    /// Parameters whose default value can be used: those of template
    /// rules, those some call-template leaves out, and global parameters.
    /// Other parameters take their type only from what is passed to them.
    fn mark_defaults(&mut self) {
        let mut defaulted = std::mem::take(&mut self.defaulted);
        for level in &self.program.stylesheets {
            for template in &level.templates {
                if self.program.ast[*template].arg.is_some() {
                    defaulted.extend(self.params(*template).into_iter().map(|(_, id)| id));
                }
            }
        }
        for global in &self.program.globals {
            if self.program.ast[*global].kind == XslNodeType::Param {
                defaulted.push(*global);
            }
        }
        for id in defaulted {
            self.program.ast[id].flags |= XslFlags::MAY_BE_DEFAULT;
        }
        for level in &self.program.stylesheets {
            for template in &level.templates {
                for (_, param) in self.params(*template) {
                    let flags = &mut self.program.ast[param].flags;
                    if !flags.contains(XslFlags::MAY_BE_DEFAULT) {
                        *flags -= XslFlags::TYPE_FILTER;
                    }
                }
            }
        }
    }

    fn report_cycles(&mut self) {
        for name in self.attribute_sets.cycles() {
            let location = self
                .program
                .attribute_sets
                .get(&name)
                .and_then(|sets| sets.last())
                .map(|id| self.program.ast[*id].location)
                .unwrap_or_default();
            self.program.diagnostics.error(
                location,
                ErrorCode::XTSE0720,
                format!("attribute set {} uses itself", name),
            );
        }
        for global in self.globals.cycles() {
            let node = &self.program.ast[global];
            let name = node.name.as_ref().map(|n| n.to_string()).unwrap_or_default();
            let location = node.location;
            self.program.diagnostics.error(
                location,
                ErrorCode::XTDE0640,
                format!("the value of global variable {} depends on itself", name),
            );
        }
        for name in self.keys.cycles() {
            let location = self
                .program
                .keys
                .get(&name)
                .and_then(|keys| keys.first())
                .map(|id| self.program.ast[*id].location)
                .unwrap_or_default();
            self.program.diagnostics.error(
                location,
                ErrorCode::QUILL0002,
                format!("key {} refers to itself", name),
            );
        }
    }

    fn propagate(&mut self) {
        let mut store = FlowStore {
            ast: &mut self.program.ast,
            modes: &mut self.modes,
        };
        for flag in [XslFlags::CURRENT, XslFlags::POSITION, XslFlags::LAST] {
            self.zero_depth.propagate_backwards(&mut store, flag);
        }
        let all = self
            .zero_depth
            .merged(&self.one_depth)
            .merged(&self.mode_graph);
        all.propagate_backwards(&mut store, XslFlags::SIDE_EFFECTS);

        let mut store = NodeStore(&mut self.program.ast);
        for flag in [
            XslFlags::STRING,
            XslFlags::NUMBER,
            XslFlags::BOOLEAN,
            XslFlags::NODE,
            XslFlags::NODESET,
            XslFlags::RTF,
        ] {
            self.donors.propagate(&mut store, flag);
        }
    }

    fn mode_flags(&mut self) {
        let mut modes = self.program.modes();
        if !modes.contains(&None) {
            modes.push(None);
        }
        for mode in modes {
            // the built-in rules read the current node
            let mut flags = XslFlags::CURRENT;
            for level in &self.program.stylesheets {
                for rule in level.mode(mode.as_ref()) {
                    flags |= self.program.ast[*rule].flags
                        & (XslFlags::FOCUS_FILTER | XslFlags::SIDE_EFFECTS);
                }
            }
            *self.modes.entry(mode).or_default() |= flags;
        }
    }

    fn global_order(&self) -> Vec<NodeId> {
        let mut order: Vec<NodeId> = self.globals.post_order();
        for global in &self.program.globals {
            if !order.contains(global) {
                order.push(*global);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_name::Namespaces;
    use quill_xpath_ast::DEFAULT_MAX_DEPTH;
    use quill_xslt_ast::{load_text, CompilerSettings, MemoryResolver};

    fn flags_of(xpath: &str) -> XslFlags {
        let namespaces = Namespaces::default();
        let expr = parse_expression(xpath, &namespaces, DEFAULT_MAX_DEPTH).unwrap();
        expression_flags(&expr)
    }

    fn program(body: &str) -> Program {
        let text = format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
            body
        );
        let settings = CompilerSettings {
            split_threshold: None,
            ..Default::default()
        };
        let program = load_text(&MemoryResolver::new(), &settings, &text);
        assert!(!program.diagnostics.has_errors(), "{:?}", program.diagnostics);
        program
    }

    fn named(program: &Program, name: &str) -> XslFlags {
        let id = program.named_templates[&QName::unprefixed(name)];
        program.ast[id].flags
    }

    fn param(program: &Program, template: &str, name: &str) -> XslFlags {
        let id = program.named_templates[&QName::unprefixed(template)];
        let param = program
            .ast
            .content(id)
            .iter()
            .find(|child| program.ast[**child].name == Some(QName::unprefixed(name)))
            .copied()
            .unwrap();
        program.ast[param].flags
    }

    #[test]
    fn test_expression_types() {
        assert_eq!(flags_of("'a'"), XslFlags::STRING);
        assert_eq!(flags_of("1 + 2"), XslFlags::NUMBER);
        assert_eq!(flags_of("1 = 2"), XslFlags::BOOLEAN);
        assert_eq!(flags_of("a | b"), XslFlags::NODESET | XslFlags::CURRENT);
        assert_eq!(flags_of("."), XslFlags::NODE | XslFlags::CURRENT);
        assert_eq!(flags_of("$x"), XslFlags::TYPE_FILTER);
    }

    #[test]
    fn test_expression_focus() {
        assert_eq!(flags_of("position()"), XslFlags::NUMBER | XslFlags::POSITION);
        assert_eq!(flags_of("last() - 1"), XslFlags::NUMBER | XslFlags::LAST);
        assert_eq!(flags_of("string()"), XslFlags::STRING | XslFlags::CURRENT);
        assert_eq!(flags_of("string('x')"), XslFlags::STRING);
    }

    #[test]
    fn test_predicate_consumes_focus() {
        // position() inside a predicate is the predicate's own focus
        assert_eq!(
            flags_of("$x[position() = last()]"),
            XslFlags::NODESET
        );
        // current() still reads the outer focus
        let flags = flags_of("$x[. = current()]");
        assert!(flags.contains(XslFlags::CURRENT));
        assert!(flags.contains(XslFlags::XSLT_CURRENT));
        assert!(!flags.contains(XslFlags::POSITION));
    }

    #[test]
    fn test_focus_reaches_callers() {
        let mut program = program(
            r#"
            <xsl:template name="a"><xsl:call-template name="b"/></xsl:template>
            <xsl:template name="b"><xsl:value-of select="position()"/></xsl:template>
            <xsl:template name="c"><xsl:value-of select="'x'"/></xsl:template>
            "#,
        );
        analyze(&mut program, DEFAULT_MAX_DEPTH);
        assert!(named(&program, "a").contains(XslFlags::POSITION));
        assert!(named(&program, "b").contains(XslFlags::POSITION));
        assert!(named(&program, "c").focus_bits().is_empty());
    }

    #[test]
    fn test_for_each_provides_focus() {
        let mut program = program(
            r#"
            <xsl:template name="a">
              <xsl:for-each select="*"><xsl:call-template name="b"/></xsl:for-each>
            </xsl:template>
            <xsl:template name="b"><xsl:value-of select="last()"/></xsl:template>
            "#,
        );
        analyze(&mut program, DEFAULT_MAX_DEPTH);
        let a = named(&program, "a");
        assert!(a.contains(XslFlags::CURRENT));
        assert!(!a.contains(XslFlags::LAST));
        assert!(named(&program, "b").contains(XslFlags::LAST));
    }

    #[test]
    fn test_side_effects_spread_through_modes() {
        let mut program = program(
            r#"
            <xsl:template name="a"><xsl:apply-templates mode="m"/></xsl:template>
            <xsl:template match="x" mode="m"><xsl:message>hi</xsl:message></xsl:template>
            "#,
        );
        let analysis = analyze(&mut program, DEFAULT_MAX_DEPTH);
        assert!(named(&program, "a").contains(XslFlags::SIDE_EFFECTS));
        assert!(analysis
            .mode(Some(&QName::unprefixed("m")))
            .contains(XslFlags::SIDE_EFFECTS));
        assert!(!analysis.mode(None).contains(XslFlags::SIDE_EFFECTS));
    }

    #[test]
    fn test_parameter_types_come_from_callers() {
        let mut program = program(
            r#"
            <xsl:template name="a">
              <xsl:variable name="n" select="1"/>
              <xsl:call-template name="b"><xsl:with-param name="p" select="$n"/></xsl:call-template>
              <xsl:call-template name="b"><xsl:with-param name="p" select="2"/></xsl:call-template>
            </xsl:template>
            <xsl:template name="b"><xsl:param name="p" select="'s'"/><xsl:value-of select="$p"/></xsl:template>
            "#,
        );
        analyze(&mut program, DEFAULT_MAX_DEPTH);
        // every caller passes p, so the string default does not count
        let p = param(&program, "b", "p");
        assert_eq!(p.type_bits(), XslFlags::NUMBER);
        assert!(!p.contains(XslFlags::MAY_BE_DEFAULT));
    }

    #[test]
    fn test_omitted_parameter_may_be_default() {
        let mut program = program(
            r#"
            <xsl:template name="a"><xsl:call-template name="b"/></xsl:template>
            <xsl:template name="b"><xsl:param name="p" select="'s'"/><xsl:value-of select="$p"/></xsl:template>
            "#,
        );
        analyze(&mut program, DEFAULT_MAX_DEPTH);
        let p = param(&program, "b", "p");
        assert!(p.contains(XslFlags::MAY_BE_DEFAULT));
        assert_eq!(p.type_bits(), XslFlags::STRING);
    }

    #[test]
    fn test_circular_globals() {
        let mut program = program(
            r#"
            <xsl:variable name="a" select="$b"/>
            <xsl:variable name="b" select="$a + 1"/>
            <xsl:variable name="c" select="1"/>
            "#,
        );
        analyze(&mut program, DEFAULT_MAX_DEPTH);
        assert_eq!(program.diagnostics.with_code(ErrorCode::XTDE0640).count(), 1);
    }

    #[test]
    fn test_global_order() {
        let mut program = program(
            r#"
            <xsl:variable name="a" select="$b + 1"/>
            <xsl:variable name="b" select="1"/>
            "#,
        );
        let analysis = analyze(&mut program, DEFAULT_MAX_DEPTH);
        let names: Vec<String> = analysis
            .global_order
            .iter()
            .map(|id| program.ast[*id].name.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_circular_attribute_sets() {
        let mut program = program(
            r#"
            <xsl:attribute-set name="a" use-attribute-sets="b"/>
            <xsl:attribute-set name="b" use-attribute-sets="a"/>
            "#,
        );
        analyze(&mut program, DEFAULT_MAX_DEPTH);
        assert_eq!(program.diagnostics.with_code(ErrorCode::XTSE0720).count(), 1);
    }

    #[test]
    fn test_circular_key() {
        let mut program = program(
            r#"<xsl:key name="k" match="a" use="key('k', 'x')"/>"#,
        );
        analyze(&mut program, DEFAULT_MAX_DEPTH);
        assert_eq!(program.diagnostics.with_code(ErrorCode::QUILL0002).count(), 1);
    }
}
