//! Lowering a loaded and analyzed stylesheet to QIL.
//!
//! Every template, attribute set and key becomes a QIL function. A
//! function takes the parts of the focus it reads as its first formals,
//! followed by its parameters, so a template that never looks at the
//! context node does not receive one.
//!
//! Generation runs in phases. All functions are declared before any body
//! is generated, so bodies can invoke each other in any order; globals are
//! declared before their values are generated for the same reason.

use std::collections::BTreeMap;
use std::mem;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use quill_name::{QName, QUILL_NAMESPACE};
use quill_qil::{QilExpression, QilGraph, QilNodeId, QilNodeType, SourceLine, XmlQueryType};
use quill_xpath_ast::Pattern;
use quill_xslt_ast::{
    CompilerScopeManager, CompilerSettings, Diagnostics, ErrorCode, Location, NodeId, Program,
    StylesheetId, XslFlags, XslNodeType,
};

use crate::analyzer::Analysis;
use crate::error::Error;

/// The focus expressions are evaluated in. A missing part is not
/// available where the code is generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Focus {
    pub(crate) current: Option<QilNodeId>,
    pub(crate) position: Option<QilNodeId>,
    pub(crate) last: Option<QilNodeId>,
}

impl Focus {
    pub(crate) fn new(current: QilNodeId, position: QilNodeId, last: QilNodeId) -> Focus {
        Focus {
            current: Some(current),
            position: Some(position),
            last: Some(last),
        }
    }

    /// The parts that are present, in formal order.
    pub(crate) fn parts(&self) -> Vec<QilNodeId> {
        [self.current, self.position, self.last]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// How a template parameter gets its value when the caller does not pass
/// one.
#[derive(Debug, Clone)]
pub(crate) enum ParamDefault {
    /// An expression over the template's formals, copied into each caller
    /// with the formals replaced by the actual arguments.
    Inline(QilNodeId),
    /// A function taking a copy of `uses`: the template's focus formals and
    /// the parameters declared before this one.
    Helper {
        function: QilNodeId,
        uses: Vec<QilNodeId>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct TemplateParam {
    pub(crate) name: QName,
    pub(crate) node: NodeId,
    pub(crate) formal: QilNodeId,
    pub(crate) default: Option<ParamDefault>,
}

/// A generated function together with its formals.
#[derive(Debug, Clone)]
pub(crate) struct Callee {
    pub(crate) function: QilNodeId,
    pub(crate) focus: Focus,
    pub(crate) params: Vec<TemplateParam>,
}

/// A function applying the template rules of a mode to a single node.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    pub(crate) function: QilNodeId,
    pub(crate) focus: Focus,
    /// Parameters passed on to whichever template is chosen.
    pub(crate) params: Vec<(QName, QilNodeId)>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct KeyFunction {
    pub(crate) function: QilNodeId,
    pub(crate) context: QilNodeId,
    pub(crate) value: QilNodeId,
}

/// Generator state that belongs to the function body being generated.
pub(crate) struct Context {
    pub(crate) focus: Focus,
    pub(crate) xslt_current: Option<QilNodeId>,
    pub(crate) scope: CompilerScopeManager<QilNodeId>,
    /// The template rule whose body this is, for `xsl:apply-imports`.
    pub(crate) rule: Option<NodeId>,
    pub(crate) loop_depth: usize,
}

impl Context {
    pub(crate) fn new(focus: Focus) -> Context {
        Context {
            focus,
            xslt_current: focus.current,
            scope: CompilerScopeManager::new(),
            rule: None,
            loop_depth: 0,
        }
    }
}

/// What the generator produced. `internal` is set when the generator
/// found its own output inconsistent.
pub(crate) struct Generated {
    pub(crate) qil: QilExpression,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) internal: Option<Error>,
}

pub(crate) struct Generator<'a> {
    pub(crate) program: &'a Program,
    pub(crate) analysis: &'a Analysis,
    pub(crate) settings: &'a CompilerSettings,
    pub(crate) g: QilGraph,
    pub(crate) diagnostics: Diagnostics,

    functions: Vec<QilNodeId>,
    function_names: HashSet<QName>,
    pub(crate) templates: HashMap<NodeId, Callee>,
    pub(crate) attribute_sets: BTreeMap<QName, Callee>,
    pub(crate) keys: BTreeMap<QName, KeyFunction>,
    pub(crate) key_lookup: Option<QilNodeId>,
    pub(crate) dispatchers: HashMap<(Option<QName>, Vec<QName>), Dispatcher>,
    pub(crate) importers: HashMap<(StylesheetId, Option<QName>), Dispatcher>,
    /// Match patterns of templates, parsed once; `None` when invalid.
    pub(crate) match_patterns: HashMap<NodeId, Option<Pattern>>,
    /// Tests of pattern alternatives against a placeholder candidate.
    pub(crate) pattern_tests: HashMap<(NodeId, usize), (QilNodeId, QilNodeId)>,

    pub(crate) globals: HashMap<QName, QilNodeId>,
    global_nodes: Vec<(NodeId, QilNodeId)>,
    global_parameters: Vec<QilNodeId>,
    global_variables: Vec<QilNodeId>,

    pub(crate) focus: Focus,
    pub(crate) xslt_current: Option<QilNodeId>,
    pub(crate) scope: CompilerScopeManager<QilNodeId>,
    pub(crate) rule: Option<NodeId>,
    pub(crate) loop_depth: usize,

    location: Location,
    internal: Option<Error>,
}

/// A name in the compiler's own namespace.
pub(crate) fn internal_name(local: &str) -> QName {
    QName::new(
        local.to_string(),
        Some(QUILL_NAMESPACE.to_string()),
        Some("quill".to_string()),
    )
}

/// The QIL type of a variable or parameter with the given analysis flags.
pub(crate) fn flags_type(flags: XslFlags) -> XmlQueryType {
    if !flags.has_known_type() {
        return XmlQueryType::ITEM_STAR;
    }
    let bits = flags.type_bits();
    if bits == XslFlags::STRING {
        XmlQueryType::STRING
    } else if bits == XslFlags::NUMBER {
        XmlQueryType::DOUBLE
    } else if bits == XslFlags::BOOLEAN {
        XmlQueryType::BOOLEAN
    } else if bits == XslFlags::NODE {
        XmlQueryType::NODE
    } else if bits == XslFlags::NODESET {
        XmlQueryType::NODE_SET
    } else if bits == XslFlags::RTF {
        XmlQueryType::DOCUMENT
    } else {
        XmlQueryType::ITEM_STAR
    }
}

fn mode_suffix(mode: Option<&QName>) -> String {
    match mode {
        Some(mode) => format!("-{}", mode.local_name()),
        None => String::new(),
    }
}

/// Generate QIL for an analyzed program.
pub(crate) fn generate(
    program: &Program,
    analysis: &Analysis,
    settings: &CompilerSettings,
    diagnostics: Diagnostics,
) -> Generated {
    let mut generator = Generator::new(program, analysis, settings, diagnostics);
    generator.declare_functions();
    generator.declare_globals();
    generator.param_defaults();
    generator.global_values();
    generator.bodies();
    let root = generator.root();
    log::debug!(
        "generated {} functions, {} nodes",
        generator.functions.len(),
        generator.g.len()
    );
    generator.finish(root)
}

impl<'a> Generator<'a> {
    fn new(
        program: &'a Program,
        analysis: &'a Analysis,
        settings: &'a CompilerSettings,
        diagnostics: Diagnostics,
    ) -> Self {
        Generator {
            program,
            analysis,
            settings,
            g: QilGraph::with_annotations(settings.include_debug_information),
            diagnostics,
            functions: Vec::new(),
            function_names: HashSet::new(),
            templates: HashMap::new(),
            attribute_sets: BTreeMap::new(),
            keys: BTreeMap::new(),
            key_lookup: None,
            dispatchers: HashMap::new(),
            importers: HashMap::new(),
            match_patterns: HashMap::new(),
            pattern_tests: HashMap::new(),
            globals: HashMap::new(),
            global_nodes: Vec::new(),
            global_parameters: Vec::new(),
            global_variables: Vec::new(),
            focus: Focus::default(),
            xslt_current: None,
            scope: CompilerScopeManager::new(),
            rule: None,
            loop_depth: 0,
            location: Location::default(),
            internal: None,
        }
    }

    fn finish(self, root: QilNodeId) -> Generated {
        Generated {
            qil: QilExpression {
                graph: self.g,
                root,
                functions: self.functions,
                global_parameters: self.global_parameters,
                global_variables: self.global_variables,
            },
            diagnostics: self.diagnostics,
            internal: self.internal,
        }
    }

    // phase 1: a function for every template, attribute set and key

    fn declare_functions(&mut self) {
        let program = self.program;
        let mut match_templates = 0;
        for level in &program.stylesheets {
            for template in &level.templates {
                let name = match &program.ast[*template].name {
                    Some(name) => name.clone(),
                    None => {
                        match_templates += 1;
                        internal_name(&format!("template-{}", match_templates))
                    }
                };
                self.declare_template(*template, name);
            }
        }
        for (name, declarations) in &program.attribute_sets {
            let flags = declarations
                .iter()
                .fold(XslFlags::empty(), |flags, id| flags | program.ast[*id].flags);
            let focus = self.focus_formals(flags);
            let function = self.new_function(
                internal_name(&format!("attribute-set-{}", name.local_name())),
                focus.parts(),
                XmlQueryType::NODE_SET,
                flags.contains(XslFlags::SIDE_EFFECTS),
            );
            self.attribute_sets.insert(
                name.clone(),
                Callee {
                    function,
                    focus,
                    params: Vec::new(),
                },
            );
        }
        for name in program.keys.keys() {
            let context = self.g.parameter("context", XmlQueryType::NODE);
            let value = self.g.parameter("value", XmlQueryType::STRING);
            let function = self.new_function(
                internal_name(&format!("key-{}", name.local_name())),
                vec![context, value],
                XmlQueryType::NODE_SET,
                false,
            );
            self.keys.insert(
                name.clone(),
                KeyFunction {
                    function,
                    context,
                    value,
                },
            );
        }
    }

    fn declare_template(&mut self, id: NodeId, name: QName) {
        let program = self.program;
        let node = &program.ast[id];
        let focus = self.focus_formals(node.flags);
        let mut formals = focus.parts();
        let mut params = Vec::new();
        for child in node.content() {
            let param = &program.ast[*child];
            if param.kind != XslNodeType::Param {
                break;
            }
            let Some(param_name) = param.name.clone() else {
                continue;
            };
            let formal = self
                .g
                .parameter(param_name.to_string(), flags_type(param.flags));
            formals.push(formal);
            params.push(TemplateParam {
                name: param_name,
                node: *child,
                formal,
                default: None,
            });
        }
        let function = self.new_function(
            name,
            formals,
            XmlQueryType::NODE_SET,
            node.flags.contains(XslFlags::SIDE_EFFECTS),
        );
        self.templates.insert(
            id,
            Callee {
                function,
                focus,
                params,
            },
        );
    }

    /// Formals for the focus parts in `flags`.
    pub(crate) fn focus_formals(&mut self, flags: XslFlags) -> Focus {
        let current = flags
            .contains(XslFlags::CURRENT)
            .then(|| self.g.parameter("current", XmlQueryType::NODE));
        let position = flags
            .contains(XslFlags::POSITION)
            .then(|| self.g.parameter("position", XmlQueryType::DOUBLE));
        let last = flags
            .contains(XslFlags::LAST)
            .then(|| self.g.parameter("last", XmlQueryType::DOUBLE));
        Focus {
            current,
            position,
            last,
        }
    }

    /// Declare a function, making its name unique.
    pub(crate) fn new_function(
        &mut self,
        name: QName,
        formals: Vec<QilNodeId>,
        ty: XmlQueryType,
        side_effects: bool,
    ) -> QilNodeId {
        let name = self.unique_name(name);
        let function = self.g.function(name, formals, ty, side_effects);
        self.functions.push(function);
        function
    }

    fn unique_name(&mut self, name: QName) -> QName {
        if self.function_names.insert(name.clone()) {
            return name;
        }
        let mut counter = 2;
        loop {
            let candidate = QName::new(
                format!("{}-{}", name.local_name(), counter),
                name.namespace().map(String::from),
                name.prefix().map(String::from),
            );
            if self.function_names.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }

    // phase 2: globals, so that any value can refer to any global

    fn declare_globals(&mut self) {
        let program = self.program;
        for id in &self.analysis.global_order {
            let node = &program.ast[*id];
            let Some(name) = node.name.clone() else {
                continue;
            };
            let ty = flags_type(node.flags);
            let binding = if node.kind == XslNodeType::Param {
                let parameter = self.g.parameter(name.to_string(), ty);
                self.global_parameters.push(parameter);
                parameter
            } else {
                let placeholder = self.g.unknown(ty);
                let variable = self.bind(placeholder, &name.to_string());
                self.global_variables.push(variable);
                variable
            };
            self.globals.insert(name, binding);
            self.global_nodes.push((*id, binding));
        }
    }

    // phase 3: defaults of parameters some caller omits

    fn param_defaults(&mut self) {
        let program = self.program;
        for level in &program.stylesheets {
            for template in &level.templates {
                let count = self
                    .templates
                    .get(template)
                    .map_or(0, |callee| callee.params.len());
                for index in 0..count {
                    let node = self.templates[template].params[index].node;
                    if program.ast[node].flags.contains(XslFlags::MAY_BE_DEFAULT) {
                        self.param_default(*template, index);
                    }
                }
            }
        }
    }

    /// The default of a template parameter, generated on first use.
    pub(crate) fn param_default(&mut self, template: NodeId, index: usize) -> Option<ParamDefault> {
        let callee = self.templates.get(&template)?.clone();
        let param = callee.params.get(index)?;
        if let Some(default) = &param.default {
            return Some(default.clone());
        }
        let default = self.build_default(&callee, index);
        if let Some(callee) = self.templates.get_mut(&template) {
            callee.params[index].default = Some(default.clone());
        }
        Some(default)
    }

    fn build_default(&mut self, callee: &Callee, index: usize) -> ParamDefault {
        let param = &callee.params[index];
        let mut context = Context::new(callee.focus);
        for earlier in &callee.params[..index] {
            context.scope.add_variable(earlier.name.clone(), earlier.formal);
        }
        let ty = self.g.xml_type(param.formal);
        let value = self.in_context(context, |this| {
            let value = this.variable_value(param.node);
            this.coerce(value, ty)
        });
        let flags = self.program.ast[param.node].flags;
        if !flags.contains(XslFlags::HAS_CALLS) {
            return ParamDefault::Inline(value);
        }
        // a default that calls templates is generated once, as a function
        let mut uses = callee.focus.parts();
        uses.extend(callee.params[..index].iter().map(|param| param.formal));
        let mut substitutions = HashMap::new();
        let mut formals = Vec::new();
        for formal in &uses {
            let name = self.g.node(*formal).name().unwrap_or("arg").to_string();
            let formal_type = self.g.xml_type(*formal);
            let copy = self.g.parameter(name, formal_type);
            substitutions.insert(*formal, copy);
            formals.push(copy);
        }
        let body = self.g.clone_with_substitution(value, &substitutions);
        let template_name = self
            .g
            .node(callee.function)
            .function_name()
            .map(|name| name.local_name().to_string())
            .unwrap_or_default();
        let function = self.new_function(
            internal_name(&format!(
                "default-{}-{}",
                template_name,
                param.name.local_name()
            )),
            formals,
            ty,
            flags.contains(XslFlags::SIDE_EFFECTS),
        );
        self.g.set_function_body(function, body);
        ParamDefault::Helper { function, uses }
    }

    // phase 4: global values, evaluated with the document root as focus

    fn global_values(&mut self) {
        for (id, binding) in self.global_nodes.clone() {
            self.at(id);
            let context = self.document_context();
            let ty = self.g.xml_type(binding);
            let value = self.in_context(context, |this| {
                let value = this.variable_value(id);
                this.coerce(value, ty)
            });
            if self.program.ast[id].kind == XslNodeType::Param {
                self.g.node_mut(binding).children = vec![value];
            } else {
                self.g.set_child(binding, 0, value);
            }
        }
    }

    fn document_context(&mut self) -> Context {
        let context = self.g.xml_context();
        let root = self.g.axis(QilNodeType::Root, context);
        let one = self.g.literal_double(1.0);
        Context::new(Focus::new(root, one, one))
    }

    // phase 5: bodies

    fn bodies(&mut self) {
        let program = self.program;
        for level in &program.stylesheets {
            for template in &level.templates {
                let Some(callee) = self.templates.get(template).cloned() else {
                    continue;
                };
                self.at(*template);
                let mut context = Context::new(callee.focus);
                for param in &callee.params {
                    context.scope.add_variable(param.name.clone(), param.formal);
                }
                if program.ast[*template].arg.is_some() {
                    context.rule = Some(*template);
                }
                let body = self.in_context(context, |this| this.content(*template));
                self.g.set_function_body(callee.function, body);
            }
        }
        for (name, declarations) in &program.attribute_sets {
            let Some(callee) = self.attribute_sets.get(name).cloned() else {
                continue;
            };
            let body = self.in_context(Context::new(callee.focus), |this| {
                let mut items = Vec::new();
                for declaration in declarations {
                    this.at(*declaration);
                    items.push(this.content(*declaration));
                }
                this.sequence(items)
            });
            self.g.set_function_body(callee.function, body);
        }
        for name in program.keys.keys() {
            self.key_body(name);
        }
    }

    // phase 6: the root applies templates to the document node

    fn root(&mut self) -> QilNodeId {
        let context = self.g.xml_context();
        let one = self.g.literal_double(1.0);
        let focus = Focus::new(context, one, one);
        let dispatcher = self.dispatcher(None, &[]);
        let args = self.focus_actuals(&dispatcher.focus, focus);
        self.g.invoke(dispatcher.function, args)
    }

    // context handling

    /// Run `f` with the generator switched to `context`.
    pub(crate) fn in_context<T>(&mut self, context: Context, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.swap_context(context);
        let result = f(self);
        self.swap_context(saved);
        result
    }

    fn swap_context(&mut self, context: Context) -> Context {
        Context {
            focus: mem::replace(&mut self.focus, context.focus),
            xslt_current: mem::replace(&mut self.xslt_current, context.xslt_current),
            scope: mem::replace(&mut self.scope, context.scope),
            rule: mem::replace(&mut self.rule, context.rule),
            loop_depth: mem::replace(&mut self.loop_depth, context.loop_depth),
        }
    }

    /// Run `f` with a different focus; variables stay in scope.
    pub(crate) fn with_focus<T>(&mut self, focus: Focus, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = mem::replace(&mut self.focus, focus);
        let result = f(self);
        self.focus = saved;
        result
    }

    pub(crate) fn current(&mut self) -> QilNodeId {
        match self.focus.current {
            Some(current) => current,
            None => self.internal_error("the context node is not available"),
        }
    }

    pub(crate) fn position(&mut self) -> QilNodeId {
        match self.focus.position {
            Some(position) => position,
            None => self.internal_error("the context position is not available"),
        }
    }

    pub(crate) fn last(&mut self) -> QilNodeId {
        match self.focus.last {
            Some(last) => last,
            None => self.internal_error("the context size is not available"),
        }
    }

    /// The node `current()` returns.
    pub(crate) fn xslt_current(&mut self) -> QilNodeId {
        match self.xslt_current {
            Some(current) => current,
            None => self.internal_error("the current node is not available"),
        }
    }

    /// Actual arguments from `actual` for the focus formals in `formals`.
    pub(crate) fn focus_actuals(&mut self, formals: &Focus, actual: Focus) -> Vec<QilNodeId> {
        let saved = mem::replace(&mut self.focus, actual);
        let mut args = Vec::new();
        if formals.current.is_some() {
            args.push(self.current());
        }
        if formals.position.is_some() {
            args.push(self.position());
        }
        if formals.last.is_some() {
            args.push(self.last());
        }
        self.focus = saved;
        args
    }

    // helpers

    /// Record where generation is, for source lines and internal errors.
    pub(crate) fn at(&mut self, id: NodeId) {
        let location = self.program.ast[id].location;
        self.location = location;
        if self.settings.include_debug_information {
            self.g.set_source_line(Some(SourceLine {
                module: location.module as u32,
                line: location.line,
                column: location.column,
            }));
        }
    }

    /// Report a problem at node `id` and return an expression raising it.
    /// Under forwards-compatible processing the problem is only a warning,
    /// and an error at run time if the expression is evaluated.
    pub(crate) fn report(
        &mut self,
        id: NodeId,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> QilNodeId {
        let message = message.into();
        let node = &self.program.ast[id];
        if node.is_forwards_compatible() {
            self.diagnostics.warning(node.location, code, message.clone());
        } else {
            self.diagnostics.error(node.location, code, message.clone());
        }
        let text = self.g.literal_string(format!("{}: {}", code, message));
        self.g.error(text)
    }

    pub(crate) fn internal_error(&mut self, message: &str) -> QilNodeId {
        if self.internal.is_none() {
            self.internal = Some(Error::Internal {
                location: self.location,
                message: message.to_string(),
            });
        }
        let text = self.g.literal_string(message);
        self.g.error(text)
    }

    /// `value` converted to `ty` unless it already has that type.
    pub(crate) fn coerce(&mut self, value: QilNodeId, ty: XmlQueryType) -> QilNodeId {
        if self.g.xml_type(value).is_subtype_of(ty) {
            value
        } else {
            self.g.xslt_convert(value, ty)
        }
    }

    pub(crate) fn iterate(&mut self, binding: QilNodeId, name: &str) -> QilNodeId {
        let iterator = self.g.for_(binding);
        self.g.set_debug_name(iterator, name);
        iterator
    }

    pub(crate) fn bind(&mut self, binding: QilNodeId, name: &str) -> QilNodeId {
        let iterator = self.g.let_(binding);
        self.g.set_debug_name(iterator, name);
        iterator
    }

    /// True when `sequence` has at least one item.
    pub(crate) fn exists(&mut self, sequence: QilNodeId) -> QilNodeId {
        let empty = self.g.is_empty_(sequence);
        self.g.not(empty)
    }

    pub(crate) fn sequence(&mut self, mut items: Vec<QilNodeId>) -> QilNodeId {
        match items.len() {
            0 => self.g.empty(),
            1 => items.remove(0),
            _ => self.g.sequence(items),
        }
    }

    /// Look a variable up in the local scope, then among the globals.
    pub(crate) fn variable(&self, name: &QName) -> Option<QilNodeId> {
        self.scope
            .lookup_variable(name)
            .copied()
            .or_else(|| self.globals.get(name).copied())
    }

    /// The dispatcher for `mode` passing on `params`, created on first use.
    pub(crate) fn dispatcher(&mut self, mode: Option<&QName>, params: &[QName]) -> Dispatcher {
        let key = (mode.cloned(), params.to_vec());
        if let Some(dispatcher) = self.dispatchers.get(&key) {
            return dispatcher.clone();
        }
        let flags = self.analysis.mode(mode);
        let focus = self.focus_formals(flags | XslFlags::CURRENT);
        let mut formals = focus.parts();
        let mut passed = Vec::new();
        for name in params {
            let formal = self.g.parameter(name.to_string(), XmlQueryType::ITEM_STAR);
            formals.push(formal);
            passed.push((name.clone(), formal));
        }
        let mut name = format!("apply-templates{}", mode_suffix(mode));
        for param in params {
            name.push_str("-with-");
            name.push_str(param.local_name());
        }
        let function = self.new_function(
            internal_name(&name),
            formals,
            XmlQueryType::NODE_SET,
            flags.contains(XslFlags::SIDE_EFFECTS),
        );
        let dispatcher = Dispatcher {
            function,
            focus,
            params: passed,
        };
        // cached before the body exists, as built-in rules apply the mode
        // recursively
        self.dispatchers.insert(key, dispatcher.clone());
        let levels = self.program.levels_by_precedence();
        let rules = self.mode_rules(&levels, mode);
        let body = self.in_context(Context::new(focus), |this| {
            this.dispatch_body(&rules, &dispatcher, mode)
        });
        self.g.set_function_body(function, body);
        dispatcher
    }

    /// The function applying the rules imported into `level`, for
    /// `xsl:apply-imports`.
    pub(crate) fn importer(&mut self, level: StylesheetId, mode: Option<&QName>) -> Dispatcher {
        let key = (level, mode.cloned());
        if let Some(importer) = self.importers.get(&key) {
            return importer.clone();
        }
        let flags = self.analysis.mode(mode);
        let focus = self.focus_formals(flags | XslFlags::CURRENT);
        let function = self.new_function(
            internal_name(&format!("apply-imports-{}{}", level, mode_suffix(mode))),
            focus.parts(),
            XmlQueryType::NODE_SET,
            flags.contains(XslFlags::SIDE_EFFECTS),
        );
        let importer = Dispatcher {
            function,
            focus,
            params: Vec::new(),
        };
        self.importers.insert(key, importer.clone());
        let levels = self.program.imported_levels(level);
        let rules = self.mode_rules(&levels, mode);
        let body = self.in_context(Context::new(focus), |this| {
            this.dispatch_body(&rules, &importer, mode)
        });
        self.g.set_function_body(function, body);
        importer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_type() {
        assert_eq!(flags_type(XslFlags::STRING), XmlQueryType::STRING);
        assert_eq!(flags_type(XslFlags::NODESET | XslFlags::CURRENT), XmlQueryType::NODE_SET);
        assert_eq!(flags_type(XslFlags::RTF), XmlQueryType::DOCUMENT);
        assert_eq!(
            flags_type(XslFlags::STRING | XslFlags::NUMBER),
            XmlQueryType::ITEM_STAR
        );
        assert_eq!(flags_type(XslFlags::empty()), XmlQueryType::ITEM_STAR);
    }

    #[test]
    fn test_internal_name() {
        let name = internal_name("template-1");
        assert_eq!(name.namespace(), Some(QUILL_NAMESPACE));
        assert_eq!(name.to_string(), "quill:template-1");
    }
}
