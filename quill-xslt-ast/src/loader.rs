//! Building the AST from stylesheet modules.
//!
//! Modules are loaded depth first. `xsl:include` adds a module to the
//! stylesheet level that includes it; `xsl:import` starts a new level.
//! Import precedence is handed out when a level is finished, so imported
//! levels always rank below the level importing them and later imports
//! rank above earlier ones.

use std::collections::BTreeMap;

use quill_name::{QName, XSLT_NAMESPACE};

use crate::ast::{
    Ast, Location, NodeId, StylesheetId, TemplateInfo, VarKind, XslDetail, XslNode, XslNodeType,
    XslVersion,
};
use crate::error::{Diagnostics, ErrorCode};
use crate::input::{DocumentResolver, InputElement, InputNode, XsltInput};
use crate::instructions::ContentKind;
use crate::names::XsltElement;
use crate::ns::NsList;
use crate::output::{OutputDeclaration, OutputProperty, OutputSettings};
use crate::scope::{CompilerScopeManager, ScopeFlags};
use crate::settings::CompilerSettings;
use crate::stylesheet::{DecimalFormat, NamespaceAlias, Program, Stylesheet};
use crate::whitespace::{self, ElementTest, WhitespaceRule};

/// Load the principal module at `uri` and everything it imports and
/// includes.
pub fn load(resolver: &dyn DocumentResolver, settings: &CompilerSettings, uri: &str) -> Program {
    let mut loader = Loader::new(resolver, settings);
    let text = resolver.load(uri);
    let principal = loader.load_principal(uri, text.map_err(|e| e.to_string()));
    loader.finish(principal)
}

/// Load a principal module given as text. Relative references in it are
/// resolved against [`CompilerSettings::base_uri`].
pub fn load_text(
    resolver: &dyn DocumentResolver,
    settings: &CompilerSettings,
    text: &str,
) -> Program {
    let mut loader = Loader::new(resolver, settings);
    let uri = settings.base_uri.clone().unwrap_or_default();
    let principal = loader.load_principal(&uri, Ok(text.to_string()));
    loader.finish(principal)
}

/// Which attributes of an element carry the standard `version`,
/// `exclude-result-prefixes` and `extension-element-prefixes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Standard {
    /// Unprefixed, on `xsl:stylesheet`.
    Unprefixed,
    /// In the XSLT namespace, on literal result elements.
    Xsl,
    None,
}

pub(crate) struct SavedScope {
    ns: NsList,
    version: XslVersion,
}

pub(crate) struct Loader<'a> {
    resolver: &'a dyn DocumentResolver,
    pub(crate) settings: &'a CompilerSettings,
    pub(crate) ast: Ast,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) stylesheets: Vec<Stylesheet>,
    pub(crate) level: StylesheetId,
    pub(crate) module: usize,
    module_uri: String,
    /// URIs of the modules being loaded, outermost first.
    loading: Vec<String>,
    next_precedence: i32,
    /// Local variables in scope, for shadowing checks.
    pub(crate) scope: CompilerScopeManager<NodeId>,
    pub(crate) ns: NsList,
    pub(crate) version: XslVersion,
    pub(crate) depth: usize,
    pub(crate) too_complex_reported: bool,
    /// Whether the content being loaded belongs to a literal result element.
    pub(crate) literal_parent: bool,
    outputs: Vec<(OutputDeclaration, StylesheetId)>,
    decimal_formats: Vec<(Option<QName>, DecimalFormat, StylesheetId, Location)>,
    namespace_aliases: Vec<(NamespaceAlias, StylesheetId)>,
}

impl<'a> Loader<'a> {
    fn new(resolver: &'a dyn DocumentResolver, settings: &'a CompilerSettings) -> Self {
        Loader {
            resolver,
            settings,
            ast: Ast::new(),
            diagnostics: Diagnostics::new(),
            stylesheets: Vec::new(),
            level: 0,
            module: 0,
            module_uri: String::new(),
            loading: Vec::new(),
            next_precedence: 0,
            scope: CompilerScopeManager::new(),
            ns: NsList::new(),
            version: XslVersion::V1,
            depth: 0,
            too_complex_reported: false,
            literal_parent: false,
            outputs: Vec::new(),
            decimal_formats: Vec::new(),
            namespace_aliases: Vec::new(),
        }
    }

    pub(crate) fn location(&self, element: &InputElement) -> Location {
        Location {
            module: self.module,
            line: element.line,
            column: element.column,
        }
    }

    pub(crate) fn error(
        &mut self,
        element: &InputElement,
        code: ErrorCode,
        message: impl Into<String>,
    ) {
        let location = self.location(element);
        self.diagnostics.error(location, code, message);
    }

    pub(crate) fn node(&self, kind: XslNodeType, element: &InputElement) -> XslNode {
        XslNode::new(kind, self.location(element), self.ns.clone(), self.version)
    }

    pub(crate) fn forwards_compatible(&self) -> bool {
        self.scope.forwards_compatible()
    }

    fn load_principal(&mut self, uri: &str, text: Result<String, String>) -> StylesheetId {
        let input = text.and_then(|text| XsltInput::parse(uri, &text).map_err(|e| e.to_string()));
        match input {
            Ok(input) => self.load_level(uri, &input),
            Err(message) => {
                let module = self.diagnostics.add_module(uri);
                self.diagnostics.error(
                    Location {
                        module,
                        line: 0,
                        column: 0,
                    },
                    ErrorCode::XTSE0165,
                    message,
                );
                self.stylesheets.push(Stylesheet::default());
                self.stylesheets.len() - 1
            }
        }
    }

    fn load_level(&mut self, uri: &str, input: &XsltInput) -> StylesheetId {
        let id = self.stylesheets.len();
        self.stylesheets.push(Stylesheet::default());
        let outer = std::mem::replace(&mut self.level, id);
        self.load_module(uri, input);
        self.finish_level(id);
        self.level = outer;
        id
    }

    fn finish_level(&mut self, id: StylesheetId) {
        let precedence = self.next_precedence;
        self.next_precedence += 1;
        let level = &mut self.stylesheets[id];
        level.import_precedence = precedence;
        for template in level.templates.clone() {
            if let XslDetail::Template(info) = &mut self.ast[template].detail {
                info.import_precedence = precedence;
            }
        }
        for set in self.stylesheets[id].attribute_sets.clone() {
            if let XslDetail::AttributeSet {
                import_precedence, ..
            } = &mut self.ast[set].detail
            {
                *import_precedence = precedence;
            }
        }
        log::trace!("stylesheet level {} has import precedence {}", id, precedence);
    }

    fn load_module(&mut self, uri: &str, input: &XsltInput) {
        let module = self.diagnostics.add_module(uri);
        log::debug!("loading module {} ({})", module, uri);
        let outer_module = std::mem::replace(&mut self.module, module);
        let outer_uri = std::mem::replace(&mut self.module_uri, uri.to_string());
        let outer_scope = std::mem::take(&mut self.scope);
        let outer_ns = std::mem::take(&mut self.ns);
        let outer_version = std::mem::replace(&mut self.version, XslVersion::V1);
        self.loading.push(uri.to_string());

        let root = &input.document_element;
        if root.is_xslt("stylesheet") || root.is_xslt("transform") {
            self.load_stylesheet_element(root);
        } else if root.in_xslt_namespace() {
            self.error(
                root,
                ErrorCode::XTSE0010,
                format!("expected xsl:stylesheet, found {}", root.name),
            );
        } else {
            self.load_simplified(root);
        }

        self.loading.pop();
        self.version = outer_version;
        self.ns = outer_ns;
        self.scope = outer_scope;
        self.module_uri = outer_uri;
        self.module = outer_module;
    }

    /// Open the scope of an element: its namespace declarations, version
    /// and namespace exclusions.
    pub(crate) fn enter_element(
        &mut self,
        element: &InputElement,
        standard: Standard,
    ) -> SavedScope {
        let saved = SavedScope {
            ns: self.ns.clone(),
            version: self.version,
        };
        self.scope.enter_scope_with(
            element
                .namespace_decls
                .iter()
                .map(|(prefix, uri)| (prefix.as_str(), uri.as_str())),
        );
        for (prefix, uri) in &element.namespace_decls {
            self.ns = self.ns.push(prefix, uri);
        }
        let attribute = |local: &str| match standard {
            Standard::Unprefixed => element.attribute(local),
            Standard::Xsl => element.xsl_attribute(local),
            Standard::None => None,
        };
        if let Some(value) = attribute("version") {
            match XslVersion::parse(value) {
                Some(version) => {
                    self.version = version;
                    let flags = if version == XslVersion::ForwardsCompatible {
                        ScopeFlags::FORWARDS_COMPATIBLE
                    } else {
                        ScopeFlags::empty()
                    };
                    self.scope.set_flags(flags);
                }
                None => self.error(
                    element,
                    ErrorCode::XTSE0020,
                    format!("invalid version {:?}", value),
                ),
            }
        }
        if let Some(value) = attribute("exclude-result-prefixes") {
            for prefix in value.split_whitespace() {
                if prefix == "#all" {
                    self.scope.add_excluded_namespace(None);
                    continue;
                }
                if let Some(uri) = self.prefix_namespace(element, prefix) {
                    self.scope.add_excluded_namespace(Some(&uri));
                }
            }
        }
        if let Some(value) = attribute("extension-element-prefixes") {
            for prefix in value.split_whitespace() {
                if let Some(uri) = self.prefix_namespace(element, prefix) {
                    self.scope.add_extension_namespace(&uri);
                }
            }
        }
        saved
    }

    pub(crate) fn exit_element(&mut self, saved: SavedScope) {
        self.scope.exit_scope();
        self.ns = saved.ns;
        self.version = saved.version;
    }

    /// The namespace of a prefix in an exclusion or alias list, where
    /// `#default` stands for the default namespace.
    fn prefix_namespace(&mut self, element: &InputElement, prefix: &str) -> Option<String> {
        let found = if prefix == "#default" {
            self.ns.default_namespace().map(|uri| uri.to_string())
        } else {
            self.scope.lookup_namespace(prefix).map(|uri| uri.to_string())
        };
        if found.is_none() {
            self.error(
                element,
                ErrorCode::XTSE0280,
                format!("namespace prefix {} is not declared", prefix),
            );
        }
        found
    }

    pub(crate) fn qname(&mut self, element: &InputElement, value: &str) -> Option<QName> {
        let parsed = QName::parse(value, &self.ns);
        match parsed {
            Ok(name) => Some(name),
            Err(quill_name::Error::UnknownPrefix(prefix)) => {
                self.error(
                    element,
                    ErrorCode::XTSE0280,
                    format!("namespace prefix {} is not declared", prefix),
                );
                None
            }
            Err(e) => {
                self.error(element, ErrorCode::XTSE0020, e.to_string());
                None
            }
        }
    }

    /// Report attributes the element does not allow and required ones it
    /// lacks. Returns `false` when a required attribute is missing.
    pub(crate) fn check_attributes(&mut self, element: &InputElement, kind: XsltElement) -> bool {
        let table = kind.attributes();
        let forwards_compatible = self.forwards_compatible();
        let version = if forwards_compatible {
            XslVersion::ForwardsCompatible
        } else {
            self.version
        };
        for attribute in &element.attributes {
            let allowed = match attribute.name.namespace() {
                None => table.iter().any(|(name, usage)| {
                    *name == attribute.name.local_name() && usage.is_allowed(version)
                }),
                Some(XSLT_NAMESPACE) => false,
                Some(_) => true,
            };
            if !allowed && !forwards_compatible {
                let location = Location {
                    module: self.module,
                    line: attribute.line,
                    column: attribute.column,
                };
                self.diagnostics.error(
                    location,
                    ErrorCode::XTSE0090,
                    format!("xsl:{} does not allow attribute {}", kind, attribute.name),
                );
            }
        }
        let mut complete = true;
        for (name, usage) in table {
            if usage.is_required(version) && element.attribute(name).is_none() {
                self.error(
                    element,
                    ErrorCode::XTSE0010,
                    format!("xsl:{} requires attribute {}", kind, name),
                );
                complete = false;
            }
        }
        complete
    }

    /// `yes` or `no`.
    pub(crate) fn yes_no(&mut self, element: &InputElement, name: &str, default: bool) -> bool {
        match element.attribute(name).map(str::trim) {
            None => default,
            Some("yes") => true,
            Some("no") => false,
            Some(value) => {
                self.error(
                    element,
                    ErrorCode::XTSE0020,
                    format!("{} must be yes or no, not {:?}", name, value),
                );
                default
            }
        }
    }

    fn load_stylesheet_element(&mut self, root: &InputElement) {
        let saved = self.enter_element(root, Standard::Unprefixed);
        self.check_attributes(root, XsltElement::Stylesheet);
        let mut seen_declaration = false;
        for child in &root.children {
            match child {
                InputNode::Text(text) => {
                    if !text.trim().is_empty() {
                        self.error(
                            root,
                            ErrorCode::XTSE0120,
                            "text is not allowed at the top level",
                        );
                    }
                }
                InputNode::Element(element) => {
                    self.load_declaration(element, &mut seen_declaration)
                }
            }
        }
        self.exit_element(saved);
    }

    /// A literal result element used as the whole stylesheet is the body of
    /// a template matching the root.
    fn load_simplified(&mut self, root: &InputElement) {
        if root.xsl_attribute("version").is_none() {
            self.error(
                root,
                ErrorCode::XTSE0150,
                format!(
                    "{} is used as a stylesheet but has no xsl:version attribute",
                    root.name
                ),
            );
            return;
        }
        let order = self.stylesheets[self.level].next_order();
        let info = TemplateInfo {
            mode: None,
            priority: None,
            import_precedence: 0,
            order,
            stylesheet: self.level,
        };
        let template = self
            .node(XslNodeType::Template, root)
            .with_arg(Some("/".to_string()))
            .with_detail(XslDetail::Template(info));
        let template = self.ast.add(template);
        let body = self.load_literal_element(root);
        self.ast.set_content(template, body.into_iter().collect());
        let level = &mut self.stylesheets[self.level];
        level.templates.push(template);
        level.modes.entry(None).or_default().push(template);
    }

    fn load_declaration(&mut self, element: &InputElement, seen_declaration: &mut bool) {
        if !element.in_xslt_namespace() {
            if element.name.namespace().is_none() {
                self.error(
                    element,
                    ErrorCode::XTSE0130,
                    format!("top-level element {} has no namespace", element.name),
                );
            }
            *seen_declaration = true;
            return;
        }
        let kind = match element.name.local_name().parse::<XsltElement>() {
            Ok(kind) if kind.is_declaration() => kind,
            _ => {
                if !self.forwards_compatible() {
                    self.error(
                        element,
                        ErrorCode::XTSE0010,
                        format!("{} is not allowed at the top level", element.name),
                    );
                }
                *seen_declaration = true;
                return;
            }
        };
        if kind == XsltElement::Import {
            if *seen_declaration {
                self.error(
                    element,
                    ErrorCode::XTSE0200,
                    "xsl:import must come before all other top-level elements",
                );
            }
        } else {
            *seen_declaration = true;
        }

        let saved = self.enter_element(element, Standard::None);
        if self.check_attributes(element, kind) {
            match kind {
                XsltElement::Import => self.load_import(element),
                XsltElement::Include => self.load_include(element),
                XsltElement::StripSpace => self.load_whitespace(element, false),
                XsltElement::PreserveSpace => self.load_whitespace(element, true),
                XsltElement::Output => self.load_output(element),
                XsltElement::Key => self.load_key(element),
                XsltElement::DecimalFormat => self.load_decimal_format(element),
                XsltElement::NamespaceAlias => self.load_namespace_alias(element),
                XsltElement::AttributeSet => self.load_attribute_set(element),
                XsltElement::Variable | XsltElement::Param => {
                    if let Some(id) = self.load_variable(element, kind, VarKind::Global) {
                        self.stylesheets[self.level].globals.push(id);
                    }
                }
                XsltElement::Template => self.load_template(element),
                _ => {}
            }
        }
        if kind.must_be_empty() && !element.children.is_empty() {
            self.error(
                element,
                ErrorCode::XTSE0260,
                format!("xsl:{} must be empty", kind),
            );
        }
        self.exit_element(saved);
    }

    /// Resolve and parse the module an `xsl:import` or `xsl:include` refers
    /// to.
    fn load_href(&mut self, element: &InputElement) -> Option<(String, XsltInput)> {
        let href = element.attribute("href")?;
        let resolver = self.resolver;
        let base = (!self.module_uri.is_empty()).then_some(self.module_uri.as_str());
        let resolved = resolver.resolve(base, href);
        let uri = match resolved {
            Ok(uri) => uri,
            Err(e) => {
                self.error(element, ErrorCode::XTSE0165, e.to_string());
                return None;
            }
        };
        if self.loading.contains(&uri) {
            self.error(
                element,
                ErrorCode::XTSE0180,
                format!("{} imports or includes itself", uri),
            );
            return None;
        }
        let input = resolver
            .load(&uri)
            .and_then(|text| XsltInput::parse(&uri, &text));
        match input {
            Ok(input) => Some((uri, input)),
            Err(e) => {
                self.error(element, ErrorCode::XTSE0165, e.to_string());
                None
            }
        }
    }

    fn load_import(&mut self, element: &InputElement) {
        if let Some((uri, input)) = self.load_href(element) {
            let imported = self.load_level(&uri, &input);
            self.stylesheets[self.level].imports.push(imported);
        }
    }

    fn load_include(&mut self, element: &InputElement) {
        if let Some((uri, input)) = self.load_href(element) {
            self.load_module(&uri, &input);
        }
    }

    fn load_whitespace(&mut self, element: &InputElement, preserve: bool) {
        let Some(elements) = element.attribute("elements") else {
            return;
        };
        for token in elements.split_whitespace() {
            let test = if token == "*" {
                ElementTest::Any
            } else if let Some(prefix) = token.strip_suffix(":*") {
                match self.prefix_namespace(element, prefix) {
                    Some(uri) => ElementTest::Namespace(uri),
                    None => continue,
                }
            } else {
                match self.qname(element, token) {
                    Some(name) => ElementTest::Exact(name),
                    None => continue,
                }
            };
            let rule = WhitespaceRule { test, preserve };
            self.stylesheets[self.level].whitespace_rules.add(rule);
        }
    }

    fn load_output(&mut self, element: &InputElement) {
        let mut declaration = OutputDeclaration {
            location: self.location(element),
            ..Default::default()
        };
        for attribute in &element.attributes {
            if attribute.name.namespace().is_some() {
                continue;
            }
            let local = attribute.name.local_name();
            if local == "cdata-section-elements" {
                for token in attribute.value.split_whitespace() {
                    let name = if token.contains(':') {
                        self.qname(element, token)
                    } else {
                        Some(QName::new(
                            token.to_string(),
                            self.ns.default_namespace().map(|uri| uri.to_string()),
                            None,
                        ))
                    };
                    declaration.cdata_section_elements.extend(name);
                }
                continue;
            }
            let Ok(property) = local.parse::<OutputProperty>() else {
                continue;
            };
            let value = attribute.value.trim();
            let value = if property.is_boolean() && value != "yes" && value != "no" {
                self.error(
                    element,
                    ErrorCode::XTSE0020,
                    format!("{} must be yes or no, not {:?}", local, value),
                );
                continue;
            } else if property == OutputProperty::Method
                && !matches!(value, "xml" | "html" | "text")
            {
                // other methods must be prefixed names
                if !value.contains(':') {
                    self.error(
                        element,
                        ErrorCode::XTSE0020,
                        format!("unknown output method {:?}", value),
                    );
                    continue;
                }
                match self.qname(element, value) {
                    Some(name) => name.expanded(),
                    None => continue,
                }
            } else {
                value.to_string()
            };
            declaration.properties.push((property, value));
        }
        self.outputs.push((declaration, self.level));
    }

    fn load_key(&mut self, element: &InputElement) {
        let Some(name) = element
            .attribute("name")
            .and_then(|value| self.qname(element, value))
        else {
            return;
        };
        let detail = XslDetail::Key {
            match_: element.attribute("match").unwrap_or_default().to_string(),
            use_: element.attribute("use").unwrap_or(".").to_string(),
        };
        let key = self
            .node(XslNodeType::Key, element)
            .with_name(name)
            .with_detail(detail);
        let key = self.ast.add(key);
        self.ast.set_content(key, Vec::new());
        self.stylesheets[self.level].keys.push(key);
    }

    fn load_decimal_format(&mut self, element: &InputElement) {
        let name = match element.attribute("name") {
            Some(value) => match self.qname(element, value) {
                Some(name) => Some(name),
                None => return,
            },
            None => None,
        };
        let mut format = DecimalFormat::default();
        for attribute in &element.attributes {
            if attribute.name.namespace().is_some() {
                continue;
            }
            let value = attribute.value.as_str();
            let slot = match attribute.name.local_name() {
                "infinity" => {
                    format.infinity = value.to_string();
                    continue;
                }
                "NaN" => {
                    format.nan = value.to_string();
                    continue;
                }
                "decimal-separator" => &mut format.decimal_separator,
                "grouping-separator" => &mut format.grouping_separator,
                "minus-sign" => &mut format.minus_sign,
                "percent" => &mut format.percent,
                "per-mille" => &mut format.per_mille,
                "zero-digit" => &mut format.zero_digit,
                "digit" => &mut format.digit,
                "pattern-separator" => &mut format.pattern_separator,
                _ => continue,
            };
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => *slot = c,
                _ => {
                    let message = format!(
                        "{} must be a single character, not {:?}",
                        attribute.name, value
                    );
                    self.error(element, ErrorCode::XTSE0020, message);
                }
            }
        }
        let location = self.location(element);
        self.decimal_formats
            .push((name, format, self.level, location));
    }

    fn load_namespace_alias(&mut self, element: &InputElement) {
        let (Some(stylesheet_prefix), Some(result_prefix)) = (
            element.attribute("stylesheet-prefix"),
            element.attribute("result-prefix"),
        ) else {
            return;
        };
        let Some(stylesheet_uri) = self.alias_namespace(element, stylesheet_prefix) else {
            return;
        };
        let Some(result_uri) = self.alias_namespace(element, result_prefix) else {
            return;
        };
        let result_prefix = match result_prefix.trim() {
            "#default" => String::new(),
            prefix => prefix.to_string(),
        };
        let alias = NamespaceAlias {
            stylesheet_uri,
            result_prefix,
            result_uri,
            import_precedence: 0,
            location: self.location(element),
        };
        self.namespace_aliases.push((alias, self.level));
    }

    fn alias_namespace(&mut self, element: &InputElement, prefix: &str) -> Option<String> {
        match prefix.trim() {
            // no default namespace aliases no namespace
            "#default" => Some(self.ns.default_namespace().unwrap_or("").to_string()),
            prefix => self.prefix_namespace(element, prefix),
        }
    }

    fn load_attribute_set(&mut self, element: &InputElement) {
        let Some(name) = element
            .attribute("name")
            .and_then(|value| self.qname(element, value))
        else {
            return;
        };
        let order = self.stylesheets[self.level].next_order();
        let set = self
            .node(XslNodeType::AttributeSet, element)
            .with_name(name)
            .with_detail(XslDetail::AttributeSet {
                import_precedence: 0,
                order,
            });
        let set = self.ast.add(set);
        let mut content = match element.attribute("use-attribute-sets") {
            Some(names) => self.use_attribute_sets(element, names),
            None => Vec::new(),
        };
        content.extend(self.load_content(element, ContentKind::AttributeSet));
        self.ast.set_content(set, content);
        self.stylesheets[self.level].attribute_sets.push(set);
    }

    fn load_template(&mut self, element: &InputElement) {
        let match_ = element.attribute("match").map(|s| s.to_string());
        let name = match element.attribute("name") {
            Some(value) => match self.qname(element, value) {
                Some(name) => Some(name),
                None => return,
            },
            None => None,
        };
        if match_.is_none() {
            if name.is_none() {
                self.error(
                    element,
                    ErrorCode::XTSE0500,
                    "xsl:template needs a match or a name attribute",
                );
                return;
            }
            if element.attribute("mode").is_some() || element.attribute("priority").is_some() {
                self.error(
                    element,
                    ErrorCode::XTSE0500,
                    "mode and priority are only allowed on templates with a match attribute",
                );
            }
        }
        let mode = match element.attribute("mode").map(str::trim) {
            Some(value) if value.split_whitespace().count() > 1 => {
                self.error(
                    element,
                    ErrorCode::QUILL0003,
                    "a template with more than one mode is not supported",
                );
                return;
            }
            Some("#default") | None => None,
            Some(value) => match self.qname(element, value) {
                Some(mode) => Some(mode),
                None => return,
            },
        };
        let priority = match element.attribute("priority") {
            Some(value) => match value.trim().parse::<f64>() {
                Ok(priority) if priority.is_finite() => Some(priority),
                _ => {
                    self.error(
                        element,
                        ErrorCode::XTSE0020,
                        format!("invalid priority {:?}", value),
                    );
                    None
                }
            },
            None => None,
        };
        let order = self.stylesheets[self.level].next_order();
        let info = TemplateInfo {
            mode: mode.clone(),
            priority,
            import_precedence: 0,
            order,
            stylesheet: self.level,
        };
        let mut template = self
            .node(XslNodeType::Template, element)
            .with_arg(match_.clone())
            .with_detail(XslDetail::Template(info));
        template.name = name;
        let template = self.ast.add(template);
        let content = self.load_content(element, ContentKind::Template);
        self.check_duplicate_names(&content, XslNodeType::Param, ErrorCode::XTSE0580);
        self.ast.set_content(template, content);

        let level = &mut self.stylesheets[self.level];
        level.templates.push(template);
        if match_.is_some() {
            level.modes.entry(mode).or_default().push(template);
        }
    }

    pub(crate) fn load_variable(
        &mut self,
        element: &InputElement,
        kind: XsltElement,
        var_kind: VarKind,
    ) -> Option<NodeId> {
        let name = element
            .attribute("name")
            .and_then(|value| self.qname(element, value))?;
        let node_type = match kind {
            XsltElement::Param => XslNodeType::Param,
            XsltElement::WithParam => XslNodeType::WithParam,
            _ => XslNodeType::Variable,
        };
        let select = element.attribute("select").map(|s| s.to_string());
        let has_select = select.is_some();
        let variable = self
            .node(node_type, element)
            .with_name(name)
            .with_arg(select)
            .with_detail(XslDetail::Variable(var_kind));
        let variable = self.ast.add(variable);
        let content = self.load_content(element, ContentKind::Plain);
        if has_select && !content.is_empty() {
            self.error(
                element,
                ErrorCode::XTSE0620,
                format!("xsl:{} has both a select attribute and content", kind),
            );
        }
        self.ast.set_content(variable, content);
        Some(variable)
    }

    pub(crate) fn use_attribute_sets(
        &mut self,
        element: &InputElement,
        names: &str,
    ) -> Vec<NodeId> {
        let mut result = Vec::new();
        for token in names.split_whitespace() {
            let Some(name) = self.qname(element, token) else {
                continue;
            };
            let node = self
                .node(XslNodeType::UseAttributeSet, element)
                .with_name(name);
            let node = self.ast.add(node);
            self.ast.set_content(node, Vec::new());
            result.push(node);
        }
        result
    }

    pub(crate) fn check_duplicate_names(
        &mut self,
        content: &[NodeId],
        kind: XslNodeType,
        code: ErrorCode,
    ) {
        let mut seen: Vec<&QName> = Vec::new();
        let mut duplicates = Vec::new();
        for id in content {
            let node = &self.ast[*id];
            if node.kind != kind {
                continue;
            }
            if let Some(name) = &node.name {
                if seen.contains(&name) {
                    duplicates.push((node.location, name.clone()));
                } else {
                    seen.push(name);
                }
            }
        }
        for (location, name) in duplicates {
            self.diagnostics
                .error(location, code, format!("{} is declared more than once", name));
        }
    }

    fn precedence(&self, level: StylesheetId) -> i32 {
        self.stylesheets[level].import_precedence
    }

    fn template_precedence(&self, id: NodeId) -> i32 {
        self.ast[id]
            .template()
            .map(|info| info.import_precedence)
            .unwrap_or_default()
    }

    /// Resolve the declarations of all levels against each other.
    fn finish(mut self, principal: StylesheetId) -> Program {
        let mut levels: Vec<StylesheetId> = (0..self.stylesheets.len()).collect();
        levels.sort_by_key(|level| std::cmp::Reverse(self.precedence(*level)));

        let named_templates = self.resolve_named_templates(&levels);
        let globals = self.resolve_globals(&levels);

        let mut attribute_sets: BTreeMap<QName, Vec<NodeId>> = BTreeMap::new();
        let mut keys: BTreeMap<QName, Vec<NodeId>> = BTreeMap::new();
        for level in &self.stylesheets {
            for set in &level.attribute_sets {
                if let Some(name) = &self.ast[*set].name {
                    attribute_sets.entry(name.clone()).or_default().push(*set);
                }
            }
            for key in &level.keys {
                if let Some(name) = &self.ast[*key].name {
                    keys.entry(name.clone()).or_default().push(*key);
                }
            }
        }
        for sets in attribute_sets.values_mut() {
            sets.sort_by_key(|set| match self.ast[*set].detail {
                XslDetail::AttributeSet {
                    import_precedence,
                    order,
                } => (import_precedence, order),
                _ => (0, 0),
            });
        }

        let decimal_formats = self.resolve_decimal_formats();
        let namespace_aliases = self.resolve_namespace_aliases();

        let mut output = OutputSettings::default();
        let outputs = std::mem::take(&mut self.outputs);
        for (declaration, level) in &outputs {
            output.merge(declaration, self.precedence(*level), &mut self.diagnostics);
        }

        let whitespace_rules = whitespace::merge(
            levels
                .iter()
                .map(|level| &self.stylesheets[*level].whitespace_rules),
        );

        log::debug!(
            "loaded {} modules in {} levels with {} nodes",
            self.diagnostics.modules().len(),
            self.stylesheets.len(),
            self.ast.len()
        );
        Program {
            ast: self.ast,
            stylesheets: self.stylesheets,
            principal,
            named_templates,
            attribute_sets,
            keys,
            globals,
            decimal_formats,
            namespace_aliases,
            output,
            whitespace_rules,
            diagnostics: self.diagnostics,
        }
    }

    fn resolve_named_templates(&mut self, levels: &[StylesheetId]) -> BTreeMap<QName, NodeId> {
        let mut named: BTreeMap<QName, NodeId> = BTreeMap::new();
        let mut conflicts = Vec::new();
        for level in levels {
            for template in &self.stylesheets[*level].templates {
                let Some(name) = self.ast[*template].name.clone() else {
                    continue;
                };
                match named.get(&name) {
                    None => {
                        named.insert(name, *template);
                    }
                    Some(existing)
                        if self.template_precedence(*existing)
                            == self.template_precedence(*template) =>
                    {
                        conflicts.push((*template, name));
                    }
                    Some(_) => {}
                }
            }
        }
        for (template, name) in conflicts {
            let location = self.ast[template].location;
            self.diagnostics.error(
                location,
                ErrorCode::XTSE0660,
                format!("template {} is declared more than once", name),
            );
        }
        named
    }

    fn resolve_globals(&mut self, levels: &[StylesheetId]) -> Vec<NodeId> {
        let mut winners: BTreeMap<QName, (NodeId, i32)> = BTreeMap::new();
        let mut conflicts = Vec::new();
        for level in levels {
            let precedence = self.precedence(*level);
            for global in &self.stylesheets[*level].globals {
                let Some(name) = self.ast[*global].name.clone() else {
                    continue;
                };
                match winners.get(&name) {
                    None => {
                        winners.insert(name, (*global, precedence));
                    }
                    Some((_, existing)) if *existing == precedence => {
                        conflicts.push((*global, name));
                    }
                    Some(_) => {}
                }
            }
        }
        for (global, name) in conflicts {
            let location = self.ast[global].location;
            self.diagnostics.error(
                location,
                ErrorCode::XTSE0630,
                format!("global variable {} is declared more than once", name),
            );
        }
        let mut globals: Vec<NodeId> = winners.into_values().map(|(id, _)| id).collect();
        globals.sort();
        globals
    }

    fn resolve_decimal_formats(&mut self) -> BTreeMap<Option<QName>, DecimalFormat> {
        let mut formats: BTreeMap<Option<QName>, (DecimalFormat, i32)> = BTreeMap::new();
        let declarations = std::mem::take(&mut self.decimal_formats);
        for (name, format, level, location) in declarations {
            let precedence = self.precedence(level);
            match formats.get(&name) {
                Some((_, existing_precedence)) if *existing_precedence > precedence => {}
                Some((existing, existing_precedence))
                    if *existing_precedence == precedence && *existing != format =>
                {
                    let label = name
                        .as_ref()
                        .map(|name| name.to_string())
                        .unwrap_or_else(|| "the default decimal format".to_string());
                    self.diagnostics.error(
                        location,
                        ErrorCode::XTSE1290,
                        format!("conflicting declarations of {}", label),
                    );
                }
                _ => {
                    formats.insert(name, (format, precedence));
                }
            }
        }
        let mut result: BTreeMap<Option<QName>, DecimalFormat> = formats
            .into_iter()
            .map(|(name, (format, _))| (name, format))
            .collect();
        result.entry(None).or_default();
        result
    }

    fn resolve_namespace_aliases(&mut self) -> BTreeMap<String, NamespaceAlias> {
        let mut aliases: BTreeMap<String, NamespaceAlias> = BTreeMap::new();
        let declarations = std::mem::take(&mut self.namespace_aliases);
        for (mut alias, level) in declarations {
            alias.import_precedence = self.precedence(level);
            match aliases.get(&alias.stylesheet_uri) {
                Some(existing) if existing.import_precedence > alias.import_precedence => continue,
                Some(existing)
                    if existing.import_precedence == alias.import_precedence
                        && existing.result_uri != alias.result_uri =>
                {
                    self.diagnostics.warning(
                        alias.location,
                        ErrorCode::QUILL0102,
                        format!(
                            "namespace {} is aliased more than once",
                            alias.stylesheet_uri
                        ),
                    );
                }
                _ => {}
            }
            aliases.insert(alias.stylesheet_uri.clone(), alias);
        }
        aliases
    }
}
