use std::fmt;

use strum::EnumMessage;
use strum_macros::{Display, EnumMessage, EnumString};

use crate::ast::Location;

/// Stylesheet error code.
///
/// Codes follow the names used by the XSLT and XPath specifications; quill
/// adds a few of its own for conditions those specifications do not name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumMessage, EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ErrorCode {
    /// Input too complex.
    ///
    /// The stylesheet nests instructions or expressions deeper than the
    /// configured limit.
    QUILL0001,
    /// Circular key reference.
    ///
    /// The match or use expression of a key refers to the key itself,
    /// directly or through other keys.
    QUILL0002,
    /// Unsupported construct.
    ///
    /// The construct is recognized but not supported, such as a template
    /// with more than one mode.
    QUILL0003,
    /// Duplicate namespace prefix.
    ///
    /// Two namespace nodes with the same prefix and different URIs would be
    /// written on one literal result element.
    QUILL0004,
    /// Output setting redefined.
    ///
    /// Two `xsl:output` declarations with the same import precedence give
    /// different values for one attribute; the later one is used.
    QUILL0101,
    /// Namespace alias redefined.
    ///
    /// Two `xsl:namespace-alias` declarations with the same import
    /// precedence map one namespace differently; the later one is used.
    QUILL0102,

    /// Parse error.
    ///
    /// An XPath expression or pattern is not valid.
    XPST0003,
    /// Undeclared variable.
    ///
    /// A variable reference names no variable in scope.
    XPST0008,
    /// Unknown function.
    ///
    /// A function call names an unknown function or passes the wrong number
    /// of arguments.
    XPST0017,
    /// Unexpected element.
    ///
    /// An XSLT element is unknown or appears where it is not allowed, or a
    /// required attribute is missing.
    XTSE0010,
    /// Invalid attribute value.
    ///
    /// An attribute has a value that is not allowed.
    XTSE0020,
    /// Unexpected attribute.
    ///
    /// An XSLT element has an attribute it does not allow.
    XTSE0090,
    /// Text at top level.
    ///
    /// A top-level element of the stylesheet contains non-whitespace text.
    XTSE0120,
    /// Unnamespaced top-level element.
    ///
    /// A top-level element that is not an XSLT declaration has no
    /// namespace.
    XTSE0130,
    /// Missing xsl:version.
    ///
    /// A literal result element used as a stylesheet has no `xsl:version`
    /// attribute.
    XTSE0150,
    /// Stylesheet module cannot be loaded.
    ///
    /// An imported or included module cannot be retrieved or is not
    /// well-formed.
    XTSE0165,
    /// Circular import or include.
    ///
    /// A stylesheet module imports or includes itself, directly or
    /// indirectly.
    XTSE0180,
    /// Misplaced import.
    ///
    /// An `xsl:import` element follows another top-level element.
    XTSE0200,
    /// Non-empty element.
    ///
    /// An XSLT element that must be empty has content.
    XTSE0260,
    /// Undeclared prefix.
    ///
    /// A QName in an attribute value uses a prefix that is not declared.
    XTSE0280,
    /// Invalid pattern.
    ///
    /// A match, count or from attribute is not a valid pattern.
    XTSE0340,
    /// Template without match or name.
    ///
    /// An `xsl:template` has neither a `match` nor a `name` attribute, or
    /// has a `mode` or `priority` without `match`.
    XTSE0500,
    /// Duplicate parameter.
    ///
    /// Two parameters of one template have the same name.
    XTSE0580,
    /// Variable with select and content.
    ///
    /// A variable or parameter has both a `select` attribute and content.
    XTSE0620,
    /// Duplicate variable.
    ///
    /// Two global variables with the same name have the same import
    /// precedence, or a local variable shadows another local variable.
    XTSE0630,
    /// Unknown template.
    ///
    /// An `xsl:call-template` names no template.
    XTSE0650,
    /// Duplicate template.
    ///
    /// Two named templates with the same name have the same import
    /// precedence.
    XTSE0660,
    /// Duplicate with-param.
    ///
    /// Two `xsl:with-param` elements of one instruction have the same name.
    XTSE0670,
    /// Unknown attribute set.
    ///
    /// A `use-attribute-sets` attribute names no attribute set.
    XTSE0710,
    /// Circular attribute set.
    ///
    /// An attribute set uses itself, directly or indirectly.
    XTSE0720,
    /// Reserved attribute.
    ///
    /// A literal result element has an attribute in the XSLT namespace that
    /// XSLT does not define.
    XTSE0805,
    /// Conflicting decimal formats.
    ///
    /// Two decimal formats with the same name and import precedence differ.
    XTSE1290,
    /// Circular variable.
    ///
    /// The value of a global variable depends on the variable itself.
    XTDE0640,
    /// Unknown key.
    ///
    /// The first argument of `key()` names no `xsl:key` declaration.
    XTDE1260,
    /// Unknown extension instruction.
    ///
    /// An extension instruction with no fallback was evaluated.
    XTDE1450,
}

impl ErrorCode {
    pub fn code(&self) -> String {
        self.to_string()
    }

    pub fn message(&self) -> &str {
        self.documentation_pieces().0
    }

    pub fn note(&self) -> &str {
        self.documentation_pieces().1
    }

    fn documentation_pieces(&self) -> (&str, &str) {
        if let Some(documentation) = self.get_documentation() {
            let mut pieces = documentation.splitn(2, "\n\n");
            let first = pieces.next().unwrap_or("").trim();
            let second = pieces.next().unwrap_or("").trim();
            (first, second)
        } else {
            ("", "")
        }
    }
}

/// An error or warning about a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    /// Declaration order of the module the diagnostic refers to.
    pub module: usize,
    pub uri: String,
    pub line: u32,
    pub column: u32,
    pub code: ErrorCode,
    pub message: String,
    pub is_warning: bool,
}

impl Diagnostic {
    pub fn new(location: Location, code: ErrorCode, message: impl Into<String>) -> Self {
        Diagnostic {
            module: location.module,
            uri: String::new(),
            line: location.line,
            column: location.column,
            code,
            message: message.into(),
            is_warning: false,
        }
    }

    pub fn warning(location: Location, code: ErrorCode, message: impl Into<String>) -> Self {
        Diagnostic {
            is_warning: true,
            ..Diagnostic::new(location, code, message)
        }
    }

    pub fn location(&self) -> Location {
        Location {
            module: self.module,
            line: self.line,
            column: self.column,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_warning { "warning" } else { "error" };
        write!(
            f,
            "{}({},{}): {} {}: ",
            self.uri, self.line, self.column, kind, self.code
        )?;
        if self.message.is_empty() {
            f.write_str(self.code.message())
        } else {
            f.write_str(&self.message)
        }
    }
}

/// All diagnostics of one compilation, in the order they were found until
/// sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostics {
    modules: Vec<String>,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stylesheet module, returning its declaration order.
    pub fn add_module(&mut self, uri: &str) -> usize {
        self.modules.push(uri.to_string());
        self.modules.len() - 1
    }

    pub fn module_uri(&self, module: usize) -> &str {
        self.modules.get(module).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn push(&mut self, mut diagnostic: Diagnostic) {
        diagnostic.uri = self.module_uri(diagnostic.module).to_string();
        if diagnostic.is_warning {
            log::warn!("{}", diagnostic);
        } else {
            log::debug!("{}", diagnostic);
        }
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, location: Location, code: ErrorCode, message: impl Into<String>) {
        self.push(Diagnostic::new(location, code, message));
    }

    pub fn warning(&mut self, location: Location, code: ErrorCode, message: impl Into<String>) {
        self.push(Diagnostic::warning(location, code, message));
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| !d.is_warning)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| !d.is_warning).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn with_code(&self, code: ErrorCode) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.code == code)
    }

    /// Turn every warning into an error.
    pub fn escalate_warnings(&mut self) {
        for diagnostic in &mut self.items {
            diagnostic.is_warning = false;
        }
    }

    /// Order the diagnostics by module declaration order, line, column,
    /// warnings before errors, code and text.
    pub fn sort(&mut self) {
        self.items.sort_by_cached_key(|d| {
            (
                d.module,
                d.line,
                d.column,
                !d.is_warning,
                d.code.code(),
                d.message.clone(),
            )
        });
    }

    /// A sorted copy of the diagnostics.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut sorted = self.clone();
        sorted.sort();
        sorted.items
    }
}

/// Failure to find or read a stylesheet module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid URI reference {href:?}: {message}")]
    InvalidUri { href: String, message: String },
    #[error("no document at {uri}")]
    NotFound { uri: String },
    #[error("cannot read {uri}: {message}")]
    Io { uri: String, message: String },
    #[error("{uri} is not well-formed: {message}")]
    Parse { uri: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(module: usize, line: u32, column: u32) -> Location {
        Location {
            module,
            line,
            column,
        }
    }

    #[test]
    fn test_code_message() {
        assert_eq!(ErrorCode::XTSE0720.code(), "XTSE0720");
        assert_eq!(ErrorCode::XTSE0720.message(), "Circular attribute set.");
        assert!(ErrorCode::QUILL0001.note().starts_with("The stylesheet nests"));
    }

    #[test]
    fn test_sorted() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_module("main.xsl");
        diagnostics.add_module("other.xsl");
        diagnostics.error(at(1, 1, 1), ErrorCode::XTSE0010, "b");
        diagnostics.error(at(0, 5, 2), ErrorCode::XTSE0010, "a");
        diagnostics.warning(at(0, 5, 2), ErrorCode::QUILL0101, "w");
        diagnostics.error(at(0, 2, 9), ErrorCode::XTSE0090, "c");
        let order = diagnostics
            .sorted()
            .into_iter()
            .map(|d| d.message)
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["c", "w", "a", "b"]);
    }

    #[test]
    fn test_escalate_warnings() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_module("main.xsl");
        diagnostics.warning(at(0, 1, 1), ErrorCode::QUILL0101, "");
        assert!(!diagnostics.has_errors());
        diagnostics.escalate_warnings();
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_display() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_module("main.xsl");
        diagnostics.error(at(0, 3, 4), ErrorCode::XTSE0720, "");
        let d = diagnostics.iter().next().unwrap();
        insta::assert_snapshot!(d.to_string(), @"main.xsl(3,4): error XTSE0720: Circular attribute set.");
    }
}
