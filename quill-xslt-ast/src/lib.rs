//! Loading XSLT 1.0 stylesheets.
//!
//! [`load`] reads a principal stylesheet module and everything it imports
//! and includes into a [`Program`]: one arena of [`XslNode`]s plus the
//! declarations of every import level, resolved by import precedence.
//! Static errors do not stop loading; they are collected in
//! [`Program::diagnostics`] so a single pass reports all of them.

mod ast;
mod error;
mod flags;
mod input;
mod instructions;
mod loader;
mod names;
mod ns;
mod output;
mod scope;
mod settings;
mod split;
mod stylesheet;
mod whitespace;

pub use ast::{
    Ast, Location, NodeId, NumberInfo, NumberLevel, SortInfo, StylesheetId, TemplateInfo, VarKind,
    XslDetail, XslNode, XslNodeType, XslVersion,
};
pub use error::{Diagnostic, Diagnostics, ErrorCode, ResolveError};
pub use flags::XslFlags;
pub use input::{
    resolve_uri, DocumentResolver, FileResolver, InputAttribute, InputElement, InputNode,
    MemoryResolver, XsltInput,
};
pub use loader::{load, load_text};
pub use names::{AttrUsage, XsltElement};
pub use ns::{NsDecl, NsList};
pub use output::{OutputDeclaration, OutputProperty, OutputSettings};
pub use scope::{CompilerScopeManager, ScopeFlags};
pub use settings::CompilerSettings;
pub use split::{path_steps, split_complex};
pub use stylesheet::{DecimalFormat, NamespaceAlias, Program, Stylesheet};
pub use whitespace::{should_strip, ElementTest, WhitespaceRule, WhitespaceRules};
