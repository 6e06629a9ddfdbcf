//! Compile XSLT 1.0 stylesheets to QIL.
//!
//! [`compile`] loads a stylesheet with everything it imports and includes,
//! infers what each template needs from its context, and lowers the whole
//! transformation to a [`QilExpression`]: one function per template,
//! attribute set and key, plus a root expression applying templates to the
//! document node. Templates are dispatched by compiling all match
//! patterns of a mode into one function.
//!
//! ```ignore
//! let settings = CompilerSettings::default();
//! let compiled = compile_text(&MemoryResolver::new(), &settings, stylesheet)?;
//! println!("{}", compiled.qil.graph.dump(compiled.qil.root));
//! ```

mod analyzer;
mod error;
mod functions;
mod generator;
mod graph;
mod instructions;
mod invoke;
mod matcher;
mod pattern;
mod priority;
mod xpath;

use std::collections::BTreeMap;
use std::mem;

use quill_name::QName;
use quill_qil::QilExpression;
use quill_xslt_ast::{
    load, load_text, split_complex, CompilerSettings, DecimalFormat, Diagnostics, DocumentResolver,
    ErrorCode, Location, OutputSettings, Program, WhitespaceRule,
};

pub use crate::error::{CompileError, Error};
pub use crate::priority::default_priority;

/// A compiled stylesheet: the QIL of the transformation and what its
/// evaluator and serializer need besides.
#[derive(Debug, Clone)]
pub struct CompiledStylesheet {
    pub qil: QilExpression,
    /// The merged `xsl:output` declarations.
    pub output: OutputSettings,
    pub whitespace_rules: Vec<WhitespaceRule>,
    /// `None` is the default decimal format.
    pub decimal_formats: BTreeMap<Option<QName>, DecimalFormat>,
    /// Whether QIL nodes carry source lines.
    pub debug: bool,
    /// Warnings found while compiling.
    pub diagnostics: Diagnostics,
}

/// Compile the stylesheet at `uri`.
pub fn compile(
    resolver: &dyn DocumentResolver,
    settings: &CompilerSettings,
    uri: &str,
) -> Result<CompiledStylesheet, CompileError> {
    compile_program(load(resolver, settings, uri), settings)
}

/// Compile a stylesheet given as text. Its imports and includes are
/// loaded through `resolver`, relative to [`CompilerSettings::base_uri`].
pub fn compile_text(
    resolver: &dyn DocumentResolver,
    settings: &CompilerSettings,
    text: &str,
) -> Result<CompiledStylesheet, CompileError> {
    compile_program(load_text(resolver, settings, text), settings)
}

/// Compile a loaded program.
pub fn compile_program(
    mut program: Program,
    settings: &CompilerSettings,
) -> Result<CompiledStylesheet, CompileError> {
    split_complex(&mut program, settings);
    let analysis = analyzer::analyze(&mut program, settings.max_expression_depth);
    let diagnostics = mem::take(&mut program.diagnostics);
    let generated = generator::generate(&program, &analysis, settings, diagnostics);
    let qil = generated.qil;
    let mut diagnostics = generated.diagnostics;

    // each instruction lowers to a few nested QIL nodes
    let limit = settings
        .max_content_depth
        .saturating_add(settings.max_expression_depth)
        .saturating_mul(4);
    let too_deep = std::iter::once(qil.root)
        .chain(qil.functions.iter().copied())
        .find_map(|root| qil.graph.check_depth(root, limit).err());
    if let Some(error) = too_deep {
        diagnostics.error(
            Location::default(),
            ErrorCode::QUILL0001,
            format!("the compiled stylesheet is too complex: {}", error),
        );
    }

    if settings.treat_warnings_as_errors {
        diagnostics.escalate_warnings();
    }
    diagnostics.sort();
    if diagnostics.has_errors() {
        return Err(Error::Failed(diagnostics));
    }
    if let Some(internal) = generated.internal {
        return Err(internal);
    }
    qil.validate().map_err(|error| Error::Internal {
        location: Location::default(),
        message: error.to_string(),
    })?;
    log::debug!("compiled {} functions", qil.functions.len());
    Ok(CompiledStylesheet {
        qil,
        output: program.output,
        whitespace_rules: program.whitespace_rules,
        decimal_formats: program.decimal_formats,
        debug: settings.include_debug_information,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use quill_xslt_ast::MemoryResolver;

    use super::*;

    pub(crate) fn stylesheet(body: &str) -> String {
        format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
            body
        )
    }

    pub(crate) fn compile_ok(body: &str) -> CompiledStylesheet {
        let settings = CompilerSettings::default();
        match compile_text(&MemoryResolver::new(), &settings, &stylesheet(body)) {
            Ok(compiled) => compiled,
            Err(Error::Failed(diagnostics)) => {
                panic!("compilation failed: {:?}", diagnostics.sorted())
            }
            Err(error) => panic!("compilation failed: {}", error),
        }
    }

    /// The dump of the function with the given local name.
    pub(crate) fn function_dump(compiled: &CompiledStylesheet, local: &str) -> String {
        let qil = &compiled.qil;
        let functions = qil.function_by_local_name(local);
        assert_eq!(functions.len(), 1, "no single function named {}", local);
        qil.graph.dump_function(functions[0])
    }

    #[test]
    fn test_compile_minimal() {
        let compiled = compile_ok(r#"<xsl:template match="/"><out/></xsl:template>"#);
        let dump = compiled.qil.graph.dump(compiled.qil.root);
        assert_eq!(dump, "(Invoke @quill:apply-templates (List (XmlContext)))");
        assert!(!compiled.debug);
    }

    #[test]
    fn test_errors_are_collected() {
        let settings = CompilerSettings::default();
        let text = stylesheet(
            r#"<xsl:template match="/"><xsl:value-of select="1 +"/><xsl:call-template name="missing"/></xsl:template>"#,
        );
        let Err(Error::Failed(diagnostics)) =
            compile_text(&MemoryResolver::new(), &settings, &text)
        else {
            panic!("expected errors");
        };
        assert_eq!(diagnostics.error_count(), 2);
        assert_eq!(diagnostics.with_code(ErrorCode::XPST0003).count(), 1);
        assert_eq!(diagnostics.with_code(ErrorCode::XTSE0650).count(), 1);
    }
}
