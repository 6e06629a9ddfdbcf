/// Settings that control one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompilerSettings {
    pub treat_warnings_as_errors: bool,
    /// Annotate generated nodes with source lines and mark the output as
    /// carrying debug information.
    pub include_debug_information: bool,
    /// Deepest nesting of instructions the loader accepts.
    pub max_content_depth: usize,
    /// Deepest nesting the XPath and pattern parsers accept.
    pub max_expression_depth: usize,
    /// Estimated cost above which a template or attribute set is split into
    /// helper templates; `None` turns splitting off.
    pub split_threshold: Option<usize>,
    /// Cost of one location step in an embedded expression.
    pub split_step_cost: usize,
    /// Base URI of the principal stylesheet when it is given as text.
    pub base_uri: Option<String>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        CompilerSettings {
            treat_warnings_as_errors: false,
            include_debug_information: false,
            max_content_depth: 1024,
            max_expression_depth: quill_xpath_ast::DEFAULT_MAX_DEPTH,
            split_threshold: Some(100),
            split_step_cost: 2,
            base_uri: None,
        }
    }
}
