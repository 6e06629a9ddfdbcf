use std::collections::BTreeMap;

use quill_name::QName;

use crate::ast::{Ast, Location, NodeId, StylesheetId};
use crate::error::Diagnostics;
use crate::output::OutputSettings;
use crate::whitespace::{WhitespaceRule, WhitespaceRules};

/// One level of the import tree: a module together with everything it
/// includes.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    /// Directly imported levels, in declaration order.
    pub imports: Vec<StylesheetId>,
    /// Assigned once the level and its imports are loaded; imported levels
    /// always have a lower precedence than the levels importing them.
    pub import_precedence: i32,
    /// Template rules with a match pattern, by mode, in declaration order.
    pub modes: BTreeMap<Option<QName>, Vec<NodeId>>,
    /// Every template declared in the level.
    pub templates: Vec<NodeId>,
    pub attribute_sets: Vec<NodeId>,
    pub keys: Vec<NodeId>,
    /// Global parameters and variables in declaration order.
    pub globals: Vec<NodeId>,
    pub whitespace_rules: WhitespaceRules,
    pub(crate) next_order: i32,
}

impl Stylesheet {
    pub(crate) fn next_order(&mut self) -> i32 {
        self.next_order += 1;
        self.next_order
    }

    /// The template rules of a mode.
    pub fn mode(&self, mode: Option<&QName>) -> &[NodeId] {
        self.modes
            .get(&mode.cloned())
            .map(|templates| templates.as_slice())
            .unwrap_or(&[])
    }
}

/// A named or the default `xsl:decimal-format`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DecimalFormat {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub infinity: String,
    pub minus_sign: char,
    pub nan: String,
    pub percent: char,
    pub per_mille: char,
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        DecimalFormat {
            decimal_separator: '.',
            grouping_separator: ',',
            infinity: "Infinity".to_string(),
            minus_sign: '-',
            nan: "NaN".to_string(),
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
        }
    }
}

/// One `xsl:namespace-alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NamespaceAlias {
    /// The namespace used in the stylesheet; the empty string for no
    /// namespace.
    pub stylesheet_uri: String,
    pub result_prefix: String,
    pub result_uri: String,
    pub import_precedence: i32,
    pub location: Location,
}

/// A loaded stylesheet with its declarations resolved across the whole
/// import tree.
#[derive(Debug, Clone)]
pub struct Program {
    pub ast: Ast,
    pub stylesheets: Vec<Stylesheet>,
    /// The level of the principal module.
    pub principal: StylesheetId,
    /// The winning template for every name.
    pub named_templates: BTreeMap<QName, NodeId>,
    /// Attribute sets by name, lowest import precedence first, so later
    /// attributes override earlier ones when they are merged.
    pub attribute_sets: BTreeMap<QName, Vec<NodeId>>,
    /// Every `xsl:key` declaration of a name; their matches are unioned.
    pub keys: BTreeMap<QName, Vec<NodeId>>,
    /// Winning global parameters and variables in declaration order.
    pub globals: Vec<NodeId>,
    /// `None` is the default decimal format.
    pub decimal_formats: BTreeMap<Option<QName>, DecimalFormat>,
    /// Winning aliases, keyed by stylesheet namespace.
    pub namespace_aliases: BTreeMap<String, NamespaceAlias>,
    pub output: OutputSettings,
    pub whitespace_rules: Vec<WhitespaceRule>,
    pub diagnostics: Diagnostics,
}

impl Program {
    pub fn principal(&self) -> &Stylesheet {
        &self.stylesheets[self.principal]
    }

    pub fn stylesheet(&self, id: StylesheetId) -> &Stylesheet {
        &self.stylesheets[id]
    }

    /// Every level in the import tree below `id`, in decreasing import
    /// precedence.
    pub fn imported_levels(&self, id: StylesheetId) -> Vec<StylesheetId> {
        let mut result = Vec::new();
        let mut stack: Vec<StylesheetId> = self.stylesheets[id].imports.clone();
        while let Some(level) = stack.pop() {
            if result.contains(&level) {
                continue;
            }
            result.push(level);
            stack.extend(self.stylesheets[level].imports.iter().copied());
        }
        result.sort_by_key(|level| std::cmp::Reverse(self.stylesheets[*level].import_precedence));
        result
    }

    /// Every level, in decreasing import precedence.
    pub fn levels_by_precedence(&self) -> Vec<StylesheetId> {
        let mut levels: Vec<StylesheetId> = (0..self.stylesheets.len()).collect();
        levels.sort_by_key(|level| std::cmp::Reverse(self.stylesheets[*level].import_precedence));
        levels
    }

    /// Every mode used by a template rule.
    pub fn modes(&self) -> Vec<Option<QName>> {
        let mut modes: Vec<Option<QName>> = self
            .stylesheets
            .iter()
            .flat_map(|s| s.modes.keys().cloned())
            .collect();
        modes.sort();
        modes.dedup();
        modes
    }

    pub fn global(&self, name: &QName) -> Option<NodeId> {
        self.globals
            .iter()
            .copied()
            .find(|id| self.ast[*id].name.as_ref() == Some(name))
    }
}
