//! Merging `xsl:output` declarations.

use std::collections::BTreeMap;

use quill_name::QName;
use strum_macros::{Display, EnumString};

use crate::ast::Location;
use crate::error::{Diagnostics, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[strum(serialize_all = "kebab-case")]
pub enum OutputProperty {
    Method,
    Version,
    Encoding,
    OmitXmlDeclaration,
    Standalone,
    DoctypePublic,
    DoctypeSystem,
    Indent,
    MediaType,
}

impl OutputProperty {
    /// Properties whose value is `yes` or `no`.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            OutputProperty::OmitXmlDeclaration | OutputProperty::Standalone | OutputProperty::Indent
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
struct Setting {
    value: String,
    precedence: i32,
}

/// One `xsl:output` element, already validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDeclaration {
    pub properties: Vec<(OutputProperty, String)>,
    pub cdata_section_elements: Vec<QName>,
    pub location: Location,
}

/// The serialization settings of the whole stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OutputSettings {
    settings: BTreeMap<OutputProperty, Setting>,
    cdata_section_elements: Vec<QName>,
}

impl OutputSettings {
    pub fn get(&self, property: OutputProperty) -> Option<&str> {
        self.settings.get(&property).map(|s| s.value.as_str())
    }

    pub fn method(&self) -> Option<&str> {
        self.get(OutputProperty::Method)
    }

    pub fn encoding(&self) -> Option<&str> {
        self.get(OutputProperty::Encoding)
    }

    pub fn indent(&self) -> bool {
        self.get(OutputProperty::Indent) == Some("yes")
    }

    pub fn cdata_section_elements(&self) -> &[QName] {
        &self.cdata_section_elements
    }

    /// Fold one declaration into the settings. A higher import precedence
    /// replaces a value; the same precedence with another value is
    /// reported and the later value is used.
    pub fn merge(
        &mut self,
        declaration: &OutputDeclaration,
        precedence: i32,
        diagnostics: &mut Diagnostics,
    ) {
        for (property, value) in &declaration.properties {
            match self.settings.get(property) {
                Some(existing) if existing.precedence > precedence => continue,
                Some(existing) if existing.precedence == precedence && existing.value != *value => {
                    diagnostics.warning(
                        declaration.location,
                        ErrorCode::QUILL0101,
                        format!(
                            "xsl:output {} is redefined from {:?} to {:?}",
                            property, existing.value, value
                        ),
                    );
                }
                _ => {}
            }
            self.settings.insert(
                *property,
                Setting {
                    value: value.clone(),
                    precedence,
                },
            );
        }
        for name in &declaration.cdata_section_elements {
            if !self.cdata_section_elements.contains(name) {
                self.cdata_section_elements.push(name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding(value: &str) -> OutputDeclaration {
        OutputDeclaration {
            properties: vec![(OutputProperty::Encoding, value.to_string())],
            ..Default::default()
        }
    }

    #[test]
    fn test_higher_precedence_wins_in_any_order() {
        let mut diagnostics = Diagnostics::new();
        let mut settings = OutputSettings::default();
        settings.merge(&encoding("utf-8"), 2, &mut diagnostics);
        settings.merge(&encoding("latin1"), 0, &mut diagnostics);
        settings.merge(&encoding("utf-16"), 1, &mut diagnostics);
        assert_eq!(settings.encoding(), Some("utf-8"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_equal_precedence_conflict_warns() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_module("main.xsl");
        let mut settings = OutputSettings::default();
        settings.merge(&encoding("utf-8"), 1, &mut diagnostics);
        settings.merge(&encoding("utf-16"), 1, &mut diagnostics);
        assert_eq!(settings.encoding(), Some("utf-16"));
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_equal_value_is_not_a_conflict() {
        let mut diagnostics = Diagnostics::new();
        let mut settings = OutputSettings::default();
        settings.merge(&encoding("utf-8"), 1, &mut diagnostics);
        settings.merge(&encoding("utf-8"), 1, &mut diagnostics);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_property_names() {
        assert_eq!(
            "omit-xml-declaration".parse::<OutputProperty>().unwrap(),
            OutputProperty::OmitXmlDeclaration
        );
        assert_eq!(OutputProperty::DoctypeSystem.to_string(), "doctype-system");
    }
}
