//! XSLT element names and the attributes each element takes.

use strum_macros::{Display, EnumString, VariantNames};

use crate::ast::XslVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub enum XsltElement {
    ApplyImports,
    ApplyTemplates,
    Attribute,
    AttributeSet,
    CallTemplate,
    Choose,
    Comment,
    Copy,
    CopyOf,
    DecimalFormat,
    Element,
    Fallback,
    ForEach,
    If,
    Import,
    Include,
    Key,
    Message,
    NamespaceAlias,
    Number,
    Otherwise,
    Output,
    Param,
    PreserveSpace,
    ProcessingInstruction,
    Sort,
    StripSpace,
    Stylesheet,
    Template,
    Text,
    Transform,
    ValueOf,
    Variable,
    When,
    WithParam,
}

bitflags::bitflags! {
    /// Whether an attribute is required or optional, per XSLT version.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttrUsage: u8 {
        const V1_REQ = 1 << 0;
        const V1_OPT = 1 << 1;
        const V2_REQ = 1 << 2;
        const V2_OPT = 1 << 3;

        const REQ = Self::V1_REQ.bits() | Self::V2_REQ.bits();
        const OPT = Self::V1_OPT.bits() | Self::V2_OPT.bits();
    }
}

impl AttrUsage {
    pub fn is_allowed(self, version: XslVersion) -> bool {
        match version {
            XslVersion::V1 => self.intersects(AttrUsage::V1_REQ | AttrUsage::V1_OPT),
            XslVersion::V2 | XslVersion::ForwardsCompatible => {
                self.intersects(AttrUsage::V2_REQ | AttrUsage::V2_OPT)
            }
        }
    }

    pub fn is_required(self, version: XslVersion) -> bool {
        match version {
            XslVersion::V1 => self.contains(AttrUsage::V1_REQ),
            XslVersion::V2 | XslVersion::ForwardsCompatible => self.contains(AttrUsage::V2_REQ),
        }
    }
}

use AttrUsage as U;

const V2: AttrUsage = AttrUsage::V2_OPT;

static APPLY_TEMPLATES: &[(&str, AttrUsage)] = &[("select", U::OPT), ("mode", U::OPT)];
static ATTRIBUTE: &[(&str, AttrUsage)] = &[
    ("name", U::REQ),
    ("namespace", U::OPT),
    ("select", V2),
    ("separator", V2),
    ("type", V2),
    ("validation", V2),
];
static ATTRIBUTE_SET: &[(&str, AttrUsage)] = &[("name", U::REQ), ("use-attribute-sets", U::OPT)];
static CALL_TEMPLATE: &[(&str, AttrUsage)] = &[("name", U::REQ)];
static COMMENT: &[(&str, AttrUsage)] = &[("select", V2)];
static COPY: &[(&str, AttrUsage)] = &[
    ("use-attribute-sets", U::OPT),
    ("copy-namespaces", V2),
    ("inherit-namespaces", V2),
    ("type", V2),
    ("validation", V2),
];
static COPY_OF: &[(&str, AttrUsage)] = &[
    ("select", U::REQ),
    ("copy-namespaces", V2),
    ("type", V2),
    ("validation", V2),
];
static DECIMAL_FORMAT: &[(&str, AttrUsage)] = &[
    ("name", U::OPT),
    ("decimal-separator", U::OPT),
    ("grouping-separator", U::OPT),
    ("infinity", U::OPT),
    ("minus-sign", U::OPT),
    ("NaN", U::OPT),
    ("percent", U::OPT),
    ("per-mille", U::OPT),
    ("zero-digit", U::OPT),
    ("digit", U::OPT),
    ("pattern-separator", U::OPT),
];
static ELEMENT: &[(&str, AttrUsage)] = &[
    ("name", U::REQ),
    ("namespace", U::OPT),
    ("use-attribute-sets", U::OPT),
    ("inherit-namespaces", V2),
    ("type", V2),
    ("validation", V2),
];
static FOR_EACH: &[(&str, AttrUsage)] = &[("select", U::REQ)];
static HREF: &[(&str, AttrUsage)] = &[("href", U::REQ)];
static KEY: &[(&str, AttrUsage)] = &[
    ("name", U::REQ),
    ("match", U::REQ),
    ("use", AttrUsage::V1_REQ.union(AttrUsage::V2_OPT)),
    ("collation", V2),
];
static MESSAGE: &[(&str, AttrUsage)] = &[("terminate", U::OPT), ("select", V2)];
static NAMESPACE_ALIAS: &[(&str, AttrUsage)] =
    &[("stylesheet-prefix", U::REQ), ("result-prefix", U::REQ)];
static NUMBER: &[(&str, AttrUsage)] = &[
    ("level", U::OPT),
    ("count", U::OPT),
    ("from", U::OPT),
    ("value", U::OPT),
    ("format", U::OPT),
    ("lang", U::OPT),
    ("letter-value", U::OPT),
    ("grouping-separator", U::OPT),
    ("grouping-size", U::OPT),
    ("ordinal", V2),
    ("select", V2),
];
static OUTPUT: &[(&str, AttrUsage)] = &[
    ("method", U::OPT),
    ("version", U::OPT),
    ("encoding", U::OPT),
    ("omit-xml-declaration", U::OPT),
    ("standalone", U::OPT),
    ("doctype-public", U::OPT),
    ("doctype-system", U::OPT),
    ("cdata-section-elements", U::OPT),
    ("indent", U::OPT),
    ("media-type", U::OPT),
    ("byte-order-mark", V2),
    ("escape-uri-attributes", V2),
    ("include-content-type", V2),
    ("name", V2),
    ("normalization-form", V2),
    ("undeclare-prefixes", V2),
    ("use-character-maps", V2),
];
static PARAM: &[(&str, AttrUsage)] = &[
    ("name", U::REQ),
    ("select", U::OPT),
    ("as", V2),
    ("required", V2),
    ("tunnel", V2),
];
static ELEMENTS: &[(&str, AttrUsage)] = &[("elements", U::REQ)];
static PROCESSING_INSTRUCTION: &[(&str, AttrUsage)] = &[("name", U::REQ), ("select", V2)];
static SORT: &[(&str, AttrUsage)] = &[
    ("select", U::OPT),
    ("lang", U::OPT),
    ("data-type", U::OPT),
    ("order", U::OPT),
    ("case-order", U::OPT),
    ("collation", V2),
    ("stable", V2),
];
static STYLESHEET: &[(&str, AttrUsage)] = &[
    ("version", U::REQ),
    ("id", U::OPT),
    ("extension-element-prefixes", U::OPT),
    ("exclude-result-prefixes", U::OPT),
    ("default-validation", V2),
    ("default-collation", V2),
    ("xpath-default-namespace", V2),
    ("input-type-annotations", V2),
];
static TEMPLATE: &[(&str, AttrUsage)] = &[
    ("match", U::OPT),
    ("name", U::OPT),
    ("priority", U::OPT),
    ("mode", U::OPT),
    ("as", V2),
];
static TEXT: &[(&str, AttrUsage)] = &[("disable-output-escaping", U::OPT)];
static TEST: &[(&str, AttrUsage)] = &[("test", U::REQ)];
static VALUE_OF: &[(&str, AttrUsage)] = &[
    ("select", AttrUsage::V1_REQ.union(AttrUsage::V2_OPT)),
    ("disable-output-escaping", U::OPT),
    ("separator", V2),
];
static VARIABLE: &[(&str, AttrUsage)] = &[("name", U::REQ), ("select", U::OPT), ("as", V2)];
static WITH_PARAM: &[(&str, AttrUsage)] = &[
    ("name", U::REQ),
    ("select", U::OPT),
    ("as", V2),
    ("tunnel", V2),
];
static NONE: &[(&str, AttrUsage)] = &[];

impl XsltElement {
    pub fn attributes(self) -> &'static [(&'static str, AttrUsage)] {
        use XsltElement::*;
        match self {
            ApplyImports | Choose | Fallback | Otherwise => NONE,
            ApplyTemplates => APPLY_TEMPLATES,
            Attribute => ATTRIBUTE,
            AttributeSet => ATTRIBUTE_SET,
            CallTemplate => CALL_TEMPLATE,
            Comment => COMMENT,
            Copy => COPY,
            CopyOf => COPY_OF,
            DecimalFormat => DECIMAL_FORMAT,
            Element => ELEMENT,
            ForEach => FOR_EACH,
            If | When => TEST,
            Import | Include => HREF,
            Key => KEY,
            Message => MESSAGE,
            NamespaceAlias => NAMESPACE_ALIAS,
            Number => NUMBER,
            Output => OUTPUT,
            Param => PARAM,
            PreserveSpace | StripSpace => ELEMENTS,
            ProcessingInstruction => PROCESSING_INSTRUCTION,
            Sort => SORT,
            Stylesheet | Transform => STYLESHEET,
            Template => TEMPLATE,
            Text => TEXT,
            ValueOf => VALUE_OF,
            Variable => VARIABLE,
            WithParam => WITH_PARAM,
        }
    }

    /// Elements that appear as children of `xsl:stylesheet`.
    pub fn is_declaration(self) -> bool {
        use XsltElement::*;
        matches!(
            self,
            AttributeSet
                | DecimalFormat
                | Import
                | Include
                | Key
                | NamespaceAlias
                | Output
                | Param
                | PreserveSpace
                | StripSpace
                | Template
                | Variable
        )
    }

    /// Elements that must have no content.
    pub fn must_be_empty(self) -> bool {
        use XsltElement::*;
        matches!(
            self,
            ApplyImports
                | CopyOf
                | DecimalFormat
                | Import
                | Include
                | Key
                | NamespaceAlias
                | Number
                | Output
                | PreserveSpace
                | Sort
                | StripSpace
                | ValueOf
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(
            "processing-instruction".parse::<XsltElement>().unwrap(),
            XsltElement::ProcessingInstruction
        );
        assert_eq!(XsltElement::ValueOf.to_string(), "value-of");
        assert!("analyze-string".parse::<XsltElement>().is_err());
    }

    #[test]
    fn test_usage() {
        let (_, usage) = KEY[2];
        assert!(usage.is_required(XslVersion::V1));
        assert!(!usage.is_required(XslVersion::V2));
        let (_, collation) = KEY[3];
        assert!(!collation.is_allowed(XslVersion::V1));
        assert!(collation.is_allowed(XslVersion::V2));
    }
}
