// The XPath 1.0 core library plus the functions XSLT 1.0 adds to it.
use std::str::FromStr;

use quill_name::QName;
use quill_xslt_ast::XslFlags;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Function {
    Last,
    Position,
    Count,
    Id,
    LocalName,
    NamespaceUri,
    Name,
    String,
    Concat,
    StartsWith,
    Contains,
    SubstringBefore,
    SubstringAfter,
    Substring,
    StringLength,
    NormalizeSpace,
    Translate,
    Boolean,
    Not,
    True,
    False,
    Lang,
    Number,
    Sum,
    Floor,
    Ceiling,
    Round,
    Current,
    Key,
    Document,
    FormatNumber,
    UnparsedEntityUri,
    GenerateId,
    SystemProperty,
    ElementAvailable,
    FunctionAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Signature {
    pub(crate) min: usize,
    /// `None` for no upper bound.
    pub(crate) max: Option<usize>,
    /// Focus the function reads whatever its arguments.
    pub(crate) focus: XslFlags,
    /// Type of the result, as analysis flags.
    pub(crate) result: XslFlags,
}

const fn signature(min: usize, max: usize, focus: XslFlags, result: XslFlags) -> Signature {
    Signature {
        min,
        max: Some(max),
        focus,
        result,
    }
}

impl Function {
    /// Look a function up by name. Only unprefixed names are in the
    /// library; there are no extension functions.
    pub(crate) fn lookup(name: &QName) -> Option<Function> {
        if name.namespace().is_some() {
            return None;
        }
        Function::from_str(name.local_name()).ok()
    }

    pub(crate) fn signature(self) -> Signature {
        use Function::*;
        let none = XslFlags::empty();
        let string = XslFlags::STRING;
        let number = XslFlags::NUMBER;
        let boolean = XslFlags::BOOLEAN;
        let current = XslFlags::CURRENT;
        match self {
            Last => signature(0, 0, XslFlags::LAST, number),
            Position => signature(0, 0, XslFlags::POSITION, number),
            Count | Sum | Floor | Ceiling | Round => signature(1, 1, none, number),
            Id => signature(1, 1, current, XslFlags::NODESET),
            LocalName | NamespaceUri | Name | String | NormalizeSpace | GenerateId => {
                signature(0, 1, none, string)
            }
            Concat => Signature {
                min: 2,
                max: None,
                focus: none,
                result: string,
            },
            StartsWith | Contains => signature(2, 2, none, boolean),
            SubstringBefore | SubstringAfter => signature(2, 2, none, string),
            Substring => signature(2, 3, none, string),
            StringLength | Number => signature(0, 1, none, number),
            Translate => signature(3, 3, none, string),
            Boolean | Not => signature(1, 1, none, boolean),
            True | False => signature(0, 0, none, boolean),
            Lang => signature(1, 1, current, boolean),
            Current => signature(0, 0, current | XslFlags::XSLT_CURRENT, XslFlags::NODE),
            Key => signature(2, 2, current, XslFlags::NODESET),
            Document => signature(1, 2, none, XslFlags::NODESET),
            FormatNumber => signature(2, 3, none, string),
            UnparsedEntityUri => signature(1, 1, current, string),
            // the result is a number for xsl:version and a string otherwise
            SystemProperty => signature(1, 1, none, string | number),
            ElementAvailable | FunctionAvailable => signature(1, 1, none, boolean),
        }
    }

    /// Functions that take the context node when their only argument is
    /// omitted.
    pub(crate) fn defaults_to_context(self) -> bool {
        use Function::*;
        matches!(
            self,
            LocalName | NamespaceUri | Name | String | StringLength | NormalizeSpace | Number
                | GenerateId
        )
    }

    pub(crate) fn accepts(self, arity: usize) -> bool {
        let signature = self.signature();
        arity >= signature.min && signature.max.map_or(true, |max| arity <= max)
    }

    /// Focus read by a call with `arity` arguments.
    pub(crate) fn focus(self, arity: usize) -> XslFlags {
        let focus = self.signature().focus;
        if arity == 0 && self.defaults_to_context() {
            focus | XslFlags::CURRENT
        } else {
            focus
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_lookup() {
        assert_eq!(
            Function::lookup(&QName::unprefixed("namespace-uri")),
            Some(Function::NamespaceUri)
        );
        assert_eq!(
            Function::lookup(&QName::unprefixed("unparsed-entity-uri")),
            Some(Function::UnparsedEntityUri)
        );
        assert_eq!(Function::lookup(&QName::unprefixed("matches")), None);
        assert_eq!(
            Function::lookup(&QName::uri_qualified("urn:x", "concat")),
            None
        );
    }

    #[test]
    fn test_names_round_trip() {
        for function in Function::iter() {
            let name = QName::unprefixed(&function.to_string());
            assert_eq!(Function::lookup(&name), Some(function));
        }
    }

    #[test]
    fn test_arity() {
        assert!(Function::Concat.accepts(7));
        assert!(!Function::Concat.accepts(1));
        assert!(Function::Substring.accepts(3));
        assert!(!Function::Substring.accepts(4));
        assert!(!Function::True.accepts(1));
    }

    #[test]
    fn test_implicit_context() {
        assert_eq!(Function::StringLength.focus(0), XslFlags::CURRENT);
        assert_eq!(Function::StringLength.focus(1), XslFlags::empty());
        assert_eq!(Function::Position.focus(0), XslFlags::POSITION);
        assert!(Function::Current.focus(0).contains(XslFlags::XSLT_CURRENT));
    }
}
