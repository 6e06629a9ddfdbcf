use std::fmt;

use xot::Xot;

use crate::namespaces::{NamespaceLookup, XML_NAMESPACE};

/// A qualified name. The prefix is kept for diagnostics and for
/// re-emitting literal names, but it takes no part in equality or hashing.
#[derive(Debug, Clone, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QName {
    local: String,
    namespace: Option<String>,
    prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("undeclared namespace prefix: {0}")]
    UnknownPrefix(String),
    #[error("invalid qualified name: {0:?}")]
    Invalid(String),
}

// a custom hasher that ignores the prefix
impl std::hash::Hash for QName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        self.namespace.hash(state);
    }
}

// and partial eq that ignores the prefix
impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.namespace == other.namespace
    }
}

impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.namespace, &self.local).cmp(&(&other.namespace, &other.local))
    }
}

impl QName {
    pub fn new(local: String, namespace: Option<String>, prefix: Option<String>) -> Self {
        let namespace = namespace.filter(|ns| !ns.is_empty());
        let prefix = prefix.filter(|p| !p.is_empty());
        QName {
            local,
            namespace,
            prefix,
        }
    }

    pub fn unprefixed(local: &str) -> Self {
        QName {
            local: local.to_string(),
            namespace: None,
            prefix: None,
        }
    }

    pub fn uri_qualified(uri: &str, local: &str) -> Self {
        QName::new(local.to_string(), Some(uri.to_string()), None)
    }

    pub fn prefixed(prefix: &str, local: &str, namespaces: impl NamespaceLookup) -> Option<Self> {
        let namespace = namespaces.by_prefix(prefix)?;
        Some(QName {
            local: local.to_string(),
            namespace: Some(namespace.to_string()),
            prefix: Some(prefix.to_string()),
        })
    }

    /// Build a name from a xot name id. xot does not track prefixes on
    /// names, so the prefix is looked up on the given context node.
    pub fn from_xot(name: xot::NameId, context: xot::Node, xot: &Xot) -> Self {
        let namespace = xot.namespace_for_name(name);
        let local = xot.local_name_str(name).to_string();
        if namespace == xot.no_namespace() {
            return QName {
                local,
                namespace: None,
                prefix: None,
            };
        }
        let prefix = xot
            .prefix_for_namespace(context, namespace)
            .map(|prefix| xot.prefix_str(prefix).to_string());
        QName::new(local, Some(xot.namespace_str(namespace).to_string()), prefix)
    }

    /// Parse a lexical QName as it appears in an XSLT attribute such as
    /// `name` or `mode`. An unprefixed name is in no namespace; the default
    /// namespace does not apply.
    pub fn parse(text: &str, namespaces: impl NamespaceLookup) -> Result<Self, Error> {
        let text = text.trim();
        match text.split_once(':') {
            Some((prefix, local)) => {
                if !is_ncname(prefix) || !is_ncname(local) {
                    return Err(Error::Invalid(text.to_string()));
                }
                let namespace = if prefix == "xml" {
                    XML_NAMESPACE
                } else {
                    namespaces
                        .by_prefix(prefix)
                        .ok_or_else(|| Error::UnknownPrefix(prefix.to_string()))?
                };
                Ok(QName::new(
                    local.to_string(),
                    Some(namespace.to_string()),
                    Some(prefix.to_string()),
                ))
            }
            None => {
                if !is_ncname(text) {
                    return Err(Error::Invalid(text.to_string()));
                }
                Ok(QName::unprefixed(text))
            }
        }
    }

    #[inline]
    pub fn local_name(&self) -> &str {
        &self.local
    }

    #[inline]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The namespace, or the empty string when there is none.
    #[inline]
    pub fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    #[inline]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn with_prefix(&self, prefix: Option<&str>) -> QName {
        QName::new(
            self.local.clone(),
            self.namespace.clone(),
            prefix.map(|p| p.to_string()),
        )
    }

    pub fn to_full_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }

    /// The `{uri}local` form.
    pub fn expanded(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{{{}}}{}", namespace, self.local),
            None => self.local.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_full_name())
    }
}

impl From<&str> for QName {
    fn from(local: &str) -> Self {
        QName::unprefixed(local)
    }
}

fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c) || c.is_ascii_digit() || c.is_numeric() || c == '-' || c == '.'
        || c == '\u{B7}'
}

/// Whether the text is a valid non-colonized name.
pub fn is_ncname(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Namespaces;

    #[test]
    fn test_prefix_ignored_in_equality() {
        let a = QName::new("a".to_string(), Some("urn:x".to_string()), Some("p".to_string()));
        let b = QName::new("a".to_string(), Some("urn:x".to_string()), Some("q".to_string()));
        assert_eq!(a, b);
        assert_eq!(a.to_full_name(), "p:a");
        assert_eq!(b.expanded(), "{urn:x}a");
    }

    #[test]
    fn test_parse_prefixed() {
        let mut namespaces = Namespaces::default();
        namespaces.add("ex", "urn:example");
        let name = QName::parse("ex:mode", &namespaces).unwrap();
        assert_eq!(name.namespace(), Some("urn:example"));
        assert_eq!(name.local_name(), "mode");
    }

    #[test]
    fn test_parse_unknown_prefix() {
        let namespaces = Namespaces::default();
        assert_eq!(
            QName::parse("nope:mode", &namespaces),
            Err(Error::UnknownPrefix("nope".to_string()))
        );
    }

    #[test]
    fn test_parse_xml_prefix_is_predeclared() {
        let namespaces = Namespaces::empty();
        let name = QName::parse("xml:space", &namespaces).unwrap();
        assert_eq!(name.namespace(), Some(XML_NAMESPACE));
    }

    #[test]
    fn test_parse_invalid() {
        let namespaces = Namespaces::default();
        assert!(QName::parse("1abc", &namespaces).is_err());
        assert!(QName::parse("a:b:c", &namespaces).is_err());
        assert!(QName::parse("", &namespaces).is_err());
    }

    #[test]
    fn test_is_ncname() {
        assert!(is_ncname("foo-bar.baz_1"));
        assert!(!is_ncname("-foo"));
        assert!(!is_ncname("a:b"));
    }
}
