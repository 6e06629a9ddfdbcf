use std::rc::Rc;

use quill_name::{NamespaceLookup, XML_NAMESPACE};

/// One namespace declaration in a [`NsList`].
#[derive(Debug)]
pub struct NsDecl {
    /// The empty string for the default namespace.
    pub prefix: String,
    /// The empty string undeclares the default namespace.
    pub uri: String,
    next: NsList,
}

/// The namespace declarations in scope at a point of the stylesheet,
/// innermost first.
///
/// Lists are immutable and share their tails, so an element that declares
/// nothing new shares its parent's list and siblings share everything their
/// parent declared.
#[derive(Debug, Clone, Default)]
pub struct NsList(Option<Rc<NsDecl>>);

impl NsList {
    pub fn new() -> Self {
        NsList(None)
    }

    /// A list with one more declaration in front of this one.
    pub fn push(&self, prefix: &str, uri: &str) -> NsList {
        NsList(Some(Rc::new(NsDecl {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            next: self.clone(),
        })))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn ptr_eq(&self, other: &NsList) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    pub fn iter(&self) -> NsIter<'_> {
        NsIter {
            current: self.0.as_deref(),
        }
    }

    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        self.iter()
            .find(|decl| decl.prefix == prefix)
            .map(|decl| decl.uri.as_str())
    }

    /// The default namespace for unprefixed element names; `None` when
    /// there is none.
    pub fn default_namespace(&self) -> Option<&str> {
        self.lookup("").filter(|uri| !uri.is_empty())
    }

    /// Every prefix with the namespace it is bound to, innermost binding
    /// only, innermost first. Undeclared default namespaces are omitted.
    pub fn in_scope(&self) -> Vec<(&str, &str)> {
        let mut result: Vec<(&str, &str)> = Vec::new();
        let mut seen = Vec::new();
        for decl in self.iter() {
            if seen.contains(&decl.prefix.as_str()) {
                continue;
            }
            seen.push(decl.prefix.as_str());
            if !decl.uri.is_empty() {
                result.push((decl.prefix.as_str(), decl.uri.as_str()));
            }
        }
        result
    }

    /// The innermost prefix bound to `uri`, if any.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.iter()
            .filter(|decl| decl.uri == uri)
            .map(|decl| decl.prefix.as_str())
            .find(|prefix| self.lookup(prefix) == Some(uri))
    }
}

pub struct NsIter<'a> {
    current: Option<&'a NsDecl>,
}

impl<'a> Iterator for NsIter<'a> {
    type Item = &'a NsDecl;

    fn next(&mut self) -> Option<&'a NsDecl> {
        let decl = self.current?;
        self.current = decl.next.0.as_deref();
        Some(decl)
    }
}

impl NamespaceLookup for NsList {
    fn by_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.lookup(prefix).filter(|uri| !uri.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing() {
        let outer = NsList::new().push("a", "urn:one").push("b", "urn:two");
        let inner = outer.push("a", "urn:three");
        assert_eq!(inner.lookup("a"), Some("urn:three"));
        assert_eq!(outer.lookup("a"), Some("urn:one"));
        assert_eq!(inner.in_scope(), vec![("a", "urn:three"), ("b", "urn:two")]);
        assert_eq!(inner.prefix_for("urn:one"), None);
        assert_eq!(outer.prefix_for("urn:one"), Some("a"));
    }

    #[test]
    fn test_sharing() {
        let parent = NsList::new().push("a", "urn:one");
        let first = parent.clone();
        let second = parent.clone();
        assert!(first.ptr_eq(&second));
        assert!(!parent.push("b", "urn:two").ptr_eq(&parent));
    }

    #[test]
    fn test_default_namespace() {
        let list = NsList::new().push("", "urn:default");
        assert_eq!(list.default_namespace(), Some("urn:default"));
        let undeclared = list.push("", "");
        assert_eq!(undeclared.default_namespace(), None);
        assert!(undeclared.in_scope().is_empty());
    }

    #[test]
    fn test_xml_prefix() {
        assert_eq!(NsList::new().by_prefix("xml"), Some(XML_NAMESPACE));
    }
}
