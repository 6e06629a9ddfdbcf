use ahash::{HashMap, HashMapExt};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
/// Namespace of names the compiler synthesizes itself (split templates,
/// helper functions). Never visible in output.
pub const QUILL_NAMESPACE: &str = "urn:quill:internal";

/// A simple owned prefix table.
#[derive(Debug, Clone)]
pub struct Namespaces {
    namespaces: HashMap<String, String>,
}

impl Namespaces {
    pub fn empty() -> Self {
        Self {
            namespaces: HashMap::new(),
        }
    }

    pub fn add(&mut self, prefix: &str, uri: &str) {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
    }

    pub fn by_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(|s| s.as_str())
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        let mut namespaces = Self::empty();
        namespaces.add("xml", XML_NAMESPACE);
        namespaces.add("xsl", XSLT_NAMESPACE);
        namespaces
    }
}

pub trait NamespaceLookup {
    fn by_prefix(&self, prefix: &str) -> Option<&str>;
}

impl NamespaceLookup for Namespaces {
    fn by_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(|s| s.as_str())
    }
}

impl<T: NamespaceLookup + ?Sized> NamespaceLookup for &T {
    fn by_prefix(&self, prefix: &str) -> Option<&str> {
        (**self).by_prefix(prefix)
    }
}
