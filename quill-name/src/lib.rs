mod name;
mod namespaces;

pub use name::{is_ncname, Error, QName};
pub use namespaces::{
    NamespaceLookup, Namespaces, QUILL_NAMESPACE, XMLNS_NAMESPACE, XML_NAMESPACE,
    XSLT_NAMESPACE,
};
