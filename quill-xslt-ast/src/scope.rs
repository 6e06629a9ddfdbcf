//! The compile-time scope table shared by the loader and the generator.
//!
//! Scopes are not objects: all records live in one vector and each record
//! remembers how many scopes were opened just before it was added. Opening
//! a scope that declares nothing costs a counter increment.

use quill_name::{QName, XML_NAMESPACE};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ScopeFlags: u8 {
        const FORWARDS_COMPATIBLE = 1 << 0;
        const BACKWARDS_COMPATIBLE = 1 << 1;
        const CAN_HAVE_APPLY_IMPORTS = 1 << 2;
    }
}

#[derive(Debug, Clone)]
enum Record<V> {
    NsDecl {
        prefix: String,
        uri: String,
    },
    /// An excluded namespace; `None` stands for `#all`.
    NsExcl {
        uri: Option<String>,
        extension: bool,
    },
    Variable {
        name: QName,
        value: V,
    },
    Flags(ScopeFlags),
}

#[derive(Debug, Clone)]
struct ScopeRecord<V> {
    scope_count: usize,
    record: Record<V>,
}

#[derive(Debug, Clone)]
pub struct CompilerScopeManager<V> {
    records: Vec<ScopeRecord<V>>,
    last_scopes: usize,
}

impl<V> Default for CompilerScopeManager<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CompilerScopeManager<V> {
    pub fn new() -> Self {
        CompilerScopeManager {
            records: Vec::new(),
            last_scopes: 0,
        }
    }

    pub fn enter_scope(&mut self) {
        self.last_scopes += 1;
    }

    /// Open a scope that declares the given `(prefix, uri)` pairs.
    pub fn enter_scope_with<'a>(
        &mut self,
        declarations: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        self.enter_scope();
        for (prefix, uri) in declarations {
            self.add_ns_declaration(prefix, uri);
        }
    }

    /// Close the innermost scope, dropping everything added in it.
    pub fn exit_scope(&mut self) {
        if self.last_scopes > 0 {
            self.last_scopes -= 1;
            return;
        }
        while let Some(top) = self.records.pop() {
            if top.scope_count > 0 {
                self.last_scopes = top.scope_count - 1;
                return;
            }
        }
        debug_assert!(false, "exit_scope without matching enter_scope");
    }

    fn add_record(&mut self, record: Record<V>) {
        self.records.push(ScopeRecord {
            scope_count: self.last_scopes,
            record,
        });
        self.last_scopes = 0;
    }

    pub fn add_ns_declaration(&mut self, prefix: &str, uri: &str) {
        self.add_record(Record::NsDecl {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
    }

    /// Exclude a namespace from the output; `None` excludes every namespace
    /// declared so far.
    pub fn add_excluded_namespace(&mut self, uri: Option<&str>) {
        self.add_record(Record::NsExcl {
            uri: uri.map(|uri| uri.to_string()),
            extension: false,
        });
    }

    /// Mark a namespace as an extension namespace. Extension namespaces are
    /// excluded from the output too.
    pub fn add_extension_namespace(&mut self, uri: &str) {
        self.add_record(Record::NsExcl {
            uri: Some(uri.to_string()),
            extension: true,
        });
    }

    pub fn add_variable(&mut self, name: QName, value: V) {
        self.add_record(Record::Variable { name, value });
    }

    pub fn set_flags(&mut self, flags: ScopeFlags) {
        self.add_record(Record::Flags(flags));
    }

    pub fn flags(&self) -> ScopeFlags {
        self.records
            .iter()
            .rev()
            .find_map(|r| match r.record {
                Record::Flags(flags) => Some(flags),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn forwards_compatible(&self) -> bool {
        self.flags().contains(ScopeFlags::FORWARDS_COMPATIBLE)
    }

    pub fn lookup_variable(&self, name: &QName) -> Option<&V> {
        self.records.iter().rev().find_map(|r| match &r.record {
            Record::Variable { name: n, value } if n == name => Some(value),
            _ => None,
        })
    }

    pub fn lookup_variable_by(&self, local: &str, uri: &str) -> Option<&V> {
        self.records.iter().rev().find_map(|r| match &r.record {
            Record::Variable { name, value }
                if name.local_name() == local && name.namespace_str() == uri =>
            {
                Some(value)
            }
            _ => None,
        })
    }

    /// Every variable in scope with its innermost binding, innermost first.
    pub fn variables(&self) -> Vec<(&QName, &V)> {
        let mut result: Vec<(&QName, &V)> = Vec::new();
        for r in self.records.iter().rev() {
            if let Record::Variable { name, value } = &r.record {
                if !result.iter().any(|(n, _)| *n == name) {
                    result.push((name, value));
                }
            }
        }
        result
    }

    /// The namespace bound to `prefix`; `xml` is always bound.
    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        let found = self.records.iter().rev().find_map(|r| match &r.record {
            Record::NsDecl { prefix: p, uri } if p == prefix => Some(uri.as_str()),
            _ => None,
        });
        match found {
            Some(uri) => Some(uri),
            None if prefix == "xml" => Some(XML_NAMESPACE),
            None => None,
        }
    }

    /// Whether a namespace is excluded from the output at this point.
    ///
    /// An explicit exclusion applies to its URI wherever it is declared.
    /// `#all` applies to namespaces declared at or before the point of
    /// exclusion only; a declaration added after it is not excluded by it,
    /// and neither is one whose prefix was rebound before the `#all`.
    pub fn is_excluded_namespace(&self, uri: &str) -> bool {
        let mut exclude_all: Option<usize> = None;
        for (i, r) in self.records.iter().enumerate().rev() {
            match &r.record {
                Record::NsExcl { uri: None, .. } => exclude_all = Some(i),
                Record::NsExcl { uri: Some(u), .. } if u == uri => return true,
                Record::NsDecl { prefix, uri: u } if u == uri => {
                    if let Some(end) = exclude_all {
                        if !self.is_rebound(prefix, i + 1, end) {
                            return true;
                        }
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn is_rebound(&self, prefix: &str, start: usize, end: usize) -> bool {
        self.records[start..end]
            .iter()
            .any(|r| matches!(&r.record, Record::NsDecl { prefix: p, .. } if p == prefix))
    }

    pub fn is_extension_namespace(&self, uri: &str) -> bool {
        self.records.iter().rev().any(|r| {
            matches!(&r.record, Record::NsExcl { uri: Some(u), extension: true } if u == uri)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variables_pop_with_scope() {
        let mut scope = CompilerScopeManager::new();
        scope.enter_scope();
        scope.add_variable(QName::unprefixed("a"), 1);
        scope.enter_scope();
        scope.enter_scope();
        scope.add_variable(QName::unprefixed("a"), 2);
        scope.add_variable(QName::unprefixed("b"), 3);
        assert_eq!(scope.lookup_variable(&QName::unprefixed("a")), Some(&2));
        assert_eq!(scope.variables().len(), 2);
        scope.exit_scope();
        assert_eq!(scope.lookup_variable(&QName::unprefixed("a")), Some(&1));
        assert_eq!(scope.lookup_variable(&QName::unprefixed("b")), None);
        scope.exit_scope();
        assert_eq!(scope.lookup_variable(&QName::unprefixed("a")), Some(&1));
        scope.exit_scope();
        assert_eq!(scope.lookup_variable(&QName::unprefixed("a")), None);
    }

    #[test]
    fn test_empty_scopes() {
        let mut scope: CompilerScopeManager<()> = CompilerScopeManager::new();
        scope.enter_scope_with([("p", "urn:p")]);
        for _ in 0..3 {
            scope.enter_scope();
        }
        for _ in 0..3 {
            scope.exit_scope();
        }
        assert_eq!(scope.lookup_namespace("p"), Some("urn:p"));
        scope.exit_scope();
        assert_eq!(scope.lookup_namespace("p"), None);
    }

    #[test]
    fn test_namespaces() {
        let mut scope: CompilerScopeManager<()> = CompilerScopeManager::new();
        assert_eq!(scope.lookup_namespace("xml"), Some(XML_NAMESPACE));
        scope.enter_scope_with([("p", "urn:outer")]);
        scope.enter_scope_with([("p", "urn:inner")]);
        assert_eq!(scope.lookup_namespace("p"), Some("urn:inner"));
        scope.exit_scope();
        assert_eq!(scope.lookup_namespace("p"), Some("urn:outer"));
    }

    #[test]
    fn test_exclude_all_applies_to_earlier_declarations() {
        let mut scope: CompilerScopeManager<()> = CompilerScopeManager::new();
        scope.enter_scope_with([("a", "urn:a")]);
        scope.add_excluded_namespace(None);
        scope.enter_scope_with([("b", "urn:b")]);
        assert!(scope.is_excluded_namespace("urn:a"));
        assert!(!scope.is_excluded_namespace("urn:b"));
        scope.exit_scope();
        scope.exit_scope();
        assert!(!scope.is_excluded_namespace("urn:a"));
    }

    #[test]
    fn test_exclude_all_skips_rebound_prefix() {
        let mut scope: CompilerScopeManager<()> = CompilerScopeManager::new();
        scope.enter_scope_with([("p", "urn:a")]);
        scope.enter_scope_with([("p", "urn:b")]);
        scope.add_excluded_namespace(None);
        scope.enter_scope_with([("q", "urn:a")]);
        assert!(!scope.is_excluded_namespace("urn:a"));
        assert!(scope.is_excluded_namespace("urn:b"));
        scope.exit_scope();
        assert!(!scope.is_excluded_namespace("urn:a"));
    }

    #[test]
    fn test_exclude_all_keeps_uri_bound_to_another_prefix() {
        let mut scope: CompilerScopeManager<()> = CompilerScopeManager::new();
        scope.enter_scope_with([("p", "urn:a"), ("r", "urn:a")]);
        scope.enter_scope_with([("p", "urn:b")]);
        scope.add_excluded_namespace(None);
        // r still binds urn:a at the point of exclusion
        assert!(scope.is_excluded_namespace("urn:a"));
    }

    #[test]
    fn test_exclusion_is_by_uri() {
        let mut scope: CompilerScopeManager<()> = CompilerScopeManager::new();
        scope.enter_scope_with([("a", "urn:a")]);
        scope.add_excluded_namespace(Some("urn:a"));
        // rebinding the prefix to another namespace is not excluded
        scope.enter_scope_with([("a", "urn:other")]);
        assert!(!scope.is_excluded_namespace("urn:other"));
        assert!(scope.is_excluded_namespace("urn:a"));
    }

    #[test]
    fn test_extension_namespace() {
        let mut scope: CompilerScopeManager<()> = CompilerScopeManager::new();
        scope.enter_scope();
        scope.add_extension_namespace("urn:ext");
        assert!(scope.is_extension_namespace("urn:ext"));
        assert!(scope.is_excluded_namespace("urn:ext"));
        scope.exit_scope();
        assert!(!scope.is_extension_namespace("urn:ext"));
    }

    #[test]
    fn test_flags() {
        let mut scope: CompilerScopeManager<()> = CompilerScopeManager::new();
        assert!(!scope.forwards_compatible());
        scope.enter_scope();
        scope.set_flags(ScopeFlags::FORWARDS_COMPATIBLE);
        assert!(scope.forwards_compatible());
        scope.exit_scope();
        assert!(!scope.forwards_compatible());
    }
}
