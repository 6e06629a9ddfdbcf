//! `xsl:strip-space` and `xsl:preserve-space`.

use quill_name::QName;

/// The element name test of a whitespace rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ElementTest {
    Exact(QName),
    /// `prefix:*`, holding the namespace.
    Namespace(String),
    /// `*`
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WhitespaceRule {
    pub test: ElementTest,
    pub preserve: bool,
}

impl WhitespaceRule {
    pub fn strip(test: ElementTest) -> Self {
        WhitespaceRule {
            test,
            preserve: false,
        }
    }

    pub fn preserve(test: ElementTest) -> Self {
        WhitespaceRule {
            test,
            preserve: true,
        }
    }

    fn bucket(&self) -> usize {
        match self.test {
            ElementTest::Exact(_) => 0,
            ElementTest::Namespace(_) => 1,
            ElementTest::Any => 2,
        }
    }

    pub fn matches(&self, name: &QName) -> bool {
        match &self.test {
            ElementTest::Exact(exact) => exact == name,
            ElementTest::Namespace(namespace) => name.namespace_str() == namespace,
            ElementTest::Any => true,
        }
    }
}

/// The whitespace rules of one stylesheet level, bucketed by how specific
/// their name test is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitespaceRules {
    buckets: [Vec<WhitespaceRule>; 3],
}

impl WhitespaceRules {
    pub fn add(&mut self, rule: WhitespaceRule) {
        self.buckets[rule.bucket()].push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| bucket.is_empty())
    }

    /// The rules of this level in lookup order: most specific bucket first,
    /// later declarations first within a bucket.
    pub fn ordered(&self) -> impl Iterator<Item = &WhitespaceRule> {
        self.buckets.iter().flat_map(|bucket| bucket.iter().rev())
    }
}

/// Merge the rules of several stylesheet levels, given highest import
/// precedence first. The first rule in the result that matches an element
/// decides for it.
pub fn merge<'a>(levels: impl IntoIterator<Item = &'a WhitespaceRules>) -> Vec<WhitespaceRule> {
    levels
        .into_iter()
        .flat_map(|level| level.ordered().cloned())
        .collect()
}

/// Whether whitespace-only text children of an element with this name are
/// stripped. Without a matching rule whitespace is preserved.
pub fn should_strip(rules: &[WhitespaceRule], name: &QName) -> bool {
    rules
        .iter()
        .find(|rule| rule.matches(name))
        .map(|rule| !rule.preserve)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(local: &str) -> ElementTest {
        ElementTest::Exact(QName::unprefixed(local))
    }

    #[test]
    fn test_specific_test_wins_within_level() {
        let mut level = WhitespaceRules::default();
        level.add(WhitespaceRule::preserve(exact("pre")));
        level.add(WhitespaceRule::strip(ElementTest::Any));
        let rules = merge([&level]);
        assert!(!should_strip(&rules, &QName::unprefixed("pre")));
        assert!(should_strip(&rules, &QName::unprefixed("p")));
    }

    #[test]
    fn test_later_declaration_wins_within_bucket() {
        let mut level = WhitespaceRules::default();
        level.add(WhitespaceRule::strip(exact("a")));
        level.add(WhitespaceRule::preserve(exact("a")));
        assert!(!should_strip(&merge([&level]), &QName::unprefixed("a")));
    }

    #[test]
    fn test_higher_precedence_wins_over_specificity() {
        let mut importing = WhitespaceRules::default();
        importing.add(WhitespaceRule::preserve(ElementTest::Any));
        let mut imported = WhitespaceRules::default();
        imported.add(WhitespaceRule::strip(exact("a")));
        let rules = merge([&importing, &imported]);
        assert!(!should_strip(&rules, &QName::unprefixed("a")));
    }

    #[test]
    fn test_namespace_test() {
        let mut level = WhitespaceRules::default();
        level.add(WhitespaceRule::strip(ElementTest::Namespace(
            "urn:a".to_string(),
        )));
        let rules = merge([&level]);
        assert!(should_strip(&rules, &QName::uri_qualified("urn:a", "x")));
        assert!(!should_strip(&rules, &QName::unprefixed("x")));
    }
}
