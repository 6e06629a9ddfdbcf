// default priorities of XSLT 1.0 patterns, section 5.5 of the recommendation
use quill_xpath_ast::ast::{KindTest, NameTest, NodeTest};
use quill_xpath_ast::pattern::{PathPattern, Pattern, PatternRoot};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// The default priority of every alternative of a pattern. A union is
/// treated as one rule per alternative, each with its own priority.
pub fn default_priority(pattern: &Pattern) -> impl Iterator<Item = (&PathPattern, Decimal)> {
    pattern
        .alternatives
        .iter()
        .map(|alternative| (alternative, default_priority_path(alternative)))
}

pub(crate) fn default_priority_path(path: &PathPattern) -> Decimal {
    let default = dec!(0.5);
    match &path.root {
        PatternRoot::Root => {
            if path.steps.is_empty() {
                dec!(-0.5)
            } else {
                default
            }
        }
        PatternRoot::IdKey(_) => default,
        PatternRoot::Relative => {
            if path.steps.len() != 1 {
                return default;
            }
            let step = &path.steps[0];
            if !step.predicates.is_empty() {
                return default;
            }
            match &step.node_test {
                NodeTest::Name(name_test) => match name_test {
                    NameTest::Name(_) => dec!(0),
                    NameTest::Namespace(_) => dec!(-0.25),
                    NameTest::Any => dec!(-0.5),
                },
                NodeTest::Kind(kind_test) => default_priority_kind_test(kind_test),
            }
        }
    }
}

fn default_priority_kind_test(kind_test: &KindTest) -> Decimal {
    match kind_test {
        KindTest::ProcessingInstruction(Some(_)) => dec!(0),
        KindTest::ProcessingInstruction(None)
        | KindTest::Node
        | KindTest::Text
        | KindTest::Comment => dec!(-0.5),
    }
}

/// An explicit priority attribute as a decimal.
pub(crate) fn explicit_priority(priority: f64) -> Decimal {
    Decimal::try_from(priority).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_name::Namespaces;
    use quill_xpath_ast::DEFAULT_MAX_DEPTH;

    fn parse(pattern: &str) -> Pattern {
        let mut namespaces = Namespaces::default();
        namespaces.add("ns", "urn:ns");
        Pattern::parse(pattern, &namespaces, DEFAULT_MAX_DEPTH).unwrap()
    }

    fn one_default_priority(pattern: &str) -> Decimal {
        let pattern = parse(pattern);
        let v = default_priority(&pattern).collect::<Vec<_>>();
        assert_eq!(v.len(), 1);
        v[0].1
    }

    #[test]
    fn test_name() {
        assert_eq!(one_default_priority("foo"), dec!(0));
    }

    #[test]
    fn test_name_in_namespace() {
        assert_eq!(one_default_priority("ns:foo"), dec!(0));
    }

    #[test]
    fn test_attribute_name() {
        assert_eq!(one_default_priority("@foo"), dec!(0));
    }

    #[test]
    fn test_star() {
        assert_eq!(one_default_priority("*"), dec!(-0.5));
        assert_eq!(one_default_priority("@*"), dec!(-0.5));
    }

    #[test]
    fn test_namespace_star() {
        assert_eq!(one_default_priority("ns:*"), dec!(-0.25));
    }

    #[test]
    fn test_path() {
        assert_eq!(one_default_priority("foo/bar"), dec!(0.5));
        assert_eq!(one_default_priority("foo//bar"), dec!(0.5));
        assert_eq!(one_default_priority("/foo"), dec!(0.5));
    }

    #[test]
    fn test_predicate() {
        assert_eq!(one_default_priority("foo[1]"), dec!(0.5));
    }

    #[test]
    fn test_root() {
        assert_eq!(one_default_priority("/"), dec!(-0.5));
    }

    #[test]
    fn test_kind_tests() {
        assert_eq!(one_default_priority("node()"), dec!(-0.5));
        assert_eq!(one_default_priority("text()"), dec!(-0.5));
        assert_eq!(one_default_priority("comment()"), dec!(-0.5));
        assert_eq!(one_default_priority("processing-instruction()"), dec!(-0.5));
        assert_eq!(
            one_default_priority("processing-instruction('foo')"),
            dec!(0)
        );
    }

    #[test]
    fn test_id_key() {
        assert_eq!(one_default_priority("id('a')"), dec!(0.5));
        assert_eq!(one_default_priority("key('k', 'v')"), dec!(0.5));
    }

    #[test]
    fn test_union_is_multiple_rules() {
        let pattern = parse("foo | ns:* | a/b");
        let priorities = default_priority(&pattern)
            .map(|(_, priority)| priority)
            .collect::<Vec<_>>();
        assert_eq!(priorities, vec![dec!(0), dec!(-0.25), dec!(0.5)]);
    }

    #[test]
    fn test_explicit_priority() {
        assert_eq!(explicit_priority(1.5), dec!(1.5));
        assert_eq!(explicit_priority(-2.0), dec!(-2));
    }
}
