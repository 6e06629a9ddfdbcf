use std::fmt;

bitflags::bitflags! {
    /// The kinds of item a value may contain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct ItemKinds: u16 {
        const DOCUMENT = 1 << 0;
        const ELEMENT = 1 << 1;
        const ATTRIBUTE = 1 << 2;
        const TEXT = 1 << 3;
        const COMMENT = 1 << 4;
        const PI = 1 << 5;
        const NAMESPACE = 1 << 6;
        const STRING = 1 << 7;
        const DOUBLE = 1 << 8;
        const BOOLEAN = 1 << 9;
        const QNAME = 1 << 10;

        const NODE = Self::DOCUMENT.bits() | Self::ELEMENT.bits() | Self::ATTRIBUTE.bits()
            | Self::TEXT.bits() | Self::COMMENT.bits() | Self::PI.bits()
            | Self::NAMESPACE.bits();
        const ATOMIC = Self::STRING.bits() | Self::DOUBLE.bits() | Self::BOOLEAN.bits()
            | Self::QNAME.bits();
        /// Nodes a `child::` step can return.
        const CONTENT = Self::ELEMENT.bits() | Self::TEXT.bits() | Self::COMMENT.bits()
            | Self::PI.bits();
    }
}

bitflags::bitflags! {
    /// The set of sequence lengths a value may have: none, exactly one, or
    /// more than one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct Cardinality: u8 {
        const ZERO = 1 << 0;
        const ONE = 1 << 1;
        const MORE = 1 << 2;

        const ZERO_OR_ONE = Self::ZERO.bits() | Self::ONE.bits();
        const ONE_OR_MORE = Self::ONE.bits() | Self::MORE.bits();
        const ZERO_OR_MORE = Self::ZERO.bits() | Self::ONE.bits() | Self::MORE.bits();
    }
}

impl Cardinality {
    fn counts(self) -> impl Iterator<Item = u8> {
        [(Cardinality::ZERO, 0), (Cardinality::ONE, 1), (Cardinality::MORE, 2)]
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, count)| count)
    }

    fn from_count(count: u8) -> Cardinality {
        match count {
            0 => Cardinality::ZERO,
            1 => Cardinality::ONE,
            _ => Cardinality::MORE,
        }
    }

    /// The cardinality of two sequences concatenated.
    pub fn sum(self, other: Cardinality) -> Cardinality {
        let mut result = Cardinality::empty();
        for a in self.counts() {
            for b in other.counts() {
                result |= Cardinality::from_count(a + b);
            }
        }
        result
    }

    /// The cardinality of a loop producing `other` once for each of `self`.
    pub fn product(self, other: Cardinality) -> Cardinality {
        let mut result = Cardinality::empty();
        for a in self.counts() {
            for b in other.counts() {
                result |= Cardinality::from_count(a.saturating_mul(b).min(2));
            }
        }
        result
    }
}

/// A static type: the kinds of item a value can contain and how many.
///
/// [`XmlQueryType::NONE`] is the type of an expression that never produces
/// a value (it raises an error); it is a subtype of every type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct XmlQueryType {
    pub items: ItemKinds,
    pub cardinality: Cardinality,
}

impl XmlQueryType {
    pub const NONE: XmlQueryType = XmlQueryType::new(ItemKinds::empty(), Cardinality::empty());
    pub const EMPTY: XmlQueryType = XmlQueryType::new(ItemKinds::empty(), Cardinality::ZERO);
    pub const STRING: XmlQueryType = XmlQueryType::new(ItemKinds::STRING, Cardinality::ONE);
    pub const DOUBLE: XmlQueryType = XmlQueryType::new(ItemKinds::DOUBLE, Cardinality::ONE);
    pub const BOOLEAN: XmlQueryType = XmlQueryType::new(ItemKinds::BOOLEAN, Cardinality::ONE);
    pub const QNAME: XmlQueryType = XmlQueryType::new(ItemKinds::QNAME, Cardinality::ONE);
    pub const NODE: XmlQueryType = XmlQueryType::new(ItemKinds::NODE, Cardinality::ONE);
    pub const NODE_SET: XmlQueryType =
        XmlQueryType::new(ItemKinds::NODE, Cardinality::ZERO_OR_MORE);
    pub const DOCUMENT: XmlQueryType = XmlQueryType::new(ItemKinds::DOCUMENT, Cardinality::ONE);
    pub const ELEMENT: XmlQueryType = XmlQueryType::new(ItemKinds::ELEMENT, Cardinality::ONE);
    pub const ATTRIBUTE: XmlQueryType = XmlQueryType::new(ItemKinds::ATTRIBUTE, Cardinality::ONE);
    pub const TEXT: XmlQueryType = XmlQueryType::new(ItemKinds::TEXT, Cardinality::ONE);
    pub const COMMENT: XmlQueryType = XmlQueryType::new(ItemKinds::COMMENT, Cardinality::ONE);
    pub const PI: XmlQueryType = XmlQueryType::new(ItemKinds::PI, Cardinality::ONE);
    pub const NAMESPACE: XmlQueryType = XmlQueryType::new(ItemKinds::NAMESPACE, Cardinality::ONE);
    pub const ITEM_STAR: XmlQueryType = XmlQueryType::new(
        ItemKinds::NODE.union(ItemKinds::ATOMIC),
        Cardinality::ZERO_OR_MORE,
    );

    pub const fn new(items: ItemKinds, cardinality: Cardinality) -> Self {
        Self { items, cardinality }
    }

    pub fn union(self, other: XmlQueryType) -> XmlQueryType {
        XmlQueryType::new(self.items | other.items, self.cardinality | other.cardinality)
    }

    /// The type of the two values concatenated into one sequence.
    pub fn sequence(self, other: XmlQueryType) -> XmlQueryType {
        if self == XmlQueryType::NONE || other == XmlQueryType::NONE {
            return XmlQueryType::NONE;
        }
        XmlQueryType::new(
            self.items | other.items,
            self.cardinality.sum(other.cardinality),
        )
    }

    /// A single item of this type.
    pub fn item_type(self) -> XmlQueryType {
        XmlQueryType::new(self.items, Cardinality::ONE)
    }

    pub fn with_cardinality(self, cardinality: Cardinality) -> XmlQueryType {
        XmlQueryType::new(self.items, cardinality)
    }

    pub fn is_subtype_of(self, other: XmlQueryType) -> bool {
        other.items.contains(self.items) && other.cardinality.contains(self.cardinality)
    }

    pub fn is_empty(self) -> bool {
        self.items.is_empty() && self.cardinality == Cardinality::ZERO
    }

    /// Only nodes, in any number.
    pub fn is_node_set(self) -> bool {
        !self.items.is_empty() && ItemKinds::NODE.contains(self.items)
    }

    /// A single node.
    pub fn is_single_node(self) -> bool {
        self.is_node_set() && self.cardinality == Cardinality::ONE
    }

    pub fn is_atomic_of(self, kind: ItemKinds) -> bool {
        self.items == kind && self.cardinality == Cardinality::ONE
    }
}

impl fmt::Display for XmlQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == XmlQueryType::NONE {
            return f.write_str("none");
        }
        if self.is_empty() {
            return f.write_str("empty");
        }
        let names = [
            (ItemKinds::NODE, "node"),
            (ItemKinds::DOCUMENT, "document"),
            (ItemKinds::ELEMENT, "element"),
            (ItemKinds::ATTRIBUTE, "attribute"),
            (ItemKinds::TEXT, "text"),
            (ItemKinds::COMMENT, "comment"),
            (ItemKinds::PI, "pi"),
            (ItemKinds::NAMESPACE, "namespace"),
            (ItemKinds::STRING, "string"),
            (ItemKinds::DOUBLE, "double"),
            (ItemKinds::BOOLEAN, "boolean"),
            (ItemKinds::QNAME, "qname"),
        ];
        let mut remaining = self.items;
        let mut parts = Vec::new();
        for (kind, name) in names {
            if remaining.contains(kind) {
                parts.push(name);
                remaining.remove(kind);
            }
        }
        let occurrence = match self.cardinality {
            c if c == Cardinality::ONE => "",
            c if c == Cardinality::ZERO_OR_ONE => "?",
            c if c == Cardinality::ONE_OR_MORE || c == Cardinality::MORE => "+",
            _ => "*",
        };
        if parts.len() == 1 {
            write!(f, "{}{}", parts[0], occurrence)
        } else {
            write!(f, "({}){}", parts.join("|"), occurrence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_sum() {
        assert_eq!(Cardinality::ZERO.sum(Cardinality::ONE), Cardinality::ONE);
        assert_eq!(Cardinality::ONE.sum(Cardinality::ONE), Cardinality::MORE);
        assert_eq!(
            Cardinality::ZERO_OR_ONE.sum(Cardinality::ZERO_OR_ONE),
            Cardinality::ZERO_OR_MORE
        );
    }

    #[test]
    fn test_cardinality_product() {
        assert_eq!(
            Cardinality::ZERO_OR_MORE.product(Cardinality::ONE),
            Cardinality::ZERO_OR_MORE
        );
        assert_eq!(Cardinality::ONE.product(Cardinality::ZERO), Cardinality::ZERO);
        assert_eq!(Cardinality::MORE.product(Cardinality::ONE), Cardinality::MORE);
    }

    #[test]
    fn test_subtype() {
        assert!(XmlQueryType::ELEMENT.is_subtype_of(XmlQueryType::NODE_SET));
        assert!(XmlQueryType::NONE.is_subtype_of(XmlQueryType::STRING));
        assert!(XmlQueryType::EMPTY.is_subtype_of(XmlQueryType::NODE_SET));
        assert!(!XmlQueryType::NODE_SET.is_subtype_of(XmlQueryType::NODE));
        assert!(!XmlQueryType::STRING.is_subtype_of(XmlQueryType::NODE_SET));
    }

    #[test]
    fn test_sequence_of_none_is_none() {
        assert_eq!(
            XmlQueryType::STRING.sequence(XmlQueryType::NONE),
            XmlQueryType::NONE
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(XmlQueryType::NODE_SET.to_string(), "node*");
        assert_eq!(XmlQueryType::BOOLEAN.to_string(), "boolean");
        assert_eq!(
            XmlQueryType::ELEMENT
                .union(XmlQueryType::TEXT)
                .with_cardinality(Cardinality::ZERO_OR_ONE)
                .to_string(),
            "(element|text)?"
        );
    }
}
