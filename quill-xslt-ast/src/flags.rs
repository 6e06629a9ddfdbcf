bitflags::bitflags! {
    /// What the flow analysis learned about an AST node.
    ///
    /// Type bits say what kind of value a node may produce; more than one
    /// type bit means the type is not statically known. Focus bits say which
    /// parts of the focus the node reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct XslFlags: u32 {
        const STRING = 1 << 0;
        const NUMBER = 1 << 1;
        const BOOLEAN = 1 << 2;
        const NODE = 1 << 3;
        const NODESET = 1 << 4;
        const RTF = 1 << 5;
        const TYPE_FILTER = Self::STRING.bits() | Self::NUMBER.bits() | Self::BOOLEAN.bits()
            | Self::NODE.bits() | Self::NODESET.bits() | Self::RTF.bits();

        const CURRENT = 1 << 8;
        const POSITION = 1 << 9;
        const LAST = 1 << 10;
        const FOCUS_FILTER = Self::CURRENT.bits() | Self::POSITION.bits() | Self::LAST.bits();

        /// `current()` is used; unlike an axis step it still refers to the
        /// outer focus inside a predicate.
        const XSLT_CURRENT = 1 << 11;

        /// Calls a template or uses an attribute set.
        const HAS_CALLS = 1 << 12;
        /// A parameter that some caller does not pass, so its default value
        /// is evaluated.
        const MAY_BE_DEFAULT = 1 << 13;
        const SIDE_EFFECTS = 1 << 14;
        /// Visited marker used while propagating flags through a graph.
        const STOP = 1 << 15;
    }
}

impl XslFlags {
    pub fn type_bits(self) -> XslFlags {
        self & XslFlags::TYPE_FILTER
    }

    pub fn focus_bits(self) -> XslFlags {
        self & XslFlags::FOCUS_FILTER
    }

    /// Exactly one type bit is set.
    pub fn has_known_type(self) -> bool {
        self.type_bits().bits().count_ones() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_bits() {
        let flags = XslFlags::STRING | XslFlags::CURRENT;
        assert_eq!(flags.type_bits(), XslFlags::STRING);
        assert_eq!(flags.focus_bits(), XslFlags::CURRENT);
        assert!(flags.has_known_type());
        assert!(!(flags | XslFlags::NODESET).has_known_type());
        assert!(!XslFlags::empty().has_known_type());
    }
}
