use crate::types::XmlQueryType;

/// Structural problems found in a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expression nesting depth {depth} exceeds the limit of {limit}")]
    TooDeep { depth: usize, limit: usize },
    #[error("{function} expects {expected} arguments but is invoked with {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("{context} has type {actual}, which does not fit the declared type {declared}")]
    TypeMismatch {
        context: String,
        actual: XmlQueryType,
        declared: XmlQueryType,
    },
    #[error("function {function} has no body")]
    MissingBody { function: String },
}
