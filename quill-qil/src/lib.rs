//! QIL, the query intermediate language.
//!
//! A transformation is a single expression graph: a root expression, global
//! bindings and a list of functions that may call each other. Nodes live in
//! an arena and refer to each other by handle, so sub-expressions can be
//! shared and loop bodies can refer back to the iterators that bind them.

mod arena;
mod display;
mod error;
mod factory;
mod graph;
mod node;
mod rewrite;
mod types;

pub use arena::{Arena, Handle};
pub use error::Error;
pub use graph::{QilExpression, QilGraph};
pub use node::{QilNode, QilNodeId, QilNodeType, QilValue, SourceLine};
pub use types::{Cardinality, ItemKinds, XmlQueryType};
