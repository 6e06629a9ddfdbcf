use quill_xslt_ast::{Diagnostics, Location};

/// Why a stylesheet could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The stylesheet has errors; every diagnostic found is included,
    /// warnings too.
    #[error("stylesheet has {} error(s)", .0.error_count())]
    Failed(Diagnostics),
    /// The compiler produced an inconsistent graph. `location` is the last
    /// stylesheet location the generator was working on.
    #[error("internal compiler error at line {}, column {}: {message}", .location.line, .location.column)]
    Internal { location: Location, message: String },
}

/// The error type of [`compile`](crate::compile).
pub type CompileError = Error;
