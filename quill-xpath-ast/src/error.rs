use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ParserError {
    #[error("invalid character at offset {}", .span.start)]
    InvalidToken { span: Span },
    #[error("unexpected {found} at offset {}", .span.start)]
    Unexpected { span: Span, found: String },
    #[error("unexpected end of expression")]
    UnexpectedEnd { span: Span },
    #[error("undeclared namespace prefix {prefix:?}")]
    UnknownPrefix { span: Span, prefix: String },
    #[error("unknown axis {name:?}")]
    UnknownAxis { span: Span, name: String },
    #[error("expression is too deeply nested")]
    TooComplex { span: Span },
    #[error("{message}")]
    InvalidPattern { span: Span, message: String },
    #[error("empty expression")]
    Empty,
}

impl ParserError {
    pub fn span(&self) -> Span {
        match self {
            Self::InvalidToken { span }
            | Self::Unexpected { span, .. }
            | Self::UnexpectedEnd { span }
            | Self::UnknownPrefix { span, .. }
            | Self::UnknownAxis { span, .. }
            | Self::TooComplex { span }
            | Self::InvalidPattern { span, .. } => *span,
            Self::Empty => Span::default(),
        }
    }

    pub fn is_too_complex(&self) -> bool {
        matches!(self, Self::TooComplex { .. })
    }
}
