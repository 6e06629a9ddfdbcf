use crate::span::Span;

/// One piece of an attribute value template.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueTemplatePart {
    Text(String),
    /// The XPath text between the curly braces, and where it starts.
    Expr { text: String, span: Span },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Error {
    #[error("unescaped '}}' in attribute value template at offset {}", .span.start)]
    UnescapedCurly { span: Span },
    #[error("unterminated expression in attribute value template")]
    UnfinishedValue { span: Span },
    #[error("empty expression in attribute value template")]
    EmptyValue { span: Span },
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Error::UnescapedCurly { span }
            | Error::UnfinishedValue { span }
            | Error::EmptyValue { span } => *span,
        }
    }
}

struct ValueTemplateTokenizer<'a> {
    s: &'a str,
    char_indices: std::iter::Peekable<std::str::CharIndices<'a>>,
    mode: Mode,
    start: usize,
    done: bool,
}

enum Mode {
    String,
    Value,
    StartCurly,
    EndCurly,
}

#[derive(Debug, PartialEq, Eq)]
enum ValueTemplateItem<'a> {
    String { text: &'a str },
    Curly { c: char },
    Value { text: &'a str, span: Span },
}

impl<'a> ValueTemplateTokenizer<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            s,
            char_indices: s.char_indices().peekable(),
            mode: Mode::String,
            start: 0,
            done: false,
        }
    }

    fn string_item(
        &mut self,
        start: usize,
        end: usize,
    ) -> Option<Result<ValueTemplateItem<'a>, Error>> {
        let text = &self.s[start..end];
        if text.is_empty() {
            return self.next();
        }
        Some(Ok(ValueTemplateItem::String { text }))
    }

    fn value_item(&self, start: usize, end: usize) -> Result<ValueTemplateItem<'a>, Error> {
        let text = &self.s[start..end];
        let span = Span::new(start, end);
        if text.trim().is_empty() {
            return Err(Error::EmptyValue { span });
        }
        Ok(ValueTemplateItem::Value { text, span })
    }
}

impl<'a> Iterator for ValueTemplateTokenizer<'a> {
    type Item = Result<ValueTemplateItem<'a>, Error>;

    fn next(&mut self) -> Option<Result<ValueTemplateItem<'a>, Error>> {
        if self.done {
            return None;
        }
        let start = self.start;
        match self.mode {
            Mode::String => loop {
                if let Some((i, c)) = self.char_indices.next() {
                    match c {
                        '{' => {
                            self.mode = Mode::StartCurly;
                            self.start = i + 1;
                            return self.string_item(start, i);
                        }
                        '}' => {
                            self.mode = Mode::EndCurly;
                            self.start = i + 1;
                            return self.string_item(start, i);
                        }
                        _ => continue,
                    }
                } else {
                    self.done = true;
                    return self.string_item(start, self.s.len());
                }
            },
            Mode::Value => {
                // a '}' inside a string literal does not end the expression
                let mut quote = None;
                loop {
                    if let Some((i, c)) = self.char_indices.next() {
                        match (quote, c) {
                            (None, '"' | '\'') => quote = Some(c),
                            (Some(q), c) if q == c => quote = None,
                            (None, '}') => {
                                self.mode = Mode::String;
                                self.start = i + 1;
                                return Some(self.value_item(start, i));
                            }
                            _ => {}
                        }
                    } else {
                        self.done = true;
                        return Some(Err(Error::UnfinishedValue {
                            span: Span::new(start, self.s.len()),
                        }));
                    }
                }
            }
            Mode::StartCurly => {
                if let Some((i, '{')) = self.char_indices.peek().copied() {
                    self.char_indices.next();
                    self.mode = Mode::String;
                    self.start = i + 1;
                    return Some(Ok(ValueTemplateItem::Curly { c: '{' }));
                }
                self.mode = Mode::Value;
                self.next()
            }
            Mode::EndCurly => {
                if let Some((i, '}')) = self.char_indices.peek().copied() {
                    self.char_indices.next();
                    self.mode = Mode::String;
                    self.start = i + 1;
                    return Some(Ok(ValueTemplateItem::Curly { c: '}' }));
                }
                self.done = true;
                Some(Err(Error::UnescapedCurly {
                    span: Span::new(start - 1, start),
                }))
            }
        }
    }
}

/// Split an attribute value template into literal text and embedded
/// expressions. Adjacent text (including `{{` and `}}` escapes) is merged.
pub fn parse_value_template(s: &str) -> Result<Vec<ValueTemplatePart>, Error> {
    let mut parts: Vec<ValueTemplatePart> = Vec::new();
    for item in ValueTemplateTokenizer::new(s) {
        let text = match item? {
            ValueTemplateItem::String { text } => text.to_string(),
            ValueTemplateItem::Curly { c } => c.to_string(),
            ValueTemplateItem::Value { text, span } => {
                parts.push(ValueTemplatePart::Expr {
                    text: text.to_string(),
                    span,
                });
                continue;
            }
        };
        match parts.last_mut() {
            Some(ValueTemplatePart::Text(previous)) => previous.push_str(&text),
            _ => parts.push(ValueTemplatePart::Text(text)),
        }
    }
    Ok(parts)
}

/// Whether the value contains no expressions, in which case it is its
/// own (unescaped) value.
pub fn static_value(s: &str) -> Result<Option<String>, Error> {
    let parts = parse_value_template(s)?;
    match parts.as_slice() {
        [] => Ok(Some(String::new())),
        [ValueTemplatePart::Text(text)] => Ok(Some(text.clone())),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ValueTemplatePart {
        ValueTemplatePart::Text(s.to_string())
    }

    fn expr(s: &str, start: usize) -> ValueTemplatePart {
        ValueTemplatePart::Expr {
            text: s.to_string(),
            span: Span::new(start, start + s.len()),
        }
    }

    #[test]
    fn test_string_without_curly() {
        assert_eq!(
            parse_value_template("hello world").unwrap(),
            vec![text("hello world")]
        );
    }

    #[test]
    fn test_escaped_curlies_merge() {
        assert_eq!(
            parse_value_template("a{{b}}c").unwrap(),
            vec![text("a{b}c")]
        );
    }

    #[test]
    fn test_value() {
        assert_eq!(
            parse_value_template("x-{@id}-y").unwrap(),
            vec![text("x-"), expr("@id", 3), text("-y")]
        );
    }

    #[test]
    fn test_curly_in_string_literal() {
        assert_eq!(
            parse_value_template("{concat('}', .)}").unwrap(),
            vec![expr("concat('}', .)", 1)]
        );
    }

    #[test]
    fn test_unescaped_end_curly() {
        assert_eq!(
            parse_value_template("a}b"),
            Err(Error::UnescapedCurly {
                span: Span::new(1, 2)
            })
        );
    }

    #[test]
    fn test_unfinished_value() {
        assert!(matches!(
            parse_value_template("a{b"),
            Err(Error::UnfinishedValue { .. })
        ));
    }

    #[test]
    fn test_empty_value() {
        assert!(matches!(
            parse_value_template("{ }"),
            Err(Error::EmptyValue { .. })
        ));
    }

    #[test]
    fn test_static_value() {
        assert_eq!(static_value("a{{").unwrap(), Some("a{".to_string()));
        assert_eq!(static_value("{.}").unwrap(), None);
        assert_eq!(static_value("").unwrap(), Some(String::new()));
    }
}
