//! Row tokenizing with RFC 4180-like behavior

use super::Dialect;
use thiserror::Error;

/// Tokenizer failure for a single logical row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    /// Row ended inside a quoted field
    #[error("unclosed quote in field {field}")]
    UnclosedQuote {
        /// 1-based position of the unterminated field
        field: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    UnquotedField,
    QuotedField,
    QuoteInQuoted,
}

/// Splits one logical row into fields
///
/// The row may contain embedded newlines when it was assembled from several
/// physical lines; they are kept verbatim inside quoted fields.
#[derive(Debug, Clone, Copy)]
pub struct RowTokenizer {
    delimiter: char,
    quote: char,
    escape: char,
}

impl RowTokenizer {
    /// Create a tokenizer with custom delimiter, quote and escape characters
    pub fn new(delimiter: char, quote: char, escape: char) -> Self {
        Self {
            delimiter,
            quote,
            escape,
        }
    }

    /// Create a tokenizer for a dialect
    pub fn from_dialect(dialect: &Dialect) -> Self {
        Self::new(dialect.delimiter, dialect.quote, dialect.escape)
    }

    /// Parse a row into fields
    ///
    /// # Examples
    ///
    /// ```
    /// use dsvstream::dsv::RowTokenizer;
    ///
    /// let tokenizer = RowTokenizer::new(',', '"', '"');
    /// let fields = tokenizer.tokenize(r#"gene,"expression, normalized",5.23"#).unwrap();
    /// assert_eq!(fields, vec!["gene", "expression, normalized", "5.23"]);
    /// ```
    pub fn tokenize(&self, row: &str) -> Result<Vec<String>, TokenizeError> {
        let doubling = self.escape == self.quote;
        let mut fields = Vec::new();
        let mut current_field = String::new();
        let mut state = State::FieldStart;
        let mut chars = row.chars().peekable();

        while let Some(ch) = chars.next() {
            match state {
                State::FieldStart => {
                    if ch == self.quote {
                        state = State::QuotedField;
                    } else if ch == self.delimiter {
                        fields.push(String::new());
                    } else {
                        current_field.push(ch);
                        state = State::UnquotedField;
                    }
                }
                State::UnquotedField => {
                    if ch == self.delimiter {
                        fields.push(std::mem::take(&mut current_field));
                        state = State::FieldStart;
                    } else {
                        current_field.push(ch);
                    }
                }
                State::QuotedField => {
                    if doubling && ch == self.quote {
                        // Escaped quote ("")
                        if chars.peek() == Some(&self.quote) {
                            current_field.push(self.quote);
                            chars.next();
                        } else {
                            state = State::QuoteInQuoted;
                        }
                    } else if !doubling && ch == self.escape {
                        match chars.peek() {
                            Some(&next) if next == self.quote || next == self.escape => {
                                current_field.push(next);
                                chars.next();
                            }
                            _ => current_field.push(ch),
                        }
                    } else if ch == self.quote {
                        state = State::QuoteInQuoted;
                    } else {
                        current_field.push(ch);
                    }
                }
                State::QuoteInQuoted => {
                    if ch == self.delimiter {
                        fields.push(std::mem::take(&mut current_field));
                        state = State::FieldStart;
                    } else if doubling && ch == self.quote {
                        current_field.push(self.quote);
                        state = State::QuotedField;
                    } else {
                        // Trailing content after a closing quote is kept
                        current_field.push(ch);
                        state = State::UnquotedField;
                    }
                }
            }
        }

        match state {
            State::QuotedField => Err(TokenizeError::UnclosedQuote {
                field: fields.len() + 1,
            }),
            State::UnquotedField | State::QuoteInQuoted => {
                fields.push(current_field);
                Ok(fields)
            }
            State::FieldStart => {
                // Empty row or row ending on a delimiter
                fields.push(String::new());
                Ok(fields)
            }
        }
    }

    /// Count quote characters that are not escaped
    ///
    /// Doubled quotes (or escape-prefixed quotes under the prefix convention)
    /// are skipped.
    pub fn count_unescaped_quotes(&self, text: &str) -> usize {
        let doubling = self.escape == self.quote;
        let mut count = 0;
        let mut chars = text.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch == self.quote {
                if doubling && chars.peek() == Some(&self.quote) {
                    chars.next();
                } else {
                    count += 1;
                }
            } else if !doubling && ch == self.escape {
                if matches!(chars.peek(), Some(&next) if next == self.quote || next == self.escape) {
                    chars.next();
                }
            }
        }

        count
    }

    /// Whether every opened quote in `text` is closed
    pub fn has_balanced_quotes(&self, text: &str) -> bool {
        self.count_unescaped_quotes(text) % 2 == 0
    }
}
