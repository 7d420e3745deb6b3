//! Delimited-text codec: tokenizing, quoting and Excel protection

mod encoder;
mod excel;
mod tokenizer;

pub use encoder::DsvEncoder;
pub use excel::ExcelProtector;
pub use tokenizer::{RowTokenizer, TokenizeError};

pub(crate) use encoder::write_quoted;

use crate::error::{DsvError, Result};

/// Delimiter, quote and escape characters of a delimited format
///
/// `escape == quote` selects the doubling convention (`""`); any other escape
/// character selects the prefix convention (`\"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dialect {
    /// Field separator
    pub delimiter: char,
    /// Quote character
    pub quote: char,
    /// Escape character for quotes inside quoted fields
    pub escape: char,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::csv()
    }
}

impl Dialect {
    /// Create a dialect, validating the character combination
    pub fn new(delimiter: char, quote: char, escape: char) -> Result<Self> {
        let dialect = Dialect {
            delimiter,
            quote,
            escape,
        };
        dialect.validate()?;
        Ok(dialect)
    }

    /// RFC 4180 comma-separated values
    pub fn csv() -> Self {
        Dialect {
            delimiter: ',',
            quote: '"',
            escape: '"',
        }
    }

    /// Tab-separated values
    pub fn tsv() -> Self {
        Dialect {
            delimiter: '\t',
            ..Dialect::csv()
        }
    }

    /// Build a dialect from configuration strings
    ///
    /// Each value must be exactly one character.
    ///
    /// # Examples
    ///
    /// ```
    /// use dsvstream::dsv::Dialect;
    ///
    /// let dialect = Dialect::from_strs("\t", "\"", "\\").unwrap();
    /// assert_eq!(dialect.delimiter, '\t');
    /// assert!(Dialect::from_strs("::", "\"", "\"").is_err());
    /// ```
    pub fn from_strs(delimiter: &str, quote: &str, escape: &str) -> Result<Self> {
        Dialect::new(
            single_char("delimiter", delimiter)?,
            single_char("quote", quote)?,
            single_char("escape", escape)?,
        )
    }

    /// Check the character combination
    pub fn validate(&self) -> Result<()> {
        if self.delimiter == self.quote {
            return Err(DsvError::ValidationError(format!(
                "delimiter and quote must differ (both {:?})",
                self.delimiter
            )));
        }
        if self.escape == self.delimiter {
            return Err(DsvError::ValidationError(format!(
                "escape and delimiter must differ (both {:?})",
                self.delimiter
            )));
        }
        for (name, ch) in [
            ("delimiter", self.delimiter),
            ("quote", self.quote),
            ("escape", self.escape),
        ] {
            if ch == '\n' || ch == '\r' || ch == '\0' {
                return Err(DsvError::ValidationError(format!(
                    "{} cannot be {:?}",
                    name, ch
                )));
            }
        }
        Ok(())
    }

    /// Whether quotes are escaped by doubling
    pub fn doubles_quotes(&self) -> bool {
        self.escape == self.quote
    }
}

fn single_char(name: &str, value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(DsvError::ValidationError(format!(
            "{} must be a single character, got {:?}",
            name, value
        ))),
    }
}
