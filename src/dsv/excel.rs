//! Protection against spreadsheet auto-conversion
//!
//! Spreadsheet import silently rewrites gene symbols such as `SEPT1` or
//! `MARCH1` into dates, strips leading zeros, renders long identifiers in
//! scientific notation and evaluates cells that start like a formula. Quoting
//! those fields keeps them as text.

use super::{write_quoted, Dialect};
use crate::error::{DsvError, Result};
use chrono::Month;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static MONTH_GENE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let prefixes = month_prefixes().join("|");
    Regex::new(&format!(r"(?i)^(?:{})-?\d+$", prefixes)).unwrap()
});

static LEADING_ZERO_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0\d[0-9A-Za-z]*$").unwrap());

static LONG_NUMBER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{16,}$").unwrap());

static FORMULA_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[=+\-@]").unwrap());

/// Month names and abbreviations that prefix date-like gene symbols
fn month_prefixes() -> Vec<String> {
    let mut month = Month::January;
    let mut names = Vec::with_capacity(25);
    for _ in 0..12 {
        let full = month.name().to_ascii_uppercase();
        names.push(full[..3].to_string());
        names.push(full);
        month = month.succ();
    }
    names.push("SEPT".to_string());
    // Longest first so alternation prefers MARCH over MAR
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    names.dedup();
    names
}

/// Decides which fields must be quoted to survive spreadsheet import
///
/// # Examples
///
/// ```
/// use dsvstream::dsv::{Dialect, ExcelProtector};
///
/// let protector = ExcelProtector::new();
/// assert_eq!(protector.protect("SEPT1", &Dialect::csv()), "\"SEPT1\"");
/// assert_eq!(protector.protect("TP53", &Dialect::csv()), "TP53");
/// ```
#[derive(Debug, Clone)]
pub struct ExcelProtector {
    use_defaults: bool,
    custom: Vec<Regex>,
}

impl Default for ExcelProtector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExcelProtector {
    /// Protector with the built-in patterns
    pub fn new() -> Self {
        Self {
            use_defaults: true,
            custom: Vec::new(),
        }
    }

    /// Protector with no patterns; add your own with [`with_pattern`](Self::with_pattern)
    pub fn without_defaults() -> Self {
        Self {
            use_defaults: false,
            custom: Vec::new(),
        }
    }

    /// Add a custom pattern (builder pattern)
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            DsvError::ValidationError(format!("invalid Excel protection pattern: {}", e))
        })?;
        self.custom.push(regex);
        Ok(self)
    }

    /// Add a compiled pattern (builder pattern)
    pub fn with_regex(mut self, regex: Regex) -> Self {
        self.custom.push(regex);
        self
    }

    /// Whether `field` would be altered by spreadsheet import
    pub fn needs_protection(&self, field: &str) -> bool {
        if field.is_empty() {
            return false;
        }
        if self.use_defaults && matches_default(field) {
            return true;
        }
        self.custom.iter().any(|re| re.is_match(field))
    }

    /// Quote `field` if it needs protection, otherwise return it unchanged
    pub fn protect<'a>(&self, field: &'a str, dialect: &Dialect) -> Cow<'a, str> {
        if self.needs_protection(field) {
            let mut buffer = String::with_capacity(field.len() + 2);
            write_quoted(field, dialect, &mut buffer);
            Cow::Owned(buffer)
        } else {
            Cow::Borrowed(field)
        }
    }

    /// Apply [`protect`](Self::protect) to every field of a row
    pub fn protect_row<S: AsRef<str>>(&self, fields: &[S], dialect: &Dialect) -> Vec<String> {
        fields
            .iter()
            .map(|f| self.protect(f.as_ref(), dialect).into_owned())
            .collect()
    }
}

fn matches_default(field: &str) -> bool {
    MONTH_GENE_PATTERN.is_match(field)
        || LEADING_ZERO_PATTERN.is_match(field)
        || LONG_NUMBER_PATTERN.is_match(field)
        || FORMULA_PATTERN.is_match(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_gene_names() {
        let protector = ExcelProtector::new();
        for gene in ["SEPT1", "MARCH1", "DEC1", "Sept7", "MAR-3", "SEPTEMBER2"] {
            assert!(protector.needs_protection(gene), "{gene} should be protected");
        }
        for gene in ["TP53", "BRCA1", "SEPTIN7", "MARCHF1", "MAY"] {
            assert!(!protector.needs_protection(gene), "{gene} should pass");
        }
    }

    #[test]
    fn test_numeric_like_tokens() {
        let protector = ExcelProtector::new();
        assert!(protector.needs_protection("00123"));
        assert!(protector.needs_protection("0123AB"));
        assert!(protector.needs_protection("1234567890123456"));
        assert!(!protector.needs_protection("123456789012345"));
        assert!(!protector.needs_protection("0.5"));
        assert!(!protector.needs_protection("0"));
    }

    #[test]
    fn test_formula_prefixes() {
        let protector = ExcelProtector::new();
        for value in ["=SUM(A1)", "+1", "-5", "@cmd"] {
            assert!(protector.needs_protection(value));
        }
        assert!(!protector.needs_protection(""));
    }

    #[test]
    fn test_protect_field() {
        let protector = ExcelProtector::new();
        assert_eq!(protector.protect("SEPT1", &Dialect::csv()), "\"SEPT1\"");
        assert_eq!(protector.protect("TP53", &Dialect::csv()), "TP53");
    }

    #[test]
    fn test_protect_row() {
        let protector = ExcelProtector::new();
        let row = protector.protect_row(&["MARCH1", "5.2", "=1+1"], &Dialect::tsv());
        assert_eq!(row, vec!["\"MARCH1\"", "5.2", "\"=1+1\""]);
    }

    #[test]
    fn test_custom_patterns() -> Result<()> {
        let protector = ExcelProtector::without_defaults().with_pattern(r"^ENSG\d+$")?;
        assert!(protector.needs_protection("ENSG000001"));
        assert!(!protector.needs_protection("SEPT1"));
        assert!(ExcelProtector::new().with_pattern("(").is_err());
        Ok(())
    }
}
