//! Field encoding with RFC 4180-like quoting

use super::{Dialect, ExcelProtector};

/// Encoder for writing properly quoted delimited rows
#[derive(Debug, Clone)]
pub struct DsvEncoder {
    dialect: Dialect,
    quote_all: bool,
    protector: Option<ExcelProtector>,
    comment_prefix: String,
}

impl DsvEncoder {
    /// Create a new encoder for a dialect
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            quote_all: false,
            protector: None,
            comment_prefix: String::new(),
        }
    }

    /// Quote every field, not only the ones that need it (builder pattern)
    pub fn quote_all(mut self, quote_all: bool) -> Self {
        self.quote_all = quote_all;
        self
    }

    /// Quote fields that spreadsheet import would corrupt (builder pattern)
    pub fn protect_from_excel(mut self, protector: Option<ExcelProtector>) -> Self {
        self.protector = protector;
        self
    }

    /// Quote a leading field that a reader would take for a comment line
    /// (builder pattern); an empty prefix turns this off
    pub fn comment_prefix(mut self, prefix: &str) -> Self {
        self.comment_prefix = prefix.to_string();
        self
    }

    /// Dialect used for encoding
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Encode entire row into buffer (no line ending)
    pub fn encode_row<S: AsRef<str>>(&self, fields: &[S], buffer: &mut String) {
        // A lone blank field would otherwise produce a blank line
        if let [only] = fields {
            if only.as_ref().trim().is_empty() {
                write_quoted(only.as_ref(), &self.dialect, buffer);
                return;
            }
        }

        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                buffer.push(self.dialect.delimiter);
            } else if self.starts_comment(field.as_ref()) {
                write_quoted(field.as_ref(), &self.dialect, buffer);
                continue;
            }
            self.encode_field(field.as_ref(), buffer);
        }
    }

    /// Encode single field with proper quoting/escaping
    pub fn encode_field(&self, field: &str, buffer: &mut String) {
        let protect = self
            .protector
            .as_ref()
            .is_some_and(|p| p.needs_protection(field));

        if protect || self.quote_all || self.needs_quoting(field) {
            write_quoted(field, &self.dialect, buffer);
        } else {
            buffer.push_str(field);
        }
    }

    fn starts_comment(&self, field: &str) -> bool {
        !self.comment_prefix.is_empty() && field.trim_start().starts_with(&self.comment_prefix)
    }

    /// Check if field requires quoting
    fn needs_quoting(&self, field: &str) -> bool {
        field.chars().any(|c| {
            c == self.dialect.delimiter || c == self.dialect.quote || c == '\n' || c == '\r'
        })
    }
}

/// Write `field` wrapped in quotes, escaping quotes per the dialect
pub(crate) fn write_quoted(field: &str, dialect: &Dialect, buffer: &mut String) {
    let doubling = dialect.doubles_quotes();
    buffer.push(dialect.quote);
    for ch in field.chars() {
        if ch == dialect.quote {
            // " -> "" (or \")
            buffer.push(dialect.escape);
            buffer.push(dialect.quote);
        } else if !doubling && ch == dialect.escape {
            buffer.push(dialect.escape);
            buffer.push(dialect.escape);
        } else {
            buffer.push(ch);
        }
    }
    buffer.push(dialect.quote);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsv::RowTokenizer;

    fn encode(encoder: &DsvEncoder, fields: &[&str]) -> String {
        let mut buffer = String::new();
        encoder.encode_row(fields, &mut buffer);
        buffer
    }

    #[test]
    fn test_simple_fields() {
        let encoder = DsvEncoder::new(Dialect::csv());
        assert_eq!(encode(&encoder, &["a", "b", "c"]), "a,b,c");
    }

    #[test]
    fn test_quoted_fields() {
        let encoder = DsvEncoder::new(Dialect::csv());
        assert_eq!(encode(&encoder, &["a,b", "c"]), r#""a,b",c"#);
    }

    #[test]
    fn test_escaped_quotes() {
        let encoder = DsvEncoder::new(Dialect::csv());
        assert_eq!(
            encode(&encoder, &[r#"Say "Hello""#, "world"]),
            r#""Say ""Hello""",world"#
        );
    }

    #[test]
    fn test_newlines_and_carriage_returns() {
        let encoder = DsvEncoder::new(Dialect::csv());
        assert_eq!(
            encode(&encoder, &["Line 1\nLine 2", "a\rb"]),
            "\"Line 1\nLine 2\",\"a\rb\""
        );
    }

    #[test]
    fn test_empty_fields() {
        let encoder = DsvEncoder::new(Dialect::csv());
        assert_eq!(encode(&encoder, &["a", "", "c"]), "a,,c");
        assert_eq!(encode(&encoder, &["", "", ""]), ",,");
        assert_eq!(encode(&encoder, &[""]), r#""""#);
    }

    #[test]
    fn test_blank_lone_field_is_quoted() {
        let encoder = DsvEncoder::new(Dialect::csv());
        assert_eq!(encode(&encoder, &[" "]), "\" \"");
        assert_eq!(encode(&encoder, &["\t"]), "\"\t\"");
        assert_eq!(encode(&encoder, &[" ", "a"]), " ,a");
    }

    #[test]
    fn test_comment_like_first_field_is_quoted() {
        let encoder = DsvEncoder::new(Dialect::csv()).comment_prefix("#");
        assert_eq!(encode(&encoder, &["#CHROM", "POS"]), r##""#CHROM",POS"##);
        assert_eq!(encode(&encoder, &[" #1", "x"]), r#"" #1",x"#);
        assert_eq!(encode(&encoder, &["chr1", "#2"]), "chr1,#2");

        let plain = DsvEncoder::new(Dialect::csv());
        assert_eq!(encode(&plain, &["#CHROM", "POS"]), "#CHROM,POS");
    }

    #[test]
    fn test_quote_all() {
        let encoder = DsvEncoder::new(Dialect::csv()).quote_all(true);
        assert_eq!(encode(&encoder, &["a", "1"]), r#""a","1""#);
    }

    #[test]
    fn test_excel_protection_quotes_once() {
        let encoder =
            DsvEncoder::new(Dialect::csv()).protect_from_excel(Some(ExcelProtector::new()));
        assert_eq!(encode(&encoder, &["SEPT1", "TP53"]), r#""SEPT1",TP53"#);
    }

    #[test]
    fn test_prefix_escape() {
        let dialect = Dialect::new(',', '"', '\\').unwrap();
        let encoder = DsvEncoder::new(dialect);
        assert_eq!(encode(&encoder, &[r#"a"b"#]), r#""a\"b""#);
        assert_eq!(encode(&encoder, &[r#"x\y,z"#]), r#""x\\y,z""#);
    }

    #[test]
    fn test_roundtrip_through_tokenizer() {
        let samples = [
            "plain",
            "with,comma",
            r#"with "quotes""#,
            "multi\nline",
            r#"""#,
            r"trailing\",
        ];
        for dialect in [Dialect::csv(), Dialect::new('\t', '"', '\\').unwrap()] {
            let encoder = DsvEncoder::new(dialect);
            let tokenizer = RowTokenizer::from_dialect(&dialect);
            for sample in samples {
                let mut buffer = String::new();
                encoder.encode_field(sample, &mut buffer);
                assert_eq!(tokenizer.tokenize(&buffer).unwrap(), vec![sample]);
            }
        }
    }
}
