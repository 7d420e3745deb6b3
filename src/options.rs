//! Reader and writer configuration

use crate::detect::DEFAULT_CANDIDATES;
use crate::dsv::{Dialect, ExcelProtector};
use crate::error::{DsvError, Result};
use crate::types::{Compression, LineEnding, RaggedRowPolicy};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Default maximum size of one field (100 MiB)
pub const DEFAULT_MAX_FIELD_SIZE: usize = 100 * 1024 * 1024;

/// Default maximum size of one logical row (500 MiB)
pub const DEFAULT_MAX_ROW_SIZE: usize = 500 * 1024 * 1024;

/// Default maximum physical lines a quoted field may span
pub const DEFAULT_MAX_FIELD_LINES: usize = 100;

/// Largest accepted explicit column list
pub const MAX_EXPLICIT_COLUMNS: usize = 10_000;

/// Column names used when the input has no header and none are supplied
pub const DEFAULT_COLUMNS: [&str; 4] = ["id", "sequence", "quality", "description"];

/// Callback receiving recoverable row errors
pub type ErrorHandler = Arc<dyn Fn(&DsvError) + Send + Sync>;

/// Where column names come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// First non-skipped row is the header
    #[default]
    FirstRow,
    /// No header row; synthetic names are used
    Absent,
    /// Caller-supplied names; every row is data
    Columns(Vec<String>),
    /// Decide from a sample of the input
    Detect,
}

/// Which per-record sequence metrics to compute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsOptions {
    /// Compute metrics at all
    pub enabled: bool,
    /// GC fraction
    pub include_gc: bool,
    /// GC skew
    pub include_gc_skew: bool,
    /// Base composition
    pub include_base_count: bool,
    /// Column holding the sequence (default: `sequence` or `seq`)
    pub sequence_column: Option<String>,
}

/// Parsing configuration
///
/// # Examples
///
/// ```
/// use dsvstream::options::ParseOptions;
/// use dsvstream::types::RaggedRowPolicy;
///
/// let options = ParseOptions::default()
///     .delimiter('\t')
///     .ragged_rows(RaggedRowPolicy::Pad)
///     .skip_errors();
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct ParseOptions {
    pub(crate) delimiter: Option<char>,
    pub(crate) quote: char,
    pub(crate) escape: Option<char>,
    pub(crate) header: HeaderMode,
    pub(crate) skip_empty_lines: bool,
    pub(crate) skip_comments: bool,
    pub(crate) comment_prefix: String,
    pub(crate) ragged_rows: RaggedRowPolicy,
    pub(crate) max_field_lines: usize,
    pub(crate) max_field_size: usize,
    pub(crate) max_row_size: usize,
    pub(crate) auto_detect_delimiter: bool,
    pub(crate) candidates: Vec<char>,
    pub(crate) stats: StatsOptions,
    pub(crate) on_error: Option<ErrorHandler>,
    pub(crate) abort: Option<Arc<AtomicBool>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            delimiter: None,
            quote: '"',
            escape: None,
            header: HeaderMode::FirstRow,
            skip_empty_lines: true,
            skip_comments: true,
            comment_prefix: "#".to_string(),
            ragged_rows: RaggedRowPolicy::Error,
            max_field_lines: DEFAULT_MAX_FIELD_LINES,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            max_row_size: DEFAULT_MAX_ROW_SIZE,
            auto_detect_delimiter: false,
            candidates: DEFAULT_CANDIDATES.to_vec(),
            stats: StatsOptions::default(),
            on_error: None,
            abort: None,
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("delimiter", &self.delimiter)
            .field("quote", &self.quote)
            .field("escape", &self.escape)
            .field("header", &self.header)
            .field("skip_empty_lines", &self.skip_empty_lines)
            .field("skip_comments", &self.skip_comments)
            .field("comment_prefix", &self.comment_prefix)
            .field("ragged_rows", &self.ragged_rows)
            .field("max_field_lines", &self.max_field_lines)
            .field("max_field_size", &self.max_field_size)
            .field("max_row_size", &self.max_row_size)
            .field("auto_detect_delimiter", &self.auto_detect_delimiter)
            .field("candidates", &self.candidates)
            .field("stats", &self.stats)
            .field("on_error", &self.on_error.is_some())
            .field("abort", &self.abort.is_some())
            .finish()
    }
}

impl ParseOptions {
    /// Tab-separated input
    pub fn tsv() -> Self {
        Self::default().delimiter('\t')
    }

    /// Set field delimiter (builder pattern)
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Set quote character (builder pattern)
    pub fn quote_char(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    /// Set escape character; defaults to the quote character (builder pattern)
    pub fn escape_char(mut self, escape: char) -> Self {
        self.escape = Some(escape);
        self
    }

    /// Whether the first row holds column names (builder pattern)
    pub fn has_header(mut self, has: bool) -> Self {
        self.header = if has {
            HeaderMode::FirstRow
        } else {
            HeaderMode::Absent
        };
        self
    }

    /// Use explicit column names; every row is data (builder pattern)
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header = HeaderMode::Columns(names.into_iter().map(Into::into).collect());
        self
    }

    /// Set header mode directly (builder pattern)
    pub fn header_mode(mut self, mode: HeaderMode) -> Self {
        self.header = mode;
        self
    }

    /// Skip whitespace-only lines outside quoted fields (builder pattern)
    pub fn skip_empty_lines(mut self, skip: bool) -> Self {
        self.skip_empty_lines = skip;
        self
    }

    /// Skip comment lines outside quoted fields (builder pattern)
    pub fn skip_comments(mut self, skip: bool) -> Self {
        self.skip_comments = skip;
        self
    }

    /// Prefix marking a comment line (builder pattern)
    pub fn comment_prefix(mut self, prefix: &str) -> Self {
        self.comment_prefix = prefix.to_string();
        self
    }

    /// Policy for rows with the wrong column count (builder pattern)
    pub fn ragged_rows(mut self, policy: RaggedRowPolicy) -> Self {
        self.ragged_rows = policy;
        self
    }

    /// Maximum physical lines one quoted field may span (builder pattern)
    pub fn max_field_lines(mut self, lines: usize) -> Self {
        self.max_field_lines = lines;
        self
    }

    /// Maximum field size in bytes (builder pattern)
    pub fn max_field_size(mut self, bytes: usize) -> Self {
        self.max_field_size = bytes;
        self
    }

    /// Maximum logical row size in bytes (builder pattern)
    pub fn max_row_size(mut self, bytes: usize) -> Self {
        self.max_row_size = bytes;
        self
    }

    /// Detect both delimiter and header presence (builder pattern)
    pub fn auto_detect(self, detect: bool) -> Self {
        self.auto_detect_delimiter(detect).auto_detect_headers(detect)
    }

    /// Detect the delimiter from a sample (builder pattern)
    ///
    /// An explicit [`delimiter`](Self::delimiter) takes precedence.
    pub fn auto_detect_delimiter(mut self, detect: bool) -> Self {
        self.auto_detect_delimiter = detect;
        self
    }

    /// Detect header presence from a sample (builder pattern)
    pub fn auto_detect_headers(mut self, detect: bool) -> Self {
        if detect {
            self.header = HeaderMode::Detect;
        } else if self.header == HeaderMode::Detect {
            self.header = HeaderMode::FirstRow;
        }
        self
    }

    /// Candidate delimiters for detection (builder pattern)
    pub fn candidates(mut self, candidates: &[char]) -> Self {
        self.candidates = candidates.to_vec();
        self
    }

    /// Compute per-record metrics (builder pattern)
    ///
    /// Enables GC content, GC skew and base composition unless narrowed with
    /// the `include_*` methods.
    pub fn compute_stats(mut self, compute: bool) -> Self {
        self.stats.enabled = compute;
        if compute
            && !self.stats.include_gc
            && !self.stats.include_gc_skew
            && !self.stats.include_base_count
        {
            self.stats.include_gc = true;
            self.stats.include_gc_skew = true;
            self.stats.include_base_count = true;
        }
        self
    }

    /// Include GC content in metrics (builder pattern)
    pub fn include_gc(mut self, include: bool) -> Self {
        self.stats.include_gc = include;
        self
    }

    /// Include GC skew in metrics (builder pattern)
    pub fn include_gc_skew(mut self, include: bool) -> Self {
        self.stats.include_gc_skew = include;
        self
    }

    /// Include base composition in metrics (builder pattern)
    pub fn include_base_count(mut self, include: bool) -> Self {
        self.stats.include_base_count = include;
        self
    }

    /// Column holding the sequence for metrics (builder pattern)
    pub fn sequence_column(mut self, name: &str) -> Self {
        self.stats.sequence_column = Some(name.to_string());
        self
    }

    /// Route recoverable row errors to `handler` and keep going (builder pattern)
    ///
    /// Without a handler the first row error ends the parse.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&DsvError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Log recoverable row errors and keep going (builder pattern)
    pub fn skip_errors(self) -> Self {
        self.on_error(|err| tracing::warn!(error = %err, "skipping malformed row"))
    }

    /// Stop producing records once `signal` is set (builder pattern)
    pub fn abort_signal(mut self, signal: Arc<AtomicBool>) -> Self {
        self.abort = Some(signal);
        self
    }

    /// Dialect for a resolved delimiter
    pub(crate) fn dialect_for(&self, delimiter: char) -> Dialect {
        Dialect {
            delimiter,
            quote: self.quote,
            escape: self.escape.unwrap_or(self.quote),
        }
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        self.dialect_for(self.delimiter.unwrap_or(',')).validate()?;
        for &candidate in &self.candidates {
            if candidate == self.quote {
                return Err(DsvError::ValidationError(format!(
                    "candidate delimiter {:?} equals the quote character",
                    candidate
                )));
            }
        }
        if self.auto_detect_delimiter && self.delimiter.is_none() && self.candidates.is_empty() {
            return Err(DsvError::ValidationError(
                "delimiter detection needs at least one candidate".to_string(),
            ));
        }
        if let HeaderMode::Columns(names) = &self.header {
            if names.is_empty() {
                return Err(DsvError::ValidationError(
                    "explicit column list is empty".to_string(),
                ));
            }
            if names.len() > MAX_EXPLICIT_COLUMNS {
                return Err(DsvError::ValidationError(format!(
                    "explicit column list has {} names, limit is {}",
                    names.len(),
                    MAX_EXPLICIT_COLUMNS
                )));
            }
        }
        if self.max_field_lines == 0 || self.max_field_size == 0 || self.max_row_size == 0 {
            return Err(DsvError::ValidationError(
                "size and line limits must be greater than zero".to_string(),
            ));
        }
        if self.max_field_size > self.max_row_size {
            return Err(DsvError::ValidationError(format!(
                "max_field_size ({}) exceeds max_row_size ({})",
                self.max_field_size, self.max_row_size
            )));
        }
        Ok(())
    }
}

/// Writing configuration
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub(crate) dialect: Dialect,
    pub(crate) line_ending: LineEnding,
    pub(crate) quote_all: bool,
    pub(crate) protector: Option<ExcelProtector>,
    pub(crate) include_header: bool,
    pub(crate) include_metrics: bool,
    pub(crate) comment_prefix: String,
    pub(crate) compression: Option<Compression>,
    pub(crate) compression_level: Option<u32>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            dialect: Dialect::csv(),
            line_ending: LineEnding::Lf,
            quote_all: false,
            protector: None,
            include_header: true,
            include_metrics: false,
            comment_prefix: "#".to_string(),
            compression: None,
            compression_level: None,
        }
    }
}

impl WriteOptions {
    /// Tab-separated output
    pub fn tsv() -> Self {
        Self::default().delimiter('\t')
    }

    /// Set field delimiter (builder pattern)
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.dialect.delimiter = delimiter;
        self
    }

    /// Set quote character (builder pattern)
    ///
    /// The escape character follows the quote unless set separately.
    pub fn quote_char(mut self, quote: char) -> Self {
        if self.dialect.escape == self.dialect.quote {
            self.dialect.escape = quote;
        }
        self.dialect.quote = quote;
        self
    }

    /// Set escape character (builder pattern)
    pub fn escape_char(mut self, escape: char) -> Self {
        self.dialect.escape = escape;
        self
    }

    /// Line terminator (builder pattern)
    pub fn line_ending(mut self, ending: LineEnding) -> Self {
        self.line_ending = ending;
        self
    }

    /// Quote every field (builder pattern)
    pub fn quote_all(mut self, quote_all: bool) -> Self {
        self.quote_all = quote_all;
        self
    }

    /// Quote fields spreadsheet import would corrupt (builder pattern)
    pub fn protect_from_excel(mut self, protect: bool) -> Self {
        self.protector = protect.then(ExcelProtector::new);
        self
    }

    /// Use a custom Excel protector (builder pattern)
    pub fn excel_protector(mut self, protector: ExcelProtector) -> Self {
        self.protector = Some(protector);
        self
    }

    /// Emit a header row before the first record (builder pattern)
    pub fn include_header(mut self, include: bool) -> Self {
        self.include_header = include;
        self
    }

    /// Append metric columns when writing records (builder pattern)
    pub fn include_metrics(mut self, include: bool) -> Self {
        self.include_metrics = include;
        self
    }

    /// Comment prefix readers will skip (builder pattern)
    ///
    /// A row whose first field starts with it gets that field quoted, so the
    /// row is not read back as a comment. Empty disables the quoting.
    pub fn comment_prefix(mut self, prefix: &str) -> Self {
        self.comment_prefix = prefix.to_string();
        self
    }

    /// Output compression; overrides the destination suffix (builder pattern)
    pub fn compression(mut self, format: Compression) -> Self {
        self.compression = Some(format);
        self
    }

    /// Compression level (builder pattern)
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = Some(level);
        self
    }

    /// Dialect used for output
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        self.dialect.validate()?;
        if let (Some(format), Some(level)) = (self.compression, self.compression_level) {
            let (min, max) = format.level_range();
            if format != Compression::None && !(min..=max).contains(&level) {
                return Err(DsvError::ValidationError(format!(
                    "{} level must be between {} and {}, got {}",
                    format, min, max, level
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ParseOptions::default();
        assert_eq!(options.header, HeaderMode::FirstRow);
        assert_eq!(options.max_field_lines, 100);
        assert!(options.validate().is_ok());
        assert!(WriteOptions::default().validate().is_ok());
    }

    #[test]
    fn test_quote_equal_to_delimiter_rejected() {
        let options = ParseOptions::default().delimiter('"');
        assert!(matches!(
            options.validate(),
            Err(DsvError::ValidationError(_))
        ));
    }

    #[test]
    fn test_oversized_column_list_rejected() {
        let names: Vec<String> = (0..=MAX_EXPLICIT_COLUMNS).map(|i| format!("c{i}")).collect();
        assert!(ParseOptions::default().columns(names).validate().is_err());
        assert!(ParseOptions::default()
            .columns(Vec::<String>::new())
            .validate()
            .is_err());
    }

    #[test]
    fn test_limits_validated() {
        assert!(ParseOptions::default().max_field_lines(0).validate().is_err());
        assert!(ParseOptions::default()
            .max_row_size(10)
            .max_field_size(20)
            .validate()
            .is_err());
    }

    #[test]
    fn test_compute_stats_enables_all_metrics() {
        let options = ParseOptions::default().compute_stats(true);
        assert!(options.stats.include_gc);
        assert!(options.stats.include_gc_skew);
        assert!(options.stats.include_base_count);

        let narrowed = ParseOptions::default().include_gc(true).compute_stats(true);
        assert!(narrowed.stats.include_gc);
        assert!(!narrowed.stats.include_base_count);
    }

    #[test]
    fn test_auto_detect_toggles_header_mode() {
        let options = ParseOptions::default().auto_detect(true);
        assert!(options.auto_detect_delimiter);
        assert_eq!(options.header, HeaderMode::Detect);
        let options = options.auto_detect_headers(false);
        assert_eq!(options.header, HeaderMode::FirstRow);
    }

    #[test]
    fn test_write_level_range() {
        let options = WriteOptions::default()
            .compression(Compression::Zstd)
            .compression_level(30);
        assert!(options.validate().is_err());
        let options = WriteOptions::default()
            .compression(Compression::Gzip)
            .compression_level(9);
        assert!(options.validate().is_ok());
    }
}
