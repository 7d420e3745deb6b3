//! Delimiter, header and compression detection
//!
//! The heuristics are approximate and sit behind [`DetectionStrategy`] so an
//! alternative can be plugged into [`FormatDetector`] without touching the
//! parser.

use crate::compression::{decoder_for, detect_compression, read_zip_entry, MAGIC_PEEK_LEN};
use crate::dsv::RowTokenizer;
use crate::error::{DsvError, Result};
use crate::types::{Compression, DetectionResult, FormatTag};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

/// Delimiters tried when none is configured
pub const DEFAULT_CANDIDATES: [char; 4] = [',', '\t', '|', ';'];

/// Byte bound on the detection sample
pub const MAX_DETECTION_BYTES: usize = 10_000;

/// Line bound on the detection sample
pub const MAX_DETECTION_LINES: usize = 100;

/// Lines inspected for header detection
pub const HEADER_SAMPLE_LINES: usize = 5;

/// Single-column values accepted as a header
pub const HEADER_KEYWORDS: [&str; 8] = [
    "id", "sequence", "gene", "name", "seq", "quality", "chr", "pos",
];

static HEADER_VOCAB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:id|name|gene|genes?_?(?:id|name|symbol)|seq|sequence|qual|quality|chr|chrom|chromosome|pos|position|start|end|strand|sample|score|count|value|length|description|type)(?:[_\-\s]?\w+)?$",
    )
    .unwrap()
});

static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").unwrap());

/// Pluggable detection heuristics
pub trait DetectionStrategy: Send + Sync {
    /// Pick a delimiter from `candidates`, or `None` when nothing scores
    fn detect_delimiter(&self, lines: &[&str], candidates: &[char]) -> Option<char>;

    /// Whether the first line is a header row
    fn detect_headers(&self, lines: &[&str], delimiter: char) -> bool;
}

/// Field-count consistency scoring and header vocabulary matching
#[derive(Debug, Clone, Copy)]
pub struct DefaultHeuristics {
    quote: char,
}

impl Default for DefaultHeuristics {
    fn default() -> Self {
        DefaultHeuristics { quote: '"' }
    }
}

impl DefaultHeuristics {
    /// Heuristics that honor a non-default quote character
    pub fn with_quote(quote: char) -> Self {
        DefaultHeuristics { quote }
    }

    fn split(&self, line: &str, delimiter: char) -> Vec<String> {
        RowTokenizer::new(delimiter, self.quote, self.quote)
            .tokenize(line)
            .unwrap_or_else(|_| line.split(delimiter).map(str::to_string).collect())
    }

    /// `consistent * avg / (1 + variance)` over per-line field counts
    pub fn score(&self, lines: &[&str], delimiter: char) -> f64 {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| self.split(line, delimiter).len())
            .collect();
        if counts.is_empty() {
            return 0.0;
        }

        let mut consistent = 0usize;
        let mut previous: Option<usize> = None;
        for &count in &counts {
            if count > 1 {
                if previous == Some(count) {
                    consistent += 1;
                }
                previous = Some(count);
            }
        }

        let n = counts.len() as f64;
        let avg = counts.iter().sum::<usize>() as f64 / n;
        let variance = counts
            .iter()
            .map(|&c| (c as f64 - avg).powi(2))
            .sum::<f64>()
            / n;

        consistent as f64 * avg / (1.0 + variance)
    }

    fn looks_like_header(fields: &[String]) -> bool {
        fields.iter().all(|f| {
            let f = f.trim();
            HEADER_VOCAB.is_match(f) || !is_numeric(f)
        })
    }
}

impl DetectionStrategy for DefaultHeuristics {
    fn detect_delimiter(&self, lines: &[&str], candidates: &[char]) -> Option<char> {
        let mut best: Option<(char, f64)> = None;
        for &candidate in candidates {
            let score = self.score(lines, candidate);
            tracing::trace!(delimiter = ?candidate, score, "delimiter score");
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        best.map(|(delimiter, _)| delimiter)
    }

    fn detect_headers(&self, lines: &[&str], delimiter: char) -> bool {
        if lines.len() < 2 {
            return false;
        }
        let first = self.split(lines[0], delimiter);
        let second = self.split(lines[1], delimiter);

        if first.len() == 1 && second.len() == 1 {
            let value = first[0].trim().to_ascii_lowercase();
            return HEADER_KEYWORDS.contains(&value.as_str());
        }

        let numeric_first = first.iter().filter(|f| is_numeric(f.trim())).count();
        let numeric_second = second.iter().filter(|f| is_numeric(f.trim())).count();
        Self::looks_like_header(&first) && numeric_second >= numeric_first
    }
}

fn is_numeric(value: &str) -> bool {
    NUMERIC.is_match(value)
}

/// Format sniffing over bounded samples
///
/// # Examples
///
/// ```
/// use dsvstream::detect::FormatDetector;
///
/// let detector = FormatDetector::new();
/// let result = detector.sniff_text("gene\tvalue\nTP53\t5.2\nBRCA1\t3.1\n");
/// assert_eq!(result.delimiter, '\t');
/// assert!(result.has_headers);
/// ```
#[derive(Clone)]
pub struct FormatDetector {
    strategy: Arc<dyn DetectionStrategy>,
    candidates: Vec<char>,
    comment_prefix: Option<String>,
}

impl Default for FormatDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FormatDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatDetector")
            .field("candidates", &self.candidates)
            .field("comment_prefix", &self.comment_prefix)
            .finish_non_exhaustive()
    }
}

impl FormatDetector {
    /// Detector with [`DefaultHeuristics`] and [`DEFAULT_CANDIDATES`]
    pub fn new() -> Self {
        Self::with_strategy(DefaultHeuristics::default())
    }

    /// Detector with custom heuristics
    pub fn with_strategy<S: DetectionStrategy + 'static>(strategy: S) -> Self {
        FormatDetector {
            strategy: Arc::new(strategy),
            candidates: DEFAULT_CANDIDATES.to_vec(),
            comment_prefix: Some("#".to_string()),
        }
    }

    /// Set candidate delimiters (builder pattern)
    pub fn candidates(mut self, candidates: &[char]) -> Self {
        self.candidates = candidates.to_vec();
        self
    }

    /// Lines starting with this prefix are left out of the sample
    /// (builder pattern); `None` or an empty prefix keeps every line
    pub fn comment_prefix(mut self, prefix: Option<&str>) -> Self {
        self.comment_prefix = prefix.filter(|p| !p.is_empty()).map(str::to_string);
        self
    }

    /// Detect the delimiter of sample lines
    pub fn detect_delimiter(&self, lines: &[&str]) -> Option<char> {
        let sample = self.sample_lines(lines);
        self.strategy.detect_delimiter(&sample, &self.candidates)
    }

    /// Detect whether the first sample line is a header
    pub fn detect_headers(&self, lines: &[&str], delimiter: char) -> bool {
        let sample = self.sample_lines(lines);
        let head = &sample[..sample.len().min(HEADER_SAMPLE_LINES)];
        self.strategy.detect_headers(head, delimiter)
    }

    /// Non-blank, non-comment lines within the line bound
    fn sample_lines<'a>(&self, lines: &[&'a str]) -> Vec<&'a str> {
        let prefix = self.comment_prefix.as_deref();
        lines
            .iter()
            .copied()
            .filter(|l| !l.trim().is_empty())
            .filter(|l| !prefix.is_some_and(|p| l.trim_start().starts_with(p)))
            .take(MAX_DETECTION_LINES)
            .collect()
    }

    /// Full analysis of sample lines
    ///
    /// With `delimiter` unset the delimiter is detected, falling back to a
    /// comma. Compression is reported as none; byte-level callers fill it in.
    pub fn analyze(&self, lines: &[&str], delimiter: Option<char>) -> DetectionResult {
        let sample = self.sample_lines(lines);

        let (delimiter, resolved) = match delimiter {
            Some(d) => (d, true),
            None => match self.strategy.detect_delimiter(&sample, &self.candidates) {
                Some(d) => (d, true),
                None => {
                    tracing::warn!(
                        lines = sample.len(),
                        "could not detect delimiter, falling back to ','"
                    );
                    (',', false)
                }
            },
        };

        let head = &sample[..sample.len().min(HEADER_SAMPLE_LINES)];
        let has_headers = self.strategy.detect_headers(head, delimiter);

        let mut confidence: f64 = 0.5;
        if resolved {
            confidence += 0.2;
        }
        if sample.len() >= 5 {
            confidence += 0.1;
        }
        if has_headers {
            confidence += 0.1;
        }
        if uniform_counts(&sample, delimiter) {
            confidence += 0.1;
        }
        if resolved && FormatTag::from_delimiter(delimiter).is_recognized() {
            confidence += 0.1;
        }

        let result = DetectionResult {
            delimiter,
            has_headers,
            compression: Compression::None,
            confidence: confidence.min(1.0),
        };
        tracing::debug!(
            delimiter = ?result.delimiter,
            has_headers = result.has_headers,
            confidence = result.confidence,
            "format detected"
        );
        result
    }

    /// Sniff decoded text
    pub fn sniff_text(&self, text: &str) -> DetectionResult {
        let (bounded, truncated) = truncate_at_boundary(text, MAX_DETECTION_BYTES);
        let mut lines: Vec<&str> = bounded.lines().collect();
        if truncated && lines.len() > 1 {
            lines.pop();
        }
        self.analyze(&lines, None)
    }

    /// Sniff a raw byte prefix, decompressing it when a signature matches
    pub fn sniff_bytes(&self, bytes: &[u8]) -> DetectionResult {
        let found = detect_compression(&bytes[..bytes.len().min(MAGIC_PEEK_LEN)]);
        let compression = if found.is_confident() {
            found.format
        } else {
            Compression::None
        };

        let decoded = match compression {
            Compression::None => bytes[..bytes.len().min(MAX_DETECTION_BYTES)].to_vec(),
            Compression::Zip => Vec::new(),
            format => decode_prefix(format, bytes),
        };

        let mut result = self.sniff_text(&String::from_utf8_lossy(&decoded));
        result.compression = compression;
        result
    }

    /// Sniff the start of a byte stream
    pub fn sniff_reader<R: Read>(&self, reader: R) -> Result<DetectionResult> {
        let mut prefix = Vec::with_capacity(MAX_DETECTION_BYTES);
        reader
            .take(MAX_DETECTION_BYTES as u64)
            .read_to_end(&mut prefix)?;
        Ok(self.sniff_bytes(&prefix))
    }

    /// Sniff a file, including the first entry of a ZIP archive
    pub fn sniff_path<P: AsRef<Path>>(&self, path: P) -> Result<DetectionResult> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DsvError::FileError {
            path: path.to_path_buf(),
            source,
        })?;
        let result = self.sniff_reader(file)?;
        if result.compression != Compression::Zip {
            return Ok(result);
        }

        let entry = read_zip_entry(path)?;
        let mut result = self.sniff_bytes(&entry[..entry.len().min(MAX_DETECTION_BYTES)]);
        result.compression = Compression::Zip;
        Ok(result)
    }
}


fn uniform_counts(lines: &[&str], delimiter: char) -> bool {
    let mut counts = lines
        .iter()
        .take(10)
        .map(|l| l.split(delimiter).count());
    match counts.next() {
        Some(first) => lines.len() >= 2 && counts.all(|c| c == first),
        None => false,
    }
}

fn truncate_at_boundary(text: &str, max: usize) -> (&str, bool) {
    if text.len() <= max {
        return (text, false);
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

/// Decode as much of a compressed prefix as possible
///
/// A prefix usually ends mid-stream, so a decoder error after some output is
/// expected and ignored.
fn decode_prefix(format: Compression, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let Ok(mut decoder) = decoder_for(format, Cursor::new(bytes.to_vec())) else {
        return out;
    };
    let mut chunk = [0u8; 4096];
    while out.len() < MAX_DETECTION_BYTES {
        match decoder.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    out.truncate(MAX_DETECTION_BYTES);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_comma() {
        let detector = FormatDetector::new();
        let lines = ["gene,sample,expression", "TP53,sample1,5.23", "BRCA1,sample2,3.45"];
        assert_eq!(detector.detect_delimiter(&lines), Some(','));
    }

    #[test]
    fn test_detect_tab_and_pipe() {
        let detector = FormatDetector::new();
        assert_eq!(
            detector.detect_delimiter(&["a\tb\tc", "1\t2\t3", "4\t5\t6"]),
            Some('\t')
        );
        assert_eq!(
            detector.detect_delimiter(&["a|b", "1|2", "3|4"]),
            Some('|')
        );
    }

    #[test]
    fn test_quoted_delimiters_do_not_mislead() {
        let detector = FormatDetector::new();
        let lines = [
            "name\tnote",
            "a\t\"x, y, z\"",
            "b\t\"p, q, r\"",
        ];
        assert_eq!(detector.detect_delimiter(&lines), Some('\t'));
    }

    #[test]
    fn test_no_delimiter_found() {
        let detector = FormatDetector::new();
        assert_eq!(detector.detect_delimiter(&["ACGT", "TTGA"]), None);
        let result = detector.analyze(&["ACGT", "TTGA"], None);
        assert_eq!(result.delimiter, ',');
    }

    #[test]
    fn test_header_detection() {
        let detector = FormatDetector::new();
        assert!(detector.detect_headers(&["gene,expression", "TP53,5.2"], ','));
        assert!(!detector.detect_headers(&["1,2,3", "4,5,6"], ','));
        assert!(!detector.detect_headers(&["only one line"], ','));
    }

    #[test]
    fn test_single_column_header_keywords() {
        let detector = FormatDetector::new();
        assert!(detector.detect_headers(&["sequence", "ACGT"], ','));
        assert!(detector.detect_headers(&["ID", "seq1"], ','));
        assert!(!detector.detect_headers(&["ACGT", "TTGA"], ','));
    }

    #[test]
    fn test_header_rejected_when_second_row_less_numeric() {
        let detector = FormatDetector::new();
        assert!(!detector.detect_headers(&["a,1.5", "b,c"], ','));
    }

    #[test]
    fn test_custom_strategy() {
        struct AlwaysSemicolon;
        impl DetectionStrategy for AlwaysSemicolon {
            fn detect_delimiter(&self, _: &[&str], _: &[char]) -> Option<char> {
                Some(';')
            }
            fn detect_headers(&self, _: &[&str], _: char) -> bool {
                false
            }
        }

        let detector = FormatDetector::with_strategy(AlwaysSemicolon);
        let result = detector.sniff_text("a,b\n1,2\n");
        assert_eq!(result.delimiter, ';');
        assert!(!result.has_headers);
    }

    #[test]
    fn test_confidence_bounds() {
        let detector = FormatDetector::new();
        let text = "gene,value\nA,1\nB,2\nC,3\nD,4\nE,5\n";
        let result = detector.sniff_text(text);
        assert_eq!(result.format(), FormatTag::Csv);
        assert!((result.confidence - 1.0).abs() < 1e-9);

        let weak = detector.sniff_text("ACGT\n");
        assert!((weak.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_comments_excluded_from_sample() {
        let detector = FormatDetector::new();
        let text = "# exported by tool; version 2\nid\tsequence\ns1\tACGT\ns2\tTTGA\n";
        let result = detector.sniff_text(text);
        assert_eq!(result.delimiter, '\t');
        assert!(result.has_headers);
    }

    #[test]
    fn test_custom_comment_prefix() {
        let lines = ["// a;b;c", "// d;e;f", "// g;h;i", "id,name", "1,x"];
        let slashes = FormatDetector::new().comment_prefix(Some("//"));
        assert_eq!(slashes.detect_delimiter(&lines), Some(','));
        assert_eq!(FormatDetector::new().detect_delimiter(&lines), Some(';'));

        let hashes = ["#id|name", "#1|x", "#2|y", "3|z"];
        let keep_all = FormatDetector::new().comment_prefix(None);
        assert_eq!(keep_all.detect_delimiter(&hashes), Some('|'));
        assert!(FormatDetector::new().detect_delimiter(&hashes).is_none());
    }

    #[test]
    fn test_sniff_gzip_bytes() -> Result<()> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"id|sequence\ns1|ACGT\ns2|GGCC\n")?;
        let bytes = encoder.finish()?;

        let result = FormatDetector::new().sniff_bytes(&bytes);
        assert_eq!(result.compression, Compression::Gzip);
        assert_eq!(result.delimiter, '|');
        assert!(result.has_headers);
        Ok(())
    }

    #[test]
    fn test_sniff_truncated_text_drops_partial_line() {
        let mut text = String::from("a,b,c\n");
        while text.len() < MAX_DETECTION_BYTES + 100 {
            text.push_str("1,2,3\n");
        }
        text.push_str("1,2");
        let result = FormatDetector::new().sniff_text(&text);
        assert_eq!(result.delimiter, ',');
    }
}
