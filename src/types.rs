//! Type definitions for delimited tabular data

use crate::error::DsvError;
use crate::stats::BaseCounts;
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Compression container of a byte source or sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Compression {
    /// Plain text
    #[default]
    None,
    /// gzip (`1F 8B`)
    Gzip,
    /// Zstandard (`28 B5 2F FD`)
    Zstd,
    /// bzip2 (`BZh`)
    Bzip2,
    /// xz (`FD 37 7A 58 5A 00`)
    Xz,
    /// ZIP archive holding a single table (file paths only)
    Zip,
}

impl Compression {
    /// Infer compression from a destination path's suffix
    ///
    /// # Examples
    ///
    /// ```
    /// use dsvstream::types::Compression;
    ///
    /// assert_eq!(Compression::from_path("genes.tsv.gz"), Compression::Gzip);
    /// assert_eq!(Compression::from_path("genes.csv.zst"), Compression::Zstd);
    /// assert_eq!(Compression::from_path("genes.csv"), Compression::None);
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("gz") | Some("gzip") => Compression::Gzip,
            Some("zst") | Some("zstd") => Compression::Zstd,
            Some("bz2") => Compression::Bzip2,
            Some("xz") => Compression::Xz,
            Some("zip") => Compression::Zip,
            _ => Compression::None,
        }
    }

    /// Default compression level for this codec
    pub fn default_level(&self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Zstd => 3,
            Compression::Gzip | Compression::Bzip2 | Compression::Xz | Compression::Zip => 6,
        }
    }

    /// Valid level range for this codec
    pub fn level_range(&self) -> (u32, u32) {
        match self {
            Compression::None => (0, 0),
            Compression::Gzip | Compression::Xz | Compression::Zip => (0, 9),
            Compression::Bzip2 => (1, 9),
            Compression::Zstd => (1, 21),
        }
    }

    /// Conventional file suffix, without the dot
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Zstd => Some("zst"),
            Compression::Bzip2 => Some("bz2"),
            Compression::Xz => Some("xz"),
            Compression::Zip => Some("zip"),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
            Compression::Bzip2 => "bzip2",
            Compression::Xz => "xz",
            Compression::Zip => "zip",
        };
        f.write_str(name)
    }
}

impl FromStr for Compression {
    type Err = DsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Compression::None),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "zstd" | "zst" => Ok(Compression::Zstd),
            "bzip2" | "bz2" => Ok(Compression::Bzip2),
            "xz" => Ok(Compression::Xz),
            "zip" => Ok(Compression::Zip),
            other => Err(DsvError::ValidationError(format!(
                "unknown compression format '{}'",
                other
            ))),
        }
    }
}

/// What to do with a data row whose column count differs from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RaggedRowPolicy {
    /// Report a `RaggedRowError`
    #[default]
    Error,
    /// Fill missing fields with empty strings (extras dropped)
    Pad,
    /// Drop extra fields (missing ones filled with empty strings)
    Truncate,
    /// Leave the row as it is
    Ignore,
}

impl FromStr for RaggedRowPolicy {
    type Err = DsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(RaggedRowPolicy::Error),
            "pad" => Ok(RaggedRowPolicy::Pad),
            "truncate" => Ok(RaggedRowPolicy::Truncate),
            "ignore" => Ok(RaggedRowPolicy::Ignore),
            other => Err(DsvError::ValidationError(format!(
                "unknown ragged row policy '{}' (expected error, pad, truncate or ignore)",
                other
            ))),
        }
    }
}

/// Line terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`
    CrLf,
    /// `\r`
    Cr,
}

impl LineEnding {
    /// Terminator text
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }
}

impl FromStr for LineEnding {
    type Err = DsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "\n" => return Ok(LineEnding::Lf),
            "\r\n" => return Ok(LineEnding::CrLf),
            "\r" => return Ok(LineEnding::Cr),
            _ => {}
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "lf" | "unix" => Ok(LineEnding::Lf),
            "crlf" | "windows" => Ok(LineEnding::CrLf),
            "cr" => Ok(LineEnding::Cr),
            other => Err(DsvError::ValidationError(format!(
                "unknown line ending '{}'",
                other
            ))),
        }
    }
}

/// Format name derived from the delimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatTag {
    /// Comma separated
    Csv,
    /// Tab separated
    Tsv,
    /// Pipe separated
    Psv,
    /// Semicolon separated
    Ssv,
    /// Any other single-character delimiter
    Dsv,
}

impl FormatTag {
    /// Tag for a delimiter
    pub fn from_delimiter(delimiter: char) -> Self {
        match delimiter {
            ',' => FormatTag::Csv,
            '\t' => FormatTag::Tsv,
            '|' => FormatTag::Psv,
            ';' => FormatTag::Ssv,
            _ => FormatTag::Dsv,
        }
    }

    /// Whether this is a well-known named format
    pub fn is_recognized(&self) -> bool {
        !matches!(self, FormatTag::Dsv)
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatTag::Csv => "csv",
            FormatTag::Tsv => "tsv",
            FormatTag::Psv => "psv",
            FormatTag::Ssv => "ssv",
            FormatTag::Dsv => "dsv",
        };
        f.write_str(name)
    }
}

/// Outcome of format sniffing
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectionResult {
    /// Detected (or fallback) delimiter
    pub delimiter: char,
    /// Whether the first row looks like a header
    pub has_headers: bool,
    /// Compression container found by magic bytes
    pub compression: Compression,
    /// Heuristic reliability estimate in `[0, 1]`
    pub confidence: f64,
}

impl DetectionResult {
    /// Format tag for the detected delimiter
    pub fn format(&self) -> FormatTag {
        FormatTag::from_delimiter(self.delimiter)
    }
}

/// Column names captured once per parse and shared by every record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    names: Vec<String>,
    lookup: IndexMap<String, usize>,
}

impl Schema {
    /// Create a schema from column names
    ///
    /// Duplicate names are kept by position; lookups resolve to the first.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut lookup = IndexMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            lookup.entry(name.clone()).or_insert(idx);
        }
        Schema { names, lookup }
    }

    /// Column names in header order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a column
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Position of the first column matching case-insensitively
    pub fn index_of_ignore_case(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if schema has no columns
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Per-record sequence metrics, populated only on request
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordMetrics {
    /// Sequence length in characters
    pub length: usize,
    /// GC fraction over unambiguous bases (0.0 to 1.0)
    pub gc_content: Option<f64>,
    /// `(G - C) / (G + C)`
    pub gc_skew: Option<f64>,
    /// Base composition
    pub base_counts: Option<BaseCounts>,
}

/// One data row: values in header order plus source metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<String>,
    line: usize,
    format: FormatTag,
    metrics: Option<RecordMetrics>,
}

impl Record {
    /// Create a record
    pub fn new(
        schema: Arc<Schema>,
        values: Vec<String>,
        line: usize,
        format: FormatTag,
        metrics: Option<RecordMetrics>,
    ) -> Self {
        Record {
            schema,
            values,
            line,
            format,
            metrics,
        }
    }

    /// Value by column name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.schema
            .index_of(name)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    /// Value by column position
    pub fn get_index(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).map(String::as_str)
    }

    /// `(name, value)` pairs in header order
    ///
    /// Values beyond the schema width (`RaggedRowPolicy::Ignore`) are not
    /// paired; use [`Record::values`] to see them.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.schema
            .names()
            .iter()
            .zip(self.values.iter())
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Name to value mapping in header order
    pub fn to_map(&self) -> IndexMap<&str, &str> {
        let mut map = IndexMap::with_capacity(self.values.len());
        for (name, value) in self.iter() {
            map.entry(name).or_insert(value);
        }
        map
    }

    /// All values in column order
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Take the values
    pub fn into_values(self) -> Vec<String> {
        self.values
    }

    /// Shared schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Physical line the row starts on (1-based)
    pub fn line(&self) -> usize {
        self.line
    }

    /// Format tag of the source
    pub fn format(&self) -> FormatTag {
        self.format
    }

    /// Computed metrics, if requested
    pub fn metrics(&self) -> Option<&RecordMetrics> {
        self.metrics.as_ref()
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if record has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let map = self.to_map();
        let mut state = serializer.serialize_map(Some(map.len()))?;
        for (name, value) in map {
            state.serialize_entry(name, value)?;
        }
        state.end()
    }
}
