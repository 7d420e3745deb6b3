//! Delimited file writing with streaming support and compression

use crate::compression::CompressedSink;
use crate::dsv::DsvEncoder;
use crate::error::{DsvError, Result};
use crate::options::WriteOptions;
use crate::types::{Compression, LineEnding, Record, RecordMetrics, Schema};
use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column names appended by [`WriteOptions::include_metrics`]
pub const METRIC_COLUMNS: [&str; 8] = [
    "length",
    "gc_content",
    "gc_skew",
    "count_a",
    "count_c",
    "count_g",
    "count_t",
    "count_n",
];

/// Streaming writer for CSV, TSV and other delimited text
///
/// Writes rows one at a time straight to the destination, optionally through
/// a compressor. Memory use is constant regardless of output size.
///
/// # Examples
///
/// ```no_run
/// use dsvstream::dsv_writer::DsvWriter;
///
/// let mut writer = DsvWriter::new("output.csv").unwrap();
/// writer.write_row(["gene", "expression"]).unwrap();
/// writer.write_row(["TP53", "5.23"]).unwrap();
/// writer.save().unwrap();
/// ```
///
/// # Compression
///
/// Selected from the destination suffix unless set explicitly:
/// - `.gz` → gzip (level 6)
/// - `.zst` → Zstandard (level 3)
/// - `.bz2` → bzip2 (level 6)
/// - `.xz` → xz (level 6)
/// - `.zip` → ZIP archive with one entry (level 6)
///
/// ```no_run
/// use dsvstream::dsv_writer::DsvWriter;
/// use dsvstream::types::Compression;
///
/// // Auto-detect from extension
/// let mut writer = DsvWriter::new("data.tsv.gz").unwrap();
///
/// // Or explicit compression
/// let mut writer = DsvWriter::with_compression("data.tsv.zst", Compression::Zstd, 9).unwrap();
/// ```
pub struct DsvWriter {
    sink: CompressedSink,
    encoder: DsvEncoder,
    options: WriteOptions,
    compression: Compression,

    // State
    header_written: bool,
    row_count: u64,
    buffer: String,
}

impl DsvWriter {
    /// Create a writer with default options; compression follows the suffix
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, WriteOptions::default())
    }

    /// Create a writer with explicit options
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dsvstream::dsv_writer::DsvWriter;
    /// use dsvstream::options::WriteOptions;
    /// use dsvstream::types::LineEnding;
    ///
    /// let options = WriteOptions::tsv()
    ///     .line_ending(LineEnding::CrLf)
    ///     .protect_from_excel(true);
    /// let mut writer = DsvWriter::with_options("genes.tsv", options).unwrap();
    /// writer.write_row(["SEPT1", "0.5"]).unwrap();
    /// writer.save().unwrap();
    /// ```
    pub fn with_options<P: AsRef<Path>>(path: P, options: WriteOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let compression = options
            .compression
            .unwrap_or_else(|| Compression::from_path(path));
        let level = checked_level(compression, options.compression_level)?;

        let sink = if compression == Compression::Zip {
            CompressedSink::zip(path, level)?
        } else {
            let file = File::create(path).map_err(|source| DsvError::FileError {
                path: path.to_path_buf(),
                source,
            })?;
            CompressedSink::new(Box::new(file), compression, level)?
        };

        if compression != Compression::None {
            tracing::debug!(path = %path.display(), format = %compression, level, "compressing output");
        }
        Ok(Self::build(sink, compression, options))
    }

    /// Create a writer with explicit compression format and level
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `format` - Compression format
    /// * `level` - Compression level:
    ///   - gzip, xz, zip: 0-9
    ///   - bzip2: 1-9
    ///   - zstd: 1-21 (recommend 3 for balanced)
    pub fn with_compression<P: AsRef<Path>>(
        path: P,
        format: Compression,
        level: u32,
    ) -> Result<Self> {
        let options = WriteOptions::default()
            .compression(format)
            .compression_level(level);
        Self::with_options(path, options)
    }

    /// Write to any byte sink
    ///
    /// ZIP output needs a file path and is rejected here.
    pub fn from_writer<W: Write + Send + 'static>(writer: W, options: WriteOptions) -> Result<Self> {
        options.validate()?;
        let compression = options.compression.unwrap_or_default();
        let level = checked_level(compression, options.compression_level)?;
        let sink = CompressedSink::new(Box::new(writer), compression, level)?;
        Ok(Self::build(sink, compression, options))
    }

    fn build(sink: CompressedSink, compression: Compression, options: WriteOptions) -> Self {
        DsvWriter {
            sink,
            encoder: encoder_for(&options),
            options,
            compression,
            header_written: false,
            row_count: 0,
            buffer: String::with_capacity(4096),
        }
    }

    /// Set custom delimiter (builder pattern)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dsvstream::dsv_writer::DsvWriter;
    ///
    /// let mut writer = DsvWriter::new("data.psv").unwrap().delimiter('|').unwrap();
    /// ```
    ///
    /// Fails with `ValidationError` when the delimiter clashes with the quote
    /// or escape character.
    pub fn delimiter(mut self, delimiter: char) -> Result<Self> {
        self.options.dialect.delimiter = delimiter;
        self.options.dialect.validate()?;
        self.encoder = encoder_for(&self.options);
        Ok(self)
    }

    /// Set line ending (builder pattern)
    pub fn line_ending(mut self, ending: LineEnding) -> Self {
        self.options.line_ending = ending;
        self
    }

    /// Write the header row explicitly
    ///
    /// Records written afterwards do not emit another header.
    pub fn write_header<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        self.emit(&names)?;
        self.header_written = true;
        Ok(())
    }

    /// Write a row of strings
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dsvstream::dsv_writer::DsvWriter;
    ///
    /// let mut writer = DsvWriter::new("data.csv").unwrap();
    /// writer.write_row(&["id", "sequence"]).unwrap();
    /// writer.write_row(&["r1", "ACGT"]).unwrap();
    /// writer.save().unwrap();
    /// ```
    pub fn write_row<I, S>(&mut self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields: Vec<S> = data.into_iter().collect();
        self.emit(&fields)?;
        self.row_count += 1;
        Ok(())
    }

    /// Write a parsed record
    ///
    /// The first record emits the header from its schema unless
    /// `include_header` is off or a header was already written.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let include_metrics = self.options.include_metrics;
        if self.options.include_header && !self.header_written {
            let header = header_fields(record.schema(), include_metrics);
            self.emit(&header)?;
            self.header_written = true;
        }

        let fields = record_fields(record, include_metrics);
        self.emit(&fields)?;
        self.row_count += 1;
        Ok(())
    }

    /// Write several records
    pub fn write_records<'r, I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Write multiple rows at once
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dsvstream::dsv_writer::DsvWriter;
    ///
    /// let mut writer = DsvWriter::new("data.csv").unwrap();
    /// let rows = vec![
    ///     vec!["r1", "ACGT"],
    ///     vec!["r2", "GGCC"],
    /// ];
    /// writer.write_rows_batch(rows).unwrap();
    /// ```
    pub fn write_rows_batch<I, R, S>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for row_data in rows {
            self.write_row(row_data)?;
        }
        Ok(())
    }

    /// Get the number of data rows written (header excluded)
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Compression applied to the output
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Finalize and save the output
    ///
    /// This must be called to complete compressed streams and flush buffered
    /// data. Consumes the writer.
    pub fn save(self) -> Result<()> {
        self.sink.finish()
    }

    fn emit<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        // Reuse buffer
        self.buffer.clear();
        self.encoder.encode_row(fields, &mut self.buffer);
        self.buffer.push_str(self.options.line_ending.as_str());
        self.sink.write_all(self.buffer.as_bytes())
    }
}

fn encoder_for(options: &WriteOptions) -> DsvEncoder {
    DsvEncoder::new(options.dialect)
        .quote_all(options.quote_all)
        .protect_from_excel(options.protector.clone())
        .comment_prefix(&options.comment_prefix)
}

fn checked_level(format: Compression, level: Option<u32>) -> Result<u32> {
    let level = level.unwrap_or_else(|| format.default_level());
    let (min, max) = format.level_range();
    if format != Compression::None && !(min..=max).contains(&level) {
        return Err(DsvError::ValidationError(format!(
            "{} level must be between {} and {}, got {}",
            format, min, max, level
        )));
    }
    Ok(level)
}

fn header_fields(schema: &Schema, include_metrics: bool) -> Vec<Cow<'_, str>> {
    let mut fields: Vec<Cow<'_, str>> = schema.names().iter().map(|n| Cow::Borrowed(n.as_str())).collect();
    if include_metrics {
        fields.extend(METRIC_COLUMNS.iter().map(|&c| Cow::Borrowed(c)));
    }
    fields
}

fn record_fields(record: &Record, include_metrics: bool) -> Vec<Cow<'_, str>> {
    let mut fields: Vec<Cow<'_, str>> = record.values().iter().map(|v| Cow::Borrowed(v.as_str())).collect();
    if include_metrics {
        fields.extend(metric_fields(record.metrics()).into_iter().map(Cow::Owned));
    }
    fields
}

/// Metric columns in [`METRIC_COLUMNS`] order; missing values are empty
fn metric_fields(metrics: Option<&RecordMetrics>) -> [String; 8] {
    let mut out: [String; 8] = Default::default();
    let Some(m) = metrics else {
        return out;
    };

    let mut itoa_buf = itoa::Buffer::new();
    out[0] = itoa_buf.format(m.length).to_string();
    if let Some(gc) = m.gc_content {
        out[1] = gc.to_string();
    }
    if let Some(skew) = m.gc_skew {
        out[2] = skew.to_string();
    }
    if let Some(counts) = &m.base_counts {
        for (slot, count) in out[3..]
            .iter_mut()
            .zip([counts.a, counts.c, counts.g, counts.t, counts.n])
        {
            *slot = itoa_buf.format(count).to_string();
        }
    }
    out
}

/// Format records as delimited text in memory
///
/// Honors every option except compression.
///
/// # Examples
///
/// ```
/// use dsvstream::dsv_reader::DsvReader;
/// use dsvstream::dsv_writer::format_records;
/// use dsvstream::options::{ParseOptions, WriteOptions};
///
/// let mut reader = DsvReader::from_text("gene,note\nTP53,\"a, b\"\n", ParseOptions::default()).unwrap();
/// let records: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
/// let text = format_records(&records, &WriteOptions::default());
/// assert_eq!(text, "gene,note\nTP53,\"a, b\"\n");
/// ```
pub fn format_records(records: &[Record], options: &WriteOptions) -> String {
    let encoder = encoder_for(options);
    let ending = options.line_ending.as_str();
    let mut out = String::new();

    if options.include_header {
        if let Some(first) = records.first() {
            encoder.encode_row(&header_fields(first.schema(), options.include_metrics), &mut out);
            out.push_str(ending);
        }
    }
    for record in records {
        encoder.encode_row(&record_fields(record, options.include_metrics), &mut out);
        out.push_str(ending);
    }
    out
}

/// Format raw rows as delimited text in memory
pub fn format_rows<R, S>(rows: &[R], options: &WriteOptions) -> String
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    let encoder = encoder_for(options);
    let ending = options.line_ending.as_str();
    let mut out = String::new();
    for row in rows {
        encoder.encode_row(row.as_ref(), &mut out);
        out.push_str(ending);
    }
    out
}
