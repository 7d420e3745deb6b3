//! Delimited file reading with streaming support and decompression

use crate::assembler::{AssembledRow, AssemblerConfig, ParserState, RowAssembler};
use crate::compression::{
    decoder_for, open_decompressed, read_zip_entry, sniff_compression, PeekReader,
};
use crate::detect::{
    DefaultHeuristics, FormatDetector, MAX_DETECTION_BYTES, MAX_DETECTION_LINES,
};
use crate::dsv::Dialect;
use crate::error::{DsvError, Result};
use crate::lines::{LineReader, PhysicalLine};
use crate::options::{HeaderMode, ParseOptions, DEFAULT_COLUMNS};
use crate::stats::compute_metrics;
use crate::types::{Compression, DetectionResult, FormatTag, Record, Schema};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const READ_BUFFER_SIZE: usize = 64 * 1024;

type Source = LineReader<BufReader<Box<dyn Read + Send>>>;

/// Streaming reader for CSV, TSV and other delimited text
///
/// Records are produced one at a time; memory use is bounded by the read
/// buffer, the detection sample and the row being assembled. Compressed input
/// (gzip, zstd, bzip2, xz, and ZIP archives on disk) is detected from its
/// leading bytes and decoded transparently.
///
/// # Examples
///
/// ```no_run
/// use dsvstream::dsv_reader::DsvReader;
/// use dsvstream::options::ParseOptions;
///
/// let mut reader = DsvReader::open("genes.tsv.gz", ParseOptions::tsv()).unwrap();
///
/// for record in reader.records() {
///     let record = record.unwrap();
///     println!("{:?} at line {}", record.get("gene"), record.line());
/// }
/// ```
///
/// # Error handling
///
/// Without an error handler the first malformed row ends the parse with an
/// error. With one, row errors are passed to it and parsing continues.
///
/// ```no_run
/// use dsvstream::dsv_reader::DsvReader;
/// use dsvstream::options::ParseOptions;
///
/// let options = ParseOptions::default()
///     .auto_detect(true)
///     .on_error(|err| eprintln!("skipped: {}", err));
/// let mut reader = DsvReader::open("messy.csv", options).unwrap();
/// let records: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
/// println!("{} records, {} skipped", records.len(), reader.error_count());
/// ```
pub struct DsvReader {
    // Input
    source: Option<Source>,
    replay: VecDeque<PhysicalLine>,
    compression: Compression,

    // Parser
    options: ParseOptions,
    assembler: Option<RowAssembler>,
    state: ParserState,
    pending: VecDeque<Result<AssembledRow>>,

    // Resolved format
    dialect: Option<Dialect>,
    detection: Option<DetectionResult>,
    format: FormatTag,
    schema: Option<Arc<Schema>>,
    sequence_index: Option<Option<usize>>,

    // Progress
    record_count: u64,
    error_count: u64,
    finished: bool,
}

impl DsvReader {
    /// Open a file, detecting compression from its leading bytes
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dsvstream::dsv_reader::DsvReader;
    /// use dsvstream::options::ParseOptions;
    ///
    /// // Plain, gzip, zstd, bzip2, xz or zip: the name does not matter
    /// let reader = DsvReader::open("samples.csv", ParseOptions::default()).unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let file_error = |source: io::Error| DsvError::FileError {
            path: path.to_path_buf(),
            source,
        };

        if path.is_dir() {
            return Err(file_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path is a directory",
            )));
        }

        let file = File::open(path).map_err(file_error)?;
        let mut peek = PeekReader::new(file);
        let found = sniff_compression(&mut peek).map_err(file_error)?;
        let compression = if found.is_confident() {
            found.format
        } else {
            Compression::None
        };

        if compression == Compression::Zip {
            drop(peek);
            let data = read_zip_entry(path)?;
            return Ok(Self::build(
                Box::new(Cursor::new(data)),
                Compression::Zip,
                options,
            ));
        }

        if compression != Compression::None {
            tracing::debug!(path = %path.display(), format = %compression, "decompressing input");
        }
        let source = decoder_for(compression, peek)?;
        Ok(Self::build(source, compression, options))
    }

    /// Parse in-memory text
    ///
    /// # Examples
    ///
    /// ```
    /// use dsvstream::dsv_reader::DsvReader;
    /// use dsvstream::options::ParseOptions;
    ///
    /// let mut reader = DsvReader::from_text("gene,value\nTP53,5.2\n", ParseOptions::default()).unwrap();
    /// let record = reader.read_record().unwrap().unwrap();
    /// assert_eq!(record.get("gene"), Some("TP53"));
    /// ```
    pub fn from_text(text: &str, options: ParseOptions) -> Result<Self> {
        options.validate()?;
        let source: Box<dyn Read + Send> = Box::new(Cursor::new(text.as_bytes().to_vec()));
        Ok(Self::build(source, Compression::None, options))
    }

    /// Parse an arbitrary byte stream, decompressing it when recognized
    ///
    /// ZIP archives need random access and are rejected here; use
    /// [`DsvReader::open`].
    pub fn from_reader<R: Read + Send + 'static>(reader: R, options: ParseOptions) -> Result<Self> {
        options.validate()?;
        let (compression, source) = open_decompressed(reader)?;
        Ok(Self::build(source, compression, options))
    }

    fn build(source: Box<dyn Read + Send>, compression: Compression, options: ParseOptions) -> Self {
        let lines = LineReader::new(
            BufReader::with_capacity(READ_BUFFER_SIZE, source),
            options.max_row_size,
        );
        DsvReader {
            source: Some(lines),
            replay: VecDeque::new(),
            compression,
            options,
            assembler: None,
            state: ParserState::default(),
            pending: VecDeque::new(),
            dialect: None,
            detection: None,
            format: FormatTag::Csv,
            schema: None,
            sequence_index: None,
            record_count: 0,
            error_count: 0,
            finished: false,
        }
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` at end of input or once the abort signal is set.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dsvstream::dsv_reader::DsvReader;
    /// use dsvstream::options::ParseOptions;
    ///
    /// let mut reader = DsvReader::open("data.csv", ParseOptions::default()).unwrap();
    ///
    /// while let Some(record) = reader.read_record().unwrap() {
    ///     println!("{:?}", record.values());
    /// }
    /// ```
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        if self.assembler.is_none() {
            if self.finished {
                return Ok(None);
            }
            if let Err(e) = self.resolve() {
                self.release();
                return Err(e);
            }
        }

        loop {
            if let Some(result) = self.pending.pop_front() {
                match result {
                    Ok(AssembledRow::Header(names)) => {
                        self.schema = Some(Arc::new(Schema::new(names)));
                    }
                    Ok(AssembledRow::Data { line, fields }) => {
                        if self.is_aborted() {
                            tracing::debug!(records = self.record_count, "parse aborted");
                            self.release();
                            return Ok(None);
                        }
                        let record = self.build_record(line, fields);
                        self.record_count += 1;
                        return Ok(Some(record));
                    }
                    Err(err) => self.handle_error(err)?,
                }
                continue;
            }

            if self.finished {
                return Ok(None);
            }
            if self.is_aborted() {
                self.release();
                return Ok(None);
            }

            let next = match self.next_physical() {
                Ok(next) => next,
                Err(e) => {
                    self.release();
                    return Err(e);
                }
            };
            let Some(assembler) = self.assembler.as_ref() else {
                return Ok(None);
            };
            match next {
                Some(PhysicalLine {
                    text,
                    overflow: Some(actual),
                    ..
                }) => assembler.reject_line(&mut self.state, &text, actual, &mut self.pending),
                Some(line) => assembler.push_terminated(
                    &mut self.state,
                    &line.text,
                    line.terminator,
                    &mut self.pending,
                ),
                None => {
                    let recover = self.options.on_error.is_some();
                    assembler.finish(&mut self.state, recover, &mut self.pending);
                    self.finished = true;
                    self.source = None;
                }
            }
        }
    }

    /// Get iterator over records
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dsvstream::dsv_reader::DsvReader;
    /// use dsvstream::options::ParseOptions;
    ///
    /// let mut reader = DsvReader::open("data.csv", ParseOptions::default()).unwrap();
    ///
    /// for record in reader.records() {
    ///     let record = record.unwrap();
    ///     println!("{:?}", record.to_map());
    /// }
    /// ```
    pub fn records(&mut self) -> RecordIterator<'_> {
        RecordIterator { reader: self }
    }

    /// Column names, once known
    pub fn headers(&self) -> Option<&[String]> {
        self.schema.as_deref().map(Schema::names)
    }

    /// Shared schema, once known
    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    /// Dialect in use, once resolved
    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// Detection outcome when auto-detection ran
    pub fn detection(&self) -> Option<&DetectionResult> {
        self.detection.as_ref()
    }

    /// Compression found on the input
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Get the number of records read so far
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Number of row errors passed to the error handler
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Last physical line consumed (1-based)
    pub fn line_number(&self) -> usize {
        self.state.current_line()
    }

    /// Resolve delimiter and header mode, sampling the input if needed
    fn resolve(&mut self) -> Result<()> {
        let detect_delimiter = self.options.delimiter.is_none() && self.options.auto_detect_delimiter;
        let detect_headers = self.options.header == HeaderMode::Detect;

        if detect_delimiter || detect_headers {
            let mut bytes = 0usize;
            while self.replay.len() < MAX_DETECTION_LINES && bytes < MAX_DETECTION_BYTES {
                match self.read_source()? {
                    Some(line) => {
                        bytes += line.text.len() + 1;
                        self.replay.push_back(line);
                    }
                    None => break,
                }
            }

            let sample: Vec<&str> = self
                .replay
                .iter()
                .filter(|l| l.overflow.is_none())
                .map(|l| l.text.as_str())
                .collect();
            let detector =
                FormatDetector::with_strategy(DefaultHeuristics::with_quote(self.options.quote))
                    .candidates(&self.options.candidates)
                    .comment_prefix(
                        self.options
                            .skip_comments
                            .then_some(self.options.comment_prefix.as_str()),
                    );
            let known = if detect_delimiter {
                None
            } else {
                Some(self.options.delimiter.unwrap_or(','))
            };
            let mut result = detector.analyze(&sample, known);
            result.compression = self.compression;
            self.detection = Some(result);
        }

        let delimiter = self
            .options
            .delimiter
            .or_else(|| self.detection.as_ref().map(|d| d.delimiter))
            .unwrap_or(',');
        let dialect = self.options.dialect_for(delimiter);
        dialect.validate()?;

        self.state = match &self.options.header {
            HeaderMode::FirstRow => ParserState::new(true),
            HeaderMode::Absent => ParserState::new(false),
            HeaderMode::Detect => {
                ParserState::new(self.detection.as_ref().is_some_and(|d| d.has_headers))
            }
            HeaderMode::Columns(names) => {
                self.schema = Some(Arc::new(Schema::new(names.iter().cloned())));
                ParserState::with_columns(names.clone())
            }
        };

        self.format = FormatTag::from_delimiter(delimiter);
        self.dialect = Some(dialect);
        self.assembler = Some(RowAssembler::new(AssemblerConfig::from_options(
            &self.options,
            dialect,
        )));
        Ok(())
    }

    fn read_source(&mut self) -> Result<Option<PhysicalLine>> {
        match self.source.as_mut() {
            Some(source) => source.next_line().map_err(DsvError::from_read_error),
            None => Ok(None),
        }
    }

    fn next_physical(&mut self) -> Result<Option<PhysicalLine>> {
        match self.replay.pop_front() {
            Some(line) => Ok(Some(line)),
            None => self.read_source(),
        }
    }

    fn handle_error(&mut self, err: DsvError) -> Result<()> {
        if err.is_recoverable() {
            if let Some(handler) = &self.options.on_error {
                handler(&err);
                self.error_count += 1;
                return Ok(());
            }
        }
        self.release();
        Err(err)
    }

    fn is_aborted(&self) -> bool {
        self.options
            .abort
            .as_ref()
            .is_some_and(|signal| signal.load(Ordering::Acquire))
    }

    /// Drop the input and stop producing records
    fn release(&mut self) {
        self.source = None;
        self.replay.clear();
        self.pending.clear();
        self.finished = true;
    }

    fn build_record(&mut self, line: usize, fields: Vec<String>) -> Record {
        let schema = match self.schema.clone() {
            Some(schema) => schema,
            None => {
                let schema = Arc::new(synthetic_schema(fields.len()));
                self.schema = Some(Arc::clone(&schema));
                schema
            }
        };

        let metrics = if self.options.stats.enabled {
            let index = *self
                .sequence_index
                .get_or_insert_with(|| sequence_column(&schema, self.options.stats.sequence_column.as_deref()));
            index
                .and_then(|i| fields.get(i))
                .map(|seq| compute_metrics(seq, &self.options.stats))
        } else {
            None
        };

        Record::new(schema, fields, line, self.format, metrics)
    }
}

/// Default names for headerless input
fn synthetic_schema(width: usize) -> Schema {
    Schema::new((0..width).map(|i| match DEFAULT_COLUMNS.get(i) {
        Some(name) => name.to_string(),
        None => format!("column_{}", i + 1),
    }))
}

fn sequence_column(schema: &Schema, configured: Option<&str>) -> Option<usize> {
    match configured {
        Some(name) => schema
            .index_of(name)
            .or_else(|| schema.index_of_ignore_case(name)),
        None => schema
            .index_of_ignore_case("sequence")
            .or_else(|| schema.index_of_ignore_case("seq")),
    }
}

/// Iterator over records
pub struct RecordIterator<'a> {
    reader: &'a mut DsvReader,
}

impl<'a> Iterator for RecordIterator<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}
