//! # dsvstream
//!
//! Streaming reader and writer for delimiter-separated tables (CSV, TSV and
//! any single-character delimiter), tuned for bioinformatics exports.
//!
//! **Features:**
//! - Constant memory: records are parsed one at a time from any byte source
//! - Multi-line quoted fields, doubled (`""`) or prefix (`\"`) quote escaping
//! - Transparent decompression of gzip, zstd, bzip2, xz and ZIP input,
//!   detected from magic bytes rather than file names
//! - Delimiter and header detection behind a pluggable strategy
//! - Ragged-row policies and per-row error recovery through a callback
//! - Optional GC content, GC skew and base composition per record
//! - Excel-safe output that quotes gene symbols like `SEPT1` and `MARCH1`
//!
//! ## Quick start
//!
//! ```no_run
//! use dsvstream::{DsvReader, DsvWriter, ParseOptions, WriteOptions};
//!
//! let options = ParseOptions::default().auto_detect(true).compute_stats(true);
//! let mut reader = DsvReader::open("reads.tsv.gz", options).unwrap();
//!
//! let mut writer = DsvWriter::with_options(
//!     "reads_annotated.csv.zst",
//!     WriteOptions::default().include_metrics(true).protect_from_excel(true),
//! )
//! .unwrap();
//!
//! for record in reader.records() {
//!     writer.write_record(&record.unwrap()).unwrap();
//! }
//! writer.save().unwrap();
//! ```

pub mod assembler;
pub mod compression;
pub mod detect;
pub mod dsv;
pub mod dsv_reader;
pub mod dsv_writer;
pub mod error;
pub mod lines;
pub mod options;
pub mod stats;
pub mod types;

pub use detect::{DetectionStrategy, FormatDetector};
pub use dsv::{Dialect, ExcelProtector};
pub use dsv_reader::DsvReader;
pub use dsv_writer::{format_records, format_rows, DsvWriter};
pub use error::{DsvError, Result};
pub use options::{HeaderMode, ParseOptions, WriteOptions};
pub use types::{
    Compression, DetectionResult, FormatTag, LineEnding, RaggedRowPolicy, Record, RecordMetrics,
    Schema,
};
