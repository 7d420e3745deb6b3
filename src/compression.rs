//! Transparent decompression on read and optional compression on write
//!
//! Input compression is detected from magic bytes, never from the file name:
//! a [`PeekReader`] buffers the leading bytes, the signature is matched, and
//! the same reader (replaying the buffered bytes first) is handed to the
//! matching decoder. Output compression is selected explicitly or from the
//! destination suffix.

use crate::error::{DecompressionFailure, DsvError, Result};
use crate::types::Compression;
use s_zip::{CompressionMethod, StreamingZipWriter};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

/// Bytes needed to recognize every supported signature
pub const MAGIC_PEEK_LEN: usize = 6;

/// Minimum signature confidence before a decoder is applied
pub const COMPRESSION_CONFIDENCE_THRESHOLD: f64 = 0.8;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const BZIP2_MAGIC: [u8; 2] = *b"BZ";
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Reader that can look ahead without consuming
///
/// Peeked bytes are replayed before the rest of the source, so downstream
/// readers see the original stream.
pub struct PeekReader<R> {
    inner: R,
    buffer: Vec<u8>,
    pos: usize,
}

impl<R: Read> PeekReader<R> {
    /// Wrap a byte source
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pos: 0,
        }
    }

    /// Look at up to `n` leading bytes (fewer at EOF) without consuming them
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        let mut chunk = [0u8; 64];
        while self.buffer.len() - self.pos < n {
            let want = (n - (self.buffer.len() - self.pos)).min(chunk.len());
            match self.inner.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(read) => self.buffer.extend_from_slice(&chunk[..read]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let end = (self.pos + n).min(self.buffer.len());
        Ok(&self.buffer[self.pos..end])
    }

    /// Bytes currently held for replay
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[self.pos..]
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.buffer.len() {
            let n = (self.buffer.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
            self.pos += n;
            if self.pos == self.buffer.len() {
                self.buffer.clear();
                self.pos = 0;
            }
            return Ok(n);
        }
        self.inner.read(buf)
    }
}

/// A recognized signature and how sure we are about it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionMatch {
    /// Container format
    pub format: Compression,
    /// Signature strength in `[0, 1]`
    pub confidence: f64,
}

impl CompressionMatch {
    fn none() -> Self {
        CompressionMatch {
            format: Compression::None,
            confidence: 1.0,
        }
    }

    /// Whether the match is strong enough to apply a decoder
    pub fn is_confident(&self) -> bool {
        self.confidence > COMPRESSION_CONFIDENCE_THRESHOLD
    }
}

/// Match leading bytes against known compression signatures
///
/// # Examples
///
/// ```
/// use dsvstream::compression::detect_compression;
/// use dsvstream::types::Compression;
///
/// let m = detect_compression(&[0x1F, 0x8B, 0x08, 0x00]);
/// assert_eq!(m.format, Compression::Gzip);
/// assert!(m.is_confident());
///
/// assert_eq!(detect_compression(b"id,seq\n").format, Compression::None);
/// ```
pub fn detect_compression(bytes: &[u8]) -> CompressionMatch {
    if bytes.starts_with(&XZ_MAGIC) {
        return CompressionMatch {
            format: Compression::Xz,
            confidence: 1.0,
        };
    }
    if bytes.starts_with(&ZSTD_MAGIC) {
        return CompressionMatch {
            format: Compression::Zstd,
            confidence: 1.0,
        };
    }
    if bytes.starts_with(&GZIP_MAGIC) {
        // Compression method byte 8 = deflate
        let confidence = if bytes.get(2) == Some(&0x08) { 0.95 } else { 0.5 };
        return CompressionMatch {
            format: Compression::Gzip,
            confidence,
        };
    }
    if bytes.starts_with(&ZIP_MAGIC) {
        return CompressionMatch {
            format: Compression::Zip,
            confidence: 0.9,
        };
    }
    if bytes.starts_with(&BZIP2_MAGIC) {
        // "BZh" followed by block size '1'..'9'
        let versioned = bytes.get(2) == Some(&b'h')
            && bytes.get(3).is_some_and(|b| (b'1'..=b'9').contains(b));
        let confidence = if versioned { 0.95 } else { 0.5 };
        return CompressionMatch {
            format: Compression::Bzip2,
            confidence,
        };
    }
    CompressionMatch::none()
}

/// Peek a source and match its signature
pub fn sniff_compression<R: Read>(reader: &mut PeekReader<R>) -> io::Result<CompressionMatch> {
    let head = reader.peek(MAGIC_PEEK_LEN)?;
    Ok(detect_compression(head))
}

/// Tags decoder errors so they surface as `CompressionError`
struct TaggedDecoder<R> {
    format: Compression,
    inner: R,
}

impl<R: Read> Read for TaggedDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::Interrupted {
                return e;
            }
            io::Error::new(
                io::ErrorKind::InvalidData,
                DecompressionFailure {
                    format: self.format,
                    message: e.to_string(),
                },
            )
        })
    }
}

/// Wrap `reader` in the decoder for `format`
pub fn decoder_for<R>(format: Compression, reader: R) -> Result<Box<dyn Read + Send>>
where
    R: Read + Send + 'static,
{
    let decoder: Box<dyn Read + Send> = match format {
        Compression::None => return Ok(Box::new(reader)),
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader).map_err(|e| {
            DsvError::CompressionError {
                format,
                message: e.to_string(),
            }
        })?),
        Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
        Compression::Zip => {
            return Err(DsvError::CompressionError {
                format,
                message: "ZIP archives can only be read from a file path".to_string(),
            })
        }
    };

    Ok(Box::new(TaggedDecoder {
        format,
        inner: decoder,
    }))
}

/// Detect compression on a byte source and decode it when recognized
///
/// Returns the detected format and a reader over the decoded bytes. Weak
/// signatures (below the confidence threshold) pass through unchanged.
pub fn open_decompressed<R>(reader: R) -> Result<(Compression, Box<dyn Read + Send>)>
where
    R: Read + Send + 'static,
{
    let mut peek = PeekReader::new(reader);
    let found = sniff_compression(&mut peek).map_err(DsvError::IoError)?;

    if found.format == Compression::None || !found.is_confident() {
        return Ok((Compression::None, Box::new(peek)));
    }

    tracing::debug!(format = %found.format, confidence = found.confidence, "decompressing input");
    let decoded = decoder_for(found.format, peek)?;
    Ok((found.format, decoded))
}

/// Read the first tabular entry of a ZIP archive
pub(crate) fn read_zip_entry(path: &Path) -> Result<Vec<u8>> {
    let mut zip = s_zip::StreamingZipReader::open(path).map_err(|e| DsvError::CompressionError {
        format: Compression::Zip,
        message: format!("Failed to open ZIP: {}", e),
    })?;

    // Find first table entry
    let entry_name = zip
        .entries()
        .iter()
        .find(|e| {
            let name = e.name.to_ascii_lowercase();
            name.ends_with(".csv") || name.ends_with(".tsv") || name.ends_with(".txt")
        })
        .or_else(|| zip.entries().first())
        .ok_or_else(|| DsvError::CompressionError {
            format: Compression::Zip,
            message: "No entry found in archive".to_string(),
        })?
        .name
        .clone();

    tracing::debug!(entry = %entry_name, "reading ZIP entry");
    zip.read_entry_by_name(&entry_name)
        .map_err(|e| DsvError::CompressionError {
            format: Compression::Zip,
            message: format!("Failed to read ZIP entry: {}", e),
        })
}

/// Output sink, optionally compressing
pub(crate) enum CompressedSink {
    Plain(BufWriter<Box<dyn Write + Send>>),
    Gzip(flate2::write::GzEncoder<BufWriter<Box<dyn Write + Send>>>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<Box<dyn Write + Send>>>),
    Bzip2(bzip2::write::BzEncoder<BufWriter<Box<dyn Write + Send>>>),
    Xz(xz2::write::XzEncoder<BufWriter<Box<dyn Write + Send>>>),
    Zip(StreamingZipWriter<File>),
}

impl CompressedSink {
    /// Wrap a writer in a stream compressor
    ///
    /// ZIP needs a file path; use [`CompressedSink::zip`].
    pub(crate) fn new(
        writer: Box<dyn Write + Send>,
        format: Compression,
        level: u32,
    ) -> Result<Self> {
        let writer = BufWriter::new(writer);
        let sink = match format {
            Compression::None => CompressedSink::Plain(writer),
            Compression::Gzip => CompressedSink::Gzip(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::new(level),
            )),
            Compression::Zstd => CompressedSink::Zstd(
                zstd::stream::write::Encoder::new(writer, level as i32)
                    .map_err(|e| DsvError::WriteError(format!("Failed to start zstd: {}", e)))?,
            ),
            Compression::Bzip2 => CompressedSink::Bzip2(bzip2::write::BzEncoder::new(
                writer,
                bzip2::Compression::new(level),
            )),
            Compression::Xz => CompressedSink::Xz(xz2::write::XzEncoder::new(writer, level)),
            Compression::Zip => {
                return Err(DsvError::ValidationError(
                    "ZIP output requires a file path".to_string(),
                ))
            }
        };
        Ok(sink)
    }

    /// ZIP archive with a single entry
    pub(crate) fn zip(path: &Path, level: u32) -> Result<Self> {
        let mut zip = StreamingZipWriter::with_method(path, CompressionMethod::Deflate, level)
            .map_err(|e| DsvError::WriteError(format!("Failed to create ZIP writer: {}", e)))?;

        // Entry name: archive name without the .zip suffix
        let entry_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.contains('.') {
                    s.to_string()
                } else {
                    format!("{}.csv", s)
                }
            })
            .unwrap_or_else(|| "data.csv".to_string());

        zip.start_entry(&entry_name)
            .map_err(|e| DsvError::WriteError(format!("Failed to start ZIP entry: {}", e)))?;
        Ok(CompressedSink::Zip(zip))
    }

    pub(crate) fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let written = match self {
            CompressedSink::Plain(w) => w.write_all(data),
            CompressedSink::Gzip(w) => w.write_all(data),
            CompressedSink::Zstd(w) => w.write_all(data),
            CompressedSink::Bzip2(w) => w.write_all(data),
            CompressedSink::Xz(w) => w.write_all(data),
            CompressedSink::Zip(zip) => {
                return zip
                    .write_data(data)
                    .map_err(|e| DsvError::WriteError(format!("Failed to write to ZIP: {}", e)))
            }
        };
        written.map_err(|e| DsvError::WriteError(format!("Failed to write output: {}", e)))
    }

    /// Finish the compressed stream and flush the destination
    pub(crate) fn finish(self) -> Result<()> {
        let writer = match self {
            CompressedSink::Plain(w) => Ok(w),
            CompressedSink::Gzip(w) => w.finish(),
            CompressedSink::Zstd(w) => w.finish(),
            CompressedSink::Bzip2(w) => w.finish(),
            CompressedSink::Xz(w) => w.finish(),
            CompressedSink::Zip(zip) => {
                zip.finish()
                    .map_err(|e| DsvError::WriteError(format!("Failed to finish ZIP: {}", e)))?;
                return Ok(());
            }
        };
        let mut writer = writer
            .map_err(|e| DsvError::WriteError(format!("Failed to finish compression: {}", e)))?;
        writer
            .flush()
            .map_err(|e| DsvError::WriteError(format!("Failed to flush output: {}", e)))
    }
}
