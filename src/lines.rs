//! Physical line splitting over a buffered byte source
//!
//! Lines end at `\n`, `\r\n` or a lone `\r`. A `\r\n` pair split across two
//! buffer refills is still treated as one terminator, and each line records
//! which terminator ended it. Text is decoded lossily
//! as UTF-8, a byte-order mark is removed from the first line and NUL
//! characters are removed from every line.

use crate::types::LineEnding;
use std::io::{self, BufRead};

const BOM: char = '\u{FEFF}';

/// One physical line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalLine {
    /// Decoded text without the terminator
    pub text: String,
    /// Full byte length when the line was longer than the reader's cap;
    /// `text` then only holds the leading part
    pub overflow: Option<usize>,
    /// Terminator that ended the line; `None` for a final unterminated line
    pub terminator: Option<LineEnding>,
}

/// Streaming line splitter with a per-line memory cap
pub struct LineReader<R> {
    inner: R,
    buffer: Vec<u8>,
    max_line_bytes: usize,
    lines_read: usize,
}

impl<R: BufRead> LineReader<R> {
    /// Create a line reader that keeps at most `max_line_bytes` of one line
    pub fn new(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(1024),
            max_line_bytes,
            lines_read: 0,
        }
    }

    /// Number of lines returned so far
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Read the next line
    ///
    /// Returns `Ok(None)` at EOF. A trailing terminator does not produce an
    /// extra empty line.
    pub fn next_line(&mut self) -> io::Result<Option<PhysicalLine>> {
        self.buffer.clear();
        let mut total = 0usize;
        let mut saw_data = false;
        let mut terminator = None;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            if available.is_empty() {
                if !saw_data {
                    return Ok(None);
                }
                break;
            }

            saw_data = true;
            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(pos) => {
                    let is_cr = available[pos] == b'\r';
                    let room = self.max_line_bytes.saturating_sub(self.buffer.len());
                    self.buffer
                        .extend_from_slice(&available[..pos.min(room)]);
                    total += pos;
                    self.inner.consume(pos + 1);
                    terminator = Some(if is_cr && self.next_is_lf()? {
                        self.inner.consume(1);
                        LineEnding::CrLf
                    } else if is_cr {
                        LineEnding::Cr
                    } else {
                        LineEnding::Lf
                    });
                    break;
                }
                None => {
                    let len = available.len();
                    let room = self.max_line_bytes.saturating_sub(self.buffer.len());
                    self.buffer.extend_from_slice(&available[..len.min(room)]);
                    total += len;
                    self.inner.consume(len);
                }
            }
        }

        self.lines_read += 1;
        let mut text = String::from_utf8_lossy(&self.buffer).into_owned();
        if self.lines_read == 1 && text.starts_with(BOM) {
            text.drain(..BOM.len_utf8());
        }
        if text.contains('\0') {
            text.retain(|c| c != '\0');
        }

        Ok(Some(PhysicalLine {
            text,
            overflow: (total > self.max_line_bytes).then_some(total),
            terminator,
        }))
    }

    /// Peek past a `\r`, refilling the buffer if it ended there
    fn next_is_lf(&mut self) -> io::Result<bool> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(buf.first() == Some(&b'\n')),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    fn collect(data: &[u8], capacity: usize) -> Vec<String> {
        let reader = BufReader::with_capacity(capacity, Cursor::new(data.to_vec()));
        let mut lines = LineReader::new(reader, 1024);
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().unwrap() {
            out.push(line.text);
        }
        out
    }

    #[test]
    fn test_mixed_line_endings() {
        assert_eq!(collect(b"a\nb\r\nc\rd", 64), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_crlf_across_buffer_boundary() {
        // Capacity 2 forces "a\r" and "\nb" into separate refills
        assert_eq!(collect(b"a\r\nb\r\n", 2), vec!["a", "b"]);
    }

    #[test]
    fn test_terminators_are_recorded() {
        for capacity in [2, 64] {
            let reader = BufReader::with_capacity(capacity, Cursor::new(b"a\r\nb\rc\nd".to_vec()));
            let mut lines = LineReader::new(reader, 1024);
            let mut seen = Vec::new();
            while let Some(line) = lines.next_line().unwrap() {
                seen.push((line.text, line.terminator));
            }
            assert_eq!(
                seen,
                vec![
                    ("a".to_string(), Some(LineEnding::CrLf)),
                    ("b".to_string(), Some(LineEnding::Cr)),
                    ("c".to_string(), Some(LineEnding::Lf)),
                    ("d".to_string(), None),
                ]
            );
        }
    }

    #[test]
    fn test_trailing_newline_and_blank_lines() {
        assert_eq!(collect(b"a\n\nb\n", 64), vec!["a", "", "b"]);
        assert!(collect(b"", 64).is_empty());
    }

    #[test]
    fn test_bom_and_nul_stripping() {
        let data = "\u{FEFF}id,seq\nx\0y,ACGT\n".as_bytes();
        assert_eq!(collect(data, 64), vec!["id,seq", "xy,ACGT"]);
    }

    #[test]
    fn test_overflow_is_reported_and_bounded() {
        let data = format!("{}\nshort\n", "x".repeat(100));
        let reader = BufReader::with_capacity(16, Cursor::new(data.into_bytes()));
        let mut lines = LineReader::new(reader, 10);

        let long = lines.next_line().unwrap().unwrap();
        assert_eq!(long.overflow, Some(100));
        assert_eq!(long.text.len(), 10);

        let short = lines.next_line().unwrap().unwrap();
        assert_eq!(short.text, "short");
        assert_eq!(short.overflow, None);
    }
}
