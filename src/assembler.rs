//! Logical row assembly from physical lines
//!
//! A quoted field may contain line breaks, so one logical row can span several
//! physical lines. The assembler accumulates lines until the unescaped quote
//! count is even, tokenizes the row, validates field sizes and reconciles the
//! column count. Every outcome is pushed as an explicit `Result` so the caller
//! decides whether an error is fatal.
//!
//! All mutable parse progress lives in [`ParserState`], which the caller owns
//! and passes in by `&mut`. The assembler itself only holds configuration.

use crate::dsv::{Dialect, RowTokenizer};
use crate::error::{DsvError, Result, SizeLimitKind};
use crate::options::ParseOptions;
use crate::types::{LineEnding, RaggedRowPolicy};
use std::collections::VecDeque;

/// Progress of one parse
#[derive(Debug, Clone, Default)]
pub struct ParserState {
    accumulated: String,
    row_start_line: usize,
    in_multi_line_field: bool,
    lines_in_current_field: usize,
    current_line: usize,
    line_break: LineEnding,
    header_processed: bool,
    expected_columns: Option<usize>,
    headers: Option<Vec<String>>,
}

impl ParserState {
    /// Fresh state; `capture_header` makes the first row the header
    pub fn new(capture_header: bool) -> Self {
        ParserState {
            header_processed: !capture_header,
            ..Default::default()
        }
    }

    /// Fresh state with caller-supplied column names
    pub fn with_columns(names: Vec<String>) -> Self {
        ParserState {
            header_processed: true,
            expected_columns: Some(names.len()),
            headers: Some(names),
            ..Default::default()
        }
    }

    /// Text of the row being assembled
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Line where the pending row started
    pub fn row_start_line(&self) -> usize {
        self.row_start_line
    }

    /// Whether a quoted field is still open
    pub fn in_multi_line_field(&self) -> bool {
        self.in_multi_line_field
    }

    /// Physical lines in the pending row
    pub fn lines_in_current_field(&self) -> usize {
        self.lines_in_current_field
    }

    /// Last physical line consumed (1-based)
    pub fn current_line(&self) -> usize {
        self.current_line
    }

    /// Whether the header row (if any) has been captured
    pub fn header_processed(&self) -> bool {
        self.header_processed
    }

    /// Column count fixed by the header or first data row
    pub fn expected_columns(&self) -> Option<usize> {
        self.expected_columns
    }

    /// Captured or supplied column names
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    fn clear_row(&mut self) {
        self.accumulated.clear();
        self.in_multi_line_field = false;
        self.lines_in_current_field = 0;
    }
}

/// Settings consumed by [`RowAssembler`]
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub dialect: Dialect,
    pub skip_empty_lines: bool,
    pub skip_comments: bool,
    pub comment_prefix: String,
    pub ragged_rows: RaggedRowPolicy,
    pub max_field_lines: usize,
    pub max_field_size: usize,
    pub max_row_size: usize,
}

impl AssemblerConfig {
    /// Assembler settings for a resolved dialect
    pub fn from_options(options: &ParseOptions, dialect: Dialect) -> Self {
        AssemblerConfig {
            dialect,
            skip_empty_lines: options.skip_empty_lines,
            skip_comments: options.skip_comments,
            comment_prefix: options.comment_prefix.clone(),
            ragged_rows: options.ragged_rows,
            max_field_lines: options.max_field_lines,
            max_field_size: options.max_field_size,
            max_row_size: options.max_row_size,
        }
    }
}

/// A completed logical row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembledRow {
    /// Captured header names
    Header(Vec<String>),
    /// Data row and the line it starts on
    Data { line: usize, fields: Vec<String> },
}

/// Turns physical lines into logical rows
#[derive(Debug, Clone)]
pub struct RowAssembler {
    config: AssemblerConfig,
    tokenizer: RowTokenizer,
}

impl RowAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        let tokenizer = RowTokenizer::from_dialect(&config.dialect);
        RowAssembler { config, tokenizer }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Feed one `\n`-terminated physical line
    ///
    /// Completed rows and row errors are appended to `out` in input order.
    pub fn push_line(
        &self,
        state: &mut ParserState,
        line: &str,
        out: &mut VecDeque<Result<AssembledRow>>,
    ) {
        self.push_terminated(state, line, Some(LineEnding::Lf), out);
    }

    /// Feed one physical line together with the terminator that ended it
    ///
    /// The terminator is kept inside a quoted field that continues on the
    /// next line, so `"a\r\nb"` reads back with its `\r\n`.
    pub fn push_terminated(
        &self,
        state: &mut ParserState,
        line: &str,
        terminator: Option<LineEnding>,
        out: &mut VecDeque<Result<AssembledRow>>,
    ) {
        state.current_line += 1;
        let previous = std::mem::replace(&mut state.line_break, terminator.unwrap_or_default());

        if state.in_multi_line_field {
            state.accumulated.push_str(previous.as_str());
            state.accumulated.push_str(line);
            state.lines_in_current_field += 1;
        } else {
            // Blank and comment lines are content inside an open quoted field
            if line.is_empty() || self.is_skippable(line) {
                return;
            }
            state.accumulated.clear();
            state.accumulated.push_str(line);
            state.row_start_line = state.current_line;
            state.lines_in_current_field = 1;
        }

        if state.accumulated.len() > self.config.max_row_size {
            out.push_back(Err(DsvError::size_limit(
                state.row_start_line,
                SizeLimitKind::Row,
                self.config.max_row_size,
                state.accumulated.len(),
                &state.accumulated,
            )));
            state.clear_row();
            return;
        }

        if self.tokenizer.has_balanced_quotes(&state.accumulated) {
            if let Ok(fields) = self.tokenizer.tokenize(&state.accumulated) {
                let text = std::mem::take(&mut state.accumulated);
                let start = state.row_start_line;
                state.clear_row();
                self.complete_row(state, fields, start, &text, out);
                return;
            }
        }

        state.in_multi_line_field = true;
        if state.lines_in_current_field > self.config.max_field_lines.max(1) {
            out.push_back(Err(DsvError::format(
                state.row_start_line,
                format!(
                    "quoted field spans more than {} lines",
                    self.config.max_field_lines
                ),
                &state.accumulated,
            )));
            state.clear_row();
            // Resynchronize: the current line starts a fresh row
            state.current_line -= 1;
            self.push_terminated(state, line, terminator, out);
        }
    }

    /// Account for a physical line that exceeded the line buffer cap
    ///
    /// Any row in progress is discarded along with it.
    pub fn reject_line(
        &self,
        state: &mut ParserState,
        text: &str,
        actual: usize,
        out: &mut VecDeque<Result<AssembledRow>>,
    ) {
        state.current_line += 1;
        let (line, actual) = if state.in_multi_line_field {
            (state.row_start_line, state.accumulated.len() + 1 + actual)
        } else {
            (state.current_line, actual)
        };
        out.push_back(Err(DsvError::size_limit(
            line,
            SizeLimitKind::Row,
            self.config.max_row_size,
            actual,
            text,
        )));
        state.clear_row();
    }

    /// Flush at end of input
    ///
    /// An unterminated quoted field is a `FormatError`. With `recover` set the
    /// whole row is retried as-is; if that still fails the error is reported
    /// and each following physical line is parsed on its own.
    pub fn finish(
        &self,
        state: &mut ParserState,
        recover: bool,
        out: &mut VecDeque<Result<AssembledRow>>,
    ) {
        if !state.in_multi_line_field {
            return;
        }

        let text = std::mem::take(&mut state.accumulated);
        let start = state.row_start_line;
        state.clear_row();

        if recover {
            if let Ok(fields) = self.tokenizer.tokenize(&text) {
                self.complete_row(state, fields, start, &text, out);
                return;
            }
        }

        out.push_back(Err(DsvError::format(
            start,
            "unclosed quote at end of input",
            &text,
        )));
        if !recover {
            return;
        }

        for (offset, line) in physical_lines(&text).into_iter().enumerate().skip(1) {
            if line.is_empty() || self.is_skippable(line) {
                continue;
            }
            let line_no = start + offset;
            match self.tokenizer.tokenize(line) {
                Ok(fields) => self.complete_row(state, fields, line_no, line, out),
                Err(e) => out.push_back(Err(DsvError::format(line_no, e.to_string(), line))),
            }
        }
    }

    fn is_skippable(&self, line: &str) -> bool {
        if self.config.skip_empty_lines && line.trim().is_empty() {
            return true;
        }
        self.config.skip_comments
            && !self.config.comment_prefix.is_empty()
            && line.trim_start().starts_with(&self.config.comment_prefix)
    }

    fn complete_row(
        &self,
        state: &mut ParserState,
        fields: Vec<String>,
        line: usize,
        text: &str,
        out: &mut VecDeque<Result<AssembledRow>>,
    ) {
        if let Some(field) = fields
            .iter()
            .find(|f| f.len() > self.config.max_field_size)
        {
            out.push_back(Err(DsvError::size_limit(
                line,
                SizeLimitKind::Field,
                self.config.max_field_size,
                field.len(),
                field,
            )));
            return;
        }

        if !state.header_processed {
            state.header_processed = true;
            state.expected_columns = Some(fields.len());
            state.headers = Some(fields.clone());
            tracing::debug!(line, columns = fields.len(), "captured header row");
            out.push_back(Ok(AssembledRow::Header(fields)));
            return;
        }

        let expected = *state.expected_columns.get_or_insert(fields.len());
        let result = self
            .reconcile(fields, expected, line, text)
            .map(|fields| AssembledRow::Data { line, fields });
        out.push_back(result);
    }

    fn reconcile(
        &self,
        mut fields: Vec<String>,
        expected: usize,
        line: usize,
        text: &str,
    ) -> Result<Vec<String>> {
        let actual = fields.len();
        if actual == expected {
            return Ok(fields);
        }
        match self.config.ragged_rows {
            RaggedRowPolicy::Error => Err(DsvError::ragged(line, expected, actual, text)),
            RaggedRowPolicy::Pad | RaggedRowPolicy::Truncate => {
                tracing::trace!(line, expected, actual, "normalizing ragged row");
                fields.resize(expected, String::new());
                Ok(fields)
            }
            RaggedRowPolicy::Ignore => Ok(fields),
        }
    }
}

/// Split assembled text back into its physical lines
fn physical_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(|c| c == '\r' || c == '\n') {
        lines.push(&rest[..pos]);
        let width = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[pos + width..];
    }
    lines.push(rest);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(options: ParseOptions) -> RowAssembler {
        let dialect = options.dialect_for(options.delimiter.unwrap_or(','));
        RowAssembler::new(AssemblerConfig::from_options(&options, dialect))
    }

    fn run(
        assembler: &RowAssembler,
        state: &mut ParserState,
        lines: &[&str],
        recover: bool,
    ) -> Vec<Result<AssembledRow>> {
        let mut out = VecDeque::new();
        for line in lines {
            assembler.push_line(state, line, &mut out);
        }
        assembler.finish(state, recover, &mut out);
        out.into_iter().collect()
    }

    fn data(line: usize, fields: &[&str]) -> AssembledRow {
        AssembledRow::Data {
            line,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_header_then_rows() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(true);
        let rows = run(&asm, &mut state, &["gene,value", "TP53,1.5"], false);

        assert_eq!(
            rows[0].as_ref().unwrap(),
            &AssembledRow::Header(vec!["gene".into(), "value".into()])
        );
        assert_eq!(rows[1].as_ref().unwrap(), &data(2, &["TP53", "1.5"]));
        assert_eq!(state.expected_columns(), Some(2));
        assert_eq!(state.headers().map(|h| h.len()), Some(2));
    }

    #[test]
    fn test_multi_line_field_is_merged() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let rows = run(
            &asm,
            &mut state,
            &["id,\"first", "", "# not a comment", "last\",x", "2,b,c"],
            false,
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].as_ref().unwrap(),
            &data(1, &["id", "first\n\n# not a comment\nlast", "x"])
        );
        assert_eq!(rows[1].as_ref().unwrap(), &data(5, &["2", "b", "c"]));
        assert!(!state.in_multi_line_field());
        assert!(state.accumulated().is_empty());
    }

    #[test]
    fn test_multi_line_field_keeps_original_terminators() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let mut out = VecDeque::new();
        asm.push_terminated(&mut state, "1,\"a", Some(LineEnding::CrLf), &mut out);
        asm.push_terminated(&mut state, "b", Some(LineEnding::Cr), &mut out);
        asm.push_terminated(&mut state, "c\",x", Some(LineEnding::CrLf), &mut out);
        asm.push_terminated(&mut state, "2,d,y", None, &mut out);
        asm.finish(&mut state, false, &mut out);

        let rows: Vec<_> = out.into_iter().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_ref().unwrap(), &data(1, &["1", "a\r\nb\rc", "x"]));
        assert_eq!(rows[1].as_ref().unwrap(), &data(4, &["2", "d", "y"]));
    }

    #[test]
    fn test_end_of_input_recovery_splits_any_terminator() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let mut out = VecDeque::new();
        asm.push_terminated(&mut state, "x,\"open", Some(LineEnding::CrLf), &mut out);
        asm.push_terminated(&mut state, "c,d", Some(LineEnding::Cr), &mut out);
        asm.push_terminated(&mut state, "e,f", None, &mut out);
        asm.finish(&mut state, true, &mut out);

        let rows: Vec<_> = out.into_iter().collect();
        assert!(matches!(rows[0], Err(DsvError::FormatError { line: 1, .. })));
        assert_eq!(rows[1].as_ref().unwrap(), &data(2, &["c", "d"]));
        assert_eq!(rows[2].as_ref().unwrap(), &data(3, &["e", "f"]));
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let rows = run(&asm, &mut state, &["# header comment", "   ", "a,b", ""], false);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap(), &data(3, &["a", "b"]));
    }

    #[test]
    fn test_whitespace_line_kept_when_not_skipping() {
        let asm = assembler(ParseOptions::default().skip_empty_lines(false));
        let mut state = ParserState::new(false);
        let rows = run(&asm, &mut state, &[" ", ""], false);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap(), &data(1, &[" "]));
    }

    #[test]
    fn test_unclosed_quote_is_fatal_without_recovery() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let rows = run(&asm, &mut state, &["gene,\"unclosed quote"], false);

        assert_eq!(rows.len(), 1);
        match &rows[0] {
            Err(DsvError::FormatError { line, .. }) => assert_eq!(*line, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_end_of_input_recovery_reparses_following_lines() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let rows = run(
            &asm,
            &mut state,
            &["a,b", "x,\"open", "c,d", "e,f"],
            true,
        );

        assert_eq!(rows[0].as_ref().unwrap(), &data(1, &["a", "b"]));
        assert!(matches!(rows[1], Err(DsvError::FormatError { line: 2, .. })));
        assert_eq!(rows[2].as_ref().unwrap(), &data(3, &["c", "d"]));
        assert_eq!(rows[3].as_ref().unwrap(), &data(4, &["e", "f"]));
    }

    #[test]
    fn test_end_of_input_whole_row_retry() {
        // A literal quote inside an unquoted field unbalances the count but
        // still tokenizes
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let rows = run(&asm, &mut state, &["5\",x"], true);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap(), &data(1, &["5\"", "x"]));
    }

    #[test]
    fn test_max_field_lines_resynchronizes() {
        let asm = assembler(ParseOptions::default().max_field_lines(2));
        let mut state = ParserState::new(false);
        let rows = run(&asm, &mut state, &["a,\"open", "more", "b,c"], false);

        assert!(matches!(rows[0], Err(DsvError::FormatError { line: 1, .. })));
        assert_eq!(rows[1].as_ref().unwrap(), &data(3, &["b", "c"]));
        assert_eq!(state.current_line(), 3);
    }

    #[test]
    fn test_field_and_row_size_limits() {
        let asm = assembler(ParseOptions::default().max_field_size(4).max_row_size(12));
        let mut state = ParserState::new(false);
        let rows = run(
            &asm,
            &mut state,
            &["ab,cd", "abcdef,x", "\"long", "multiline\"", "ok,ok"],
            false,
        );

        assert_eq!(rows[0].as_ref().unwrap(), &data(1, &["ab", "cd"]));
        match &rows[1] {
            Err(DsvError::SizeLimitError { line, kind, actual, .. }) => {
                assert_eq!((*line, *kind, *actual), (2, SizeLimitKind::Field, 6));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            rows[2],
            Err(DsvError::SizeLimitError {
                line: 3,
                kind: SizeLimitKind::Row,
                ..
            })
        ));
        assert!(rows.iter().any(|r| matches!(r, Ok(row) if *row == data(5, &["ok", "ok"]))));
    }

    #[test]
    fn test_ragged_policies() {
        let lines = ["a,b,c", "1,2", "1,2,3,4"];

        let asm = assembler(ParseOptions::default());
        let rows = run(&asm, &mut ParserState::new(true), &lines, false);
        match &rows[1] {
            Err(DsvError::RaggedRowError {
                line,
                expected,
                actual,
                ..
            }) => assert_eq!((*line, *expected, *actual), (2, 3, 2)),
            other => panic!("unexpected: {other:?}"),
        }

        for policy in [RaggedRowPolicy::Pad, RaggedRowPolicy::Truncate] {
            let asm = assembler(ParseOptions::default().ragged_rows(policy));
            let rows = run(&asm, &mut ParserState::new(true), &lines, false);
            assert_eq!(rows[1].as_ref().unwrap(), &data(2, &["1", "2", ""]));
            assert_eq!(rows[2].as_ref().unwrap(), &data(3, &["1", "2", "3"]));
        }

        let asm = assembler(ParseOptions::default().ragged_rows(RaggedRowPolicy::Ignore));
        let rows = run(&asm, &mut ParserState::new(true), &lines, false);
        assert_eq!(rows[2].as_ref().unwrap(), &data(3, &["1", "2", "3", "4"]));
    }

    #[test]
    fn test_first_data_row_fixes_width_without_header() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let rows = run(&asm, &mut state, &["a,b", "c"], false);
        assert_eq!(state.expected_columns(), Some(2));
        assert!(matches!(rows[1], Err(DsvError::RaggedRowError { .. })));
    }

    #[test]
    fn test_explicit_columns_fix_width() {
        let asm = assembler(ParseOptions::default().ragged_rows(RaggedRowPolicy::Pad));
        let mut state = ParserState::with_columns(vec!["x".into(), "y".into(), "z".into()]);
        let rows = run(&asm, &mut state, &["1"], false);
        assert_eq!(rows[0].as_ref().unwrap(), &data(1, &["1", "", ""]));
    }

    #[test]
    fn test_independent_states_do_not_interfere() {
        let asm = assembler(ParseOptions::default());
        let mut first = ParserState::new(false);
        let mut second = ParserState::new(false);
        let mut out = VecDeque::new();

        asm.push_line(&mut first, "a,\"open", &mut out);
        asm.push_line(&mut second, "x,y", &mut out);
        asm.push_line(&mut first, "close\"", &mut out);

        assert_eq!(out.pop_front().unwrap().unwrap(), data(1, &["x", "y"]));
        assert_eq!(out.pop_front().unwrap().unwrap(), data(1, &["a", "open\nclose"]));
    }

    #[test]
    fn test_reject_line_discards_pending_row() {
        let asm = assembler(ParseOptions::default());
        let mut state = ParserState::new(false);
        let mut out = VecDeque::new();
        asm.push_line(&mut state, "a,\"open", &mut out);
        asm.reject_line(&mut state, "xxxx", 1000, &mut out);

        assert!(matches!(
            out.pop_front(),
            Some(Err(DsvError::SizeLimitError { line: 1, .. }))
        ));
        assert!(!state.in_multi_line_field());
        assert_eq!(state.current_line(), 2);
    }
}
