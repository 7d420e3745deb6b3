//! Sequence metrics computed on request for records carrying a sequence column
//!
//! Only scalar code: these run once per record and only when the caller asks
//! for statistics.

use crate::options::StatsOptions;
use crate::types::RecordMetrics;

/// Base composition of a sequence (case-insensitive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseCounts {
    /// A count
    pub a: usize,
    /// C count
    pub c: usize,
    /// G count
    pub g: usize,
    /// T count
    pub t: usize,
    /// N count
    pub n: usize,
    /// Everything else (IUPAC ambiguity codes, gaps, ...)
    pub other: usize,
}

impl BaseCounts {
    /// Unambiguous bases (A, C, G, T)
    pub fn unambiguous(&self) -> usize {
        self.a + self.c + self.g + self.t
    }
}

/// Count bases in a sequence
pub fn base_counts(seq: &[u8]) -> BaseCounts {
    let mut counts = BaseCounts::default();
    for &base in seq {
        match base {
            b'A' | b'a' => counts.a += 1,
            b'C' | b'c' => counts.c += 1,
            b'G' | b'g' => counts.g += 1,
            b'T' | b't' => counts.t += 1,
            b'N' | b'n' => counts.n += 1,
            _ => counts.other += 1,
        }
    }
    counts
}

/// GC content as a fraction of unambiguous bases
///
/// Ambiguous bases and gaps are skipped. Returns 0.0 for empty sequences or
/// sequences without any A/C/G/T.
///
/// # Example
///
/// ```
/// use dsvstream::stats::gc_content;
///
/// assert!((gc_content(b"ATCGNNATCG") - 0.5).abs() < 1e-9);
/// assert_eq!(gc_content(b"NNN"), 0.0);
/// ```
pub fn gc_content(seq: &[u8]) -> f64 {
    gc_content_from_counts(&base_counts(seq))
}

/// GC skew `(G - C) / (G + C)`, 0.0 when there is no G or C
pub fn gc_skew(seq: &[u8]) -> f64 {
    gc_skew_from_counts(&base_counts(seq))
}

fn gc_content_from_counts(counts: &BaseCounts) -> f64 {
    let valid = counts.unambiguous();
    if valid == 0 {
        return 0.0;
    }
    (counts.g + counts.c) as f64 / valid as f64
}

fn gc_skew_from_counts(counts: &BaseCounts) -> f64 {
    let gc = counts.g + counts.c;
    if gc == 0 {
        return 0.0;
    }
    (counts.g as f64 - counts.c as f64) / gc as f64
}

/// Compute the metrics selected in `options` for one sequence
pub fn compute_metrics(seq: &str, options: &StatsOptions) -> RecordMetrics {
    let counts = base_counts(seq.as_bytes());
    RecordMetrics {
        length: seq.chars().count(),
        gc_content: options
            .include_gc
            .then(|| gc_content_from_counts(&counts)),
        gc_skew: options
            .include_gc_skew
            .then(|| gc_skew_from_counts(&counts)),
        base_counts: options.include_base_count.then_some(counts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_content_basic() {
        assert!((gc_content(b"ATCGATCG") - 0.5).abs() < 0.001);
        assert!((gc_content(b"GCGCGC") - 1.0).abs() < 0.001);
        assert_eq!(gc_content(b"ATATAT"), 0.0);
        assert_eq!(gc_content(b""), 0.0);
    }

    #[test]
    fn test_gc_content_case_and_ambiguity() {
        assert!((gc_content(b"atcgatcg") - 0.5).abs() < 0.001);
        assert!((gc_content(b"AtCgAtCg") - 0.5).abs() < 0.001);
        assert_eq!(gc_content(b"NNNXXX"), 0.0);
    }

    #[test]
    fn test_gc_skew() {
        assert!((gc_skew(b"GGGC") - 0.5).abs() < 1e-9);
        assert!((gc_skew(b"CCCC") + 1.0).abs() < 1e-9);
        assert_eq!(gc_skew(b"ATAT"), 0.0);
    }

    #[test]
    fn test_base_counts() {
        let counts = base_counts(b"AACGTNn-");
        assert_eq!(counts.a, 2);
        assert_eq!(counts.c, 1);
        assert_eq!(counts.g, 1);
        assert_eq!(counts.t, 1);
        assert_eq!(counts.n, 2);
        assert_eq!(counts.other, 1);
    }

    #[test]
    fn test_compute_metrics_respects_options() {
        let options = StatsOptions {
            enabled: true,
            include_gc: true,
            include_gc_skew: false,
            include_base_count: false,
            sequence_column: None,
        };
        let metrics = compute_metrics("GGCCAT", &options);
        assert_eq!(metrics.length, 6);
        assert!(metrics.gc_content.is_some());
        assert!(metrics.gc_skew.is_none());
        assert!(metrics.base_counts.is_none());
    }
}
