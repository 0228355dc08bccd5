//! Policy for divergate.
//!
//! This crate is intentionally I/O-free: given outcomes, it normalizes,
//! classifies, and folds. Nothing here spawns a process or reads a file.

use divergate_types::{Bucket, OutputFiltersConfig, SummaryCounts, TestResult};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid output filter pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Line-wise output cleanup applied before results are compared.
///
/// Rules operate on bytes so non-UTF-8 output survives untouched; a line's
/// terminator is not part of the match but is dropped along with it.
#[derive(Debug, Default)]
pub struct OutputFilter {
    strip_lines: Vec<Vec<u8>>,
    strip_patterns: Vec<regex::bytes::Regex>,
}

impl OutputFilter {
    pub fn from_config(config: &OutputFiltersConfig) -> Result<Self, PolicyError> {
        let strip_patterns = config
            .strip_patterns
            .iter()
            .map(|p| {
                regex::bytes::Regex::new(p).map_err(|source| PolicyError::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            strip_lines: config.strip_lines.iter().map(|l| l.clone().into_bytes()).collect(),
            strip_patterns,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.strip_lines.is_empty() && self.strip_patterns.is_empty()
    }

    /// Normalize one captured stream. Kept lines are copied byte-for-byte,
    /// including the original line terminators and any unterminated tail.
    pub fn apply(&self, raw: &[u8]) -> Vec<u8> {
        if self.is_identity() {
            return raw.to_vec();
        }

        let mut out = Vec::with_capacity(raw.len());
        for line in raw.split_inclusive(|&b| b == b'\n') {
            if !self.strips(line_content(line)) {
                out.extend_from_slice(line);
            }
        }
        out
    }

    fn strips(&self, content: &[u8]) -> bool {
        self.strip_lines.iter().any(|l| l == content)
            || self.strip_patterns.iter().any(|p| p.is_match(content))
    }
}

/// The line without its `\n` / `\r\n` terminator.
fn line_content(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// The comparison outcome crossed with the declared expectation.
pub fn classify(successful: bool, failure_expected: bool) -> Bucket {
    match (successful, failure_expected) {
        (true, false) => Bucket::Passed,
        (true, true) => Bucket::PassedUnexpectedly,
        (false, true) => Bucket::FailedExpectedly,
        (false, false) => Bucket::FailedUnexpectedly,
    }
}

pub fn classify_result(result: &TestResult) -> Bucket {
    classify(result.successful(), result.failure_expected)
}

/// Aggregate view of a whole run. The four buckets partition the result set;
/// the unexpected-failure count is the process exit status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: Vec<String>,
    pub passed_unexpectedly: Vec<String>,
    pub failed_expectedly: Vec<String>,
    pub failed_unexpectedly: Vec<String>,
}

impl RunSummary {
    pub fn counts(&self) -> SummaryCounts {
        SummaryCounts {
            total: self.total as u32,
            passed: self.passed.len() as u32,
            passed_unexpectedly: self.passed_unexpectedly.len() as u32,
            failed_expectedly: self.failed_expectedly.len() as u32,
            failed_unexpectedly: self.failed_unexpectedly.len() as u32,
        }
    }

    /// Exit status for the whole run: the number of untolerated divergences,
    /// saturated to what one exit byte can carry.
    pub fn exit_code(&self) -> u8 {
        self.failed_unexpectedly.len().min(255) as u8
    }
}

pub fn summarize<'a, I>(results: I) -> RunSummary
where
    I: IntoIterator<Item = &'a TestResult>,
{
    let mut summary = RunSummary::default();
    for result in results {
        summary.total += 1;
        let name = result.name.clone();
        match classify_result(result) {
            Bucket::Passed => summary.passed.push(name),
            Bucket::PassedUnexpectedly => summary.passed_unexpectedly.push(name),
            Bucket::FailedExpectedly => summary.failed_expectedly.push(name),
            Bucket::FailedUnexpectedly => summary.failed_unexpectedly.push(name),
        }
    }
    summary
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total tests: {}, passed: {}, failed (expected): {}, failed: {}",
            self.total,
            self.passed.len(),
            self.failed_expectedly.len(),
            self.failed_unexpectedly.len(),
        )?;
        if !self.failed_unexpectedly.is_empty() {
            write!(f, "\n\tFailed tests:")?;
            for name in &self.failed_unexpectedly {
                write!(f, "\n\t\t{name}")?;
            }
        }
        if !self.passed_unexpectedly.is_empty() {
            write!(f, "\n\tPassed unexpectedly (review the declaration):")?;
            for name in &self.passed_unexpectedly {
                write!(f, "\n\t\t{name}")?;
            }
        }
        Ok(())
    }
}
