//! Question set loading and the pre-check gate.
//!
//! Loading is lenient: records that fail the schema are skipped with a
//! counted warning so one bad line does not sink a long generation run. The
//! pre-check gate is strict in the other direction: model calls are
//! expensive, so misconfiguration (untested or invalid questions) is caught
//! before the first request leaves the machine.

use std::path::Path;

use crate::question::{Question, QuestionSetMetadata};
use crate::{jsonl, Error, Result};

/// Counters from a lenient load.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadStats {
    /// Questions that passed the schema.
    pub loaded: usize,
    /// Lines skipped (unparseable JSON or schema violation).
    pub skipped: usize,
}

/// A loaded question set.
#[derive(Debug, Default)]
pub struct QuestionSet {
    /// Header metadata, empty when the file had no metadata line.
    pub metadata: QuestionSetMetadata,
    /// Questions in file order.
    pub questions: Vec<Question>,
    /// Load counters.
    pub stats: LoadStats,
}

/// Read a question set from a JSONL file.
///
/// The first line is consumed as metadata when it looks like a header (see
/// [`jsonl::is_metadata_line`]); otherwise it is treated as a question.
pub fn read_question_set(path: &Path) -> Result<QuestionSet> {
    let (metadata_value, records) = jsonl::read_values(path)?;

    let metadata = match metadata_value {
        Some(value) => serde_json::from_value(value).unwrap_or_default(),
        None => QuestionSetMetadata::default(),
    };

    let mut questions = Vec::new();
    let mut stats = LoadStats::default();

    for (line_no, value) in records {
        let Some(value) = value else {
            log::warn!("line {line_no}: invalid JSON, skipping");
            stats.skipped += 1;
            continue;
        };
        let question: Question = match serde_json::from_value(value) {
            Ok(q) => q,
            Err(e) => {
                log::warn!("line {line_no}: not a question record ({e}), skipping");
                stats.skipped += 1;
                continue;
            }
        };
        if let Err(reason) = question.check_schema() {
            log::warn!("line {line_no}: schema violation ({reason}), skipping");
            stats.skipped += 1;
            continue;
        }
        questions.push(question);
    }

    stats.loaded = questions.len();
    if stats.skipped > 0 {
        log::warn!(
            "loaded {} questions from {}, skipped {}",
            stats.loaded,
            path.display(),
            stats.skipped
        );
    } else {
        log::info!("loaded {} questions from {}", stats.loaded, path.display());
    }

    Ok(QuestionSet { metadata, questions, stats })
}

/// Outcome of the pre-check gate.
#[derive(Debug, Default)]
pub struct PrecheckReport {
    /// Indices (into the loaded list) of questions missing a validation field.
    pub missing_validation: Vec<usize>,
    /// Indices of questions with `is_valid = false`.
    pub invalid: Vec<usize>,
    /// Number of questions dropped by `ignore_invalid`.
    pub dropped: usize,
}

/// Gate a question set before any model call is issued.
///
/// Policy:
/// - any question without a `validation` field fails the run unless
///   `skip_validation` is set;
/// - any question with `is_valid = false` fails the run unless
///   `ignore_invalid` is set, in which case those questions are dropped and
///   counted;
/// - an empty set after filtering always fails.
///
/// With `skip_validation` the gate is bypassed entirely and all questions
/// pass through untouched.
pub fn precheck(
    questions: Vec<Question>,
    skip_validation: bool,
    ignore_invalid: bool,
) -> Result<(Vec<Question>, PrecheckReport)> {
    if skip_validation {
        log::info!("pre-check skipped (--skip-validation)");
        if questions.is_empty() {
            return Err(Error::precheck("question set is empty"));
        }
        return Ok((questions, PrecheckReport::default()));
    }

    let mut report = PrecheckReport::default();
    let mut kept = Vec::with_capacity(questions.len());

    for (idx, question) in questions.into_iter().enumerate() {
        match &question.validation {
            None => {
                log::warn!("question {}: missing validation field ({})", idx + 1, question.preview());
                report.missing_validation.push(idx);
            }
            Some(v) if !v.is_valid => {
                if let Some(reason) = v.failure_reasons.first() {
                    log::warn!("question {}: failed validation ({reason})", idx + 1);
                } else {
                    log::warn!("question {}: failed validation", idx + 1);
                }
                report.invalid.push(idx);
                if ignore_invalid {
                    report.dropped += 1;
                }
            }
            Some(_) => kept.push(question),
        }
    }

    if !report.missing_validation.is_empty() {
        return Err(Error::precheck(format!(
            "{} questions lack validation metadata (indices {}); \
             run the validation stage first or pass --skip-validation",
            report.missing_validation.len(),
            preview_indices(&report.missing_validation),
        )));
    }

    if !report.invalid.is_empty() && !ignore_invalid {
        return Err(Error::precheck(format!(
            "{} questions failed validation (indices {}); \
             pass --ignore-invalid to drop them",
            report.invalid.len(),
            preview_indices(&report.invalid),
        )));
    }

    if report.dropped > 0 {
        log::info!("dropped {} invalid questions (--ignore-invalid)", report.dropped);
    }

    if kept.is_empty() {
        return Err(Error::precheck(
            "no valid questions remaining after filtering",
        ));
    }

    log::info!("pre-check passed: {} questions ready", kept.len());
    Ok((kept, report))
}

/// Render the first few indices for an error message.
fn preview_indices(indices: &[usize]) -> String {
    const SHOW: usize = 10;
    let shown: Vec<String> = indices.iter().take(SHOW).map(|i| i.to_string()).collect();
    if indices.len() > SHOW {
        format!("{}, ...", shown.join(", "))
    } else {
        shown.join(", ")
    }
}
