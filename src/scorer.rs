//! Per-question scoring.
//!
//! Single choice is exact set match. Multiple choice (and the negative
//! variant) is scored by F1 over the chosen key sets, so partial credit is
//! given for finding some of the correct options without flooding the answer
//! with guesses.

use std::collections::BTreeSet;

use crate::question::{ChoiceMetrics, QuestionKind};

/// Score a normalized model answer against the gold answer.
///
/// Returns the score in `[0, 1]` and, for multi-choice kinds, the
/// precision/recall/F1 breakdown.
#[must_use]
pub fn score_answer(
    kind: QuestionKind,
    correct: &[String],
    model: &[String],
) -> (f64, Option<ChoiceMetrics>) {
    match kind {
        QuestionKind::SingleChoice => {
            let correct_set: BTreeSet<&str> = correct.iter().map(String::as_str).collect();
            let model_set: BTreeSet<&str> = model.iter().map(String::as_str).collect();
            let score = if !model_set.is_empty() && model_set == correct_set {
                1.0
            } else {
                0.0
            };
            (score, None)
        }
        QuestionKind::MultipleChoice | QuestionKind::NegativeQuestion => {
            let metrics = choice_metrics(correct, model);
            (metrics.f1_score, Some(metrics))
        }
    }
}

/// Precision/recall/F1 over choice-key sets.
#[must_use]
pub fn choice_metrics(correct: &[String], model: &[String]) -> ChoiceMetrics {
    let correct_set: BTreeSet<&str> = correct.iter().map(String::as_str).collect();
    let model_set: BTreeSet<&str> = model.iter().map(String::as_str).collect();
    let hits = correct_set.intersection(&model_set).count() as f64;

    let precision = hits / model_set.len().max(1) as f64;
    let recall = hits / correct_set.len().max(1) as f64;
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ChoiceMetrics { precision, recall, f1_score }
}
