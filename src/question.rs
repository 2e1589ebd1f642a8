//! Core data model: questions, question sets, and per-question results.
//!
//! Wire names are stable and match the JSONL files produced by the question
//! generation stage: `question`, `question_type`, `choice`, `answer`,
//! `position`, `validation`. Unknown fields are ignored on read.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Question kind. The scorer dispatches on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Exactly one correct choice; scored by exact set match.
    SingleChoice,
    /// Two or more correct choices; scored by F1.
    MultipleChoice,
    /// "Which of these is NOT ..." variant; scored like multiple choice.
    NegativeQuestion,
}

impl QuestionKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single_choice",
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::NegativeQuestion => "negative_question",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open token range in the source document where the evidence lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// First evidence token (inclusive).
    pub start_pos: usize,
    /// One past the last evidence token.
    pub end_pos: usize,
}

impl Position {
    /// Span length in tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end_pos.saturating_sub(self.start_pos)
    }

    /// True when the span is empty or inverted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end_pos <= self.start_pos
    }
}

/// Validation verdict attached by the independent validation stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Validation {
    /// Whether the validator confirmed the question.
    pub is_valid: bool,
    /// Reasons recorded when `is_valid` is false.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_reasons: Vec<String>,
}

/// A single benchmark question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Question prompt.
    #[serde(rename = "question")]
    pub text: String,
    /// Question kind.
    #[serde(rename = "question_type")]
    pub kind: QuestionKind,
    /// Choice key (letter) to option text. `BTreeMap` keeps key order stable.
    #[serde(rename = "choice")]
    pub choices: BTreeMap<String, String>,
    /// Correct choice keys.
    pub answer: Vec<String>,
    /// Evidence span in the source document.
    pub position: Position,
    /// Validation verdict, if the validation stage has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl Question {
    /// Check the schema invariants. Returns the first violation as a message.
    pub fn check_schema(&self) -> std::result::Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("empty question text".to_string());
        }
        if self.choices.len() < 2 {
            return Err(format!("needs at least 2 choices, has {}", self.choices.len()));
        }
        if self.answer.is_empty() {
            return Err("empty answer list".to_string());
        }
        for key in &self.answer {
            if !self.choices.contains_key(key) {
                return Err(format!("answer key {key:?} not present in choices"));
            }
        }
        if self.position.is_empty() {
            return Err(format!(
                "invalid position: start_pos={} end_pos={}",
                self.position.start_pos, self.position.end_pos
            ));
        }
        if self.kind == QuestionKind::MultipleChoice
            && self.choices.len() < self.answer.len() + 2
        {
            return Err(format!(
                "multiple choice needs at least 2 distractors: {} choices, {} answers",
                self.choices.len(),
                self.answer.len()
            ));
        }
        Ok(())
    }

    /// First 50 characters of the question text, for log lines.
    #[must_use]
    pub fn preview(&self) -> String {
        const MAX: usize = 50;
        if self.text.chars().count() > MAX {
            let cut: String = self.text.chars().take(MAX).collect();
            format!("{cut}...")
        } else {
            self.text.clone()
        }
    }
}

/// Header record of a question set file.
///
/// The first JSONL line is treated as metadata when it carries a `metadata`
/// object or a `novel_summary` and no `position` field; otherwise it is a
/// question. Loaders tolerate the line being absent entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionSetMetadata {
    /// Free-form generation metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Summary of the source document, used as context in no-reference runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novel_summary: Option<String>,
}

// =============================================================================
// Results
// =============================================================================

/// Outcome classification for a single tested assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStatus {
    /// Reply was valid JSON with an `answer` field.
    Success,
    /// Answer recovered by regex or heuristic fallback.
    RegexExtracted,
    /// No answer could be extracted from the reply.
    ParsingError,
    /// The model invoker timed out after exhausting retries.
    Timeout,
    /// The model invoker failed terminally (transport or API error).
    Error,
    /// The model returned an empty reply or declined to answer.
    Refused,
    /// The context builder could not assemble a context for this assignment.
    ContextBuildError,
}

impl ParsingStatus {
    /// Statuses that count as completed for recovery purposes.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, ParsingStatus::Success | ParsingStatus::RegexExtracted)
    }
}

/// Whether the model saw the built context or only the document summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    /// Context assembled from the source document.
    WithReference,
    /// Context replaced by the question set's `novel_summary`.
    NoReference,
}

/// Precision/recall/F1 for multi-choice answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMetrics {
    /// |model ∩ correct| / |model|.
    pub precision: f64,
    /// |model ∩ correct| / |correct|.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1_score: f64,
}

/// Per-question outcome record, one JSONL line in the result file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Question prompt (echoed for self-contained result files).
    #[serde(rename = "question")]
    pub question_text: String,
    /// Question kind.
    #[serde(rename = "question_type")]
    pub kind: QuestionKind,
    /// Choices (echoed).
    #[serde(rename = "choice")]
    pub choices: BTreeMap<String, String>,
    /// Gold answer keys.
    pub correct_answer: Vec<String>,
    /// Parsed and normalized model answer keys.
    pub model_answer: Vec<String>,
    /// Outcome classification.
    pub parsing_status: ParsingStatus,
    /// Evidence span in the source document (echoed).
    pub position: Position,
    /// Score in [0, 1].
    pub score: f64,
    /// Multi-choice metrics; `None` for single choice and failed assignments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ChoiceMetrics>,
    /// Actual evidence depth achieved by the context builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
    /// Depth bin label ("0%" .. "100%"), present in depth-aware runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_bin: Option<String>,
    /// Context length this assignment was tested at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_context_length: Option<usize>,
    /// Reference mode for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_mode: Option<TestMode>,
    /// Diagnostic message for failed assignments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
