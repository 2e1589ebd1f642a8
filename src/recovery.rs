//! Resuming interrupted runs from a prior result file.
//!
//! API outages and quota exhaustion should not force a full re-run. A prior
//! result file is loaded, every settled result (parsed successfully, with or
//! without fallback) is kept verbatim, and only the assignments whose cells
//! failed or are missing go back through the pipeline. The final output is
//! the union, keyed by `(question, cell)`.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::question::{Question, TestMode, TestResult};
use crate::schedule::Assignment;
use crate::{jsonl, Result};

/// Stable key of a `(question, cell)` pair.
///
/// Depth-aware results key on `(question, length, bin)`, legacy results on
/// `(question, length)`, no-reference results on the question alone.
#[must_use]
pub fn result_key(result: &TestResult) -> String {
    let text_hash = hash_text(&result.question_text);
    if result.test_mode == Some(TestMode::NoReference) {
        return format!("{text_hash:016x}|no_reference");
    }
    match (&result.depth_bin, result.test_context_length) {
        (Some(bin), Some(length)) => format!("{text_hash:016x}|{length}|{bin}"),
        (None, Some(length)) => format!("{text_hash:016x}|{length}"),
        _ => format!("{text_hash:016x}"),
    }
}

/// Key an assignment the same way its future result will be keyed.
#[must_use]
pub fn assignment_key(question_text: &str, assignment: &Assignment, no_reference: bool) -> String {
    let text_hash = hash_text(question_text);
    if no_reference {
        return format!("{text_hash:016x}|no_reference");
    }
    match assignment.depth {
        Some(slot) => format!(
            "{text_hash:016x}|{}|{}",
            assignment.context_length,
            slot.bin.label()
        ),
        None => format!("{text_hash:016x}|{}", assignment.context_length),
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Settled results carried over from a prior run.
#[derive(Debug, Default)]
pub struct RecoveryPlan {
    /// Results preserved verbatim.
    pub kept: Vec<TestResult>,
    completed: HashSet<String>,
}

impl RecoveryPlan {
    /// Load a prior result file.
    ///
    /// Results with a settled parsing status are kept; everything else
    /// (timeouts, transport errors, parse failures, context build failures)
    /// is dropped so its assignment reruns. Unreadable lines are skipped
    /// with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        let (_, records) = jsonl::read_values(path)?;
        let mut plan = RecoveryPlan::default();
        let mut rerun = 0usize;
        let mut skipped = 0usize;

        for (line_no, value) in records {
            let Some(value) = value else {
                skipped += 1;
                continue;
            };
            let result: TestResult = match serde_json::from_value(value) {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("recovery: line {line_no} is not a result record ({e})");
                    skipped += 1;
                    continue;
                }
            };
            if result.parsing_status.is_settled() {
                plan.completed.insert(result_key(&result));
                plan.kept.push(result);
            } else {
                rerun += 1;
            }
        }

        log::info!(
            "recovery: keeping {} settled results, re-running {} failed, skipped {} lines",
            plan.kept.len(),
            rerun,
            skipped
        );
        Ok(plan)
    }

    /// Whether the cell identified by `key` already has a settled result.
    #[must_use]
    pub fn is_complete(&self, key: &str) -> bool {
        self.completed.contains(key)
    }

    /// Retain only the assignments that still need a model call.
    #[must_use]
    pub fn pending(
        &self,
        questions: &[Question],
        assignments: Vec<Assignment>,
        no_reference: bool,
    ) -> Vec<Assignment> {
        assignments
            .into_iter()
            .filter(|a| {
                let text = &questions[a.question_index].text;
                !self.is_complete(&assignment_key(text, a, no_reference))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{ParsingStatus, Position, QuestionKind};
    use crate::schedule::{DepthBin, DepthSlot};
    use std::collections::BTreeMap;

    fn result(text: &str, status: ParsingStatus) -> TestResult {
        TestResult {
            question_text: text.into(),
            kind: QuestionKind::SingleChoice,
            choices: BTreeMap::new(),
            correct_answer: vec!["a".into()],
            model_answer: vec!["a".into()],
            parsing_status: status,
            position: Position { start_pos: 0, end_pos: 10 },
            score: 1.0,
            metrics: None,
            depth: Some(0.5),
            depth_bin: Some("50%".into()),
            test_context_length: Some(2000),
            test_mode: Some(TestMode::WithReference),
            error: None,
        }
    }

    fn assignment(index: usize) -> Assignment {
        Assignment {
            question_index: index,
            context_length: 2000,
            depth: Some(DepthSlot { target_depth: 0.5, bin: DepthBin::P50 }),
        }
    }

    fn question(text: &str) -> Question {
        let mut choices = BTreeMap::new();
        choices.insert("a".into(), "x".into());
        choices.insert("b".into(), "y".into());
        Question {
            text: text.into(),
            kind: QuestionKind::SingleChoice,
            choices,
            answer: vec!["a".into()],
            position: Position { start_pos: 0, end_pos: 10 },
            validation: None,
        }
    }

    #[test]
    fn keys_line_up_between_results_and_assignments() {
        let r = result("Who did it?", ParsingStatus::Success);
        let a = assignment(0);
        assert_eq!(result_key(&r), assignment_key("Who did it?", &a, false));
    }

    #[test]
    fn no_reference_keys_ignore_cell() {
        let mut r = result("Who did it?", ParsingStatus::Success);
        r.test_mode = Some(TestMode::NoReference);
        let a = assignment(0);
        assert_eq!(result_key(&r), assignment_key("Who did it?", &a, true));
    }

    #[test]
    fn legacy_keys_use_length_only() {
        let mut r = result("Who did it?", ParsingStatus::Success);
        r.depth_bin = None;
        r.depth = None;
        let a = Assignment { question_index: 0, context_length: 2000, depth: None };
        assert_eq!(result_key(&r), assignment_key("Who did it?", &a, false));
    }

    #[test]
    fn load_keeps_settled_and_drops_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let lines: Vec<String> = vec![
            serde_json::to_string(&serde_json::json!({"metadata": {"model_name": "m"}})).unwrap(),
            serde_json::to_string(&result("q1", ParsingStatus::Success)).unwrap(),
            serde_json::to_string(&result("q2", ParsingStatus::RegexExtracted)).unwrap(),
            serde_json::to_string(&result("q3", ParsingStatus::Timeout)).unwrap(),
            serde_json::to_string(&result("q4", ParsingStatus::ParsingError)).unwrap(),
        ];
        std::fs::write(&path, lines.join("\n")).unwrap();

        let plan = RecoveryPlan::load(&path).unwrap();
        assert_eq!(plan.kept.len(), 2);
        assert!(plan.is_complete(&result_key(&result("q1", ParsingStatus::Success))));
        assert!(!plan.is_complete(&result_key(&result("q3", ParsingStatus::Timeout))));
    }

    #[test]
    fn pending_filters_completed_assignments() {
        let questions = vec![question("q1"), question("q2"), question("q3")];
        let mut plan = RecoveryPlan::default();
        plan.completed
            .insert(assignment_key("q2", &assignment(1), false));

        let all = vec![assignment(0), assignment(1), assignment(2)];
        let pending = plan.pending(&questions, all, false);
        let indices: Vec<_> = pending.iter().map(|a| a.question_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }
}
