//! The concurrent execution pipeline.
//!
//! A bounded pool of worker threads consumes the assignment queue and a
//! single collector writes results to the sink:
//!
//! ```text
//! dispatcher ──► [bounded queue] ──► worker 1 ──┐
//!                                   worker 2 ──┼──► collector ──► JSONL sink
//!                                   worker K ──┘      (flushes per record)
//! ```
//!
//! Workers share only read-only state (tokens, questions, templates, the
//! invoker); the sink is owned by the collector alone. Retries live inside
//! the model invoker, so each assignment produces exactly one result, and
//! the multiset of results is independent of the pool size. Completion order
//! is not: result files are sets keyed by `(question, cell)`, never
//! sequences.
//!
//! Cancellation stops the dispatcher; in-flight workers finish their current
//! assignment and everything already flushed stays on disk for recovery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, unbounded};

use crate::answer::{normalize_answer, parse_answer};
use crate::client::{ModelInvoker, ModelReply};
use crate::context::ContextBuilder;
use crate::jsonl::JsonlWriter;
use crate::prompt::PromptTemplate;
use crate::question::{ParsingStatus, Question, QuestionKind, TestMode, TestResult};
use crate::schedule::Assignment;
use crate::scorer::score_answer;
use crate::{Error, Result};

/// Cooperative cancellation flag.
///
/// Cancelling stops new dispatches; results completed before the cancel are
/// preserved. There is no rollback.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Worker pool size `K`.
    pub concurrency: usize,
    /// Padding tokens around evidence before boundary snapping.
    pub padding: usize,
    /// Whether contexts come from the document or the summary.
    pub test_mode: TestMode,
    /// Document summary; required in no-reference mode.
    pub novel_summary: Option<String>,
}

/// Drives assignments through build → invoke → parse → score → emit.
pub struct Pipeline<'a> {
    builder: &'a ContextBuilder,
    invoker: &'a dyn ModelInvoker,
    template: &'a PromptTemplate,
    options: PipelineOptions,
    cancel: CancelToken,
    /// Legacy leading contexts, decoded once per distinct length.
    leading_cache: Mutex<HashMap<usize, Arc<String>>>,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline over shared read-only state.
    pub fn new(
        builder: &'a ContextBuilder,
        invoker: &'a dyn ModelInvoker,
        template: &'a PromptTemplate,
        options: PipelineOptions,
    ) -> Result<Self> {
        if options.concurrency == 0 {
            return Err(Error::invalid_argument("concurrency must be at least 1"));
        }
        if options.test_mode == TestMode::NoReference && options.novel_summary.is_none() {
            return Err(Error::invalid_argument(
                "no-reference mode requires a novel_summary in the question set metadata",
            ));
        }
        Ok(Self {
            builder,
            invoker,
            template,
            options,
            cancel: CancelToken::new(),
            leading_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Install an external cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Execute `assignments`, writing each result to `sink` as it completes.
    ///
    /// Returns the results in completion order. The sink is flushed after
    /// every record so an interrupted run can be resumed with recovery mode.
    pub fn run(
        &self,
        questions: &[Question],
        assignments: &[Assignment],
        sink: &mut JsonlWriter,
    ) -> Result<Vec<TestResult>> {
        let total = assignments.len();
        if total == 0 {
            log::info!("nothing to do: all assignments already settled");
            return Ok(Vec::new());
        }

        let workers = self.options.concurrency.min(total);
        log::info!("executing {total} assignments with {workers} workers");

        let completed = AtomicUsize::new(0);
        let (task_tx, task_rx) = bounded::<Assignment>(workers);
        let (result_tx, result_rx) = unbounded::<TestResult>();

        let mut collected = Vec::with_capacity(total);
        let mut sink_error: Option<Error> = None;

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for assignment in task_rx.iter() {
                        let result = self.run_one(questions, &assignment);
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            let cancel = self.cancel.clone();
            scope.spawn(move || {
                for assignment in assignments {
                    if cancel.is_cancelled() {
                        log::warn!("cancellation requested; no further assignments dispatched");
                        break;
                    }
                    if task_tx.send(assignment.clone()).is_err() {
                        break;
                    }
                }
                drop(task_tx);
            });

            for result in result_rx.iter() {
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                log::info!(
                    "[{done}/{total}] {:?} score={:.2}",
                    result.parsing_status,
                    result.score
                );
                if sink_error.is_none() {
                    if let Err(e) = sink.write_record(&result) {
                        log::error!("result sink failed: {e}; cancelling run");
                        sink_error = Some(e);
                        self.cancel.cancel();
                    }
                }
                collected.push(result);
            }
        });

        match sink_error {
            Some(e) => Err(e),
            None => Ok(collected),
        }
    }

    /// Run one assignment end to end. Never panics, never aborts the run:
    /// every failure mode maps to a terminal parsing status.
    fn run_one(&self, questions: &[Question], assignment: &Assignment) -> TestResult {
        let question = &questions[assignment.question_index];

        let (context, actual_depth) = match self.prepare_context(question, assignment) {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!(
                    "context build failed for {:?}: {e}",
                    question.preview()
                );
                return self.failure(question, assignment, ParsingStatus::ContextBuildError, Some(e.to_string()));
            }
        };

        let (system, user) = self
            .template
            .render(&context, &question.text, &question.choices);

        let reply = self.invoker.call(&system, &user);
        let raw_reply = match reply {
            ModelReply::Text(text) => text,
            ModelReply::Timeout => {
                return self.failure(question, assignment, ParsingStatus::Timeout, None)
            }
            ModelReply::Refused => {
                return self.failure(question, assignment, ParsingStatus::Refused, None)
            }
            ModelReply::Error(message) => {
                return self.failure(question, assignment, ParsingStatus::Error, Some(message))
            }
        };

        let (raw_keys, status) = parse_answer(&raw_reply);
        let model_answer = normalize_answer(&raw_keys, &question.choices);
        let (score, metrics) = if status == ParsingStatus::ParsingError {
            (0.0, None)
        } else {
            score_answer(question.kind, &question.answer, &model_answer)
        };

        let mut result = self.result_shell(question, assignment);
        result.model_answer = model_answer;
        result.parsing_status = status;
        result.score = score;
        result.metrics = metrics;
        result.depth = actual_depth;
        result
    }

    /// Assemble the context for an assignment.
    fn prepare_context(
        &self,
        question: &Question,
        assignment: &Assignment,
    ) -> Result<(Arc<String>, Option<f64>)> {
        if self.options.test_mode == TestMode::NoReference {
            let summary = self
                .options
                .novel_summary
                .as_ref()
                .ok_or_else(|| Error::context_build("no novel_summary available"))?;
            return Ok((Arc::new(summary.clone()), None));
        }

        match assignment.depth {
            Some(slot) => {
                let built = self.builder.build(
                    question,
                    slot.target_depth,
                    assignment.context_length,
                    self.options.padding,
                )?;
                Ok((Arc::new(built.text), Some(built.actual_depth)))
            }
            None => {
                let context = self.leading_context(assignment.context_length)?;
                Ok((context, None))
            }
        }
    }

    /// Legacy leading context, decoded once per length and shared.
    fn leading_context(&self, length: usize) -> Result<Arc<String>> {
        {
            let cache = self.leading_cache.lock().expect("cache lock");
            if let Some(context) = cache.get(&length) {
                return Ok(Arc::clone(context));
            }
        }
        let context = Arc::new(self.builder.leading(length)?);
        let mut cache = self.leading_cache.lock().expect("cache lock");
        Ok(Arc::clone(cache.entry(length).or_insert(context)))
    }

    /// Result skeleton with echo fields and cell coordinates filled in.
    fn result_shell(&self, question: &Question, assignment: &Assignment) -> TestResult {
        let depth_aware = assignment.depth.is_some()
            && self.options.test_mode == TestMode::WithReference;
        TestResult {
            question_text: question.text.clone(),
            kind: question.kind,
            choices: question.choices.clone(),
            correct_answer: question.answer.clone(),
            model_answer: Vec::new(),
            parsing_status: ParsingStatus::ParsingError,
            position: question.position,
            score: 0.0,
            metrics: None,
            depth: None,
            depth_bin: if depth_aware {
                assignment.depth.map(|slot| slot.bin.label().to_string())
            } else {
                None
            },
            test_context_length: if self.options.test_mode == TestMode::WithReference {
                Some(assignment.context_length)
            } else {
                None
            },
            test_mode: Some(self.options.test_mode),
            error: None,
        }
    }

    /// A zero-score result for a failed assignment.
    fn failure(
        &self,
        question: &Question,
        assignment: &Assignment,
        status: ParsingStatus,
        error: Option<String>,
    ) -> TestResult {
        let mut result = self.result_shell(question, assignment);
        result.parsing_status = status;
        result.error = error;
        result
    }
}

/// Requested lengths where every single assignment failed to build because
/// the source ran out of tokens. Used by the CLI for the run-level
/// insufficient-source exit.
#[must_use]
pub fn exhausted_lengths(results: &[TestResult], lengths: &[usize]) -> Vec<usize> {
    lengths
        .iter()
        .copied()
        .filter(|&length| {
            let at_length: Vec<&TestResult> = results
                .iter()
                .filter(|r| r.test_context_length == Some(length))
                .collect();
            !at_length.is_empty()
                && at_length
                    .iter()
                    .all(|r| r.parsing_status == ParsingStatus::ContextBuildError)
                && at_length.iter().any(|r| {
                    r.error
                        .as_deref()
                        .is_some_and(|e| e.contains("nsufficient source"))
                })
        })
        .collect()
}

/// Log the end-of-run summary: status counts, per-kind accuracy, mean score.
pub fn log_run_summary(results: &[TestResult]) {
    let total = results.len();
    if total == 0 {
        log::warn!("no results produced");
        return;
    }

    let count = |status: ParsingStatus| {
        results.iter().filter(|r| r.parsing_status == status).count()
    };

    log::info!("==================== run summary ====================");
    log::info!("total results: {total}");
    log::info!("  success: {}", count(ParsingStatus::Success));
    log::info!("  regex_extracted: {}", count(ParsingStatus::RegexExtracted));
    log::info!("  parsing_error: {}", count(ParsingStatus::ParsingError));
    log::info!("  timeout: {}", count(ParsingStatus::Timeout));
    log::info!("  error: {}", count(ParsingStatus::Error));
    log::info!("  refused: {}", count(ParsingStatus::Refused));
    log::info!("  context_build_error: {}", count(ParsingStatus::ContextBuildError));

    let mean = results.iter().map(|r| r.score).sum::<f64>() / total as f64;
    log::info!("average score: {mean:.4}");

    let singles: Vec<&TestResult> = results
        .iter()
        .filter(|r| r.kind == QuestionKind::SingleChoice)
        .collect();
    if !singles.is_empty() {
        let correct = singles.iter().filter(|r| r.score == 1.0).count();
        log::info!(
            "single choice accuracy: {:.4} ({correct}/{})",
            correct as f64 / singles.len() as f64,
            singles.len()
        );
    }

    let multis: Vec<&TestResult> = results
        .iter()
        .filter(|r| r.kind != QuestionKind::SingleChoice)
        .collect();
    if !multis.is_empty() {
        let mean_f1 = multis.iter().map(|r| r.score).sum::<f64>() / multis.len() as f64;
        log::info!("multi choice mean F1: {mean_f1:.4} ({} questions)", multis.len());
    }
    log::info!("=====================================================");
}
