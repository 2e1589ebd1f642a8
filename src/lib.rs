//! # longrecall
//!
//! Long-context recall benchmarking for chat-completion LLMs.
//!
//! Given a novel-sized source document and a set of multiple-choice
//! questions anchored to token positions in it, longrecall measures how
//! recall degrades with context length and with *where* in the context the
//! evidence sits:
//!
//! ```text
//!            depth 0%   25%   50%   75%   100%
//! 8k ctx   [   .92   .90   .88   .85   .91  ]
//! 32k ctx  [   .88   .81   .74   .70   .83  ]
//! 128k ctx [   .80   .66   .58   .55   .77  ]
//! ```
//!
//! ## Pipeline
//!
//! 1. [`loader`] reads the question set and gates it on validation status.
//! 2. [`schedule`] assigns each question to `(context_length, depth_bin)`
//!    cells of the evaluation matrix.
//! 3. [`context`] builds a context of the exact requested token length with
//!    the evidence at the requested fractional depth, trimmed to sentence
//!    boundaries by [`tokenizer`].
//! 4. [`pipeline`] drives a bounded worker pool through build → invoke →
//!    parse ([`answer`]) → score ([`scorer`]) → emit, flushing each result
//!    so interrupted runs resume via [`recovery`].
//! 5. [`heatmap`] reduces results into 1-D position bins and the 2-D
//!    depth × length map.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use longrecall::{Config, EvalTokenizer, ContextBuilder};
//! use std::sync::Arc;
//!
//! let tokenizer = Arc::new(EvalTokenizer::new()?);
//! let tokens = Arc::new(tokenizer.encode(&novel_text));
//! let builder = ContextBuilder::new(tokenizer, tokens);
//!
//! // Evidence of question `q` at 75% depth of a 32k context:
//! let built = builder.build(&q, 0.75, 32_000, 500)?;
//! assert!((built.actual_depth - 0.75).abs() <= 0.05);
//! ```
//!
//! ## Determinism
//!
//! Everything outside the model call is deterministic: scheduling, context
//! assembly (earliest-available filler selection), and aggregation produce
//! identical outputs for identical inputs, which is what makes recovery
//! mode and cross-run diffing meaningful.

pub mod answer;
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod heatmap;
pub mod jsonl;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod question;
pub mod recovery;
pub mod schedule;
pub mod scorer;
pub mod tokenizer;

pub use client::{ChatClient, ModelInvoker, ModelReply};
pub use config::Config;
pub use context::{BuiltContext, ContextBuilder};
pub use error::{Error, Result};
pub use pipeline::{CancelToken, Pipeline, PipelineOptions};
pub use question::{
    ParsingStatus, Position, Question, QuestionKind, QuestionSetMetadata, TestMode, TestResult,
};
pub use schedule::{Assignment, DepthBin, DepthMode, DepthScheduler};
pub use tokenizer::{Direction, EvalTokenizer, ENCODING_NAME};
