//! Tokenization and boundary alignment over the source document.
//!
//! Question positions are anchored to token offsets in the source document,
//! so the exact same byte-pair encoding must be used when questions are
//! generated and when they are evaluated. The encoding is pinned to
//! `cl100k_base`; [`ENCODING_NAME`] is recorded in run metadata so result
//! files are self-describing.
//!
//! Besides encode/decode, this module locates readable trim points: a context
//! cut mid-sentence biases the model toward the truncated passage, so windows
//! are snapped to the nearest sentence or paragraph boundary within a bounded
//! search distance.

use once_cell::sync::Lazy;
use regex::Regex;
use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::{Error, Result};

/// Identifier of the pinned byte-pair encoding.
pub const ENCODING_NAME: &str = "cl100k_base";

/// Maximum tokens scanned outward before boundary search gives up.
const MAX_BOUNDARY_SEARCH: usize = 100;

/// Sentence terminator (ASCII or fullwidth) followed by whitespace.
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?\u{3002}\u{FF01}\u{FF1F}]\s").unwrap());

/// Paragraph break.
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n").unwrap());

/// Direction for boundary search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Scan toward the end of the document.
    Forward,
    /// Scan toward the start of the document.
    Backward,
}

/// Tokenizer with the pinned encoding and boundary detection utilities.
pub struct EvalTokenizer {
    bpe: CoreBPE,
}

impl std::fmt::Debug for EvalTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalTokenizer")
            .field("encoding", &ENCODING_NAME)
            .finish()
    }
}

impl EvalTokenizer {
    /// Initialize the pinned encoding.
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| Error::tokenize(e.to_string()))?;
        Ok(Self { bpe })
    }

    /// Identifier of the encoding in use.
    #[must_use]
    pub fn encoding_name(&self) -> &'static str {
        ENCODING_NAME
    }

    /// Encode text to token ids. Lossless round-trip with [`decode`].
    ///
    /// [`decode`]: EvalTokenizer::decode
    #[must_use]
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    /// Decode token ids back to text.
    ///
    /// Fails when the slice starts or ends mid-codepoint, which can happen
    /// for arbitrary cuts through multi-token characters.
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|e| Error::tokenize(e.to_string()))
    }

    /// Count tokens in text.
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Find the nearest readable boundary from `target`, scanning in
    /// `direction` for at most [`MAX_BOUNDARY_SEARCH`] tokens.
    ///
    /// A paragraph break wins over a sentence terminator. When no boundary is
    /// found within the window (or the window cannot be decoded), `target`
    /// itself is returned as a hard cutoff.
    ///
    /// The returned position points just past the boundary, so slicing at it
    /// starts (or ends) on whole sentences.
    #[must_use]
    pub fn find_boundary(&self, tokens: &[u32], target: usize, direction: Direction) -> usize {
        let target = target.min(tokens.len());
        match direction {
            Direction::Forward => {
                let end = (target + MAX_BOUNDARY_SEARCH).min(tokens.len());
                let Ok(window) = self.decode(&tokens[target..end]) else {
                    return target;
                };
                match self.first_boundary(&window) {
                    Some(byte_end) => (target + self.count(&window[..byte_end])).min(end),
                    None => target,
                }
            }
            Direction::Backward => {
                let start = target.saturating_sub(MAX_BOUNDARY_SEARCH);
                let Ok(window) = self.decode(&tokens[start..target]) else {
                    return target;
                };
                match self.last_boundary(&window) {
                    Some(byte_end) => (start + self.count(&window[..byte_end])).min(target),
                    None => target,
                }
            }
        }
    }

    /// Byte offset just past the first boundary in `window`, if any.
    fn first_boundary(&self, window: &str) -> Option<usize> {
        if let Some(m) = PARAGRAPH_BREAK.find(window) {
            return Some(m.end());
        }
        SENTENCE_END.find(window).map(|m| m.end())
    }

    /// Byte offset just past the last boundary in `window`, if any.
    fn last_boundary(&self, window: &str) -> Option<usize> {
        if let Some(m) = PARAGRAPH_BREAK.find_iter(window).last() {
            return Some(m.end());
        }
        SENTENCE_END.find_iter(window).last().map(|m| m.end())
    }
}
