//! Depth-aware context construction.
//!
//! A built context is `[prefix filler] + [evidence] + [suffix filler]`, all
//! drawn from the source document, sized so the whole thing is exactly the
//! requested token length with the evidence sitting at the requested
//! fractional depth:
//!
//! ```text
//! depth 0.0          depth 0.5              depth 1.0
//! [E..........]      [.....E.....]          [..........E]
//! ```
//!
//! The evidence span is padded and snapped outward to sentence boundaries
//! first, so the model never sees the answer passage cut mid-sentence.
//! Filler is selected deterministically (earliest available run outside the
//! evidence, in document order) so identical inputs always produce identical
//! contexts; recovery and cross-run diffing depend on that.

use std::sync::Arc;

use crate::question::{Position, Question};
use crate::tokenizer::{Direction, EvalTokenizer};
use crate::{Error, Result};

/// A successfully assembled context.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    /// The decoded context text handed to the model.
    pub text: String,
    /// Achieved evidence depth, `prefix_len / (L - e)`.
    pub actual_depth: f64,
    /// Token offset of the evidence inside the assembled context.
    pub evidence_token_start: usize,
    /// One past the last evidence token inside the assembled context.
    pub evidence_token_end: usize,
    /// Prefix filler length in tokens.
    pub prefix_len: usize,
    /// Suffix filler length in tokens.
    pub suffix_len: usize,
    /// Evidence length in tokens, after padding and boundary snapping.
    pub evidence_len: usize,
    /// Total assembled length in tokens.
    pub total_len: usize,
}

/// Builds contexts with evidence at prescribed depths.
pub struct ContextBuilder {
    tokenizer: Arc<EvalTokenizer>,
    tokens: Arc<Vec<u32>>,
}

impl ContextBuilder {
    /// Create a builder over the tokenized source document.
    #[must_use]
    pub fn new(tokenizer: Arc<EvalTokenizer>, tokens: Arc<Vec<u32>>) -> Self {
        log::debug!("context builder over {} source tokens", tokens.len());
        Self { tokenizer, tokens }
    }

    /// Source document length in tokens.
    #[must_use]
    pub fn source_len(&self) -> usize {
        self.tokens.len()
    }

    /// Build a context of `context_length` tokens with the question's
    /// evidence at `target_depth`.
    ///
    /// `padding` extra tokens are kept on each side of the evidence span
    /// before boundary snapping, so sentences immediately around the answer
    /// survive intact.
    pub fn build(
        &self,
        question: &Question,
        target_depth: f64,
        context_length: usize,
        padding: usize,
    ) -> Result<BuiltContext> {
        if !(0.0..=1.0).contains(&target_depth) {
            return Err(Error::context_build(format!(
                "target_depth must be in [0, 1], got {target_depth}"
            )));
        }
        let n = self.tokens.len();
        if question.position.start_pos >= n {
            return Err(Error::context_build(format!(
                "evidence start {} is past the end of the source ({n} tokens)",
                question.position.start_pos
            )));
        }

        let (span_start, span_end) = self.evidence_span(&question.position, padding);
        let evidence_len = span_end - span_start;

        if evidence_len > context_length {
            return Err(Error::context_build(format!(
                "evidence too large: {evidence_len} tokens exceed the requested \
                 context length {context_length}"
            )));
        }

        let available = context_length - evidence_len;
        let prefix_len = ((target_depth * available as f64).round() as usize).min(available);
        let suffix_len = available - prefix_len;

        // Free regions exclude the padded, snapped evidence so filler never
        // duplicates the passage under test.
        let mut free: Vec<(usize, usize)> = Vec::with_capacity(2);
        if span_start > 0 {
            free.push((0, span_start));
        }
        if span_end < n {
            free.push((span_end, n));
        }
        let free_total: usize = free.iter().map(|(s, e)| e - s).sum();
        if free_total < available {
            return Err(Error::insufficient_source(format!(
                "need {available} filler tokens but only {free_total} are available \
                 outside the evidence span"
            )));
        }

        let prefix = self.draw_filler(&mut free, prefix_len)?;
        let suffix = self.draw_filler(&mut free, suffix_len)?;

        let mut assembled = Vec::with_capacity(context_length);
        assembled.extend_from_slice(&prefix);
        assembled.extend_from_slice(&self.tokens[span_start..span_end]);
        assembled.extend_from_slice(&suffix);

        let text = self.tokenizer.decode(&assembled)?;
        let actual_depth = if available > 0 {
            prefix.len() as f64 / available as f64
        } else {
            0.0
        };

        Ok(BuiltContext {
            text,
            actual_depth,
            evidence_token_start: prefix.len(),
            evidence_token_end: prefix.len() + evidence_len,
            prefix_len: prefix.len(),
            suffix_len: suffix.len(),
            evidence_len,
            total_len: assembled.len(),
        })
    }

    /// Legacy context: the first `length` tokens of the source document.
    pub fn leading(&self, length: usize) -> Result<String> {
        let end = length.min(self.tokens.len());
        self.tokenizer.decode(&self.tokens[..end])
    }

    /// Expand the evidence by `padding` tokens each side, then snap the left
    /// edge backward and the right edge forward to sentence boundaries.
    fn evidence_span(&self, position: &Position, padding: usize) -> (usize, usize) {
        let n = self.tokens.len();
        let padded_start = position.start_pos.saturating_sub(padding);
        let padded_end = (position.end_pos + padding).min(n);

        let snapped_start = self
            .tokenizer
            .find_boundary(&self.tokens, padded_start, Direction::Backward);
        let snapped_end = self
            .tokenizer
            .find_boundary(&self.tokens, padded_end, Direction::Forward);

        (snapped_start.min(padded_start), snapped_end.max(padded_end).min(n))
    }

    /// Take `want` filler tokens from the earliest free regions, in document
    /// order, consuming them from `free`.
    ///
    /// When a draw has to stop partway through a region and continue in a
    /// later one, the cut is pulled back to a sentence boundary and the
    /// shortfall is made up from the next region, so spliced filler reads as
    /// whole sentences. The final cut of the final run stays exact to keep
    /// the total length precise.
    fn draw_filler(&self, free: &mut Vec<(usize, usize)>, want: usize) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(want);
        let mut need = want;
        let mut i = 0;

        while need > 0 {
            if i >= free.len() {
                return Err(Error::insufficient_source(format!(
                    "ran out of filler regions with {need} tokens still required"
                )));
            }
            let (start, end) = free[i];
            let avail = end - start;
            if avail <= need {
                out.extend_from_slice(&self.tokens[start..end]);
                need -= avail;
                free.remove(i);
            } else {
                let raw_cut = start + need;
                let mut cut = raw_cut;
                if let Some(&(next_start, next_end)) = free.get(i + 1) {
                    let snapped =
                        self.tokenizer
                            .find_boundary(&self.tokens, raw_cut, Direction::Backward);
                    // Only align the cut when the next region can absorb the
                    // shortfall, otherwise tokens behind the cut would be
                    // stranded and the draw could fail despite enough supply.
                    if snapped > start
                        && snapped < raw_cut
                        && next_end - next_start >= raw_cut - snapped
                    {
                        cut = snapped;
                    }
                }
                out.extend_from_slice(&self.tokens[start..cut]);
                need -= cut - start;
                free[i] = (cut, end);
                i += 1;
            }
        }
        Ok(out)
    }
}
