//! Heatmap aggregation.
//!
//! Two pure reductions over questions and results:
//!
//! - **1-D position bins** split the source document into `B` equal token
//!   ranges. Coverage measures where question evidence lives (each question
//!   contributes its span proportionally, summing to 1 across bins, then the
//!   totals are averaged over the question count). Accuracy is the mean
//!   score of results whose evidence *starts* in the bin.
//! - **2-D depth cells** index depth-aware results by
//!   `(context_length, depth_bin)` and average scores per cell.
//!
//! Empty bins report `None`, never `0.0`: "no data" and "always wrong" are
//! different findings.

use serde::{Deserialize, Serialize};

use crate::question::Position;
use crate::schedule::DepthBin;
use crate::{Error, Result};

/// Aggregate statistics for one token-range bin of the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionBin {
    /// First token of the bin (inclusive).
    pub start_pos: usize,
    /// One past the last token of the bin.
    pub end_pos: usize,
    /// Mean proportional question coverage, in `[0, 1]`.
    pub coverage: f64,
    /// Mean score of results starting in this bin; `None` when empty.
    pub accuracy: Option<f64>,
    /// Number of results starting in this bin.
    pub count: usize,
}

/// Aggregate statistics for one `(context_length, depth_bin)` cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthCell {
    /// Context length of the cell.
    pub context_length: usize,
    /// Depth bin label ("0%" .. "100%").
    pub depth_bin: String,
    /// Mean score of the cell's members; `None` when empty.
    pub accuracy: Option<f64>,
    /// Number of members.
    pub count: usize,
}

/// One depth-aware result, reduced to what the 2-D map needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSample {
    /// Context length the result was tested at.
    pub context_length: usize,
    /// Depth bin label.
    pub depth_bin: String,
    /// Score in `[0, 1]`.
    pub score: f64,
}

/// Compute the 1-D position bins.
///
/// `spans` drive coverage; `samples` (evidence position, score) drive
/// accuracy and count. Either side may be empty. Returns exactly `num_bins`
/// bins; bin `i` covers tokens `[i·N/B, (i+1)·N/B)`.
pub fn position_bins(
    spans: &[Position],
    samples: &[(Position, f64)],
    total_tokens: usize,
    num_bins: usize,
) -> Result<Vec<PositionBin>> {
    if num_bins == 0 {
        return Err(Error::invalid_argument("num_bins must be positive"));
    }
    if total_tokens == 0 {
        return Err(Error::invalid_argument("total_tokens must be positive"));
    }

    let edges: Vec<(usize, usize)> = (0..num_bins)
        .map(|i| {
            let start = i * total_tokens / num_bins;
            let end = if i + 1 == num_bins {
                total_tokens
            } else {
                (i + 1) * total_tokens / num_bins
            };
            (start, end)
        })
        .collect();

    // Coverage: proportional contribution per question, normalized by the
    // question count. Each question distributes exactly 1.0 across bins, so
    // the final vector sums to 1 (for in-range spans).
    let mut coverage = vec![0.0f64; num_bins];
    for span in spans {
        let length = span.len();
        if length == 0 {
            continue;
        }
        for (i, &(bin_start, bin_end)) in edges.iter().enumerate() {
            let overlap_start = span.start_pos.max(bin_start);
            let overlap_end = span.end_pos.min(bin_end);
            if overlap_end > overlap_start {
                coverage[i] += (overlap_end - overlap_start) as f64 / length as f64;
            }
        }
    }
    if !spans.is_empty() {
        for value in &mut coverage {
            *value /= spans.len() as f64;
        }
    }

    // Accuracy: a result belongs to the bin containing its start position.
    let mut scores: Vec<Vec<f64>> = vec![Vec::new(); num_bins];
    for (position, score) in samples {
        if position.start_pos >= total_tokens {
            continue;
        }
        let index = (position.start_pos * num_bins / total_tokens).min(num_bins - 1);
        scores[index].push(*score);
    }

    Ok(edges
        .into_iter()
        .enumerate()
        .map(|(i, (start_pos, end_pos))| {
            let bin_scores = &scores[i];
            PositionBin {
                start_pos,
                end_pos,
                coverage: coverage[i],
                accuracy: mean(bin_scores),
                count: bin_scores.len(),
            }
        })
        .collect())
}

/// Compute the 2-D depth × context-length cells.
///
/// When `context_lengths` is `None` the lengths present in the samples are
/// used, sorted ascending. The output always has
/// `|lengths| × |depth labels|` cells, in `(length, bin)` order.
#[must_use]
pub fn depth_cells(samples: &[DepthSample], context_lengths: Option<&[usize]>) -> Vec<DepthCell> {
    let lengths: Vec<usize> = match context_lengths {
        Some(lengths) => lengths.to_vec(),
        None => {
            let mut detected: Vec<usize> = samples.iter().map(|s| s.context_length).collect();
            detected.sort_unstable();
            detected.dedup();
            detected
        }
    };

    let mut cells = Vec::with_capacity(lengths.len() * DepthBin::ALL.len());
    for &context_length in &lengths {
        for bin in DepthBin::ALL {
            let member_scores: Vec<f64> = samples
                .iter()
                .filter(|s| s.context_length == context_length && s.depth_bin == bin.label())
                .map(|s| s.score)
                .collect();
            cells.push(DepthCell {
                context_length,
                depth_bin: bin.label().to_string(),
                accuracy: mean(&member_scores),
                count: member_scores.len(),
            });
        }
    }
    cells
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
