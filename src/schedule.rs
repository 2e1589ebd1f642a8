//! Depth and context-length scheduling.
//!
//! The scheduler assigns each question to one or more cells of the
//! `(context_length, depth_bin)` evaluation matrix. Assignment is a pure
//! function of its inputs: reruns over the same question set always produce
//! the same assignments in the same order, which recovery depends on.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The five depth bins of the evaluation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DepthBin {
    /// Evidence at the head of the context.
    #[serde(rename = "0%")]
    P0,
    /// Evidence a quarter of the way in.
    #[serde(rename = "25%")]
    P25,
    /// Evidence in the middle.
    #[serde(rename = "50%")]
    P50,
    /// Evidence three quarters of the way in.
    #[serde(rename = "75%")]
    P75,
    /// Evidence at the tail.
    #[serde(rename = "100%")]
    P100,
}

impl DepthBin {
    /// All bins, head to tail.
    pub const ALL: [DepthBin; 5] =
        [DepthBin::P0, DepthBin::P25, DepthBin::P50, DepthBin::P75, DepthBin::P100];

    /// Centroid depth of the bin.
    #[must_use]
    pub fn centroid(self) -> f64 {
        match self {
            DepthBin::P0 => 0.0,
            DepthBin::P25 => 0.25,
            DepthBin::P50 => 0.5,
            DepthBin::P75 => 0.75,
            DepthBin::P100 => 1.0,
        }
    }

    /// Wire label of the bin.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            DepthBin::P0 => "0%",
            DepthBin::P25 => "25%",
            DepthBin::P50 => "50%",
            DepthBin::P75 => "75%",
            DepthBin::P100 => "100%",
        }
    }

    /// The bin whose centroid is closest to `depth`.
    #[must_use]
    pub fn nearest(depth: f64) -> Self {
        let mut best = DepthBin::P0;
        let mut best_diff = f64::INFINITY;
        for bin in DepthBin::ALL {
            let diff = (depth - bin.centroid()).abs();
            if diff < best_diff {
                best = bin;
                best_diff = diff;
            }
        }
        best
    }
}

impl std::fmt::Display for DepthBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Depth placement of one assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSlot {
    /// Depth the context builder should aim for.
    pub target_depth: f64,
    /// Matrix bin the assignment reports into.
    pub bin: DepthBin,
}

/// One unit of work for the execution pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Index into the scheduled question list.
    pub question_index: usize,
    /// Context length in tokens for this test.
    pub context_length: usize,
    /// Depth placement; `None` in legacy mode (plain leading-context test).
    pub depth: Option<DepthSlot>,
}

/// Scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthMode {
    /// No depth placement; every question tested against the leading
    /// `context_length` tokens of the source. Kept for compatibility with
    /// result files produced before depth-aware testing existed.
    Legacy,
    /// Every question tested at this one depth, at every context length.
    Fixed(f64),
    /// Questions partitioned evenly across the 5 depth bins at every
    /// context length.
    Uniform,
}

/// Assigns questions to `(context_length, depth_bin)` cells.
#[derive(Debug, Clone)]
pub struct DepthScheduler {
    mode: DepthMode,
    context_lengths: Vec<usize>,
    max_questions: Option<usize>,
}

impl DepthScheduler {
    /// Create a scheduler.
    ///
    /// Fails when a fixed depth is outside `[0, 1]`, when no context length
    /// is supplied, or when a context length is zero.
    pub fn new(mode: DepthMode, context_lengths: Vec<usize>) -> Result<Self> {
        if let DepthMode::Fixed(depth) = mode {
            if !(0.0..=1.0).contains(&depth) {
                return Err(Error::invalid_argument(format!(
                    "fixed depth must be between 0.0 and 1.0, got {depth}"
                )));
            }
        }
        if context_lengths.is_empty() {
            return Err(Error::invalid_argument(
                "at least one context length is required",
            ));
        }
        if context_lengths.contains(&0) {
            return Err(Error::invalid_argument("context lengths must be positive"));
        }
        Ok(Self { mode, context_lengths, max_questions: None })
    }

    /// Cap the number of questions scheduled. Questions are sampled at
    /// evenly spaced indices before expansion to context lengths.
    #[must_use]
    pub fn with_max_questions(mut self, cap: Option<usize>) -> Self {
        self.max_questions = cap;
        self
    }

    /// Produce the assignment list for `question_count` questions.
    ///
    /// Output is sorted by `(context_length, depth_bin, question_index)`.
    pub fn schedule(&self, question_count: usize) -> Result<Vec<Assignment>> {
        if question_count == 0 {
            return Ok(Vec::new());
        }
        let sampled = self.sample_indices(question_count);

        let mut assignments = match self.mode {
            DepthMode::Legacy => {
                let length = self.context_lengths[0];
                sampled
                    .iter()
                    .map(|&question_index| Assignment {
                        question_index,
                        context_length: length,
                        depth: None,
                    })
                    .collect()
            }
            DepthMode::Fixed(depth) => {
                let bin = DepthBin::nearest(depth);
                let mut out =
                    Vec::with_capacity(sampled.len() * self.context_lengths.len());
                for &context_length in &self.context_lengths {
                    for &question_index in &sampled {
                        out.push(Assignment {
                            question_index,
                            context_length,
                            depth: Some(DepthSlot { target_depth: depth, bin }),
                        });
                    }
                }
                out
            }
            DepthMode::Uniform => self.schedule_uniform(&sampled),
        };

        assignments.sort_by_key(|a| {
            (
                a.context_length,
                a.depth.map(|d| d.bin),
                a.question_index,
            )
        });

        self.log_distribution(&assignments);
        Ok(assignments)
    }

    /// Cycle questions through the `depth_bin × context_length` grid so cell
    /// populations differ by at most one.
    fn schedule_uniform(&self, sampled: &[usize]) -> Vec<Assignment> {
        let num_bins = DepthBin::ALL.len();
        let combinations = num_bins * self.context_lengths.len();

        sampled
            .iter()
            .enumerate()
            .map(|(slot, &question_index)| {
                let combo = slot % combinations;
                let bin = DepthBin::ALL[combo % num_bins];
                let context_length = self.context_lengths[combo / num_bins];
                Assignment {
                    question_index,
                    context_length,
                    depth: Some(DepthSlot { target_depth: bin.centroid(), bin }),
                }
            })
            .collect()
    }

    /// Evenly spaced question indices under the optional cap.
    fn sample_indices(&self, question_count: usize) -> Vec<usize> {
        match self.max_questions {
            Some(cap) if cap < question_count => {
                (0..cap).map(|i| i * question_count / cap).collect()
            }
            _ => (0..question_count).collect(),
        }
    }

    fn log_distribution(&self, assignments: &[Assignment]) {
        let mut by_bin = std::collections::BTreeMap::new();
        let mut by_length = std::collections::BTreeMap::new();
        for a in assignments {
            if let Some(slot) = a.depth {
                *by_bin.entry(slot.bin.label()).or_insert(0usize) += 1;
            }
            *by_length.entry(a.context_length).or_insert(0usize) += 1;
        }
        log::info!("scheduled {} assignments", assignments.len());
        if !by_bin.is_empty() {
            log::info!("  by depth bin: {by_bin:?}");
        }
        log::info!("  by context length: {by_length:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn nearest_bin_picks_closest_centroid() {
        assert_eq!(DepthBin::nearest(0.0), DepthBin::P0);
        assert_eq!(DepthBin::nearest(0.1), DepthBin::P0);
        assert_eq!(DepthBin::nearest(0.2), DepthBin::P25);
        assert_eq!(DepthBin::nearest(0.6), DepthBin::P50);
        assert_eq!(DepthBin::nearest(0.9), DepthBin::P100);
    }

    #[test]
    fn bin_labels_serialize_as_percentages() {
        assert_eq!(serde_json::to_string(&DepthBin::P25).unwrap(), "\"25%\"");
        let back: DepthBin = serde_json::from_str("\"75%\"").unwrap();
        assert_eq!(back, DepthBin::P75);
    }

    #[test]
    fn uniform_cells_are_balanced() {
        // 23 questions over 2 lengths x 5 bins = 10 cells.
        let scheduler =
            DepthScheduler::new(DepthMode::Uniform, vec![2000, 8000]).unwrap();
        let assignments = scheduler.schedule(23).unwrap();
        assert_eq!(assignments.len(), 23);

        let mut cells: HashMap<(usize, DepthBin), usize> = HashMap::new();
        for a in &assignments {
            *cells.entry((a.context_length, a.depth.unwrap().bin)).or_insert(0) += 1;
        }
        assert_eq!(cells.len(), 10);
        let max = cells.values().max().unwrap();
        let min = cells.values().min().unwrap();
        assert!(max - min <= 1, "cells: {cells:?}");
    }

    #[test]
    fn uniform_assigns_centroid_depths() {
        let scheduler = DepthScheduler::new(DepthMode::Uniform, vec![1000]).unwrap();
        let assignments = scheduler.schedule(10).unwrap();
        for a in assignments {
            let slot = a.depth.unwrap();
            assert_eq!(slot.target_depth, slot.bin.centroid());
        }
    }

    #[test]
    fn fixed_mode_crosses_questions_with_lengths() {
        let scheduler =
            DepthScheduler::new(DepthMode::Fixed(0.5), vec![1000, 2000, 4000]).unwrap();
        let assignments = scheduler.schedule(7).unwrap();
        assert_eq!(assignments.len(), 21);
        for a in &assignments {
            let slot = a.depth.unwrap();
            assert_eq!(slot.target_depth, 0.5);
            assert_eq!(slot.bin, DepthBin::P50);
        }
    }

    #[test]
    fn legacy_mode_has_no_depth() {
        let scheduler = DepthScheduler::new(DepthMode::Legacy, vec![50_000]).unwrap();
        let assignments = scheduler.schedule(4).unwrap();
        assert_eq!(assignments.len(), 4);
        assert!(assignments.iter().all(|a| a.depth.is_none()));
        assert!(assignments.iter().all(|a| a.context_length == 50_000));
    }

    #[test]
    fn output_order_is_deterministic_and_sorted() {
        let scheduler =
            DepthScheduler::new(DepthMode::Uniform, vec![4000, 1000]).unwrap();
        let first = scheduler.schedule(31).unwrap();
        let second = scheduler.schedule(31).unwrap();
        assert_eq!(first, second);

        let keys: Vec<_> = first
            .iter()
            .map(|a| (a.context_length, a.depth.map(|d| d.bin), a.question_index))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn max_questions_samples_evenly() {
        let scheduler = DepthScheduler::new(DepthMode::Uniform, vec![1000])
            .unwrap()
            .with_max_questions(Some(3));
        let assignments = scheduler.schedule(9).unwrap();
        assert_eq!(assignments.len(), 3);
        let mut indices: Vec<_> = assignments.iter().map(|a| a.question_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 3, 6]);
    }

    #[test]
    fn invalid_fixed_depth_rejected() {
        assert!(DepthScheduler::new(DepthMode::Fixed(1.2), vec![1000]).is_err());
        assert!(DepthScheduler::new(DepthMode::Fixed(-0.2), vec![1000]).is_err());
    }

    #[test]
    fn empty_lengths_rejected() {
        assert!(DepthScheduler::new(DepthMode::Uniform, vec![]).is_err());
        assert!(DepthScheduler::new(DepthMode::Uniform, vec![0]).is_err());
    }
}
