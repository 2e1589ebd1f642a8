//! The `heatmap` subcommand: aggregate questions/results into JSON reports.
//!
//! Loading here is deliberately lenient and schema-light: report generation
//! should work on result files from older runs and on question sets from
//! other tools, so records are picked apart field by field and anything
//! unusable is skipped with a warning.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::cli::parser::{HeatmapArgs, HeatmapMode};
use crate::heatmap::{depth_cells, position_bins, DepthCell, DepthSample, PositionBin};
use crate::question::Position;
use crate::{jsonl, Error, Result};

/// The JSON document written by this command.
#[derive(Debug, Serialize)]
struct HeatmapReport {
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coverage_bins: Option<Vec<PositionBin>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy_bins: Option<Vec<PositionBin>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth_cells: Option<Vec<DepthCell>>,
}

/// Execute the heatmap subcommand.
pub fn run(args: &HeatmapArgs) -> Result<()> {
    if args.bins == 0 {
        return Err(Error::invalid_argument("--bins must be positive"));
    }
    let needs_questions = matches!(
        args.mode,
        HeatmapMode::Coverage | HeatmapMode::Combined | HeatmapMode::CombinedDepth
    );
    let needs_results = matches!(
        args.mode,
        HeatmapMode::Accuracy
            | HeatmapMode::Combined
            | HeatmapMode::Depth
            | HeatmapMode::CombinedDepth
    );
    if needs_questions && args.questions.is_none() {
        return Err(Error::invalid_argument("--questions is required for this mode"));
    }
    if needs_results && args.results.is_none() {
        return Err(Error::invalid_argument("--results is required for this mode"));
    }

    let questions = match (&args.questions, needs_questions) {
        (Some(path), true) => Some(load_spans(path)?),
        _ => None,
    };
    let results = match (&args.results, needs_results) {
        (Some(path), true) => Some(load_scored_spans(path)?),
        _ => None,
    };

    let mode_name = match args.mode {
        HeatmapMode::Coverage => "coverage",
        HeatmapMode::Accuracy => "accuracy",
        HeatmapMode::Combined => "combined",
        HeatmapMode::Depth => "depth",
        HeatmapMode::CombinedDepth => "combined_depth",
    };
    let mut report = HeatmapReport {
        mode: mode_name.to_string(),
        context_length: None,
        coverage_bins: None,
        accuracy_bins: None,
        depth_cells: None,
    };

    match args.mode {
        HeatmapMode::Coverage => {
            let loaded = questions.expect("questions loaded");
            let length = resolve_context_length(args, &loaded)?;
            report.context_length = Some(length);
            report.coverage_bins =
                Some(position_bins(&loaded.spans, &[], length, args.bins)?);
        }
        HeatmapMode::Accuracy => {
            let loaded = results.expect("results loaded");
            let length = resolve_context_length(args, &loaded)?;
            report.context_length = Some(length);
            report.accuracy_bins =
                Some(position_bins(&[], &loaded.scored, length, args.bins)?);
        }
        HeatmapMode::Combined => {
            let loaded_q = questions.expect("questions loaded");
            let loaded_r = results.expect("results loaded");
            let length = resolve_context_length(args, &loaded_q)
                .or_else(|_| resolve_context_length(args, &loaded_r))?;
            report.context_length = Some(length);
            report.coverage_bins =
                Some(position_bins(&loaded_q.spans, &[], length, args.bins)?);
            report.accuracy_bins =
                Some(position_bins(&[], &loaded_r.scored, length, args.bins)?);
        }
        HeatmapMode::Depth => {
            let loaded = results.expect("results loaded");
            ensure_depth_samples(&loaded)?;
            report.depth_cells = Some(depth_cells(&loaded.depth, None));
        }
        HeatmapMode::CombinedDepth => {
            let loaded_q = questions.expect("questions loaded");
            let loaded_r = results.expect("results loaded");
            ensure_depth_samples(&loaded_r)?;
            let length = resolve_context_length(args, &loaded_q)
                .or_else(|_| resolve_context_length(args, &loaded_r))?;
            report.context_length = Some(length);
            report.coverage_bins =
                Some(position_bins(&loaded_q.spans, &[], length, args.bins)?);
            report.depth_cells = Some(depth_cells(&loaded_r.depth, None));
        }
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(&args.output)?;
    serde_json::to_writer_pretty(file, &report)?;
    log::info!("heatmap report saved to {}", args.output.display());
    Ok(())
}

/// Entries salvaged from one JSONL file.
#[derive(Debug, Default)]
struct LoadedEntries {
    spans: Vec<Position>,
    scored: Vec<(Position, f64)>,
    depth: Vec<DepthSample>,
    total_tokens: Option<usize>,
    context_length: Option<usize>,
}

/// Load evidence spans from a question file.
fn load_spans(path: &Path) -> Result<LoadedEntries> {
    let loaded = load_entries(path)?;
    log::info!("loaded {} question spans from {}", loaded.spans.len(), path.display());
    Ok(loaded)
}

/// Load `(span, score)` pairs and depth samples from a result file.
fn load_scored_spans(path: &Path) -> Result<LoadedEntries> {
    let loaded = load_entries(path)?;
    log::info!(
        "loaded {} scored results ({} depth-aware) from {}",
        loaded.scored.len(),
        loaded.depth.len(),
        path.display()
    );
    Ok(loaded)
}

fn load_entries(path: &Path) -> Result<LoadedEntries> {
    let (metadata, records) = jsonl::read_values(path)?;
    let mut loaded = LoadedEntries::default();

    if let Some(meta) = metadata.as_ref().and_then(|v| v.get("metadata")) {
        loaded.total_tokens = meta.get("total_tokens").and_then(Value::as_u64).map(|v| v as usize);
        loaded.context_length =
            meta.get("context_length").and_then(Value::as_u64).map(|v| v as usize);
    }

    let mut skipped = 0usize;
    for (line_no, value) in records {
        let Some(value) = value else {
            skipped += 1;
            continue;
        };
        let position = value.get("position").and_then(parse_position);
        let score = value.get("score").and_then(Value::as_f64);

        match (position, score) {
            (Some(position), Some(score)) => loaded.scored.push((position, score)),
            (Some(position), None) => loaded.spans.push(position),
            _ => {
                log::warn!("line {line_no}: missing position, skipping");
                skipped += 1;
            }
        }

        let depth_bin = value.get("depth_bin").and_then(Value::as_str);
        let length = value.get("test_context_length").and_then(Value::as_u64);
        if let (Some(depth_bin), Some(length), Some(score)) = (depth_bin, length, score) {
            loaded.depth.push(DepthSample {
                context_length: length as usize,
                depth_bin: depth_bin.to_string(),
                score,
            });
        }
    }

    // Scored entries also carry spans for coverage purposes.
    if loaded.spans.is_empty() && !loaded.scored.is_empty() {
        loaded.spans = loaded.scored.iter().map(|(p, _)| *p).collect();
    }

    if skipped > 0 {
        log::warn!("{skipped} lines skipped in {}", path.display());
    }
    Ok(loaded)
}

fn parse_position(value: &Value) -> Option<Position> {
    let start_pos = value.get("start_pos")?.as_u64()? as usize;
    let end_pos = value.get("end_pos")?.as_u64()? as usize;
    Some(Position { start_pos, end_pos })
}

/// CLI flag wins, then file metadata (`total_tokens`, then `context_length`).
fn resolve_context_length(args: &HeatmapArgs, loaded: &LoadedEntries) -> Result<usize> {
    args.context_length
        .or(loaded.total_tokens)
        .or(loaded.context_length)
        .ok_or_else(|| {
            Error::invalid_argument(
                "context length unknown: pass --context-length or use files whose \
                 metadata records total_tokens",
            )
        })
}

fn ensure_depth_samples(loaded: &LoadedEntries) -> Result<()> {
    if loaded.depth.is_empty() {
        return Err(Error::dataset(
            "no depth-aware results found (records need depth_bin and test_context_length)",
        ));
    }
    Ok(())
}
