//! CLI argument parsing and structure definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Long-context recall benchmark harness.
#[derive(Parser)]
#[command(name = "longrecall")]
#[command(
    author,
    version,
    about = "Long-context recall benchmark harness for chat-completion LLMs",
    long_about = r#"
longrecall - depth-aware long-context evaluation

Runs a validated multiple-choice question set against a target model while
controlling exactly where in the context window the evidence sits, then
aggregates outcomes into position and depth x length heatmaps.

EXAMPLES:
  # Depth-aware run across two context lengths
  longrecall test --novel novel.txt --data-set questions.jsonl \
      --output results.jsonl --depth-mode uniform --context-lengths 8000,32000

  # Resume a partially failed run
  longrecall test --novel novel.txt --data-set questions.jsonl \
      --output results2.jsonl --depth-mode uniform --context-lengths 8000,32000 \
      --recovery results.jsonl

  # Aggregate results into a depth heatmap report
  longrecall heatmap --mode depth --results results.jsonl --output depth.json
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a question set against the target model
    Test(TestArgs),

    /// Aggregate questions/results into heatmap reports
    Heatmap(HeatmapArgs),
}

/// Depth scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DepthModeArg {
    /// Plain leading-context testing (no depth placement)
    Legacy,
    /// Balanced partition across the five depth bins
    Uniform,
    /// One fixed depth for every question
    Fixed,
}

#[derive(Args)]
pub struct TestArgs {
    /// Path to the source document text file
    #[arg(long)]
    pub novel: PathBuf,

    /// Path to the question set JSONL file
    #[arg(long = "data-set", visible_alias = "data_set")]
    pub data_set: PathBuf,

    /// Output path for test results (JSONL)
    #[arg(long)]
    pub output: PathBuf,

    /// Worker pool size (overrides DEFAULT_CONCURRENCY)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Context length in tokens for legacy mode
    #[arg(long = "context-length", visible_alias = "context_length")]
    pub context_length: Option<usize>,

    /// Comma-separated context lengths for depth-aware modes
    #[arg(long = "context-lengths", value_delimiter = ',')]
    pub context_lengths: Vec<usize>,

    /// Depth scheduling mode
    #[arg(long = "depth-mode", value_enum, default_value_t = DepthModeArg::Legacy)]
    pub depth_mode: DepthModeArg,

    /// Target depth in [0, 1] for fixed mode
    #[arg(long)]
    pub depth: Option<f64>,

    /// Padding tokens kept around evidence before boundary snapping
    #[arg(long = "padding-size", visible_alias = "padding_size", default_value_t = 500)]
    pub padding_size: usize,

    /// Cap on the number of questions scheduled
    #[arg(long = "max-questions")]
    pub max_questions: Option<usize>,

    /// Prior result file to resume from
    #[arg(long)]
    pub recovery: Option<PathBuf>,

    /// Skip the validation-field pre-check entirely
    #[arg(long = "skip-validation")]
    pub skip_validation: bool,

    /// Drop questions with is_valid=false instead of failing
    #[arg(long = "ignore-invalid")]
    pub ignore_invalid: bool,

    /// Test against the question set's novel_summary instead of built contexts
    #[arg(long = "no-reference")]
    pub no_reference: bool,

    /// Directory with testing.json / question_generation.json templates
    #[arg(long)]
    pub templates: Option<PathBuf>,
}

/// Heatmap report flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HeatmapMode {
    /// Question coverage across position bins
    Coverage,
    /// Result accuracy across position bins
    Accuracy,
    /// Coverage and accuracy side by side
    Combined,
    /// Depth x context-length accuracy cells
    Depth,
    /// Coverage plus depth cells
    CombinedDepth,
}

#[derive(Args)]
pub struct HeatmapArgs {
    /// Report flavor
    #[arg(long, value_enum)]
    pub mode: HeatmapMode,

    /// Questions JSONL (coverage, combined, combined-depth)
    #[arg(long)]
    pub questions: Option<PathBuf>,

    /// Results JSONL (accuracy, combined, depth, combined-depth)
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Output path for the JSON report
    #[arg(long)]
    pub output: PathBuf,

    /// Number of position bins
    #[arg(long, default_value_t = 50)]
    pub bins: usize,

    /// Source length in tokens; read from file metadata when omitted
    #[arg(long = "context-length")]
    pub context_length: Option<usize>,
}
